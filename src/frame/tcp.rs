// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MBAP (Modbus TCP) framing types.

use crate::unit::UnitId;

use super::{RequestPdu, ResponsePdu};

/// A transaction correlation token, assigned by the client.
pub type TransactionId = u16;

/// The relevant fields of the 7-byte MBAP header.
///
/// The protocol id is fixed to zero and therefore not represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub transaction_id: TransactionId,
    pub unit_id: UnitId,
}

/// A complete MBAP request frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestAdu<'a> {
    pub hdr: Header,
    pub pdu: RequestPdu<'a>,
}

/// A complete MBAP response frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseAdu<'a> {
    pub hdr: Header,
    pub pdu: ResponsePdu<'a>,
}
