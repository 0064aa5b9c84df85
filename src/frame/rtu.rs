// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RTU framing types.

use crate::unit::UnitId;

use super::{RequestPdu, ResponsePdu};

/// The RTU frame header carries only the addressed unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub unit_id: UnitId,
}

/// A complete RTU request frame body (framing overhead excluded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestAdu<'a> {
    pub hdr: Header,
    pub pdu: RequestPdu<'a>,
}

/// A complete RTU response frame body (framing overhead excluded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseAdu<'a> {
    pub hdr: Header,
    pub pdu: ResponsePdu<'a>,
}
