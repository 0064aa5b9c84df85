// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Unit addressing.
//!
//! The first byte of every frame names the addressed device. Address 0
//! is the broadcast, 1 through 247 name individual servers, and the
//! remainder is reserved; [`Unit::kind`] sorts an incoming byte into
//! those classes.

use std::{fmt, num::ParseIntError, str::FromStr};

/// Raw one-byte device identifier as it travels on the wire.
pub type UnitId = u8;

/// A wire address wrapped for comparison and classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Unit(pub UnitId);

/// Address 0: every server on the link executes the request, none
/// answers it.
pub const BROADCAST: Unit = Unit(0);

/// Address 255: what a directly connected Modbus TCP peer puts into the
/// unit id field when no gateway routing is involved.
pub const TCP_DIRECT: Unit = Unit(0xFF);

/// How an address byte is interpreted on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    /// One-way delivery to all servers at once.
    Broadcast,
    /// Exactly one server (ids 1 through 247).
    Device,
    /// Ids 248 through 255, set aside by the serial line rules; some
    /// of them carry meaning on TCP.
    Reserved,
}

impl Unit {
    /// Classify the address.
    #[must_use]
    pub const fn kind(self) -> AddressKind {
        match self.0 {
            0 => AddressKind::Broadcast,
            1..=247 => AddressKind::Device,
            _ => AddressKind::Reserved,
        }
    }
}

impl FromStr for Unit {
    type Err = ParseIntError;

    /// Accepts plain decimal (`"17"`) or hex with a `0x`/`0X` prefix
    /// (`"0x11"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => UnitId::from_str_radix(hex, 16)?,
            None => s.parse()?,
        };
        Ok(Unit(id))
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == BROADCAST {
            f.write_str("broadcast")
        } else {
            write!(f, "unit {:#04X}", self.0)
        }
    }
}
