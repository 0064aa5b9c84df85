// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Library error type and its diagnostic slot mapping.
//!
//! The failure model is finite: every fallible operation surfaces one of
//! the variants below through its return value or through the completion
//! callback, never through a panic.

use thiserror::Error;

use crate::frame::{Exception, ExceptionResponse};

/// A specialized [`Result`](std::result::Result) type for Modbus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Modbus errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// Caller misuse: out-of-domain parameter or undersized buffer.
    #[error("invalid argument")]
    InvalidArgument,

    /// A response deadline elapsed and the retry budget is exhausted.
    #[error("timed out waiting for response")]
    Timeout,

    /// Underlying I/O failure or watchdog trip.
    #[error("transport failure")]
    Transport,

    /// RTU CRC mismatch.
    #[error("CRC mismatch")]
    Crc,

    /// Malformed PDU or ADU on the wire.
    #[error("malformed frame")]
    InvalidRequest,

    /// A frame addressed to a different unit.
    #[error("frame addressed to another unit")]
    OtherUnit,

    /// The peer reported itself busy.
    #[error("device busy")]
    Busy,

    /// User-initiated cancellation or poison-pill drain.
    #[error("cancelled")]
    Cancelled,

    /// Pool or queue exhausted.
    #[error("no resources")]
    NoResources,

    /// The server answered with an exception response.
    #[error("{0}")]
    Exception(ExceptionResponse),
}

impl Error {
    /// The diagnostics slot this error is counted under.
    #[must_use]
    pub const fn slot(&self) -> ErrorSlot {
        match self {
            Self::InvalidArgument => ErrorSlot::InvalidArgument,
            Self::Timeout => ErrorSlot::Timeout,
            Self::Transport => ErrorSlot::Transport,
            Self::Crc => ErrorSlot::Crc,
            Self::InvalidRequest => ErrorSlot::InvalidRequest,
            Self::OtherUnit => ErrorSlot::OtherUnit,
            Self::Busy => ErrorSlot::Busy,
            Self::Cancelled => ErrorSlot::Cancelled,
            Self::NoResources => ErrorSlot::NoResources,
            Self::Exception(_) => ErrorSlot::Exception,
        }
    }

    /// The server exception carried by this error, if any.
    #[must_use]
    pub const fn exception(&self) -> Option<Exception> {
        match self {
            Self::Exception(rsp) => Some(rsp.exception),
            _ => None,
        }
    }
}

impl From<ExceptionResponse> for Error {
    fn from(from: ExceptionResponse) -> Self {
        Self::Exception(from)
    }
}

/// One diagnostics counter slot per distinguishable error condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ErrorSlot {
    InvalidArgument,
    Timeout,
    Transport,
    Crc,
    InvalidRequest,
    OtherUnit,
    Busy,
    Cancelled,
    NoResources,
    Exception,
    Duplicate,
}

impl ErrorSlot {
    /// Number of distinguishable slots.
    pub const COUNT: usize = 11;

    /// Stable display name of the slot.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::Crc => "crc",
            Self::InvalidRequest => "invalid_request",
            Self::OtherUnit => "other_unit",
            Self::Busy => "busy",
            Self::Cancelled => "cancelled",
            Self::NoResources => "no_resources",
            Self::Exception => "exception",
            Self::Duplicate => "duplicate",
        }
    }

    /// Index of the slot in a counter array.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// All slots in index order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::InvalidArgument,
        Self::Timeout,
        Self::Transport,
        Self::Crc,
        Self::InvalidRequest,
        Self::OtherUnit,
        Self::Busy,
        Self::Cancelled,
        Self::NoResources,
        Self::Exception,
        Self::Duplicate,
    ];
}
