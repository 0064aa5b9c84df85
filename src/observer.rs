// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured events for tracing the engines from the outside.
//!
//! An observer is a plain callback registered on a client engine or a
//! server pipeline; it sees state changes and request lifecycles without
//! being able to influence them.

use crate::{
    frame::{Exception, FunctionCode},
    unit::UnitId,
};

/// The client engine's externally visible states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No transaction in flight.
    Idle,
    /// A request is on the wire, awaiting its response.
    Waiting,
    /// A retry is scheduled but its backoff delay has not elapsed.
    Backoff,
}

impl ClientState {
    /// Stable display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Waiting => "waiting",
            Self::Backoff => "backoff",
        }
    }
}

/// Terminal status of a client transaction.
///
/// Every transaction ends with exactly one of these, delivered through
/// the completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The expected response arrived (or none was expected).
    Ok,
    /// All attempts timed out.
    Timeout,
    /// The transport failed or the watchdog tripped.
    Transport,
    /// Cancelled by the user or drained by a poison pill.
    Cancelled,
    /// The server answered with an exception.
    Exception(Exception),
}

impl Status {
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// A structured trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    ClientStateEnter(ClientState),
    ClientStateExit(ClientState),
    ClientTxSubmit {
        function: FunctionCode,
    },
    ClientTxComplete {
        function: FunctionCode,
        status: Status,
    },
    ServerRequestAccept {
        unit_id: UnitId,
        function: FunctionCode,
    },
    ServerRequestComplete {
        unit_id: UnitId,
        function: FunctionCode,
        result: Result<(), Exception>,
    },
}

/// The callback type observers are registered as.
pub type Observer = Box<dyn FnMut(Event) + Send>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names() {
        assert_eq!(ClientState::Idle.name(), "idle");
        assert_eq!(ClientState::Waiting.name(), "waiting");
        assert_eq!(ClientState::Backoff.name(), "backoff");
    }

    #[test]
    fn status_predicates() {
        assert!(Status::Ok.is_ok());
        assert!(!Status::Timeout.is_ok());
        assert!(!Status::Exception(Exception::IllegalFunction).is_ok());
    }
}
