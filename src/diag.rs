// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-function-code and per-error counters plus an optional bounded
//! trace of recent protocol events.

use std::collections::VecDeque;

use crate::{
    error::{Error, ErrorSlot},
    frame::FunctionCode,
    transport::Millis,
    unit::UnitId,
};

/// Number of tracked function-code counters (0x00 - 0x7F).
pub const FC_COUNTERS: usize = 128;

/// A recent protocol event kept in the trace ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// A frame passed framing checks and entered processing.
    FrameAccepted { unit_id: UnitId, function: u8 },
    /// A frame or request failed; counted under the given slot.
    Fault { slot: ErrorSlot },
    /// A request or transaction reached its terminal state.
    Completed { function: u8, ok: bool },
}

/// A trace ring entry: what happened and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry {
    pub at: Millis,
    pub event: TraceEvent,
}

/// A point-in-time copy of all counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagSnapshot {
    /// Requests seen per function code, indexed by the raw code.
    pub fc_counters: [u64; FC_COUNTERS],
    /// Errors seen per slot, indexed by [`ErrorSlot::index`].
    pub error_counters: [u64; ErrorSlot::COUNT],
}

impl DiagSnapshot {
    /// Counter of one function code.
    #[must_use]
    pub fn function(&self, function: FunctionCode) -> u64 {
        self.fc_counters[usize::from(function.value() & 0x7F)]
    }

    /// Counter of one error slot.
    #[must_use]
    pub fn error(&self, slot: ErrorSlot) -> u64 {
        self.error_counters[slot.index()]
    }
}

/// Counters and trace kept by an engine or pipeline.
#[derive(Debug)]
pub struct Diagnostics {
    fc_counters: [u64; FC_COUNTERS],
    error_counters: [u64; ErrorSlot::COUNT],
    trace: Option<VecDeque<TraceEntry>>,
    trace_depth: usize,
}

impl Diagnostics {
    /// Counters only, no trace ring.
    #[must_use]
    pub fn new() -> Self {
        Self::with_trace_depth(0)
    }

    /// Counters plus a trace ring of the most recent `depth` events.
    #[must_use]
    pub fn with_trace_depth(depth: usize) -> Self {
        Self {
            fc_counters: [0; FC_COUNTERS],
            error_counters: [0; ErrorSlot::COUNT],
            trace: (depth > 0).then(|| VecDeque::with_capacity(depth)),
            trace_depth: depth,
        }
    }

    /// Count a processed request or response by function code.
    pub fn count_function(&mut self, function: FunctionCode) {
        self.fc_counters[usize::from(function.value() & 0x7F)] += 1;
    }

    /// Count an error under its slot.
    pub fn count_error_slot(&mut self, slot: ErrorSlot) {
        self.error_counters[slot.index()] += 1;
    }

    /// Count an error under the slot derived from its kind.
    pub fn count_error(&mut self, error: &Error) {
        self.count_error_slot(error.slot());
    }

    /// Append an event to the trace ring, evicting the oldest entry when
    /// the ring is full. A no-op without a configured trace.
    pub fn trace(&mut self, at: Millis, event: TraceEvent) {
        let Some(trace) = &mut self.trace else {
            return;
        };
        if trace.len() == self.trace_depth {
            trace.pop_front();
        }
        trace.push_back(TraceEntry { at, event });
    }

    /// Iterate the retained trace, oldest first.
    pub fn trace_iter(&self) -> impl Iterator<Item = &TraceEntry> {
        self.trace.iter().flatten()
    }

    /// Copy out all counters.
    #[must_use]
    pub fn snapshot(&self) -> DiagSnapshot {
        DiagSnapshot {
            fc_counters: self.fc_counters,
            error_counters: self.error_counters,
        }
    }

    /// Zero all counters and clear the trace.
    pub fn reset(&mut self) {
        self.fc_counters = [0; FC_COUNTERS];
        self.error_counters = [0; ErrorSlot::COUNT];
        if let Some(trace) = &mut self.trace {
            trace.clear();
        }
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}
