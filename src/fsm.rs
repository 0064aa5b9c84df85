// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A reusable table-driven finite state machine.
//!
//! States are `const` data: an id, a name, a transition table and an
//! optional default action. Events are small integers fed through a
//! fixed-capacity queue whose enqueue side is safe to call from
//! interrupt context when a suitable [`CriticalSection`] is chosen.
//! [`Fsm::run`] pops at most one event per invocation; with no event
//! pending the current state's default action runs, which is where
//! timeout polling lives.

use std::cell::UnsafeCell;

use crate::{
    error::{Error, Result},
    sync::{CriticalSection, SingleThread},
};

/// Identifies a state in a machine's state table.
pub type StateId = u8;

/// Identifies an event fed into a machine.
pub type EventId = u8;

/// One row of a transition table.
pub struct Transition<C> {
    pub event: EventId,
    pub next: StateId,
    /// The transition only fires when the guard returns `true`.
    pub guard: Option<fn(&C) -> bool>,
    pub action: Option<fn(&mut C)>,
}

/// A state descriptor. Build these as `const` tables.
pub struct State<C: 'static> {
    pub id: StateId,
    pub name: &'static str,
    pub transitions: &'static [Transition<C>],
    /// Runs on [`Fsm::run`] when no event is pending.
    pub default_action: Option<fn(&mut C)>,
}

/// Implemented by the context a machine operates on.
///
/// Actions cannot reach the event queue directly (they are plain function
/// pointers), so they stage follow-up events in the context; the machine
/// drains them after every action.
pub trait FsmContext {
    /// Remove and return one staged event, if any.
    fn take_emitted(&mut self) -> Option<EventId> {
        None
    }
}

struct EventRingInner {
    buf: Box<[EventId]>,
    head: usize,
    tail: usize,
    dropped: u64,
}

struct EventRing<S> {
    section: S,
    inner: UnsafeCell<EventRingInner>,
}

// Access to `inner` is serialized by the critical section. Choosing
// `SingleThread` on a multi-threaded deployment violates that contract.
unsafe impl<S: CriticalSection + Sync> Sync for EventRing<S> {}

impl<S: CriticalSection> EventRing<S> {
    fn new(capacity: usize, section: S) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        Self {
            section,
            inner: UnsafeCell::new(EventRingInner {
                buf: vec![0; capacity].into_boxed_slice(),
                head: 0,
                tail: 0,
                dropped: 0,
            }),
        }
    }

    fn enqueue(&self, event: EventId) -> Result<()> {
        self.section.with(|| {
            let inner = unsafe { &mut *self.inner.get() };
            let capacity = inner.buf.len();
            if inner.tail.wrapping_sub(inner.head) == capacity {
                inner.dropped += 1;
                return Err(Error::NoResources);
            }
            let mask = capacity - 1;
            inner.buf[inner.tail & mask] = event;
            inner.tail = inner.tail.wrapping_add(1);
            Ok(())
        })
    }

    fn dequeue(&self) -> Option<EventId> {
        self.section.with(|| {
            let inner = unsafe { &mut *self.inner.get() };
            if inner.head == inner.tail {
                return None;
            }
            let mask = inner.buf.len() - 1;
            let event = inner.buf[inner.head & mask];
            inner.head = inner.head.wrapping_add(1);
            Some(event)
        })
    }

    fn len(&self) -> usize {
        self.section.with(|| {
            let inner = unsafe { &*self.inner.get() };
            inner.tail.wrapping_sub(inner.head)
        })
    }

    fn dropped(&self) -> u64 {
        self.section.with(|| {
            let inner = unsafe { &*self.inner.get() };
            inner.dropped
        })
    }
}

impl<S> std::fmt::Debug for EventRing<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRing").finish_non_exhaustive()
    }
}

/// A table-driven state machine over a context `C`.
#[derive(Debug)]
pub struct Fsm<C: 'static, S: CriticalSection = SingleThread> {
    states: &'static [State<C>],
    current: usize,
    queue: EventRing<S>,
    on_transition: Option<fn(&mut C, StateId, StateId)>,
    ignored_events: u64,
}

impl<C: FsmContext + 'static> Fsm<C, SingleThread> {
    /// Create a machine without cross-context protection on the event
    /// queue.
    pub fn new(states: &'static [State<C>], initial: StateId, queue_capacity: usize) -> Self {
        Self::with_section(states, initial, queue_capacity, SingleThread)
    }
}

impl<C: FsmContext + 'static, S: CriticalSection> Fsm<C, S> {
    /// Create a machine whose event queue is guarded by `section`.
    ///
    /// Panics if `states` is empty or `initial` is not in the table;
    /// state tables are static configuration, not runtime input.
    pub fn with_section(
        states: &'static [State<C>],
        initial: StateId,
        queue_capacity: usize,
        section: S,
    ) -> Self {
        assert!(!states.is_empty(), "state table must not be empty");
        let current = Self::index_of(states, initial).expect("initial state missing from table");
        Self {
            states,
            current,
            queue: EventRing::new(queue_capacity, section),
            on_transition: None,
            ignored_events: 0,
        }
    }

    fn index_of(states: &'static [State<C>], id: StateId) -> Option<usize> {
        states.iter().position(|state| state.id == id)
    }

    /// Hook invoked on every state change with `(ctx, from, to)`.
    pub fn set_transition_hook(&mut self, hook: fn(&mut C, StateId, StateId)) {
        self.on_transition = Some(hook);
    }

    /// Current state id.
    #[must_use]
    pub fn state(&self) -> StateId {
        self.states[self.current].id
    }

    /// Current state name.
    #[must_use]
    pub fn state_name(&self) -> &'static str {
        self.states[self.current].name
    }

    /// Number of queued events.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Events rejected because the queue was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.queue.dropped()
    }

    /// Events that arrived in a state with no matching transition.
    #[must_use]
    pub fn ignored_events(&self) -> u64 {
        self.ignored_events
    }

    /// Enqueue an event. Safe to call from interrupt context when the
    /// machine was built with an adequate [`CriticalSection`].
    pub fn enqueue(&self, event: EventId) -> Result<()> {
        self.queue.enqueue(event)
    }

    /// Force the machine into a state without running any actions.
    ///
    /// For error recovery paths only.
    pub fn reset_to(&mut self, state: StateId) -> Result<()> {
        self.current = Self::index_of(self.states, state).ok_or(Error::InvalidArgument)?;
        while self.queue.dequeue().is_some() {}
        Ok(())
    }

    /// Pop one event and dispatch it through the current state's
    /// transition table. With no event pending, run the current state's
    /// default action instead.
    ///
    /// Returns `true` if an event was consumed.
    pub fn run(&mut self, ctx: &mut C) -> bool {
        if let Some(event) = self.queue.dequeue() {
            self.dispatch(event, ctx);
            self.drain_emitted(ctx);
            true
        } else {
            if let Some(default_action) = self.states[self.current].default_action {
                default_action(ctx);
                self.drain_emitted(ctx);
            }
            false
        }
    }

    /// Run until no more events are pending, bounded by `max_steps`.
    ///
    /// A default action may stage follow-up events; those are consumed
    /// within the same call.
    pub fn run_to_idle(&mut self, ctx: &mut C, max_steps: usize) {
        for _ in 0..max_steps {
            let consumed = self.run(ctx);
            if !consumed && self.pending() == 0 {
                break;
            }
        }
    }

    fn dispatch(&mut self, event: EventId, ctx: &mut C) {
        let state = &self.states[self.current];
        let transition = state
            .transitions
            .iter()
            .find(|t| t.event == event && t.guard.map_or(true, |guard| guard(ctx)));
        let Some(transition) = transition else {
            log::debug!(
                "Ignoring event {event} in state {name}",
                name = state.name
            );
            self.ignored_events += 1;
            return;
        };
        let from = state.id;
        let next = transition.next;
        if let Some(action) = transition.action {
            action(ctx);
        }
        if from != next {
            self.current =
                Self::index_of(self.states, next).expect("transition names unknown state");
            if let Some(hook) = self.on_transition {
                hook(ctx, from, next);
            }
        }
    }

    fn drain_emitted(&mut self, ctx: &mut C) {
        while let Some(event) = ctx.take_emitted() {
            if self.queue.enqueue(event).is_err() {
                log::error!("Event queue overflow while staging follow-up event {event}");
                break;
            }
        }
    }
}

impl<C> std::fmt::Debug for State<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<C> std::fmt::Debug for Transition<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transition")
            .field("event", &self.event)
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}
