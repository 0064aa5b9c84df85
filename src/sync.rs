// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Critical-section abstraction.
//!
//! The stack itself is single-threaded; the only shared state is fed
//! from interrupt context (or from other threads on a host). Every such
//! hand-off point is parameterized over a [`CriticalSection`] so the
//! application picks the cheapest protection its platform needs.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

/// A mutual-exclusion region guarding an ISR-facing hand-off point.
pub trait CriticalSection {
    /// Run `f` with the section held.
    fn with<R>(&self, f: impl FnOnce() -> R) -> R;
}

/// No protection at all, for strictly single-threaded deployments.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleThread;

impl CriticalSection for SingleThread {
    #[inline]
    fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        f()
    }
}

/// An atomic-flag spinlock, for short sections contended between a task
/// and an interrupt handler on SMP targets.
#[derive(Debug, Default)]
pub struct SpinLock {
    locked: AtomicBool,
}

impl CriticalSection for SpinLock {
    fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
        let result = f();
        self.locked.store(false, Ordering::Release);
        result
    }
}

/// An OS mutex, for host deployments with preemptive threads.
#[derive(Debug, Default)]
pub struct StdMutex {
    inner: Mutex<()>,
}

impl CriticalSection for StdMutex {
    fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f()
    }
}
