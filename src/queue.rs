// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ISR-safe queues and the byte ring used for receive assembly.
//!
//! The SPSC queue is lock-free: producer and consumer touch disjoint
//! indices with acquire/release ordering, so one interrupt handler and
//! one task can share it without a critical section. The MPSC variant
//! serializes producers behind a mutex and keeps the consumer lock-free.

use std::{
    cell::UnsafeCell,
    mem::MaybeUninit,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

struct RingShared<T, const N: usize> {
    // head: next slot to pop, tail: next slot to push. Both grow
    // monotonically and are masked by N - 1.
    head: AtomicUsize,
    tail: AtomicUsize,
    dropped: AtomicU64,
    slots: [UnsafeCell<MaybeUninit<T>>; N],
}

// The producer/consumer split guarantees exclusive access per slot.
unsafe impl<T: Send, const N: usize> Sync for RingShared<T, N> {}
unsafe impl<T: Send, const N: usize> Send for RingShared<T, N> {}

impl<T, const N: usize> RingShared<T, N> {
    fn new() -> Self {
        assert!(N.is_power_of_two(), "capacity must be a power of two");
        Self {
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
            slots: std::array::from_fn(|_| UnsafeCell::new(MaybeUninit::uninit())),
        }
    }

    fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }
}

impl<T, const N: usize> std::fmt::Debug for RingShared<T, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingShared")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<T, const N: usize> Drop for RingShared<T, N> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        let mut idx = head;
        while idx != tail {
            unsafe {
                (*self.slots[idx & (N - 1)].get()).assume_init_drop();
            }
            idx = idx.wrapping_add(1);
        }
    }
}

/// Create a lock-free single-producer/single-consumer queue.
///
/// `N` must be a power of two. The two halves may live on different
/// threads (or one of them in interrupt context).
#[must_use]
pub fn spsc<T, const N: usize>() -> (SpscProducer<T, N>, SpscConsumer<T, N>) {
    let shared = Arc::new(RingShared::new());
    (
        SpscProducer {
            shared: Arc::clone(&shared),
        },
        SpscConsumer { shared },
    )
}

/// The producing half of an SPSC queue.
#[derive(Debug)]
pub struct SpscProducer<T, const N: usize> {
    shared: Arc<RingShared<T, N>>,
}

impl<T, const N: usize> SpscProducer<T, N> {
    /// Enqueue a value.
    ///
    /// A full queue rejects the value, hands it back and increments the
    /// drop counter.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        let shared = &*self.shared;
        let tail = shared.tail.load(Ordering::Relaxed);
        let head = shared.head.load(Ordering::Acquire);
        if tail.wrapping_sub(head) == N {
            shared.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(value);
        }
        unsafe {
            (*shared.slots[tail & (N - 1)].get()).write(value);
        }
        shared.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Number of enqueue attempts rejected because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Number of values currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The consuming half of an SPSC queue.
#[derive(Debug)]
pub struct SpscConsumer<T, const N: usize> {
    shared: Arc<RingShared<T, N>>,
}

impl<T, const N: usize> SpscConsumer<T, N> {
    /// Dequeue the oldest value, if any.
    pub fn pop(&mut self) -> Option<T> {
        let shared = &*self.shared;
        let head = shared.head.load(Ordering::Relaxed);
        let tail = shared.tail.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        let value = unsafe { (*shared.slots[head & (N - 1)].get()).assume_init_read() };
        shared.head.store(head.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Number of values currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Create a multi-producer/single-consumer queue.
///
/// Producers are serialized by a mutex; the consumer stays lock-free.
#[must_use]
pub fn mpsc<T, const N: usize>() -> (MpscSender<T, N>, MpscReceiver<T, N>) {
    let shared = Arc::new(RingShared::new());
    (
        MpscSender {
            shared: Arc::clone(&shared),
            lock: Arc::new(Mutex::new(())),
        },
        MpscReceiver { shared },
    )
}

/// A cloneable producing half of an MPSC queue.
#[derive(Debug)]
pub struct MpscSender<T, const N: usize> {
    shared: Arc<RingShared<T, N>>,
    lock: Arc<Mutex<()>>,
}

impl<T, const N: usize> Clone for MpscSender<T, N> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            lock: Arc::clone(&self.lock),
        }
    }
}

impl<T, const N: usize> MpscSender<T, N> {
    /// Enqueue a value; a full queue rejects it and counts the drop.
    pub fn push(&self, value: T) -> Result<(), T> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let shared = &*self.shared;
        let tail = shared.tail.load(Ordering::Relaxed);
        let head = shared.head.load(Ordering::Acquire);
        if tail.wrapping_sub(head) == N {
            shared.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(value);
        }
        unsafe {
            (*shared.slots[tail & (N - 1)].get()).write(value);
        }
        shared.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Number of enqueue attempts rejected because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

/// The consuming half of an MPSC queue.
#[derive(Debug)]
pub struct MpscReceiver<T, const N: usize> {
    shared: Arc<RingShared<T, N>>,
}

impl<T, const N: usize> MpscReceiver<T, N> {
    /// Dequeue the oldest value, if any.
    pub fn pop(&mut self) -> Option<T> {
        let shared = &*self.shared;
        let head = shared.head.load(Ordering::Relaxed);
        let tail = shared.tail.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        let value = unsafe { (*shared.slots[head & (N - 1)].get()).assume_init_read() };
        shared.head.store(head.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Number of values currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single-owner ring of bytes with a power-of-two capacity, used for
/// receive assembly between an interrupt-fed producer and the polling
/// task.
#[derive(Debug)]
pub struct ByteRing {
    buf: Box<[u8]>,
    head: usize,
    tail: usize,
}

impl ByteRing {
    /// Create a ring with at least `capacity` bytes, rounded up to the
    /// next power of two.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        Self {
            buf: vec![0; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tail.wrapping_sub(self.head)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Append bytes, returning how many fit.
    pub fn push_slice(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.free());
        let mask = self.capacity() - 1;
        for byte in &bytes[..n] {
            self.buf[self.tail & mask] = *byte;
            self.tail = self.tail.wrapping_add(1);
        }
        n
    }

    /// Remove up to `out.len()` of the oldest bytes, returning the count.
    pub fn pop_slice(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.len());
        let mask = self.capacity() - 1;
        for slot in out.iter_mut().take(n) {
            *slot = self.buf[self.head & mask];
            self.head = self.head.wrapping_add(1);
        }
        n
    }

    pub fn clear(&mut self) {
        self.head = self.tail;
    }
}
