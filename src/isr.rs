// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bridge between interrupt context and the polling task.
//!
//! The interrupt side copies received DMA/UART chunks into fixed blocks
//! and hands them over through a lock-free SPSC queue; the task side
//! drains them into the protocol engines. Transmission goes the other
//! way: the task stages a frame, the interrupt side picks it up when
//! the transmitter is free. No protocol logic runs in interrupt
//! context.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    Arc,
};

use crate::{
    error::{Error, Result},
    frame::RTU_FRAME_MAX,
    queue::{spsc, SpscConsumer, SpscProducer},
    transport::{millis_since, Millis},
};

/// Bytes per received chunk block (a typical UART FIFO / DMA burst).
pub const RX_CHUNK_CAPACITY: usize = 64;

/// One received chunk, copied out of the driver's buffer inside the
/// interrupt handler.
#[derive(Clone, Copy)]
pub struct RxChunk {
    len: u8,
    at: Millis,
    data: [u8; RX_CHUNK_CAPACITY],
}

impl RxChunk {
    /// The received bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data[..usize::from(self.len)]
    }

    /// When the chunk was received.
    #[must_use]
    pub const fn received_at(&self) -> Millis {
        self.at
    }
}

impl std::fmt::Debug for RxChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RxChunk").field("len", &self.len).finish()
    }
}

/// One frame staged for transmission.
#[derive(Clone, Copy)]
pub struct TxFrame {
    len: u16,
    data: [u8; RTU_FRAME_MAX],
}

impl TxFrame {
    /// The frame bytes to transmit.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data[..usize::from(self.len)]
    }
}

impl std::fmt::Debug for TxFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxFrame").field("len", &self.len).finish()
    }
}

#[derive(Debug, Default)]
struct Shared {
    in_isr: AtomicBool,
    last_rx_at: AtomicU32,
    have_rx: AtomicBool,
    turn_min: AtomicU32,
    turn_max: AtomicU32,
    turn_sum: AtomicU64,
    turn_count: AtomicU64,
}

/// Receive-to-transmit turnaround statistics in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnaroundStats {
    pub count: u64,
    pub min_ms: u32,
    pub max_ms: u32,
    pub sum_ms: u64,
}

impl TurnaroundStats {
    /// Mean turnaround, if any transmission happened.
    #[must_use]
    pub fn mean_ms(&self) -> Option<u64> {
        (self.count > 0).then(|| self.sum_ms / self.count)
    }
}

/// Create a bridge with queues of `N` entries each (`N` a power of
/// two). Returns the interrupt half and the task half.
#[must_use]
pub fn isr_bridge<const N: usize>() -> (IsrSide<N>, TaskSide<N>) {
    let shared = Arc::new(Shared::default());
    let (rx_producer, rx_consumer) = spsc::<RxChunk, N>();
    let (tx_producer, tx_consumer) = spsc::<TxFrame, N>();
    (
        IsrSide {
            rx: rx_producer,
            tx: tx_consumer,
            shared: Arc::clone(&shared),
        },
        TaskSide {
            rx: rx_consumer,
            tx: tx_producer,
            shared,
        },
    )
}

/// The half of the bridge owned by the interrupt handler.
#[derive(Debug)]
pub struct IsrSide<const N: usize> {
    rx: SpscProducer<RxChunk, N>,
    tx: SpscConsumer<TxFrame, N>,
    shared: Arc<Shared>,
}

impl<const N: usize> IsrSide<N> {
    /// Copy a received chunk into the hand-off queue.
    ///
    /// Chunks longer than [`RX_CHUNK_CAPACITY`] are split. A full queue
    /// drops the remainder and fails with [`Error::NoResources`]; the
    /// drop is counted on the queue.
    pub fn on_rx_chunk(&mut self, bytes: &[u8], now: Millis) -> Result<()> {
        for part in bytes.chunks(RX_CHUNK_CAPACITY) {
            let mut chunk = RxChunk {
                len: part.len() as u8,
                at: now,
                data: [0; RX_CHUNK_CAPACITY],
            };
            chunk.data[..part.len()].copy_from_slice(part);
            if self.rx.push(chunk).is_err() {
                return Err(Error::NoResources);
            }
        }
        self.shared.last_rx_at.store(now, Ordering::Relaxed);
        self.shared.have_rx.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Take the next staged frame and begin transmitting it.
    ///
    /// Records the receive-to-transmit turnaround against the most
    /// recent chunk.
    pub fn try_tx(&mut self, now: Millis) -> Option<TxFrame> {
        let frame = self.tx.pop()?;
        if self.shared.have_rx.swap(false, Ordering::Relaxed) {
            let last_rx = self.shared.last_rx_at.load(Ordering::Relaxed);
            let turnaround = millis_since(now, last_rx).max(0) as u32;
            let shared = &self.shared;
            shared.turn_count.fetch_add(1, Ordering::Relaxed);
            shared.turn_sum.fetch_add(u64::from(turnaround), Ordering::Relaxed);
            shared.turn_max.fetch_max(turnaround, Ordering::Relaxed);
            if shared.turn_count.load(Ordering::Relaxed) == 1 {
                shared.turn_min.store(turnaround, Ordering::Relaxed);
            } else {
                shared.turn_min.fetch_min(turnaround, Ordering::Relaxed);
            }
        }
        Some(frame)
    }

    /// Manual in-interrupt marker for platforms without hardware
    /// detection.
    pub fn set_in_isr(&self, flag: bool) {
        self.shared.in_isr.store(flag, Ordering::Relaxed);
    }

    /// Number of chunks dropped because the queue was full.
    #[must_use]
    pub fn dropped_chunks(&self) -> u64 {
        self.rx.dropped()
    }
}

/// The half of the bridge owned by the polling task.
#[derive(Debug)]
pub struct TaskSide<const N: usize> {
    rx: SpscConsumer<RxChunk, N>,
    tx: SpscProducer<TxFrame, N>,
    shared: Arc<Shared>,
}

impl<const N: usize> TaskSide<N> {
    /// Drain all pending chunks into `sink` (typically a server's or
    /// client's `feed`).
    pub fn drain_rx(&mut self, mut sink: impl FnMut(&[u8])) -> usize {
        let mut drained = 0;
        while let Some(chunk) = self.rx.pop() {
            sink(chunk.bytes());
            drained += 1;
        }
        drained
    }

    /// Stage a frame for the interrupt side to transmit.
    pub fn queue_tx(&mut self, frame: &[u8]) -> Result<()> {
        if frame.is_empty() || frame.len() > RTU_FRAME_MAX {
            return Err(Error::InvalidArgument);
        }
        let mut staged = TxFrame {
            len: frame.len() as u16,
            data: [0; RTU_FRAME_MAX],
        };
        staged.data[..frame.len()].copy_from_slice(frame);
        self.tx.push(staged).map_err(|_| Error::NoResources)
    }

    /// Whether the manual in-interrupt marker is set.
    #[must_use]
    pub fn in_isr(&self) -> bool {
        self.shared.in_isr.load(Ordering::Relaxed)
    }

    /// Receive-to-transmit turnaround statistics.
    #[must_use]
    pub fn turnaround(&self) -> TurnaroundStats {
        TurnaroundStats {
            count: self.shared.turn_count.load(Ordering::Relaxed),
            min_ms: self.shared.turn_min.load(Ordering::Relaxed),
            max_ms: self.shared.turn_max.load(Ordering::Relaxed),
            sum_ms: self.shared.turn_sum.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_cross_the_bridge() {
        let (mut isr, mut task) = isr_bridge::<8>();
        isr.on_rx_chunk(&[1, 2, 3], 10).unwrap();
        isr.on_rx_chunk(&[4, 5], 11).unwrap();

        let mut received = Vec::new();
        let drained = task.drain_rx(|bytes| received.extend_from_slice(bytes));
        assert_eq!(drained, 2);
        assert_eq!(received, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn oversized_chunks_are_split() {
        let (mut isr, mut task) = isr_bridge::<8>();
        let big = vec![0xAB; RX_CHUNK_CAPACITY * 2 + 5];
        isr.on_rx_chunk(&big, 0).unwrap();
        let mut total = 0;
        let drained = task.drain_rx(|bytes| total += bytes.len());
        assert_eq!(drained, 3);
        assert_eq!(total, big.len());
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let (mut isr, _task) = isr_bridge::<2>();
        isr.on_rx_chunk(&[1], 0).unwrap();
        isr.on_rx_chunk(&[2], 0).unwrap();
        assert_eq!(isr.on_rx_chunk(&[3], 0), Err(Error::NoResources));
        assert_eq!(isr.dropped_chunks(), 1);
    }

    #[test]
    fn tx_handoff_and_turnaround() {
        let (mut isr, mut task) = isr_bridge::<8>();

        // Nothing staged yet.
        assert!(isr.try_tx(0).is_none());

        isr.on_rx_chunk(&[0x01, 0x03], 100).unwrap();
        task.drain_rx(|_| {});
        task.queue_tx(&[0x01, 0x03, 0x02, 0x00, 0x05]).unwrap();

        let frame = isr.try_tx(104).unwrap();
        assert_eq!(frame.bytes(), &[0x01, 0x03, 0x02, 0x00, 0x05]);

        let stats = task.turnaround();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.min_ms, 4);
        assert_eq!(stats.max_ms, 4);
        assert_eq!(stats.mean_ms(), Some(4));
    }

    #[test]
    fn turnaround_tracks_min_and_max() {
        let (mut isr, mut task) = isr_bridge::<8>();
        for (rx_at, tx_at) in [(0, 10), (100, 102), (200, 230)] {
            isr.on_rx_chunk(&[0], rx_at).unwrap();
            task.drain_rx(|_| {});
            task.queue_tx(&[1]).unwrap();
            isr.try_tx(tx_at).unwrap();
        }
        let stats = task.turnaround();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min_ms, 2);
        assert_eq!(stats.max_ms, 30);
        assert_eq!(stats.mean_ms(), Some(14));
    }

    #[test]
    fn manual_in_isr_flag() {
        let (isr, task) = isr_bridge::<2>();
        assert!(!task.in_isr());
        isr.set_in_isr(true);
        assert!(task.in_isr());
        isr.set_in_isr(false);
        assert!(!task.in_isr());
    }

    #[test]
    fn oversized_tx_frame_is_rejected() {
        let (_isr, mut task) = isr_bridge::<2>();
        assert_eq!(task.queue_tx(&[0; 257]), Err(Error::InvalidArgument));
        assert_eq!(task.queue_tx(&[]), Err(Error::InvalidArgument));
    }
}
