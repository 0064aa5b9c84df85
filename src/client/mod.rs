// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client transaction engine.
//!
//! The engine owns a fixed pool of transaction slots and a pending
//! queue. One transaction is *current* at any time; it moves through
//! `Idle -> Waiting -> (Backoff -> Waiting)* -> terminal` while
//! [`Client::poll`] drives the transport, correlates responses and
//! enforces deadlines. Every transaction terminates exactly once, through
//! its completion callback, with exactly one [`Status`].

#[cfg(feature = "rtu")]
pub mod rtu;

#[cfg(feature = "tcp")]
pub mod tcp;

use std::collections::VecDeque;

use bytes::Bytes;
use smallvec::SmallVec;

use crate::{
    codec,
    diag::{Diagnostics, TraceEvent},
    error::{Error, ErrorSlot, Result},
    frame::{FunctionCode, Request, Response, ExceptionResponse, PDU_MAX, TCP_FRAME_MAX},
    observer::{Event, Observer},
    pool::{Handle, Pool},
    transport::{millis_since, Millis, Transport},
    unit::{Unit, UnitId, BROADCAST},
};

#[cfg(feature = "tcp")]
use crate::frame::tcp::TransactionId;

pub use crate::observer::{ClientState, Status};

/// Tunables of a client engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Maximum number of in-flight transactions (current + queued);
    /// submissions beyond it are rejected with [`Error::NoResources`].
    pub queue_capacity: usize,
    /// Per-attempt response timeout before the first retry doubling.
    pub default_timeout_ms: u32,
    /// Upper bound of the doubled per-attempt timeout.
    pub timeout_ceiling_ms: u32,
    /// Base delay before the first retry.
    pub default_backoff_ms: u32,
    /// Upper bound of the doubled backoff delay.
    pub backoff_ceiling_ms: u32,
    /// Retry budget of a transaction unless overridden per call.
    pub default_max_retries: u8,
    /// Independent upper bound on a transaction's total lifetime; a trip
    /// finalizes with [`Status::Transport`]. Zero disables the watchdog.
    pub watchdog_ms: u32,
    /// Seed of the per-engine jitter PRNG.
    pub jitter_seed: u64,
    /// Depth of the diagnostics trace ring (zero disables tracing).
    pub trace_depth: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 8,
            default_timeout_ms: 1000,
            timeout_ceiling_ms: 8000,
            default_backoff_ms: 100,
            backoff_ceiling_ms: 2000,
            default_max_retries: 3,
            watchdog_ms: 30_000,
            jitter_seed: 0x9E37_79B9_7F4A_7C15,
            trace_depth: 0,
        }
    }
}

/// Per-call overrides and flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    pub timeout_ms: Option<u32>,
    pub backoff_ms: Option<u32>,
    pub max_retries: Option<u8>,
    /// Enqueue at the head of the pending queue.
    pub high_priority: bool,
    /// Fire and forget: complete with [`Status::Ok`] once the request
    /// left the engine. Forced for broadcast requests.
    pub no_response: bool,
}

/// What a finished transaction delivers to its callback.
#[derive(Debug)]
pub struct Completion<'a> {
    pub unit_id: UnitId,
    pub function: FunctionCode,
    pub status: Status,
    /// The decoded response for [`Status::Ok`] transactions that
    /// expected one.
    pub response: Option<Response<'a>>,
}

/// Completion callback. Consumed on delivery: a transaction cannot
/// complete twice.
pub type Callback = Box<dyn FnOnce(Completion<'_>) + Send>;

/// Identifies a submitted transaction for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    handle: Handle,
    seq: u64,
}

/// Counters of a client engine. Resettable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    pub submitted: u64,
    pub completed: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub cancelled: u64,
    pub retries: u64,
    pub poison_triggers: u64,
    pub bytes_tx: u64,
    pub bytes_rx: u64,
    pub latency_sum_ms: u64,
    pub latency_count: u64,
}

impl Metrics {
    /// Mean response latency of successful transactions, if any.
    #[must_use]
    pub fn mean_latency_ms(&self) -> Option<u64> {
        (self.latency_count > 0).then(|| self.latency_sum_ms / self.latency_count)
    }
}

// Plain xorshift64, seeded per engine so retry timelines are
// reproducible.
#[derive(Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 0xBAD5_EED } else { seed },
        }
    }

    fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

// One inline block holds any PDU (253 bytes) with room to spare.
type PduBuf = SmallVec<[u8; 256]>;

struct Transaction {
    seq: u64,
    unit_id: UnitId,
    function: FunctionCode,
    request: PduBuf,
    response: PduBuf,
    #[cfg(feature = "tcp")]
    transaction_id: TransactionId,
    submitted_at: Millis,
    deadline: Millis,
    watchdog_deadline: Millis,
    next_attempt: Millis,
    base_timeout: u32,
    base_backoff: u32,
    retries: u8,
    max_retries: u8,
    no_response: bool,
    poison: bool,
    callback: Option<Callback>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("seq", &self.seq)
            .field("unit_id", &self.unit_id)
            .field("function", &self.function)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum Link {
    #[cfg(feature = "rtu")]
    Rtu {
        decoder: codec::rtu::StreamDecoder,
    },
    #[cfg(feature = "tcp")]
    Tcp {
        decoder: codec::tcp::StreamDecoder,
        next_transaction_id: TransactionId,
    },
}

/// A Modbus client engine over an arbitrary [`Transport`].
///
/// Construct one with [`rtu::attach`] or [`tcp::attach`]. Several engines
/// may coexist in one process; nothing is shared between them.
pub struct Client<T> {
    transport: T,
    link: Link,
    config: ClientConfig,
    pool: Pool<Transaction>,
    pending: VecDeque<Handle>,
    current: Option<Handle>,
    state: ClientState,
    next_seq: u64,
    rng: XorShift64,
    metrics: Metrics,
    diag: Diagnostics,
    observer: Option<Observer>,
    outbox: Vec<u8>,
    outbox_sent: usize,
}

impl<T> std::fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let in_flight = self.pending.len() + usize::from(self.current.is_some());
        f.debug_struct("Client")
            .field("state", &self.state)
            .field("in_flight", &in_flight)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Client<T> {
    fn attach(transport: T, link: Link, config: ClientConfig) -> Self {
        Self {
            transport,
            link,
            pool: Pool::with_capacity(config.queue_capacity.max(1) + 1),
            pending: VecDeque::with_capacity(config.queue_capacity.max(1) + 1),
            current: None,
            state: ClientState::Idle,
            next_seq: 0,
            rng: XorShift64::new(config.jitter_seed),
            metrics: Metrics::default(),
            diag: Diagnostics::with_trace_depth(config.trace_depth),
            observer: None,
            outbox: Vec::with_capacity(TCP_FRAME_MAX),
            outbox_sent: 0,
            config,
        }
    }

    /// Register an observer for structured engine events.
    pub fn set_observer(&mut self, observer: Observer) {
        self.observer = Some(observer);
    }

    /// Engine counters.
    #[must_use]
    pub const fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Zero all engine counters.
    pub fn reset_metrics(&mut self) {
        self.metrics = Metrics::default();
    }

    /// Protocol diagnostics (per-FC counters, error slots, trace).
    #[must_use]
    pub const fn diagnostics(&self) -> &Diagnostics {
        &self.diag
    }

    /// Number of transactions submitted but not yet terminated.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending.len() + usize::from(self.current.is_some())
    }

    /// The engine's externally visible state.
    #[must_use]
    pub const fn state(&self) -> ClientState {
        self.state
    }

    /// Access the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Submit a request.
    ///
    /// The payload is copied into an engine-owned slot; `callback` fires
    /// exactly once with the terminal status, from inside [`Client::poll`]
    /// or from this call if the transport rejects synchronously.
    ///
    /// Broadcast requests never expect a response.
    pub fn submit(
        &mut self,
        unit: Unit,
        request: Request<'_>,
        options: CallOptions,
        callback: Callback,
    ) -> Result<Token> {
        if self.in_flight() >= self.config.queue_capacity {
            self.diag.count_error_slot(ErrorSlot::NoResources);
            return Err(Error::NoResources);
        }
        self.enqueue(unit, Some(request), options, Some(callback), false)
    }

    /// Submit a poison pill: a high-priority synthetic transaction that
    /// bypasses the capacity check, is never transmitted and finalizes
    /// with [`Status::Cancelled`] when it reaches the head of the queue.
    /// Used to drain or shut down an engine.
    pub fn poison(&mut self, callback: Option<Callback>) -> Result<Token> {
        self.enqueue(
            BROADCAST,
            None,
            CallOptions {
                high_priority: true,
                no_response: true,
                ..CallOptions::default()
            },
            callback,
            true,
        )
    }

    fn enqueue(
        &mut self,
        unit: Unit,
        request: Option<Request<'_>>,
        options: CallOptions,
        callback: Option<Callback>,
        poison: bool,
    ) -> Result<Token> {
        let now = self.transport.now();
        let function = request.map_or(FunctionCode::Custom(0), |req| req.function_code());

        let mut encoded = PduBuf::new();
        if let Some(request) = request {
            encoded.resize(PDU_MAX, 0);
            let len = request.encode(&mut encoded)?;
            encoded.truncate(len);
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let no_response = options.no_response || unit == BROADCAST || poison;
        let txn = Transaction {
            seq,
            unit_id: unit.0,
            function,
            request: encoded,
            response: PduBuf::new(),
            #[cfg(feature = "tcp")]
            transaction_id: 0,
            submitted_at: now,
            deadline: now,
            watchdog_deadline: now.wrapping_add(self.config.watchdog_ms),
            next_attempt: now,
            base_timeout: options.timeout_ms.unwrap_or(self.config.default_timeout_ms),
            base_backoff: options.backoff_ms.unwrap_or(self.config.default_backoff_ms),
            retries: 0,
            max_retries: options.max_retries.unwrap_or(self.config.default_max_retries),
            no_response,
            poison,
            callback,
        };

        let handle = self.pool.acquire(txn)?;
        self.metrics.submitted += 1;
        if !poison {
            self.diag.count_function(function);
            self.emit(Event::ClientTxSubmit { function });
        }
        if options.high_priority {
            self.pending.push_front(handle);
        } else {
            self.pending.push_back(handle);
        }

        if self.current.is_none() {
            self.start_next();
        }
        Ok(Token { handle, seq })
    }

    /// Cancel a transaction.
    ///
    /// The callback fires with [`Status::Cancelled`] before this returns.
    /// Cancelling the current transaction discards its deadline tracking;
    /// a late response is ignored. A stale token is rejected with
    /// [`Error::InvalidArgument`].
    pub fn cancel(&mut self, token: Token) -> Result<()> {
        if self
            .pool
            .get(token.handle)
            .map_or(true, |txn| txn.seq != token.seq)
        {
            return Err(Error::InvalidArgument);
        }
        if self.current == Some(token.handle) {
            self.finalize_current(Status::Cancelled);
            self.start_next();
            return Ok(());
        }
        if let Some(pos) = self.pending.iter().position(|h| *h == token.handle) {
            self.pending.remove(pos);
            self.finalize(token.handle, Status::Cancelled);
            return Ok(());
        }
        Err(Error::InvalidArgument)
    }

    /// Cancel the current in-flight transaction, if any.
    ///
    /// Its callback fires with [`Status::Cancelled`] before this
    /// returns and any late response is ignored.
    pub fn cancel_current(&mut self) -> Result<()> {
        if self.current.is_none() {
            return Err(Error::InvalidArgument);
        }
        self.finalize_current(Status::Cancelled);
        self.start_next();
        Ok(())
    }

    /// Drive the engine: pump the transport both ways, deliver any
    /// response, enforce deadlines. Non-blocking; call repeatedly from
    /// the application's main loop.
    pub fn poll(&mut self) {
        self.pump_tx();
        self.pump_rx();
        self.check_deadlines();
        if self.current.is_none() && !self.pending.is_empty() {
            self.start_next();
        }
        self.transport.yield_now();
    }

    fn start_next(&mut self) {
        while let Some(handle) = self.pending.pop_front() {
            let Some(txn) = self.pool.get(handle) else {
                continue;
            };
            if txn.poison {
                self.metrics.poison_triggers += 1;
                self.finalize(handle, Status::Cancelled);
                continue;
            }
            self.current = Some(handle);
            self.attempt_send();
            if self.current.is_some() {
                return;
            }
        }
        if self.current.is_none() {
            self.set_state(ClientState::Idle);
        }
    }

    /// Encode the current transaction into the outbox and push it into
    /// the transport. Called for the first attempt and for every retry.
    fn attempt_send(&mut self) {
        let Some(handle) = self.current else {
            return;
        };
        let now = self.transport.now();

        #[cfg(feature = "tcp")]
        let transaction_id = match &mut self.link {
            Link::Tcp {
                next_transaction_id,
                ..
            } => {
                // Non-zero, monotonically incrementing, wraps past zero.
                *next_transaction_id = next_transaction_id.checked_add(1).unwrap_or(1);
                *next_transaction_id
            }
            #[allow(unreachable_patterns)]
            _ => 0,
        };

        let mut frame = [0u8; TCP_FRAME_MAX];
        let frame_len = {
            let txn = self.pool.get_mut(handle).expect("current slot occupied");
            #[cfg(feature = "tcp")]
            {
                txn.transaction_id = transaction_id;
            }
            let unit_id = txn.unit_id;
            match &self.link {
                #[cfg(feature = "rtu")]
                Link::Rtu { .. } => codec::rtu::encode_raw(unit_id, &txn.request, &mut frame),
                #[cfg(feature = "tcp")]
                Link::Tcp { .. } => codec::tcp::encode_raw(
                    crate::frame::tcp::Header {
                        transaction_id,
                        unit_id,
                    },
                    &txn.request,
                    &mut frame,
                ),
            }
        };

        let frame_len = match frame_len {
            Ok(len) => len,
            Err(_) => {
                self.finalize_current(Status::Transport);
                return;
            }
        };

        self.outbox.clear();
        self.outbox.extend_from_slice(&frame[..frame_len]);
        self.outbox_sent = 0;
        self.pump_tx();
        if self.current.is_none() {
            // The transport rejected the frame synchronously.
            return;
        }

        let txn = self.pool.get_mut(handle).expect("current slot occupied");
        if txn.no_response {
            self.finalize_current(Status::Ok);
            return;
        }

        let timeout = scaled_timeout(
            txn.base_timeout,
            txn.retries,
            self.config.timeout_ceiling_ms,
        );
        txn.deadline = now.wrapping_add(timeout);
        self.set_state(ClientState::Waiting);
    }

    fn pump_tx(&mut self) {
        while self.outbox_sent < self.outbox.len() {
            match self.transport.send(&self.outbox[self.outbox_sent..]) {
                Ok(0) => break,
                Ok(n) => {
                    self.outbox_sent += n;
                    self.metrics.bytes_tx += n as u64;
                }
                Err(Error::Timeout) => break,
                Err(_) => {
                    self.outbox.clear();
                    self.outbox_sent = 0;
                    if self.current.is_some() {
                        self.finalize_current(Status::Transport);
                    }
                    return;
                }
            }
        }
    }

    fn pump_rx(&mut self) {
        let mut chunk = [0u8; 256];
        loop {
            match self.transport.recv(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    self.metrics.bytes_rx += n as u64;
                    match &mut self.link {
                        #[cfg(feature = "rtu")]
                        Link::Rtu { decoder } => decoder.feed(&chunk[..n]),
                        #[cfg(feature = "tcp")]
                        Link::Tcp { decoder, .. } => decoder.feed(&chunk[..n]),
                    }
                }
                Err(Error::Timeout) => break,
                Err(_) => {
                    if self.current.is_some() && self.state == ClientState::Waiting {
                        self.finalize_current(Status::Transport);
                    }
                    return;
                }
            }
        }
        self.drain_frames();
    }

    fn drain_frames(&mut self) {
        loop {
            let frame = match &mut self.link {
                #[cfg(feature = "rtu")]
                Link::Rtu { decoder } => decoder.try_decode().map(|(unit_id, pdu)| (0, unit_id, pdu)),
                #[cfg(feature = "tcp")]
                Link::Tcp { decoder, .. } => match decoder.try_decode() {
                    Ok(frame) => frame.map(|(hdr, pdu)| (hdr.transaction_id, hdr.unit_id, pdu)),
                    Err(_) => {
                        self.diag.count_error_slot(ErrorSlot::InvalidRequest);
                        if self.current.is_some() && self.state == ClientState::Waiting {
                            self.finalize_current(Status::Transport);
                        }
                        return;
                    }
                },
            };
            let Some((transaction_id, unit_id, pdu)) = frame else {
                return;
            };
            self.on_response(transaction_id, unit_id, &pdu);
        }
    }

    fn on_response(&mut self, transaction_id: u16, unit_id: UnitId, pdu: &Bytes) {
        let _ = transaction_id;
        let Some(handle) = self.current else {
            // A response with no transaction in flight: stale or foreign.
            self.diag.count_error_slot(ErrorSlot::OtherUnit);
            return;
        };
        if self.state != ClientState::Waiting {
            self.diag.count_error_slot(ErrorSlot::OtherUnit);
            return;
        }
        let txn = self.pool.get(handle).expect("current slot occupied");

        let correlated = match &self.link {
            #[cfg(feature = "rtu")]
            Link::Rtu { .. } => txn.unit_id == unit_id,
            #[cfg(feature = "tcp")]
            Link::Tcp { .. } => {
                txn.transaction_id == transaction_id && txn.unit_id == unit_id
            }
        };
        if !correlated {
            self.diag.count_error_slot(ErrorSlot::OtherUnit);
            return;
        }

        if pdu.first().is_some_and(|fc| fc & 0x80 != 0) {
            match ExceptionResponse::decode(pdu) {
                Ok(rsp) if rsp.function == txn.function => {
                    self.copy_response(handle, pdu);
                    self.record_latency(handle);
                    self.finalize_current(Status::Exception(rsp.exception));
                    self.start_next();
                }
                _ => {
                    self.diag.count_error_slot(ErrorSlot::InvalidRequest);
                }
            }
            return;
        }

        // Only a well-formed response that matches the outstanding
        // request finalizes the transaction; anything else is ignored
        // and the deadline keeps running.
        let matches = Request::decode(&txn.request)
            .and_then(|request| Response::decode_for_request(&request, pdu))
            .is_ok();
        if !matches {
            self.diag.count_error_slot(ErrorSlot::InvalidRequest);
            return;
        }
        self.copy_response(handle, pdu);
        self.record_latency(handle);
        self.finalize_current(Status::Ok);
        self.start_next();
    }

    fn copy_response(&mut self, handle: Handle, pdu: &Bytes) {
        let txn = self.pool.get_mut(handle).expect("current slot occupied");
        txn.response.clear();
        txn.response.extend_from_slice(pdu);
    }

    fn record_latency(&mut self, handle: Handle) {
        let now = self.transport.now();
        let txn = self.pool.get(handle).expect("current slot occupied");
        let latency = millis_since(now, txn.submitted_at).max(0) as u64;
        self.metrics.latency_sum_ms += latency;
        self.metrics.latency_count += 1;
    }

    fn check_deadlines(&mut self) {
        let Some(handle) = self.current else {
            return;
        };
        let now = self.transport.now();
        let txn = self.pool.get(handle).expect("current slot occupied");

        if self.config.watchdog_ms > 0 && millis_since(now, txn.watchdog_deadline) >= 0 {
            log::warn!("Watchdog tripped for transaction to unit {}", txn.unit_id);
            self.finalize_current(Status::Transport);
            self.start_next();
            return;
        }

        match self.state {
            ClientState::Waiting => {
                if millis_since(now, txn.deadline) >= 0 {
                    self.on_timeout(handle, now);
                }
            }
            ClientState::Backoff => {
                if millis_since(now, txn.next_attempt) >= 0 {
                    self.attempt_send();
                }
            }
            ClientState::Idle => {}
        }
    }

    fn on_timeout(&mut self, handle: Handle, now: Millis) {
        let config_backoff_ceiling = self.config.backoff_ceiling_ms;
        let txn = self.pool.get_mut(handle).expect("current slot occupied");
        if txn.retries >= txn.max_retries {
            self.finalize_current(Status::Timeout);
            self.start_next();
            return;
        }
        txn.retries += 1;
        self.metrics.retries += 1;
        let delay = backoff_delay(txn.base_backoff, txn.retries, config_backoff_ceiling);
        let jittered = jitter(delay, &mut self.rng);
        let txn = self.pool.get_mut(handle).expect("current slot occupied");
        txn.next_attempt = now.wrapping_add(jittered);
        log::debug!(
            "Retry {} for unit {} scheduled in {} ms",
            txn.retries,
            txn.unit_id,
            jittered
        );
        self.set_state(ClientState::Backoff);
    }

    fn finalize_current(&mut self, status: Status) {
        let Some(handle) = self.current.take() else {
            return;
        };
        self.finalize(handle, status);
    }

    fn finalize(&mut self, handle: Handle, status: Status) {
        let Ok(mut txn) = self.pool.release(handle) else {
            return;
        };
        self.metrics.completed += 1;
        match status {
            Status::Ok => {}
            Status::Timeout => {
                self.metrics.timeouts += 1;
                self.diag.count_error_slot(ErrorSlot::Timeout);
            }
            Status::Cancelled => {
                self.metrics.cancelled += 1;
                self.diag.count_error_slot(ErrorSlot::Cancelled);
            }
            Status::Transport => {
                self.metrics.errors += 1;
                self.diag.count_error_slot(ErrorSlot::Transport);
            }
            Status::Exception(_) => {
                self.metrics.errors += 1;
                self.diag.count_error_slot(ErrorSlot::Exception);
            }
        }
        let now = self.transport.now();
        self.diag.trace(
            now,
            TraceEvent::Completed {
                function: txn.function.value(),
                ok: status.is_ok(),
            },
        );
        if !txn.poison {
            self.emit(Event::ClientTxComplete {
                function: txn.function,
                status,
            });
        }

        if let Some(callback) = txn.callback.take() {
            let response = if status.is_ok() && !txn.no_response {
                Request::decode(&txn.request)
                    .ok()
                    .and_then(|request| Response::decode_for_request(&request, &txn.response).ok())
            } else {
                None
            };
            callback(Completion {
                unit_id: txn.unit_id,
                function: txn.function,
                status,
                response,
            });
        }
    }

    fn set_state(&mut self, new: ClientState) {
        if self.state == new {
            return;
        }
        let old = self.state;
        self.state = new;
        self.emit(Event::ClientStateExit(old));
        self.emit(Event::ClientStateEnter(new));
    }

    fn emit(&mut self, event: Event) {
        if let Some(observer) = &mut self.observer {
            observer(event);
        }
    }
}

/// Per-attempt timeout: `base << retries`, capped.
fn scaled_timeout(base: u32, retries: u8, ceiling: u32) -> u32 {
    base.saturating_shl(u32::from(retries)).min(ceiling.max(base))
}

/// Un-jittered delay before retry `retry`: `base << (retry - 1)`, capped.
fn backoff_delay(base: u32, retry: u8, ceiling: u32) -> u32 {
    base.saturating_shl(u32::from(retry.saturating_sub(1)))
        .min(ceiling.max(base))
}

/// Apply +/- 50% pseudorandom jitter to a delay.
fn jitter(delay: u32, rng: &mut XorShift64) -> u32 {
    if delay == 0 {
        return 0;
    }
    let half = u64::from(delay) / 2 + 1;
    let offset = rng.next() % u64::from(delay).max(1);
    (half + offset).min(u64::from(u32::MAX)) as u32
}

trait SaturatingShl {
    fn saturating_shl(self, shift: u32) -> Self;
}

impl SaturatingShl for u32 {
    fn saturating_shl(self, shift: u32) -> Self {
        if shift >= 32 || self > (u32::MAX >> shift) {
            u32::MAX
        } else {
            self << shift
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xorshift_is_deterministic() {
        let mut a = XorShift64::new(42);
        let mut b = XorShift64::new(42);
        for _ in 0..16 {
            assert_eq!(a.next(), b.next());
        }
        // A zero seed must not wedge the generator.
        let mut z = XorShift64::new(0);
        assert_ne!(z.next(), 0);
    }

    #[test]
    fn timeout_scaling_doubles_and_caps() {
        assert_eq!(scaled_timeout(50, 0, 8000), 50);
        assert_eq!(scaled_timeout(50, 1, 8000), 100);
        assert_eq!(scaled_timeout(50, 2, 8000), 200);
        assert_eq!(scaled_timeout(1000, 4, 8000), 8000);
        // Shift overflow saturates instead of wrapping.
        assert_eq!(scaled_timeout(1000, 40, u32::MAX), u32::MAX);
    }

    #[test]
    fn backoff_delay_doubles_per_retry() {
        assert_eq!(backoff_delay(100, 1, 10_000), 100);
        assert_eq!(backoff_delay(100, 2, 10_000), 200);
        assert_eq!(backoff_delay(100, 3, 10_000), 400);
        assert_eq!(backoff_delay(100, 10, 10_000), 10_000);
    }

    #[test]
    fn jitter_stays_within_half_delay_window() {
        let mut rng = XorShift64::new(7);
        for _ in 0..1000 {
            let delay = 100;
            let jittered = jitter(delay, &mut rng);
            // [delay/2, 3*delay/2] inclusive of rounding slack.
            assert!(jittered >= 50, "jittered delay {jittered} below window");
            assert!(jittered <= 151, "jittered delay {jittered} above window");
        }
    }

    #[test]
    fn jitter_of_zero_delay() {
        let mut rng = XorShift64::new(7);
        assert_eq!(jitter(0, &mut rng), 0);
    }
}
