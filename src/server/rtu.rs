// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RTU server: the receive pipeline state machine over a serial
//! transport.
//!
//! Frames complete on inter-frame silence (3.5 character times at the
//! configured baud rate). A completed frame walks the pipeline states
//! one event at a time: address filter, function parse, dispatch,
//! validation, response staging, CRC, transmission. Frame-level failures
//! divert to the error state, which recovers back to idle and counts
//! toward a consecutive-error bound.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::{
    codec::{
        dup::{DupFilterConfig, DuplicateFilter},
        rtu::{crc16, Direction, ResyncStats, StreamDecoder},
    },
    error::ErrorSlot,
    fsm::{EventId, Fsm, FsmContext, State, StateId, Transition},
    frame::PDU_MAX,
    observer::Observer,
    pool::{Handle, Pool},
    transport::{millis_since, Millis, Transport},
    unit::UnitId,
};

use super::{RspBuf, ServerConfig, ServerCore};

pub const ST_IDLE: StateId = 0;
pub const ST_RECEIVING: StateId = 1;
pub const ST_PARSING_ADDRESS: StateId = 2;
pub const ST_PARSING_FUNCTION: StateId = 3;
pub const ST_PROCESSING: StateId = 4;
pub const ST_VALIDATING_FRAME: StateId = 5;
pub const ST_BUILDING_RESPONSE: StateId = 6;
pub const ST_PUTTING_DATA: StateId = 7;
pub const ST_CALCULATING_CRC: StateId = 8;
pub const ST_SENDING: StateId = 9;
pub const ST_ERROR: StateId = 10;

const EV_RX_BYTE: EventId = 0;
const EV_FRAME_COMPLETE: EventId = 1;
const EV_ADDRESS_MATCH: EventId = 2;
const EV_ADDRESS_OTHER: EventId = 3;
const EV_FUNCTION_PARSED: EventId = 4;
const EV_PROCESSED: EventId = 5;
const EV_FRAME_VALID: EventId = 6;
const EV_RESPONSE_READY: EventId = 7;
const EV_DATA_STAGED: EventId = 8;
const EV_CRC_APPENDED: EventId = 9;
const EV_TX_DONE: EventId = 10;
const EV_FAULT: EventId = 11;
const EV_RECOVERED: EventId = 12;

/// One in-flight request, allocated from the record pool on frame
/// completion and released on response send or broadcast suppression.
#[derive(Debug)]
struct RequestRecord {
    unit_id: UnitId,
    broadcast: bool,
    pdu: Bytes,
}

/// The mutable working set the pipeline actions operate on.
pub struct PipelineCtx {
    core: ServerCore,
    records: Pool<RequestRecord>,
    record: Option<Handle>,
    rsp: Option<RspBuf>,
    outbox: Vec<u8>,
    suppress: bool,
    tx_ready: bool,
    consecutive_errors: u32,
    fault_slot: Option<ErrorSlot>,
    emitted: VecDeque<EventId>,
}

impl std::fmt::Debug for PipelineCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCtx")
            .field("record", &self.record)
            .field("tx_ready", &self.tx_ready)
            .field("consecutive_errors", &self.consecutive_errors)
            .finish_non_exhaustive()
    }
}

impl FsmContext for PipelineCtx {
    fn take_emitted(&mut self) -> Option<EventId> {
        self.emitted.pop_front()
    }
}

impl PipelineCtx {
    fn emit(&mut self, event: EventId) {
        self.emitted.push_back(event);
    }

    fn fault(&mut self, slot: ErrorSlot) {
        self.fault_slot = Some(slot);
        self.emit(EV_FAULT);
    }

    fn release_record(&mut self) {
        if let Some(handle) = self.record.take() {
            let _ = self.records.release(handle);
        }
    }
}

fn act_parse_address(ctx: &mut PipelineCtx) {
    let Some(handle) = ctx.record else {
        ctx.fault(ErrorSlot::InvalidRequest);
        return;
    };
    let unit_id = ctx.records.get(handle).map(|rec| rec.unit_id);
    let Some(unit_id) = unit_id else {
        ctx.fault(ErrorSlot::InvalidRequest);
        return;
    };
    match ctx.core.accepts_unit(unit_id) {
        Some(broadcast) => {
            if let Some(rec) = ctx.records.get_mut(handle) {
                rec.broadcast = broadcast;
            }
            ctx.emit(EV_ADDRESS_MATCH);
        }
        None => {
            // Addressed to someone else: silent discard.
            ctx.core
                .diagnostics_mut()
                .count_error_slot(ErrorSlot::OtherUnit);
            ctx.release_record();
            ctx.emit(EV_ADDRESS_OTHER);
        }
    }
}

fn act_parse_function(ctx: &mut PipelineCtx) {
    let valid = ctx
        .record
        .and_then(|handle| ctx.records.get(handle))
        .and_then(|rec| rec.pdu.first())
        .is_some_and(|fn_code| *fn_code < 0x80);
    if valid {
        ctx.emit(EV_FUNCTION_PARSED);
    } else {
        ctx.fault(ErrorSlot::InvalidRequest);
    }
}

fn act_process(ctx: &mut PipelineCtx) {
    let Some(handle) = ctx.record else {
        ctx.fault(ErrorSlot::InvalidRequest);
        return;
    };
    let Some(rec) = ctx.records.get(handle) else {
        ctx.fault(ErrorSlot::InvalidRequest);
        return;
    };
    let unit_id = rec.unit_id;
    let broadcast = rec.broadcast;
    let pdu = rec.pdu.clone();
    let rsp = ctx.core.handle(unit_id, broadcast, &pdu);
    ctx.suppress = rsp.is_none();
    ctx.rsp = rsp;
    ctx.emit(EV_PROCESSED);
}

fn act_validate(ctx: &mut PipelineCtx) {
    let ok = match &ctx.rsp {
        Some(rsp) => !rsp.is_empty() && rsp.len() <= PDU_MAX,
        None => ctx.suppress,
    };
    if ok {
        ctx.emit(EV_FRAME_VALID);
    } else {
        ctx.fault(ErrorSlot::InvalidRequest);
    }
}

fn act_build_response(ctx: &mut PipelineCtx) {
    ctx.outbox.clear();
    if !ctx.suppress {
        let unit_id = ctx
            .record
            .and_then(|handle| ctx.records.get(handle))
            .map(|rec| rec.unit_id);
        let Some(unit_id) = unit_id else {
            ctx.fault(ErrorSlot::InvalidRequest);
            return;
        };
        ctx.outbox.push(unit_id);
    }
    ctx.emit(EV_RESPONSE_READY);
}

fn act_put_data(ctx: &mut PipelineCtx) {
    if !ctx.suppress {
        match &ctx.rsp {
            Some(rsp) => ctx.outbox.extend_from_slice(rsp),
            None => {
                ctx.fault(ErrorSlot::InvalidRequest);
                return;
            }
        }
    }
    ctx.emit(EV_DATA_STAGED);
}

fn act_calc_crc(ctx: &mut PipelineCtx) {
    if !ctx.suppress {
        let crc = crc16(&ctx.outbox);
        ctx.outbox.push((crc & 0xFF) as u8);
        ctx.outbox.push((crc >> 8) as u8);
    }
    ctx.emit(EV_CRC_APPENDED);
}

fn act_send(ctx: &mut PipelineCtx) {
    ctx.release_record();
    ctx.rsp = None;
    if ctx.suppress {
        // Broadcast: nothing leaves the device.
        ctx.outbox.clear();
        ctx.emit(EV_TX_DONE);
    } else {
        ctx.tx_ready = true;
    }
}

fn act_tx_done(ctx: &mut PipelineCtx) {
    ctx.tx_ready = false;
    ctx.suppress = false;
    ctx.consecutive_errors = 0;
}

fn act_enter_error(ctx: &mut PipelineCtx) {
    let slot = ctx.fault_slot.take().unwrap_or(ErrorSlot::InvalidRequest);
    ctx.core.diagnostics_mut().count_error_slot(slot);
    ctx.consecutive_errors += 1;
    ctx.release_record();
    ctx.rsp = None;
    ctx.outbox.clear();
    ctx.tx_ready = false;
    ctx.suppress = false;
    log::warn!(
        "Receive pipeline fault ({}); {} consecutive",
        slot.name(),
        ctx.consecutive_errors
    );
}

fn act_recover(ctx: &mut PipelineCtx) {
    ctx.emit(EV_RECOVERED);
}

const fn fault_row() -> Transition<PipelineCtx> {
    Transition {
        event: EV_FAULT,
        next: ST_ERROR,
        guard: None,
        action: Some(act_enter_error),
    }
}

static STATES: &[State<PipelineCtx>] = &[
    State {
        id: ST_IDLE,
        name: "idle",
        transitions: &[
            Transition {
                event: EV_RX_BYTE,
                next: ST_RECEIVING,
                guard: None,
                action: None,
            },
            Transition {
                event: EV_FRAME_COMPLETE,
                next: ST_PARSING_ADDRESS,
                guard: None,
                action: Some(act_parse_address),
            },
            fault_row(),
        ],
        default_action: None,
    },
    State {
        id: ST_RECEIVING,
        name: "receiving",
        transitions: &[
            Transition {
                event: EV_RX_BYTE,
                next: ST_RECEIVING,
                guard: None,
                action: None,
            },
            Transition {
                event: EV_FRAME_COMPLETE,
                next: ST_PARSING_ADDRESS,
                guard: None,
                action: Some(act_parse_address),
            },
            fault_row(),
        ],
        default_action: None,
    },
    State {
        id: ST_PARSING_ADDRESS,
        name: "parsing-address",
        transitions: &[
            Transition {
                event: EV_ADDRESS_MATCH,
                next: ST_PARSING_FUNCTION,
                guard: None,
                action: Some(act_parse_function),
            },
            Transition {
                event: EV_ADDRESS_OTHER,
                next: ST_IDLE,
                guard: None,
                action: None,
            },
            fault_row(),
        ],
        default_action: None,
    },
    State {
        id: ST_PARSING_FUNCTION,
        name: "parsing-function",
        transitions: &[
            Transition {
                event: EV_FUNCTION_PARSED,
                next: ST_PROCESSING,
                guard: None,
                action: Some(act_process),
            },
            fault_row(),
        ],
        default_action: None,
    },
    State {
        id: ST_PROCESSING,
        name: "processing",
        transitions: &[
            Transition {
                event: EV_PROCESSED,
                next: ST_VALIDATING_FRAME,
                guard: None,
                action: Some(act_validate),
            },
            fault_row(),
        ],
        default_action: None,
    },
    State {
        id: ST_VALIDATING_FRAME,
        name: "validating-frame",
        transitions: &[
            Transition {
                event: EV_FRAME_VALID,
                next: ST_BUILDING_RESPONSE,
                guard: None,
                action: Some(act_build_response),
            },
            fault_row(),
        ],
        default_action: None,
    },
    State {
        id: ST_BUILDING_RESPONSE,
        name: "building-response",
        transitions: &[
            Transition {
                event: EV_RESPONSE_READY,
                next: ST_PUTTING_DATA,
                guard: None,
                action: Some(act_put_data),
            },
            fault_row(),
        ],
        default_action: None,
    },
    State {
        id: ST_PUTTING_DATA,
        name: "putting-data-in-buffer",
        transitions: &[
            Transition {
                event: EV_DATA_STAGED,
                next: ST_CALCULATING_CRC,
                guard: None,
                action: Some(act_calc_crc),
            },
            fault_row(),
        ],
        default_action: None,
    },
    State {
        id: ST_CALCULATING_CRC,
        name: "calculating-crc",
        transitions: &[
            Transition {
                event: EV_CRC_APPENDED,
                next: ST_SENDING,
                guard: None,
                action: Some(act_send),
            },
            fault_row(),
        ],
        default_action: None,
    },
    State {
        id: ST_SENDING,
        name: "sending",
        transitions: &[
            Transition {
                event: EV_TX_DONE,
                next: ST_IDLE,
                guard: None,
                action: Some(act_tx_done),
            },
            fault_row(),
        ],
        default_action: None,
    },
    State {
        id: ST_ERROR,
        name: "error",
        transitions: &[Transition {
            event: EV_RECOVERED,
            next: ST_IDLE,
            guard: None,
            action: None,
        }],
        default_action: Some(act_recover),
    },
];

/// Inter-frame silence (t3.5) in milliseconds for a baud rate, assuming
/// 11-bit characters. Above 19200 baud the specification fixes it at
/// 1750 us, rounded up to the millisecond clock.
#[must_use]
pub fn silence_interval_ms(baud: u32) -> u32 {
    if baud == 0 {
        return 2;
    }
    if baud > 19_200 {
        return 2;
    }
    // 3.5 characters of 11 bits = 38.5 bit times.
    (38_500 + baud - 1) / baud
}

/// A Modbus RTU server over an arbitrary [`Transport`].
#[derive(Debug)]
pub struct RtuServer<T> {
    transport: T,
    fsm: Fsm<PipelineCtx>,
    ctx: PipelineCtx,
    decoder: StreamDecoder,
    dup: DuplicateFilter,
    dup_enabled: bool,
    silence_ms: u32,
    last_rx_at: Millis,
    outbox_sent: usize,
    max_consecutive_errors: u32,
}

impl<T: Transport> RtuServer<T> {
    /// Create a server for the given serial baud rate.
    #[must_use]
    pub fn new(transport: T, config: ServerConfig, baud: u32) -> Self {
        Self::with_dup_filter(transport, config, baud, DupFilterConfig::default())
    }

    /// Create a server with custom duplicate-filter parameters.
    #[must_use]
    pub fn with_dup_filter(
        transport: T,
        config: ServerConfig,
        baud: u32,
        dup_config: DupFilterConfig,
    ) -> Self {
        let event_queue_size = config.event_queue_size;
        let request_pool_size = config.request_pool_size;
        let max_consecutive_errors = config.max_consecutive_errors;
        let last_rx_at = transport.now();
        Self {
            transport,
            fsm: Fsm::new(STATES, ST_IDLE, event_queue_size),
            ctx: PipelineCtx {
                core: ServerCore::new(config),
                records: Pool::with_capacity(request_pool_size.max(1)),
                record: None,
                rsp: None,
                outbox: Vec::with_capacity(crate::frame::RTU_FRAME_MAX),
                suppress: false,
                tx_ready: false,
                consecutive_errors: 0,
                fault_slot: None,
                emitted: VecDeque::new(),
            },
            decoder: StreamDecoder::new(Direction::Request),
            dup: DuplicateFilter::new(dup_config),
            dup_enabled: true,
            silence_ms: silence_interval_ms(baud),
            last_rx_at,
            outbox_sent: 0,
            max_consecutive_errors,
        }
    }

    /// Disable or re-enable duplicate-frame suppression.
    pub fn set_dup_filter_enabled(&mut self, enabled: bool) {
        self.dup_enabled = enabled;
    }

    /// The framing-independent core (mapping, diagnostics, observer).
    pub fn core_mut(&mut self) -> &mut ServerCore {
        &mut self.ctx.core
    }

    #[must_use]
    pub fn core(&self) -> &ServerCore {
        &self.ctx.core
    }

    /// Register an observer for structured server events.
    pub fn set_observer(&mut self, observer: Observer) {
        self.ctx.core.set_observer(observer);
    }

    /// Current pipeline state id (see the `ST_*` constants).
    #[must_use]
    pub fn state(&self) -> StateId {
        self.fsm.state()
    }

    /// Stream reassembly statistics.
    #[must_use]
    pub fn resync_stats(&self) -> ResyncStats {
        self.decoder.stats()
    }

    /// Number of suppressed duplicate frames.
    #[must_use]
    pub fn duplicates(&self) -> u64 {
        self.dup.duplicates()
    }

    /// The configured inter-frame silence in milliseconds.
    #[must_use]
    pub const fn silence_ms(&self) -> u32 {
        self.silence_ms
    }

    /// Whether the consecutive-error bound was reached; the application
    /// should restart the carrier and call [`RtuServer::clear_errors`].
    #[must_use]
    pub fn needs_restart(&self) -> bool {
        self.ctx.consecutive_errors >= self.max_consecutive_errors
    }

    /// Reset the consecutive-error bound after a transport restart.
    pub fn clear_errors(&mut self) {
        self.ctx.consecutive_errors = 0;
        self.decoder.clear();
        let _ = self.fsm.reset_to(ST_IDLE);
    }

    /// Ingest received bytes, e.g. from an interrupt-drained chunk
    /// queue. Non-blocking.
    pub fn feed(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.decoder.feed(bytes);
        self.last_rx_at = self.transport.now();
        let _ = self.fsm.enqueue(EV_RX_BYTE);
    }

    /// Drive the server: pull bytes from the transport, promote a frame
    /// after the inter-frame silence, walk the pipeline and transmit the
    /// response. Non-blocking; call repeatedly.
    pub fn poll(&mut self) {
        self.pump_rx();
        self.promote_frame();
        self.fsm.run_to_idle(&mut self.ctx, 32);
        self.pump_tx();
        self.transport.yield_now();
    }

    fn pump_rx(&mut self) {
        let mut chunk = [0u8; 256];
        loop {
            match self.transport.recv(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    self.decoder.feed(&chunk[..n]);
                    self.last_rx_at = self.transport.now();
                    let _ = self.fsm.enqueue(EV_RX_BYTE);
                }
                Err(crate::error::Error::Timeout) => break,
                Err(_) => {
                    self.ctx.fault_slot = Some(ErrorSlot::Transport);
                    let _ = self.fsm.enqueue(EV_FAULT);
                    break;
                }
            }
        }
    }

    /// Promote a buffered frame to the pipeline once the line has been
    /// silent for t3.5.
    fn promote_frame(&mut self) {
        if self.ctx.record.is_some() {
            // One request at a time; the next frame waits.
            return;
        }
        let state = self.fsm.state();
        if state != ST_IDLE && state != ST_RECEIVING {
            // A response is still on its way out.
            return;
        }
        if self.decoder.pending() == 0 {
            return;
        }
        let now = self.transport.now();
        if millis_since(now, self.last_rx_at) < self.silence_ms as i32 {
            return;
        }
        let Some((unit_id, pdu)) = self.decoder.try_decode() else {
            return;
        };
        if self.dup_enabled && self.dup.observe(unit_id, &pdu, now) {
            self.ctx
                .core
                .diagnostics_mut()
                .count_error_slot(ErrorSlot::Duplicate);
            let _ = self.fsm.reset_to(ST_IDLE);
            return;
        }
        match self.ctx.records.acquire(RequestRecord {
            unit_id,
            broadcast: false,
            pdu,
        }) {
            Ok(handle) => {
                self.ctx.record = Some(handle);
                let _ = self.fsm.enqueue(EV_FRAME_COMPLETE);
            }
            Err(_) => {
                self.ctx
                    .core
                    .diagnostics_mut()
                    .count_error_slot(ErrorSlot::NoResources);
            }
        }
    }

    fn pump_tx(&mut self) {
        if !self.ctx.tx_ready {
            return;
        }
        while self.outbox_sent < self.ctx.outbox.len() {
            match self.transport.send(&self.ctx.outbox[self.outbox_sent..]) {
                Ok(0) => return,
                Ok(n) => self.outbox_sent += n,
                Err(crate::error::Error::Timeout) => return,
                Err(_) => {
                    self.outbox_sent = 0;
                    self.ctx.outbox.clear();
                    self.ctx.fault_slot = Some(ErrorSlot::Transport);
                    let _ = self.fsm.enqueue(EV_FAULT);
                    self.fsm.run_to_idle(&mut self.ctx, 8);
                    return;
                }
            }
        }
        self.ctx.outbox.clear();
        self.outbox_sent = 0;
        let _ = self.fsm.enqueue(EV_TX_DONE);
        self.fsm.run_to_idle(&mut self.ctx, 8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        server::{map::Region, DeviceIdObjectDef},
        transport::{MockHandle, MockTransport},
        unit::Unit,
    };

    fn frame(body: &[u8]) -> Vec<u8> {
        let mut out = body.to_vec();
        let crc = crc16(body);
        out.push((crc & 0xFF) as u8);
        out.push((crc >> 8) as u8);
        out
    }

    fn server_with_registers() -> (RtuServer<MockTransport>, MockHandle) {
        let (transport, handle) = MockTransport::new();
        let mut server = RtuServer::new(transport, ServerConfig::default(), 19_200);
        server
            .core_mut()
            .add_region(Region::holding(0, (0u16..10).collect()))
            .unwrap();
        (server, handle)
    }

    fn exchange(server: &mut RtuServer<MockTransport>, handle: &MockHandle, request: &[u8]) {
        handle.push_rx(request);
        server.poll();
        handle.advance(server.silence_ms() + 1);
        server.poll();
    }

    #[test]
    fn silence_intervals() {
        assert_eq!(silence_interval_ms(9600), 5);
        assert_eq!(silence_interval_ms(19_200), 3);
        assert_eq!(silence_interval_ms(115_200), 2);
        assert_eq!(silence_interval_ms(0), 2);
    }

    #[test]
    fn read_holding_registers_end_to_end() {
        let (mut server, handle) = server_with_registers();

        exchange(
            &mut server,
            &handle,
            &[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCD],
        );

        let mut body = vec![0x01, 0x03, 0x14];
        for value in 0u16..10 {
            body.push((value >> 8) as u8);
            body.push((value & 0xFF) as u8);
        }
        assert_eq!(handle.take_tx(), frame(&body));
        assert_eq!(server.state(), ST_IDLE);
    }

    #[test]
    fn frame_waits_for_silence() {
        let (mut server, handle) = server_with_registers();
        handle.push_rx(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCD]);
        server.poll();
        // No silence yet: the frame must not have been promoted.
        assert!(handle.take_tx().is_empty());
        assert_eq!(server.state(), ST_RECEIVING);

        handle.advance(server.silence_ms() + 1);
        server.poll();
        assert!(!handle.take_tx().is_empty());
    }

    #[test]
    fn unmapped_write_yields_exception_frame() {
        let (mut server, handle) = server_with_registers();
        let request = frame(&[0x01, 0x06, 0x99, 0x99, 0x00, 0x01]);
        exchange(&mut server, &handle, &request);
        assert_eq!(handle.take_tx(), frame(&[0x01, 0x86, 0x02]));
    }

    #[test]
    fn other_unit_is_silently_discarded() {
        let (mut server, handle) = server_with_registers();
        let request = frame(&[0x07, 0x03, 0x00, 0x00, 0x00, 0x01]);
        exchange(&mut server, &handle, &request);
        assert!(handle.take_tx().is_empty());
        assert_eq!(server.state(), ST_IDLE);
        let snapshot = server.core().diagnostics().snapshot();
        assert_eq!(snapshot.error(crate::error::ErrorSlot::OtherUnit), 1);
    }

    #[test]
    fn broadcast_writes_without_response() {
        let (mut server, handle) = server_with_registers();
        let request = frame(&[0x00, 0x06, 0x00, 0x00, 0x12, 0x34]);
        exchange(&mut server, &handle, &request);
        assert!(handle.take_tx().is_empty());
        assert_eq!(server.core_mut().map_mut().read_word(0).unwrap(), 0x1234);
        assert_eq!(server.state(), ST_IDLE);
    }

    #[test]
    fn duplicate_frame_is_suppressed_then_accepted_after_window() {
        let (mut server, handle) = server_with_registers();
        let request = frame(&[0x01, 0x06, 0x00, 0x01, 0x00, 0x2A]);

        exchange(&mut server, &handle, &request);
        assert!(!handle.take_tx().is_empty());

        // An identical frame 10 ms later is dropped.
        handle.advance(10);
        exchange(&mut server, &handle, &request);
        assert!(handle.take_tx().is_empty());
        assert_eq!(server.duplicates(), 1);

        // Past the 100 ms window it is a legitimate new request.
        handle.advance(200);
        exchange(&mut server, &handle, &request);
        assert!(!handle.take_tx().is_empty());
        assert_eq!(server.duplicates(), 1);
    }

    #[test]
    fn garbled_prefix_recovers_embedded_request() {
        let (mut server, handle) = server_with_registers();
        let mut noisy = vec![0xFF, 0xFF];
        noisy.extend_from_slice(&frame(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]));
        exchange(&mut server, &handle, &noisy);

        assert_eq!(handle.take_tx(), frame(&[0x01, 0x03, 0x02, 0x00, 0x00]));
        let stats = server.resync_stats();
        assert!(stats.bytes_discarded >= 2);
        assert_eq!(stats.frames_recovered, 1);
    }

    #[test]
    fn transport_failure_enters_and_leaves_error_state() {
        let (mut server, handle) = server_with_registers();
        handle.fail_recv(Some(crate::error::Error::Transport));
        server.poll();
        // The fault was counted and the pipeline recovered to idle.
        assert_eq!(server.state(), ST_IDLE);
        let snapshot = server.core().diagnostics().snapshot();
        assert!(snapshot.error(crate::error::ErrorSlot::Transport) >= 1);
        assert!(!server.needs_restart());
    }

    #[test]
    fn consecutive_errors_flag_restart() {
        let (mut server, handle) = server_with_registers();
        handle.fail_recv(Some(crate::error::Error::Transport));
        for _ in 0..8 {
            server.poll();
        }
        assert!(server.needs_restart());
        handle.fail_recv(None);
        server.clear_errors();
        assert!(!server.needs_restart());
    }

    #[test]
    fn device_identification_served() {
        let (transport, handle) = MockTransport::new();
        let mut server = RtuServer::new(
            transport,
            ServerConfig {
                unit: Unit(1),
                device_id: vec![
                    DeviceIdObjectDef::new(0x00, b"ACME".as_slice()),
                    DeviceIdObjectDef::new(0x01, b"pump".as_slice()),
                    DeviceIdObjectDef::new(0x02, b"v2".as_slice()),
                ],
                ..ServerConfig::default()
            },
            19_200,
        );
        let request = frame(&[0x01, 0x2B, 0x0E, 0x01, 0x00]);
        exchange(&mut server, &handle, &request);
        let wire = handle.take_tx();
        // unit, fc, mei, code, conformity, more, next, count
        assert_eq!(
            &wire[..8],
            &[0x01, 0x2B, 0x0E, 0x01, 0x81, 0x00, 0x00, 0x03]
        );
    }

    #[test]
    fn partial_send_resumes_across_polls() {
        let (mut server, handle) = server_with_registers();
        handle.set_send_limit(Some(3));
        let request = frame(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]);
        exchange(&mut server, &handle, &request);
        // Drain the remainder.
        for _ in 0..4 {
            server.poll();
        }
        assert_eq!(handle.take_tx(), frame(&[0x01, 0x03, 0x02, 0x00, 0x00]));
        assert_eq!(server.state(), ST_IDLE);
    }
}
