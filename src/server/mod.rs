// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server role: request dispatch against a register map.
//!
//! [`ServerCore`] is the framing-independent heart: one decoded request
//! PDU in, one response PDU (or a suppressed broadcast) out. The RTU
//! pipeline in [`rtu`] drives it through the receive state machine; the
//! TCP glue in [`tcp`] feeds it per connection.

pub mod map;

#[cfg(feature = "rtu")]
pub mod rtu;

#[cfg(feature = "tcp")]
pub mod tcp;

use smallvec::SmallVec;

use crate::{
    diag::Diagnostics,
    error::ErrorSlot,
    frame::{
        Coils, DeviceId, DeviceIdCode, Exception, ExceptionResponse, FunctionCode, ObjectId,
        Request, Response, ServerId, Words, PDU_MAX,
    },
    observer::{Event, Observer},
    unit::{Unit, UnitId, BROADCAST},
};

use map::{Region, RegionKind, RegisterMap};

/// One device identification object served by FC 0x2B.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdObjectDef {
    pub id: ObjectId,
    pub value: Vec<u8>,
}

impl DeviceIdObjectDef {
    #[must_use]
    pub fn new(id: ObjectId, value: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            value: value.into(),
        }
    }
}

/// Tunables of a server.
#[derive(Debug)]
pub struct ServerConfig {
    /// The unit this server answers for.
    pub unit: Unit,
    /// An additional accepted address, e.g. a bootloader hook.
    pub secondary_unit: Option<Unit>,
    /// Payload of FC 0x11 (report server id).
    pub server_id: Vec<u8>,
    /// Run indicator reported by FC 0x11.
    pub run_indicator: bool,
    /// Objects served by FC 0x2B, sorted by object id.
    pub device_id: Vec<DeviceIdObjectDef>,
    /// Conformity level reported by FC 0x2B.
    pub conformity: u8,
    /// Frame-level failures in a row before the transport is considered
    /// broken.
    pub max_consecutive_errors: u32,
    /// Depth of the diagnostics trace ring (zero disables tracing).
    pub trace_depth: usize,
    /// Capacity of the receive pipeline's event queue.
    pub event_queue_size: usize,
    /// Capacity of the request record pool.
    pub request_pool_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            unit: Unit(1),
            secondary_unit: None,
            server_id: b"modbuscore".to_vec(),
            run_indicator: true,
            device_id: Vec::new(),
            conformity: 0x81,
            max_consecutive_errors: 8,
            trace_depth: 0,
            event_queue_size: 16,
            request_pool_size: 4,
        }
    }
}

/// Owned response PDU buffer.
pub type RspBuf = SmallVec<[u8; 256]>;

/// Object ids covered by each stream access level.
fn stream_limit(code: DeviceIdCode) -> ObjectId {
    match code {
        DeviceIdCode::BasicStream => 0x02,
        DeviceIdCode::RegularStream => 0x06,
        DeviceIdCode::ExtendedStream | DeviceIdCode::Specific => 0xFF,
    }
}

/// The framing-independent server core: mapping, dispatch, exception
/// emission and diagnostics.
pub struct ServerCore {
    config: ServerConfig,
    map: RegisterMap,
    diag: Diagnostics,
    observer: Option<Observer>,
    exception_status: u8,
    scratch_bits: Vec<bool>,
    scratch_words: Vec<u16>,
    scratch_pack: [u8; 256],
    scratch_objects: Vec<u8>,
}

impl std::fmt::Debug for ServerCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerCore")
            .field("unit", &self.config.unit)
            .field("regions", &self.map.region_count())
            .finish_non_exhaustive()
    }
}

impl ServerCore {
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let mut config = config;
        config.device_id.sort_by_key(|object| object.id);
        Self {
            diag: Diagnostics::with_trace_depth(config.trace_depth),
            config,
            map: RegisterMap::new(),
            observer: None,
            exception_status: 0,
            scratch_bits: Vec::new(),
            scratch_words: Vec::new(),
            scratch_pack: [0; 256],
            scratch_objects: Vec::new(),
        }
    }

    /// Register a mapping region.
    pub fn add_region(&mut self, region: Region) -> Result<(), Region> {
        self.map.add(region)
    }

    /// The mapping table. Mutate only while no request is in flight.
    pub fn map_mut(&mut self) -> &mut RegisterMap {
        &mut self.map
    }

    /// Protocol diagnostics.
    #[must_use]
    pub const fn diagnostics(&self) -> &Diagnostics {
        &self.diag
    }

    /// Mutable diagnostics access for the framing layer.
    pub(crate) fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diag
    }

    /// Register an observer for structured server events.
    pub fn set_observer(&mut self, observer: Observer) {
        self.observer = Some(observer);
    }

    /// Set the byte returned by FC 0x07.
    pub fn set_exception_status(&mut self, status: u8) {
        self.exception_status = status;
    }

    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Address filter: is this frame for us, and is it a broadcast?
    ///
    /// Returns `None` for frames addressed to other units.
    #[must_use]
    pub fn accepts_unit(&self, unit_id: UnitId) -> Option<bool> {
        let unit = Unit(unit_id);
        if unit == BROADCAST {
            return Some(true);
        }
        if unit == self.config.unit || Some(unit) == self.config.secondary_unit {
            return Some(false);
        }
        None
    }

    /// Process one request PDU.
    ///
    /// Returns the response PDU to transmit, or `None` when no response
    /// must be sent (broadcast, or an unanswerable frame).
    pub fn handle(&mut self, unit_id: UnitId, broadcast: bool, pdu: &[u8]) -> Option<RspBuf> {
        let Some(&fn_code) = pdu.first() else {
            self.diag.count_error_slot(ErrorSlot::InvalidRequest);
            return None;
        };
        if fn_code >= 0x80 {
            // A request never carries the exception bit.
            self.diag.count_error_slot(ErrorSlot::InvalidRequest);
            return None;
        }
        let function = FunctionCode::new(fn_code);
        self.diag.count_function(function);
        self.emit(Event::ServerRequestAccept { unit_id, function });

        let mut rsp = RspBuf::new();
        rsp.resize(PDU_MAX, 0);
        let result = self.dispatch(pdu, &mut rsp);
        match result {
            Ok(len) => rsp.truncate(len),
            Err(exception) => {
                self.diag.count_error_slot(ErrorSlot::Exception);
                let ex = ExceptionResponse {
                    function,
                    exception,
                };
                let len = ex
                    .encode(&mut rsp)
                    .expect("exception response always fits");
                rsp.truncate(len);
            }
        }
        self.emit(Event::ServerRequestComplete {
            unit_id,
            function,
            result: result.map(|_| ()),
        });

        if broadcast {
            // Broadcast frames are executed but never answered.
            return None;
        }
        Some(rsp)
    }

    fn dispatch(&mut self, pdu: &[u8], out: &mut [u8]) -> Result<usize, Exception> {
        let request = Request::decode(pdu).map_err(|_| Exception::IllegalDataValue)?;
        let encoded = match request {
            Request::ReadCoils(start, quantity) => {
                self.read_bits_into(RegionKind::Coil, start, quantity)?;
                let coils = Coils::pack(&self.scratch_bits, &mut self.scratch_pack)
                    .ok_or(Exception::ServerDeviceFailure)?;
                Response::ReadCoils(coils)
                    .encode(out)
                    .map_err(|_| Exception::ServerDeviceFailure)?
            }
            Request::ReadDiscreteInputs(start, quantity) => {
                self.read_bits_into(RegionKind::DiscreteInput, start, quantity)?;
                let coils = Coils::pack(&self.scratch_bits, &mut self.scratch_pack)
                    .ok_or(Exception::ServerDeviceFailure)?;
                Response::ReadDiscreteInputs(coils)
                    .encode(out)
                    .map_err(|_| Exception::ServerDeviceFailure)?
            }
            Request::ReadHoldingRegisters(start, quantity) => {
                self.read_words_into(RegionKind::HoldingRegister, start, quantity)?;
                let words = Words::pack(&self.scratch_words, &mut self.scratch_pack)
                    .ok_or(Exception::ServerDeviceFailure)?;
                Response::ReadHoldingRegisters(words)
                    .encode(out)
                    .map_err(|_| Exception::ServerDeviceFailure)?
            }
            Request::ReadInputRegisters(start, quantity) => {
                self.read_words_into(RegionKind::InputRegister, start, quantity)?;
                let words = Words::pack(&self.scratch_words, &mut self.scratch_pack)
                    .ok_or(Exception::ServerDeviceFailure)?;
                Response::ReadInputRegisters(words)
                    .encode(out)
                    .map_err(|_| Exception::ServerDeviceFailure)?
            }
            Request::WriteSingleCoil(address, state) => {
                self.map.write_bit(address, state)?;
                Response::WriteSingleCoil(address, state)
                    .encode(out)
                    .map_err(|_| Exception::ServerDeviceFailure)?
            }
            Request::WriteSingleRegister(address, value) => {
                self.map.write_word(address, value)?;
                Response::WriteSingleRegister(address, value)
                    .encode(out)
                    .map_err(|_| Exception::ServerDeviceFailure)?
            }
            Request::ReadExceptionStatus => Response::ReadExceptionStatus(self.exception_status)
                .encode(out)
                .map_err(|_| Exception::ServerDeviceFailure)?,
            Request::WriteMultipleCoils(start, coils) => {
                self.map.check_bit_span(start, coils.len())?;
                for (offset, state) in coils.iter().enumerate() {
                    self.map.write_bit(start + offset as u16, state)?;
                }
                Response::WriteMultipleCoils(start, coils.len())
                    .encode(out)
                    .map_err(|_| Exception::ServerDeviceFailure)?
            }
            Request::WriteMultipleRegisters(start, words) => {
                self.map.check_word_span(start, words.len())?;
                for (offset, value) in words.iter().enumerate() {
                    self.map.write_word(start + offset as u16, value)?;
                }
                Response::WriteMultipleRegisters(start, words.len())
                    .encode(out)
                    .map_err(|_| Exception::ServerDeviceFailure)?
            }
            Request::ReportServerId => Response::ReportServerId(ServerId {
                id: &self.config.server_id,
                run_indicator: self.config.run_indicator,
            })
            .encode(out)
            .map_err(|_| Exception::ServerDeviceFailure)?,
            Request::MaskWriteRegister(address, and_mask, or_mask) => {
                let value = self.map.read_word(address)?;
                let masked = (value & and_mask) | (or_mask & !and_mask);
                self.map.write_word(address, masked)?;
                Response::MaskWriteRegister(address, and_mask, or_mask)
                    .encode(out)
                    .map_err(|_| Exception::ServerDeviceFailure)?
            }
            Request::ReadWriteMultipleRegisters(read_start, read_quantity, write_start, words) => {
                // The write part executes first.
                self.map.check_word_span(write_start, words.len())?;
                for (offset, value) in words.iter().enumerate() {
                    self.map.write_word(write_start + offset as u16, value)?;
                }
                self.read_words_into(RegionKind::HoldingRegister, read_start, read_quantity)?;
                let words = Words::pack(&self.scratch_words, &mut self.scratch_pack)
                    .ok_or(Exception::ServerDeviceFailure)?;
                Response::ReadWriteMultipleRegisters(words)
                    .encode(out)
                    .map_err(|_| Exception::ServerDeviceFailure)?
            }
            Request::ReadDeviceId(code, object_id) => {
                let response = self.device_id_response(code, object_id)?;
                response
                    .encode(out)
                    .map_err(|_| Exception::ServerDeviceFailure)?
            }
            Request::Custom(_, _) => return Err(Exception::IllegalFunction),
        };
        Ok(encoded)
    }

    fn read_bits_into(
        &mut self,
        kind: RegionKind,
        start: u16,
        quantity: u16,
    ) -> Result<(), Exception> {
        self.map
            .read_bits(kind, start, quantity, &mut self.scratch_bits)
    }

    fn read_words_into(
        &mut self,
        kind: RegionKind,
        start: u16,
        quantity: u16,
    ) -> Result<(), Exception> {
        self.map
            .read_words(kind, start, quantity, &mut self.scratch_words)
    }

    /// Assemble a device identification response, paginating with "more
    /// follows" when the object list exceeds one frame.
    fn device_id_response(
        &mut self,
        code: DeviceIdCode,
        object_id: ObjectId,
    ) -> Result<Response<'_>, Exception> {
        let objects = &self.config.device_id;
        self.scratch_objects.clear();

        if code == DeviceIdCode::Specific {
            let object = objects
                .iter()
                .find(|object| object.id == object_id)
                .ok_or(Exception::IllegalDataAddress)?;
            self.scratch_objects.push(object.id);
            self.scratch_objects.push(object.value.len() as u8);
            self.scratch_objects.extend_from_slice(&object.value);
            return Ok(Response::ReadDeviceId(DeviceId {
                code,
                conformity: self.config.conformity,
                more_follows: false,
                next_object_id: 0,
                object_count: 1,
                objects: &self.scratch_objects,
            }));
        }

        let limit = stream_limit(code);
        let mut selected = objects
            .iter()
            .filter(|object| object.id >= object_id && object.id <= limit)
            .peekable();
        if selected.peek().is_none() {
            return Err(Exception::IllegalDataAddress);
        }

        // 7 bytes of fixed response fields precede the object list.
        let mut budget = PDU_MAX - 7;
        let mut count: u8 = 0;
        let mut more_follows = false;
        let mut next_object_id = 0;
        for object in selected {
            let needed = 2 + object.value.len();
            if needed > budget || count == u8::MAX {
                more_follows = true;
                next_object_id = object.id;
                break;
            }
            self.scratch_objects.push(object.id);
            self.scratch_objects.push(object.value.len() as u8);
            self.scratch_objects.extend_from_slice(&object.value);
            budget -= needed;
            count += 1;
        }

        Ok(Response::ReadDeviceId(DeviceId {
            code,
            conformity: self.config.conformity,
            more_follows,
            next_object_id,
            object_count: count,
            objects: &self.scratch_objects,
        }))
    }

    fn emit(&mut self, event: Event) {
        if let Some(observer) = &mut self.observer {
            observer(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core_with_data() -> ServerCore {
        let mut core = ServerCore::new(ServerConfig {
            unit: Unit(1),
            device_id: vec![
                DeviceIdObjectDef::new(0x00, b"ACME".as_slice()),
                DeviceIdObjectDef::new(0x01, b"widget".as_slice()),
                DeviceIdObjectDef::new(0x02, b"v1.2".as_slice()),
                DeviceIdObjectDef::new(0x03, b"docs".as_slice()),
            ],
            ..ServerConfig::default()
        });
        core.add_region(Region::holding(0, (0u16..10).collect()))
            .unwrap();
        core.add_region(Region::input(0, vec![0x1111, 0x2222])).unwrap();
        core.add_region(Region::coils(0, vec![true, false, true, false]))
            .unwrap();
        core.add_region(Region::discrete(0, vec![false, true])).unwrap();
        core
    }

    fn handle(core: &mut ServerCore, pdu: &[u8]) -> Vec<u8> {
        core.handle(1, false, pdu).expect("response expected").to_vec()
    }

    #[test]
    fn unit_filtering() {
        let core = core_with_data();
        assert_eq!(core.accepts_unit(1), Some(false));
        assert_eq!(core.accepts_unit(0), Some(true));
        assert_eq!(core.accepts_unit(2), None);

        let mut core = ServerCore::new(ServerConfig {
            unit: Unit(1),
            secondary_unit: Some(Unit(200)),
            ..ServerConfig::default()
        });
        assert_eq!(core.accepts_unit(200), Some(false));
        core.config.secondary_unit = None;
        assert_eq!(core.accepts_unit(200), None);
    }

    #[test]
    fn read_holding_registers() {
        let mut core = core_with_data();
        let rsp = handle(&mut core, &[0x03, 0x00, 0x00, 0x00, 0x0A]);
        let mut expected = vec![0x03, 0x14];
        for value in 0u16..10 {
            expected.push((value >> 8) as u8);
            expected.push((value & 0xFF) as u8);
        }
        assert_eq!(rsp, expected);
    }

    #[test]
    fn read_coils_packs_bits() {
        let mut core = core_with_data();
        let rsp = handle(&mut core, &[0x01, 0x00, 0x00, 0x00, 0x04]);
        assert_eq!(rsp, vec![0x01, 0x01, 0b_0000_0101]);
    }

    #[test]
    fn read_discrete_inputs() {
        let mut core = core_with_data();
        let rsp = handle(&mut core, &[0x02, 0x00, 0x00, 0x00, 0x02]);
        assert_eq!(rsp, vec![0x02, 0x01, 0b_0000_0010]);
    }

    #[test]
    fn read_input_registers() {
        let mut core = core_with_data();
        let rsp = handle(&mut core, &[0x04, 0x00, 0x00, 0x00, 0x02]);
        assert_eq!(rsp, vec![0x04, 0x04, 0x11, 0x11, 0x22, 0x22]);
    }

    #[test]
    fn write_single_register_echoes() {
        let mut core = core_with_data();
        let rsp = handle(&mut core, &[0x06, 0x00, 0x03, 0xAB, 0xCD]);
        assert_eq!(rsp, vec![0x06, 0x00, 0x03, 0xAB, 0xCD]);
        assert_eq!(core.map_mut().read_word(3).unwrap(), 0xABCD);
    }

    #[test]
    fn write_single_coil_echoes() {
        let mut core = core_with_data();
        let rsp = handle(&mut core, &[0x05, 0x00, 0x01, 0xFF, 0x00]);
        assert_eq!(rsp, vec![0x05, 0x00, 0x01, 0xFF, 0x00]);
    }

    #[test]
    fn write_multiple_registers() {
        let mut core = core_with_data();
        let rsp = handle(
            &mut core,
            &[0x10, 0x00, 0x02, 0x00, 0x02, 0x04, 0x12, 0x34, 0x56, 0x78],
        );
        assert_eq!(rsp, vec![0x10, 0x00, 0x02, 0x00, 0x02]);
        assert_eq!(core.map_mut().read_word(2).unwrap(), 0x1234);
        assert_eq!(core.map_mut().read_word(3).unwrap(), 0x5678);
    }

    #[test]
    fn write_multiple_coils() {
        let mut core = core_with_data();
        let rsp = handle(&mut core, &[0x0F, 0x00, 0x00, 0x00, 0x04, 0x01, 0b_1111]);
        assert_eq!(rsp, vec![0x0F, 0x00, 0x00, 0x00, 0x04]);
        let mut out = Vec::new();
        core.map_mut()
            .read_bits(RegionKind::Coil, 0, 4, &mut out)
            .unwrap();
        assert_eq!(out, vec![true; 4]);
    }

    #[test]
    fn mask_write_register() {
        let mut core = core_with_data();
        core.map_mut().write_word(4, 0x0012).unwrap();
        // V' = (V & and) | (or & !and)
        let rsp = handle(&mut core, &[0x16, 0x00, 0x04, 0x00, 0xF2, 0x00, 0x25]);
        assert_eq!(rsp, vec![0x16, 0x00, 0x04, 0x00, 0xF2, 0x00, 0x25]);
        assert_eq!(core.map_mut().read_word(4).unwrap(), 0x0017);
    }

    #[test]
    fn read_write_multiple_executes_write_first() {
        let mut core = core_with_data();
        // Write 0xBEEF to address 0, read address 0: the read must see
        // the new value.
        let rsp = handle(
            &mut core,
            &[0x17, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x02, 0xBE, 0xEF],
        );
        assert_eq!(rsp, vec![0x17, 0x02, 0xBE, 0xEF]);
    }

    #[test]
    fn read_exception_status() {
        let mut core = core_with_data();
        core.set_exception_status(0x55);
        let rsp = handle(&mut core, &[0x07]);
        assert_eq!(rsp, vec![0x07, 0x55]);
    }

    #[test]
    fn report_server_id() {
        let mut core = core_with_data();
        let rsp = handle(&mut core, &[0x11]);
        let mut expected = vec![0x11, (b"modbuscore".len() + 1) as u8];
        expected.extend_from_slice(b"modbuscore");
        expected.push(0xFF);
        assert_eq!(rsp, expected);
    }

    #[test]
    fn unknown_function_yields_illegal_function() {
        let mut core = core_with_data();
        let rsp = handle(&mut core, &[0x55, 0x01, 0x02]);
        assert_eq!(rsp, vec![0xD5, 0x01]);
    }

    #[test]
    fn unmapped_address_yields_illegal_data_address() {
        let mut core = core_with_data();
        let rsp = handle(&mut core, &[0x06, 0x99, 0x99, 0x00, 0x01]);
        assert_eq!(rsp, vec![0x86, 0x02]);
    }

    #[test]
    fn bad_quantity_yields_illegal_data_value() {
        let mut core = core_with_data();
        // Quantity zero is out of domain.
        let rsp = handle(&mut core, &[0x03, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(rsp, vec![0x83, 0x03]);
    }

    #[test]
    fn read_only_region_rejects_writes() {
        let mut core = ServerCore::new(ServerConfig::default());
        core.add_region(Region::holding(0, vec![7]).read_only())
            .unwrap();
        let rsp = handle(&mut core, &[0x06, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(rsp, vec![0x86, 0x02]);
        // The stored value is untouched.
        assert_eq!(core.map_mut().read_word(0).unwrap(), 7);
    }

    #[test]
    fn hook_failure_yields_server_device_failure() {
        let mut core = ServerCore::new(ServerConfig::default());
        core.add_region(
            Region::holding(0, vec![0]).on_write_word(Box::new(|_, _| {
                Err(Exception::ServerDeviceFailure)
            })),
        )
        .unwrap();
        let rsp = handle(&mut core, &[0x06, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(rsp, vec![0x86, 0x04]);
    }

    #[test]
    fn broadcast_suppresses_response_but_executes() {
        let mut core = core_with_data();
        let rsp = core.handle(0, true, &[0x06, 0x00, 0x00, 0x12, 0x34]);
        assert!(rsp.is_none());
        assert_eq!(core.map_mut().read_word(0).unwrap(), 0x1234);
        // Exceptions are suppressed for broadcast as well.
        let rsp = core.handle(0, true, &[0x06, 0x99, 0x99, 0x00, 0x01]);
        assert!(rsp.is_none());
    }

    #[test]
    fn device_id_basic_stream() {
        let mut core = core_with_data();
        let rsp = handle(&mut core, &[0x2B, 0x0E, 0x01, 0x00]);
        assert_eq!(&rsp[..7], &[0x2B, 0x0E, 0x01, 0x81, 0x00, 0x00, 0x03]);
        let decoded = Response::decode(&rsp).unwrap();
        let Response::ReadDeviceId(device_id) = decoded else {
            panic!("unexpected response");
        };
        let objects: Vec<_> = device_id.objects().collect();
        assert_eq!(objects.len(), 3);
        assert_eq!(objects[0], (0x00, &b"ACME"[..]));
        assert_eq!(objects[2], (0x02, &b"v1.2"[..]));
    }

    #[test]
    fn device_id_regular_stream_covers_extended_ids() {
        let mut core = core_with_data();
        let rsp = handle(&mut core, &[0x2B, 0x0E, 0x02, 0x00]);
        let Response::ReadDeviceId(device_id) = Response::decode(&rsp).unwrap() else {
            panic!("unexpected response");
        };
        assert_eq!(device_id.object_count, 4);
        assert!(!device_id.more_follows);
    }

    #[test]
    fn device_id_specific_object() {
        let mut core = core_with_data();
        let rsp = handle(&mut core, &[0x2B, 0x0E, 0x04, 0x02]);
        let Response::ReadDeviceId(device_id) = Response::decode(&rsp).unwrap() else {
            panic!("unexpected response");
        };
        let objects: Vec<_> = device_id.objects().collect();
        assert_eq!(objects, vec![(0x02, &b"v1.2"[..])]);

        // A missing object id is an addressing error.
        let rsp = handle(&mut core, &[0x2B, 0x0E, 0x04, 0x42]);
        assert_eq!(rsp, vec![0xAB, 0x02]);
    }

    #[test]
    fn device_id_paginates_with_more_follows() {
        let mut config = ServerConfig::default();
        // Three objects of 100 bytes each cannot fit one frame.
        for id in 0..3 {
            config
                .device_id
                .push(DeviceIdObjectDef::new(id, vec![b'x'; 100]));
        }
        let mut core = ServerCore::new(config);

        let rsp = handle(&mut core, &[0x2B, 0x0E, 0x01, 0x00]);
        let Response::ReadDeviceId(first) = Response::decode(&rsp).unwrap() else {
            panic!("unexpected response");
        };
        assert!(first.more_follows);
        assert_eq!(first.object_count, 2);
        assert_eq!(first.next_object_id, 2);

        // The continuation request picks up at the announced object.
        let rsp = handle(&mut core, &[0x2B, 0x0E, 0x01, 0x02]);
        let Response::ReadDeviceId(second) = Response::decode(&rsp).unwrap() else {
            panic!("unexpected response");
        };
        assert!(!second.more_follows);
        assert_eq!(second.object_count, 1);
        let objects: Vec<_> = second.objects().collect();
        assert_eq!(objects[0].0, 2);
    }

    #[test]
    fn exactly_one_response_per_request() {
        use std::sync::{Arc, Mutex};

        let mut core = core_with_data();
        let counters = Arc::new(Mutex::new((0u32, 0u32)));
        let capture = Arc::clone(&counters);
        core.set_observer(Box::new(move |event| {
            let mut counters = capture.lock().unwrap();
            match event {
                Event::ServerRequestAccept { .. } => counters.0 += 1,
                Event::ServerRequestComplete { .. } => counters.1 += 1,
                _ => {}
            }
        }));
        for _ in 0..3 {
            handle(&mut core, &[0x03, 0x00, 0x00, 0x00, 0x01]);
        }
        assert_eq!(*counters.lock().unwrap(), (3, 3));
        let snapshot = core.diagnostics().snapshot();
        assert_eq!(snapshot.function(FunctionCode::ReadHoldingRegisters), 3);
    }
}
