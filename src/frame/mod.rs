// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol data model.
//!
//! Requests and responses borrow their payload bytes from the frame they
//! were decoded from (or from caller-provided scratch while they are being
//! built), so no allocation happens on the codec paths.

#[cfg(feature = "rtu")]
pub mod rtu;

#[cfg(feature = "tcp")]
pub mod tcp;

use std::{error, fmt};

/// A Modbus protocol address is represented by 16 bit from `0` to `65535`.
///
/// This *protocol address* uses 0-based indexing, while the *coil address*
/// or *register address* is often specified as a number with 1-based
/// indexing. Consult the documentation of your devices if 1-based
/// coil/register addresses need to be converted to 0-based protocol
/// addresses by subtracting 1.
pub type Address = u16;

/// A Coil represents a single bit.
///
/// - `true` is equivalent to `ON`, `1` and `0xFF00`.
/// - `false` is equivalent to `OFF`, `0` and `0x0000`.
pub type Coil = bool;

/// Modbus uses 16 bit for its data items (big-endian representation).
pub type Word = u16;

/// Number of items to process (`0` - `65535`).
pub type Quantity = u16;

/// Object id within a device identification area.
pub type ObjectId = u8;

/// Maximum size of a PDU: one function byte plus up to 252 data bytes.
pub const PDU_MAX: usize = 253;

/// Maximum size of an RTU frame: unit id + PDU + CRC-16.
pub const RTU_FRAME_MAX: usize = 256;

/// Maximum size of an MBAP frame: 7-byte header + PDU.
pub const TCP_FRAME_MAX: usize = 260;

/// Largest quantity of bits a single read request may ask for.
pub const MAX_READ_BITS: Quantity = 2000;

/// Largest quantity of registers a single read request may ask for.
pub const MAX_READ_WORDS: Quantity = 125;

/// Largest quantity of bits a single write request may carry.
pub const MAX_WRITE_BITS: Quantity = 1968;

/// Largest quantity of registers a single write request may carry.
pub const MAX_WRITE_WORDS: Quantity = 123;

/// Largest read quantity of a combined read/write request.
pub const MAX_RW_READ_WORDS: Quantity = 125;

/// Largest write quantity of a combined read/write request.
pub const MAX_RW_WRITE_WORDS: Quantity = 121;

/// MEI type of the device identification transaction carried by FC 0x2B.
pub const MEI_DEVICE_ID: u8 = 0x0E;

/// A Modbus function code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    /// 0x01
    ReadCoils,
    /// 0x02
    ReadDiscreteInputs,
    /// 0x03
    ReadHoldingRegisters,
    /// 0x04
    ReadInputRegisters,
    /// 0x05
    WriteSingleCoil,
    /// 0x06
    WriteSingleRegister,
    /// 0x07
    ReadExceptionStatus,
    /// 0x0F
    WriteMultipleCoils,
    /// 0x10
    WriteMultipleRegisters,
    /// 0x11
    ReportServerId,
    /// 0x16
    MaskWriteRegister,
    /// 0x17
    ReadWriteMultipleRegisters,
    /// 0x2B with MEI type 0x0E
    ReadDeviceId,
    /// Any other function code, passed through unchanged.
    Custom(u8),
}

impl FunctionCode {
    /// Create a new [`FunctionCode`] from a raw function code byte.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        match value {
            0x01 => Self::ReadCoils,
            0x02 => Self::ReadDiscreteInputs,
            0x03 => Self::ReadHoldingRegisters,
            0x04 => Self::ReadInputRegisters,
            0x05 => Self::WriteSingleCoil,
            0x06 => Self::WriteSingleRegister,
            0x07 => Self::ReadExceptionStatus,
            0x0F => Self::WriteMultipleCoils,
            0x10 => Self::WriteMultipleRegisters,
            0x11 => Self::ReportServerId,
            0x16 => Self::MaskWriteRegister,
            0x17 => Self::ReadWriteMultipleRegisters,
            0x2B => Self::ReadDeviceId,
            code => Self::Custom(code),
        }
    }

    /// The raw function code byte.
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::ReadCoils => 0x01,
            Self::ReadDiscreteInputs => 0x02,
            Self::ReadHoldingRegisters => 0x03,
            Self::ReadInputRegisters => 0x04,
            Self::WriteSingleCoil => 0x05,
            Self::WriteSingleRegister => 0x06,
            Self::ReadExceptionStatus => 0x07,
            Self::WriteMultipleCoils => 0x0F,
            Self::WriteMultipleRegisters => 0x10,
            Self::ReportServerId => 0x11,
            Self::MaskWriteRegister => 0x16,
            Self::ReadWriteMultipleRegisters => 0x17,
            Self::ReadDeviceId => 0x2B,
            Self::Custom(code) => code,
        }
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:0>2X}", self.value())
    }
}

/// A borrowed view over LSB-first packed coil states.
///
/// Bit `i` of byte `j` encodes item `j * 8 + i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coils<'a> {
    pub(crate) quantity: Quantity,
    pub(crate) data: &'a [u8],
}

impl<'a> Coils<'a> {
    /// View `quantity` coil states over already packed bytes.
    #[must_use]
    pub fn new(data: &'a [u8], quantity: Quantity) -> Option<Self> {
        if data.len() < packed_bits_len(quantity) {
            return None;
        }
        Some(Self { quantity, data })
    }

    /// Pack unpacked coil states into `scratch` and return a view over it.
    #[must_use]
    pub fn pack(coils: &[Coil], scratch: &'a mut [u8]) -> Option<Self> {
        let quantity = Quantity::try_from(coils.len()).ok()?;
        let packed_len = packed_bits_len(quantity);
        if scratch.len() < packed_len {
            return None;
        }
        let scratch = &mut scratch[..packed_len];
        scratch.fill(0);
        for (i, coil) in coils.iter().enumerate() {
            if *coil {
                scratch[i / 8] |= 1 << (i % 8);
            }
        }
        Some(Self {
            quantity,
            data: scratch,
        })
    }

    /// Number of coil states in the view.
    #[must_use]
    pub const fn len(&self) -> Quantity {
        self.quantity
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.quantity == 0
    }

    /// The packed representation.
    #[must_use]
    pub const fn packed(&self) -> &'a [u8] {
        self.data
    }

    /// Number of bytes of the packed representation.
    #[must_use]
    pub const fn packed_len(&self) -> usize {
        packed_bits_len(self.quantity)
    }

    /// State of coil `idx`, if within the view.
    #[must_use]
    pub fn get(&self, idx: Quantity) -> Option<Coil> {
        if idx >= self.quantity {
            return None;
        }
        let idx = idx as usize;
        Some(self.data[idx / 8] & (1 << (idx % 8)) != 0)
    }

    /// Iterate over all coil states in the view.
    pub fn iter(&self) -> impl Iterator<Item = Coil> + 'a {
        let data = self.data;
        (0..self.quantity).map(move |i| {
            let i = i as usize;
            data[i / 8] & (1 << (i % 8)) != 0
        })
    }
}

/// Number of bytes required to pack `quantity` bit items.
#[must_use]
pub const fn packed_bits_len(quantity: Quantity) -> usize {
    (quantity as usize + 7) / 8
}

/// A borrowed view over big-endian encoded 16-bit register values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Words<'a> {
    pub(crate) quantity: Quantity,
    pub(crate) data: &'a [u8],
}

impl<'a> Words<'a> {
    /// View `quantity` registers over already encoded big-endian bytes.
    #[must_use]
    pub fn new(data: &'a [u8], quantity: Quantity) -> Option<Self> {
        if data.len() < quantity as usize * 2 {
            return None;
        }
        Some(Self { quantity, data })
    }

    /// Encode register values into `scratch` and return a view over it.
    #[must_use]
    pub fn pack(words: &[Word], scratch: &'a mut [u8]) -> Option<Self> {
        let quantity = Quantity::try_from(words.len()).ok()?;
        let len = words.len() * 2;
        if scratch.len() < len {
            return None;
        }
        let scratch = &mut scratch[..len];
        for (i, word) in words.iter().enumerate() {
            scratch[i * 2] = (word >> 8) as u8;
            scratch[i * 2 + 1] = (word & 0xFF) as u8;
        }
        Some(Self {
            quantity,
            data: scratch,
        })
    }

    /// Number of registers in the view.
    #[must_use]
    pub const fn len(&self) -> Quantity {
        self.quantity
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.quantity == 0
    }

    /// The big-endian encoded representation.
    #[must_use]
    pub const fn raw(&self) -> &'a [u8] {
        self.data
    }

    /// Value of register `idx`, if within the view.
    #[must_use]
    pub fn get(&self, idx: Quantity) -> Option<Word> {
        if idx >= self.quantity {
            return None;
        }
        let idx = idx as usize * 2;
        Some(Word::from(self.data[idx]) << 8 | Word::from(self.data[idx + 1]))
    }

    /// Iterate over all register values in the view.
    pub fn iter(&self) -> impl Iterator<Item = Word> + 'a {
        let data = self.data;
        (0..self.quantity).map(move |i| {
            let i = i as usize * 2;
            Word::from(data[i]) << 8 | Word::from(data[i + 1])
        })
    }
}

/// Read device identification access code (the *Read Device ID code* field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceIdCode {
    /// 0x01: stream access to the basic objects (0x00 - 0x02).
    BasicStream,
    /// 0x02: stream access to the regular objects (0x00 - 0x06).
    RegularStream,
    /// 0x03: stream access to the extended objects.
    ExtendedStream,
    /// 0x04: individual access to one specific object.
    Specific,
}

impl DeviceIdCode {
    /// The raw access code byte.
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::BasicStream => 0x01,
            Self::RegularStream => 0x02,
            Self::ExtendedStream => 0x03,
            Self::Specific => 0x04,
        }
    }

    /// Create a [`DeviceIdCode`] from the raw access code byte.
    #[must_use]
    pub const fn new(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::BasicStream),
            0x02 => Some(Self::RegularStream),
            0x03 => Some(Self::ExtendedStream),
            0x04 => Some(Self::Specific),
            _ => None,
        }
    }
}

/// Decoded device identification response body.
///
/// `objects` is the raw object list; iterate it with [`DeviceId::objects`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId<'a> {
    pub code: DeviceIdCode,
    pub conformity: u8,
    pub more_follows: bool,
    pub next_object_id: ObjectId,
    pub object_count: u8,
    pub(crate) objects: &'a [u8],
}

impl<'a> DeviceId<'a> {
    /// Iterate over the `(object id, value)` pairs of the response.
    pub fn objects(&self) -> DeviceIdObjects<'a> {
        DeviceIdObjects {
            remaining: self.objects,
        }
    }
}

/// Iterator over the raw object list of a device identification response.
#[derive(Debug, Clone)]
pub struct DeviceIdObjects<'a> {
    remaining: &'a [u8],
}

impl<'a> Iterator for DeviceIdObjects<'a> {
    type Item = (ObjectId, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.len() < 2 {
            return None;
        }
        let id = self.remaining[0];
        let len = usize::from(self.remaining[1]);
        if self.remaining.len() < 2 + len {
            return None;
        }
        let value = &self.remaining[2..2 + len];
        self.remaining = &self.remaining[2 + len..];
        Some((id, value))
    }
}

/// Decoded report server id response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerId<'a> {
    pub id: &'a [u8],
    pub run_indicator: bool,
}

/// A request represents a message from the client (master) to the server
/// (slave).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    ReadCoils(Address, Quantity),
    ReadDiscreteInputs(Address, Quantity),
    ReadHoldingRegisters(Address, Quantity),
    ReadInputRegisters(Address, Quantity),
    WriteSingleCoil(Address, Coil),
    WriteSingleRegister(Address, Word),
    ReadExceptionStatus,
    WriteMultipleCoils(Address, Coils<'a>),
    WriteMultipleRegisters(Address, Words<'a>),
    ReportServerId,
    MaskWriteRegister(Address, Word, Word),
    ReadWriteMultipleRegisters(Address, Quantity, Address, Words<'a>),
    ReadDeviceId(DeviceIdCode, ObjectId),
    Custom(u8, &'a [u8]),
}

impl Request<'_> {
    /// The function code of the request.
    #[must_use]
    pub const fn function_code(&self) -> FunctionCode {
        use Request::*;
        match self {
            ReadCoils(_, _) => FunctionCode::ReadCoils,
            ReadDiscreteInputs(_, _) => FunctionCode::ReadDiscreteInputs,
            ReadHoldingRegisters(_, _) => FunctionCode::ReadHoldingRegisters,
            ReadInputRegisters(_, _) => FunctionCode::ReadInputRegisters,
            WriteSingleCoil(_, _) => FunctionCode::WriteSingleCoil,
            WriteSingleRegister(_, _) => FunctionCode::WriteSingleRegister,
            ReadExceptionStatus => FunctionCode::ReadExceptionStatus,
            WriteMultipleCoils(_, _) => FunctionCode::WriteMultipleCoils,
            WriteMultipleRegisters(_, _) => FunctionCode::WriteMultipleRegisters,
            ReportServerId => FunctionCode::ReportServerId,
            MaskWriteRegister(_, _, _) => FunctionCode::MaskWriteRegister,
            ReadWriteMultipleRegisters(_, _, _, _) => FunctionCode::ReadWriteMultipleRegisters,
            ReadDeviceId(_, _) => FunctionCode::ReadDeviceId,
            Custom(code, _) => FunctionCode::Custom(*code),
        }
    }
}

/// The data of a successful request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response<'a> {
    ReadCoils(Coils<'a>),
    ReadDiscreteInputs(Coils<'a>),
    ReadHoldingRegisters(Words<'a>),
    ReadInputRegisters(Words<'a>),
    WriteSingleCoil(Address, Coil),
    WriteSingleRegister(Address, Word),
    ReadExceptionStatus(u8),
    WriteMultipleCoils(Address, Quantity),
    WriteMultipleRegisters(Address, Quantity),
    ReportServerId(ServerId<'a>),
    MaskWriteRegister(Address, Word, Word),
    ReadWriteMultipleRegisters(Words<'a>),
    ReadDeviceId(DeviceId<'a>),
    Custom(u8, &'a [u8]),
}

impl Response<'_> {
    /// The function code of the response.
    #[must_use]
    pub const fn function_code(&self) -> FunctionCode {
        use Response::*;
        match self {
            ReadCoils(_) => FunctionCode::ReadCoils,
            ReadDiscreteInputs(_) => FunctionCode::ReadDiscreteInputs,
            ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,
            ReadInputRegisters(_) => FunctionCode::ReadInputRegisters,
            WriteSingleCoil(_, _) => FunctionCode::WriteSingleCoil,
            WriteSingleRegister(_, _) => FunctionCode::WriteSingleRegister,
            ReadExceptionStatus(_) => FunctionCode::ReadExceptionStatus,
            WriteMultipleCoils(_, _) => FunctionCode::WriteMultipleCoils,
            WriteMultipleRegisters(_, _) => FunctionCode::WriteMultipleRegisters,
            ReportServerId(_) => FunctionCode::ReportServerId,
            MaskWriteRegister(_, _, _) => FunctionCode::MaskWriteRegister,
            ReadWriteMultipleRegisters(_) => FunctionCode::ReadWriteMultipleRegisters,
            ReadDeviceId(_) => FunctionCode::ReadDeviceId,
            Custom(code, _) => FunctionCode::Custom(*code),
        }
    }
}

/// A server (slave) exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Exception {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
    Acknowledge = 0x05,
    ServerDeviceBusy = 0x06,
    NegativeAcknowledge = 0x07,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetDevice = 0x0B,
}

impl Exception {
    /// Create an [`Exception`] from a raw exception code byte.
    #[must_use]
    pub const fn new(code: u8) -> Option<Self> {
        let ex = match code {
            0x01 => Self::IllegalFunction,
            0x02 => Self::IllegalDataAddress,
            0x03 => Self::IllegalDataValue,
            0x04 => Self::ServerDeviceFailure,
            0x05 => Self::Acknowledge,
            0x06 => Self::ServerDeviceBusy,
            0x07 => Self::NegativeAcknowledge,
            0x08 => Self::MemoryParityError,
            0x0A => Self::GatewayPathUnavailable,
            0x0B => Self::GatewayTargetDevice,
            _ => return None,
        };
        Some(ex)
    }

    /// The raw exception code byte.
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    pub(crate) const fn description(self) -> &'static str {
        use Exception::*;
        match self {
            IllegalFunction => "Illegal function",
            IllegalDataAddress => "Illegal data address",
            IllegalDataValue => "Illegal data value",
            ServerDeviceFailure => "Server device failure",
            Acknowledge => "Acknowledge",
            ServerDeviceBusy => "Server device busy",
            NegativeAcknowledge => "Negative acknowledge",
            MemoryParityError => "Memory parity error",
            GatewayPathUnavailable => "Gateway path unavailable",
            GatewayTargetDevice => "Gateway target device failed to respond",
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl error::Error for Exception {}

/// A server (slave) exception response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionResponse {
    /// The function code of the offending request, without the `0x80` bit.
    pub function: FunctionCode,
    pub exception: Exception,
}

impl fmt::Display for ExceptionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Modbus function {}: {}",
            self.function.value(),
            self.exception
        )
    }
}

impl error::Error for ExceptionResponse {}

/// Represents a message from the client (master) to the server (slave).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPdu<'a>(pub Request<'a>);

impl<'a> From<Request<'a>> for RequestPdu<'a> {
    fn from(from: Request<'a>) -> Self {
        RequestPdu(from)
    }
}

impl<'a> From<RequestPdu<'a>> for Request<'a> {
    fn from(from: RequestPdu<'a>) -> Self {
        from.0
    }
}

/// Represents a message from the server (slave) to the client (master).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponsePdu<'a>(pub Result<Response<'a>, ExceptionResponse>);

impl<'a> From<Response<'a>> for ResponsePdu<'a> {
    fn from(from: Response<'a>) -> Self {
        ResponsePdu(Ok(from))
    }
}

impl From<ExceptionResponse> for ResponsePdu<'_> {
    fn from(from: ExceptionResponse) -> Self {
        ResponsePdu(Err(from))
    }
}

impl<'a> From<ResponsePdu<'a>> for Result<Response<'a>, ExceptionResponse> {
    fn from(from: ResponsePdu<'a>) -> Self {
        from.0
    }
}
