// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! PDU codec.
//!
//! Every build operation writes into a caller-provided buffer and returns
//! the number of bytes written; every parse operation reads a borrowed
//! view and validates length, byte-count, quantity and function-code
//! fields before producing a typed value. Caller misuse (undersized
//! buffers, out-of-domain parameters) surfaces as
//! [`Error::InvalidArgument`], on-wire violations as
//! [`Error::InvalidRequest`].

#[cfg(feature = "rtu")]
pub mod rtu;

#[cfg(feature = "tcp")]
pub mod tcp;

#[cfg(feature = "rtu")]
pub mod dup;

use byteorder::{BigEndian, ByteOrder};

use crate::{
    error::{Error, Result},
    frame::*,
};

/// `ON` state of a single coil on the wire.
const COIL_ON: u16 = 0xFF00;
/// `OFF` state of a single coil on the wire.
const COIL_OFF: u16 = 0x0000;

const fn bool_to_coil(state: bool) -> u16 {
    if state {
        COIL_ON
    } else {
        COIL_OFF
    }
}

fn coil_to_bool(coil: u16) -> Result<bool> {
    match coil {
        COIL_ON => Ok(true),
        COIL_OFF => Ok(false),
        _ => Err(Error::InvalidRequest),
    }
}

fn check_capacity(needed: usize, buf: &[u8]) -> Result<()> {
    if needed > PDU_MAX {
        return Err(Error::InvalidArgument);
    }
    if buf.len() < needed {
        return Err(Error::InvalidArgument);
    }
    Ok(())
}

fn check_quantity(quantity: Quantity, min: Quantity, max: Quantity) -> Result<()> {
    if quantity < min || quantity > max {
        return Err(Error::InvalidArgument);
    }
    Ok(())
}

fn wire_quantity(quantity: Quantity, min: Quantity, max: Quantity) -> Result<()> {
    if quantity < min || quantity > max {
        return Err(Error::InvalidRequest);
    }
    Ok(())
}

impl<'a> Request<'a> {
    /// Number of bytes the encoded PDU occupies, including the function
    /// byte.
    #[must_use]
    pub fn pdu_len(&self) -> usize {
        use Request::*;
        match self {
            ReadCoils(_, _)
            | ReadDiscreteInputs(_, _)
            | ReadHoldingRegisters(_, _)
            | ReadInputRegisters(_, _)
            | WriteSingleCoil(_, _)
            | WriteSingleRegister(_, _) => 5,
            ReadExceptionStatus | ReportServerId => 1,
            WriteMultipleCoils(_, coils) => 6 + coils.packed_len(),
            WriteMultipleRegisters(_, words) => 6 + words.len() as usize * 2,
            MaskWriteRegister(_, _, _) => 7,
            ReadWriteMultipleRegisters(_, _, _, words) => 10 + words.len() as usize * 2,
            ReadDeviceId(_, _) => 4,
            Custom(_, data) => 1 + data.len(),
        }
    }

    /// Encode the request PDU into `buf`, returning the encoded length.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        use Request::*;
        let len = self.pdu_len();
        check_capacity(len, buf)?;
        buf[0] = self.function_code().value();
        match *self {
            ReadCoils(address, quantity) | ReadDiscreteInputs(address, quantity) => {
                check_quantity(quantity, 1, MAX_READ_BITS)?;
                BigEndian::write_u16(&mut buf[1..], address);
                BigEndian::write_u16(&mut buf[3..], quantity);
            }
            ReadHoldingRegisters(address, quantity) | ReadInputRegisters(address, quantity) => {
                check_quantity(quantity, 1, MAX_READ_WORDS)?;
                BigEndian::write_u16(&mut buf[1..], address);
                BigEndian::write_u16(&mut buf[3..], quantity);
            }
            WriteSingleCoil(address, state) => {
                BigEndian::write_u16(&mut buf[1..], address);
                BigEndian::write_u16(&mut buf[3..], bool_to_coil(state));
            }
            WriteSingleRegister(address, word) => {
                BigEndian::write_u16(&mut buf[1..], address);
                BigEndian::write_u16(&mut buf[3..], word);
            }
            ReadExceptionStatus | ReportServerId => (),
            WriteMultipleCoils(address, coils) => {
                check_quantity(coils.len(), 1, MAX_WRITE_BITS)?;
                BigEndian::write_u16(&mut buf[1..], address);
                BigEndian::write_u16(&mut buf[3..], coils.len());
                buf[5] = coils.packed_len() as u8;
                buf[6..6 + coils.packed_len()].copy_from_slice(&coils.packed()[..coils.packed_len()]);
            }
            WriteMultipleRegisters(address, words) => {
                check_quantity(words.len(), 1, MAX_WRITE_WORDS)?;
                BigEndian::write_u16(&mut buf[1..], address);
                BigEndian::write_u16(&mut buf[3..], words.len());
                let byte_count = words.len() as usize * 2;
                buf[5] = byte_count as u8;
                buf[6..6 + byte_count].copy_from_slice(&words.raw()[..byte_count]);
            }
            MaskWriteRegister(address, and_mask, or_mask) => {
                BigEndian::write_u16(&mut buf[1..], address);
                BigEndian::write_u16(&mut buf[3..], and_mask);
                BigEndian::write_u16(&mut buf[5..], or_mask);
            }
            ReadWriteMultipleRegisters(read_address, quantity, write_address, words) => {
                check_quantity(quantity, 1, MAX_RW_READ_WORDS)?;
                check_quantity(words.len(), 1, MAX_RW_WRITE_WORDS)?;
                BigEndian::write_u16(&mut buf[1..], read_address);
                BigEndian::write_u16(&mut buf[3..], quantity);
                BigEndian::write_u16(&mut buf[5..], write_address);
                BigEndian::write_u16(&mut buf[7..], words.len());
                let byte_count = words.len() as usize * 2;
                buf[9] = byte_count as u8;
                buf[10..10 + byte_count].copy_from_slice(&words.raw()[..byte_count]);
            }
            ReadDeviceId(code, object_id) => {
                buf[1] = MEI_DEVICE_ID;
                buf[2] = code.value();
                buf[3] = object_id;
            }
            Custom(code, data) => {
                if code >= 0x80 {
                    return Err(Error::InvalidArgument);
                }
                buf[1..1 + data.len()].copy_from_slice(data);
            }
        }
        Ok(len)
    }

    /// Parse a request PDU from a borrowed view.
    ///
    /// Trailing bytes beyond the expected length for the declared byte
    /// count are rejected.
    pub fn decode(buf: &'a [u8]) -> Result<Self> {
        use Request::*;
        if buf.is_empty() {
            return Err(Error::InvalidRequest);
        }
        let fn_code = buf[0];
        if fn_code >= 0x80 {
            return Err(Error::InvalidRequest);
        }
        let req = match fn_code {
            0x01 | 0x02 | 0x03 | 0x04 => {
                expect_len(buf, 5)?;
                let address = BigEndian::read_u16(&buf[1..]);
                let quantity = BigEndian::read_u16(&buf[3..]);
                match fn_code {
                    0x01 => {
                        wire_quantity(quantity, 1, MAX_READ_BITS)?;
                        ReadCoils(address, quantity)
                    }
                    0x02 => {
                        wire_quantity(quantity, 1, MAX_READ_BITS)?;
                        ReadDiscreteInputs(address, quantity)
                    }
                    0x03 => {
                        wire_quantity(quantity, 1, MAX_READ_WORDS)?;
                        ReadHoldingRegisters(address, quantity)
                    }
                    _ => {
                        wire_quantity(quantity, 1, MAX_READ_WORDS)?;
                        ReadInputRegisters(address, quantity)
                    }
                }
            }
            0x05 => {
                expect_len(buf, 5)?;
                let address = BigEndian::read_u16(&buf[1..]);
                let state = coil_to_bool(BigEndian::read_u16(&buf[3..]))?;
                WriteSingleCoil(address, state)
            }
            0x06 => {
                expect_len(buf, 5)?;
                WriteSingleRegister(BigEndian::read_u16(&buf[1..]), BigEndian::read_u16(&buf[3..]))
            }
            0x07 => {
                expect_len(buf, 1)?;
                ReadExceptionStatus
            }
            0x0F => {
                if buf.len() < 6 {
                    return Err(Error::InvalidRequest);
                }
                let address = BigEndian::read_u16(&buf[1..]);
                let quantity = BigEndian::read_u16(&buf[3..]);
                wire_quantity(quantity, 1, MAX_WRITE_BITS)?;
                let byte_count = usize::from(buf[5]);
                if byte_count != packed_bits_len(quantity) {
                    return Err(Error::InvalidRequest);
                }
                expect_len(buf, 6 + byte_count)?;
                let coils = Coils::new(&buf[6..], quantity).ok_or(Error::InvalidRequest)?;
                WriteMultipleCoils(address, coils)
            }
            0x10 => {
                if buf.len() < 6 {
                    return Err(Error::InvalidRequest);
                }
                let address = BigEndian::read_u16(&buf[1..]);
                let quantity = BigEndian::read_u16(&buf[3..]);
                wire_quantity(quantity, 1, MAX_WRITE_WORDS)?;
                let byte_count = usize::from(buf[5]);
                if byte_count != usize::from(quantity) * 2 {
                    return Err(Error::InvalidRequest);
                }
                expect_len(buf, 6 + byte_count)?;
                let words = Words::new(&buf[6..], quantity).ok_or(Error::InvalidRequest)?;
                WriteMultipleRegisters(address, words)
            }
            0x11 => {
                expect_len(buf, 1)?;
                ReportServerId
            }
            0x16 => {
                expect_len(buf, 7)?;
                MaskWriteRegister(
                    BigEndian::read_u16(&buf[1..]),
                    BigEndian::read_u16(&buf[3..]),
                    BigEndian::read_u16(&buf[5..]),
                )
            }
            0x17 => {
                if buf.len() < 10 {
                    return Err(Error::InvalidRequest);
                }
                let read_address = BigEndian::read_u16(&buf[1..]);
                let read_quantity = BigEndian::read_u16(&buf[3..]);
                let write_address = BigEndian::read_u16(&buf[5..]);
                let write_quantity = BigEndian::read_u16(&buf[7..]);
                wire_quantity(read_quantity, 1, MAX_RW_READ_WORDS)?;
                wire_quantity(write_quantity, 1, MAX_RW_WRITE_WORDS)?;
                let byte_count = usize::from(buf[9]);
                if byte_count != usize::from(write_quantity) * 2 {
                    return Err(Error::InvalidRequest);
                }
                expect_len(buf, 10 + byte_count)?;
                let words = Words::new(&buf[10..], write_quantity).ok_or(Error::InvalidRequest)?;
                ReadWriteMultipleRegisters(read_address, read_quantity, write_address, words)
            }
            0x2B => {
                expect_len(buf, 4)?;
                if buf[1] != MEI_DEVICE_ID {
                    return Err(Error::InvalidRequest);
                }
                let code = DeviceIdCode::new(buf[2]).ok_or(Error::InvalidRequest)?;
                ReadDeviceId(code, buf[3])
            }
            code => Custom(code, &buf[1..]),
        };
        Ok(req)
    }
}

impl<'a> Response<'a> {
    /// Number of bytes the encoded PDU occupies, including the function
    /// byte.
    #[must_use]
    pub fn pdu_len(&self) -> usize {
        use Response::*;
        match self {
            ReadCoils(coils) | ReadDiscreteInputs(coils) => 2 + coils.packed_len(),
            ReadHoldingRegisters(words) | ReadInputRegisters(words)
            | ReadWriteMultipleRegisters(words) => 2 + words.len() as usize * 2,
            WriteSingleCoil(_, _)
            | WriteSingleRegister(_, _)
            | WriteMultipleCoils(_, _)
            | WriteMultipleRegisters(_, _) => 5,
            ReadExceptionStatus(_) => 2,
            ReportServerId(server_id) => 2 + server_id.id.len() + 1,
            MaskWriteRegister(_, _, _) => 7,
            ReadDeviceId(device_id) => 7 + device_id.objects.len(),
            Custom(_, data) => 1 + data.len(),
        }
    }

    /// Encode the response PDU into `buf`, returning the encoded length.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        use Response::*;
        let len = self.pdu_len();
        check_capacity(len, buf)?;
        buf[0] = self.function_code().value();
        match *self {
            ReadCoils(coils) | ReadDiscreteInputs(coils) => {
                buf[1] = coils.packed_len() as u8;
                buf[2..2 + coils.packed_len()].copy_from_slice(&coils.packed()[..coils.packed_len()]);
            }
            ReadHoldingRegisters(words) | ReadInputRegisters(words)
            | ReadWriteMultipleRegisters(words) => {
                let byte_count = words.len() as usize * 2;
                buf[1] = byte_count as u8;
                buf[2..2 + byte_count].copy_from_slice(&words.raw()[..byte_count]);
            }
            WriteSingleCoil(address, state) => {
                BigEndian::write_u16(&mut buf[1..], address);
                BigEndian::write_u16(&mut buf[3..], bool_to_coil(state));
            }
            WriteSingleRegister(address, word) => {
                BigEndian::write_u16(&mut buf[1..], address);
                BigEndian::write_u16(&mut buf[3..], word);
            }
            ReadExceptionStatus(status) => {
                buf[1] = status;
            }
            WriteMultipleCoils(address, quantity) | WriteMultipleRegisters(address, quantity) => {
                BigEndian::write_u16(&mut buf[1..], address);
                BigEndian::write_u16(&mut buf[3..], quantity);
            }
            ReportServerId(server_id) => {
                buf[1] = (server_id.id.len() + 1) as u8;
                buf[2..2 + server_id.id.len()].copy_from_slice(server_id.id);
                buf[2 + server_id.id.len()] = if server_id.run_indicator { 0xFF } else { 0x00 };
            }
            MaskWriteRegister(address, and_mask, or_mask) => {
                BigEndian::write_u16(&mut buf[1..], address);
                BigEndian::write_u16(&mut buf[3..], and_mask);
                BigEndian::write_u16(&mut buf[5..], or_mask);
            }
            ReadDeviceId(device_id) => {
                buf[1] = MEI_DEVICE_ID;
                buf[2] = device_id.code.value();
                buf[3] = device_id.conformity;
                buf[4] = if device_id.more_follows { 0xFF } else { 0x00 };
                buf[5] = device_id.next_object_id;
                buf[6] = device_id.object_count;
                buf[7..7 + device_id.objects.len()].copy_from_slice(device_id.objects);
            }
            Custom(code, data) => {
                if code >= 0x80 {
                    return Err(Error::InvalidArgument);
                }
                buf[1..1 + data.len()].copy_from_slice(data);
            }
        }
        Ok(len)
    }

    /// Parse a response PDU from a borrowed view.
    ///
    /// Without the matching request at hand the quantity of a bit read
    /// response is only known up to the trailing fill bits of the last
    /// byte; the returned view exposes `byte count * 8` coil states.
    pub fn decode(buf: &'a [u8]) -> Result<Self> {
        use Response::*;
        if buf.is_empty() {
            return Err(Error::InvalidRequest);
        }
        let fn_code = buf[0];
        if fn_code >= 0x80 {
            return Err(Error::InvalidRequest);
        }
        let rsp = match fn_code {
            0x01 | 0x02 => {
                if buf.len() < 2 {
                    return Err(Error::InvalidRequest);
                }
                let byte_count = usize::from(buf[1]);
                if byte_count == 0 || byte_count > packed_bits_len(MAX_READ_BITS) {
                    return Err(Error::InvalidRequest);
                }
                expect_len(buf, 2 + byte_count)?;
                let quantity = (byte_count * 8) as Quantity;
                let coils = Coils::new(&buf[2..], quantity).ok_or(Error::InvalidRequest)?;
                if fn_code == 0x01 {
                    ReadCoils(coils)
                } else {
                    ReadDiscreteInputs(coils)
                }
            }
            0x03 | 0x04 | 0x17 => {
                if buf.len() < 2 {
                    return Err(Error::InvalidRequest);
                }
                let byte_count = usize::from(buf[1]);
                if byte_count == 0
                    || byte_count % 2 != 0
                    || byte_count > usize::from(MAX_READ_WORDS) * 2
                {
                    return Err(Error::InvalidRequest);
                }
                expect_len(buf, 2 + byte_count)?;
                let words =
                    Words::new(&buf[2..], (byte_count / 2) as Quantity).ok_or(Error::InvalidRequest)?;
                match fn_code {
                    0x03 => ReadHoldingRegisters(words),
                    0x04 => ReadInputRegisters(words),
                    _ => ReadWriteMultipleRegisters(words),
                }
            }
            0x05 => {
                expect_len(buf, 5)?;
                let address = BigEndian::read_u16(&buf[1..]);
                let state = coil_to_bool(BigEndian::read_u16(&buf[3..]))?;
                WriteSingleCoil(address, state)
            }
            0x06 => {
                expect_len(buf, 5)?;
                WriteSingleRegister(BigEndian::read_u16(&buf[1..]), BigEndian::read_u16(&buf[3..]))
            }
            0x07 => {
                expect_len(buf, 2)?;
                ReadExceptionStatus(buf[1])
            }
            0x0F | 0x10 => {
                expect_len(buf, 5)?;
                let address = BigEndian::read_u16(&buf[1..]);
                let quantity = BigEndian::read_u16(&buf[3..]);
                if fn_code == 0x0F {
                    WriteMultipleCoils(address, quantity)
                } else {
                    WriteMultipleRegisters(address, quantity)
                }
            }
            0x11 => {
                if buf.len() < 2 {
                    return Err(Error::InvalidRequest);
                }
                let byte_count = usize::from(buf[1]);
                if byte_count == 0 {
                    return Err(Error::InvalidRequest);
                }
                expect_len(buf, 2 + byte_count)?;
                let run_indicator = match buf[1 + byte_count] {
                    0xFF => true,
                    0x00 => false,
                    _ => return Err(Error::InvalidRequest),
                };
                ReportServerId(ServerId {
                    id: &buf[2..1 + byte_count],
                    run_indicator,
                })
            }
            0x16 => {
                expect_len(buf, 7)?;
                MaskWriteRegister(
                    BigEndian::read_u16(&buf[1..]),
                    BigEndian::read_u16(&buf[3..]),
                    BigEndian::read_u16(&buf[5..]),
                )
            }
            0x2B => {
                if buf.len() < 7 {
                    return Err(Error::InvalidRequest);
                }
                if buf[1] != MEI_DEVICE_ID {
                    return Err(Error::InvalidRequest);
                }
                let code = DeviceIdCode::new(buf[2]).ok_or(Error::InvalidRequest)?;
                let more_follows = match buf[4] {
                    0xFF => true,
                    0x00 => false,
                    _ => return Err(Error::InvalidRequest),
                };
                let device_id = DeviceId {
                    code,
                    conformity: buf[3],
                    more_follows,
                    next_object_id: buf[5],
                    object_count: buf[6],
                    objects: &buf[7..],
                };
                // The object list must be self-consistent.
                if device_id.objects().count() != usize::from(device_id.object_count) {
                    return Err(Error::InvalidRequest);
                }
                ReadDeviceId(device_id)
            }
            code => Custom(code, &buf[1..]),
        };
        Ok(rsp)
    }

    /// Parse a response PDU and validate it against the request it
    /// answers: the function code must match and declared byte counts
    /// must equal the value derived from the requested quantity.
    ///
    /// Bit read responses are narrowed to the requested quantity.
    pub fn decode_for_request(request: &Request<'_>, buf: &'a [u8]) -> Result<Self> {
        use Response::*;
        let rsp = Self::decode(buf)?;
        if rsp.function_code() != request.function_code() {
            return Err(Error::InvalidRequest);
        }
        let rsp = match (request, rsp) {
            (Request::ReadCoils(_, quantity), ReadCoils(coils)) => {
                check_bits_byte_count(*quantity, &coils)?;
                ReadCoils(narrow_coils(coils, *quantity))
            }
            (Request::ReadDiscreteInputs(_, quantity), ReadDiscreteInputs(coils)) => {
                check_bits_byte_count(*quantity, &coils)?;
                ReadDiscreteInputs(narrow_coils(coils, *quantity))
            }
            (Request::ReadHoldingRegisters(_, quantity), ReadHoldingRegisters(words)) => {
                check_words_quantity(*quantity, &words)?;
                ReadHoldingRegisters(words)
            }
            (Request::ReadInputRegisters(_, quantity), ReadInputRegisters(words)) => {
                check_words_quantity(*quantity, &words)?;
                ReadInputRegisters(words)
            }
            (
                Request::ReadWriteMultipleRegisters(_, quantity, _, _),
                ReadWriteMultipleRegisters(words),
            ) => {
                check_words_quantity(*quantity, &words)?;
                ReadWriteMultipleRegisters(words)
            }
            (_, rsp) => rsp,
        };
        Ok(rsp)
    }
}

fn check_bits_byte_count(quantity: Quantity, coils: &Coils<'_>) -> Result<()> {
    if coils.packed().len() != packed_bits_len(quantity) {
        return Err(Error::InvalidRequest);
    }
    Ok(())
}

fn check_words_quantity(quantity: Quantity, words: &Words<'_>) -> Result<()> {
    if words.len() != quantity {
        return Err(Error::InvalidRequest);
    }
    Ok(())
}

fn narrow_coils<'a>(coils: Coils<'a>, quantity: Quantity) -> Coils<'a> {
    Coils {
        quantity,
        data: coils.data,
    }
}

impl ExceptionResponse {
    /// Encoded length of an exception response PDU.
    pub const PDU_LEN: usize = 2;

    /// Encode the exception response into `buf`.
    ///
    /// Fails with [`Error::InvalidArgument`] if the function code already
    /// carries the `0x80` bit.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if self.function.value() >= 0x80 {
            return Err(Error::InvalidArgument);
        }
        check_capacity(Self::PDU_LEN, buf)?;
        buf[0] = self.function.value() | 0x80;
        buf[1] = self.exception.value();
        Ok(Self::PDU_LEN)
    }

    /// Parse an exception response PDU from a borrowed view.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != Self::PDU_LEN {
            return Err(Error::InvalidRequest);
        }
        if buf[0] < 0x80 {
            return Err(Error::InvalidRequest);
        }
        let exception = Exception::new(buf[1]).ok_or(Error::InvalidRequest)?;
        Ok(Self {
            function: FunctionCode::new(buf[0] - 0x80),
            exception,
        })
    }
}

impl<'a> RequestPdu<'a> {
    /// Parse a request PDU.
    pub fn decode(buf: &'a [u8]) -> Result<Self> {
        Request::decode(buf).map(RequestPdu)
    }

    /// Encode the request PDU into `buf`.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        self.0.encode(buf)
    }
}

impl<'a> ResponsePdu<'a> {
    /// Parse a response PDU, dispatching on the exception bit of the
    /// function code.
    pub fn decode(buf: &'a [u8]) -> Result<Self> {
        if buf.is_empty() {
            return Err(Error::InvalidRequest);
        }
        if buf[0] >= 0x80 {
            ExceptionResponse::decode(buf).map(Into::into)
        } else {
            Response::decode(buf).map(Into::into)
        }
    }

    /// Encode the response PDU into `buf`.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        match &self.0 {
            Ok(rsp) => rsp.encode(buf),
            Err(ex) => ex.encode(buf),
        }
    }
}

fn expect_len(buf: &[u8], expected: usize) -> Result<()> {
    if buf.len() != expected {
        return Err(Error::InvalidRequest);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip_request(req: Request<'_>) {
        let mut buf = [0u8; PDU_MAX];
        let len = req.encode(&mut buf).unwrap();
        assert_eq!(len, req.pdu_len());
        let decoded = Request::decode(&buf[..len]).unwrap();
        assert_eq!(decoded, req);
    }

    fn round_trip_response(rsp: Response<'_>) {
        let mut buf = [0u8; PDU_MAX];
        let len = rsp.encode(&mut buf).unwrap();
        assert_eq!(len, rsp.pdu_len());
        let decoded = Response::decode(&buf[..len]).unwrap();
        assert_eq!(decoded, rsp);
    }

    #[test]
    fn convert_bool_to_coil() {
        assert_eq!(bool_to_coil(true), 0xFF00);
        assert_eq!(bool_to_coil(false), 0x0000);
    }

    #[test]
    fn convert_coil_to_bool() {
        assert!(coil_to_bool(0xFF00).unwrap());
        assert!(!coil_to_bool(0x0000).unwrap());
        assert_eq!(coil_to_bool(0x1234), Err(Error::InvalidRequest));
    }

    #[test]
    fn request_round_trips() {
        let mut coil_scratch = [0u8; 8];
        let coils = Coils::pack(&[true, false, true, true], &mut coil_scratch).unwrap();
        let mut word_scratch = [0u8; 8];
        let words = Words::pack(&[0xABCD, 0xEF12], &mut word_scratch).unwrap();

        round_trip_request(Request::ReadCoils(0x12, 4));
        round_trip_request(Request::ReadDiscreteInputs(0x03, 19));
        round_trip_request(Request::ReadHoldingRegisters(0x09, 77));
        round_trip_request(Request::ReadInputRegisters(0x09, 77));
        round_trip_request(Request::WriteSingleCoil(0x1234, true));
        round_trip_request(Request::WriteSingleRegister(0x07, 0xABCD));
        round_trip_request(Request::ReadExceptionStatus);
        round_trip_request(Request::WriteMultipleCoils(0x3311, coils));
        round_trip_request(Request::WriteMultipleRegisters(0x06, words));
        round_trip_request(Request::ReportServerId);
        round_trip_request(Request::MaskWriteRegister(0x04, 0x00F2, 0x0025));
        round_trip_request(Request::ReadWriteMultipleRegisters(0x05, 51, 0x03, words));
        round_trip_request(Request::ReadDeviceId(DeviceIdCode::BasicStream, 0x00));
        round_trip_request(Request::Custom(0x55, &[0xCC, 0x88, 0xAA, 0xFF]));
    }

    #[test]
    fn response_round_trips() {
        let mut coil_scratch = [0u8; 8];
        let coils = Coils::pack(&[true, false, false, true, false, false, false, false], &mut coil_scratch)
            .unwrap();
        let mut word_scratch = [0u8; 8];
        let words = Words::pack(&[0xAA00, 0xCCBB, 0xEEDD], &mut word_scratch).unwrap();

        round_trip_response(Response::ReadCoils(coils));
        round_trip_response(Response::ReadDiscreteInputs(coils));
        round_trip_response(Response::ReadHoldingRegisters(words));
        round_trip_response(Response::ReadInputRegisters(words));
        round_trip_response(Response::WriteSingleCoil(0x33, true));
        round_trip_response(Response::WriteSingleRegister(0x07, 0xABCD));
        round_trip_response(Response::ReadExceptionStatus(0x42));
        round_trip_response(Response::WriteMultipleCoils(0x3311, 5));
        round_trip_response(Response::WriteMultipleRegisters(0x06, 2));
        round_trip_response(Response::ReportServerId(ServerId {
            id: b"pump-7",
            run_indicator: true,
        }));
        round_trip_response(Response::MaskWriteRegister(0x04, 0x00F2, 0x0025));
        round_trip_response(Response::ReadWriteMultipleRegisters(words));
        round_trip_response(Response::Custom(0x55, &[0xCC, 0x88, 0xAA, 0xFF]));
    }

    #[test]
    fn device_id_response_round_trip() {
        let objects = [0x00, 0x03, b'A', b'C', b'M', 0x01, 0x02, b'v', b'1'];
        let rsp = Response::ReadDeviceId(DeviceId {
            code: DeviceIdCode::BasicStream,
            conformity: 0x01,
            more_follows: false,
            next_object_id: 0x00,
            object_count: 2,
            objects: &objects,
        });
        round_trip_response(rsp);
    }

    #[test]
    fn encode_read_coils_request_bytes() {
        let mut buf = [0u8; 8];
        let len = Request::ReadCoils(0x12, 4).encode(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[0x01, 0x00, 0x12, 0x00, 0x04]);
    }

    #[test]
    fn encode_write_multiple_coils_request_bytes() {
        let mut scratch = [0u8; 1];
        let coils = Coils::pack(&[true, false, true, true], &mut scratch).unwrap();
        let mut buf = [0u8; 8];
        let len = Request::WriteMultipleCoils(0x3311, coils)
            .encode(&mut buf)
            .unwrap();
        assert_eq!(
            &buf[..len],
            &[0x0F, 0x33, 0x11, 0x00, 0x04, 0x01, 0b_0000_1101]
        );
    }

    #[test]
    fn encode_write_multiple_registers_request_bytes() {
        let mut scratch = [0u8; 4];
        let words = Words::pack(&[0xABCD, 0xEF12], &mut scratch).unwrap();
        let mut buf = [0u8; 16];
        let len = Request::WriteMultipleRegisters(0x06, words)
            .encode(&mut buf)
            .unwrap();
        assert_eq!(
            &buf[..len],
            &[0x10, 0x00, 0x06, 0x00, 0x02, 0x04, 0xAB, 0xCD, 0xEF, 0x12]
        );
    }

    #[test]
    fn encode_rejects_undersized_buffer() {
        let mut buf = [0u8; 4];
        assert_eq!(
            Request::ReadCoils(0x12, 4).encode(&mut buf),
            Err(Error::InvalidArgument)
        );
        // Never writes past the stated capacity, even one byte short.
        let mut scratch = [0u8; 4];
        let words = Words::pack(&[0xABCD, 0xEF12], &mut scratch).unwrap();
        let needed = Request::WriteMultipleRegisters(0x06, words).pdu_len();
        let mut short = vec![0u8; needed - 1];
        assert_eq!(
            Request::WriteMultipleRegisters(0x06, words).encode(&mut short),
            Err(Error::InvalidArgument)
        );
    }

    #[test]
    fn encode_rejects_out_of_domain_quantities() {
        let mut buf = [0u8; PDU_MAX];
        assert_eq!(
            Request::ReadCoils(0, 0).encode(&mut buf),
            Err(Error::InvalidArgument)
        );
        assert_eq!(
            Request::ReadCoils(0, 2001).encode(&mut buf),
            Err(Error::InvalidArgument)
        );
        assert_eq!(
            Request::ReadHoldingRegisters(0, 126).encode(&mut buf),
            Err(Error::InvalidArgument)
        );
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        assert_eq!(
            Request::decode(&[0x03, 0x00, 0x09, 0x00, 0x4D, 0x00]),
            Err(Error::InvalidRequest)
        );
        assert_eq!(
            Response::decode(&[0x06, 0x00, 0x07, 0xAB, 0xCD, 0x00]),
            Err(Error::InvalidRequest)
        );
    }

    #[test]
    fn decode_rejects_inconsistent_byte_count() {
        // Declared byte count 0x05 does not match quantity 2.
        assert_eq!(
            Request::decode(&[0x10, 0x00, 0x06, 0x00, 0x02, 0x05, 0xAB, 0xCD, 0xEF, 0x12]),
            Err(Error::InvalidRequest)
        );
        // Bit write: 4 coils need 1 byte, not 2.
        assert_eq!(
            Request::decode(&[0x0F, 0x33, 0x11, 0x00, 0x04, 0x02, 0b_0000_1101, 0x00]),
            Err(Error::InvalidRequest)
        );
        // Register read response with odd byte count.
        assert_eq!(
            Response::decode(&[0x03, 0x03, 0xAA, 0x00, 0x11]),
            Err(Error::InvalidRequest)
        );
    }

    #[test]
    fn decode_rejects_zero_and_oversized_quantities() {
        assert_eq!(
            Request::decode(&[0x01, 0x00, 0x00, 0x00, 0x00]),
            Err(Error::InvalidRequest)
        );
        // 2001 coils
        assert_eq!(
            Request::decode(&[0x01, 0x00, 0x00, 0x07, 0xD1]),
            Err(Error::InvalidRequest)
        );
        // 126 holding registers
        assert_eq!(
            Request::decode(&[0x03, 0x00, 0x00, 0x00, 0x7E]),
            Err(Error::InvalidRequest)
        );
    }

    #[test]
    fn decode_rejects_invalid_coil_value() {
        assert_eq!(
            Request::decode(&[0x05, 0x12, 0x34, 0x12, 0x34]),
            Err(Error::InvalidRequest)
        );
    }

    #[test]
    fn decode_request_rejects_exception_bit() {
        assert_eq!(Request::decode(&[0x83, 0x02]), Err(Error::InvalidRequest));
    }

    #[test]
    fn exception_response_round_trip() {
        let ex = ExceptionResponse {
            function: FunctionCode::ReadHoldingRegisters,
            exception: Exception::IllegalDataAddress,
        };
        let mut buf = [0u8; 2];
        let len = ex.encode(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[0x83, 0x02]);
        assert_eq!(ExceptionResponse::decode(&buf).unwrap(), ex);
    }

    #[test]
    fn exception_encode_rejects_high_bit_function() {
        let ex = ExceptionResponse {
            function: FunctionCode::Custom(0x83),
            exception: Exception::IllegalDataAddress,
        };
        let mut buf = [0u8; 2];
        assert_eq!(ex.encode(&mut buf), Err(Error::InvalidArgument));
    }

    #[test]
    fn exception_decode_rejects_unknown_code() {
        assert_eq!(
            ExceptionResponse::decode(&[0x83, 0x09]),
            Err(Error::InvalidRequest)
        );
        assert_eq!(
            ExceptionResponse::decode(&[0x79, 0x02]),
            Err(Error::InvalidRequest)
        );
    }

    #[test]
    fn response_pdu_dispatches_on_exception_bit() {
        let pdu = ResponsePdu::decode(&[0x83, 0x02]).unwrap();
        assert!(matches!(pdu, ResponsePdu(Err(_))));
        let pdu = ResponsePdu::decode(&[0x06, 0x00, 0x07, 0xAB, 0xCD]).unwrap();
        assert!(matches!(pdu, ResponsePdu(Ok(Response::WriteSingleRegister(0x07, 0xABCD)))));
    }

    #[test]
    fn decode_for_request_narrows_bit_reads() {
        let req = Request::ReadCoils(0x00, 5);
        let rsp = Response::decode_for_request(&req, &[0x01, 0x01, 0b_0000_1001]).unwrap();
        let Response::ReadCoils(coils) = rsp else {
            panic!("unexpected response");
        };
        assert_eq!(coils.len(), 5);
        let states: Vec<_> = coils.iter().collect();
        assert_eq!(states, vec![true, false, false, true, false]);
    }

    #[test]
    fn decode_for_request_rejects_wrong_byte_count() {
        let req = Request::ReadCoils(0x00, 9);
        // 9 coils need 2 bytes.
        assert_eq!(
            Response::decode_for_request(&req, &[0x01, 0x01, 0b_0000_1001]),
            Err(Error::InvalidRequest)
        );
        let req = Request::ReadHoldingRegisters(0x00, 3);
        assert_eq!(
            Response::decode_for_request(&req, &[0x03, 0x04, 0xAA, 0x00, 0x11, 0x11]),
            Err(Error::InvalidRequest)
        );
    }

    #[test]
    fn decode_for_request_rejects_function_mismatch() {
        let req = Request::ReadCoils(0x00, 5);
        assert_eq!(
            Response::decode_for_request(&req, &[0x02, 0x01, 0b_0000_1001]),
            Err(Error::InvalidRequest)
        );
    }

    #[test]
    fn report_server_id_decodes_run_indicator() {
        let rsp = Response::decode(&[0x11, 0x03, 0x42, 0x43, 0xFF]).unwrap();
        let Response::ReportServerId(server_id) = rsp else {
            panic!("unexpected response");
        };
        assert_eq!(server_id.id, &[0x42, 0x43]);
        assert!(server_id.run_indicator);
        assert_eq!(
            Response::decode(&[0x11, 0x03, 0x42, 0x43, 0x17]),
            Err(Error::InvalidRequest)
        );
    }
}
