// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RTU frame codec: unit id + PDU + CRC-16, plus stream reassembly with
//! resynchronization after garbled input.

use byteorder::{ByteOrder, LittleEndian};
use bytes::{Buf, Bytes, BytesMut};

use crate::{
    error::{Error, Result},
    frame::{rtu::*, RequestPdu, ResponsePdu, PDU_MAX, RTU_FRAME_MAX},
    unit::{AddressKind, Unit, UnitId},
};

const CRC_LEN: usize = 2;

/// Smallest decodable frame: unit id, function code, CRC-16.
const MIN_FRAME_LEN: usize = 4;

// [Modbus over Serial Line Specification and Implementation Guide V1.02](http://modbus.org/docs/Modbus_over_serial_line_V1_02.pdf), page 13
// "The maximum size of a Modbus RTU frame is 256 bytes."
const MAX_FRAME_LEN: usize = RTU_FRAME_MAX;

/// Default capacity of the reassembly scratch buffer.
pub const DEFAULT_SCRATCH_CAPACITY: usize = 2 * MAX_FRAME_LEN;

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x0001 != 0 {
                (crc >> 1) ^ 0xA001
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC16_TABLE: [u16; 256] = build_crc16_table();

/// CRC-16 (Modbus): polynomial 0xA001, initial value 0xFFFF.
///
/// The low byte is transmitted first on the wire.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFFu16;
    for byte in data {
        let idx = usize::from((crc ^ u16::from(*byte)) & 0xFF);
        crc = (crc >> 8) ^ CRC16_TABLE[idx];
    }
    crc
}

fn check_crc(adu_data: &[u8], wire: &[u8]) -> Result<()> {
    let expected = LittleEndian::read_u16(wire);
    let actual = crc16(adu_data);
    if expected != actual {
        return Err(Error::Crc);
    }
    Ok(())
}

/// Encode an RTU request frame into `buf`, returning the frame length.
pub fn encode_request(adu: RequestAdu<'_>, buf: &mut [u8]) -> Result<usize> {
    let RequestAdu { hdr, pdu } = adu;
    encode_frame(hdr.unit_id, buf, |pdu_buf| pdu.encode(pdu_buf))
}

/// Encode an RTU response frame into `buf`, returning the frame length.
pub fn encode_response(adu: ResponseAdu<'_>, buf: &mut [u8]) -> Result<usize> {
    let ResponseAdu { hdr, pdu } = adu;
    encode_frame(hdr.unit_id, buf, |pdu_buf| pdu.encode(pdu_buf))
}

/// Wrap an already encoded PDU into an RTU frame.
pub fn encode_raw(unit_id: UnitId, pdu_data: &[u8], buf: &mut [u8]) -> Result<usize> {
    if pdu_data.is_empty() || pdu_data.len() > PDU_MAX {
        return Err(Error::InvalidArgument);
    }
    encode_frame(unit_id, buf, |pdu_buf| {
        pdu_buf[..pdu_data.len()].copy_from_slice(pdu_data);
        Ok(pdu_data.len())
    })
}

fn encode_frame<F>(unit_id: UnitId, buf: &mut [u8], encode_pdu: F) -> Result<usize>
where
    F: FnOnce(&mut [u8]) -> Result<usize>,
{
    if buf.len() < MIN_FRAME_LEN {
        return Err(Error::InvalidArgument);
    }
    buf[0] = unit_id;
    let pdu_capacity = (buf.len() - 1 - CRC_LEN).min(PDU_MAX);
    let pdu_len = encode_pdu(&mut buf[1..1 + pdu_capacity])?;
    let adu_len = 1 + pdu_len;
    if buf.len() < adu_len + CRC_LEN {
        return Err(Error::InvalidArgument);
    }
    let crc = crc16(&buf[..adu_len]);
    LittleEndian::write_u16(&mut buf[adu_len..], crc);
    Ok(adu_len + CRC_LEN)
}

/// Validate and split a single complete RTU frame.
pub fn decode_frame(buf: &[u8]) -> Result<(UnitId, &[u8])> {
    if buf.len() < MIN_FRAME_LEN || buf.len() > MAX_FRAME_LEN {
        return Err(Error::InvalidRequest);
    }
    let adu_len = buf.len() - CRC_LEN;
    check_crc(&buf[..adu_len], &buf[adu_len..])?;
    Ok((buf[0], &buf[1..adu_len]))
}

/// Decode a single complete RTU request frame.
pub fn decode_request(buf: &[u8]) -> Result<RequestAdu<'_>> {
    let (unit_id, pdu_data) = decode_frame(buf)?;
    let pdu = RequestPdu::decode(pdu_data)?;
    Ok(RequestAdu {
        hdr: Header { unit_id },
        pdu,
    })
}

/// Decode a single complete RTU response frame.
pub fn decode_response(buf: &[u8]) -> Result<ResponseAdu<'_>> {
    let (unit_id, pdu_data) = decode_frame(buf)?;
    let pdu = ResponsePdu::decode(pdu_data)?;
    Ok(ResponseAdu {
        hdr: Header { unit_id },
        pdu,
    })
}

/// Which side of the exchange a stream decoder reassembles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Frames sent by a client: requests.
    Request,
    /// Frames sent by a server: responses.
    Response,
}

/// Expected PDU length of a request, inferred from the bytes seen so far.
///
/// `adu_buf` starts at the unit id byte. Returns `Ok(None)` while the
/// length cannot be determined yet.
fn request_pdu_len(adu_buf: &[u8]) -> Result<Option<usize>> {
    let Some(fn_code) = adu_buf.get(1) else {
        return Ok(None);
    };
    let len = match fn_code {
        0x01..=0x06 => 5,
        0x07 | 0x11 => 1,
        0x0F | 0x10 => {
            return Ok(adu_buf.get(6).map(|&byte_count| 6 + usize::from(byte_count)));
        }
        0x16 => 7,
        0x17 => {
            return Ok(adu_buf
                .get(10)
                .map(|&byte_count| 10 + usize::from(byte_count)));
        }
        0x2B => 4,
        _ => return Err(Error::InvalidRequest),
    };
    Ok(Some(len))
}

/// Expected PDU length of a response, inferred from the bytes seen so far.
fn response_pdu_len(adu_buf: &[u8]) -> Result<Option<usize>> {
    let Some(fn_code) = adu_buf.get(1) else {
        return Ok(None);
    };
    let len = match fn_code {
        0x01..=0x04 | 0x11 | 0x17 => {
            return Ok(adu_buf.get(2).map(|&byte_count| 2 + usize::from(byte_count)));
        }
        0x05 | 0x06 | 0x0F | 0x10 => 5,
        0x07 => 2,
        0x16 => 7,
        0x2B => return device_id_pdu_len(adu_buf),
        0x81..=0xFF => 2,
        _ => return Err(Error::InvalidRequest),
    };
    Ok(Some(len))
}

/// A device identification response declares its size only through the
/// object list, so the list is walked as far as it has been received.
fn device_id_pdu_len(adu_buf: &[u8]) -> Result<Option<usize>> {
    let Some(&object_count) = adu_buf.get(7) else {
        return Ok(None);
    };
    // unit + fc + mei + code + conformity + more + next + count
    let mut pos = 8;
    for _ in 0..object_count {
        let Some(&object_len) = adu_buf.get(pos + 1) else {
            return Ok(None);
        };
        pos += 2 + usize::from(object_len);
    }
    // PDU length excludes the unit id byte.
    Ok(Some(pos - 1))
}

/// Counters kept by the stream reassembly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResyncStats {
    /// Bytes skipped while hunting for a frame start.
    pub bytes_discarded: u64,
    /// Start positions that were tested and rejected.
    pub attempts: u64,
    /// Frames decoded after at least one byte had been discarded.
    pub frames_recovered: u64,
    /// CRC mismatches observed on tentative frames.
    pub crc_errors: u64,
    /// Bytes lost to scratch-buffer overflow.
    pub overflow_bytes: u64,
}

/// Reassembles RTU frames from a byte stream and recovers from garbled
/// input.
///
/// Bytes accumulate in a bounded scratch buffer. On a CRC mismatch or an
/// implausible frame start the scanner drops one leading byte at a time
/// and retests until a tentative frame passes CRC; the frame is then
/// promoted to a decoded ADU and the preceding bytes are discarded and
/// counted.
#[derive(Debug)]
pub struct StreamDecoder {
    direction: Direction,
    buf: BytesMut,
    capacity: usize,
    dropped_since_frame: usize,
    stats: ResyncStats,
}

impl StreamDecoder {
    /// Create a decoder with the default scratch capacity.
    #[must_use]
    pub fn new(direction: Direction) -> Self {
        Self::with_capacity(direction, DEFAULT_SCRATCH_CAPACITY)
    }

    /// Create a decoder with a custom scratch capacity (at least one
    /// maximum-size frame).
    #[must_use]
    pub fn with_capacity(direction: Direction, capacity: usize) -> Self {
        let capacity = capacity.max(MAX_FRAME_LEN);
        Self {
            direction,
            buf: BytesMut::with_capacity(capacity),
            capacity,
            dropped_since_frame: 0,
            stats: ResyncStats::default(),
        }
    }

    /// Append received bytes to the scratch buffer.
    ///
    /// When the buffer would overflow, the oldest bytes are discarded and
    /// counted; the newest bytes always fit.
    pub fn feed(&mut self, bytes: &[u8]) {
        if bytes.len() >= self.capacity {
            let lost = self.buf.len() + bytes.len() - self.capacity;
            self.stats.overflow_bytes += lost as u64;
            self.buf.clear();
            self.buf
                .extend_from_slice(&bytes[bytes.len() - self.capacity..]);
            return;
        }
        let overflow = (self.buf.len() + bytes.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            self.stats.overflow_bytes += overflow as u64;
            self.buf.advance(overflow);
        }
        self.buf.extend_from_slice(bytes);
    }

    /// Number of bytes currently buffered.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Reassembly statistics.
    #[must_use]
    pub const fn stats(&self) -> ResyncStats {
        self.stats
    }

    /// Drop all buffered bytes, e.g. before a fresh exchange.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.dropped_since_frame = 0;
    }

    /// Try to extract the next complete frame from the buffered bytes.
    ///
    /// Returns the addressed unit and the PDU bytes. `None` means more
    /// input is required; garbled input is skipped internally and never
    /// surfaces as an error.
    pub fn try_decode(&mut self) -> Option<(UnitId, Bytes)> {
        loop {
            if self.buf.len() < MIN_FRAME_LEN {
                return None;
            }

            // Only the broadcast address or a real device id can start
            // a frame.
            if Unit(self.buf[0]).kind() == AddressKind::Reserved {
                self.skip_byte();
                continue;
            }

            let pdu_len = match self.infer_pdu_len() {
                Ok(Some(pdu_len)) if pdu_len <= PDU_MAX => pdu_len,
                Ok(Some(_)) | Err(_) => {
                    self.skip_byte();
                    continue;
                }
                Ok(None) => return None,
            };

            let adu_len = 1 + pdu_len;
            if self.buf.len() < adu_len + CRC_LEN {
                return None;
            }

            if check_crc(&self.buf[..adu_len], &self.buf[adu_len..adu_len + CRC_LEN]).is_err() {
                self.stats.crc_errors += 1;
                self.skip_byte();
                continue;
            }

            if self.dropped_since_frame > 0 {
                log::warn!(
                    "Recovered frame after dropping {} byte(s)",
                    self.dropped_since_frame
                );
                self.stats.frames_recovered += 1;
                self.dropped_since_frame = 0;
            }

            let mut adu_buf = self.buf.split_to(adu_len);
            self.buf.advance(CRC_LEN);
            let unit_id = adu_buf.split_to(1)[0];
            return Some((unit_id, adu_buf.freeze()));
        }
    }

    fn infer_pdu_len(&self) -> Result<Option<usize>> {
        match self.direction {
            Direction::Request => request_pdu_len(&self.buf),
            Direction::Response => response_pdu_len(&self.buf),
        }
    }

    fn skip_byte(&mut self) {
        log::debug!("Dropped leading byte: {:X?}", self.buf[0]);
        self.buf.advance(1);
        self.stats.bytes_discarded += 1;
        self.stats.attempts += 1;
        self.dropped_since_frame += 1;
    }
}
