// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MBAP frame codec: 7-byte header + PDU, with transaction correlation.

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    error::{Error, Result},
    frame::{tcp::*, RequestPdu, ResponsePdu, PDU_MAX, TCP_FRAME_MAX},
};

/// Size of the MBAP header on the wire.
pub const HEADER_LEN: usize = 7;

const PROTOCOL_ID: u16 = 0x0000;

/// Encode an MBAP request frame into `buf`, returning the frame length.
pub fn encode_request(adu: RequestAdu<'_>, buf: &mut [u8]) -> Result<usize> {
    let RequestAdu { hdr, pdu } = adu;
    encode_frame(hdr, buf, |pdu_buf| pdu.encode(pdu_buf))
}

/// Encode an MBAP response frame into `buf`, returning the frame length.
pub fn encode_response(adu: ResponseAdu<'_>, buf: &mut [u8]) -> Result<usize> {
    let ResponseAdu { hdr, pdu } = adu;
    encode_frame(hdr, buf, |pdu_buf| pdu.encode(pdu_buf))
}

/// Wrap an already encoded PDU into an MBAP frame.
pub fn encode_raw(hdr: Header, pdu_data: &[u8], buf: &mut [u8]) -> Result<usize> {
    if pdu_data.is_empty() || pdu_data.len() > PDU_MAX {
        return Err(Error::InvalidArgument);
    }
    encode_frame(hdr, buf, |pdu_buf| {
        pdu_buf[..pdu_data.len()].copy_from_slice(pdu_data);
        Ok(pdu_data.len())
    })
}

fn encode_frame<F>(hdr: Header, buf: &mut [u8], encode_pdu: F) -> Result<usize>
where
    F: FnOnce(&mut [u8]) -> Result<usize>,
{
    if buf.len() < HEADER_LEN + 1 {
        return Err(Error::InvalidArgument);
    }
    let pdu_capacity = (buf.len() - HEADER_LEN).min(PDU_MAX);
    let pdu_len = encode_pdu(&mut buf[HEADER_LEN..HEADER_LEN + pdu_capacity])?;
    // length = unit id byte + PDU
    let len = pdu_len + 1;
    BigEndian::write_u16(&mut buf[0..], hdr.transaction_id);
    BigEndian::write_u16(&mut buf[2..], PROTOCOL_ID);
    BigEndian::write_u16(&mut buf[4..], len as u16);
    buf[6] = hdr.unit_id;
    Ok(HEADER_LEN + pdu_len)
}

/// Validate and split a single complete MBAP frame.
pub fn decode_frame(buf: &[u8]) -> Result<(Header, &[u8])> {
    if buf.len() < HEADER_LEN + 1 || buf.len() > TCP_FRAME_MAX {
        return Err(Error::InvalidRequest);
    }
    let protocol_id = BigEndian::read_u16(&buf[2..4]);
    if protocol_id != PROTOCOL_ID {
        return Err(Error::InvalidRequest);
    }
    let len = usize::from(BigEndian::read_u16(&buf[4..6]));
    // The declared length must match the remaining bytes exactly.
    if len == 0 || buf.len() != HEADER_LEN - 1 + len {
        return Err(Error::InvalidRequest);
    }
    let header = Header {
        transaction_id: BigEndian::read_u16(&buf[0..2]),
        unit_id: buf[6],
    };
    Ok((header, &buf[HEADER_LEN..]))
}

/// Decode a single complete MBAP request frame.
pub fn decode_request(buf: &[u8]) -> Result<RequestAdu<'_>> {
    let (hdr, pdu_data) = decode_frame(buf)?;
    let pdu = RequestPdu::decode(pdu_data)?;
    Ok(RequestAdu { hdr, pdu })
}

/// Decode a single complete MBAP response frame.
pub fn decode_response(buf: &[u8]) -> Result<ResponseAdu<'_>> {
    let (hdr, pdu_data) = decode_frame(buf)?;
    let pdu = ResponsePdu::decode(pdu_data)?;
    Ok(ResponseAdu { hdr, pdu })
}

/// Reassembles MBAP frames from a TCP byte stream.
///
/// Unlike RTU there is no resynchronization: TCP preserves byte order and
/// integrity, so a malformed header is unrecoverable for the connection
/// and surfaces as an error.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buf: BytesMut,
}

impl StreamDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes to the reassembly buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of bytes currently buffered.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Try to extract the next complete frame from the buffered bytes.
    ///
    /// Returns `Ok(None)` while more input is required.
    pub fn try_decode(&mut self) -> Result<Option<(Header, Bytes)>> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let protocol_id = BigEndian::read_u16(&self.buf[2..4]);
        if protocol_id != PROTOCOL_ID {
            log::error!("Invalid protocol identifier: {protocol_id}");
            return Err(Error::InvalidRequest);
        }

        let len = usize::from(BigEndian::read_u16(&self.buf[4..6]));
        if len == 0 || len > PDU_MAX + 1 {
            log::error!("Invalid MBAP length field: {len}");
            return Err(Error::InvalidRequest);
        }
        let pdu_len = len - 1;
        if self.buf.len() < HEADER_LEN + pdu_len {
            return Ok(None);
        }

        let header_data = self.buf.split_to(HEADER_LEN);
        let header = Header {
            transaction_id: BigEndian::read_u16(&header_data[0..2]),
            unit_id: header_data[6],
        };
        let pdu_data = self.buf.split_to(pdu_len).freeze();
        Ok(Some((header, pdu_data)))
    }
}

/// Encode helper that appends a framed PDU to a [`BytesMut`], used by the
/// connection glue where frames are staged before transmission.
pub(crate) fn append_frame(hdr: Header, pdu_data: &[u8], out: &mut BytesMut) -> Result<()> {
    if pdu_data.is_empty() || pdu_data.len() > PDU_MAX {
        return Err(Error::InvalidArgument);
    }
    out.reserve(HEADER_LEN + pdu_data.len());
    out.put_u16(hdr.transaction_id);
    out.put_u16(PROTOCOL_ID);
    out.put_u16((pdu_data.len() + 1) as u16);
    out.put_u8(hdr.unit_id);
    out.put_slice(pdu_data);
    Ok(())
}
