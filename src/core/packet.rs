//! Packet framing.
//!
//! ```text
//! [Opcode(2, i16 BE)] [Length(2, u16 BE)] [Payload(N)]
//! ```
//!
//! The whole packet, header included, never exceeds [`MAX_MESSAGE_BYTES`].
//! The length field lets a packet describe itself to the transport, so
//! nothing above this layer adds another prefix.

use bytes::{BufMut, Bytes, BytesMut};

use crate::config::MAX_MESSAGE_BYTES;
use crate::core::opcode::Opcode;
use crate::error::{ProtocolError, Result};

/// Size of the fixed packet header.
pub const HEADER_LEN: usize = 4;

/// Largest payload that still fits in one message.
pub const MAX_PAYLOAD_LEN: usize = MAX_MESSAGE_BYTES - HEADER_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self { opcode, payload }
    }

    /// Total encoded length, header included.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Append the encoded packet to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::OversizedPacket(self.encoded_len()));
        }
        dst.reserve(self.encoded_len());
        dst.put_i16(self.opcode.as_i16());
        dst.put_u16(self.payload.len() as u16);
        dst.extend_from_slice(&self.payload);
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Parse one packet from the front of `data`. Trailing bytes are ignored.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (opcode, len) = parse_header(data)?;
        let end = HEADER_LEN + len;
        if data.len() < end {
            return Err(ProtocolError::TruncatedPacket(data.len()));
        }
        Ok(Self {
            opcode,
            payload: data[HEADER_LEN..end].to_vec(),
        })
    }
}

/// Read the opcode of a raw packet without touching the payload.
pub fn peek_opcode(data: &[u8]) -> Result<Opcode> {
    parse_header(data).map(|(opcode, _)| opcode)
}

/// Length of the packet at the front of `data`, header included.
///
/// `None` until the whole packet is present. The opcode is not checked, so
/// a packet of an unknown kind can still be skipped.
pub fn frame_len(data: &[u8]) -> Result<Option<usize>> {
    if data.len() < HEADER_LEN {
        return Ok(None);
    }
    let len = u16::from_be_bytes([data[2], data[3]]) as usize;
    if len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::OversizedPacket(HEADER_LEN + len));
    }
    let total = HEADER_LEN + len;
    Ok((data.len() >= total).then_some(total))
}

/// Decode the header into (opcode, payload length).
pub(crate) fn parse_header(data: &[u8]) -> Result<(Opcode, usize)> {
    if data.len() < HEADER_LEN {
        return Err(ProtocolError::TruncatedPacket(data.len()));
    }
    let opcode = Opcode::try_from(i16::from_be_bytes([data[0], data[1]]))?;
    let len = u16::from_be_bytes([data[2], data[3]]) as usize;
    if len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::OversizedPacket(HEADER_LEN + len));
    }
    Ok((opcode, len))
}
