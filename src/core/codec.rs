//! Codec boundary between the transport core and message payloads.
//!
//! The connection core never looks past the opcode. Everything it needs from
//! a payload codec is captured by [`PacketCodec`]; [`BincodeCodec`] is the
//! stock implementation and [`FrameCodec`] frames the same packets over a
//! byte stream for servers and test harnesses.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::message::Message;
use crate::core::opcode::Opcode;
use crate::core::packet::{self, Packet, HEADER_LEN};
use crate::error::{ProtocolError, Result};

/// Payload codec used by the client and by consumers of inbound packets.
pub trait PacketCodec: Send + Sync + 'static {
    /// Read the opcode of a raw inbound buffer.
    fn opcode(&self, data: &[u8]) -> Result<Opcode>;

    /// Produce the raw bytes of one outbound message.
    fn encode(&self, message: &Message) -> Result<Bytes>;

    /// Fully decode a raw inbound buffer.
    fn decode(&self, data: &[u8]) -> Result<Message>;

    /// Length of the first packet in `data`, or `None` while it is incomplete.
    ///
    /// One inbound buffer may hold several packets, or only part of one.
    fn frame_len(&self, data: &[u8]) -> Result<Option<usize>>;
}

/// Length-prefixed packets with bincode-encoded fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeCodec;

impl PacketCodec for BincodeCodec {
    fn opcode(&self, data: &[u8]) -> Result<Opcode> {
        packet::peek_opcode(data)
    }

    fn encode(&self, message: &Message) -> Result<Bytes> {
        message.to_packet()?.to_bytes()
    }

    fn decode(&self, data: &[u8]) -> Result<Message> {
        Message::from_packet(&Packet::from_bytes(data)?)
    }

    fn frame_len(&self, data: &[u8]) -> Result<Option<usize>> {
        packet::frame_len(data)
    }
}

/// Tokio codec that frames [`Packet`]s over a byte stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let (opcode, len) = packet::parse_header(src)?;
        let total = HEADER_LEN + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        let frame = src.split_to(total);
        Ok(Some(Packet {
            opcode,
            payload: frame[HEADER_LEN..].to_vec(),
        }))
    }
}

impl Encoder<Packet> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<()> {
        item.encode_into(dst)
    }
}
