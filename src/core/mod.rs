//! # Core Protocol Components
//!
//! Opcodes, packet framing and the payload codec boundary.
//!
//! ## Components
//! - **Opcode**: fixed wire discriminators
//! - **Packet**: header + payload framing with a self-describing length
//! - **Message**: typed payloads of every message kind
//! - **Codec**: the `PacketCodec` boundary and a tokio framing codec
//!
//! ## Wire Format
//! ```text
//! [Opcode(2)] [Length(2)] [Payload(N)]
//! ```
//!
//! ## Limits
//! - Maximum message size: 65535 bytes, header included

pub mod codec;
pub mod message;
pub mod opcode;
pub mod packet;
