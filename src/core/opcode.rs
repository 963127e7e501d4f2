//! Opcodes of the match server protocol.
//!
//! The numeric values are fixed on the wire and must never be renumbered.
//! `Invalid` (0) is what an encoder produces when nobody set the field, so it
//! is treated as a protocol violation whenever it shows up inbound.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Packet discriminator, carried as a big-endian `i16` at the start of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum Opcode {
    Invalid = 0,
    Connect = 1,
    KeepAlive = 2,
    Forfeit = 3,
    AppPaused = 4,
    AppResumed = 5,
    MatchSuccess = 6,
    OpponentPaused = 7,
    OpponentResumed = 8,
    OpponentConnectionStatus = 9,
    PlayerReconnected = 10,
    MatchOver = 11,
    GameState = 12,
    PlayerInput = 13,
    Chat = 14,
}

impl Opcode {
    /// Raw wire value.
    #[inline]
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    /// Whether the client is allowed to send this opcode.
    pub fn is_client_bound(self) -> bool {
        matches!(
            self,
            Opcode::Connect
                | Opcode::KeepAlive
                | Opcode::Forfeit
                | Opcode::AppPaused
                | Opcode::AppResumed
                | Opcode::PlayerInput
                | Opcode::Chat
        )
    }
}

impl TryFrom<i16> for Opcode {
    type Error = ProtocolError;

    fn try_from(value: i16) -> Result<Self> {
        let opcode = match value {
            0 => Opcode::Invalid,
            1 => Opcode::Connect,
            2 => Opcode::KeepAlive,
            3 => Opcode::Forfeit,
            4 => Opcode::AppPaused,
            5 => Opcode::AppResumed,
            6 => Opcode::MatchSuccess,
            7 => Opcode::OpponentPaused,
            8 => Opcode::OpponentResumed,
            9 => Opcode::OpponentConnectionStatus,
            10 => Opcode::PlayerReconnected,
            11 => Opcode::MatchOver,
            12 => Opcode::GameState,
            13 => Opcode::PlayerInput,
            14 => Opcode::Chat,
            other => return Err(ProtocolError::InvalidOpcode(other)),
        };
        Ok(opcode)
    }
}

impl From<Opcode> for i16 {
    fn from(opcode: Opcode) -> Self {
        opcode.as_i16()
    }
}
