//! Structured messages of the match protocol.
//!
//! The client core only ever looks at the opcode; these types exist for the
//! reference codec and for consumers that want typed access to payloads.

use crate::core::opcode::Opcode;
use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Application handshake, sent once right after the TLS handshake.
    Connect {
        user_id: i64,
        match_id: String,
        match_token: String,
    },
    KeepAlive,
    Forfeit,
    AppPaused,
    AppResumed,
    MatchSuccess {
        opponent_user_id: i64,
        tick_rate: i32,
    },
    OpponentPaused {
        time_remaining: i32,
    },
    OpponentResumed,
    OpponentConnectionStatus {
        status: i32,
        time_remaining: i32,
    },
    PlayerReconnected {
        user_id: i64,
    },
    MatchOver {
        player_score: i32,
        opponent_score: i32,
    },
    GameState {
        tick_count: u32,
        game_tick_count: u32,
        player_score: i32,
        opponent_score: i32,
    },
    PlayerInput {
        new_score: i32,
    },
    Chat {
        chat_id: i16,
    },
}

impl Message {
    pub fn opcode(&self) -> Opcode {
        match self {
            Message::Connect { .. } => Opcode::Connect,
            Message::KeepAlive => Opcode::KeepAlive,
            Message::Forfeit => Opcode::Forfeit,
            Message::AppPaused => Opcode::AppPaused,
            Message::AppResumed => Opcode::AppResumed,
            Message::MatchSuccess { .. } => Opcode::MatchSuccess,
            Message::OpponentPaused { .. } => Opcode::OpponentPaused,
            Message::OpponentResumed => Opcode::OpponentResumed,
            Message::OpponentConnectionStatus { .. } => Opcode::OpponentConnectionStatus,
            Message::PlayerReconnected { .. } => Opcode::PlayerReconnected,
            Message::MatchOver { .. } => Opcode::MatchOver,
            Message::GameState { .. } => Opcode::GameState,
            Message::PlayerInput { .. } => Opcode::PlayerInput,
            Message::Chat { .. } => Opcode::Chat,
        }
    }

    /// Serialize the message fields (without header) with bincode.
    pub fn encode_payload(&self) -> Result<Vec<u8>> {
        let payload = match self {
            Message::Connect {
                user_id,
                match_id,
                match_token,
            } => bincode::serialize(&(user_id, match_id, match_token))?,
            Message::KeepAlive
            | Message::Forfeit
            | Message::AppPaused
            | Message::AppResumed
            | Message::OpponentResumed => Vec::new(),
            Message::MatchSuccess {
                opponent_user_id,
                tick_rate,
            } => bincode::serialize(&(opponent_user_id, tick_rate))?,
            Message::OpponentPaused { time_remaining } => bincode::serialize(time_remaining)?,
            Message::OpponentConnectionStatus {
                status,
                time_remaining,
            } => bincode::serialize(&(status, time_remaining))?,
            Message::PlayerReconnected { user_id } => bincode::serialize(user_id)?,
            Message::MatchOver {
                player_score,
                opponent_score,
            } => bincode::serialize(&(player_score, opponent_score))?,
            Message::GameState {
                tick_count,
                game_tick_count,
                player_score,
                opponent_score,
            } => bincode::serialize(&(tick_count, game_tick_count, player_score, opponent_score))?,
            Message::PlayerInput { new_score } => bincode::serialize(new_score)?,
            Message::Chat { chat_id } => bincode::serialize(chat_id)?,
        };
        Ok(payload)
    }

    pub fn to_packet(&self) -> Result<Packet> {
        Ok(Packet::new(self.opcode(), self.encode_payload()?))
    }

    /// Rebuild a message from a decoded packet.
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        let p = packet.payload.as_slice();
        let message = match packet.opcode {
            Opcode::Invalid => return Err(ProtocolError::InvalidOpcode(0)),
            Opcode::Connect => {
                let (user_id, match_id, match_token): (i64, String, String) =
                    bincode::deserialize(p)?;
                Message::Connect {
                    user_id,
                    match_id,
                    match_token,
                }
            }
            Opcode::KeepAlive => Message::KeepAlive,
            Opcode::Forfeit => Message::Forfeit,
            Opcode::AppPaused => Message::AppPaused,
            Opcode::AppResumed => Message::AppResumed,
            Opcode::MatchSuccess => {
                let (opponent_user_id, tick_rate) = bincode::deserialize(p)?;
                Message::MatchSuccess {
                    opponent_user_id,
                    tick_rate,
                }
            }
            Opcode::OpponentPaused => Message::OpponentPaused {
                time_remaining: bincode::deserialize(p)?,
            },
            Opcode::OpponentResumed => Message::OpponentResumed,
            Opcode::OpponentConnectionStatus => {
                let (status, time_remaining) = bincode::deserialize(p)?;
                Message::OpponentConnectionStatus {
                    status,
                    time_remaining,
                }
            }
            Opcode::PlayerReconnected => Message::PlayerReconnected {
                user_id: bincode::deserialize(p)?,
            },
            Opcode::MatchOver => {
                let (player_score, opponent_score) = bincode::deserialize(p)?;
                Message::MatchOver {
                    player_score,
                    opponent_score,
                }
            }
            Opcode::GameState => {
                let (tick_count, game_tick_count, player_score, opponent_score) =
                    bincode::deserialize(p)?;
                Message::GameState {
                    tick_count,
                    game_tick_count,
                    player_score,
                    opponent_score,
                }
            }
            Opcode::PlayerInput => Message::PlayerInput {
                new_score: bincode::deserialize(p)?,
            },
            Opcode::Chat => Message::Chat {
                chat_id: bincode::deserialize(p)?,
            },
        };
        Ok(message)
    }
}
