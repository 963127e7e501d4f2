//! Polling consumer of a [`SyncClient`].
//!
//! Lifecycle callbacks arrive on background tasks, so they are only latched
//! here and applied on the next [`MatchController::tick`], together with
//! every packet received since the previous tick.
//!
//! The client hands over whatever each read returned. Packets are cut out of
//! those buffers with the codec's length prefix; a packet split across reads
//! waits in `pending` for the rest of its bytes.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::BytesMut;
use tracing::{debug, info, warn};

use crate::client::{AbortReason, MatchLifecycle, SyncClient, SyncClientBuilder};
use crate::config::ConnectionConfig;
use crate::core::message::Message;
use crate::error::Result;
use crate::game::info::{ChatEntry, MatchInfo};

/// Lifecycle notifications waiting for the next tick.
#[derive(Debug, Default)]
struct LatchedEvents {
    connected: AtomicBool,
    /// Latest reconnect attempt, 0 when none is pending.
    reconnecting: AtomicU32,
    abort: Mutex<Option<AbortReason>>,
}

impl MatchLifecycle for LatchedEvents {
    fn connected(&self) {
        self.connected.store(true, Ordering::Release);
    }

    fn reconnecting(&self, attempt: u32) {
        self.reconnecting.store(attempt, Ordering::Release);
    }

    fn aborted(&self, reason: &AbortReason) {
        *self.abort.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.clone());
    }
}

impl LatchedEvents {
    fn take_abort(&self) -> Option<AbortReason> {
        self.abort
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

pub struct MatchController {
    client: SyncClient,
    events: Arc<LatchedEvents>,
    info: MatchInfo,
    tick_count: u32,
    pending: BytesMut,
}

impl MatchController {
    /// Build the client with this controller as its lifecycle sink.
    pub fn new(builder: SyncClientBuilder) -> Result<Self> {
        let events = Arc::new(LatchedEvents::default());
        let client = builder.lifecycle(events.clone()).build()?;
        client.context().set_game_over(false);
        client.context().set_app_paused(false);

        Ok(Self {
            client,
            events,
            info: MatchInfo::default(),
            tick_count: 0,
            pending: BytesMut::new(),
        })
    }

    pub fn start(&mut self, config: ConnectionConfig) -> Result<bool> {
        self.info.state = "Connecting".to_string();
        self.pending.clear();
        self.client.connect(config)
    }

    pub fn client(&self) -> &SyncClient {
        &self.client
    }

    pub fn info(&self) -> &MatchInfo {
        &self.info
    }

    pub fn is_game_over(&self) -> bool {
        self.client.context().is_game_over()
    }

    /// Apply pending lifecycle events and every received packet.
    pub fn tick(&mut self) {
        if let Some(reason) = self.events.take_abort() {
            self.abort_game(&reason);
        }
        if self.events.connected.swap(false, Ordering::AcqRel) {
            info!("Connected");
            self.pending.clear();
            self.info.state = "Connected, waiting for player".to_string();
        }
        let attempt = self.events.reconnecting.swap(0, Ordering::AcqRel);
        if attempt > 0 && !self.is_game_over() && !self.client.is_connected() {
            debug!(attempt, "Attempting reconnect");
            self.info.state = "Attempting Reconnect".to_string();
        }

        if !self.client.is_connected() && self.tick_count > 0 && !self.is_game_over() {
            self.info.state = "Disconnected".to_string();
        }

        while let Some(buffer) = self.client.try_receive() {
            if self.is_game_over() {
                return;
            }
            self.pending.extend_from_slice(&buffer);
            self.dispatch_pending();
        }
    }

    /// Apply every complete packet in `pending`.
    fn dispatch_pending(&mut self) {
        let codec = self.client.codec().clone();
        while !self.is_game_over() {
            let len = match codec.frame_len(&self.pending) {
                Ok(Some(len)) => len,
                Ok(None) => return,
                Err(e) => {
                    warn!(error = %e, bytes = self.pending.len(), "Dropping unframeable inbound bytes");
                    self.pending.clear();
                    return;
                }
            };
            let packet = self.pending.split_to(len);
            match codec.decode(&packet) {
                Ok(message) => self.on_message(message),
                Err(e) => warn!(error = %e, bytes = packet.len(), "Dropping undecodable packet"),
            }
        }
        self.pending.clear();
    }

    fn on_message(&mut self, message: Message) {
        match message {
            Message::MatchSuccess {
                opponent_user_id,
                tick_rate,
            } => {
                info!(opponent_user_id, "Match success");
                self.client.reset_read_watchdog();
                self.info.tick_rate = tick_rate;
                self.info.user_id = self
                    .client
                    .connection_config()
                    .map(|config| config.user_id.to_string())
                    .unwrap_or_default();
                self.info.opponent_id = opponent_user_id.to_string();
                self.info.state = "Playing".to_string();
                self.client
                    .set_read_timeout(self.client.settings().match_read_timeout);
            }
            Message::GameState {
                tick_count,
                game_tick_count,
                player_score,
                opponent_score,
            } => {
                self.tick_count = tick_count;
                self.info.player_score = player_score;
                self.info.opponent_score = opponent_score;
                self.info.current_game_tick = game_tick_count;
                self.info.current_tick = tick_count;
            }
            Message::MatchOver {
                player_score,
                opponent_score,
            } => {
                info!(player_score, opponent_score, "Match over");
                self.client.context().set_game_over(true);
                self.info.player_score = player_score;
                self.info.opponent_score = opponent_score;
                self.info.set_game_over();
                self.client.disconnect(true);
            }
            Message::OpponentPaused { time_remaining } => {
                debug!(time_remaining, "Opponent paused");
                self.info.set_paused_by_opponent(time_remaining);
            }
            Message::OpponentConnectionStatus {
                status,
                time_remaining,
            } => {
                debug!(status, time_remaining, "Opponent disconnected");
                self.info.set_paused_by_opponent(time_remaining);
            }
            Message::OpponentResumed => self.info.set_playing(),
            Message::PlayerReconnected { user_id } => {
                debug!(user_id, "Player reconnected");
                self.info.set_playing();
            }
            Message::Chat { chat_id } => self.info.chat.push(ChatEntry {
                chat_id,
                from_opponent: true,
            }),
            other => debug!(opcode = ?other.opcode(), "Ignoring unsupported message"),
        }
    }

    fn abort_game(&mut self, reason: &AbortReason) {
        self.tick_count = 0;
        self.pending.clear();
        self.client.disconnect(true);
        if self.is_game_over() {
            debug!(%reason, "Connection ended after the match");
            return;
        }
        warn!(%reason, "Aborting game");
        self.client.context().set_game_over(true);
        self.info.state = "Aborted".to_string();
        self.info.input_allowed = false;
    }

    /// Track application focus; the server is told when the app goes to the
    /// background so it can pause the match.
    pub fn set_app_focus(&self, focused: bool) -> Result<()> {
        self.client.context().set_app_paused(!focused);
        if focused {
            self.client.reset_read_watchdog();
            self.client.send_app_resumed()
        } else {
            self.client.stop_read_watchdog();
            self.client.send_app_paused()
        }
    }

    /// Send a keep-alive if connected. Call once per keep-alive interval.
    pub fn keep_alive(&self) {
        if self.client.is_connected() {
            if let Err(e) = self.client.send_keep_alive() {
                debug!(error = %e, "Keep-alive skipped");
            }
        }
    }

    pub fn forfeit(&self) -> Result<()> {
        info!("Forfeiting game");
        self.client.send_forfeit()
    }

    pub fn send_score_adjust(&self, score_difference: i32) -> Result<()> {
        self.client.send_player_input(score_difference)
    }

    pub fn send_chat(&mut self, chat_id: i16) -> Result<()> {
        self.client.send_chat(chat_id)?;
        self.info.chat.push(ChatEntry {
            chat_id,
            from_opponent: false,
        });
        Ok(())
    }

    /// Tear the client down for good.
    pub fn shutdown(&self) {
        self.client.metrics().log_metrics();
        self.client.reset();
    }
}
