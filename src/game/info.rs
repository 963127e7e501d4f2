use std::fmt;

/// Chat line shown in the match view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatEntry {
    pub chat_id: i16,
    /// `false` for lines the local player sent.
    pub from_opponent: bool,
}

/// View model of the running match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchInfo {
    pub state: String,
    pub user_id: String,
    pub opponent_id: String,
    pub player_score: i32,
    pub opponent_score: i32,
    pub current_tick: u32,
    pub current_game_tick: u32,
    pub tick_rate: i32,
    pub input_allowed: bool,
    pub chat: Vec<ChatEntry>,
}

impl Default for MatchInfo {
    fn default() -> Self {
        Self {
            state: "Connecting".to_string(),
            user_id: String::new(),
            opponent_id: String::new(),
            player_score: 0,
            opponent_score: 0,
            current_tick: 0,
            current_game_tick: 0,
            tick_rate: 0,
            input_allowed: true,
            chat: Vec::new(),
        }
    }
}

impl MatchInfo {
    pub fn set_paused_by_opponent(&mut self, time_remaining: i32) {
        self.state = format!("Paused by {}, {}s left...", self.opponent_id, time_remaining);
        self.input_allowed = false;
    }

    pub fn set_playing(&mut self) {
        self.state = "Playing".to_string();
        self.input_allowed = true;
    }

    pub fn set_game_over(&mut self) {
        let winner = if self.player_score > self.opponent_score {
            "You Won!"
        } else {
            "Opponent Won!"
        };
        self.state = format!("Game Over! {winner}");
        self.input_allowed = false;
    }
}

impl fmt::Display for MatchInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] you={} ({}) opponent={} ({}) tick={}/{} rate={}",
            self.state,
            self.user_id,
            self.player_score,
            self.opponent_id,
            self.opponent_score,
            self.current_game_tick,
            self.current_tick,
            self.tick_rate
        )
    }
}
