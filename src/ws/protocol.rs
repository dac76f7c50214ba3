//! WebSocket protocol message definitions
//! These are the wire types for client-server communication.
//! Every frame is a JSON text message shaped `{"type": ..., "data": {...}}`.

use serde::{Deserialize, Serialize};

use crate::game::state::{Ball, Key, Paddle};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Enter the waiting pool (or get paired right away)
    Join {
        #[serde(rename = "infoPlayer")]
        info_player: InfoPlayer,
        /// Bearer token resolved against the account backend when configured
        #[serde(default)]
        token: Option<String>,
    },

    /// Key pressed (`type: true`) or released (`type: false`)
    Input {
        key: String,
        #[serde(rename = "type")]
        pressed: bool,
    },

    /// Client finished loading the match scene
    Ready,
}

/// Player description supplied by the client on join
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfoPlayer {
    pub name: String,
    /// Account id for registered users, null for guests
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Translate a raw client key code into the closed key set
pub fn translate_key(code: &str) -> Option<Key> {
    match code {
        "KeyW" | "ArrowUp" => Some(Key::Up),
        "KeyS" | "ArrowDown" => Some(Key::Down),
        _ => None,
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Joined the waiting pool, no opponent yet
    Wait,

    /// Both players are paired and the match is live
    Start { players: StartPlayers },

    /// Per-tick state
    Update {
        paddles: Vec<Paddle>,
        ball: Ball,
        players: Vec<ScoreLine>,
        /// Elapsed match time in seconds
        time: u64,
    },

    /// Opponent left, the match is over
    Win { message: String },

    /// Match ended on score
    GameOver {
        players: Vec<FinalScore>,
        time: u64,
    },
}

/// Public descriptor of one player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerDescriptor {
    pub name: String,
    pub id: String,
    pub avatar: Option<String>,
}

/// Slot-ordered descriptors carried by `start`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartPlayers {
    pub player1: PlayerDescriptor,
    pub player2: PlayerDescriptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreLine {
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalScore {
    pub id: String,
    pub name: String,
    pub score: u32,
}
