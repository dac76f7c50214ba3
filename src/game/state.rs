//! Shared per-match state: table, ball, paddles, players and clock

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::GameConfig;
use crate::ws::channel::ConnectionHandle;
use crate::ws::protocol::PlayerDescriptor;

/// Keys the simulation understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Up,
    Down,
}

/// Held/released state per key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputState {
    keys: HashMap<Key, bool>,
}

impl InputState {
    pub fn set(&mut self, key: Key, pressed: bool) {
        self.keys.insert(key, pressed);
    }

    pub fn is_pressed(&self, key: Key) -> bool {
        self.keys.get(&key).copied().unwrap_or(false)
    }
}

/// One key transition received from a client
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputEvent {
    pub key: Key,
    pub pressed: bool,
}

/// Identity plus connection of a player, before or after pairing
#[derive(Debug, Clone)]
pub struct PlayerBase {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
    /// None once the client is unreachable
    pub connection: Option<ConnectionHandle>,
    pub input_state: InputState,
}

impl PlayerBase {
    pub fn new(
        id: String,
        name: String,
        avatar: Option<String>,
        connection: Option<ConnectionHandle>,
        input_state: InputState,
    ) -> Self {
        Self {
            id,
            name,
            avatar,
            connection,
            input_state,
        }
    }

    pub fn descriptor(&self) -> PlayerDescriptor {
        PlayerDescriptor {
            name: self.name.clone(),
            id: self.id.clone(),
            avatar: self.avatar.clone(),
        }
    }

    pub fn connection_id(&self) -> Option<uuid::Uuid> {
        self.connection.as_ref().map(ConnectionHandle::id)
    }
}

/// Score and rally statistics for one player
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerStats {
    pub score: u32,
    pub touched_ball: u32,
    pub missed_ball: u32,
    /// Longest touch streak seen this match
    pub touched_ball_in_row: u32,
    /// Longest miss streak seen this match
    pub missed_ball_in_row: u32,
    /// This player's paddle touched the ball since their last concession
    pub last_touch: bool,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub base: PlayerBase,
    pub stats: PlayerStats,
}

impl Player {
    pub fn new(base: PlayerBase) -> Self {
        Self {
            base,
            stats: PlayerStats::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.base.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Table {
    pub width: f32,
    pub depth: f32,
    pub wall_thickness: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ball {
    /// Lateral (scoring) axis
    pub pos_x: f32,
    /// Depth axis, bounded by the side walls
    pub pos_z: f32,
    pub speed: f32,
    pub diameter: f32,
    pub dir_x: f32,
    pub dir_z: f32,
    pub on_wall: bool,
}

impl Ball {
    pub fn radius(&self) -> f32 {
        self.diameter / 2.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paddle {
    /// Owning player id
    pub id: String,
    pub player_name: String,
    pub pos_x: f32,
    pub pos_z: f32,
    pub width: f32,
    pub depth: f32,
    pub speed: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchTime {
    pub match_date: DateTime<Utc>,
    /// Whole seconds since `match_date`, refreshed every tick
    pub match_duration: u64,
}

/// Aggregate root for one match.
///
/// `paddles[i].id == players[i].id` holds for the whole match. Paddle 0 sits
/// on the positive lateral side and defends balls with `dir_x > 0`.
#[derive(Debug, Clone)]
pub struct StateGame {
    pub table: Table,
    pub ball: Ball,
    pub paddles: [Paddle; 2],
    pub players: [Player; 2],
    pub time: MatchTime,
}

impl StateGame {
    pub fn new(first: PlayerBase, second: PlayerBase, config: &GameConfig) -> Self {
        let table = Table {
            width: config.table_width,
            depth: config.table_depth,
            wall_thickness: config.wall_thickness,
        };

        let face_x = table.width / 2.0 - table.wall_thickness - config.paddle_depth / 2.0;
        let paddle = |owner: &PlayerBase, pos_x: f32| Paddle {
            id: owner.id.clone(),
            player_name: owner.name.clone(),
            pos_x,
            pos_z: 0.0,
            width: config.paddle_width,
            depth: config.paddle_depth,
            speed: config.paddle_speed,
        };
        let paddles = [paddle(&first, face_x), paddle(&second, -face_x)];

        Self {
            table,
            ball: Ball {
                pos_x: 0.0,
                pos_z: 0.0,
                speed: config.ball_speed,
                diameter: config.ball_diameter,
                dir_x: 1.0,
                dir_z: -1.0,
                on_wall: false,
            },
            paddles,
            players: [Player::new(first), Player::new(second)],
            time: MatchTime {
                match_date: Utc::now(),
                match_duration: 0,
            },
        }
    }

    pub fn player_index(&self, id: &str) -> Option<usize> {
        self.players.iter().position(|p| p.id() == id)
    }

    pub fn paddle_index(&self, id: &str) -> Option<usize> {
        self.paddles.iter().position(|p| p.id == id)
    }
}

#[cfg(test)]
pub(crate) fn test_player(id: &str) -> PlayerBase {
    PlayerBase::new(
        id.to_string(),
        format!("player-{}", id),
        None,
        None,
        InputState::default(),
    )
}
