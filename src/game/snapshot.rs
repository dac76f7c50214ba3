//! Builds outbound payloads from the match state

use crate::ws::protocol::{FinalScore, ServerMsg, StartPlayers};

use super::state::StateGame;
use super::stats::StateEngine;

/// Builds the messages a match broadcasts
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// `start` payload with descriptors in slot order
    pub fn start(state: &StateGame) -> ServerMsg {
        ServerMsg::Start {
            players: StartPlayers {
                player1: state.players[0].base.descriptor(),
                player2: state.players[1].base.descriptor(),
            },
        }
    }

    /// Per-tick `update` payload
    pub fn update(state: &StateGame, stats: &StateEngine) -> ServerMsg {
        ServerMsg::Update {
            paddles: state.paddles.to_vec(),
            ball: state.ball.clone(),
            players: stats.score_line(state),
            time: stats.elapsed_secs(state),
        }
    }

    /// Final `game_over` payload
    pub fn game_over(state: &StateGame) -> ServerMsg {
        ServerMsg::GameOver {
            players: state
                .players
                .iter()
                .map(|p| FinalScore {
                    id: p.base.id.clone(),
                    name: p.base.name.clone(),
                    score: p.stats.score,
                })
                .collect(),
            time: state.time.match_duration,
        }
    }
}
