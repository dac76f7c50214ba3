//! Derived match statistics: score, touch/miss streaks and elapsed time

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::ws::protocol::ScoreLine;

use super::state::StateGame;

/// Tracks running streaks per player id and keeps the watermarks in
/// `PlayerStats` current. Physics stays purely spatial and reports touches
/// and concessions here.
#[derive(Debug, Clone)]
pub struct StateEngine {
    touch_runs: HashMap<String, u32>,
    miss_runs: HashMap<String, u32>,
}

impl StateEngine {
    /// Seed the running counters from the two match players
    pub fn new(state: &StateGame) -> Self {
        let seed = || {
            state
                .players
                .iter()
                .map(|p| (p.id().to_string(), 0))
                .collect::<HashMap<_, _>>()
        };

        Self {
            touch_runs: seed(),
            miss_runs: seed(),
        }
    }

    /// `scorer_id` won the rally, the other player conceded
    pub fn update_score(&mut self, state: &mut StateGame, scorer_id: &str) {
        let Some(scorer) = state.player_index(scorer_id) else {
            return;
        };
        state.players[scorer].stats.score += 1;

        let other = &mut state.players[1 - scorer];
        if let Some(run) = self.miss_runs.get_mut(other.id()) {
            // A concession after touching the ball only breaks the streak
            if other.stats.last_touch {
                *run = 0;
            } else {
                *run += 1;
                if *run > other.stats.missed_ball_in_row {
                    other.stats.missed_ball_in_row = *run;
                }
            }
        }
        other.stats.missed_ball += 1;
        other.stats.last_touch = false;
    }

    /// The paddle of `player_id` returned the ball
    pub fn update_touched_ball(&mut self, state: &mut StateGame, player_id: &str) {
        let Some(index) = state.player_index(player_id) else {
            return;
        };
        let player = &mut state.players[index];
        player.stats.touched_ball += 1;

        if let Some(run) = self.touch_runs.get_mut(player_id) {
            *run = if player.stats.last_touch { *run + 1 } else { 1 };
            if *run > player.stats.touched_ball_in_row {
                player.stats.touched_ball_in_row = *run;
            }
        }
        player.stats.last_touch = true;
    }

    /// `start = true` stamps the match date, otherwise refreshes the duration
    pub fn update_time(&self, state: &mut StateGame, start: bool) {
        self.update_time_at(state, start, Utc::now());
    }

    fn update_time_at(&self, state: &mut StateGame, start: bool, now: DateTime<Utc>) {
        if start {
            state.time.match_date = now;
            state.time.match_duration = 0;
        } else {
            let elapsed = now - state.time.match_date;
            state.time.match_duration = elapsed.num_seconds().max(0) as u64;
        }
    }

    pub fn elapsed_secs(&self, state: &StateGame) -> u64 {
        state.time.match_duration
    }

    /// Current score line in player slot order
    pub fn score_line(&self, state: &StateGame) -> Vec<ScoreLine> {
        state
            .players
            .iter()
            .map(|p| ScoreLine {
                score: p.stats.score,
            })
            .collect()
    }
}
