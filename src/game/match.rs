//! Match lifecycle and authoritative tick loop

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::util::ticker::RepeatingTask;
use crate::util::time::tick_period;
use crate::ws::protocol::ServerMsg;

use super::physics::{PhysicsEngine, RallyEvent};
use super::snapshot::SnapshotBuilder;
use super::state::{InputEvent, Player, PlayerBase, StateGame};
use super::stats::StateEngine;

const OPPONENT_LEFT: &str = "Your opponent left the game";

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Paired and ticking, `start` not broadcast yet
    Constructed,
    /// Both clients notified
    Active,
    /// Tick loop stopped for good
    Over,
}

/// Why a match reached `Over`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEnd {
    Completed,
    Abandoned,
}

/// Final numbers for one player
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerResult {
    pub id: String,
    pub name: String,
    pub score: u32,
    pub touched_ball: u32,
    pub missed_ball: u32,
    pub touched_ball_in_row: u32,
    pub missed_ball_in_row: u32,
}

/// Record of a finished match handed to persistence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub match_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_secs: u64,
    pub players: Vec<PlayerResult>,
}

/// Everything the tick loop and inbound messages mutate, behind one lock
struct MatchCore {
    state: StateGame,
    physics: PhysicsEngine,
    stats: StateEngine,
    phase: MatchPhase,
    end: Option<MatchEnd>,
    ready: HashSet<String>,
}

impl MatchCore {
    fn broadcast(&self, msg: &ServerMsg) {
        for player in &self.state.players {
            if let Some(conn) = &player.base.connection {
                conn.send(msg.clone());
            }
        }
    }

    fn result(&self, match_id: Uuid) -> MatchResult {
        MatchResult {
            match_id,
            started_at: self.state.time.match_date,
            duration_secs: self.state.time.match_duration,
            players: self
                .state
                .players
                .iter()
                .map(|p| PlayerResult {
                    id: p.base.id.clone(),
                    name: p.base.name.clone(),
                    score: p.stats.score,
                    touched_ball: p.stats.touched_ball,
                    missed_ball: p.stats.missed_ball,
                    touched_ball_in_row: p.stats.touched_ball_in_row,
                    missed_ball_in_row: p.stats.missed_ball_in_row,
                })
                .collect(),
        }
    }
}

struct MatchInner {
    id: Uuid,
    settings: GameConfig,
    core: Mutex<MatchCore>,
    ticker: Mutex<Option<RepeatingTask>>,
    phase_tx: watch::Sender<MatchPhase>,
}

impl MatchInner {
    /// One simulation step. Returns false once the match is over.
    fn tick(&self) -> bool {
        let mut core = self.core.lock();
        if core.phase == MatchPhase::Over {
            return false;
        }

        let MatchCore {
            state,
            physics,
            stats,
            ..
        } = &mut *core;
        let event = physics.update(state, stats);
        stats.update_time(state, false);

        let update = SnapshotBuilder::update(state, stats);
        core.broadcast(&update);

        if let (Some(RallyEvent::Scored { player_id }), Some(target)) =
            (event, self.settings.score_to_win)
        {
            let reached = core
                .state
                .player_index(&player_id)
                .map(|i| core.state.players[i].stats.score >= target)
                .unwrap_or(false);
            if reached {
                self.finish_locked(&mut core);
                return false;
            }
        }

        true
    }

    fn start_locked(&self, core: &mut MatchCore) {
        if core.phase != MatchPhase::Constructed {
            return;
        }
        core.phase = MatchPhase::Active;
        core.broadcast(&SnapshotBuilder::start(&core.state));
        self.phase_tx.send_replace(MatchPhase::Active);

        info!(match_id = %self.id, "Match started");
    }

    fn finish_locked(&self, core: &mut MatchCore) {
        core.stats.update_time(&mut core.state, false);
        core.phase = MatchPhase::Over;
        core.end = Some(MatchEnd::Completed);
        self.stop_ticker();

        core.broadcast(&SnapshotBuilder::game_over(&core.state));
        self.phase_tx.send_replace(MatchPhase::Over);

        info!(
            match_id = %self.id,
            score_1 = core.state.players[0].stats.score,
            score_2 = core.state.players[1].stats.score,
            "Match finished"
        );
    }

    fn stop_ticker(&self) {
        if let Some(mut task) = self.ticker.lock().take() {
            task.cancel();
        }
    }
}

/// Owns and runs exactly one match. Cloning yields another handle to the
/// same match.
#[derive(Clone)]
pub struct GameManager {
    inner: Arc<MatchInner>,
}

impl GameManager {
    /// Build the match state and start ticking right away
    pub fn new(first: PlayerBase, second: PlayerBase, settings: GameConfig) -> Self {
        let id = Uuid::new_v4();
        let mut state = StateGame::new(first, second, &settings);
        let stats = StateEngine::new(&state);
        stats.update_time(&mut state, true);

        let (phase_tx, _) = watch::channel(MatchPhase::Constructed);
        let period = tick_period(settings.tick_rate);

        let inner = Arc::new(MatchInner {
            id,
            settings,
            core: Mutex::new(MatchCore {
                state,
                physics: PhysicsEngine::new(),
                stats,
                phase: MatchPhase::Constructed,
                end: None,
                ready: HashSet::new(),
            }),
            ticker: Mutex::new(None),
            phase_tx,
        });

        let weak = Arc::downgrade(&inner);
        let task = RepeatingTask::spawn(period, move || match weak.upgrade() {
            Some(inner) => inner.tick(),
            None => false,
        });
        *inner.ticker.lock() = Some(task);

        info!(match_id = %id, "Created new match");

        Self { inner }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn phase(&self) -> MatchPhase {
        self.inner.core.lock().phase
    }

    pub fn end(&self) -> Option<MatchEnd> {
        self.inner.core.lock().end
    }

    /// Both players in slot order
    pub fn get_players(&self) -> Vec<Player> {
        self.inner.core.lock().state.players.to_vec()
    }

    /// Broadcast `start` to both players (once)
    pub fn start_game(&self) {
        let mut core = self.inner.core.lock();
        self.inner.start_locked(&mut core);
    }

    /// Record readiness. Returns true once both players are ready; with
    /// ready gating enabled that is also when `start` goes out.
    pub fn mark_ready(&self, player_id: &str) -> bool {
        let mut core = self.inner.core.lock();
        if core.state.player_index(player_id).is_none() {
            return false;
        }

        core.ready.insert(player_id.to_string());
        let all_ready = core.ready.len() == core.state.players.len();
        debug!(match_id = %self.inner.id, player_id = %player_id, all_ready, "Player ready");

        if all_ready && self.inner.settings.require_ready {
            self.inner.start_locked(&mut core);
        }
        all_ready
    }

    /// Apply a key transition; it is seen by the next tick
    pub fn handle_player_input(&self, player_id: &str, event: InputEvent) {
        let mut core = self.inner.core.lock();
        if core.phase == MatchPhase::Over {
            return;
        }

        let MatchCore { state, physics, .. } = &mut *core;
        if let Some(index) = state.player_index(player_id) {
            physics.handle_player_input(&mut state.players[index], event);
        }
    }

    /// A player disconnected: stop the match for good, tell the opponent,
    /// and mark the departing player unreachable. Safe to call repeatedly.
    pub fn remove_player(&self, player_id: &str) {
        let mut core = self.inner.core.lock();
        let was_over = core.phase == MatchPhase::Over;

        core.phase = MatchPhase::Over;
        core.end.get_or_insert(MatchEnd::Abandoned);
        self.inner.stop_ticker();

        if !was_over {
            let win = ServerMsg::Win {
                message: OPPONENT_LEFT.to_string(),
            };
            for player in core.state.players.iter().filter(|p| p.id() != player_id) {
                if let Some(conn) = player.base.connection.as_ref().filter(|c| c.is_open()) {
                    conn.send(win.clone());
                }
            }
        }

        if let Some(index) = core.state.player_index(player_id) {
            core.state.players[index].base.connection = None;
        }
        self.inner.phase_tx.send_replace(MatchPhase::Over);

        info!(match_id = %self.inner.id, player_id = %player_id, "Player left match");
    }

    /// End the match on the game's own terms. Returns the result unless the
    /// match was already over.
    pub fn finish(&self) -> Option<MatchResult> {
        let mut core = self.inner.core.lock();
        if core.phase == MatchPhase::Over {
            return None;
        }
        self.inner.finish_locked(&mut core);
        Some(core.result(self.inner.id))
    }

    /// Result of a naturally completed match
    pub fn result(&self) -> Option<MatchResult> {
        let core = self.inner.core.lock();
        match core.end {
            Some(MatchEnd::Completed) => Some(core.result(self.inner.id)),
            _ => None,
        }
    }

    /// Resolves once the match reached `Over`
    pub async fn wait_over(&self) {
        let mut rx = self.inner.phase_tx.subscribe();
        loop {
            let phase = *rx.borrow_and_update();
            if phase == MatchPhase::Over || rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn ticker_running(&self) -> bool {
        self.inner
            .ticker
            .lock()
            .as_ref()
            .map(|task| !task.is_cancelled())
            .unwrap_or(false)
    }

    #[cfg(test)]
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut StateGame) -> R) -> R {
        f(&mut self.inner.core.lock().state)
    }
}

/// Registry of all active matches, indexed by match and by connection
pub struct MatchRegistry {
    matches: DashMap<Uuid, GameManager>,
    connections: DashMap<Uuid, Uuid>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
            connections: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<GameManager> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    /// Register a match and bind both players' connections to it
    pub fn insert(&self, game: GameManager) {
        for player in game.get_players() {
            if let Some(conn_id) = player.base.connection_id() {
                self.connections.insert(conn_id, game.id());
            }
        }
        self.matches.insert(game.id(), game);
    }

    pub fn remove(&self, id: &Uuid) -> Option<GameManager> {
        self.connections.retain(|_, match_id| *match_id != *id);
        self.matches.remove(id).map(|(_, game)| game)
    }

    /// Match a connection is currently playing in
    pub fn game_for_connection(&self, conn_id: &Uuid) -> Option<GameManager> {
        let match_id = *self.connections.get(conn_id)?;
        self.get(&match_id)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    pub fn total_players(&self) -> usize {
        self.connections.len()
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{test_player, Key};
    use crate::ws::channel::test_connection;
    use crate::ws::protocol::ServerMsg;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn connected(id: &str) -> (PlayerBase, UnboundedReceiver<ServerMsg>) {
        let (conn, rx) = test_connection();
        let mut player = test_player(id);
        player.connection = Some(conn);
        (player, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn start_game_notifies_both_players_once() {
        let (p1, mut rx1) = connected("1");
        let (p2, mut rx2) = connected("2");
        let game = GameManager::new(p1, p2, GameConfig::default());
        assert_eq!(game.phase(), MatchPhase::Constructed);

        game.start_game();
        game.start_game();
        assert_eq!(game.phase(), MatchPhase::Active);

        for rx in [&mut rx1, &mut rx2] {
            let starts: Vec<_> = drain(rx)
                .into_iter()
                .filter_map(|m| match m {
                    ServerMsg::Start { players } => Some(players),
                    _ => None,
                })
                .collect();
            assert_eq!(starts.len(), 1);
            assert_eq!(starts[0].player1.id, "1");
            assert_eq!(starts[0].player2.id, "2");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn tick_loop_runs_before_start_and_broadcasts_updates() {
        let (p1, mut rx1) = connected("1");
        let (p2, _rx2) = connected("2");
        let game = GameManager::new(p1, p2, GameConfig::default());

        tokio::time::sleep(Duration::from_millis(340)).await;

        let updates = drain(&mut rx1)
            .into_iter()
            .filter(|m| matches!(m, ServerMsg::Update { .. }))
            .count();
        assert!(updates >= 10, "got {} updates", updates);
        assert!(game.ticker_running());
        assert!(game.with_state(|s| s.ball.pos_x) > 0.9);
    }

    #[tokio::test(start_paused = true)]
    async fn held_key_moves_the_paddle_on_next_tick() {
        let (p1, _rx1) = connected("1");
        let (p2, _rx2) = connected("2");
        let game = GameManager::new(p1, p2, GameConfig::default());

        game.handle_player_input(
            "2",
            InputEvent {
                key: Key::Down,
                pressed: true,
            },
        );
        game.handle_player_input(
            "ghost",
            InputEvent {
                key: Key::Up,
                pressed: true,
            },
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        let (left, right) = game.with_state(|s| (s.paddles[0].pos_z, s.paddles[1].pos_z));
        assert_eq!(left, 0.0);
        assert!(right > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_notifies_opponent_and_stops_updates() {
        let (p1, mut rx1) = connected("1");
        let (p2, _rx2) = connected("2");
        let game = GameManager::new(p1, p2, GameConfig::default());
        game.start_game();
        tokio::time::sleep(Duration::from_millis(100)).await;

        game.remove_player("2");

        let messages = drain(&mut rx1);
        assert!(matches!(messages.last(), Some(ServerMsg::Win { .. })));
        assert_eq!(game.phase(), MatchPhase::Over);
        assert_eq!(game.end(), Some(MatchEnd::Abandoned));
        assert!(!game.ticker_running());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(drain(&mut rx1).is_empty());

        let players = game.get_players();
        assert!(players[1].base.connection.is_none());
        assert_eq!(players[1].id(), "2");
        assert_eq!(players[1].base.name, "player-2");
        assert!(game.result().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn remove_with_unreachable_opponent_does_not_panic() {
        let (p1, mut rx1) = connected("1");
        let game = GameManager::new(p1, test_player("2"), GameConfig::default());
        tokio::time::sleep(Duration::from_millis(70)).await;

        game.remove_player("1");
        game.remove_player("1");
        game.remove_player("2");

        assert_eq!(game.phase(), MatchPhase::Over);
        assert!(!game.ticker_running());
        assert!(drain(&mut rx1)
            .iter()
            .all(|m| matches!(m, ServerMsg::Update { .. })));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(drain(&mut rx1).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn ready_gating_holds_start_until_both_ready() {
        let (p1, mut rx1) = connected("1");
        let (p2, _rx2) = connected("2");
        let settings = GameConfig {
            require_ready: true,
            ..GameConfig::default()
        };
        let game = GameManager::new(p1, p2, settings);

        assert!(!game.mark_ready("1"));
        assert!(!game.mark_ready("1"));
        assert!(!game.mark_ready("stranger"));
        assert_eq!(game.phase(), MatchPhase::Constructed);

        assert!(game.mark_ready("2"));
        assert_eq!(game.phase(), MatchPhase::Active);
        assert!(drain(&mut rx1)
            .iter()
            .any(|m| matches!(m, ServerMsg::Start { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn reaching_score_to_win_finishes_the_match() {
        let (p1, mut rx1) = connected("1");
        let (p2, _rx2) = connected("2");
        let settings = GameConfig {
            score_to_win: Some(1),
            ..GameConfig::default()
        };
        let game = GameManager::new(p1, p2, settings);
        game.start_game();
        game.with_state(|s| {
            s.paddles[0].pos_z = 3.5;
            s.ball.pos_x = 8.95;
        });

        game.wait_over().await;

        assert_eq!(game.end(), Some(MatchEnd::Completed));
        let result = game.result().expect("completed match has a result");
        assert_eq!(result.match_id, game.id());
        assert_eq!(result.players[1].score, 1);
        assert_eq!(result.players[0].missed_ball, 1);
        assert!(matches!(
            drain(&mut rx1).last(),
            Some(ServerMsg::GameOver { .. })
        ));
        assert!(game.finish().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn external_finish_returns_the_result_once() {
        let (p1, _rx1) = connected("1");
        let (p2, _rx2) = connected("2");
        let game = GameManager::new(p1, p2, GameConfig::default());

        let result = game.finish().expect("first finish yields a result");
        assert_eq!(result.players.len(), 2);
        assert!(game.finish().is_none());

        // A later disconnect must not announce a forfeit
        game.remove_player("1");
        assert_eq!(game.end(), Some(MatchEnd::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn registry_indexes_matches_by_connection() {
        let (p1, _rx1) = connected("1");
        let (p2, _rx2) = connected("2");
        let conn_1 = p1.connection_id().unwrap();
        let registry = MatchRegistry::new();
        let game = GameManager::new(p1, p2, GameConfig::default());

        registry.insert(game.clone());
        assert_eq!(registry.active_matches(), 1);
        assert_eq!(registry.total_players(), 2);
        assert_eq!(
            registry.game_for_connection(&conn_1).map(|g| g.id()),
            Some(game.id())
        );

        registry.remove(&game.id());
        assert_eq!(registry.active_matches(), 0);
        assert!(registry.game_for_connection(&conn_1).is_none());
    }
}
