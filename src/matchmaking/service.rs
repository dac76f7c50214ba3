//! Matchmaking service - FIFO pairing of waiting players into matches

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::game::{GameManager, InputState, MatchRegistry, PlayerBase};
use crate::store::{Identity, MatchRecorder};
use crate::ws::channel::ConnectionHandle;
use crate::ws::protocol::InfoPlayer;

use super::queue::WaitingPool;

/// Who is joining: an account id for registered users, none for guests
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerIdentity {
    pub id: Option<u64>,
    pub name: String,
    pub avatar: Option<String>,
}

impl From<InfoPlayer> for PlayerIdentity {
    fn from(info: InfoPlayer) -> Self {
        Self {
            id: info.id,
            name: info.name,
            avatar: info.avatar,
        }
    }
}

impl From<Identity> for PlayerIdentity {
    fn from(identity: Identity) -> Self {
        Self {
            id: Some(identity.id),
            name: identity.username,
            avatar: identity.avatar,
        }
    }
}

/// Result of a join: the caller tells the client to wait when `game` is none
#[derive(Clone)]
pub struct JoinOutcome {
    pub player: PlayerBase,
    pub game: Option<GameManager>,
    /// `player` is the record waiting or playing on the joining connection.
    /// False when the join was folded into another connection's entry or
    /// refused because the connection already waits under another id.
    pub owned: bool,
}

/// Matchmaking service
pub struct MatchMaking {
    pool: Mutex<WaitingPool>,
    registry: Arc<MatchRegistry>,
    recorder: Arc<dyn MatchRecorder>,
    settings: GameConfig,
}

impl MatchMaking {
    pub fn new(
        registry: Arc<MatchRegistry>,
        recorder: Arc<dyn MatchRecorder>,
        settings: GameConfig,
    ) -> Self {
        Self {
            pool: Mutex::new(WaitingPool::new()),
            registry,
            recorder,
            settings,
        }
    }

    /// Queue a player, or pair them with the oldest waiting player
    pub fn add_player(
        &self,
        connection: Option<ConnectionHandle>,
        identity: PlayerIdentity,
        input_state: InputState,
    ) -> JoinOutcome {
        let id_player = identity
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let conn_id = connection.as_ref().map(ConnectionHandle::id);
        let mut pool = self.pool.lock();

        // Repeated join for an identity that is already waiting
        if let Some(existing) = pool.get(&id_player) {
            return JoinOutcome {
                owned: existing.connection_id() == conn_id,
                player: existing.clone(),
                game: None,
            };
        }

        let player = PlayerBase::new(
            id_player,
            identity.name,
            identity.avatar,
            connection,
            input_state,
        );

        if let Some(conn_id) = conn_id {
            if let Some(owner) = pool.id_for_connection(&conn_id) {
                warn!(
                    player_id = %player.id,
                    queued_as = %owner,
                    "Connection already waiting under another identity"
                );
                return JoinOutcome {
                    player,
                    game: None,
                    owned: false,
                };
            }
        }

        pool.enqueue(player.clone());
        info!(player_id = %player.id, queue_size = pool.len(), "Player joined waiting pool");

        let Some((first, second)) = pool.try_form_match() else {
            return JoinOutcome {
                player,
                game: None,
                owned: true,
            };
        };

        info!(
            player_1 = %first.player.id,
            player_2 = %second.player.id,
            waited_ms = first.wait_time().as_millis() as u64,
            "Paired players"
        );

        // Registered before the pool lock is released, so a disconnect that
        // misses the pool always finds the match
        let game = GameManager::new(first.player, second.player, self.settings.clone());
        self.registry.insert(game.clone());
        drop(pool);
        self.spawn_reaper(game.clone());

        JoinOutcome {
            player,
            game: Some(game),
            owned: true,
        }
    }

    /// Evict a waiting player. No-op if absent or already matched.
    pub fn remove_player(&self, id: &str) -> Option<PlayerBase> {
        let removed = self.pool.lock().dequeue(id).map(|q| q.player);
        if removed.is_some() {
            info!(player_id = %id, "Player left waiting pool");
        }
        removed
    }

    /// Evict whatever entry this connection is waiting under
    pub fn remove_connection(&self, conn_id: &Uuid) -> Option<PlayerBase> {
        let id = self.pool.lock().id_for_connection(conn_id)?;
        self.remove_player(&id)
    }

    pub fn queue_size(&self) -> usize {
        self.pool.lock().len()
    }

    pub fn is_queued(&self, id: &str) -> bool {
        self.pool.lock().contains(id)
    }

    /// Drop the match from the registry once it is over and persist
    /// naturally completed results.
    fn spawn_reaper(&self, game: GameManager) {
        let registry = self.registry.clone();
        let recorder = self.recorder.clone();

        tokio::spawn(async move {
            game.wait_over().await;
            registry.remove(&game.id());

            if let Some(result) = game.result() {
                if let Err(e) = recorder.record(&result).await {
                    error!(match_id = %game.id(), error = %e, "Failed to persist match result");
                }
            }

            info!(match_id = %game.id(), "Match removed from registry");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{MatchPhase, MatchResult};
    use crate::store::{BackendError, OfflineAccounts};
    use crate::ws::channel::test_connection;
    use async_trait::async_trait;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingRecorder {
        results: Mutex<Vec<MatchResult>>,
    }

    #[async_trait]
    impl MatchRecorder for RecordingRecorder {
        async fn record(&self, result: &MatchResult) -> Result<(), BackendError> {
            self.results.lock().push(result.clone());
            Ok(())
        }
    }

    fn service() -> (MatchMaking, Arc<MatchRegistry>) {
        let registry = Arc::new(MatchRegistry::new());
        let service = MatchMaking::new(
            registry.clone(),
            Arc::new(OfflineAccounts),
            GameConfig::default(),
        );
        (service, registry)
    }

    fn registered(id: u64) -> PlayerIdentity {
        PlayerIdentity {
            id: Some(id),
            name: format!("user{}", id),
            avatar: None,
        }
    }

    fn guest(name: &str) -> PlayerIdentity {
        PlayerIdentity {
            id: None,
            name: name.to_string(),
            avatar: None,
        }
    }

    #[tokio::test]
    async fn second_join_pairs_in_arrival_order() {
        let (service, registry) = service();
        let (conn_a, _rx_a) = test_connection();
        let (conn_b, _rx_b) = test_connection();

        let first = service.add_player(Some(conn_a), registered(1), InputState::default());
        assert_eq!(first.player.id, "1");
        assert!(first.game.is_none());
        assert_eq!(service.queue_size(), 1);

        let second = service.add_player(Some(conn_b), registered(2), InputState::default());
        assert_eq!(second.player.id, "2");
        let game = second.game.expect("second join creates a match");
        let ids: Vec<String> = game.get_players().iter().map(|p| p.id().to_string()).collect();
        assert_eq!(ids, vec!["1", "2"]);

        assert_eq!(service.queue_size(), 0);
        assert_eq!(registry.active_matches(), 1);
    }

    #[tokio::test]
    async fn repeated_join_is_idempotent() {
        let (service, _) = service();
        let (conn, _rx) = test_connection();
        let conn_id = conn.id();

        let first = service.add_player(Some(conn.clone()), registered(7), InputState::default());
        let again = service.add_player(Some(conn), registered(7), InputState::default());

        assert_eq!(first.player.id, again.player.id);
        assert_eq!(again.player.connection_id(), Some(conn_id));
        assert!(again.owned);
        assert!(again.game.is_none());
        assert_eq!(service.queue_size(), 1);
    }

    #[tokio::test]
    async fn second_connection_with_same_identity_is_folded() {
        let (service, _) = service();
        let (conn_a, _rx_a) = test_connection();
        let (conn_b, _rx_b) = test_connection();
        let conn_a_id = conn_a.id();

        service.add_player(Some(conn_a), registered(7), InputState::default());
        let folded = service.add_player(Some(conn_b), registered(7), InputState::default());

        assert_eq!(folded.player.connection_id(), Some(conn_a_id));
        assert!(!folded.owned);
        assert_eq!(service.queue_size(), 1);
    }

    #[tokio::test]
    async fn reused_connection_is_not_queued_twice() {
        let (service, registry) = service();
        let (conn, _rx) = test_connection();

        service.add_player(Some(conn.clone()), registered(1), InputState::default());
        let collision = service.add_player(Some(conn), registered(2), InputState::default());

        assert_eq!(collision.player.id, "2");
        assert!(!collision.owned);
        assert!(collision.game.is_none());
        assert_eq!(service.queue_size(), 1);
        assert!(!service.is_queued("2"));
        assert_eq!(registry.active_matches(), 0);
    }

    #[tokio::test]
    async fn guests_get_distinct_generated_ids() {
        let (service, _) = service();
        let (conn_a, _rx_a) = test_connection();
        let (conn_b, _rx_b) = test_connection();

        let a = service.add_player(Some(conn_a), guest("anon"), InputState::default());
        let b = service.add_player(Some(conn_b), guest("anon"), InputState::default());

        assert_ne!(a.player.id, b.player.id);
        assert!(Uuid::parse_str(&a.player.id).is_ok());
        assert!(b.game.is_some());
    }

    #[tokio::test]
    async fn third_player_waits_alone() {
        let (service, _) = service();
        let mut receivers = Vec::new();
        let mut outcomes = Vec::new();
        for id in 1..=3 {
            let (conn, rx) = test_connection();
            receivers.push(rx);
            outcomes.push(service.add_player(Some(conn), registered(id), InputState::default()));
        }

        assert!(outcomes[1].game.is_some());
        assert!(outcomes[2].game.is_none());
        assert_eq!(service.queue_size(), 1);
        assert!(service.is_queued("3"));
    }

    #[tokio::test]
    async fn abandoned_entry_does_not_pair() {
        let (service, _) = service();
        let (conn_a, _rx_a) = test_connection();
        let (conn_b, _rx_b) = test_connection();
        let conn_a_id = conn_a.id();

        service.add_player(Some(conn_a), registered(1), InputState::default());
        assert!(service.remove_connection(&conn_a_id).is_some());
        assert!(service.remove_player("1").is_none());

        let next = service.add_player(Some(conn_b), registered(2), InputState::default());
        assert!(next.game.is_none());
        assert_eq!(service.queue_size(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn paired_connection_is_never_lost_between_pool_and_registry() {
        let (service, registry) = service();
        let service = Arc::new(service);

        for round in 0..200u64 {
            let (conn_a, _rx_a) = test_connection();
            let (conn_b, _rx_b) = test_connection();
            let conn_a_id = conn_a.id();
            let conn_b_id = conn_b.id();
            service.add_player(Some(conn_a), registered(round * 2 + 1), InputState::default());

            let joiner = {
                let service = service.clone();
                tokio::spawn(async move {
                    service.add_player(Some(conn_b), registered(round * 2 + 2), InputState::default());
                })
            };

            // Same order as a session disconnect: pool first, then the match
            if service.remove_connection(&conn_a_id).is_none() {
                let game = registry
                    .game_for_connection(&conn_a_id)
                    .expect("player left the pool without a registered match");
                game.remove_player(&(round * 2 + 1).to_string());
            }

            joiner.await.unwrap();
            service.remove_connection(&conn_b_id);
        }

        assert_eq!(service.queue_size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_match_is_reaped_and_recorded() {
        let registry = Arc::new(MatchRegistry::new());
        let recorder = Arc::new(RecordingRecorder::default());
        let service = MatchMaking::new(registry.clone(), recorder.clone(), GameConfig::default());
        let (conn_a, _rx_a) = test_connection();
        let (conn_b, _rx_b) = test_connection();

        service.add_player(Some(conn_a), registered(1), InputState::default());
        let game = service
            .add_player(Some(conn_b), registered(2), InputState::default())
            .game
            .unwrap();
        game.start_game();

        assert!(game.finish().is_some());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(registry.active_matches(), 0);
        let results = recorder.results.lock();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_id, game.id());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_match_is_reaped_but_not_recorded() {
        let registry = Arc::new(MatchRegistry::new());
        let recorder = Arc::new(RecordingRecorder::default());
        let service = MatchMaking::new(registry.clone(), recorder.clone(), GameConfig::default());
        let (conn_a, _rx_a) = test_connection();
        let (conn_b, _rx_b) = test_connection();

        service.add_player(Some(conn_a), registered(1), InputState::default());
        let game = service
            .add_player(Some(conn_b), registered(2), InputState::default())
            .game
            .unwrap();

        game.remove_player("1");
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(game.phase(), MatchPhase::Over);
        assert_eq!(registry.active_matches(), 0);
        assert!(recorder.results.lock().is_empty());
    }
}
