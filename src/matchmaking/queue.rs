//! FIFO waiting pool of joined-but-unpaired players

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::game::PlayerBase;

/// Player in the waiting pool
#[derive(Debug, Clone)]
pub struct QueuedPlayer {
    pub player: PlayerBase,
    pub queued_at: Instant,
}

impl QueuedPlayer {
    pub fn new(player: PlayerBase) -> Self {
        Self {
            player,
            queued_at: Instant::now(),
        }
    }

    /// How long this player has been waiting
    pub fn wait_time(&self) -> Duration {
        self.queued_at.elapsed()
    }
}

/// The waiting pool, keyed by player id and ordered by arrival
#[derive(Debug, Default)]
pub struct WaitingPool {
    queue: VecDeque<QueuedPlayer>,
}

impl WaitingPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&PlayerBase> {
        self.queue
            .iter()
            .map(|q| &q.player)
            .find(|p| p.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Id of the queued player owning this connection, if any
    pub fn id_for_connection(&self, conn_id: &Uuid) -> Option<String> {
        self.queue
            .iter()
            .find(|q| q.player.connection_id().as_ref() == Some(conn_id))
            .map(|q| q.player.id.clone())
    }

    /// Append at the back. Callers check `contains` first.
    pub fn enqueue(&mut self, player: PlayerBase) {
        self.queue.push_back(QueuedPlayer::new(player));
    }

    /// Remove a player from the pool
    pub fn dequeue(&mut self, id: &str) -> Option<QueuedPlayer> {
        let pos = self.queue.iter().position(|q| q.player.id == id)?;
        self.queue.remove(pos)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pop the two oldest entries once at least two are waiting
    pub fn try_form_match(&mut self) -> Option<(QueuedPlayer, QueuedPlayer)> {
        if self.queue.len() < 2 {
            return None;
        }
        let first = self.queue.pop_front()?;
        let second = self.queue.pop_front()?;
        Some((first, second))
    }
}
