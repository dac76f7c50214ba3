//! Matchmaking: waiting pool and pairing

pub mod queue;
pub mod service;

pub use service::{JoinOutcome, MatchMaking, PlayerIdentity};
