//! Game simulation modules

pub mod r#match;
pub mod physics;
pub mod snapshot;
pub mod state;
pub mod stats;

pub use r#match::{GameManager, MatchEnd, MatchPhase, MatchRegistry, MatchResult};
pub use state::{InputEvent, InputState, Key, PlayerBase};
