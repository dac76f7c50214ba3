//! Account backend integration: identity lookup and match history

pub mod accounts;
pub mod backend;

pub use accounts::{AccountService, Identity, IdentityResolver, MatchRecorder, OfflineAccounts};
pub use backend::{BackendClient, BackendError};
