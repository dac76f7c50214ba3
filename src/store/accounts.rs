//! Identity lookup and match history capabilities

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::game::MatchResult;

use super::backend::{BackendClient, BackendError};

/// Account as known by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Resolves a bearer token to an account
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Option<Identity>, BackendError>;
}

/// Persists the outcome of a finished match
#[async_trait]
pub trait MatchRecorder: Send + Sync {
    async fn record(&self, result: &MatchResult) -> Result<(), BackendError>;
}

/// Account backend reached over HTTP
#[derive(Clone)]
pub struct AccountService {
    client: BackendClient,
}

impl AccountService {
    pub const IDENTITY_PATH: &'static str = "api/users/me";
    pub const MATCHES_PATH: &'static str = "api/matches";

    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdentityResolver for AccountService {
    async fn resolve(&self, token: &str) -> Result<Option<Identity>, BackendError> {
        self.client.get_as_user(Self::IDENTITY_PATH, token).await
    }
}

#[async_trait]
impl MatchRecorder for AccountService {
    async fn record(&self, result: &MatchResult) -> Result<(), BackendError> {
        self.client.post(Self::MATCHES_PATH, result).await
    }
}

/// Stand-in when no account backend is configured: every token is unknown
/// and results are only logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineAccounts;

#[async_trait]
impl IdentityResolver for OfflineAccounts {
    async fn resolve(&self, _token: &str) -> Result<Option<Identity>, BackendError> {
        Ok(None)
    }
}

#[async_trait]
impl MatchRecorder for OfflineAccounts {
    async fn record(&self, result: &MatchResult) -> Result<(), BackendError> {
        debug!(match_id = %result.match_id, "No account backend, match result not persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_parses_backend_payload() {
        let identity: Identity =
            serde_json::from_str(r#"{"id":12,"username":"marvin","avatar":"/img/12.png"}"#).unwrap();
        assert_eq!(identity.id, 12);
        assert_eq!(identity.username, "marvin");

        let bare: Identity = serde_json::from_str(r#"{"id":3,"username":"z"}"#).unwrap();
        assert!(bare.avatar.is_none());
    }

    #[tokio::test]
    async fn offline_accounts_know_nobody() {
        let accounts = OfflineAccounts;
        tokio_test::assert_ok!(accounts.resolve("whatever").await);
        assert!(accounts.resolve("whatever").await.unwrap().is_none());
    }
}
