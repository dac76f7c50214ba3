//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::MatchRegistry;
use crate::matchmaking::MatchMaking;
use crate::store::{AccountService, BackendClient, IdentityResolver, MatchRecorder, OfflineAccounts};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub identity: Arc<dyn IdentityResolver>,
    pub matchmaking: Arc<MatchMaking>,
    pub match_registry: Arc<MatchRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Account backend is optional; without it everyone plays as given
        let (identity, recorder): (Arc<dyn IdentityResolver>, Arc<dyn MatchRecorder>) =
            match &config.account_api_url {
                Some(url) => {
                    let accounts = Arc::new(AccountService::new(BackendClient::new(
                        url.clone(),
                        config.account_api_key.clone(),
                    )));
                    let identity: Arc<dyn IdentityResolver> = accounts.clone();
                    (identity, accounts)
                }
                None => {
                    let offline = Arc::new(OfflineAccounts);
                    let identity: Arc<dyn IdentityResolver> = offline.clone();
                    (identity, offline)
                }
            };

        // Initialize match registry
        let match_registry = Arc::new(MatchRegistry::new());

        let matchmaking = Arc::new(MatchMaking::new(
            match_registry.clone(),
            recorder,
            config.game.clone(),
        ));

        Self {
            config,
            identity,
            matchmaking,
            match_registry,
        }
    }
}
