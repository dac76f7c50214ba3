//! REST client for the account backend

use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

/// HTTP client for the account/social backend
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    /// Service key used for server-to-server writes
    api_key: Option<String>,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET on behalf of a user. Unknown or rejected tokens yield `None`.
    pub async fn get_as_user<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &str,
    ) -> Result<Option<T>, BackendError> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(BackendError::Request)?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                return Ok(None)
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(BackendError::Api {
                    status: status.as_u16(),
                    body,
                });
            }
            _ => {}
        }

        response.json().await.map(Some).map_err(BackendError::Parse)
    }

    /// Authenticated POST with the service key
    pub async fn post<T: Serialize>(&self, path: &str, data: &T) -> Result<(), BackendError> {
        let mut request = self.client.post(self.url(path)).json(data);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(BackendError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Account backend errors
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),
}
