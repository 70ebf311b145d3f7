use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::types::{Restore, API_VERSION};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArkClientTrait: Send + Sync {
    /// Creates `restore` in `namespace` and returns the object as stored by
    /// the server.
    async fn create_restore(&self, namespace: &str, restore: &Restore) -> Result<Restore>;
}

pub struct ArkClient {
    client: Client,
    server: String,
    token: Option<String>,
}

impl ArkClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            server: config.server.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }

    fn restores_url(&self, namespace: &str) -> String {
        format!(
            "{}/apis/{}/namespaces/{}/restores",
            self.server, API_VERSION, namespace
        )
    }
}

/// Body of a failed Kubernetes API call.
#[derive(Debug, Deserialize)]
struct ApiStatus {
    kind: Option<String>,
    message: Option<String>,
}

/// Error text for a failed API call: the server's own message when the body
/// is a `Status` object, otherwise the HTTP status and raw body.
pub fn api_error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiStatus>(body) {
        Ok(ApiStatus {
            kind: Some(kind),
            message: Some(message),
        }) if kind == "Status" && !message.is_empty() => message,
        _ => format!("{}: {}", status, body.trim()),
    }
}

#[async_trait]
impl ArkClientTrait for ArkClient {
    async fn create_restore(&self, namespace: &str, restore: &Restore) -> Result<Restore> {
        let url = self.restores_url(namespace);
        debug!(%url, "creating restore");

        let mut request = self.client.post(&url).json(restore);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            let message = api_error_message(status, &body);
            warn!(%status, "restore create rejected by server");
            return Err(anyhow!(message));
        }

        Ok(response.json().await?)
    }
}
