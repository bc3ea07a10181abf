use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{CredentialProvider, CredentialRequest, JoinGrant};
use crate::error::CredentialError;

const USER_AGENT: &str = concat!("mock-interview/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct JoinTokenBody<'a> {
    room: &'a str,
    name: &'a str,
    identity: &'a str,
}

/// HTTP client for the Session Credential Service
pub struct HttpCredentialClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpCredentialClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CredentialError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| CredentialError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn join_token_url(&self) -> String {
        format!("{}/agent/join-token", self.base_url)
    }
}

#[async_trait::async_trait]
impl CredentialProvider for HttpCredentialClient {
    async fn request_credential(
        &self,
        request: &CredentialRequest,
    ) -> Result<JoinGrant, CredentialError> {
        debug!(room = %request.room, identity = %request.identity, "Requesting join token");

        let response = self
            .http_client
            .post(self.join_token_url())
            .json(&JoinTokenBody {
                room: &request.room,
                name: &request.display_name,
                identity: &request.identity,
            })
            .send()
            .await
            .map_err(|e| CredentialError::Network(e.to_string()))?;

        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CredentialError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let grant: JoinGrant = response
            .json()
            .await
            .map_err(|e| CredentialError::Malformed(e.to_string()))?;

        info!(room = %request.room, "Join token issued");

        Ok(grant)
    }
}
