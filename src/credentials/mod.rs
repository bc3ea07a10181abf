//! Session credentials
//!
//! The Session Credential Service issues a realtime endpoint and an access token for a
//! named room. The controller talks to it through [`CredentialProvider`] so tests can
//! script the service.

mod client;

pub use client::HttpCredentialClient;

use crate::error::CredentialError;
use serde::{Deserialize, Serialize};

/// What the controller asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRequest {
    pub room: String,
    pub identity: String,
    pub display_name: String,
}

/// Raw answer from the credential service, before validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinGrant {
    pub url: Option<String>,
    pub token: Option<String>,
    /// Identity the service actually issued the token for, when it echoes one
    pub identity: Option<String>,
}

/// A validated, single-use credential for one session attempt
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential {
    pub endpoint: String,
    pub token: String,
    pub room: String,
    pub identity: String,
}

impl std::fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredential")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .field("room", &self.room)
            .field("identity", &self.identity)
            .finish()
    }
}

impl SessionCredential {
    /// Validate a grant for the given request.
    ///
    /// Endpoint and token must both be present and non-blank.
    pub fn from_grant(grant: JoinGrant, request: &CredentialRequest) -> Result<Self, CredentialError> {
        let endpoint = non_blank(grant.url)
            .ok_or_else(|| CredentialError::Invalid("missing endpoint url".to_string()))?;
        let token = non_blank(grant.token)
            .ok_or_else(|| CredentialError::Invalid("missing access token".to_string()))?;

        Ok(Self {
            endpoint,
            token,
            room: request.room.clone(),
            identity: non_blank(grant.identity).unwrap_or_else(|| request.identity.clone()),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Source of session credentials
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn request_credential(
        &self,
        request: &CredentialRequest,
    ) -> Result<JoinGrant, CredentialError>;
}
