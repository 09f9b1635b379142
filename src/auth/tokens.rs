//! Session handle and its storage

use anyhow::{Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Profile hints set at sign-up or by the federated provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// The authenticated actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

impl Identity {
    /// Read the identity from the access token's claims (no signature check;
    /// the backend verifies the token on every request).
    pub fn from_access_token(token: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct Claims {
            sub: String,
            email: Option<String>,
            #[serde(default)]
            user_metadata: UserMetadata,
        }

        let payload = token
            .split('.')
            .nth(1)
            .context("Access token is not a JWT")?;
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .context("Access token payload is not base64url")?;
        let claims: Claims =
            serde_json::from_slice(&bytes).context("Access token claims are not valid JSON")?;

        Ok(Self {
            id: claims.sub,
            email: claims.email.filter(|e| !e.is_empty()),
            user_metadata: claims.user_metadata,
        })
    }

    /// Username used when a profile has to be created: metadata first, then
    /// the local part of the e-mail address.
    pub fn default_username(&self) -> Option<String> {
        self.user_metadata.username.clone().or_else(|| {
            self.email
                .as_deref()
                .and_then(|e| e.split('@').next())
                .filter(|s| !s.is_empty())
                .map(String::from)
        })
    }
}

/// Explicit session handle: token, refresh token, expiry and identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    pub user: Identity,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Session {
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_in_secs: Option<u64>,
        user: Identity,
    ) -> Self {
        let expires_at = expires_in_secs.map(|secs| now_secs() + secs);
        Self {
            access_token,
            refresh_token,
            expires_at,
            user,
        }
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            // Consider expired if less than 5 minutes remaining
            Some(exp) => now_secs() + 300 >= exp,
            None => false,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}

/// Session store trait for different storage backends
pub trait SessionStore {
    fn get_session(&self) -> Option<Session>;
    fn set_session(&mut self, session: Session);
    fn clear_session(&mut self);
}
