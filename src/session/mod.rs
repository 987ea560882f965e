//! Session issuance. The exchange service only sees the `SessionIssuer`
//! trait; how the credential is signed is up to the implementation.

pub mod cookie;
pub mod jwt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use cookie::SessionCookie;
pub use jwt::JwtSessionIssuer;

/// Opaque session material handed back to the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredential {
    pub user_id: Uuid,
    /// Goes into the session cookie.
    pub cookie_value: String,
    /// Goes into `X-Auth-Token` when the header is enabled.
    pub header_value: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait SessionIssuer: Send + Sync {
    async fn issue(&self, user_id: Uuid) -> anyhow::Result<SessionCredential>;
}
