use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{SessionCredential, SessionIssuer};
use crate::config::SessionConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// HS256 session issuer.
pub struct JwtSessionIssuer {
    encoding_key: EncodingKey,
    issuer: String,
    lifespan: Duration,
    header_enabled: bool,
}

impl JwtSessionIssuer {
    pub fn new(issuer: impl Into<String>, config: &SessionConfig) -> anyhow::Result<Self> {
        if config.signing_secret.len() < 16 {
            anyhow::bail!("session signing secret must be at least 16 bytes");
        }
        if config.lifespan_secs <= 0 {
            anyhow::bail!("session lifespan must be positive");
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.signing_secret.as_bytes()),
            issuer: issuer.into(),
            lifespan: Duration::seconds(config.lifespan_secs),
            header_enabled: config.enable_auth_token_header,
        })
    }
}

#[async_trait]
impl SessionIssuer for JwtSessionIssuer {
    async fn issue(&self, user_id: Uuid) -> anyhow::Result<SessionCredential> {
        let now = Utc::now();
        let expires_at = now + self.lifespan;
        let claims = SessionClaims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let jwt = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("failed to sign session token")?;

        Ok(SessionCredential {
            user_id,
            header_value: self.header_enabled.then(|| jwt.clone()),
            cookie_value: jwt,
            expires_at,
        })
    }
}
