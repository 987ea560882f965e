use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of random bytes behind a token value (44 chars once encoded).
pub const TOKEN_VALUE_BYTES: usize = 32;

/// Single-use secret that can be exchanged once for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Token {
    pub id: Uuid,
    pub user_id: Uuid,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    /// Mint a fresh token for `user_id` that expires `lifespan` from now.
    pub fn new(user_id: Uuid, lifespan: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            value: generate_value(),
            created_at: now,
            expires_at: now + lifespan,
        }
    }

    /// Expiry is inclusive: a token is dead at exactly `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

fn generate_value() -> String {
    let mut bytes = [0u8; TOKEN_VALUE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE.encode(bytes)
}
