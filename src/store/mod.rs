//! Persistence contracts for tokens and audit entries.
//!
//! Two implementations: `PgStore` (Postgres, production) and `MemoryStore`
//! (process-local, tests and `--in-memory` runs). Both are injected into the
//! exchange service as trait objects.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::audit::{AuditLogEntry, AuditLogQuery};
use crate::models::token::Token;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait TokenPersister: Send + Sync {
    /// Insert a token. Fails with `Conflict` if `value` is already taken;
    /// never overwrites.
    async fn create(&self, token: &Token) -> Result<(), StoreError>;

    async fn get_by_value(&self, value: &str) -> Result<Option<Token>, StoreError>;

    /// Fetch and remove the token in one indivisible step. Of any number of
    /// concurrent callers with the same value, at most one receives `Some`.
    async fn get_and_delete(&self, value: &str) -> Result<Option<Token>, StoreError>;

    /// Remove every token with `expires_at <= now`. Returns the number removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait AuditLogPersister: Send + Sync {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError>;

    /// Entries matching every set filter, oldest first.
    async fn list(&self, query: &AuditLogQuery) -> Result<Vec<AuditLogEntry>, StoreError>;

    /// Total matches ignoring `offset`/`limit`.
    async fn count(&self, query: &AuditLogQuery) -> Result<i64, StoreError>;
}
