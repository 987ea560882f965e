use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AuditLogPersister, StoreError, TokenPersister};
use crate::models::audit::{AuditLogEntry, AuditLogQuery};
use crate::models::token::Token;

/// Process-local store. Tokens are keyed by value so that fetch-and-delete
/// is a single `DashMap::remove`, which holds the shard lock for the key.
#[derive(Default)]
pub struct MemoryStore {
    tokens: DashMap<String, Token>,
    audit_logs: RwLock<AuditLog>,
}

/// Append-only entries plus an id index, so a duplicate write is rejected
/// without scanning the log.
#[derive(Default)]
struct AuditLog {
    entries: Vec<AuditLogEntry>,
    ids: HashSet<Uuid>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

#[async_trait]
impl TokenPersister for MemoryStore {
    async fn create(&self, token: &Token) -> Result<(), StoreError> {
        match self.tokens.entry(token.value.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "token {} collides with an existing token",
                token.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(token.clone());
                Ok(())
            }
        }
    }

    async fn get_by_value(&self, value: &str) -> Result<Option<Token>, StoreError> {
        Ok(self.tokens.get(value).map(|t| t.value().clone()))
    }

    async fn get_and_delete(&self, value: &str) -> Result<Option<Token>, StoreError> {
        Ok(self.tokens.remove(value).map(|(_, token)| token))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.tokens.len();
        self.tokens.retain(|_, token| !token.is_expired_at(now));
        Ok(before.saturating_sub(self.tokens.len()) as u64)
    }
}

#[async_trait]
impl AuditLogPersister for MemoryStore {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        let mut logs = self.audit_logs.write().await;
        if !logs.ids.insert(entry.id) {
            return Err(StoreError::Conflict(format!("audit log {} already written", entry.id)));
        }
        logs.entries.push(entry.clone());
        Ok(())
    }

    async fn list(&self, query: &AuditLogQuery) -> Result<Vec<AuditLogEntry>, StoreError> {
        let logs = self.audit_logs.read().await;
        let mut matched: Vec<AuditLogEntry> =
            logs.entries.iter().filter(|e| query.matches(e)).cloned().collect();
        matched.sort_by_key(|e| e.created_at);

        let offset = query.offset.max(0) as usize;
        let page = matched.into_iter().skip(offset);
        Ok(if query.limit > 0 {
            page.take(query.limit as usize).collect()
        } else {
            page.collect()
        })
    }

    async fn count(&self, query: &AuditLogQuery) -> Result<i64, StoreError> {
        let logs = self.audit_logs.read().await;
        Ok(logs.entries.iter().filter(|e| query.matches(e)).count() as i64)
    }
}
