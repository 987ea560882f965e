//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use token_exchange::audit::AuditLogger;
use token_exchange::config::Config;
use token_exchange::exchange::TokenExchangeService;
use token_exchange::models::audit::{AuditLogEntry, AuditLogQuery};
use token_exchange::models::token::Token;
use token_exchange::session::{SessionCredential, SessionIssuer};
use token_exchange::store::memory::MemoryStore;
use token_exchange::store::{AuditLogPersister, StoreError};
use token_exchange::AppState;

pub const USER_ID: &str = "b5dd5267-b462-48be-b70d-bcd6f1bbe7a5";
pub const EXPIRED_TOKEN_VALUE: &str = "Trkauhl3q7XVxw5JcDH80lTe1KxzydIw0OcizH7umWk=";

pub fn user_id() -> Uuid {
    Uuid::parse_str(USER_ID).unwrap()
}

/// Config used by every test: header on, audit storage on, console quiet.
pub fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.session.enable_auth_token_header = true;
    cfg.session.signing_secret = "integration-test-secret-0123456789".into();
    cfg.audit_log.storage.enabled = true;
    cfg.audit_log.console_output.enabled = false;
    cfg.admin_key = Some("admin-test-key".into());
    cfg
}

pub fn live_token() -> Token {
    Token::new(user_id(), Duration::seconds(60))
}

/// The fixture token: created two hours ago, expired one hour ago.
pub fn expired_fixture_token() -> Token {
    let created_at = Utc::now() - Duration::hours(2);
    Token {
        id: Uuid::new_v4(),
        user_id: user_id(),
        value: EXPIRED_TOKEN_VALUE.to_string(),
        created_at,
        expires_at: created_at + Duration::hours(1),
    }
}

/// Session issuer stub that counts calls and can be told to fail.
#[derive(Default)]
pub struct StubIssuer {
    pub issued: AtomicUsize,
    pub fail: bool,
}

impl StubIssuer {
    pub fn failing() -> Self {
        Self {
            issued: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn count(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionIssuer for StubIssuer {
    async fn issue(&self, user_id: Uuid) -> anyhow::Result<SessionCredential> {
        if self.fail {
            anyhow::bail!("signing key unavailable");
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(SessionCredential {
            user_id,
            cookie_value: format!("session-{}-{}", user_id, n),
            header_value: Some(format!("jwt-{}-{}", user_id, n)),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }
}

/// Audit persister whose writes always fail.
pub struct BrokenAuditLog;

#[async_trait]
impl AuditLogPersister for BrokenAuditLog {
    async fn append(&self, _entry: &AuditLogEntry) -> Result<(), StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn list(&self, _query: &AuditLogQuery) -> Result<Vec<AuditLogEntry>, StoreError> {
        Ok(vec![])
    }

    async fn count(&self, _query: &AuditLogQuery) -> Result<i64, StoreError> {
        Ok(0)
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub issuer: Arc<StubIssuer>,
    pub service: TokenExchangeService,
}

pub fn harness() -> Harness {
    harness_with(Arc::new(StubIssuer::default()))
}

pub fn harness_with(issuer: Arc<StubIssuer>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let audit = AuditLogger::new(store.clone(), test_config().audit_log);
    let service = TokenExchangeService::new(store.clone(), issuer.clone(), audit);
    Harness {
        store,
        issuer,
        service,
    }
}

/// App state over a fresh in-memory store, for HTTP-level tests.
pub fn app_state(config: Config, issuer: Arc<dyn SessionIssuer>) -> (Arc<AppState>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(config, store.clone(), store.clone(), issuer, None);
    (Arc::new(state), store)
}
