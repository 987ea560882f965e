//! Token exchange service: library crate shared by the binary and `tests/`.

use std::sync::Arc;

pub mod api;
pub mod audit;
pub mod cli;
pub mod config;
pub mod errors;
pub mod exchange;
pub mod jobs;
pub mod models;
pub mod session;
pub mod store;

use store::postgres::PgStore;
use store::{AuditLogPersister, TokenPersister};

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub config: config::Config,
    pub exchange: exchange::TokenExchangeService,
    pub tokens: Arc<dyn TokenPersister>,
    pub audit_logs: Arc<dyn AuditLogPersister>,
    /// Present when running against Postgres; used by the readiness probe.
    pub db: Option<PgStore>,
}

impl AppState {
    /// Wire the exchange service from its collaborators.
    pub fn new(
        config: config::Config,
        tokens: Arc<dyn TokenPersister>,
        audit_logs: Arc<dyn AuditLogPersister>,
        issuer: Arc<dyn session::SessionIssuer>,
        db: Option<PgStore>,
    ) -> Self {
        let audit = audit::AuditLogger::new(audit_logs.clone(), config.audit_log.clone());
        let exchange = exchange::TokenExchangeService::new(tokens.clone(), issuer, audit);
        Self {
            config,
            exchange,
            tokens,
            audit_logs,
            db,
        }
    }
}
