use std::sync::Arc;

use uuid::Uuid;

use crate::config::AuditLogConfig;
use crate::errors::AppError;
use crate::models::audit::{AuditEventType, AuditLogEntry, RequestMeta};
use crate::store::AuditLogPersister;

/// Synchronous audit writer. The entry is persisted before `record`
/// returns, so the caller can only respond after the attempt is on file.
#[derive(Clone)]
pub struct AuditLogger {
    persister: Arc<dyn AuditLogPersister>,
    config: AuditLogConfig,
}

impl AuditLogger {
    pub fn new(persister: Arc<dyn AuditLogPersister>, config: AuditLogConfig) -> Self {
        Self { persister, config }
    }

    pub async fn record(
        &self,
        meta: &RequestMeta,
        event_type: AuditEventType,
        actor_user_id: Option<Uuid>,
        error: Option<&AppError>,
    ) -> Result<AuditLogEntry, AppError> {
        let entry = AuditLogEntry::new(
            meta,
            event_type,
            actor_user_id,
            error.map(|e| e.message()),
        )
        .with_details(details_for(error));

        if self.config.console_output.enabled || !self.config.storage.enabled {
            tracing::info!(
                audit_id = %entry.id,
                event_type = %entry.event_type,
                actor_user_id = ?entry.actor_user_id,
                request_id = ?entry.meta_http_request_id,
                source_ip = ?entry.meta_source_ip,
                error = ?entry.error,
                "audit log"
            );
        }

        if self.config.storage.enabled {
            if let Err(e) = self.persister.append(&entry).await {
                tracing::error!(audit_id = %entry.id, "failed to write audit log: {}", e);
                return Err(e.into());
            }
            tracing::debug!(audit_id = %entry.id, "audit log recorded");
        }

        Ok(entry)
    }
}

fn details_for(error: Option<&AppError>) -> serde_json::Value {
    match error {
        None => serde_json::json!({}),
        Some(e) => serde_json::json!({
            "status": e.status().as_u16(),
            "reason": reason_code(e),
        }),
    }
}

fn reason_code(error: &AppError) -> &'static str {
    match error {
        AppError::MissingValue => "missing_value",
        AppError::MalformedInput(_) => "malformed_input",
        AppError::TokenNotFound => "token_not_found",
        AppError::TokenExpired => "token_expired",
        AppError::Unauthorized => "unauthorized",
        AppError::Store(_) | AppError::Session(_) | AppError::Internal(_) => "internal_error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuditConsoleConfig, AuditStorageConfig};
    use crate::models::audit::AuditLogQuery;
    use crate::store::memory::MemoryStore;

    fn logger(store: Arc<MemoryStore>, storage: bool) -> AuditLogger {
        AuditLogger::new(
            store,
            AuditLogConfig {
                storage: AuditStorageConfig { enabled: storage },
                console_output: AuditConsoleConfig { enabled: false },
            },
        )
    }

    #[tokio::test]
    async fn test_record_persists_when_enabled() {
        let store = Arc::new(MemoryStore::new());
        let audit = logger(store.clone(), true);
        let meta = RequestMeta {
            request_id: Some("r-1".into()),
            source_ip: Some("192.0.2.1".into()),
            user_agent: Some("curl/8.0".into()),
        };

        let entry = audit
            .record(
                &meta,
                AuditEventType::TokenExchangeFailed,
                None,
                Some(&AppError::TokenExpired),
            )
            .await
            .unwrap();

        assert_eq!(entry.error.as_deref(), Some("token has expired"));
        assert_eq!(entry.details["status"], 422);
        assert_eq!(entry.details["reason"], "token_expired");

        let logs = store.list(&AuditLogQuery::default()).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].id, entry.id);
        assert_eq!(logs[0].meta_source_ip.as_deref(), Some("192.0.2.1"));
    }

    #[tokio::test]
    async fn test_record_skips_storage_when_disabled() {
        let store = Arc::new(MemoryStore::new());
        let audit = logger(store.clone(), false);

        audit
            .record(
                &RequestMeta::default(),
                AuditEventType::TokenExchangeSucceeded,
                Some(Uuid::new_v4()),
                None,
            )
            .await
            .unwrap();

        assert_eq!(store.count(&AuditLogQuery::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_internal_errors_are_not_detailed() {
        let store = Arc::new(MemoryStore::new());
        let audit = logger(store, true);
        let err = AppError::Internal(anyhow::anyhow!("pool timed out"));

        let entry = audit
            .record(&RequestMeta::default(), AuditEventType::TokenExchangeFailed, None, Some(&err))
            .await
            .unwrap();

        assert_eq!(entry.error.as_deref(), Some("internal server error"));
        assert_eq!(entry.details["reason"], "internal_error");
    }
}
