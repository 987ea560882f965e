//! Token exchange: turns a one-time token value into a session.
//!
//! Every call writes exactly one audit entry, whatever the outcome:
//! 1. the value is fetched and removed from the token store in one step
//! 2. absent → `TokenNotFound`, expired → `TokenExpired`
//! 3. otherwise a session is issued for the token's user
//!
//! Single consumption rests entirely on `TokenPersister::get_and_delete`;
//! nothing here holds a lock, so any number of instances may share a store.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::audit::AuditLogger;
use crate::errors::AppError;
use crate::models::audit::{AuditEventType, RequestMeta};
use crate::session::{SessionCredential, SessionIssuer};
use crate::store::TokenPersister;

#[derive(Clone)]
pub struct TokenExchangeService {
    tokens: Arc<dyn TokenPersister>,
    issuer: Arc<dyn SessionIssuer>,
    audit: AuditLogger,
}

impl TokenExchangeService {
    pub fn new(
        tokens: Arc<dyn TokenPersister>,
        issuer: Arc<dyn SessionIssuer>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            tokens,
            issuer,
            audit,
        }
    }

    pub async fn validate(
        &self,
        meta: &RequestMeta,
        value: Option<&str>,
    ) -> Result<SessionCredential, AppError> {
        // Whitespace only counts for the presence check; lookup is exact.
        let value = match value.filter(|v| !v.trim().is_empty()) {
            Some(v) => v,
            None => return Err(self.fail(meta, None, AppError::MissingValue).await),
        };

        let token = match self.tokens.get_and_delete(value).await {
            Ok(Some(token)) => token,
            Ok(None) => return Err(self.fail(meta, None, AppError::TokenNotFound).await),
            Err(e) => return Err(self.fail(meta, None, e.into()).await),
        };

        // The record is gone at this point either way; an expired token is
        // not put back.
        if token.is_expired_at(Utc::now()) {
            tracing::debug!(token_id = %token.id, expires_at = %token.expires_at, "token expired");
            return Err(self
                .fail(meta, Some(token.user_id), AppError::TokenExpired)
                .await);
        }

        let credential = match self.issuer.issue(token.user_id).await {
            Ok(c) => c,
            Err(e) => {
                return Err(self
                    .fail(meta, Some(token.user_id), AppError::Session(e))
                    .await)
            }
        };

        self.audit
            .record(
                meta,
                AuditEventType::TokenExchangeSucceeded,
                Some(token.user_id),
                None,
            )
            .await?;

        tracing::info!(
            token_id = %token.id,
            user_id = %token.user_id,
            "token exchanged for session"
        );

        Ok(credential)
    }

    /// Record a failed attempt rejected before a token value was available,
    /// e.g. an unparseable request body.
    pub async fn reject(&self, meta: &RequestMeta, error: AppError) -> AppError {
        self.fail(meta, None, error).await
    }

    async fn fail(&self, meta: &RequestMeta, actor: Option<Uuid>, error: AppError) -> AppError {
        match self
            .audit
            .record(meta, AuditEventType::TokenExchangeFailed, actor, Some(&error))
            .await
        {
            Ok(_) => error,
            Err(audit_err) => {
                tracing::warn!(
                    error = %error,
                    "token exchange failed and the audit entry could not be written"
                );
                // A classified rejection must not be reported without its
                // audit entry; an internal failure is already a 500.
                if error.is_classified() {
                    audit_err
                } else {
                    error
                }
            }
        }
    }
}
