use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    TokenExchangeSucceeded,
    TokenExchangeFailed,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::TokenExchangeSucceeded => "token_exchange_succeeded",
            AuditEventType::TokenExchangeFailed => "token_exchange_failed",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for AuditEventType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "token_exchange_succeeded" => Ok(AuditEventType::TokenExchangeSucceeded),
            "token_exchange_failed" => Ok(AuditEventType::TokenExchangeFailed),
            other => anyhow::bail!("unknown audit event type: {}", other),
        }
    }
}

/// Request metadata attached to every audit entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMeta {
    pub request_id: Option<String>,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// One exchange attempt. Written once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub actor_user_id: Option<Uuid>,
    pub meta_http_request_id: Option<String>,
    pub meta_source_ip: Option<String>,
    pub meta_user_agent: Option<String>,
    pub details: serde_json::Value,
    pub error: Option<String>,
}

impl AuditLogEntry {
    pub fn new(
        meta: &RequestMeta,
        event_type: AuditEventType,
        actor_user_id: Option<Uuid>,
        error: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            event_type,
            actor_user_id,
            meta_http_request_id: meta.request_id.clone(),
            meta_source_ip: meta.source_ip.clone(),
            meta_user_agent: meta.user_agent.clone(),
            details: serde_json::json!({}),
            error,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Filter for listing audit entries. Every `None`/empty field is ignored;
/// the rest are combined with AND. `limit == 0` means no limit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditLogQuery {
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub limit: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub event_types: Vec<AuditEventType>,
    pub actor_user_id: Option<Uuid>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    /// Case-insensitive substring matched against `details` and `error`.
    pub search: Option<String>,
}

impl AuditLogQuery {
    pub fn event_type(mut self, event_type: AuditEventType) -> Self {
        self.event_types.push(event_type);
        self
    }

    pub fn actor(mut self, user_id: Uuid) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    /// Reference predicate; the Postgres store expresses the same filters in SQL.
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        if let Some(start) = self.start_time {
            if entry.created_at < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if entry.created_at > end {
                return false;
            }
        }
        if !self.event_types.is_empty() && !self.event_types.contains(&entry.event_type) {
            return false;
        }
        if let Some(actor) = self.actor_user_id {
            if entry.actor_user_id != Some(actor) {
                return false;
            }
        }
        if let Some(ip) = non_empty(&self.ip) {
            if entry.meta_source_ip.as_deref() != Some(ip) {
                return false;
            }
        }
        if let Some(ua) = non_empty(&self.user_agent) {
            let hit = entry
                .meta_user_agent
                .as_deref()
                .map(|v| v.to_lowercase().contains(&ua.to_lowercase()))
                .unwrap_or(false);
            if !hit {
                return false;
            }
        }
        if let Some(needle) = non_empty(&self.search) {
            let needle = needle.to_lowercase();
            let in_details = entry.details.to_string().to_lowercase().contains(&needle);
            let in_error = entry
                .error
                .as_deref()
                .map(|e| e.to_lowercase().contains(&needle))
                .unwrap_or(false);
            if !in_details && !in_error {
                return false;
            }
        }
        true
    }
}

pub(crate) fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
