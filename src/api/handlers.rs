use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::REQUEST_ID_HEADER;
use crate::errors::AppError;
use crate::models::audit::{AuditEventType, AuditLogEntry, AuditLogQuery, RequestMeta};
use crate::session::SessionCookie;
use crate::AppState;

pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenValidationBody {
    pub value: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenValidationResponse {
    pub user_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditLogParams {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Comma-separated event types.
    #[serde(rename = "type")]
    pub event_types: Option<String>,
    pub actor_user_id: Option<Uuid>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub q: Option<String>,
}

impl AuditLogParams {
    pub fn into_query(self) -> Result<AuditLogQuery, AppError> {
        let event_types = self
            .event_types
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<AuditEventType>()
                    .map_err(|e| AppError::MalformedInput(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AuditLogQuery {
            offset: self.offset.unwrap_or(0).max(0),
            limit: self
                .limit
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
            start_time: self.start_time,
            end_time: self.end_time,
            event_types,
            actor_user_id: self.actor_user_id,
            ip: self.ip,
            user_agent: self.user_agent,
            search: self.q,
        })
    }
}

// ── Handlers ─────────────────────────────────────────────────

/// POST /token: exchange a one-time token for a session.
///
/// The body is parsed here rather than by the `Json` extractor so that
/// malformed input still goes through the service and gets audited.
pub async fn exchange_token(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let meta = request_meta(&headers, peer.map(|ConnectInfo(addr)| addr));

    let value = match parse_validation_body(&headers, &body) {
        Ok(value) => value,
        Err(e) => return Err(state.exchange.reject(&meta, e).await),
    };

    let credential = state.exchange.validate(&meta, value.as_deref()).await?;

    let cookie = SessionCookie::build(&state.config.session.cookie, &credential);
    let mut resp = (
        StatusCode::OK,
        Json(TokenValidationResponse {
            user_id: credential.user_id,
        }),
    )
        .into_response();

    let resp_headers = resp.headers_mut();
    let cookie = HeaderValue::from_str(&cookie)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid session cookie: {}", e)))?;
    resp_headers.insert(header::SET_COOKIE, cookie);

    if state.config.session.enable_auth_token_header {
        if let Some(ref jwt) = credential.header_value {
            let value = HeaderValue::from_str(jwt).map_err(|e| {
                AppError::Internal(anyhow::anyhow!("invalid auth token header: {}", e))
            })?;
            resp_headers.insert(AUTH_TOKEN_HEADER, value);
            resp_headers.insert(
                header::ACCESS_CONTROL_EXPOSE_HEADERS,
                HeaderValue::from_static("X-Auth-Token"),
            );
        }
    }

    Ok(resp)
}

/// GET /admin/audit_logs: filtered audit trail, total in `X-Total-Count`.
pub async fn list_audit_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditLogParams>,
) -> Result<Response, AppError> {
    let query = params.into_query()?;

    let total = state.audit_logs.count(&query).await?;
    let entries: Vec<AuditLogEntry> = state.audit_logs.list(&query).await?;

    let mut resp = Json(entries).into_response();
    resp.headers_mut()
        .insert("x-total-count", HeaderValue::from(total));
    Ok(resp)
}

/// GET /readyz: checks the database when one is configured.
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> Result<&'static str, StatusCode> {
    if let Some(ref db) = state.db {
        db.ping().await.map_err(|e| {
            tracing::error!("readiness check failed: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        })?;
    }
    Ok("ok")
}

// ── Helpers ──────────────────────────────────────────────────

/// An empty body counts as a missing `value`, not as malformed JSON.
pub fn parse_validation_body(headers: &HeaderMap, body: &[u8]) -> Result<Option<String>, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false);
    if !is_json {
        return Err(AppError::MalformedInput(
            "expected Content-Type: application/json".into(),
        ));
    }

    let parsed: TokenValidationBody =
        serde_json::from_slice(body).map_err(|e| AppError::MalformedInput(e.to_string()))?;
    Ok(parsed.value)
}

pub fn request_meta(headers: &HeaderMap, peer: Option<SocketAddr>) -> RequestMeta {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };

    let source_ip = header_str("x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
        .or_else(|| header_str("x-real-ip"))
        .or_else(|| peer.map(|p| p.ip().to_string()));

    RequestMeta {
        request_id: header_str(REQUEST_ID_HEADER),
        source_ip,
        user_agent: header_str(header::USER_AGENT.as_str()),
    }
}
