use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{AuditLogPersister, StoreError, TokenPersister};
use crate::models::audit::{non_empty, AuditLogEntry, AuditLogQuery};
use crate::models::token::Token;

const TOKEN_COLUMNS: &str = "id, user_id, value, created_at, expires_at";

const AUDIT_COLUMNS: &str = "id, created_at, event_type, actor_user_id, meta_http_request_id, \
                             meta_source_ip, meta_user_agent, details, error";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// -- Token Operations --

#[async_trait]
impl TokenPersister for PgStore {
    async fn create(&self, token: &Token) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"INSERT INTO tokens (id, user_id, value, created_at, expires_at)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.value)
        .bind(token.created_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                StoreError::Conflict(format!("token {} collides with an existing token", token.id)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_by_value(&self, value: &str) -> Result<Option<Token>, StoreError> {
        let row = sqlx::query_as::<_, Token>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens WHERE value = $1"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_and_delete(&self, value: &str) -> Result<Option<Token>, StoreError> {
        // A single DELETE ... RETURNING: the row lock taken by the first
        // deleter makes every concurrent statement see zero rows.
        let row = sqlx::query_as::<_, Token>(&format!(
            "DELETE FROM tokens WHERE value = $1 RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// -- Audit Log Operations --

#[async_trait]
impl AuditLogPersister for PgStore {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, created_at, event_type, actor_user_id, meta_http_request_id,
                meta_source_ip, meta_user_agent, details, error
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(entry.created_at)
        .bind(entry.event_type.as_str())
        .bind(entry.actor_user_id)
        .bind(&entry.meta_http_request_id)
        .bind(&entry.meta_source_ip)
        .bind(&entry.meta_user_agent)
        .bind(&entry.details)
        .bind(&entry.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, query: &AuditLogQuery) -> Result<Vec<AuditLogEntry>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_logs WHERE TRUE"
        ));
        push_audit_filters(&mut qb, query);
        qb.push(" ORDER BY created_at ASC, id ASC");
        if query.limit > 0 {
            qb.push(" LIMIT ").push_bind(query.limit);
        }
        if query.offset > 0 {
            qb.push(" OFFSET ").push_bind(query.offset);
        }

        let rows = qb
            .build_query_as::<AuditLogRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(AuditLogEntry::try_from).collect()
    }

    async fn count(&self, query: &AuditLogQuery) -> Result<i64, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_logs WHERE TRUE");
        push_audit_filters(&mut qb, query);

        let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(count)
    }
}

fn push_audit_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &AuditLogQuery) {
    if let Some(start) = query.start_time {
        qb.push(" AND created_at >= ").push_bind(start);
    }
    if let Some(end) = query.end_time {
        qb.push(" AND created_at <= ").push_bind(end);
    }
    if !query.event_types.is_empty() {
        let types: Vec<String> = query
            .event_types
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();
        qb.push(" AND event_type = ANY(").push_bind(types).push(")");
    }
    if let Some(actor) = query.actor_user_id {
        qb.push(" AND actor_user_id = ").push_bind(actor);
    }
    if let Some(ip) = non_empty(&query.ip) {
        qb.push(" AND meta_source_ip = ").push_bind(ip.to_string());
    }
    if let Some(ua) = non_empty(&query.user_agent) {
        qb.push(" AND meta_user_agent ILIKE ")
            .push_bind(like_pattern(ua));
    }
    if let Some(search) = non_empty(&query.search) {
        let pattern = like_pattern(search);
        qb.push(" AND (details::text ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR error ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

/// `%needle%` with LIKE metacharacters escaped.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

// -- Output structs --

#[derive(Debug, sqlx::FromRow)]
struct AuditLogRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    event_type: String,
    actor_user_id: Option<Uuid>,
    meta_http_request_id: Option<String>,
    meta_source_ip: Option<String>,
    meta_user_agent: Option<String>,
    details: serde_json::Value,
    error: Option<String>,
}

impl TryFrom<AuditLogRow> for AuditLogEntry {
    type Error = StoreError;

    fn try_from(row: AuditLogRow) -> Result<Self, Self::Error> {
        let event_type = row
            .event_type
            .parse()
            .map_err(|e: anyhow::Error| StoreError::Corrupt(format!("audit log {}: {}", row.id, e)))?;
        Ok(AuditLogEntry {
            id: row.id,
            created_at: row.created_at,
            event_type,
            actor_user_id: row.actor_user_id,
            meta_http_request_id: row.meta_http_request_id,
            meta_source_ip: row.meta_source_ip,
            meta_user_agent: row.meta_user_agent,
            details: row.details,
            error: row.error,
        })
    }
}
