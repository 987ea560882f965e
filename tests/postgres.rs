//! Postgres persister tests. Ignored by default; run them against a scratch
//! database with `TEST_DATABASE_URL=... cargo test --test postgres -- --ignored`.

mod common;

use std::sync::Arc;

use futures::future::join_all;

use common::*;
use token_exchange::models::audit::{AuditEventType, AuditLogEntry, AuditLogQuery, RequestMeta};
use token_exchange::store::postgres::PgStore;
use token_exchange::store::{AuditLogPersister, StoreError, TokenPersister};

async fn store() -> PgStore {
    let url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must point at a scratch database");
    let db = PgStore::connect(&url).await.unwrap();
    db.migrate().await.unwrap();
    db
}

#[tokio::test]
#[ignore = "needs TEST_DATABASE_URL"]
async fn test_pg_token_is_single_use() {
    let db = store().await;
    let token = live_token();
    db.create(&token).await.unwrap();

    let fetched = db.get_by_value(&token.value).await.unwrap().unwrap();
    assert_eq!(fetched.user_id, token.user_id);

    let consumed = db.get_and_delete(&token.value).await.unwrap().unwrap();
    assert_eq!(consumed.id, token.id);
    assert!(db.get_and_delete(&token.value).await.unwrap().is_none());
    assert!(db.get_by_value(&token.value).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "needs TEST_DATABASE_URL"]
async fn test_pg_duplicate_value_is_conflict() {
    let db = store().await;
    let token = live_token();
    db.create(&token).await.unwrap();

    let mut dup = live_token();
    dup.value = token.value.clone();
    let err = db.create(&dup).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    db.get_and_delete(&token.value).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "needs TEST_DATABASE_URL"]
async fn test_pg_concurrent_consume_has_one_winner() {
    let db = store().await;
    let db = Arc::new(db);
    let token = live_token();
    db.create(&token).await.unwrap();

    let attempts = (0..16).map(|_| {
        let db = db.clone();
        let value = token.value.clone();
        tokio::spawn(async move { db.get_and_delete(&value).await })
    });

    let winners = join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .filter(Option::is_some)
        .count();
    assert_eq!(winners, 1);
}

#[tokio::test]
#[ignore = "needs TEST_DATABASE_URL"]
async fn test_pg_delete_expired_keeps_live_tokens() {
    let db = store().await;
    let live = live_token();
    let mut expired = live_token();
    expired.expires_at = chrono::Utc::now() - chrono::Duration::minutes(5);
    db.create(&live).await.unwrap();
    db.create(&expired).await.unwrap();

    let removed = db.delete_expired(chrono::Utc::now()).await.unwrap();
    assert!(removed >= 1);
    assert!(db.get_by_value(&expired.value).await.unwrap().is_none());
    assert!(db.get_by_value(&live.value).await.unwrap().is_some());

    db.get_and_delete(&live.value).await.unwrap();
}

#[tokio::test]
#[ignore = "needs TEST_DATABASE_URL"]
async fn test_pg_audit_filters() {
    let db = store().await;
    let actor = uuid::Uuid::new_v4();
    let marker = format!("ua-{}", uuid::Uuid::new_v4());
    let meta = RequestMeta {
        request_id: Some("pg-req".into()),
        source_ip: Some("192.0.2.10".into()),
        user_agent: Some(marker.clone()),
    };

    let ok = AuditLogEntry::new(&meta, AuditEventType::TokenExchangeSucceeded, Some(actor), None);
    let mut bad = AuditLogEntry::new(
        &meta,
        AuditEventType::TokenExchangeFailed,
        Some(actor),
        Some("token has expired".into()),
    )
    .with_details(serde_json::json!({ "status": "failed", "reason": "token_expired" }));
    bad.created_at = ok.created_at + chrono::Duration::seconds(1);
    db.append(&ok).await.unwrap();
    db.append(&bad).await.unwrap();

    let mine = AuditLogQuery {
        user_agent: Some(marker.to_uppercase()),
        ..Default::default()
    };
    assert_eq!(db.count(&mine).await.unwrap(), 2);

    let listed = db.list(&mine.clone().actor(actor)).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, ok.id);
    assert_eq!(listed[1].details["reason"], "token_expired");

    let failed = mine.clone().event_type(AuditEventType::TokenExchangeFailed);
    assert_eq!(db.count(&failed).await.unwrap(), 1);

    let search = AuditLogQuery {
        search: Some("EXPIRED".into()),
        ..mine.clone()
    };
    assert_eq!(db.list(&search).await.unwrap()[0].id, bad.id);

    let paged = AuditLogQuery {
        offset: 1,
        limit: 1,
        ..mine
    };
    let page = db.list(&paged).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, bad.id);
}

#[tokio::test]
#[ignore = "needs TEST_DATABASE_URL"]
async fn test_pg_audit_entries_are_write_once() {
    let db = store().await;
    let entry = AuditLogEntry::new(
        &RequestMeta::default(),
        AuditEventType::TokenExchangeFailed,
        None,
        Some("token not found".into()),
    );
    db.append(&entry).await.unwrap();

    assert!(db.append(&entry).await.is_err());

    let tampered = sqlx::query("UPDATE audit_logs SET error = NULL WHERE id = $1")
        .bind(entry.id)
        .execute(db.pool())
        .await;
    assert!(tampered.is_err());
}
