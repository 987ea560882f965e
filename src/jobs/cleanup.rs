//! Background job: purge expired exchange tokens.
//!
//! The exchange itself never relies on this; an expired token that is still
//! present is rejected at validation time. The job only keeps the table small.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time;

use crate::store::{StoreError, TokenPersister};

/// Spawn the background purge task. Call this once at startup.
pub fn spawn(tokens: Arc<dyn TokenPersister>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = purge_expired(tokens.as_ref()).await {
                tracing::error!("token cleanup job failed: {}", e);
            }
        }
    })
}

/// Delete every token whose expiry has passed. Returns the number removed.
pub async fn purge_expired(tokens: &dyn TokenPersister) -> Result<u64, StoreError> {
    let removed = tokens.delete_expired(Utc::now()).await?;

    if removed > 0 {
        tracing::info!(rows = removed, "purged expired tokens");
    }

    Ok(removed)
}
