//! Periodic removal of expired objects.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use kernel::DeleteResult;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::domain::ObjectStore;
use crate::sqlite::{Mode, Sqlite, StoreError};

/// Starts a task deleting objects older than `ttl` every `every`.
///
/// Returns `None` when either duration is zero.
pub fn spawn(db: Arc<PathBuf>, ttl: Duration, every: Duration) -> Option<JoinHandle<()>> {
    if ttl.is_zero() || every.is_zero() {
        tracing::info!("expired objects sweeper disabled");
        return None;
    }

    tracing::info!("sweeping objects older than {ttl:?} every {every:?}");
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let db = Arc::clone(&db);
            let result = tokio::task::spawn_blocking(move || sweep(&db, ttl, Utc::now())).await;
            match result {
                Ok(Ok(deleted)) if deleted.objects > 0 => tracing::info!(
                    "expired objects removed {} blobs removed {}",
                    deleted.objects,
                    deleted.blobs
                ),
                Ok(Ok(_)) => tracing::debug!("no expired objects"),
                Ok(Err(e)) => tracing::error!("sweep failed. Error: {e}"),
                Err(e) => tracing::error!("sweep task failed. Error: {e}"),
            }
        }
    }))
}

/// Deletes objects uploaded more than `ttl` before `now`.
///
/// # Errors
///
/// Fails when the database cannot be opened or written.
pub fn sweep(db: &Path, ttl: Duration, now: DateTime<Utc>) -> Result<DeleteResult, StoreError> {
    let Some(cutoff) = TimeDelta::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_sub_signed(ttl))
    else {
        return Ok(DeleteResult::default());
    };
    let mut repository = Sqlite::open(db, Mode::ReadWrite)?;
    repository.delete_older_than(cutoff)
}
