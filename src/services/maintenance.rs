//! Maintenance tasks
//!
//! Physical purge of expired share grants and collection of stored objects
//! that no file record points at.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{info, trace, warn};

use crate::config::MaintenanceConfig;
use crate::db::Database;
use crate::error::Result;
use crate::services::ShareService;
use crate::storage::StorageManager;

/// Delete stored objects with no file record, once they are older than `grace`.
///
/// The grace period keeps uploads whose record is not yet committed out of reach.
pub async fn purge_orphans(
    db: &Database,
    storage: &StorageManager,
    grace: chrono::Duration,
    now: DateTime<Utc>,
) -> Result<u64> {
    let objects = storage.backend().list_objects().await?;
    if objects.is_empty() {
        return Ok(0);
    }

    let paths: Vec<String> = sqlx::query_scalar("SELECT storage_path FROM files")
        .fetch_all(db.pool())
        .await?;
    let referenced: HashSet<String> = paths.into_iter().collect();

    let mut purged = 0;
    for object in objects {
        if referenced.contains(&object.path) || object.modified_at + grace > now {
            continue;
        }
        match storage.backend().delete(&object.path).await {
            Ok(true) => purged += 1,
            Ok(false) => {}
            Err(e) => warn!(
                path = %object.path,
                error = %e,
                "Sweep: failed to delete orphaned object"
            ),
        }
    }
    Ok(purged)
}

/// One pass of every maintenance job
pub async fn sweep_once(
    db: &Database,
    storage: &StorageManager,
    config: &MaintenanceConfig,
    now: DateTime<Utc>,
) {
    match ShareService::purge_expired(db, now).await {
        Ok(deleted) if deleted > 0 => info!(deleted, "Sweep: removed expired share grants"),
        Ok(_) => trace!("Sweep: no expired share grants"),
        Err(e) => warn!(error = %e, "Sweep: failed to purge expired share grants"),
    }

    let grace = chrono::Duration::seconds(config.orphan_grace_secs.min(i64::MAX as u64) as i64);
    match purge_orphans(db, storage, grace, now).await {
        Ok(deleted) if deleted > 0 => info!(deleted, "Sweep: removed orphaned objects"),
        Ok(_) => trace!("Sweep: no orphaned objects"),
        Err(e) => warn!(error = %e, "Sweep: failed to collect orphaned objects"),
    }
}

/// Run the sweep loop until the task is dropped. An interval of zero disables it.
pub async fn run_sweep_loop(db: Database, storage: StorageManager, config: MaintenanceConfig) {
    if config.sweep_interval_secs == 0 {
        info!("Sweep loop disabled");
        return;
    }

    info!(
        interval_secs = config.sweep_interval_secs,
        "Sweep loop started"
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(config.sweep_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        sweep_once(&db, &storage, &config, Utc::now()).await;
    }
}
