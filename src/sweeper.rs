use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::observability;
use crate::scheduler::{now_ms, Scheduler};

#[derive(Debug, Clone, Copy)]
pub struct SweeperConfig {
    pub interval: Duration,
    /// WAL appends since the last compaction before the sweeper compacts.
    pub compact_threshold: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            compact_threshold: 1000,
        }
    }
}

/// Background task: auto-rejects pending reservations whose whole range has
/// passed (nobody can honor them anymore) and compacts the WAL once enough
/// appends have accumulated.
pub async fn run(scheduler: Arc<Scheduler>, cfg: SweeperConfig) {
    let mut interval = tokio::time::interval(cfg.interval);
    loop {
        interval.tick().await;
        sweep_once(&scheduler, cfg.compact_threshold).await;
    }
}

/// One pass. Split out so tests can drive it without the timer.
pub async fn sweep_once(scheduler: &Scheduler, compact_threshold: u64) {
    let now = now_ms();
    let lapsed = scheduler.collect_lapsed_pending(now);
    for (reservation_id, resource_id) in lapsed {
        match scheduler
            .reject_reservation(reservation_id, Some("lapsed before approval".into()))
            .await
        {
            Ok(()) => {
                metrics::counter!(observability::SWEEPER_REJECTED_TOTAL).increment(1);
                info!("swept lapsed pending reservation {reservation_id} on {resource_id}");
            }
            Err(e) => {
                // May already have been decided — that's fine
                tracing::debug!("sweeper skip {reservation_id}: {e}");
            }
        }
    }

    if scheduler.wal_appends_since_compact().await >= compact_threshold
        && let Err(e) = scheduler.compact_wal().await
    {
        tracing::warn!("WAL compaction failed: {e}");
    }
}
