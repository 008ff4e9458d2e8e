use std::sync::Arc;

use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::models::whitelist::CycleReport;
use crate::services::engine::ReconciliationEngine;

/// Fires a retry + resync cycle right away, then every `period`.
/// A cycle that panics or overruns `deadline` costs only that tick.
pub async fn start_background_task(engine: Arc<ReconciliationEngine>, period: Duration, deadline: Duration) {
    tracing::info!("Background Task Started: whitelist retry + resync every {:?}", period);
    let mut interval = interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let engine = engine.clone();
        let cycle = tokio::spawn(async move { run_bounded_cycle(&engine, deadline).await });

        match cycle.await {
            Ok(Some(report)) => tracing::info!(
                "Sync cycle done: {}/{} pending confirmed, resync {}",
                report.retry.confirmed,
                report.retry.attempted,
                if report.resynced { "ok" } else { "failed" }
            ),
            Ok(None) => tracing::error!("Sync cycle abandoned after {:?}", deadline),
            Err(e) => tracing::error!("Background Task Error: {}", e),
        }
    }
}

/// `None` when the cycle did not finish within `deadline`. Whatever the
/// cycle committed before that stays committed.
pub async fn run_bounded_cycle(engine: &ReconciliationEngine, deadline: Duration) -> Option<CycleReport> {
    tokio::time::timeout(deadline, engine.run_cycle()).await.ok()
}
