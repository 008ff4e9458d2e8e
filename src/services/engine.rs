use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::models::whitelist::{
    contains_name, CycleReport, PlayerName, RetrySummary, SubmitOutcome, WhitelistRequest,
};
use crate::services::registry::RegistryClient;
use crate::store::{PlayerStore, StoreError};

/// Owns every mutation of the confirmed set and the pending queue.
///
/// Registry calls are made without holding any store lock; the store only
/// locks around its own in-memory/disk mutation.
pub struct ReconciliationEngine {
    store: Arc<dyn PlayerStore>,
    registry: Arc<dyn RegistryClient>,
    cycle_lock: Mutex<()>,
    last_report: RwLock<Option<CycleReport>>,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn PlayerStore>, registry: Arc<dyn RegistryClient>) -> Self {
        Self {
            store,
            registry,
            cycle_lock: Mutex::new(()),
            last_report: RwLock::new(None),
        }
    }

    /// A registry failure is not an error here: the request is queued and
    /// `Accepted { now_confirmed: false }` comes back. Only store failures
    /// surface, so the caller knows the request was not recorded.
    pub async fn submit(&self, request: WhitelistRequest) -> Result<SubmitOutcome, StoreError> {
        let confirmed = self.store.confirmed_players().await?;
        if contains_name(&confirmed, &request.player_name) {
            return Ok(SubmitOutcome::AlreadyConfirmed);
        }

        match self.registry.submit(&request).await {
            Ok(()) => {
                self.store.add_confirmed(&request.player_name).await?;
                tracing::info!(
                    "Whitelisted {} (requested by {})",
                    request.player_name,
                    request.requester_id
                );
                Ok(SubmitOutcome::Accepted { now_confirmed: true })
            }
            Err(e) => {
                tracing::warn!(
                    "Registry rejected {} ({}), queueing for retry",
                    request.player_name,
                    e
                );
                self.store.enqueue_pending(request).await?;
                Ok(SubmitOutcome::Accepted { now_confirmed: false })
            }
        }
    }

    /// One pass over the queue, oldest first, each entry attempted once.
    /// Delivered entries are removed in a single batch at the end; entries
    /// that still fail stay where they are.
    pub async fn retry_pending(&self) -> RetrySummary {
        let pending = match self.store.pending_requests().await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::error!("Retry skipped, cannot read pending queue: {}", e);
                return RetrySummary::default();
            }
        };

        let mut summary = RetrySummary::default();
        let mut delivered: Vec<WhitelistRequest> = Vec::new();
        let mut duplicates = 0;

        for request in pending {
            // A duplicate of something delivered earlier in this pass goes out
            // with the same batch removal.
            if delivered.iter().any(|d| d.same_identity(&request)) {
                duplicates += 1;
                continue;
            }
            summary.attempted += 1;

            if let Err(e) = self.registry.submit(&request).await {
                tracing::warn!("Retry failed for {}: {}", request.player_name, e);
                summary.failed += 1;
                continue;
            }

            // Keep it queued if we could not record the confirmation; the
            // next pass resubmits it.
            match self.store.add_confirmed(&request.player_name).await {
                Ok(_) => delivered.push(request),
                Err(e) => {
                    tracing::error!("Could not record confirmation of {}: {}", request.player_name, e);
                    summary.failed += 1;
                }
            }
        }

        if delivered.is_empty() {
            return summary;
        }

        match self
            .store
            .remove_pending(&|entry: &WhitelistRequest| delivered.iter().any(|d| d.same_identity(entry)))
            .await
        {
            // `removed` can be larger than the snapshot when a matching request
            // was queued while this pass ran; only the snapshot is counted.
            Ok(removed) => {
                summary.confirmed = delivered.len() + duplicates;
                tracing::info!(
                    "Retry confirmed {} pending request(s), removed {} from queue",
                    summary.confirmed,
                    removed
                );
            }
            Err(e) => tracing::error!("Could not drop delivered requests from queue: {}", e),
        }
        summary
    }

    /// Replaces the confirmed set with the registry's listing. Returns false
    /// and leaves local state alone when the listing cannot be fetched.
    pub async fn resync(&self) -> bool {
        let names = match self.registry.list_all().await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!("Resync skipped: {}", e);
                return false;
            }
        };

        let count = names.len();
        match self.store.replace_confirmed(names).await {
            Ok(()) => {
                tracing::info!("Resynced whitelist from registry ({} players)", count);
                true
            }
            Err(e) => {
                tracing::error!("Resync could not store listing: {}", e);
                false
            }
        }
    }

    /// Retry then resync. Cycles never overlap each other.
    pub async fn run_cycle(&self) -> CycleReport {
        let _guard = self.cycle_lock.lock().await;
        let started_at = Utc::now();

        let retry = self.retry_pending().await;
        let resynced = self.resync().await;

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            retry,
            resynced,
            confirmed_total: self.store.confirmed_players().await.ok().map(|p| p.len()),
            pending_total: self.store.pending_requests().await.ok().map(|p| p.len()),
        };
        *self.last_report.write().await = Some(report.clone());
        report
    }

    /// Operator removal of a pending request (the "deny" path).
    pub async fn withdraw(&self, requester_id: &str, player_name: &str) -> Result<usize, StoreError> {
        let target = WhitelistRequest::new(requester_id, player_name);
        let removed = self
            .store
            .remove_pending(&|entry: &WhitelistRequest| entry.same_identity(&target))
            .await?;
        tracing::info!("Withdrew {} pending request(s) for {}", removed, player_name);
        Ok(removed)
    }

    pub async fn confirmed_players(&self) -> Result<Vec<PlayerName>, StoreError> {
        self.store.confirmed_players().await
    }

    pub async fn pending_requests(&self) -> Result<Vec<WhitelistRequest>, StoreError> {
        self.store.pending_requests().await
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().await.clone()
    }
}
