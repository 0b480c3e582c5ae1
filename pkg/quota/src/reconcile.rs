use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::aggregate::UsageAggregator;
use crate::error::QuotaError;
use crate::metrics::QuotaMetrics;
use crate::store::QuotaStore;
use pkg_state::CasOutcome;
use pkg_types::quota::ResourceQuota;
use pkg_types::resource::ResourceName;

/// Controller that recomputes every quota's `used` from the stored objects.
///
/// Heals drift left behind by admissions whose object write never happened,
/// rollbacks that gave up, or objects removed outside the admission path.
pub struct QuotaReconciler {
    store: QuotaStore,
    aggregator: UsageAggregator,
    check_interval: Duration,
    metrics: Arc<QuotaMetrics>,
}

impl QuotaReconciler {
    pub fn new(store: QuotaStore, aggregator: UsageAggregator, check_interval: Duration) -> Self {
        Self {
            store,
            aggregator,
            check_interval,
            metrics: Arc::new(QuotaMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<QuotaMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Start the controller loop as a background task. Exits once `shutdown` turns true.
    pub fn start(self, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            // tokio panics on a zero period
            let period = self.check_interval.max(Duration::from_millis(1));
            info!("QuotaReconciler started (interval={:?})", period);
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match self.reconcile_once().await {
                            Ok(0) => {}
                            Ok(n) => info!("QuotaReconciler corrected {} quotas", n),
                            Err(e) => warn!("QuotaReconciler reconcile error: {}", e),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("QuotaReconciler stopped");
        })
    }

    /// One pass over every quota. Returns how many had their `used` corrected.
    pub async fn reconcile_once(&self) -> Result<usize, QuotaError> {
        let quotas = self.store.list_all_quotas().await?;
        let mut corrected = 0usize;
        for quota in quotas {
            match self.reconcile_quota(quota).await {
                Ok(true) => corrected += 1,
                Ok(false) => {}
                Err((namespace, name, e)) => {
                    self.metrics.record_reconcile_error();
                    warn!("Failed to reconcile quota {}/{}: {}", namespace, name, e);
                }
            }
        }
        self.metrics.record_reconciled(corrected as u64);
        Ok(corrected)
    }

    async fn reconcile_quota(
        &self,
        mut quota: ResourceQuota,
    ) -> Result<bool, (String, String, QuotaError)> {
        let tracked: Vec<ResourceName> = quota.hard.names().into_iter().collect();
        let fresh = match self
            .aggregator
            .aggregate_usage(&quota.namespace, &tracked, quota.scope_selector.as_ref())
            .await
        {
            Ok(fresh) => fresh,
            Err(e) => return Err((quota.namespace, quota.name, e)),
        };

        if fresh == quota.used {
            return Ok(false);
        }

        debug!(
            "Quota {}/{} drifted: recorded {:?}, observed {:?}",
            quota.namespace, quota.name, quota.used, fresh
        );
        quota.used = fresh;
        match self.store.update_quota(&quota).await {
            Ok(CasOutcome::Committed { .. }) => {
                info!("Reconciled quota {}/{}", quota.namespace, quota.name);
                Ok(true)
            }
            Ok(CasOutcome::Conflict { .. }) => {
                debug!(
                    "Quota {}/{} changed during reconciliation, retrying next pass",
                    quota.namespace, quota.name
                );
                Ok(false)
            }
            Err(e) => Err((quota.namespace, quota.name, e.into())),
        }
    }
}
