use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::QuotaError;
use crate::evaluator::{Evaluator, existing_usage};
use crate::metrics::QuotaMetrics;
use crate::registry::Registry;
use crate::scope::quota_matches;
use crate::store::QuotaStore;
use pkg_constants::quota::{
    DEFAULT_BASE_BACKOFF_MS, DEFAULT_MAX_BACKOFF_MS, DEFAULT_MAX_RETRIES, DEFAULT_ROLLBACK_TIMEOUT_MS,
};
use pkg_state::CasOutcome;
use pkg_types::config::QuotaConfig;
use pkg_types::object::TrackedObject;
use pkg_types::quota::ResourceQuota;
use pkg_types::resource::{ResourceList, ResourceName};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "CREATE"),
            Operation::Update => write!(f, "UPDATE"),
            Operation::Delete => write!(f, "DELETE"),
        }
    }
}

/// A mutation of a tracked object awaiting the quota decision.
///
/// For `Delete`, `object` is the object being removed.
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub operation: Operation,
    pub object: TrackedObject,
    pub old_object: Option<TrackedObject>,
}

impl AdmissionRequest {
    pub fn create(object: impl Into<TrackedObject>) -> Self {
        Self {
            operation: Operation::Create,
            object: object.into(),
            old_object: None,
        }
    }

    pub fn update(old: impl Into<TrackedObject>, new: impl Into<TrackedObject>) -> Self {
        Self {
            operation: Operation::Update,
            object: new.into(),
            old_object: Some(old.into()),
        }
    }

    pub fn delete(object: impl Into<TrackedObject>) -> Self {
        Self {
            operation: Operation::Delete,
            object: object.into(),
            old_object: None,
        }
    }

    /// `(new, old)` versions of the object. An update without a prior version counts as a create.
    fn versions(&self) -> Result<(Option<&TrackedObject>, Option<&TrackedObject>), QuotaError> {
        match self.operation {
            Operation::Create => Ok((Some(&self.object), None)),
            Operation::Delete => Ok((None, Some(&self.object))),
            Operation::Update => {
                if let Some(old) = &self.old_object
                    && (old.kind() != self.object.kind()
                        || old.namespace() != self.object.namespace()
                        || old.name() != self.object.name())
                {
                    return Err(QuotaError::InvalidObject(format!(
                        "update of {} {}/{} carries prior version {} {}/{}",
                        self.object.kind(),
                        self.object.namespace(),
                        self.object.name(),
                        old.kind(),
                        old.namespace(),
                        old.name()
                    )));
                }
                Ok((Some(&self.object), self.old_object.as_ref()))
            }
        }
    }
}

/// Retry tuning for the commit loop.
#[derive(Debug, Clone)]
pub struct EnforcerOptions {
    /// Stale-token retries before giving up with a transient error
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Upper bound on undoing charges after a failed admission
    pub rollback_timeout: Duration,
}

impl Default for EnforcerOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff: Duration::from_millis(DEFAULT_BASE_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
            rollback_timeout: Duration::from_millis(DEFAULT_ROLLBACK_TIMEOUT_MS),
        }
    }
}

impl From<&QuotaConfig> for EnforcerOptions {
    fn from(config: &QuotaConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            rollback_timeout: Duration::from_millis(config.rollback_timeout_ms),
        }
    }
}

/// A successful admission: the quotas that were charged, by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Admitted {
    pub charged: Vec<String>,
}

/// One object version with its computed usage.
struct Version<'a> {
    object: &'a TrackedObject,
    usage: ResourceList,
}

enum Attempt {
    Done,
    Conflict,
}

/// Runs `fut`, failing with `DeadlineExceeded` once `deadline` passes.
async fn within<T, F>(deadline: Option<Instant>, fut: F) -> Result<T, QuotaError>
where
    F: Future<Output = Result<T, QuotaError>>,
{
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut)
            .await
            .unwrap_or_else(|_| Err(QuotaError::DeadlineExceeded)),
        None => fut.await,
    }
}

/// Usage `quota` should see from `version`: all of it when the quota's scope matches, none otherwise.
fn charged_usage(
    quota: &ResourceQuota,
    evaluator: &dyn Evaluator,
    version: Option<&Version<'_>>,
) -> Result<ResourceList, QuotaError> {
    let Some(version) = version else {
        return Ok(ResourceList::new());
    };
    if quota_matches(quota, version.object, evaluator)? {
        Ok(version.usage.clone())
    } else {
        Ok(ResourceList::new())
    }
}

/// Change in `quota.used` this admission causes, restricted to names the quota limits.
fn quota_delta(
    quota: &ResourceQuota,
    evaluator: &dyn Evaluator,
    new: Option<&Version<'_>>,
    old: Option<&Version<'_>>,
) -> Result<ResourceList, QuotaError> {
    let delta = charged_usage(quota, evaluator, new)?.subtract(&charged_usage(quota, evaluator, old)?)?;
    Ok(delta.mask(quota.hard.iter().map(|(name, _)| name)).non_zero())
}

/// `used + delta <= hard` for every name the delta increases. Decreases are never checked.
fn check_limits(quota: &ResourceQuota, delta: &ResourceList) -> Result<(), QuotaError> {
    for (name, requested) in delta {
        if !requested.is_positive() {
            continue;
        }
        let hard = quota.hard.get_or_zero(name.as_str());
        let used = quota.used.get_or_zero(name.as_str());
        if used.checked_add(requested)? > hard {
            return Err(QuotaError::LimitExceeded {
                quota: quota.name.clone(),
                resource: name.clone(),
                requested: *requested,
                used,
                hard,
            });
        }
    }
    Ok(())
}

/// Admission-time quota enforcement.
///
/// Computes the usage change of a single incoming object, checks it against
/// every quota in the namespace that counts the object, and commits the new
/// `used` amounts with compare-and-swap writes. Holds no state between calls;
/// concurrent admissions (in this or other processes) are serialized only by
/// the store's revision check.
pub struct QuotaEnforcer {
    store: QuotaStore,
    registry: Arc<Registry>,
    options: EnforcerOptions,
    metrics: Arc<QuotaMetrics>,
}

impl QuotaEnforcer {
    pub fn new(store: QuotaStore, registry: Arc<Registry>, options: EnforcerOptions) -> Self {
        Self {
            store,
            registry,
            options,
            metrics: Arc::new(QuotaMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<QuotaMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<QuotaMetrics> {
        &self.metrics
    }

    /// Admit or reject `request`, charging every matching quota on success.
    pub async fn admit(&self, request: &AdmissionRequest) -> Result<Admitted, QuotaError> {
        self.record(self.enforce(request, None).await)
    }

    /// Like [`admit`](Self::admit), but fails with `DeadlineExceeded` once `deadline` passes.
    /// Charges committed before the deadline are rolled back.
    pub async fn admit_with_deadline(
        &self,
        request: &AdmissionRequest,
        deadline: Instant,
    ) -> Result<Admitted, QuotaError> {
        self.record(self.enforce(request, Some(deadline)).await)
    }

    fn record(&self, result: Result<Admitted, QuotaError>) -> Result<Admitted, QuotaError> {
        match &result {
            Ok(_) => self.metrics.record_admitted(),
            Err(e) => self.metrics.record_failure(e.kind()),
        }
        result
    }

    async fn enforce(
        &self,
        request: &AdmissionRequest,
        deadline: Option<Instant>,
    ) -> Result<Admitted, QuotaError> {
        let object = &request.object;
        let namespace = object.namespace();

        let Some(evaluator) = self.registry.evaluator_for_object(object) else {
            debug!(
                "No quota evaluator for {}, admitting {}/{} unaccounted",
                object.kind(),
                namespace,
                object.name()
            );
            return Ok(Admitted::default());
        };
        let evaluator = evaluator.as_ref();

        let (new_object, old_object) = request.versions()?;
        let new = match new_object {
            Some(o) => Some(Version {
                object: o,
                usage: within(deadline, evaluator.usage(o)).await?,
            }),
            None => None,
        };
        // The prior version is already stored; its class may have been removed since.
        let old = match old_object {
            Some(o) => Some(Version {
                object: o,
                usage: within(deadline, existing_usage(evaluator, o)).await?,
            }),
            None => None,
        };

        let names: BTreeSet<ResourceName> = new
            .iter()
            .chain(old.iter())
            .flat_map(|v| v.usage.names())
            .collect();
        if names.is_empty() {
            return Ok(Admitted::default());
        }

        let mut committed: BTreeMap<String, ResourceList> = BTreeMap::new();
        let mut conflicts = 0u32;
        loop {
            let attempt = within(
                deadline,
                self.try_commit(namespace, evaluator, &names, new.as_ref(), old.as_ref(), &mut committed),
            )
            .await;

            match attempt {
                Ok(Attempt::Done) => {
                    if !committed.is_empty() {
                        info!(
                            "{} {} {}/{}: charged quotas {:?}",
                            request.operation,
                            object.kind(),
                            namespace,
                            object.name(),
                            committed.keys().collect::<Vec<_>>()
                        );
                    }
                    return Ok(Admitted {
                        charged: committed.into_keys().collect(),
                    });
                }
                Ok(Attempt::Conflict) => {
                    conflicts += 1;
                    self.metrics.record_conflict();
                    if conflicts > self.options.max_retries {
                        warn!(
                            "{} {} {}/{}: quota update conflicted {} times, giving up",
                            request.operation,
                            object.kind(),
                            namespace,
                            object.name(),
                            conflicts
                        );
                        self.rollback(namespace, &committed).await;
                        return Err(QuotaError::ConflictRetriesExhausted {
                            attempts: conflicts,
                        });
                    }
                    let delay = self.backoff(conflicts);
                    debug!(
                        "Quota conflict #{} in namespace {}, retrying in {:?}",
                        conflicts, namespace, delay
                    );
                    let slept = within(deadline, async {
                        tokio::time::sleep(delay).await;
                        Ok::<(), QuotaError>(())
                    })
                    .await;
                    if let Err(e) = slept {
                        self.rollback(namespace, &committed).await;
                        return Err(e);
                    }
                }
                Err(e) => {
                    self.rollback(namespace, &committed).await;
                    return Err(e);
                }
            }
        }
    }

    /// One read-check-write pass over the namespace's quotas.
    /// Quotas already in `committed` were charged by an earlier pass and are skipped.
    async fn try_commit(
        &self,
        namespace: &str,
        evaluator: &dyn Evaluator,
        names: &BTreeSet<ResourceName>,
        new: Option<&Version<'_>>,
        old: Option<&Version<'_>>,
        committed: &mut BTreeMap<String, ResourceList>,
    ) -> Result<Attempt, QuotaError> {
        let quotas = self.store.list_quotas(namespace).await?;

        let mut plan = Vec::new();
        for quota in quotas {
            if committed.contains_key(&quota.name) || !quota.tracks_any(names.iter()) {
                continue;
            }
            let delta = quota_delta(&quota, evaluator, new, old)?;
            if delta.is_empty() {
                continue;
            }
            check_limits(&quota, &delta)?;
            plan.push((quota, delta));
        }

        for (mut quota, delta) in plan {
            quota.used = quota.used.add(&delta)?.clamp_non_negative();
            match self.store.update_quota(&quota).await? {
                CasOutcome::Committed { revision } => {
                    debug!(
                        "Quota {}/{} now at revision {}: used={:?}",
                        namespace, quota.name, revision, quota.used
                    );
                    committed.insert(quota.name, delta);
                }
                CasOutcome::Conflict { current } => {
                    debug!(
                        "Quota {}/{} changed underneath us (read {}, now {:?})",
                        namespace, quota.name, quota.resource_version, current
                    );
                    return Ok(Attempt::Conflict);
                }
            }
        }

        Ok(Attempt::Done)
    }

    /// Undo charges of a failed admission within `rollback_timeout`.
    /// Best effort; the reconciler heals what this misses.
    async fn rollback(&self, namespace: &str, committed: &BTreeMap<String, ResourceList>) {
        if committed.is_empty() {
            return;
        }
        let limit = self.options.rollback_timeout;
        if tokio::time::timeout(limit, self.refund(namespace, committed))
            .await
            .is_err()
        {
            warn!(
                "Rollback of quotas {:?} in namespace {} did not finish within {:?}",
                committed.keys().collect::<Vec<_>>(),
                namespace,
                limit
            );
        }
    }

    async fn refund(&self, namespace: &str, committed: &BTreeMap<String, ResourceList>) {
        for (name, delta) in committed {
            let refund = delta.negated();
            let mut attempts = 0u32;
            loop {
                attempts += 1;
                let mut quota = match self.store.get_quota(namespace, name).await {
                    Ok(Some(q)) => q,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Rollback of quota {}/{} failed: {}", namespace, name, e);
                        break;
                    }
                };
                quota.used = match quota.used.add(&refund) {
                    Ok(used) => used.clamp_non_negative(),
                    Err(e) => {
                        warn!("Rollback of quota {}/{} failed: {}", namespace, name, e);
                        break;
                    }
                };
                match self.store.update_quota(&quota).await {
                    Ok(CasOutcome::Committed { .. }) => {
                        self.metrics.record_rollback();
                        info!("Rolled back charge on quota {}/{}", namespace, name);
                        break;
                    }
                    Ok(CasOutcome::Conflict { .. }) if attempts <= self.options.max_retries => {
                        tokio::time::sleep(self.backoff(attempts)).await;
                    }
                    Ok(CasOutcome::Conflict { .. }) => {
                        warn!(
                            "Giving up rollback of quota {}/{} after {} attempts",
                            namespace, name, attempts
                        );
                        break;
                    }
                    Err(e) => {
                        warn!("Rollback of quota {}/{} failed: {}", namespace, name, e);
                        break;
                    }
                }
            }
        }
    }

    /// Exponential step capped at `max_backoff`; sleeps between half and all of it.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        let step = self
            .options
            .base_backoff
            .saturating_mul(factor)
            .min(self.options.max_backoff);
        let half = step / 2;
        let jitter_us = half.as_micros() as u64;
        if jitter_us == 0 {
            return step;
        }
        half + Duration::from_micros(rand::rng().random_range(0..=jitter_us))
    }
}
