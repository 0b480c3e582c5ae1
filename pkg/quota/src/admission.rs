//! ResourceQuota admission hook.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::enforcer::{AdmissionRequest, Operation, QuotaEnforcer};
use crate::error::ErrorKind;
use pkg_constants::quota::ADMISSION_PLUGIN_NAME;
use pkg_types::config::QuotaConfig;

/// Outcome handed back to the admission pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    Allowed,
    /// Terminal: the request must not be retried unchanged.
    Denied { reason: String },
    /// Transient or internal failure: the caller may retry the whole request.
    Errored { reason: String },
}

impl AdmissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AdmissionDecision::Allowed)
    }
}

/// A named pre-commit hook in the admission pipeline.
#[async_trait]
pub trait AdmissionHook: Send + Sync {
    fn name(&self) -> &'static str;

    fn handles(&self, operation: Operation) -> bool;

    async fn admit(&self, request: &AdmissionRequest) -> AdmissionDecision;
}

pub struct QuotaAdmission {
    enforcer: Arc<QuotaEnforcer>,
    timeout: Duration,
}

impl QuotaAdmission {
    pub fn new(enforcer: Arc<QuotaEnforcer>, timeout: Duration) -> Self {
        Self { enforcer, timeout }
    }

    pub fn from_config(enforcer: Arc<QuotaEnforcer>, config: &QuotaConfig) -> Self {
        Self::new(enforcer, Duration::from_millis(config.admission_timeout_ms))
    }
}

#[async_trait]
impl AdmissionHook for QuotaAdmission {
    fn name(&self) -> &'static str {
        ADMISSION_PLUGIN_NAME
    }

    fn handles(&self, operation: Operation) -> bool {
        matches!(
            operation,
            Operation::Create | Operation::Update | Operation::Delete
        )
    }

    async fn admit(&self, request: &AdmissionRequest) -> AdmissionDecision {
        let deadline = tokio::time::Instant::now() + self.timeout;
        match self.enforcer.admit_with_deadline(request, deadline).await {
            Ok(_) => AdmissionDecision::Allowed,
            Err(e) => match e.kind() {
                ErrorKind::LimitExceeded | ErrorKind::BadRequest => {
                    debug!(
                        "{} denied {} {} {}/{}: {}",
                        ADMISSION_PLUGIN_NAME,
                        request.operation,
                        request.object.kind(),
                        request.object.namespace(),
                        request.object.name(),
                        e
                    );
                    AdmissionDecision::Denied {
                        reason: e.to_string(),
                    }
                }
                _ => {
                    warn!(
                        "{} failed {} {} {}/{}: {}",
                        ADMISSION_PLUGIN_NAME,
                        request.operation,
                        request.object.kind(),
                        request.object.namespace(),
                        request.object.name(),
                        e
                    );
                    AdmissionDecision::Errored {
                        reason: e.to_string(),
                    }
                }
            },
        }
    }
}
