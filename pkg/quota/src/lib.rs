//! Resource quota evaluation and enforcement.
//!
//! Evaluators compute what an object consumes, the enforcer checks and
//! charges namespace quotas at admission time using compare-and-swap
//! writes, and the reconciler recomputes `used` from stored objects.

pub mod admission;
pub mod aggregate;
pub mod enforcer;
pub mod error;
pub mod evaluator;
pub mod metrics;
pub mod reconcile;
pub mod registry;
pub mod scope;
pub mod store;

pub use admission::{AdmissionDecision, AdmissionHook, QuotaAdmission};
pub use aggregate::UsageAggregator;
pub use enforcer::{AdmissionRequest, Admitted, EnforcerOptions, Operation, QuotaEnforcer};
pub use error::{ErrorKind, QuotaError};
pub use evaluator::Evaluator;
pub use metrics::QuotaMetrics;
pub use reconcile::QuotaReconciler;
pub use registry::Registry;
pub use store::QuotaStore;
