use pkg_types::object::ObjectKind;
use pkg_types::quantity::{Quantity, QuantityError};
use pkg_types::resource::ResourceName;

/// Coarse classification callers act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request would push a budget past its hard limit. Terminal.
    LimitExceeded,
    /// The request itself is wrong (unresolvable reference, bad selector). Terminal.
    BadRequest,
    /// Lost too many write races or ran out of time. The caller should retry.
    Transient,
    /// Evaluator registry misuse. Only reachable at startup.
    Registration,
    /// Store or I/O failure.
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    #[error(
        "exceeded quota: {quota}, requested: {resource}={requested}, used: {resource}={used}, limited: {resource}={hard}"
    )]
    LimitExceeded {
        quota: String,
        resource: ResourceName,
        requested: Quantity,
        used: Quantity,
        hard: Quantity,
    },

    #[error("{kind} {name:?} not found")]
    ReferenceNotFound { kind: &'static str, name: String },

    #[error("invalid object: {0}")]
    InvalidObject(String),

    #[error("invalid scope selector: {0}")]
    InvalidScopeSelector(String),

    #[error("quota update conflicted {attempts} times, retry the request")]
    ConflictRetriesExhausted { attempts: u32 },

    #[error("admission deadline exceeded")]
    DeadlineExceeded,

    #[error("an evaluator for kind {0} is already registered")]
    DuplicateEvaluator(ObjectKind),

    #[error("the process-wide evaluator registry is already installed")]
    RegistryAlreadyInstalled,

    #[error(transparent)]
    Quantity(#[from] QuantityError),

    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl QuotaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QuotaError::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            QuotaError::ReferenceNotFound { .. }
            | QuotaError::InvalidObject(_)
            | QuotaError::InvalidScopeSelector(_)
            | QuotaError::Quantity(_) => ErrorKind::BadRequest,
            QuotaError::ConflictRetriesExhausted { .. } | QuotaError::DeadlineExceeded => {
                ErrorKind::Transient
            }
            QuotaError::DuplicateEvaluator(_) | QuotaError::RegistryAlreadyInstalled => {
                ErrorKind::Registration
            }
            QuotaError::Store(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_message_cites_all_quantities() {
        let err = QuotaError::LimitExceeded {
            quota: "compute".to_string(),
            resource: ResourceName::from("count/machines"),
            requested: Quantity::from_units(1),
            used: Quantity::from_units(5),
            hard: Quantity::from_units(5),
        };
        assert_eq!(
            err.to_string(),
            "exceeded quota: compute, requested: count/machines=1, used: count/machines=5, limited: count/machines=5"
        );
        assert_eq!(err.kind(), ErrorKind::LimitExceeded);
    }

    #[test]
    fn test_classification() {
        let not_found = QuotaError::ReferenceNotFound {
            kind: "machine class",
            name: "gold".to_string(),
        };
        assert_eq!(not_found.kind(), ErrorKind::BadRequest);
        assert_eq!(not_found.to_string(), "machine class \"gold\" not found");
        assert_eq!(
            QuotaError::ConflictRetriesExhausted { attempts: 11 }.kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            QuotaError::DuplicateEvaluator(ObjectKind::Machine).kind(),
            ErrorKind::Registration
        );
        assert_eq!(
            QuotaError::Store(anyhow::anyhow!("disk full")).kind(),
            ErrorKind::Internal
        );
    }
}
