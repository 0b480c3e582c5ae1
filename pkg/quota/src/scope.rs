use crate::error::QuotaError;
use crate::evaluator::Evaluator;
use pkg_types::object::TrackedObject;
use pkg_types::quota::ResourceQuota;
use pkg_types::scope::{ScopeSelector, scope_selector_requirements};
use pkg_types::validate::validate_scope_selector;

/// True iff `object` satisfies every requirement of `selector`, as judged by
/// `evaluator`. Stops at the first requirement that fails. A missing or empty
/// selector matches everything.
pub fn matches_scope_selector(
    object: &TrackedObject,
    evaluator: &dyn Evaluator,
    selector: Option<&ScopeSelector>,
) -> Result<bool, QuotaError> {
    for requirement in scope_selector_requirements(selector) {
        if !evaluator.matches_scope_requirement(object, requirement)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Validates the selector first; a malformed selector is a bad request, not a mismatch.
pub fn checked_matches_scope_selector(
    object: &TrackedObject,
    evaluator: &dyn Evaluator,
    selector: Option<&ScopeSelector>,
) -> Result<bool, QuotaError> {
    if let Some(selector) = selector {
        validate_scope_selector(selector)
            .map_err(|e| QuotaError::InvalidScopeSelector(e.to_string()))?;
    }
    matches_scope_selector(object, evaluator, selector)
}

/// Whether `quota` counts `object`.
pub fn quota_matches(
    quota: &ResourceQuota,
    object: &TrackedObject,
    evaluator: &dyn Evaluator,
) -> Result<bool, QuotaError> {
    checked_matches_scope_selector(object, evaluator, quota.scope_selector.as_ref()).map_err(
        |e| match e {
            QuotaError::InvalidScopeSelector(reason) => QuotaError::InvalidScopeSelector(format!(
                "quota {}/{}: {}",
                quota.namespace, quota.name, reason
            )),
            other => other,
        },
    )
}
