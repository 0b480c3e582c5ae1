use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resource::{ResourceList, ResourceName};
use crate::scope::{ScopeSelector, ScopeSelectorRequirement, scope_selector_requirements};

/// Namespace-scoped quota budget: hard limits and current consumption.
///
/// `hard` belongs to the owner; `used` is written only by the enforcer and the
/// reconciler. `resource_version` is the store revision the record was read at
/// and is the token every write of `used` is conditioned on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceQuota {
    pub name: String,
    pub namespace: String,
    /// Restricts which objects count against this budget. Absent = all objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_selector: Option<ScopeSelector>,
    pub hard: ResourceList,
    #[serde(default)]
    pub used: ResourceList,
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ResourceQuota {
    pub fn new(namespace: &str, name: &str, hard: ResourceList) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            scope_selector: None,
            hard,
            used: ResourceList::new(),
            resource_version: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_scope_selector(mut self, selector: ScopeSelector) -> Self {
        self.scope_selector = Some(selector);
        self
    }

    pub fn scope_requirements(&self) -> &[ScopeSelectorRequirement] {
        scope_selector_requirements(self.scope_selector.as_ref())
    }

    /// Whether this budget sets a hard limit for `name`.
    pub fn tracks(&self, name: &ResourceName) -> bool {
        self.hard.contains(name.as_str())
    }

    /// Whether any of `names` has a hard limit here.
    pub fn tracks_any<'a, I>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = &'a ResourceName>,
    {
        names.into_iter().any(|n| self.tracks(n))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        crate::validate::validate_name(&self.name)?;
        crate::validate::validate_name(&self.namespace)?;
        if let Some(selector) = &self.scope_selector {
            crate::validate::validate_scope_selector(selector)?;
        }
        for (name, quantity) in &self.hard {
            if quantity.is_negative() {
                anyhow::bail!("hard limit for {} must not be negative (got {})", name, quantity);
            }
        }
        for (name, quantity) in &self.used {
            if quantity.is_negative() {
                anyhow::bail!("usage of {} must not be negative (got {})", name, quantity);
            }
        }
        Ok(())
    }
}
