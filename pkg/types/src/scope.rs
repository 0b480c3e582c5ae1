use serde::{Deserialize, Serialize};
use std::fmt;

/// A scoping dimension, e.g. `MachineClass`. Kinds decide which names they understand.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeName(String);

impl ScopeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn machine_class() -> Self {
        Self::new(pkg_constants::quota::SCOPE_MACHINE_CLASS)
    }

    pub fn volume_class() -> Self {
        Self::new(pkg_constants::quota::SCOPE_VOLUME_CLASS)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeSelectorOperator {
    Exists,
    DoesNotExist,
    In,
    NotIn,
}

impl fmt::Display for ScopeSelectorOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeSelectorOperator::Exists => write!(f, "Exists"),
            ScopeSelectorOperator::DoesNotExist => write!(f, "DoesNotExist"),
            ScopeSelectorOperator::In => write!(f, "In"),
            ScopeSelectorOperator::NotIn => write!(f, "NotIn"),
        }
    }
}

/// One predicate of a scope selector.
/// `In`/`NotIn` need at least one value; `Exists`/`DoesNotExist` ignore them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSelectorRequirement {
    pub scope_name: ScopeName,
    pub operator: ScopeSelectorOperator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl ScopeSelectorRequirement {
    pub fn new(scope_name: ScopeName, operator: ScopeSelectorOperator, values: &[&str]) -> Self {
        Self {
            scope_name,
            operator,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Evaluates the operator against an optional field value.
    /// `None` means the scoped field is not set on the object.
    pub fn matches_value(&self, value: Option<&str>) -> bool {
        match (self.operator, value) {
            (ScopeSelectorOperator::Exists, v) => v.is_some(),
            (ScopeSelectorOperator::DoesNotExist, v) => v.is_none(),
            (ScopeSelectorOperator::In, Some(v)) => self.values.iter().any(|x| x == v),
            (ScopeSelectorOperator::In, None) => false,
            (ScopeSelectorOperator::NotIn, Some(v)) => !self.values.iter().any(|x| x == v),
            (ScopeSelectorOperator::NotIn, None) => true,
        }
    }
}

/// AND-combined list of requirements. An empty selector matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScopeSelector {
    #[serde(default)]
    pub match_expressions: Vec<ScopeSelectorRequirement>,
}

impl ScopeSelector {
    pub fn new(match_expressions: Vec<ScopeSelectorRequirement>) -> Self {
        Self { match_expressions }
    }
}

/// Requirements of an optional selector; a missing selector has none.
pub fn scope_selector_requirements(selector: Option<&ScopeSelector>) -> &[ScopeSelectorRequirement] {
    selector.map(|s| s.match_expressions.as_slice()).unwrap_or(&[])
}
