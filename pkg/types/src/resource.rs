use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::quantity::{Quantity, QuantityError};

/// Name of a tracked resource, e.g. `requests.cpu` or `count/machines`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceName(String);

impl ResourceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// `count/<plural>`: the resource counting objects of one kind.
    pub fn object_count_for(plural: &str) -> Self {
        Self(format!(
            "{}{}",
            pkg_constants::quota::OBJECT_COUNT_PREFIX,
            plural
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for ResourceName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Resource name → quantity. Absent keys read as zero.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceList(BTreeMap<ResourceName, Quantity>);

impl ResourceList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Quantity> {
        self.0.get(name)
    }

    /// The quantity for `name`, or zero.
    pub fn get_or_zero(&self, name: &str) -> Quantity {
        self.0.get(name).copied().unwrap_or(Quantity::ZERO)
    }

    pub fn insert(&mut self, name: impl Into<ResourceName>, quantity: Quantity) {
        self.0.insert(name.into(), quantity);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceName, &Quantity)> {
        self.0.iter()
    }

    pub fn names(&self) -> BTreeSet<ResourceName> {
        self.0.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every entry is zero (or there are none).
    pub fn is_zero(&self) -> bool {
        self.0.values().all(Quantity::is_zero)
    }

    /// Pointwise sum over the union of keys.
    pub fn add(&self, other: &ResourceList) -> Result<ResourceList, QuantityError> {
        let mut out = self.clone();
        for (name, quantity) in &other.0 {
            let current = out.get_or_zero(name.as_str());
            out.0.insert(name.clone(), current.checked_add(quantity)?);
        }
        Ok(out)
    }

    /// Pointwise difference over the union of keys.
    pub fn subtract(&self, other: &ResourceList) -> Result<ResourceList, QuantityError> {
        let mut out = self.clone();
        for (name, quantity) in &other.0 {
            let current = out.get_or_zero(name.as_str());
            out.0.insert(name.clone(), current.checked_sub(quantity)?);
        }
        Ok(out)
    }

    /// Only the entries whose names are in `names`.
    pub fn mask<'a, I>(&self, names: I) -> ResourceList
    where
        I: IntoIterator<Item = &'a ResourceName>,
    {
        let mut out = ResourceList::new();
        for name in names {
            if let Some(q) = self.0.get(name) {
                out.0.insert(name.clone(), *q);
            }
        }
        out
    }

    /// Drops zero entries.
    pub fn non_zero(&self) -> ResourceList {
        self.0
            .iter()
            .filter(|(_, q)| !q.is_zero())
            .map(|(n, q)| (n.clone(), *q))
            .collect()
    }

    /// Negative entries become zero.
    pub fn clamp_non_negative(&self) -> ResourceList {
        self.0
            .iter()
            .map(|(n, q)| (n.clone(), q.clamp_non_negative()))
            .collect()
    }

    /// Negates every entry.
    pub fn negated(&self) -> ResourceList {
        self.0.iter().map(|(n, q)| (n.clone(), q.negated())).collect()
    }
}

impl FromIterator<(ResourceName, Quantity)> for ResourceList {
    fn from_iter<T: IntoIterator<Item = (ResourceName, Quantity)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ResourceList {
    type Item = (&'a ResourceName, &'a Quantity);
    type IntoIter = std::collections::btree_map::Iter<'a, ResourceName, Quantity>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Builds a list from `(name, quantity-string)` pairs; panics on bad input.
/// Intended for tests and static defaults.
#[macro_export]
macro_rules! resource_list {
    ($($name:expr => $qty:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut list = $crate::resource::ResourceList::new();
        $(
            list.insert(
                $crate::resource::ResourceName::from($name),
                $qty.parse::<$crate::quantity::Quantity>().expect("valid quantity literal"),
            );
        )*
        list
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_subtract_cover_key_union() {
        let a = resource_list! { "count/machines" => "1", "requests.cpu" => "2" };
        let b = resource_list! { "requests.cpu" => "500m", "requests.memory" => "1Gi" };

        let sum = a.add(&b).unwrap();
        assert_eq!(sum.get_or_zero("count/machines"), Quantity::from_units(1));
        assert_eq!(sum.get_or_zero("requests.cpu"), Quantity::from_millis(2500));
        assert_eq!(sum.get_or_zero("requests.memory").to_string(), "1Gi");

        let diff = a.subtract(&b).unwrap();
        assert_eq!(diff.get_or_zero("requests.cpu"), Quantity::from_millis(1500));
        assert!(diff.get_or_zero("requests.memory").is_negative());
    }

    #[test]
    fn test_mask_keeps_only_named_entries() {
        let list = resource_list! { "a" => "1", "b" => "2", "c" => "3" };
        let names = [ResourceName::from("a"), ResourceName::from("c"), ResourceName::from("z")];
        let masked = list.mask(names.iter());
        assert_eq!(masked.len(), 2);
        assert!(masked.contains("a") && masked.contains("c"));
    }

    #[test]
    fn test_non_zero_and_clamp() {
        let list = resource_list! { "a" => "0", "b" => "-2", "c" => "1" };
        assert_eq!(list.non_zero().len(), 2);
        let clamped = list.clamp_non_negative();
        assert_eq!(clamped.get_or_zero("b"), Quantity::ZERO);
        assert_eq!(clamped.get_or_zero("c"), Quantity::from_units(1));
        assert!(resource_list! { "a" => "0" }.is_zero());
    }

    #[test]
    fn test_serializes_as_string_map() {
        let list = resource_list! { "count" => "5", "requests.memory" => "1Gi" };
        let json = serde_json::to_string(&list).unwrap();
        assert_eq!(json, r#"{"count":"5","requests.memory":"1Gi"}"#);
        let back: ResourceList = serde_json::from_str(&json).unwrap();
        assert_eq!(back, list);
    }
}
