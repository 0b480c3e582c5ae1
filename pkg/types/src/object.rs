use serde::{Deserialize, Serialize};
use std::fmt;

use crate::machine::Machine;
use crate::network::Network;
use crate::volume::Volume;
use pkg_constants::state::{MACHINES_PREFIX, NETWORKS_PREFIX, VOLUMES_PREFIX};

/// Kinds of namespaced objects the quota engine can account for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Machine,
    Volume,
    Network,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 3] = [ObjectKind::Machine, ObjectKind::Volume, ObjectKind::Network];

    /// Lowercase plural, as used in `count/<plural>` and store keys.
    pub fn plural(&self) -> &'static str {
        match self {
            ObjectKind::Machine => "machines",
            ObjectKind::Volume => "volumes",
            ObjectKind::Network => "networks",
        }
    }

    pub fn store_prefix(&self) -> &'static str {
        match self {
            ObjectKind::Machine => MACHINES_PREFIX,
            ObjectKind::Volume => VOLUMES_PREFIX,
            ObjectKind::Network => NETWORKS_PREFIX,
        }
    }

    /// `/registry/<plural>/<ns>/`
    pub fn namespace_prefix(&self, namespace: &str) -> String {
        format!("{}{}/", self.store_prefix(), namespace)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Machine => write!(f, "Machine"),
            ObjectKind::Volume => write!(f, "Volume"),
            ObjectKind::Network => write!(f, "Network"),
        }
    }
}

/// A namespaced object whose kind may be subject to quota.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TrackedObject {
    Machine(Machine),
    Volume(Volume),
    Network(Network),
}

impl TrackedObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            TrackedObject::Machine(_) => ObjectKind::Machine,
            TrackedObject::Volume(_) => ObjectKind::Volume,
            TrackedObject::Network(_) => ObjectKind::Network,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TrackedObject::Machine(m) => &m.name,
            TrackedObject::Volume(v) => &v.name,
            TrackedObject::Network(n) => &n.name,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            TrackedObject::Machine(m) => &m.namespace,
            TrackedObject::Volume(v) => &v.namespace,
            TrackedObject::Network(n) => &n.namespace,
        }
    }

    /// `/registry/<plural>/<ns>/<name>`
    pub fn store_key(&self) -> String {
        format!("{}{}", self.kind().namespace_prefix(self.namespace()), self.name())
    }
}

impl From<Machine> for TrackedObject {
    fn from(m: Machine) -> Self {
        TrackedObject::Machine(m)
    }
}

impl From<Volume> for TrackedObject {
    fn from(v: Volume) -> Self {
        TrackedObject::Volume(v)
    }
}

impl From<Network> for TrackedObject {
    fn from(n: Network) -> Self {
        TrackedObject::Network(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_key_layout() {
        let obj: TrackedObject = Machine::new("team-a", "web-1", "gold").into();
        assert_eq!(obj.kind(), ObjectKind::Machine);
        assert_eq!(obj.store_key(), "/registry/machines/team-a/web-1");
        assert_eq!(ObjectKind::Network.namespace_prefix("ns"), "/registry/networks/ns/");
    }

    #[test]
    fn test_tagged_serialization() {
        let obj: TrackedObject = Network::new("ns", "net").into();
        let json = serde_json::to_value(&obj).unwrap();
        assert_eq!(json["kind"], "Network");
        let back: TrackedObject = serde_json::from_value(json).unwrap();
        assert_eq!(back.name(), "net");
    }

    #[test]
    fn test_fields_outside_quota_accounting_are_ignored() {
        let yaml = "kind: Machine\nname: web-1\nnamespace: team-a\nlabels:\n  app: web\nspec:\n  machine_class_ref: gold\n  image: alpine:3.20\n";
        let obj: TrackedObject = serde_yaml::from_str(yaml).unwrap();
        match &obj {
            TrackedObject::Machine(m) => assert_eq!(m.spec.machine_class_ref, "gold"),
            other => panic!("expected a machine, got {:?}", other),
        }
        let json = serde_json::to_value(&obj).unwrap();
        assert!(json.get("labels").is_none());
        assert!(json["spec"].get("image").is_none());
    }
}
