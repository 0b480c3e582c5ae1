use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resource::ResourceList;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineSpec {
    /// Name of the cluster-scoped MachineClass sizing this machine. Always set.
    pub machine_class_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub name: String,
    pub namespace: String,
    pub spec: MachineSpec,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Machine {
    pub fn new(namespace: &str, name: &str, machine_class: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            spec: MachineSpec {
                machine_class_ref: machine_class.to_string(),
            },
            created_at: Utc::now(),
        }
    }
}

/// Cluster-scoped machine size. `capabilities` carries `cpu` and `memory`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineClass {
    pub name: String,
    pub capabilities: ResourceList,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl MachineClass {
    pub fn new(name: &str, capabilities: ResourceList) -> Self {
        Self {
            name: name.to_string(),
            capabilities,
            created_at: Utc::now(),
        }
    }
}
