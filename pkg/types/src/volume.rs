use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resource::ResourceList;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VolumeSpec {
    /// Optional VolumeClass. Volumes without one are provisioned from a pool directly.
    #[serde(default)]
    pub volume_class_ref: Option<String>,
    /// Requested resources; `storage` is the size.
    #[serde(default)]
    pub resources: ResourceList,
}

/// Namespaced block storage volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub namespace: String,
    pub spec: VolumeSpec,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Volume {
    pub fn new(namespace: &str, name: &str, volume_class: Option<&str>, resources: ResourceList) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            spec: VolumeSpec {
                volume_class_ref: volume_class.map(str::to_string),
                resources,
            },
            created_at: Utc::now(),
        }
    }
}

/// Cluster-scoped storage tier (e.g. "fast-ssd"), with e.g. `iops` capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeClass {
    pub name: String,
    #[serde(default)]
    pub capabilities: ResourceList,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl VolumeClass {
    pub fn new(name: &str, capabilities: ResourceList) -> Self {
        Self {
            name: name.to_string(),
            capabilities,
            created_at: Utc::now(),
        }
    }
}
