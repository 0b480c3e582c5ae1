//! State store key layout.

/// Prefix under which every record lives.
pub const REGISTRY_PREFIX: &str = "/registry/";

/// Namespaced quota budgets: `/registry/resourcequotas/<ns>/<name>`.
pub const RESOURCE_QUOTAS_PREFIX: &str = "/registry/resourcequotas/";

/// Namespaced machines: `/registry/machines/<ns>/<name>`.
pub const MACHINES_PREFIX: &str = "/registry/machines/";

/// Namespaced volumes: `/registry/volumes/<ns>/<name>`.
pub const VOLUMES_PREFIX: &str = "/registry/volumes/";

/// Namespaced networks: `/registry/networks/<ns>/<name>`.
pub const NETWORKS_PREFIX: &str = "/registry/networks/";

/// Cluster-scoped machine classes: `/registry/machineclasses/<name>`.
pub const MACHINE_CLASSES_PREFIX: &str = "/registry/machineclasses/";

/// Cluster-scoped volume classes: `/registry/volumeclasses/<name>`.
pub const VOLUME_CLASSES_PREFIX: &str = "/registry/volumeclasses/";

/// Key holding the store-wide revision counter (SlateDB backend only).
pub const REVISION_COUNTER_KEY: &str = "/meta/revision";

/// Default on-disk location of the SlateDB state store.
pub const DEFAULT_DATA_DIR: &str = "/tmp/quotad-data";
