//! Quota resource names, scope names and enforcement tuning defaults.

/// Prefix of object-count resource names (`count/<plural>`).
pub const OBJECT_COUNT_PREFIX: &str = "count/";

pub const RESOURCE_COUNT_MACHINES: &str = "count/machines";
pub const RESOURCE_COUNT_VOLUMES: &str = "count/volumes";
pub const RESOURCE_COUNT_NETWORKS: &str = "count/networks";

/// Total CPU requested by machines (taken from the machine class).
pub const RESOURCE_REQUESTS_CPU: &str = "requests.cpu";
/// Total memory requested by machines (taken from the machine class).
pub const RESOURCE_REQUESTS_MEMORY: &str = "requests.memory";
/// Total storage requested by volumes.
pub const RESOURCE_REQUESTS_STORAGE: &str = "requests.storage";

/// Capability keys on classes.
pub const CAPABILITY_CPU: &str = "cpu";
pub const CAPABILITY_MEMORY: &str = "memory";
pub const CAPABILITY_STORAGE: &str = "storage";

/// Scope dimension keyed on a machine's class reference.
pub const SCOPE_MACHINE_CLASS: &str = "MachineClass";
/// Scope dimension keyed on a volume's (optional) class reference.
pub const SCOPE_VOLUME_CLASS: &str = "VolumeClass";

/// Name under which the enforcer is registered in the admission chain.
pub const ADMISSION_PLUGIN_NAME: &str = "ResourceQuota";

/// How many times a stale-token write is retried before the admission fails.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// First backoff step between CAS retries, in milliseconds.
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 5;

/// Upper bound for a single backoff step, in milliseconds.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 500;

/// Deadline applied to a whole admission when the caller supplies none.
pub const DEFAULT_ADMISSION_TIMEOUT_MS: u64 = 10_000;

/// How often the reconciler recomputes `used` from stored objects.
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 30;

/// Upper bound on undoing the charges of a failed admission, in milliseconds.
pub const DEFAULT_ROLLBACK_TIMEOUT_MS: u64 = 2_000;
