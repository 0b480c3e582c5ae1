use serde::{Deserialize, Serialize};

use pkg_constants::quota::{
    DEFAULT_ADMISSION_TIMEOUT_MS, DEFAULT_BASE_BACKOFF_MS, DEFAULT_MAX_BACKOFF_MS,
    DEFAULT_MAX_RETRIES, DEFAULT_RECONCILE_INTERVAL_SECS, DEFAULT_ROLLBACK_TIMEOUT_MS,
};

/// Enforcement and reconciliation tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Stale-token retries before an admission fails with a transient error
    #[serde(default = "default_max_retries", alias = "max-retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_backoff_ms", alias = "base-backoff-ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms", alias = "max-backoff-ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_admission_timeout_ms", alias = "admission-timeout-ms")]
    pub admission_timeout_ms: u64,
    #[serde(default = "default_rollback_timeout_ms", alias = "rollback-timeout-ms")]
    pub rollback_timeout_ms: u64,
    #[serde(default = "default_reconcile_interval_secs", alias = "reconcile-interval-secs")]
    pub reconcile_interval_secs: u64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_base_backoff_ms() -> u64 {
    DEFAULT_BASE_BACKOFF_MS
}

fn default_max_backoff_ms() -> u64 {
    DEFAULT_MAX_BACKOFF_MS
}

fn default_admission_timeout_ms() -> u64 {
    DEFAULT_ADMISSION_TIMEOUT_MS
}

fn default_rollback_timeout_ms() -> u64 {
    DEFAULT_ROLLBACK_TIMEOUT_MS
}

fn default_reconcile_interval_secs() -> u64 {
    DEFAULT_RECONCILE_INTERVAL_SECS
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff_ms: DEFAULT_BASE_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            admission_timeout_ms: DEFAULT_ADMISSION_TIMEOUT_MS,
            rollback_timeout_ms: DEFAULT_ROLLBACK_TIMEOUT_MS,
            reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
        }
    }
}

impl QuotaConfig {
    /// Reject settings the enforcer or reconciler cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.reconcile_interval_secs == 0 {
            anyhow::bail!("quota.reconcile-interval-secs must be at least 1");
        }
        if self.max_backoff_ms == 0 {
            anyhow::bail!("quota.max-backoff-ms must be at least 1");
        }
        if self.base_backoff_ms > self.max_backoff_ms {
            anyhow::bail!(
                "quota.base-backoff-ms ({}) exceeds quota.max-backoff-ms ({})",
                self.base_backoff_ms,
                self.max_backoff_ms
            );
        }
        if self.admission_timeout_ms == 0 {
            anyhow::bail!("quota.admission-timeout-ms must be at least 1");
        }
        if self.rollback_timeout_ms == 0 {
            anyhow::bail!("quota.rollback-timeout-ms must be at least 1");
        }
        Ok(())
    }
}

/// quotad configuration file (YAML).
///
/// Example `config.yaml`:
/// ```yaml
/// data-dir: /var/lib/quotad/data
/// log-format: json
/// quota:
///   max-retries: 10
///   reconcile-interval-secs: 30
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotadConfigFile {
    #[serde(default, alias = "data-dir")]
    pub data_dir: Option<String>,
    /// `text` (default) or `json`
    #[serde(default, alias = "log-format")]
    pub log_format: Option<String>,
    #[serde(default)]
    pub quota: QuotaConfig,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}
