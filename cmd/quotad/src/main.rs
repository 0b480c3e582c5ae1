use clap::{Parser, Subcommand, ValueEnum};
use pkg_constants::state::DEFAULT_DATA_DIR;
use pkg_quota::{
    AdmissionDecision, AdmissionHook, AdmissionRequest, EnforcerOptions, QuotaAdmission,
    QuotaEnforcer, QuotaMetrics, QuotaReconciler, QuotaStore, Registry, UsageAggregator,
};
use pkg_state::{MemoryStore, ObjectStore, StateStore};
use pkg_types::config::{QuotadConfigFile, load_config_file};
use pkg_types::machine::MachineClass;
use pkg_types::object::TrackedObject;
use pkg_types::quota::ResourceQuota;
use pkg_types::volume::VolumeClass;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "quotad", about = "Resource quota enforcement daemon")]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = "/etc/quotad/config.yaml")]
    config: String,

    /// Directory for SlateDB state storage
    #[arg(long)]
    data_dir: Option<String>,

    /// Keep all state in memory (lost on exit)
    #[arg(long)]
    in_memory: bool,

    /// Log output format: text or json
    #[arg(long)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the reconciliation controller until Ctrl-C
    Serve,
    /// Manage quotas
    Quota {
        #[command(subcommand)]
        action: QuotaAction,
    },
    /// Store a machine or volume class from a YAML file
    Class {
        #[arg(long, value_enum)]
        kind: ClassKind,
        #[arg(long, short)]
        file: String,
    },
    /// Run an object through quota admission and store it if allowed
    Admit {
        #[arg(long, value_enum, default_value = "create")]
        operation: OperationArg,
        /// YAML file holding the object (the removed object for delete)
        #[arg(long, short)]
        file: String,
        /// YAML file holding the prior version, for update
        #[arg(long)]
        old: Option<String>,
    },
    /// Recompute every quota's usage once
    Reconcile,
}

#[derive(Subcommand, Debug)]
enum QuotaAction {
    /// Create a quota from a YAML file
    Create {
        #[arg(long, short)]
        file: String,
    },
    /// List quotas with their usage
    List {
        #[arg(long, short)]
        namespace: Option<String>,
    },
    /// Delete a quota
    Delete {
        #[arg(long, short)]
        namespace: String,
        name: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ClassKind {
    Machine,
    Volume,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OperationArg {
    Create,
    Update,
    Delete,
}

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path, e))?;
    serde_yaml::from_str(&content).map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config file (returns defaults if file not found)
    let file_cfg: QuotadConfigFile = load_config_file(&cli.config)?;
    file_cfg.quota.validate()?;

    // Merge: CLI args > config file > defaults
    let log_format = cli
        .log_format
        .clone()
        .or(file_cfg.log_format.clone())
        .unwrap_or_else(|| "text".to_string());
    init_tracing(&log_format);
    info!("Config file: {}", cli.config);

    let data_dir = cli
        .data_dir
        .clone()
        .or(file_cfg.data_dir.clone())
        .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());

    let (backend, persistent): (Arc<dyn ObjectStore>, Option<StateStore>) = if cli.in_memory {
        info!("Using in-memory state store");
        (Arc::new(MemoryStore::new()), None)
    } else {
        let state = StateStore::new(&data_dir).await?;
        (Arc::new(state.clone()), Some(state))
    };
    let store = QuotaStore::new(backend);

    let result = run(&cli, &file_cfg, store).await;

    if let Some(state) = persistent {
        state.close().await?;
    }
    result
}

async fn run(cli: &Cli, file_cfg: &QuotadConfigFile, store: QuotaStore) -> anyhow::Result<()> {
    let quota_cfg = &file_cfg.quota;
    let registry = Registry::with_default_evaluators(&store)?.install_global()?;
    let metrics = Arc::new(QuotaMetrics::new());

    match &cli.command {
        Commands::Serve => {
            let aggregator = UsageAggregator::new(store.clone(), registry);
            let reconciler = QuotaReconciler::new(
                store,
                aggregator,
                Duration::from_secs(quota_cfg.reconcile_interval_secs),
            )
            .with_metrics(metrics.clone());

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let handle = reconciler.start(shutdown_rx);

            info!("quotad is running. Press Ctrl-C to stop.");
            tokio::signal::ctrl_c().await?;
            info!("Shutting down quotad");
            let _ = shutdown_tx.send(true);
            handle.await?;
            info!("Final counters:\n{}", metrics.render());
        }
        Commands::Quota { action } => match action {
            QuotaAction::Create { file } => {
                let quota: ResourceQuota = read_yaml(file)?;
                let created = store.create_quota(&quota).await?;
                println!(
                    "quota {}/{} created (revision {})",
                    created.namespace, created.name, created.resource_version
                );
            }
            QuotaAction::List { namespace } => {
                let quotas = match namespace {
                    Some(ns) => store.list_quotas(ns).await?,
                    None => store.list_all_quotas().await?,
                };
                println!("{:<20} {:<24} {:<12} {:<14} {:<14}", "NAMESPACE", "NAME", "RESOURCE", "USED", "HARD");
                for quota in &quotas {
                    for (name, hard) in &quota.hard {
                        println!(
                            "{:<20} {:<24} {:<12} {:<14} {:<14}",
                            quota.namespace,
                            quota.name,
                            name.to_string(),
                            quota.used.get_or_zero(name.as_str()).to_string(),
                            hard.to_string()
                        );
                    }
                }
            }
            QuotaAction::Delete { namespace, name } => {
                store.delete_quota(namespace, name).await?;
                println!("quota {}/{} deleted", namespace, name);
            }
        },
        Commands::Class { kind, file } => match kind {
            ClassKind::Machine => {
                let class: MachineClass = read_yaml(file)?;
                store.put_machine_class(&class).await?;
                println!("machine class {} stored", class.name);
            }
            ClassKind::Volume => {
                let class: VolumeClass = read_yaml(file)?;
                store.put_volume_class(&class).await?;
                println!("volume class {} stored", class.name);
            }
        },
        Commands::Admit { operation, file, old } => {
            let object: TrackedObject = read_yaml(file)?;
            let request = match operation {
                OperationArg::Create => AdmissionRequest::create(object.clone()),
                OperationArg::Update => {
                    let Some(path) = old else {
                        anyhow::bail!("update requires --old with the prior version");
                    };
                    AdmissionRequest::update(read_yaml::<TrackedObject>(path)?, object.clone())
                }
                OperationArg::Delete => AdmissionRequest::delete(object.clone()),
            };

            let enforcer = QuotaEnforcer::new(store.clone(), registry, EnforcerOptions::from(quota_cfg))
                .with_metrics(metrics);
            let hook = QuotaAdmission::from_config(Arc::new(enforcer), quota_cfg);

            match hook.admit(&request).await {
                AdmissionDecision::Allowed => {
                    match operation {
                        OperationArg::Delete => store.delete_object(&object).await?,
                        _ => {
                            store.put_object(&object).await?;
                        }
                    }
                    println!(
                        "{} {} {}/{} allowed",
                        request.operation,
                        object.kind(),
                        object.namespace(),
                        object.name()
                    );
                }
                AdmissionDecision::Denied { reason } => {
                    anyhow::bail!("denied by {}: {}", hook.name(), reason);
                }
                AdmissionDecision::Errored { reason } => {
                    anyhow::bail!("{} failed, retry later: {}", hook.name(), reason);
                }
            }
        }
        Commands::Reconcile => {
            let aggregator = UsageAggregator::new(store.clone(), registry);
            let reconciler = QuotaReconciler::new(
                store,
                aggregator,
                Duration::from_secs(quota_cfg.reconcile_interval_secs),
            );
            let corrected = reconciler.reconcile_once().await?;
            println!("{} quotas corrected", corrected);
        }
    }

    Ok(())
}
