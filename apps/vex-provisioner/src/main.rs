//! vex-provisioner: keeps the edge key-value store converged with the
//! relational source of truth.
//!
//! `run` (the default) joins the Kafka consumer group and reconciles every
//! provisioning intent. The `provision` and `deprovision` subcommands push a
//! single operation through the backend named by `PROVISIONER_BACKEND`.
//! Flag changes have no command of their own: a flag lives inside its
//! project's snapshot, so `provision project` republishes it.

mod config;
mod error;
mod logging;
mod metrics;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use vex_edge::{EdgeClient, EdgeConfig, EdgeStore};
use vex_events::{
    ConsumerConfig, Dispatcher, EventError, IntentProducer, KafkaConfig, KafkaConsumerGroup,
    Readiness,
};
use vex_provisioning::{
    build_registry, DirectProvisioner, EntityReader, PgEntityReader, ProvisionMetrics,
    ProvisionReceipt, Provisioner, ProvisionerBackend, QueueProvisioner, Reconciler,
};

use crate::config::{BackendKind, Config, DatabaseConfig};
use crate::error::AppError;
use crate::metrics::{AppState, MetricsRegistry};

#[derive(Parser)]
#[command(name = "vex-provisioner")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Join the consumer group and reconcile until signalled (default)
    Run,

    /// Provision one entity through the configured backend
    ///
    /// Flags are published as part of their project's snapshot; after a flag
    /// change, run `provision project <id>`.
    Provision {
        #[command(subcommand)]
        target: ProvisionTarget,
    },

    /// Deprovision one entity through the configured backend
    ///
    /// To drop a deleted flag from the edge, run `provision project <id>`.
    Deprovision {
        #[command(subcommand)]
        target: DeprovisionTarget,
    },
}

#[derive(Subcommand)]
enum ProvisionTarget {
    /// Publish a project's flag snapshot (use this after flag changes)
    Project { id: Uuid },
    /// Publish a token's lookup record
    Token { id: Uuid },
}

#[derive(Subcommand)]
enum DeprovisionTarget {
    /// Remove a project's snapshot
    Project { id: Uuid },
    /// Remove a token record by its SHA-256 hash (hex)
    Token { hash: String },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.log_filter);

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Provision { target } => provision(&config, target).await,
        Commands::Deprovision { target } => deprovision(&config, target).await,
    };

    if let Err(e) = result {
        if e.is_config_error() {
            error!(error = %e, "vex-provisioner is misconfigured, check its environment");
        } else {
            error!(error = %e, "vex-provisioner exited with an error");
        }
        std::process::exit(1);
    }
}

// =============================================================================
// Daemon
// =============================================================================

async fn run(config: Config) -> Result<(), AppError> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        topics = ?config.topics.all(),
        "Starting vex-provisioner"
    );

    let kafka = KafkaConfig::from_env()?;
    let consumer = ConsumerConfig::from_env()?;
    config.topics.validate()?;

    let metrics = Arc::new(MetricsRegistry::new());
    let reconciler = connect_reconciler().await?;
    let registry = build_registry(&config.topics, reconciler, Some(metrics.provision.clone()))?;
    let dispatcher = Dispatcher::new(Arc::new(registry))
        .with_dry_run(consumer.dry_run)
        .with_metrics(metrics.dispatch.clone());
    if consumer.dry_run {
        warn!("SKIP_PROVISION is set; messages are acknowledged without touching the edge store");
    }

    let group = KafkaConsumerGroup::new(&kafka, &consumer, Arc::new(dispatcher))?;
    let mut readiness = group.readiness();

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));
    let group_task = tokio::spawn(group.run(shutdown.clone()));

    let ready = match await_first_join(&mut readiness, consumer.join_timeout, &shutdown).await {
        Ok(ready) => ready,
        Err(e) => {
            error!(error = %e, "Consumer group never joined, giving up");
            shutdown.cancel();
            match group_task.await {
                Ok(Err(group_err)) => warn!(error = %group_err, "Consumer group stopped"),
                Ok(Ok(())) => {}
                Err(join_err) => warn!(error = %join_err, "Consumer group task panicked"),
            }
            return Err(e.into());
        }
    };

    let server = if ready {
        let state = AppState {
            metrics: Arc::clone(&metrics),
            readiness: readiness.clone(),
        };
        match start_metrics_server(&config, state, shutdown.clone()).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!(error = %e, port = config.metrics_port, "Failed to bind metrics listener");
                shutdown.cancel();
                None
            }
        }
    } else {
        None
    };

    let group_result = group_task.await;
    shutdown.cancel();

    if let Some(server) = server {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Metrics listener stopped with an error"),
            Err(e) => warn!(error = %e, "Metrics listener task panicked"),
        }
    }

    match group_result {
        Ok(Ok(())) => {
            info!("vex-provisioner shutdown complete");
            Ok(())
        }
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(AppError::Io(std::io::Error::other(e))),
    }
}

/// Wait for the first join, a shutdown request, or `timeout`.
///
/// Ok(false) means the group closed or shutdown began before joining.
async fn await_first_join(
    readiness: &mut Readiness,
    timeout: Duration,
    shutdown: &CancellationToken,
) -> Result<bool, EventError> {
    tokio::select! {
        joined = readiness.wait_joined(timeout) => joined,
        () = shutdown.cancelled() => Ok(false),
    }
}

async fn start_metrics_server(
    config: &Config,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<tokio::task::JoinHandle<std::io::Result<()>>, AppError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, path = %config.metrics_path, "Metrics listener started");

    let router = metrics::router(state, &config.metrics_path);
    Ok(tokio::spawn(metrics::serve(listener, router, shutdown)))
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown"),
        () = terminate => info!("Received SIGTERM, starting graceful shutdown"),
        () = shutdown.cancelled() => return,
    }

    shutdown.cancel();
}

// =============================================================================
// Operator commands
// =============================================================================

async fn connect_reconciler() -> Result<Arc<Reconciler>, AppError> {
    let db = DatabaseConfig::from_env()?;
    let pool = vex_db::connect(&db.url, db.max_connections).await?;
    let edge = EdgeClient::new(EdgeConfig::from_env()?)?;

    let reader: Arc<dyn EntityReader> = Arc::new(PgEntityReader::new(pool));
    let edge: Arc<dyn EdgeStore> = Arc::new(edge);
    Ok(Arc::new(Reconciler::new(reader, edge)))
}

async fn build_backend(config: &Config) -> Result<ProvisionerBackend, AppError> {
    let metrics = ProvisionMetrics::default();
    let backend = match config.backend {
        BackendKind::Queue => {
            let kafka = KafkaConfig::from_env()?;
            config.topics.validate()?;
            let producer = IntentProducer::new(&kafka, config.topics.clone())?;
            match producer.health_check().await {
                Ok(status) if status.is_healthy() => {
                    info!(brokers = status.brokers, "Broker preflight passed");
                }
                Ok(status) => warn!(
                    brokers = status.brokers,
                    topics_present = status.topics_present,
                    topics_expected = status.topics_expected,
                    "Broker reachable but provisioning topics are missing"
                ),
                Err(e) => warn!(error = %e, "Broker preflight failed, publishing anyway"),
            }
            ProvisionerBackend::Queue(QueueProvisioner::new(
                Arc::new(producer),
                config.topics.clone(),
                metrics,
            ))
        }
        BackendKind::Direct => {
            ProvisionerBackend::Direct(DirectProvisioner::new(connect_reconciler().await?, metrics))
        }
    };
    info!(backend = backend.name(), "Provisioner backend ready");
    Ok(backend)
}

async fn provision(config: &Config, target: ProvisionTarget) -> Result<(), AppError> {
    let backend = build_backend(config).await?;
    let receipt = match target {
        ProvisionTarget::Project { id } => backend.provision_project(id).await?,
        ProvisionTarget::Token { id } => backend.provision_token(id).await?,
    };
    report(&receipt);
    Ok(())
}

async fn deprovision(config: &Config, target: DeprovisionTarget) -> Result<(), AppError> {
    let backend = build_backend(config).await?;
    let receipt = match target {
        DeprovisionTarget::Project { id } => backend.deprovision_project(id).await?,
        DeprovisionTarget::Token { hash } => {
            let hash = hash.trim();
            if hash.is_empty() {
                return Err(AppError::InvalidArgument("token hash is empty".to_string()));
            }
            backend.deprovision_token(hash.as_bytes()).await?
        }
    };
    report(&receipt);
    Ok(())
}

fn report(receipt: &ProvisionReceipt) {
    match receipt {
        ProvisionReceipt::Scheduled(delivery) => println!(
            "scheduled on {}[{}]@{}",
            delivery.topic, delivery.partition, delivery.offset
        ),
        ProvisionReceipt::Applied => println!("applied"),
    }
}
