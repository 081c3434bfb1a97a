//! Reference CLI driver for the netlink monitoring daemon core: loads
//! configuration, opens the audit log and event database, constructs
//! the dispatcher and its handler pipeline, installs signal handling,
//! and runs until shutdown (§6).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use sentinel_config::{ConfigLoadError, ConfigLoader};
use sentinel_core::correlation::{CorrelationConfig, CorrelationEngine, SecurityConfig, SecurityDetector};
use sentinel_core::filter::FilterManager;
use sentinel_core::storage::{AuditLog, EventDatabase, RetentionPolicy, StorageLayerBuilder};
use sentinel_core::{Dispatcher, DispatcherConfig, EventPipeline, ShutdownToken};
use tokio::runtime::Handle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_SUCCESS: u8 = 0;
const EXIT_GENERIC: u8 = 1;
const EXIT_CONFIG_INVALID: u8 = 2;
const EXIT_STARTUP_FAILURE: u8 = 3;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "sentineld")]
#[command(about = "Netlink monitoring daemon: dispatch, correlation, security detection, storage")]
struct Args {
    /// Path to the TOML configuration file (defaults: sentinel.toml,
    /// config/sentinel.toml, /etc/sentinel/sentinel.toml)
    #[arg(long, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,

    /// Verify an existing audit log's hash chain and exit, without
    /// starting the daemon.
    #[arg(long)]
    verify_audit: Option<PathBuf>,

    /// Stay attached to the controlling terminal (the default; kept
    /// for parity with the daemon's documented exit codes).
    #[arg(long)]
    foreground: bool,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentineld=info,sentinel_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing();

    if let Some(path) = &args.verify_audit {
        return verify_audit(path);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };

    match runtime.block_on(run(args)) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = %e, "fatal error");
            ExitCode::from(EXIT_GENERIC)
        }
    }
}

fn verify_audit(path: &PathBuf) -> ExitCode {
    match sentinel_core::storage::audit::verify(path) {
        Ok((true, _)) => {
            info!(path = %path.display(), "audit log verified: chain intact");
            ExitCode::from(EXIT_SUCCESS)
        }
        Ok((false, Some(line))) => {
            error!(path = %path.display(), line, "audit log verification failed");
            ExitCode::from(EXIT_GENERIC)
        }
        Ok((false, None)) => {
            error!(path = %path.display(), "audit log verification failed");
            ExitCode::from(EXIT_GENERIC)
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "could not read audit log");
            ExitCode::from(EXIT_GENERIC)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<u8> {
    if args.foreground {
        info!("running in foreground");
    }

    let load = match build_loader(&args).load() {
        Ok(load) => load,
        Err(e) => {
            error!(error = %e, "configuration invalid");
            return Ok(match e {
                ConfigLoadError::MissingConfig(_) | ConfigLoadError::Invalid(_) => {
                    EXIT_CONFIG_INVALID
                }
                ConfigLoadError::Source(_) => EXIT_CONFIG_INVALID,
            });
        }
    };
    for warning in &load.warnings {
        warn!("{warning}");
    }
    let config = load.config;

    let audit = match AuditLog::open(
        &config.audit.log_path,
        config.audit.max_file_size,
        config.audit.max_rotations,
        config.audit.sync_writes,
    ) {
        Ok(log) => Arc::new(log),
        Err(e) => {
            error!(error = %e, "failed to open audit log");
            return Ok(EXIT_STARTUP_FAILURE);
        }
    };
    if config.audit.verify_on_open {
        match sentinel_core::storage::audit::verify(&config.audit.log_path) {
            Ok((true, _)) => info!("audit log chain verified on open"),
            Ok((false, line)) => warn!(?line, "audit log chain verification failed on open"),
            Err(e) => warn!(error = %e, "could not verify audit log on open"),
        }
    }

    let security_audit = match &config.audit.security_log_path {
        Some(path) => match AuditLog::open(
            path,
            config.audit.max_file_size,
            config.audit.max_rotations,
            config.audit.sync_writes,
        ) {
            Ok(log) => Some(Arc::new(log)),
            Err(e) => {
                error!(error = %e, "failed to open security audit log");
                return Ok(EXIT_STARTUP_FAILURE);
            }
        },
        None => None,
    };

    let mut builder = StorageLayerBuilder::new()
        .with_buffer(config.core.max_events.min(65_536))
        .with_audit_log(audit);
    if let Some(security_audit) = security_audit {
        builder = builder.with_security_audit_log(security_audit);
    }

    let mut retention = None;
    if config.output.database.enabled {
        let db = match EventDatabase::connect(
            &format!("sqlite://{}?mode=rwc", config.output.database.path),
            1000,
        )
        .await
        {
            Ok(db) => Arc::new(db),
            Err(e) => {
                error!(error = %e, "failed to open event database");
                return Ok(EXIT_STARTUP_FAILURE);
            }
        };
        let policy = RetentionPolicy::new(Arc::clone(&db), config.retention.clone());
        policy.start().await;
        retention = Some(policy);
        builder = builder.with_database(db);
    }

    let storage = Arc::new(builder.build(retention));

    let pipeline = EventPipeline::new(Arc::clone(&storage), Handle::current())
        .with_filters(Arc::new(FilterManager::new()))
        .with_correlation(Arc::new(CorrelationEngine::new(CorrelationConfig::default())))
        .with_security(Arc::new(SecurityDetector::new(SecurityConfig::default())));

    let dispatcher = Dispatcher::new(DispatcherConfig {
        ring_buffer_size: config.core.buffer_size,
        thread_pool_size: config.core.worker_threads,
        rate_limit: config.core.rate_limit,
        ..Default::default()
    });
    dispatcher.register_handler(Arc::new(pipeline));
    dispatcher.start();

    let shutdown = ShutdownToken::new();
    shutdown.install_signal_handlers()?;

    info!("sentineld started");
    while !shutdown.should_exit() {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }
    info!("shutdown signal received, draining pipeline");

    dispatcher.shutdown(true);
    storage.flush().await;

    Ok(EXIT_INTERRUPTED)
}

fn build_loader(args: &Args) -> ConfigLoader {
    match &args.config {
        Some(path) => ConfigLoader::new().with_config_path(path.clone()),
        None => ConfigLoader::new(),
    }
}
