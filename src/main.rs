use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::Parser;
use intention_reaper::{
    config::ReaperConfig,
    db::DbPool,
    notifier::{BrevoNotifier, Notifier},
    observability,
    reconciliation::{self, Reconciler},
    services::create_blob_storage,
};

const DEFAULT_CONFIG_PATH: &str = "intention-reaper.toml";

/// CLI arguments for the intention reaper
#[derive(Parser, Debug)]
#[command(version, about = "Expires, notifies and erases intentions", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Reconcile on an interval until interrupted (default)
    Run,
    /// Run a single reconciliation pass and exit
    ///
    /// Suitable for an external scheduler such as cron.
    Once,
    /// Add the expiration_notified_at column if it is missing, then exit
    EnsureSchema,
    /// Load and validate the configuration file, then exit
    CheckConfig,
    /// Export the JSON schema for the configuration file
    Schema {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Schema { output }) => {
            #[cfg(feature = "json-schema")]
            run_schema_export(output);
            #[cfg(not(feature = "json-schema"))]
            {
                let _ = output;
                eprintln!("Error: JSON schema export requires the 'json-schema' feature");
                std::process::exit(1);
            }
        }
        Some(Command::CheckConfig) => run_check_config(&args.config),
        Some(Command::EnsureSchema) => run_ensure_schema(&args.config).await,
        Some(Command::Once) => run_once(&args.config).await,
        Some(Command::Run) | None => run_worker(&args.config).await,
    }
}

/// Load the config file or exit with a message.
fn load_config(path: &Path) -> ReaperConfig {
    match ReaperConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn init_logging(config: &ReaperConfig) {
    if let Err(e) = observability::init_tracing(&config.observability.logging) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Connect to the database and storage backends and build the reconciler.
async fn build_reconciler(config: &ReaperConfig) -> Arc<Reconciler> {
    let db = match DbPool::from_config(&config.database).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            std::process::exit(1);
        }
    };
    if let Err(e) = db.health_check().await {
        tracing::error!(error = %e, "Database health check failed");
        std::process::exit(1);
    }

    let blobs = match create_blob_storage(&config.storage).await {
        Ok(blobs) => blobs,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize blob storage");
            std::process::exit(1);
        }
    };

    let notifier: Option<Arc<dyn Notifier>> = if config.notifications.is_enabled() {
        match BrevoNotifier::new(&config.notifications) {
            Ok(notifier) => Some(Arc::new(notifier)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize notifier");
                std::process::exit(1);
            }
        }
    } else {
        tracing::warn!("notifications.api_key is not set; expiration notices will be skipped");
        None
    };

    tracing::info!(
        blob_backend = blobs.backend_name(),
        notifier = notifier.as_ref().map(|n| n.name()).unwrap_or("none"),
        "Reconciler ready"
    );

    Arc::new(Reconciler::new(
        db.intentions(),
        blobs,
        notifier,
        config.reconciliation.clone(),
        config.notifications.retry.clone(),
    ))
}

/// Run the long-lived worker until Ctrl-C.
async fn run_worker(config_path: &Path) {
    let config = load_config(config_path);
    init_logging(&config);

    tracing::info!(
        config_file = %config_path.display(),
        version = env!("CARGO_PKG_VERSION"),
        "Starting intention reaper"
    );

    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::error!(error = %e, "Failed to initialize metrics");
        std::process::exit(1);
    }

    let reconciler = build_reconciler(&config).await;

    tokio::select! {
        _ = reconciliation::start_reconciliation_worker(reconciler) => {}
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => tracing::info!("Shutdown signal received, stopping"),
                Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
            }
        }
    }
}

/// Run one pass. Reconciliation failures are logged, not reflected in the exit code.
async fn run_once(config_path: &Path) {
    let config = load_config(config_path);
    init_logging(&config);

    let reconciler = build_reconciler(&config).await;
    if reconciliation::run_once(&reconciler).await.is_none() {
        tracing::warn!("Reconciliation pass did not complete; it will be retried on the next run");
    }
}

async fn run_ensure_schema(config_path: &Path) {
    let config = load_config(config_path);
    init_logging(&config);

    let db = match DbPool::from_config(&config.database).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            std::process::exit(1);
        }
    };

    match db.intentions().ensure_notification_column().await {
        Ok(true) => tracing::info!("Added expiration_notified_at column"),
        Ok(false) => tracing::info!("expiration_notified_at column already present"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to ensure expiration_notified_at column");
            std::process::exit(1);
        }
    }
}

fn run_check_config(config_path: &Path) {
    let config = load_config(config_path);
    let r = &config.reconciliation;
    println!("Configuration OK: {}", config_path.display());
    println!(
        "  reconciliation: enabled={} interval={}s batch_size={} concurrency={} dry_run={}",
        r.enabled, r.interval_secs, r.batch_size, r.concurrency, r.dry_run
    );
    println!(
        "  retention: premium={}d standard={}d",
        r.retention.premium_days, r.retention.standard_days
    );
    println!(
        "  notifications: {}",
        if config.notifications.is_enabled() {
            "enabled"
        } else {
            "disabled (no api_key)"
        }
    );
}

/// Export config JSON schema to file or stdout
#[cfg(feature = "json-schema")]
fn run_schema_export(output: Option<String>) {
    let content = match ReaperConfig::json_schema_string() {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Failed to serialize config schema: {e}");
            std::process::exit(1);
        }
    };

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, &content) {
                eprintln!("Failed to write to {path}: {e}");
                std::process::exit(1);
            }
            eprintln!("Config JSON schema written to {path}");
        }
        None => println!("{content}"),
    }
}
