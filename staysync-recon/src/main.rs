//! staysync-recon - reservation reconciliation CLI
//!
//! Ingests scraped channel batches into a tenant's active and canceled
//! partitions and exposes the front-desk operations on stored reservations.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use staysync_common::config::{load_config, resolve_database_path};
use staysync_common::db::models::TenantProfile;
use staysync_common::db::init_database;
use staysync_common::Partition;
use staysync_recon::operations::{
    confirm_reservation, delete_reservation, list_active, list_canceled, update_reservation,
    ReservationPatch,
};
use staysync_recon::tenants::TenantDirectory;
use staysync_recon::types::parse_batch;
use staysync_recon::Engine;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "staysync-recon", version, about = "Reservation reconciliation engine")]
struct Cli {
    /// TOML config file (overrides STAYSYNC_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file (overrides STAYSYNC_DATABASE and the config file)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile a scraped batch (JSON array of records)
    Ingest {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        channel: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// List active (or canceled) reservations, newest first
    List {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        canceled: bool,
        /// Exact customer name, case-insensitive
        #[arg(long)]
        name: Option<String>,
    },
    /// Show recent ingestion runs
    Runs {
        #[arg(long)]
        tenant: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Confirm an active reservation
    Confirm {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        id: String,
    },
    /// Correct fields of an active reservation from a JSON patch
    Update {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        id: String,
        /// JSON object, e.g. '{"price": "90,000", "checkOut": "2024-05-12"}'
        #[arg(long)]
        patch: String,
    },
    /// Delete a reservation
    Delete {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        id: String,
        /// Delete from the canceled partition instead of the active one
        #[arg(long)]
        canceled: bool,
    },
    /// Create or update a tenant profile
    Register {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        name: Option<String>,
        /// Front-desk number quoted in guest messages
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        disable_notifications: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref()).context("Loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.logging.level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting staysync-recon v{}", env!("CARGO_PKG_VERSION"));

    let db_path = resolve_database_path(cli.database.as_deref(), &config);
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Opening database {}", db_path.display()))?;
    let engine = Engine::open(pool, &config).await?;

    let outcome = run_command(&engine, cli.command).await;

    let stats = engine.shutdown().await;
    if stats.delivered + stats.failed > 0 {
        info!(
            delivered = stats.delivered,
            failed = stats.failed,
            "Guest notifications dispatched"
        );
    }

    outcome
}

async fn run_command(engine: &Engine, command: Command) -> Result<()> {
    let store = engine.store.as_ref();

    match command {
        Command::Ingest {
            tenant,
            channel,
            file,
        } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Reading batch {}", file.display()))?;
            let records = parse_batch(&content)
                .with_context(|| format!("Parsing batch {}", file.display()))?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, stopping after the current record");
                    on_interrupt.cancel();
                }
            });

            let summary = engine
                .reconciler
                .reconcile_with_cancel(&tenant, &channel, &records, &cancel)
                .await?;
            print_json(&summary)
        }
        Command::List {
            tenant,
            canceled,
            name,
        } => {
            let reservations = if canceled {
                list_canceled(store, &tenant).await?
            } else {
                list_active(store, &tenant, name.as_deref()).await?
            };
            print_json(&reservations)
        }
        Command::Runs { tenant, limit } => {
            let runs = engine.ledger.list_runs(&tenant, limit).await?;
            print_json(&runs)
        }
        Command::Confirm { tenant, id } => {
            let reservation = confirm_reservation(store, &tenant, &id).await?;
            print_json(&reservation)
        }
        Command::Update { tenant, id, patch } => {
            let patch: ReservationPatch =
                serde_json::from_str(&patch).context("Parsing --patch JSON")?;
            let reservation =
                update_reservation(store, engine.reconciler.engine(), &tenant, &id, &patch)
                    .await?;
            print_json(&reservation)
        }
        Command::Delete {
            tenant,
            id,
            canceled,
        } => {
            let partition = if canceled {
                Partition::Canceled
            } else {
                Partition::Active
            };
            delete_reservation(store, &tenant, partition, &id).await?;
            println!("Deleted {} from {} partition", id, partition);
            Ok(())
        }
        Command::Register {
            tenant,
            name,
            phone,
            disable_notifications,
        } => {
            let mut profile = TenantProfile::with_defaults(&tenant);
            if let Some(name) = name {
                profile.display_name = name;
            }
            profile.contact_phone = phone;
            profile.notifications_enabled = !disable_notifications;
            engine.directory.register(&profile).await?;
            print_json(&profile)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
