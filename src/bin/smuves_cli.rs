use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use smuves_sync::apply;
use smuves_sync::config;
use smuves_sync::context::SyncContext;
use smuves_sync::db;
use smuves_sync::detect;
use smuves_sync::hubspot::HubSpotClient;
use smuves_sync::lock::UserLocks;
use smuves_sync::model::{Credentials, PageChange, SheetLocation};
use smuves_sync::revert;
use smuves_sync::sheets::SheetsClient;
use smuves_sync::tracker;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run one sync operation for a user and print the result as JSON"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// User whose snapshots and history are used
    #[arg(long, env = "SMUVES_USER_ID")]
    user: String,

    /// HubSpot private app or OAuth access token
    #[arg(long, env = "HUBSPOT_TOKEN", hide_env_values = true)]
    hubspot_token: Option<String>,

    /// Google OAuth access token with Sheets scope
    #[arg(long, env = "GOOGLE_TOKEN", hide_env_values = true)]
    google_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Snapshot changed live pages and mirror them to a new tab
    Backup {
        #[arg(long)]
        spreadsheet: String,
    },
    /// Compare a mirror tab against the latest backup
    Detect {
        #[arg(long)]
        spreadsheet: String,
        #[arg(long, default_value = "Sheet1")]
        tab: String,
    },
    /// Push a reviewed change-set (JSON array as printed by `detect`)
    Apply {
        #[arg(long)]
        changes: PathBuf,
    },
    /// Restore every page recorded under a backup id
    Revert {
        #[arg(long)]
        version: String,
    },
    /// List backup versions, newest first
    Versions {
        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// Show recorded field changes, newest first
    History {
        #[arg(long)]
        page: Option<String>,
        #[arg(long, default_value = "50")]
        limit: i64,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let ctx = SyncContext::new(
        pool,
        Arc::new(HubSpotClient::from_config(&cfg)?),
        Arc::new(SheetsClient::from_config(&cfg)?),
    )
    .with_config(&cfg);
    let creds = Credentials::new(args.hubspot_token.as_deref(), args.google_token.as_deref());
    let user = args.user.as_str();

    let locks = UserLocks::new();
    let _guard = locks.acquire(user).await;

    match args.command {
        Command::Backup { spreadsheet } => {
            let report = tracker::run_backup(&ctx, user, &creds, &spreadsheet).await?;
            info!(pages = report.pages_backed_up, changed = report.changes_detected, "backup done");
            print_json(&report)?;
        }
        Command::Detect { spreadsheet, tab } => {
            let location = SheetLocation {
                spreadsheet_id: spreadsheet,
                tab_name: tab,
            };
            let outcome = detect::detect_changes(&ctx, user, &creds, &location).await?;
            if let Some(message) = outcome.message() {
                info!("{}", message);
            }
            print_json(&outcome.changes)?;
        }
        Command::Apply { changes } => {
            let raw = std::fs::read_to_string(&changes)
                .with_context(|| format!("failed to read {}", changes.display()))?;
            let changes: Vec<PageChange> =
                serde_json::from_str(&raw).context("change-set is not valid JSON")?;
            let report = apply::apply_changes(&ctx, user, &creds, &changes).await?;
            print_json(&report)?;
        }
        Command::Revert { version } => {
            let report = revert::revert_to_version(&ctx, user, &creds, &version).await?;
            print_json(&report)?;
        }
        Command::Versions { limit } => {
            let versions = db::list_versions(&ctx.pool, user, limit).await?;
            print_json(&versions)?;
        }
        Command::History { page, limit } => {
            let history = db::list_change_history(&ctx.pool, user, page.as_deref(), limit).await?;
            print_json(&history)?;
        }
    }
    Ok(())
}
