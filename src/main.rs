//! # Main — CLI Entry Point
//!
//! Routes subcommands to the inspection library: alarm classification,
//! catalog browsing and editing, row-store connection tests, completion
//! boards, checklist submission, and the dashboard server.
//!
//! ## Global Options
//!
//! - `--config`: TOML settings file (default `~/.facsys/config.toml`).
//! - `--endpoint` / `FACSYS_ENDPOINT`: script endpoint URL, overriding the config.
//! - `--scope`: team/site to work on (defaults to the catalog's primary scope).

mod cli;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use facsys::inspection::InspectionType;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "facsys", about = "Equipment inspection checklists and overdue alarms")]
struct Cli {
    /// Path to the settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Script endpoint URL (or set FACSYS_ENDPOINT env var)
    #[arg(long, env = "FACSYS_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Team/site scope, e.g. 1-B (defaults to the primary scope)
    #[arg(long, global = true)]
    scope: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a last-inspection date against an inspection cycle
    Classify {
        /// Inspection type (daily, weekly, monthly, quarterly, semiannual, annual)
        #[arg(long = "type")]
        kind: InspectionType,
        /// Last inspection date (YYYY-MM-DD or RFC 3339); omit for never inspected
        #[arg(long)]
        last: Option<String>,
        /// Reference day (defaults to today in the configured zone)
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// List teams and their equipment
    Teams,
    /// Check that the row-store answers
    TestConnection,
    /// Show completion tiles for a scope
    Status {
        /// Show every team instead of one scope (daily excluded)
        #[arg(long)]
        all: bool,
    },
    /// Show per-equipment status for one inspection type
    Equipment {
        #[arg(long = "type")]
        kind: InspectionType,
    },
    /// Submit a checklist: one row per equipment
    Submit {
        #[arg(long = "type")]
        kind: InspectionType,
        /// Equipment names (repeat or comma-separate)
        #[arg(long, required = true, value_delimiter = ',')]
        equipment: Vec<String>,
        /// Check result as ITEM=RESULT (repeatable)
        #[arg(long = "check", required = true)]
        checks: Vec<String>,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long, default_value = "")]
        inspector: String,
        /// Submit even if already inspected today
        #[arg(long)]
        allow_duplicates: bool,
    },
    /// Edit the equipment and checklist catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Start the dashboard web server
    Serve {
        /// Port (defaults to the configured dashboard port)
        #[arg(long)]
        port: Option<u16>,
        /// Directory with the browser front-end
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// Add equipment to the scope's team
    AddEquipment {
        name: String,
        /// Also register on the row-store for this type (all types if omitted)
        #[arg(long = "type")]
        kind: Option<InspectionType>,
        #[arg(long)]
        remote: bool,
    },
    /// Remove equipment from the scope's team
    RemoveEquipment {
        name: String,
        #[arg(long = "type")]
        kind: Option<InspectionType>,
        #[arg(long)]
        remote: bool,
    },
    /// Add a checklist item for a type
    AddItem {
        #[arg(long = "type")]
        kind: InspectionType,
        item: String,
        #[arg(long)]
        remote: bool,
    },
    /// Remove a checklist item for a type
    RemoveItem {
        #[arg(long = "type")]
        kind: InspectionType,
        item: String,
        #[arg(long)]
        remote: bool,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // LOG_FORMAT=json for log collectors, human-readable on stderr otherwise
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    match &cli.command {
        Commands::Classify { kind, last, today } => {
            cli::run_classify(&cli, *kind, last.as_deref(), *today)
        }
        Commands::Teams => cli::run_teams(&cli),
        Commands::TestConnection => cli::run_test_connection(&cli),
        Commands::Status { all } => cli::run_status(&cli, *all),
        Commands::Equipment { kind } => cli::run_equipment(&cli, *kind),
        Commands::Submit { .. } => cli::run_submit(&cli),
        Commands::Catalog { action } => cli::run_catalog(&cli, action),
        Commands::Serve { port, static_dir } => cli::run_serve(&cli, *port, static_dir.as_deref()),
    }
}
