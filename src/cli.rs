//! # CLI Execution Functions
//!
//! Extracted from `main.rs` to keep the entry point slim. Each `run_*`
//! function loads settings, builds what it needs (catalog, connector, local
//! history) and drives one library operation on a tokio runtime.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use facsys::alarm::{classify_raw, label_for, ReferenceZone};
use facsys::catalog::Catalog;
use facsys::completion::{self, BoardContext, ScopeOverview};
use facsys::config::AppConfig;
use facsys::connector::{self, RowConnector};
use facsys::dashboard;
use facsys::history::History;
use facsys::inspection::{CheckResult, InspectionType, SiteScope};
use facsys::prom_metrics::Metrics;
use facsys::submission::{EquipmentOutcome, InspectionDraft, SubmissionSummary, Submitter};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use super::{CatalogAction, Cli, Commands};

/// Settings shared by every subcommand.
struct Session {
    config: AppConfig,
    catalog: Catalog,
    zone: ReferenceZone,
    scope: SiteScope,
}

impl Session {
    fn load(cli: &Cli) -> Result<Self> {
        let mut config = AppConfig::load(cli.config.as_deref())?;
        if let Some(endpoint) = cli.endpoint.as_deref().filter(|s| !s.trim().is_empty()) {
            config.connector.endpoint = Some(endpoint.to_string());
        }
        let zone = config.zone()?;
        let catalog = config.load_catalog()?;
        let scope = match cli.scope.as_deref() {
            Some(raw) => SiteScope::new(raw)?,
            None => catalog.primary_scope().clone(),
        };
        Ok(Session {
            config,
            catalog,
            zone,
            scope,
        })
    }

    fn connector(&self, metrics: Arc<Metrics>) -> Result<Arc<dyn RowConnector>> {
        connector::build(
            &self.config.connector,
            self.catalog.primary_scope(),
            self.zone,
            metrics,
        )
    }

    fn history(&self) -> Result<History> {
        let path = self.config.history_path()?;
        History::open(path.clone()).with_context(|| format!("opening history {}", path.display()))
    }
}

// ── Offline Commands ────────────────────────────────────────────

pub fn run_classify(
    cli: &Cli,
    kind: InspectionType,
    last: Option<&str>,
    today: Option<NaiveDate>,
) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let zone = config.zone()?;
    let today = today.unwrap_or_else(|| zone.today(Utc::now()));
    let status = classify_raw(kind, last, today, zone)?;
    println!("{}\t{}", status, label_for(status));
    Ok(())
}

pub fn run_teams(cli: &Cli) -> Result<()> {
    let session = Session::load(cli)?;
    let primary = session.catalog.primary_scope();
    for team in session.catalog.teams() {
        let marker = if &team.scope == primary { "*" } else { " " };
        println!(
            "{}{:<6} {:<16} {} equipment",
            marker,
            team.scope,
            team.name,
            team.equipment.len()
        );
        for name in &team.equipment {
            println!("         - {}", name);
        }
    }
    Ok(())
}

// ── Row-Store Commands ──────────────────────────────────────────

pub fn run_test_connection(cli: &Cli) -> Result<()> {
    let session = Session::load(cli)?;
    let connector = session.connector(Arc::new(Metrics::new()))?;
    let rt = tokio::runtime::Runtime::new()?;
    match rt.block_on(connector.test_connection()) {
        Ok(result) => {
            println!("{}: {} ({:?})", connector.name(), result.message, connector.state());
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("{} connection test failed: {}", connector.name(), e)),
    }
}

fn print_overview(overview: &ScopeOverview) {
    let title = overview.name.as_deref().unwrap_or("");
    println!("{} {}", overview.scope, title);
    for tile in &overview.tiles {
        println!(
            "  {:<12} {:>3}% ({}/{}) {}",
            tile.kind.as_str(),
            tile.percentage,
            tile.completed,
            tile.total,
            tile.status.as_str()
        );
    }
}

pub fn run_status(cli: &Cli, all: bool) -> Result<()> {
    let session = Session::load(cli)?;
    let connector = session.connector(Arc::new(Metrics::new()))?;
    let ctx = BoardContext {
        connector: connector.as_ref(),
        catalog: &session.catalog,
        zone: session.zone,
        today: session.zone.today(Utc::now()),
        retry: session.config.retry_policy(),
        metrics: None,
    };

    let rt = tokio::runtime::Runtime::new()?;
    if all {
        for overview in rt.block_on(completion::teams_overview(&ctx)) {
            print_overview(&overview);
        }
    } else {
        print_overview(&rt.block_on(completion::scope_overview(&ctx, &session.scope)));
    }
    Ok(())
}

pub fn run_equipment(cli: &Cli, kind: InspectionType) -> Result<()> {
    let session = Session::load(cli)?;
    let connector = session.connector(Arc::new(Metrics::new()))?;
    let history = session.history()?;
    let today = session.zone.today(Utc::now());

    let rt = tokio::runtime::Runtime::new()?;
    let snapshots = match rt.block_on(completion::fetch_with_retry(
        connector.as_ref(),
        kind,
        &session.scope,
        session.config.retry_policy(),
    )) {
        Ok(snapshots) => snapshots,
        Err(e) => {
            warn!(error = %e, "row-store unavailable, showing local history only");
            Vec::new()
        }
    };

    let board = completion::equipment_board(
        kind,
        &session.scope,
        session.catalog.equipment_for(&session.scope),
        &snapshots,
        &history,
        today,
        session.zone,
    );
    println!("{} {} ({})", session.scope, kind.as_str(), today);
    for line in &board {
        let date = line
            .last_inspection_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  {:<20} {:<8} {:<12} {}", line.name, line.status, date, line.label);
    }
    Ok(())
}

fn parse_check(raw: &str) -> Result<CheckResult> {
    let (item, result) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("check {:?} must look like ITEM=RESULT", raw))?;
    Ok(CheckResult::new(item.trim(), result.trim()))
}

pub fn run_submit(cli: &Cli) -> Result<()> {
    let Commands::Submit {
        kind,
        equipment,
        checks,
        notes,
        location,
        inspector,
        allow_duplicates,
    } = &cli.command
    else {
        anyhow::bail!("run_submit called for another subcommand");
    };

    let session = Session::load(cli)?;
    let connector = session.connector(Arc::new(Metrics::new()))?;
    let history = Arc::new(Mutex::new(session.history()?));

    let draft = InspectionDraft {
        kind: Some(*kind),
        equipment: equipment.clone(),
        checks: checks.iter().map(|c| parse_check(c)).collect::<Result<_>>()?,
        notes: notes.clone(),
        location: location.clone(),
        inspector: inspector.clone(),
        allow_duplicates: *allow_duplicates,
    };

    let submitter = Submitter::new(connector, history, session.zone);
    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(submitter.submit(&draft, &session.scope, Utc::now()))?;

    for result in &report.results {
        match &result.outcome {
            EquipmentOutcome::Failed(e) => println!("  {:<20} failed: {}", result.equipment, e),
            outcome => println!("  {:<20} {}", result.equipment, outcome.as_str()),
        }
    }
    match report.summary() {
        SubmissionSummary::AllSucceeded => Ok(()),
        SubmissionSummary::Partial => anyhow::bail!(
            "partial submission: {} of {} rows failed",
            report.count("failed"),
            report.results.len()
        ),
        SubmissionSummary::AllFailed => anyhow::bail!("submission failed: no rows were appended"),
    }
}

// ── Catalog Editing ─────────────────────────────────────────────

pub fn run_catalog(cli: &Cli, action: &CatalogAction) -> Result<()> {
    let mut session = Session::load(cli)?;
    let path = session.config.catalog_path()?;
    let scope = session.scope.clone();

    let (done, remote) = match action {
        CatalogAction::AddEquipment { name, kind, remote } => {
            session.catalog.add_equipment(&scope, name)?;
            (
                format!("Added {:?} to {}", name, scope),
                remote.then(|| RemoteEdit::AddEquipment(name.clone(), *kind)),
            )
        }
        CatalogAction::RemoveEquipment { name, kind, remote } => {
            session.catalog.remove_equipment(&scope, name)?;
            (
                format!("Removed {:?} from {}", name, scope),
                remote.then(|| RemoteEdit::DeleteEquipment(name.clone(), *kind)),
            )
        }
        CatalogAction::AddItem { kind, item, remote } => {
            session.catalog.add_item(*kind, item)?;
            (
                format!("Added item {:?} to {}", item, kind),
                remote.then(|| RemoteEdit::AddItem(*kind, item.clone())),
            )
        }
        CatalogAction::RemoveItem { kind, item, remote } => {
            session.catalog.remove_item(*kind, item)?;
            (
                format!("Removed item {:?} from {}", item, kind),
                remote.then(|| RemoteEdit::DeleteItem(*kind, item.clone())),
            )
        }
    };

    // The local file is written only once the row-store accepted the edit.
    if let Some(edit) = remote {
        let connector = session.connector(Arc::new(Metrics::new()))?;
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(edit.apply(connector.as_ref(), &scope))
            .with_context(|| format!("row-store edit failed; {} left unchanged", path.display()))?;
    }

    session.catalog.save(&path)?;
    info!(path = %path.display(), "catalog saved");
    eprintln!("{done}");
    Ok(())
}

enum RemoteEdit {
    AddEquipment(String, Option<InspectionType>),
    DeleteEquipment(String, Option<InspectionType>),
    AddItem(InspectionType, String),
    DeleteItem(InspectionType, String),
}

impl RemoteEdit {
    async fn apply(&self, connector: &dyn RowConnector, scope: &SiteScope) -> Result<()> {
        let admin = connector.catalog_admin().ok_or_else(|| {
            anyhow::anyhow!("the {} row-store does not support catalog edits", connector.name())
        })?;
        let kinds = |kind: &Option<InspectionType>| match kind {
            Some(k) => vec![*k],
            None => InspectionType::ALL.to_vec(),
        };
        match self {
            RemoteEdit::AddEquipment(name, kind) => {
                for k in kinds(kind) {
                    admin.add_equipment(k, scope, name).await?;
                }
            }
            RemoteEdit::DeleteEquipment(name, kind) => {
                for k in kinds(kind) {
                    admin.delete_equipment(k, scope, name).await?;
                }
            }
            RemoteEdit::AddItem(kind, item) => admin.add_inspection_item(*kind, item).await?,
            RemoteEdit::DeleteItem(kind, item) => admin.delete_inspection_item(*kind, item).await?,
        }
        eprintln!("Row-store updated");
        Ok(())
    }
}

// ── Dashboard ───────────────────────────────────────────────────

pub fn run_serve(cli: &Cli, port: Option<u16>, static_dir: Option<&Path>) -> Result<()> {
    let session = Session::load(cli)?;
    let metrics = Arc::new(Metrics::new());
    let connector = session.connector(metrics.clone())?;
    let history = session.history()?;
    let port = port.unwrap_or(session.config.dashboard.port);
    let static_dir = static_dir
        .map(Path::to_path_buf)
        .or_else(|| session.config.dashboard.static_dir.clone());

    let state = dashboard::AppState::new(connector, session.catalog, history, session.zone, metrics)
        .with_retry(session.config.retry_policy());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(dashboard::run(Arc::new(state), port, static_dir.as_deref()))
}
