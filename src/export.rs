use std::path::{Path, PathBuf};

use chrono::Local;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::api::portfolio::{self, PortfolioSnapshot};
use crate::api::{ApiClient, Transport, tasks};
use crate::config::{Config, PortfolioConfig, TaskConfig};
use crate::error::Result;
use crate::flatten::{WorkbookData, flatten, group_children, tabulate};
use crate::io::excel_write;
use crate::io::sheets::{self, GoogleSheets, PublishReport};
use crate::model::Project;
use crate::reconcile::{LinkedProject, milestone_columns, reconcile};

pub const PROJECTS_SHEET: &str = "Projects";
pub const ALLOCATIONS_SHEET: &str = "Allocations";
pub const FINANCIALS_SHEET: &str = "FinancialEvents";
pub const MILESTONES_SHEET: &str = "Milestones";
pub const PROJECT_MILESTONES_SHEET: &str = "ProjectMilestones";

/// Directory used when no explicit output path is given.
pub const DEFAULT_OUTPUT_DIR: &str = "data";

/// Where the export is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Cloud,
    File,
    Both,
}

impl OutputMode {
    pub fn writes_file(self) -> bool {
        matches!(self, OutputMode::File | OutputMode::Both)
    }

    pub fn writes_cloud(self) -> bool {
        matches!(self, OutputMode::Cloud | OutputMode::Both)
    }
}

/// Options of one export run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub mode: OutputMode,
    /// Scenario alias or literal id.
    pub scenario: Option<String>,
    /// Workbook path; defaults to a timestamped file under [`DEFAULT_OUTPUT_DIR`].
    pub output: Option<PathBuf>,
}

/// Result of publishing an export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportSummary {
    pub sheet_count: usize,
    pub file: Option<PathBuf>,
    pub cloud: Option<PublishReport>,
    /// Targets that could not be written at all.
    pub failed_targets: Vec<String>,
}

impl ExportSummary {
    /// True when at least one requested target was written.
    pub fn any_written(&self) -> bool {
        self.file.is_some() || self.cloud.as_ref().is_some_and(|report| !report.written.is_empty())
    }
}

/// Fetches both APIs and publishes the combined workbook.
#[instrument(level = "info", skip_all, fields(mode = ?options.mode))]
pub fn run_export(config: &Config, options: &ExportOptions) -> Result<ExportSummary> {
    let portfolio_config = config.require_portfolio()?;
    let sheets_config = if options.mode.writes_cloud() {
        Some(config.require_sheets()?)
    } else {
        None
    };

    let scenario = options
        .scenario
        .as_deref()
        .map(|selector| portfolio_config.resolve_scenario(selector));
    if let Some(id) = &scenario {
        info!(scenario = %id, "using scenario");
    }

    let portfolio_client = ApiClient::new(portfolio_config.api.clone());
    let task_client = config
        .tasks
        .as_ref()
        .map(|task_config| (ApiClient::new(task_config.api.clone()), task_config));
    let task_side = task_client
        .as_ref()
        .map(|(client, task_config)| (client as &dyn Transport, *task_config));

    let workbook = collect(
        &portfolio_client,
        portfolio_config,
        task_side,
        scenario.as_deref(),
    )?;

    let now = Local::now();
    let mut summary = ExportSummary {
        sheet_count: workbook.tables.len(),
        ..ExportSummary::default()
    };

    if options.mode.writes_file() {
        let path = options
            .output
            .clone()
            .unwrap_or_else(|| excel_write::default_output_path(Path::new(DEFAULT_OUTPUT_DIR), now));
        match excel_write::write_workbook(&path, &workbook) {
            Ok(()) => {
                info!(path = %path.display(), "exported workbook");
                summary.file = Some(path);
            }
            Err(err) => {
                error!(path = %path.display(), error = %err, "failed to write workbook");
                summary.failed_targets.push(path.display().to_string());
            }
        }
    }

    if let Some(sheets_config) = sheets_config {
        match GoogleSheets::open_by_name(sheets_config)
            .and_then(|api| sheets::publish(&api, &workbook, now))
        {
            Ok(report) => summary.cloud = Some(report),
            Err(err) => {
                error!(spreadsheet = %sheets_config.spreadsheet_name, error = %err, "failed to publish spreadsheet");
                summary
                    .failed_targets
                    .push(sheets_config.spreadsheet_name.clone());
            }
        }
    }

    Ok(summary)
}

/// Pulls every resource and assembles the export workbook. Task data is
/// optional; without it the combined milestone sheet is omitted.
pub fn collect(
    portfolio_api: &dyn Transport,
    portfolio_config: &PortfolioConfig,
    task_side: Option<(&dyn Transport, &TaskConfig)>,
    scenario: Option<&str>,
) -> Result<WorkbookData> {
    let snapshot = portfolio::fetch_snapshot(portfolio_api, portfolio_config, scenario)?;

    let linked = match task_side {
        Some((task_api, task_config)) => {
            let task_projects = tasks::fetch_portfolio(task_api, task_config)?;
            let portfolio_projects = decode_projects(&snapshot.projects);
            Some(reconcile(task_projects, &portfolio_projects))
        }
        None => {
            info!("task API not configured, skipping milestone reconciliation");
            None
        }
    };

    Ok(build_workbook(&snapshot, linked.as_deref()))
}

/// Lays out the export: one raw sheet per portfolio resource, then the
/// reconciled project/milestone sheet when task data is available.
pub fn build_workbook(snapshot: &PortfolioSnapshot, linked: Option<&[LinkedProject]>) -> WorkbookData {
    let mut workbook = WorkbookData::default();
    workbook.push(tabulate(PROJECTS_SHEET, &snapshot.projects));
    workbook.push(tabulate(ALLOCATIONS_SHEET, &snapshot.allocations));
    workbook.push(tabulate(FINANCIALS_SHEET, &snapshot.financials));
    workbook.push(tabulate(MILESTONES_SHEET, &snapshot.milestones));

    if let Some(linked) = linked {
        let children = group_children(
            linked
                .iter()
                .flat_map(|link| link.task.milestones.iter().cloned()),
        );
        let table = flatten(PROJECT_MILESTONES_SHEET, linked, &children, &milestone_columns());
        debug!(rows = table.rows.len(), "project milestones flattened");
        workbook.push(table);
    }

    workbook
}

/// Lists the scenarios visible to the portfolio token.
pub fn scenario_listing(config: &Config) -> Result<Vec<portfolio::Scenario>> {
    let portfolio_config = config.require_portfolio()?;
    let client = ApiClient::new(portfolio_config.api.clone());
    portfolio::list_scenarios(&client)
}

fn decode_projects(records: &[Value]) -> Vec<Project> {
    records
        .iter()
        .filter_map(|record| match Project::from_value(record) {
            Ok(project) => Some(project),
            Err(err) => {
                warn!(error = %err, "skipping undecodable portfolio project");
                None
            }
        })
        .collect()
}
