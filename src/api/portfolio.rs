//! Portfolio-management API resources.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::api::paginate::{FetchReport, fetch_pages};
use crate::api::{Transport, endpoint_url};
use crate::config::{DateWindow, PortfolioConfig};
use crate::error::Result;

/// A named alternate dataset of the portfolio API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Scenario {
    #[serde(rename = "scenarioId")]
    pub id: String,
    #[serde(rename = "scenarioName", default)]
    pub name: String,
}

/// Raw records pulled from the portfolio API in one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioSnapshot {
    pub projects: Vec<Value>,
    pub allocations: Vec<Value>,
    pub financials: Vec<Value>,
    pub milestones: Vec<Value>,
}

/// Scopes `endpoint` to a scenario when one is selected.
pub fn scenario_endpoint(endpoint: &str, scenario: Option<&str>) -> String {
    match scenario {
        Some(id) => format!("scenarios/{id}/{}", endpoint.trim_start_matches('/')),
        None => endpoint.to_string(),
    }
}

/// Reads every page of `endpoint`, optionally scoped to a scenario.
pub fn fetch_all<T: Transport + ?Sized>(
    transport: &T,
    endpoint: &str,
    scenario: Option<&str>,
) -> Result<FetchReport> {
    let url = endpoint_url(
        transport.base_url(),
        &scenario_endpoint(endpoint, scenario),
        &[],
    )?;
    Ok(fetch_pages(transport, url))
}

/// Pulls projects, monthly allocations, financial events, and milestones.
#[instrument(level = "info", skip_all, fields(scenario = scenario.unwrap_or("default")))]
pub fn fetch_snapshot<T: Transport + ?Sized>(
    transport: &T,
    config: &PortfolioConfig,
    scenario: Option<&str>,
) -> Result<PortfolioSnapshot> {
    let window = windowed(&config.window);
    let allocation = format!("{}&aggregation=MONTH", windowed(&config.allocation_window));

    let projects = fetch_resource(transport, &format!("projects?{window}"), scenario)?;
    let unique: BTreeSet<&str> = projects
        .iter()
        .filter_map(|project| project.get("projectId").and_then(Value::as_str))
        .collect();
    info!(count = projects.len(), unique_ids = unique.len(), "projects fetched");

    let allocations =
        fetch_resource(transport, &format!("allocationSlices?{allocation}"), scenario)?;
    let financials = fetch_resource(transport, &format!("financials?{window}"), scenario)?;
    let milestones = fetch_resource(transport, &format!("milestones?{window}"), scenario)?;

    Ok(PortfolioSnapshot {
        projects,
        allocations,
        financials,
        milestones,
    })
}

/// Lists the scenarios the token can see.
pub fn list_scenarios<T: Transport + ?Sized>(transport: &T) -> Result<Vec<Scenario>> {
    let report = fetch_all(transport, "scenarios", None)?;
    Ok(report
        .items
        .iter()
        .filter_map(|item| match Scenario::deserialize(item) {
            Ok(scenario) => Some(scenario),
            Err(error) => {
                warn!(%error, "skipping malformed scenario record");
                None
            }
        })
        .collect())
}

fn fetch_resource<T: Transport + ?Sized>(
    transport: &T,
    endpoint: &str,
    scenario: Option<&str>,
) -> Result<Vec<Value>> {
    let report = fetch_all(transport, endpoint, scenario)?;
    info!(
        endpoint,
        count = report.items.len(),
        pages = report.pages,
        complete = report.is_complete(),
        "resource fetched"
    );
    Ok(report.items)
}

fn windowed(window: &DateWindow) -> String {
    format!(
        "startDate={}&finishDate={}",
        window.start.format("%Y-%m-%d"),
        window.finish.format("%Y-%m-%d")
    )
}
