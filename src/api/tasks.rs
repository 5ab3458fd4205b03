//! Task-management API resources: portfolio projects and their milestones.

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::api::paginate::fetch_pages;
use crate::api::{Transport, endpoint_url};
use crate::config::TaskConfig;
use crate::error::Result;
use crate::model::{Milestone, Project};

const PROJECT_FIELDS: &str = "name,permalink_url,custom_fields";
const MILESTONE_FIELDS: &str = "name,due_on,completed,permalink_url";

/// Projects of a portfolio, each with its portfolio key assigned from the
/// mapping custom field.
pub fn portfolio_projects<T: Transport + ?Sized>(
    transport: &T,
    portfolio_id: &str,
    key_field: &str,
) -> Result<Vec<Project>> {
    let url = endpoint_url(
        transport.base_url(),
        &format!("portfolios/{portfolio_id}/items"),
        &[("opt_fields", PROJECT_FIELDS)],
    )?;
    let report = fetch_pages(transport, url);

    let projects: Vec<Project> = decode_all(&report.items, Project::from_value, "project")
        .into_iter()
        .map(|mut project| {
            project.assign_key_from(key_field);
            project
        })
        .collect();
    info!(portfolio_id, count = projects.len(), "portfolio projects fetched");
    Ok(projects)
}

/// Milestones of one project. Each milestone records the project as parent.
pub fn project_milestones<T: Transport + ?Sized>(
    transport: &T,
    workspace_id: &str,
    project_id: &str,
) -> Result<Vec<Milestone>> {
    let url = endpoint_url(
        transport.base_url(),
        &format!("workspaces/{workspace_id}/tasks/search"),
        &[
            ("projects.any", project_id),
            ("resource_subtype", "milestone"),
            ("opt_fields", MILESTONE_FIELDS),
        ],
    )?;
    let report = fetch_pages(transport, url);

    Ok(decode_all(&report.items, Milestone::from_value, "milestone")
        .into_iter()
        .map(|mut milestone| {
            milestone.project_id = Some(project_id.to_string());
            milestone
        })
        .collect())
}

/// Fetches the configured portfolio and attaches milestones to each project.
#[instrument(level = "info", skip_all, fields(portfolio = %config.portfolio_id))]
pub fn fetch_portfolio<T: Transport + ?Sized>(
    transport: &T,
    config: &TaskConfig,
) -> Result<Vec<Project>> {
    let mut projects = portfolio_projects(transport, &config.portfolio_id, &config.key_field)?;
    for project in &mut projects {
        project.milestones = project_milestones(transport, &config.workspace_id, &project.id)?;
    }

    let milestones: usize = projects.iter().map(|project| project.milestones.len()).sum();
    let unmapped = projects.iter().filter(|project| project.key.is_none()).count();
    info!(
        projects = projects.len(),
        milestones, unmapped, "task data fetched"
    );
    Ok(projects)
}

fn decode_all<R>(
    items: &[Value],
    decode: impl Fn(&Value) -> serde_json::Result<R>,
    kind: &str,
) -> Vec<R> {
    items
        .iter()
        .filter_map(|item| match decode(item) {
            Ok(record) => Some(record),
            Err(error) => {
                warn!(kind, %error, "skipping malformed record");
                None
            }
        })
        .collect()
}
