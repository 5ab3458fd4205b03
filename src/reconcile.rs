//! Links task-API projects to portfolio-API projects by portfolio key.

use std::collections::HashMap;

use tracing::info;

use crate::flatten::{Column, ColumnSpec};
use crate::model::{Project, Record};

/// Prefix addressing the portfolio side of a [`LinkedProject`].
pub const PORTFOLIO_PREFIX: &str = "portfolio.";

/// A task-API project and its portfolio-API counterpart, if one matched.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedProject {
    pub task: Project,
    pub portfolio: Option<Project>,
}

impl Record for LinkedProject {
    fn join_key(&self) -> Option<&str> {
        self.task.join_key()
    }

    fn cell(&self, field: &str) -> Option<String> {
        match field.strip_prefix(PORTFOLIO_PREFIX) {
            Some(field) => self.portfolio.as_ref().and_then(|project| project.cell(field)),
            None => self.task.cell(field),
        }
    }
}

/// Pairs every task project with the portfolio project sharing its key.
/// Task order is preserved; projects without a key or a match keep an empty
/// portfolio side. When several portfolio projects share a key the first one
/// wins.
pub fn reconcile(task_projects: Vec<Project>, portfolio_projects: &[Project]) -> Vec<LinkedProject> {
    let mut by_key: HashMap<&str, &Project> = HashMap::new();
    for project in portfolio_projects {
        if let Some(key) = project.key.as_deref() {
            by_key.entry(key).or_insert(project);
        }
    }

    let linked: Vec<LinkedProject> = task_projects
        .into_iter()
        .map(|task| {
            let portfolio = task
                .key
                .as_deref()
                .and_then(|key| by_key.get(key))
                .map(|project| (*project).clone());
            LinkedProject { task, portfolio }
        })
        .collect();

    let matched = linked.iter().filter(|link| link.portfolio.is_some()).count();
    info!(
        projects = linked.len(),
        matched,
        unmatched = linked.len() - matched,
        "projects reconciled"
    );
    linked
}

/// Columns of the combined project/milestone sheet.
pub fn milestone_columns() -> ColumnSpec {
    ColumnSpec {
        parent: vec![
            Column::new("project_gid", "id"),
            Column::new("project_name", "name"),
            Column::new("project_url", "url"),
            Column::new("mp_key", "key"),
            Column::new("mp_project_id", "portfolio.id"),
            Column::new("mp_project_name", "portfolio.name"),
            Column::new("mp_start", "portfolio.start"),
            Column::new("mp_finish", "portfolio.finish"),
        ],
        child: vec![
            Column::new("milestone", "name"),
            Column::new("due_on", "due"),
            Column::new("completed", "completed"),
            Column::new("milestone_url", "url"),
        ],
    }
}
