//! Runtime configuration assembled from environment variables.
//!
//! All credentials and endpoints are carried in an explicit [`Config`] value
//! that is handed to the API clients and publishers. Nothing is read from the
//! environment after start-up.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::error::{ExtractError, Result};

const SCENARIO_PREFIX: &str = "MP_SCENARIO_";
const DEFAULT_KEY_FIELD: &str = "MP Mapping";

/// Connection details for a bearer-authenticated REST API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    pub base_url: String,
    pub token: String,
}

/// Date window passed as `startDate`/`finishDate` to the portfolio API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub finish: NaiveDate,
}

impl DateWindow {
    fn parse(name_start: &str, start: &str, name_finish: &str, finish: &str) -> Result<Self> {
        let start = parse_date(name_start, start)?;
        let finish = parse_date(name_finish, finish)?;
        if finish < start {
            return Err(ExtractError::InvalidConfig {
                name: name_finish.to_string(),
                value: finish.to_string(),
            });
        }
        Ok(Self { start, finish })
    }
}

/// Portfolio-management API settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortfolioConfig {
    pub api: ApiCredentials,
    /// Window for projects, financials, and milestones.
    pub window: DateWindow,
    /// Window for monthly allocation slices.
    pub allocation_window: DateWindow,
    /// Lower-cased alias -> scenario id.
    pub scenarios: BTreeMap<String, String>,
}

/// Task-management API settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskConfig {
    pub api: ApiCredentials,
    pub workspace_id: String,
    pub portfolio_id: String,
    /// Custom field holding the portfolio project key.
    pub key_field: String,
}

/// Cloud spreadsheet settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetsConfig {
    pub access_token: String,
    pub spreadsheet_name: String,
}

/// Full application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub portfolio: Option<PortfolioConfig>,
    pub tasks: Option<TaskConfig>,
    pub sheets: Option<SheetsConfig>,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Builds the configuration from arbitrary key/value pairs.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: BTreeMap<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .filter(|(_, value)| !value.trim().is_empty())
            .collect();

        Ok(Self {
            portfolio: portfolio_config(&vars)?,
            tasks: task_config(&vars)?,
            sheets: sheets_config(&vars)?,
        })
    }

    /// Returns the portfolio settings or a configuration error.
    pub fn require_portfolio(&self) -> Result<&PortfolioConfig> {
        self.portfolio
            .as_ref()
            .ok_or_else(|| ExtractError::MissingConfig("MP_URL and MP_TOKEN".to_string()))
    }

    /// Returns the cloud spreadsheet settings or a configuration error.
    pub fn require_sheets(&self) -> Result<&SheetsConfig> {
        self.sheets.as_ref().ok_or_else(|| {
            ExtractError::MissingConfig("GSHEETS_TOKEN and GSHEETS_SPREADSHEET".to_string())
        })
    }
}

impl PortfolioConfig {
    /// Resolves a scenario selector: a known alias maps to its id, anything
    /// else is taken as a literal scenario id.
    pub fn resolve_scenario(&self, selector: &str) -> String {
        let selector = selector.trim();
        self.scenarios
            .get(&selector.to_lowercase())
            .cloned()
            .unwrap_or_else(|| selector.to_string())
    }
}

fn portfolio_config(vars: &BTreeMap<String, String>) -> Result<Option<PortfolioConfig>> {
    let Some(api) = credentials(vars, "MP_URL", "MP_TOKEN")? else {
        return Ok(None);
    };

    let window = DateWindow::parse(
        "MP_START_DATE",
        value_or(vars, "MP_START_DATE", "2024-01-01"),
        "MP_FINISH_DATE",
        value_or(vars, "MP_FINISH_DATE", "2030-12-31"),
    )?;
    let allocation_window = DateWindow::parse(
        "MP_ALLOCATION_START",
        value_or(vars, "MP_ALLOCATION_START", "2025-07-01"),
        "MP_ALLOCATION_FINISH",
        value_or(vars, "MP_ALLOCATION_FINISH", "2027-12-31"),
    )?;

    let scenarios = vars
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(SCENARIO_PREFIX)
                .filter(|alias| !alias.is_empty())
                .map(|alias| (alias.to_lowercase(), value.trim().to_string()))
        })
        .collect();

    Ok(Some(PortfolioConfig {
        api,
        window,
        allocation_window,
        scenarios,
    }))
}

fn task_config(vars: &BTreeMap<String, String>) -> Result<Option<TaskConfig>> {
    let names = ["ASANA_URL", "ASANA_TOKEN", "ASANA_WORK_ID", "ASANA_PORT_ID"];
    let missing: Vec<&str> = names
        .iter()
        .copied()
        .filter(|name| !vars.contains_key(*name))
        .collect();

    if missing.len() == names.len() {
        return Ok(None);
    }
    if !missing.is_empty() {
        return Err(ExtractError::MissingConfig(missing.join(", ")));
    }

    let Some(api) = credentials(vars, "ASANA_URL", "ASANA_TOKEN")? else {
        return Ok(None);
    };

    Ok(Some(TaskConfig {
        api,
        workspace_id: vars["ASANA_WORK_ID"].clone(),
        portfolio_id: vars["ASANA_PORT_ID"].clone(),
        key_field: value_or(vars, "ASANA_KEY_FIELD", DEFAULT_KEY_FIELD).to_string(),
    }))
}

fn sheets_config(vars: &BTreeMap<String, String>) -> Result<Option<SheetsConfig>> {
    match (vars.get("GSHEETS_TOKEN"), vars.get("GSHEETS_SPREADSHEET")) {
        (Some(token), Some(name)) => Ok(Some(SheetsConfig {
            access_token: token.clone(),
            spreadsheet_name: name.clone(),
        })),
        (None, None) => Ok(None),
        (Some(_), None) => Err(ExtractError::MissingConfig("GSHEETS_SPREADSHEET".to_string())),
        (None, Some(_)) => Err(ExtractError::MissingConfig("GSHEETS_TOKEN".to_string())),
    }
}

fn credentials(
    vars: &BTreeMap<String, String>,
    url_name: &str,
    token_name: &str,
) -> Result<Option<ApiCredentials>> {
    match (vars.get(url_name), vars.get(token_name)) {
        (Some(base), Some(token)) => {
            url::Url::parse(base).map_err(|_| ExtractError::InvalidConfig {
                name: url_name.to_string(),
                value: base.clone(),
            })?;
            Ok(Some(ApiCredentials {
                base_url: trim_base(base),
                token: token.clone(),
            }))
        }
        (None, None) => Ok(None),
        (Some(_), None) => Err(ExtractError::MissingConfig(token_name.to_string())),
        (None, Some(_)) => Err(ExtractError::MissingConfig(url_name.to_string())),
    }
}

fn value_or<'a>(vars: &'a BTreeMap<String, String>, name: &str, default: &'a str) -> &'a str {
    vars.get(name).map(String::as_str).unwrap_or(default)
}

fn parse_date(name: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| ExtractError::InvalidConfig {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn trim_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
