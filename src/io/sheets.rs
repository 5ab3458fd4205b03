//! Cloud spreadsheet publishing.
//!
//! Every table replaces the contents of the tab with the same name; a
//! `LastUpdated` tab records when the export ran.

use std::collections::HashSet;

use chrono::{DateTime, Local};
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, instrument};
use url::{ParseError, Url};

use crate::config::SheetsConfig;
use crate::error::{ExtractError, Result};
use crate::flatten::WorkbookData;

/// Tab holding the export timestamp.
pub const LAST_UPDATED_TAB: &str = "LastUpdated";

const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const SHEETS_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Tab-level operations of a cloud spreadsheet.
pub trait SpreadsheetApi {
    fn tab_titles(&self) -> Result<Vec<String>>;
    fn add_tab(&self, title: &str) -> Result<()>;
    fn clear_tab(&self, title: &str) -> Result<()>;
    /// Writes `rows` starting at the top-left cell of the tab.
    fn write_rows(&self, title: &str, rows: &[Vec<String>]) -> Result<()>;
}

/// Outcome of a publish run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub written: Vec<String>,
    /// Tab name and the error that stopped it.
    pub failed: Vec<(String, String)>,
}

impl PublishReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Clears and rewrites one tab per table, creating missing tabs, then stamps
/// the [`LAST_UPDATED_TAB`]. A failing tab is logged and skipped.
#[instrument(level = "info", skip_all, fields(tables = workbook.tables.len()))]
pub fn publish<A: SpreadsheetApi + ?Sized>(
    api: &A,
    workbook: &WorkbookData,
    at: DateTime<Local>,
) -> Result<PublishReport> {
    let mut existing: HashSet<String> = api.tab_titles()?.into_iter().collect();
    let mut report = PublishReport::default();

    let stamp = vec![
        vec!["Last Updated".to_string()],
        vec![at.format("%Y-%m-%d %H:%M:%S").to_string()],
    ];
    let grids = workbook
        .tables
        .iter()
        .map(|table| (table.sheet_name.as_str(), table.to_grid()))
        .chain(std::iter::once((LAST_UPDATED_TAB, stamp)));

    for (title, grid) in grids {
        match replace_tab(api, &mut existing, title, &grid) {
            Ok(()) => report.written.push(title.to_string()),
            Err(err) => {
                error!(tab = title, error = %err, "failed to write tab");
                report.failed.push((title.to_string(), err.to_string()));
            }
        }
    }

    info!(
        written = report.written.len(),
        failed = report.failed.len(),
        "spreadsheet updated"
    );
    Ok(report)
}

fn replace_tab<A: SpreadsheetApi + ?Sized>(
    api: &A,
    existing: &mut HashSet<String>,
    title: &str,
    grid: &[Vec<String>],
) -> Result<()> {
    if !existing.contains(title) {
        api.add_tab(title)?;
        existing.insert(title.to_string());
    }
    api.clear_tab(title)?;
    api.write_rows(title, grid)
}

/// Quotes a tab title as an A1 range covering the whole tab.
pub fn a1_range(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

/// Google Sheets client bound to one spreadsheet.
#[derive(Debug, Clone)]
pub struct GoogleSheets {
    http: Client,
    token: String,
    spreadsheet_id: String,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

impl GoogleSheets {
    /// Finds the spreadsheet with the configured name.
    pub fn open_by_name(config: &SheetsConfig) -> Result<Self> {
        let http = Client::new();
        let query = format!(
            "name = '{}' and mimeType = 'application/vnd.google-apps.spreadsheet' and trashed = false",
            config.spreadsheet_name.replace('\\', "\\\\").replace('\'', "\\'")
        );
        let url = Url::parse_with_params(
            DRIVE_FILES_URL,
            &[("q", query.as_str()), ("fields", "files(id,name)")],
        )?;

        let request = http.get(url).bearer_auth(&config.access_token);
        let list: FileList = serde_json::from_value(send(request, "find spreadsheet")?)?;
        let file = list
            .files
            .into_iter()
            .next()
            .ok_or_else(|| ExtractError::SpreadsheetNotFound(config.spreadsheet_name.clone()))?;

        info!(name = %config.spreadsheet_name, id = %file.id, "spreadsheet opened");
        Ok(Self {
            http,
            token: config.access_token.clone(),
            spreadsheet_id: file.id,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(SHEETS_URL)?;
        url.path_segments_mut()
            .map_err(|_| ParseError::RelativeUrlWithCannotBeABaseBase)?
            .extend(segments);
        Ok(url)
    }

    fn values_url(&self, title: &str, suffix: &str) -> Result<Url> {
        let range = format!("{}{suffix}", a1_range(title));
        self.url(&[self.spreadsheet_id.as_str(), "values", range.as_str()])
    }
}

impl SpreadsheetApi for GoogleSheets {
    fn tab_titles(&self) -> Result<Vec<String>> {
        let mut url = self.url(&[self.spreadsheet_id.as_str()])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");
        let request = self.http.get(url).bearer_auth(&self.token);
        let meta: SpreadsheetMeta = serde_json::from_value(send(request, "list tabs")?)?;
        Ok(meta
            .sheets
            .into_iter()
            .map(|sheet| sheet.properties.title)
            .collect())
    }

    fn add_tab(&self, title: &str) -> Result<()> {
        let target = format!("{}:batchUpdate", self.spreadsheet_id);
        let url = self.url(&[target.as_str()])?;
        let body = json!({"requests": [{"addSheet": {"properties": {"title": title}}}]});
        let request = self.http.post(url).bearer_auth(&self.token).json(&body);
        send(request, "add tab").map(|_| ())
    }

    fn clear_tab(&self, title: &str) -> Result<()> {
        let url = self.values_url(title, ":clear")?;
        let request = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&json!({}));
        send(request, "clear tab").map(|_| ())
    }

    fn write_rows(&self, title: &str, rows: &[Vec<String>]) -> Result<()> {
        let mut url = self.values_url(title, "")?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let body = json!({
            "range": a1_range(title),
            "majorDimension": "ROWS",
            "values": rows,
        });
        let request = self.http.put(url).bearer_auth(&self.token).json(&body);
        send(request, "write rows").map(|_| ())
    }
}

fn send(request: RequestBuilder, action: &str) -> Result<Value> {
    let response = request.send()?;
    let status = response.status();
    let body = response.text()?;
    if !status.is_success() {
        return Err(ExtractError::SpreadsheetApi {
            action: action.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&body)?)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use chrono::TimeZone;

    use super::*;
    use crate::flatten::SheetTable;

    /// Records every call; tabs listed in `failing` reject writes.
    #[derive(Default)]
    struct RecordingSheets {
        tabs: RefCell<Vec<String>>,
        calls: RefCell<Vec<String>>,
        written: RefCell<Vec<(String, Vec<Vec<String>>)>>,
        failing: Vec<String>,
    }

    impl SpreadsheetApi for RecordingSheets {
        fn tab_titles(&self) -> Result<Vec<String>> {
            Ok(self.tabs.borrow().clone())
        }

        fn add_tab(&self, title: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("add {title}"));
            self.tabs.borrow_mut().push(title.to_string());
            Ok(())
        }

        fn clear_tab(&self, title: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("clear {title}"));
            Ok(())
        }

        fn write_rows(&self, title: &str, rows: &[Vec<String>]) -> Result<()> {
            self.calls.borrow_mut().push(format!("write {title}"));
            if self.failing.iter().any(|name| name == title) {
                return Err(ExtractError::SpreadsheetApi {
                    action: "write rows".into(),
                    status: 400,
                    body: "bad range".into(),
                });
            }
            self.written
                .borrow_mut()
                .push((title.to_string(), rows.to_vec()));
            Ok(())
        }
    }

    fn workbook() -> WorkbookData {
        let mut projects = SheetTable::new("Projects", vec!["id".into()]);
        projects.rows.push(vec!["p1".into()]);
        WorkbookData {
            tables: vec![projects, SheetTable::new("Milestones", vec!["id".into()])],
        }
    }

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap()
    }

    #[test]
    fn rewrites_each_tab_and_stamps_last_updated() {
        let sheets = RecordingSheets {
            tabs: RefCell::new(vec!["Projects".into()]),
            ..RecordingSheets::default()
        };

        let report = publish(&sheets, &workbook(), noon()).unwrap();

        assert!(report.is_success());
        assert_eq!(report.written, vec!["Projects", "Milestones", "LastUpdated"]);
        assert_eq!(
            *sheets.calls.borrow(),
            vec![
                "clear Projects",
                "write Projects",
                "add Milestones",
                "clear Milestones",
                "write Milestones",
                "add LastUpdated",
                "clear LastUpdated",
                "write LastUpdated",
            ]
        );
        let written = sheets.written.borrow();
        assert_eq!(written[0].1, vec![vec!["id"], vec!["p1"]]);
        assert_eq!(
            written[2].1,
            vec![vec!["Last Updated"], vec!["2026-03-04 12:00:00"]]
        );
    }

    #[test]
    fn failing_tab_does_not_stop_the_rest() {
        let sheets = RecordingSheets {
            failing: vec!["Projects".into()],
            ..RecordingSheets::default()
        };

        let report = publish(&sheets, &workbook(), noon()).unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "Projects");
        assert_eq!(report.written, vec!["Milestones", "LastUpdated"]);
    }

    #[test]
    fn a1_range_escapes_quotes() {
        assert_eq!(a1_range("Projects"), "'Projects'");
        assert_eq!(a1_range("Bob's plan"), "'Bob''s plan'");
    }
}
