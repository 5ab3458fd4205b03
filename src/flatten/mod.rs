//! Reshapes fetched records into rectangular tables for spreadsheet output.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;
use tracing::warn;

use crate::model::{Record, cell_text};

/// Value written into child columns when a parent has no children.
pub const PLACEHOLDER: &str = "N/A";

/// Excel's sheet name limit.
const MAX_SHEET_NAME: usize = 31;

/// A table that will be materialised as a spreadsheet tab.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetTable {
    pub sheet_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SheetTable {
    pub fn new(sheet_name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Header row followed by the data rows.
    pub fn to_grid(&self) -> Vec<Vec<String>> {
        let mut grid = Vec::with_capacity(self.rows.len() + 1);
        grid.push(self.columns.clone());
        grid.extend(self.rows.iter().cloned());
        grid
    }
}

/// Represents all tables of one export, in output order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkbookData {
    pub tables: Vec<SheetTable>,
}

impl WorkbookData {
    /// Appends a table, renaming it if its sheet name is invalid or taken.
    pub fn push(&mut self, mut table: SheetTable) {
        let mut registry = SheetNameRegistry::default();
        for existing in &self.tables {
            registry.claim(existing.sheet_name.clone());
        }
        table.sheet_name = registry.assign(&table.sheet_name);
        self.tables.push(table);
    }

    pub fn table(&self, sheet_name: &str) -> Option<&SheetTable> {
        self.tables.iter().find(|table| table.sheet_name == sheet_name)
    }
}

/// One output column: its header text and the record field it reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub header: String,
    pub field: String,
}

impl Column {
    pub fn new(header: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            field: field.into(),
        }
    }
}

/// Columns taken from the parent record followed by columns taken from each
/// child record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSpec {
    pub parent: Vec<Column>,
    pub child: Vec<Column>,
}

impl ColumnSpec {
    pub fn headers(&self) -> Vec<String> {
        self.parent
            .iter()
            .chain(&self.child)
            .map(|column| column.header.clone())
            .collect()
    }
}

/// Produces one row per (parent, child) pair. Parents without children get a
/// single row with [`PLACEHOLDER`] in every child column; children whose key
/// matches no parent are dropped.
pub fn flatten<P: Record, C: Record>(
    sheet_name: &str,
    parents: &[P],
    children_by_parent: &BTreeMap<String, Vec<C>>,
    spec: &ColumnSpec,
) -> SheetTable {
    let mut table = SheetTable::new(sheet_name, spec.headers());

    for parent in parents {
        let prefix: Vec<String> = spec
            .parent
            .iter()
            .map(|column| parent.cell(&column.field).unwrap_or_default())
            .collect();

        let children = parent
            .join_key()
            .and_then(|key| children_by_parent.get(key))
            .map(Vec::as_slice)
            .unwrap_or_default();

        if children.is_empty() {
            let mut row = prefix;
            row.extend(spec.child.iter().map(|_| PLACEHOLDER.to_string()));
            table.rows.push(row);
            continue;
        }

        for child in children {
            let mut row = prefix.clone();
            row.extend(
                spec.child
                    .iter()
                    .map(|column| child.cell(&column.field).unwrap_or_default()),
            );
            table.rows.push(row);
        }
    }

    table
}

/// Groups children under their parent key, keeping input order within each
/// group. Children without a parent reference are dropped.
pub fn group_children<C: Record>(children: impl IntoIterator<Item = C>) -> BTreeMap<String, Vec<C>> {
    let mut groups: BTreeMap<String, Vec<C>> = BTreeMap::new();
    for child in children {
        let Some(key) = child.join_key().map(str::to_string) else {
            continue;
        };
        groups.entry(key).or_default().push(child);
    }
    groups
}

/// Builds a table from raw JSON objects. The header is the union of object
/// keys in first-seen order; records missing a key get an empty cell.
pub fn tabulate(sheet_name: &str, records: &[Value]) -> SheetTable {
    let mut columns: Vec<String> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut objects = Vec::with_capacity(records.len());

    for record in records {
        let Some(object) = record.as_object() else {
            warn!(sheet = sheet_name, "skipping non-object record");
            continue;
        };
        for key in object.keys() {
            if seen.insert(key.as_str()) {
                columns.push(key.clone());
            }
        }
        objects.push(object);
    }

    let rows = objects
        .into_iter()
        .map(|object| {
            columns
                .iter()
                .map(|column| object.get(column).map(cell_text).unwrap_or_default())
                .collect()
        })
        .collect();

    SheetTable {
        sheet_name: sheet_name.to_string(),
        columns,
        rows,
    }
}

#[derive(Debug, Default)]
struct SheetNameRegistry {
    used: HashSet<String>,
}

impl SheetNameRegistry {
    fn claim(&mut self, name: String) {
        self.used.insert(name.to_lowercase());
    }

    fn assign(&mut self, raw: &str) -> String {
        let base = sanitize_sheet_name(raw);
        if self.used.insert(base.to_lowercase()) {
            return base;
        }

        let mut counter = 1;
        loop {
            let suffix = format!("_{counter}");
            let prefix: String = base
                .chars()
                .take(MAX_SHEET_NAME - suffix.len())
                .collect();
            let candidate = format!("{prefix}{suffix}");
            if self.used.insert(candidate.to_lowercase()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Replaces characters Excel rejects in sheet names and enforces the length
/// limit.
pub fn sanitize_sheet_name(raw: &str) -> String {
    let invalid = [':', '\\', '/', '?', '*', '[', ']', '\'', '"'];
    let sanitized: String = raw
        .chars()
        .map(|ch| {
            if invalid.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();

    let sanitized = sanitized.trim();
    if sanitized.is_empty() {
        return "Sheet".to_string();
    }
    sanitized.chars().take(MAX_SHEET_NAME).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::{Milestone, Project};

    fn example_spec() -> ColumnSpec {
        ColumnSpec {
            parent: vec![Column::new("id", "id"), Column::new("name", "name")],
            child: vec![Column::new("milestone", "name"), Column::new("due", "due")],
        }
    }

    #[test]
    fn single_child_row_matches_example() {
        let parents = vec![json!({"id": "P1", "name": "Alpha"})];
        let children = BTreeMap::from([(
            "P1".to_string(),
            vec![json!({"name": "M1", "due": "2025-01-01"})],
        )]);

        let table = flatten("Milestones", &parents, &children, &example_spec());

        assert_eq!(table.columns, vec!["id", "name", "milestone", "due"]);
        assert_eq!(table.rows, vec![vec!["P1", "Alpha", "M1", "2025-01-01"]]);
    }

    #[test]
    fn childless_parent_gets_placeholder_row() {
        let parents = vec![json!({"id": "P2"})];
        let children: BTreeMap<String, Vec<Value>> = BTreeMap::new();

        let table = flatten("Milestones", &parents, &children, &example_spec());

        assert_eq!(table.rows, vec![vec!["P2", "", "N/A", "N/A"]]);
    }

    #[test]
    fn parent_prefix_repeats_for_every_child() {
        let parents = vec![
            json!({"id": "P1", "name": "Alpha"}),
            json!({"id": "P3", "name": "Gamma"}),
        ];
        let children = BTreeMap::from([
            (
                "P1".to_string(),
                vec![
                    json!({"name": "M1", "due": "2025-01-01"}),
                    json!({"name": "M2"}),
                    json!({"name": "M3", "due": "2025-06-30"}),
                ],
            ),
            ("orphan".to_string(), vec![json!({"name": "lost"})]),
        ]);

        let table = flatten("Milestones", &parents, &children, &example_spec());

        assert_eq!(table.rows.len(), 4);
        for row in &table.rows[..3] {
            assert_eq!(&row[..2], &["P1".to_string(), "Alpha".to_string()]);
        }
        assert_eq!(table.rows[1][3], "");
        assert_eq!(table.rows[3], vec!["P3", "Gamma", "N/A", "N/A"]);
        assert!(table.rows.iter().all(|row| row.len() == table.columns.len()));
        assert!(!table.rows.iter().flatten().any(|cell| cell == "lost"));
    }

    #[test]
    fn groups_typed_children_by_parent_reference() {
        let milestones = vec![
            Milestone {
                name: "A".into(),
                project_id: Some("p1".into()),
                ..Milestone::default()
            },
            Milestone {
                name: "B".into(),
                project_id: None,
                ..Milestone::default()
            },
            Milestone {
                name: "C".into(),
                project_id: Some("p1".into()),
                ..Milestone::default()
            },
        ];
        let groups = group_children(milestones);
        assert_eq!(groups.len(), 1);
        let names: Vec<&str> = groups["p1"].iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);

        let parents = vec![Project {
            id: "p1".into(),
            name: "Platform".into(),
            ..Project::default()
        }];
        let spec = ColumnSpec {
            parent: vec![Column::new("project", "name")],
            child: vec![
                Column::new("milestone", "name"),
                Column::new("completed", "completed"),
            ],
        };
        let table = flatten("Typed", &parents, &groups, &spec);
        assert_eq!(
            table.rows,
            vec![
                vec!["Platform", "A", "false"],
                vec!["Platform", "C", "false"]
            ]
        );
    }

    #[test]
    fn tabulate_unions_keys_in_first_seen_order() {
        let records = vec![
            json!({"projectId": "a", "name": "One", "tags": ["x"]}),
            json!("not an object"),
            json!({"projectId": "b", "budget": 10, "name": null}),
        ];

        let table = tabulate("Projects", &records);

        assert_eq!(table.columns, vec!["projectId", "name", "tags", "budget"]);
        assert_eq!(
            table.rows,
            vec![
                vec!["a", "One", r#"["x"]"#, ""],
                vec!["b", "", "", "10"],
            ]
        );
    }

    #[test]
    fn tabulate_empty_input_has_no_columns() {
        let table = tabulate("Financials", &[]);
        assert!(table.columns.is_empty());
        assert!(table.rows.is_empty());
    }

    #[test]
    fn sheet_names_are_sanitised_and_deduplicated() {
        let mut workbook = WorkbookData::default();
        workbook.push(SheetTable::new("Projects", vec![]));
        workbook.push(SheetTable::new("projects", vec![]));
        workbook.push(SheetTable::new("Q1/Q2: [plan]", vec![]));
        workbook.push(SheetTable::new("A".repeat(40), vec![]));
        workbook.push(SheetTable::new("A".repeat(35), vec![]));

        let names: Vec<&str> = workbook
            .tables
            .iter()
            .map(|table| table.sheet_name.as_str())
            .collect();
        assert_eq!(names[0], "Projects");
        assert_eq!(names[1], "projects_1");
        assert_eq!(names[2], "Q1_Q2_ _plan_");
        assert_eq!(names[3].len(), 31);
        assert_eq!(names[4], format!("{}_1", "A".repeat(29)));
        assert!(workbook.table("Projects").is_some());
    }

    #[test]
    fn grid_starts_with_header() {
        let mut table = SheetTable::new("T", vec!["a".into(), "b".into()]);
        table.rows.push(vec!["1".into(), "2".into()]);
        assert_eq!(table.to_grid(), vec![vec!["a", "b"], vec!["1", "2"]]);
    }
}
