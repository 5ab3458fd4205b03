use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Identifier of a project as reported by either API. Numeric identifiers are
/// kept in their textual form so they can be compared across services.
pub type ProjectId = String;

/// A record that can contribute cells to a flattened table.
pub trait Record {
    /// Key used to join child records onto this record.
    fn join_key(&self) -> Option<&str>;

    /// Textual cell value for the named field, if the record has one.
    fn cell(&self, field: &str) -> Option<String>;
}

/// Project as returned by the portfolio or task API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(alias = "projectId", alias = "gid", deserialize_with = "text_or_number")]
    pub id: ProjectId,
    #[serde(default, alias = "projectName")]
    pub name: String,
    /// Portfolio key. Task-API projects receive it from their mapping field.
    #[serde(default, alias = "projectKey")]
    pub key: Option<String>,
    #[serde(default, alias = "startDate", alias = "start_on")]
    pub start: Option<String>,
    #[serde(default, alias = "finishDate", alias = "due_on")]
    pub finish: Option<String>,
    #[serde(default, alias = "permalink_url")]
    pub url: Option<String>,
    #[serde(
        default,
        alias = "customFields",
        deserialize_with = "custom_field_values"
    )]
    pub custom_fields: BTreeMap<String, String>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
}

impl Project {
    /// Decodes a project from a raw API record.
    pub fn from_value(value: &Value) -> serde_json::Result<Self> {
        Project::deserialize(value)
    }

    /// Copies the named custom field into [`Project::key`] when the project
    /// does not already carry a key.
    pub fn assign_key_from(&mut self, field: &str) {
        if self.key.is_some() {
            return;
        }
        self.key = self
            .custom_fields
            .get(field)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
    }
}

impl Record for Project {
    fn join_key(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn cell(&self, field: &str) -> Option<String> {
        match field {
            "id" => Some(self.id.clone()),
            "name" => Some(self.name.clone()),
            "key" => self.key.clone(),
            "start" => self.start.clone(),
            "finish" => self.finish.clone(),
            "url" => self.url.clone(),
            "milestone_count" => Some(self.milestones.len().to_string()),
            other => self.custom_fields.get(other).cloned(),
        }
    }
}

/// Milestone belonging to a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    #[serde(
        default,
        alias = "milestoneId",
        alias = "gid",
        deserialize_with = "text_or_number"
    )]
    pub id: String,
    #[serde(default, alias = "milestoneName")]
    pub name: String,
    #[serde(default, alias = "due_on", alias = "dueDate", alias = "date")]
    pub due: Option<String>,
    #[serde(default, alias = "done")]
    pub completed: bool,
    #[serde(default, alias = "permalink_url")]
    pub url: Option<String>,
    /// Parent project reference, by identifier only.
    #[serde(default, alias = "projectId")]
    pub project_id: Option<ProjectId>,
}

impl Milestone {
    /// Decodes a milestone from a raw API record.
    pub fn from_value(value: &Value) -> serde_json::Result<Self> {
        Milestone::deserialize(value)
    }
}

impl Record for Milestone {
    fn join_key(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    fn cell(&self, field: &str) -> Option<String> {
        match field {
            "id" => Some(self.id.clone()),
            "name" => Some(self.name.clone()),
            "due" => self.due.clone(),
            "completed" => Some(self.completed.to_string()),
            "url" => self.url.clone(),
            "project_id" => self.project_id.clone(),
            _ => None,
        }
    }
}

/// Raw JSON objects act as records keyed by their `id` member.
#[cfg(test)]
impl Record for Value {
    fn join_key(&self) -> Option<&str> {
        self.get("id").and_then(Value::as_str)
    }

    fn cell(&self, field: &str) -> Option<String> {
        self.get(field).map(cell_text)
    }
}

/// Renders a JSON value as spreadsheet text: strings verbatim, `null` empty,
/// nested values as compact JSON.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        nested => nested.to_string(),
    }
}

fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Identifier {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Identifier::deserialize(deserializer)? {
        Identifier::Text(text) => text,
        Identifier::Number(number) => number.to_string(),
    })
}

/// Custom fields arrive either as a list of field objects (task API) or as a
/// plain name -> value object.
#[derive(Deserialize)]
#[serde(untagged)]
enum CustomFieldsBody {
    List(Vec<Option<CustomFieldEntry>>),
    Map(BTreeMap<String, Value>),
    Null(()),
}

#[derive(Deserialize)]
struct CustomFieldEntry {
    name: Option<String>,
    text_value: Option<Value>,
    display_value: Option<Value>,
    number_value: Option<Value>,
}

impl CustomFieldEntry {
    fn into_pair(self) -> Option<(String, String)> {
        let name = self.name?;
        let value = [self.text_value, self.display_value, self.number_value]
            .into_iter()
            .flatten()
            .find(|value| !value.is_null())
            .map(|value| cell_text(&value))
            .unwrap_or_default();
        Some((name, value))
    }
}

fn custom_field_values<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match CustomFieldsBody::deserialize(deserializer)? {
        CustomFieldsBody::List(entries) => entries
            .into_iter()
            .flatten()
            .filter_map(CustomFieldEntry::into_pair)
            .collect(),
        CustomFieldsBody::Map(map) => map
            .into_iter()
            .map(|(name, value)| (name, cell_text(&value)))
            .collect(),
        CustomFieldsBody::Null(()) => BTreeMap::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_task_project_with_custom_field_list() {
        let raw = json!({
            "gid": "1201",
            "name": "Website relaunch",
            "permalink_url": "https://tasks.example.com/1201",
            "custom_fields": [
                null,
                {"name": "MP Mapping", "text_value": "WEB-01", "display_value": "WEB-01"},
                {"name": "Budget", "number_value": 1200, "display_value": null}
            ]
        });

        let mut project = Project::from_value(&raw).unwrap();
        project.assign_key_from("MP Mapping");

        assert_eq!(project.id, "1201");
        assert_eq!(project.key.as_deref(), Some("WEB-01"));
        assert_eq!(project.custom_fields["Budget"], "1200");
        assert_eq!(project.cell("url").as_deref(), Some("https://tasks.example.com/1201"));
    }

    #[test]
    fn decodes_portfolio_project_aliases() {
        let raw = json!({
            "projectId": "a1b2",
            "projectName": "Data platform",
            "projectKey": "DP-7",
            "startDate": "2025-01-06",
            "finishDate": "2025-09-30",
            "customFields": {"Owner": "R. Diaz", "Priority": 2}
        });

        let project = Project::from_value(&raw).unwrap();
        assert_eq!(project.name, "Data platform");
        assert_eq!(project.cell("key").as_deref(), Some("DP-7"));
        assert_eq!(project.cell("start").as_deref(), Some("2025-01-06"));
        assert_eq!(project.cell("Priority").as_deref(), Some("2"));
        assert_eq!(project.cell("missing"), None);
    }

    #[test]
    fn numeric_identifiers_become_text() {
        let project = Project::from_value(&json!({"id": 42})).unwrap();
        assert_eq!(project.id, "42");
        assert_eq!(project.name, "");
    }

    #[test]
    fn existing_key_is_not_overwritten() {
        let mut project = Project {
            id: "p".into(),
            key: Some("KEEP".into()),
            ..Project::default()
        };
        project.custom_fields.insert("MP Mapping".into(), "OTHER".into());
        project.assign_key_from("MP Mapping");
        assert_eq!(project.key.as_deref(), Some("KEEP"));
    }

    #[test]
    fn blank_mapping_field_leaves_key_empty() {
        let raw = json!({"gid": "9", "custom_fields": [{"name": "MP Mapping", "text_value": "  "}]});
        let mut project = Project::from_value(&raw).unwrap();
        project.assign_key_from("MP Mapping");
        assert_eq!(project.key, None);
    }

    #[test]
    fn decodes_milestone_from_either_shape() {
        let task = Milestone::from_value(&json!({
            "gid": "77",
            "name": "Go live",
            "due_on": "2025-03-01",
            "completed": true
        }))
        .unwrap();
        assert_eq!(task.cell("completed").as_deref(), Some("true"));
        assert_eq!(task.join_key(), None);

        let portfolio = Milestone::from_value(&json!({
            "milestoneId": "m-1",
            "milestoneName": "Kickoff",
            "date": "2025-01-10",
            "projectId": "a1b2"
        }))
        .unwrap();
        assert_eq!(portfolio.due.as_deref(), Some("2025-01-10"));
        assert_eq!(portfolio.join_key(), Some("a1b2"));
        assert!(!portfolio.completed);
    }

    #[test]
    fn json_cells_render_nested_values_compactly() {
        let record = json!({"id": "x", "tags": ["a", "b"], "note": null, "hours": 7.5});
        assert_eq!(record.cell("tags").as_deref(), Some(r#"["a","b"]"#));
        assert_eq!(record.cell("note").as_deref(), Some(""));
        assert_eq!(record.cell("hours").as_deref(), Some("7.5"));
        assert_eq!(record.join_key(), Some("x"));
    }
}
