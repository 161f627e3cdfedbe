//! Serializable failure reports
//!
//! A failure tree flattened into one entry per leaf, each with its rendered
//! breadcrumb path. External reporting layers consume this as JSON.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::result::Failure;

/// Flattened view of a failure tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FailureReport {
    /// One entry per leaf failure, in tree order
    pub entries: Vec<ReportEntry>,
}

/// A single leaf failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReportEntry {
    /// Dotted breadcrumb path: "QUERY-PARAMS.ids", "RESPONSE.HEADERS.Header1"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    /// Messages from the outermost context down to the leaf
    pub messages: Vec<String>,
}

impl FailureReport {
    pub fn from_failure(failure: &Failure) -> Self {
        Self {
            entries: failure
                .entries()
                .into_iter()
                .map(|(path, messages)| ReportEntry { path, messages })
                .collect(),
        }
    }

    /// Human-readable text: `>> path` followed by the indented messages.
    pub fn to_text(&self) -> String {
        self.entries
            .iter()
            .map(|entry| {
                let messages = entry
                    .messages
                    .iter()
                    .map(|m| format!("   {m}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                if entry.path.is_empty() {
                    messages
                } else {
                    format!(">> {}\n\n{messages}", entry.path)
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Generate JSON Schema for the report format.
#[must_use]
pub fn generate_report_schema() -> String {
    let schema = schemars::schema_for!(FailureReport);
    serde_json::to_string_pretty(&schema).expect("schema serialization should not fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_failure() -> Failure {
        Failure::new("Expected number, actual was \"abc\" (string)")
            .breadcrumb("ids")
            .breadcrumb("QUERY-PARAMS")
    }

    #[test]
    fn flattens_leaves() {
        let report = FailureReport::from_failure(&Failure::from_failures(vec![
            query_failure(),
            Failure::new("Expected query param named \"id\" was missing").breadcrumb("id"),
        ]));
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[0].path, "QUERY-PARAMS.ids");
        assert_eq!(report.entries[1].path, "id");
    }

    #[test]
    fn renders_text() {
        let report = FailureReport::from_failure(&query_failure());
        insta::assert_snapshot!(
            report.to_text().replace('\n', "|"),
            @r#">> QUERY-PARAMS.ids||   Expected number, actual was "abc" (string)"#
        );
    }

    #[test]
    fn serializes_without_empty_path() {
        let report = FailureReport::from_failure(&Failure::new("boom"));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json, serde_json::json!({"entries": [{"messages": ["boom"]}]}));
    }

    #[test]
    fn schema_generation_produces_valid_json() {
        let schema = generate_report_schema();
        let parsed: serde_json::Value = serde_json::from_str(&schema).unwrap();
        assert_eq!(
            parsed.get("title").and_then(|v| v.as_str()),
            Some("FailureReport")
        );
    }
}
