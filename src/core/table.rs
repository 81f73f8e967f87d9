//! Consent tables: immutable parsed rows plus the redaction ledger

use crate::core::types::{RowId, TableId, Translatable};
use crate::core::visualization::{VisualizationDescriptor, VisualizationError};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("data frame must be a JSON object of columns, got {0}")]
    NotAnObject(&'static str),
    #[error("column '{0}' must be an object of row values")]
    InvalidColumn(String),
    #[error("column '{column}' has no value for row '{row}'")]
    MissingCell { column: String, row: String },
    #[error("column '{column}' has {found} rows, expected {expected}")]
    RaggedColumn {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error("data frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Visualization(#[from] VisualizationError),
}

/// A single extracted record. Never mutated after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: RowId,
    pub cells: Vec<String>,
}

impl Row {
    pub fn new(id: impl Into<RowId>, cells: Vec<String>) -> Self {
        Self {
            id: id.into(),
            cells,
        }
    }
}

/// Snapshot of one consent table
///
/// `body` is always `original_body` minus every id in `deleted_rows`, in
/// original order. Snapshots are cheap to clone: the head, the original rows
/// and the visualizations are shared.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub id: TableId,
    pub title: Translatable,
    pub description: Option<Translatable>,
    head: Arc<Vec<String>>,
    original_body: Arc<Vec<Row>>,
    pub(crate) body: Vec<Row>,
    pub(crate) deleted_rows: Vec<BTreeSet<RowId>>,
    pub(crate) deleted_row_count: usize,
    visualizations: Arc<Vec<VisualizationDescriptor>>,
}

impl Table {
    pub fn new(id: impl Into<TableId>, title: Translatable, head: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            id: id.into(),
            title,
            description: None,
            head: Arc::new(head),
            body: rows.clone(),
            original_body: Arc::new(rows),
            deleted_rows: Vec::new(),
            deleted_row_count: 0,
            visualizations: Arc::new(Vec::new()),
        }
    }

    pub fn with_visualizations(mut self, visualizations: Vec<VisualizationDescriptor>) -> Self {
        self.visualizations = Arc::new(visualizations);
        self
    }

    /// Parse a pandas `orient="columns"` frame: `{column: {row_key: value}}`
    pub fn from_data_frame(
        id: impl Into<TableId>,
        title: Translatable,
        frame: &JsonValue,
    ) -> Result<Self, TableError> {
        let (head, rows) = parse_data_frame(frame)?;
        Ok(Self::new(id, title, head, rows))
    }

    /// Build a table from its source document
    pub fn from_source(source: TableSource) -> Result<Self, TableError> {
        let frame = match source.data_frame {
            // Extraction scripts usually hand over `df.to_json()` as a string
            JsonValue::String(encoded) => serde_json::from_str(&encoded)?,
            other => other,
        };
        let visualizations = source
            .visualizations
            .iter()
            .map(VisualizationDescriptor::from_json)
            .collect::<Result<Vec<_>, _>>()?;

        let mut table = Self::from_data_frame(source.id, source.title, &frame)?
            .with_visualizations(visualizations);
        table.description = source.description;
        debug!(
            table = %table.id,
            rows = table.original_body.len(),
            columns = table.head.len(),
            "Parsed consent table"
        );
        Ok(table)
    }

    pub fn head(&self) -> &[String] {
        &self.head
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.head.iter().position(|c| c == column)
    }

    pub fn original_body(&self) -> &[Row] {
        &self.original_body
    }

    /// Currently visible (not redacted) rows
    pub fn body(&self) -> &[Row] {
        &self.body
    }

    pub fn deleted_rows(&self) -> &[BTreeSet<RowId>] {
        &self.deleted_rows
    }

    pub fn deleted_row_count(&self) -> usize {
        self.deleted_row_count
    }

    pub fn visualizations(&self) -> &[VisualizationDescriptor] {
        &self.visualizations
    }

    /// A ledger-free table whose rows are exactly `rows`
    ///
    /// Used to hand the post-redaction, post-search view to the visualization
    /// worker without exposing the ledger.
    pub fn visible_snapshot(&self, rows: Vec<Row>) -> Table {
        Table {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            head: Arc::clone(&self.head),
            body: rows.clone(),
            original_body: Arc::new(rows),
            deleted_rows: Vec::new(),
            deleted_row_count: 0,
            visualizations: Arc::clone(&self.visualizations),
        }
    }

    /// Recompute `body` and `deleted_row_count` from the ledger
    pub(crate) fn rebuild_body(mut self) -> Self {
        let deleted: HashSet<&RowId> = self.deleted_rows.iter().flatten().collect();
        self.body = self
            .original_body
            .iter()
            .filter(|row| !deleted.contains(&row.id))
            .cloned()
            .collect();
        self.deleted_row_count = self.original_body.len() - self.body.len();
        self
    }
}

/// Source document of a consent table as produced by the extraction step
#[derive(Debug, Clone, Deserialize)]
pub struct TableSource {
    pub id: TableId,
    #[serde(default)]
    pub title: Translatable,
    #[serde(default)]
    pub description: Option<Translatable>,
    #[serde(alias = "dataFrame")]
    pub data_frame: JsonValue,
    #[serde(default)]
    pub visualizations: Vec<JsonValue>,
}

fn parse_data_frame(frame: &JsonValue) -> Result<(Vec<String>, Vec<Row>), TableError> {
    let columns = match frame {
        JsonValue::Object(columns) => columns,
        JsonValue::Array(_) => return Err(TableError::NotAnObject("an array")),
        JsonValue::String(_) => return Err(TableError::NotAnObject("a string")),
        JsonValue::Number(_) => return Err(TableError::NotAnObject("a number")),
        JsonValue::Bool(_) => return Err(TableError::NotAnObject("a boolean")),
        JsonValue::Null => return Err(TableError::NotAnObject("null")),
    };

    let head: Vec<String> = columns.keys().cloned().collect();
    let mut column_values = Vec::with_capacity(columns.len());
    for (name, values) in columns {
        match values {
            JsonValue::Object(values) => column_values.push((name, values)),
            _ => return Err(TableError::InvalidColumn(name.clone())),
        }
    }

    // Row order and identity come from the first column's index keys
    let Some((_, first)) = column_values.first() else {
        return Ok((head, Vec::new()));
    };
    let row_keys: Vec<&String> = first.keys().collect();

    for (name, values) in &column_values {
        if values.len() != row_keys.len() {
            return Err(TableError::RaggedColumn {
                column: (*name).clone(),
                expected: row_keys.len(),
                found: values.len(),
            });
        }
    }

    let mut rows = Vec::with_capacity(row_keys.len());
    for key in row_keys {
        let mut cells = Vec::with_capacity(column_values.len());
        for (name, values) in &column_values {
            let value = values.get(key).ok_or_else(|| TableError::MissingCell {
                column: (*name).clone(),
                row: key.clone(),
            })?;
            cells.push(cell_text(value));
        }
        rows.push(Row::new(key.as_str(), cells));
    }

    Ok((head, rows))
}

fn cell_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn frame() -> JsonValue {
        json!({
            "data_type": {"0": "facebook_comment", "1": "facebook_reaction"},
            "Date": {"0": "2023-01-05 10:00:00", "1": null},
            "Count": {"0": 1, "1": 1}
        })
    }

    #[test]
    fn test_parse_data_frame_preserves_order() {
        let table = Table::from_data_frame("fb", Translatable::new(), &frame()).unwrap();

        assert_eq!(table.head(), &["data_type", "Date", "Count"]);
        assert_eq!(
            table.body(),
            &[
                Row::new("0", vec!["facebook_comment".into(), "2023-01-05 10:00:00".into(), "1".into()]),
                Row::new("1", vec!["facebook_reaction".into(), "".into(), "1".into()]),
            ]
        );
        assert_eq!(table.deleted_row_count(), 0);
    }

    #[test]
    fn test_parse_rejects_ragged_frame() {
        let ragged = json!({
            "a": {"0": "x", "1": "y"},
            "b": {"0": "z"}
        });
        let err = Table::from_data_frame("t", Translatable::new(), &ragged).unwrap_err();
        assert!(matches!(err, TableError::RaggedColumn { expected: 2, found: 1, .. }));

        let mismatched = json!({
            "a": {"0": "x"},
            "b": {"7": "z"}
        });
        let err = Table::from_data_frame("t", Translatable::new(), &mismatched).unwrap_err();
        assert!(matches!(err, TableError::MissingCell { .. }));
    }

    #[test]
    fn test_parse_rejects_non_object() {
        let err = Table::from_data_frame("t", Translatable::new(), &json!([1, 2])).unwrap_err();
        assert!(matches!(err, TableError::NotAnObject("an array")));
    }

    #[test]
    fn test_from_source_accepts_encoded_frame() {
        let source: TableSource = serde_json::from_value(json!({
            "id": "facebook_all_data",
            "title": {"en": "Facebook Activity Data", "nl": "Facebook Gegevens"},
            "data_frame": frame().to_string(),
            "visualizations": [
                {"type": "line", "group": {"column": "Date", "dateFormat": "auto"}, "values": [{"column": "Date"}]}
            ]
        }))
        .unwrap();

        let table = Table::from_source(source).unwrap();
        assert_eq!(table.title.text("nl"), "Facebook Gegevens");
        assert_eq!(table.body().len(), 2);
        assert_eq!(table.visualizations().len(), 1);
    }

    #[test]
    fn test_from_source_rejects_unknown_visualization() {
        let source: TableSource = serde_json::from_value(json!({
            "id": "t",
            "data_frame": frame(),
            "visualizations": [{"type": "pie"}]
        }))
        .unwrap();

        let err = Table::from_source(source).unwrap_err();
        assert!(matches!(
            err,
            TableError::Visualization(VisualizationError::Unsupported(ref tag)) if tag == "pie"
        ));
    }

    #[test]
    fn test_visible_snapshot_has_no_ledger() {
        let table = Table::from_data_frame("fb", Translatable::new(), &frame()).unwrap();
        let snapshot = table.visible_snapshot(vec![table.body()[1].clone()]);

        assert_eq!(snapshot.body().len(), 1);
        assert_eq!(snapshot.original_body().len(), 1);
        assert!(snapshot.deleted_rows().is_empty());
        assert_eq!(snapshot.head(), table.head());
    }
}
