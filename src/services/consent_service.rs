//! Consent decision payloads and the donation serializer

use crate::core::{Table, TableId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ConsentError {
    #[error("table '{table}' row '{row}' has {found} cells, head has {expected}")]
    ShapeMismatch {
        table: TableId,
        row: String,
        expected: usize,
        found: usize,
    },
    #[error("failed to encode consent payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Value handed to the resolve callback when the participant decides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "__type__")]
pub enum Payload {
    PayloadTrue,
    PayloadFalse,
    #[serde(rename = "PayloadJSON")]
    PayloadJson { value: String },
}

/// Service for turning reviewed tables into a donation
pub struct ConsentService;

impl ConsentService {
    /// Encode every table's visible rows followed by one omission record per table
    pub fn serialize(tables: &[Table]) -> Result<JsonValue, ConsentError> {
        let mut entries = Vec::with_capacity(tables.len() * 2);
        for table in tables {
            entries.push(Self::table_entry(table)?);
        }
        for table in tables {
            entries.push(json!({
                "user_omissions": {
                    "table": table.id,
                    "summary": Self::omission_summary(table),
                }
            }));
        }
        Ok(JsonValue::Array(entries))
    }

    fn table_entry(table: &Table) -> Result<JsonValue, ConsentError> {
        let head = table.head();
        let rows = table
            .body()
            .iter()
            .map(|row| {
                if row.cells.len() != head.len() {
                    return Err(ConsentError::ShapeMismatch {
                        table: table.id.clone(),
                        row: row.id.to_string(),
                        expected: head.len(),
                        found: row.cells.len(),
                    });
                }
                let record: Map<String, JsonValue> = head
                    .iter()
                    .zip(&row.cells)
                    .map(|(column, cell)| (column.clone(), JsonValue::String(cell.clone())))
                    .collect();
                Ok(JsonValue::Object(record))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut entry = Map::new();
        entry.insert(table.id.to_string(), JsonValue::Array(rows));
        Ok(JsonValue::Object(entry))
    }

    pub fn omission_summary(table: &Table) -> String {
        format!(
            "Deleted {} of {} rows",
            table.deleted_row_count(),
            table.original_body().len()
        )
    }

    /// Serialize `tables` and resolve with `PayloadJSON`
    ///
    /// On a shape mismatch nothing is donated and `resolve` is not called.
    pub fn donate(tables: &[Table], resolve: impl FnOnce(Payload)) -> Result<(), ConsentError> {
        let value = match Self::serialize(tables).and_then(|v| Ok(serde_json::to_string(&v)?)) {
            Ok(value) => value,
            Err(e) => {
                error!("Refusing to donate: {e}");
                return Err(e);
            }
        };
        info!(tables = tables.len(), bytes = value.len(), "Data donated");
        resolve(Payload::PayloadJson { value });
        Ok(())
    }

    pub fn decline(resolve: impl FnOnce(Payload)) {
        info!("Donation declined");
        resolve(Payload::PayloadFalse);
    }
}
