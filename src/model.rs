// Wire types for the Power BI REST API.

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// A workspace (a "group" in the REST API). Every field is optional on the
/// wire and falls back to an empty string or `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub description: String,
    pub capacity_id: String,
    pub dataflow_storage_id: String,
    pub workspace_type: String,
    pub is_on_dedicated_capacity: bool,
    pub is_read_only: bool,
    pub is_orphaned: bool,
    pub state: String,
}

impl Workspace {
    /// Project one element of a workspace listing. Fields are checked one at
    /// a time: an absent, `null` or mistyped field takes its default and the
    /// rest of the record is kept. Only a non-object element is an error.
    pub fn from_value(value: &Value, path: &str) -> Result<Self, DecodeError> {
        let Value::Object(record) = value else {
            return Err(DecodeError::InvalidField {
                path: path.to_string(),
                reason: format!("expected an object, found {}", kind_of(value)),
            });
        };
        let text = |key: &str| text_field(record, path, key);
        let flag = |key: &str| flag_field(record, path, key);
        Ok(Workspace {
            id: text("id"),
            name: text("name"),
            description: text("description"),
            capacity_id: text("capacityId"),
            dataflow_storage_id: text("dataflowStorageId"),
            workspace_type: text("type"),
            is_on_dedicated_capacity: flag("isOnDedicatedCapacity"),
            is_read_only: flag("isReadOnly"),
            is_orphaned: flag("isOrphaned"),
            state: text("state"),
        })
    }
}

fn text_field(record: &Map<String, Value>, path: &str, key: &str) -> String {
    match record.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => {
            warn!(record = path, field = key, found = kind_of(other), "ignoring mistyped field");
            String::new()
        }
    }
}

fn flag_field(record: &Map<String, Value>, path: &str, key: &str) -> bool {
    match record.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(other) => {
            warn!(record = path, field = key, found = kind_of(other), "ignoring mistyped field");
            false
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    pub id: String,
    pub name: String,
}

impl Dataset {
    /// Project one element of a dataset listing. `path` names the element in
    /// error messages.
    pub fn from_value(value: &Value, path: &str) -> Result<Self, DecodeError> {
        let id = match value.get("id") {
            None | Some(Value::Null) => {
                return Err(DecodeError::MissingField(format!("{path}.id")));
            }
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(other) => {
                return Err(DecodeError::InvalidField {
                    path: format!("{path}.id"),
                    reason: format!("expected a non-empty string, found {}", kind_of(other)),
                });
            }
        };
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(Dataset { id, name })
    }
}

/// Column types accepted by push datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Int64,
    Double,
    Decimal,
    #[serde(alias = "bool")]
    Boolean,
    #[serde(alias = "Datetime")]
    DateTime,
    #[serde(alias = "string")]
    String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: DataType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        TableSchema {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(ColumnSchema {
            name: name.into(),
            data_type,
        });
        self
    }
}

/// Body of a dataset creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSchema {
    pub name: String,
    pub tables: Vec<TableSchema>,
}

impl DatasetSchema {
    pub fn new(name: impl Into<String>) -> Self {
        DatasetSchema {
            name: name.into(),
            tables: Vec::new(),
        }
    }

    pub fn table(mut self, table: TableSchema) -> Self {
        self.tables.push(table);
        self
    }

    pub fn from_json(text: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// One row: column name to scalar value.
pub type Row = Map<String, Value>;

/// Rows sent in one append request, in order. Serialises as
/// `{"rows": [...]}` with column order and number text as they were read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowBatch {
    rows: Vec<Row>,
}

impl RowBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row. Nested arrays and objects are rejected; `null` is kept.
    pub fn push(&mut self, row: Row) -> Result<(), DecodeError> {
        for (column, value) in &row {
            if matches!(value, Value::Array(_) | Value::Object(_)) {
                return Err(DecodeError::UnsupportedValue {
                    column: column.clone(),
                    kind: kind_of(value),
                });
            }
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn from_rows(rows: impl IntoIterator<Item = Row>) -> Result<Self, DecodeError> {
        let mut batch = Self::new();
        for row in rows {
            batch.push(row)?;
        }
        Ok(batch)
    }

    /// Accepts either `{"rows": [...]}` or a bare array of row objects.
    pub fn from_json(text: &str) -> Result<Self, DecodeError> {
        let rows = match serde_json::from_str::<Value>(text)? {
            Value::Array(rows) => rows,
            Value::Object(mut doc) => match doc.remove("rows") {
                Some(Value::Array(rows)) => rows,
                None | Some(Value::Null) => {
                    return Err(DecodeError::MissingField("rows".into()));
                }
                Some(other) => {
                    return Err(DecodeError::InvalidField {
                        path: "rows".into(),
                        reason: format!("expected an array, found {}", kind_of(&other)),
                    });
                }
            },
            other => {
                return Err(DecodeError::InvalidField {
                    path: "$".into(),
                    reason: format!("expected an object or array, found {}", kind_of(&other)),
                });
            }
        };

        let mut batch = Self::new();
        for (index, row) in rows.into_iter().enumerate() {
            match row {
                Value::Object(row) => batch.push(row)?,
                other => {
                    return Err(DecodeError::InvalidField {
                        path: format!("rows[{index}]"),
                        reason: format!("expected an object, found {}", kind_of(&other)),
                    });
                }
            }
        }
        Ok(batch)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_body(&self) -> Result<String, DecodeError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A write the service accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub status: u16,
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
