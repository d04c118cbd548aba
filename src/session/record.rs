use crate::core::{Column, DataType, DbError, Result, Row, Value};
use crate::storage::TableSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Columns of the mapped table, in storage order
pub const COLUMNS: [&str; 3] = ["id", "name", "created_by"];

/// One row of the mapped table.
///
/// `id` stays `None` until the record is flushed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    pub id: Option<i64>,
    pub name: String,
    pub created_by: Option<String>,
}

impl Record {
    pub fn new(name: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            created_by: Some(created_by.into()),
        }
    }

    /// Record without a `created_by` value
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            created_by: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn is_transient(&self) -> bool {
        self.id.is_none()
    }

    /// Build from a row laid out as [`COLUMNS`]
    pub fn from_row(row: &Row) -> Result<Self> {
        let [id, name, created_by] = row.as_slice() else {
            return Err(DbError::ExecutionError(format!(
                "expected {} columns for a record, got {}",
                COLUMNS.len(),
                row.len()
            )));
        };

        let id = id.as_i64().ok_or_else(|| {
            DbError::TypeMismatch(format!("record id must be INTEGER, got {}", id.type_name()))
        })?;
        let name = name.as_str().ok_or_else(|| {
            DbError::TypeMismatch(format!("record name must be TEXT, got {}", name.type_name()))
        })?;
        let created_by = match created_by {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            other => {
                return Err(DbError::TypeMismatch(format!(
                    "record created_by must be TEXT, got {}",
                    other.type_name()
                )));
            }
        };

        Ok(Self {
            id: Some(id),
            name: name.to_string(),
            created_by,
        })
    }

    /// Schema of the mapped table: `id` primary key, NOT NULL `name`,
    /// nullable `created_by`, and `(name, created_by)` unique.
    pub fn table_schema(table: &str) -> TableSchema {
        TableSchema::new(
            table,
            vec![
                Column::new(COLUMNS[0], DataType::Integer).primary_key(),
                Column::new(COLUMNS[1], DataType::Text).not_null(),
                Column::new(COLUMNS[2], DataType::Text),
            ],
        )
        .with_unique(format!("{}_name_created_by_uc", table), &[COLUMNS[1], COLUMNS[2]])
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.id.map(|id| id.to_string()).unwrap_or_else(|| "None".into());
        write!(
            f,
            "<Record (id={}, name=\"{}\", created_by=\"{}\")>",
            id,
            self.name,
            self.created_by.as_deref().unwrap_or("None")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_row() {
        let row = vec![Value::Integer(1), Value::from("name-default"), Value::Null];
        let record = Record::from_row(&row).unwrap();
        assert_eq!(record, Record::named("name-default").with_id(1));

        assert!(Record::from_row(&vec![Value::Integer(1)]).is_err());
        assert!(Record::from_row(&vec![Value::from("x"), Value::from("a"), Value::Null]).is_err());
    }

    #[test]
    fn test_display() {
        let record = Record::new("a", "u").with_id(3);
        assert_eq!(record.to_string(), "<Record (id=3, name=\"a\", created_by=\"u\")>");
        assert!(Record::named("b").to_string().contains("id=None"));
    }

    #[test]
    fn test_table_schema() {
        let schema = Record::table_schema("thing");
        assert!(schema.validate().is_ok());
        assert_eq!(schema.unique_constraints()[0].name, "thing_name_created_by_uc");
        assert_eq!(schema.schema().column_names(), COLUMNS.to_vec());
    }
}
