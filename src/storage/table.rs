use crate::core::{Column, DbError, Result, Row, Schema, UniqueConstraint, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    schema: Schema,
    unique_constraints: Vec<UniqueConstraint>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            schema: Schema::new(columns),
            unique_constraints: Vec::new(),
        }
    }

    pub fn with_unique(mut self, name: impl Into<String>, columns: &[&str]) -> Self {
        self.unique_constraints.push(UniqueConstraint::new(name, columns));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn unique_constraints(&self) -> &[UniqueConstraint] {
        &self.unique_constraints
    }

    /// Checks that the schema is usable as a table definition.
    pub fn validate(&self) -> Result<()> {
        let pk_count = self.schema.columns().iter().filter(|c| c.primary_key).count();
        if pk_count != 1 {
            return Err(DbError::ExecutionError(format!(
                "Table '{}' must declare exactly one primary key column, found {}",
                self.name, pk_count
            )));
        }
        for constraint in &self.unique_constraints {
            for column in &constraint.columns {
                if self.schema.find_column_index(column).is_none() {
                    return Err(DbError::ColumnNotFound(column.clone(), self.name.clone()));
                }
            }
        }
        Ok(())
    }
}

/// Rows keyed by primary key.
///
/// All checks run before any mutation, so a rejected write leaves the
/// table exactly as it was.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    schema: TableSchema,
    rows: BTreeMap<i64, Row>,
    /// Next sequence value, `None` once an id of `i64::MAX` was stored
    next_id: Option<i64>,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            next_id: Some(1),
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    fn pk_index(&self) -> Result<usize> {
        self.schema.schema().primary_key_index().ok_or_else(|| {
            DbError::ExecutionError(format!("Table '{}' has no primary key", self.name()))
        })
    }

    /// Insert a row, assigning the primary key from the sequence when it is NULL.
    ///
    /// The sequence is not transactional: an id handed out to a row that is
    /// later rolled back is never reused.
    pub fn insert(&mut self, mut row: Row) -> Result<i64> {
        let pk = self.pk_index()?;
        if row.len() != self.schema.schema().column_count() {
            return Err(DbError::ExecutionError(format!(
                "Expected {} columns, got {}",
                self.schema.schema().column_count(),
                row.len()
            )));
        }

        if row[pk].is_null() {
            let next = self.next_id.ok_or_else(|| {
                DbError::ExecutionError(format!("sequence of '{}' exhausted", self.name()))
            })?;
            row[pk] = Value::Integer(next);
        }
        self.validate_row(&row)?;

        let id = row[pk].as_i64().ok_or_else(|| {
            DbError::TypeMismatch(format!("Primary key of '{}' must be an integer", self.name()))
        })?;

        if self.rows.contains_key(&id) {
            return Err(DbError::ConstraintViolation(format!(
                "duplicate key value violates unique constraint \"{}_pkey\"\nDETAIL:  Key ({})=({}) already exists.",
                self.name(),
                self.schema.schema().columns()[pk].name,
                id
            )));
        }
        self.check_uniqueness(&row, None)?;

        if self.next_id.is_some_and(|next| id >= next) {
            self.next_id = id.checked_add(1);
        }
        self.rows.insert(id, row);
        Ok(id)
    }

    /// Replace the row stored under `id`, returning the previous version.
    pub fn update(&mut self, id: i64, new_row: Row) -> Result<Row> {
        let pk = self.pk_index()?;
        self.validate_row(&new_row)?;

        if new_row[pk] != Value::Integer(id) {
            return Err(DbError::UnsupportedOperation(format!(
                "Changing the primary key of '{}' is not supported",
                self.name()
            )));
        }
        if !self.rows.contains_key(&id) {
            return Err(DbError::RecordNotFound(self.name().to_string(), id));
        }
        self.check_uniqueness(&new_row, Some(id))?;

        self.rows
            .insert(id, new_row)
            .ok_or_else(|| DbError::RecordNotFound(self.name().to_string(), id))
    }

    pub fn delete(&mut self, id: i64) -> Option<Row> {
        self.rows.remove(&id)
    }

    /// Put a row back without any checks. Used when reverting changes.
    pub fn restore(&mut self, id: i64, row: Row) {
        self.rows.insert(id, row);
    }

    pub fn get(&self, id: i64) -> Option<&Row> {
        self.rows.get(&id)
    }

    pub fn scan(&self) -> Vec<Row> {
        self.rows.values().cloned().collect()
    }

    pub fn scan_with_ids(&self) -> Vec<(i64, Row)> {
        self.rows.iter().map(|(id, row)| (*id, row.clone())).collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn validate_row(&self, row: &Row) -> Result<()> {
        let columns = self.schema.schema().columns();
        if row.len() != columns.len() {
            return Err(DbError::ExecutionError(format!(
                "Expected {} columns, got {}",
                columns.len(),
                row.len()
            )));
        }
        for (column, value) in columns.iter().zip(row.iter()) {
            column.validate(value)?;
        }
        Ok(())
    }

    fn check_uniqueness(&self, row: &Row, ignore_id: Option<i64>) -> Result<()> {
        let schema = self.schema.schema();
        for constraint in self.schema.unique_constraints() {
            let indexes: Vec<usize> = constraint
                .columns
                .iter()
                .map(|name| {
                    schema.find_column_index(name).ok_or_else(|| {
                        DbError::ColumnNotFound(name.clone(), self.name().to_string())
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            // NULLs are distinct, so a key containing NULL never collides.
            if indexes.iter().any(|&i| row[i].is_null()) {
                continue;
            }

            let duplicate = self.rows.iter().any(|(id, existing)| {
                Some(*id) != ignore_id && indexes.iter().all(|&i| existing[i] == row[i])
            });

            if duplicate {
                let values: Vec<String> = indexes.iter().map(|&i| row[i].to_string()).collect();
                return Err(DbError::ConstraintViolation(format!(
                    "duplicate key value violates unique constraint \"{}\"\nDETAIL:  Key ({})=({}) already exists.",
                    constraint.name,
                    constraint.columns.join(", "),
                    values.join(", ")
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;

    fn thing_table() -> Table {
        Table::new(
            TableSchema::new(
                "thing",
                vec![
                    Column::new("id", DataType::Integer).primary_key(),
                    Column::new("name", DataType::Text).not_null(),
                    Column::new("created_by", DataType::Text),
                ],
            )
            .with_unique("thing_name_created_by_uc", &["name", "created_by"]),
        )
    }

    fn row(name: &str, created_by: Option<&str>) -> Row {
        vec![Value::Null, Value::from(name), Value::from(created_by)]
    }

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let mut table = thing_table();
        assert_eq!(table.insert(row("a", Some("u"))).unwrap(), 1);
        assert_eq!(table.insert(row("b", Some("u"))).unwrap(), 2);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_sequence_is_not_reused_after_delete() {
        let mut table = thing_table();
        let id = table.insert(row("a", Some("u"))).unwrap();
        table.delete(id);
        assert_eq!(table.insert(row("a", Some("u"))).unwrap(), id + 1);
    }

    #[test]
    fn test_composite_unique_violation() {
        let mut table = thing_table();
        table.insert(row("a", Some("u"))).unwrap();

        let err = table.insert(row("a", Some("u"))).unwrap_err();
        assert!(err.to_string().contains("duplicate key value"));
        assert!(err.to_string().contains("thing_name_created_by_uc"));
        assert_eq!(table.row_count(), 1);

        // Same name, different author is fine.
        table.insert(row("a", Some("v"))).unwrap();
    }

    #[test]
    fn test_null_never_collides() {
        let mut table = thing_table();
        table.insert(row("a", None)).unwrap();
        table.insert(row("a", None)).unwrap();
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_update_checks_uniqueness_against_other_rows() {
        let mut table = thing_table();
        let first = table.insert(row("a", Some("u"))).unwrap();
        let second = table.insert(row("b", Some("u"))).unwrap();

        let clash = vec![Value::Integer(second), Value::from("a"), Value::from("u")];
        assert!(table.update(second, clash).unwrap_err().is_constraint_violation());

        let same = vec![Value::Integer(first), Value::from("a"), Value::from("u")];
        let old = table.update(first, same).unwrap();
        assert_eq!(old[1], Value::from("a"));
    }

    #[test]
    fn test_explicit_duplicate_primary_key() {
        let mut table = thing_table();
        table.insert(vec![Value::Integer(5), Value::from("a"), Value::Null]).unwrap();
        let err = table
            .insert(vec![Value::Integer(5), Value::from("b"), Value::Null])
            .unwrap_err();
        assert!(err.to_string().contains("thing_pkey"));
        assert_eq!(table.insert(row("c", None)).unwrap(), 6);
    }

    #[test]
    fn test_sequence_exhausted_at_max_id() {
        let mut table = thing_table();
        let max = vec![Value::Integer(i64::MAX), Value::from("a"), Value::Null];
        assert_eq!(table.insert(max).unwrap(), i64::MAX);

        let err = table.insert(row("b", None)).unwrap_err();
        assert!(matches!(err, DbError::ExecutionError(_)));
        assert!(err.to_string().contains("exhausted"));
        assert_eq!(table.row_count(), 1);

        // Explicit ids below the maximum are still accepted
        table.insert(vec![Value::Integer(7), Value::from("c"), Value::Null]).unwrap();
        assert_eq!(table.row_count(), 2);
    }
}
