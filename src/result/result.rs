use crate::core::{Row, Value};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub affected_rows: usize,
    /// Primary keys assigned by an INSERT, in VALUES order
    pub inserted_ids: Vec<i64>,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            affected_rows: 0,
            inserted_ids: Vec::new(),
        }
    }

    /// Result of a write statement
    pub fn affected(affected_rows: usize) -> Self {
        Self {
            affected_rows,
            ..Self::empty()
        }
    }

    pub fn with_inserted_ids(mut self, ids: Vec<i64>) -> Self {
        self.inserted_ids = ids;
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn affected_rows(&self) -> usize {
        self.affected_rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// First column of the first row, e.g. the value of `SELECT COUNT(*)`
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }

    /// All values of one column, by case-insensitive name
    pub fn column(&self, name: &str) -> Option<Vec<Value>> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))?;
        Some(self.rows.iter().filter_map(|row| row.get(idx).cloned()).collect())
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            return write!(f, "{} row(s) affected", self.affected_rows);
        }

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.len()).collect();
        for row in &self.rows {
            for (i, value) in row.iter().enumerate() {
                if let Some(w) = widths.get_mut(i) {
                    *w = (*w).max(value.to_string().len());
                }
            }
        }

        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(col, w)| format!("{:width$}", col, width = *w))
            .collect();
        writeln!(f, "{}", header.join(" | "))?;

        let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(f, "{}", separator.join("-+-"))?;

        for row in &self.rows {
            let cells: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(val, w)| format!("{:width$}", val.to_string(), width = *w))
                .collect();
            writeln!(f, "{}", cells.join(" | "))?;
        }

        write!(f, "({} row(s))", self.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_and_column() {
        let result = QueryResult::new(
            vec!["id".into(), "name".into()],
            vec![
                vec![Value::Integer(1), Value::from("a")],
                vec![Value::Integer(2), Value::from("b")],
            ],
        );
        assert_eq!(result.scalar(), Some(&Value::Integer(1)));
        assert_eq!(result.column("NAME"), Some(vec![Value::from("a"), Value::from("b")]));
        assert_eq!(result.column("missing"), None);
        assert!(result.to_string().ends_with("(2 row(s))"));
    }

    #[test]
    fn test_affected() {
        let result = QueryResult::affected(3).with_inserted_ids(vec![4, 5, 6]);
        assert_eq!(result.affected_rows(), 3);
        assert!(result.is_empty());
        assert_eq!(result.scalar(), None);
        assert_eq!(result.to_string(), "3 row(s) affected");
    }
}
