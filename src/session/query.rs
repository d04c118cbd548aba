use super::record::{Record, COLUMNS};
use super::Session;
use crate::core::{DbError, Result, Value};

/// Filtered read over the session's table.
///
/// Rows come back in primary key order and resolve through the identity
/// map, so a live entry wins over what storage returns unless
/// [`SessionQuery::populate_existing`] is set.
pub struct SessionQuery<'s> {
    session: &'s Session,
    filters: Vec<(String, Value)>,
    populate_existing: bool,
    invalid: Option<String>,
}

impl<'s> SessionQuery<'s> {
    pub(crate) fn new(session: &'s Session) -> Self {
        Self {
            session,
            filters: Vec::new(),
            populate_existing: false,
            invalid: None,
        }
    }

    /// Equality filter; a NULL value matches NULL columns
    pub fn filter_by(mut self, column: &str, value: impl Into<Value>) -> Self {
        if !COLUMNS.iter().any(|c| c.eq_ignore_ascii_case(column)) {
            self.invalid = Some(column.to_string());
        }
        self.filters.push((column.to_ascii_lowercase(), value.into()));
        self
    }

    /// Overwrite live entries with the rows read
    pub fn populate_existing(mut self) -> Self {
        self.populate_existing = true;
        self
    }

    fn sql(&self, tail: &str) -> Result<(String, Vec<Value>)> {
        if let Some(column) = &self.invalid {
            return Err(DbError::ColumnNotFound(
                column.clone(),
                self.session.config().table.clone(),
            ));
        }

        let mut sql = self.session.select_sql();
        let mut params = Vec::new();
        let mut conditions = Vec::new();
        for (column, value) in &self.filters {
            if value.is_null() {
                conditions.push(format!("{} IS NULL", column));
            } else {
                params.push(value.clone());
                conditions.push(format!("{} = ${}", column, params.len()));
            }
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY id");
        sql.push_str(tail);
        Ok((sql, params))
    }

    fn fetch(&self, tail: &str) -> Result<Vec<Record>> {
        let (sql, params) = self.sql(tail)?;
        let result = self.session.execute(&sql, &params)?;
        self.session.resolve(&result, self.populate_existing)
    }

    pub fn all(&self) -> Result<Vec<Record>> {
        self.fetch("")
    }

    pub fn first(&self) -> Result<Option<Record>> {
        Ok(self.fetch(" LIMIT 1")?.into_iter().next())
    }

    /// Exactly one row, or an error naming what went wrong
    pub fn one(&self) -> Result<Record> {
        let mut records = self.fetch(" LIMIT 2")?;
        match records.len() {
            1 => Ok(records.remove(0)),
            0 => Err(DbError::ExecutionError("No row was found when one was required".into())),
            _ => Err(DbError::ExecutionError(
                "Multiple rows were found when exactly one was required".into(),
            )),
        }
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.fetch("")?.len())
    }
}
