use super::{Table, TableSchema};
use crate::core::{DbError, Result};
use std::collections::HashMap;

/// Table registry owned by a single connection.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    tables: HashMap<String, Table>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    pub fn create_table(&mut self, schema: TableSchema) -> Result<()> {
        schema.validate()?;
        let name = schema.name().to_string();

        if self.tables.contains_key(&name) {
            return Err(DbError::TableExists(name));
        }

        self.tables.insert(name, Table::new(schema));
        Ok(())
    }

    pub fn drop_table(&mut self, table_name: &str) -> Result<()> {
        if self.tables.remove(table_name).is_none() {
            return Err(DbError::TableNotFound(table_name.to_string()));
        }
        Ok(())
    }

    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn get_table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn get_schema(&self, name: &str) -> Result<TableSchema> {
        Ok(self.get_table(name)?.schema().clone())
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn row_count(&self, name: &str) -> Result<usize> {
        Ok(self.get_table(name)?.row_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType};

    fn schema(name: &str) -> TableSchema {
        TableSchema::new(name, vec![Column::new("id", DataType::Integer).primary_key()])
    }

    #[test]
    fn test_create_and_drop_table() {
        let mut storage = InMemoryStorage::new();
        storage.create_table(schema("thing")).unwrap();
        assert!(storage.table_exists("thing"));
        assert!(matches!(
            storage.create_table(schema("thing")),
            Err(DbError::TableExists(_))
        ));

        storage.drop_table("thing").unwrap();
        assert!(!storage.table_exists("thing"));
        assert!(matches!(
            storage.drop_table("thing"),
            Err(DbError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_table_without_primary_key_is_rejected() {
        let mut storage = InMemoryStorage::new();
        let bad = TableSchema::new("bad", vec![Column::new("x", DataType::Text)]);
        assert!(storage.create_table(bad).is_err());
    }
}
