use crate::core::{Result, Value};
use crate::evaluator::EvaluatorRegistry;
use crate::executor::{ExecutionContext, ExecutorPipeline};
use crate::parser::ast::Statement;
use crate::parser::SqlParserAdapter;
use crate::result::QueryResult;
use crate::storage::{InMemoryStorage, TableSchema};
use crate::transaction::change::revert_all;
use crate::transaction::Change;
use log::debug;

/// Parser, storage and executor pipeline for one connection.
///
/// Knows nothing about scopes: a statement either fully applies and
/// returns its journal, or is fully reverted and returns the error.
pub struct Database {
    parser: SqlParserAdapter,
    storage: InMemoryStorage,
    evaluators: EvaluatorRegistry,
    executor_pipeline: ExecutorPipeline,
}

impl Database {
    pub fn new() -> Self {
        Self {
            parser: SqlParserAdapter::new(),
            storage: InMemoryStorage::new(),
            evaluators: EvaluatorRegistry::with_default_evaluators(),
            executor_pipeline: ExecutorPipeline::with_default_executors(),
        }
    }

    pub fn parse(&self, sql: &str) -> Result<Statement> {
        self.parser.parse_one(sql)
    }

    /// Parse and run one statement.
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<(QueryResult, Vec<Change>)> {
        let statement = self.parse(sql)?;
        self.execute_statement(&statement, params)
    }

    pub fn execute_statement(
        &mut self,
        statement: &Statement,
        params: &[Value],
    ) -> Result<(QueryResult, Vec<Change>)> {
        let mut ctx = ExecutionContext::new(&mut self.storage, &self.evaluators, params);
        let outcome = self.executor_pipeline.execute(statement, &mut ctx);
        let journal = ctx.take_journal();

        match outcome {
            Ok(result) => Ok((result, journal)),
            Err(err) => {
                if !journal.is_empty() {
                    debug!("reverting {} change(s) of failed statement", journal.len());
                    revert_all(journal, &mut self.storage);
                }
                Err(err)
            }
        }
    }

    pub fn create_table(&mut self, schema: TableSchema) -> Result<()> {
        debug!("CREATE TABLE {}", schema.name());
        self.storage.create_table(schema)
    }

    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        debug!("DROP TABLE {}", name);
        self.storage.drop_table(name)
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.storage.table_exists(name)
    }

    pub fn list_tables(&self) -> Vec<String> {
        self.storage.list_tables()
    }

    pub fn storage(&self) -> &InMemoryStorage {
        &self.storage
    }

    pub(crate) fn storage_mut(&mut self) -> &mut InMemoryStorage {
        &mut self.storage
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}
