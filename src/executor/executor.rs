use super::ExecutionContext;
use crate::core::{DbError, Result};
use crate::parser::ast::Statement;
use crate::result::QueryResult;

pub trait Executor: Send + Sync {
    /// Executor name for debugging
    fn name(&self) -> &'static str;

    fn can_handle(&self, stmt: &Statement) -> bool;

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult>;
}

pub struct ExecutorPipeline {
    executors: Vec<Box<dyn Executor>>,
}

impl ExecutorPipeline {
    pub fn new() -> Self {
        Self {
            executors: Vec::new(),
        }
    }

    /// Pipeline with INSERT, UPDATE, DELETE and SELECT registered
    pub fn with_default_executors() -> Self {
        let mut pipeline = Self::new();
        pipeline.register(Box::new(super::dml::InsertExecutor));
        pipeline.register(Box::new(super::update::UpdateExecutor));
        pipeline.register(Box::new(super::delete::DeleteExecutor));
        pipeline.register(Box::new(super::query::QueryExecutor));
        pipeline
    }

    pub fn register(&mut self, executor: Box<dyn Executor>) {
        self.executors.push(executor);
    }

    pub fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        for executor in &self.executors {
            if executor.can_handle(stmt) {
                log::trace!(
                    "{} executor handles statement on '{}'",
                    executor.name(),
                    stmt.table_name()
                );
                return executor.execute(stmt, ctx);
            }
        }

        Err(DbError::UnsupportedOperation(
            "No executor found for statement".into(),
        ))
    }
}

impl Default for ExecutorPipeline {
    fn default() -> Self {
        Self::with_default_executors()
    }
}
