use super::{ExecutionContext, Executor};
use crate::core::{DbError, Result, Row, Value};
use crate::parser::ast::{InsertStmt, Statement};
use crate::result::QueryResult;
use crate::transaction::Change;

pub struct InsertExecutor;

impl Executor for InsertExecutor {
    fn name(&self) -> &'static str {
        "INSERT"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Insert(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::Insert(insert) = stmt else {
            unreachable!();
        };

        self.execute_insert(insert, ctx)
    }
}

impl InsertExecutor {
    fn execute_insert(
        &self,
        insert: &InsertStmt,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<QueryResult> {
        let schema = ctx.storage.get_schema(&insert.table_name)?;
        let columns = schema.schema().columns();

        // Map VALUES positions onto table columns
        let targets: Vec<usize> = match &insert.columns {
            Some(names) => names
                .iter()
                .map(|name| {
                    schema.schema().find_column_index(name).ok_or_else(|| {
                        DbError::ColumnNotFound(name.clone(), insert.table_name.clone())
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            None => (0..columns.len()).collect(),
        };

        let eval = ctx.eval();
        let rows: Vec<Row> = insert
            .values
            .iter()
            .map(|exprs| {
                if exprs.len() != targets.len() {
                    return Err(DbError::ExecutionError(format!(
                        "Expected {} values, got {}",
                        targets.len(),
                        exprs.len()
                    )));
                }
                let mut row = vec![Value::Null; columns.len()];
                for (expr, &idx) in exprs.iter().zip(&targets) {
                    row[idx] = eval.evaluate_constant(expr)?;
                }
                Ok(row)
            })
            .collect::<Result<Vec<_>>>()?;

        let table = ctx.storage.get_table_mut(&insert.table_name)?;
        let mut ids = Vec::with_capacity(rows.len());
        let mut changes = Vec::with_capacity(rows.len());
        let mut failure = None;
        for row in rows {
            match table.insert(row) {
                Ok(id) => {
                    ids.push(id);
                    changes.push(Change::InsertRow { table: insert.table_name.clone(), id });
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        // Rows inserted before a failure are journaled so the caller can undo them
        for change in changes {
            ctx.record(change);
        }
        if let Some(err) = failure {
            return Err(err);
        }

        Ok(QueryResult::affected(ids.len()).with_inserted_ids(ids))
    }
}
