use super::{ExecutionContext, Executor};
use crate::core::Result;
use crate::parser::ast::{DeleteStmt, Statement};
use crate::result::QueryResult;
use crate::transaction::Change;

pub struct DeleteExecutor;

impl Executor for DeleteExecutor {
    fn name(&self) -> &'static str {
        "DELETE"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Delete(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::Delete(delete) = stmt else {
            unreachable!();
        };

        self.execute_delete(delete, ctx)
    }
}

impl DeleteExecutor {
    fn execute_delete(
        &self,
        delete: &DeleteStmt,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<QueryResult> {
        let schema = ctx.storage.get_schema(&delete.table_name)?;
        let eval = ctx.eval();

        let mut doomed = Vec::new();
        for (id, row) in ctx.storage.get_table(&delete.table_name)?.scan_with_ids() {
            if eval.matches(delete.selection.as_ref(), &row, schema.schema())? {
                doomed.push(id);
            }
        }

        let table = ctx.storage.get_table_mut(&delete.table_name)?;
        let mut changes = Vec::with_capacity(doomed.len());
        for id in doomed {
            if let Some(old_row) = table.delete(id) {
                changes.push(Change::DeleteRow {
                    table: delete.table_name.clone(),
                    id,
                    old_row,
                });
            }
        }

        let deleted = changes.len();
        for change in changes {
            ctx.record(change);
        }
        Ok(QueryResult::affected(deleted))
    }
}
