use super::{ExecutionContext, Executor};
use crate::core::{DbError, Result};
use crate::parser::ast::{Statement, UpdateStmt};
use crate::result::QueryResult;
use crate::transaction::Change;

pub struct UpdateExecutor;

impl Executor for UpdateExecutor {
    fn name(&self) -> &'static str {
        "UPDATE"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Update(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::Update(update) = stmt else {
            unreachable!();
        };

        self.execute_update(update, ctx)
    }
}

impl UpdateExecutor {
    fn execute_update(
        &self,
        update: &UpdateStmt,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<QueryResult> {
        let schema = ctx.storage.get_schema(&update.table_name)?;
        let eval = ctx.eval();

        let assignments = update
            .assignments
            .iter()
            .map(|assignment| {
                schema
                    .schema()
                    .find_column_index(&assignment.column)
                    .map(|idx| (idx, &assignment.value))
                    .ok_or_else(|| {
                        DbError::ColumnNotFound(
                            assignment.column.clone(),
                            update.table_name.clone(),
                        )
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        // Compute every new row before touching storage
        let mut updates = Vec::new();
        for (id, row) in ctx.storage.get_table(&update.table_name)?.scan_with_ids() {
            if !eval.matches(update.selection.as_ref(), &row, schema.schema())? {
                continue;
            }
            let mut new_row = row.clone();
            for (idx, expr) in &assignments {
                new_row[*idx] = eval.evaluate(expr, &row, schema.schema())?;
            }
            updates.push((id, new_row));
        }

        let table = ctx.storage.get_table_mut(&update.table_name)?;
        let mut changes = Vec::with_capacity(updates.len());
        let mut failure = None;
        for (id, new_row) in updates {
            match table.update(id, new_row) {
                Ok(old_row) => changes.push(Change::UpdateRow {
                    table: update.table_name.clone(),
                    id,
                    old_row,
                }),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        let updated = changes.len();
        for change in changes {
            ctx.record(change);
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(QueryResult::affected(updated)),
        }
    }
}
