use super::{ExecutionContext, Executor};
use crate::core::{DbError, Result, Row, Value};
use crate::parser::ast::{Expr, QueryStmt, SelectItem, Statement};
use crate::result::QueryResult;
use std::cmp::Ordering;

pub struct QueryExecutor;

impl Executor for QueryExecutor {
    fn name(&self) -> &'static str {
        "SELECT"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Query(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::Query(query) = stmt else {
            unreachable!();
        };

        self.execute_query(query, ctx)
    }
}

impl QueryExecutor {
    fn execute_query(&self, query: &QueryStmt, ctx: &ExecutionContext<'_>) -> Result<QueryResult> {
        let table = ctx.storage.get_table(&query.table_name)?;
        let schema = table.schema().schema();
        let eval = ctx.eval();

        // Filter
        let mut rows = Vec::new();
        for row in table.scan() {
            if eval.matches(query.selection.as_ref(), &row, schema)? {
                rows.push(row);
            }
        }

        let counts = query
            .projection
            .iter()
            .filter(|item| matches!(item, SelectItem::CountStar { .. }))
            .count();
        if counts > 0 {
            if counts != query.projection.len() {
                return Err(DbError::UnsupportedOperation(
                    "COUNT(*) cannot be mixed with plain columns without GROUP BY".into(),
                ));
            }
            let columns = query
                .projection
                .iter()
                .map(|item| match item {
                    SelectItem::CountStar { alias } => {
                        alias.clone().unwrap_or_else(|| "count".into())
                    }
                    _ => unreachable!(),
                })
                .collect();
            let count = Value::Integer(rows.len() as i64);
            return Ok(QueryResult::new(columns, vec![vec![count; counts]]));
        }

        // Sort on the full source row, before projection
        if !query.order_by.is_empty() {
            let mut keyed = rows
                .into_iter()
                .map(|row| {
                    let keys = query
                        .order_by
                        .iter()
                        .map(|o| eval.evaluate(&o.expr, &row, schema))
                        .collect::<Result<Vec<_>>>()?;
                    Ok((keys, row))
                })
                .collect::<Result<Vec<_>>>()?;

            keyed.sort_by(|(a, _), (b, _)| {
                for (i, order) in query.order_by.iter().enumerate() {
                    let ord = a[i].sort_cmp(&b[i]);
                    let ord = if order.descending { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
            rows = keyed.into_iter().map(|(_, row)| row).collect();
        }

        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        // Project
        let mut columns = Vec::new();
        let mut exprs = Vec::new();
        for item in &query.projection {
            match item {
                SelectItem::Wildcard => {
                    for column in schema.columns() {
                        columns.push(column.name.clone());
                        exprs.push(Expr::Column(column.name.clone()));
                    }
                }
                SelectItem::Expr { expr, alias } => {
                    columns.push(alias.clone().unwrap_or_else(|| expr.to_string()));
                    exprs.push(expr.clone());
                }
                SelectItem::CountStar { .. } => unreachable!(),
            }
        }

        let projected = rows
            .iter()
            .map(|row| {
                exprs
                    .iter()
                    .map(|expr| eval.evaluate(expr, row, schema))
                    .collect::<Result<Row>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(QueryResult::new(columns, projected))
    }
}
