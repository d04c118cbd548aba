// ============================================================================
// src/parser/adapter.rs - sqlparser AST -> internal AST
// ============================================================================

use crate::core::{DbError, Result};
use crate::parser::ast::*;
use crate::plugins::ExpressionConverter;
use sqlparser::ast as sql_ast;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::borrow::Cow;

pub struct SqlParserAdapter {
    dialect: PostgreSqlDialect,
    expr_converter: ExpressionConverter,
}

impl SqlParserAdapter {
    pub fn new() -> Self {
        Self {
            dialect: PostgreSqlDialect {},
            expr_converter: ExpressionConverter::new(),
        }
    }

    pub fn with_expression_converter(expr_converter: ExpressionConverter) -> Self {
        Self {
            dialect: PostgreSqlDialect {},
            expr_converter,
        }
    }

    pub fn parse(&self, sql: &str) -> Result<Vec<Statement>> {
        let sql = number_positional_placeholders(sql);
        let external_stmts = Parser::parse_sql(&self.dialect, &sql)
            .map_err(|e| DbError::ParseError(e.to_string()))?;

        external_stmts
            .into_iter()
            .map(|stmt| self.convert_statement(stmt))
            .collect()
    }

    /// Parse text that must hold exactly one statement
    pub fn parse_one(&self, sql: &str) -> Result<Statement> {
        let mut statements = self.parse(sql)?;
        match statements.len() {
            1 => Ok(statements.remove(0)),
            0 => Err(DbError::ParseError("empty statement".into())),
            n => Err(DbError::UnsupportedOperation(format!(
                "expected one statement, got {}",
                n
            ))),
        }
    }

    fn convert_statement(&self, stmt: sql_ast::Statement) -> Result<Statement> {
        match stmt {
            sql_ast::Statement::Insert(insert) => {
                Ok(Statement::Insert(self.convert_insert(insert)?))
            }
            sql_ast::Statement::Query(query) => {
                Ok(Statement::Query(self.convert_query(*query)?))
            }
            sql_ast::Statement::Delete(delete) => {
                Ok(Statement::Delete(self.convert_delete(delete)?))
            }
            sql_ast::Statement::Update { table, assignments, selection, .. } => {
                Ok(Statement::Update(self.convert_update(table, assignments, selection)?))
            }
            _ => Err(DbError::UnsupportedOperation(format!(
                "Statement type not supported: {}",
                stmt
            ))),
        }
    }

    fn convert_delete(&self, delete: sql_ast::Delete) -> Result<DeleteStmt> {
        let tables = match delete.from {
            sql_ast::FromTable::WithFromKeyword(tables) => tables,
            sql_ast::FromTable::WithoutKeyword(tables) => tables,
        };
        let table_name = single_table(&tables, "DELETE")?;

        let selection = delete
            .selection
            .map(|expr| self.expr_converter.convert(expr))
            .transpose()?;

        Ok(DeleteStmt {
            table_name,
            selection,
        })
    }

    fn convert_update(
        &self,
        table: sql_ast::TableWithJoins,
        assignments: Vec<sql_ast::Assignment>,
        selection: Option<sql_ast::Expr>,
    ) -> Result<UpdateStmt> {
        let table_name = single_table(std::slice::from_ref(&table), "UPDATE")?;

        let assignments = assignments
            .into_iter()
            .map(|assign| {
                let column = match assign.target {
                    sql_ast::AssignmentTarget::ColumnName(col_name) => {
                        if col_name.0.len() == 1 {
                            col_name.0[0].to_string()
                        } else {
                            return Err(DbError::UnsupportedOperation(
                                "Qualified column names not supported in UPDATE".into(),
                            ));
                        }
                    }
                    _ => {
                        return Err(DbError::UnsupportedOperation(
                            "Only simple column names supported in UPDATE".into(),
                        ));
                    }
                };

                let value = self.expr_converter.convert(assign.value)?;
                Ok(Assignment { column, value })
            })
            .collect::<Result<Vec<_>>>()?;

        let selection = selection
            .map(|expr| self.expr_converter.convert(expr))
            .transpose()?;

        Ok(UpdateStmt {
            table_name,
            assignments,
            selection,
        })
    }

    fn convert_insert(&self, insert: sql_ast::Insert) -> Result<InsertStmt> {
        let table_name = insert.table.to_string();

        let columns = if insert.columns.is_empty() {
            None
        } else {
            Some(insert.columns.into_iter().map(|id| id.value).collect())
        };

        let Some(source) = insert.source else {
            return Err(DbError::UnsupportedOperation(
                "INSERT without VALUES is not supported".into(),
            ));
        };
        let sql_ast::SetExpr::Values(vals) = *source.body else {
            return Err(DbError::UnsupportedOperation(
                "Only VALUES clause supported".into(),
            ));
        };

        let values = vals
            .rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|expr| self.expr_converter.convert(expr))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(InsertStmt {
            table_name,
            columns,
            values,
        })
    }

    fn convert_query(&self, query: sql_ast::Query) -> Result<QueryStmt> {
        let sql_ast::SetExpr::Select(select) = *query.body else {
            return Err(DbError::UnsupportedOperation(
                "Only SELECT queries supported".into(),
            ));
        };

        if select.distinct.is_some() {
            return Err(DbError::UnsupportedOperation("DISTINCT not supported".into()));
        }
        if select.having.is_some() {
            return Err(DbError::UnsupportedOperation("HAVING not supported".into()));
        }

        let table_name = single_table(&select.from, "SELECT")?;

        let projection = select
            .projection
            .into_iter()
            .map(|item| self.convert_select_item(item))
            .collect::<Result<Vec<_>>>()?;

        let selection = select
            .selection
            .map(|expr| self.expr_converter.convert(expr))
            .transpose()?;

        let order_by = self.convert_order_by(query.order_by)?;
        let limit = self.convert_limit_clause(&query.limit_clause)?;

        Ok(QueryStmt {
            table_name,
            projection,
            selection,
            order_by,
            limit,
        })
    }

    fn convert_order_by(&self, order_by: Option<sql_ast::OrderBy>) -> Result<Vec<OrderByExpr>> {
        let Some(order_by) = order_by else {
            return Ok(Vec::new());
        };

        match order_by.kind {
            sql_ast::OrderByKind::Expressions(exprs) => exprs
                .into_iter()
                .map(|order| {
                    // ASC unless DESC is explicit
                    let descending = order.options.asc.map(|asc| !asc).unwrap_or(false);
                    Ok(OrderByExpr {
                        expr: self.expr_converter.convert(order.expr)?,
                        descending,
                    })
                })
                .collect(),
            sql_ast::OrderByKind::All(_) => Err(DbError::UnsupportedOperation(
                "ORDER BY ALL not supported".into(),
            )),
        }
    }

    fn convert_limit_clause(
        &self,
        limit_clause: &Option<sql_ast::LimitClause>,
    ) -> Result<Option<usize>> {
        let Some(clause) = limit_clause else {
            return Ok(None);
        };

        let limit = match clause {
            sql_ast::LimitClause::LimitOffset { limit, offset, .. } => {
                if offset.is_some() {
                    return Err(DbError::UnsupportedOperation("OFFSET not supported".into()));
                }
                limit.as_ref()
            }
            sql_ast::LimitClause::OffsetCommaLimit { .. } => {
                return Err(DbError::UnsupportedOperation("OFFSET not supported".into()));
            }
        };

        match limit {
            Some(sql_ast::Expr::Value(value_with_span)) => match &value_with_span.value {
                sql_ast::Value::Number(n, _) => n
                    .parse::<usize>()
                    .map(Some)
                    .map_err(|_| DbError::ParseError(format!("Invalid LIMIT value: {}", n))),
                other => Err(DbError::UnsupportedOperation(format!(
                    "Only numeric LIMIT supported, got: {}",
                    other
                ))),
            },
            Some(_) => Err(DbError::UnsupportedOperation(
                "Only numeric LIMIT supported".into(),
            )),
            None => Ok(None),
        }
    }

    fn convert_select_item(&self, item: sql_ast::SelectItem) -> Result<SelectItem> {
        match item {
            sql_ast::SelectItem::Wildcard(_) => Ok(SelectItem::Wildcard),
            sql_ast::SelectItem::UnnamedExpr(expr) => self.convert_projection(expr, None),
            sql_ast::SelectItem::ExprWithAlias { expr, alias } => {
                self.convert_projection(expr, Some(alias.value))
            }
            _ => Err(DbError::UnsupportedOperation(
                "Unsupported select item".into(),
            )),
        }
    }

    fn convert_projection(&self, expr: sql_ast::Expr, alias: Option<String>) -> Result<SelectItem> {
        if let sql_ast::Expr::Function(func) = &expr {
            if is_count_star(func) {
                return Ok(SelectItem::CountStar { alias });
            }
            return Err(DbError::UnsupportedOperation(format!(
                "Function not supported: {}",
                func.name
            )));
        }

        Ok(SelectItem::Expr {
            expr: self.expr_converter.convert(expr)?,
            alias,
        })
    }
}

impl Default for SqlParserAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn is_count_star(func: &sql_ast::Function) -> bool {
    if !func.name.to_string().eq_ignore_ascii_case("count") {
        return false;
    }
    match &func.args {
        sql_ast::FunctionArguments::List(arg_list) => matches!(
            arg_list.args.as_slice(),
            [sql_ast::FunctionArg::Unnamed(sql_ast::FunctionArgExpr::Wildcard)]
        ),
        _ => false,
    }
}

fn single_table(tables: &[sql_ast::TableWithJoins], statement: &str) -> Result<String> {
    let [table] = tables else {
        return Err(DbError::UnsupportedOperation(format!(
            "{} requires exactly one table",
            statement
        )));
    };
    if !table.joins.is_empty() {
        return Err(DbError::UnsupportedOperation(format!(
            "JOIN not supported in {}",
            statement
        )));
    }
    match &table.relation {
        sql_ast::TableFactor::Table { name, .. } => extract_table_name(name),
        _ => Err(DbError::UnsupportedOperation(format!(
            "Complex table references not supported in {}",
            statement
        ))),
    }
}

fn extract_table_name(name: &sql_ast::ObjectName) -> Result<String> {
    name.0
        .last()
        .map(|i| i.to_string())
        .ok_or_else(|| DbError::ParseError("Empty table name".into()))
}

/// Rewrite positional `?` markers as `$1`, `$2`, ... outside string literals.
fn number_positional_placeholders(sql: &str) -> Cow<'_, str> {
    if !sql.contains('?') {
        return Cow::Borrowed(sql);
    }

    let mut out = String::with_capacity(sql.len() + 8);
    let mut in_string = false;
    let mut next = 0;
    for ch in sql.chars() {
        match ch {
            '\'' => {
                // A doubled quote toggles twice, which keeps the state
                in_string = !in_string;
                out.push(ch);
            }
            '?' if !in_string => {
                next += 1;
                out.push('$');
                out.push_str(&next.to_string());
            }
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}
