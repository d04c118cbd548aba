use super::{ExpressionConverter, ExpressionPlugin};
use crate::core::{Result, Value};
use crate::parser::ast::{Expr, UnaryOp};
use sqlparser::ast as sql_ast;

/// NOT and unary minus
pub struct BooleanPlugin;

impl ExpressionPlugin for BooleanPlugin {
    fn name(&self) -> &'static str {
        "UNARY"
    }

    fn can_handle(&self, expr: &sql_ast::Expr) -> bool {
        matches!(
            expr,
            sql_ast::Expr::UnaryOp {
                op: sql_ast::UnaryOperator::Not | sql_ast::UnaryOperator::Minus,
                ..
            }
        )
    }

    fn convert(&self, expr: sql_ast::Expr, converter: &ExpressionConverter) -> Result<Expr> {
        match expr {
            sql_ast::Expr::UnaryOp { op, expr } => {
                let inner = converter.convert(*expr)?;
                match op {
                    sql_ast::UnaryOperator::Not => Ok(Expr::UnaryOp {
                        op: UnaryOp::Not,
                        expr: Box::new(inner),
                    }),
                    // Fold negative literals so `-1` stays a plain value
                    sql_ast::UnaryOperator::Minus => match inner {
                        Expr::Literal(Value::Integer(n)) => Ok(Expr::Literal(Value::Integer(-n))),
                        other => Ok(Expr::UnaryOp {
                            op: UnaryOp::Minus,
                            expr: Box::new(other),
                        }),
                    },
                    _ => unreachable!("BooleanPlugin called with unsupported unary operator"),
                }
            }
            _ => unreachable!("BooleanPlugin called with non-unary expression"),
        }
    }
}
