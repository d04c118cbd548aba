use super::super::{EvaluationContext, ExpressionEvaluator};
use crate::core::{DbError, Result, Row, Schema, Value};
use crate::parser::ast::{Expr, UnaryOp};

pub struct UnaryEvaluator;

impl ExpressionEvaluator for UnaryEvaluator {
    fn name(&self) -> &'static str {
        "UNARY"
    }

    fn can_evaluate(&self, expr: &Expr) -> bool {
        matches!(expr, Expr::UnaryOp { .. })
    }

    fn evaluate(
        &self,
        expr: &Expr,
        row: &Row,
        schema: &Schema,
        context: &EvaluationContext<'_>,
    ) -> Result<Value> {
        let Expr::UnaryOp { op, expr } = expr else {
            unreachable!();
        };

        match (op, context.evaluate(expr, row, schema)?) {
            (_, Value::Null) => Ok(Value::Null),
            (UnaryOp::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
            (UnaryOp::Minus, Value::Integer(n)) => n
                .checked_neg()
                .map(Value::Integer)
                .ok_or_else(|| DbError::ExecutionError("integer out of range".into())),
            (op, other) => Err(DbError::TypeMismatch(format!(
                "cannot apply {:?} to {}",
                op,
                other.type_name()
            ))),
        }
    }
}
