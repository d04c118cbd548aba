use super::super::{EvaluationContext, ExpressionEvaluator};
use crate::core::{DbError, Result, Row, Schema, Value};
use crate::parser::ast::{BinaryOp, Expr};

/// AND / OR with SQL three-valued logic
pub struct LogicalEvaluator;

impl ExpressionEvaluator for LogicalEvaluator {
    fn name(&self) -> &'static str {
        "LOGICAL"
    }

    fn can_evaluate(&self, expr: &Expr) -> bool {
        matches!(expr, Expr::BinaryOp { op, .. } if op.is_logical())
    }

    fn evaluate(
        &self,
        expr: &Expr,
        row: &Row,
        schema: &Schema,
        context: &EvaluationContext<'_>,
    ) -> Result<Value> {
        let Expr::BinaryOp { left, op, right } = expr else {
            unreachable!();
        };

        let left_val = truth(context.evaluate(left, row, schema)?)?;

        // Short-circuit on the deciding value
        let decisive = matches!(op, BinaryOp::Or);
        if left_val == Some(decisive) {
            return Ok(Value::Boolean(decisive));
        }

        let right_val = truth(context.evaluate(right, row, schema)?)?;
        Ok(match (left_val, right_val) {
            (_, Some(b)) if b == decisive => Value::Boolean(decisive),
            (Some(_), Some(_)) => Value::Boolean(!decisive),
            _ => Value::Null,
        })
    }
}

fn truth(value: Value) -> Result<Option<bool>> {
    match value {
        Value::Boolean(b) => Ok(Some(b)),
        Value::Null => Ok(None),
        other => Err(DbError::TypeMismatch(format!(
            "logical operand must be BOOLEAN, got {}",
            other.type_name()
        ))),
    }
}
