use super::super::{EvaluationContext, ExpressionEvaluator};
use crate::core::{Result, Row, Schema, Value};
use crate::parser::ast::{BinaryOp, Expr};
use std::cmp::Ordering;

pub struct ComparisonEvaluator;

impl ExpressionEvaluator for ComparisonEvaluator {
    fn name(&self) -> &'static str {
        "COMPARISON"
    }

    fn can_evaluate(&self, expr: &Expr) -> bool {
        matches!(expr, Expr::BinaryOp { op, .. } if op.is_comparison())
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

        let left_val = context.evaluate(left, row, schema)?;
        let right_val = context.evaluate(right, row, schema)?;

        // Comparing with NULL is unknown
        if left_val.is_null() || right_val.is_null() {
            return Ok(Value::Null);
        }

        let ordering = left_val.compare(&right_val)?;
        Ok(Value::Boolean(Self::holds(ordering, op)))
    }
}

impl ComparisonEvaluator {
    fn holds(ordering: Ordering, op: &BinaryOp) -> bool {
        match op {
            BinaryOp::Eq => ordering == Ordering::Equal,
            BinaryOp::NotEq => ordering != Ordering::Equal,
            BinaryOp::Lt => ordering == Ordering::Less,
            BinaryOp::LtEq => ordering != Ordering::Greater,
            BinaryOp::Gt => ordering == Ordering::Greater,
            BinaryOp::GtEq => ordering != Ordering::Less,
            BinaryOp::And | BinaryOp::Or => unreachable!(),
        }
    }
}
