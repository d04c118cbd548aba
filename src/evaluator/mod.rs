pub mod plugins;

use crate::core::{DbError, Result, Row, Schema, Value};
use crate::parser::ast::Expr;
use log::trace;

/// Evaluates one family of expressions against a row
pub trait ExpressionEvaluator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Can this evaluator handle the expression?
    fn can_evaluate(&self, expr: &Expr) -> bool;

    fn evaluate(
        &self,
        expr: &Expr,
        row: &Row,
        schema: &Schema,
        context: &EvaluationContext<'_>,
    ) -> Result<Value>;
}

/// Per-statement evaluation state: the registry plus bound parameters
pub struct EvaluationContext<'a> {
    registry: &'a EvaluatorRegistry,
    params: &'a [Value],
}

impl<'a> EvaluationContext<'a> {
    pub fn new(registry: &'a EvaluatorRegistry, params: &'a [Value]) -> Self {
        Self { registry, params }
    }

    pub fn evaluate(&self, expr: &Expr, row: &Row, schema: &Schema) -> Result<Value> {
        // Leaf cases are always handled directly
        match expr {
            Expr::Column(name) => {
                let idx = schema
                    .find_column_index(name)
                    .ok_or_else(|| DbError::ColumnNotFound(name.clone(), "table".into()))?;
                return row
                    .get(idx)
                    .cloned()
                    .ok_or_else(|| DbError::ExecutionError(format!("row has no column {}", idx)));
            }
            Expr::Literal(val) => {
                return Ok(val.clone());
            }
            Expr::Parameter(n) => {
                return self.parameter(*n);
            }
            _ => {}
        }

        if let Some(evaluator) = self.registry.find_evaluator(expr) {
            return evaluator.evaluate(expr, row, schema, self);
        }

        Err(DbError::UnsupportedOperation(format!(
            "No evaluator found for expression: {}",
            expr
        )))
    }

    /// Evaluate an expression that does not reference any column
    pub fn evaluate_constant(&self, expr: &Expr) -> Result<Value> {
        self.evaluate(expr, &Vec::new(), &Schema::new(Vec::new()))
    }

    /// WHERE semantics: only TRUE keeps the row
    pub fn matches(&self, predicate: Option<&Expr>, row: &Row, schema: &Schema) -> Result<bool> {
        let Some(predicate) = predicate else {
            return Ok(true);
        };
        match self.evaluate(predicate, row, schema)? {
            Value::Boolean(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(DbError::TypeMismatch(format!(
                "WHERE clause must be BOOLEAN, got {}",
                other.type_name()
            ))),
        }
    }

    fn parameter(&self, n: usize) -> Result<Value> {
        n.checked_sub(1)
            .and_then(|i| self.params.get(i))
            .cloned()
            .ok_or_else(|| {
                DbError::ExecutionError(format!(
                    "no value bound for parameter ${} ({} given)",
                    n,
                    self.params.len()
                ))
            })
    }
}

pub struct EvaluatorRegistry {
    evaluators: Vec<Box<dyn ExpressionEvaluator>>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self {
            evaluators: Vec::new(),
        }
    }

    pub fn register(&mut self, evaluator: Box<dyn ExpressionEvaluator>) {
        trace!("registered evaluator: {}", evaluator.name());
        self.evaluators.push(evaluator);
    }

    pub fn with_default_evaluators() -> Self {
        use plugins::*;

        let mut registry = Self::new();
        registry.register(Box::new(comparison::ComparisonEvaluator));
        registry.register(Box::new(logical::LogicalEvaluator));
        registry.register(Box::new(unary::UnaryEvaluator));
        registry.register(Box::new(is_null::IsNullEvaluator));
        registry
    }

    fn find_evaluator(&self, expr: &Expr) -> Option<&dyn ExpressionEvaluator> {
        self.evaluators
            .iter()
            .find(|ev| ev.can_evaluate(expr))
            .map(|boxed| &**boxed)
    }
}

impl Default for EvaluatorRegistry {
    fn default() -> Self {
        Self::with_default_evaluators()
    }
}
