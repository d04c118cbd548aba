pub mod boolean;

use crate::core::{DbError, Result, Value};
use crate::parser::ast::{BinaryOp, Expr};
use log::trace;
use sqlparser::ast as sql_ast;

/// Converts one family of sqlparser operators into our AST
pub trait ExpressionPlugin: Send + Sync {
    /// Plugin name for debugging
    fn name(&self) -> &'static str;

    /// Can this plugin handle the expression?
    fn can_handle(&self, expr: &sql_ast::Expr) -> bool;

    fn convert(&self, expr: sql_ast::Expr, converter: &ExpressionConverter) -> Result<Expr>;
}

pub struct ExpressionPluginRegistry {
    plugins: Vec<Box<dyn ExpressionPlugin>>,
}

impl ExpressionPluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    pub fn register(&mut self, plugin: Box<dyn ExpressionPlugin>) {
        trace!("registered expression plugin: {}", plugin.name());
        self.plugins.push(plugin);
    }

    pub fn with_default_plugins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(boolean::BooleanPlugin));
        registry
    }

    pub fn find_plugin(&self, expr: &sql_ast::Expr) -> Option<&dyn ExpressionPlugin> {
        self.plugins
            .iter()
            .find(|plugin| plugin.can_handle(expr))
            .map(|boxed| &**boxed)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl Default for ExpressionPluginRegistry {
    fn default() -> Self {
        Self::with_default_plugins()
    }
}

/// Converts sqlparser expressions into our AST.
///
/// Columns, literals, parentheses, `IS [NOT] NULL` and binary operators are
/// handled here; everything else is offered to the plugin registry.
pub struct ExpressionConverter {
    registry: ExpressionPluginRegistry,
}

impl ExpressionConverter {
    pub fn new() -> Self {
        Self::with_custom_plugins(ExpressionPluginRegistry::with_default_plugins())
    }

    pub fn with_custom_plugins(registry: ExpressionPluginRegistry) -> Self {
        Self { registry }
    }

    pub fn convert(&self, expr: sql_ast::Expr) -> Result<Expr> {
        match expr {
            sql_ast::Expr::Identifier(ident) => Ok(Expr::Column(ident.value)),
            // table.column on a single-table statement
            sql_ast::Expr::CompoundIdentifier(idents) => idents
                .into_iter()
                .last()
                .map(|i| Expr::Column(i.value))
                .ok_or_else(|| DbError::ParseError("empty identifier".into())),
            sql_ast::Expr::Value(val) => match &val.value {
                sql_ast::Value::Placeholder(p) => self.convert_placeholder(p),
                other => Ok(Expr::Literal(self.convert_value(other)?)),
            },
            sql_ast::Expr::Nested(inner) => self.convert(*inner),
            sql_ast::Expr::IsNull(inner) => Ok(Expr::IsNull {
                expr: Box::new(self.convert(*inner)?),
                negated: false,
            }),
            sql_ast::Expr::IsNotNull(inner) => Ok(Expr::IsNull {
                expr: Box::new(self.convert(*inner)?),
                negated: true,
            }),
            sql_ast::Expr::BinaryOp { left, op, right } => Ok(Expr::BinaryOp {
                op: self.convert_binary_op(&op)?,
                left: Box::new(self.convert(*left)?),
                right: Box::new(self.convert(*right)?),
            }),
            other => match self.registry.find_plugin(&other) {
                Some(plugin) => plugin.convert(other, self),
                None => Err(DbError::UnsupportedOperation(format!(
                    "No plugin found for expression: {}",
                    other
                ))),
            },
        }
    }

    fn convert_placeholder(&self, placeholder: &str) -> Result<Expr> {
        placeholder
            .strip_prefix('$')
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .map(Expr::Parameter)
            .ok_or_else(|| DbError::ParseError(format!("Invalid placeholder: {}", placeholder)))
    }

    pub fn convert_value(&self, val: &sql_ast::Value) -> Result<Value> {
        match val {
            sql_ast::Value::Number(n, _) => n
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| DbError::TypeMismatch(format!("Invalid integer: {}", n))),
            sql_ast::Value::SingleQuotedString(s) => Ok(Value::Text(s.clone())),
            sql_ast::Value::Boolean(b) => Ok(Value::Boolean(*b)),
            sql_ast::Value::Null => Ok(Value::Null),
            _ => Err(DbError::UnsupportedOperation(format!(
                "Unsupported value: {}",
                val
            ))),
        }
    }

    pub fn convert_binary_op(&self, op: &sql_ast::BinaryOperator) -> Result<BinaryOp> {
        use sql_ast::BinaryOperator as SqlOp;

        match op {
            SqlOp::Eq => Ok(BinaryOp::Eq),
            SqlOp::NotEq => Ok(BinaryOp::NotEq),
            SqlOp::Lt => Ok(BinaryOp::Lt),
            SqlOp::LtEq => Ok(BinaryOp::LtEq),
            SqlOp::Gt => Ok(BinaryOp::Gt),
            SqlOp::GtEq => Ok(BinaryOp::GtEq),

            SqlOp::And => Ok(BinaryOp::And),
            SqlOp::Or => Ok(BinaryOp::Or),

            _ => Err(DbError::UnsupportedOperation(format!(
                "Unsupported binary operator: {}",
                op
            ))),
        }
    }
}

impl Default for ExpressionConverter {
    fn default() -> Self {
        Self::new()
    }
}
