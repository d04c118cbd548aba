use crate::core::Value;
use crate::evaluator::{EvaluationContext, EvaluatorRegistry};
use crate::storage::InMemoryStorage;
use crate::transaction::Change;

/// Everything one statement needs while it runs.
///
/// Every row-level write is appended to `journal`, so the caller can
/// either revert the statement as a whole or hand the changes to the
/// enclosing scope.
pub struct ExecutionContext<'a> {
    pub storage: &'a mut InMemoryStorage,
    pub evaluators: &'a EvaluatorRegistry,
    pub params: &'a [Value],
    pub journal: Vec<Change>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        storage: &'a mut InMemoryStorage,
        evaluators: &'a EvaluatorRegistry,
        params: &'a [Value],
    ) -> Self {
        Self {
            storage,
            evaluators,
            params,
            journal: Vec::new(),
        }
    }

    pub fn eval(&self) -> EvaluationContext<'a> {
        EvaluationContext::new(self.evaluators, self.params)
    }

    pub fn record(&mut self, change: Change) {
        self.journal.push(change);
    }

    pub fn take_journal(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.journal)
    }
}
