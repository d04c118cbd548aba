//! Scope-end notifications.
//!
//! Listeners are registered explicitly on a connection and called
//! synchronously, in registration order, once per ended scope.

use super::state::{Outcome, TransactionHandle};
use serde::Serialize;

/// One scope that has just been ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScopeEnd {
    pub handle: TransactionHandle,
    /// The enclosing scope at the time this one ended
    pub parent: Option<TransactionHandle>,
    pub outcome: Outcome,
    /// True when the scope was ended because an ancestor ended first
    pub cascaded: bool,
}

impl ScopeEnd {
    /// A savepoint ending directly under a plain transaction starts a new
    /// cache generation.
    pub fn rotates_generation(&self) -> bool {
        self.handle.nested && self.parent.is_some_and(|p| !p.nested)
    }
}

pub trait ScopeListener: Send + Sync {
    fn on_scope_end(&self, event: &ScopeEnd);
}

impl<F> ScopeListener for F
where
    F: Fn(&ScopeEnd) + Send + Sync,
{
    fn on_scope_end(&self, event: &ScopeEnd) {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct ListenerRegistry {
    next_id: u64,
    listeners: Vec<(ListenerId, std::sync::Arc<dyn ScopeListener>)>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: std::sync::Arc<dyn ScopeListener>) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push((id, listener));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Snapshot of the current listeners, so dispatch can run without the
    /// registry lock.
    pub fn snapshot(&self) -> Vec<std::sync::Arc<dyn ScopeListener>> {
        self.listeners.iter().map(|(_, l)| l.clone()).collect()
    }
}
