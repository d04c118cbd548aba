// ============================================================================
// Scope Manager
// ============================================================================
//
// Owns the LIFO stack of open scopes and the undo log shared by all of
// them. A scope's mark is the undo-log length when it opened; rolling the
// scope back reverts every change above its mark, including changes that
// committed children merged into it.
//
// ============================================================================

use super::change::{revert_all, Change};
use super::listener::ScopeEnd;
use super::state::{Outcome, TransactionHandle, TransactionId, TransactionState};
use crate::core::{DbError, Result};
use crate::storage::InMemoryStorage;
use log::{debug, warn};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Instant;

/// Ended scopes whose outcome `state` still reports
const FINISHED_HISTORY: usize = 256;

#[derive(Debug)]
struct Scope {
    handle: TransactionHandle,
    undo_mark: usize,
    invalidated: Option<String>,
    started: Instant,
}

/// Serializable view of one open scope, innermost last.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeInfo {
    pub id: TransactionId,
    pub parent: Option<TransactionId>,
    pub nested: bool,
    pub depth: usize,
    pub invalidated: Option<String>,
    pub pending_changes: usize,
    pub age_ms: u128,
}

#[derive(Debug, Default)]
pub struct ScopeManager {
    next_id: u64,
    stack: Vec<Scope>,
    undo_log: Vec<Change>,
    /// Most recently ended scopes, oldest first
    finished: VecDeque<(TransactionId, TransactionState)>,
}

impl ScopeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a scope as a child of the current top of the stack.
    pub fn begin(&mut self, nested: bool) -> Result<TransactionHandle> {
        let parent = self.stack.last();

        if nested && parent.is_none() {
            return Err(DbError::InvalidScope(
                "cannot begin a savepoint without an active transaction".into(),
            ));
        }
        if let Some(reason) = parent.and_then(|p| p.invalidated.as_ref()) {
            return Err(DbError::InvalidScope(format!(
                "cannot begin inside {}: it was invalidated by a previous error: {}",
                parent.map(|p| p.handle.id.to_string()).unwrap_or_default(),
                reason
            )));
        }

        self.next_id += 1;
        let handle = TransactionHandle {
            id: TransactionId(self.next_id),
            parent: parent.map(|p| p.handle.id),
            nested,
        };

        self.stack.push(Scope {
            handle,
            undo_mark: self.undo_log.len(),
            invalidated: None,
            started: Instant::now(),
        });

        debug!("BEGIN {} at depth {}", handle, self.stack.len());
        Ok(handle)
    }

    /// End `handle` and every scope opened after it.
    ///
    /// Scopes above `handle` are rolled back first, innermost first. The
    /// returned events follow the same order, with `handle` itself last.
    pub fn end(
        &mut self,
        handle: &TransactionHandle,
        outcome: Outcome,
        storage: &mut InMemoryStorage,
    ) -> Result<Vec<ScopeEnd>> {
        let index = self.position(handle).ok_or_else(|| {
            DbError::InvalidScope(format!(
                "{} is not active ({})",
                handle.id,
                self.state(handle)
                    .map(|s| format!("{:?}", s))
                    .unwrap_or_else(|| "unknown".into())
            ))
        })?;

        if outcome == Outcome::Commit {
            if let Some(scope) = self.stack[index..].iter().find(|s| s.invalidated.is_some()) {
                return Err(DbError::InvalidScope(format!(
                    "cannot commit {}: {} was invalidated by a previous error: {}; roll it back first",
                    handle.id,
                    scope.handle.id,
                    scope.invalidated.as_deref().unwrap_or_default()
                )));
            }
        }

        let mut ended = self.stack.split_off(index);
        let mut events = Vec::with_capacity(ended.len());
        while let Some(scope) = ended.pop() {
            let parent = ended.last().or(self.stack.last()).map(|s| s.handle);
            let (outcome, cascaded) = if ended.is_empty() {
                (outcome, false)
            } else {
                (Outcome::Rollback, true)
            };
            events.push(self.finish(scope, parent, outcome, cascaded, storage));
        }
        Ok(events)
    }

    /// Roll back every open scope, used when the connection closes.
    pub fn rollback_all(&mut self, storage: &mut InMemoryStorage) -> Vec<ScopeEnd> {
        let mut events = Vec::new();
        while let Some(root) = self.stack.first().map(|s| s.handle) {
            match self.end(&root, Outcome::Rollback, storage) {
                Ok(mut ended) => events.append(&mut ended),
                Err(_) => break,
            }
        }
        events
    }

    fn finish(
        &mut self,
        scope: Scope,
        parent: Option<TransactionHandle>,
        outcome: Outcome,
        cascaded: bool,
        storage: &mut InMemoryStorage,
    ) -> ScopeEnd {
        match outcome {
            Outcome::Rollback => {
                let undone = self.undo_log.split_off(scope.undo_mark.min(self.undo_log.len()));
                debug!("ROLLBACK {} reverting {} change(s)", scope.handle, undone.len());
                revert_all(undone, storage);
            }
            Outcome::Commit if parent.is_none() => {
                debug!("COMMIT {} making {} change(s) durable", scope.handle, self.undo_log.len());
                self.undo_log.clear();
            }
            Outcome::Commit => {
                let parent = scope.handle.parent.map(|p| p.to_string()).unwrap_or_default();
                debug!("COMMIT {} into {}", scope.handle, parent);
            }
        }

        debug!(
            "{} ended after {:?}{}",
            scope.handle.id,
            scope.started.elapsed(),
            if cascaded { " (cascaded)" } else { "" }
        );
        if self.finished.len() == FINISHED_HISTORY {
            self.finished.pop_front();
        }
        self.finished.push_back((scope.handle.id, outcome.into()));

        ScopeEnd {
            handle: scope.handle,
            parent,
            outcome,
            cascaded,
        }
    }

    /// Keep a successful statement's changes for the innermost scope.
    /// Outside any transaction they are already durable and are dropped.
    pub fn record(&mut self, changes: Vec<Change>) {
        if !self.stack.is_empty() {
            self.undo_log.extend(changes);
        }
    }

    /// Mark the innermost scope as unusable after a failed write.
    pub fn invalidate_current(&mut self, reason: &str) {
        if let Some(scope) = self.stack.last_mut() {
            warn!("{} invalidated: {}", scope.handle.id, reason);
            scope.invalidated = Some(reason.to_string());
        }
    }

    /// Fails when the innermost scope has been invalidated.
    pub fn ensure_usable(&self) -> Result<()> {
        match self.stack.last() {
            Some(Scope {
                handle,
                invalidated: Some(reason),
                ..
            }) => Err(DbError::InvalidScope(format!(
                "{} was invalidated by a previous error: {}; roll it back before issuing statements",
                handle.id, reason
            ))),
            _ => Ok(()),
        }
    }

    pub fn is_active(&self, handle: &TransactionHandle) -> bool {
        self.position(handle).is_some()
    }

    /// `None` for a handle this manager never issued, or one that ended
    /// too long ago to be remembered.
    pub fn state(&self, handle: &TransactionHandle) -> Option<TransactionState> {
        if self.is_active(handle) {
            return Some(TransactionState::Active);
        }
        self.finished
            .iter()
            .rev()
            .find(|(id, _)| *id == handle.id)
            .map(|(_, state)| *state)
    }

    pub fn is_invalidated(&self, handle: &TransactionHandle) -> bool {
        self.position(handle)
            .is_some_and(|i| self.stack[i].invalidated.is_some())
    }

    pub fn current(&self) -> Option<TransactionHandle> {
        self.stack.last().map(|s| s.handle)
    }

    pub fn root(&self) -> Option<TransactionHandle> {
        self.stack.first().map(|s| s.handle)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn in_transaction(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn pending_changes(&self) -> usize {
        self.undo_log.len()
    }

    pub fn describe(&self) -> Vec<ScopeInfo> {
        self.stack
            .iter()
            .enumerate()
            .map(|(depth, scope)| ScopeInfo {
                id: scope.handle.id,
                parent: scope.handle.parent,
                nested: scope.handle.nested,
                depth,
                invalidated: scope.invalidated.clone(),
                pending_changes: self.undo_log.len().saturating_sub(scope.undo_mark),
                age_ms: scope.started.elapsed().as_millis(),
            })
            .collect()
    }

    fn position(&self, handle: &TransactionHandle) -> Option<usize> {
        self.stack.iter().position(|s| s.handle.id == handle.id)
    }
}
