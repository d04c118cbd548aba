//! Per-session identity map.
//!
//! Holds at most one snapshot per primary key. Entries are attributed to
//! the innermost scope that last loaded or wrote them, which is what lets
//! a scope rollback discard exactly the entries it produced.

use super::record::Record;
use crate::transaction::{Outcome, ScopeEnd, TransactionHandle, TransactionId};
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryState {
    /// Snapshot is served without reading storage
    Loaded,
    /// Next load re-reads storage
    Stale,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub record: Record,
    pub state: EntryState,
    /// Innermost scope that last loaded or flushed this entry
    pub touched_in: Option<TransactionId>,
    /// Cache generation the entry was loaded in
    pub generation: u64,
    /// Has local edits not yet flushed
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingRecord {
    pub record: Record,
    pub tracked_in: Option<TransactionId>,
}

fn within(touched: Option<TransactionId>, scope: TransactionId) -> bool {
    touched.is_some_and(|t| t >= scope)
}

#[derive(Debug, Default)]
pub struct IdentityMap {
    entries: BTreeMap<i64, CacheEntry>,
    pending: Vec<PendingRecord>,
    generation: u64,
    expire_on_commit: bool,
    restart_savepoint: bool,
    /// Savepoint the session itself opened, if still open
    savepoint: Option<TransactionHandle>,
    /// Scope under which a fresh savepoint should be opened next
    restart_under: Option<TransactionHandle>,
}

impl IdentityMap {
    pub fn new(expire_on_commit: bool, restart_savepoint: bool) -> Self {
        Self {
            expire_on_commit,
            restart_savepoint,
            ..Self::default()
        }
    }

    /// Snapshot for `id` if the entry is live
    pub fn get_live(&self, id: i64) -> Option<Record> {
        self.entries
            .get(&id)
            .filter(|e| e.state == EntryState::Loaded)
            .map(|e| e.record.clone())
    }

    pub fn entry(&self, id: i64) -> Option<&CacheEntry> {
        self.entries.get(&id)
    }

    /// Store a freshly read or flushed snapshot, replacing any entry.
    pub fn install(&mut self, record: Record, txn: Option<TransactionId>) -> Option<Record> {
        let id = record.id?;
        debug!("identity map: load {} (generation {})", id, self.generation);
        self.entries.insert(
            id,
            CacheEntry {
                record: record.clone(),
                state: EntryState::Loaded,
                touched_in: txn,
                generation: self.generation,
                dirty: false,
            },
        );
        Some(record)
    }

    /// Return the live entry, or store `record` when there is none.
    pub fn merge(&mut self, record: Record, txn: Option<TransactionId>) -> Option<Record> {
        match record.id.and_then(|id| self.get_live(id)) {
            Some(cached) => Some(cached),
            None => self.install(record, txn),
        }
    }

    pub fn remove(&mut self, id: i64) -> Option<CacheEntry> {
        self.entries.remove(&id)
    }

    /// Mark an entry stale and drop its unflushed edits. Returns false
    /// when there is no entry.
    pub fn expire(&mut self, id: i64) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) => {
                debug!("identity map: expire {}", id);
                entry.state = EntryState::Stale;
                entry.dirty = false;
                true
            }
            None => false,
        }
    }

    pub fn expire_all(&mut self) {
        debug!("identity map: expire all {} entries", self.entries.len());
        for entry in self.entries.values_mut() {
            entry.state = EntryState::Stale;
            entry.dirty = false;
        }
    }

    /// Apply a local edit to a live entry
    pub fn modify<F>(&mut self, id: i64, txn: Option<TransactionId>, edit: F) -> Option<Record>
    where
        F: FnOnce(&mut Record),
    {
        let entry = self
            .entries
            .get_mut(&id)
            .filter(|e| e.state == EntryState::Loaded)?;
        edit(&mut entry.record);
        // The identity of an entry never changes
        entry.record.id = Some(id);
        entry.dirty = true;
        entry.touched_in = txn;
        Some(entry.record.clone())
    }

    /// Register a persistent record as carrying local edits
    pub fn attach(&mut self, record: Record, txn: Option<TransactionId>) {
        let Some(id) = record.id else {
            return;
        };
        self.entries.insert(
            id,
            CacheEntry {
                record,
                state: EntryState::Loaded,
                touched_in: txn,
                generation: self.generation,
                dirty: true,
            },
        );
    }

    pub fn add_pending(&mut self, record: Record, txn: Option<TransactionId>) {
        self.pending.push(PendingRecord {
            record,
            tracked_in: txn,
        });
    }

    pub(crate) fn first_pending(&self) -> Option<&PendingRecord> {
        self.pending.first()
    }

    pub(crate) fn pop_pending(&mut self) -> Option<PendingRecord> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.remove(0))
        }
    }

    /// Drop every pending record, returning how many were dropped
    pub fn discard_pending(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    /// The first pending record failed to flush.
    ///
    /// Inside a transaction it now belongs to the scope the flush ran in,
    /// so rolling that scope back discards it. In autocommit mode nothing
    /// can roll it back, so it is dropped and returned.
    pub(crate) fn fail_pending(&mut self, txn: Option<TransactionId>) -> Option<Record> {
        if txn.is_none() {
            return self.pop_pending().map(|p| {
                debug!("identity map: dropped {} after failed flush", p.record);
                p.record
            });
        }
        if let Some(first) = self.pending.first_mut() {
            first.tracked_in = txn;
        }
        None
    }

    /// The UPDATE for a dirty entry failed. Same rules as
    /// [`IdentityMap::fail_pending`]: the entry moves to the flushing scope,
    /// or loses its edits in autocommit mode.
    pub(crate) fn fail_entry(&mut self, id: i64, txn: Option<TransactionId>) {
        if txn.is_none() {
            self.expire(id);
        } else if let Some(entry) = self.entries.get_mut(&id) {
            entry.touched_in = txn;
        }
    }

    pub fn dirty_records(&self) -> Vec<Record> {
        self.entries
            .values()
            .filter(|e| e.dirty)
            .map(|e| e.record.clone())
            .collect()
    }

    pub fn mark_clean(&mut self, id: i64, txn: Option<TransactionId>) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.dirty = false;
            entry.touched_in = txn;
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_unflushed(&self) -> bool {
        !self.pending.is_empty() || self.entries.values().any(|e| e.dirty)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Record the session savepoint. A pending restart is satisfied by it.
    pub fn set_savepoint(&mut self, handle: TransactionHandle) {
        self.savepoint = Some(handle);
        self.restart_under = None;
    }

    pub fn savepoint(&self) -> Option<TransactionHandle> {
        self.savepoint
    }

    /// Scope a fresh session savepoint should be opened under. Stays set
    /// until a savepoint is opened or that scope ends.
    pub fn restart_target(&self) -> Option<TransactionHandle> {
        self.restart_under
    }

    /// React to one ended scope.
    pub fn on_scope_end(&mut self, event: &ScopeEnd) {
        let scope = event.handle.id;

        match event.outcome {
            Outcome::Rollback => {
                let before = self.entries.len();
                self.entries.retain(|_, e| !within(e.touched_in, scope));
                self.pending.retain(|p| !within(p.tracked_in, scope));
                debug!(
                    "identity map: rollback of {} discarded {} entries",
                    scope,
                    before - self.entries.len()
                );
            }
            Outcome::Commit => {
                let parent = event.parent.map(|p| p.id);
                for entry in self.entries.values_mut() {
                    if within(entry.touched_in, scope) {
                        entry.touched_in = parent;
                    }
                }
                for pending in &mut self.pending {
                    if within(pending.tracked_in, scope) {
                        pending.tracked_in = parent;
                    }
                }
                if parent.is_none() && self.expire_on_commit {
                    self.expire_all();
                }
            }
        }

        if event.rotates_generation() {
            self.generation += 1;
            debug!("identity map: generation {} begins", self.generation);
        }

        if self.savepoint.is_some_and(|sp| sp.id == scope) {
            self.savepoint = None;
            if self.restart_savepoint && !event.cascaded && event.rotates_generation() {
                self.restart_under = event.parent;
            }
        }
        if self.restart_under.is_some_and(|h| h.id == scope) {
            self.restart_under = None;
        }
    }
}
