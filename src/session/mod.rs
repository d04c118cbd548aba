// ============================================================================
// Session: identity-mapped access to one table
// ============================================================================
//
// Reads go through the identity map: a live entry is returned without
// touching storage. Writes made through the session stay local until
// flushed. Writes made directly on the connection are never patched into
// existing entries, so the map can go stale until `load_fresh` or
// `expire` resynchronizes it.
//
// The map follows scope boundaries through a listener registered on the
// connection; see `IdentityMap::on_scope_end`.
//
// ============================================================================

pub mod config;
pub mod identity_map;
pub mod query;
pub mod record;

pub use config::SessionConfig;
pub use identity_map::{CacheEntry, EntryState, IdentityMap};
pub use query::SessionQuery;
pub use record::Record;

use crate::connection::Connection;
use crate::core::{DbError, Result, Value};
use crate::result::QueryResult;
use crate::transaction::{ListenerId, ScopeEnd, TransactionHandle, TransactionId};
use log::{debug, warn};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct Session {
    conn: Connection,
    map: Arc<Mutex<IdentityMap>>,
    listener_id: ListenerId,
    config: SessionConfig,
}

impl Session {
    pub fn new(conn: Connection) -> Result<Self> {
        Self::with_config(conn, SessionConfig::default())
    }

    pub fn with_config(conn: Connection, config: SessionConfig) -> Result<Self> {
        config.validate().map_err(DbError::ExecutionError)?;

        let map = Arc::new(Mutex::new(IdentityMap::new(
            config.expire_on_commit,
            config.restart_savepoint,
        )));

        // The listener must not keep the map alive after the session is gone
        let weak = Arc::downgrade(&map);
        let listener_id = conn.add_listener(Arc::new(move |event: &ScopeEnd| {
            if let Some(map) = weak.upgrade() {
                match map.lock() {
                    Ok(mut map) => map.on_scope_end(event),
                    Err(err) => warn!("identity map unavailable for scope end: {}", err),
                }
            }
        }))?;

        debug!("session attached to connection {} (table '{}')", conn.id(), config.table);
        Ok(Self {
            conn,
            map,
            listener_id,
            config,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn map(&self) -> Result<MutexGuard<'_, IdentityMap>> {
        Ok(self.map.lock()?)
    }

    fn current_txn(&self) -> Result<Option<TransactionId>> {
        Ok(self.conn.current()?.map(|h| h.id))
    }

    fn not_found(&self, id: i64) -> DbError {
        DbError::RecordNotFound(self.config.table.clone(), id)
    }

    /// Reopen the session savepoint once its parent is current again
    fn prepare(&self) -> Result<()> {
        let Some(parent) = self.map()?.restart_target() else {
            return Ok(());
        };
        if self.conn.current()? == Some(parent) && !self.conn.is_invalidated(&parent)? {
            let savepoint = self.conn.begin_nested()?;
            debug!("session savepoint restarted as {}", savepoint);
            self.map()?.set_savepoint(savepoint);
        }
        Ok(())
    }

    fn autoflush(&self) -> Result<()> {
        if self.config.autoflush {
            self.flush()?;
        }
        Ok(())
    }

    pub(crate) fn select_sql(&self) -> String {
        format!("SELECT id, name, created_by FROM {}", self.config.table)
    }

    fn fetch(&self, id: i64) -> Result<Option<Record>> {
        let sql = format!("{} WHERE id = $1", self.select_sql());
        let result = self.conn.execute(&sql, &[Value::Integer(id)])?;
        result.rows().first().map(Record::from_row).transpose()
    }

    /// Rows from storage, resolved through the identity map
    pub(crate) fn resolve(&self, result: &QueryResult, refresh: bool) -> Result<Vec<Record>> {
        let txn = self.current_txn()?;
        let mut map = self.map()?;
        let mut records = Vec::with_capacity(result.row_count());
        for row in result.rows() {
            let fresh = Record::from_row(row)?;
            let resolved = if refresh {
                map.install(fresh, txn)
            } else {
                map.merge(fresh, txn)
            };
            records.extend(resolved);
        }
        Ok(records)
    }

    /// Record by primary key, served from the identity map when live
    pub fn load(&self, id: i64) -> Result<Record> {
        self.get(id)?.ok_or_else(|| self.not_found(id))
    }

    /// Like [`Session::load`], but a missing row is `None`
    pub fn get(&self, id: i64) -> Result<Option<Record>> {
        self.prepare()?;
        if let Some(record) = self.map()?.get_live(id) {
            return Ok(Some(record));
        }

        self.autoflush()?;
        let txn = self.current_txn()?;
        match self.fetch(id)? {
            Some(record) => Ok(self.map()?.merge(record, txn)),
            None => {
                self.map()?.remove(id);
                Ok(None)
            }
        }
    }

    /// Always re-read storage and overwrite the entry, dropping local edits
    pub fn load_fresh(&self, id: i64) -> Result<Record> {
        self.prepare()?;
        self.autoflush()?;
        let txn = self.current_txn()?;
        match self.fetch(id)? {
            Some(record) => self.map()?.install(record, txn).ok_or_else(|| self.not_found(id)),
            None => {
                self.map()?.remove(id);
                Err(self.not_found(id))
            }
        }
    }

    pub fn expire(&self, id: i64) -> Result<bool> {
        Ok(self.map()?.expire(id))
    }

    pub fn expire_all(&self) -> Result<()> {
        self.map()?.expire_all();
        Ok(())
    }

    /// Register a record with the session.
    ///
    /// A transient record waits for the next flush; a persistent one is
    /// attached as carrying local edits.
    pub fn track(&self, record: Record) -> Result<()> {
        self.prepare()?;
        let txn = self.current_txn()?;
        let mut map = self.map()?;
        if record.is_transient() {
            debug!("session: tracking new {}", record);
            map.add_pending(record, txn);
        } else {
            map.attach(record, txn);
        }
        Ok(())
    }

    /// Write pending inserts and local edits to storage.
    ///
    /// Returns the records inserted by this flush. Inside a transaction a
    /// record that fails to flush stays pending until the current scope is
    /// rolled back. In autocommit mode it is dropped instead.
    pub fn flush(&self) -> Result<Vec<Record>> {
        self.prepare()?;
        let txn = self.current_txn()?;
        let table = &self.config.table;

        let mut inserted = Vec::new();
        loop {
            let Some(pending) = self.map()?.first_pending().cloned() else {
                break;
            };
            let result = match self.conn.execute(
                &format!("INSERT INTO {} (name, created_by) VALUES ($1, $2)", table),
                &[
                    Value::from(pending.record.name.clone()),
                    Value::from(pending.record.created_by.clone()),
                ],
            ) {
                Ok(result) => result,
                Err(err) => {
                    self.map()?.fail_pending(txn);
                    return Err(err);
                }
            };
            let id = result.inserted_ids.first().copied().ok_or_else(|| {
                DbError::ExecutionError("INSERT returned no primary key".into())
            })?;

            let record = pending.record.with_id(id);
            let mut map = self.map()?;
            map.pop_pending();
            map.install(record.clone(), txn);
            inserted.push(record);
        }

        let dirty = self.map()?.dirty_records();
        for record in dirty {
            let Some(id) = record.id else {
                continue;
            };
            let result = match self.conn.execute(
                &format!("UPDATE {} SET name = $1, created_by = $2 WHERE id = $3", table),
                &[
                    Value::from(record.name.clone()),
                    Value::from(record.created_by.clone()),
                    Value::Integer(id),
                ],
            ) {
                Ok(result) => result,
                Err(err) => {
                    self.map()?.fail_entry(id, txn);
                    return Err(err);
                }
            };
            if result.affected_rows() == 0 {
                self.map()?.remove(id);
                return Err(self.not_found(id));
            }
            self.map()?.mark_clean(id, txn);
        }

        if !inserted.is_empty() {
            debug!("session: flushed {} new record(s)", inserted.len());
        }
        Ok(inserted)
    }

    /// Track and flush in one step, returning the stored record
    pub fn persist(&self, record: Record) -> Result<Record> {
        match record.id {
            None => {
                self.track(record)?;
                self.flush()?
                    .pop()
                    .ok_or_else(|| DbError::ExecutionError("record was not inserted".into()))
            }
            Some(id) => {
                self.track(record)?;
                self.flush()?;
                self.load(id)
            }
        }
    }

    /// Edit the cached record locally; storage sees it on the next flush
    pub fn modify<F>(&self, id: i64, edit: F) -> Result<Record>
    where
        F: FnOnce(&mut Record),
    {
        self.load(id)?;
        let txn = self.current_txn()?;
        self.map()?.modify(id, txn, edit).ok_or_else(|| self.not_found(id))
    }

    pub fn query(&self) -> SessionQuery<'_> {
        SessionQuery::new(self)
    }

    /// Whether a row with this key is visible through the session
    pub fn exists(&self, id: i64) -> Result<bool> {
        Ok(self.query().filter_by("id", id).first()?.is_some())
    }

    /// Run SQL on the session's connection, after an autoflush
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.prepare()?;
        self.autoflush()?;
        self.conn.execute(sql, params)
    }

    pub fn entry(&self, id: i64) -> Result<Option<CacheEntry>> {
        Ok(self.map()?.entry(id).cloned())
    }

    pub fn entry_state(&self, id: i64) -> Result<Option<EntryState>> {
        Ok(self.map()?.entry(id).map(|e| e.state))
    }

    pub fn is_tracked(&self, id: i64) -> Result<bool> {
        Ok(self.map()?.entry(id).is_some())
    }

    pub fn pending_count(&self) -> Result<usize> {
        Ok(self.map()?.pending_count())
    }

    /// Forget every record still waiting for a flush
    pub fn discard_pending(&self) -> Result<usize> {
        let count = self.map()?.discard_pending();
        if count > 0 {
            debug!("session: discarded {} pending record(s)", count);
        }
        Ok(count)
    }

    pub fn generation(&self) -> Result<u64> {
        Ok(self.map()?.generation())
    }

    /// Savepoint opened by [`Session::begin_nested`], while it is open
    pub fn savepoint(&self) -> Result<Option<TransactionHandle>> {
        Ok(self.map()?.savepoint())
    }

    pub fn begin(&self) -> Result<TransactionHandle> {
        self.prepare()?;
        self.conn.begin()
    }

    /// Flush, then open a savepoint owned by this session
    pub fn begin_nested(&self) -> Result<TransactionHandle> {
        self.flush()?;
        let savepoint = self.conn.begin_nested()?;
        self.map()?.set_savepoint(savepoint);
        Ok(savepoint)
    }

    /// Flush, then commit `handle`
    pub fn commit(&self, handle: &TransactionHandle) -> Result<()> {
        self.flush()?;
        self.conn.commit(handle)
    }

    pub fn rollback(&self, handle: &TransactionHandle) -> Result<()> {
        self.conn.rollback(handle)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(err) = self.conn.remove_listener(self.listener_id) {
            warn!("failed to detach session listener: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::config::ConnectionConfig;

    fn session() -> Session {
        let conn = Connection::open(ConnectionConfig::default()).unwrap();
        conn.create_table(Record::table_schema("thing")).unwrap();
        Session::new(conn).unwrap()
    }

    #[test]
    fn test_persist_and_load() {
        let session = session();
        let record = session.persist(Record::new("a", "u")).unwrap();
        assert_eq!(record.id, Some(1));
        assert_eq!(session.load(1).unwrap(), record);
        assert_eq!(session.entry_state(1).unwrap(), Some(EntryState::Loaded));
        assert!(session.load(2).unwrap_err().to_string().contains("not found"));
        assert_eq!(session.get(2).unwrap(), None);
    }

    #[test]
    fn test_modify_is_local_until_flush() {
        let session = session();
        session.persist(Record::new("a", "u")).unwrap();
        session.modify(1, |r| r.name = "b".into()).unwrap();

        let raw = session.connection().scalar("SELECT name FROM thing WHERE id = 1", &[]).unwrap();
        assert_eq!(raw, Value::from("a"));
        assert_eq!(session.load(1).unwrap().name, "b");

        session.flush().unwrap();
        let raw = session.connection().scalar("SELECT name FROM thing WHERE id = 1", &[]).unwrap();
        assert_eq!(raw, Value::from("b"));
    }

    #[test]
    fn test_autoflush_before_execute() {
        let session = session();
        session.track(Record::new("a", "u")).unwrap();
        assert_eq!(session.pending_count().unwrap(), 1);
        let count = session.execute("SELECT COUNT(*) FROM thing", &[]).unwrap();
        assert_eq!(count.scalar(), Some(&Value::Integer(1)));
        assert_eq!(session.pending_count().unwrap(), 0);
    }

    #[test]
    fn test_no_autoflush() {
        let conn = Connection::open(ConnectionConfig::default()).unwrap();
        conn.create_table(Record::table_schema("thing")).unwrap();
        let session = Session::with_config(conn, SessionConfig::new().autoflush(false)).unwrap();
        session.track(Record::new("a", "u")).unwrap();
        assert_eq!(session.query().count().unwrap(), 0);
        session.flush().unwrap();
        assert_eq!(session.query().count().unwrap(), 1);
    }

    #[test]
    fn test_restart_savepoint() {
        let conn = Connection::open(ConnectionConfig::default()).unwrap();
        conn.create_table(Record::table_schema("thing")).unwrap();
        let config = SessionConfig::new().restart_savepoint(true);
        let session = Session::with_config(conn.clone(), config).unwrap();

        let base = conn.begin().unwrap();
        let first = session.begin_nested().unwrap();
        session.rollback(&first).unwrap();
        assert_eq!(session.savepoint().unwrap(), None);

        // The next session operation opens a fresh savepoint under the base
        session.persist(Record::new("a", "u")).unwrap();
        let second = session.savepoint().unwrap().unwrap();
        assert_ne!(second.id, first.id);
        assert_eq!(second.parent, Some(base.id));

        conn.rollback(&second).unwrap();
        conn.rollback(&base).unwrap();
        assert_eq!(conn.scalar("SELECT COUNT(*) FROM thing", &[]).unwrap(), Value::Integer(0));
    }

    #[test]
    fn test_restart_waits_for_own_savepoint_to_end() {
        let conn = Connection::open(ConnectionConfig::default()).unwrap();
        conn.create_table(Record::table_schema("thing")).unwrap();
        let config = SessionConfig::new().restart_savepoint(true);
        let session = Session::with_config(conn.clone(), config).unwrap();

        let base = conn.begin().unwrap();
        let first = session.begin_nested().unwrap();
        session.rollback(&first).unwrap();

        // A savepoint opened directly on the connection is current, so the
        // session does not restart under it
        let own = conn.begin_nested().unwrap();
        session.persist(Record::new("a", "u")).unwrap();
        assert_eq!(session.savepoint().unwrap(), None);

        conn.rollback(&own).unwrap();
        assert_eq!(session.query().count().unwrap(), 0);
        let restarted = session.savepoint().unwrap().unwrap();
        assert_eq!(restarted.parent, Some(base.id));
        assert_eq!(conn.current().unwrap(), Some(restarted));

        conn.rollback(&base).unwrap();
    }

    #[test]
    fn test_failed_flush_discarded_by_rollback_of_flushing_scope() {
        let session = session();
        session.persist(Record::new("a", "u")).unwrap();
        // Tracked before the transaction exists
        session.track(Record::new("a", "u")).unwrap();

        let base = session.begin().unwrap();
        assert!(session.flush().unwrap_err().is_constraint_violation());
        assert_eq!(session.pending_count().unwrap(), 1);

        session.rollback(&base).unwrap();
        assert_eq!(session.pending_count().unwrap(), 0);
        assert_eq!(session.query().count().unwrap(), 1);
        assert!(session.exists(1).unwrap());
    }

    #[test]
    fn test_failed_flush_in_autocommit_is_dropped() {
        let session = session();
        session.persist(Record::new("a", "u")).unwrap();

        let err = session.persist(Record::new("a", "u")).unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(session.pending_count().unwrap(), 0);
        assert_eq!(session.query().count().unwrap(), 1);

        // A clashing edit loses its changes instead of failing every read
        session.persist(Record::new("b", "u")).unwrap();
        session.modify(2, |r| r.name = "a".into()).unwrap();
        assert!(session.flush().unwrap_err().is_constraint_violation());
        assert_eq!(session.query().count().unwrap(), 2);
        assert_eq!(session.load(2).unwrap().name, "b");
    }

    #[test]
    fn test_discard_pending() {
        let session = session();
        session.track(Record::new("a", "u")).unwrap();
        session.track(Record::new("b", "u")).unwrap();
        assert_eq!(session.discard_pending().unwrap(), 2);
        assert_eq!(session.query().count().unwrap(), 0);
    }

    #[test]
    fn test_dropping_session_detaches_listener() {
        let conn = Connection::open(ConnectionConfig::default()).unwrap();
        conn.create_table(Record::table_schema("thing")).unwrap();
        {
            let _session = Session::new(conn.clone()).unwrap();
        }
        let txn = conn.begin().unwrap();
        conn.commit(&txn).unwrap();
    }
}
