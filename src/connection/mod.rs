pub mod config;

use crate::core::{DbError, Result, Value};
use crate::facade::Database;
use crate::result::QueryResult;
use crate::storage::TableSchema;
use crate::transaction::{
    ListenerId, ListenerRegistry, Outcome, ScopeEnd, ScopeInfo, ScopeListener, ScopeManager,
    TransactionHandle, TransactionState,
};
use config::ConnectionConfig;
use log::{debug, info, log_enabled, Level};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Database connection handle
///
/// One logical connection: its own storage, its own scope stack. Cloning
/// the handle shares both, which is how a session and a test body work on
/// the same connection.
#[derive(Clone)]
pub struct Connection {
    id: u64,
    config: Arc<ConnectionConfig>,
    inner: Arc<Mutex<ConnectionInner>>,
    listeners: Arc<RwLock<ListenerRegistry>>,
}

struct ConnectionInner {
    db: Database,
    scopes: ScopeManager,
    closed: bool,
}

impl Connection {
    pub fn open(config: ConnectionConfig) -> Result<Self> {
        config.validate().map_err(DbError::ExecutionError)?;

        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::SeqCst);
        debug!("opened connection {} to '{}'", id, config.database);

        Ok(Self {
            id,
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(ConnectionInner {
                db: Database::new(),
                scopes: ScopeManager::new(),
                closed: false,
            })),
            listeners: Arc::new(RwLock::new(ListenerRegistry::new())),
        })
    }

    /// Open from a `savepointdb://` URL
    pub fn open_url(url: &str) -> Result<Self> {
        let config = ConnectionConfig::from_url(url).map_err(DbError::ParseError)?;
        Self::open(config)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, ConnectionInner>> {
        let inner = self.inner.lock()?;
        if inner.closed {
            return Err(DbError::ExecutionError("Connection is closed".into()));
        }
        Ok(inner)
    }

    /// Execute one SQL statement with positional parameters.
    ///
    /// A statement either applies completely or not at all. A constraint
    /// violation also invalidates the innermost open scope.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// conn.execute(
    ///     "UPDATE thing SET name = $1 WHERE id = $2",
    ///     &["update1-name".into(), 1i64.into()],
    /// )?;
    /// ```
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let mut inner = self.lock()?;
        inner.scopes.ensure_usable()?;

        if self.config.echo {
            if params.is_empty() {
                info!("[{}] {}", self.config.database, sql);
            } else {
                info!("[{}] {} {:?}", self.config.database, sql, params);
            }
        }

        match inner.db.execute(sql, params) {
            Ok((result, journal)) => {
                inner.scopes.record(journal);
                Ok(result)
            }
            Err(err) => {
                if err.is_constraint_violation() {
                    inner.scopes.invalidate_current(&err.to_string());
                }
                Err(err)
            }
        }
    }

    /// Run a query expected to return one value, e.g. `SELECT COUNT(*)`
    pub fn scalar(&self, sql: &str, params: &[Value]) -> Result<Value> {
        self.execute(sql, params)?
            .scalar()
            .cloned()
            .ok_or_else(|| DbError::ExecutionError(format!("query returned no rows: {}", sql)))
    }

    /// Begin a plain transaction, or a plain inner scope when one is open
    pub fn begin(&self) -> Result<TransactionHandle> {
        self.begin_scope(false)
    }

    /// Begin a savepoint inside the current scope
    pub fn begin_nested(&self) -> Result<TransactionHandle> {
        self.begin_scope(true)
    }

    pub fn begin_scope(&self, nested: bool) -> Result<TransactionHandle> {
        let mut inner = self.lock()?;
        let handle = inner.scopes.begin(nested)?;
        if self.config.echo {
            if nested {
                info!("[{}] SAVEPOINT {}", self.config.database, handle.savepoint_name());
            } else {
                info!("[{}] BEGIN", self.config.database);
            }
        }
        Self::log_scopes(&inner);
        Ok(handle)
    }

    pub fn commit(&self, handle: &TransactionHandle) -> Result<()> {
        self.end(handle, Outcome::Commit)
    }

    pub fn rollback(&self, handle: &TransactionHandle) -> Result<()> {
        self.end(handle, Outcome::Rollback)
    }

    /// End `handle`, cascading a rollback to every scope opened after it,
    /// then notify listeners once per ended scope.
    pub fn end(&self, handle: &TransactionHandle, outcome: Outcome) -> Result<()> {
        let events = {
            let mut inner = self.lock()?;
            let ConnectionInner { db, scopes, .. } = &mut *inner;
            let events = scopes.end(handle, outcome, db.storage_mut())?;
            if self.config.echo {
                for event in &events {
                    self.echo_end(event);
                }
            }
            Self::log_scopes(&inner);
            events
        };

        self.dispatch(&events)
    }

    fn echo_end(&self, event: &ScopeEnd) {
        let name = event.handle.savepoint_name();
        let verb = match (event.handle.nested, event.outcome) {
            (true, Outcome::Commit) => format!("RELEASE SAVEPOINT {}", name),
            (true, Outcome::Rollback) => format!("ROLLBACK TO SAVEPOINT {}", name),
            (false, outcome) => outcome.to_string(),
        };
        info!("[{}] {}", self.config.database, verb);
    }

    fn dispatch(&self, events: &[ScopeEnd]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let listeners = self.listeners.read()?.snapshot();
        for event in events {
            debug!(
                "scope end: {} {}{}",
                event.handle,
                event.outcome,
                if event.cascaded { " (cascaded)" } else { "" }
            );
            for listener in &listeners {
                listener.on_scope_end(event);
            }
        }
        Ok(())
    }

    fn log_scopes(inner: &ConnectionInner) {
        if log_enabled!(Level::Debug) {
            match serde_json::to_string(&inner.scopes.describe()) {
                Ok(json) => debug!("scopes: {}", json),
                Err(err) => debug!("scopes: <unserializable: {}>", err),
            }
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn ScopeListener>) -> Result<ListenerId> {
        Ok(self.listeners.write()?.add(listener))
    }

    pub fn remove_listener(&self, id: ListenerId) -> Result<bool> {
        Ok(self.listeners.write()?.remove(id))
    }

    pub fn is_active(&self, handle: &TransactionHandle) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.scopes.is_active(handle))
            .unwrap_or(false)
    }

    pub fn state(&self, handle: &TransactionHandle) -> Result<Option<TransactionState>> {
        Ok(self.inner.lock()?.scopes.state(handle))
    }

    pub fn is_invalidated(&self, handle: &TransactionHandle) -> Result<bool> {
        Ok(self.inner.lock()?.scopes.is_invalidated(handle))
    }

    /// Innermost open scope
    pub fn current(&self) -> Result<Option<TransactionHandle>> {
        Ok(self.inner.lock()?.scopes.current())
    }

    pub fn in_transaction(&self) -> Result<bool> {
        Ok(self.inner.lock()?.scopes.in_transaction())
    }

    pub fn depth(&self) -> Result<usize> {
        Ok(self.inner.lock()?.scopes.depth())
    }

    /// Open scopes, outermost first
    pub fn scopes(&self) -> Result<Vec<ScopeInfo>> {
        Ok(self.inner.lock()?.scopes.describe())
    }

    pub fn create_table(&self, schema: TableSchema) -> Result<()> {
        self.lock()?.db.create_table(schema)
    }

    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.lock()?.db.drop_table(name)
    }

    pub fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(self.lock()?.db.table_exists(name))
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().map(|inner| inner.closed).unwrap_or(true)
    }

    /// Roll back every open scope and refuse further use.
    pub fn close(&self) -> Result<()> {
        let events = {
            let mut inner = self.inner.lock()?;
            if inner.closed {
                return Ok(());
            }
            let ConnectionInner { db, scopes, closed } = &mut *inner;
            let events = scopes.rollback_all(db.storage_mut());
            *closed = true;
            debug!("closed connection {}", self.id);
            events
        };

        self.dispatch(&events)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("database", &self.config.database)
            .finish()
    }
}
