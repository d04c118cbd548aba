use super::{check_eq, HarnessResult, DEFAULT_CREATED_BY, DEFAULT_NAME, TABLE};
use crate::connection::config::ConnectionConfig;
use crate::connection::Connection;
use crate::core::{DbError, Value};
use crate::session::{Record, Session, SessionConfig};
use crate::transaction::TransactionHandle;
use log::{debug, warn};

/// A connection with the mapped table created and one record seeded
pub struct TestDb {
    pub conn: Connection,
    pub session: Session,
    /// The seeded record as the session first loaded it
    pub obj: Record,
    pub original_id: i64,
    pub original_name: String,
    pub original_created_by: Option<String>,
}

/// Scopes a scenario body runs under
pub struct Scenario<'a> {
    pub db: &'a TestDb,
    /// Root transaction, rolled back when the scenario ends
    pub base: TransactionHandle,
    /// Plain inner scope under `base`
    pub sub: TransactionHandle,
    /// Session savepoint under `sub`; may be restarted by the body
    pub savepoint: TransactionHandle,
}

impl TestDb {
    /// Create the table and seed the default record in a committed
    /// transaction. The seeded record stays loaded in the session.
    pub fn setup(config: ConnectionConfig) -> HarnessResult<Self> {
        let conn = Connection::open(config)?;
        conn.create_table(Record::table_schema(TABLE))?;

        let session = Session::with_config(
            conn.clone(),
            SessionConfig::new().table(TABLE).restart_savepoint(true),
        )?;

        let root = conn.begin()?;
        check_eq("rows before seeding", 0, session.query().count()?)?;
        let seeded = session.persist(Record::new(DEFAULT_NAME, DEFAULT_CREATED_BY))?;
        session.commit(&root)?;

        let id = seeded
            .id
            .ok_or_else(|| DbError::ExecutionError("seeded record has no id".into()))?;
        let obj = session.load(id)?;
        debug!("harness seeded {}", obj);

        Ok(Self {
            conn,
            session,
            original_id: id,
            original_name: obj.name.clone(),
            original_created_by: obj.created_by.clone(),
            obj,
        })
    }

    /// Run `body` inside fresh scopes and roll everything back afterwards.
    ///
    /// Cleanup runs even when the body fails; the body's error wins.
    pub fn scenario<T, F>(&self, body: F) -> HarnessResult<T>
    where
        F: FnOnce(&Scenario<'_>) -> HarnessResult<T>,
    {
        let base = self.conn.begin()?;
        let sub = self.conn.begin()?;
        let savepoint = self.session.begin_nested()?;

        let outcome = body(&Scenario {
            db: self,
            base,
            sub,
            savepoint,
        });

        let cleanup = self.reset(&base);
        let value = outcome?;
        cleanup?;
        Ok(value)
    }

    fn reset(&self, base: &TransactionHandle) -> HarnessResult<()> {
        if let Some(savepoint) = self.session.savepoint()? {
            if self.conn.is_active(&savepoint) {
                self.session.rollback(&savepoint)?;
            }
        }
        if self.conn.is_active(base) {
            self.conn.rollback(base)?;
        } else {
            warn!("scenario base transaction {} already ended", base);
        }
        Ok(())
    }

    /// Read one column of one row straight from storage
    pub fn get_column(&self, id: i64, column: &str) -> HarnessResult<Value> {
        let result = self.conn.execute(
            &format!("SELECT {} FROM {} WHERE id = $1", column, TABLE),
            &[Value::Integer(id)],
        )?;
        check_eq("rows for id", 1, result.row_count())?;
        Ok(result.scalar().cloned().unwrap_or(Value::Null))
    }

    /// Number of rows as seen by a raw `COUNT(*)`
    pub fn count(&self) -> HarnessResult<i64> {
        let value = self.conn.scalar(&format!("SELECT COUNT(*) FROM {}", TABLE), &[])?;
        Ok(value.as_i64().unwrap_or_default())
    }

    /// Drop the table and close the connection
    pub fn teardown(self) -> HarnessResult<()> {
        let TestDb { conn, session, .. } = self;
        drop(session);
        conn.drop_table(TABLE)?;
        conn.close()?;
        Ok(())
    }
}
