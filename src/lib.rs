// ============================================================================
// SavepointDB Library
// ============================================================================
//
// Embedded in-memory store for pinning down what a data-access layer
// guarantees when nested transactions, savepoints, a session identity map
// and direct statement execution all touch the same row.
//
// ============================================================================

pub mod connection;
pub mod core;
mod evaluator;
mod executor;
pub mod facade;
pub mod harness;
mod parser;
mod plugins;
pub mod result;
pub mod session;
pub mod storage;
pub mod transaction;

// Re-export main types for convenience
pub use core::{DataType, DbError, Result, Value};
pub use result::QueryResult;
pub use storage::TableSchema;

pub use connection::{config::ConnectionConfig, Connection};
pub use transaction::{
    Outcome, ScopeEnd, ScopeListener, TransactionHandle, TransactionId, TransactionState,
};
pub use session::{EntryState, Record, Session, SessionConfig};

/// Open a connection with the mapped table created and a session on it.
///
/// # Examples
///
/// ```
/// use savepointdb::{open_session, Record};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let session = open_session("savepointdb://demo")?;
/// let conn = session.connection().clone();
///
/// let base = conn.begin()?;
/// session.persist(Record::new("name-default", "user-default"))?;
/// conn.rollback(&base)?;
///
/// assert_eq!(session.query().count()?, 0);
/// # Ok(())
/// # }
/// ```
pub fn open_session(url: &str) -> Result<Session> {
    let conn = Connection::open_url(url)?;
    let config = SessionConfig::default();
    conn.create_table(Record::table_schema(&config.table))?;
    Session::with_config(conn, config)
}
