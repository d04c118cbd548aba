/// Transaction scope tests
///
/// Nested transactions, savepoints and cascading ends on one connection.
/// Run with: cargo test --test scope_manager_tests

use savepointdb::{
    Connection, ConnectionConfig, DbError, Outcome, Record, ScopeEnd, TransactionState, Value,
};
use std::sync::{Arc, Mutex};

fn connection() -> Connection {
    let conn = Connection::open(ConnectionConfig::new("scopes")).unwrap();
    conn.create_table(Record::table_schema("thing")).unwrap();
    conn.execute(
        "INSERT INTO thing (name, created_by) VALUES ('name-default', 'user-default')",
        &[],
    )
    .unwrap();
    conn
}

fn names(conn: &Connection) -> Vec<Value> {
    conn.execute("SELECT name FROM thing ORDER BY id", &[])
        .unwrap()
        .column("name")
        .unwrap()
}

fn count(conn: &Connection) -> i64 {
    conn.scalar("SELECT COUNT(*) FROM thing", &[]).unwrap().as_i64().unwrap()
}

#[test]
fn test_rollback_isolation_for_every_scope_kind() {
    let conn = connection();
    let base = conn.begin().unwrap();

    for nested in [false, true] {
        let handle = conn.begin_scope(nested).unwrap();
        conn.execute("INSERT INTO thing (name, created_by) VALUES ('tmp', 'x')", &[]).unwrap();
        conn.execute("UPDATE thing SET name = 'changed' WHERE id = 1", &[]).unwrap();
        conn.execute("DELETE FROM thing WHERE name = 'tmp'", &[]).unwrap();
        conn.execute("INSERT INTO thing (name, created_by) VALUES ('tmp2', 'x')", &[]).unwrap();
        conn.rollback(&handle).unwrap();

        assert_eq!(names(&conn), vec![Value::from("name-default")]);
        assert_eq!(conn.current().unwrap(), Some(base));
    }

    conn.rollback(&base).unwrap();
    assert_eq!(count(&conn), 1);
}

#[test]
fn test_commit_then_rollback_parent() {
    let conn = connection();
    let base = conn.begin().unwrap();
    let savepoint = conn.begin_nested().unwrap();
    conn.execute("INSERT INTO thing (name, created_by) VALUES ('name-extra', 'user-extra')", &[])
        .unwrap();
    conn.commit(&savepoint).unwrap();

    // Still visible inside the parent
    assert_eq!(count(&conn), 2);
    assert_eq!(conn.state(&savepoint).unwrap(), Some(TransactionState::Committed));

    conn.rollback(&base).unwrap();
    assert_eq!(count(&conn), 1);
    assert_eq!(names(&conn), vec![Value::from("name-default")]);
}

#[test]
fn test_ending_parent_ends_every_child() {
    let conn = connection();
    let base = conn.begin().unwrap();
    let sub = conn.begin().unwrap();
    let savepoint = conn.begin_nested().unwrap();
    let inner = conn.begin_nested().unwrap();
    conn.execute("UPDATE thing SET name = 'deep' WHERE id = 1", &[]).unwrap();

    conn.commit(&sub).unwrap();

    assert!(!conn.is_active(&inner));
    assert!(!conn.is_active(&savepoint));
    assert!(!conn.is_active(&sub));
    assert!(conn.is_active(&base));
    assert_eq!(conn.state(&inner).unwrap(), Some(TransactionState::RolledBack));
    assert_eq!(conn.state(&sub).unwrap(), Some(TransactionState::Committed));

    // Committing sub cascaded a rollback through its children first
    assert_eq!(names(&conn), vec![Value::from("name-default")]);
    conn.rollback(&base).unwrap();
}

#[test]
fn test_misuse_of_handles() {
    let conn = connection();

    let err = conn.begin_nested().unwrap_err();
    assert!(matches!(err, DbError::InvalidScope(_)));

    let base = conn.begin().unwrap();
    conn.commit(&base).unwrap();
    assert!(conn.commit(&base).unwrap_err().is_invalid_scope());
    assert!(conn.rollback(&base).unwrap_err().is_invalid_scope());
}

#[test]
fn test_ids_increase_and_parents_nest() {
    let conn = connection();
    let base = conn.begin().unwrap();
    let sub = conn.begin().unwrap();
    let savepoint = conn.begin_nested().unwrap();

    assert!(base.id < sub.id && sub.id < savepoint.id);
    assert_eq!(base.parent, None);
    assert_eq!(sub.parent, Some(base.id));
    assert_eq!(savepoint.parent, Some(sub.id));
    assert!(savepoint.nested && !sub.nested);

    let scopes = conn.scopes().unwrap();
    assert_eq!(scopes.len(), 3);
    assert_eq!(scopes[2].depth, 2);
    conn.rollback(&base).unwrap();
}

#[test]
fn test_listeners_see_every_end_innermost_first() {
    let conn = connection();
    let seen: Arc<Mutex<Vec<(u64, Outcome, bool)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let id = conn
        .add_listener(Arc::new(move |event: &ScopeEnd| {
            sink.lock()
                .unwrap()
                .push((event.handle.id.0, event.outcome, event.cascaded));
        }))
        .unwrap();

    let base = conn.begin().unwrap();
    let savepoint = conn.begin_nested().unwrap();
    conn.commit(&base).unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (savepoint.id.0, Outcome::Rollback, true),
            (base.id.0, Outcome::Commit, false),
        ]
    );

    assert!(conn.remove_listener(id).unwrap());
    let other = conn.begin().unwrap();
    conn.rollback(&other).unwrap();
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[test]
fn test_closing_rolls_back_open_scopes() {
    let conn = connection();
    let other = conn.clone();
    let base = conn.begin().unwrap();
    conn.execute("DELETE FROM thing", &[]).unwrap();

    other.close().unwrap();
    assert!(conn.is_closed());
    assert_eq!(conn.state(&base).unwrap(), Some(TransactionState::RolledBack));
    assert!(conn.execute("SELECT id FROM thing", &[]).is_err());
}
