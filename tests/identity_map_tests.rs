/// Identity map consistency tests
///
/// How session reads relate to storage when rows change underneath the
/// cache, and how scope ends discard or keep cached entries.
/// Run with: cargo test --test identity_map_tests

use savepointdb::harness::{
    check_eq, TestDb, DEFAULT_CREATED_BY, DEFAULT_NAME, EXTRA_CREATED_BY, EXTRA_NAME, UPDATE1_NAME,
    UPDATE2_CREATED_BY,
};
use savepointdb::{Connection, ConnectionConfig, EntryState, Record, Session, SessionConfig, Value};

fn setup() -> TestDb {
    TestDb::setup(ConnectionConfig::new("identity")).unwrap()
}

#[test]
fn test_default_seed_invariant() {
    let db = setup();
    for _ in 0..3 {
        db.scenario(|s| {
            let all = s.db.session.query().all()?;
            check_eq("records", 1, all.len())?;
            check_eq("name", DEFAULT_NAME, all[0].name.as_str())?;
            check_eq("created_by", Some(DEFAULT_CREATED_BY), all[0].created_by.as_deref())?;
            check_eq("id", Some(s.db.original_id), all[0].id)?;

            // Leave something behind for the next round to not see
            s.db.conn.execute("UPDATE thing SET name = 'dirty' WHERE id = 1", &[])?;
            s.db.session.persist(Record::new(EXTRA_NAME, EXTRA_CREATED_BY))?;
            Ok(())
        })
        .unwrap();
    }
    db.teardown().unwrap();
}

#[test]
fn test_concrete_direct_update_scenario() {
    let db = setup();
    db.scenario(|s| {
        let session = &s.db.session;
        let conn = &s.db.conn;
        check_eq("cached before", DEFAULT_NAME.to_string(), session.load(1)?.name)?;

        conn.execute("UPDATE thing SET name='update1-name' WHERE id=1", &[])?;
        check_eq("count", 1, s.db.count()?)?;

        check_eq("load", DEFAULT_NAME.to_string(), session.load(1)?.name)?;
        check_eq("raw read", Value::from(UPDATE1_NAME), s.db.get_column(1, "name")?)?;
        check_eq("load_fresh", UPDATE1_NAME.to_string(), session.load_fresh(1)?.name)?;
        check_eq("load after refresh", UPDATE1_NAME.to_string(), session.load(1)?.name)?;
        check_eq("count", 1, s.db.count()?)
    })
    .unwrap();

    // The refreshed entry belonged to the rolled back scenario
    assert_eq!(db.session.load(1).unwrap().name, DEFAULT_NAME);
    db.teardown().unwrap();
}

#[test]
fn test_staleness_for_created_by() {
    let db = setup();
    db.scenario(|s| {
        let session = &s.db.session;
        session.load(1)?;
        s.db.conn.execute(
            "UPDATE thing SET created_by = $1 WHERE id = $2",
            &[UPDATE2_CREATED_BY.into(), 1i64.into()],
        )?;

        check_eq("cached", Some(DEFAULT_CREATED_BY.to_string()), session.load(1)?.created_by)?;
        check_eq(
            "query without populate",
            Some(DEFAULT_CREATED_BY.to_string()),
            session.query().first()?.and_then(|r| r.created_by),
        )?;
        check_eq(
            "raw",
            Value::from(UPDATE2_CREATED_BY),
            s.db.get_column(1, "created_by")?,
        )?;
        check_eq(
            "fresh",
            Some(UPDATE2_CREATED_BY.to_string()),
            session.load_fresh(1)?.created_by,
        )
    })
    .unwrap();
    db.teardown().unwrap();
}

#[test]
fn test_populate_existing_after_inline_insert() {
    let db = setup();
    db.scenario(|s| {
        let session = &s.db.session;
        let conn = &s.db.conn;
        conn.execute("INSERT INTO thing (name) VALUES ('extra_name')", &[])?;
        conn.execute(
            "UPDATE thing SET name = $1 WHERE id = $2",
            &[UPDATE1_NAME.into(), 1i64.into()],
        )?;

        let cached = session.query().filter_by("id", 1i64).all()?;
        check_eq("cached name", DEFAULT_NAME, cached[0].name.as_str())?;
        check_eq("get", DEFAULT_NAME.to_string(), session.load(1)?.name)?;

        let all = session.query().all()?;
        check_eq("rows", 2, all.len())?;
        check_eq("first still cached", DEFAULT_NAME, all[0].name.as_str())?;

        let fresh = session.query().populate_existing().all()?;
        check_eq("rows after populate", 2, fresh.len())?;
        check_eq("first refreshed", UPDATE1_NAME, fresh[0].name.as_str())?;
        check_eq(
            "first after populate",
            UPDATE1_NAME.to_string(),
            session.query().first()?.map(|r| r.name).unwrap_or_default(),
        )
    })
    .unwrap();
    db.teardown().unwrap();
}

#[test]
fn test_expire_forces_reload() {
    let db = setup();
    db.scenario(|s| {
        let session = &s.db.session;
        session.load(1)?;
        s.db.conn.execute("UPDATE thing SET name = 'expired' WHERE id = 1", &[])?;

        check_eq("expire", true, session.expire(1)?)?;
        check_eq("state", Some(EntryState::Stale), session.entry_state(1)?)?;
        check_eq("reload", "expired".to_string(), session.load(1)?.name)?;

        s.db.conn.execute("UPDATE thing SET name = 'again' WHERE id = 1", &[])?;
        session.expire_all()?;
        check_eq("reload all", "again".to_string(), session.load(1)?.name)
    })
    .unwrap();
    db.teardown().unwrap();
}

#[test]
fn test_modify_and_flush_through_session() {
    let db = setup();
    db.scenario(|s| {
        let session = &s.db.session;
        session.modify(1, |r| r.name = "new_name".into())?;
        // Autoflush writes the edit before the query reads storage
        let found = session.query().filter_by("id", 1i64).one()?;
        check_eq("name", "new_name", found.name.as_str())?;
        check_eq("raw", Value::from("new_name"), s.db.get_column(1, "name")?)
    })
    .unwrap();

    assert_eq!(db.session.load(1).unwrap().name, DEFAULT_NAME);
    assert!(db.session.exists(1).unwrap());
    db.teardown().unwrap();
}

#[test]
fn test_session_savepoint_restarts_and_generation_rotates() {
    let db = setup();
    db.scenario(|s| {
        let session = &s.db.session;
        let generation = session.generation()?;

        let record = session.persist(Record::new(EXTRA_NAME, EXTRA_CREATED_BY))?;
        session.commit(&s.savepoint)?;
        check_eq("generation", generation + 1, session.generation()?)?;

        // Committed into the inner scope, still visible
        let found = session.query().filter_by("name", EXTRA_NAME).first()?;
        check_eq("extra", Some(record), found)?;

        let restarted = session.savepoint()?;
        check_eq("restarted parent", Some(s.sub.id), restarted.and_then(|h| h.parent))?;
        check_eq("restarted nested", Some(true), restarted.map(|h| h.nested))
    })
    .unwrap();

    // Gone once the scenario's base rolls back
    assert_eq!(db.session.query().filter_by("name", EXTRA_NAME).count().unwrap(), 0);
    db.teardown().unwrap();
}

#[test]
fn test_rollback_discards_entries_loaded_inside() {
    let db = setup();
    db.scenario(|s| {
        let session = &s.db.session;
        let extra = session.persist(Record::new(EXTRA_NAME, EXTRA_CREATED_BY))?;
        let id = extra.id.unwrap_or_default();
        check_eq("tracked", true, session.is_tracked(id)?)?;

        session.rollback(&s.savepoint)?;
        check_eq("tracked after rollback", false, session.is_tracked(id)?)?;
        check_eq("exists", false, session.exists(id)?)?;
        // The seeded entry was loaded outside the scenario and survives
        check_eq("seed tracked", true, session.is_tracked(1)?)
    })
    .unwrap();
    db.teardown().unwrap();
}

#[test]
fn test_expire_on_commit() {
    let conn = Connection::open(ConnectionConfig::default()).unwrap();
    conn.create_table(Record::table_schema("thing")).unwrap();
    let session = Session::new(conn.clone()).unwrap();

    let txn = session.begin().unwrap();
    session.persist(Record::new("a", "u")).unwrap();
    session.commit(&txn).unwrap();
    assert_eq!(session.entry_state(1).unwrap(), Some(EntryState::Stale));

    let config = SessionConfig::new().expire_on_commit(false);
    let keep = Session::with_config(conn.clone(), config).unwrap();
    let txn = conn.begin().unwrap();
    keep.load(1).unwrap();
    conn.commit(&txn).unwrap();
    assert_eq!(keep.entry_state(1).unwrap(), Some(EntryState::Loaded));
}

#[test]
fn test_sessions_on_one_connection_have_separate_maps() {
    let conn = Connection::open(ConnectionConfig::default()).unwrap();
    conn.create_table(Record::table_schema("thing")).unwrap();
    let first = Session::new(conn.clone()).unwrap();
    let second = Session::new(conn).unwrap();

    first.persist(Record::new("a", "u")).unwrap();
    assert!(first.is_tracked(1).unwrap());
    assert!(!second.is_tracked(1).unwrap());

    first.modify(1, |r| r.name = "local".into()).unwrap();
    assert_eq!(second.load(1).unwrap().name, "a");
}
