/// Scenario matrix tests
///
/// Every updater against every checker, plus the session and connection
/// scenarios whose writes must never leak past the fixture.
/// Run with: cargo test --test scenario_matrix_tests

use savepointdb::harness::{
    check_eq, MatrixCase, TestDb, CHECKERS, DEFAULT_NAME, EXTRA_CREATED_BY, EXTRA_NAME, UPDATERS,
};
use savepointdb::{ConnectionConfig, Record, Value};

const BYPASS_NAME: &str = "bypassing-session";

fn setup() -> TestDb {
    TestDb::setup(ConnectionConfig::new("matrix")).unwrap()
}

fn names(db: &TestDb) -> Vec<Value> {
    db.conn
        .execute("SELECT name FROM thing ORDER BY name", &[])
        .unwrap()
        .column("name")
        .unwrap()
}

fn assert_reverted(db: &TestDb) {
    assert_eq!(names(db), vec![Value::from(DEFAULT_NAME)]);
    let session_names: Vec<String> = db
        .session
        .query()
        .all()
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(session_names, vec![DEFAULT_NAME.to_string()]);
    assert!(db.session.exists(db.original_id).unwrap());
}

#[test]
fn test_full_matrix() {
    let db = setup();
    let cases = MatrixCase::all();
    assert_eq!(cases.len(), UPDATERS.len() * CHECKERS.len());

    for case in &cases {
        if let Err(err) = case.run(&db) {
            panic!("{} failed: {}", case.id(), err);
        }
        assert_reverted(&db);
    }
    db.teardown().unwrap();
}

#[test]
fn test_matrix_case_ids() {
    let ids: Vec<String> = MatrixCase::all().iter().map(|c| c.id()).collect();
    assert!(ids.contains(&"update_name_params-count_selected_ids".to_string()));
    assert!(ids.contains(&"update_created_by-count_raw_sql".to_string()));
    assert!(ids.iter().all(|id| id.contains('-')));
}

#[test]
fn test_extra_record_only_inside_its_scenario() {
    let db = setup();
    db.scenario(|s| {
        let extra = s.db.session.persist(Record::named(EXTRA_NAME))?;
        let found = s.db.session.query().filter_by("name", EXTRA_NAME).first()?;
        check_eq("found", Some(extra), found)
    })
    .unwrap();

    db.scenario(|s| {
        let found = s.db.session.query().filter_by("name", EXTRA_NAME).first()?;
        check_eq("extra gone", None, found)
    })
    .unwrap();
    db.teardown().unwrap();
}

#[test]
fn test_extra_record_committed_in_savepoint_is_reverted() {
    let db = setup();
    db.scenario(|s| {
        let extra = s.db.session.persist(Record::new(EXTRA_NAME, EXTRA_CREATED_BY))?;
        s.db.session.commit(&s.savepoint)?;
        let found = s.db.session.query().filter_by("name", EXTRA_NAME).first()?;
        check_eq("found after commit", Some(extra), found)
    })
    .unwrap();

    db.scenario(|s| {
        let found = s.db.session.query().filter_by("name", EXTRA_NAME).first()?;
        check_eq("extra gone", None, found)
    })
    .unwrap();
    db.teardown().unwrap();
}

#[test]
fn test_bypass_session_with_inner_transactions() {
    let db = setup();
    db.scenario(|s| {
        let conn = &s.db.conn;
        let update = format!(
            "UPDATE thing SET name = '{}' WHERE id = {}",
            BYPASS_NAME, s.db.original_id
        );

        let txn = conn.begin()?;
        conn.execute(&update, &[])?;
        conn.commit(&txn)?;

        let savepoint = conn.begin_nested()?;
        conn.execute(&update, &[])?;
        conn.commit(&savepoint)?;
        check_eq("after commits", vec![Value::from(BYPASS_NAME)], names(s.db))?;

        let txn = conn.begin()?;
        check_eq("inside new scope", vec![Value::from(BYPASS_NAME)], names(s.db))?;
        Ok(conn.commit(&txn)?)
    })
    .unwrap();

    assert_reverted(&db);
    db.teardown().unwrap();
}

#[test]
fn test_bypass_session_in_session_savepoint() {
    let db = setup();
    db.scenario(|s| {
        let update = format!(
            "UPDATE thing SET name = '{}' WHERE id = {}",
            BYPASS_NAME, s.db.original_id
        );

        let txn = s.db.conn.begin()?;
        check_eq("unchanged", vec![Value::from(DEFAULT_NAME)], names(s.db))?;
        s.db.conn.commit(&txn)?;

        let savepoint = s.db.session.begin_nested()?;
        s.db.session.execute(&update, &[])?;
        check_eq("changed", vec![Value::from(BYPASS_NAME)], names(s.db))?;
        s.db.session.commit(&savepoint)?;

        check_eq("still changed", vec![Value::from(BYPASS_NAME)], names(s.db))?;
        // The seeded entry was never refreshed
        check_eq("cached", DEFAULT_NAME.to_string(), s.db.session.load(s.db.original_id)?.name)
    })
    .unwrap();

    assert_reverted(&db);
    db.teardown().unwrap();
}

#[test]
fn test_bypass_session_rollback_inside_scenario() {
    let db = setup();
    db.scenario(|s| {
        let conn = &s.db.conn;
        let savepoint = conn.begin_nested()?;
        conn.execute(
            "UPDATE thing SET name = $1 WHERE id = $2",
            &[BYPASS_NAME.into(), s.db.original_id.into()],
        )?;
        conn.rollback(&savepoint)?;
        check_eq("reverted", vec![Value::from(DEFAULT_NAME)], names(s.db))
    })
    .unwrap();

    assert_reverted(&db);
    db.teardown().unwrap();
}

#[test]
fn test_obj_survives_between_scenarios() {
    let db = setup();
    for _ in 0..2 {
        db.scenario(|s| {
            check_eq("obj", s.db.obj.clone(), s.db.session.load(s.db.original_id)?)?;
            check_eq("exists", true, s.db.session.exists(s.db.original_id)?)
        })
        .unwrap();
    }
    db.teardown().unwrap();
}
