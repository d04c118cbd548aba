//! Updater x checker matrix.
//!
//! Each case runs its checker, then its updater, inside one scenario.
//! Updaters write the seeded row directly through the connection;
//! checkers assert the row count is still one.

use super::{check_eq, HarnessResult, TestDb, TABLE, UPDATE1_NAME, UPDATE2_CREATED_BY};
use crate::core::Value;
use serde::Serialize;

pub struct Updater {
    pub name: &'static str,
    pub run: fn(&TestDb) -> HarnessResult<()>,
}

pub struct Checker {
    pub name: &'static str,
    pub run: fn(&TestDb) -> HarnessResult<()>,
}

pub const UPDATERS: &[Updater] = &[
    Updater {
        name: "update_name_direct",
        run: update_name_direct,
    },
    Updater {
        name: "update_name_params",
        run: update_name_params,
    },
    Updater {
        name: "update_created_by",
        run: update_created_by,
    },
];

pub const CHECKERS: &[Checker] = &[
    Checker {
        name: "count_raw_sql",
        run: count_raw_sql,
    },
    Checker {
        name: "count_selected_ids",
        run: count_selected_ids,
    },
    Checker {
        name: "count_session_query",
        run: count_session_query,
    },
];

fn update_name_direct(db: &TestDb) -> HarnessResult<()> {
    let sql = format!(
        "UPDATE {} SET name = {} WHERE id = {}",
        TABLE,
        Value::from(UPDATE1_NAME).to_sql_literal(),
        db.original_id
    );
    let result = db.conn.execute(&sql, &[])?;
    check_eq("rows updated", 1, result.affected_rows())
}

fn update_name_params(db: &TestDb) -> HarnessResult<()> {
    let result = db.conn.execute(
        &format!("UPDATE {} SET name = $1 WHERE id = $2", TABLE),
        &[UPDATE1_NAME.into(), db.original_id.into()],
    )?;
    check_eq("rows updated", 1, result.affected_rows())?;
    check_eq("name", Value::from(UPDATE1_NAME), db.get_column(db.original_id, "name")?)
}

fn update_created_by(db: &TestDb) -> HarnessResult<()> {
    let result = db.conn.execute(
        &format!("UPDATE {} SET created_by = ? WHERE id = ?", TABLE),
        &[UPDATE2_CREATED_BY.into(), db.original_id.into()],
    )?;
    check_eq("rows updated", 1, result.affected_rows())?;
    check_eq(
        "created_by",
        Value::from(UPDATE2_CREATED_BY),
        db.get_column(db.original_id, "created_by")?,
    )
}

fn count_raw_sql(db: &TestDb) -> HarnessResult<()> {
    check_eq("select count(*)", 1, db.count()?)
}

fn count_selected_ids(db: &TestDb) -> HarnessResult<()> {
    let result = db.conn.execute(&format!("SELECT id FROM {}", TABLE), &[])?;
    check_eq("selected ids", 1, result.row_count())
}

fn count_session_query(db: &TestDb) -> HarnessResult<()> {
    check_eq("session query count", 1, db.session.query().count()?)
}

/// One cell of the matrix
#[derive(Clone, Copy)]
pub struct MatrixCase {
    pub updater: &'static Updater,
    pub checker: &'static Checker,
}

impl MatrixCase {
    /// Every updater paired with every checker, updaters outermost
    pub fn all() -> Vec<MatrixCase> {
        UPDATERS
            .iter()
            .flat_map(|updater| CHECKERS.iter().map(move |checker| MatrixCase { updater, checker }))
            .collect()
    }

    pub fn id(&self) -> String {
        format!("{}-{}", self.updater.name, self.checker.name)
    }

    pub fn run(&self, db: &TestDb) -> HarnessResult<()> {
        db.scenario(|s| {
            (self.checker.run)(s.db)?;
            (self.updater.run)(s.db)
        })
    }

    pub fn report(&self, db: &TestDb) -> CaseReport {
        let outcome = self.run(db);
        CaseReport {
            id: self.id(),
            passed: outcome.is_ok(),
            error: outcome.err().map(|e| e.to_string()),
        }
    }
}

/// Result of one matrix case, as printed by the CLI
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub id: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
