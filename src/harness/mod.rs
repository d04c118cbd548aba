//! Fixture harness for consistency scenarios.
//!
//! [`TestDb`] owns a seeded connection and session. Every scenario runs
//! inside a base transaction, an inner scope and a session savepoint, all
//! of which are rolled back afterwards, so each scenario starts from the
//! single seeded record.

pub mod fixture;
pub mod scenarios;

pub use fixture::{Scenario, TestDb};
pub use scenarios::{CaseReport, Checker, MatrixCase, Updater, CHECKERS, UPDATERS};

use crate::core::DbError;
use std::fmt::Debug;
use thiserror::Error;

pub const TABLE: &str = "thing";

pub const DEFAULT_NAME: &str = "name-default";
pub const DEFAULT_CREATED_BY: &str = "user-default";

pub const EXTRA_NAME: &str = "name-extra";
pub const EXTRA_CREATED_BY: &str = "user-extra";

pub const UPDATE1_NAME: &str = "update1-name";
pub const UPDATE2_CREATED_BY: &str = "changed-by-update2";

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("{context}: expected {expected}, got {actual}")]
    Assertion {
        context: String,
        expected: String,
        actual: String,
    },
}

pub type HarnessResult<T> = std::result::Result<T, HarnessError>;

/// Fail with an [`HarnessError::Assertion`] unless both values are equal
pub fn check_eq<T>(context: &str, expected: T, actual: T) -> HarnessResult<()>
where
    T: PartialEq + Debug,
{
    if expected == actual {
        Ok(())
    } else {
        Err(HarnessError::Assertion {
            context: context.to_string(),
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        })
    }
}
