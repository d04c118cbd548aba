// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Each Change records enough to undo one row-level write. Changes are kept
// in statement journals first and then appended to the connection's undo
// log while a transaction is open.
//
// ============================================================================

use crate::core::{Result, Row};
use crate::storage::InMemoryStorage;
use log::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A row was inserted under `id`
    InsertRow { table: String, id: i64 },

    /// A row was replaced; `old_row` is the previous version
    UpdateRow { table: String, id: i64, old_row: Row },

    /// A row was removed; `old_row` is what it held
    DeleteRow { table: String, id: i64, old_row: Row },
}

impl Change {
    pub fn table_name(&self) -> &str {
        match self {
            Change::InsertRow { table, .. } => table,
            Change::UpdateRow { table, .. } => table,
            Change::DeleteRow { table, .. } => table,
        }
    }

    pub fn row_id(&self) -> i64 {
        match self {
            Change::InsertRow { id, .. }
            | Change::UpdateRow { id, .. }
            | Change::DeleteRow { id, .. } => *id,
        }
    }

    /// Undo this change against storage.
    pub fn revert(&self, storage: &mut InMemoryStorage) -> Result<()> {
        let table = storage.get_table_mut(self.table_name())?;
        match self {
            Change::InsertRow { id, .. } => {
                table.delete(*id);
            }
            Change::UpdateRow { id, old_row, .. } | Change::DeleteRow { id, old_row, .. } => {
                table.restore(*id, old_row.clone());
            }
        }
        Ok(())
    }
}

/// Undo `changes` newest first.
///
/// A change whose table has since been dropped cannot be undone; it is
/// reported and skipped so the rest of the journal still applies.
pub fn revert_all(changes: Vec<Change>, storage: &mut InMemoryStorage) {
    for change in changes.into_iter().rev() {
        if let Err(err) = change.revert(storage) {
            warn!(
                "skipping undo of row {} in '{}': {}",
                change.row_id(),
                change.table_name(),
                err
            );
        }
    }
}
