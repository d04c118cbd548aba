// ============================================================================
// Transaction State Management
// ============================================================================
//
// Implements the State Pattern for the scope lifecycle:
//
//   Active ──commit──> Committed
//     │
//     └──rollback──> RolledBack
//
// ============================================================================

use serde::Serialize;
use std::fmt;

/// Unique identifier for a scope on one connection.
///
/// Ids grow monotonically, so a scope opened while another was active
/// always has the larger id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// How a scope is ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Commit,
    Rollback,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Commit => write!(f, "COMMIT"),
            Outcome::Rollback => write!(f, "ROLLBACK"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransactionState {
    /// Scope is open and can execute statements
    Active,

    /// Scope was committed into its parent (or made durable at the root)
    Committed,

    /// Scope was rolled back, directly or by cascade
    RolledBack,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl From<Outcome> for TransactionState {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Commit => TransactionState::Committed,
            Outcome::Rollback => TransactionState::RolledBack,
        }
    }
}

/// Token for one nesting level.
///
/// A handle is only an identifier; whether it is still active is owned by
/// the connection's scope stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TransactionHandle {
    pub id: TransactionId,
    pub parent: Option<TransactionId>,
    /// True for a savepoint
    pub nested: bool,
}

impl TransactionHandle {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_savepoint(&self) -> bool {
        self.nested
    }

    /// SQL-level name of the savepoint backing this handle
    pub fn savepoint_name(&self) -> String {
        format!("sp_{}", self.id.0)
    }
}

impl fmt::Display for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nested {
            write!(f, "{} (savepoint {})", self.id, self.savepoint_name())
        } else {
            write!(f, "{}", self.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_ordering_and_display() {
        assert!(TransactionId(1) < TransactionId(2));
        assert_eq!(TransactionId(7).to_string(), "txn_7");
    }

    #[test]
    fn test_state_from_outcome() {
        assert_eq!(TransactionState::from(Outcome::Commit), TransactionState::Committed);
        assert_eq!(TransactionState::from(Outcome::Rollback), TransactionState::RolledBack);
        assert!(TransactionState::Active.is_active());
        assert!(TransactionState::RolledBack.is_terminal());
    }

    #[test]
    fn test_handle_display() {
        let root = TransactionHandle { id: TransactionId(1), parent: None, nested: false };
        let sp = TransactionHandle { id: TransactionId(2), parent: Some(root.id), nested: true };
        assert!(root.is_root());
        assert_eq!(root.to_string(), "txn_1");
        assert_eq!(sp.to_string(), "txn_2 (savepoint sp_2)");
    }
}
