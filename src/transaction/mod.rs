// ============================================================================
// Transaction Scope Management
// ============================================================================
//
// A single connection owns a strict LIFO stack of scopes. The outermost
// scope is a plain transaction; everything above it is either a savepoint
// (nested) or a plain inner scope. Every write is journaled as a reversible
// Change so that ending any scope with ROLLBACK can restore storage to the
// state it had when the scope opened.
//
// Design Patterns Used:
// - Command Pattern: reversible changes in a shared undo log
// - State Pattern: Active -> Committed / RolledBack
// - Observer: explicitly registered listeners notified on scope end
//
// ============================================================================

pub mod change;
pub mod listener;
pub mod manager;
pub mod state;

pub use change::Change;
pub use listener::{ListenerId, ListenerRegistry, ScopeEnd, ScopeListener};
pub use manager::{ScopeInfo, ScopeManager};
pub use state::{Outcome, TransactionHandle, TransactionId, TransactionState};
