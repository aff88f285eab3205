//! Memory quota interfaces consumed by materializing operators.
//!
//! Only traits live here; the concrete budget and guard are in `vexec-mem`, so
//! any crate can name the API without pulling in the accounting code.

/// Bytes reserved against a budget. Dropping the guard gives them back.
pub trait BudgetGuard: Send {
    /// Number of bytes currently accounted for by this guard.
    fn bytes(&self) -> usize;
    /// Label of the owner (operator name) for diagnostics.
    fn tag(&self) -> &'static str {
        "guard"
    }
}

/// A per-query memory quota.
///
/// Sort, Top-N and Merge Join reserve bytes here before buffering rows. A
/// refused reservation aborts the query; spilling is not supported.
pub trait MemoryBudget: Send + Sync + 'static {
    type Guard: BudgetGuard;

    /// Attempt to reserve `bytes`. Returns `None` when the quota would be exceeded.
    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<Self::Guard>;

    /// Total configured capacity (bytes).
    fn capacity_bytes(&self) -> usize;

    /// Currently reserved bytes (advisory).
    fn used_bytes(&self) -> usize;

    fn available_bytes(&self) -> usize {
        self.capacity_bytes().saturating_sub(self.used_bytes())
    }
}
