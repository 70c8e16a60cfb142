//! Abstract memory budget interfaces.
//!
//! The concrete implementation lives in `tandem-mem`. We keep only traits here
//! so any crate can depend on the API without pulling the accounting logic.

/// A guard returned by a memory budget when bytes are acquired.
///
/// The concrete type lives in `tandem-mem`. It must be RAII (releases on Drop)
/// and `Send`.
pub trait BudgetGuard: Send {
    /// Number of bytes currently accounted for by this guard.
    fn bytes(&self) -> usize;
    /// Optional debug tag for metrics/tracing.
    fn tag(&self) -> &'static str {
        "guard"
    }
}

/// A handle representing the memory available to cached results.
///
/// The engine asks `available_bytes` before pulling a relational result into
/// memory, and holds a guard for every cached in-memory result.
pub trait MemoryBudget: Send + Sync + 'static {
    type Guard: BudgetGuard;

    /// Attempt to acquire `bytes` from the live budget. Returns a guard on success.
    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<Self::Guard>;

    /// Account for `bytes` even when that overshoots the capacity. Used for
    /// results that already exist in memory (base tables, in-memory outputs).
    fn acquire_unchecked(&self, bytes: usize, tag: &'static str) -> Self::Guard;

    /// Total configured capacity (bytes).
    fn capacity_bytes(&self) -> usize;

    /// Approximate currently used bytes (advisory; not a correctness API).
    fn used_bytes(&self) -> usize;

    fn available_bytes(&self) -> usize {
        self.capacity_bytes().saturating_sub(self.used_bytes())
    }
}
