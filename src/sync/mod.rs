//! Sync coordination
//!
//! ```text
//! Preflight -> LockWait -> DryRun -> Transferring -> Done
//!     \            \           \            \
//!      +------------+-----------+------------+--> Failed
//! ```
//!
//! Preflight failures leave the cache untouched. Once the lock is taken,
//! it is released on every exit path.

pub mod orchestrator;
pub mod state;

pub use orchestrator::SyncOrchestrator;
pub use state::{CleanupError, CleanupReport, MirrorPath, SyncOutcome, SyncPhase, SyncStatus};
