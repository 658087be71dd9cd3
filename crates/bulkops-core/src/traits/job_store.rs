// # Job Store Trait
//
// Defines the interface for persisting operation state per job kind.
//
// ## Purpose
//
// Without persistence a process restart mid-batch loses the cursor and leaves
// no record of which domains were already changed. A durable store keeps the
// cursor, item list and error log so an interrupted run can be resumed.
//
// ## Implementations
//
// - Memory: no persistence (default, matches a single-process console)
// - File: JSON file with atomic writes and backup recovery

use async_trait::async_trait;

use crate::job::{JobKind, OperationState};

/// Trait for job store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks; the
/// workers of different job kinds save independently.
///
/// ## Implementation Guidelines
///
/// - **Async I/O only**: Use async file/database operations, never blocking I/O
/// - **Explicit flush**: `flush()` must persist all pending changes
/// - **No background tasks**: Saving is driven by the executor
/// - **Last write wins**: `save` replaces the stored state for the kind
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Load the stored state for a kind
    ///
    /// # Returns
    ///
    /// - `Ok(Some(OperationState))`: The last saved state
    /// - `Ok(None)`: Nothing stored for this kind
    /// - `Err(Error)`: Storage error
    async fn load(&self, kind: JobKind) -> Result<Option<OperationState>, crate::Error>;

    /// Save the state of a run, replacing any previous state of its kind
    async fn save(&self, state: &OperationState) -> Result<(), crate::Error>;

    /// Delete the stored state for a kind
    ///
    /// Deleting a kind that has no stored state is not an error.
    async fn delete(&self, kind: JobKind) -> Result<(), crate::Error>;

    /// List the kinds that have stored state
    async fn list(&self) -> Result<Vec<JobKind>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
