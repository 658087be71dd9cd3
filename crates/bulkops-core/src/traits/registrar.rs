// # Registrar Trait
//
// Defines the per-item operation a bulk job drives: apply one change to one
// domain through the registrar API.
//
// ## Implementations
//
// - Dry run: `bulkops_core::registrar::DryRunRegistrar`
// - Namecheap: lives outside this workspace
//
// ## Usage
//
// ```rust,ignore
// use bulkops_core::{Change, Registrar};
//
// let registrar = /* Registrar implementation */;
// match registrar.apply("example.com", &Change::redirect("https://client.example")).await {
//     Ok(result) => { /* counted as successful */ }
//     Err(e) if e.is_rate_limited() => { /* job pauses, item retried on resume */ }
//     Err(e) => { /* recorded in the error log, batch continues */ }
// }
// ```

use async_trait::async_trait;

use crate::job::Change;

/// Result of applying a change to one domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    /// The registrar created something new (e.g. a newly synced domain)
    Created,
    /// The registrar modified existing data
    Updated,
    /// Nothing needed to change
    Unchanged,
}

/// Trait for registrar API clients
///
/// # Outcomes
///
/// The executor branches on three outcomes, so implementations must keep them
/// apart:
///
/// - `Ok(ApplyResult)`: the change is in place for this domain
/// - `Err(Error::RateLimited)`: this call was throttled; nothing was applied
/// - any other `Err`: this domain rejected the change permanently
///
/// Reporting a permanent rejection as `RateLimited` stalls the job on that
/// item; reporting throttling as a plain error drops the item from the run.
///
/// # Constraints
///
/// - One registrar call per `apply`; no internal retry or backoff
///   (the engine pauses the job and a human resumes it)
/// - No task spawning, no state beyond a single request
/// - Must be idempotent per item: resuming after a stop may re-send the
///   throttled item, never an item that was already counted
///
/// # Thread Safety
///
/// Implementations are shared by every job kind and must be usable across
/// async tasks.
#[async_trait]
pub trait Registrar: Send + Sync {
    /// Apply `change` to `domain`
    ///
    /// # Parameters
    ///
    /// - `domain`: Normalized domain name (lowercase, trimmed)
    /// - `change`: The job's change parameters
    ///
    /// # Returns
    ///
    /// - `Ok(ApplyResult)`: The change is in place
    /// - `Err(Error::RateLimited)`: The call was throttled
    /// - `Err(Error)`: The item failed
    async fn apply(&self, domain: &str, change: &Change) -> Result<ApplyResult, crate::Error>;

    /// Get the registrar name (for logging/debugging)
    fn registrar_name(&self) -> &'static str;
}
