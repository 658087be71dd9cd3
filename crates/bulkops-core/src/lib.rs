// # bulkops-core
//
// Core library for long-running bulk operations against a rate-limited
// domain registrar API.
//
// ## Architecture Overview
//
// - **OperationState**: Single source of truth for one run (status, cursor, counts, error log)
// - **Registrar**: Trait for applying one change to one domain
// - **JobStore**: Trait for persisting operation state across restarts
// - **BatchExecutor**: Worker that drives a run item by item through a shared API gate
// - **JobRegistry**: One slot per job kind; start, stop and resume
// - **ProgressReporter**: Snapshot polling for operators
//
// ## Design Principles
//
// 1. **One active run per kind**: Starts are serialized per slot
// 2. **Item boundaries**: Stops and throttling land between registrar calls
// 3. **No lost items**: A throttled item is retried first on resume
// 4. **Best effort**: Item failures are logged, the batch continues
// 5. **Human in the loop**: Throttling pauses until an explicit resume

pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod progress;
pub mod registrar;
pub mod registry;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{BatchingConfig, BulkOpsConfig, EngineConfig, ProgressConfig, StateStoreConfig};
pub use engine::{ApiGate, JobEvent};
pub use error::{Error, Result};
pub use job::{Change, DnsRecord, ErrorEntry, JobKind, JobStatus, OperationState, RecordType};
pub use progress::{ProgressReport, ProgressReporter, ReportedError};
pub use registrar::DryRunRegistrar;
pub use registry::{JobHandle, JobRegistry};
pub use state::{create_job_store, FileJobStore, MemoryJobStore};
pub use traits::{ApplyResult, JobStore, Registrar};
