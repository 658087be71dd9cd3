//! Core traits for the bulkops engine
//!
//! This module defines the seams between the engine and its collaborators.
//!
//! - [`Registrar`]: Apply one change to one domain via the registrar API
//! - [`JobStore`]: Persist operation state per job kind

pub mod registrar;
pub mod job_store;

pub use registrar::{Registrar, ApplyResult};
pub use job_store::JobStore;
