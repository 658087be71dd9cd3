// # Job Store Implementations
//
// This module provides implementations of the JobStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::FileJobStore;
pub use memory::MemoryJobStore;

use std::sync::Arc;

use crate::config::StateStoreConfig;
use crate::error::Result;
use crate::traits::JobStore;

/// Create the job store selected by configuration
pub async fn create_job_store(config: &StateStoreConfig) -> Result<Arc<dyn JobStore>> {
    match config {
        StateStoreConfig::Memory => Ok(Arc::new(MemoryJobStore::new())),
        StateStoreConfig::File { path } => Ok(Arc::new(FileJobStore::new(path).await?)),
    }
}
