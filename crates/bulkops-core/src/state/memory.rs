// # Memory Job Store
//
// In-memory implementation of JobStore.
//
// ## Crash Behavior
//
// - All job state is lost on restart/crash
// - An interrupted run cannot be resumed; its cursor is gone
// - The registrar may be left partially updated with no record of which
//   domains were already changed
//
// ## When to Use
//
// - Testing environments
// - Interactive use where the operator re-runs a job after a restart

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::job::{JobKind, OperationState};
use crate::traits::JobStore;

/// In-memory job store implementation
///
/// Stores one state per kind in a HashMap protected by a RwLock.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    inner: Arc<RwLock<HashMap<JobKind, OperationState>>>,
}

impl MemoryJobStore {
    /// Create a new empty memory job store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored states
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn load(&self, kind: JobKind) -> Result<Option<OperationState>, Error> {
        Ok(self.inner.read().await.get(&kind).cloned())
    }

    async fn save(&self, state: &OperationState) -> Result<(), Error> {
        self.inner.write().await.insert(state.kind, state.clone());
        Ok(())
    }

    async fn delete(&self, kind: JobKind) -> Result<(), Error> {
        self.inner.write().await.remove(&kind);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<JobKind>, Error> {
        let mut kinds: Vec<JobKind> = self.inner.read().await.keys().copied().collect();
        kinds.sort();
        Ok(kinds)
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing buffered
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Change;

    fn state(change: Change) -> OperationState {
        OperationState::new(change, vec!["a.com".to_string(), "b.com".to_string()])
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryJobStore::new();
        assert!(store.is_empty().await);

        let sync = state(Change::Sync);
        store.save(&sync).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.load(JobKind::Sync).await.unwrap(), Some(sync));
        assert_eq!(store.load(JobKind::DnsAdd).await.unwrap(), None);

        store.delete(JobKind::Sync).await.unwrap();
        assert!(store.is_empty().await);
        // Deleting again is fine
        store.delete(JobKind::Sync).await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_store_save_replaces_kind() {
        let store = MemoryJobStore::new();

        let mut first = state(Change::redirect("https://one.example"));
        store.save(&first).await.unwrap();
        first.request_stop();
        store.save(&first).await.unwrap();

        let second = state(Change::Sync);
        store.save(&second).await.unwrap();

        assert_eq!(store.list().await.unwrap(), vec![JobKind::Sync, JobKind::RedirectUpdate]);
        let loaded = store.load(JobKind::RedirectUpdate).await.unwrap().unwrap();
        assert_eq!(loaded.status, crate::job::JobStatus::Stopped);
    }
}
