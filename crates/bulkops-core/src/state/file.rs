// # File Job Store
//
// File-based implementation of JobStore with crash recovery.
//
// ## Purpose
//
// Keeps the cursor, item list and error log of every job kind on disk so a
// run interrupted by a restart can be resumed instead of re-applied.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "jobs": {
//     "redirect_update": {
//       "kind": "redirect_update",
//       "status": "rate_limited",
//       "cursor": 2,
//       "items": ["a.com", "b.com", "c.com"],
//       ...
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use crate::Error;
use crate::job::{JobKind, OperationState};
use crate::traits::JobStore;

/// Job file format version
const JOB_FILE_VERSION: &str = "1.0";

/// File-based job store with crash recovery
///
/// Every `save` is written through to disk before returning.
///
/// # Example
///
/// ```rust,no_run
/// use bulkops_core::state::FileJobStore;
/// use bulkops_core::traits::JobStore;
/// use bulkops_core::JobKind;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileJobStore::new("/var/lib/bulkops/jobs.json").await?;
///
///     if let Some(state) = store.load(JobKind::DnsAdd).await? {
///         println!("dns_add stopped at {}/{}", state.cursor, state.total());
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileJobStore {
    path: PathBuf,
    state: Arc<RwLock<FileState>>,
    /// Serializes writers so temp-file and rename never interleave
    write_lock: Mutex<()>,
}

/// Internal state for file-based store
#[derive(Debug)]
struct FileState {
    jobs: BTreeMap<JobKind, OperationState>,
    dirty: bool,
}

/// Serializable job file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct JobFileFormat {
    version: String,
    jobs: BTreeMap<JobKind, OperationState>,
}

impl FileJobStore {
    /// Create or load a file job store
    ///
    /// This will:
    /// 1. Try to load existing job file
    /// 2. If corruption detected, try to load from backup
    /// 3. If both fail, start with empty state
    /// 4. Create parent directories if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create job store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let jobs = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(FileState { jobs, dirty: false })),
            write_lock: Mutex::new(()),
        })
    }

    /// Load jobs from file with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load main job file
    /// 2. If it does not parse, try loading backup
    /// 3. If backup also fails, start with empty state
    async fn load_with_recovery(path: &Path) -> Result<BTreeMap<JobKind, OperationState>, Error> {
        match Self::load_file(path).await {
            Ok(jobs) => {
                tracing::debug!("Loaded job file: {} job(s)", jobs.len());
                Ok(jobs)
            }
            Err(LoadError::Corrupt(e)) => {
                tracing::warn!(
                    "Job file appears corrupted: {}. Attempting recovery from backup.",
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty job state.");
                    return Ok(BTreeMap::new());
                }

                match Self::load_file(&backup_path).await {
                    Ok(jobs) => {
                        tracing::info!("Recovered job state from backup: {} job(s)", jobs.len());
                        if let Err(restore_err) = Self::restore_from_backup(path, &backup_path).await
                        {
                            tracing::error!(
                                "Failed to restore job file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(jobs)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also unreadable: {}. Starting with empty job state.",
                            backup_err
                        );
                        Ok(BTreeMap::new())
                    }
                }
            }
            Err(LoadError::Io(e)) => Err(e),
        }
    }

    /// Load jobs from one file
    async fn load_file(path: &Path) -> Result<BTreeMap<JobKind, OperationState>, LoadError> {
        if !path.exists() {
            tracing::debug!("Job file does not exist: {}", path.display());
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            LoadError::Io(Error::state_store(format!(
                "Failed to read job file {}: {}",
                path.display(),
                e
            )))
        })?;

        let file: JobFileFormat = serde_json::from_str(&content).map_err(|e| {
            LoadError::Corrupt(Error::state_store(format!(
                "Failed to parse job file {}: {}",
                path.display(),
                e
            )))
        })?;

        if file.version != JOB_FILE_VERSION {
            tracing::warn!(
                "Job file version mismatch: expected {}, got {}. Attempting to load anyway.",
                JOB_FILE_VERSION,
                file.version
            );
        }

        Ok(file.jobs)
    }

    /// Write jobs to file atomically
    async fn write_file(&self) -> Result<(), Error> {
        let _writer = self.write_lock.lock().await;

        let json = {
            let guard = self.state.read().await;
            let file = JobFileFormat {
                version: JOB_FILE_VERSION.to_string(),
                jobs: guard.jobs.clone(),
            };
            serde_json::to_string_pretty(&file)
                .map_err(|e| Error::state_store(format!("Failed to serialize jobs: {}", e)))?
        };

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create job file backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        self.state.write().await.dirty = false;

        tracing::trace!("Job file written: {}", self.path.display());
        Ok(())
    }

    /// Restore job file from backup
    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to restore from backup {} to {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Restored job file from backup");
        Ok(())
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

/// Load failure, split so only parse failures trigger backup recovery
enum LoadError {
    Corrupt(Error),
    Io(Error),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Corrupt(e) | LoadError::Io(e) => write!(f, "{}", e),
        }
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn load(&self, kind: JobKind) -> Result<Option<OperationState>, Error> {
        Ok(self.state.read().await.jobs.get(&kind).cloned())
    }

    async fn save(&self, state: &OperationState) -> Result<(), Error> {
        {
            let mut guard = self.state.write().await;
            guard.jobs.insert(state.kind, state.clone());
            guard.dirty = true;
        }

        // Immediate write for durability
        self.write_file().await
    }

    async fn delete(&self, kind: JobKind) -> Result<(), Error> {
        {
            let mut guard = self.state.write().await;
            if guard.jobs.remove(&kind).is_none() {
                return Ok(());
            }
            guard.dirty = true;
        }

        self.write_file().await
    }

    async fn list(&self) -> Result<Vec<JobKind>, Error> {
        Ok(self.state.read().await.jobs.keys().copied().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        let dirty = self.state.read().await.dirty;
        if dirty {
            self.write_file().await
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Change, JobStatus};
    use crate::traits::ApplyResult;
    use tempfile::tempdir;

    fn running(items: &[&str]) -> OperationState {
        OperationState::new(
            Change::redirect("https://client.example"),
            items.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn test_file_store_basic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jobs.json");

        let store = FileJobStore::new(&path).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());

        let mut state = running(&["a.com", "b.com"]);
        state.next_item();
        state.record_success(ApplyResult::Updated);
        store.save(&state).await.unwrap();
        assert!(path.exists());

        // Load new instance and verify persistence
        let store2 = FileJobStore::new(&path).await.unwrap();
        let loaded = store2.load(JobKind::RedirectUpdate).await.unwrap().unwrap();
        assert_eq!(loaded.cursor, 1);
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_file_store_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jobs.json");

        let store = FileJobStore::new(&path).await.unwrap();
        let mut state = running(&["a.com", "b.com", "c.com"]);
        state.next_item();
        state.record_success(ApplyResult::Updated);
        store.save(&state).await.unwrap();

        // Second write creates the backup of the first
        state.next_item();
        state.record_success(ApplyResult::Updated);
        store.save(&state).await.unwrap();

        let backup_path = FileJobStore::backup_path(&path);
        assert!(backup_path.exists(), "Backup file should exist after write");

        fs::write(&path, b"corrupted json data").await.unwrap();

        let store2 = FileJobStore::new(&path)
            .await
            .expect("corrupted job file should recover from backup");
        let recovered = store2.load(JobKind::RedirectUpdate).await.unwrap().unwrap();
        assert_eq!(recovered.cursor, 1, "Backup holds the previous write");
    }

    #[tokio::test]
    async fn test_file_store_keeps_kinds_apart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("jobs.json");

        let store = FileJobStore::new(&path).await.unwrap();
        let redirect = running(&["a.com"]);
        let mut sync = OperationState::new(Change::Sync, vec!["a.com".to_string()]);
        sync.request_stop();

        store.save(&redirect).await.unwrap();
        store.save(&sync).await.unwrap();
        store.delete(JobKind::RedirectUpdate).await.unwrap();

        let store2 = FileJobStore::new(&path).await.unwrap();
        assert_eq!(store2.list().await.unwrap(), vec![JobKind::Sync]);
        let loaded = store2.load(JobKind::Sync).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Stopped);
    }

    #[tokio::test]
    async fn test_flush_is_noop_when_clean() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jobs.json");

        let store = FileJobStore::new(&path).await.unwrap();
        store.flush().await.unwrap();
        assert!(!path.exists(), "nothing to write yet");
    }
}
