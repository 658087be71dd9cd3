//! Job registry and control surface
//!
//! The registry owns one slot per [`JobKind`] and is the only entry point for
//! starting, stopping and resuming runs. Each slot admits at most one active
//! run and at most one worker.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bulkops_core::{BulkOpsConfig, Change, JobKind, JobRegistry, MemoryJobStore};
//!
//! let (registry, events) = JobRegistry::new(registrar, Arc::new(MemoryJobStore::new()), BulkOpsConfig::default())?;
//!
//! registry
//!     .start_job(JobKind::RedirectUpdate, domains, Change::redirect("https://client.example"))
//!     .await?;
//!
//! let report = registry.reporter().report(JobKind::RedirectUpdate).await?;
//! ```
//!
//! ## Atomicity
//!
//! Every control operation decides and mutates under its slot's write lock.
//! Concurrent starts of one kind are serialized there: exactly one wins, the
//! others see [`Error::Conflict`]. The resulting state is saved after the lock
//! is released, in the order the states were produced.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::BulkOpsConfig;
use crate::engine::slot::{JobSlot, SlotCell};
use crate::engine::{persist, persist_released, ApiGate, BatchExecutor, EventSink, JobEvent};
use crate::error::{Error, Result};
use crate::job::{normalize_items, Change, JobKind, JobStatus, OperationState};
use crate::progress::ProgressReporter;
use crate::traits::{JobStore, Registrar};

/// Acknowledgment of an accepted run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    /// Kind of the run
    pub kind: JobKind,
    /// Number of items in the run
    pub total: usize,
    /// When the run was accepted
    pub created_at: DateTime<Utc>,
}

/// Process-wide registry of bulk jobs
///
/// ## Threading
///
/// All methods take `&self`; share the registry behind an `Arc` to control
/// jobs from several tasks. Workers are spawned on the current tokio runtime.
pub struct JobRegistry {
    /// One slot per job kind, created up front
    slots: Arc<HashMap<JobKind, Arc<JobSlot>>>,

    /// Registrar shared by every job kind
    registrar: Arc<dyn Registrar>,

    /// Job store for durability
    store: Arc<dyn JobStore>,

    /// Shared registrar call budget
    gate: Arc<ApiGate>,

    /// Engine configuration
    config: BulkOpsConfig,

    /// Event sender for external monitoring
    events: EventSink,
}

impl JobRegistry {
    /// Create a new registry
    ///
    /// # Returns
    ///
    /// A tuple of (registry, event_receiver) where event_receiver yields job events
    pub fn new(
        registrar: Arc<dyn Registrar>,
        store: Arc<dyn JobStore>,
        config: BulkOpsConfig,
    ) -> Result<(Self, mpsc::Receiver<JobEvent>)> {
        config.validate()?;

        let (events, rx) = EventSink::channel(config.engine.event_channel_capacity);
        let slots = JobKind::ALL
            .into_iter()
            .map(|kind| (kind, Arc::new(JobSlot::new(kind))))
            .collect();

        let registry = Self {
            slots: Arc::new(slots),
            registrar,
            store,
            gate: Arc::new(ApiGate::from_millis(config.engine.min_call_interval_ms)),
            config,
            events,
        };

        Ok((registry, rx))
    }

    /// Start a run of `kind` over `items`
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`]: `change` does not belong to `kind` or is
    ///   malformed; the slot is untouched
    /// - [`Error::Conflict`]: a run of this kind is active (or its worker is
    ///   still finishing the last call); the slot is untouched
    /// - [`Error::Fatal`]: the item list is empty or invalid; the slot now
    ///   holds a run in status `error` with the message
    pub async fn start_job(
        &self,
        kind: JobKind,
        items: Vec<String>,
        change: Change,
    ) -> Result<JobHandle> {
        if change.kind() != kind {
            return Err(Error::invalid_input(format!(
                "{} change cannot drive a {} job",
                change.kind(),
                kind
            )));
        }
        change.validate()?;

        let slot = self.slot(kind);
        let mut cell = slot.cell.write().await;

        if let Some(current) = cell.state.as_ref() {
            if current.is_active() || cell.worker_live {
                debug!("Rejecting {} start, slot busy ({})", kind, current.status);
                return Err(Error::Conflict {
                    kind,
                    status: current.status,
                });
            }
        }

        let items = match normalize_items(items.clone()) {
            Ok(items) => items,
            Err(e) => {
                let message = match &e {
                    Error::Fatal(message) => message.clone(),
                    other => other.to_string(),
                };
                warn!("Rejected {} job: {}", kind, message);
                let rejected = OperationState::rejected(change, items, message.clone());
                let _order = slot.save_order.lock().await;
                persist(self.store.as_ref(), &rejected).await;
                slot.publish_status(rejected.status);
                cell.state = Some(rejected);
                self.events.emit(JobEvent::Failed { kind, message });
                return Err(e);
            }
        };

        let state = OperationState::new(change, items);
        let handle = JobHandle {
            kind,
            total: state.total(),
            created_at: state.created_at,
        };
        cell.state = Some(state);
        slot.publish_status(JobStatus::Running);
        self.spawn_worker(&slot, &mut cell);

        info!("Started {} job with {} items", kind, handle.total);
        self.events.emit(JobEvent::Started {
            kind,
            total: handle.total,
        });
        persist_released(&slot, self.store.as_ref(), cell).await;

        Ok(handle)
    }

    /// Stop the run of `kind`
    ///
    /// Idempotent: stopping a run that is not running or rate limited, or a
    /// kind that never ran, does nothing. The call in flight (if any) finishes
    /// and its outcome is recorded.
    pub async fn stop_job(&self, kind: JobKind) -> Result<()> {
        let slot = self.slot(kind);
        let mut cell = slot.cell.write().await;

        let Some(state) = cell.state.as_mut() else {
            debug!("Stop requested for {} but no job has run", kind);
            return Ok(());
        };

        if !state.request_stop() {
            debug!("Stop requested for {} job in status {}, nothing to do", kind, state.status);
            return Ok(());
        }

        slot.publish_status(JobStatus::Stopped);
        info!(
            "Stopped {} job at {}/{}",
            kind,
            state.cursor,
            state.total()
        );
        self.events.emit(JobEvent::Stopped {
            kind,
            cursor: state.cursor,
        });
        persist_released(&slot, self.store.as_ref(), cell).await;

        Ok(())
    }

    /// Resume the run of `kind` from its stored cursor
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`]: no job of this kind has run
    /// - [`Error::InvalidState`]: the run is neither rate limited nor stopped
    ///   with items remaining
    pub async fn resume_job(&self, kind: JobKind) -> Result<()> {
        let slot = self.slot(kind);
        let mut cell = slot.cell.write().await;

        let state = cell.state.as_mut().ok_or(Error::NotFound(kind))?;
        state.resume()?;
        let cursor = state.cursor;
        let total = state.total();
        slot.publish_status(JobStatus::Running);

        if !cell.worker_live {
            self.spawn_worker(&slot, &mut cell);
        }

        info!("Resumed {} job at {}/{}", kind, cursor, total);
        self.events.emit(JobEvent::Resumed { kind, cursor });
        persist_released(&slot, self.store.as_ref(), cell).await;

        Ok(())
    }

    /// Copy of the current state of `kind`
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`]: no job of this kind has run
    pub async fn snapshot(&self, kind: JobKind) -> Result<OperationState> {
        self.reporter().snapshot(kind).await
    }

    /// Progress reporter reading from this registry's slots
    pub fn reporter(&self) -> ProgressReporter {
        ProgressReporter::new(self.slots.clone(), self.config.progress.clone())
    }

    /// Load persisted runs into empty slots
    ///
    /// A run that was running or rate limited when the process died has no
    /// worker anymore; it is restored as `stopped` so an operator can resume
    /// it from its cursor. Slots that already hold a run are left alone.
    ///
    /// A stored run whose kind disagrees with its store key, or whose cursor
    /// and counters are inconsistent, is skipped with a warning.
    ///
    /// # Returns
    ///
    /// The kinds that were restored
    pub async fn restore(&self) -> Result<Vec<JobKind>> {
        let mut restored = Vec::new();

        for kind in self.store.list().await? {
            let Some(mut state) = self.store.load(kind).await? else {
                continue;
            };

            if state.kind != kind {
                warn!("Skipping restore of {}: stored run is a {} job", kind, state.kind);
                continue;
            }
            if let Err(e) = state.check_invariants() {
                warn!("Skipping restore of {}: {}", kind, e);
                continue;
            }

            let slot = self.slot(kind);
            let mut cell = slot.cell.write().await;
            if cell.state.is_some() {
                debug!("Skipping restore of {}, slot already in use", kind);
                continue;
            }

            if state.interrupt() {
                info!(
                    "Restored {} job interrupted by restart at {}/{}; resume to continue",
                    kind,
                    state.cursor,
                    state.total()
                );
                persist(self.store.as_ref(), &state).await;
            } else {
                debug!("Restored {} job in status {}", kind, state.status);
            }

            slot.publish_status(state.status);
            cell.state = Some(state);
            restored.push(kind);
        }

        Ok(restored)
    }

    /// Wait until no worker runs for `kind`
    ///
    /// Returns once the run has completed, paused on a rate limit or
    /// observed a stop. Returns immediately if no worker is running.
    pub async fn wait_until_settled(&self, kind: JobKind) -> Result<()> {
        let mut live_rx = self.slot(kind).subscribe_live();
        live_rx
            .wait_for(|live| !*live)
            .await
            .map(|_| ())
            .map_err(|_| Error::Other(format!("{} slot closed", kind)))
    }

    fn slot(&self, kind: JobKind) -> Arc<JobSlot> {
        // Every kind gets a slot in new()
        self.slots[&kind].clone()
    }

    /// Mark the slot's worker live and spawn it; call with the cell lock held
    fn spawn_worker(&self, slot: &Arc<JobSlot>, cell: &mut SlotCell) {
        cell.worker_live = true;
        slot.publish_live(true);

        let executor = BatchExecutor {
            slot: slot.clone(),
            registrar: self.registrar.clone(),
            store: self.store.clone(),
            gate: self.gate.clone(),
            batching: self.config.batching.clone(),
            events: self.events.clone(),
        };
        tokio::spawn(executor.run());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registrar::DryRunRegistrar;
    use crate::state::MemoryJobStore;

    fn registry() -> (JobRegistry, mpsc::Receiver<JobEvent>) {
        JobRegistry::new(
            Arc::new(DryRunRegistrar::new()),
            Arc::new(MemoryJobStore::new()),
            BulkOpsConfig::default(),
        )
        .unwrap()
    }

    fn domains(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn snapshot_of_unknown_kind_is_not_found() {
        let (registry, _rx) = registry();
        assert!(matches!(
            registry.snapshot(JobKind::DnsAdd).await,
            Err(Error::NotFound(JobKind::DnsAdd))
        ));
    }

    #[tokio::test]
    async fn mismatched_change_leaves_slot_untouched() {
        let (registry, _rx) = registry();
        let result = registry
            .start_job(JobKind::Sync, domains(&["a.com"]), Change::redirect("https://x.example"))
            .await;

        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(registry.snapshot(JobKind::Sync).await.is_err());
    }

    #[tokio::test]
    async fn empty_item_list_is_fatal_and_recorded() {
        let (registry, mut rx) = registry();
        let result = registry.start_job(JobKind::Sync, Vec::new(), Change::Sync).await;

        assert!(matches!(result, Err(Error::Fatal(_))));
        let state = registry.snapshot(JobKind::Sync).await.unwrap();
        assert_eq!(state.status, JobStatus::Error);
        assert_eq!(state.error.as_deref(), Some("Item list is empty"));
        assert!(matches!(rx.recv().await, Some(JobEvent::Failed { .. })));
    }

    #[tokio::test]
    async fn dry_run_job_completes() {
        let (registry, _rx) = registry();
        let handle = registry
            .start_job(JobKind::Sync, domains(&["a.com", "B.com "]), Change::Sync)
            .await
            .unwrap();
        assert_eq!(handle.total, 2);

        registry.wait_until_settled(JobKind::Sync).await.unwrap();
        let state = registry.snapshot(JobKind::Sync).await.unwrap();
        assert_eq!(state.status, JobStatus::Completed);
        assert_eq!(state.items, domains(&["a.com", "b.com"]));
        assert_eq!(state.created, 2);
    }

    #[tokio::test]
    async fn stop_and_resume_of_unknown_kind() {
        let (registry, _rx) = registry();
        registry.stop_job(JobKind::DnsRemove).await.unwrap();
        assert!(matches!(
            registry.resume_job(JobKind::DnsRemove).await,
            Err(Error::NotFound(_))
        ));
    }
}
