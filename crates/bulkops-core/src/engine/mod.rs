//! Batch executor
//!
//! The executor is the single worker of one job run. It is responsible for:
//! - Claiming the item at the cursor while the run is `running`
//! - Applying the run's change to it through the shared [`ApiGate`]
//! - Recording the outcome in the [`OperationState`]
//! - Persisting the state after every item boundary
//! - Cooling down between chunks of large runs
//!
//! ## Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!  start / resume ───▶ │ JobRegistry  │ ── spawns ──┐
//!                      └──────────────┘             │
//!                                                   ▼
//!                                         ┌──────────────────┐
//!                                         │  BatchExecutor   │
//!                                         └──────────────────┘
//!                                                   │
//!         ┌────────────────────┬────────────────────┼────────────────────┐
//!         ▼                    ▼                    ▼                    ▼
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐     ┌─────────────┐
//! │   JobSlot    │     │   ApiGate    │     │   JobStore   │     │   Events    │
//! │ (state+lock) │     │  (one call)  │     │  (persist)   │     │  (notify)   │
//! └──────────────┘     └──────────────┘     └──────────────┘     └─────────────┘
//! ```
//!
//! ## Item Flow
//!
//! 1. Wait for the gate, then claim `items[cursor]` under the slot lock
//! 2. Release the lock and call `Registrar::apply()`
//! 3. Re-take the lock and record success, failure or throttling
//! 4. Release the lock and persist, then continue while the run is `running`
//!
//! The lock is never held across a registrar call or an item-boundary save,
//! so snapshots wait for neither the registrar nor the job store. A stop lands between steps and is observed at the next
//! item boundary; the outcome of the call in flight is still recorded.

pub mod throttle;

pub(crate) mod chunk;
pub(crate) mod slot;

pub use throttle::{ApiGate, ApiPermit};

use std::sync::Arc;
use tokio::sync::{mpsc, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::config::BatchingConfig;
use crate::error::Error;
use crate::job::{JobKind, JobStatus, OperationState};
use crate::traits::{ApplyResult, JobStore, Registrar};
use chunk::ChunkPolicy;
use slot::{JobSlot, SlotCell};

/// Events emitted while jobs run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// A run was accepted
    Started {
        kind: JobKind,
        total: usize,
    },

    /// An item was applied
    ItemSucceeded {
        kind: JobKind,
        item: String,
        result: ApplyResult,
    },

    /// An item failed and was recorded in the error log
    ItemFailed {
        kind: JobKind,
        item: String,
        message: String,
    },

    /// The registrar throttled the run; the item is retried on resume
    RateLimited {
        kind: JobKind,
        item: String,
        message: String,
    },

    /// The run was stopped
    Stopped {
        kind: JobKind,
        cursor: usize,
    },

    /// The run was resumed from its cursor
    Resumed {
        kind: JobKind,
        cursor: usize,
    },

    /// The executor is pausing between chunks
    ChunkCooldown {
        kind: JobKind,
        cursor: usize,
        delay_secs: u64,
    },

    /// Every item was attempted
    Completed {
        kind: JobKind,
        successful: usize,
        failed: usize,
    },

    /// The run ended with a fatal error
    Failed {
        kind: JobKind,
        message: String,
    },
}

/// Bounded, lossy event sender
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    tx: mpsc::Sender<JobEvent>,
}

impl EventSink {
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<JobEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Emit an event
    ///
    /// Never blocks a worker: when the channel is full or closed the event is
    /// dropped.
    pub(crate) fn emit(&self, event: JobEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Save a state, logging instead of failing the run
pub(crate) async fn persist(store: &dyn JobStore, state: &OperationState) {
    if let Err(e) = store.save(state).await {
        warn!("Failed to persist {} job state: {}", state.kind, e);
    }
}

/// Release the cell lock, then save a copy of the slot's state
///
/// The slot's save order is claimed before the cell lock is released, so
/// saves of one kind land in the order their states were produced.
pub(crate) async fn persist_released(
    slot: &JobSlot,
    store: &dyn JobStore,
    cell: RwLockWriteGuard<'_, SlotCell>,
) {
    let Some(state) = cell.state.clone() else {
        return;
    };
    let _order = slot.save_order.lock().await;
    drop(cell);
    persist(store, &state).await;
}

/// Worker for one run
///
/// Spawned by the registry with the slot's `worker_live` flag already set.
/// At most one executor exists per slot.
pub(crate) struct BatchExecutor {
    pub(crate) slot: Arc<JobSlot>,
    pub(crate) registrar: Arc<dyn Registrar>,
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) gate: Arc<ApiGate>,
    pub(crate) batching: BatchingConfig,
    pub(crate) events: EventSink,
}

impl BatchExecutor {
    /// Drive the run until it completes, pauses or is stopped
    pub(crate) async fn run(self) {
        let kind = self.slot.kind;
        let mut status_rx = self.slot.subscribe_status();
        let mut chunks: Option<ChunkPolicy> = None;

        debug!("{} worker started", kind);

        loop {
            let permit = if self.wants_item().await {
                Some(self.gate.acquire().await)
            } else {
                None
            };

            let mut cell = self.slot.cell.write().await;
            let next = match cell.state.as_mut() {
                Some(state) => state
                    .next_item()
                    .map(|item| (item, state.change.clone(), state.total())),
                None => None,
            };

            let (item, change, total) = match (next, permit.is_some()) {
                (Some(next), true) => next,
                // Resumed between the check and the claim; take the gate first
                (Some(_), false) => continue,
                (None, _) => {
                    let completed = cell.state.as_mut().is_some_and(|s| s.complete());
                    cell.worker_live = false;

                    if let (true, Some(state)) = (completed, cell.state.as_ref()) {
                        self.slot.publish_status(state.status);
                        // Final save stays under the lock: settled means durable
                        let _order = self.slot.save_order.lock().await;
                        persist(self.store.as_ref(), state).await;
                        info!(
                            "{} job completed: {} processed, {} successful, {} failed",
                            kind,
                            state.processed,
                            state.successful,
                            state.failed()
                        );
                        self.events.emit(JobEvent::Completed {
                            kind,
                            successful: state.successful,
                            failed: state.failed(),
                        });
                    }

                    self.slot.publish_live(false);
                    debug!("{} worker parked", kind);
                    return;
                }
            };
            drop(cell);

            debug!("{} job: applying change to {}", kind, item);
            let outcome = self.registrar.apply(&item, &change).await;
            drop(permit);

            let mut cell = self.slot.cell.write().await;
            let Some(state) = cell.state.as_mut() else {
                cell.worker_live = false;
                self.slot.publish_live(false);
                return;
            };

            match outcome {
                Ok(result) => {
                    state.record_success(result);
                    debug!("{} job: {} applied ({:?})", kind, item, result);
                    self.events.emit(JobEvent::ItemSucceeded {
                        kind,
                        item: item.clone(),
                        result,
                    });
                }
                Err(Error::RateLimited(message)) => {
                    if state.pause_rate_limited(message.clone()) {
                        self.slot.publish_status(JobStatus::RateLimited);
                        warn!(
                            "{} job rate limited at item {} ({}): {}. Waiting for resume.",
                            kind,
                            state.cursor + 1,
                            item,
                            message
                        );
                        self.events.emit(JobEvent::RateLimited {
                            kind,
                            item: item.clone(),
                            message,
                        });
                    } else {
                        debug!("{} job: throttled call for {} ended after stop", kind, item);
                    }
                }
                Err(e) => {
                    let message = item_error_message(e);
                    warn!("{} job: {} failed: {}", kind, item, message);
                    state.record_failure(message.clone());
                    self.events.emit(JobEvent::ItemFailed {
                        kind,
                        item: item.clone(),
                        message,
                    });
                }
            }

            let running = state.status == JobStatus::Running;
            let remaining = state.remaining();
            let cursor = state.cursor;
            persist_released(&self.slot, self.store.as_ref(), cell).await;

            let chunks = chunks.get_or_insert_with(|| ChunkPolicy::for_run(&self.batching, total));
            if let Some(delay) = chunks.record_call(remaining) {
                if running {
                    info!(
                        "{} job: chunk done at {}/{}, cooling down for {}s",
                        kind,
                        cursor,
                        total,
                        delay.as_secs()
                    );
                    self.events.emit(JobEvent::ChunkCooldown {
                        kind,
                        cursor,
                        delay_secs: delay.as_secs(),
                    });
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = async { status_rx.wait_for(|s| *s != JobStatus::Running).await.map(|_| ()) } => {
                            debug!("{} job: cooldown interrupted", kind);
                        }
                    }
                }
            }
        }
    }

    /// Whether the run has an item to hand out right now
    async fn wants_item(&self) -> bool {
        let cell = self.slot.cell.read().await;
        cell.state
            .as_ref()
            .is_some_and(|s| s.status == JobStatus::Running && s.remaining() > 0)
    }
}

/// Message recorded in the error log for a failed item
fn item_error_message(error: Error) -> String {
    match error {
        Error::Registrar { message, .. } => message,
        other => other.to_string(),
    }
}
