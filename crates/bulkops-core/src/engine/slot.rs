//! Per-kind registry slot
//!
//! A slot holds the current run of one job kind together with the liveness
//! of its worker. Both live under one lock: a worker decides to exit and
//! clears `worker_live` in the same critical section, so a control request
//! never sees a half-exited worker.
//!
//! Saves to the job store happen after the cell lock is released, so a poll
//! never waits on disk I/O. `save_order` is taken before the cell lock is
//! dropped; saves of one kind reach the store in the order their states were
//! produced.

use tokio::sync::{watch, Mutex, RwLock};

use crate::job::{JobKind, JobStatus, OperationState};

/// Lock-protected contents of a slot
#[derive(Debug, Default)]
pub(crate) struct SlotCell {
    /// Latest run of this kind, `None` until one is started or restored
    pub(crate) state: Option<OperationState>,

    /// Whether an executor task currently owns this run
    pub(crate) worker_live: bool,
}

/// Registry slot for one job kind
#[derive(Debug)]
pub(crate) struct JobSlot {
    pub(crate) kind: JobKind,
    pub(crate) cell: RwLock<SlotCell>,
    pub(crate) save_order: Mutex<()>,
    status_tx: watch::Sender<JobStatus>,
    live_tx: watch::Sender<bool>,
}

impl JobSlot {
    pub(crate) fn new(kind: JobKind) -> Self {
        let (status_tx, _) = watch::channel(JobStatus::Idle);
        let (live_tx, _) = watch::channel(false);
        Self {
            kind,
            cell: RwLock::new(SlotCell::default()),
            save_order: Mutex::new(()),
            status_tx,
            live_tx,
        }
    }

    /// Publish a status change; call with the cell lock held
    pub(crate) fn publish_status(&self, status: JobStatus) {
        self.status_tx.send_replace(status);
    }

    /// Publish worker liveness; call with the cell lock held
    pub(crate) fn publish_live(&self, live: bool) {
        self.live_tx.send_replace(live);
    }

    pub(crate) fn subscribe_status(&self) -> watch::Receiver<JobStatus> {
        self.status_tx.subscribe()
    }

    pub(crate) fn subscribe_live(&self) -> watch::Receiver<bool> {
        self.live_tx.subscribe()
    }
}
