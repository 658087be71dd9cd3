//! Job model
//!
//! [`OperationState`] is the single source of truth for one run of a bulk
//! job. Readers get clones; only the executor and the control surface mutate
//! it, through the `pub(crate)` transition methods below.
//!
//! ## Status machine
//!
//! ```text
//!            ┌──────────── resume ────────────┐
//!            ▼                                │
//!  start ─▶ running ── throttled ──▶ rate_limited
//!            │  │                             │
//!            │  └── stop ──▶ stopped ◀── stop ┘
//!            │                  │
//!            │                  └── resume (items remain) ──▶ running
//!            ├── cursor == len ──▶ completed
//!            └── fatal ──────────▶ error
//! ```

pub mod change;
pub mod items;

pub use change::{Change, DnsRecord, RecordType};
pub use items::{normalize_items, validate_domain_name};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::traits::ApplyResult;

/// Category of bulk operation; one registry slot per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Sync the domain portfolio from the registrar
    Sync,
    /// Bulk redirect target update
    RedirectUpdate,
    /// Bulk DNS record add
    DnsAdd,
    /// Bulk DNS record removal
    DnsRemove,
}

impl JobKind {
    /// All job kinds
    pub const ALL: [JobKind; 4] = [
        JobKind::Sync,
        JobKind::RedirectUpdate,
        JobKind::DnsAdd,
        JobKind::DnsRemove,
    ];

    /// Stable name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Sync => "sync",
            JobKind::RedirectUpdate => "redirect_update",
            JobKind::DnsAdd => "dns_add",
            JobKind::DnsRemove => "dns_remove",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        JobKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| Error::invalid_input(format!("Unknown job kind: {}", s)))
    }
}

/// Status of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Nothing has run
    #[default]
    Idle,
    /// Worker is advancing the cursor
    Running,
    /// Paused by registrar throttling, waiting for resume
    RateLimited,
    /// Halted by the operator
    Stopped,
    /// Every item was attempted
    Completed,
    /// Ended by a fatal error
    Error,
}

impl JobStatus {
    /// Whether this status occupies the registry slot
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Running | JobStatus::RateLimited)
    }

    /// Whether this status ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Stopped | JobStatus::Completed | JobStatus::Error
        )
    }

    /// Stable name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Idle => "idle",
            JobStatus::Running => "running",
            JobStatus::RateLimited => "rate_limited",
            JobStatus::Stopped => "stopped",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// The item that failed
    pub item: String,
    /// Failure message from the registrar
    pub message: String,
    /// When the failure was recorded
    pub at: DateTime<Utc>,
}

/// State of one run of a bulk job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationState {
    /// Registry slot that owns this run
    pub kind: JobKind,
    /// Current status
    pub status: JobStatus,
    /// Change applied to every item
    pub change: Change,
    /// Work items, fixed for the lifetime of the run
    pub items: Vec<String>,
    /// Index of the next item to process
    pub cursor: usize,
    /// Items attempted (succeeded or failed)
    pub processed: usize,
    /// Items that succeeded
    pub successful: usize,
    /// Successful items the registrar reported as newly created
    pub created: usize,
    /// Successful items the registrar reported as modified
    pub updated: usize,
    /// Per-item failures, oldest first
    pub error_log: Vec<ErrorEntry>,
    /// Item in flight, or the throttled item while rate limited
    pub current_item: Option<String>,
    /// Message of the last throttling signal
    pub rate_limit_message: Option<String>,
    /// Fatal error message
    pub error: Option<String>,
    /// When the run was accepted
    pub created_at: DateTime<Utc>,
    /// Last mutation
    pub updated_at: DateTime<Utc>,
    /// When the run reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
}

impl OperationState {
    /// A freshly accepted run
    pub(crate) fn new(change: Change, items: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            kind: change.kind(),
            status: JobStatus::Running,
            change,
            items,
            cursor: 0,
            processed: 0,
            successful: 0,
            created: 0,
            updated: 0,
            error_log: Vec::new(),
            current_item: None,
            rate_limit_message: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// A run rejected before its first item
    pub(crate) fn rejected(change: Change, items: Vec<String>, message: impl Into<String>) -> Self {
        let mut state = Self::new(change, items);
        state.fail(message);
        state
    }

    /// Number of items in the run
    pub fn total(&self) -> usize {
        self.items.len()
    }

    /// Items not yet attempted
    pub fn remaining(&self) -> usize {
        self.items.len().saturating_sub(self.cursor)
    }

    /// Check the counters and cursor of a state read back from a store
    ///
    /// # Errors
    ///
    /// - [`Error::StateStore`]: the state names the wrong kind, or its cursor
    ///   and counters disagree with each other or with the item list
    pub fn check_invariants(&self) -> Result<()> {
        let broken = if self.change.kind() != self.kind {
            Some(format!("{} change stored in a {} job", self.change.kind(), self.kind))
        } else if self.cursor > self.items.len() {
            Some(format!("cursor {} beyond {} items", self.cursor, self.items.len()))
        } else if self.processed != self.cursor {
            Some(format!("processed {} differs from cursor {}", self.processed, self.cursor))
        } else if self.successful + self.failed() != self.processed {
            Some(format!(
                "{} successful and {} failed do not add up to {} processed",
                self.successful,
                self.failed(),
                self.processed
            ))
        } else if self.created + self.updated > self.successful {
            Some(format!(
                "{} created and {} updated exceed {} successful",
                self.created, self.updated, self.successful
            ))
        } else {
            None
        };

        match broken {
            Some(reason) => Err(Error::state_store(format!("invalid {} job: {}", self.kind, reason))),
            None => Ok(()),
        }
    }

    /// Number of failed items
    pub fn failed(&self) -> usize {
        self.error_log.len()
    }

    /// Whether the run occupies its registry slot
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Whether `resume` would be accepted
    pub fn can_resume(&self) -> bool {
        matches!(self.status, JobStatus::RateLimited | JobStatus::Stopped) && self.remaining() > 0
    }

    /// Claim the item at the cursor if the run may continue
    pub(crate) fn next_item(&mut self) -> Option<String> {
        if self.status != JobStatus::Running || self.cursor >= self.items.len() {
            return None;
        }
        let item = self.items[self.cursor].clone();
        self.current_item = Some(item.clone());
        self.touch();
        Some(item)
    }

    /// Count the in-flight item as succeeded
    pub(crate) fn record_success(&mut self, result: ApplyResult) {
        self.successful += 1;
        match result {
            ApplyResult::Created => self.created += 1,
            ApplyResult::Updated => self.updated += 1,
            ApplyResult::Unchanged => {}
        }
        self.advance();
    }

    /// Count the in-flight item as failed
    pub(crate) fn record_failure(&mut self, message: impl Into<String>) {
        let item = self.items[self.cursor].clone();
        self.error_log.push(ErrorEntry {
            item,
            message: message.into(),
            at: Utc::now(),
        });
        self.advance();
    }

    /// Park on a throttling signal without counting the in-flight item
    ///
    /// Returns false when a stop arrived during the call; the run then stays
    /// stopped with the item still pending.
    pub(crate) fn pause_rate_limited(&mut self, message: impl Into<String>) -> bool {
        self.rate_limit_message = Some(message.into());
        self.touch();
        if self.status != JobStatus::Running {
            return false;
        }
        self.status = JobStatus::RateLimited;
        true
    }

    /// Finish the run once every item has been attempted
    pub(crate) fn complete(&mut self) -> bool {
        if self.status != JobStatus::Running || self.cursor < self.items.len() {
            return false;
        }
        self.status = JobStatus::Completed;
        self.current_item = None;
        self.finish();
        true
    }

    /// End the run on a fatal error
    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Error;
        self.error = Some(message.into());
        self.current_item = None;
        self.finish();
    }

    /// Operator stop; no-op unless running or rate limited
    pub(crate) fn request_stop(&mut self) -> bool {
        if !self.status.is_active() {
            return false;
        }
        self.status = JobStatus::Stopped;
        self.finish();
        true
    }

    /// Operator resume from the stored cursor
    pub(crate) fn resume(&mut self) -> Result<()> {
        if !self.can_resume() {
            let reason = if self.remaining() == 0 {
                "no items remain".to_string()
            } else {
                "only rate limited or stopped jobs can be resumed".to_string()
            };
            return Err(Error::invalid_state(self.kind, self.status, "resume", reason));
        }
        self.status = JobStatus::Running;
        self.rate_limit_message = None;
        self.completed_at = None;
        self.touch();
        Ok(())
    }

    /// Demote a run that was active when the process died
    pub(crate) fn interrupt(&mut self) -> bool {
        if !self.status.is_active() {
            return false;
        }
        self.status = JobStatus::Stopped;
        self.current_item = None;
        self.finish();
        true
    }

    fn advance(&mut self) {
        self.processed += 1;
        self.cursor += 1;
        self.current_item = None;
        self.touch();
    }

    fn finish(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
