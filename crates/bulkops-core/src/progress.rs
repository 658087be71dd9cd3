//! Progress reporting
//!
//! Polling clients read full snapshots; there is no push channel on this
//! surface. Reads take the slot's read lock only. Item-boundary saves happen
//! after that lock is released and no registrar call runs under it, so a poll
//! waits at most for a state transition or a run's final save.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ProgressConfig;
use crate::engine::slot::JobSlot;
use crate::error::{Error, Result};
use crate::job::{JobKind, JobStatus, OperationState};

/// One entry of the recent-errors tail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedError {
    pub item: String,
    /// Message, truncated for display
    pub message: String,
    pub at: DateTime<Utc>,
}

/// What a poller sees for one job kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub kind: JobKind,
    pub status: JobStatus,
    pub processed: usize,
    pub total: usize,
    pub cursor: usize,
    pub current_item: Option<String>,
    pub successful: usize,
    pub failed: usize,
    /// Successful items the registrar reported as new
    pub created: usize,
    /// Successful items the registrar reported as modified
    pub updated: usize,
    /// Share of items attempted, 0.0 to 100.0
    pub percent: f64,
    /// Most recent errors, oldest first
    pub recent_errors: Vec<ReportedError>,
    pub total_errors: usize,
    pub rate_limit_message: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProgressReport {
    /// Build a report from a state snapshot
    pub fn from_state(state: &OperationState, config: &ProgressConfig) -> Self {
        let total = state.total();
        let percent = if total == 0 {
            0.0
        } else {
            state.processed as f64 * 100.0 / total as f64
        };

        let skip = state.error_log.len().saturating_sub(config.recent_errors);
        let recent_errors = state.error_log[skip..]
            .iter()
            .map(|entry| ReportedError {
                item: entry.item.clone(),
                message: truncate_message(&entry.message, config.max_message_len),
                at: entry.at,
            })
            .collect();

        Self {
            kind: state.kind,
            status: state.status,
            processed: state.processed,
            total,
            cursor: state.cursor,
            current_item: state.current_item.clone(),
            successful: state.successful,
            failed: state.failed(),
            created: state.created,
            updated: state.updated,
            percent,
            recent_errors,
            total_errors: state.error_log.len(),
            rate_limit_message: state
                .rate_limit_message
                .as_deref()
                .map(|m| truncate_message(m, config.max_message_len)),
            error: state.error.clone(),
            created_at: state.created_at,
            updated_at: state.updated_at,
            completed_at: state.completed_at,
        }
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} {}: {}/{} ({:.0}%), {} ok, {} failed",
            self.kind,
            self.status,
            self.processed,
            self.total,
            self.percent,
            self.successful,
            self.failed
        );
        if self.kind == JobKind::Sync {
            line.push_str(&format!(", added {} | updated {}", self.created, self.updated));
        }
        if let Some(item) = &self.current_item {
            line.push_str(&format!(", at {}", item));
        }
        line
    }
}

/// Read-only view of the registry for polling clients
///
/// Cheap to clone; clones read the same slots.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    slots: Arc<HashMap<JobKind, Arc<JobSlot>>>,
    config: ProgressConfig,
}

impl ProgressReporter {
    pub(crate) fn new(slots: Arc<HashMap<JobKind, Arc<JobSlot>>>, config: ProgressConfig) -> Self {
        Self { slots, config }
    }

    /// Copy of the current state of `kind`
    ///
    /// May be one item behind the worker. Fails with [`Error::NotFound`] when
    /// no job of this kind has run.
    pub async fn snapshot(&self, kind: JobKind) -> Result<OperationState> {
        let slot = self.slots.get(&kind).ok_or(Error::NotFound(kind))?;
        let cell = slot.cell.read().await;
        cell.state.clone().ok_or(Error::NotFound(kind))
    }

    /// Progress report for `kind`
    pub async fn report(&self, kind: JobKind) -> Result<ProgressReport> {
        let state = self.snapshot(kind).await?;
        Ok(ProgressReport::from_state(&state, &self.config))
    }

    /// Reports for every kind that has run, in kind order
    pub async fn report_all(&self) -> Vec<ProgressReport> {
        let mut reports = Vec::new();
        for kind in JobKind::ALL {
            if let Ok(report) = self.report(kind).await {
                reports.push(report);
            }
        }
        reports
    }
}

/// Truncate `message` to `max_len` characters, marking the cut with `…`
pub fn truncate_message(message: &str, max_len: usize) -> String {
    if message.chars().count() <= max_len {
        return message.to_string();
    }
    let mut truncated: String = message.chars().take(max_len.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}
