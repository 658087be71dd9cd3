//! Dry-run registrar
//!
//! Logs the change it would make for each domain instead of calling a
//! registrar API. Useful to rehearse a bulk job, and to exercise pause and
//! resume by simulating throttling every N calls.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::info;

use crate::error::{Error, Result};
use crate::job::Change;
use crate::traits::{ApplyResult, Registrar};

/// Registrar that only logs intended changes
#[derive(Debug, Default)]
pub struct DryRunRegistrar {
    /// Simulate a throttling response on every Nth call
    throttle_every: Option<usize>,

    /// Calls made so far
    calls: AtomicUsize,

    /// Domains already seen by a sync
    synced: Mutex<HashSet<String>>,
}

impl DryRunRegistrar {
    /// Create a dry-run registrar that never throttles
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate throttling on every `n`th call (0 disables)
    pub fn with_throttle_every(mut self, n: usize) -> Self {
        self.throttle_every = (n > 0).then_some(n);
        self
    }

    /// Number of calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Registrar for DryRunRegistrar {
    async fn apply(&self, domain: &str, change: &Change) -> Result<ApplyResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(n) = self.throttle_every {
            if call % n == 0 {
                return Err(Error::rate_limited(format!(
                    "Simulated throttling on call {}",
                    call
                )));
            }
        }

        let result = match change {
            Change::Sync => {
                let mut synced = self
                    .synced
                    .lock()
                    .map_err(|_| Error::Other("dry-run sync set poisoned".to_string()))?;
                if synced.insert(domain.to_string()) {
                    ApplyResult::Created
                } else {
                    ApplyResult::Unchanged
                }
            }
            _ => ApplyResult::Updated,
        };

        match change {
            Change::Sync => info!("[dry-run] {}: sync ({:?})", domain, result),
            Change::RedirectUpdate { name, target } => {
                info!("[dry-run] {}: redirect {} -> {}", domain, name, target)
            }
            Change::DnsAdd { records } => {
                for record in records {
                    info!(
                        "[dry-run] {}: add {} {} {} (ttl {})",
                        domain, record.record_type, record.name, record.address, record.ttl
                    );
                }
            }
            Change::DnsRemove { record_type, name } => {
                info!("[dry-run] {}: remove {} {}", domain, record_type, name)
            }
        }

        Ok(result)
    }

    fn registrar_name(&self) -> &'static str {
        "dry-run"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sync_reports_new_domains_once() {
        let registrar = DryRunRegistrar::new();
        assert_eq!(
            registrar.apply("a.com", &Change::Sync).await.unwrap(),
            ApplyResult::Created
        );
        assert_eq!(
            registrar.apply("a.com", &Change::Sync).await.unwrap(),
            ApplyResult::Unchanged
        );
    }

    #[tokio::test]
    async fn simulated_throttling() {
        let registrar = DryRunRegistrar::new().with_throttle_every(2);
        let change = Change::redirect("https://client.example");

        assert!(registrar.apply("a.com", &change).await.is_ok());
        let err = registrar.apply("b.com", &change).await.unwrap_err();
        assert!(err.is_rate_limited());
        assert!(registrar.apply("b.com", &change).await.is_ok());
        assert_eq!(registrar.calls(), 3);
    }
}
