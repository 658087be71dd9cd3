//! Test doubles and common utilities for contract tests
//!
//! The scripted registrar answers per domain from a queue of outcomes, logs
//! every call, and can hold a domain's call open until the test releases it.

#![allow(dead_code)]

use bulkops_core::error::Result;
use bulkops_core::traits::{ApplyResult, JobStore, Registrar};
use bulkops_core::{BulkOpsConfig, Change, Error, JobEvent, JobKind, JobRegistry, JobStatus};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};

/// Scripted answer for one call
#[derive(Debug, Clone)]
pub enum Outcome {
    Ok(ApplyResult),
    Fail(String),
    Throttle(String),
}

/// A registrar that answers from a script and records every call
#[derive(Default)]
pub struct ScriptedRegistrar {
    /// Outcomes per domain, consumed in order; unscripted calls succeed
    script: Mutex<HashMap<String, VecDeque<Outcome>>>,
    /// Domains in call order
    calls: Mutex<Vec<String>>,
    /// Domains whose calls block until released
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    /// Calls currently inside `apply`
    in_flight: AtomicUsize,
    /// Highest observed `in_flight`
    max_in_flight: AtomicUsize,
}

impl ScriptedRegistrar {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue an outcome for the next call on `domain`
    pub fn script(&self, domain: &str, outcome: Outcome) {
        self.script
            .lock()
            .unwrap()
            .entry(domain.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn throttle(&self, domain: &str) {
        self.script(domain, Outcome::Throttle("Too many requests".to_string()));
    }

    pub fn fail(&self, domain: &str, message: &str) {
        self.script(domain, Outcome::Fail(message.to_string()));
    }

    /// Make calls on `domain` wait until [`release`](Self::release)
    pub fn hold(&self, domain: &str) {
        self.gates
            .lock()
            .unwrap()
            .insert(domain.to_string(), Arc::new(Semaphore::new(0)));
    }

    /// Let one held call on `domain` return
    pub fn release(&self, domain: &str) {
        if let Some(gate) = self.gates.lock().unwrap().get(domain) {
            gate.add_permits(1);
        }
    }

    /// Domains in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls made for `domain`
    pub fn calls_for(&self, domain: &str) -> usize {
        self.calls().iter().filter(|d| d.as_str() == domain).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Registrar for ScriptedRegistrar {
    async fn apply(&self, domain: &str, _change: &Change) -> Result<ApplyResult> {
        self.calls.lock().unwrap().push(domain.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let gate = self.gates.lock().unwrap().get(domain).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let outcome = self
            .script
            .lock()
            .unwrap()
            .get_mut(domain)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(Outcome::Ok(ApplyResult::Updated));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Outcome::Ok(result) => Ok(result),
            Outcome::Fail(message) => Err(Error::registrar("scripted", message)),
            Outcome::Throttle(message) => Err(Error::rate_limited(message)),
        }
    }

    fn registrar_name(&self) -> &'static str {
        "scripted"
    }
}

/// Registry over `registrar` and `store` with default configuration
pub fn registry_with(
    registrar: Arc<ScriptedRegistrar>,
    store: Arc<dyn JobStore>,
) -> (JobRegistry, mpsc::Receiver<JobEvent>) {
    registry_with_config(registrar, store, BulkOpsConfig::default())
}

pub fn registry_with_config(
    registrar: Arc<ScriptedRegistrar>,
    store: Arc<dyn JobStore>,
    config: BulkOpsConfig,
) -> (JobRegistry, mpsc::Receiver<JobEvent>) {
    JobRegistry::new(registrar, store, config).expect("registry construction succeeds")
}

pub fn domains(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

pub fn redirect() -> Change {
    Change::redirect("https://client.example")
}

/// Poll `condition` until it holds, panicking after two seconds
pub async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {}",
            what
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait until the job of `kind` reports `status`
pub async fn wait_for_status(registry: &JobRegistry, kind: JobKind, status: JobStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if let Ok(state) = registry.snapshot(kind).await
            && state.status == status
        {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {} to become {}",
            kind,
            status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Drain the events received so far
pub fn drain_events(rx: &mut mpsc::Receiver<JobEvent>) -> Vec<JobEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
