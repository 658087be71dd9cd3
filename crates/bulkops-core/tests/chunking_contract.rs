//! Contract Test: Chunking & Call Spacing
//!
//! Constraints verified:
//! - Runs above the threshold cool down after every chunk
//! - Runs at or below the threshold never cool down
//! - A stop cuts a cooldown short
//! - Registrar calls respect the minimum interval
//!
//! Runs on tokio's paused clock, so delays cost no wall time.

mod common;

use bulkops_core::{BulkOpsConfig, JobEvent, JobKind, JobStatus, MemoryJobStore};
use common::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const KIND: JobKind = JobKind::RedirectUpdate;

fn chunked_config() -> BulkOpsConfig {
    let mut config = BulkOpsConfig::default();
    config.batching.chunk_threshold = 4;
    config.batching.chunk_size = 2;
    config.batching.chunk_delay_secs = 15;
    config
}

fn five_domains() -> Vec<String> {
    domains(&["a.com", "b.com", "c.com", "d.com", "e.com"])
}

#[tokio::test(start_paused = true)]
async fn large_runs_cool_down_between_chunks() {
    let registrar = ScriptedRegistrar::new();
    let (registry, mut events) = registry_with_config(
        registrar.clone(),
        Arc::new(MemoryJobStore::new()),
        chunked_config(),
    );
    let started = Instant::now();

    registry.start_job(KIND, five_domains(), redirect()).await.unwrap();
    registry.wait_until_settled(KIND).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(
        registry.snapshot(KIND).await.unwrap().status,
        JobStatus::Completed
    );

    let cooldowns: Vec<usize> = drain_events(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            JobEvent::ChunkCooldown { cursor, delay_secs, .. } => {
                assert_eq!(delay_secs, 15);
                Some(cursor)
            }
            _ => None,
        })
        .collect();
    assert_eq!(cooldowns, vec![2, 4]);
}

#[tokio::test(start_paused = true)]
async fn runs_at_the_threshold_are_not_chunked() {
    let registrar = ScriptedRegistrar::new();
    let (registry, mut events) = registry_with_config(
        registrar.clone(),
        Arc::new(MemoryJobStore::new()),
        chunked_config(),
    );
    let started = Instant::now();

    registry
        .start_job(KIND, domains(&["a.com", "b.com", "c.com", "d.com"]), redirect())
        .await
        .unwrap();
    registry.wait_until_settled(KIND).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(
        !drain_events(&mut events)
            .iter()
            .any(|e| matches!(e, JobEvent::ChunkCooldown { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn stop_interrupts_a_cooldown() {
    let registrar = ScriptedRegistrar::new();
    let (registry, _events) = registry_with_config(
        registrar.clone(),
        Arc::new(MemoryJobStore::new()),
        chunked_config(),
    );
    let started = Instant::now();

    registry.start_job(KIND, five_domains(), redirect()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(registrar.calls().len(), 2, "worker is cooling down after a chunk");

    registry.stop_job(KIND).await.unwrap();
    registry.wait_until_settled(KIND).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(15));
    let state = registry.snapshot(KIND).await.unwrap();
    assert_eq!(state.status, JobStatus::Stopped);
    assert_eq!(state.cursor, 2);
    assert_eq!(registrar.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn registrar_calls_are_spaced_by_the_minimum_interval() {
    let mut config = BulkOpsConfig::default();
    config.engine.min_call_interval_ms = 1000;
    let registrar = ScriptedRegistrar::new();
    let (registry, _events) =
        registry_with_config(registrar.clone(), Arc::new(MemoryJobStore::new()), config);
    let started = Instant::now();

    registry
        .start_job(KIND, domains(&["a.com", "b.com", "c.com"]), redirect())
        .await
        .unwrap();
    registry.wait_until_settled(KIND).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(registrar.calls().len(), 3);
}
