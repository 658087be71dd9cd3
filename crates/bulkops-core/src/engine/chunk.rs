//! Chunking of large runs
//!
//! Runs above the threshold pause after every `chunk_size` registrar calls.
//! Chunks share the run's cursor; a chunk is just a count of calls made by
//! the current worker.

use std::time::Duration;

use crate::config::BatchingConfig;

/// Tracks registrar calls of one worker and decides when to cool down
#[derive(Debug, Clone)]
pub(crate) struct ChunkPolicy {
    enabled: bool,
    chunk_size: usize,
    delay: Duration,
    calls: usize,
}

impl ChunkPolicy {
    /// Policy for a run of `total` items
    pub(crate) fn for_run(config: &BatchingConfig, total: usize) -> Self {
        Self {
            enabled: config.applies_to(total) && config.chunk_delay_secs > 0,
            chunk_size: config.chunk_size.max(1),
            delay: Duration::from_secs(config.chunk_delay_secs),
            calls: 0,
        }
    }

    /// Count one registrar call
    ///
    /// Returns the cooldown to observe when the call closed a chunk and items
    /// remain.
    pub(crate) fn record_call(&mut self, remaining: usize) -> Option<Duration> {
        self.calls += 1;
        if self.enabled && remaining > 0 && self.calls % self.chunk_size == 0 {
            Some(self.delay)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BatchingConfig {
        BatchingConfig {
            chunk_threshold: 4,
            chunk_size: 2,
            chunk_delay_secs: 15,
        }
    }

    #[test]
    fn small_runs_are_not_chunked() {
        let mut policy = ChunkPolicy::for_run(&config(), 4);
        assert_eq!(policy.record_call(3), None);
        assert_eq!(policy.record_call(2), None);
    }

    #[test]
    fn cooldown_after_each_full_chunk() {
        let mut policy = ChunkPolicy::for_run(&config(), 5);
        assert_eq!(policy.record_call(4), None);
        assert_eq!(policy.record_call(3), Some(Duration::from_secs(15)));
        assert_eq!(policy.record_call(2), None);
        assert_eq!(policy.record_call(1), Some(Duration::from_secs(15)));
    }

    #[test]
    fn no_cooldown_after_last_item() {
        let mut policy = ChunkPolicy::for_run(&config(), 6);
        for remaining in (1..6).rev() {
            policy.record_call(remaining);
        }
        assert_eq!(policy.record_call(0), None);
    }

    #[test]
    fn zero_delay_disables_chunking() {
        let mut config = config();
        config.chunk_delay_secs = 0;
        let mut policy = ChunkPolicy::for_run(&config, 10);
        assert_eq!(policy.record_call(9), None);
        assert_eq!(policy.record_call(8), None);
    }
}
