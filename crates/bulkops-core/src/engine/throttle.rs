//! Process-wide registrar call gate
//!
//! The registrar enforces one quota per account, so all job kinds share a
//! single gate. Holding an [`ApiPermit`] is the only way the executor calls
//! the registrar; permits are handed out one at a time and spaced by the
//! configured minimum interval.

use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::debug;

/// Serializes registrar calls across every running job
#[derive(Debug)]
pub struct ApiGate {
    /// Minimum spacing between the start of two calls
    min_interval: Duration,

    /// Start time of the last call
    last_call: Mutex<Option<Instant>>,
}

/// Exclusive right to make one registrar call
///
/// The next caller waits until this permit is dropped.
#[derive(Debug)]
pub struct ApiPermit<'a> {
    _guard: MutexGuard<'a, Option<Instant>>,
}

impl ApiGate {
    /// Create a gate with the given minimum interval between calls
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Create a gate from the engine's millisecond setting
    pub fn from_millis(min_interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(min_interval_ms))
    }

    /// Wait for the right to make the next registrar call
    pub async fn acquire(&self) -> ApiPermit<'_> {
        let mut guard = self.last_call.lock().await;

        if let Some(last) = *guard {
            let ready_at = last + self.min_interval;
            if ready_at > Instant::now() {
                debug!(
                    "Spacing registrar calls, waiting {:?}",
                    ready_at - Instant::now()
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }

        *guard = Some(Instant::now());
        ApiPermit { _guard: guard }
    }

    /// Configured minimum interval
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

impl Default for ApiGate {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}
