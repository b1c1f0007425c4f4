//! Reachability and latency probing.
//!
//! The attempt runs as its own task raced against an independent timer:
//! when the timer wins, the attempt is abandoned rather than aborted, and
//! any connection it eventually opens is reclaimed through the pool's
//! normal failure-detection paths. The tester holds no state between calls;
//! persisting results is the caller's concern.

use crate::error::RemoteResult;
use crate::router::BackendRouter;
use crate::types::{TargetDescriptor, TestReport};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Default overall budget for one test.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Produces a [`TestReport`] for any target without disturbing
/// steady-state pool configuration.
pub struct ConnectionTester {
    router: Arc<BackendRouter>,
    timeout: Duration,
}

impl ConnectionTester {
    pub fn new(router: Arc<BackendRouter>) -> Self {
        Self {
            router,
            timeout: DEFAULT_TEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Probe `target` and classify the outcome as ok, timeout, or error.
    pub async fn test(&self, target: &TargetDescriptor) -> TestReport {
        let router = self.router.clone();
        let target = target.clone();
        let budget = self.timeout;
        let label = target.label();

        let attempt = async move {
            match target {
                // Network probes tighten both the acquire and the ready
                // budget so an unreachable host fails fast.
                TargetDescriptor::Ssh(params) => router.ssh().probe(&params, budget).await,
                TargetDescriptor::Wsl(params) => router.wsl().probe(&params.distro_name).await,
            }
        };

        let report = race_probe(attempt, budget).await;
        info!(
            target = %label,
            ok = report.ok,
            timeout = report.timeout,
            latency_ms = report.latency_ms,
            "connection test finished"
        );
        report
    }
}

/// Race `attempt` against an independent timer and classify the result.
async fn race_probe<F>(attempt: F, limit: Duration) -> TestReport
where
    F: Future<Output = RemoteResult<()>> + Send + 'static,
{
    let started = Instant::now();
    let handle = tokio::spawn(attempt);

    let outcome = tokio::select! {
        joined = handle => match joined {
            Ok(result) => Some(result),
            Err(err) => Some(Err(crate::error::RemoteError::io("connection test", err))),
        },
        // The spawned attempt keeps running; it is abandoned from the
        // caller's perspective, never aborted mid-handshake.
        _ = tokio::time::sleep(limit) => None,
    };

    let tested_at = Utc::now();
    match outcome {
        Some(Ok(())) => TestReport {
            ok: true,
            latency_ms: Some(started.elapsed().as_millis() as u64),
            error: None,
            timeout: false,
            tested_at,
        },
        Some(Err(err)) => TestReport {
            ok: false,
            latency_ms: None,
            timeout: err.is_timeout(),
            error: Some(err.to_string()),
            tested_at,
        },
        None => TestReport {
            ok: false,
            latency_ms: None,
            timeout: true,
            error: Some(format!(
                "connection test timed out after {} ms",
                limit.as_millis()
            )),
            tested_at,
        },
    }
}
