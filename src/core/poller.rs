//! Publish-readiness polling.
//!
//! The first check runs immediately. Later checks are spaced by `interval`,
//! sleeps are clamped to the deadline, and each check is bounded by
//! `min(check_timeout, remaining + interval)`, so a run never takes longer
//! than `timeout + interval`.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::{is_success, Probe};

/// Poller timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay between checks
    pub interval: Duration,

    /// Overall budget from the first check
    pub timeout: Duration,

    /// Upper bound for one check
    pub check_timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(180),
            check_timeout: Duration::from_secs(5),
        }
    }
}

/// Result of a polling run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Live { checks: u32, elapsed: Duration },
    TimedOut { checks: u32, elapsed: Duration },
    Cancelled { checks: u32 },
}

impl PollOutcome {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live { .. })
    }

    pub fn checks(&self) -> u32 {
        match *self {
            Self::Live { checks, .. } | Self::TimedOut { checks, .. } | Self::Cancelled { checks } => {
                checks
            }
        }
    }
}

/// Waits for a pages URL to answer 2xx
pub struct PublishPoller {
    probe: Arc<dyn Probe>,
    settings: PollSettings,
}

impl PublishPoller {
    pub fn new(probe: Arc<dyn Probe>, settings: PollSettings) -> Self {
        Self { probe, settings }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Poll with the configured timing
    pub async fn wait_until_live(&self, url: &str, cancel: &CancellationToken) -> PollOutcome {
        self.poll_until_live(url, self.settings.timeout, self.settings.interval, cancel)
            .await
    }

    /// Poll `url` until it answers 2xx, `timeout` elapses, or `cancel` fires
    pub async fn poll_until_live(
        &self,
        url: &str,
        timeout: Duration,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> PollOutcome {
        info!(%url, ?timeout, ?interval, "Polling pages URL");

        let started = Instant::now();
        // None when the timeout is too large to represent: no deadline
        let deadline = started.checked_add(timeout);
        let mut checks = 0u32;

        loop {
            checks += 1;

            let budget = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    self.settings
                        .check_timeout
                        .min(remaining.saturating_add(interval))
                }
                None => self.settings.check_timeout,
            };

            let check = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled { checks },
                result = tokio::time::timeout(budget, self.probe.check(url)) => result,
            };

            match check {
                Ok(Ok(status)) if is_success(status) => {
                    let elapsed = started.elapsed();
                    info!(%url, checks, elapsed_ms = elapsed.as_millis() as u64, "Pages URL is live");
                    return PollOutcome::Live { checks, elapsed };
                }
                Ok(Ok(status)) => debug!(%url, checks, status, "Pages not ready"),
                Ok(Err(e)) => debug!(%url, checks, error = %e, "Pages check failed"),
                Err(_) => debug!(%url, checks, ?budget, "Pages check timed out"),
            }

            let now = Instant::now();
            let pause = match deadline {
                Some(deadline) if now >= deadline => {
                    let elapsed = started.elapsed();
                    warn!(%url, checks, elapsed_ms = elapsed.as_millis() as u64, "Pages did not become live before timeout");
                    return PollOutcome::TimedOut { checks, elapsed };
                }
                Some(deadline) => interval.min(deadline - now),
                None => interval,
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled { checks },
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}
