//! Delivery of deployment results to the evaluation endpoint.
//!
//! The sender owns its retry loop. The delay schedule is a pure function of
//! the attempt number and a jitter sample, so it can be checked without
//! waiting.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::adapters::{is_success, Transport};

/// Exponential backoff with bounded jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt
    pub base_delay: Duration,

    /// Ceiling for any single delay (jitter included)
    pub max_delay: Duration,

    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Upper bound of the random jitter added to each delay
    pub max_jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 6,
            max_jitter: Duration::from_millis(500),
        }
    }
}

impl BackoffPolicy {
    /// Delay after failed attempt `attempt` (1-indexed):
    /// `min(base * 2^(attempt-1) + jitter, max_delay)`
    pub fn delay_for_attempt(&self, attempt: u32, jitter: Duration) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let backoff = self
            .base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay);

        backoff.saturating_add(jitter).min(self.max_delay)
    }

    /// Draw a jitter sample in `[0, max_jitter]`
    pub fn sample_jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }

    /// Whether another attempt is allowed after `attempt`
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Document reported to the evaluation endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub email: String,
    pub task: String,
    pub round: u8,
    pub nonce: String,
    pub repo_url: String,
    pub commit_sha: String,
    pub pages_url: String,
    /// Whether the pages URL answered 2xx before the poll timeout
    pub live: bool,
}

/// Result of a notification run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Delivered { attempts: u32 },
    Exhausted { attempts: u32, last_error: String },
    Cancelled { attempts: u32 },
}

impl NotifyOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Delivered { attempts }
            | Self::Exhausted { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }
}

/// Posts payloads with retries
pub struct NotificationSender {
    transport: Arc<dyn Transport>,
    policy: BackoffPolicy,
}

impl NotificationSender {
    pub fn new(transport: Arc<dyn Transport>, policy: BackoffPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Deliver `payload` to `url`, retrying until 2xx or the budget runs out
    pub async fn notify(
        &self,
        url: &str,
        payload: &NotificationPayload,
        cancel: &CancellationToken,
    ) -> NotifyOutcome {
        let body = match serde_json::to_value(payload) {
            Ok(body) => body,
            Err(e) => {
                return NotifyOutcome::Exhausted {
                    attempts: 0,
                    last_error: format!("Failed to serialize payload: {}", e),
                }
            }
        };

        let mut attempt = 0u32;
        let mut last_error = String::from("no attempts made");

        while attempt < self.policy.max_attempts {
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return NotifyOutcome::Cancelled { attempts: attempt - 1 },
                result = self.transport.post_json(url, &body) => result,
            };

            match result {
                Ok(status) if is_success(status) => {
                    info!(%url, attempt, status, "Evaluation endpoint notified");
                    return NotifyOutcome::Delivered { attempts: attempt };
                }
                Ok(status) => {
                    last_error = format!("HTTP {}", status);
                    warn!(%url, attempt, status, "Notification rejected");
                }
                Err(e) => {
                    last_error = format!("{:#}", e);
                    warn!(%url, attempt, error = %last_error, "Notification failed");
                }
            }

            if !self.policy.should_retry(attempt) {
                break;
            }

            let delay = self
                .policy
                .delay_for_attempt(attempt, self.policy.sample_jitter());
            info!(attempt, delay_ms = delay.as_millis() as u64, "Retrying notification");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return NotifyOutcome::Cancelled { attempts: attempt },
                _ = tokio::time::sleep(delay) => {}
            }
        }

        error!(%url, attempts = attempt, %last_error, "Giving up on notification");
        NotifyOutcome::Exhausted {
            attempts: attempt,
            last_error,
        }
    }
}
