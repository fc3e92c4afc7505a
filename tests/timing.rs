//! Timing Integration Tests
//!
//! Polling bounds and notification backoff, checked against tokio's paused
//! clock so no test actually waits.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use pagewright::adapters::{Probe, Transport};
use pagewright::core::{
    BackoffPolicy, NotificationPayload, NotificationSender, NotifyOutcome, PollOutcome,
    PollSettings, PublishPoller,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const URL: &str = "https://octocat.github.io/task-demo/";

/// Answers 404 for the first `failures` checks, then 200
struct CountingProbe {
    failures: u32,
    calls: AtomicU32,
}

impl CountingProbe {
    fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl Probe for CountingProbe {
    async fn check(&self, _url: &str) -> Result<u16> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(if n < self.failures { 404 } else { 200 })
    }
}

/// Never answers
struct HangingProbe;

#[async_trait]
impl Probe for HangingProbe {
    async fn check(&self, _url: &str) -> Result<u16> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(200)
    }
}

fn settings(interval: u64, timeout: u64) -> PollSettings {
    PollSettings {
        interval: Duration::from_secs(interval),
        timeout: Duration::from_secs(timeout),
        check_timeout: Duration::from_secs(5),
    }
}

#[tokio::test(start_paused = true)]
async fn test_poll_live_after_failures() {
    let probe = CountingProbe::new(4);
    let poller = PublishPoller::new(probe.clone(), settings(3, 60));

    let outcome = poller
        .wait_until_live(URL, &CancellationToken::new())
        .await;

    match outcome {
        PollOutcome::Live { checks, elapsed } => {
            assert_eq!(checks, 5);
            assert!(elapsed >= Duration::from_secs(12), "elapsed {:?}", elapsed);
        }
        other => panic!("expected live, got {:?}", other),
    }
    assert_eq!(probe.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn test_poll_times_out_within_bound() {
    let probe = CountingProbe::new(u32::MAX);
    let poller = PublishPoller::new(probe, settings(3, 10));

    let outcome = poller
        .wait_until_live(URL, &CancellationToken::new())
        .await;

    match outcome {
        PollOutcome::TimedOut { checks, elapsed } => {
            assert!(checks >= 4);
            assert!(elapsed >= Duration::from_secs(10), "elapsed {:?}", elapsed);
            assert!(elapsed <= Duration::from_secs(13), "elapsed {:?}", elapsed);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_hanging_checks_respect_deadline() {
    let poller = PublishPoller::new(Arc::new(HangingProbe), settings(3, 12));
    let started = Instant::now();

    let outcome = poller
        .wait_until_live(URL, &CancellationToken::new())
        .await;

    assert!(matches!(outcome, PollOutcome::TimedOut { .. }));
    assert!(started.elapsed() <= Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_poll_sleep() {
    let poller = PublishPoller::new(CountingProbe::new(u32::MAX), settings(3, 60));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(7)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let outcome = poller.wait_until_live(URL, &cancel).await;

    assert!(matches!(outcome, PollOutcome::Cancelled { .. }));
    assert!(started.elapsed() < Duration::from_secs(60));
}

/// Answers 500 for the first `failures` posts, then 200
struct FlakyTransport {
    failures: u32,
    calls: AtomicU32,
}

impl FlakyTransport {
    fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn post_json(&self, _url: &str, _body: &serde_json::Value) -> Result<u16> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            anyhow::bail!("connection refused")
        }
        Ok(200)
    }
}

fn no_jitter(max_attempts: u32) -> BackoffPolicy {
    BackoffPolicy {
        base_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(30),
        max_attempts,
        max_jitter: Duration::ZERO,
    }
}

fn payload() -> NotificationPayload {
    NotificationPayload {
        email: "student@example.com".into(),
        task: "demo".into(),
        round: 1,
        nonce: "n1".into(),
        repo_url: "https://github.com/octocat/task-demo".into(),
        commit_sha: "a".repeat(40),
        pages_url: URL.into(),
        live: true,
    }
}

#[tokio::test(start_paused = true)]
async fn test_notify_succeeds_on_third_attempt() {
    let transport = FlakyTransport::new(2);
    let sender = NotificationSender::new(transport.clone(), no_jitter(6));
    let started = Instant::now();

    let outcome = sender
        .notify("http://eval.test/notify", &payload(), &CancellationToken::new())
        .await;

    assert_eq!(outcome, NotifyOutcome::Delivered { attempts: 3 });
    assert_eq!(transport.calls.load(Ordering::SeqCst), 3);

    // 1s after the first failure, 2s after the second
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(4), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_notify_exhausts_budget() {
    let transport = FlakyTransport::new(u32::MAX);
    let sender = NotificationSender::new(transport.clone(), no_jitter(4));
    let started = Instant::now();

    let outcome = sender
        .notify("http://eval.test/notify", &payload(), &CancellationToken::new())
        .await;

    match outcome {
        NotifyOutcome::Exhausted {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 4);
            assert!(last_error.contains("connection refused"));
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
    assert_eq!(transport.calls.load(Ordering::SeqCst), 4);

    // 1 + 2 + 4, and no wait after the final attempt
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(7), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(8), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_notify_delays_are_capped() {
    let transport = FlakyTransport::new(u32::MAX);
    let policy = BackoffPolicy {
        base_delay: Duration::from_secs(10),
        max_delay: Duration::from_secs(15),
        max_attempts: 4,
        max_jitter: Duration::from_secs(2),
    };
    let sender = NotificationSender::new(transport, policy);
    let started = Instant::now();

    sender
        .notify("http://eval.test/notify", &payload(), &CancellationToken::new())
        .await;

    // At most three waits of max_delay each
    assert!(started.elapsed() <= Duration::from_secs(45));
}
