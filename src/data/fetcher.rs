//! Resilient retrieval of telemetry payloads
//!
//! Two policies, picked by the call site:
//! - bounded: a fixed number of attempts, then `FetchExhausted`. Used for
//!   per-sample lookups where the caller can drop the sample.
//! - until-success: retries until the payload arrives or the job is
//!   cancelled. Used for decisive lookups that must not degrade silently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::telemetry::{Resource, TelemetrySource};
use crate::{DotaError, FetchConfig, Result};

/// Retry policy composed into the fetcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries until success or cancellation
    pub max_attempts: Option<u32>,
    /// Wait between consecutive attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn bounded(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: Some(max_attempts.max(1)),
            delay,
        }
    }

    pub fn until_success(delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: None,
            delay,
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.max_attempts.is_some()
    }
}

/// Cooperative cancellation shared between a job and its fetches
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Cancel on the first Ctrl-C; a second one exits the process
    pub fn cancel_on_interrupt(&self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let token = self.clone();
        std::thread::Builder::new()
            .name("interrupt".to_string())
            .spawn(move || {
                runtime.block_on(async {
                    while tokio::signal::ctrl_c().await.is_ok() {
                        if token.is_cancelled() {
                            std::process::exit(130);
                        }
                        log::warn!("Interrupted; stopping after the current step (Ctrl-C again to abort)");
                        token.cancel();
                    }
                })
            })?;
        Ok(())
    }
}

pub type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

/// Retry an operation under a policy.
///
/// Waits happen on the calling thread and hold no locks.
pub fn with_retry<T, F>(
    label: &str,
    policy: &RetryPolicy,
    cancel: &CancelToken,
    sleep: &Sleeper,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut failures = 0u32;
    loop {
        if !policy.is_bounded() && cancel.is_cancelled() {
            return Err(DotaError::FetchBlocking {
                resource: label.to_string(),
                attempts: failures,
            });
        }

        match operation() {
            Ok(result) => return Ok(result),
            Err(e) => {
                failures += 1;
                match policy.max_attempts {
                    Some(max) => {
                        log::warn!("Attempt {}/{} for {} failed: {}", failures, max, label, e);
                        if failures >= max {
                            return Err(DotaError::FetchExhausted {
                                resource: label.to_string(),
                                attempts: failures,
                            });
                        }
                    }
                    None => {
                        log::warn!("Attempt {} for {} failed: {}. Retrying...", failures, label, e);
                    }
                }
            }
        }

        sleep(policy.delay);
    }
}

/// Telemetry source wrapped with the two retry policies
#[derive(Clone)]
pub struct Fetcher {
    source: Arc<dyn TelemetrySource>,
    bounded: RetryPolicy,
    blocking: RetryPolicy,
    sleeper: Sleeper,
    cancel: CancelToken,
}

impl Fetcher {
    pub fn new(source: Arc<dyn TelemetrySource>, bounded: RetryPolicy, blocking: RetryPolicy) -> Self {
        Fetcher {
            source,
            bounded,
            blocking,
            sleeper: Arc::new(std::thread::sleep),
            cancel: CancelToken::new(),
        }
    }

    pub fn from_config(source: Arc<dyn TelemetrySource>, config: &FetchConfig) -> Self {
        Self::new(
            source,
            RetryPolicy::bounded(
                config.bounded_attempts,
                Duration::from_millis(config.retry_delay_ms),
            ),
            RetryPolicy::until_success(Duration::from_millis(config.blocking_delay_ms)),
        )
    }

    /// Replace the wait function (tests record delays instead of sleeping)
    pub fn with_sleeper(mut self, sleeper: Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Fetch with the bounded policy; fails with `FetchExhausted`
    pub fn fetch_bounded(&self, resource: &Resource) -> Result<Value> {
        with_retry(
            &resource.to_string(),
            &self.bounded,
            &self.cancel,
            &self.sleeper,
            || self.source.get(resource),
        )
    }

    /// Fetch until success; fails only with `FetchBlocking` after cancellation
    pub fn fetch_blocking(&self, resource: &Resource) -> Result<Value> {
        with_retry(
            &resource.to_string(),
            &self.blocking,
            &self.cancel,
            &self.sleeper,
            || self.source.get(resource),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::telemetry::testing::ScriptedSource;
    use crate::MatchId;
    use parking_lot::Mutex;
    use serde_json::json;

    fn recording_sleeper() -> (Sleeper, Arc<Mutex<Vec<Duration>>>) {
        let waits = Arc::new(Mutex::new(Vec::new()));
        let sink = waits.clone();
        (Arc::new(move |d| sink.lock().push(d)), waits)
    }

    fn fetcher(source: Arc<ScriptedSource>) -> (Fetcher, Arc<Mutex<Vec<Duration>>>) {
        let (sleeper, waits) = recording_sleeper();
        let fetcher = Fetcher::from_config(source, &crate::Config::default().fetch)
            .with_sleeper(sleeper);
        (fetcher, waits)
    }

    #[test]
    fn test_bounded_exhausts_after_five_attempts() {
        let source = Arc::new(ScriptedSource::new());
        let resource = Resource::MatchDetails(MatchId(1));
        source.fail_times(resource.clone(), 100);
        let (fetcher, waits) = fetcher(source.clone());

        let err = fetcher.fetch_bounded(&resource).unwrap_err();
        match err {
            DotaError::FetchExhausted { attempts, .. } => assert_eq!(attempts, 5),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(source.calls_to(&resource), 5);
        // Spacing between attempts only, none after the last failure
        assert_eq!(*waits.lock(), vec![Duration::from_secs(2); 4]);
    }

    #[test]
    fn test_bounded_recovers_before_limit() {
        let source = Arc::new(ScriptedSource::new());
        let resource = Resource::HeroStats;
        source.respond(resource.clone(), json!([]));
        source.fail_times(resource.clone(), 2);
        let (fetcher, waits) = fetcher(source.clone());

        assert_eq!(fetcher.fetch_bounded(&resource).unwrap(), json!([]));
        assert_eq!(source.calls_to(&resource), 3);
        assert_eq!(waits.lock().len(), 2);
    }

    #[test]
    fn test_blocking_outlasts_bounded_limit() {
        let source = Arc::new(ScriptedSource::new());
        let resource = Resource::MatchDetails(MatchId(9));
        source.respond(resource.clone(), json!({"match_id": 9}));
        source.fail_times(resource.clone(), 12);
        let (fetcher, _) = fetcher(source.clone());

        let value = fetcher.fetch_blocking(&resource).unwrap();
        assert_eq!(value["match_id"], 9);
        assert_eq!(source.calls_to(&resource), 13);
    }

    #[test]
    fn test_interrupt_handler_leaves_token_armed() {
        let cancel = CancelToken::new();
        cancel.cancel_on_interrupt().unwrap();
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn test_blocking_stops_on_cancel() {
        let source = Arc::new(ScriptedSource::new());
        let resource = Resource::MatchDetails(MatchId(3));
        source.fail_times(resource.clone(), u32::MAX);

        let cancel = CancelToken::new();
        let waits = Arc::new(Mutex::new(0u32));
        let (trigger, counter) = (cancel.clone(), waits.clone());
        let sleeper: Sleeper = Arc::new(move |_| {
            let mut n = counter.lock();
            *n += 1;
            if *n == 3 {
                trigger.cancel();
            }
        });
        let fetcher = Fetcher::from_config(source, &crate::Config::default().fetch)
            .with_sleeper(sleeper)
            .with_cancel(cancel);

        match fetcher.fetch_blocking(&resource).unwrap_err() {
            DotaError::FetchBlocking { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
    }
}
