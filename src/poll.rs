//! Periodic refresh subscriptions.
//!
//! A subscription owns one background task that re-runs a callback on a
//! schedule decided by a [`PollPolicy`]. The callback reports how the
//! polled resource looked, which lets the policy slow down while nothing
//! is changing and back off while the backend is failing.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// What a single poll observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// The resource is still changing (e.g. a file is mid-pipeline).
    Busy,
    /// Nothing is expected to change until the user acts.
    Idle,
    /// The refresh itself failed.
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub idle_interval: Option<Duration>,
    pub max_backoff: Duration,
}

impl PollPolicy {
    /// Same interval regardless of outcome, which is how the file panel
    /// always behaved. Failures still back off up to `max_backoff`.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            idle_interval: None,
            max_backoff: interval,
        }
    }

    pub fn with_idle_interval(mut self, idle_interval: Duration) -> Self {
        self.idle_interval = Some(idle_interval);
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff.max(self.interval);
        self
    }

    /// Delay before the next poll, given the last outcome and the number of
    /// consecutive failures so far.
    pub fn next_delay(&self, outcome: PollOutcome, consecutive_failures: u32) -> Duration {
        match outcome {
            PollOutcome::Busy => self.interval,
            PollOutcome::Idle => self.idle_interval.unwrap_or(self.interval),
            PollOutcome::Failed => {
                let factor = 2u32.saturating_pow(consecutive_failures.min(16));
                self.interval
                    .checked_mul(factor)
                    .unwrap_or(self.max_backoff)
                    .min(self.max_backoff)
            }
        }
    }
}

/// Handle to a running poll loop. Dropping it stops the loop.
pub struct Subscription {
    name: String,
    cancel: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the loop and waits for an in-flight poll to finish.
    pub async fn cancel(mut self) {
        let _ = self.cancel.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                log::error!("Poll loop '{}' ended abnormally: {:?}", self.name, e);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.cancel.send(true);
    }
}

/// Starts polling `callback` under `policy`. The first poll happens one
/// interval after subscribing; callers load the initial state themselves.
pub fn subscribe<F, Fut>(name: impl Into<String>, policy: PollPolicy, mut callback: F) -> Subscription
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = PollOutcome> + Send + 'static,
{
    let name = name.into();
    let (cancel, mut cancelled) = watch::channel(false);
    let task_name = name.clone();

    let handle = tokio::spawn(async move {
        log::info!("Poll loop '{}' started ({:?} interval)", task_name, policy.interval);
        let mut delay = policy.interval;
        let mut failures: u32 = 0;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = cancelled.changed() => {
                    if changed.is_err() || *cancelled.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let outcome = callback().await;
            if outcome == PollOutcome::Failed {
                failures = failures.saturating_add(1);
                log::warn!("Poll '{}' failed ({} in a row)", task_name, failures);
            } else {
                failures = 0;
            }
            delay = policy.next_delay(outcome, failures);
            log::debug!("Poll '{}' observed {:?}, next in {:?}", task_name, outcome, delay);
        }
        log::info!("Poll loop '{}' stopped", task_name);
    });

    Subscription {
        name,
        cancel,
        handle: Some(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(outcome: PollOutcome) -> (Arc<AtomicUsize>, impl FnMut() -> futures::future::Ready<PollOutcome> + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let callback = move || {
            seen.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(outcome)
        };
        (count, callback)
    }

    #[test]
    fn failures_back_off_exponentially_up_to_the_cap() {
        let policy = PollPolicy::fixed(Duration::from_secs(1)).with_max_backoff(Duration::from_secs(4));
        assert_eq!(policy.next_delay(PollOutcome::Failed, 1), Duration::from_secs(2));
        assert_eq!(policy.next_delay(PollOutcome::Failed, 2), Duration::from_secs(4));
        assert_eq!(policy.next_delay(PollOutcome::Failed, 30), Duration::from_secs(4));
        assert_eq!(policy.next_delay(PollOutcome::Busy, 0), Duration::from_secs(1));
    }

    #[test]
    fn idle_interval_only_applies_when_idle() {
        let policy = PollPolicy::fixed(Duration::from_secs(5)).with_idle_interval(Duration::from_secs(30));
        assert_eq!(policy.next_delay(PollOutcome::Idle, 0), Duration::from_secs(30));
        assert_eq!(policy.next_delay(PollOutcome::Busy, 0), Duration::from_secs(5));
        assert_eq!(
            PollPolicy::fixed(Duration::from_secs(5)).next_delay(PollOutcome::Idle, 0),
            Duration::from_secs(5)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn polls_on_a_fixed_interval_until_dropped() {
        let (count, callback) = counting(PollOutcome::Busy);
        let subscription = subscribe("files", PollPolicy::fixed(Duration::from_secs(5)), callback);

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        drop(subscription);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn backs_off_while_failing() {
        let (count, callback) = counting(PollOutcome::Failed);
        let policy = PollPolicy::fixed(Duration::from_secs(1)).with_max_backoff(Duration::from_secs(4));
        let subscription = subscribe("files", policy, callback);

        // polls at t=1, 3, 7, 11
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);

        subscription.cancel().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_the_task() {
        let (count, callback) = counting(PollOutcome::Idle);
        let subscription = subscribe("files", PollPolicy::fixed(Duration::from_secs(5)), callback);
        assert!(subscription.is_active());
        assert_eq!(subscription.name(), "files");
        subscription.cancel().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
