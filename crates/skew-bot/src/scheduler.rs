//! Periodic task driver.
//!
//! Every periodic component exposes a `run_cycle` returning a
//! [`CycleOutcome`]. The driver owns the timing: initial delay, regular
//! period, `Deferred` backoff, and shutdown on `Fatal` or cancellation.

use skew_core::CycleOutcome;
use skew_telemetry::Metrics;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Schedule of one periodic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub name: &'static str,
    pub initial_delay: Duration,
    pub period: Duration,
}

impl Schedule {
    pub fn every(name: &'static str, period: Duration) -> Self {
        Self {
            name,
            initial_delay: Duration::ZERO,
            period,
        }
    }

    pub fn after(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }
}

/// Run `cycle` on `schedule` until the token is cancelled.
///
/// A `Fatal` outcome cancels the token. Returns the last outcome.
pub async fn drive<F, Fut>(schedule: Schedule, token: CancellationToken, mut cycle: F) -> Option<CycleOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CycleOutcome>,
{
    let name = schedule.name;
    info!(
        task = name,
        initial_delay_secs = schedule.initial_delay.as_secs(),
        period_secs = schedule.period.as_secs(),
        "Periodic task scheduled"
    );

    let mut delay = schedule.initial_delay;
    let mut last = None;
    loop {
        tokio::select! {
            () = token.cancelled() => {
                debug!(task = name, "Periodic task stopped");
                return last;
            }
            () = tokio::time::sleep(delay) => {}
        }

        let outcome = tokio::select! {
            () = token.cancelled() => {
                debug!(task = name, "Periodic task cancelled mid-cycle");
                return last;
            }
            outcome = cycle() => outcome,
        };
        Metrics::cycle_outcome(name, outcome.label());
        log_outcome(name, &outcome);

        match outcome.next_delay(schedule.period) {
            Some(next) => delay = next,
            None => {
                token.cancel();
                return Some(outcome);
            }
        }
        last = Some(outcome);
    }
}

fn log_outcome(task: &str, outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Completed => debug!(task, "Cycle completed"),
        CycleOutcome::Skipped(reason) => warn!(task, %reason, "Cycle skipped"),
        CycleOutcome::Deferred { reason, retry_after } => {
            info!(task, %reason, retry_after_secs = retry_after.as_secs(), "Cycle deferred")
        }
        CycleOutcome::Fatal(reason) => error!(task, %reason, "Cycle failed fatally"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skew_core::SkipReason;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_runs_until_cancelled() {
        let token = CancellationToken::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        let task = tokio::spawn(drive(
            Schedule::every("test", Duration::from_secs(60)).after(Duration::from_secs(10)),
            token.clone(),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    CycleOutcome::Completed
                }
            },
        ));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        token.cancel();
        assert_eq!(task.await.unwrap(), Some(CycleOutcome::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_uses_retry_delay() {
        let token = CancellationToken::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        let task = tokio::spawn(drive(
            Schedule::every("deferred", Duration::from_secs(600)),
            token.clone(),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    CycleOutcome::Deferred {
                        reason: SkipReason::NotReady("prices".to_string()),
                        retry_after: Duration::from_secs(20),
                    }
                }
            },
        ));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 4);
        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_cancels_token() {
        let token = CancellationToken::new();
        let outcome = drive(Schedule::every("fatal", Duration::from_secs(1)), token.clone(), || async {
            CycleOutcome::Fatal("writer closed".to_string())
        })
        .await;
        assert!(matches!(outcome, Some(CycleOutcome::Fatal(_))));
        assert!(token.is_cancelled());
    }
}
