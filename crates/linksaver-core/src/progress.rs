//! Cosmetic progress indicator
//!
//! Animates a progress message from 0% to 100% on a fixed timer and then runs
//! the wrapped action exactly once. The timer lives inside [`ProgressReporter::run`]
//! and is dropped on every exit path, so it can neither fire twice nor leak.

use crate::gateway::MessagingGateway;
use crate::replies;
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Result of a progress run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressOutcome<T> {
    /// The bar reached 100% and the action ran
    Completed(T),
    /// Shutdown was requested before the bar completed; the action never ran
    Cancelled,
}

/// Drives the progress bar for one request
#[derive(Debug, Clone, Copy)]
pub struct ProgressReporter {
    step: u8,
    tick: Duration,
}

impl ProgressReporter {
    /// Create a reporter advancing `step` percent every `tick`.
    /// A zero step is treated as 1%.
    #[must_use]
    pub fn new(step: u8, tick: Duration) -> Self {
        Self {
            step: step.clamp(1, 100),
            tick,
        }
    }

    /// Number of edits a full run performs
    #[must_use]
    pub fn steps(&self) -> usize {
        usize::from(100u8.div_ceil(self.step))
    }

    /// Animate `message_id` in `chat_id`, then run `action`.
    ///
    /// Edit failures are ignored; the bar is purely cosmetic.
    pub async fn run<F, Fut, T>(
        &self,
        gateway: &dyn MessagingGateway,
        chat_id: i64,
        message_id: i32,
        cancel: &CancellationToken,
        action: F,
    ) -> ProgressOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut ticker = interval_at(Instant::now() + self.tick, self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut percent: u8 = 0;
        while percent < 100 {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(chat_id, percent, "Progress cancelled");
                    return ProgressOutcome::Cancelled;
                }
                _ = ticker.tick() => {}
            }

            percent = percent.saturating_add(self.step).min(100);
            if let Err(e) = gateway
                .edit_text(chat_id, message_id, &replies::progress(percent))
                .await
            {
                debug!(chat_id, percent, error = %e, "Progress update skipped");
            }
        }
        drop(ticker);

        ProgressOutcome::Completed(action().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayError, MockMessagingGateway};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const TICK: Duration = Duration::from_millis(1);

    #[test]
    fn test_steps() {
        assert_eq!(ProgressReporter::new(10, TICK).steps(), 10);
        assert_eq!(ProgressReporter::new(30, TICK).steps(), 4);
        assert_eq!(ProgressReporter::new(0, TICK).steps(), 100);
        assert_eq!(ProgressReporter::new(200, TICK).steps(), 1);
    }

    #[tokio::test]
    async fn test_full_run_edits_each_step_and_runs_action_once() {
        let texts = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorded = Arc::clone(&texts);
        let mut gateway = MockMessagingGateway::new();
        gateway
            .expect_edit_text()
            .withf(|chat_id, message_id, _| *chat_id == 5 && *message_id == 9)
            .times(4)
            .returning(move |_, _, text| {
                if let Ok(mut texts) = recorded.lock() {
                    texts.push(text.to_string());
                }
                Ok(())
            });

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let reporter = ProgressReporter::new(30, TICK);
        let outcome = reporter
            .run(&gateway, 5, 9, &CancellationToken::new(), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                "relayed"
            })
            .await;

        assert_eq!(outcome, ProgressOutcome::Completed("relayed"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let texts = texts.lock().map(|t| t.clone()).unwrap_or_default();
        assert_eq!(texts.len(), 4);
        assert!(texts[0].contains("30%"));
        assert!(texts[3].contains("100% ▰▰▰▰▰▰▰▰▰▰"));
    }

    #[tokio::test]
    async fn test_edit_failures_do_not_stop_the_run() {
        let mut gateway = MockMessagingGateway::new();
        gateway
            .expect_edit_text()
            .times(10)
            .returning(|_, _, _| Err(GatewayError::Transport("flaky".to_string())));

        let outcome = ProgressReporter::new(10, TICK)
            .run(&gateway, 1, 1, &CancellationToken::new(), || async { 7 })
            .await;
        assert_eq!(outcome, ProgressOutcome::Completed(7));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_never_runs_action() {
        let mut gateway = MockMessagingGateway::new();
        gateway.expect_edit_text().times(0);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let outcome = ProgressReporter::new(10, TICK)
            .run(&gateway, 1, 1, &cancel, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert_eq!(outcome, ProgressOutcome::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_midway_stops_timer() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let edits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&edits);

        let mut gateway = MockMessagingGateway::new();
        gateway.expect_edit_text().returning(move |_, _, _| {
            if counter.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                trigger.cancel();
            }
            Ok(())
        });

        let outcome = ProgressReporter::new(10, TICK)
            .run(&gateway, 1, 1, &cancel, || async { "never" })
            .await;

        assert_eq!(outcome, ProgressOutcome::Cancelled);
        assert_eq!(edits.load(Ordering::SeqCst), 3);
    }
}
