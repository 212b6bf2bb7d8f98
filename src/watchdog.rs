use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::engine::InternalEvent;

/// Verdict of one staleness sweep over a downloading job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepAction {
    /// Still making progress (or not idle long enough to act on).
    Keep,
    /// Idle past the warning threshold: show "may be stuck", change nothing.
    FlagStall,
    /// Idle past the recovery threshold: the worker most likely finished and
    /// the final message was lost. Force completion; an indefinitely stuck
    /// control is worse than a possibly-wrong success indication.
    AssumeDone,
}

/// Classify idle time against the configured thresholds. Pure so the
/// escalation order is testable without a clock.
pub fn classify_idle(idle: Duration, config: &EngineConfig) -> SweepAction {
    if idle >= config.assume_done_after() {
        SweepAction::AssumeDone
    } else if idle >= config.stall_warn_after() {
        SweepAction::FlagStall
    } else {
        SweepAction::Keep
    }
}

/// Arm a one-shot deadline tied to a job: after `delay`, post `event` into
/// the engine's inbox, unless the token is cancelled first. The token lives
/// in the job's `JobTimers`, so any superseding transition (or removal of
/// the job) kills the timer before it can touch a recycled control.
pub(crate) fn spawn_deadline(
    delay: Duration,
    token: CancellationToken,
    tx: UnboundedSender<InternalEvent>,
    event: InternalEvent,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(delay) => {
                let _ = tx.send(event);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn config() -> EngineConfig {
        EngineConfig {
            stall_warn_after_ms: 1_000,
            assume_done_after_ms: 5_000,
            ..Default::default()
        }
    }

    #[test]
    fn idle_time_escalates_in_order() {
        let cfg = config();
        assert_eq!(classify_idle(Duration::from_millis(0), &cfg), SweepAction::Keep);
        assert_eq!(classify_idle(Duration::from_millis(999), &cfg), SweepAction::Keep);
        assert_eq!(
            classify_idle(Duration::from_millis(1_000), &cfg),
            SweepAction::FlagStall
        );
        assert_eq!(
            classify_idle(Duration::from_millis(4_999), &cfg),
            SweepAction::FlagStall
        );
        assert_eq!(
            classify_idle(Duration::from_millis(5_000), &cfg),
            SweepAction::AssumeDone
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fires_after_delay() {
        let (tx, mut rx) = unbounded_channel();
        spawn_deadline(
            Duration::from_secs(2),
            CancellationToken::new(),
            tx,
            InternalEvent::PrepareTimedOut { id: "a".into() },
        );
        // let the timer task register its sleep before moving the clock
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(3)).await;
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, InternalEvent::PrepareTimedOut { id } if id == "a"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_deadline_never_fires() {
        let (tx, mut rx) = unbounded_channel();
        let token = CancellationToken::new();
        spawn_deadline(
            Duration::from_secs(2),
            token.clone(),
            tx,
            InternalEvent::PrepareTimedOut { id: "a".into() },
        );
        token.cancel();
        tokio::time::advance(Duration::from_secs(10)).await;
        // sender side of the timer task is gone without sending
        assert!(rx.recv().await.is_none());
    }
}
