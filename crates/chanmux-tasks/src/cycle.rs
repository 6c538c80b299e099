//! Auto-cycle loop: interrupt the target repeatedly, reconnect, resume.

use std::sync::Arc;
use std::time::Duration;

use chanmux_tmux::{Key, Multiplexer, TmuxError};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::registry::SharedStatus;
use crate::types::{CycleSpec, CycleStep, CycleSteps, StepReport, StopReason, TickReport};

/// Sleep for `duration` unless cancelled first. Returns false on cancel.
async fn pause(token: &CancellationToken, duration: Duration) -> bool {
    if duration.is_zero() {
        return !token.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

fn record(report: &mut TickReport, step: CycleStep, attempt: u32, result: Result<(), TmuxError>) {
    let error = match result {
        Ok(()) => None,
        Err(e) => {
            if matches!(e, TmuxError::NoSuchSession(_)) {
                report.target_missing = true;
            }
            Some(e.to_string())
        }
    };
    report.steps.push(StepReport {
        step,
        attempt,
        error,
    });
}

/// One full sequence. Step failures are recorded and the sequence carries on;
/// only cancellation (checked at every step boundary) cuts it short.
pub(crate) async fn run_tick(
    mux: &dyn Multiplexer,
    raw_id: &str,
    steps: &CycleSteps,
    token: &CancellationToken,
) -> TickReport {
    let mut report = TickReport::default();

    for attempt in 1..=steps.interrupt_count {
        if attempt > 1 && !pause(token, steps.interrupt_spacing).await {
            return report;
        }
        if token.is_cancelled() {
            return report;
        }
        let result = mux.send_key(raw_id, Key::Interrupt).await;
        record(&mut report, CycleStep::Interrupt, attempt, result);
    }

    if !pause(token, steps.pause_before_reconnect).await {
        return report;
    }
    let result = mux.run_command(raw_id, &steps.reconnect_command).await;
    record(&mut report, CycleStep::Reconnect, 1, result);

    if !pause(token, steps.pause_before_resume).await {
        return report;
    }
    let result = mux.run_command(raw_id, &steps.resume_command).await;
    record(&mut report, CycleStep::Resume, 1, result);

    report.completed = true;
    report
}

pub(crate) async fn run_cycle(
    mux: Arc<dyn Multiplexer>,
    spec: CycleSpec,
    steps: CycleSteps,
    shared: Arc<SharedStatus>,
    token: CancellationToken,
) {
    let target = spec.session_id.escape_default().to_string();
    if !pause(&token, spec.initial_delay).await {
        return;
    }

    let mut ticker = tokio::time::interval(spec.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = ticker.tick() => {}
        }

        tracing::info!(session = %target, "auto-cycle sequence starting");
        let report = run_tick(mux.as_ref(), &spec.session_id, &steps, &token).await;
        let target_missing = report.target_missing;
        if report.failures() > 0 {
            tracing::warn!(
                session = %target,
                failures = report.failures(),
                completed = report.completed,
                "auto-cycle sequence had failing steps"
            );
        } else {
            tracing::debug!(
                session = %target,
                completed = report.completed,
                "auto-cycle sequence done"
            );
        }
        shared.record_cycle(report);

        if target_missing {
            tracing::warn!(session = %target, "auto-cycle target gone, stopping");
            shared.finish(StopReason::TargetGone);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanmux_tmux::fake::{FakeCall, FakeMultiplexer};

    fn quick_steps() -> CycleSteps {
        CycleSteps {
            interrupt_count: 3,
            interrupt_spacing: Duration::ZERO,
            pause_before_reconnect: Duration::ZERO,
            reconnect_command: "vpn up".to_string(),
            pause_before_resume: Duration::ZERO,
            resume_command: "agent -c".to_string(),
        }
    }

    #[tokio::test]
    async fn tick_issues_steps_in_order() {
        let fake = FakeMultiplexer::with_sessions(["s"]);
        let token = CancellationToken::new();
        let report = run_tick(&fake, "s", &quick_steps(), &token).await;
        assert!(report.completed);
        assert_eq!(report.failures(), 0);

        let key = |key| FakeCall::Key {
            target: "s".to_string(),
            key,
        };
        let text = |t: &str| FakeCall::Keys {
            target: "s".to_string(),
            text: t.to_string(),
        };
        assert_eq!(
            fake.calls(),
            vec![
                key(Key::Interrupt),
                key(Key::Interrupt),
                key(Key::Interrupt),
                text("vpn up"),
                key(Key::Enter),
                text("agent -c"),
                key(Key::Enter),
            ]
        );
    }

    #[tokio::test]
    async fn cancelled_tick_sends_nothing() {
        let fake = FakeMultiplexer::with_sessions(["s"]);
        let token = CancellationToken::new();
        token.cancel();
        let report = run_tick(&fake, "s", &quick_steps(), &token).await;
        assert!(!report.completed);
        assert!(report.steps.is_empty());
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_reconnect_still_resumes() {
        let fake = FakeMultiplexer::with_sessions(["s"]);
        fake.fail_text();
        let token = CancellationToken::new();
        let report = run_tick(&fake, "s", &quick_steps(), &token).await;
        assert!(report.completed);
        assert!(!report.target_missing);
        assert_eq!(report.failures(), 2);
        assert_eq!(fake.texts_sent_to("s"), ["vpn up", "agent -c"]);
    }

    #[tokio::test]
    async fn pause_returns_false_on_cancel() {
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            cancel.cancel();
        });
        assert!(!pause(&token, Duration::from_secs(30)).await);
        assert!(!pause(&token, Duration::ZERO).await);
    }
}
