//! Recurring message loop.

use std::sync::Arc;
use std::time::Duration;

use chanmux_tmux::{Multiplexer, TmuxError};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::registry::SharedStatus;
use crate::types::{StopReason, TimerSpec};

/// Send `spec.message` every `spec.interval`, first tick immediately.
///
/// Cancellation is observed between ticks only; a send that has started
/// (text typed, Enter pending) always completes.
pub(crate) async fn run_timer(
    mux: Arc<dyn Multiplexer>,
    spec: TimerSpec,
    submit_delay: Duration,
    shared: Arc<SharedStatus>,
    token: CancellationToken,
) {
    let target = spec.session_id.escape_default().to_string();
    let mut ticker = tokio::time::interval(spec.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = ticker.tick() => {}
        }

        match mux
            .send_message(&spec.session_id, &spec.message, submit_delay)
            .await
        {
            Ok(()) => {
                tracing::debug!(session = %target, "timer message sent");
                shared.record_tick(None);
            }
            Err(TmuxError::NoSuchSession(_)) => {
                tracing::warn!(session = %target, "timer target gone, stopping");
                shared.record_tick(Some(format!("session not found: {target}")));
                shared.finish(StopReason::TargetGone);
                return;
            }
            Err(e) => {
                tracing::warn!(session = %target, error = %e, "timer send failed");
                shared.record_tick(Some(e.to_string()));
            }
        }
    }
}
