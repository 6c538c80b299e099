//! TaskRegistry: name → running task, with replace-on-start and awaited stop.
//!
//! All map mutation happens under one async mutex. Run loops never touch that
//! mutex; they report progress through their own `SharedStatus`, so `stop`
//! may await a loop while holding the registry lock without deadlocking.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use chanmux_tmux::Multiplexer;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cycle::run_cycle;
use crate::error::TaskError;
use crate::timer::run_timer;
use crate::types::{
    CycleSpec, DuplicatePolicy, RegistryConfig, StartOutcome, StopOutcome, StopReason, TaskKind,
    TaskState, TaskStatus, TickReport, TimerSpec,
};

// ─── Status shared with a run loop ───────────────────────────────

/// Status cell written by the run loop and read by snapshots.
pub(crate) struct SharedStatus {
    inner: StdMutex<TaskStatus>,
}

impl SharedStatus {
    fn new(status: TaskStatus) -> Self {
        Self {
            inner: StdMutex::new(status),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TaskStatus> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn snapshot(&self) -> TaskStatus {
        self.lock().clone()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.lock().is_running()
    }

    pub(crate) fn record_tick(&self, error: Option<String>) {
        let mut status = self.lock();
        status.ticks += 1;
        status.last_tick_at = Some(Utc::now());
        if error.is_some() {
            status.last_error = error;
        }
    }

    pub(crate) fn record_cycle(&self, report: TickReport) {
        let mut status = self.lock();
        status.ticks += 1;
        status.last_tick_at = Some(Utc::now());
        if let Some(err) = report.steps.iter().rev().find_map(|s| s.error.clone()) {
            status.last_error = Some(err);
        }
        status.last_cycle = Some(report);
    }

    /// Transition to `stopped`. The first reason wins; later calls are no-ops.
    pub(crate) fn finish(&self, reason: StopReason) {
        let mut status = self.lock();
        if status.state == TaskState::Running {
            status.state = TaskState::Stopped;
            status.stop_reason = Some(reason);
        }
    }
}

// ─── Entries ─────────────────────────────────────────────────────

struct TaskControl {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

struct TaskEntry {
    shared: Arc<SharedStatus>,
    control: Option<TaskControl>,
}

impl TaskEntry {
    /// Cancel and wait for the run loop to exit. Idempotent.
    async fn stop(&mut self, reason: StopReason) {
        if let Some(control) = self.control.take() {
            control.token.cancel();
            if let Err(e) = control.handle.await {
                let status = self.shared.snapshot();
                tracing::error!(
                    kind = %status.kind,
                    task = %status.name,
                    error = %e,
                    "task run loop panicked"
                );
            }
        }
        self.shared.finish(reason);
    }
}

#[derive(Default)]
struct Tasks {
    timers: HashMap<String, TaskEntry>,
    cycles: HashMap<String, TaskEntry>,
}

impl Tasks {
    fn map(&self, kind: TaskKind) -> &HashMap<String, TaskEntry> {
        match kind {
            TaskKind::Timer => &self.timers,
            TaskKind::Cycle => &self.cycles,
        }
    }

    fn map_mut(&mut self, kind: TaskKind) -> &mut HashMap<String, TaskEntry> {
        match kind {
            TaskKind::Timer => &mut self.timers,
            TaskKind::Cycle => &mut self.cycles,
        }
    }
}

// ─── Registry ────────────────────────────────────────────────────

/// Owns every timer and cycle. Construct once per process and call
/// [`TaskRegistry::shutdown`] before exit.
pub struct TaskRegistry {
    mux: Arc<dyn Multiplexer>,
    config: RegistryConfig,
    tasks: Mutex<Tasks>,
}

impl TaskRegistry {
    pub fn new(mux: Arc<dyn Multiplexer>, config: RegistryConfig) -> Self {
        Self {
            mux,
            config,
            tasks: Mutex::new(Tasks::default()),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub async fn start_timer(&self, name: &str, spec: TimerSpec) -> Result<StartOutcome, TaskError> {
        if spec.interval.is_zero() {
            return Err(TaskError::InvalidInterval {
                kind: TaskKind::Timer,
            });
        }
        let status = TaskStatus::for_timer(name, &spec);
        let mux = Arc::clone(&self.mux);
        let submit_delay = self.config.submit_delay;
        self.install(TaskKind::Timer, name, status, move |shared, token| {
            run_timer(mux, spec, submit_delay, shared, token)
        })
        .await
    }

    pub async fn start_cycle(&self, name: &str, spec: CycleSpec) -> Result<StartOutcome, TaskError> {
        if spec.interval.is_zero() {
            return Err(TaskError::InvalidInterval {
                kind: TaskKind::Cycle,
            });
        }
        let status = TaskStatus::for_cycle(name, &spec);
        let mux = Arc::clone(&self.mux);
        let steps = self.config.cycle.clone();
        self.install(TaskKind::Cycle, name, status, move |shared, token| {
            run_cycle(mux, spec, steps, shared, token)
        })
        .await
    }

    /// Stop `name`. Returns once its run loop has exited; an in-flight send
    /// completes first. Unknown or already-stopped names are a no-op.
    pub async fn stop(&self, kind: TaskKind, name: &str) -> StopOutcome {
        let mut tasks = self.tasks.lock().await;
        let Some(entry) = tasks.map_mut(kind).get_mut(name) else {
            return StopOutcome {
                kind,
                name: name.to_string(),
                was_running: false,
                status: None,
            };
        };

        let was_running = entry.shared.is_running();
        entry.stop(StopReason::Requested).await;
        if was_running {
            tracing::info!(kind = %kind, task = %name, "stopped task");
        }
        StopOutcome {
            kind,
            name: name.to_string(),
            was_running,
            status: Some(entry.shared.snapshot()),
        }
    }

    pub async fn status(&self, kind: TaskKind, name: &str) -> Option<TaskStatus> {
        let tasks = self.tasks.lock().await;
        tasks.map(kind).get(name).map(|e| e.shared.snapshot())
    }

    /// Every known task of `kind`, running or stopped, sorted by name.
    pub async fn status_all(&self, kind: TaskKind) -> Vec<TaskStatus> {
        let tasks = self.tasks.lock().await;
        let mut all: Vec<TaskStatus> = tasks
            .map(kind)
            .values()
            .map(|e| e.shared.snapshot())
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Stop everything. Used at process exit.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        let mut stopped = 0usize;
        for kind in [TaskKind::Timer, TaskKind::Cycle] {
            for entry in tasks.map_mut(kind).values_mut() {
                if entry.control.is_some() {
                    entry.stop(StopReason::Shutdown).await;
                    stopped += 1;
                }
            }
        }
        tracing::info!(stopped, "task registry shut down");
    }

    async fn install<F, Fut>(
        &self,
        kind: TaskKind,
        name: &str,
        status: TaskStatus,
        launch: F,
    ) -> Result<StartOutcome, TaskError>
    where
        F: FnOnce(Arc<SharedStatus>, CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        let map = tasks.map_mut(kind);

        let mut replaced = false;
        if let Some(existing) = map.get_mut(name) {
            if existing.shared.is_running() {
                if self.config.duplicate_policy == DuplicatePolicy::Reject {
                    return Err(TaskError::DuplicateName {
                        kind,
                        name: name.to_string(),
                    });
                }
                // Awaited under the lock: the old loop is gone before the new one exists.
                existing.stop(StopReason::Replaced).await;
                replaced = true;
            } else {
                // Finished on its own (target gone); reap the handle.
                existing.stop(StopReason::Requested).await;
            }
        }

        let shared = Arc::new(SharedStatus::new(status));
        let token = CancellationToken::new();
        let handle = tokio::spawn(launch(Arc::clone(&shared), token.clone()));
        let snapshot = shared.snapshot();
        map.insert(
            name.to_string(),
            TaskEntry {
                shared,
                control: Some(TaskControl { token, handle }),
            },
        );

        tracing::info!(
            kind = %kind,
            task = %name,
            target = %snapshot.target.escape_default(),
            interval_secs = snapshot.interval_seconds,
            replaced,
            "started task"
        );
        Ok(StartOutcome {
            status: snapshot,
            replaced,
            policy: self.config.duplicate_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CycleStep, CycleSteps};
    use chanmux_tmux::Key;
    use chanmux_tmux::fake::FakeMultiplexer;
    use std::time::Duration;

    fn fast_config() -> RegistryConfig {
        RegistryConfig {
            duplicate_policy: DuplicatePolicy::Replace,
            submit_delay: Duration::ZERO,
            cycle: CycleSteps {
                interrupt_count: 5,
                interrupt_spacing: Duration::from_millis(1),
                pause_before_reconnect: Duration::from_millis(2),
                reconnect_command: "reconnect".to_string(),
                pause_before_resume: Duration::from_millis(2),
                resume_command: "resume".to_string(),
            },
        }
    }

    fn registry(fake: &Arc<FakeMultiplexer>, config: RegistryConfig) -> TaskRegistry {
        let mux: Arc<dyn Multiplexer> = Arc::clone(fake) as Arc<dyn Multiplexer>;
        TaskRegistry::new(mux, config)
    }

    fn timer(session: &str, message: &str, interval_ms: u64) -> TimerSpec {
        TimerSpec {
            session_id: session.to_string(),
            message: message.to_string(),
            interval: Duration::from_millis(interval_ms),
        }
    }

    fn cycle(session: &str, interval_ms: u64) -> CycleSpec {
        CycleSpec {
            session_id: session.to_string(),
            interval: Duration::from_millis(interval_ms),
            initial_delay: Duration::ZERO,
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached within 1s");
    }

    #[tokio::test]
    async fn timer_sends_repeatedly() {
        let fake = Arc::new(FakeMultiplexer::with_sessions(["s1"]));
        let reg = registry(&fake, fast_config());
        let out = reg.start_timer("t1", timer("s1", "ping", 10)).await.expect("start");
        assert!(!out.replaced);
        assert_eq!(out.status.state, TaskState::Running);

        wait_until(|| fake.texts_sent_to("s1").len() >= 3).await;
        assert!(fake.texts_sent_to("s1").iter().all(|t| t == "ping"));
        assert!(fake.keys_sent_to("s1").iter().all(|k| *k == Key::Enter));

        let status = reg.status(TaskKind::Timer, "t1").await.expect("status");
        assert!(status.ticks >= 1);
        reg.shutdown().await;
    }

    #[tokio::test]
    async fn restart_replaces_and_old_payload_never_fires_again() {
        let fake = Arc::new(FakeMultiplexer::with_sessions(["s1"]));
        let reg = registry(&fake, fast_config());
        reg.start_timer("t1", timer("s1", "first", 5)).await.expect("start");
        wait_until(|| !fake.texts_sent_to("s1").is_empty()).await;

        let out = reg.start_timer("t1", timer("s1", "second", 5)).await.expect("restart");
        assert!(out.replaced);
        assert_eq!(out.policy, DuplicatePolicy::Replace);
        let firsts = fake.texts_sent_to("s1").iter().filter(|t| *t == "first").count();

        wait_until(|| fake.texts_sent_to("s1").iter().filter(|t| *t == "second").count() >= 3).await;
        let firsts_after = fake.texts_sent_to("s1").iter().filter(|t| *t == "first").count();
        assert_eq!(firsts, firsts_after, "old timer fired after replacement");

        let all = reg.status_all(TaskKind::Timer).await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].message.as_deref(), Some("second"));
        assert!(all[0].is_running());
        reg.shutdown().await;
    }

    #[tokio::test]
    async fn reject_policy_refuses_duplicate() {
        let fake = Arc::new(FakeMultiplexer::with_sessions(["s1"]));
        let config = RegistryConfig {
            duplicate_policy: DuplicatePolicy::Reject,
            ..fast_config()
        };
        let reg = registry(&fake, config);
        reg.start_timer("t1", timer("s1", "a", 50)).await.expect("start");
        let err = reg.start_timer("t1", timer("s1", "b", 50)).await.unwrap_err();
        assert_eq!(
            err,
            TaskError::DuplicateName {
                kind: TaskKind::Timer,
                name: "t1".to_string()
            }
        );
        // Same name in the other kind is independent.
        reg.start_cycle("t1", cycle("s1", 1000)).await.expect("cycle");
        reg.shutdown().await;
    }

    #[tokio::test]
    async fn stop_unknown_is_noop() {
        let fake = Arc::new(FakeMultiplexer::new());
        let reg = registry(&fake, fast_config());
        let out = reg.stop(TaskKind::Timer, "nope").await;
        assert!(!out.was_running);
        assert!(out.status.is_none());
    }

    #[tokio::test]
    async fn stop_is_final_and_idempotent() {
        let fake = Arc::new(FakeMultiplexer::with_sessions(["s1"]));
        let reg = registry(&fake, fast_config());
        reg.start_timer("t1", timer("s1", "x", 5)).await.expect("start");
        wait_until(|| !fake.texts_sent_to("s1").is_empty()).await;

        let out = reg.stop(TaskKind::Timer, "t1").await;
        assert!(out.was_running);
        let status = out.status.expect("status");
        assert_eq!(status.state, TaskState::Stopped);
        assert_eq!(status.stop_reason, Some(StopReason::Requested));

        let sent = fake.calls().len();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(fake.calls().len(), sent, "no sends after stop returned");

        let again = reg.stop(TaskKind::Timer, "t1").await;
        assert!(!again.was_running);
    }

    #[tokio::test]
    async fn stop_waits_for_in_flight_send() {
        let fake = Arc::new(FakeMultiplexer::with_sessions(["s1"]));
        fake.set_send_latency(Duration::from_millis(40));
        let reg = registry(&fake, fast_config());
        reg.start_timer("t1", timer("s1", "slow", 1000)).await.expect("start");
        // Let the first tick begin its (slow) send.
        tokio::time::sleep(Duration::from_millis(10)).await;
        reg.stop(TaskKind::Timer, "t1").await;
        // Text and Enter both landed: the send was not abandoned halfway.
        assert_eq!(fake.texts_sent_to("s1"), ["slow"]);
        assert_eq!(fake.keys_sent_to("s1"), [Key::Enter]);
    }

    #[tokio::test]
    async fn send_failure_keeps_timer_running() {
        let fake = Arc::new(FakeMultiplexer::with_sessions(["s1"]));
        fake.fail_key(Key::Enter);
        let reg = registry(&fake, fast_config());
        reg.start_timer("t1", timer("s1", "x", 5)).await.expect("start");
        wait_until(|| fake.texts_sent_to("s1").len() >= 3).await;
        let status = reg.status(TaskKind::Timer, "t1").await.expect("status");
        assert!(status.is_running());
        assert!(status.last_error.is_some());
        reg.shutdown().await;
    }

    #[tokio::test]
    async fn vanished_target_stops_timer() {
        let fake = Arc::new(FakeMultiplexer::with_sessions(["s1"]));
        let reg = registry(&fake, fast_config());
        reg.start_timer("t1", timer("s1", "x", 5)).await.expect("start");
        wait_until(|| !fake.texts_sent_to("s1").is_empty()).await;
        fake.remove_session("s1");

        let mut stopped = None;
        for _ in 0..200 {
            let status = reg.status(TaskKind::Timer, "t1").await.expect("status");
            if !status.is_running() {
                stopped = Some(status);
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let status = stopped.expect("timer stopped");
        assert_eq!(status.stop_reason, Some(StopReason::TargetGone));

        // A later stop keeps the original reason and reports nothing running.
        let out = reg.stop(TaskKind::Timer, "t1").await;
        assert!(!out.was_running);
        assert_eq!(
            out.status.expect("status").stop_reason,
            Some(StopReason::TargetGone)
        );
    }

    #[tokio::test]
    async fn cycle_runs_every_step_even_when_interrupts_fail() {
        let fake = Arc::new(FakeMultiplexer::with_sessions(["s1"]));
        fake.fail_key(Key::Interrupt);
        let reg = registry(&fake, fast_config());
        reg.start_cycle("c1", cycle("s1", 10_000)).await.expect("start");

        let mut report = None;
        for _ in 0..200 {
            let status = reg.status(TaskKind::Cycle, "c1").await.expect("status");
            if let Some(r) = status.last_cycle {
                report = Some(r);
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let report = report.expect("one tick completed");
        assert!(report.completed);
        let steps: Vec<(CycleStep, u32, bool)> = report
            .steps
            .iter()
            .map(|s| (s.step, s.attempt, s.error.is_some()))
            .collect();
        assert_eq!(
            steps,
            vec![
                (CycleStep::Interrupt, 1, true),
                (CycleStep::Interrupt, 2, true),
                (CycleStep::Interrupt, 3, true),
                (CycleStep::Interrupt, 4, true),
                (CycleStep::Interrupt, 5, true),
                (CycleStep::Reconnect, 1, false),
                (CycleStep::Resume, 1, false),
            ]
        );
        assert_eq!(fake.texts_sent_to("s1"), ["reconnect", "resume"]);
        reg.shutdown().await;
    }

    #[tokio::test]
    async fn cycle_stop_mid_sequence_ends_at_step_boundary() {
        let fake = Arc::new(FakeMultiplexer::with_sessions(["s1"]));
        let config = RegistryConfig {
            cycle: CycleSteps {
                pause_before_reconnect: Duration::from_secs(30),
                ..fast_config().cycle
            },
            ..fast_config()
        };
        let reg = registry(&fake, config);
        reg.start_cycle("c1", cycle("s1", 60_000)).await.expect("start");
        wait_until(|| fake.keys_sent_to("s1").len() >= 5).await;

        // Sitting in the 30s pause: stop must return promptly.
        let started = std::time::Instant::now();
        let out = reg.stop(TaskKind::Cycle, "c1").await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(out.was_running);
        assert!(fake.texts_sent_to("s1").is_empty(), "reconnect never ran");

        // The replacement may start right away.
        reg.start_cycle("c1", cycle("s1", 60_000)).await.expect("restart");
        reg.shutdown().await;
    }

    #[tokio::test]
    async fn cycle_initial_delay_defers_first_tick() {
        let fake = Arc::new(FakeMultiplexer::with_sessions(["s1"]));
        let reg = registry(&fake, fast_config());
        let spec = CycleSpec {
            initial_delay: Duration::from_secs(30),
            ..cycle("s1", 60_000)
        };
        reg.start_cycle("c1", spec).await.expect("start");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(fake.calls().is_empty());
        let out = reg.stop(TaskKind::Cycle, "c1").await;
        assert!(out.was_running);
    }

    #[tokio::test]
    async fn cycle_with_missing_target_reports_target_gone() {
        let fake = Arc::new(FakeMultiplexer::new());
        let reg = registry(&fake, fast_config());
        reg.start_cycle("c1", cycle("ghost", 10_000)).await.expect("start");
        let mut status = None;
        for _ in 0..200 {
            let s = reg.status(TaskKind::Cycle, "c1").await.expect("status");
            if !s.is_running() {
                status = Some(s);
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let status = status.expect("cycle stopped");
        assert_eq!(status.stop_reason, Some(StopReason::TargetGone));
        let report = status.last_cycle.expect("report");
        assert!(report.completed, "all steps attempted before stopping");
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let fake = Arc::new(FakeMultiplexer::new());
        let reg = registry(&fake, fast_config());
        let err = reg.start_timer("t", timer("s", "m", 0)).await.unwrap_err();
        assert_eq!(err, TaskError::InvalidInterval { kind: TaskKind::Timer });
    }

    #[tokio::test]
    async fn shutdown_stops_everything() {
        let fake = Arc::new(FakeMultiplexer::with_sessions(["s1"]));
        let reg = registry(&fake, fast_config());
        reg.start_timer("t1", timer("s1", "x", 1000)).await.expect("timer");
        reg.start_cycle("c1", cycle("s1", 60_000)).await.expect("cycle");
        reg.shutdown().await;
        for kind in [TaskKind::Timer, TaskKind::Cycle] {
            for status in reg.status_all(kind).await {
                assert_eq!(status.state, TaskState::Stopped);
                assert_eq!(status.stop_reason, Some(StopReason::Shutdown));
            }
        }
    }

    #[tokio::test]
    async fn status_serializes_for_resources() {
        let fake = Arc::new(FakeMultiplexer::with_sessions(["s1"]));
        let reg = registry(&fake, fast_config());
        reg.start_timer("t1", timer("s1", "x", 1000)).await.expect("timer");
        let status = reg.status(TaskKind::Timer, "t1").await.expect("status");
        let json = serde_json::to_value(&status).expect("json");
        assert_eq!(json["kind"], "timer");
        assert_eq!(json["state"], "running");
        assert_eq!(json["interval_seconds"], 1.0);
        assert_eq!(json["message"], "x");
        assert!(json.get("last_cycle").is_none());
        reg.shutdown().await;
    }
}
