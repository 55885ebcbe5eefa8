//! Throttle service: state machine, bulk sweeps, housekeeping timer

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::platform::{Platform, PlatformError, WindowRef};
use crate::policy::{PatternSet, ProcessPolicy};
use crate::power::PowerController;
use crate::resolve::{resolve_target, TargetProcess};

/// Focus events queued between the OS hook thread and the service.
const FOCUS_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The daemon cannot do its job without foreground notifications, so
    /// this is fatal at startup.
    #[error("failed to install foreground watch: {0}")]
    FocusHook(#[source] PlatformError),
}

struct ServiceState<P: Platform> {
    /// Whether throttling is active. Focus events and housekeeping ticks
    /// observed while stopped are ignored.
    running: bool,
    policy: Arc<ProcessPolicy>,
    /// The one boosted foreground process awaiting re-throttle.
    pending: Option<TargetProcess>,
    housekeeping_stop: Option<oneshot::Sender<()>>,
    focus_stop: Option<oneshot::Sender<()>>,
    focus_guard: Option<P::FocusGuard>,
}

/// Foreground-aware throttling service.
///
/// Every public operation serializes on one mutex, so focus events, timer
/// ticks and policy updates never observe each other's intermediate state.
pub struct ThrottleService<P: Platform> {
    platform: Arc<P>,
    power: PowerController<P>,
    housekeeping_interval: Duration,
    state: Mutex<ServiceState<P>>,
}

impl<P: Platform> ThrottleService<P> {
    pub fn new(
        platform: Arc<P>,
        policy: ProcessPolicy,
        housekeeping_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            power: PowerController::new(platform.clone()),
            platform,
            housekeeping_interval,
            state: Mutex::new(ServiceState {
                running: false,
                policy: Arc::new(policy),
                pending: None,
                housekeeping_stop: None,
                focus_stop: None,
                focus_guard: None,
            }),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, ServiceState<P>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("service state mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Begin throttling: subscribe to foreground changes, throttle the
    /// current background processes, and arm the housekeeping timer.
    /// A no-op when already running.
    pub fn start(self: &Arc<Self>) -> Result<(), ServiceError> {
        let mut state = self.lock_state();
        if state.running {
            return Ok(());
        }
        info!("start throttling");

        let (events_tx, events_rx) = mpsc::channel(FOCUS_CHANNEL_CAPACITY);
        let guard = self
            .platform
            .watch_foreground(events_tx)
            .map_err(ServiceError::FocusHook)?;
        state.focus_guard = Some(guard);
        state.focus_stop = Some(self.spawn_focus_pump(events_rx));

        self.start_throttling_locked(&mut state);
        Ok(())
    }

    /// Stop throttling, unsubscribe from focus events, and restore every
    /// session process to normal power. A no-op when already stopped.
    pub fn stop(&self) {
        let mut state = self.lock_state();
        if !state.running {
            return;
        }
        info!("stop throttling");

        self.stop_throttling_locked(&mut state);
        if let Some(stop) = state.focus_stop.take() {
            let _ = stop.send(());
        }
        // Dropping the guard unhooks the foreground watch.
        drop(state.focus_guard.take());
    }

    /// Replace the allow list and re-evaluate every process.
    pub fn apply_allow_list(self: &Arc<Self>, text: &str) {
        let allow = PatternSet::parse(text);
        self.apply_policy(|policy| ProcessPolicy {
            allow,
            deny: policy.deny.clone(),
        });
    }

    /// Replace the deny list and re-evaluate every process.
    pub fn apply_deny_list(self: &Arc<Self>, text: &str) {
        let deny = PatternSet::parse(text);
        self.apply_policy(|policy| ProcessPolicy {
            allow: policy.allow.clone(),
            deny,
        });
    }

    /// Swap the policy under the lock, bracketed by a full stop/start of
    /// throttling so no process is ever evaluated against a mixed policy.
    fn apply_policy(self: &Arc<Self>, rebuild: impl FnOnce(&ProcessPolicy) -> ProcessPolicy) {
        let mut state = self.lock_state();
        let was_running = state.running;
        if was_running {
            self.stop_throttling_locked(&mut state);
        }

        let next = rebuild(state.policy.as_ref());
        info!(
            allow = next.allow.len(),
            deny = next.deny.len(),
            "policy updated"
        );
        state.policy = Arc::new(next);

        if was_running {
            self.start_throttling_locked(&mut state);
        }
    }

    /// Handle a foreground window change. Called from the focus event pump;
    /// also the entry point tests drive directly.
    ///
    /// A target that is not throttle-eligible is boosted and becomes the
    /// pending process; an eligible target stays throttled. Either way the
    /// previously pending process is throttled back once focus has moved to
    /// a different pid.
    pub fn focus_changed(&self, window: WindowRef) {
        let mut state = self.lock_state();
        if !state.running {
            return;
        }
        let Some(target) = resolve_target(self.platform.as_ref(), window) else {
            return;
        };
        if state.pending.as_ref().is_some_and(|p| p.pid == target.pid) {
            // Same process still in front; nothing to redo.
            return;
        }

        let boosted = if state.policy.should_throttle(&target.image_name) {
            debug!(
                pid = target.pid,
                name = %target.image_name,
                "foreground process stays throttled"
            );
            false
        } else {
            info!(pid = target.pid, name = %target.image_name, "boosting foreground process");
            self.power.apply(target.pid, false);
            true
        };

        if let Some(prev) = state.pending.take() {
            info!(pid = prev.pid, name = %prev.image_name, "throttling previous foreground process");
            self.power.apply(prev.pid, true);
        }
        if boosted {
            state.pending = Some(target);
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_state().running
    }

    /// The currently boosted foreground process, if any.
    pub fn pending(&self) -> Option<TargetProcess> {
        self.lock_state().pending.clone()
    }

    fn start_throttling_locked(self: &Arc<Self>, state: &mut ServiceState<P>) {
        state.running = true;
        self.sweep(state, true);
        state.housekeeping_stop = Some(self.spawn_housekeeping());
    }

    fn stop_throttling_locked(&self, state: &mut ServiceState<P>) {
        if let Some(stop) = state.housekeeping_stop.take() {
            let _ = stop.send(());
        }
        state.running = false;
        self.sweep(state, false);
        state.pending = None;
    }

    /// One pass over the session process table. `throttle` selects the
    /// direction: throttling skips exempt processes (they are left
    /// untouched, never force-boosted); restoring is unconditional. The
    /// pending foreground process is never touched mid-transition. A
    /// process that cannot be opened is skipped; the sweep never aborts.
    fn sweep(&self, state: &ServiceState<P>, throttle: bool) {
        let processes = self.platform.session_processes();
        let mut applied = 0usize;
        for entry in &processes {
            if state.pending.as_ref().is_some_and(|p| p.pid == entry.pid) {
                continue;
            }
            if throttle && !state.policy.should_throttle(&entry.image_name.to_lowercase()) {
                continue;
            }
            if self.power.apply(entry.pid, throttle) {
                applied += 1;
            }
        }
        info!(
            total = processes.len(),
            applied, throttle, "session sweep finished"
        );
    }

    fn spawn_housekeeping(self: &Arc<Self>) -> oneshot::Sender<()> {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let service = Arc::clone(self);
        let interval = self.housekeeping_interval;
        tokio::spawn(async move {
            debug!("housekeeping task started");
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = tokio::time::sleep(interval) => service.housekeeping_tick(),
                }
            }
            debug!("housekeeping task stopped");
        });
        stop_tx
    }

    fn housekeeping_tick(&self) {
        let state = self.lock_state();
        if !state.running {
            return;
        }
        info!("housekeeping: re-throttling background processes");
        self.sweep(&state, true);
    }

    fn spawn_focus_pump(self: &Arc<Self>, mut events: mpsc::Receiver<WindowRef>) -> oneshot::Sender<()> {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let service = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    event = events.recv() => match event {
                        Some(window) => service.focus_changed(window),
                        None => break,
                    },
                }
            }
            debug!("focus event pump stopped");
        });
        stop_tx
    }
}
