//! The runlevel state machine.
//!
//! All transitions run under one mutex, so at most one is in progress at a
//! time no matter how many signals, control commands or direct calls race
//! for it. The committed level lives in an atomic outside that mutex so
//! status reads never wait on an in-flight transition and never observe a
//! level that has not committed.

mod errors;
mod hooks;
mod status;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use runlevel_config::{Config, ListenerSpec};
use runlevel_protocol::Runlevel;
use tracing::{error, warn};

pub use self::errors::TransitionError;
pub use self::hooks::HookError;
pub(crate) use self::hooks::HookSet;

use crate::counters::{ACTIVE, ConnectionCounters, TOTAL};
use crate::health::HealthReporter;
use crate::registry::{ListenerRegistry, RegistryError};
use crate::transport::ListenerHandle;
use status::StatusSnapshot;

const ENGINE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::engine");

struct EngineState {
    registry: ListenerRegistry,
    halted: bool,
}

/// Collaborators needed to build an [`Engine`].
pub(crate) struct EngineParts {
    pub(crate) config: Config,
    pub(crate) registry: ListenerRegistry,
    pub(crate) hooks: HookSet,
    pub(crate) counters: Arc<ConnectionCounters>,
    pub(crate) reporter: Arc<dyn HealthReporter>,
}

pub(crate) struct Engine {
    config: Config,
    level: AtomicU8,
    state: Mutex<EngineState>,
    completion: Completion,
    hooks: HookSet,
    counters: Arc<ConnectionCounters>,
    reporter: Arc<dyn HealthReporter>,
    started: Instant,
    control: Mutex<Option<ListenerHandle>>,
    signals: Mutex<Option<signal_hook::iterator::Handle>>,
}

impl Engine {
    pub(crate) fn new(parts: EngineParts) -> Self {
        Self {
            config: parts.config,
            level: AtomicU8::new(Runlevel::Halt.as_u8()),
            state: Mutex::new(EngineState {
                registry: parts.registry,
                halted: false,
            }),
            completion: Completion::default(),
            hooks: parts.hooks,
            counters: parts.counters,
            reporter: parts.reporter,
            started: Instant::now(),
            control: Mutex::new(None),
            signals: Mutex::new(None),
        }
    }

    pub(crate) const fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn reporter(&self) -> &dyn HealthReporter {
        self.reporter.as_ref()
    }

    /// The last committed level.
    pub(crate) fn level(&self) -> Runlevel {
        Runlevel::try_from(self.level.load(Ordering::SeqCst)).unwrap_or(Runlevel::Halt)
    }

    pub(crate) fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub(crate) fn counters(&self) -> &ConnectionCounters {
        &self.counters
    }

    pub(crate) fn status(&self) -> String {
        StatusSnapshot {
            config: &self.config,
            level: self.level(),
            uptime: self.uptime(),
            active: self.counters.get(ACTIVE),
            total: self.counters.get(TOTAL),
        }
        .render()
    }

    pub(crate) fn attach_control(&self, handle: ListenerHandle) {
        *lock(&self.control) = Some(handle);
    }

    pub(crate) fn attach_signals(&self, handle: signal_hook::iterator::Handle) {
        *lock(&self.signals) = Some(handle);
    }

    pub(crate) fn open_listeners(&self) -> usize {
        self.lock_state().registry.open_count()
    }

    pub(crate) fn local_addrs(&self) -> Vec<SocketAddr> {
        self.lock_state().registry.local_addrs()
    }

    pub(crate) fn listener_specs(&self) -> Vec<ListenerSpec> {
        self.lock_state().registry.specs()
    }

    /// Appends a listener; only allowed while the level is not listening.
    pub(crate) fn add_listener(&self, spec: ListenerSpec) -> Result<(), RegistryError> {
        let mut state = self.lock_state();
        let level = self.level();
        if level.is_listening() {
            return Err(RegistryError::ListeningLevel {
                spec,
                level: level.as_u8(),
            });
        }
        state.registry.add(spec);
        Ok(())
    }

    /// Runs one serialized transition to `target`.
    pub(crate) fn transition(&self, target: Runlevel) -> Result<(), TransitionError> {
        let mut state = self.lock_state();
        self.apply(&mut state, target)
    }

    /// Passes through `via` on the way to `target` without letting another
    /// transition in between.
    pub(crate) fn transition_via(
        &self,
        via: Runlevel,
        target: Runlevel,
    ) -> Result<(), TransitionError> {
        let mut state = self.lock_state();
        self.apply(&mut state, via)?;
        self.apply(&mut state, target)
    }

    /// Reopens the listener set of the current level.
    pub(crate) fn reconfigure(&self) -> Result<(), TransitionError> {
        let mut state = self.lock_state();
        let current = self.level();
        if current.is_listening() {
            self.apply(&mut state, Runlevel::Single)?;
        }
        self.apply(&mut state, current)
    }

    pub(crate) fn is_halted(&self) -> bool {
        self.completion.is_done()
    }

    pub(crate) fn wait(&self) {
        self.completion.wait();
    }

    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        self.completion.wait_timeout(timeout)
    }

    fn apply(&self, state: &mut EngineState, target: Runlevel) -> Result<(), TransitionError> {
        if state.halted {
            return Err(TransitionError::Halted);
        }
        let previous = self.level();
        if previous == target {
            warn!(
                target: ENGINE_TARGET,
                level = target.as_u8(),
                "already at requested runlevel; re-entering"
            );
        }

        let closed = previous.is_listening() && !target.is_listening();
        if closed {
            state.registry.close();
        }

        if let Err(source) = self.hooks.run(target) {
            if target != Runlevel::Halt {
                if closed {
                    reopen_after_abort(state);
                }
                return Err(self.fail(previous, TransitionError::Hook { level: target, source }));
            }
            error!(
                target: ENGINE_TARGET,
                error = %source,
                "halt hook failed; continuing teardown"
            );
        }

        if target.is_listening()
            && let Err(source) = state.registry.open()
        {
            if !previous.is_listening() {
                state.registry.close();
            }
            return Err(self.fail(
                previous,
                TransitionError::Listeners {
                    level: target,
                    source,
                },
            ));
        }

        if target == Runlevel::Halt {
            state.registry.close();
            self.teardown(state);
        }

        self.level.store(target.as_u8(), Ordering::SeqCst);
        self.reporter.transition_completed(previous, target);
        if target == Runlevel::Halt {
            self.completion.notify();
        }
        Ok(())
    }

    fn fail(&self, previous: Runlevel, error: TransitionError) -> TransitionError {
        let target = match &error {
            TransitionError::Hook { level, .. } | TransitionError::Listeners { level, .. } => {
                *level
            }
            TransitionError::Halted => Runlevel::Halt,
        };
        self.reporter.transition_failed(previous, target, &error);
        error
    }

    /// Closes the control socket, exactly once, and stops signal handling.
    fn teardown(&self, state: &mut EngineState) {
        state.halted = true;
        if let Some(control) = lock(&self.control).take() {
            control.shutdown();
            if let Err(error) = control.join() {
                error!(
                    target: ENGINE_TARGET,
                    error = %error,
                    "control socket did not close cleanly"
                );
            }
        }
        if let Some(signals) = lock(&self.signals).take() {
            signals.close();
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        lock(&self.state)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(signals) = lock(&self.signals).take() {
            signals.close();
        }
    }
}

fn reopen_after_abort(state: &mut EngineState) {
    if let Err(error) = state.registry.open() {
        error!(
            target: ENGINE_TARGET,
            error = %error,
            "failed to reopen listeners after aborted transition"
        );
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One-shot completion signal raised when runlevel 0 commits.
#[derive(Default)]
struct Completion {
    done: Mutex<bool>,
    signal: Condvar,
}

impl Completion {
    fn notify(&self) {
        *lock(&self.done) = true;
        self.signal.notify_all();
    }

    fn is_done(&self) -> bool {
        *lock(&self.done)
    }

    fn wait(&self) {
        let mut done = lock(&self.done);
        while !*done {
            done = self
                .signal
                .wait(done)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        let done = lock(&self.done);
        let (done, _) = self
            .signal
            .wait_timeout_while(done, timeout, |done| !*done)
            .unwrap_or_else(PoisonError::into_inner);
        *done
    }
}
