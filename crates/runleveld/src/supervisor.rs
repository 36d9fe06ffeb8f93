//! Supervisor construction and the embedding API.

use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use camino::Utf8Path;
use runlevel_config::{Config, ListenerSpec};
use runlevel_protocol::{Runlevel, ToolKind};
use thiserror::Error;
use tracing::info;

use crate::control::{
    CommandError, CommandSet, ControlHandler, STARTUP_TIMEOUT, StartupError, ToolError,
    claim_control_socket,
};
use crate::counters::{
    ACTIVE, ConnectionAccounting, ConnectionCounters, DEFAULT_ACTIVE_GRACE, TOTAL,
};
use crate::engine::{Engine, EngineParts, HookError, HookSet, TransitionError};
use crate::handlers::{StatusPage, TlsRedirect};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::process::{Respawner, SignalError, SystemRespawner, install_signal_handlers};
use crate::registry::{ListenerRegistry, RegistryError, RegistrySettings};
use crate::transport::{RequestHandler, ServeOptions};

const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");

/// Bound on reading a control request.
const CONTROL_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised by [`Supervisor::start`].
#[derive(Debug, Error)]
pub enum StartError {
    /// Signal handling could not be installed.
    #[error(transparent)]
    Signals(#[from] SignalError),
    /// Entering the default level failed.
    #[error("failed to enter default runlevel: {0}")]
    Transition(#[from] TransitionError),
}

/// Collects application callbacks before the control socket is claimed.
pub struct SupervisorBuilder {
    config: Config,
    handler: Option<Arc<dyn RequestHandler>>,
    hooks: HookSet,
    commands: CommandSet,
    reporter: Arc<dyn HealthReporter>,
    respawner: Arc<dyn Respawner>,
    grace: Duration,
    startup_timeout: Duration,
}

impl SupervisorBuilder {
    /// Starts a builder with the default status page, reporter and respawner.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            handler: None,
            hooks: HookSet::default(),
            commands: CommandSet::default(),
            reporter: Arc::new(StructuredHealthReporter::new()),
            respawner: Arc::new(SystemRespawner),
            grace: DEFAULT_ACTIVE_GRACE,
            startup_timeout: STARTUP_TIMEOUT,
        }
    }

    /// Serves `handler` on every public listener instead of the status page.
    #[must_use]
    pub fn request_handler(mut self, handler: Arc<dyn RequestHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Runs `hook` on entry to `level`. A failing hook aborts the transition,
    /// except at runlevel 0 where teardown continues regardless.
    #[must_use]
    pub fn hook<F>(mut self, level: Runlevel, hook: F) -> Self
    where
        F: Fn() -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.hooks.insert(level, hook);
        self
    }

    /// Enables the `update`, `rebuild` or `upgrade` control command.
    #[must_use]
    pub fn tool<F>(mut self, kind: ToolKind, tool: F) -> Self
    where
        F: Fn() -> Result<String, ToolError> + Send + Sync + 'static,
    {
        self.commands.insert_tool(kind, Box::new(tool));
        self
    }

    /// Registers an extra command word. The handler receives the text after
    /// the word.
    #[must_use]
    pub fn command<F>(mut self, word: impl Into<String>, command: F) -> Self
    where
        F: Fn(&str) -> Result<String, CommandError> + Send + Sync + 'static,
    {
        self.commands.insert_command(word, Box::new(command));
        self
    }

    /// Handles `CUSTOM` and any text no other command claims.
    #[must_use]
    pub fn custom_commander<F>(mut self, custom: F) -> Self
    where
        F: Fn(&str) -> Result<String, CommandError> + Send + Sync + 'static,
    {
        self.commands.set_custom(Box::new(custom));
        self
    }

    /// Replaces the structured-log health reporter.
    #[must_use]
    pub fn reporter(mut self, reporter: Arc<dyn HealthReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replaces how `redeploy` launches the replacement process.
    #[must_use]
    pub fn respawner(mut self, respawner: Arc<dyn Respawner>) -> Self {
        self.respawner = respawner;
        self
    }

    /// How long a closed connection still counts as active.
    #[must_use]
    pub const fn connection_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Bounds control-socket negotiation in [`SupervisorBuilder::build`].
    #[must_use]
    pub const fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Claims the control socket and assembles the supervisor at runlevel 0
    /// with no public listener open.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError`] when another instance keeps the control
    /// socket or binding does not finish within the startup timeout.
    pub fn build(self) -> Result<Supervisor, StartupError> {
        let Self {
            config,
            handler,
            hooks,
            commands,
            reporter,
            respawner,
            grace,
            startup_timeout,
        } = self;

        reporter.startup_negotiating(&config);
        let control = claim_control_socket(config.socket(), config.kicks, startup_timeout)
            .inspect_err(|error| reporter.startup_failed(error))?;

        let counters = Arc::new(ConnectionCounters::new());
        let settings = |engine: &Weak<Engine>| RegistrySettings {
            handler: handler.unwrap_or_else(|| Arc::new(StatusPage::new(engine.clone()))),
            redirect: config.redirect_tls.then(|| {
                Arc::new(TlsRedirect::new(&config.redirect_host, &config.tls_addr))
                    as Arc<dyn RequestHandler>
            }),
            accounting: ConnectionAccounting::new(Arc::clone(&counters), grace),
            force: config.force,
            tls_files: config
                .has_tls_material()
                .then(|| (config.tls_cert_file.clone(), config.tls_key_file.clone())),
        };
        let engine = Arc::new_cyclic(|weak| {
            let registry = ListenerRegistry::new(config.listener_specs(), settings(weak));
            Engine::new(EngineParts {
                config: config.clone(),
                registry,
                hooks,
                counters: Arc::clone(&counters),
                reporter: Arc::clone(&reporter),
            })
        });

        let handler = ControlHandler::new(Arc::downgrade(&engine), Arc::new(commands), respawner);
        let options = ServeOptions {
            accounting: None,
            read_timeout: Some(CONTROL_READ_TIMEOUT),
        };
        let handle = control
            .start(Arc::new(handler), options)
            .map_err(StartupError::Start)
            .inspect_err(|error| reporter.startup_failed(error))?;
        engine.attach_control(handle);

        reporter.startup_succeeded(&config);
        Ok(Supervisor { engine })
    }
}

/// A running lifecycle supervisor.
///
/// Dropping it without halting closes every listener and removes the control
/// socket, but skips the level-0 hook.
pub struct Supervisor {
    engine: Arc<Engine>,
}

impl Supervisor {
    /// Installs signal handling when enabled and enters the default level,
    /// passing through level 1 first when the cycle test is on.
    ///
    /// # Errors
    ///
    /// Returns [`StartError`] when signals cannot be installed or the level
    /// cannot be entered; the supervisor stays at its previous level.
    pub fn start(&self) -> Result<(), StartError> {
        let config = self.engine.config();
        if config.signals {
            install_signal_handlers(&self.engine)?;
        }
        let target = self.default_level();
        info!(
            target: SUPERVISOR_TARGET,
            level = target.as_u8(),
            cycle_test = config.cycle_test,
            "entering default runlevel"
        );
        if config.cycle_test {
            self.engine.transition_via(Runlevel::Single, target)?;
        } else {
            self.engine.transition(target)?;
        }
        Ok(())
    }

    /// Moves to `level`; concurrent callers are serialized.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when a hook or listener fails, leaving
    /// the level unchanged, or when the supervisor has already halted.
    pub fn transition(&self, level: Runlevel) -> Result<(), TransitionError> {
        self.engine.transition(level)
    }

    /// Convenience for a transition to runlevel 0.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::Halted`] when already halted.
    pub fn halt(&self) -> Result<(), TransitionError> {
        self.engine.transition(Runlevel::Halt)
    }

    /// The last committed runlevel.
    #[must_use]
    pub fn level(&self) -> Runlevel {
        self.engine.level()
    }

    /// The level [`Supervisor::start`] enters.
    #[must_use]
    pub fn default_level(&self) -> Runlevel {
        Runlevel::try_from(self.engine.config().default_level()).unwrap_or(Runlevel::Single)
    }

    /// The report returned by the `status` control command.
    #[must_use]
    pub fn status(&self) -> String {
        self.engine.status()
    }

    /// Time since the supervisor was built.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.engine.uptime()
    }

    /// Connections open now, or closed within the grace period.
    #[must_use]
    pub fn active_connections(&self) -> u64 {
        self.engine.counters().get(ACTIVE)
    }

    /// Connections accepted since startup.
    #[must_use]
    pub fn total_connections(&self) -> u64 {
        self.engine.counters().get(TOTAL)
    }

    /// Number of public listeners currently open.
    #[must_use]
    pub fn open_listeners(&self) -> usize {
        self.engine.open_listeners()
    }

    /// Bound addresses of open TCP and TLS listeners, in registration order.
    #[must_use]
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.engine.local_addrs()
    }

    /// Every registered public listener, open or not.
    #[must_use]
    pub fn listener_specs(&self) -> Vec<ListenerSpec> {
        self.engine.listener_specs()
    }

    /// Appends a public listener, opened on the next listening transition.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ListeningLevel`] while listeners are open.
    pub fn add_listener(&self, spec: ListenerSpec) -> Result<(), RegistryError> {
        self.engine.add_listener(spec)
    }

    /// The configuration the supervisor was built with.
    #[must_use]
    pub fn config(&self) -> &Config {
        self.engine.config()
    }

    /// Path of the bound control socket.
    #[must_use]
    pub fn socket_path(&self) -> &Utf8Path {
        self.engine.config().socket()
    }

    /// Blocks until runlevel 0 commits.
    pub fn wait(&self) {
        self.engine.wait();
    }

    /// Returns `true` if runlevel 0 committed within `timeout`.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.engine.wait_timeout(timeout)
    }

    /// Returns `true` once runlevel 0 has committed.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.engine.is_halted()
    }
}
