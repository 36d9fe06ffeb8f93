//! Per-connection handling of control requests.

use std::sync::{Arc, Weak};

use runlevel_protocol::{Command, Reply, Request, Runlevel, read_line, write_message};
use tracing::{debug, error, warn};

use super::{CONTROL_TARGET, CommandSet};
use crate::engine::Engine;
use crate::process::Respawner;
use crate::transport::{ConnectionStream, RequestHandler};

const KICK_ACCEPTED: &str = "OKAY";
const KICK_REFUSED: &str = "NO WAY";

/// Work that must wait until the reply has been flushed and the connection
/// closed, because it may tear down the control socket itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deferred {
    Halt,
    Redeploy,
    Reconfigure,
}

struct Outcome {
    reply: Reply,
    deferred: Option<Deferred>,
}

impl Outcome {
    fn reply(reply: Reply) -> Self {
        Self {
            reply,
            deferred: None,
        }
    }

    fn text(text: impl Into<String>) -> Self {
        Self::reply(Reply::text(text))
    }

    fn then(text: impl Into<String>, deferred: Deferred) -> Self {
        Self {
            reply: Reply::text(text),
            deferred: Some(deferred),
        }
    }
}

/// Serves one request per control connection.
pub(crate) struct ControlHandler {
    engine: Weak<Engine>,
    commands: Arc<CommandSet>,
    respawner: Arc<dyn Respawner>,
}

impl ControlHandler {
    pub(crate) fn new(
        engine: Weak<Engine>,
        commands: Arc<CommandSet>,
        respawner: Arc<dyn Respawner>,
    ) -> Self {
        Self {
            engine,
            commands,
            respawner,
        }
    }

    fn execute(&self, engine: &Engine, command: Command) -> Outcome {
        match command {
            Command::Hello(_) => Outcome::text(format!("HELLO {}", engine.config().name)),
            Command::Status => Outcome::text(engine.status()),
            Command::Telinit(level) => match engine.transition(level) {
                Ok(()) => Outcome::text("DONE"),
                Err(error) => Outcome::reply(Reply::error(error.to_string())),
            },
            Command::Runlevel(None) => Outcome::text(engine.level().to_string()),
            Command::Runlevel(Some(level)) => match engine.transition(level) {
                Ok(()) => Outcome::text(level.to_string()),
                Err(error) => Outcome::reply(Reply::error(error.to_string())),
            },
            Command::Kick => {
                let accepted = engine.config().kickable;
                engine.reporter().kick_received(accepted);
                if accepted {
                    Outcome::then(KICK_ACCEPTED, Deferred::Halt)
                } else {
                    Outcome::text(KICK_REFUSED)
                }
            }
            Command::Redeploy => Outcome::then("Redeploying", Deferred::Redeploy),
            Command::Reconfig => Outcome::then("Reconfiguring", Deferred::Reconfigure),
            Command::Tool(kind) => Outcome::reply(self.commands.run_tool(kind)),
            Command::Help => Outcome::text(self.commands.help()),
            Command::Custom(args) => Outcome::reply(self.commands.run_custom(&args)),
            Command::Other(text) => Outcome::reply(self.commands.run_other(&text)),
        }
    }

    fn run_deferred(&self, engine: &Engine, deferred: Deferred) {
        let result = match deferred {
            Deferred::Halt => engine.transition(Runlevel::Halt),
            Deferred::Reconfigure => engine.reconfigure(),
            Deferred::Redeploy => {
                engine.reporter().redeploy_requested();
                if let Err(error) = self.respawner.respawn() {
                    error!(
                        target: CONTROL_TARGET,
                        error = %error,
                        "failed to start replacement process"
                    );
                    engine.reporter().respawn_failed(&error);
                }
                engine.transition(Runlevel::Halt)
            }
        };
        if let Err(error) = result {
            error!(
                target: CONTROL_TARGET,
                action = ?deferred,
                error = %error,
                "deferred control action failed"
            );
        }
    }
}

impl RequestHandler for ControlHandler {
    fn handle(&self, mut stream: ConnectionStream) {
        let request = match read_line::<Request, _>(&mut stream) {
            Ok(Some(request)) => request,
            Ok(None) => return,
            Err(error) => {
                warn!(
                    target: CONTROL_TARGET,
                    error = %error,
                    "failed to read control request"
                );
                respond(&mut stream, &Reply::error(error.to_string()));
                return;
            }
        };

        let Some(engine) = self.engine.upgrade() else {
            respond(&mut stream, &Reply::error("supervisor is shutting down"));
            return;
        };

        let outcome = match Command::parse(&request.command) {
            Ok(command) => self.execute(&engine, command),
            Err(error) => Outcome::reply(Reply::error(error.to_string())),
        };

        if engine.config().debug {
            debug!(
                target: CONTROL_TARGET,
                command = %request.command,
                reply = ?outcome.reply,
                "control request served"
            );
        }

        respond(&mut stream, &outcome.reply);
        drop(stream);

        if let Some(deferred) = outcome.deferred {
            self.run_deferred(&engine, deferred);
        }
    }
}

fn respond(stream: &mut ConnectionStream, reply: &Reply) {
    if let Err(error) = write_message(stream, reply) {
        warn!(
            target: CONTROL_TARGET,
            error = %error,
            "failed to send control reply"
        );
    }
}
