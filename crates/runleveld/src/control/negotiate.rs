//! Startup ownership negotiation for the control socket.
//!
//! The socket doubles as a singleton lock. Before binding, the supervisor
//! dials the path as a client: a missing file means it is free, a live
//! occupant is asked once to vacate with `KICK` and then polled until it
//! lets go, and anything else is treated as a stale file and removed.

use std::io;
use std::os::unix::net::UnixStream;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use runlevel_config::{ListenerSpec, prepare_socket_directory};
use runlevel_protocol::{ClientError, Command, ControlClient};
use tracing::{debug, info, warn};

use super::{CONTROL_TARGET, StartupError};
use crate::transport::{ListenerError, SocketListener};

/// Bound on the whole negotiation, bind included.
pub(crate) const STARTUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Stale-file removals tolerated before giving up.
const MAX_STALE_REMOVALS: usize = 10;
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Permission bits applied to the bound control socket.
const SOCKET_MODE: u32 = 0o770;

const KICK_ACCEPTED: &str = "OKAY";

/// Claims the control socket at `path`, evicting a live occupant when
/// `kicks` is set.
///
/// Negotiation runs on its own thread; if it has not produced a bound
/// socket within `timeout` the call fails with
/// [`StartupError::BindTimeout`].
pub(crate) fn claim_control_socket(
    path: &Utf8Path,
    kicks: bool,
    timeout: Duration,
) -> Result<SocketListener, StartupError> {
    let (sender, receiver) = mpsc::channel();
    let socket = path.to_path_buf();
    let deadline = Instant::now() + timeout;
    thread::Builder::new()
        .name("control-negotiation".to_owned())
        .spawn(move || {
            // A send error means the caller timed out; dropping the listener
            // removes the socket file again.
            let _ = sender.send(negotiate(&socket, kicks, deadline));
        })
        .map_err(|source| StartupError::Spawn {
            thread: "control negotiation",
            source,
        })?;

    match receiver.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(StartupError::BindTimeout { timeout }),
        Err(RecvTimeoutError::Disconnected) => Err(StartupError::NegotiationAborted),
    }
}

fn negotiate(
    path: &Utf8Path,
    kicks: bool,
    deadline: Instant,
) -> Result<SocketListener, StartupError> {
    prepare_socket_directory(path)?;
    let client = ControlClient::new(path).map_err(StartupError::Client)?;
    let socket_display = path.to_string();
    let mut attempts = 0;
    let mut stale_removals = 0;
    let mut kicked = false;

    while attempts == 0 || Instant::now() < deadline {
        attempts += 1;
        match UnixStream::connect(path.as_std_path()) {
            Err(error) if error.kind() == io::ErrorKind::NotFound => match bind(path) {
                Ok(listener) => return Ok(listener),
                Err(StartupError::Bind(ListenerError::UnixInUse { .. })) => {
                    debug!(
                        target: CONTROL_TARGET,
                        attempt = attempts,
                        "control socket claimed concurrently; retrying"
                    );
                }
                Err(error) => return Err(error),
            },
            Err(error) => {
                if stale_removals == MAX_STALE_REMOVALS {
                    break;
                }
                stale_removals += 1;
                warn!(
                    target: CONTROL_TARGET,
                    socket = %socket_display,
                    error = %error,
                    "replacing stale control socket"
                );
                remove_stale(path)?;
                continue;
            }
            Ok(_probe) if !kicks => {
                return Err(StartupError::AlreadyRunning { path: socket_display });
            }
            Ok(_probe) if kicked => {
                debug!(
                    target: CONTROL_TARGET,
                    socket = %socket_display,
                    attempt = attempts,
                    "waiting for previous occupant to release the socket"
                );
            }
            Ok(_probe) => {
                kick_occupant(&client, &socket_display)?;
                kicked = true;
                info!(
                    target: CONTROL_TARGET,
                    socket = %socket_display,
                    "kicked previous occupant"
                );
            }
        }
        thread::sleep(RETRY_DELAY);
    }

    Err(StartupError::Contended {
        path: socket_display,
        attempts,
    })
}

/// Asks the occupant to vacate. A connection dropped mid-reply counts as
/// acceptance because the occupant may exit before answering.
fn kick_occupant(client: &ControlClient, path: &str) -> Result<(), StartupError> {
    match client.send_command(&Command::Kick) {
        Ok(reply) if reply == KICK_ACCEPTED => Ok(()),
        Ok(reply) => Err(StartupError::KickRefused {
            path: path.to_owned(),
            reply,
        }),
        Err(ClientError::UnexpectedEof) => Ok(()),
        Err(error) if error.is_not_running() => Ok(()),
        Err(ClientError::Remote { message }) => Err(StartupError::KickRefused {
            path: path.to_owned(),
            reply: message,
        }),
        Err(source) => Err(StartupError::Kick {
            path: path.to_owned(),
            source,
        }),
    }
}

fn remove_stale(path: &Utf8Path) -> Result<(), StartupError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StartupError::StaleSocket {
            path: path.to_string(),
            source,
        }),
    }
}

fn bind(path: &Utf8Path) -> Result<SocketListener, StartupError> {
    let listener =
        SocketListener::bind(&ListenerSpec::unix(path.as_str()), None).map_err(StartupError::Bind)?;
    restrict_permissions(path)?;
    Ok(listener)
}

fn restrict_permissions(path: &Utf8Path) -> Result<(), StartupError> {
    use std::fs::{self, Permissions};
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, Permissions::from_mode(SOCKET_MODE)).map_err(|source| {
        StartupError::Permissions {
            path: path.to_string(),
            source,
        }
    })
}
