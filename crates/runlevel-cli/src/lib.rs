//! Command-line client for the runlevel supervisor's control socket.
//!
//! Each invocation opens one connection, sends the command words as a single
//! request and prints the single reply. The socket comes from `--socket`, or
//! from the supervisor configuration (`RUNLEVEL_SOCKET` or the configuration
//! file) when the flag is absent.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use clap::error::ErrorKind;
use ortho_config::OrthoConfig;
use runlevel_config::Config;
use runlevel_protocol::{ClientError, ControlClient};

mod cli;
mod errors;

use cli::Cli;
use errors::AppError;

/// Resolves the supervisor configuration when no socket is given.
pub(crate) trait ConfigLoader {
    fn load(&self) -> Result<Config, AppError>;
}

/// Loads configuration from the environment and configuration files only;
/// command-line flags belong to the client.
pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self) -> Result<Config, AppError> {
        Config::load_from_iter([OsString::from("runlevelctl")]).map_err(AppError::LoadConfiguration)
    }
}

/// Runs the client with the provided arguments and output streams.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error)
            if matches!(
                error.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) =>
        {
            let _ = write!(stdout, "{error}");
            return ExitCode::SUCCESS;
        }
        Err(error) => return report(stderr, &AppError::CliUsage(error)),
    };

    match execute(&cli, stdout, loader) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => report(stderr, &error),
    }
}

fn execute<W, L>(cli: &Cli, stdout: &mut W, loader: &L) -> Result<(), AppError>
where
    W: Write,
    L: ConfigLoader,
{
    let socket = resolve_socket(cli, loader)?;
    let client = ControlClient::new(&socket)?;
    let (command, args) = cli
        .command
        .split_first()
        .map(|(command, args)| (command.as_str(), args))
        .unwrap_or_default();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let reply = client.send(command, &args).map_err(|error| {
        if error.is_not_running() {
            AppError::NotRunning {
                socket: socket.to_string(),
            }
        } else {
            AppError::from(error)
        }
    })?;
    writeln!(stdout, "{reply}").map_err(AppError::WriteReply)?;
    stdout.flush().map_err(AppError::WriteReply)
}

fn resolve_socket<L: ConfigLoader>(cli: &Cli, loader: &L) -> Result<Utf8PathBuf, AppError> {
    match &cli.socket {
        Some(socket) => Ok(socket.clone()),
        None => Ok(loader.load()?.socket),
    }
}

fn report<E: Write>(stderr: &mut E, error: &AppError) -> ExitCode {
    let _ = match error {
        AppError::Client(ClientError::Remote { message }) => writeln!(stderr, "ERROR: {message}"),
        other => writeln!(stderr, "runlevelctl: {other}"),
    };
    ExitCode::FAILURE
}
