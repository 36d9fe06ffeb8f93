use std::io::{self, Write};
use std::process::ExitCode;

use ortho_config::OrthoConfig;
use runlevel_config::Config;
use runleveld::{DaemonError, run_daemon};

fn main() -> ExitCode {
    match Config::load()
        .map_err(DaemonError::from)
        .and_then(run_daemon)
    {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(io::stderr(), "runleveld: {error}");
            ExitCode::FAILURE
        }
    }
}
