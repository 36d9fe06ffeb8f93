use camino::Utf8PathBuf;
use clap::Parser;

/// Sends one command to a runlevel supervisor and prints the reply.
#[derive(Debug, Parser)]
#[command(name = "runlevelctl", version, about)]
pub(crate) struct Cli {
    /// Control socket path; defaults to the configured supervisor socket.
    #[arg(long, value_name = "PATH")]
    pub(crate) socket: Option<Utf8PathBuf>,
    /// Command words, for example `status` or `runlevel 1`.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub(crate) command: Vec<String>,
}
