//! Plain-text status report served by the `status` command.

use std::env;
use std::fmt::Write as _;
use std::time::Duration;

use runlevel_config::Config;
use runlevel_protocol::Runlevel;

/// Point-in-time values rendered into a status report.
pub(crate) struct StatusSnapshot<'a> {
    pub(crate) config: &'a Config,
    pub(crate) level: Runlevel,
    pub(crate) uptime: Duration,
    pub(crate) active: u64,
    pub(crate) total: u64,
}

impl StatusSnapshot<'_> {
    pub(crate) fn render(&self) -> String {
        let config = self.config;
        let listening = if self.level.is_listening() {
            "Listening"
        } else {
            "Not Listening"
        };

        let mut out = String::new();
        // Writing into a `String` cannot fail.
        let _ = writeln!(out, "Server Name: {}", config.name);
        let _ = writeln!(out, "Version: {}", env!("CARGO_PKG_VERSION"));
        let _ = writeln!(out, "Default Runlevel: {}", config.default_level());
        let _ = writeln!(out, "Current Runlevel: {}", self.level);
        let _ = writeln!(out, "Socket: {}", config.socket);
        let _ = writeln!(out, "Addr: {} ({listening})", config.addr);
        let _ = writeln!(out, "Uptime: {}", format_uptime(self.uptime));
        let _ = writeln!(out, "Recent Connections: {}", self.active);
        let _ = writeln!(out, "Total Connections: {}", self.total);
        if config.debug {
            let _ = writeln!(out, "Debug: {}", config.debug);
            if let Ok(directory) = env::current_dir() {
                let _ = writeln!(out, "Working Directory: {}", directory.display());
            }
            if let Ok(executable) = env::current_exe() {
                let _ = writeln!(out, "Executable: {}", executable.display());
            }
        }
        out
    }
}

/// Formats a duration as hours, minutes and seconds, omitting leading
/// zero units: `45s`, `3m07s`, `2h00m05s`.
pub(crate) fn format_uptime(uptime: Duration) -> String {
    let seconds = uptime.as_secs();
    let (hours, remainder) = (seconds / 3600, seconds % 3600);
    let (minutes, seconds) = (remainder / 60, remainder % 60);
    match (hours, minutes) {
        (0, 0) => format!("{seconds}s"),
        (0, _) => format!("{minutes}m{seconds:02}s"),
        _ => format!("{hours}h{minutes:02}m{seconds:02}s"),
    }
}
