use camino::Utf8PathBuf;
use std::env;

#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use libc::geteuid;

use crate::logging::LogFormat;

/// Server name used when none is configured.
pub const DEFAULT_NAME: &str = "runleveld";

/// Plain listener address used when none is configured.
pub const DEFAULT_ADDR: &str = "127.0.0.1:8777";

/// Default runlevel entered on start.
pub const DEFAULT_LEVEL: u8 = 3;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

const SOCKET_FILE_NAME: &str = "runleveld.sock";

pub(crate) fn default_name() -> String {
    DEFAULT_NAME.to_owned()
}

pub(crate) fn default_addr() -> String {
    DEFAULT_ADDR.to_owned()
}

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

pub(crate) fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Computes the default control socket path.
///
/// Prefers the per-user runtime directory. When none is available the
/// system temporary directory is used with a uid namespace so users cannot
/// collide on the same socket.
#[must_use]
pub fn default_socket_path() -> Utf8PathBuf {
    let (mut base, apply_namespace) = match runtime_base_directory() {
        Some(dir) => (dir, false),
        None => (fallback_base_directory(), true),
    };

    base.push("runlevel");
    if apply_namespace {
        base.push(user_namespace());
    }
    base.join(SOCKET_FILE_NAME)
}

#[cfg(unix)]
fn runtime_base_directory() -> Option<Utf8PathBuf> {
    runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

#[cfg(not(unix))]
const fn runtime_base_directory() -> Option<Utf8PathBuf> {
    None
}

fn fallback_base_directory() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

#[cfg(unix)]
fn user_namespace() -> String {
    // SAFETY: `geteuid` has no preconditions and cannot fail.
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

#[cfg(not(unix))]
fn user_namespace() -> String {
    "shared".to_owned()
}
