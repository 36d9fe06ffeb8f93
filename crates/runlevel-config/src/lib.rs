//! Shared configuration for the runlevel supervisor and its control client.
//!
//! [`Config`] is loaded through `ortho_config`, which layers built-in
//! defaults, an optional configuration file, `RUNLEVEL_*` environment
//! variables and command-line flags. The supervisor treats the loaded value
//! as immutable once construction begins.

mod defaults;
mod listener;
mod logging;
mod socket;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_ADDR, DEFAULT_LEVEL, DEFAULT_LOG_FILTER, DEFAULT_NAME, default_log_filter,
    default_log_format, default_socket_path,
};
pub use listener::{ListenerKind, ListenerSpec};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SOCKET_DIRECTORY_MODE, SocketPreparationError, prepare_socket_directory};

/// Supervisor configuration.
///
/// Empty address strings disable the corresponding listener. Switches that
/// default to on have no command-line flag, since a generated boolean flag
/// only ever sets `true`; turn them off through the file or the
/// environment, for example `RUNLEVEL_KICKS=false`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[serde(default)]
#[ortho_config(prefix = "RUNLEVEL")]
pub struct Config {
    /// Server name reported by `HELLO` and `status`.
    #[ortho_config(default = defaults::default_name())]
    pub name: String,
    /// Plain TCP listener address.
    #[ortho_config(default = defaults::default_addr())]
    pub addr: String,
    /// TLS listener address.
    #[ortho_config(default = String::new())]
    pub tls_addr: String,
    /// Control socket path.
    #[ortho_config(default = default_socket_path())]
    pub socket: Utf8PathBuf,
    /// Unix-domain HTTP listener path.
    #[ortho_config(default = String::new())]
    pub socket_http: String,
    /// Runlevel entered by `start()`.
    #[ortho_config(default = DEFAULT_LEVEL)]
    pub level: u8,
    /// Extends `status` with process details and logs every control reply.
    #[ortho_config(default = false)]
    pub debug: bool,
    /// Whether this process honours a remote `KICK`.
    #[ortho_config(default = true, skip_cli)]
    pub kickable: bool,
    /// Whether this process evicts a prior occupant of the control socket.
    #[ortho_config(default = true, skip_cli)]
    pub kicks: bool,
    /// PEM certificate chain for the TLS listener.
    #[ortho_config(default = String::new())]
    pub tls_cert_file: String,
    /// PEM private key for the TLS listener.
    #[ortho_config(default = String::new())]
    pub tls_key_file: String,
    /// Maps termination signals to a halt request.
    #[ortho_config(default = true, skip_cli)]
    pub signals: bool,
    /// Treats a partially opened listener set as success.
    #[ortho_config(default = false)]
    pub force: bool,
    /// Enters level 1 before the default level on start.
    #[ortho_config(default = false)]
    pub cycle_test: bool,
    /// Plain listener answers with redirects to the TLS host.
    #[ortho_config(default = false)]
    pub redirect_tls: bool,
    /// Host used as the redirect target.
    #[ortho_config(default = String::new())]
    pub redirect_host: String,
    /// `tracing` filter expression.
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: defaults::default_name(),
            addr: defaults::default_addr(),
            tls_addr: String::new(),
            socket: default_socket_path(),
            socket_http: String::new(),
            level: DEFAULT_LEVEL,
            debug: false,
            kickable: true,
            kicks: true,
            tls_cert_file: String::new(),
            tls_key_file: String::new(),
            signals: true,
            force: false,
            cycle_test: false,
            redirect_tls: false,
            redirect_host: String::new(),
            log_filter: defaults::default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Control socket path.
    #[must_use]
    pub fn socket(&self) -> &Utf8Path {
        self.socket.as_path()
    }

    /// Default runlevel, normalised to the range the supervisor can enter
    /// on start. Zero and unknown levels fall back to single-user.
    #[must_use]
    pub const fn default_level(&self) -> u8 {
        match self.level {
            1..=4 => self.level,
            _ => 1,
        }
    }

    /// Ordered listener set opened on entry to a listening level.
    #[must_use]
    pub fn listener_specs(&self) -> Vec<ListenerSpec> {
        [
            (ListenerKind::Tcp, &self.addr),
            (ListenerKind::Tls, &self.tls_addr),
            (ListenerKind::Unix, &self.socket_http),
        ]
        .into_iter()
        .filter(|(_, address)| !address.trim().is_empty())
        .map(|(kind, address)| ListenerSpec::new(kind, address.trim()))
        .collect()
    }

    /// Returns `true` when both halves of the TLS key pair are configured.
    #[must_use]
    pub fn has_tls_material(&self) -> bool {
        !self.tls_cert_file.is_empty() && !self.tls_key_file.is_empty()
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::halt(0, 1)]
    #[case::single(1, 1)]
    #[case::multi(3, 3)]
    #[case::custom(4, 4)]
    #[case::out_of_range(9, 1)]
    fn default_level_is_normalised(#[case] level: u8, #[case] expected: u8) {
        let config = Config {
            level,
            ..Config::default()
        };
        assert_eq!(config.default_level(), expected);
    }

    #[test]
    fn listener_specs_skip_disabled_addresses() {
        let config = Config {
            addr: "127.0.0.1:8080".into(),
            tls_addr: "  ".into(),
            socket_http: "/tmp/runlevel-http.sock".into(),
            ..Config::default()
        };
        let specs = config.listener_specs();
        assert_eq!(
            specs,
            vec![
                ListenerSpec::new(ListenerKind::Tcp, "127.0.0.1:8080"),
                ListenerSpec::new(ListenerKind::Unix, "/tmp/runlevel-http.sock"),
            ]
        );
    }

    #[test]
    fn tls_material_requires_both_files() {
        let mut config = Config {
            tls_cert_file: "cert.pem".into(),
            ..Config::default()
        };
        assert!(!config.has_tls_material());
        config.tls_key_file = "key.pem".into();
        assert!(config.has_tls_material());
    }
}
