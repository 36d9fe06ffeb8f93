use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Transport served by a registered listener.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ListenerKind {
    /// Plain TCP.
    Tcp,
    /// TCP wrapped in TLS.
    Tls,
    /// Unix-domain stream socket.
    Unix,
}

/// A listener the supervisor opens while in a listening runlevel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ListenerSpec {
    /// Transport used by the listener.
    pub kind: ListenerKind,
    /// `host:port` for TCP and TLS, a filesystem path for Unix sockets.
    pub address: String,
}

impl ListenerSpec {
    /// Builds a listener specification.
    #[must_use]
    pub fn new(kind: ListenerKind, address: impl Into<String>) -> Self {
        Self {
            kind,
            address: address.into(),
        }
    }

    /// Plain TCP listener on `address`.
    #[must_use]
    pub fn tcp(address: impl Into<String>) -> Self {
        Self::new(ListenerKind::Tcp, address)
    }

    /// TLS listener on `address`.
    #[must_use]
    pub fn tls(address: impl Into<String>) -> Self {
        Self::new(ListenerKind::Tls, address)
    }

    /// Unix-domain listener bound at `path`.
    #[must_use]
    pub fn unix(path: impl Into<String>) -> Self {
        Self::new(ListenerKind::Unix, path)
    }
}

impl fmt::Display for ListenerSpec {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}://{}", self.kind, self.address)
    }
}
