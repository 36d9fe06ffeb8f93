//! Ordered set of public listeners opened and closed with the runlevel.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use runlevel_config::{ListenerKind, ListenerSpec};
use rustls::ServerConfig;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::counters::ConnectionAccounting;
use crate::transport::{
    ListenerError, ListenerHandle, RequestHandler, ServeOptions, SocketListener,
    load_server_config,
};

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Bound on a single blocking read from a public connection.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Handlers and policy shared by every registry entry.
pub(crate) struct RegistrySettings {
    pub(crate) handler: Arc<dyn RequestHandler>,
    /// Replaces `handler` on plain TCP entries when TLS redirects are on.
    pub(crate) redirect: Option<Arc<dyn RequestHandler>>,
    pub(crate) accounting: ConnectionAccounting,
    pub(crate) force: bool,
    pub(crate) tls_files: Option<(String, String)>,
}

struct ListenerEntry {
    spec: ListenerSpec,
    handle: Option<ListenerHandle>,
}

pub(crate) struct ListenerRegistry {
    entries: Vec<ListenerEntry>,
    settings: RegistrySettings,
}

impl ListenerRegistry {
    pub(crate) fn new(specs: Vec<ListenerSpec>, settings: RegistrySettings) -> Self {
        Self {
            entries: specs
                .into_iter()
                .map(|spec| ListenerEntry { spec, handle: None })
                .collect(),
            settings,
        }
    }

    pub(crate) fn add(&mut self, spec: ListenerSpec) {
        self.entries.push(ListenerEntry { spec, handle: None });
    }

    pub(crate) fn specs(&self) -> Vec<ListenerSpec> {
        self.entries.iter().map(|entry| entry.spec.clone()).collect()
    }

    pub(crate) fn open_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.handle.is_some())
            .count()
    }

    pub(crate) fn local_addrs(&self) -> Vec<SocketAddr> {
        self.entries
            .iter()
            .filter_map(|entry| entry.handle.as_ref()?.local_addr())
            .collect()
    }

    /// Opens every entry that is not already open.
    ///
    /// A failing entry does not stop the remaining ones. Unless `force` is
    /// set, any failure is reported once all entries have been attempted.
    pub(crate) fn open(&mut self) -> Result<usize, RegistryError> {
        let mut failures = Vec::new();
        let mut opened = 0_usize;

        for index in 0..self.entries.len() {
            let Some(spec) = self
                .entries
                .get(index)
                .filter(|entry| entry.handle.is_none())
                .map(|entry| entry.spec.clone())
            else {
                continue;
            };

            match self.start_entry(&spec) {
                Ok(handle) => {
                    info!(
                        target: REGISTRY_TARGET,
                        listener = %spec,
                        "listener opened"
                    );
                    if let Some(entry) = self.entries.get_mut(index) {
                        entry.handle = Some(handle);
                    }
                    opened = opened.saturating_add(1);
                }
                Err(error) => {
                    warn!(
                        target: REGISTRY_TARGET,
                        listener = %spec,
                        error = %error,
                        "listener failed to open"
                    );
                    failures.push(ListenerFailure { spec, error });
                }
            }
        }

        if failures.is_empty() || self.settings.force {
            Ok(opened)
        } else {
            Err(RegistryError::Open {
                failures: ListenerFailures(failures),
            })
        }
    }

    /// Closes every open entry concurrently and waits for all of them.
    pub(crate) fn close(&mut self) -> usize {
        let handles: Vec<ListenerHandle> = self
            .entries
            .iter_mut()
            .filter_map(|entry| entry.handle.take())
            .collect();
        for handle in &handles {
            handle.shutdown();
        }

        let closed = handles.len();
        thread::scope(|scope| {
            for handle in handles {
                scope.spawn(move || {
                    let spec = handle.spec().clone();
                    match handle.join() {
                        Ok(()) => info!(
                            target: REGISTRY_TARGET,
                            listener = %spec,
                            "listener closed"
                        ),
                        Err(error) => error!(
                            target: REGISTRY_TARGET,
                            listener = %spec,
                            error = %error,
                            "listener failed to close cleanly"
                        ),
                    }
                });
            }
        });
        closed
    }

    fn start_entry(&self, spec: &ListenerSpec) -> Result<ListenerHandle, ListenerError> {
        let tls = match spec.kind {
            ListenerKind::Tls => Some(self.tls_config(spec)?),
            ListenerKind::Tcp | ListenerKind::Unix => None,
        };
        let handler = match (&spec.kind, &self.settings.redirect) {
            (ListenerKind::Tcp, Some(redirect)) => Arc::clone(redirect),
            _ => Arc::clone(&self.settings.handler),
        };
        let options = ServeOptions {
            accounting: Some(self.settings.accounting.clone()),
            read_timeout: Some(READ_TIMEOUT),
        };
        SocketListener::bind(spec, tls)?.start(handler, options)
    }

    fn tls_config(&self, spec: &ListenerSpec) -> Result<Arc<ServerConfig>, ListenerError> {
        match &self.settings.tls_files {
            Some((cert, key)) => load_server_config(cert, key),
            None => Err(ListenerError::TlsNotConfigured {
                address: spec.address.clone(),
            }),
        }
    }
}

impl Drop for ListenerRegistry {
    fn drop(&mut self) {
        self.close();
    }
}

/// A listener that failed to open.
#[derive(Debug)]
pub struct ListenerFailure {
    /// The entry that failed.
    pub spec: ListenerSpec,
    /// Why it failed.
    pub error: ListenerError,
}

/// Every failure from one open attempt.
#[derive(Debug)]
pub struct ListenerFailures(pub Vec<ListenerFailure>);

impl fmt::Display for ListenerFailures {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, failure) in self.0.iter().enumerate() {
            if position > 0 {
                formatter.write_str("; ")?;
            }
            write!(formatter, "{}: {}", failure.spec, failure.error)?;
        }
        Ok(())
    }
}

/// Errors reported by the listener registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// One or more listeners failed to open.
    #[error("{} listener(s) failed to open: {failures}", .failures.0.len())]
    Open {
        /// Per-entry failures.
        failures: ListenerFailures,
    },
    /// Entries cannot be added while listeners are open.
    #[error("cannot add listener {spec} while runlevel {level} is listening")]
    ListeningLevel {
        /// Rejected entry.
        spec: ListenerSpec,
        /// Current level.
        level: u8,
    },
}
