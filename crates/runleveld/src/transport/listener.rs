//! Listener implementation shared by public endpoints and the control socket.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use runlevel_config::{ListenerKind, ListenerSpec};
use rustls::{ServerConfig, ServerConnection, StreamOwned};
use tracing::{debug, info, warn};

use super::{ConnectionStream, LISTENER_TARGET, ListenerError, RequestHandler};
use crate::counters::ConnectionAccounting;

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::{FileTypeExt, MetadataExt};
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
#[cfg(unix)]
use std::path::{Path, PathBuf};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Per-listener connection policy.
#[derive(Clone, Default)]
pub(crate) struct ServeOptions {
    pub(crate) accounting: Option<ConnectionAccounting>,
    pub(crate) read_timeout: Option<Duration>,
}

/// A bound socket that has not started accepting yet.
pub(crate) struct SocketListener {
    spec: ListenerSpec,
    socket: BoundSocket,
}

enum BoundSocket {
    Tcp(TcpListener),
    Tls(TcpListener, Arc<ServerConfig>),
    #[cfg(unix)]
    Unix(UnixListener, SocketFile),
}

/// Identity of the socket file this process created, so cleanup never
/// removes a file bound later by another process.
#[cfg(unix)]
struct SocketFile {
    path: PathBuf,
    identity: Option<(u64, u64)>,
}

impl SocketListener {
    pub(crate) fn bind(
        spec: &ListenerSpec,
        tls: Option<Arc<ServerConfig>>,
    ) -> Result<Self, ListenerError> {
        let socket = match spec.kind {
            ListenerKind::Tcp => BoundSocket::Tcp(bind_tcp(&spec.address)?),
            ListenerKind::Tls => {
                let config = tls.ok_or_else(|| ListenerError::TlsNotConfigured {
                    address: spec.address.clone(),
                })?;
                BoundSocket::Tls(bind_tcp(&spec.address)?, config)
            }
            ListenerKind::Unix => bind_unix_socket(&spec.address)?,
        };
        Ok(Self {
            spec: spec.clone(),
            socket,
        })
    }

    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        match &self.socket {
            BoundSocket::Tcp(listener) | BoundSocket::Tls(listener, _) => {
                listener.local_addr().ok()
            }
            #[cfg(unix)]
            BoundSocket::Unix(..) => None,
        }
    }

    pub(crate) fn start(
        self,
        handler: Arc<dyn RequestHandler>,
        options: ServeOptions,
    ) -> Result<ListenerHandle, ListenerError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let nonblocking = match &self.socket {
            BoundSocket::Tcp(listener) | BoundSocket::Tls(listener, _) => {
                listener.set_nonblocking(true)
            }
            #[cfg(unix)]
            BoundSocket::Unix(listener, _) => listener.set_nonblocking(true),
        };
        if let Err(source) = nonblocking {
            return Err(ListenerError::NonBlocking { source });
        }

        let local_addr = self.local_addr();
        let spec = self.spec.clone();
        let shutdown_flag = Arc::clone(&shutdown);
        let handle =
            thread::spawn(move || run_accept_loop(&self, &shutdown_flag, &handler, &options));
        Ok(ListenerHandle {
            spec,
            local_addr,
            shutdown,
            handle: Some(handle),
        })
    }
}

impl Drop for SocketListener {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let BoundSocket::Unix(_, file) = &self.socket {
            file.remove();
        }
    }
}

/// Handle to a running accept loop.
pub(crate) struct ListenerHandle {
    spec: ListenerSpec,
    local_addr: Option<SocketAddr>,
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    pub(crate) const fn spec(&self) -> &ListenerSpec {
        &self.spec
    }

    pub(crate) const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept loop to exit. The listening socket is closed,
    /// and a Unix socket file removed, by the time this returns, since the
    /// loop owns the [`SocketListener`].
    pub(crate) fn join(mut self) -> Result<(), ListenerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ListenerError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn run_accept_loop(
    listener: &SocketListener,
    shutdown: &AtomicBool,
    handler: &Arc<dyn RequestHandler>,
    options: &ServeOptions,
) {
    info!(
        target: LISTENER_TARGET,
        listener = %listener.spec,
        "listener active"
    );
    let mut last_error = None::<io::ErrorKind>;
    while !shutdown.load(Ordering::SeqCst) {
        match accept_connection(listener) {
            Ok(Some(stream)) => {
                last_error = None;
                dispatch(stream, handler, options);
            }
            Ok(None) => thread::sleep(ACCEPT_BACKOFF),
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: LISTENER_TARGET,
                        listener = %listener.spec,
                        error = %error,
                        "accept error"
                    );
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }

    debug!(
        target: LISTENER_TARGET,
        listener = %listener.spec,
        "listener closed"
    );
}

fn dispatch(stream: ConnectionStream, handler: &Arc<dyn RequestHandler>, options: &ServeOptions) {
    if let Err(error) = stream.set_read_timeout(options.read_timeout) {
        warn!(
            target: LISTENER_TARGET,
            error = %error,
            "failed to apply read timeout"
        );
    }
    let handler = Arc::clone(handler);
    let accounting = options.accounting.clone();
    if let Some(accounting) = &accounting {
        accounting.opened();
    }
    thread::spawn(move || {
        handler.handle(stream);
        if let Some(accounting) = accounting {
            accounting.closed();
        }
    });
}

fn accept_connection(listener: &SocketListener) -> io::Result<Option<ConnectionStream>> {
    let accepted = match &listener.socket {
        BoundSocket::Tcp(tcp) => accept_tcp(tcp)?.map(ConnectionStream::Tcp),
        BoundSocket::Tls(tcp, config) => match accept_tcp(tcp)? {
            Some(stream) => {
                let session = ServerConnection::new(Arc::clone(config))
                    .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
                Some(ConnectionStream::Tls(Box::new(StreamOwned::new(
                    session, stream,
                ))))
            }
            None => None,
        },
        #[cfg(unix)]
        BoundSocket::Unix(unix, _) => match unix.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                Some(ConnectionStream::Unix(stream))
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => None,
            Err(error) => return Err(error),
        },
    };
    Ok(accepted)
}

fn accept_tcp(listener: &TcpListener) -> io::Result<Option<std::net::TcpStream>> {
    match listener.accept() {
        Ok((stream, _)) => {
            stream.set_nonblocking(false)?;
            Ok(Some(stream))
        }
        Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(error) => Err(error),
    }
}

fn bind_tcp(address: &str) -> Result<TcpListener, ListenerError> {
    let mut addrs = address
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            address: address.to_owned(),
            source,
        })?;
    let addr = addrs.next().ok_or_else(|| ListenerError::ResolveEmpty {
        address: address.to_owned(),
    })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}

#[cfg(unix)]
fn bind_unix_socket(address: &str) -> Result<BoundSocket, ListenerError> {
    let path = Path::new(address);
    let listener = bind_unix(path)?;
    let identity = fs::metadata(path)
        .ok()
        .map(|metadata| (metadata.dev(), metadata.ino()));
    Ok(BoundSocket::Unix(
        listener,
        SocketFile {
            path: path.to_path_buf(),
            identity,
        },
    ))
}

#[cfg(not(unix))]
fn bind_unix_socket(address: &str) -> Result<BoundSocket, ListenerError> {
    Err(ListenerError::UnsupportedUnix {
        path: address.to_owned(),
    })
}

#[cfg(unix)]
fn bind_unix(path: &Path) -> Result<UnixListener, ListenerError> {
    let display = || path.display().to_string();
    if path.exists() {
        let metadata = fs::symlink_metadata(path).map_err(|source| ListenerError::UnixMetadata {
            path: display(),
            source,
        })?;
        if !metadata.file_type().is_socket() {
            return Err(ListenerError::UnixNotSocket { path: display() });
        }
        match UnixStream::connect(path) {
            Ok(_stream) => return Err(ListenerError::UnixInUse { path: display() }),
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
                ) =>
            {
                fs::remove_file(path).map_err(|source| ListenerError::UnixCleanup {
                    path: display(),
                    source,
                })?;
            }
            Err(source) => {
                return Err(ListenerError::UnixConnect {
                    path: display(),
                    source,
                });
            }
        }
    }

    UnixListener::bind(path).map_err(|source| ListenerError::BindUnix {
        path: display(),
        source,
    })
}

#[cfg(unix)]
impl SocketFile {
    fn remove(&self) {
        let current = fs::symlink_metadata(&self.path)
            .ok()
            .map(|metadata| (metadata.dev(), metadata.ino()));
        if current.is_none() || current != self.identity {
            return;
        }
        if let Err(error) = fs::remove_file(&self.path)
            && error.kind() != io::ErrorKind::NotFound
        {
            warn!(
                target: LISTENER_TARGET,
                error = %error,
                path = %self.path.display(),
                "failed to remove unix socket file"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn counting_handler() -> (Arc<AtomicUsize>, Arc<dyn RequestHandler>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let handler = move |_stream: ConnectionStream| {
            seen.fetch_add(1, Ordering::SeqCst);
        };
        (count, Arc::new(handler))
    }

    fn wait_for_count(count: &AtomicUsize, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if count.load(Ordering::SeqCst) >= expected {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn tcp_listener_accepts_connections() {
        let listener =
            SocketListener::bind(&ListenerSpec::tcp("127.0.0.1:0"), None).expect("bind tcp");
        let addr = listener.local_addr().expect("local address");
        let (count, handler) = counting_handler();
        let handle = listener
            .start(handler, ServeOptions::default())
            .expect("start listener");

        TcpStream::connect(addr).expect("connect first client");
        TcpStream::connect(addr).expect("connect second client");

        assert!(wait_for_count(&count, 2), "expected two connections");
        handle.shutdown();
        handle.join().expect("join listener");
        assert!(
            TcpStream::connect(addr).is_err(),
            "closed listener must refuse connections"
        );
    }

    #[test]
    fn tls_listener_requires_configuration() {
        let error = SocketListener::bind(&ListenerSpec::tls("127.0.0.1:0"), None)
            .err()
            .expect("tls without material must fail");
        assert!(matches!(error, ListenerError::TlsNotConfigured { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn unix_listener_cleans_stale_socket_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("http.sock");
        {
            let _stale = UnixListener::bind(&path).expect("bind stale listener");
        }
        assert!(path.exists(), "stale socket should remain");

        let spec = ListenerSpec::unix(path.to_str().expect("utf8 path"));
        let listener = SocketListener::bind(&spec, None).expect("bind new listener");
        let (count, handler) = counting_handler();
        let handle = listener
            .start(handler, ServeOptions::default())
            .expect("start listener");

        UnixStream::connect(&path).expect("connect unix client");
        assert!(wait_for_count(&count, 1), "expected one connection");

        handle.shutdown();
        handle.join().expect("join listener");
        assert!(!path.exists(), "listener should remove its socket file");
    }

    #[cfg(unix)]
    #[test]
    fn unix_listener_rejects_in_use_socket() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("http.sock");
        let _existing = UnixListener::bind(&path).expect("bind existing listener");

        let spec = ListenerSpec::unix(path.to_str().expect("utf8 path"));
        let error = SocketListener::bind(&spec, None)
            .err()
            .expect("bind should fail");
        assert!(matches!(error, ListenerError::UnixInUse { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn cleanup_leaves_replaced_socket_files_alone() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("ctl.sock");
        let spec = ListenerSpec::unix(path.to_str().expect("utf8 path"));
        let listener = SocketListener::bind(&spec, None).expect("bind listener");
        let (_count, handler) = counting_handler();
        let handle = listener
            .start(handler, ServeOptions::default())
            .expect("start listener");

        fs::remove_file(&path).expect("remove socket file");
        let _replacement = UnixListener::bind(&path).expect("bind replacement");

        handle.shutdown();
        handle.join().expect("join listener");
        assert!(path.exists(), "replacement socket must survive cleanup");
    }
}
