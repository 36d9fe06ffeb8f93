//! Shared harness for the supervisor suites.

mod reporter;
mod respawner;

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use runlevel_config::Config;
use rustls::crypto::ring;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use tempfile::TempDir;

pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use respawner::RecordingRespawner;

/// Upper bound for any polled condition.
pub const DEADLINE: Duration = Duration::from_secs(5);

/// Configuration for an isolated supervisor: control socket under `dir`,
/// one ephemeral TCP listener, signals off.
pub fn test_config(dir: &TempDir) -> Config {
    Config {
        name: "runleveld-test".to_owned(),
        addr: "127.0.0.1:0".to_owned(),
        socket: socket_path(dir),
        signals: false,
        ..Config::default()
    }
}

pub fn socket_path(dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().join("control").join("runleveld.sock"))
        .expect("temp dir should be UTF-8")
}

/// Polls `condition` until it holds or [`DEADLINE`] passes.
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + DEADLINE;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Issues a bare HTTP/1.1 GET and returns the whole response.
pub fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).expect("connect to public listener");
    stream
        .set_read_timeout(Some(DEADLINE))
        .expect("set read timeout");
    exchange(&mut stream, addr, path)
}

/// Path of a PEM file under `tests/fixtures/tls`.
pub fn tls_fixture(name: &str) -> String {
    format!("{}/tests/fixtures/tls/{name}", env!("CARGO_MANIFEST_DIR"))
}

/// Issues the same GET over TLS, trusting only the fixture CA.
pub fn https_get(addr: SocketAddr, path: &str) -> String {
    let mut roots = RootCertStore::empty();
    for cert in CertificateDer::pem_file_iter(tls_fixture("ca.pem")).expect("read fixture CA") {
        roots.add(cert.expect("parse fixture CA")).expect("trust fixture CA");
    }
    let config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .expect("protocol versions")
        .with_root_certificates(roots)
        .with_no_client_auth();
    let name = ServerName::try_from("localhost").expect("server name");
    let connection = ClientConnection::new(Arc::new(config), name).expect("client session");
    let socket = TcpStream::connect(addr).expect("connect to tls listener");
    socket
        .set_read_timeout(Some(DEADLINE))
        .expect("set read timeout");
    let mut stream = StreamOwned::new(connection, socket);
    exchange(&mut stream, addr, path)
}

fn exchange(stream: &mut (impl Read + Write), addr: SocketAddr, path: &str) -> String {
    write!(
        stream,
        "GET {path} HTTP/1.1\r\nHost: localhost:{}\r\nConnection: close\r\n\r\n",
        addr.port()
    )
    .expect("send request");
    stream.flush().expect("flush request");
    let mut response = Vec::new();
    match stream.read_to_end(&mut response) {
        Ok(_) => {}
        // The server closes without a TLS close_notify.
        Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => {}
        Err(error) => panic!("read response: {error}"),
    }
    String::from_utf8_lossy(&response).into_owned()
}
