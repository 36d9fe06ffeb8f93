//! Certificate loading for TLS listeners.

use std::sync::Arc;

use rustls::ServerConfig;
use rustls::crypto::ring;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use super::ListenerError;

/// Builds a server configuration from a PEM certificate chain and key.
///
/// Material is read on every call so reopening listeners picks up rotated
/// certificates.
pub(crate) fn load_server_config(
    cert_file: &str,
    key_file: &str,
) -> Result<Arc<ServerConfig>, ListenerError> {
    let material_error = |path: &str, error: &dyn std::fmt::Display| ListenerError::TlsMaterial {
        path: path.to_owned(),
        message: error.to_string(),
    };

    let certs = CertificateDer::pem_file_iter(cert_file)
        .map_err(|error| material_error(cert_file, &error))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| material_error(cert_file, &error))?;
    if certs.is_empty() {
        return Err(material_error(cert_file, &"no certificates found"));
    }
    let key = PrivateKeyDer::from_pem_file(key_file)
        .map_err(|error| material_error(key_file, &error))?;

    let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|source| ListenerError::TlsConfig { source })?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|source| ListenerError::TlsConfig { source })?;
    Ok(Arc::new(config))
}
