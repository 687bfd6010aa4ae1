//! TLS server configuration from PEM files

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use aperture_config::TlsOptions;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use rustls_pemfile::{certs, private_key};

use crate::endpoints::Protocols;
use crate::ApiError;

/// Build the server configuration for one listener
///
/// When `require_client_certificate` is set, handshakes without a certificate chaining
/// to `tls.client_ca_path` are refused by the TLS layer itself.
///
/// # Errors
///
/// Returns [`ApiError::TlsMaterial`] when a file is missing or empty and
/// [`ApiError::Tls`] when rustls rejects the material.
pub fn server_config(
    tls: &TlsOptions,
    require_client_certificate: bool,
    protocols: Protocols,
) -> Result<Arc<ServerConfig>, ApiError> {
    let certificate_path = tls
        .certificate_path
        .as_deref()
        .ok_or_else(|| ApiError::Tls("tls.certificate_path is not configured".to_string()))?;
    let key_path = tls
        .key_path
        .as_deref()
        .ok_or_else(|| ApiError::Tls("tls.key_path is not configured".to_string()))?;

    let chain = load_cert_chain(certificate_path)?;
    let key = load_private_key(key_path)?;
    let builder = ServerConfig::builder();

    let mut config = if require_client_certificate {
        let ca_path = tls
            .client_ca_path
            .as_deref()
            .ok_or_else(|| ApiError::Tls("tls.client_ca_path is not configured".to_string()))?;
        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(load_cert_chain(ca_path)?);
        if ignored > 0 {
            tracing::warn!(
                path = %ca_path.display(),
                added = added,
                ignored = ignored,
                "Some client CA certificates could not be parsed"
            );
        }

        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| ApiError::Tls(e.to_string()))?;
        builder
            .with_client_cert_verifier(verifier)
            .with_single_cert(chain, key)
            .map_err(|e| ApiError::Tls(e.to_string()))?
    } else {
        builder
            .with_no_client_auth()
            .with_single_cert(chain, key)
            .map_err(|e| ApiError::Tls(e.to_string()))?
    };

    config.alpn_protocols = protocols.alpn();
    Ok(Arc::new(config))
}

fn load_cert_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>, ApiError> {
    let mut reader = BufReader::new(File::open(path).map_err(|e| material_error(path, e))?);
    let chain = certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| material_error(path, e))?;
    if chain.is_empty() {
        return Err(ApiError::TlsMaterial {
            path: path.display().to_string(),
            reason: "no certificates found".to_string(),
        });
    }
    Ok(chain)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ApiError> {
    let mut reader = BufReader::new(File::open(path).map_err(|e| material_error(path, e))?);
    private_key(&mut reader)
        .map_err(|e| material_error(path, e))?
        .ok_or_else(|| ApiError::TlsMaterial {
            path: path.display().to_string(),
            reason: "no private key found".to_string(),
        })
}

fn material_error(path: &Path, e: std::io::Error) -> ApiError {
    ApiError::TlsMaterial {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}
