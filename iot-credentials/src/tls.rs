use crate::builder::CredentialStorePasswordPair;
use crate::error::{CredentialError, Result};
use rustls::{ClientConfig, RootCertStore};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Build a root store from a PEM bundle.
pub fn load_root_store(ca_pem: &[u8]) -> Result<RootCertStore> {
    let mut root_store = RootCertStore::empty();
    let mut reader = ca_pem;
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert =
            cert.map_err(|e| CredentialError::Parse(format!("CA bundle parse error: {}", e)))?;
        root_store
            .add(cert)
            .map_err(|e| CredentialError::Tls(e.to_string()))?;
    }

    if root_store.is_empty() {
        return Err(CredentialError::Parse(
            "No certificates found in CA bundle".into(),
        ));
    }
    Ok(root_store)
}

pub fn load_root_store_from_file(path: impl AsRef<Path>) -> Result<RootCertStore> {
    let path = path.as_ref();
    let pem = fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CredentialError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            CredentialError::Io(e)
        }
    })?;
    load_root_store(&pem)
}

/// Mozilla's root program, as shipped by `webpki-roots`.
pub fn webpki_root_store() -> RootCertStore {
    RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    }
}

/// Client configuration authenticating with the pair's certificate and key.
pub fn client_config(
    pair: &CredentialStorePasswordPair,
    roots: RootCertStore,
) -> Result<Arc<ClientConfig>> {
    let (chain, key) = pair.identity()?;

    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_root_certificates(roots)
    .with_client_auth_cert(chain, key)?;

    tracing::debug!(alias = pair.alias(), "TLS client config built");
    Ok(Arc::new(config))
}
