use crate::certificate::{Certificate, parse_certificate};
use crate::error::{CredentialError, Result};
use crate::key::{KeyAlgorithm, PrivateKey, parse_private_key};
use crate::password::KeyPassword;
use crate::store::CredentialStore;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use x509_parser::prelude::FromDer;
use x509_parser::x509::SubjectPublicKeyInfo;

/// Alias under which the certificate/key pair is stored.
pub const DEFAULT_ALIAS: &str = "alias";

/// A credential store holding exactly one certificate/key pair, plus the
/// password that unseals the key.
#[derive(Debug)]
pub struct CredentialStorePasswordPair {
    store: CredentialStore,
    password: KeyPassword,
    alias: String,
}

impl CredentialStorePasswordPair {
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn password(&self) -> &KeyPassword {
        &self.password
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn into_parts(self) -> (CredentialStore, KeyPassword) {
        (self.store, self.password)
    }

    pub fn certificate(&self) -> Option<&Certificate> {
        self.store.certificate(&self.alias)
    }

    pub fn private_key(&self) -> Result<PrivateKey> {
        self.store.private_key(&self.alias, &self.password)
    }

    /// Certificate chain and unsealed key, ready for
    /// `ClientConfig::with_client_auth_cert`.
    pub fn identity(&self) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
        let chain = self
            .store
            .certificate_chain(&self.alias)
            .ok_or_else(|| CredentialError::Store(format!("Alias '{}' missing", self.alias)))?
            .iter()
            .map(|c| c.der().clone())
            .collect();
        let key = self.private_key()?;
        Ok((chain, key.to_der()))
    }
}

/// Assembles a [`CredentialStorePasswordPair`] from a certificate and key.
///
/// By default the key is checked against the certificate's public key before
/// anything is stored.
#[derive(Debug, Clone)]
pub struct CredentialStoreBuilder {
    alias: String,
    verify_key_match: bool,
}

impl Default for CredentialStoreBuilder {
    fn default() -> Self {
        Self {
            alias: DEFAULT_ALIAS.to_string(),
            verify_key_match: true,
        }
    }
}

impl CredentialStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Disable to accept a key that does not belong to the certificate.
    pub fn verify_key_match(mut self, verify: bool) -> Self {
        self.verify_key_match = verify;
        self
    }

    pub fn build(
        &self,
        certificate: Certificate,
        key: &PrivateKey,
    ) -> Result<CredentialStorePasswordPair> {
        self.assemble(certificate, key).map_err(|e| {
            error!(alias = %self.alias, error = %e, "Failed to create credential store");
            match e {
                CredentialError::Store(_) => e,
                other => CredentialError::Store(other.to_string()),
            }
        })
    }

    fn assemble(
        &self,
        certificate: Certificate,
        key: &PrivateKey,
    ) -> Result<CredentialStorePasswordPair> {
        if self.verify_key_match {
            check_key_matches(&certificate, key)?;
        }

        let password = KeyPassword::generate();
        let mut store = CredentialStore::new();
        store.set_certificate_entry(self.alias.as_str(), certificate.clone())?;
        store.set_key_entry(self.alias.as_str(), key, &password, vec![certificate])?;

        Ok(CredentialStorePasswordPair {
            store,
            password,
            alias: self.alias.clone(),
        })
    }

    /// Read, parse and assemble. Stops at the first failing step, so a
    /// missing certificate means the key file is never opened.
    pub fn load_from_files(
        &self,
        certificate_path: impl AsRef<Path>,
        private_key_path: impl AsRef<Path>,
        hint: Option<KeyAlgorithm>,
    ) -> Result<CredentialStorePasswordPair> {
        let certificate_path = certificate_path.as_ref();
        let private_key_path = private_key_path.as_ref();

        let cert_bytes = read_input(certificate_path, "Certificate")?;
        let certificate = parse_certificate(&cert_bytes).inspect_err(|e| {
            error!(path = %certificate_path.display(), error = %e, "Failed to load certificate file");
        })?;
        debug!(subject = certificate.subject(), "Certificate loaded");

        let key_bytes = read_input(private_key_path, "Private key")?;
        let key = parse_private_key(&key_bytes, hint).inspect_err(|e| {
            error!(path = %private_key_path.display(), error = %e, "Failed to load private key from file");
        })?;
        debug!(algorithm = %key.algorithm(), format = ?key.format(), "Private key loaded");

        let pair = self.build(certificate, &key)?;
        info!(alias = pair.alias(), "Credential store ready");
        Ok(pair)
    }
}

fn read_input(path: &Path, what: &str) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            error!(path = %path.display(), "{} file not found", what);
            CredentialError::NotFound {
                path: PathBuf::from(path),
            }
        } else {
            error!(path = %path.display(), error = %e, "Failed to read {} file", what);
            CredentialError::Io(e)
        }
    })
}

fn check_key_matches(certificate: &Certificate, key: &PrivateKey) -> Result<()> {
    let Some(key_spki) = key.public_key_info() else {
        debug!(algorithm = %key.algorithm(), "Key provider exposes no public key, skipping match check");
        return Ok(());
    };

    let cert_bits = public_key_bits(certificate.subject_public_key_info());
    let key_bits = public_key_bits(&key_spki);

    match (cert_bits, key_bits) {
        (Some(c), Some(k)) if c == k => Ok(()),
        (Some(_), Some(_)) => Err(CredentialError::Store(
            "Private key does not match the certificate public key".into(),
        )),
        _ => Err(CredentialError::Store(
            "Unable to decode public key for match check".into(),
        )),
    }
}

fn public_key_bits(spki_der: &[u8]) -> Option<Vec<u8>> {
    let (_, spki) = SubjectPublicKeyInfo::from_der(spki_der).ok()?;
    Some(spki.subject_public_key.data.to_vec())
}

/// Build a credential store with the default alias and key/cert match check.
pub fn build_credential_store(
    certificate: Certificate,
    key: &PrivateKey,
) -> Result<CredentialStorePasswordPair> {
    CredentialStoreBuilder::new().build(certificate, key)
}

/// Load a certificate and private key from disk into a fresh credential store.
pub fn load_credential_pair_from_files(
    certificate_path: impl AsRef<Path>,
    private_key_path: impl AsRef<Path>,
    hint: Option<KeyAlgorithm>,
) -> Result<CredentialStorePasswordPair> {
    CredentialStoreBuilder::new().load_from_files(certificate_path, private_key_path, hint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use rcgen::{CertificateParams, KeyPair};

    fn generate() -> (Certificate, PrivateKey) {
        let kp = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec!["thing.local".into()])
            .unwrap()
            .self_signed(&kp)
            .unwrap();
        (
            parse_certificate(cert.der()).unwrap(),
            parse_private_key(&kp.serialize_der(), None).unwrap(),
        )
    }

    #[test]
    fn test_build_single_alias() {
        let (cert, key) = generate();
        let pair = build_credential_store(cert.clone(), &key).unwrap();

        let aliases: Vec<_> = pair.store().aliases().collect();
        assert_eq!(aliases, vec![DEFAULT_ALIAS]);
        assert!(pair.store().is_key_entry(DEFAULT_ALIAS));
        assert_eq!(pair.certificate(), Some(&cert));
        assert_eq!(pair.private_key().unwrap().algorithm(), KeyAlgorithm::Ec);
    }

    #[test]
    fn test_mismatched_key_rejected() {
        let (cert, _) = generate();
        let (_, other_key) = generate();

        let err = build_credential_store(cert, &other_key).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Store);
    }

    #[test]
    fn test_mismatched_key_accepted_when_permissive() {
        let (cert, _) = generate();
        let (_, other_key) = generate();

        let pair = CredentialStoreBuilder::new()
            .verify_key_match(false)
            .build(cert, &other_key)
            .unwrap();
        assert_eq!(pair.store().len(), 1);
    }

    #[test]
    fn test_custom_alias() {
        let (cert, key) = generate();
        let pair = CredentialStoreBuilder::new()
            .alias("device-cert")
            .build(cert, &key)
            .unwrap();

        assert_eq!(pair.alias(), "device-cert");
        assert!(pair.store().contains_alias("device-cert"));
        assert!(!pair.store().contains_alias(DEFAULT_ALIAS));
    }

    #[test]
    fn test_identity_chain() {
        let (cert, key) = generate();
        let pair = build_credential_store(cert.clone(), &key).unwrap();

        let (chain, key_der) = pair.identity().unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].as_ref(), cert.as_der());
        assert!(matches!(key_der, PrivateKeyDer::Pkcs8(_)));
    }

    #[test]
    fn test_passwords_differ_per_build() {
        let (cert, key) = generate();
        let a = build_credential_store(cert.clone(), &key).unwrap();
        let b = build_credential_store(cert, &key).unwrap();

        assert_ne!(a.password(), b.password());
    }
}
