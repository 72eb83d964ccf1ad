//! In-memory credential store.
//!
//! Entries are indexed by alias. An entry is either a trusted certificate on
//! its own, or a private key with the certificate chain it authenticates. Key
//! material is sealed under a per-entry password and only leaves the store
//! through [`CredentialStore::private_key`].

use crate::certificate::Certificate;
use crate::error::{CredentialError, Result};
use crate::key::{KeyAlgorithm, KeyFormat, PrivateKey};
use crate::password::KeyPassword;
use argon2::{Algorithm, Argon2, Params, Version};
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use std::collections::BTreeMap;
use std::fmt;

const SALT_LEN: usize = 16;
const KDF_MEMORY_KIB: u32 = 8 * 1024;
const KDF_ITERATIONS: u32 = 2;
const KDF_LANES: u32 = 1;

struct SealedKey {
    algorithm: KeyAlgorithm,
    format: KeyFormat,
    salt: [u8; SALT_LEN],
    nonce: [u8; aead::NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl fmt::Debug for SealedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedKey")
            .field("algorithm", &self.algorithm)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl SealedKey {
    /// Seal the key DER with AES-256-GCM under an Argon2id-derived key.
    /// The alias is bound in as associated data.
    fn seal(alias: &str, key: &PrivateKey, password: &KeyPassword) -> Result<Self> {
        let rng = SystemRandom::new();
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; aead::NONCE_LEN];
        rng.fill(&mut salt)
            .map_err(|e| CredentialError::Store(format!("RNG failure: {}", e)))?;
        rng.fill(&mut nonce)
            .map_err(|e| CredentialError::Store(format!("RNG failure: {}", e)))?;

        let sealing_key = derive_key(password, &salt)?;
        let mut ciphertext = key.der_bytes().to_vec();
        sealing_key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce),
                Aad::from(alias.as_bytes()),
                &mut ciphertext,
            )
            .map_err(|e| CredentialError::Store(format!("Failed to seal key entry: {}", e)))?;

        Ok(Self {
            algorithm: key.algorithm(),
            format: key.format(),
            salt,
            nonce,
            ciphertext,
        })
    }

    fn open(&self, alias: &str, password: &KeyPassword) -> Result<PrivateKey> {
        let opening_key = derive_key(password, &self.salt)?;
        let mut buf = self.ciphertext.clone();
        let plaintext = opening_key
            .open_in_place(
                Nonce::assume_unique_for_key(self.nonce),
                Aad::from(alias.as_bytes()),
                &mut buf,
            )
            .map_err(|_| {
                CredentialError::Store(format!("Wrong password for key entry '{}'", alias))
            })?;

        PrivateKey::decode(self.format, plaintext.to_vec(), Some(self.algorithm))
    }
}

fn derive_key(password: &KeyPassword, salt: &[u8]) -> Result<LessSafeKey> {
    let params = Params::new(KDF_MEMORY_KIB, KDF_ITERATIONS, KDF_LANES, Some(32))
        .map_err(|e| CredentialError::Store(format!("KDF parameters rejected: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key_bytes = [0u8; 32];
    argon2
        .hash_password_into(password.as_str().as_bytes(), salt, &mut key_bytes)
        .map_err(|e| CredentialError::Store(format!("Key derivation failed: {}", e)))?;

    let unbound = UnboundKey::new(&aead::AES_256_GCM, &key_bytes)
        .map_err(|e| CredentialError::Store(format!("Invalid sealing key: {}", e)))?;
    Ok(LessSafeKey::new(unbound))
}

#[derive(Debug)]
struct Entry {
    /// chain[0] is the certificate stored under the alias
    chain: Vec<Certificate>,
    key: Option<SealedKey>,
}

#[derive(Default)]
pub struct CredentialStore {
    entries: BTreeMap<String, Entry>,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("aliases", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a trusted certificate under `alias`.
    ///
    /// Fails if `alias` already holds a key entry.
    pub fn set_certificate_entry(
        &mut self,
        alias: impl Into<String>,
        certificate: Certificate,
    ) -> Result<()> {
        let alias = alias.into();
        if self.is_key_entry(&alias) {
            return Err(CredentialError::Store(format!(
                "Alias '{}' already holds a key entry",
                alias
            )));
        }
        self.entries.insert(
            alias,
            Entry {
                chain: vec![certificate],
                key: None,
            },
        );
        Ok(())
    }

    /// Store `key` under `alias`, sealed with `password`.
    ///
    /// `chain` starts with the certificate matching the key. Any previous
    /// entry for the alias is replaced.
    pub fn set_key_entry(
        &mut self,
        alias: impl Into<String>,
        key: &PrivateKey,
        password: &KeyPassword,
        chain: Vec<Certificate>,
    ) -> Result<()> {
        let alias = alias.into();
        if chain.is_empty() {
            return Err(CredentialError::Store(format!(
                "Key entry '{}' needs a certificate chain",
                alias
            )));
        }

        let sealed = SealedKey::seal(&alias, key, password)?;
        tracing::debug!(alias = %alias, algorithm = %key.algorithm(), chain_len = chain.len(), "Key entry stored");
        self.entries.insert(
            alias,
            Entry {
                chain,
                key: Some(sealed),
            },
        );
        Ok(())
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_alias(&self, alias: &str) -> bool {
        self.entries.contains_key(alias)
    }

    pub fn certificate(&self, alias: &str) -> Option<&Certificate> {
        self.entries.get(alias).and_then(|e| e.chain.first())
    }

    pub fn certificate_chain(&self, alias: &str) -> Option<&[Certificate]> {
        self.entries.get(alias).map(|e| e.chain.as_slice())
    }

    pub fn is_key_entry(&self, alias: &str) -> bool {
        self.entries.get(alias).is_some_and(|e| e.key.is_some())
    }

    pub fn is_certificate_entry(&self, alias: &str) -> bool {
        self.entries.get(alias).is_some_and(|e| e.key.is_none())
    }

    pub fn key_algorithm(&self, alias: &str) -> Option<KeyAlgorithm> {
        self.entries
            .get(alias)
            .and_then(|e| e.key.as_ref())
            .map(|k| k.algorithm)
    }

    /// Unseal the key stored under `alias`.
    pub fn private_key(&self, alias: &str, password: &KeyPassword) -> Result<PrivateKey> {
        let sealed = self
            .entries
            .get(alias)
            .and_then(|e| e.key.as_ref())
            .ok_or_else(|| CredentialError::Store(format!("No key entry for alias '{}'", alias)))?;
        sealed.open(alias, password)
    }

    /// Returns whether an entry was removed.
    pub fn delete_entry(&mut self, alias: &str) -> bool {
        self.entries.remove(alias).is_some()
    }
}
