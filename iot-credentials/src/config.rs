//! Client configuration.
//!
//! Settings come from a `.properties` document (either the copy compiled into
//! the crate or a file on disk), loaded once into a [`Properties`] value that
//! the caller owns and passes around. [`ClientSettings`] is the typed view
//! used to locate the credential files.
//!
//! # Environment variables
//!
//! | Variable | Property |
//! |----------|----------|
//! | IOT_CLIENT_ENDPOINT | clientEndpoint |
//! | IOT_CLIENT_ID | clientId |
//! | IOT_CERTIFICATE_FILE | certificateFile |
//! | IOT_PRIVATE_KEY_FILE | privateKeyFile |
//! | IOT_KEY_ALGORITHM | keyAlgorithm |
//! | IOT_ROOT_CA_FILE | rootCaFile |

use crate::builder::{CredentialStorePasswordPair, load_credential_pair_from_files};
use crate::error::{CredentialError, Result};
use crate::key::KeyAlgorithm;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const BUNDLED_PROPERTIES: &str = include_str!("../resources/iot-client.properties");

/// Key/value settings parsed from a `.properties` document.
///
/// Supports `key=value`, `key: value` and `key value` entries, `#` and `!`
/// comments, backslash line continuations and the usual escapes. Trailing
/// whitespace of values is dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

impl Properties {
    pub fn parse(text: &str) -> Self {
        let mut values = BTreeMap::new();
        let mut lines = text.lines();

        while let Some(line) = lines.next() {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                continue;
            }

            let mut logical = trimmed.to_string();
            while ends_with_continuation(&logical) {
                logical.pop();
                match lines.next() {
                    Some(next) => logical.push_str(next.trim_start()),
                    None => break,
                }
            }

            let (key, value) = split_entry(&logical);
            values.insert(unescape(key), unescape(value.trim_end()));
        }

        Self { values }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CredentialError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                CredentialError::Io(e)
            }
        })?;
        Ok(Self::parse(&text))
    }

    /// The sample configuration compiled into the crate.
    pub fn bundled() -> Self {
        Self::parse(BUNDLED_PROPERTIES)
    }

    /// Value for `name`; missing and blank values are both `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => {
                key_end = i;
                break;
            }
            c if c.is_whitespace() => {
                key_end = i;
                break;
            }
            _ => {}
        }
    }

    let key = &line[..key_end];
    let mut rest = line[key_end..].trim_start();
    if let Some(stripped) = rest.strip_prefix(['=', ':']) {
        rest = stripped.trim_start();
    }
    (key, rest)
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Typed client settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientSettings {
    /// Broker host name
    pub client_endpoint: Option<String>,
    /// MQTT client identifier
    pub client_id: Option<String>,
    pub certificate_file: Option<PathBuf>,
    pub private_key_file: Option<PathBuf>,
    /// Overrides key algorithm detection
    pub key_algorithm: Option<KeyAlgorithm>,
    /// Trusted roots; the built-in Mozilla set when absent
    pub root_ca_file: Option<PathBuf>,
}

impl ClientSettings {
    pub fn from_properties(props: &Properties) -> Result<Self> {
        Ok(Self {
            client_endpoint: props.get("clientEndpoint").map(String::from),
            client_id: props.get("clientId").map(String::from),
            certificate_file: props.get("certificateFile").map(PathBuf::from),
            private_key_file: props.get("privateKeyFile").map(PathBuf::from),
            key_algorithm: props
                .get("keyAlgorithm")
                .map(parse_algorithm)
                .transpose()?,
            root_ca_file: props.get("rootCaFile").map(PathBuf::from),
        })
    }

    /// Apply `IOT_*` environment variables on top of these settings.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup. Blank values are ignored.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("IOT_CLIENT_ENDPOINT") {
            self.client_endpoint = Some(v);
        }
        if let Some(v) = get("IOT_CLIENT_ID") {
            self.client_id = Some(v);
        }
        if let Some(v) = get("IOT_CERTIFICATE_FILE") {
            self.certificate_file = Some(PathBuf::from(v));
        }
        if let Some(v) = get("IOT_PRIVATE_KEY_FILE") {
            self.private_key_file = Some(PathBuf::from(v));
        }
        if let Some(v) = get("IOT_KEY_ALGORITHM") {
            self.key_algorithm = Some(parse_algorithm(&v)?);
        }
        if let Some(v) = get("IOT_ROOT_CA_FILE") {
            self.root_ca_file = Some(PathBuf::from(v));
        }
        Ok(self)
    }

    /// Load the configured certificate and key into a credential store.
    pub fn load_credentials(&self) -> Result<CredentialStorePasswordPair> {
        match (&self.certificate_file, &self.private_key_file) {
            (Some(cert), Some(key)) => load_credential_pair_from_files(cert, key, self.key_algorithm),
            _ => {
                tracing::error!("Certificate or private key file missing from configuration");
                Err(CredentialError::Config(
                    "certificateFile and privateKeyFile must both be set".into(),
                ))
            }
        }
    }

    /// Trusted roots for the broker connection.
    pub fn root_store(&self) -> Result<rustls::RootCertStore> {
        match &self.root_ca_file {
            Some(path) => crate::tls::load_root_store_from_file(path),
            None => Ok(crate::tls::webpki_root_store()),
        }
    }
}

fn parse_algorithm(name: &str) -> Result<KeyAlgorithm> {
    name.parse::<KeyAlgorithm>()
        .map_err(|e: CredentialError| CredentialError::Config(e.to_string()))
}
