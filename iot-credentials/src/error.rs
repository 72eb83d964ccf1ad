use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Credential store error: {0}")]
    Store(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("TLS error: {0}")]
    Tls(String),
}

/// Coarse failure category, for callers that branch on the kind of failure
/// rather than on the message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Parse,
    Store,
    Io,
    Config,
    Tls,
}

impl CredentialError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Store(_) => ErrorKind::Store,
            Self::Io(_) => ErrorKind::Io,
            Self::Config(_) => ErrorKind::Config,
            Self::Tls(_) => ErrorKind::Tls,
        }
    }
}

impl From<rustls::Error> for CredentialError {
    fn from(e: rustls::Error) -> Self {
        Self::Tls(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CredentialError>;
