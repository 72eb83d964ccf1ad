mod builder;
mod certificate;
pub mod config;
mod error;
mod key;
mod password;
mod store;
pub mod tls;

pub use builder::{
    CredentialStoreBuilder, CredentialStorePasswordPair, DEFAULT_ALIAS, build_credential_store,
    load_credential_pair_from_files,
};
pub use certificate::{Certificate, parse_certificate};
pub use config::{ClientSettings, Properties};
pub use error::{CredentialError, ErrorKind, Result};
pub use key::{KeyAlgorithm, KeyFormat, PrivateKey, parse_private_key};
pub use password::KeyPassword;
pub use store::CredentialStore;
pub use tls::client_config;
