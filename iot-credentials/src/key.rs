use crate::certificate::is_pem;
use crate::error::{CredentialError, Result};
use rsa::pkcs8::PrivateKeyInfo;
use rustls::SignatureAlgorithm;
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer, PrivateSec1KeyDer};
use rustls::sign::SigningKey;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// Algorithm identifiers carried inside PKCS#8 PrivateKeyInfo
const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
const OID_ED25519: &str = "1.3.101.112";

/// Asymmetric key family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    Rsa,
    Ec,
    Ed25519,
}

impl KeyAlgorithm {
    fn from_pkcs8_oid(oid: &str) -> Option<Self> {
        match oid {
            OID_RSA_ENCRYPTION => Some(Self::Rsa),
            OID_EC_PUBLIC_KEY => Some(Self::Ec),
            OID_ED25519 => Some(Self::Ed25519),
            _ => None,
        }
    }

    fn from_signature_algorithm(alg: SignatureAlgorithm) -> Option<Self> {
        match alg {
            SignatureAlgorithm::RSA => Some(Self::Rsa),
            SignatureAlgorithm::ECDSA => Some(Self::Ec),
            SignatureAlgorithm::ED25519 => Some(Self::Ed25519),
            _ => None,
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsa => f.write_str("RSA"),
            Self::Ec => f.write_str("EC"),
            Self::Ed25519 => f.write_str("Ed25519"),
        }
    }
}

impl FromStr for KeyAlgorithm {
    type Err = CredentialError;

    /// Accepts the usual JCA-style names ("RSA", "EC", "ECDSA", "Ed25519", "EdDSA"),
    /// case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RSA" => Ok(Self::Rsa),
            "EC" | "ECDSA" => Ok(Self::Ec),
            "ED25519" | "EDDSA" => Ok(Self::Ed25519),
            other => Err(CredentialError::Parse(format!(
                "Unsupported key algorithm: {}",
                other
            ))),
        }
    }
}

/// Container encoding of the key bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyFormat {
    /// PKCS#8 PrivateKeyInfo, any algorithm
    Pkcs8,
    /// PKCS#1 RSAPrivateKey
    Pkcs1,
    /// SEC1 ECPrivateKey
    Sec1,
}

impl KeyFormat {
    fn implied_algorithm(self) -> Option<KeyAlgorithm> {
        match self {
            Self::Pkcs8 => None,
            Self::Pkcs1 => Some(KeyAlgorithm::Rsa),
            Self::Sec1 => Some(KeyAlgorithm::Ec),
        }
    }

    fn from_pem_tag(tag: &str) -> Option<Self> {
        match tag {
            "PRIVATE KEY" => Some(Self::Pkcs8),
            "RSA PRIVATE KEY" => Some(Self::Pkcs1),
            "EC PRIVATE KEY" => Some(Self::Sec1),
            _ => None,
        }
    }
}

/// A decoded private key.
///
/// The key has been loaded through the TLS key provider once, so anything
/// held here is usable for client authentication.
#[derive(Clone)]
pub struct PrivateKey {
    algorithm: KeyAlgorithm,
    format: KeyFormat,
    der: Vec<u8>,
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("algorithm", &self.algorithm)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl PrivateKey {
    /// Decode `der` as `format`, checking it against the optional algorithm hint.
    pub(crate) fn decode(
        format: KeyFormat,
        der: Vec<u8>,
        hint: Option<KeyAlgorithm>,
    ) -> Result<Self> {
        let declared = match format {
            KeyFormat::Pkcs8 => {
                let info = PrivateKeyInfo::try_from(der.as_slice())
                    .map_err(|e| CredentialError::Parse(format!("PKCS#8 parse error: {}", e)))?;
                KeyAlgorithm::from_pkcs8_oid(&info.algorithm.oid.to_string())
            }
            other => other.implied_algorithm(),
        };

        if let (Some(hint), Some(declared)) = (hint, declared)
            && hint != declared
        {
            return Err(CredentialError::Parse(format!(
                "Key is {} but {} was requested",
                declared, hint
            )));
        }

        let signing_key = load_signing_key(&key_der(format, der.clone()))?;
        let algorithm = KeyAlgorithm::from_signature_algorithm(signing_key.algorithm())
            .ok_or_else(|| {
                CredentialError::Parse(format!(
                    "Unsupported key algorithm: {:?}",
                    signing_key.algorithm()
                ))
            })?;

        if let Some(hint) = hint
            && hint != algorithm
        {
            return Err(CredentialError::Parse(format!(
                "Key is {} but {} was requested",
                algorithm, hint
            )));
        }

        Ok(Self {
            algorithm,
            format,
            der,
        })
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn format(&self) -> KeyFormat {
        self.format
    }

    /// Key in the form rustls expects.
    pub fn to_der(&self) -> PrivateKeyDer<'static> {
        key_der(self.format, self.der.clone())
    }

    pub(crate) fn der_bytes(&self) -> &[u8] {
        &self.der
    }

    pub fn signing_key(&self) -> Result<Arc<dyn SigningKey>> {
        load_signing_key(&self.to_der())
    }

    /// DER SubjectPublicKeyInfo of the public half, when the key provider
    /// can produce it.
    pub fn public_key_info(&self) -> Option<Vec<u8>> {
        let signing_key = self.signing_key().ok()?;
        signing_key.public_key().map(|spki| spki.as_ref().to_vec())
    }
}

fn key_der(format: KeyFormat, der: Vec<u8>) -> PrivateKeyDer<'static> {
    match format {
        KeyFormat::Pkcs8 => PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(der)),
        KeyFormat::Pkcs1 => PrivateKeyDer::Pkcs1(PrivatePkcs1KeyDer::from(der)),
        KeyFormat::Sec1 => PrivateKeyDer::Sec1(PrivateSec1KeyDer::from(der)),
    }
}

fn load_signing_key(der: &PrivateKeyDer<'_>) -> Result<Arc<dyn SigningKey>> {
    rustls::crypto::ring::sign::any_supported_type(der)
        .map_err(|e| CredentialError::Parse(format!("Key rejected by provider: {}", e)))
}

/// Parse a private key from PEM or DER bytes.
///
/// PEM blocks name their container. Raw DER is tried as PKCS#8 first, which
/// carries its own algorithm identifier; otherwise RSA (PKCS#1) is tried
/// before EC (SEC1), narrowed by `hint` when one is given.
///
/// Keys are decoded by the ring-backed TLS key provider, so only what it can
/// sign with is accepted: RSA keys of at least 2048 bits, ECDSA on P-256 or
/// P-384, and Ed25519. Anything else fails with [`CredentialError::Parse`].
pub fn parse_private_key(bytes: &[u8], hint: Option<KeyAlgorithm>) -> Result<PrivateKey> {
    if is_pem(bytes) {
        let (format, der) = pem_key_block(bytes)?;
        return PrivateKey::decode(format, der, hint);
    }

    if PrivateKeyInfo::try_from(bytes).is_ok() {
        return PrivateKey::decode(KeyFormat::Pkcs8, bytes.to_vec(), hint);
    }

    let candidates: &[KeyFormat] = match hint {
        None => &[KeyFormat::Pkcs1, KeyFormat::Sec1],
        Some(KeyAlgorithm::Rsa) => &[KeyFormat::Pkcs1],
        Some(KeyAlgorithm::Ec) => &[KeyFormat::Sec1],
        Some(KeyAlgorithm::Ed25519) => &[],
    };

    let mut last_err = None;
    for &format in candidates {
        match PrivateKey::decode(format, bytes.to_vec(), hint) {
            Ok(key) => return Ok(key),
            Err(e) => {
                tracing::debug!(?format, error = %e, "Key format attempt failed");
                last_err = Some(e);
            }
        }
    }

    Err(CredentialError::Parse(match last_err {
        Some(CredentialError::Parse(msg)) => {
            format!("No supported algorithm could decode the key: {}", msg)
        }
        Some(e) => format!("No supported algorithm could decode the key: {}", e),
        None => "No supported algorithm could decode the key".into(),
    }))
}

fn pem_key_block(bytes: &[u8]) -> Result<(KeyFormat, Vec<u8>)> {
    let pems = pem::parse_many(bytes)
        .map_err(|e| CredentialError::Parse(format!("PEM parse error: {}", e)))?;

    for p in pems {
        if p.tag() == "ENCRYPTED PRIVATE KEY" {
            return Err(CredentialError::Parse(
                "Encrypted private keys are not supported".into(),
            ));
        }
        if let Some(format) = KeyFormat::from_pem_tag(p.tag()) {
            return Ok((format, p.into_contents()));
        }
    }

    Err(CredentialError::Parse(
        "No supported private key found in PEM".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use rcgen::KeyPair;

    fn sec1_from_pkcs8(pkcs8: &[u8]) -> Vec<u8> {
        PrivateKeyInfo::try_from(pkcs8)
            .unwrap()
            .private_key
            .to_vec()
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!("RSA".parse::<KeyAlgorithm>().unwrap(), KeyAlgorithm::Rsa);
        assert_eq!("ec".parse::<KeyAlgorithm>().unwrap(), KeyAlgorithm::Ec);
        assert_eq!("ECDSA".parse::<KeyAlgorithm>().unwrap(), KeyAlgorithm::Ec);
        assert_eq!(
            "Ed25519".parse::<KeyAlgorithm>().unwrap(),
            KeyAlgorithm::Ed25519
        );
        assert!("DSA".parse::<KeyAlgorithm>().is_err());
        assert_eq!(KeyAlgorithm::Ec.to_string(), "EC");
    }

    #[test]
    fn test_ec_pkcs8_pem_detected_without_hint() {
        let kp = KeyPair::generate().unwrap();
        let key = parse_private_key(kp.serialize_pem().as_bytes(), None).unwrap();

        assert_eq!(key.algorithm(), KeyAlgorithm::Ec);
        assert_eq!(key.format(), KeyFormat::Pkcs8);
    }

    #[test]
    fn test_ec_pkcs8_der_detected_without_hint() {
        let kp = KeyPair::generate().unwrap();
        let key = parse_private_key(&kp.serialize_der(), None).unwrap();

        assert_eq!(key.algorithm(), KeyAlgorithm::Ec);
        assert_eq!(key.format(), KeyFormat::Pkcs8);
    }

    #[test]
    fn test_ec_key_with_rsa_hint_rejected() {
        let kp = KeyPair::generate().unwrap();
        let err = parse_private_key(kp.serialize_pem().as_bytes(), Some(KeyAlgorithm::Rsa))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_raw_sec1_falls_back_to_ec() {
        let kp = KeyPair::generate().unwrap();
        let sec1 = sec1_from_pkcs8(&kp.serialize_der());

        let key = parse_private_key(&sec1, None).unwrap();
        assert_eq!(key.algorithm(), KeyAlgorithm::Ec);
        assert_eq!(key.format(), KeyFormat::Sec1);

        // RSA-only hint leaves nothing to try
        assert!(parse_private_key(&sec1, Some(KeyAlgorithm::Rsa)).is_err());
    }

    #[test]
    fn test_sec1_pem_block() {
        let kp = KeyPair::generate().unwrap();
        let sec1 = sec1_from_pkcs8(&kp.serialize_der());
        let pem = pem::encode(&pem::Pem::new("EC PRIVATE KEY", sec1));

        let key = parse_private_key(pem.as_bytes(), Some(KeyAlgorithm::Ec)).unwrap();
        assert_eq!(key.format(), KeyFormat::Sec1);
    }

    #[test]
    fn test_ed25519_pkcs8() {
        let kp = KeyPair::generate_for(&rcgen::PKCS_ED25519).unwrap();
        let key = parse_private_key(kp.serialize_pem().as_bytes(), None).unwrap();

        assert_eq!(key.algorithm(), KeyAlgorithm::Ed25519);
    }

    #[test]
    fn test_pem_with_bag_attributes_header() {
        let kp = KeyPair::generate().unwrap();
        let exported = format!(
            "Bag Attributes\n    friendlyName: device\n{}",
            kp.serialize_pem()
        );

        let key = parse_private_key(exported.as_bytes(), None).unwrap();
        assert_eq!(key.algorithm(), KeyAlgorithm::Ec);
        assert_eq!(key.der_bytes(), kp.serialize_der().as_slice());
    }

    #[test]
    fn test_garbage_rejected() {
        let err = parse_private_key(b"definitely not a key", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.to_string().matches("Parse error").count(), 1);
    }

    #[test]
    fn test_encrypted_pem_rejected() {
        let pem = pem::encode(&pem::Pem::new("ENCRYPTED PRIVATE KEY", vec![0x30, 0x00]));
        let err = parse_private_key(pem.as_bytes(), None).unwrap_err();

        assert!(err.to_string().contains("Encrypted"));
    }

    #[test]
    fn test_debug_hides_key_material() {
        let kp = KeyPair::generate().unwrap();
        let key = parse_private_key(&kp.serialize_der(), None).unwrap();

        let debug = format!("{:?}", key);
        assert!(debug.contains("Ec"));
        assert!(!debug.contains("der"));
    }
}
