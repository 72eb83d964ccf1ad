use crate::error::{CredentialError, Result};
use rustls::pki_types::CertificateDer;
use sha2::{Digest, Sha256};

const PEM_CERTIFICATE_TAGS: &[&str] = &["CERTIFICATE", "X509 CERTIFICATE"];

/// A parsed X.509 certificate.
///
/// Holds the DER encoding together with the fields callers usually want
/// to log or compare. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct Certificate {
    der: CertificateDer<'static>,
    subject: String,
    issuer: String,
    common_name: Option<String>,
    serial_number: String,
    not_after: time::OffsetDateTime,
    fingerprint_sha256: String,
    subject_public_key_info: Vec<u8>,
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl Certificate {
    /// Parse a DER encoded certificate. Trailing bytes after the
    /// certificate are rejected.
    pub fn from_der(der: impl Into<Vec<u8>>) -> Result<Self> {
        let der: Vec<u8> = der.into();

        let (subject, issuer, common_name, serial_number, not_after, spki) = {
            let (rest, x509) = x509_parser::parse_x509_certificate(&der)
                .map_err(|e| CredentialError::Parse(format!("X509 parse error: {}", e)))?;
            if !rest.is_empty() {
                return Err(CredentialError::Parse(format!(
                    "{} trailing bytes after certificate",
                    rest.len()
                )));
            }

            let common_name = x509
                .subject()
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .map(String::from);

            (
                x509.subject().to_string(),
                x509.issuer().to_string(),
                common_name,
                x509.tbs_certificate.serial.to_str_radix(16),
                x509.validity().not_after.to_datetime(),
                x509.public_key().raw.to_vec(),
            )
        };

        let fingerprint_sha256 = hex::encode(Sha256::digest(&der));

        Ok(Self {
            der: CertificateDer::from(der),
            subject,
            issuer,
            common_name,
            serial_number,
            not_after,
            fingerprint_sha256,
            subject_public_key_info: spki,
        })
    }

    /// Parse the first certificate block of a PEM document.
    pub fn from_pem(pem_bytes: &[u8]) -> Result<Self> {
        let pems = pem::parse_many(pem_bytes)
            .map_err(|e| CredentialError::Parse(format!("PEM parse error: {}", e)))?;

        let block = pems
            .into_iter()
            .find(|p| PEM_CERTIFICATE_TAGS.contains(&p.tag()))
            .ok_or_else(|| CredentialError::Parse("No certificate found in PEM".into()))?;

        Self::from_der(block.into_contents())
    }

    pub fn der(&self) -> &CertificateDer<'static> {
        &self.der
    }

    pub fn as_der(&self) -> &[u8] {
        self.der.as_ref()
    }

    /// Subject distinguished name, RFC 4514 style.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }

    /// Serial number (hex)
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub fn not_after(&self) -> time::OffsetDateTime {
        self.not_after
    }

    pub fn fingerprint_sha256(&self) -> &str {
        &self.fingerprint_sha256
    }

    /// Raw DER of the SubjectPublicKeyInfo.
    pub fn subject_public_key_info(&self) -> &[u8] {
        &self.subject_public_key_info
    }

    pub fn to_pem(&self) -> String {
        pem::encode(&pem::Pem::new("CERTIFICATE", self.as_der().to_vec()))
    }
}

/// Parse a certificate from PEM or DER bytes.
pub fn parse_certificate(bytes: &[u8]) -> Result<Certificate> {
    if is_pem(bytes) {
        Certificate::from_pem(bytes)
    } else {
        Certificate::from_der(bytes)
    }
}

/// PEM armour may be preceded by free text such as OpenSSL's
/// `Bag Attributes` header.
pub(crate) fn is_pem(bytes: &[u8]) -> bool {
    const PEM_BEGIN: &[u8] = b"-----BEGIN";
    bytes.windows(PEM_BEGIN.len()).any(|w| w == PEM_BEGIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

    fn self_signed(cn: &str) -> (String, Vec<u8>) {
        let key_pair = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec![format!("{}.local", cn)]).unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, cn);
        params.distinguished_name = dn;
        let cert = params.self_signed(&key_pair).unwrap();
        (cert.pem(), cert.der().to_vec())
    }

    #[test]
    fn test_parse_pem_and_der_agree() {
        let (pem, der) = self_signed("thing-001");

        let from_pem = parse_certificate(pem.as_bytes()).unwrap();
        let from_der = parse_certificate(&der).unwrap();

        assert_eq!(from_pem, from_der);
        assert_eq!(from_pem.as_der(), der.as_slice());
        assert_eq!(from_pem.common_name(), Some("thing-001"));
        assert!(from_pem.subject().contains("thing-001"));
        assert_eq!(from_pem.fingerprint_sha256().len(), 64);
    }

    #[test]
    fn test_parse_pem_with_leading_whitespace() {
        let (pem, _) = self_signed("thing-002");
        let padded = format!("\n\n  {}", pem);

        let cert = parse_certificate(padded.as_bytes()).unwrap();
        assert_eq!(cert.common_name(), Some("thing-002"));
    }

    #[test]
    fn test_parse_pem_with_bag_attributes_header() {
        let (pem, der) = self_signed("thing-006");
        let exported = format!("Bag Attributes\n    friendlyName: device\n{}", pem);

        let cert = parse_certificate(exported.as_bytes()).unwrap();
        assert_eq!(cert.as_der(), der.as_slice());
        assert_eq!(cert.common_name(), Some("thing-006"));
    }

    #[test]
    fn test_truncated_der_rejected() {
        let (_, der) = self_signed("thing-003");
        let truncated = &der[..der.len() / 2];

        let err = parse_certificate(truncated).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Parse);
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let (_, mut der) = self_signed("thing-004");
        der.extend_from_slice(b"garbage");

        assert!(parse_certificate(&der).is_err());
    }

    #[test]
    fn test_pem_without_certificate_block() {
        let pem = "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n";
        let err = parse_certificate(pem.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Parse);
    }

    #[test]
    fn test_to_pem_round_trips() {
        let (pem, _) = self_signed("thing-005");
        let cert = parse_certificate(pem.as_bytes()).unwrap();

        let again = parse_certificate(cert.to_pem().as_bytes()).unwrap();
        assert_eq!(cert, again);
    }
}
