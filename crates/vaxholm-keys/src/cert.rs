#![forbid(unsafe_code)]

//! X.509 certificate model used for token references.
//!
//! Captures the identifiers WS-Security uses to point at a certificate:
//! SHA-1 thumbprint, subject key identifier and issuer/serial.

use der::{oid::AssociatedOid, Decode, Encode};
use sha1::{Digest, Sha1};
use vaxholm_core::Error;
use x509_cert::ext::pkix::SubjectKeyIdentifier;
use x509_cert::Certificate;

/// A parsed RSA X.509 certificate.
#[derive(Clone, Debug)]
pub struct X509Cert {
    der: Vec<u8>,
    public_key: rsa::RsaPublicKey,
    subject: String,
    issuer: String,
    serial: String,
    ski: Option<Vec<u8>>,
    thumbprint_sha1: Vec<u8>,
}

impl X509Cert {
    /// Parse a DER-encoded certificate.
    pub fn from_der(data: &[u8]) -> Result<Self, Error> {
        let cert = Certificate::from_der(data)
            .map_err(|e| Error::Certificate(format!("failed to parse X.509 certificate: {e}")))?;
        let tbs = &cert.tbs_certificate;

        let spki_der = tbs
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::Certificate(format!("failed to encode SPKI: {e}")))?;
        use spki::DecodePublicKey;
        let public_key = rsa::RsaPublicKey::from_public_key_der(&spki_der)
            .map_err(|e| Error::Certificate(format!("certificate key is not RSA: {e}")))?;

        let serial = rsa::BigUint::from_bytes_be(tbs.serial_number.as_bytes()).to_string();

        let ski = match &tbs.extensions {
            Some(exts) => exts
                .iter()
                .find(|ext| ext.extn_id == SubjectKeyIdentifier::OID)
                .map(|ext| {
                    SubjectKeyIdentifier::from_der(ext.extn_value.as_bytes())
                        .map(|ski| ski.0.as_bytes().to_vec())
                        .map_err(|e| Error::Certificate(format!("invalid subject key identifier: {e}")))
                })
                .transpose()?,
            None => None,
        };

        Ok(Self {
            der: data.to_vec(),
            public_key,
            subject: tbs.subject.to_string(),
            issuer: tbs.issuer.to_string(),
            serial,
            ski,
            thumbprint_sha1: Sha1::digest(data).to_vec(),
        })
    }

    /// Parse a PEM `CERTIFICATE` block.
    pub fn from_pem(data: &[u8]) -> Result<Self, Error> {
        let (label, der_bytes) = pem_rfc7468::decode_vec(trim_ascii(data))
            .map_err(|e| Error::Certificate(format!("failed to decode certificate PEM: {e}")))?;
        if label != "CERTIFICATE" {
            return Err(Error::Certificate(format!(
                "expected CERTIFICATE PEM label, got: {label}"
            )));
        }
        Self::from_der(&der_bytes)
    }

    /// DER encoding, as carried in a BinarySecurityToken.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn public_key(&self) -> &rsa::RsaPublicKey {
        &self.public_key
    }

    /// Subject distinguished name (RFC 4514).
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Issuer distinguished name (RFC 4514).
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Serial number in decimal.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Subject key identifier extension, if present.
    pub fn ski(&self) -> Option<&[u8]> {
        self.ski.as_deref()
    }

    pub fn thumbprint_sha1(&self) -> &[u8] {
        &self.thumbprint_sha1
    }

    /// Whether this certificate is named by the given issuer DN and serial.
    pub fn matches_issuer_serial(&self, issuer: &str, serial: &str) -> bool {
        serial.trim() == self.serial && names_equal(issuer, &self.issuer)
    }
}

impl PartialEq for X509Cert {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for X509Cert {}

/// Compare two DN strings ignoring case and whitespace around separators.
fn names_equal(a: &str, b: &str) -> bool {
    fn normalize(name: &str) -> Vec<String> {
        name.split(',')
            .map(|rdn| {
                rdn.split('=')
                    .map(|part| part.trim().to_ascii_lowercase())
                    .collect::<Vec<_>>()
                    .join("=")
            })
            .collect()
    }
    normalize(a) == normalize(b)
}

fn trim_ascii(data: &[u8]) -> &[u8] {
    let start = data.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(data.len());
    let end = data
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    &data[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &[u8] = include_bytes!("../../../testdata/alice-cert.pem");
    const CAROL: &[u8] = include_bytes!("../../../testdata/carol-cert.pem");

    #[test]
    fn test_parse_identifiers() {
        let cert = X509Cert::from_pem(ALICE).unwrap();
        assert_eq!(cert.thumbprint_sha1().len(), 20);
        assert_eq!(cert.thumbprint_sha1()[..3], [0x36, 0xBD, 0x06]);
        let ski = cert.ski().unwrap();
        assert_eq!(ski.len(), 20);
        assert_eq!(ski[..2], [0x6C, 0x4A]);
        assert!(cert.subject().contains("CN=alice"));
        assert!(!cert.serial().is_empty());
        assert!(cert.serial().chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_missing_ski() {
        let cert = X509Cert::from_pem(CAROL).unwrap();
        assert!(cert.ski().is_none());
    }

    #[test]
    fn test_der_roundtrip_and_issuer_serial() {
        let cert = X509Cert::from_pem(ALICE).unwrap();
        let again = X509Cert::from_der(cert.der()).unwrap();
        assert_eq!(cert, again);
        let spaced = cert.issuer().replace(',', ", ");
        assert!(cert.matches_issuer_serial(&spaced, cert.serial()));
        assert!(!cert.matches_issuer_serial(cert.issuer(), "1"));
    }

    #[test]
    fn test_rejects_non_certificate_pem() {
        let key = include_bytes!("../../../testdata/alice-key.pem");
        assert!(matches!(X509Cert::from_pem(key), Err(Error::Certificate(_))));
    }
}
