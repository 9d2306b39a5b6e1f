#![forbid(unsafe_code)]

//! Security token resolution: mapping token references to certificates,
//! private keys and cached encrypted-key secrets.
//!
//! Resolvers are shared across threads and may block (keystore or directory
//! lookups). Composition is an ordered list tried in sequence.

use crate::cert::X509Cert;

/// A reference to key material as found in a `SecurityTokenReference`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenReference {
    /// SHA-1 digest of the DER certificate.
    Thumbprint(Vec<u8>),
    /// X.509 subject key identifier.
    SubjectKeyIdentifier(Vec<u8>),
    IssuerSerial { issuer: String, serial: String },
    /// SHA-1 digest of a previously exchanged `EncryptedKey` ciphertext.
    EncryptedKeySha1(Vec<u8>),
}

/// Key material returned for a [`TokenReference`].
#[derive(Debug, Clone)]
pub enum ResolvedToken {
    Certificate(X509Cert),
    SecretKey(Vec<u8>),
}

/// Source of certificates and keys for the decorator and the processor.
pub trait SecurityTokenResolver: Send + Sync {
    fn resolve_certificate_by_thumbprint(&self, thumbprint: &[u8]) -> Option<X509Cert>;

    fn resolve_certificate_by_ski(&self, ski: &[u8]) -> Option<X509Cert>;

    fn resolve_certificate_by_issuer_serial(&self, _issuer: &str, _serial: &str) -> Option<X509Cert> {
        None
    }

    /// The private key paired with `cert`, when this resolver holds it.
    fn resolve_private_key_for_certificate(&self, cert: &X509Cert) -> Option<rsa::RsaPrivateKey>;

    /// Secret of an `EncryptedKey` seen in an earlier exchange.
    fn resolve_encrypted_key_secret(&self, _sha1: &[u8]) -> Option<Vec<u8>> {
        None
    }

    /// Remember an encrypted-key secret for later `EncryptedKeySHA1` references.
    fn cache_encrypted_key_secret(&self, _sha1: &[u8], _secret: &[u8]) {}

    fn resolve_by_reference(&self, reference: &TokenReference) -> Option<ResolvedToken> {
        match reference {
            TokenReference::Thumbprint(t) => self
                .resolve_certificate_by_thumbprint(t)
                .map(ResolvedToken::Certificate),
            TokenReference::SubjectKeyIdentifier(ski) => self
                .resolve_certificate_by_ski(ski)
                .map(ResolvedToken::Certificate),
            TokenReference::IssuerSerial { issuer, serial } => self
                .resolve_certificate_by_issuer_serial(issuer, serial)
                .map(ResolvedToken::Certificate),
            TokenReference::EncryptedKeySha1(sha1) => self
                .resolve_encrypted_key_secret(sha1)
                .map(ResolvedToken::SecretKey),
        }
    }
}

impl<T: SecurityTokenResolver + ?Sized> SecurityTokenResolver for std::sync::Arc<T> {
    fn resolve_certificate_by_thumbprint(&self, thumbprint: &[u8]) -> Option<X509Cert> {
        (**self).resolve_certificate_by_thumbprint(thumbprint)
    }
    fn resolve_certificate_by_ski(&self, ski: &[u8]) -> Option<X509Cert> {
        (**self).resolve_certificate_by_ski(ski)
    }
    fn resolve_certificate_by_issuer_serial(&self, issuer: &str, serial: &str) -> Option<X509Cert> {
        (**self).resolve_certificate_by_issuer_serial(issuer, serial)
    }
    fn resolve_private_key_for_certificate(&self, cert: &X509Cert) -> Option<rsa::RsaPrivateKey> {
        (**self).resolve_private_key_for_certificate(cert)
    }
    fn resolve_encrypted_key_secret(&self, sha1: &[u8]) -> Option<Vec<u8>> {
        (**self).resolve_encrypted_key_secret(sha1)
    }
    fn cache_encrypted_key_secret(&self, sha1: &[u8], secret: &[u8]) {
        (**self).cache_encrypted_key_secret(sha1, secret)
    }
    fn resolve_by_reference(&self, reference: &TokenReference) -> Option<ResolvedToken> {
        (**self).resolve_by_reference(reference)
    }
}

// ── Chained resolver ─────────────────────────────────────────────────

/// Tries each resolver in order; the first hit wins.
#[derive(Default)]
pub struct ChainedSecurityTokenResolver {
    resolvers: Vec<Box<dyn SecurityTokenResolver>>,
}

impl ChainedSecurityTokenResolver {
    pub fn new(resolvers: Vec<Box<dyn SecurityTokenResolver>>) -> Self {
        Self { resolvers }
    }

    pub fn push(&mut self, resolver: Box<dyn SecurityTokenResolver>) {
        self.resolvers.push(resolver);
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl SecurityTokenResolver for ChainedSecurityTokenResolver {
    fn resolve_certificate_by_thumbprint(&self, thumbprint: &[u8]) -> Option<X509Cert> {
        self.resolvers
            .iter()
            .find_map(|r| r.resolve_certificate_by_thumbprint(thumbprint))
    }

    fn resolve_certificate_by_ski(&self, ski: &[u8]) -> Option<X509Cert> {
        self.resolvers.iter().find_map(|r| r.resolve_certificate_by_ski(ski))
    }

    fn resolve_certificate_by_issuer_serial(&self, issuer: &str, serial: &str) -> Option<X509Cert> {
        self.resolvers
            .iter()
            .find_map(|r| r.resolve_certificate_by_issuer_serial(issuer, serial))
    }

    fn resolve_private_key_for_certificate(&self, cert: &X509Cert) -> Option<rsa::RsaPrivateKey> {
        self.resolvers
            .iter()
            .find_map(|r| r.resolve_private_key_for_certificate(cert))
    }

    fn resolve_encrypted_key_secret(&self, sha1: &[u8]) -> Option<Vec<u8>> {
        self.resolvers
            .iter()
            .find_map(|r| r.resolve_encrypted_key_secret(sha1))
    }

    fn cache_encrypted_key_secret(&self, sha1: &[u8], secret: &[u8]) {
        for resolver in &self.resolvers {
            resolver.cache_encrypted_key_secret(sha1, secret);
        }
    }

    fn resolve_by_reference(&self, reference: &TokenReference) -> Option<ResolvedToken> {
        self.resolvers
            .iter()
            .find_map(|r| r.resolve_by_reference(reference))
    }
}
