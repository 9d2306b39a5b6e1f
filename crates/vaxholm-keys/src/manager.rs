#![forbid(unsafe_code)]

//! In-memory security token resolver.

use crate::cert::X509Cert;
use crate::resolver::SecurityTokenResolver;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// A certificate with its private key, when held.
struct Entry {
    cert: X509Cert,
    private_key: Option<rsa::RsaPrivateKey>,
}

/// Resolver over a fixed set of certificates, with a cache of
/// encrypted-key secrets learned while processing messages.
pub struct SimpleSecurityTokenResolver {
    entries: Vec<Entry>,
    secrets: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl SimpleSecurityTokenResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            secrets: RwLock::new(HashMap::new()),
        }
    }

    /// Add a certificate without a private key.
    pub fn add_certificate(&mut self, cert: X509Cert) {
        self.entries.push(Entry {
            cert,
            private_key: None,
        });
    }

    /// Add a certificate together with its private key.
    pub fn add_key_pair(&mut self, cert: X509Cert, private_key: rsa::RsaPrivateKey) {
        self.entries.push(Entry {
            cert,
            private_key: Some(private_key),
        });
    }

    /// Iterator over all certificates.
    pub fn certificates(&self) -> impl Iterator<Item = &X509Cert> {
        self.entries.iter().map(|e| &e.cert)
    }

    /// Number of certificates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(&self, pred: impl Fn(&X509Cert) -> bool) -> Option<&Entry> {
        self.entries.iter().find(|e| pred(&e.cert))
    }
}

impl Default for SimpleSecurityTokenResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityTokenResolver for SimpleSecurityTokenResolver {
    fn resolve_certificate_by_thumbprint(&self, thumbprint: &[u8]) -> Option<X509Cert> {
        self.find(|c| c.thumbprint_sha1() == thumbprint)
            .map(|e| e.cert.clone())
    }

    fn resolve_certificate_by_ski(&self, ski: &[u8]) -> Option<X509Cert> {
        self.find(|c| c.ski() == Some(ski)).map(|e| e.cert.clone())
    }

    fn resolve_certificate_by_issuer_serial(&self, issuer: &str, serial: &str) -> Option<X509Cert> {
        self.find(|c| c.matches_issuer_serial(issuer, serial))
            .map(|e| e.cert.clone())
    }

    fn resolve_private_key_for_certificate(&self, cert: &X509Cert) -> Option<rsa::RsaPrivateKey> {
        self.find(|c| c == cert).and_then(|e| e.private_key.clone())
    }

    fn resolve_encrypted_key_secret(&self, sha1: &[u8]) -> Option<Vec<u8>> {
        // A poisoned lock still holds a usable map.
        let secrets = self.secrets.read().unwrap_or_else(|e| e.into_inner());
        secrets.get(sha1).cloned()
    }

    fn cache_encrypted_key_secret(&self, sha1: &[u8], secret: &[u8]) {
        debug!(entries = self.entries.len(), "caching encrypted key secret");
        let mut secrets = self.secrets.write().unwrap_or_else(|e| e.into_inner());
        secrets.insert(sha1.to_vec(), secret.to_vec());
    }
}
