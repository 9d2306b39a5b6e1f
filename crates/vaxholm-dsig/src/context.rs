#![forbid(unsafe_code)]

//! DSig context: algorithm choices for signature creation.

use vaxholm_c14n::C14nMode;
use vaxholm_core::algorithm;

/// Algorithms used when producing a signature.
#[derive(Debug, Clone)]
pub struct DsigContext {
    /// Canonicalization for `SignedInfo` and every reference.
    pub c14n: C14nMode,
    /// Digest algorithm URI for references.
    pub digest_uri: String,
    /// Signature algorithm URI.
    pub signature_uri: String,
    /// InclusiveNamespaces PrefixList written on reference transforms.
    pub inclusive_prefixes: Vec<String>,
}

impl DsigContext {
    /// Context with the default asymmetric signature algorithm.
    pub fn new() -> Self {
        Self {
            c14n: C14nMode::Exclusive,
            digest_uri: algorithm::DEFAULT_DIGEST.to_owned(),
            signature_uri: algorithm::DEFAULT_SIGNATURE.to_owned(),
            inclusive_prefixes: Vec::new(),
        }
    }

    /// Context for a symmetric (HMAC) signature.
    pub fn hmac() -> Self {
        Self {
            signature_uri: algorithm::DEFAULT_HMAC.to_owned(),
            ..Self::new()
        }
    }

    pub fn with_signature_uri(mut self, uri: &str) -> Self {
        self.signature_uri = uri.to_owned();
        self
    }

    pub fn with_digest_uri(mut self, uri: &str) -> Self {
        self.digest_uri = uri.to_owned();
        self
    }
}

impl Default for DsigContext {
    fn default() -> Self {
        Self::new()
    }
}
