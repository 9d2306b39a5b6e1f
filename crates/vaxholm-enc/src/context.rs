#![forbid(unsafe_code)]

//! Encryption context: algorithm choices for producing `EncryptedData`
//! and `EncryptedKey`.

use vaxholm_core::{algorithm, ns, Error};

/// How the plaintext relates to the `EncryptedData` that replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncType {
    /// The whole element is encrypted.
    Element,
    /// Only the element's children are encrypted.
    Content,
}

impl EncType {
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Element => ns::ENC_TYPE_ELEMENT,
            Self::Content => ns::ENC_TYPE_CONTENT,
        }
    }

    /// Parse a `Type` attribute; an absent type is treated as `Element`.
    pub fn from_uri(uri: Option<&str>) -> Result<Self, Error> {
        match uri {
            None | Some(ns::ENC_TYPE_ELEMENT) => Ok(Self::Element),
            Some(ns::ENC_TYPE_CONTENT) => Ok(Self::Content),
            Some(other) => Err(Error::UnsupportedAlgorithm(format!("EncryptedData Type: {other}"))),
        }
    }
}

/// Context for XML-Enc operations.
#[derive(Debug, Clone)]
pub struct EncContext {
    /// Block cipher URI for `EncryptedData`.
    pub cipher_uri: String,
    /// Key transport URI for `EncryptedKey`.
    pub key_transport_uri: String,
}

impl EncContext {
    pub fn new() -> Self {
        Self {
            cipher_uri: algorithm::DEFAULT_ENCRYPTION.to_owned(),
            key_transport_uri: algorithm::DEFAULT_KEY_TRANSPORT.to_owned(),
        }
    }

    pub fn with_cipher_uri(mut self, uri: &str) -> Self {
        self.cipher_uri = uri.to_owned();
        self
    }

    pub fn with_key_transport_uri(mut self, uri: &str) -> Self {
        self.key_transport_uri = uri.to_owned();
        self
    }

    /// Random session key sized for `cipher_uri`.
    pub fn generate_session_key(&self) -> Result<Vec<u8>, Error> {
        vaxholm_crypto::cipher::generate_key(&self.cipher_uri)
    }
}

impl Default for EncContext {
    fn default() -> Self {
        Self::new()
    }
}
