#![forbid(unsafe_code)]

/// Errors produced by the Vaxholm message security library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("invalid XML structure: {0}")]
    XmlStructure(String),

    #[error("message is not SOAP: {0}")]
    NotSoap(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("unable to resolve key: {0}")]
    UnresolvedKey(String),

    #[error("invalid security token: {0}")]
    InvalidToken(String),

    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("digest mismatch for reference: {0}")]
    DigestMismatch(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing required element: {0}")]
    MissingElement(String),

    #[error("missing required attribute: {0}")]
    MissingAttribute(String),

    #[error("invalid URI reference: {0}")]
    InvalidUri(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for faults raised while verifying or decrypting an inbound
    /// message: bad signatures, failed decryption and unresolvable keys.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Error::SignatureInvalid(_)
                | Error::DigestMismatch(_)
                | Error::Decryption(_)
                | Error::UnresolvedKey(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
