#![forbid(unsafe_code)]

//! Outcomes of decoration and processing.

use vaxholm_keys::X509Cert;

// ── Decoration ───────────────────────────────────────────────────────

/// What one security header produced.
#[derive(Clone, Default)]
pub struct HeaderDecoration {
    pub actor: Option<String>,
    /// Session key of the `EncryptedKey` sent to the recipient, if any.
    pub encrypted_key_secret: Option<Vec<u8>>,
    /// SHA-1 of that `EncryptedKey`'s ciphertext, for later
    /// `EncryptedKeySHA1` references.
    pub encrypted_key_sha1: Option<Vec<u8>>,
    /// Base64 `SignatureValue`s produced, as a peer would confirm them.
    pub signature_values: Vec<String>,
}

impl std::fmt::Debug for HeaderDecoration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderDecoration")
            .field("actor", &self.actor)
            .field("encrypted_key_secret", &self.encrypted_key_secret.as_ref().map(|_| ".."))
            .field("encrypted_key_sha1", &self.encrypted_key_sha1)
            .field("signature_values", &self.signature_values)
            .finish()
    }
}

/// A secured message.
#[derive(Debug, Clone)]
pub struct DecorationResult {
    pub xml: String,
    /// One entry per decorated header, in decoration order.
    pub headers: Vec<HeaderDecoration>,
}

impl DecorationResult {
    /// The decoration of the header addressed to `actor`.
    pub fn header(&self, actor: Option<&str>) -> Option<&HeaderDecoration> {
        self.headers.iter().find(|h| h.actor.as_deref() == actor)
    }
}

// ── Processing ───────────────────────────────────────────────────────

/// How the `KeyInfo` of a verified signature located the certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateReference {
    BinarySecurityToken,
    SubjectKeyIdentifier,
    Thumbprint,
    IssuerSerial,
    /// `ds:X509Data` inside the `KeyInfo`.
    Embedded,
}

/// Secret a derived key was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivedKeyBase {
    /// A security context, by its `wsc:Identifier`.
    SecurityContext(String),
    /// An `EncryptedKey`, by the SHA-1 of its ciphertext.
    EncryptedKey(Vec<u8>),
}

/// The token that proved a signature.
#[derive(Debug, Clone)]
pub enum SigningToken {
    X509 {
        certificate: X509Cert,
        reference: CertificateReference,
    },
    /// A holder-of-key SAML assertion's subject confirmation key.
    SamlHolderOfKey {
        assertion_id: String,
        certificate: X509Cert,
    },
    DerivedKey {
        token_id: String,
        base: DerivedKeyBase,
    },
    /// An `EncryptedKey` secret used directly as HMAC key.
    EncryptedKey { sha1: Vec<u8> },
    /// A security context secret used directly as HMAC key.
    SecurityContext { identifier: String },
}

impl SigningToken {
    /// The certificate behind the signature, for asymmetric tokens.
    pub fn certificate(&self) -> Option<&X509Cert> {
        match self {
            Self::X509 { certificate, .. } | Self::SamlHolderOfKey { certificate, .. } => {
                Some(certificate)
            }
            _ => None,
        }
    }
}

/// An element whose digest matched a validated signature.
#[derive(Debug, Clone)]
pub struct SignedElement {
    pub namespace: String,
    pub local_name: String,
    pub id: Option<String>,
    pub token: SigningToken,
}

/// An `EncryptedData` that was replaced by its plaintext.
#[derive(Debug, Clone)]
pub struct EncryptedElement {
    /// Namespace and name of the decrypted element, or of the parent for
    /// content encryption.
    pub namespace: String,
    pub local_name: String,
    pub id: Option<String>,
    pub content_only: bool,
    pub algorithm: String,
}

/// `wsu:Timestamp` values, as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampInfo {
    pub id: Option<String>,
    pub created: Option<String>,
    pub expires: Option<String>,
}

/// A token found in the security header.
#[derive(Clone)]
pub enum ProcessedToken {
    X509 {
        id: Option<String>,
        certificate: X509Cert,
    },
    UsernameToken {
        id: Option<String>,
        username: String,
        password: Option<String>,
        nonce: Option<Vec<u8>>,
        created: Option<String>,
    },
    SamlAssertion {
        id: String,
        version: String,
        /// Serialized assertion as found in the message.
        xml: String,
        subject_certificate: Option<X509Cert>,
    },
    SecurityContext {
        id: Option<String>,
        identifier: String,
        resolved: bool,
    },
    DerivedKey {
        id: Option<String>,
        base: DerivedKeyBase,
    },
    EncryptedKey {
        id: Option<String>,
        sha1: Vec<u8>,
    },
}

impl std::fmt::Debug for ProcessedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X509 { id, certificate } => f
                .debug_struct("X509")
                .field("id", id)
                .field("subject", &certificate.subject())
                .finish(),
            Self::UsernameToken { id, username, .. } => f
                .debug_struct("UsernameToken")
                .field("id", id)
                .field("username", username)
                .finish_non_exhaustive(),
            Self::SamlAssertion { id, version, .. } => f
                .debug_struct("SamlAssertion")
                .field("id", id)
                .field("version", version)
                .finish_non_exhaustive(),
            Self::SecurityContext { id, identifier, resolved } => f
                .debug_struct("SecurityContext")
                .field("id", id)
                .field("identifier", identifier)
                .field("resolved", resolved)
                .finish(),
            Self::DerivedKey { id, base } => f
                .debug_struct("DerivedKey")
                .field("id", id)
                .field("base", base)
                .finish(),
            Self::EncryptedKey { id, sha1 } => f
                .debug_struct("EncryptedKey")
                .field("id", id)
                .field("sha1", sha1)
                .finish(),
        }
    }
}

/// Everything learned from processing one security header.
#[derive(Debug, Clone, Default)]
pub struct ProcessorResult {
    /// The message with every referenced `EncryptedData` replaced.
    pub document: String,
    /// Actor of the processed header; `None` for the un-targeted one.
    pub actor: Option<String>,
    /// Whether a matching security header was present at all.
    pub has_security_header: bool,
    pub signed_elements: Vec<SignedElement>,
    pub encrypted_elements: Vec<EncryptedElement>,
    pub tokens: Vec<ProcessedToken>,
    pub timestamp: Option<TimestampInfo>,
    pub signature_confirmations: Vec<String>,
    /// Base64 values of the signatures that validated.
    pub signature_values: Vec<String>,
    /// SHA-1 of each processed `EncryptedKey`'s ciphertext.
    pub encrypted_key_sha1s: Vec<Vec<u8>>,
}

impl ProcessorResult {
    /// The signed element with this id.
    pub fn signed_by_id(&self, id: &str) -> Option<&SignedElement> {
        self.signed_elements
            .iter()
            .find(|e| e.id.as_deref() == Some(id))
    }

    /// Whether some element with this expanded name was signed.
    pub fn is_signed(&self, namespace: &str, local_name: &str) -> bool {
        self.signed_elements
            .iter()
            .any(|e| e.namespace == namespace && e.local_name == local_name)
    }

    /// Whether some element with this expanded name (or its content)
    /// was decrypted.
    pub fn is_decrypted(&self, namespace: &str, local_name: &str) -> bool {
        self.encrypted_elements
            .iter()
            .any(|e| e.namespace == namespace && e.local_name == local_name)
    }

    /// Certificates that proved any signature, without duplicates.
    pub fn signing_certificates(&self) -> Vec<&X509Cert> {
        let mut certs: Vec<&X509Cert> = Vec::new();
        for cert in self.signed_elements.iter().filter_map(|e| e.token.certificate()) {
            if !certs.contains(&cert) {
                certs.push(cert);
            }
        }
        certs
    }
}
