#![forbid(unsafe_code)]

//! Declarative description of what one decoration must do.

use chrono::{DateTime, Utc};
use vaxholm_core::algorithm;
use vaxholm_keys::X509Cert;

/// Default `wsu:Timestamp` lifetime.
pub const DEFAULT_TIMESTAMP_TIMEOUT_MS: u64 = 300_000;

/// Identifies elements of the message to sign or encrypt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementSelector {
    /// The SOAP `Body`.
    Body,
    /// The element carrying this `wsu:Id`, `Id`, `ID` or `AssertionID`.
    Id(String),
    /// Every element with this expanded name.
    Name { namespace: String, local_name: String },
}

impl ElementSelector {
    pub fn name(namespace: &str, local_name: &str) -> Self {
        Self::Name {
            namespace: namespace.to_owned(),
            local_name: local_name.to_owned(),
        }
    }
}

impl std::fmt::Display for ElementSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Body => f.write_str("soap:Body"),
            Self::Id(id) => write!(f, "#{id}"),
            Self::Name {
                namespace,
                local_name,
            } => write!(f, "{{{namespace}}}{local_name}"),
        }
    }
}

/// How the signature's `KeyInfo` refers to the sender certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyReference {
    /// Embed the certificate as a `BinarySecurityToken` and reference it.
    #[default]
    BinarySecurityToken,
    /// `KeyIdentifier` with the subject key identifier (falls back to
    /// the thumbprint when the certificate has none).
    SubjectKeyIdentifier,
    /// `KeyIdentifier` with the SHA-1 thumbprint.
    Thumbprint,
    /// `X509IssuerSerial` inside the token reference.
    IssuerSerial,
}

/// A WS-SecureConversation session shared with the recipient.
#[derive(Clone)]
pub struct SecureConversationSession {
    /// `wsc:Identifier` of the security context.
    pub identifier: String,
    pub secret: Vec<u8>,
}

impl SecureConversationSession {
    pub fn new(identifier: impl Into<String>, secret: Vec<u8>) -> Self {
        Self {
            identifier: identifier.into(),
            secret,
        }
    }
}

impl std::fmt::Debug for SecureConversationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureConversationSession")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

/// The key that proves the sender's signature. Exactly one is active.
#[derive(Clone, Default)]
pub enum SigningSource {
    /// No sender key. With a recipient certificate a fresh `EncryptedKey`
    /// supplies an HMAC key instead.
    #[default]
    None,
    X509 {
        certificate: X509Cert,
        private_key: rsa::RsaPrivateKey,
    },
    /// Derived keys from a secure conversation.
    SecureConversation(SecureConversationSession),
    /// A secret previously exchanged in an `EncryptedKey`, referenced by
    /// the SHA-1 of its ciphertext.
    EncryptedKeySha1 { sha1: Vec<u8>, secret: Vec<u8> },
}

impl std::fmt::Debug for SigningSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::X509 { certificate, .. } => f
                .debug_struct("X509")
                .field("subject", &certificate.subject())
                .finish_non_exhaustive(),
            Self::SecureConversation(session) => {
                f.debug_tuple("SecureConversation").field(session).finish()
            }
            Self::EncryptedKeySha1 { .. } => f.write_str("EncryptedKeySha1(..)"),
        }
    }
}

/// Username and optional password for a `wsse:UsernameToken`.
#[derive(Clone)]
pub struct UsernameTokenCredentials {
    pub username: String,
    pub password: Option<String>,
    /// Add a random `wsse:Nonce` and a `wsu:Created`.
    pub include_nonce: bool,
}

impl UsernameTokenCredentials {
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: username.into(),
            password,
            include_nonce: false,
        }
    }

    pub fn with_nonce(mut self) -> Self {
        self.include_nonce = true;
        self
    }
}

impl std::fmt::Debug for UsernameTokenCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsernameTokenCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("include_nonce", &self.include_nonce)
            .finish()
    }
}

/// A token identifying the sender, carried in the security header.
#[derive(Debug, Clone)]
pub enum SenderToken {
    /// A serialized SAML assertion, inserted unchanged.
    SamlAssertion(String),
    UsernameToken(UsernameTokenCredentials),
}

/// Everything one security header needs.
#[derive(Debug, Clone)]
pub struct DecorationRequirements {
    /// Target actor/role of the security header; `None` is un-targeted.
    pub actor: Option<String>,
    pub must_understand: bool,
    pub elements_to_sign: Vec<ElementSelector>,
    pub elements_to_encrypt: Vec<ElementSelector>,
    /// Block cipher for `EncryptedData`.
    pub encryption_algorithm: String,
    /// Key transport for `EncryptedKey`.
    pub key_encryption_algorithm: String,
    /// Asymmetric signature method; symmetric keys always use HMAC-SHA1.
    pub signature_algorithm: String,
    pub digest_algorithm: String,
    pub key_reference: KeyReference,
    pub signing_source: SigningSource,
    pub recipient_certificate: Option<X509Cert>,
    pub sender_token: Option<SenderToken>,
    pub sign_sender_token: bool,
    /// Encrypt a `UsernameToken` sender token.
    pub encrypt_username_token: bool,
    /// With a SAML sender token, reference it from the signature
    /// `KeyInfo` (holder-of-key).
    pub key_reference_saml: bool,
    pub include_timestamp: bool,
    pub sign_timestamp: bool,
    /// Fixed creation time instead of now.
    pub timestamp_created: Option<DateTime<Utc>>,
    pub timestamp_timeout_ms: u64,
    /// `SignatureConfirmation` values to echo back; an empty string means
    /// the request carried no signature.
    pub signature_confirmations: Vec<String>,
}

impl DecorationRequirements {
    pub fn new() -> Self {
        Self {
            actor: None,
            must_understand: true,
            elements_to_sign: Vec::new(),
            elements_to_encrypt: Vec::new(),
            encryption_algorithm: algorithm::DEFAULT_ENCRYPTION.to_owned(),
            key_encryption_algorithm: algorithm::DEFAULT_KEY_TRANSPORT.to_owned(),
            signature_algorithm: algorithm::DEFAULT_SIGNATURE.to_owned(),
            digest_algorithm: algorithm::DEFAULT_DIGEST.to_owned(),
            key_reference: KeyReference::default(),
            signing_source: SigningSource::None,
            recipient_certificate: None,
            sender_token: None,
            sign_sender_token: false,
            encrypt_username_token: false,
            key_reference_saml: false,
            include_timestamp: true,
            sign_timestamp: false,
            timestamp_created: None,
            timestamp_timeout_ms: DEFAULT_TIMESTAMP_TIMEOUT_MS,
            signature_confirmations: Vec::new(),
        }
    }

    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = Some(actor.to_owned());
        self
    }

    pub fn with_must_understand(mut self, must_understand: bool) -> Self {
        self.must_understand = must_understand;
        self
    }

    pub fn sign(mut self, selector: ElementSelector) -> Self {
        self.elements_to_sign.push(selector);
        self
    }

    pub fn encrypt(mut self, selector: ElementSelector) -> Self {
        self.elements_to_encrypt.push(selector);
        self
    }

    pub fn with_encryption_algorithm(mut self, uri: &str) -> Self {
        self.encryption_algorithm = uri.to_owned();
        self
    }

    pub fn with_key_encryption_algorithm(mut self, uri: &str) -> Self {
        self.key_encryption_algorithm = uri.to_owned();
        self
    }

    pub fn with_signature_algorithm(mut self, uri: &str) -> Self {
        self.signature_algorithm = uri.to_owned();
        self
    }

    pub fn with_digest_algorithm(mut self, uri: &str) -> Self {
        self.digest_algorithm = uri.to_owned();
        self
    }

    pub fn with_key_reference(mut self, key_reference: KeyReference) -> Self {
        self.key_reference = key_reference;
        self
    }

    pub fn with_signing_source(mut self, source: SigningSource) -> Self {
        self.signing_source = source;
        self
    }

    pub fn with_sender_certificate(self, certificate: X509Cert, private_key: rsa::RsaPrivateKey) -> Self {
        self.with_signing_source(SigningSource::X509 {
            certificate,
            private_key,
        })
    }

    pub fn with_recipient_certificate(mut self, certificate: X509Cert) -> Self {
        self.recipient_certificate = Some(certificate);
        self
    }

    pub fn with_sender_token(mut self, token: SenderToken, sign: bool) -> Self {
        self.sender_token = Some(token);
        self.sign_sender_token = sign;
        self
    }

    pub fn with_encrypt_username_token(mut self, encrypt: bool) -> Self {
        self.encrypt_username_token = encrypt;
        self
    }

    pub fn with_key_reference_saml(mut self, enabled: bool) -> Self {
        self.key_reference_saml = enabled;
        self
    }

    pub fn with_timestamp(mut self, include: bool, sign: bool) -> Self {
        self.include_timestamp = include;
        self.sign_timestamp = sign;
        self
    }

    pub fn with_timestamp_created(mut self, created: DateTime<Utc>) -> Self {
        self.timestamp_created = Some(created);
        self
    }

    pub fn with_timestamp_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timestamp_timeout_ms = timeout_ms;
        self
    }

    pub fn with_signature_confirmation(mut self, value: &str) -> Self {
        self.signature_confirmations.push(value.to_owned());
        self
    }

    /// Whether any signature will be produced.
    pub fn signing_required(&self) -> bool {
        !self.elements_to_sign.is_empty()
            || self.sign_timestamp
            || !self.signature_confirmations.is_empty()
            || (self.sender_token.is_some() && self.sign_sender_token)
    }

    /// Whether anything will be encrypted.
    pub fn encryption_required(&self) -> bool {
        !self.elements_to_encrypt.is_empty()
            || (self.encrypt_username_token
                && matches!(self.sender_token, Some(SenderToken::UsernameToken(_))))
    }
}

impl Default for DecorationRequirements {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let reqs = DecorationRequirements::default();
        assert!(reqs.include_timestamp);
        assert!(!reqs.signing_required());
        assert!(!reqs.encryption_required());
        assert_eq!(reqs.timestamp_timeout_ms, 300_000);
        assert_eq!(reqs.encryption_algorithm, algorithm::AES128_CBC);
        assert_eq!(reqs.key_encryption_algorithm, algorithm::RSA_PKCS1);
        assert!(matches!(reqs.signing_source, SigningSource::None));
    }

    #[test]
    fn test_timestamp_only_signature_is_signing() {
        let reqs = DecorationRequirements::new().with_timestamp(true, true);
        assert!(reqs.signing_required());
    }

    #[test]
    fn test_username_token_encryption_counts() {
        let creds = UsernameTokenCredentials::new("alice", Some("secret".into()));
        let reqs = DecorationRequirements::new()
            .with_sender_token(SenderToken::UsernameToken(creds), false)
            .with_encrypt_username_token(true);
        assert!(reqs.encryption_required());
        assert!(!reqs.signing_required());
        assert!(!format!("{reqs:?}").contains("secret"));
    }
}
