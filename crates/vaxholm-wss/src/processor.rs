#![forbid(unsafe_code)]

//! WS-Security processing of inbound messages.
//!
//! Processing order:
//! 1. Select the `wsse:Security` header for the configured actor
//! 2. Read key-bearing tokens in document order: BST, SCT, `EncryptedKey`,
//!    `DerivedKeyToken`, and collect `ReferenceList`s
//! 3. Decrypt every referenced `EncryptedData` in place
//! 4. Read Timestamp, SignatureConfirmation, UsernameToken and SAML
//!    tokens from the decrypted message
//! 5. Verify each `Signature` with the key its `KeyInfo` resolves to

use crate::requirements::SecureConversationSession;
use crate::result::{
    CertificateReference, DerivedKeyBase, EncryptedElement, ProcessedToken, ProcessorResult,
    SignedElement, SigningToken, TimestampInfo,
};
use crate::soap::{self, must_understand, Envelope};
use crate::token::DerivedKeyParams;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};
use vaxholm_core::{ns, Error};
use vaxholm_crypto::sign::SigningKey;
use vaxholm_enc::decrypt::{self, EncryptedDataInfo};
use vaxholm_enc::EncType;
use vaxholm_keys::{SecurityTokenResolver, X509Cert};
use vaxholm_xml::document::{
    base64_content, child_element, decode_base64, element_id, element_text, is_element,
};
use vaxholm_xml::{Editor, XmlDocument};

/// Looks up secure conversation sessions by their `wsc:Identifier`.
pub trait SecurityContextFinder: Send + Sync {
    fn get_session(&self, identifier: &str) -> Option<SecureConversationSession>;
}

impl SecurityContextFinder for HashMap<String, SecureConversationSession> {
    fn get_session(&self, identifier: &str) -> Option<SecureConversationSession> {
        self.get(identifier).cloned()
    }
}

/// Processor settings.
#[derive(Clone, Default)]
pub struct ProcessorOptions {
    /// Actor/role whose header is processed; `None` selects the
    /// un-targeted header.
    pub actor: Option<String>,
    pub security_context_finder: Option<Arc<dyn SecurityContextFinder>>,
}

impl ProcessorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = Some(actor.to_owned());
        self
    }

    pub fn with_security_context_finder(mut self, finder: Arc<dyn SecurityContextFinder>) -> Self {
        self.security_context_finder = Some(finder);
        self
    }
}

impl std::fmt::Debug for ProcessorOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorOptions")
            .field("actor", &self.actor)
            .field("security_context_finder", &self.security_context_finder.is_some())
            .finish()
    }
}

/// Verifies and decrypts secured SOAP messages.
pub struct WssProcessor<'r> {
    resolver: &'r dyn SecurityTokenResolver,
    options: ProcessorOptions,
}

// ── Header model ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderChild {
    Timestamp,
    SignatureConfirmation,
    BinarySecurityToken,
    UsernameToken,
    SamlAssertion,
    SecurityContextToken,
    DerivedKeyToken,
    EncryptedKey,
    ReferenceList,
    EncryptedData,
    Signature,
    Unknown,
}

impl HeaderChild {
    fn of(node: roxmltree::Node<'_, '_>) -> Self {
        let name = node.tag_name();
        match (name.namespace().unwrap_or(""), name.name()) {
            (ns::WSU, ns::node::TIMESTAMP) => Self::Timestamp,
            (ns::WSSE11, ns::node::SIGNATURE_CONFIRMATION) => Self::SignatureConfirmation,
            (ns::WSSE, ns::node::BINARY_SECURITY_TOKEN) => Self::BinarySecurityToken,
            (ns::WSSE, ns::node::USERNAME_TOKEN) => Self::UsernameToken,
            (ns::SAML1 | ns::SAML2, ns::node::ASSERTION) => Self::SamlAssertion,
            (ns::WSSC | ns::WSSC_2005, ns::node::SECURITY_CONTEXT_TOKEN) => Self::SecurityContextToken,
            (ns::WSSC | ns::WSSC_2005, ns::node::DERIVED_KEY_TOKEN) => Self::DerivedKeyToken,
            (ns::ENC, ns::node::ENCRYPTED_KEY) => Self::EncryptedKey,
            (ns::ENC, ns::node::REFERENCE_LIST) => Self::ReferenceList,
            (ns::ENC, ns::node::ENCRYPTED_DATA) => Self::EncryptedData,
            (ns::DSIG, ns::node::SIGNATURE) => Self::Signature,
            _ => Self::Unknown,
        }
    }
}

/// Where a symmetric secret came from.
#[derive(Debug, Clone)]
enum SecretSource {
    SecurityContext(String),
    EncryptedKey(Vec<u8>),
    DerivedKey { token_id: String, base: DerivedKeyBase },
}

impl SecretSource {
    fn signing_token(self) -> SigningToken {
        match self {
            Self::SecurityContext(identifier) => SigningToken::SecurityContext { identifier },
            Self::EncryptedKey(sha1) => SigningToken::EncryptedKey { sha1 },
            Self::DerivedKey { token_id, base } => SigningToken::DerivedKey { token_id, base },
        }
    }
}

/// Key material learned from the header, by token id.
#[derive(Default)]
struct KeyRing {
    certificates: HashMap<String, X509Cert>,
    contexts: HashMap<String, SecureConversationSession>,
    derived: HashMap<String, (Vec<u8>, DerivedKeyBase)>,
    encrypted_keys: HashMap<String, (Vec<u8>, Vec<u8>)>,
    secrets_by_sha1: HashMap<Vec<u8>, Vec<u8>>,
    saml: HashMap<String, X509Cert>,
}

/// A decrypted `EncryptedKey`.
struct UnwrappedKey {
    id: Option<String>,
    secret: Vec<u8>,
    sha1: Vec<u8>,
    data_references: Vec<String>,
}

// ── Processing ───────────────────────────────────────────────────────

impl<'r> WssProcessor<'r> {
    pub fn new(resolver: &'r dyn SecurityTokenResolver) -> Self {
        Self::with_options(resolver, ProcessorOptions::default())
    }

    pub fn with_options(resolver: &'r dyn SecurityTokenResolver, options: ProcessorOptions) -> Self {
        Self { resolver, options }
    }

    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    /// Process the security header addressed to the configured actor.
    ///
    /// A message without such a header is returned unchanged with
    /// `has_security_header` unset.
    pub fn process(&self, message: &str) -> Result<ProcessorResult, Error> {
        let actor = self.options.actor.as_deref();
        let doc = soap::parse_envelope(message)?;
        let env = Envelope::from_document(&doc)?;
        let mut result = ProcessorResult {
            document: message.to_owned(),
            actor: self.options.actor.clone(),
            ..ProcessorResult::default()
        };
        let Some(header) = env.security_header(actor) else {
            debug!(?actor, "no security header for actor");
            return Ok(result);
        };
        result.has_security_header = true;
        let id_map = XmlDocument::build_id_map(&doc)?;

        // Key-bearing tokens.
        let mut keys = KeyRing::default();
        let mut pending: Vec<(String, Option<Vec<u8>>)> = Vec::new();
        for child in header.children().filter(|n| n.is_element()) {
            match HeaderChild::of(child) {
                HeaderChild::BinarySecurityToken => {
                    self.read_binary_security_token(child, &mut keys, &mut result)?
                }
                HeaderChild::SecurityContextToken => {
                    self.read_security_context(child, &mut keys, &mut result)?
                }
                HeaderChild::EncryptedKey => {
                    let unwrapped = self.unwrap_key(child, &keys)?;
                    for uri in &unwrapped.data_references {
                        pending.push((uri.clone(), Some(unwrapped.secret.clone())));
                    }
                    if let Some(id) = &unwrapped.id {
                        keys.encrypted_keys
                            .insert(id.clone(), (unwrapped.secret.clone(), unwrapped.sha1.clone()));
                    }
                    keys.secrets_by_sha1
                        .insert(unwrapped.sha1.clone(), unwrapped.secret);
                    result.tokens.push(ProcessedToken::EncryptedKey {
                        id: unwrapped.id,
                        sha1: unwrapped.sha1.clone(),
                    });
                    result.encrypted_key_sha1s.push(unwrapped.sha1);
                }
                HeaderChild::DerivedKeyToken => self.read_derived_key(child, &mut keys, &mut result)?,
                HeaderChild::ReferenceList => pending.extend(
                    decrypt::reference_list_uris(child)
                        .into_iter()
                        .map(|uri| (uri, None)),
                ),
                HeaderChild::Unknown => {
                    if must_understand(child, env.version) {
                        return Err(Error::XmlStructure(format!(
                            "cannot process mustUnderstand header element <{}>",
                            child.tag_name().name()
                        )));
                    }
                    debug!(element = child.tag_name().name(), "skipping unknown header element");
                }
                _ => {}
            }
        }

        // Decryption.
        let mut editor = Editor::new();
        let mut decrypted = HashSet::new();
        for (uri, key) in pending {
            let id = uri
                .strip_prefix('#')
                .ok_or_else(|| Error::InvalidUri(format!("external DataReference not supported: {uri}")))?;
            if !decrypted.insert(id.to_owned()) {
                continue;
            }
            let node = XmlDocument::find_by_id(&doc, &id_map, id)
                .ok_or_else(|| Error::ElementNotFound(uri.clone()))?;
            let info = decrypt::parse_encrypted_data(node)?;
            let key = match key {
                Some(key) => key,
                None => self.resolve_data_key(&info, &keys)?,
            };
            let plaintext = decrypt::decrypt_data(&info, &key)?;
            decrypt::stage_replacement(&mut editor, &info, &plaintext)?;
            debug!(%uri, "decrypted");
            result.encrypted_elements.push(describe_decrypted(&info, &plaintext)?);
        }
        if !editor.is_empty() {
            result.document = editor.apply(message)?;
        }

        // Tokens and signatures over the decrypted message.
        let doc = vaxholm_xml::parse(&result.document)?;
        let env = Envelope::from_document(&doc)?;
        let header = env
            .security_header(actor)
            .ok_or_else(|| Error::XmlStructure("security header lost during decryption".into()))?;
        let id_map = XmlDocument::build_id_map(&doc)?;

        let mut signatures = Vec::new();
        for child in header.children().filter(|n| n.is_element()) {
            match HeaderChild::of(child) {
                HeaderChild::Timestamp => {
                    if result.timestamp.is_some() {
                        return Err(Error::XmlStructure(
                            "more than one Timestamp in security header".into(),
                        ));
                    }
                    result.timestamp = Some(read_timestamp(child));
                }
                HeaderChild::SignatureConfirmation => result.signature_confirmations.push(
                    child
                        .attribute(ns::attr::VALUE)
                        .unwrap_or_default()
                        .to_owned(),
                ),
                HeaderChild::UsernameToken => result.tokens.push(read_username_token(child)?),
                HeaderChild::SamlAssertion => {
                    let token = read_saml_assertion(child, &result.document)?;
                    if let ProcessedToken::SamlAssertion {
                        id,
                        subject_certificate: Some(cert),
                        ..
                    } = &token
                    {
                        keys.saml.insert(id.clone(), cert.clone());
                    }
                    result.tokens.push(token);
                }
                HeaderChild::Signature => signatures.push(child),
                HeaderChild::EncryptedData => {
                    debug!(id = ?element_id(child), "leaving unreferenced EncryptedData");
                }
                _ => {}
            }
        }

        for signature in signatures {
            let info = vaxholm_dsig::verify::parse_signature(signature)?;
            let (key, token) = self.resolve_signing_key(info.key_info, &keys)?;
            let signed = vaxholm_dsig::verify::verify_references(&doc, &id_map, &info)?;
            vaxholm_dsig::verify::verify_signature_value(&info, &key)?;
            debug!(references = signed.len(), "signature verified");
            for node in signed.into_iter().filter_map(|id| doc.get_node(id)) {
                result.signed_elements.push(SignedElement {
                    namespace: node.tag_name().namespace().unwrap_or_default().to_owned(),
                    local_name: node.tag_name().name().to_owned(),
                    id: element_id(node).map(str::to_owned),
                    token: token.clone(),
                });
            }
            result.signature_values.push(STANDARD.encode(&info.signature_value));
        }

        Ok(result)
    }

    // ── Tokens ───────────────────────────────────────────────────────

    fn read_binary_security_token(
        &self,
        node: roxmltree::Node<'_, '_>,
        keys: &mut KeyRing,
        result: &mut ProcessorResult,
    ) -> Result<(), Error> {
        let value_type = node.attribute(ns::attr::VALUE_TYPE).unwrap_or(ns::value_type::X509V3);
        if value_type != ns::value_type::X509V3 {
            warn!(%value_type, "ignoring BinarySecurityToken of unsupported type");
            return Ok(());
        }
        let certificate = X509Cert::from_der(&base64_content(node)?)?;
        let id = element_id(node).map(str::to_owned);
        if let Some(id) = &id {
            keys.certificates.insert(id.clone(), certificate.clone());
        }
        result.tokens.push(ProcessedToken::X509 { id, certificate });
        Ok(())
    }

    fn read_security_context(
        &self,
        node: roxmltree::Node<'_, '_>,
        keys: &mut KeyRing,
        result: &mut ProcessorResult,
    ) -> Result<(), Error> {
        let wsc = node.tag_name().namespace().unwrap_or(ns::WSSC);
        let identifier = child_element(node, wsc, ns::node::IDENTIFIER)
            .map(|n| element_text(n).trim().to_owned())
            .ok_or_else(|| Error::MissingElement("Identifier in SecurityContextToken".into()))?;
        let id = element_id(node).map(str::to_owned);
        let session = self.find_session(&identifier);
        let resolved = session.is_some();
        if let (Some(id), Some(session)) = (&id, session) {
            keys.contexts.insert(id.clone(), session);
        }
        debug!(%identifier, resolved, "security context token");
        result.tokens.push(ProcessedToken::SecurityContext {
            id,
            identifier,
            resolved,
        });
        Ok(())
    }

    fn read_derived_key(
        &self,
        node: roxmltree::Node<'_, '_>,
        keys: &mut KeyRing,
        result: &mut ProcessorResult,
    ) -> Result<(), Error> {
        let id = element_id(node).map(str::to_owned);
        let reference = child_element(node, ns::WSSE, ns::node::SECURITY_TOKEN_REFERENCE)
            .ok_or_else(|| Error::MissingElement("SecurityTokenReference in DerivedKeyToken".into()))?;
        let (secret, source) = self.str_secret(reference, keys)?.ok_or_else(|| {
            Error::UnresolvedKey(format!(
                "base token of DerivedKeyToken {}",
                id.as_deref().unwrap_or("(no id)")
            ))
        })?;
        let base = match source {
            SecretSource::SecurityContext(identifier) => DerivedKeyBase::SecurityContext(identifier),
            SecretSource::EncryptedKey(sha1) => DerivedKeyBase::EncryptedKey(sha1),
            SecretSource::DerivedKey { .. } => {
                return Err(Error::XmlStructure(
                    "DerivedKeyToken based on another derived key".into(),
                ))
            }
        };
        let key = DerivedKeyParams::parse(node)?.derive(&secret)?;
        if let Some(id) = &id {
            keys.derived.insert(id.clone(), (key, base.clone()));
        }
        result.tokens.push(ProcessedToken::DerivedKey { id, base });
        Ok(())
    }

    /// Decrypt an `EncryptedKey` with the private key of the certificate
    /// its `KeyInfo` names.
    fn unwrap_key(&self, node: roxmltree::Node<'_, '_>, keys: &KeyRing) -> Result<UnwrappedKey, Error> {
        let info = decrypt::parse_encrypted_key(node)?;
        let label = info.id.as_deref().unwrap_or("(no id)");
        let key_info = info
            .key_info
            .ok_or_else(|| Error::UnresolvedKey(format!("EncryptedKey {label} has no KeyInfo")))?;
        let (certificate, _) = self
            .resolve_certificate(key_info, keys)?
            .ok_or_else(|| Error::UnresolvedKey(format!("recipient certificate of EncryptedKey {label}")))?;
        let private_key = self
            .resolver
            .resolve_private_key_for_certificate(&certificate)
            .ok_or_else(|| {
                Error::UnresolvedKey(format!("no private key for {}", certificate.subject()))
            })?;
        let secret = decrypt::decrypt_key(&info, &private_key)?;
        let sha1 = vaxholm_crypto::digest::sha1(&info.cipher_value);
        self.resolver.cache_encrypted_key_secret(&sha1, &secret);
        debug!(ek = label, recipient = certificate.subject(), "unwrapped EncryptedKey");
        Ok(UnwrappedKey {
            id: info.id.clone(),
            secret,
            sha1,
            data_references: info.data_references.clone(),
        })
    }

    // ── Key resolution ───────────────────────────────────────────────

    fn find_session(&self, identifier: &str) -> Option<SecureConversationSession> {
        self.options
            .security_context_finder
            .as_ref()
            .and_then(|finder| finder.get_session(identifier))
    }

    fn encrypted_key_secret(&self, sha1: &[u8], keys: &KeyRing) -> Option<Vec<u8>> {
        keys.secrets_by_sha1
            .get(sha1)
            .cloned()
            .or_else(|| self.resolver.resolve_encrypted_key_secret(sha1))
    }

    /// Symmetric secret named by a `SecurityTokenReference`.
    fn str_secret(
        &self,
        reference: roxmltree::Node<'_, '_>,
        keys: &KeyRing,
    ) -> Result<Option<(Vec<u8>, SecretSource)>, Error> {
        if let Some(r) = child_element(reference, ns::WSSE, ns::node::WSSE_REFERENCE) {
            let uri = r.attribute(ns::attr::URI).unwrap_or_default();
            let Some(id) = uri.strip_prefix('#') else {
                // A bare URI names a security context by identifier.
                return Ok(self
                    .find_session(uri)
                    .map(|s| (s.secret, SecretSource::SecurityContext(uri.to_owned()))));
            };
            if let Some((key, base)) = keys.derived.get(id) {
                return Ok(Some((
                    key.clone(),
                    SecretSource::DerivedKey {
                        token_id: id.to_owned(),
                        base: base.clone(),
                    },
                )));
            }
            if let Some((secret, sha1)) = keys.encrypted_keys.get(id) {
                return Ok(Some((secret.clone(), SecretSource::EncryptedKey(sha1.clone()))));
            }
            if let Some(session) = keys.contexts.get(id) {
                return Ok(Some((
                    session.secret.clone(),
                    SecretSource::SecurityContext(session.identifier.clone()),
                )));
            }
            return Ok(None);
        }
        if let Some(ki) = child_element(reference, ns::WSSE, ns::node::KEY_IDENTIFIER) {
            if ki.attribute(ns::attr::VALUE_TYPE) == Some(ns::value_type::ENCRYPTED_KEY_SHA1) {
                let sha1 = decode_base64(&element_text(ki))?;
                let secret = self.encrypted_key_secret(&sha1, keys).ok_or_else(|| {
                    Error::UnresolvedKey(format!("EncryptedKeySHA1 {}", element_text(ki).trim()))
                })?;
                return Ok(Some((secret, SecretSource::EncryptedKey(sha1))));
            }
        }
        Ok(None)
    }

    /// Certificate named by a `KeyInfo`, and how it was named.
    fn resolve_certificate(
        &self,
        key_info: roxmltree::Node<'_, '_>,
        keys: &KeyRing,
    ) -> Result<Option<(X509Cert, CertificateReference)>, Error> {
        if let Some(reference) = child_element(key_info, ns::WSSE, ns::node::SECURITY_TOKEN_REFERENCE) {
            return self.str_certificate(reference, keys);
        }
        if let Some(der) = vaxholm_dsig::verify::embedded_certificates(key_info)?.first() {
            return Ok(Some((X509Cert::from_der(der)?, CertificateReference::Embedded)));
        }
        match child_element(key_info, ns::DSIG, ns::node::X509_DATA) {
            Some(data) => self.x509_data_certificate(data),
            None => Ok(None),
        }
    }

    fn str_certificate(
        &self,
        reference: roxmltree::Node<'_, '_>,
        keys: &KeyRing,
    ) -> Result<Option<(X509Cert, CertificateReference)>, Error> {
        if let Some(r) = child_element(reference, ns::WSSE, ns::node::WSSE_REFERENCE) {
            let uri = r.attribute(ns::attr::URI).unwrap_or_default();
            return Ok(uri
                .strip_prefix('#')
                .and_then(|id| keys.certificates.get(id))
                .map(|cert| (cert.clone(), CertificateReference::BinarySecurityToken)));
        }
        if let Some(ki) = child_element(reference, ns::WSSE, ns::node::KEY_IDENTIFIER) {
            return Ok(match ki.attribute(ns::attr::VALUE_TYPE).unwrap_or_default() {
                ns::value_type::SKI => self
                    .resolver
                    .resolve_certificate_by_ski(&decode_base64(&element_text(ki))?)
                    .map(|c| (c, CertificateReference::SubjectKeyIdentifier)),
                ns::value_type::THUMBPRINT_SHA1 => {
                    let thumbprint = decode_base64(&element_text(ki))?;
                    keys.certificates
                        .values()
                        .find(|c| c.thumbprint_sha1() == thumbprint.as_slice())
                        .cloned()
                        .or_else(|| self.resolver.resolve_certificate_by_thumbprint(&thumbprint))
                        .map(|c| (c, CertificateReference::Thumbprint))
                }
                other => {
                    debug!(value_type = other, "unsupported KeyIdentifier for a certificate");
                    None
                }
            });
        }
        match child_element(reference, ns::DSIG, ns::node::X509_DATA) {
            Some(data) => self.x509_data_certificate(data),
            None => Ok(None),
        }
    }

    fn x509_data_certificate(
        &self,
        data: roxmltree::Node<'_, '_>,
    ) -> Result<Option<(X509Cert, CertificateReference)>, Error> {
        if let Some(issuer_serial) = child_element(data, ns::DSIG, ns::node::X509_ISSUER_SERIAL) {
            let issuer = child_element(issuer_serial, ns::DSIG, ns::node::X509_ISSUER_NAME)
                .map(element_text)
                .unwrap_or_default();
            let serial = child_element(issuer_serial, ns::DSIG, ns::node::X509_SERIAL_NUMBER)
                .map(element_text)
                .unwrap_or_default();
            return Ok(self
                .resolver
                .resolve_certificate_by_issuer_serial(issuer.trim(), serial.trim())
                .map(|c| (c, CertificateReference::IssuerSerial)));
        }
        if let Some(ski) = child_element(data, ns::DSIG, ns::node::X509_SKI) {
            return Ok(self
                .resolver
                .resolve_certificate_by_ski(&base64_content(ski)?)
                .map(|c| (c, CertificateReference::SubjectKeyIdentifier)));
        }
        Ok(None)
    }

    /// Key for an `EncryptedData` not covered by an `EncryptedKey`'s
    /// reference list.
    fn resolve_data_key(&self, info: &EncryptedDataInfo<'_, '_>, keys: &KeyRing) -> Result<Vec<u8>, Error> {
        let label = info.id.as_deref().unwrap_or("(no id)");
        let unresolved = || Error::UnresolvedKey(format!("key for EncryptedData {label}"));
        let key_info = info.key_info.ok_or_else(unresolved)?;
        if let Some(ek) = child_element(key_info, ns::ENC, ns::node::ENCRYPTED_KEY) {
            return Ok(self.unwrap_key(ek, keys)?.secret);
        }
        let reference = child_element(key_info, ns::WSSE, ns::node::SECURITY_TOKEN_REFERENCE)
            .ok_or_else(unresolved)?;
        self.str_secret(reference, keys)?
            .map(|(secret, _)| secret)
            .ok_or_else(unresolved)
    }

    fn resolve_signing_key(
        &self,
        key_info: Option<roxmltree::Node<'_, '_>>,
        keys: &KeyRing,
    ) -> Result<(SigningKey, SigningToken), Error> {
        let key_info =
            key_info.ok_or_else(|| Error::UnresolvedKey("signature has no KeyInfo".into()))?;

        if let Some(reference) = child_element(key_info, ns::WSSE, ns::node::SECURITY_TOKEN_REFERENCE) {
            if let Some((secret, source)) = self.str_secret(reference, keys)? {
                return Ok((SigningKey::Hmac(secret), source.signing_token()));
            }
            if let Some(assertion_id) = saml_reference(reference, keys) {
                let certificate = keys.saml.get(&assertion_id).cloned().ok_or_else(|| {
                    Error::UnresolvedKey(format!("holder-of-key of SAML assertion {assertion_id}"))
                })?;
                return Ok((
                    SigningKey::RsaPublic(certificate.public_key().clone()),
                    SigningToken::SamlHolderOfKey {
                        assertion_id,
                        certificate,
                    },
                ));
            }
        }

        let (certificate, reference) = self
            .resolve_certificate(key_info, keys)?
            .ok_or_else(|| Error::UnresolvedKey("signature KeyInfo".into()))?;
        debug!(subject = certificate.subject(), ?reference, "signature certificate");
        Ok((
            SigningKey::RsaPublic(certificate.public_key().clone()),
            SigningToken::X509 {
                certificate,
                reference,
            },
        ))
    }
}

// ── Helper functions ─────────────────────────────────────────────────

/// Assertion id named by a SAML `KeyIdentifier`, or a `Reference` to a
/// SAML token in the header.
fn saml_reference(reference: roxmltree::Node<'_, '_>, keys: &KeyRing) -> Option<String> {
    if let Some(ki) = child_element(reference, ns::WSSE, ns::node::KEY_IDENTIFIER) {
        if matches!(
            ki.attribute(ns::attr::VALUE_TYPE),
            Some(ns::value_type::SAML1_ASSERTION_ID) | Some(ns::value_type::SAML2_ID)
        ) {
            return Some(element_text(ki).trim().to_owned());
        }
    }
    child_element(reference, ns::WSSE, ns::node::WSSE_REFERENCE)
        .and_then(|r| r.attribute(ns::attr::URI))
        .and_then(|uri| uri.strip_prefix('#'))
        .filter(|id| keys.saml.contains_key(*id))
        .map(str::to_owned)
}

fn describe_decrypted(info: &EncryptedDataInfo<'_, '_>, plaintext: &str) -> Result<EncryptedElement, Error> {
    let content_only = info.enc_type == EncType::Content;
    let (namespace, local_name, id) = if content_only {
        let parent = info
            .node
            .parent_element()
            .ok_or_else(|| Error::XmlStructure("EncryptedData has no parent".into()))?;
        (
            parent.tag_name().namespace().unwrap_or_default().to_owned(),
            parent.tag_name().name().to_owned(),
            element_id(parent).map(str::to_owned),
        )
    } else {
        let wrapped = decrypt::in_context(info.node, plaintext);
        let doc = vaxholm_xml::parse(&wrapped)?;
        let root = doc
            .root_element()
            .first_element_child()
            .ok_or_else(|| Error::Decryption("decrypted element is empty".into()))?;
        (
            root.tag_name().namespace().unwrap_or_default().to_owned(),
            root.tag_name().name().to_owned(),
            element_id(root).map(str::to_owned),
        )
    };
    Ok(EncryptedElement {
        namespace,
        local_name,
        id,
        content_only,
        algorithm: info.algorithm.clone(),
    })
}

fn read_timestamp(node: roxmltree::Node<'_, '_>) -> TimestampInfo {
    let text = |local: &str| child_element(node, ns::WSU, local).map(|n| element_text(n).trim().to_owned());
    TimestampInfo {
        id: element_id(node).map(str::to_owned),
        created: text(ns::node::CREATED),
        expires: text(ns::node::EXPIRES),
    }
}

fn read_username_token(node: roxmltree::Node<'_, '_>) -> Result<ProcessedToken, Error> {
    let username = child_element(node, ns::WSSE, ns::node::USERNAME)
        .map(element_text)
        .ok_or_else(|| Error::MissingElement("Username in UsernameToken".into()))?;
    let nonce = child_element(node, ns::WSSE, ns::node::NONCE)
        .map(base64_content)
        .transpose()?;
    Ok(ProcessedToken::UsernameToken {
        id: element_id(node).map(str::to_owned),
        username: username.trim().to_owned(),
        password: child_element(node, ns::WSSE, ns::node::PASSWORD).map(element_text),
        nonce,
        created: child_element(node, ns::WSU, ns::node::CREATED).map(|n| element_text(n).trim().to_owned()),
    })
}

fn read_saml_assertion(node: roxmltree::Node<'_, '_>, document: &str) -> Result<ProcessedToken, Error> {
    let saml2 = is_element(node, ns::SAML2, ns::node::ASSERTION);
    let (id, version) = if saml2 {
        (
            node.attribute(ns::attr::SAML2_ID),
            node.attribute("Version").unwrap_or("2.0").to_owned(),
        )
    } else {
        (
            node.attribute(ns::attr::ASSERTION_ID),
            format!(
                "{}.{}",
                node.attribute("MajorVersion").unwrap_or("1"),
                node.attribute("MinorVersion").unwrap_or("1")
            ),
        )
    };
    let id = id.ok_or_else(|| Error::MissingAttribute("SAML assertion id".into()))?;
    let saml_ns = if saml2 { ns::SAML2 } else { ns::SAML1 };
    let subject_certificate = node
        .descendants()
        .filter(|n| is_element(*n, saml_ns, ns::node::SUBJECT_CONFIRMATION))
        .flat_map(|sc| sc.descendants())
        .find(|n| is_element(*n, ns::DSIG, ns::node::X509_CERTIFICATE))
        .map(|n| base64_content(n).and_then(|der| X509Cert::from_der(&der)))
        .transpose()?;
    Ok(ProcessedToken::SamlAssertion {
        id: id.to_owned(),
        version,
        xml: document[node.range()].to_owned(),
        subject_certificate,
    })
}
