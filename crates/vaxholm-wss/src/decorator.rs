#![forbid(unsafe_code)]

//! WS-Security decoration.
//!
//! Decoration order:
//! 1. Security header children: Timestamp, SignatureConfirmation, tokens
//!    (BST, UsernameToken, SAML, SCT, DKT), EncryptedKey or ReferenceList;
//!    signed targets without an id get a `wsu:Id`
//! 2. Signature over the timestamp, confirmations, signed tokens and
//!    targets, appended last to the header
//! 3. Encryption of the targets in place
//!
//! Each step works on a fresh copy of the text, so a failure leaves the
//! caller's message untouched.

use crate::requirements::{
    DecorationRequirements, ElementSelector, KeyReference, SecureConversationSession, SenderToken,
    SigningSource,
};
use crate::result::{DecorationResult, HeaderDecoration};
use crate::soap::{is_body, parse_envelope, Envelope};
use crate::token::{self, IdGenerator, DERIVED_KEY_LENGTH};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tracing::debug;
use vaxholm_core::{algorithm, ns, Error};
use vaxholm_crypto::sign::SigningKey;
use vaxholm_dsig::DsigContext;
use vaxholm_enc::{EncContext, EncType};
use vaxholm_keys::X509Cert;
use vaxholm_xml::document::{child_element, element_id, is_element};
use vaxholm_xml::edit::{add_attribute, content_range, insert_first_child, insert_last_child};
use vaxholm_xml::{Editor, XmlDocument, XmlWriter};

/// Secures SOAP messages according to [`DecorationRequirements`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WssDecorator;

impl WssDecorator {
    pub fn new() -> Self {
        Self
    }

    /// Decorate the security header addressed to `reqs.actor`.
    pub fn decorate(
        &self,
        message: &str,
        reqs: &DecorationRequirements,
    ) -> Result<DecorationResult, Error> {
        let (xml, header) = decorate_header(message, reqs)?;
        Ok(DecorationResult {
            xml,
            headers: vec![header],
        })
    }

    /// Decorate one independent security header per requirement set.
    pub fn decorate_all(
        &self,
        message: &str,
        all: &[DecorationRequirements],
    ) -> Result<DecorationResult, Error> {
        let mut actors = HashSet::new();
        for reqs in all {
            if !actors.insert(reqs.actor.as_deref()) {
                return Err(Error::Configuration(format!(
                    "more than one decoration for actor {}",
                    reqs.actor.as_deref().unwrap_or("(none)")
                )));
            }
        }

        let mut xml = message.to_owned();
        let mut headers = Vec::with_capacity(all.len());
        for reqs in all {
            let (next, header) = decorate_header(&xml, reqs)?;
            xml = next;
            headers.push(header);
        }
        Ok(DecorationResult { xml, headers })
    }
}

// ── Key plans ────────────────────────────────────────────────────────

/// Which key signs.
enum SignerPlan<'r> {
    X509 {
        certificate: &'r X509Cert,
        private_key: &'r rsa::RsaPrivateKey,
    },
    DerivedKey(&'r SecureConversationSession),
    EncryptedKeySha1 {
        sha1: &'r [u8],
        secret: &'r [u8],
    },
    /// Symmetric binding: HMAC key carried in a fresh `EncryptedKey`.
    EncryptedKey(&'r X509Cert),
}

impl<'r> SignerPlan<'r> {
    fn from_requirements(reqs: &'r DecorationRequirements) -> Result<Self, Error> {
        let plan = match &reqs.signing_source {
            SigningSource::X509 {
                certificate,
                private_key,
            } => Self::X509 {
                certificate,
                private_key,
            },
            SigningSource::SecureConversation(session) => Self::DerivedKey(session),
            SigningSource::EncryptedKeySha1 { sha1, secret } => Self::EncryptedKeySha1 { sha1, secret },
            SigningSource::None => match &reqs.recipient_certificate {
                Some(recipient) => Self::EncryptedKey(recipient),
                None => {
                    return Err(Error::Configuration(
                        "Signing is requested, but there is no key available".into(),
                    ))
                }
            },
        };
        if reqs.key_reference_saml && !matches!(plan, Self::X509 { .. }) {
            return Err(Error::Configuration(
                "a SAML key reference needs the holder-of-key certificate and private key".into(),
            ));
        }
        Ok(plan)
    }
}

/// Which key encrypts.
enum EncryptionPlan<'r> {
    EncryptedKey(&'r X509Cert),
    DerivedKey(&'r SecureConversationSession),
    EncryptedKeySha1 { sha1: &'r [u8], secret: &'r [u8] },
}

impl<'r> EncryptionPlan<'r> {
    fn from_requirements(reqs: &'r DecorationRequirements) -> Result<Self, Error> {
        match (&reqs.signing_source, &reqs.recipient_certificate) {
            (SigningSource::SecureConversation(session), _) => Ok(Self::DerivedKey(session)),
            (SigningSource::EncryptedKeySha1 { sha1, secret }, _) => {
                Ok(Self::EncryptedKeySha1 { sha1, secret })
            }
            (_, Some(recipient)) => Ok(Self::EncryptedKey(recipient)),
            (_, None) => Err(Error::Configuration(
                "Encryption is requested, but there is no recipient key.".into(),
            )),
        }
    }
}

/// A SAML sender token.
struct SamlToken {
    xml: String,
    id: String,
    value_type: &'static str,
}

impl SamlToken {
    fn parse(xml: &str) -> Result<Self, Error> {
        let doc = vaxholm_xml::parse(xml)?;
        let root = doc.root_element();
        let (id, value_type) = if is_element(root, ns::SAML2, ns::node::ASSERTION) {
            (root.attribute(ns::attr::SAML2_ID), ns::value_type::SAML2_ID)
        } else if is_element(root, ns::SAML1, ns::node::ASSERTION) {
            (root.attribute(ns::attr::ASSERTION_ID), ns::value_type::SAML1_ASSERTION_ID)
        } else {
            return Err(Error::Configuration(format!(
                "sender token <{}> is not a SAML assertion",
                root.tag_name().name()
            )));
        };
        let id = id.ok_or_else(|| Error::Configuration("SAML assertion has no id".into()))?;
        Ok(Self {
            xml: xml[root.range()].to_owned(),
            id: id.to_owned(),
            value_type,
        })
    }
}

/// How an encryption target is found again after the header is built.
enum Locator {
    Id(String),
    /// The n-th match of a selector; used for targets without an id so
    /// that their markup stays untouched until encryption.
    Nth(ElementSelector, usize),
}

struct EncryptTarget {
    locator: Locator,
    data_id: String,
    enc_type: EncType,
}

/// Key material made while building the header.
#[derive(Default)]
struct HeaderKeys {
    bst_id: Option<String>,
    signing_dkt: Option<(String, Vec<u8>)>,
    encryption_dkt: Option<(String, Vec<u8>)>,
    encrypted_key: Option<(String, Vec<u8>)>,
}

// ── Decoration ───────────────────────────────────────────────────────

fn decorate_header(
    message: &str,
    reqs: &DecorationRequirements,
) -> Result<(String, HeaderDecoration), Error> {
    let signer = if reqs.signing_required() {
        Some(SignerPlan::from_requirements(reqs)?)
    } else {
        None
    };
    let encryption = if reqs.encryption_required() {
        Some(EncryptionPlan::from_requirements(reqs)?)
    } else {
        None
    };
    let saml = match &reqs.sender_token {
        Some(SenderToken::SamlAssertion(xml)) => Some(SamlToken::parse(xml)?),
        _ => None,
    };
    if reqs.key_reference_saml && saml.is_none() {
        return Err(Error::Configuration(
            "SAML key reference requested without a SAML sender token".into(),
        ));
    }

    let mut ids = IdGenerator::new();
    let mut decoration = HeaderDecoration {
        actor: reqs.actor.clone(),
        ..HeaderDecoration::default()
    };
    let mut keys = HeaderKeys::default();
    let mut sign_ids: Vec<String> = Vec::new();
    let mut encrypt_targets: Vec<EncryptTarget> = Vec::new();

    // Step 1: header children and target ids.
    let with_header = {
        let doc = parse_envelope(message)?;
        let env = Envelope::from_document(&doc)?;
        let id_map = XmlDocument::build_id_map(&doc)?;
        let existing = env.security_header(reqs.actor.as_deref());
        let mut editor = Editor::new();
        let mut assigned: HashMap<roxmltree::NodeId, String> = HashMap::new();
        let mut timestamp = String::new();
        let mut children = String::new();
        let now = Utc::now();

        if reqs.include_timestamp || signer.is_some() {
            match existing.and_then(|h| child_element(h, ns::WSU, ns::node::TIMESTAMP)) {
                Some(timestamp) => {
                    debug!("reusing the existing Timestamp");
                    if signer.is_some() {
                        sign_ids.push(ensure_id(&mut editor, timestamp, &mut ids, &mut assigned)?);
                    }
                }
                None => {
                    let id = ids.next_id("Timestamp");
                    let created = reqs.timestamp_created.unwrap_or(now);
                    timestamp = token::timestamp(&id, &created, reqs.timestamp_timeout_ms)?;
                    if signer.is_some() {
                        sign_ids.push(id);
                    }
                }
            }
        }

        for value in &reqs.signature_confirmations {
            let id = ids.next_id("SignatureConfirmation");
            children.push_str(&token::signature_confirmation(&id, value)?);
            sign_ids.push(id);
        }

        if let Some(SignerPlan::X509 { certificate, .. }) = &signer {
            if reqs.key_reference == KeyReference::BinarySecurityToken && !reqs.key_reference_saml {
                let id = ids.next_id("BinarySecurityToken");
                children.push_str(&token::binary_security_token(&id, certificate)?);
                keys.bst_id = Some(id);
            }
        }

        match &reqs.sender_token {
            Some(SenderToken::UsernameToken(creds)) => {
                let id = ids.next_id("UsernameToken");
                children.push_str(&token::username_token(&id, creds, &now)?);
                if reqs.sign_sender_token {
                    sign_ids.push(id.clone());
                }
                if reqs.encrypt_username_token {
                    encrypt_targets.push(EncryptTarget {
                        locator: Locator::Id(id),
                        data_id: ids.next_id("UsernameToken"),
                        enc_type: EncType::Element,
                    });
                }
            }
            Some(SenderToken::SamlAssertion(_)) => {
                if let Some(saml) = &saml {
                    children.push_str(&saml.xml);
                    if reqs.sign_sender_token {
                        sign_ids.push(saml.id.clone());
                    }
                }
            }
            None => {}
        }

        if let SigningSource::SecureConversation(session) = &reqs.signing_source {
            if signer.is_some() || encryption.is_some() {
                let sct_id = ids.next_id("SecurityContextToken");
                children.push_str(&token::security_context_token(&sct_id, &session.identifier)?);
                let base = token::str_reference(
                    &format!("#{sct_id}"),
                    ns::value_type::SECURITY_CONTEXT_TOKEN,
                )?;
                if signer.is_some() {
                    let id = ids.next_id("DerivedKey-Sig");
                    let dk = token::derived_key_token(&id, &base, &session.secret)?;
                    children.push_str(&dk.xml);
                    keys.signing_dkt = Some((id, dk.key));
                }
                if encryption.is_some() {
                    let id = ids.next_id("DerivedKey-Enc");
                    let dk = token::derived_key_token(&id, &base, &session.secret)?;
                    children.push_str(&dk.xml);
                    keys.encryption_dkt = Some((id, dk.key));
                }
            }
        }

        for selector in &reqs.elements_to_sign {
            for node in select(&doc, &env, &id_map, selector)? {
                let id = ensure_id(&mut editor, node, &mut ids, &mut assigned)?;
                if !sign_ids.contains(&id) {
                    sign_ids.push(id);
                }
            }
        }
        let mut encrypted_nodes = HashSet::new();
        for selector in &reqs.elements_to_encrypt {
            for (index, node) in select(&doc, &env, &id_map, selector)?.into_iter().enumerate() {
                if !encrypted_nodes.insert(node.id()) {
                    continue;
                }
                let locator = match assigned.get(&node.id()).map(String::as_str).or(element_id(node)) {
                    Some(id) => Locator::Id(id.to_owned()),
                    None => Locator::Nth(selector.clone(), index),
                };
                let enc_type = if is_body(node) {
                    EncType::Content
                } else {
                    EncType::Element
                };
                encrypt_targets.push(EncryptTarget {
                    locator,
                    data_id: ids.next_id(node.tag_name().name()),
                    enc_type,
                });
            }
        }

        let data_refs: Vec<String> = encrypt_targets
            .iter()
            .map(|t| format!("#{}", t.data_id))
            .collect();
        let ek_recipient = match (&signer, &encryption) {
            (Some(SignerPlan::EncryptedKey(recipient)), _) => Some(*recipient),
            (_, Some(EncryptionPlan::EncryptedKey(recipient))) => Some(*recipient),
            _ => None,
        };
        if let Some(recipient) = ek_recipient {
            let enc_ctx = enc_context(reqs);
            let session_key = enc_ctx.generate_session_key()?;
            let id = ids.next_id("EK");
            let key_info = token::certificate_reference(recipient, reqs.key_reference, None)?;
            let references: &[String] = if matches!(encryption, Some(EncryptionPlan::EncryptedKey(_))) {
                &data_refs
            } else {
                &[]
            };
            let ek = vaxholm_enc::encrypt::encrypt_key(
                &enc_ctx,
                &session_key,
                recipient.public_key(),
                Some(&id),
                Some(&key_info),
                references,
            )?;
            debug!(ek = %id, recipient = recipient.subject(), "added EncryptedKey");
            children.push_str(&ek.xml);
            decoration.encrypted_key_sha1 = Some(vaxholm_crypto::digest::sha1(&ek.cipher_value));
            decoration.encrypted_key_secret = Some(session_key.clone());
            keys.encrypted_key = Some((id, session_key));
        }
        if matches!(
            encryption,
            Some(EncryptionPlan::DerivedKey(_)) | Some(EncryptionPlan::EncryptedKeySha1 { .. })
        ) {
            children.push_str(&vaxholm_enc::encrypt::reference_list(&data_refs)?);
        }

        // The Timestamp leads the header, ahead of children already there.
        match existing {
            Some(header) if !timestamp.is_empty() && header.has_children() => {
                insert_first_child(&mut editor, header, &timestamp)?;
                if !children.is_empty() {
                    insert_last_child(&mut editor, header, &children)?;
                }
            }
            _ if timestamp.is_empty() && children.is_empty() => {}
            Some(header) => insert_last_child(&mut editor, header, &format!("{timestamp}{children}"))?,
            None => insert_security_header(&mut editor, &env, reqs, &format!("{timestamp}{children}"))?,
        }
        editor.apply(message)?
    };

    // Step 2: signature.
    let signed = match &signer {
        Some(plan) => {
            let (key, signature_uri, key_info) = signing_material(plan, reqs, &keys, saml.as_ref())?;
            let ctx = DsigContext::new()
                .with_digest_uri(&reqs.digest_algorithm)
                .with_signature_uri(&signature_uri);
            let doc = vaxholm_xml::parse(&with_header)?;
            let env = Envelope::from_document(&doc)?;
            let id_map = XmlDocument::build_id_map(&doc)?;

            let mut references = Vec::with_capacity(sign_ids.len());
            for id in &sign_ids {
                let node = XmlDocument::find_by_id(&doc, &id_map, id)
                    .ok_or_else(|| Error::ElementNotFound(format!("#{id}")))?;
                references.push(vaxholm_dsig::sign::digest_reference(
                    &ctx,
                    node,
                    &format!("#{id}"),
                    false,
                )?);
            }
            let signature_id = ids.next_id("Signature");
            let template = vaxholm_dsig::sign::signature_template(
                &ctx,
                &signature_id,
                &references,
                Some(&key_info),
            )?;
            let header = env
                .security_header(reqs.actor.as_deref())
                .ok_or_else(|| Error::XmlStructure("security header disappeared".into()))?;
            let mut editor = Editor::new();
            insert_last_child(&mut editor, header, &template)?;
            let with_template = editor.apply(&with_header)?;

            let (signed, value) = vaxholm_dsig::sign::sign_template(&with_template, &signature_id, &key)?;
            debug!(references = references.len(), signature = %signature_id, "signed");
            decoration.signature_values.push(STANDARD.encode(value));
            signed
        }
        None => with_header,
    };

    // Step 3: encryption.
    let secured = match &encryption {
        Some(plan) if !encrypt_targets.is_empty() => {
            let (key, cipher_uri, key_info) = encryption_material(plan, reqs, &keys)?;
            let ctx = enc_context(reqs).with_cipher_uri(&cipher_uri);
            let doc = vaxholm_xml::parse(&signed)?;
            let env = Envelope::from_document(&doc)?;
            let id_map = XmlDocument::build_id_map(&doc)?;

            let mut editor = Editor::new();
            for target in &encrypt_targets {
                let node = match &target.locator {
                    Locator::Id(id) => XmlDocument::find_by_id(&doc, &id_map, id)
                        .ok_or_else(|| Error::ElementNotFound(format!("#{id}")))?,
                    Locator::Nth(selector, index) => select(&doc, &env, &id_map, selector)?
                        .get(*index)
                        .copied()
                        .ok_or_else(|| Error::ElementNotFound(selector.to_string()))?,
                };
                let range = match target.enc_type {
                    EncType::Element => node.range(),
                    EncType::Content => content_range(node)?,
                };
                let encrypted = vaxholm_enc::encrypt::encrypt_data(
                    &ctx,
                    signed[range.clone()].as_bytes(),
                    &key,
                    Some(&target.data_id),
                    target.enc_type,
                    key_info.as_deref(),
                )?;
                editor.replace(range, encrypted);
            }
            debug!(targets = encrypt_targets.len(), cipher = %cipher_uri, "encrypted");
            editor.apply(&signed)?
        }
        _ => signed,
    };

    Ok((secured, decoration))
}

fn enc_context(reqs: &DecorationRequirements) -> EncContext {
    EncContext::new()
        .with_cipher_uri(&reqs.encryption_algorithm)
        .with_key_transport_uri(&reqs.key_encryption_algorithm)
}

/// Signing key, signature method and `KeyInfo` content.
fn signing_material(
    plan: &SignerPlan<'_>,
    reqs: &DecorationRequirements,
    keys: &HeaderKeys,
    saml: Option<&SamlToken>,
) -> Result<(SigningKey, String, String), Error> {
    match plan {
        SignerPlan::X509 {
            certificate,
            private_key,
        } => {
            let key_info = match saml.filter(|_| reqs.key_reference_saml) {
                Some(saml) => token::str_key_identifier(saml.value_type, &saml.id, false)?,
                None => token::certificate_reference(certificate, reqs.key_reference, keys.bst_id.as_deref())?,
            };
            Ok((
                SigningKey::Rsa((*private_key).clone()),
                reqs.signature_algorithm.clone(),
                key_info,
            ))
        }
        SignerPlan::DerivedKey(_) => {
            let (id, key) = keys
                .signing_dkt
                .as_ref()
                .ok_or_else(|| Error::Other("no derived signing key".into()))?;
            Ok((
                SigningKey::Hmac(key.clone()),
                algorithm::DEFAULT_HMAC.to_owned(),
                token::str_reference(&format!("#{id}"), ns::value_type::DERIVED_KEY_TOKEN)?,
            ))
        }
        SignerPlan::EncryptedKeySha1 { sha1, secret } => Ok((
            SigningKey::Hmac(secret.to_vec()),
            algorithm::DEFAULT_HMAC.to_owned(),
            token::str_key_identifier(
                ns::value_type::ENCRYPTED_KEY_SHA1,
                &STANDARD.encode(sha1),
                true,
            )?,
        )),
        SignerPlan::EncryptedKey(_) => {
            let (id, key) = keys
                .encrypted_key
                .as_ref()
                .ok_or_else(|| Error::Other("no encrypted signing key".into()))?;
            Ok((
                SigningKey::Hmac(key.clone()),
                algorithm::DEFAULT_HMAC.to_owned(),
                token::str_reference(&format!("#{id}"), ns::value_type::ENCRYPTED_KEY)?,
            ))
        }
    }
}

/// Data key, cipher and `EncryptedData` `KeyInfo` content.
fn encryption_material(
    plan: &EncryptionPlan<'_>,
    reqs: &DecorationRequirements,
    keys: &HeaderKeys,
) -> Result<(Vec<u8>, String, Option<String>), Error> {
    match plan {
        EncryptionPlan::EncryptedKey(_) => {
            let (_, key) = keys
                .encrypted_key
                .as_ref()
                .ok_or_else(|| Error::Other("no encrypted session key".into()))?;
            Ok((key.clone(), reqs.encryption_algorithm.clone(), None))
        }
        EncryptionPlan::DerivedKey(_) => {
            let (id, key) = keys
                .encryption_dkt
                .as_ref()
                .ok_or_else(|| Error::Other("no derived encryption key".into()))?;
            let configured = vaxholm_crypto::cipher::from_uri(&reqs.encryption_algorithm)?;
            let cipher_uri = if configured.key_size() == DERIVED_KEY_LENGTH {
                reqs.encryption_algorithm.clone()
            } else {
                debug!(configured = %reqs.encryption_algorithm, "derived keys use AES-256-CBC");
                algorithm::AES256_CBC.to_owned()
            };
            let key_info = token::str_reference(&format!("#{id}"), ns::value_type::DERIVED_KEY_TOKEN)?;
            Ok((key.clone(), cipher_uri, Some(key_info)))
        }
        EncryptionPlan::EncryptedKeySha1 { sha1, secret } => {
            let size = vaxholm_crypto::cipher::from_uri(&reqs.encryption_algorithm)?.key_size();
            if secret.len() < size {
                return Err(Error::Configuration(format!(
                    "encrypted key secret is shorter than the {size}-byte cipher key"
                )));
            }
            let key_info = token::str_key_identifier(
                ns::value_type::ENCRYPTED_KEY_SHA1,
                &STANDARD.encode(sha1),
                true,
            )?;
            Ok((secret[..size].to_vec(), reqs.encryption_algorithm.clone(), Some(key_info)))
        }
    }
}

// ── Helper functions ─────────────────────────────────────────────────

fn select<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
    env: &Envelope<'a, 'input>,
    id_map: &HashMap<String, roxmltree::NodeId>,
    selector: &ElementSelector,
) -> Result<Vec<roxmltree::Node<'a, 'input>>, Error> {
    let found = match selector {
        ElementSelector::Body => vec![env.body],
        ElementSelector::Id(id) => XmlDocument::find_by_id(doc, id_map, id).into_iter().collect(),
        ElementSelector::Name {
            namespace,
            local_name,
        } => XmlDocument::find_elements(doc, namespace, local_name),
    };
    if found.is_empty() {
        return Err(Error::ElementNotFound(selector.to_string()));
    }
    Ok(found)
}

/// The element's id, adding a `wsu:Id` when it has none.
fn ensure_id(
    editor: &mut Editor,
    node: roxmltree::Node<'_, '_>,
    ids: &mut IdGenerator,
    assigned: &mut HashMap<roxmltree::NodeId, String>,
) -> Result<String, Error> {
    if let Some(id) = assigned.get(&node.id()) {
        return Ok(id.clone());
    }
    let id = match element_id(node) {
        Some(id) => id.to_owned(),
        None => {
            let id = ids.next_id(node.tag_name().name());
            let attribute = match node.lookup_prefix(ns::WSU) {
                Some(prefix) if !prefix.is_empty() => format!("{prefix}:Id=\"{id}\""),
                _ => format!("xmlns:wsu=\"{}\" wsu:Id=\"{id}\"", ns::WSU),
            };
            add_attribute(editor, node, &attribute)?;
            id
        }
    };
    assigned.insert(node.id(), id.clone());
    Ok(id)
}

/// Stage a new `wsse:Security` header (and `Header`, when missing).
fn insert_security_header(
    editor: &mut Editor,
    env: &Envelope<'_, '_>,
    reqs: &DecorationRequirements,
    children: &str,
) -> Result<(), Error> {
    let version = env.version;
    let (prefix, declare) = match env.prefix() {
        "" => ("soapenv", true),
        prefix => (prefix, false),
    };
    let xmlns = format!("xmlns:{prefix}");
    let actor_attr = format!("{prefix}:{}", version.actor_attribute());
    let must_understand_attr = format!("{prefix}:{}", ns::attr::MUST_UNDERSTAND);

    let mut attrs: Vec<(&str, &str)> = vec![("xmlns:wsse", ns::WSSE)];
    if declare {
        attrs.push((&xmlns, version.namespace()));
    }
    if let Some(actor) = &reqs.actor {
        attrs.push((&actor_attr, actor));
    }
    if reqs.must_understand {
        attrs.push((&must_understand_attr, version.must_understand_true()));
    }

    let mut w = XmlWriter::new();
    w.start_element("wsse:Security", &attrs);
    w.write_raw(children);
    w.end_element()?;
    let security = w.into_string()?;

    match env.header {
        Some(header) => insert_last_child(editor, header, &security),
        None => {
            let qname = match env.prefix() {
                "" => ns::node::HEADER.to_owned(),
                prefix => format!("{prefix}:{}", ns::node::HEADER),
            };
            insert_first_child(editor, env.envelope, &format!("<{qname}>{security}</{qname}>"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requirements::UsernameTokenCredentials;
    use vaxholm_xml::document::child_elements;

    const MESSAGE: &str = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><m:ping xmlns:m="urn:ping">hello</m:ping></soap:Body></soap:Envelope>"#;

    fn alice() -> (X509Cert, rsa::RsaPrivateKey) {
        (
            X509Cert::from_pem(include_bytes!("../../../testdata/alice-cert.pem")).unwrap(),
            vaxholm_keys::loader::load_private_key(include_bytes!("../../../testdata/alice-key.pem")).unwrap(),
        )
    }

    fn bob_cert() -> X509Cert {
        X509Cert::from_pem(include_bytes!("../../../testdata/bob-cert.pem")).unwrap()
    }

    fn header_children(xml: &str) -> Vec<String> {
        let doc = vaxholm_xml::parse(xml).unwrap();
        let env = Envelope::from_document(&doc).unwrap();
        let header = env.security_header(None).unwrap();
        header
            .children()
            .filter(|n| n.is_element())
            .map(|n| n.tag_name().name().to_owned())
            .collect()
    }

    #[test]
    fn test_timestamp_only() {
        let result = WssDecorator::new()
            .decorate(MESSAGE, &DecorationRequirements::new())
            .unwrap();
        assert_eq!(header_children(&result.xml), vec!["Timestamp"]);
        assert!(result.headers[0].signature_values.is_empty());
    }

    #[test]
    fn test_header_order_when_signing_and_encrypting() {
        let (cert, key) = alice();
        let reqs = DecorationRequirements::new()
            .with_sender_certificate(cert, key)
            .with_recipient_certificate(bob_cert())
            .with_signature_confirmation("abc=")
            .sign(ElementSelector::Body)
            .encrypt(ElementSelector::Body);
        let result = WssDecorator::new().decorate(MESSAGE, &reqs).unwrap();
        assert_eq!(
            header_children(&result.xml),
            vec![
                "Timestamp",
                "SignatureConfirmation",
                "BinarySecurityToken",
                "EncryptedKey",
                "Signature"
            ]
        );
        let header = &result.headers[0];
        assert_eq!(header.signature_values.len(), 1);
        assert_eq!(header.encrypted_key_secret.as_ref().unwrap().len(), 16);
        assert_eq!(header.encrypted_key_sha1.as_ref().unwrap().len(), 20);
        assert!(!result.xml.contains("hello"));
    }

    #[test]
    fn test_body_is_content_encrypted() {
        let reqs = DecorationRequirements::new()
            .with_recipient_certificate(bob_cert())
            .encrypt(ElementSelector::Body);
        let result = WssDecorator::new().decorate(MESSAGE, &reqs).unwrap();
        let doc = vaxholm_xml::parse(&result.xml).unwrap();
        let env = Envelope::from_document(&doc).unwrap();
        let data = child_elements(env.body, ns::ENC, ns::node::ENCRYPTED_DATA);
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].attribute("Type"), Some(ns::ENC_TYPE_CONTENT));
    }

    #[test]
    fn test_signing_without_key_fails() {
        let reqs = DecorationRequirements::new().sign(ElementSelector::Body);
        let err = WssDecorator::new().decorate(MESSAGE, &reqs).unwrap_err();
        assert!(matches!(err, Error::Configuration(ref m) if m.contains("no key available")));
    }

    #[test]
    fn test_encryption_without_recipient_fails() {
        let (cert, key) = alice();
        let reqs = DecorationRequirements::new()
            .with_sender_certificate(cert, key)
            .encrypt(ElementSelector::Body);
        let err = WssDecorator::new().decorate(MESSAGE, &reqs).unwrap_err();
        assert!(matches!(err, Error::Configuration(ref m) if m.contains("no recipient key")));
    }

    #[test]
    fn test_missing_element() {
        let (cert, key) = alice();
        let reqs = DecorationRequirements::new()
            .with_sender_certificate(cert, key)
            .sign(ElementSelector::Id("nope".into()));
        let err = WssDecorator::new().decorate(MESSAGE, &reqs).unwrap_err();
        assert!(matches!(err, Error::ElementNotFound(ref m) if m == "#nope"));
    }

    #[test]
    fn test_duplicate_actor_rejected() {
        let reqs = DecorationRequirements::new().with_actor("urn:a");
        let err = WssDecorator::new()
            .decorate_all(MESSAGE, &[reqs.clone(), reqs])
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_unprefixed_envelope_gets_declared_prefix() {
        let msg = r#"<Envelope xmlns="http://www.w3.org/2003/05/soap-envelope"><Body/></Envelope>"#;
        let reqs = DecorationRequirements::new().with_actor("urn:next");
        let result = WssDecorator::new().decorate(msg, &reqs).unwrap();
        let doc = vaxholm_xml::parse(&result.xml).unwrap();
        let env = Envelope::from_document(&doc).unwrap();
        assert!(env.security_header(Some("urn:next")).is_some());
    }

    #[test]
    fn test_thumbprint_reference_has_no_bst() {
        let (cert, key) = alice();
        let reqs = DecorationRequirements::new()
            .with_sender_certificate(cert, key)
            .with_key_reference(KeyReference::Thumbprint)
            .sign(ElementSelector::Body);
        let result = WssDecorator::new().decorate(MESSAGE, &reqs).unwrap();
        assert_eq!(header_children(&result.xml), vec!["Timestamp", "Signature"]);
        assert!(result.xml.contains(ns::value_type::THUMBPRINT_SHA1));
    }

    #[test]
    fn test_username_token_encrypted_in_place() {
        let reqs = DecorationRequirements::new()
            .with_recipient_certificate(bob_cert())
            .with_sender_token(
                SenderToken::UsernameToken(UsernameTokenCredentials::new("alice", Some("pw".into()))),
                false,
            )
            .with_encrypt_username_token(true);
        let result = WssDecorator::new().decorate(MESSAGE, &reqs).unwrap();
        assert_eq!(
            header_children(&result.xml),
            vec!["Timestamp", "EncryptedData", "EncryptedKey"]
        );
        assert!(!result.xml.contains("alice"));
    }

    const WITH_HEADER: &str = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Header><wsse:Security xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd"><x:Extra xmlns:x="urn:extra"/></wsse:Security></soap:Header><soap:Body><m:ping xmlns:m="urn:ping">hello</m:ping></soap:Body></soap:Envelope>"#;

    #[test]
    fn test_timestamp_leads_existing_header() {
        let result = WssDecorator::new()
            .decorate(WITH_HEADER, &DecorationRequirements::new())
            .unwrap();
        assert_eq!(header_children(&result.xml), vec!["Timestamp", "Extra"]);

        let (cert, key) = alice();
        let reqs = DecorationRequirements::new()
            .with_sender_certificate(cert, key)
            .sign(ElementSelector::Body);
        let result = WssDecorator::new().decorate(WITH_HEADER, &reqs).unwrap();
        assert_eq!(
            header_children(&result.xml),
            vec!["Timestamp", "Extra", "BinarySecurityToken", "Signature"]
        );
    }

    #[test]
    fn test_input_untouched_on_failure() {
        let reqs = DecorationRequirements::new()
            .with_recipient_certificate(bob_cert())
            .encrypt(ElementSelector::name("urn:ping", "absent"));
        let message = MESSAGE.to_owned();
        assert!(WssDecorator::new().decorate(&message, &reqs).is_err());
        assert_eq!(message, MESSAGE);
    }
}
