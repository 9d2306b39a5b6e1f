#![forbid(unsafe_code)]

//! Security header tokens: serialization of timestamps, binary security
//! tokens, username tokens, security context and derived-key tokens, and
//! `SecurityTokenReference` forms.

use crate::requirements::{KeyReference, UsernameTokenCredentials};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use vaxholm_core::{algorithm, ns, Error};
use vaxholm_crypto::kdf::{MAX_DERIVED_KEY_LENGTH, MAX_DERIVED_KEY_OFFSET};
use vaxholm_keys::X509Cert;
use vaxholm_xml::document::{base64_content, child_element, element_text};
use vaxholm_xml::XmlWriter;

/// Label used when writing derived-key tokens.
pub const DERIVED_KEY_LABEL: &str = "WS-SecureConversation";

/// Label assumed when a derived-key token has none.
pub const DEFAULT_DERIVED_KEY_LABEL: &str = "WS-SecureConversationWS-SecureConversation";

pub const DERIVED_KEY_LENGTH: usize = 32;
pub const DERIVED_KEY_NONCE_LENGTH: usize = 32;

// ── Ids and time ─────────────────────────────────────────────────────

/// Generates `basename-count-hex` ids, unique within and across messages.
#[derive(Debug, Default)]
pub struct IdGenerator {
    count: usize,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self, basename: &str) -> String {
        self.count += 1;
        let suffix: String = vaxholm_crypto::random_bytes(16)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        format!("{basename}-{}-{suffix}", self.count)
    }
}

/// `YYYY-MM-DDTHH:MM:SS.mmmZ`
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

// ── Header children ──────────────────────────────────────────────────

pub fn timestamp(id: &str, created: &DateTime<Utc>, timeout_ms: u64) -> Result<String, Error> {
    let timeout = i64::try_from(timeout_ms)
        .map(Duration::milliseconds)
        .map_err(|_| Error::Configuration(format!("timestamp timeout too large: {timeout_ms}")))?;
    let expires = *created + timeout;

    let mut w = XmlWriter::new();
    w.start_element(
        "wsu:Timestamp",
        &[("xmlns:wsu", ns::WSU), ("wsu:Id", id)],
    );
    w.text_element("wsu:Created", &[], &format_time(created));
    w.text_element("wsu:Expires", &[], &format_time(&expires));
    w.end_element()?;
    w.into_string()
}

pub fn signature_confirmation(id: &str, value: &str) -> Result<String, Error> {
    let mut attrs = vec![
        ("xmlns:wsse11", ns::WSSE11),
        ("xmlns:wsu", ns::WSU),
        ("wsu:Id", id),
    ];
    if !value.is_empty() {
        attrs.push(("Value", value));
    }
    let mut w = XmlWriter::new();
    w.empty_element("wsse11:SignatureConfirmation", &attrs);
    w.into_string()
}

pub fn binary_security_token(id: &str, cert: &X509Cert) -> Result<String, Error> {
    let mut w = XmlWriter::new();
    w.text_element(
        "wsse:BinarySecurityToken",
        &[
            ("xmlns:wsse", ns::WSSE),
            ("xmlns:wsu", ns::WSU),
            ("EncodingType", ns::value_type::BASE64_BINARY),
            ("ValueType", ns::value_type::X509V3),
            ("wsu:Id", id),
        ],
        &STANDARD.encode(cert.der()),
    );
    w.into_string()
}

pub fn username_token(
    id: &str,
    creds: &UsernameTokenCredentials,
    now: &DateTime<Utc>,
) -> Result<String, Error> {
    let mut w = XmlWriter::new();
    w.start_element(
        "wsse:UsernameToken",
        &[("xmlns:wsse", ns::WSSE), ("xmlns:wsu", ns::WSU), ("wsu:Id", id)],
    );
    w.text_element("wsse:Username", &[], &creds.username);
    if let Some(password) = &creds.password {
        w.text_element(
            "wsse:Password",
            &[("Type", ns::value_type::PASSWORD_TEXT)],
            password,
        );
    }
    if creds.include_nonce {
        w.text_element(
            "wsse:Nonce",
            &[("EncodingType", ns::value_type::BASE64_BINARY)],
            &STANDARD.encode(vaxholm_crypto::random_bytes(16)),
        );
        w.text_element("wsu:Created", &[], &format_time(now));
    }
    w.end_element()?;
    w.into_string()
}

pub fn security_context_token(id: &str, identifier: &str) -> Result<String, Error> {
    let mut w = XmlWriter::new();
    w.start_element(
        "wsc:SecurityContextToken",
        &[("xmlns:wsc", ns::WSSC), ("xmlns:wsu", ns::WSU), ("wsu:Id", id)],
    );
    w.text_element("wsc:Identifier", &[], identifier);
    w.end_element()?;
    w.into_string()
}

/// A derived-key token ready to insert, with its key.
pub struct DerivedKey {
    pub xml: String,
    pub key: Vec<u8>,
}

/// Derive a fresh key from `secret` and serialize the token that lets
/// the recipient derive it again. `base_reference` is the STR naming the
/// secret's token.
pub fn derived_key_token(id: &str, base_reference: &str, secret: &[u8]) -> Result<DerivedKey, Error> {
    let nonce = vaxholm_crypto::random_bytes(DERIVED_KEY_NONCE_LENGTH);
    let params = DerivedKeyParams {
        label: DERIVED_KEY_LABEL.to_owned(),
        nonce,
        offset: 0,
        length: DERIVED_KEY_LENGTH,
    };
    let key = params.derive(secret)?;

    let mut w = XmlWriter::new();
    w.start_element(
        "wsc:DerivedKeyToken",
        &[
            ("xmlns:wsc", ns::WSSC),
            ("xmlns:wsu", ns::WSU),
            ("Algorithm", algorithm::P_SHA1),
            ("wsu:Id", id),
        ],
    );
    w.write_raw(base_reference);
    w.text_element("wsc:Generation", &[], "0");
    w.text_element("wsc:Length", &[], &params.length.to_string());
    w.text_element("wsc:Label", &[], &params.label);
    w.text_element("wsc:Nonce", &[], &STANDARD.encode(&params.nonce));
    w.end_element()?;
    Ok(DerivedKey {
        xml: w.into_string()?,
        key,
    })
}

/// Parameters of a `wsc:DerivedKeyToken`.
#[derive(Debug, Clone)]
pub struct DerivedKeyParams {
    pub label: String,
    pub nonce: Vec<u8>,
    pub offset: usize,
    pub length: usize,
}

impl DerivedKeyParams {
    /// Read the parameters of a token in either WS-SC namespace.
    pub fn parse(node: roxmltree::Node<'_, '_>) -> Result<Self, Error> {
        let wsc = node.tag_name().namespace().unwrap_or(ns::WSSC);
        if let Some(uri) = node.attribute(ns::attr::ALGORITHM) {
            if !vaxholm_crypto::kdf::is_p_sha1(uri) {
                return Err(Error::UnsupportedAlgorithm(format!("key derivation: {uri}")));
            }
        }
        let number = |local: &str| -> Result<Option<usize>, Error> {
            child_element(node, wsc, local)
                .map(|n| {
                    element_text(n)
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| Error::XmlStructure(format!("invalid DerivedKeyToken {local}")))
                })
                .transpose()
        };

        let length = number(ns::node::LENGTH)?.unwrap_or(DERIVED_KEY_LENGTH);
        if length == 0 || length > MAX_DERIVED_KEY_LENGTH {
            return Err(Error::InvalidToken(format!("DerivedKeyToken Length {length}")));
        }
        let offset = match number(ns::node::OFFSET)? {
            Some(offset) => offset,
            None => number(ns::node::GENERATION)?
                .unwrap_or(0)
                .checked_mul(length)
                .ok_or_else(|| Error::InvalidToken("DerivedKeyToken Generation overflow".into()))?,
        };
        if offset > MAX_DERIVED_KEY_OFFSET {
            return Err(Error::InvalidToken(format!("DerivedKeyToken offset {offset}")));
        }
        let label = child_element(node, wsc, ns::node::LABEL)
            .map(element_text)
            .unwrap_or_else(|| {
                debug!("DerivedKeyToken without Label, using the default");
                DEFAULT_DERIVED_KEY_LABEL.to_owned()
            });
        let nonce = child_element(node, wsc, ns::node::NONCE)
            .ok_or_else(|| Error::MissingElement("Nonce in DerivedKeyToken".into()))
            .and_then(base64_content)?;

        Ok(Self {
            label,
            nonce,
            offset,
            length,
        })
    }

    /// P_SHA1(secret, label ‖ nonce) at `offset`, `length` bytes long.
    pub fn derive(&self, secret: &[u8]) -> Result<Vec<u8>, Error> {
        let mut seed = self.label.as_bytes().to_vec();
        seed.extend_from_slice(&self.nonce);
        vaxholm_crypto::kdf::p_sha1(secret, &seed, self.offset, self.length)
    }
}

// ── SecurityTokenReference ───────────────────────────────────────────

/// STR with a direct `wsse:Reference`.
pub fn str_reference(uri: &str, value_type: &str) -> Result<String, Error> {
    let mut w = XmlWriter::new();
    w.start_element("wsse:SecurityTokenReference", &[("xmlns:wsse", ns::WSSE)]);
    w.empty_element("wsse:Reference", &[("URI", uri), ("ValueType", value_type)]);
    w.end_element()?;
    w.into_string()
}

/// STR with a `wsse:KeyIdentifier`.
pub fn str_key_identifier(value_type: &str, value: &str, base64: bool) -> Result<String, Error> {
    let mut attrs = vec![("ValueType", value_type)];
    if base64 {
        attrs.push(("EncodingType", ns::value_type::BASE64_BINARY));
    }
    let mut w = XmlWriter::new();
    w.start_element("wsse:SecurityTokenReference", &[("xmlns:wsse", ns::WSSE)]);
    w.text_element("wsse:KeyIdentifier", &attrs, value);
    w.end_element()?;
    w.into_string()
}

/// STR with `ds:X509Data/ds:X509IssuerSerial`.
pub fn str_issuer_serial(cert: &X509Cert) -> Result<String, Error> {
    let mut w = XmlWriter::new();
    w.start_element("wsse:SecurityTokenReference", &[("xmlns:wsse", ns::WSSE)]);
    w.start_element("ds:X509Data", &[("xmlns:ds", ns::DSIG)]);
    w.start_element("ds:X509IssuerSerial", &[]);
    w.text_element("ds:X509IssuerName", &[], cert.issuer());
    w.text_element("ds:X509SerialNumber", &[], cert.serial());
    w.end_element()?;
    w.end_element()?;
    w.end_element()?;
    w.into_string()
}

/// Reference to a certificate in the requested style. `bst_id` is the
/// id of the `BinarySecurityToken` carrying it, when one was inserted.
pub fn certificate_reference(
    cert: &X509Cert,
    style: KeyReference,
    bst_id: Option<&str>,
) -> Result<String, Error> {
    match (style, bst_id) {
        (KeyReference::BinarySecurityToken, Some(id)) => {
            str_reference(&format!("#{id}"), ns::value_type::X509V3)
        }
        (KeyReference::IssuerSerial, _) => str_issuer_serial(cert),
        (KeyReference::SubjectKeyIdentifier, _) => match cert.ski() {
            Some(ski) => str_key_identifier(ns::value_type::SKI, &STANDARD.encode(ski), true),
            None => {
                debug!(subject = cert.subject(), "certificate has no SKI, using thumbprint");
                thumbprint_reference(cert)
            }
        },
        (KeyReference::Thumbprint, _) => thumbprint_reference(cert),
        (KeyReference::BinarySecurityToken, None) => {
            debug!(subject = cert.subject(), "no BinarySecurityToken, using thumbprint");
            thumbprint_reference(cert)
        }
    }
}

fn thumbprint_reference(cert: &X509Cert) -> Result<String, Error> {
    str_key_identifier(
        ns::value_type::THUMBPRINT_SHA1,
        &STANDARD.encode(cert.thumbprint_sha1()),
        true,
    )
}
