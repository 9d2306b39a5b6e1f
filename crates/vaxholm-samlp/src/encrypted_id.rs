#![forbid(unsafe_code)]

//! SAML 2.0 `saml:EncryptedID`.
//!
//! The name element is element-encrypted with AES-128-CBC under a fresh
//! session key; the session key travels in an `xenc:EncryptedKey` inside
//! the `EncryptedData` `KeyInfo`, itself identifying the recipient by an
//! embedded certificate.

use crate::name_id::NameId;
use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::debug;
use vaxholm_core::{algorithm, ns, Error};
use vaxholm_enc::{decrypt, encrypt, EncContext, EncType};
use vaxholm_keys::{SecurityTokenResolver, X509Cert};
use vaxholm_xml::document::{base64_content, child_element, decode_base64, element_text};
use vaxholm_xml::XmlWriter;

/// The result of decrypting an `EncryptedID`.
#[derive(Debug, Clone)]
pub struct DecryptedId {
    pub name_id: NameId,
    /// The decrypted element as serialized.
    pub xml: String,
    /// Data cipher then key transport URIs.
    pub encryption_methods: Vec<String>,
    pub recipient: X509Cert,
}

/// `<saml:EncryptedID>` for `name_xml`, a standalone `saml:NameID`.
pub fn encrypt_name_id(name_xml: &str, recipient: &X509Cert, use_oaep: bool) -> Result<String, Error> {
    let transport = if use_oaep {
        algorithm::RSA_OAEP
    } else {
        algorithm::RSA_PKCS1
    };
    let ctx = EncContext::new()
        .with_cipher_uri(algorithm::AES128_CBC)
        .with_key_transport_uri(transport);
    let session_key = ctx.generate_session_key()?;

    let recipient_info = format!(
        "<ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data>",
        STANDARD.encode(recipient.der())
    );
    let encrypted_key = encrypt::encrypt_key(
        &ctx,
        &session_key,
        recipient.public_key(),
        None,
        Some(&recipient_info),
        &[],
    )?;
    let encrypted_data = encrypt::encrypt_data(
        &ctx,
        name_xml.as_bytes(),
        &session_key,
        None,
        EncType::Element,
        Some(&encrypted_key.xml),
    )?;
    debug!(transport, recipient = recipient.subject(), "encrypted subject name");

    let mut w = XmlWriter::new();
    w.start_element("saml:EncryptedID", &[("xmlns:saml", ns::SAML2)]);
    w.write_raw(&encrypted_data);
    w.end_element()?;
    w.into_string()
}

/// Decrypt an `EncryptedID`, finding the recipient key through `resolver`.
///
/// The plaintext must be exactly one `saml:NameID` element.
pub fn decrypt_encrypted_id(
    node: roxmltree::Node<'_, '_>,
    resolver: &dyn SecurityTokenResolver,
) -> Result<DecryptedId, Error> {
    let data_node = child_element(node, ns::ENC, ns::node::ENCRYPTED_DATA)
        .ok_or_else(|| Error::MissingElement("EncryptedData in EncryptedID".into()))?;
    let data = decrypt::parse_encrypted_data(data_node)?;
    let key_node = data
        .key_info
        .and_then(|ki| child_element(ki, ns::ENC, ns::node::ENCRYPTED_KEY))
        .or_else(|| child_element(node, ns::ENC, ns::node::ENCRYPTED_KEY))
        .ok_or_else(|| Error::UnresolvedKey("no EncryptedKey for EncryptedID".into()))?;
    let key = decrypt::parse_encrypted_key(key_node)?;

    let recipient = key
        .key_info
        .map(|ki| recipient_certificate(ki, resolver))
        .transpose()?
        .flatten()
        .ok_or_else(|| Error::UnresolvedKey("EncryptedID recipient certificate".into()))?;
    let private_key = resolver
        .resolve_private_key_for_certificate(&recipient)
        .ok_or_else(|| {
            Error::UnresolvedKey(format!("no private key for {}", recipient.subject()))
        })?;

    let plaintext = decrypt::decrypt_with_embedded_key(&data, &private_key)?;
    decrypt::check_plaintext(data.node, &plaintext)?;
    let wrapped = decrypt::in_context(data.node, &plaintext);
    let doc = vaxholm_xml::parse(&wrapped)?;
    let elements: Vec<_> = doc.root_element().children().filter(|n| n.is_element()).collect();
    let [element] = elements.as_slice() else {
        return Err(Error::Decryption(format!(
            "EncryptedID decrypted to {} elements",
            elements.len()
        )));
    };
    if !vaxholm_xml::document::is_element(*element, ns::SAML2, ns::node::NAME_ID) {
        return Err(Error::Decryption(format!(
            "EncryptedID decrypted to unexpected element {}",
            element.tag_name().name()
        )));
    }

    Ok(DecryptedId {
        name_id: NameId::read(*element),
        xml: plaintext.trim().to_owned(),
        encryption_methods: vec![data.algorithm.clone(), key.algorithm.clone()],
        recipient,
    })
}

/// Certificate named by an `EncryptedKey` `KeyInfo`: an embedded
/// certificate, an SKI or issuer/serial, or a `SecurityTokenReference`
/// key identifier.
fn recipient_certificate(
    key_info: roxmltree::Node<'_, '_>,
    resolver: &dyn SecurityTokenResolver,
) -> Result<Option<X509Cert>, Error> {
    if let Some(data) = child_element(key_info, ns::DSIG, ns::node::X509_DATA) {
        if let Some(cert) = child_element(data, ns::DSIG, ns::node::X509_CERTIFICATE) {
            return Ok(Some(X509Cert::from_der(&base64_content(cert)?)?));
        }
        if let Some(ski) = child_element(data, ns::DSIG, ns::node::X509_SKI) {
            return Ok(resolver.resolve_certificate_by_ski(&base64_content(ski)?));
        }
        if let Some(issuer_serial) = child_element(data, ns::DSIG, ns::node::X509_ISSUER_SERIAL) {
            let part = |local: &str| {
                child_element(issuer_serial, ns::DSIG, local)
                    .map(element_text)
                    .unwrap_or_default()
            };
            let issuer = part(ns::node::X509_ISSUER_NAME);
            let serial = part(ns::node::X509_SERIAL_NUMBER);
            return Ok(resolver.resolve_certificate_by_issuer_serial(issuer.trim(), serial.trim()));
        }
        return Ok(None);
    }
    let Some(identifier) = child_element(key_info, ns::WSSE, ns::node::SECURITY_TOKEN_REFERENCE)
        .and_then(|r| child_element(r, ns::WSSE, ns::node::KEY_IDENTIFIER))
    else {
        return Ok(None);
    };
    let value = decode_base64(&element_text(identifier))?;
    Ok(match identifier.attribute(ns::attr::VALUE_TYPE).unwrap_or_default() {
        ns::value_type::SKI => resolver.resolve_certificate_by_ski(&value),
        ns::value_type::THUMBPRINT_SHA1 => resolver.resolve_certificate_by_thumbprint(&value),
        other => {
            debug!(value_type = other, "unsupported KeyIdentifier on EncryptedID key");
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::SamlVersion;
    use vaxholm_keys::SimpleSecurityTokenResolver;

    fn bob() -> (X509Cert, rsa::RsaPrivateKey) {
        (
            X509Cert::from_pem(include_bytes!("../../../testdata/bob-cert.pem")).unwrap(),
            vaxholm_keys::loader::load_private_key(include_bytes!("../../../testdata/bob-key.pem"))
                .unwrap(),
        )
    }

    fn encrypted(use_oaep: bool) -> String {
        let (cert, _) = bob();
        let name = NameId::new("alice@example.com").with_format(crate::version::format::NAMEID_EMAIL);
        encrypt_name_id(&name.to_standalone_xml(SamlVersion::Saml2).unwrap(), &cert, use_oaep).unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let (cert, key) = bob();
        let mut resolver = SimpleSecurityTokenResolver::new();
        resolver.add_key_pair(cert.clone(), key);

        let xml = encrypted(false);
        assert!(xml.contains(algorithm::RSA_PKCS1));
        assert!(!xml.contains("alice@example.com"));
        let doc = vaxholm_xml::parse(&xml).unwrap();
        let decrypted = decrypt_encrypted_id(doc.root_element(), &resolver).unwrap();
        assert_eq!(decrypted.name_id.value, "alice@example.com");
        assert_eq!(decrypted.recipient, cert);
        assert_eq!(
            decrypted.encryption_methods,
            vec![algorithm::AES128_CBC.to_owned(), algorithm::RSA_PKCS1.to_owned()]
        );
    }

    #[test]
    fn test_oaep() {
        let (cert, key) = bob();
        let mut resolver = SimpleSecurityTokenResolver::new();
        resolver.add_key_pair(cert, key);
        let xml = encrypted(true);
        assert!(xml.contains(algorithm::RSA_OAEP));
        assert!(!xml.contains(algorithm::RSA_PKCS1));
        let doc = vaxholm_xml::parse(&xml).unwrap();
        assert!(decrypt_encrypted_id(doc.root_element(), &resolver).is_ok());
    }

    #[test]
    fn test_without_private_key() {
        let (cert, _) = bob();
        let mut resolver = SimpleSecurityTokenResolver::new();
        resolver.add_certificate(cert);
        let xml = encrypted(false);
        let doc = vaxholm_xml::parse(&xml).unwrap();
        assert!(matches!(
            decrypt_encrypted_id(doc.root_element(), &resolver),
            Err(Error::UnresolvedKey(_))
        ));
    }
}
