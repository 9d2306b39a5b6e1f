#![forbid(unsafe_code)]

//! XML-DSig signature verification.
//!
//! Processing order:
//! 1. Read `SignedInfo`: CanonicalizationMethod, SignatureMethod, References
//! 2. For each `Reference`: resolve the same-document URI, run transforms, compare digests
//! 3. Canonicalize `SignedInfo` and check `SignatureValue` with the caller's key
//!
//! Key resolution from `KeyInfo` belongs to the caller, which knows the
//! token profile in use.

use vaxholm_c14n::C14nMode;
use vaxholm_core::{algorithm, ns, Error};
use vaxholm_crypto::{digest, sign::SigningKey};
use vaxholm_xml::document::{base64_content, child_element, child_elements, is_element};
use vaxholm_xml::XmlDocument;
use std::collections::HashMap;
use tracing::debug;

/// A parsed `ds:Signature` element.
#[derive(Debug)]
pub struct SignatureInfo<'a, 'input> {
    pub node: roxmltree::Node<'a, 'input>,
    pub signed_info: roxmltree::Node<'a, 'input>,
    pub c14n: C14nMode,
    pub inclusive_prefixes: Vec<String>,
    pub signature_method: String,
    pub references: Vec<ReferenceInfo>,
    pub signature_value: Vec<u8>,
    pub key_info: Option<roxmltree::Node<'a, 'input>>,
}

/// A parsed `ds:Reference`.
#[derive(Debug, Clone)]
pub struct ReferenceInfo {
    pub uri: String,
    pub enveloped: bool,
    pub c14n: C14nMode,
    pub inclusive_prefixes: Vec<String>,
    pub digest_method: String,
    pub digest_value: Vec<u8>,
}

/// Outcome of a successful verification.
#[derive(Debug, Clone)]
pub struct VerifiedSignature {
    /// The elements covered by the references, in reference order.
    pub signed_nodes: Vec<roxmltree::NodeId>,
    pub signature_value: Vec<u8>,
}

/// Parse a `ds:Signature` element.
pub fn parse_signature<'a, 'input>(
    sig_node: roxmltree::Node<'a, 'input>,
) -> Result<SignatureInfo<'a, 'input>, Error> {
    if !is_element(sig_node, ns::DSIG, ns::node::SIGNATURE) {
        return Err(Error::XmlStructure("expected ds:Signature".into()));
    }
    let signed_info = child_element(sig_node, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;
    let (c14n, inclusive_prefixes) = read_c14n_method(signed_info)?;
    let signature_method = read_algorithm(signed_info, ns::node::SIGNATURE_METHOD)?.to_owned();

    let references = child_elements(signed_info, ns::DSIG, ns::node::REFERENCE)
        .into_iter()
        .map(parse_reference)
        .collect::<Result<Vec<_>, _>>()?;
    if references.is_empty() {
        return Err(Error::MissingElement("Reference".into()));
    }

    let sig_value_node = child_element(sig_node, ns::DSIG, ns::node::SIGNATURE_VALUE)
        .ok_or_else(|| Error::MissingElement("SignatureValue".into()))?;

    Ok(SignatureInfo {
        node: sig_node,
        signed_info,
        c14n,
        inclusive_prefixes,
        signature_method,
        references,
        signature_value: base64_content(sig_value_node)?,
        key_info: child_element(sig_node, ns::DSIG, ns::node::KEY_INFO),
    })
}

fn parse_reference(reference: roxmltree::Node<'_, '_>) -> Result<ReferenceInfo, Error> {
    let uri = reference.attribute(ns::attr::URI).unwrap_or("").to_owned();
    let mut enveloped = false;
    // Without an explicit c14n transform, exclusive c14n is applied.
    let mut c14n = C14nMode::Exclusive;
    let mut inclusive_prefixes = Vec::new();

    if let Some(transforms) = child_element(reference, ns::DSIG, ns::node::TRANSFORMS) {
        for transform in child_elements(transforms, ns::DSIG, ns::node::TRANSFORM) {
            let t_uri = transform
                .attribute(ns::attr::ALGORITHM)
                .ok_or_else(|| Error::MissingAttribute("Algorithm on Transform".into()))?;
            if t_uri == algorithm::ENVELOPED_SIGNATURE {
                enveloped = true;
            } else if let Some(mode) = C14nMode::from_uri(t_uri) {
                c14n = mode;
                inclusive_prefixes = read_inclusive_prefixes(transform);
            } else {
                return Err(Error::UnsupportedAlgorithm(format!("transform: {t_uri}")));
            }
        }
    }

    let digest_method = read_algorithm(reference, ns::node::DIGEST_METHOD)?.to_owned();
    let digest_value_node = child_element(reference, ns::DSIG, ns::node::DIGEST_VALUE)
        .ok_or_else(|| Error::MissingElement("DigestValue".into()))?;

    Ok(ReferenceInfo {
        uri,
        enveloped,
        c14n,
        inclusive_prefixes,
        digest_method,
        digest_value: base64_content(digest_value_node)?,
    })
}

/// Check every reference digest.  Returns the covered elements.
pub fn verify_references(
    doc: &roxmltree::Document<'_>,
    id_map: &HashMap<String, roxmltree::NodeId>,
    info: &SignatureInfo<'_, '_>,
) -> Result<Vec<roxmltree::NodeId>, Error> {
    let mut signed = Vec::with_capacity(info.references.len());
    for reference in &info.references {
        let node = if reference.uri.is_empty() {
            doc.root()
        } else {
            let id = reference
                .uri
                .strip_prefix('#')
                .ok_or_else(|| Error::InvalidUri(format!("external URI not supported: {}", reference.uri)))?;
            XmlDocument::find_by_id(doc, id_map, id)
                .ok_or_else(|| Error::DigestMismatch(format!("{} (no such element)", reference.uri)))?
        };

        let excluded = reference.enveloped.then(|| info.node.id());
        let bytes =
            vaxholm_c14n::canonicalize(node, reference.c14n, &reference.inclusive_prefixes, excluded)?;
        let computed = digest::digest(&reference.digest_method, &bytes)?;
        if computed != reference.digest_value {
            debug!(uri = %reference.uri, "reference digest mismatch");
            return Err(Error::DigestMismatch(reference.uri.clone()));
        }
        signed.push(if reference.uri.is_empty() {
            doc.root_element().id()
        } else {
            node.id()
        });
    }
    Ok(signed)
}

/// Check `SignatureValue` over the canonical `SignedInfo`.
pub fn verify_signature_value(info: &SignatureInfo<'_, '_>, key: &SigningKey) -> Result<(), Error> {
    let c14n_signed_info =
        vaxholm_c14n::canonicalize(info.signed_info, info.c14n, &info.inclusive_prefixes, None)?;
    let sig_alg = vaxholm_crypto::sign::from_uri(&info.signature_method)?;
    if sig_alg.verify(key, &c14n_signed_info, &info.signature_value)? {
        Ok(())
    } else {
        Err(Error::SignatureInvalid(
            "signature value verification failed".into(),
        ))
    }
}

/// Verify a signature completely with an already-resolved key.
pub fn verify(
    doc: &roxmltree::Document<'_>,
    id_map: &HashMap<String, roxmltree::NodeId>,
    sig_node: roxmltree::Node<'_, '_>,
    key: &SigningKey,
) -> Result<VerifiedSignature, Error> {
    let info = parse_signature(sig_node)?;
    let signed_nodes = verify_references(doc, id_map, &info)?;
    verify_signature_value(&info, key)?;
    Ok(VerifiedSignature {
        signed_nodes,
        signature_value: info.signature_value,
    })
}

/// Verify the enveloped signature that is a direct child of `element`.
///
/// The signature must reference `element` itself (by its id or `""`).
/// Returns `Ok(None)` when the element carries no signature.
pub fn verify_enveloped(
    doc: &roxmltree::Document<'_>,
    element: roxmltree::Node<'_, '_>,
    key: &SigningKey,
) -> Result<Option<VerifiedSignature>, Error> {
    let Some(sig_node) = child_element(element, ns::DSIG, ns::node::SIGNATURE) else {
        return Ok(None);
    };
    let id_map = XmlDocument::build_id_map(doc)?;
    let info = parse_signature(sig_node)?;
    let own_uri = vaxholm_xml::document::element_id(element).map(|id| format!("#{id}"));
    let covers_element = info.references.iter().any(|r| {
        r.enveloped && (Some(&r.uri) == own_uri.as_ref() || (r.uri.is_empty() && element.parent() == Some(doc.root())))
    });
    if !covers_element {
        return Err(Error::SignatureInvalid(
            "signature does not cover the enclosing element".into(),
        ));
    }
    let signed_nodes = verify_references(doc, &id_map, &info)?;
    verify_signature_value(&info, key)?;
    Ok(Some(VerifiedSignature {
        signed_nodes,
        signature_value: info.signature_value,
    }))
}

/// DER certificates carried in `KeyInfo/X509Data/X509Certificate`.
pub fn embedded_certificates(key_info: roxmltree::Node<'_, '_>) -> Result<Vec<Vec<u8>>, Error> {
    let mut certs = Vec::new();
    for data in child_elements(key_info, ns::DSIG, ns::node::X509_DATA) {
        for cert in child_elements(data, ns::DSIG, ns::node::X509_CERTIFICATE) {
            certs.push(base64_content(cert)?);
        }
    }
    Ok(certs)
}

// ── Helper functions ─────────────────────────────────────────────────

pub(crate) fn read_c14n_method(
    signed_info: roxmltree::Node<'_, '_>,
) -> Result<(C14nMode, Vec<String>), Error> {
    let node = child_element(signed_info, ns::DSIG, ns::node::CANONICALIZATION_METHOD)
        .ok_or_else(|| Error::MissingElement("CanonicalizationMethod".into()))?;
    let uri = node
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute("Algorithm on CanonicalizationMethod".into()))?;
    let mode = C14nMode::from_uri(uri)
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("C14N: {uri}")))?;
    Ok((mode, read_inclusive_prefixes(node)))
}

pub(crate) fn read_algorithm<'a>(
    parent: roxmltree::Node<'a, '_>,
    local_name: &str,
) -> Result<&'a str, Error> {
    child_element(parent, ns::DSIG, local_name)
        .ok_or_else(|| Error::MissingElement(local_name.into()))?
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute(format!("Algorithm on {local_name}")))
}

fn read_inclusive_prefixes(node: roxmltree::Node<'_, '_>) -> Vec<String> {
    child_element(node, ns::EXC_C14N, ns::node::INCLUSIVE_NAMESPACES)
        .and_then(|n| n.attribute(ns::attr::PREFIX_LIST))
        .map(|list| list.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DsigContext;
    use crate::sign::{digest_reference, sign_enveloped, sign_template, signature_template};
    use rsa::pkcs8::DecodePrivateKey;
    use vaxholm_xml::Editor;

    fn key(pem: &str) -> SigningKey {
        SigningKey::Rsa(rsa::RsaPrivateKey::from_pkcs8_pem(pem).unwrap())
    }

    fn alice() -> SigningKey {
        key(include_str!("../../../testdata/alice-key.pem"))
    }

    const MSG: &str = r#"<e:Env xmlns:e="urn:env"><e:Head/><e:Body Id="b1"><m:op xmlns:m="urn:m">42</m:op></e:Body></e:Env>"#;

    /// Detached signature over `#b1` placed in the header.
    fn signed_message(ctx: &DsigContext, key: &SigningKey) -> String {
        let doc = vaxholm_xml::parse(MSG).unwrap();
        let body = doc.descendants().find(|n| n.tag_name().name() == "Body").unwrap();
        let head = doc.descendants().find(|n| n.tag_name().name() == "Head").unwrap();
        let reference = digest_reference(ctx, body, "#b1", false).unwrap();
        let template = signature_template(ctx, "Sig-1", &[reference], None).unwrap();
        let mut editor = Editor::new();
        vaxholm_xml::edit::insert_first_child(&mut editor, head, &template).unwrap();
        let xml = editor.apply(MSG).unwrap();
        sign_template(&xml, "Sig-1", key).unwrap().0
    }

    fn check(xml: &str, key: &SigningKey) -> Result<VerifiedSignature, Error> {
        let doc = vaxholm_xml::parse(xml).unwrap();
        let id_map = XmlDocument::build_id_map(&doc).unwrap();
        let sig = XmlDocument::find_element(&doc, ns::DSIG, "Signature").unwrap();
        verify(&doc, &id_map, sig, key)
    }

    #[test]
    fn test_detached_roundtrip() {
        let ctx = DsigContext::new();
        let xml = signed_message(&ctx, &alice());
        let verified = check(&xml, &alice()).unwrap();
        assert_eq!(verified.signed_nodes.len(), 1);
        assert_eq!(verified.signature_value.len(), 256);
    }

    #[test]
    fn test_hmac_roundtrip() {
        let ctx = DsigContext::hmac();
        let secret = SigningKey::Hmac(vec![7u8; 32]);
        let xml = signed_message(&ctx, &secret);
        assert!(xml.contains(algorithm::HMAC_SHA1));
        check(&xml, &secret).unwrap();
        assert!(matches!(
            check(&xml, &SigningKey::Hmac(vec![8u8; 32])),
            Err(Error::SignatureInvalid(_))
        ));
    }

    #[test]
    fn test_tampered_body_names_reference() {
        let xml = signed_message(&DsigContext::new(), &alice()).replace(">42<", ">43<");
        match check(&xml, &alice()) {
            Err(Error::DigestMismatch(uri)) => assert_eq!(uri, "#b1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_wrong_key_rejected() {
        let xml = signed_message(&DsigContext::new(), &alice());
        let mallory = key(include_str!("../../../testdata/mallory-key.pem"));
        assert!(matches!(check(&xml, &mallory), Err(Error::SignatureInvalid(_))));
    }

    #[test]
    fn test_enveloped_roundtrip_and_embedded_cert() {
        let xml = r#"<p:Response xmlns:p="urn:p" ID="r1"><p:Issuer>idp</p:Issuer><p:Status>ok</p:Status></p:Response>"#;
        let key_info = "<ds:X509Data><ds:X509Certificate>AQID</ds:X509Certificate></ds:X509Data>";
        let signed = sign_enveloped(
            &DsigContext::new(),
            xml,
            "r1",
            Some(("urn:p", "Issuer")),
            &alice(),
            Some(key_info),
        )
        .unwrap();

        let doc = vaxholm_xml::parse(&signed).unwrap();
        let root = doc.root_element();
        assert!(verify_enveloped(&doc, root, &alice()).unwrap().is_some());

        let sig = child_element(root, ns::DSIG, "Signature").unwrap();
        let info = parse_signature(sig).unwrap();
        assert_eq!(embedded_certificates(info.key_info.unwrap()).unwrap(), vec![vec![1, 2, 3]]);

        let unsigned = vaxholm_xml::parse(xml).unwrap();
        assert!(verify_enveloped(&unsigned, unsigned.root_element(), &alice())
            .unwrap()
            .is_none());

        let tampered = signed.replace(">ok<", ">bad<");
        let doc = vaxholm_xml::parse(&tampered).unwrap();
        assert!(matches!(
            verify_enveloped(&doc, doc.root_element(), &alice()),
            Err(Error::DigestMismatch(_))
        ));
    }

    #[test]
    fn test_unknown_transform_rejected() {
        let xml = signed_message(&DsigContext::new(), &alice())
            .replace(algorithm::EXC_C14N, "urn:custom:transform");
        let doc = vaxholm_xml::parse(&xml).unwrap();
        let sig = XmlDocument::find_element(&doc, ns::DSIG, "Signature").unwrap();
        assert!(parse_signature(sig).is_err());
    }
}
