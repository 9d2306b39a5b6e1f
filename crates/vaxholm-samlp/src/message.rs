#![forbid(unsafe_code)]

//! Steps shared by the inbound message evaluators.

use crate::context::{ContextValue, PolicyContext};
use crate::signing::verify_with_embedded_certificate;
use crate::status::{Evaluation, Step};
use crate::vars;
use crate::version::SamlVersion;
use base64::{engine::general_purpose::STANDARD, Engine};
use vaxholm_core::ns;
use vaxholm_keys::X509Cert;
use vaxholm_xml::document::{child_element, qualified_name};
use vaxholm_xml::edit::start_tag_end;
use vaxholm_xml::writer::escape_attr;

/// The protocol element of `doc`: the first child of the SOAP body when
/// `soap_encapsulated`, otherwise the root element.
pub(crate) fn protocol_element<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
    soap_encapsulated: bool,
) -> Step<roxmltree::Node<'a, 'input>> {
    if !soap_encapsulated {
        return Ok(doc.root_element());
    }
    let envelope = vaxholm_wss::Envelope::from_document(doc)
        .map_err(|e| Evaluation::failed(format!("message is not SOAP: {e}")))?;
    envelope
        .body
        .children()
        .find(|n| n.is_element())
        .ok_or_else(|| Evaluation::falsified("SOAP Body is empty"))
}

/// Check `node` is `local` in the protocol namespace of `expected`. A
/// matching name in the other version's namespace is a version mismatch.
pub(crate) fn expect_protocol_element(
    node: roxmltree::Node<'_, '_>,
    expected: SamlVersion,
    local: &str,
) -> Step<()> {
    match SamlVersion::of_element(node) {
        Some(found) if found != expected => Err(Evaluation::server_error(format!(
            "SAML version mismatch: expected {expected}, found {found}"
        ))),
        Some(_) if node.tag_name().name() == local => Ok(()),
        _ => Err(Evaluation::falsified(format!(
            "expected {local}, found {}",
            node.tag_name().name()
        ))),
    }
}

/// The declared version must match when present.
pub(crate) fn check_declared_version(node: roxmltree::Node<'_, '_>, expected: SamlVersion) -> Step<Option<String>> {
    match SamlVersion::declared_version(node) {
        Some(declared) if declared != expected.label() => Err(Evaluation::server_error(format!(
            "SAML version mismatch: expected {expected}, declared {declared}"
        ))),
        declared => Ok(declared),
    }
}

/// Publish a single text value, or mark it unset; `Missing <what>` is
/// FALSIFIED when `required` and absent.
pub(crate) fn publish_required(
    ctx: &mut dyn PolicyContext,
    prefix: &str,
    suffix: &str,
    value: Option<&str>,
    required: bool,
    what: &str,
) -> Step<()> {
    ctx.set_variable(&vars::name(prefix, suffix), value.map(ContextValue::text));
    if required && value.is_none() {
        return Err(Evaluation::falsified(format!("Missing {what}")));
    }
    Ok(())
}

/// Enforce the signature requirement on `node` and verify it when asked.
/// Returns the verified signer.
pub(crate) fn check_signature(
    doc: &roxmltree::Document<'_>,
    node: roxmltree::Node<'_, '_>,
    required: bool,
    verify: bool,
) -> Step<Option<X509Cert>> {
    let signed = child_element(node, ns::DSIG, ns::node::SIGNATURE).is_some();
    if required && !signed {
        return Err(Evaluation::falsified("Missing Signature"));
    }
    if !verify || !signed {
        return Ok(None);
    }
    verify_with_embedded_certificate(doc, node)
        .map_err(|e| Evaluation::falsified(format!("Signature verification failed: {e}")))
}

/// Reject a verified signer that is not among `trusted`. An empty list
/// trusts any signer whose signature verifies.
pub(crate) fn check_trusted_signer(signer: &X509Cert, trusted: &[X509Cert]) -> Step<()> {
    if trusted.is_empty() || trusted.contains(signer) {
        return Ok(());
    }
    Err(Evaluation::falsified(format!(
        "Signature made by an untrusted certificate: {}",
        signer.subject()
    )))
}

/// Publish the verified signer as `<prefix>.x509CertBase64`, unset when
/// nothing was verified.
pub(crate) fn publish_signer(ctx: &mut dyn PolicyContext, prefix: &str, signer: Option<&X509Cert>) {
    ctx.set_variable(
        &vars::name(prefix, vars::X509_CERT_BASE64),
        signer.map(|cert| ContextValue::text(STANDARD.encode(cert.der()))),
    );
}

/// `node` as written in its document, with the namespace declarations
/// it inherits added to its start tag so it parses on its own.
pub(crate) fn standalone_element(node: roxmltree::Node<'_, '_>) -> String {
    let range = node.range();
    let Some(source) = node.document().input_text().get(range.clone()) else {
        return String::new();
    };
    let name_end = 1 + qualified_name(node).len();
    let tag_end = start_tag_end(node)
        .map(|end| end - range.start)
        .unwrap_or(source.len());
    let start_tag = &source[..tag_end];

    let mut declarations = String::new();
    for namespace in node.namespaces() {
        let attribute = match namespace.name() {
            Some("xml") => continue,
            Some(prefix) => format!("xmlns:{prefix}="),
            None => "xmlns=".to_owned(),
        };
        if start_tag.contains(&attribute) {
            continue;
        }
        declarations.push_str(&format!(" {attribute}\"{}\"", escape_attr(namespace.uri())));
    }
    format!("{}{declarations}{}", &source[..name_end], &source[name_end..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standalone_element() {
        let doc = vaxholm_xml::parse(
            r#"<q xmlns="urn:d" xmlns:saml="urn:s"><saml:Attribute xmlns:x="urn:x" Name="a"><saml:AttributeValue>1</saml:AttributeValue></saml:Attribute></q>"#,
        )
        .unwrap();
        let attribute = doc.root_element().first_element_child().unwrap();
        let xml = standalone_element(attribute);
        assert!(xml.starts_with("<saml:Attribute "));
        assert!(xml.contains(r#"xmlns:saml="urn:s""#));
        assert!(xml.contains(r#"xmlns="urn:d""#));
        assert_eq!(xml.matches("xmlns:x=").count(), 1);
        let reparsed = vaxholm_xml::parse(&xml).unwrap();
        assert_eq!(reparsed.root_element().tag_name().namespace(), Some("urn:s"));
    }

    #[test]
    fn test_version_mismatch_is_server_error() {
        let doc = vaxholm_xml::parse(
            r#"<samlp:AttributeQuery xmlns:samlp="urn:oasis:names:tc:SAML:1.0:protocol"/>"#,
        )
        .unwrap();
        let err = expect_protocol_element(doc.root_element(), SamlVersion::Saml2, "AttributeQuery").unwrap_err();
        assert_eq!(err.status, crate::status::AssertionStatus::ServerError);
        let err = expect_protocol_element(doc.root_element(), SamlVersion::Saml1_1, "Request").unwrap_err();
        assert_eq!(err.status, crate::status::AssertionStatus::Falsified);
    }

    #[test]
    fn test_not_soap_fails() {
        let doc = vaxholm_xml::parse("<a/>").unwrap();
        let err = protocol_element(&doc, true).unwrap_err();
        assert_eq!(err.status, crate::status::AssertionStatus::Failed);
        assert!(protocol_element(&doc, false).is_ok());
    }
}
