#![forbid(unsafe_code)]

//! XML-DSig signature creation.
//!
//! Signing is two-step: references are digested and a `Signature` template
//! with an empty `SignatureValue` is produced; once the template is in
//! place, [`sign_template`] canonicalizes its `SignedInfo` in context and
//! fills in the value.

use crate::context::DsigContext;
use base64::{engine::general_purpose::STANDARD, Engine};
use vaxholm_core::{algorithm, ns, Error};
use vaxholm_crypto::{digest, sign::SigningKey};
use vaxholm_xml::document::{child_element, is_element};
use vaxholm_xml::edit::content_range;
use vaxholm_xml::{Editor, XmlWriter};

/// A digested `Reference`.
#[derive(Debug, Clone)]
pub struct Reference {
    /// Same-document URI, `#id` or `""`.
    pub uri: String,
    /// Whether the enveloped-signature transform precedes canonicalization.
    pub enveloped: bool,
    pub digest: Vec<u8>,
}

/// Digest `node` as a reference with the given URI.
///
/// For an enveloped reference, `node` must not yet contain the signature.
pub fn digest_reference(
    ctx: &DsigContext,
    node: roxmltree::Node<'_, '_>,
    uri: &str,
    enveloped: bool,
) -> Result<Reference, Error> {
    let bytes = vaxholm_c14n::canonicalize(node, ctx.c14n, &ctx.inclusive_prefixes, None)?;
    Ok(Reference {
        uri: uri.to_owned(),
        enveloped,
        digest: digest::digest(&ctx.digest_uri, &bytes)?,
    })
}

/// Serialize a `ds:Signature` template.
///
/// `key_info` is the inner XML of `ds:KeyInfo`; it is written verbatim
/// and may use prefixes declared on the `Signature` element.
pub fn signature_template(
    ctx: &DsigContext,
    signature_id: &str,
    references: &[Reference],
    key_info: Option<&str>,
) -> Result<String, Error> {
    let mut w = XmlWriter::new();
    w.start_element(
        "ds:Signature",
        &[("xmlns:ds", ns::DSIG), ("Id", signature_id)],
    );
    w.start_element("ds:SignedInfo", &[]);
    w.empty_element("ds:CanonicalizationMethod", &[("Algorithm", ctx.c14n.uri())]);
    w.empty_element("ds:SignatureMethod", &[("Algorithm", &ctx.signature_uri)]);

    let prefix_list = ctx.inclusive_prefixes.join(" ");
    for reference in references {
        w.start_element("ds:Reference", &[("URI", &reference.uri)]);
        w.start_element("ds:Transforms", &[]);
        if reference.enveloped {
            w.empty_element("ds:Transform", &[("Algorithm", algorithm::ENVELOPED_SIGNATURE)]);
        }
        if prefix_list.is_empty() {
            w.empty_element("ds:Transform", &[("Algorithm", ctx.c14n.uri())]);
        } else {
            w.start_element("ds:Transform", &[("Algorithm", ctx.c14n.uri())]);
            w.empty_element(
                "ec:InclusiveNamespaces",
                &[("xmlns:ec", ns::EXC_C14N), ("PrefixList", &prefix_list)],
            );
            w.end_element()?;
        }
        w.end_element()?;
        w.empty_element("ds:DigestMethod", &[("Algorithm", &ctx.digest_uri)]);
        w.text_element("ds:DigestValue", &[], &STANDARD.encode(&reference.digest));
        w.end_element()?;
    }
    w.end_element()?;
    w.text_element("ds:SignatureValue", &[], "");
    if let Some(key_info) = key_info {
        w.start_element("ds:KeyInfo", &[]);
        w.write_raw(key_info);
        w.end_element()?;
    }
    w.end_element()?;
    w.into_string()
}

/// Compute and insert the `SignatureValue` of the template identified by
/// `signature_id`.  Returns the signed document and the raw signature value.
pub fn sign_template(
    xml: &str,
    signature_id: &str,
    key: &SigningKey,
) -> Result<(String, Vec<u8>), Error> {
    let doc = vaxholm_xml::parse(xml)?;
    let sig_node = doc
        .descendants()
        .find(|n| is_element(*n, ns::DSIG, ns::node::SIGNATURE) && n.attribute("Id") == Some(signature_id))
        .ok_or_else(|| Error::MissingElement(format!("Signature {signature_id}")))?;
    let signed_info = child_element(sig_node, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;

    let (mode, prefixes) = crate::verify::read_c14n_method(signed_info)?;
    let method = crate::verify::read_algorithm(signed_info, ns::node::SIGNATURE_METHOD)?;
    let c14n_signed_info = vaxholm_c14n::canonicalize(signed_info, mode, &prefixes, None)?;

    let sig_alg = vaxholm_crypto::sign::from_uri(method)?;
    let value = sig_alg.sign(key, &c14n_signed_info)?;

    let sig_value_node = child_element(sig_node, ns::DSIG, ns::node::SIGNATURE_VALUE)
        .ok_or_else(|| Error::MissingElement("SignatureValue".into()))?;
    let mut editor = Editor::new();
    editor.replace(content_range(sig_value_node)?, STANDARD.encode(&value));
    Ok((editor.apply(xml)?, value))
}

/// Sign `element_id` with an enveloped signature placed as the element's
/// child right after its first child named `after` (or first, if absent).
///
/// This is the placement SAML uses: the signature follows `Issuer`.
pub fn sign_enveloped(
    ctx: &DsigContext,
    xml: &str,
    element_id: &str,
    after: Option<(&str, &str)>,
    key: &SigningKey,
    key_info: Option<&str>,
) -> Result<String, Error> {
    let doc = vaxholm_xml::parse(xml)?;
    let id_map = vaxholm_xml::XmlDocument::build_id_map(&doc)?;
    let target = vaxholm_xml::XmlDocument::find_by_id(&doc, &id_map, element_id)
        .ok_or_else(|| Error::ElementNotFound(format!("#{element_id}")))?;

    let reference = digest_reference(ctx, target, &format!("#{element_id}"), true)?;
    let signature_id = format!("Signature-{element_id}");
    let template = signature_template(ctx, &signature_id, &[reference], key_info)?;

    let mut editor = Editor::new();
    match after.and_then(|(ns_uri, local)| child_element(target, ns_uri, local)) {
        Some(anchor) => editor.insert(anchor.range().end, template),
        None => vaxholm_xml::edit::insert_first_child(&mut editor, target, &template)?,
    }
    let with_template = editor.apply(xml)?;
    let (signed, _) = sign_template(&with_template, &signature_id, key)?;
    Ok(signed)
}
