#![forbid(unsafe_code)]

//! XML document wrapper over roxmltree with ID attribute registration.

use std::collections::HashMap;
use vaxholm_core::{ns, Error};

/// Attribute names that act as element identifiers in WS-Security and SAML.
const ID_ATTRS: [&str; 6] = ["Id", "ID", "id", "AssertionID", "RequestID", "ResponseID"];

/// An owned XML document.  Stores the text and pre-computed metadata.
///
/// To work with the parsed tree, call [`XmlDocument::parse_doc`] which
/// returns a temporary `roxmltree::Document` borrowing from the text.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    text: String,
}

impl XmlDocument {
    /// Parse and validate XML from a string, taking ownership.
    pub fn parse(text: String) -> Result<Self, Error> {
        crate::parse(&text)?;
        Ok(Self { text })
    }

    /// Parse and validate XML from bytes.
    pub fn parse_bytes(data: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::XmlParse(format!("invalid UTF-8: {e}")))?
            .to_owned();
        Self::parse(text)
    }

    /// Get the raw XML text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consume the document, returning its text.
    pub fn into_text(self) -> String {
        self.text
    }

    /// Parse the document and return a temporary `roxmltree::Document`.
    pub fn parse_doc(&self) -> Result<roxmltree::Document<'_>, Error> {
        crate::parse(&self.text)
    }

    /// Build the ID → NodeId mapping for a parsed document.
    ///
    /// Recognizes `wsu:Id` plus the un-namespaced `Id`, `ID`, `id` and the
    /// SAML 1.1 `AssertionID`, `RequestID` and `ResponseID` attributes.
    /// An identifier that appears on two different elements is rejected.
    pub fn build_id_map(
        doc: &roxmltree::Document<'_>,
    ) -> Result<HashMap<String, roxmltree::NodeId>, Error> {
        let mut map = HashMap::new();
        for node in doc.descendants().filter(|n| n.is_element()) {
            let mut ids: Vec<&str> = Vec::new();
            if let Some(val) = node.attribute((ns::WSU, "Id")) {
                ids.push(val);
            }
            for attr_name in ID_ATTRS {
                if let Some(val) = node.attribute(attr_name) {
                    ids.push(val);
                }
            }
            for val in ids {
                if let Some(existing) = map.insert(val.to_owned(), node.id()) {
                    if existing != node.id() {
                        return Err(Error::XmlStructure(format!("duplicate element id: {val}")));
                    }
                }
            }
        }
        Ok(map)
    }

    /// Find an element by its registered ID value in a parsed document.
    pub fn find_by_id<'a, 'input>(
        doc: &'a roxmltree::Document<'input>,
        id_map: &HashMap<String, roxmltree::NodeId>,
        id: &str,
    ) -> Option<roxmltree::Node<'a, 'input>> {
        let node_id = id_map.get(id)?;
        doc.get_node(*node_id)
    }

    /// Find the first descendant element with the given local name and namespace.
    pub fn find_element<'a, 'input>(
        doc: &'a roxmltree::Document<'input>,
        ns: &str,
        local_name: &str,
    ) -> Option<roxmltree::Node<'a, 'input>> {
        doc.descendants().find(|n| is_element(*n, ns, local_name))
    }

    /// Find all descendant elements with the given local name and namespace.
    pub fn find_elements<'a, 'input>(
        doc: &'a roxmltree::Document<'input>,
        ns: &str,
        local_name: &str,
    ) -> Vec<roxmltree::Node<'a, 'input>> {
        doc.descendants()
            .filter(|n| is_element(*n, ns, local_name))
            .collect()
    }
}

/// True if `node` is an element with the given namespace and local name.
pub fn is_element(node: roxmltree::Node<'_, '_>, ns: &str, local_name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local_name
        && node.tag_name().namespace().unwrap_or("") == ns
}

/// First child element with the given namespace and local name.
pub fn child_element<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    ns: &str,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children().find(|n| is_element(*n, ns, local_name))
}

/// All child elements with the given namespace and local name, in order.
pub fn child_elements<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    ns: &str,
    local_name: &str,
) -> Vec<roxmltree::Node<'a, 'input>> {
    node.children()
        .filter(|n| is_element(*n, ns, local_name))
        .collect()
}

/// Concatenated text of all descendant text nodes.
pub fn element_text(node: roxmltree::Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

/// The identifier of an element: `wsu:Id` first, then the un-namespaced id attributes.
pub fn element_id<'a>(node: roxmltree::Node<'a, '_>) -> Option<&'a str> {
    node.attribute((ns::WSU, "Id"))
        .or_else(|| ID_ATTRS.iter().find_map(|name| node.attribute(*name)))
}

/// The element's qualified name exactly as written in the source text.
pub fn qualified_name<'input>(node: roxmltree::Node<'_, 'input>) -> &'input str {
    let input = node.document().input_text();
    let start = node.range().start + 1;
    let rest = &input[start..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(rest.len());
    &rest[..end]
}

/// The prefix of the element's qualified name, or `""` when unprefixed.
pub fn element_prefix<'input>(node: roxmltree::Node<'_, 'input>) -> &'input str {
    let qname = qualified_name(node);
    match qname.find(':') {
        Some(i) => &qname[..i],
        None => "",
    }
}

/// The prefix of an attribute's qualified name, or `""` when unprefixed.
pub fn attribute_prefix<'input>(
    doc: &roxmltree::Document<'input>,
    attr: &roxmltree::Attribute<'_, 'input>,
) -> &'input str {
    let qname = &doc.input_text()[attr.range_qname()];
    match qname.find(':') {
        Some(i) => &qname[..i],
        None => "",
    }
}

/// Decode base64 text content, ignoring embedded whitespace and line breaks.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, Error> {
    use base64::Engine;
    let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(clean)
        .map_err(|e| Error::Base64(e.to_string()))
}

/// Decode the base64 text content of an element.
pub fn base64_content(node: roxmltree::Node<'_, '_>) -> Result<Vec<u8>, Error> {
    decode_base64(&element_text(node)).map_err(|e| match e {
        Error::Base64(msg) => Error::Base64(format!("{}: {msg}", node.tag_name().name())),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MSG: &str = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/" xmlns:wsu="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd"><soap:Body wsu:Id="Body-1"><m:ping xmlns:m="urn:test" Id="p1">hi <b>there</b></m:ping></soap:Body></soap:Envelope>"#;

    #[test]
    fn test_id_map_recognizes_wsu_and_plain_ids() {
        let doc = crate::parse(MSG).unwrap();
        let map = XmlDocument::build_id_map(&doc).unwrap();
        let body = XmlDocument::find_by_id(&doc, &map, "Body-1").unwrap();
        assert_eq!(body.tag_name().name(), "Body");
        let ping = XmlDocument::find_by_id(&doc, &map, "p1").unwrap();
        assert_eq!(ping.tag_name().name(), "ping");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let xml = r#"<a><b Id="x"/><c ID="x"/></a>"#;
        let doc = crate::parse(xml).unwrap();
        assert!(matches!(XmlDocument::build_id_map(&doc), Err(Error::XmlStructure(_))));
    }

    #[test]
    fn test_qualified_name_and_text() {
        let doc = crate::parse(MSG).unwrap();
        let ping = XmlDocument::find_element(&doc, "urn:test", "ping").unwrap();
        assert_eq!(qualified_name(ping), "m:ping");
        assert_eq!(element_prefix(ping), "m");
        assert_eq!(element_text(ping), "hi there");
        let body = XmlDocument::find_element(&doc, ns::SOAP11, "Body").unwrap();
        assert_eq!(element_id(body), Some("Body-1"));
    }

    #[test]
    fn test_base64_content_ignores_line_breaks() {
        let doc = crate::parse("<v>aGVs\n  bG8=</v>").unwrap();
        assert_eq!(base64_content(doc.root_element()).unwrap(), b"hello");
        assert!(matches!(decode_base64("***"), Err(Error::Base64(_))));
    }

    #[test]
    fn test_dtd_rejected() {
        let xml = "<!DOCTYPE a [<!ENTITY x \"y\">]><a>&x;</a>";
        assert!(XmlDocument::parse(xml.to_owned()).is_err());
    }
}
