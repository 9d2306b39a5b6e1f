#![forbid(unsafe_code)]

//! SOAP envelope helpers: version detection and `wsse:Security` header
//! lookup by actor (SOAP 1.1) or role (SOAP 1.2).

use vaxholm_core::{ns, Error};
use vaxholm_xml::document::{child_element, child_elements, element_prefix, is_element};

/// SOAP protocol version, detected from the envelope namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoapVersion {
    Soap11,
    Soap12,
}

impl SoapVersion {
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Soap11 => ns::SOAP11,
            Self::Soap12 => ns::SOAP12,
        }
    }

    pub fn from_namespace(uri: &str) -> Option<Self> {
        match uri {
            ns::SOAP11 => Some(Self::Soap11),
            ns::SOAP12 => Some(Self::Soap12),
            _ => None,
        }
    }

    /// Local name of the header-targeting attribute.
    pub fn actor_attribute(&self) -> &'static str {
        match self {
            Self::Soap11 => ns::attr::ACTOR,
            Self::Soap12 => ns::attr::ROLE,
        }
    }

    /// Lexical value for a true `mustUnderstand`.
    pub fn must_understand_true(&self) -> &'static str {
        match self {
            Self::Soap11 => "1",
            Self::Soap12 => "true",
        }
    }
}

/// The structural parts of a SOAP envelope.
#[derive(Debug, Clone, Copy)]
pub struct Envelope<'a, 'input> {
    pub version: SoapVersion,
    pub envelope: roxmltree::Node<'a, 'input>,
    pub header: Option<roxmltree::Node<'a, 'input>>,
    pub body: roxmltree::Node<'a, 'input>,
}

impl<'a, 'input> Envelope<'a, 'input> {
    /// Recognize a SOAP envelope. Fails with [`Error::NotSoap`] when the
    /// root is not an `Envelope` or it has no `Body`.
    pub fn from_document(doc: &'a roxmltree::Document<'input>) -> Result<Self, Error> {
        let root = doc.root_element();
        let version = root
            .tag_name()
            .namespace()
            .and_then(SoapVersion::from_namespace)
            .filter(|_| root.tag_name().name() == ns::node::ENVELOPE)
            .ok_or_else(|| {
                Error::NotSoap(format!("root element is <{}>", root.tag_name().name()))
            })?;
        let soap_ns = version.namespace();
        let body = child_element(root, soap_ns, ns::node::BODY)
            .ok_or_else(|| Error::NotSoap("envelope has no Body".into()))?;
        Ok(Self {
            version,
            envelope: root,
            header: child_element(root, soap_ns, ns::node::HEADER),
            body,
        })
    }

    /// The envelope's own prefix (empty for a default namespace).
    pub fn prefix(&self) -> &'input str {
        element_prefix(self.envelope)
    }

    /// The `Security` header addressed to `actor` (`None` = un-targeted).
    pub fn security_header(&self, actor: Option<&str>) -> Option<roxmltree::Node<'a, 'input>> {
        self.security_headers()
            .into_iter()
            .find(|h| header_actor(*h, self.version) == actor)
    }

    /// All `Security` headers, in document order.
    pub fn security_headers(&self) -> Vec<roxmltree::Node<'a, 'input>> {
        self.header
            .map(|h| child_elements(h, ns::WSSE, ns::node::SECURITY))
            .unwrap_or_default()
    }
}

/// Parse `text` and check it is SOAP. Non-XML input is also `NotSoap`.
pub fn parse_envelope(text: &str) -> Result<roxmltree::Document<'_>, Error> {
    let doc = vaxholm_xml::parse(text).map_err(|e| Error::NotSoap(e.to_string()))?;
    Envelope::from_document(&doc)?;
    Ok(doc)
}

/// The actor/role a header block is addressed to.
pub fn header_actor<'a>(header: roxmltree::Node<'a, '_>, version: SoapVersion) -> Option<&'a str> {
    header
        .attribute((version.namespace(), version.actor_attribute()))
        .filter(|a| !a.is_empty())
}

/// Whether a header block carries a true `mustUnderstand`.
pub fn must_understand(node: roxmltree::Node<'_, '_>, version: SoapVersion) -> bool {
    matches!(
        node.attribute((version.namespace(), ns::attr::MUST_UNDERSTAND)),
        Some("1") | Some("true")
    )
}

/// True when `node` is a SOAP `Body` of either version.
pub fn is_body(node: roxmltree::Node<'_, '_>) -> bool {
    is_element(node, ns::SOAP11, ns::node::BODY) || is_element(node, ns::SOAP12, ns::node::BODY)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOAP11_MSG: &str = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Header><wsse:Security xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd" soap:actor="urn:a"/><wsse:Security xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd" soap:mustUnderstand="1"/></soap:Header><soap:Body/></soap:Envelope>"#;

    #[test]
    fn test_security_header_by_actor() {
        let doc = vaxholm_xml::parse(SOAP11_MSG).unwrap();
        let env = Envelope::from_document(&doc).unwrap();
        assert_eq!(env.version, SoapVersion::Soap11);
        assert_eq!(env.prefix(), "soap");
        assert_eq!(env.security_headers().len(), 2);

        let targeted = env.security_header(Some("urn:a")).unwrap();
        assert_eq!(header_actor(targeted, env.version), Some("urn:a"));
        let plain = env.security_header(None).unwrap();
        assert!(must_understand(plain, env.version));
        assert!(env.security_header(Some("urn:b")).is_none());
    }

    #[test]
    fn test_soap12_role() {
        let xml = r#"<e:Envelope xmlns:e="http://www.w3.org/2003/05/soap-envelope"><e:Header><s:Security xmlns:s="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd" e:role="urn:r" e:mustUnderstand="true"/></e:Header><e:Body/></e:Envelope>"#;
        let doc = vaxholm_xml::parse(xml).unwrap();
        let env = Envelope::from_document(&doc).unwrap();
        assert_eq!(env.version, SoapVersion::Soap12);
        let header = env.security_header(Some("urn:r")).unwrap();
        assert!(must_understand(header, env.version));
    }

    #[test]
    fn test_not_soap() {
        assert!(matches!(parse_envelope("<a/>"), Err(Error::NotSoap(_))));
        assert!(matches!(parse_envelope("not xml"), Err(Error::NotSoap(_))));
        let no_body = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Header/></s:Envelope>"#;
        assert!(matches!(parse_envelope(no_body), Err(Error::NotSoap(_))));
    }
}
