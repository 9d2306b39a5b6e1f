#![forbid(unsafe_code)]

//! SAMLP response builder.
//!
//! Assertions are embedded unchanged, taken from context variables
//! holding serialized elements. A success response must carry at least
//! one assertion and any other status must carry none.

use crate::context::{expand, only_references, referenced_values, ContextValue, PolicyContext};
use crate::signing::SigningCredential;
use crate::status::SamlStatus;
use crate::time::{format_instant, normalize_instant};
use crate::version::{generate_id, is_valid_ncname, SamlVersion};
use chrono::Utc;
use tracing::debug;
use vaxholm_core::{ns, Error};
use vaxholm_xml::XmlWriter;

/// Context variable the built response is stored in by default.
pub const DEFAULT_OUTPUT_VARIABLE: &str = "samlpResponse.message";

/// Response builder configuration.
///
/// String fields may contain `${name}` context variable references.
#[derive(Debug, Clone)]
pub struct ResponseBuilderConfig {
    pub version: SamlVersion,
    /// Response id; generated when `None`.
    pub id: Option<String>,
    pub issue_instant: Option<String>,
    pub in_response_to: Option<String>,
    /// `Destination` (SAML 2.0) or `Recipient` (SAML 1.1).
    pub destination: Option<String>,
    pub consent: Option<String>,
    /// SAML 2.0 only.
    pub issuer: Option<String>,
    pub status: SamlStatus,
    pub status_message: Option<String>,
    /// Serialized `StatusDetail` content.
    pub status_detail: Option<String>,
    /// Serialized `Extensions` content; SAML 2.0 only.
    pub extensions: Option<String>,
    /// Each entry is either `${var}` references to variables holding
    /// assertion elements, or a literal serialized assertion.
    pub assertions: Vec<String>,
    pub signing: Option<SigningCredential>,
    pub output_variable: String,
}

impl Default for ResponseBuilderConfig {
    fn default() -> Self {
        Self {
            version: SamlVersion::Saml2,
            id: None,
            issue_instant: None,
            in_response_to: None,
            destination: None,
            consent: None,
            issuer: None,
            status: SamlStatus::Success,
            status_message: None,
            status_detail: None,
            extensions: None,
            assertions: Vec::new(),
            signing: None,
            output_variable: DEFAULT_OUTPUT_VARIABLE.to_owned(),
        }
    }
}

impl ResponseBuilderConfig {
    pub fn new(version: SamlVersion) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    pub fn with_assertion(mut self, source: &str) -> Self {
        self.assertions.push(source.to_owned());
        self
    }

    pub fn with_status(mut self, status: SamlStatus, message: Option<&str>) -> Self {
        self.status = status;
        self.status_message = message.map(str::to_owned);
        self
    }

    pub fn with_in_response_to(mut self, id: &str) -> Self {
        self.in_response_to = Some(id.to_owned());
        self
    }

    pub fn with_signing(mut self, credential: SigningCredential) -> Self {
        self.signing = Some(credential);
        self
    }
}

/// Builds `samlp:Response` messages.
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    config: ResponseBuilderConfig,
}

impl ResponseBuilder {
    pub fn new(config: ResponseBuilderConfig) -> Result<Self, Error> {
        let c = &config;
        match (c.status.is_success(), c.assertions.is_empty()) {
            (true, true) => {
                return Err(Error::Configuration(
                    "a success response requires at least one assertion".into(),
                ))
            }
            (false, false) => {
                return Err(Error::Configuration(format!(
                    "a {} response cannot carry assertions",
                    c.status.name()
                )))
            }
            _ => {}
        }
        if let Some(id) = c.id.as_deref().filter(|id| !id.contains("${")) {
            if !is_valid_ncname(id) {
                return Err(Error::Configuration(format!("response id is not an NCName: {id}")));
            }
        }
        if let Some(irt) = c.in_response_to.as_deref().filter(|v| !v.contains("${")) {
            check_in_response_to(irt)?;
        }
        if c.version == SamlVersion::Saml1_1 && (c.extensions.is_some() || c.issuer.is_some()) {
            return Err(Error::Configuration(
                "SAML 1.1 responses have no Issuer or Extensions".into(),
            ));
        }
        if c.output_variable.trim().is_empty() {
            return Err(Error::Configuration("empty output variable name".into()));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ResponseBuilderConfig {
        &self.config
    }

    /// Build the response, store it in the output variable and return it.
    pub fn build(&self, ctx: &mut dyn PolicyContext) -> Result<String, Error> {
        let c = &self.config;
        let opt = |value: &Option<String>| {
            value
                .as_deref()
                .map(|v| expand(v, &*ctx))
                .filter(|v| !v.is_empty())
        };

        let id = match opt(&c.id) {
            Some(id) if !is_valid_ncname(&id) => {
                return Err(Error::Configuration(format!("response id is not an NCName: {id}")))
            }
            Some(id) => id,
            None => generate_id("ResponseId_"),
        };
        let issue_instant = opt(&c.issue_instant)
            .map(|t| normalize_instant(&t))
            .unwrap_or_else(|| format_instant(&Utc::now()));
        let in_response_to = opt(&c.in_response_to);
        if let Some(irt) = &in_response_to {
            check_in_response_to(irt)?;
        }
        let destination = opt(&c.destination);
        let consent = opt(&c.consent);
        let issuer = opt(&c.issuer);
        let extensions = opt(&c.extensions);
        let status_message = opt(&c.status_message);
        let status_detail = opt(&c.status_detail);

        let assertions = self.assertions(&*ctx)?;
        if c.status.is_success() && assertions.is_empty() {
            return Err(Error::Configuration("no assertions resolved for a success response".into()));
        }

        let mut w = XmlWriter::new();
        match c.version {
            SamlVersion::Saml2 => {
                let mut attrs = vec![
                    ("xmlns:samlp", ns::SAMLP2),
                    ("xmlns:saml", ns::SAML2),
                    ("Version", "2.0"),
                    ("ID", id.as_str()),
                    ("IssueInstant", issue_instant.as_str()),
                ];
                push_opt(&mut attrs, "InResponseTo", &in_response_to);
                push_opt(&mut attrs, "Destination", &destination);
                push_opt(&mut attrs, "Consent", &consent);
                w.start_element("samlp:Response", &attrs);
                if let Some(issuer) = &issuer {
                    w.text_element("saml:Issuer", &[], issuer);
                }
                if let Some(extensions) = &extensions {
                    w.start_element("samlp:Extensions", &[]);
                    w.write_raw(extensions);
                    w.end_element()?;
                }
            }
            SamlVersion::Saml1_1 => {
                let mut attrs = vec![
                    ("xmlns:samlp", ns::SAMLP1),
                    ("MajorVersion", "1"),
                    ("MinorVersion", "1"),
                    ("ResponseID", id.as_str()),
                    ("IssueInstant", issue_instant.as_str()),
                ];
                push_opt(&mut attrs, "InResponseTo", &in_response_to);
                push_opt(&mut attrs, "Recipient", &destination);
                w.start_element("samlp:Response", &attrs);
            }
        }
        self.write_status(&mut w, status_message.as_deref(), status_detail.as_deref())?;
        for assertion in &assertions {
            w.write_raw(assertion);
        }
        w.end_element()?;
        let xml = w.into_string()?;

        let xml = match &c.signing {
            Some(credential) => credential.sign(&xml, &id, c.version)?,
            None => xml,
        };
        debug!(id = id.as_str(), status = c.status.name(), assertions = assertions.len(), "built SAMLP response");
        ctx.set_variable(&c.output_variable, Some(ContextValue::Element(xml.clone())));
        Ok(xml)
    }

    fn write_status(&self, w: &mut XmlWriter, message: Option<&str>, detail: Option<&str>) -> Result<(), Error> {
        let (top, second) = self.config.status.code_values(self.config.version);
        w.start_element("samlp:Status", &[]);
        match second {
            Some(second) => {
                w.start_element("samlp:StatusCode", &[("Value", top.as_str())]);
                w.empty_element("samlp:StatusCode", &[("Value", second.as_str())]);
                w.end_element()?;
            }
            None => w.empty_element("samlp:StatusCode", &[("Value", top.as_str())]),
        }
        if let Some(message) = message {
            w.text_element("samlp:StatusMessage", &[], message);
        }
        if let Some(detail) = detail {
            w.start_element("samlp:StatusDetail", &[]);
            w.write_raw(detail);
            w.end_element()?;
        }
        w.end_element()
    }

    /// Serialized assertions, each checked to be an assertion of the
    /// response version.
    fn assertions(&self, ctx: &dyn PolicyContext) -> Result<Vec<String>, Error> {
        let mut out = Vec::new();
        for source in &self.config.assertions {
            if only_references(source) {
                let values = referenced_values(source, ctx);
                if values.is_empty() {
                    return Err(Error::Configuration(format!("no assertion in {source}")));
                }
                out.extend(values.into_iter().flat_map(ContextValue::to_elements));
            } else {
                out.push(source.clone());
            }
        }
        out.iter()
            .map(|xml| self.check_assertion(xml))
            .collect()
    }

    fn check_assertion(&self, xml: &str) -> Result<String, Error> {
        let xml = strip_declaration(xml);
        let doc = vaxholm_xml::parse(xml)?;
        let root = doc.root_element();
        if root.tag_name().name() != ns::node::ASSERTION {
            return Err(Error::Configuration(format!(
                "expected an assertion, found {}",
                root.tag_name().name()
            )));
        }
        match SamlVersion::of_element(root) {
            Some(v) if v == self.config.version => Ok(xml.to_owned()),
            Some(v) => Err(Error::Configuration(format!(
                "SAML {v} assertion in a SAML {} response",
                self.config.version
            ))),
            None => Err(Error::Configuration("assertion is not in a SAML namespace".into())),
        }
    }
}

fn check_in_response_to(value: &str) -> Result<(), Error> {
    if value.contains(':') {
        Err(Error::Configuration(format!("InResponseTo must not contain ':': {value}")))
    } else {
        Ok(())
    }
}

fn push_opt<'a>(attrs: &mut Vec<(&'a str, &'a str)>, name: &'a str, value: &'a Option<String>) {
    if let Some(value) = value {
        attrs.push((name, value.as_str()));
    }
}

fn strip_declaration(xml: &str) -> &str {
    let xml = xml.trim();
    match xml.strip_prefix("<?xml").and_then(|rest| rest.split_once("?>")) {
        Some((_, rest)) => rest.trim_start(),
        None => xml,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimplePolicyContext;

    const SAML2_ASSERTION: &str = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="a-1" Version="2.0" IssueInstant="2020-01-01T00:00:00Z"><saml:Issuer>idp</saml:Issuer></saml:Assertion>"#;
    const SAML1_ASSERTION: &str = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:1.0:assertion" AssertionID="a-1" MajorVersion="1" MinorVersion="1" Issuer="idp" IssueInstant="2020-01-01T00:00:00Z"/>"#;

    fn ctx() -> SimplePolicyContext {
        SimplePolicyContext::new()
            .with_variable("assertion2", ContextValue::Element(format!("<?xml version=\"1.0\"?>\n{SAML2_ASSERTION}")))
            .with_variable("assertion1", ContextValue::Element(SAML1_ASSERTION.to_owned()))
    }

    #[test]
    fn test_saml2_success() {
        let mut config = ResponseBuilderConfig::new(SamlVersion::Saml2)
            .with_assertion("${assertion2}")
            .with_in_response_to("req-1");
        config.issuer = Some("urn:idp".into());
        config.extensions = Some("<x:ext xmlns:x=\"urn:x\"/>".into());
        let mut ctx = ctx();
        let xml = ResponseBuilder::new(config).unwrap().build(&mut ctx).unwrap();
        let doc = vaxholm_xml::parse(&xml).unwrap();
        let root = doc.root_element();
        assert!(root.attribute("ID").unwrap().starts_with("ResponseId_"));
        assert_eq!(root.attribute("InResponseTo"), Some("req-1"));
        let order: Vec<_> = root
            .children()
            .filter(|n| n.is_element())
            .map(|n| n.tag_name().name())
            .collect();
        assert_eq!(order, ["Issuer", "Extensions", "Status", "Assertion"]);
        assert!(xml.contains(r#"<samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/>"#));
        assert!(xml.contains(SAML2_ASSERTION));
        assert_eq!(
            ctx.variable(DEFAULT_OUTPUT_VARIABLE).and_then(ContextValue::as_element),
            Some(xml.as_str())
        );
    }

    #[test]
    fn test_saml11_error_status() {
        let config = ResponseBuilderConfig::new(SamlVersion::Saml1_1)
            .with_status(SamlStatus::RequestDenied, Some("denied"));
        let xml = ResponseBuilder::new(config).unwrap().build(&mut ctx()).unwrap();
        assert!(xml.contains(r#"MajorVersion="1" MinorVersion="1" ResponseID="ResponseId_"#));
        assert!(xml.contains(
            r#"<samlp:StatusCode Value="samlp:Requester"><samlp:StatusCode Value="samlp:RequestDenied"/></samlp:StatusCode><samlp:StatusMessage>denied</samlp:StatusMessage>"#
        ));
        let doc = vaxholm_xml::parse(&xml).unwrap();
        let status = vaxholm_xml::document::child_element(doc.root_element(), ns::SAMLP1, "Status").unwrap();
        let code = vaxholm_xml::document::child_element(status, ns::SAMLP1, "StatusCode").unwrap();
        assert_eq!(SamlStatus::from_status_code(code), Some(SamlStatus::Requester));
    }

    #[test]
    fn test_status_and_assertion_consistency() {
        assert!(ResponseBuilder::new(ResponseBuilderConfig::new(SamlVersion::Saml2)).is_err());
        let config = ResponseBuilderConfig::new(SamlVersion::Saml2)
            .with_status(SamlStatus::Responder, None)
            .with_assertion("${assertion2}");
        assert!(ResponseBuilder::new(config).is_err());
    }

    #[test]
    fn test_assertion_version_must_match() {
        let config = ResponseBuilderConfig::new(SamlVersion::Saml2).with_assertion("${assertion1}");
        let builder = ResponseBuilder::new(config).unwrap();
        assert!(matches!(builder.build(&mut ctx()), Err(Error::Configuration(_))));

        let config = ResponseBuilderConfig::new(SamlVersion::Saml1_1).with_assertion("${missing}");
        let builder = ResponseBuilder::new(config).unwrap();
        assert!(matches!(builder.build(&mut ctx()), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_in_response_to_rejects_colon() {
        let config = ResponseBuilderConfig::new(SamlVersion::Saml2)
            .with_assertion("${assertion2}")
            .with_in_response_to("urn:req");
        assert!(ResponseBuilder::new(config).is_err());
    }

    #[test]
    fn test_signed_saml11_response() {
        let credential = SigningCredential::new(
            vaxholm_keys::X509Cert::from_pem(include_bytes!("../../../testdata/alice-cert.pem")).unwrap(),
            vaxholm_keys::loader::load_private_key(include_bytes!("../../../testdata/alice-key.pem"))
                .unwrap(),
        );
        let config = ResponseBuilderConfig::new(SamlVersion::Saml1_1)
            .with_assertion("${assertion1}")
            .with_signing(credential);
        let xml = ResponseBuilder::new(config).unwrap().build(&mut ctx()).unwrap();
        let doc = vaxholm_xml::parse(&xml).unwrap();
        let first = doc.root_element().children().find(|n| n.is_element()).unwrap();
        assert_eq!(first.tag_name().name(), "Signature");
        assert!(crate::signing::verify_with_embedded_certificate(&doc, doc.root_element())
            .unwrap()
            .is_some());
    }
}
