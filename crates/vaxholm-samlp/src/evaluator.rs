#![forbid(unsafe_code)]

//! Response and assertion evaluator (SAML 1.1 and 2.0).
//!
//! Evaluates a `samlp:Response` carrying an assertion, or a bare
//! assertion: version, status, validity window, audience restriction and
//! expected attributes. The first assertion of a response is evaluated.
//! Accepted attribute values are published as `<prefix>.<attributeName>`.

use crate::context::{expand_list, ContextValue, PolicyContext};
use crate::message::{
    check_declared_version, check_signature, check_trusted_signer, protocol_element, publish_signer,
};
use crate::name_id::NameId;
use crate::status::{Evaluation, SamlStatus, Step};
use crate::time::parse_instant;
use crate::vars;
use crate::version::SamlVersion;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use vaxholm_core::{ns, Error};
use vaxholm_keys::X509Cert;
use vaxholm_xml::document::{child_element, child_elements, element_text};

/// An attribute the assertion must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedAttribute {
    pub name: String,
    /// `NameFormat` (SAML 2.0) or `AttributeNamespace` (SAML 1.1); any
    /// when unset.
    pub name_format: Option<String>,
    /// Reject explicitly nil values. Only SAML 2.0 has a nil marker.
    pub require_non_nil: bool,
}

impl ExpectedAttribute {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            name_format: None,
            require_non_nil: false,
        }
    }

    pub fn with_name_format(mut self, name_format: &str) -> Self {
        self.name_format = Some(name_format.to_owned());
        self
    }

    pub fn non_nil(mut self) -> Self {
        self.require_non_nil = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ResponseEvaluatorConfig {
    pub version: SamlVersion,
    pub soap_encapsulated: bool,
    /// A response must carry a success status.
    pub require_success: bool,
    pub require_signature: bool,
    pub verify_signature: bool,
    /// Certificates whose signatures are accepted; any verifying signer
    /// when empty. Requires `verify_signature`.
    pub trusted_signers: Vec<X509Cert>,
    /// Tolerance applied to both ends of the validity window.
    pub clock_skew: Duration,
    /// Accepted audiences, `${var}` expandable. The assertion passes when
    /// any of them is listed in any audience restriction.
    pub audiences: Vec<String>,
    pub attributes: Vec<ExpectedAttribute>,
    pub variable_prefix: String,
}

impl Default for ResponseEvaluatorConfig {
    fn default() -> Self {
        Self {
            version: SamlVersion::Saml2,
            soap_encapsulated: false,
            require_success: true,
            require_signature: false,
            verify_signature: false,
            trusted_signers: Vec::new(),
            clock_skew: Duration::zero(),
            audiences: Vec::new(),
            attributes: Vec::new(),
            variable_prefix: vars::PREFIX_RESPONSE.to_owned(),
        }
    }
}

impl ResponseEvaluatorConfig {
    pub fn new(version: SamlVersion) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    pub fn with_audience(mut self, audience: &str) -> Self {
        self.audiences.push(audience.to_owned());
        self
    }

    pub fn with_attribute(mut self, attribute: ExpectedAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_trusted_signer(mut self, cert: X509Cert) -> Self {
        self.trusted_signers.push(cert);
        self
    }
}

/// Evaluates inbound responses and assertions.
#[derive(Debug, Clone)]
pub struct ResponseEvaluator {
    config: ResponseEvaluatorConfig,
}

impl ResponseEvaluator {
    pub fn new(config: ResponseEvaluatorConfig) -> Result<Self, Error> {
        if !vars::is_valid_prefix(&config.variable_prefix) {
            return Err(Error::Configuration(format!(
                "invalid variable prefix: '{}'",
                config.variable_prefix
            )));
        }
        if !config.trusted_signers.is_empty() && !config.verify_signature {
            return Err(Error::Configuration("trusted signers require signature verification".into()));
        }
        if config.clock_skew < Duration::zero() {
            return Err(Error::Configuration("clock skew must not be negative".into()));
        }
        if let Some(empty) = config.attributes.iter().find(|a| a.name.trim().is_empty()) {
            return Err(Error::Configuration(format!("expected attribute without a name: {empty:?}")));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ResponseEvaluatorConfig {
        &self.config
    }

    pub fn evaluate(&self, message: &str, ctx: &mut dyn PolicyContext) -> Evaluation {
        self.evaluate_at(message, ctx, Utc::now())
    }

    /// Evaluate with `now` as the current time.
    pub fn evaluate_at(&self, message: &str, ctx: &mut dyn PolicyContext, now: DateTime<Utc>) -> Evaluation {
        let doc = match vaxholm_xml::parse(message) {
            Ok(doc) => doc,
            Err(e) => return Evaluation::server_error(format!("message is not well-formed: {e}")),
        };
        match self.run(&doc, ctx, now) {
            Ok(()) => Evaluation::none(),
            Err(evaluation) => evaluation,
        }
    }

    fn run(&self, doc: &roxmltree::Document<'_>, ctx: &mut dyn PolicyContext, now: DateTime<Utc>) -> Step<()> {
        let c = &self.config;
        let version = c.version;
        let root = protocol_element(doc, c.soap_encapsulated)?;
        match SamlVersion::of_element(root) {
            Some(found) if found != version => {
                return Err(Evaluation::server_error(format!(
                    "SAML version mismatch: expected {version}, found {found}"
                )))
            }
            Some(_) => {}
            None => {
                return Err(Evaluation::server_error(format!(
                    "not a SAML element: {}",
                    root.tag_name().name()
                )))
            }
        }

        let assertion = match root.tag_name().name() {
            ns::node::RESPONSE if root.tag_name().namespace() == Some(version.protocol_ns()) => {
                check_declared_version(root, version)?;
                self.check_status(root)?;
                let assertions = child_elements(root, version.assertion_ns(), ns::node::ASSERTION);
                if assertions.len() > 1 {
                    warn!(count = assertions.len(), "response carries several assertions; evaluating the first");
                }
                assertions
                    .first()
                    .copied()
                    .ok_or_else(|| Evaluation::falsified("Response carries no Assertion"))?
            }
            ns::node::ASSERTION if root.tag_name().namespace() == Some(version.assertion_ns()) => root,
            other => return Err(Evaluation::server_error(format!("unexpected element: {other}"))),
        };
        check_declared_version(assertion, version)?;

        let response_signed = root != assertion && child_element(root, ns::DSIG, ns::node::SIGNATURE).is_some();
        let assertion_signed = child_element(assertion, ns::DSIG, ns::node::SIGNATURE).is_some();
        if c.require_signature && !response_signed && !assertion_signed {
            return Err(Evaluation::falsified("Missing Signature"));
        }
        let signer = if c.verify_signature {
            let response_signer = if response_signed {
                check_signature(doc, root, false, true)?
            } else {
                None
            };
            let assertion_signer = check_signature(doc, assertion, false, true)?;
            for cert in response_signer.iter().chain(&assertion_signer) {
                check_trusted_signer(cert, &c.trusted_signers)?;
            }
            response_signer.or(assertion_signer)
        } else {
            None
        };
        publish_signer(ctx, &c.variable_prefix, signer.as_ref());

        self.publish_subject(assertion, ctx)?;
        self.check_conditions(assertion, &*ctx, now)?;
        self.check_attributes(assertion, ctx)?;
        debug!(prefix = c.variable_prefix.as_str(), "assertion accepted");
        Ok(())
    }

    fn check_status(&self, response: roxmltree::Node<'_, '_>) -> Step<()> {
        if !self.config.require_success {
            return Ok(());
        }
        let version = self.config.version;
        let status = child_element(response, version.protocol_ns(), ns::node::STATUS)
            .and_then(|s| child_element(s, version.protocol_ns(), ns::node::STATUS_CODE))
            .ok_or_else(|| Evaluation::falsified("Missing Status"))?;
        match SamlStatus::from_status_code(status) {
            Some(s) if s.is_success() => Ok(()),
            _ => Err(Evaluation::falsified(format!(
                "Response status is not success: {}",
                status.attribute("Value").unwrap_or_default()
            ))),
        }
    }

    fn publish_subject(&self, assertion: roxmltree::Node<'_, '_>, ctx: &mut dyn PolicyContext) -> Step<()> {
        let version = self.config.version;
        let assertion_ns = version.assertion_ns();
        // SAML 1.1 subjects live inside each statement.
        let subject = match version {
            SamlVersion::Saml2 => child_element(assertion, assertion_ns, ns::node::SUBJECT),
            SamlVersion::Saml1_1 => assertion.descendants().find(|n| {
                n.is_element()
                    && n.tag_name().name() == ns::node::SUBJECT
                    && n.tag_name().namespace() == Some(assertion_ns)
            }),
        };
        let name = subject
            .and_then(|s| child_element(s, assertion_ns, version.name_id_element()))
            .ok_or_else(|| Evaluation::server_error("Assertion has no subject name"))?;
        NameId::read(name).publish(ctx, &self.config.variable_prefix, &vars::SUBJECT_SUFFIXES, None);
        Ok(())
    }

    fn check_conditions(
        &self,
        assertion: roxmltree::Node<'_, '_>,
        ctx: &dyn PolicyContext,
        now: DateTime<Utc>,
    ) -> Step<()> {
        let c = &self.config;
        let conditions = child_element(assertion, c.version.assertion_ns(), ns::node::CONDITIONS);
        let instant = |attribute: &str| -> Step<Option<DateTime<Utc>>> {
            let Some(raw) = conditions.and_then(|n| n.attribute(attribute)) else {
                return Ok(None);
            };
            parse_instant(raw)
                .map(Some)
                .ok_or_else(|| Evaluation::server_error(format!("Invalid {attribute}: {raw}")))
        };
        if let Some(not_before) = instant("NotBefore")? {
            if now + c.clock_skew < not_before {
                return Err(Evaluation::falsified(format!("Assertion is not valid before {not_before}")));
            }
        }
        if let Some(not_on_or_after) = instant("NotOnOrAfter")? {
            if now - c.clock_skew >= not_on_or_after {
                return Err(Evaluation::falsified(format!("Assertion expired at {not_on_or_after}")));
            }
        }

        if c.audiences.is_empty() {
            return Ok(());
        }
        let accepted: Vec<String> = c.audiences.iter().flat_map(|a| expand_list(a, ctx)).collect();
        let listed: Vec<String> = conditions
            .map(|n| child_elements(n, c.version.assertion_ns(), c.version.audience_restriction_element()))
            .unwrap_or_default()
            .into_iter()
            .flat_map(|r| child_elements(r, c.version.assertion_ns(), ns::node::AUDIENCE))
            .map(|a| element_text(a).trim().to_owned())
            .collect();
        if listed.iter().any(|a| accepted.contains(a)) {
            Ok(())
        } else {
            Err(Evaluation::falsified(format!(
                "Audience restriction not satisfied: expected one of {}",
                accepted.join(", ")
            )))
        }
    }

    fn check_attributes(&self, assertion: roxmltree::Node<'_, '_>, ctx: &mut dyn PolicyContext) -> Step<()> {
        let c = &self.config;
        let version = c.version;
        let assertion_ns = version.assertion_ns();
        let attributes: Vec<_> = child_elements(assertion, assertion_ns, ns::node::ATTRIBUTE_STATEMENT)
            .into_iter()
            .flat_map(|s| child_elements(s, assertion_ns, ns::node::ATTRIBUTE))
            .collect();

        for expected in &c.attributes {
            let attribute = attributes
                .iter()
                .find(|a| {
                    a.attribute(version.attribute_name_attribute()) == Some(expected.name.as_str())
                        && expected
                            .name_format
                            .as_deref()
                            .map_or(true, |f| a.attribute(version.attribute_format_attribute()) == Some(f))
                })
                .ok_or_else(|| Evaluation::falsified(format!("Missing attribute {}", expected.name)))?;
            let values = child_elements(*attribute, assertion_ns, ns::node::ATTRIBUTE_VALUE);
            if version.supports_nil() {
                if values.is_empty() {
                    return Err(Evaluation::falsified(format!("Attribute {} has no value", expected.name)));
                }
                if expected.require_non_nil && values.iter().any(|v| is_nil(*v)) {
                    return Err(Evaluation::falsified(format!("Attribute {} is nil", expected.name)));
                }
            }
            let texts: Vec<String> = values
                .iter()
                .filter(|v| !(version.supports_nil() && is_nil(**v)))
                .map(|v| element_text(*v).trim().to_owned())
                .collect();
            ctx.set_variable(
                &vars::name(&c.variable_prefix, &expected.name),
                Some(ContextValue::Texts(texts)),
            );
        }
        Ok(())
    }
}

fn is_nil(value: roxmltree::Node<'_, '_>) -> bool {
    matches!(value.attribute((ns::XSI, ns::attr::NIL)), Some("true") | Some("1"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimplePolicyContext;
    use crate::status::AssertionStatus;

    const ASSERTION: &str = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="a-1" Version="2.0" IssueInstant="2011-11-10T23:59:55Z"><saml:Issuer>idp</saml:Issuer><saml:Subject><saml:NameID>bob</saml:NameID></saml:Subject><saml:Conditions NotBefore="2011-11-10T23:59:55Z" NotOnOrAfter="2011-11-11T00:06:55Z"/><saml:AttributeStatement><saml:Attribute Name="role"><saml:AttributeValue>admin</saml:AttributeValue><saml:AttributeValue>user</saml:AttributeValue></saml:Attribute></saml:AttributeStatement></saml:Assertion>"#;

    fn at(instant: &str) -> DateTime<Utc> {
        parse_instant(instant).unwrap()
    }

    fn evaluate(config: ResponseEvaluatorConfig, message: &str, now: &str) -> (Evaluation, SimplePolicyContext) {
        let mut ctx = SimplePolicyContext::new();
        let evaluation = ResponseEvaluator::new(config).unwrap().evaluate_at(message, &mut ctx, at(now));
        (evaluation, ctx)
    }

    #[test]
    fn test_bare_assertion() {
        let config = ResponseEvaluatorConfig::default().with_attribute(ExpectedAttribute::new("role"));
        let (evaluation, ctx) = evaluate(config, ASSERTION, "2011-11-11T00:00:00Z");
        assert!(evaluation.is_none(), "{evaluation}");
        assert_eq!(ctx.text("samlpResponse.subject"), Some("bob"));
        assert_eq!(
            ctx.variable("samlpResponse.role"),
            Some(&ContextValue::Texts(vec!["admin".into(), "user".into()]))
        );
    }

    #[test]
    fn test_validity_window_edges() {
        let config = ResponseEvaluatorConfig::default();
        let (evaluation, _) = evaluate(config.clone(), ASSERTION, "2011-11-10T23:59:55Z");
        assert!(evaluation.is_none());
        let (evaluation, _) = evaluate(config.clone(), ASSERTION, "2011-11-11T00:06:55Z");
        assert_eq!(evaluation.status, AssertionStatus::Falsified);
        let (evaluation, _) = evaluate(config, ASSERTION, "2011-11-10T23:59:54Z");
        assert_eq!(evaluation.status, AssertionStatus::Falsified);

        let mut skewed = ResponseEvaluatorConfig::default();
        skewed.clock_skew = Duration::seconds(60);
        let (evaluation, _) = evaluate(skewed, ASSERTION, "2011-11-11T00:07:30Z");
        assert!(evaluation.is_none());
    }

    #[test]
    fn test_response_status() {
        let response = format!(
            r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="r-1" Version="2.0" IssueInstant="2011-11-10T23:59:55Z"><samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status>{ASSERTION}</samlp:Response>"#
        );
        let (evaluation, _) = evaluate(ResponseEvaluatorConfig::default(), &response, "2011-11-11T00:00:00Z");
        assert!(evaluation.is_none(), "{evaluation}");

        let failed = response.replace("status:Success", "status:Responder");
        let (evaluation, _) = evaluate(ResponseEvaluatorConfig::default(), &failed, "2011-11-11T00:00:00Z");
        assert_eq!(evaluation.status, AssertionStatus::Falsified);

        let mut lenient = ResponseEvaluatorConfig::default();
        lenient.require_success = false;
        let (evaluation, _) = evaluate(lenient, &failed, "2011-11-11T00:00:00Z");
        assert!(evaluation.is_none());
    }

    #[test]
    fn test_version_mismatch() {
        let (evaluation, _) = evaluate(
            ResponseEvaluatorConfig::new(SamlVersion::Saml1_1),
            ASSERTION,
            "2011-11-11T00:00:00Z",
        );
        assert_eq!(evaluation.status, AssertionStatus::ServerError);
    }

    #[test]
    fn test_missing_subject_is_server_error() {
        let message = ASSERTION.replace("<saml:Subject><saml:NameID>bob</saml:NameID></saml:Subject>", "");
        let (evaluation, _) = evaluate(ResponseEvaluatorConfig::default(), &message, "2011-11-11T00:00:00Z");
        assert_eq!(evaluation.status, AssertionStatus::ServerError);
    }

    #[test]
    fn test_missing_attribute() {
        let config = ResponseEvaluatorConfig::default()
            .with_attribute(ExpectedAttribute::new("role").with_name_format("urn:other"));
        let (evaluation, _) = evaluate(config, ASSERTION, "2011-11-11T00:00:00Z");
        assert_eq!(evaluation, Evaluation::falsified("Missing attribute role"));
    }

    #[test]
    fn test_invalid_configuration() {
        let mut config = ResponseEvaluatorConfig::default();
        config.clock_skew = Duration::seconds(-1);
        assert!(ResponseEvaluator::new(config).is_err());
        let config = ResponseEvaluatorConfig::default().with_attribute(ExpectedAttribute::new(" "));
        assert!(ResponseEvaluator::new(config).is_err());
    }
}
