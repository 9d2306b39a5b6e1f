#![forbid(unsafe_code)]

//! AuthnRequest evaluator (SAML 2.0).
//!
//! Accepts a request over SOAP, HTTP-Redirect or HTTP-POST. For the HTTP
//! bindings the encoded request is read from the request HTTP facts of
//! the policy context, falling back to the message passed in.

use crate::binding::{decode_post, decode_redirect, SAML_REQUEST};
use crate::context::{ContextValue, PolicyContext};
use crate::message::{
    check_declared_version, check_signature, expect_protocol_element, protocol_element, publish_required,
    publish_signer,
};
use crate::name_id::{publish_unset, NameId};
use crate::status::{Evaluation, Step};
use crate::time::normalize_instant;
use crate::vars;
use crate::version::SamlVersion;
use tracing::debug;
use vaxholm_core::{ns, Error};
use vaxholm_xml::document::child_element;

/// How the AuthnRequest reached us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthnRequestBinding {
    Soap,
    #[default]
    HttpRedirect,
    HttpPost,
}

impl std::str::FromStr for AuthnRequestBinding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "soap" => Ok(Self::Soap),
            "redirect" | "http-redirect" => Ok(Self::HttpRedirect),
            "post" | "http-post" => Ok(Self::HttpPost),
            other => Err(Error::Configuration(format!("unknown AuthnRequest binding: {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthnRequestEvaluatorConfig {
    pub binding: AuthnRequestBinding,
    pub require_issuer: bool,
    pub require_signature: bool,
    pub verify_signature: bool,
    pub require_acs_url: bool,
    pub require_acs_index: bool,
    pub require_attrcs_index: bool,
    pub require_protocol_binding: bool,
    pub require_provider_name: bool,
    pub variable_prefix: String,
}

impl Default for AuthnRequestEvaluatorConfig {
    fn default() -> Self {
        Self {
            binding: AuthnRequestBinding::default(),
            require_issuer: false,
            require_signature: false,
            verify_signature: false,
            require_acs_url: false,
            require_acs_index: false,
            require_attrcs_index: false,
            require_protocol_binding: false,
            require_provider_name: false,
            variable_prefix: vars::PREFIX_AUTHN_REQUEST.to_owned(),
        }
    }
}

impl AuthnRequestEvaluatorConfig {
    pub fn new(binding: AuthnRequestBinding) -> Self {
        Self {
            binding,
            ..Self::default()
        }
    }
}

/// Evaluates inbound `AuthnRequest` messages.
#[derive(Debug, Clone)]
pub struct AuthnRequestEvaluator {
    config: AuthnRequestEvaluatorConfig,
}

impl AuthnRequestEvaluator {
    pub fn new(config: AuthnRequestEvaluatorConfig) -> Result<Self, Error> {
        if !vars::is_valid_prefix(&config.variable_prefix) {
            return Err(Error::Configuration(format!(
                "invalid variable prefix: '{}'",
                config.variable_prefix
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &AuthnRequestEvaluatorConfig {
        &self.config
    }

    /// `message` is the SOAP envelope for [`AuthnRequestBinding::Soap`];
    /// for the HTTP bindings it is the query string or the `SAMLRequest`
    /// form value, used when the context carries no request HTTP facts.
    pub fn evaluate(&self, message: &str, ctx: &mut dyn PolicyContext) -> Evaluation {
        let xml = match self.inbound_xml(message, &*ctx) {
            Ok(xml) => xml,
            Err(evaluation) => return evaluation,
        };
        let doc = match vaxholm_xml::parse(&xml) {
            Ok(doc) => doc,
            Err(e) => return Evaluation::server_error(format!("message is not well-formed: {e}")),
        };
        match self.run(&doc, ctx) {
            Ok(()) => Evaluation::none(),
            Err(evaluation) => evaluation,
        }
    }

    fn inbound_xml(&self, message: &str, ctx: &dyn PolicyContext) -> Step<String> {
        let http = ctx.request_http();
        let decoded = match self.config.binding {
            AuthnRequestBinding::Soap => return Ok(message.to_owned()),
            AuthnRequestBinding::HttpRedirect => {
                let query = http.and_then(|h| h.query.as_deref()).unwrap_or(message);
                decode_redirect(query).map(|m| {
                    debug!(relay_state = m.relay_state.as_deref(), "decoded HTTP-Redirect AuthnRequest");
                    m.xml
                })
            }
            AuthnRequestBinding::HttpPost => {
                let value = match http {
                    Some(h) => h.form_param(SAML_REQUEST),
                    None => Some(message),
                };
                value
                    .ok_or_else(|| Error::MissingElement(format!("{SAML_REQUEST} form field")))
                    .and_then(decode_post)
            }
        };
        decoded.map_err(|e| Evaluation::falsified(format!("Unable to decode AuthnRequest: {e}")))
    }

    fn run(&self, doc: &roxmltree::Document<'_>, ctx: &mut dyn PolicyContext) -> Step<()> {
        let c = &self.config;
        let prefix = c.variable_prefix.as_str();
        let version = SamlVersion::Saml2;

        let request = protocol_element(doc, c.binding == AuthnRequestBinding::Soap)?;
        expect_protocol_element(request, version, ns::node::AUTHN_REQUEST)?;
        let declared_version = check_declared_version(request, version)?;

        let issuer = child_element(request, ns::SAML2, ns::node::ISSUER);
        if c.require_issuer && issuer.is_none() {
            return Err(Evaluation::falsified("Missing Issuer"));
        }
        let signer = check_signature(doc, request, c.require_signature, c.verify_signature)?;
        publish_signer(ctx, prefix, signer.as_ref());

        match issuer {
            Some(issuer) => NameId::read(issuer).publish(ctx, prefix, &vars::ISSUER_SUFFIXES, None),
            None => publish_unset(ctx, prefix, &vars::ISSUER_SUFFIXES),
        }
        publish_required(ctx, prefix, vars::ID, request.attribute(ns::attr::SAML2_ID), true, "ID")?;
        publish_required(ctx, prefix, vars::VERSION, declared_version.as_deref(), true, "Version")?;
        let issue_instant = request.attribute("IssueInstant").map(normalize_instant);
        publish_required(ctx, prefix, vars::ISSUE_INSTANT, issue_instant.as_deref(), true, "IssueInstant")?;
        publish_required(ctx, prefix, vars::CONSENT, request.attribute("Consent"), false, "Consent")?;
        publish_required(ctx, prefix, vars::DESTINATION, request.attribute("Destination"), false, "Destination")?;

        publish_required(
            ctx,
            prefix,
            vars::ACS_URL,
            request.attribute("AssertionConsumerServiceURL"),
            c.require_acs_url,
            "AssertionConsumerServiceURL",
        )?;
        publish_index(ctx, prefix, vars::ACS_INDEX, request, "AssertionConsumerServiceIndex", c.require_acs_index)?;
        publish_index(
            ctx,
            prefix,
            vars::ATTRCS_INDEX,
            request,
            "AttributeConsumingServiceIndex",
            c.require_attrcs_index,
        )?;
        publish_required(
            ctx,
            prefix,
            vars::PROTOCOL_BINDING,
            request.attribute("ProtocolBinding"),
            c.require_protocol_binding,
            "ProtocolBinding",
        )?;
        publish_required(
            ctx,
            prefix,
            vars::PROVIDER_NAME,
            request.attribute("ProviderName"),
            c.require_provider_name,
            "ProviderName",
        )?;
        publish_flag(ctx, prefix, vars::FORCE_AUTHN, request, "ForceAuthn")?;
        publish_flag(ctx, prefix, vars::IS_PASSIVE, request, "IsPassive")?;

        publish_subject(request, ctx, prefix);
        debug!(prefix, "AuthnRequest accepted");
        Ok(())
    }
}

/// An optional unsigned short index attribute, published as an integer.
fn publish_index(
    ctx: &mut dyn PolicyContext,
    prefix: &str,
    suffix: &str,
    request: roxmltree::Node<'_, '_>,
    attribute: &str,
    required: bool,
) -> Step<()> {
    let value = match request.attribute(attribute) {
        Some(raw) => Some(
            raw.trim()
                .parse::<u16>()
                .map_err(|_| Evaluation::falsified(format!("Invalid {attribute}: {raw}")))?,
        ),
        None => None,
    };
    ctx.set_variable(&vars::name(prefix, suffix), value.map(|v| ContextValue::Int(i64::from(v))));
    if required && value.is_none() {
        return Err(Evaluation::falsified(format!("Missing {attribute}")));
    }
    Ok(())
}

/// An `xsd:boolean` attribute; absent means false.
fn publish_flag(
    ctx: &mut dyn PolicyContext,
    prefix: &str,
    suffix: &str,
    request: roxmltree::Node<'_, '_>,
    attribute: &str,
) -> Step<()> {
    let value = match request.attribute(attribute).map(str::trim) {
        None | Some("false") | Some("0") => false,
        Some("true") | Some("1") => true,
        Some(other) => return Err(Evaluation::falsified(format!("Invalid {attribute}: {other}"))),
    };
    ctx.set_variable(&vars::name(prefix, suffix), Some(ContextValue::Bool(value)));
    Ok(())
}

/// The subject NameID when present. Otherwise the NameIDPolicy format and
/// SP name qualifier stand in for the subject's.
fn publish_subject(request: roxmltree::Node<'_, '_>, ctx: &mut dyn PolicyContext, prefix: &str) {
    let name_id = child_element(request, ns::SAML2, ns::node::SUBJECT)
        .and_then(|s| child_element(s, ns::SAML2, ns::node::NAME_ID))
        .map(NameId::read);
    if let Some(name_id) = name_id {
        name_id.publish(ctx, prefix, &vars::SUBJECT_SUFFIXES, None);
        return;
    }
    publish_unset(ctx, prefix, &vars::SUBJECT_SUFFIXES);
    if let Some(policy) = child_element(request, ns::SAMLP2, ns::node::NAME_ID_POLICY) {
        let text = |v: Option<&str>| v.map(ContextValue::text);
        ctx.set_variable(&vars::name(prefix, vars::SUBJECT_FORMAT), text(policy.attribute("Format")));
        ctx.set_variable(
            &vars::name(prefix, vars::SUBJECT_SP_NAME_QUALIFIER),
            text(policy.attribute("SPNameQualifier")),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{encode_post, encode_redirect};
    use crate::context::{HttpFacts, SimplePolicyContext};
    use crate::status::AssertionStatus;

    const REQUEST: &str = r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="authn-1" Version="2.0" IssueInstant="2008-05-27T08:19:29Z" ProtocolBinding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" AssertionConsumerServiceIndex="3" ForceAuthn="true"><saml:Issuer>https://sp.example.com</saml:Issuer><samlp:NameIDPolicy Format="urn:oasis:names:tc:SAML:2.0:nameid-format:persistent" AllowCreate="true"/></samlp:AuthnRequest>"#;

    fn evaluate(config: AuthnRequestEvaluatorConfig, ctx: &mut SimplePolicyContext, message: &str) -> Evaluation {
        AuthnRequestEvaluator::new(config).unwrap().evaluate(message, ctx)
    }

    #[test]
    fn test_redirect_binding() {
        let query = encode_redirect(REQUEST, Some("state")).unwrap();
        let mut ctx = SimplePolicyContext::new().with_request_http(HttpFacts::new("GET").with_query(&query));
        let evaluation = evaluate(AuthnRequestEvaluatorConfig::default(), &mut ctx, "");
        assert!(evaluation.is_none(), "{evaluation}");
        assert_eq!(ctx.text("authnRequest.id"), Some("authn-1"));
        assert_eq!(ctx.text("authnRequest.issueInstant"), Some("2008-05-27T08:19:29.000Z"));
        assert_eq!(ctx.text("authnRequest.issuer"), Some("https://sp.example.com"));
        assert_eq!(ctx.variable("authnRequest.acsIndex"), Some(&ContextValue::Int(3)));
        assert_eq!(ctx.variable("authnRequest.forceAuthn"), Some(&ContextValue::Bool(true)));
        assert_eq!(ctx.variable("authnRequest.isPassive"), Some(&ContextValue::Bool(false)));
        assert_eq!(
            ctx.text("authnRequest.subject.format"),
            Some("urn:oasis:names:tc:SAML:2.0:nameid-format:persistent")
        );
        assert!(ctx.is_set("authnRequest.acsUrl"));
        assert!(ctx.variable("authnRequest.acsUrl").is_none());
        assert!(ctx.variable("authnRequest.x509CertBase64").is_none());
    }

    #[test]
    fn test_post_binding() {
        let facts = HttpFacts::new("POST").with_form_field(SAML_REQUEST, &encode_post(REQUEST));
        let mut ctx = SimplePolicyContext::new().with_request_http(facts);
        let evaluation = evaluate(AuthnRequestEvaluatorConfig::new(AuthnRequestBinding::HttpPost), &mut ctx, "");
        assert!(evaluation.is_none(), "{evaluation}");
        assert_eq!(
            ctx.text("authnRequest.protocolBinding"),
            Some("urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST")
        );
    }

    #[test]
    fn test_undecodable_input_is_falsified() {
        let mut ctx = SimplePolicyContext::new().with_request_http(HttpFacts::new("GET").with_query("SAMLRequest=%%%"));
        let evaluation = evaluate(AuthnRequestEvaluatorConfig::default(), &mut ctx, "");
        assert_eq!(evaluation.status, AssertionStatus::Falsified);

        let mut ctx = SimplePolicyContext::new().with_request_http(HttpFacts::new("POST"));
        let evaluation = evaluate(AuthnRequestEvaluatorConfig::new(AuthnRequestBinding::HttpPost), &mut ctx, "");
        assert_eq!(evaluation.status, AssertionStatus::Falsified);
    }

    #[test]
    fn test_required_attributes() {
        let mut config = AuthnRequestEvaluatorConfig::new(AuthnRequestBinding::HttpPost);
        config.require_acs_url = true;
        let mut ctx = SimplePolicyContext::new();
        let evaluation = evaluate(config, &mut ctx, &encode_post(REQUEST));
        assert_eq!(evaluation, Evaluation::falsified("Missing AssertionConsumerServiceURL"));

        let without_instant = REQUEST.replace(r#" IssueInstant="2008-05-27T08:19:29Z""#, "");
        let mut ctx = SimplePolicyContext::new();
        let evaluation = evaluate(
            AuthnRequestEvaluatorConfig::new(AuthnRequestBinding::HttpPost),
            &mut ctx,
            &encode_post(&without_instant),
        );
        assert_eq!(evaluation, Evaluation::falsified("Missing IssueInstant"));
    }

    #[test]
    fn test_soap_binding() {
        let message = format!(
            r#"<S:Envelope xmlns:S="http://www.w3.org/2003/05/soap-envelope"><S:Body>{REQUEST}</S:Body></S:Envelope>"#
        );
        let mut ctx = SimplePolicyContext::new();
        let evaluation = evaluate(AuthnRequestEvaluatorConfig::new(AuthnRequestBinding::Soap), &mut ctx, &message);
        assert!(evaluation.is_none(), "{evaluation}");

        let mut ctx = SimplePolicyContext::new();
        let evaluation = evaluate(AuthnRequestEvaluatorConfig::new(AuthnRequestBinding::Soap), &mut ctx, REQUEST);
        assert_eq!(evaluation.status, AssertionStatus::Failed);
    }

    #[test]
    fn test_bad_flag_value() {
        let bad = REQUEST.replace(r#"ForceAuthn="true""#, r#"ForceAuthn="yes""#);
        let mut ctx = SimplePolicyContext::new();
        let evaluation = evaluate(
            AuthnRequestEvaluatorConfig::new(AuthnRequestBinding::HttpPost),
            &mut ctx,
            &encode_post(&bad),
        );
        assert_eq!(evaluation, Evaluation::falsified("Invalid ForceAuthn: yes"));
    }
}
