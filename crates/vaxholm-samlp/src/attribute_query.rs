#![forbid(unsafe_code)]

//! AttributeQuery evaluator (SAML 1.1 and 2.0).
//!
//! Checks an inbound `AttributeQuery` against configured requirements and
//! publishes its fields as `<prefix>.<suffix>` context variables.

use crate::context::{expand_list, ContextValue, PolicyContext};
use crate::encrypted_id::decrypt_encrypted_id;
use crate::message::{
    check_declared_version, check_signature, check_trusted_signer, expect_protocol_element, protocol_element,
    publish_required, publish_signer, standalone_element,
};
use crate::name_id::{publish_unset, NameId};
use crate::status::{Evaluation, Step};
use crate::time::normalize_instant;
use crate::vars;
use crate::version::{format, is_valid_uri, SamlVersion};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use vaxholm_core::{ns, Error};
use vaxholm_keys::{SecurityTokenResolver, X509Cert};
use vaxholm_xml::document::{child_element, child_elements};

/// AttributeQuery evaluator configuration.
#[derive(Debug, Clone)]
pub struct AttributeQueryEvaluatorConfig {
    pub version: SamlVersion,
    /// The query arrives in the body of a SOAP envelope.
    pub soap_encapsulated: bool,
    pub allow_name_id: bool,
    /// SAML 2.0 only.
    pub allow_encrypted_id: bool,
    pub decrypt_encrypted_id: bool,
    pub require_issuer: bool,
    pub require_signature: bool,
    pub verify_signature: bool,
    /// Certificates whose signatures are accepted; any verifying signer
    /// when empty. Requires `verify_signature`.
    pub trusted_signers: Vec<X509Cert>,
    pub require_id: bool,
    pub require_version: bool,
    pub require_issue_instant: bool,
    pub require_consent: bool,
    pub require_destination: bool,
    /// Accepted destinations: whitespace separated, `${var}` expandable.
    /// Values that are not URIs are ignored.
    pub destination: Option<String>,
    pub subject_formats: Vec<String>,
    /// Further accepted subject formats, `${var}` expandable.
    pub custom_subject_formats: Option<String>,
    pub require_attributes: bool,
    pub require_attribute_name_format: bool,
    pub attribute_name_formats: Vec<String>,
    /// Further accepted attribute name formats, `${var}` expandable.
    pub custom_attribute_name_formats: Option<String>,
    pub variable_prefix: String,
}

impl Default for AttributeQueryEvaluatorConfig {
    fn default() -> Self {
        Self {
            version: SamlVersion::Saml2,
            soap_encapsulated: false,
            allow_name_id: true,
            allow_encrypted_id: false,
            decrypt_encrypted_id: true,
            require_issuer: true,
            require_signature: false,
            verify_signature: false,
            trusted_signers: Vec::new(),
            require_id: false,
            require_version: false,
            require_issue_instant: false,
            require_consent: false,
            require_destination: false,
            destination: None,
            subject_formats: format::SUPPORTED_SUBJECT_FORMATS.map(str::to_owned).to_vec(),
            custom_subject_formats: None,
            require_attributes: false,
            require_attribute_name_format: false,
            attribute_name_formats: format::SUPPORTED_ATTRIBUTE_NAME_FORMATS.map(str::to_owned).to_vec(),
            custom_attribute_name_formats: None,
            variable_prefix: vars::PREFIX_ATTRIBUTE_QUERY.to_owned(),
        }
    }
}

impl AttributeQueryEvaluatorConfig {
    pub fn new(version: SamlVersion) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    pub fn with_destination(mut self, destination: &str) -> Self {
        self.destination = Some(destination.to_owned());
        self
    }

    pub fn with_custom_subject_formats(mut self, formats: &str) -> Self {
        self.custom_subject_formats = Some(formats.to_owned());
        self
    }

    pub fn with_trusted_signer(mut self, cert: X509Cert) -> Self {
        self.trusted_signers.push(cert);
        self
    }

    pub fn with_attribute_name_formats(mut self, formats: &[&str]) -> Self {
        self.attribute_name_formats = formats.iter().map(|f| (*f).to_owned()).collect();
        self
    }
}

/// Evaluates inbound `AttributeQuery` messages.
pub struct AttributeQueryEvaluator {
    config: AttributeQueryEvaluatorConfig,
    resolver: Option<Arc<dyn SecurityTokenResolver>>,
}

impl std::fmt::Debug for AttributeQueryEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeQueryEvaluator")
            .field("config", &self.config)
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

impl AttributeQueryEvaluator {
    pub fn new(config: AttributeQueryEvaluatorConfig) -> Result<Self, Error> {
        if !config.allow_name_id && !config.allow_encrypted_id {
            return Err(Error::Configuration(
                "at least one of NameID and EncryptedID must be allowed".into(),
            ));
        }
        if config.allow_encrypted_id && config.version != SamlVersion::Saml2 {
            return Err(Error::Configuration("EncryptedID requires SAML 2.0".into()));
        }
        if !config.trusted_signers.is_empty() && !config.verify_signature {
            return Err(Error::Configuration("trusted signers require signature verification".into()));
        }
        if !vars::is_valid_prefix(&config.variable_prefix) {
            return Err(Error::Configuration(format!(
                "invalid variable prefix: '{}'",
                config.variable_prefix
            )));
        }
        for format in config.subject_formats.iter().chain(&config.attribute_name_formats) {
            if !is_valid_uri(format) {
                return Err(Error::Configuration(format!("format is not a URI: {format}")));
            }
        }
        Ok(Self {
            config,
            resolver: None,
        })
    }

    /// Resolver for the private key of an `EncryptedID` recipient.
    pub fn with_resolver(mut self, resolver: Arc<dyn SecurityTokenResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn config(&self) -> &AttributeQueryEvaluatorConfig {
        &self.config
    }

    pub fn evaluate(&self, message: &str, ctx: &mut dyn PolicyContext) -> Evaluation {
        let doc = match vaxholm_xml::parse(message) {
            Ok(doc) => doc,
            Err(e) => return Evaluation::server_error(format!("message is not well-formed: {e}")),
        };
        match self.run(&doc, ctx) {
            Ok(()) => Evaluation::none(),
            Err(evaluation) => evaluation,
        }
    }

    fn run(&self, doc: &roxmltree::Document<'_>, ctx: &mut dyn PolicyContext) -> Step<()> {
        let c = &self.config;
        let prefix = c.variable_prefix.as_str();
        let version = c.version;

        let request = protocol_element(doc, c.soap_encapsulated)?;
        let query = match version {
            SamlVersion::Saml2 => {
                expect_protocol_element(request, version, ns::node::ATTRIBUTE_QUERY)?;
                request
            }
            SamlVersion::Saml1_1 => {
                expect_protocol_element(request, version, ns::node::REQUEST)?;
                child_element(request, ns::SAMLP1, ns::node::ATTRIBUTE_QUERY)
                    .ok_or_else(|| Evaluation::falsified("Request does not contain an AttributeQuery"))?
            }
        };
        let declared_version = check_declared_version(request, version)?;

        let issuer = match version {
            SamlVersion::Saml2 => child_element(query, ns::SAML2, ns::node::ISSUER),
            SamlVersion::Saml1_1 => None,
        };
        if c.require_issuer && version == SamlVersion::Saml2 && issuer.is_none() {
            return Err(Evaluation::falsified("Missing Issuer"));
        }
        let signer = check_signature(doc, request, c.require_signature, c.verify_signature)?;
        if let Some(cert) = &signer {
            check_trusted_signer(cert, &c.trusted_signers)?;
        }
        publish_signer(ctx, prefix, signer.as_ref());

        match issuer {
            Some(issuer) => NameId::read(issuer).publish(ctx, prefix, &vars::ISSUER_SUFFIXES, None),
            None => publish_unset(ctx, prefix, &vars::ISSUER_SUFFIXES),
        }
        let id = request.attribute(version.request_id_attribute());
        publish_required(ctx, prefix, vars::ID, id, c.require_id, "ID")?;
        publish_required(ctx, prefix, vars::VERSION, declared_version.as_deref(), c.require_version, "Version")?;
        let issue_instant = request.attribute("IssueInstant").map(normalize_instant);
        publish_required(
            ctx,
            prefix,
            vars::ISSUE_INSTANT,
            issue_instant.as_deref(),
            c.require_issue_instant,
            "IssueInstant",
        )?;
        let (consent, destination) = match version {
            SamlVersion::Saml2 => (query.attribute("Consent"), query.attribute("Destination")),
            SamlVersion::Saml1_1 => (None, query.attribute("Resource")),
        };
        publish_required(ctx, prefix, vars::CONSENT, consent, c.require_consent, "Consent")?;
        publish_required(
            ctx,
            prefix,
            vars::DESTINATION,
            destination,
            c.require_destination,
            "Destination",
        )?;
        if let (Some(allowed), Some(destination)) = (&c.destination, destination) {
            let allowed: Vec<String> = expand_list(allowed, &*ctx)
                .into_iter()
                .filter(|d| {
                    let valid = is_valid_uri(d);
                    if !valid {
                        warn!(destination = d.as_str(), "ignoring configured destination that is not a URI");
                    }
                    valid
                })
                .collect();
            if !allowed.iter().any(|d| d == destination) {
                return Err(Evaluation::falsified(format!("Destination not allowed: {destination}")));
            }
        }

        self.evaluate_subject(query, ctx)?;
        self.evaluate_attributes(query, ctx)?;
        debug!(prefix, "AttributeQuery accepted");
        Ok(())
    }

    fn evaluate_subject(&self, query: roxmltree::Node<'_, '_>, ctx: &mut dyn PolicyContext) -> Step<()> {
        let c = &self.config;
        let prefix = c.variable_prefix.as_str();
        let assertion_ns = c.version.assertion_ns();
        let subject = child_element(query, assertion_ns, ns::node::SUBJECT)
            .ok_or_else(|| Evaluation::falsified("Missing Subject"))?;

        let mut name = None;
        let mut undecrypted = false;
        if c.allow_name_id {
            name = child_element(subject, assertion_ns, c.version.name_id_element()).map(NameId::read);
        }
        let encrypted = if c.allow_encrypted_id {
            child_element(subject, ns::SAML2, ns::node::ENCRYPTED_ID)
        } else {
            None
        };
        let mut decrypted = None;
        if let (None, Some(encrypted)) = (&name, encrypted) {
            if c.decrypt_encrypted_id {
                let resolver = self
                    .resolver
                    .as_deref()
                    .ok_or_else(|| Evaluation::server_error("no resolver to decrypt EncryptedID"))?;
                let id = decrypt_encrypted_id(encrypted, resolver)
                    .map_err(|e| Evaluation::server_error(format!("Unable to decrypt EncryptedID: {e}")))?;
                name = Some(id.name_id.clone());
                decrypted = Some(id);
            } else {
                undecrypted = true;
            }
        }
        let [elements, methods, recipients] =
            [vars::ELEMENTS_DECRYPTED, vars::ENCRYPTION_METHOD_URIS, vars::RECIPIENT_CERTIFICATES]
                .map(|suffix| vars::name(prefix, suffix));
        match decrypted {
            Some(id) => {
                ctx.set_variable(&elements, Some(ContextValue::Elements(vec![id.xml])));
                ctx.set_variable(&methods, Some(ContextValue::Texts(id.encryption_methods)));
                ctx.set_variable(&recipients, Some(ContextValue::Certificates(vec![id.recipient])));
            }
            None => {
                for var in [&elements, &methods, &recipients] {
                    ctx.set_variable(var, None);
                }
            }
        }

        let Some(name) = name else {
            if undecrypted {
                debug!("EncryptedID left encrypted; subject variables unset");
                publish_unset(ctx, prefix, &vars::SUBJECT_SUFFIXES);
                return Ok(());
            }
            return Err(Evaluation::falsified(format!(
                "Missing {}",
                c.version.name_id_element()
            )));
        };
        name.publish(ctx, prefix, &vars::SUBJECT_SUFFIXES, Some(format::NAMEID_UNSPECIFIED));
        let format = name.format.as_deref().unwrap_or(format::NAMEID_UNSPECIFIED);
        let custom = c
            .custom_subject_formats
            .as_deref()
            .map(|f| expand_list(f, &*ctx))
            .unwrap_or_default();
        if !c.subject_formats.iter().chain(&custom).any(|f| f == format) {
            return Err(Evaluation::falsified(format!("Unsupported subject format: {format}")));
        }
        Ok(())
    }

    fn evaluate_attributes(&self, query: roxmltree::Node<'_, '_>, ctx: &mut dyn PolicyContext) -> Step<()> {
        let c = &self.config;
        let version = c.version;
        let attributes = child_elements(query, version.assertion_ns(), version.query_attribute_element());
        if c.require_attributes && attributes.is_empty() {
            return Err(Evaluation::falsified("No attributes requested"));
        }
        let value = (!attributes.is_empty()).then(|| {
            ContextValue::Elements(attributes.iter().map(|a| standalone_element(*a)).collect())
        });
        ctx.set_variable(&vars::name(&c.variable_prefix, vars::ATTRIBUTES), value);

        let custom = c
            .custom_attribute_name_formats
            .as_deref()
            .map(|f| expand_list(f, &*ctx))
            .unwrap_or_default();
        let mut seen = HashSet::new();
        for attribute in &attributes {
            let name = attribute
                .attribute(version.attribute_name_attribute())
                .ok_or_else(|| Evaluation::falsified("Attribute without a name"))?;
            let name_format = attribute.attribute(version.attribute_format_attribute());
            if !seen.insert((name, name_format)) {
                return Err(Evaluation::falsified(format!("Duplicate attribute: {name}")));
            }
            if c.require_attribute_name_format && name_format.is_none() {
                return Err(Evaluation::falsified(format!("Attribute {name} has no name format")));
            }
            // SAML 1.1 attribute namespaces are arbitrary URIs.
            if version == SamlVersion::Saml2 {
                let name_format = name_format.unwrap_or(format::ATTRNAME_UNSPECIFIED);
                if !c.attribute_name_formats.iter().chain(&custom).any(|f| f == name_format) {
                    return Err(Evaluation::falsified(format!(
                        "Attribute {name} has unsupported name format {name_format}"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimplePolicyContext;
    use crate::status::AssertionStatus;

    const QUERY: &str = r#"<samlp:AttributeQuery xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="q-1" Version="2.0" IssueInstant="2006-07-17T22:26:40Z"><saml:Issuer>urn:sp</saml:Issuer><saml:Subject><saml:NameID>bob</saml:NameID></saml:Subject></samlp:AttributeQuery>"#;

    fn evaluate(config: AttributeQueryEvaluatorConfig, message: &str) -> (Evaluation, SimplePolicyContext) {
        let mut ctx = SimplePolicyContext::new();
        let evaluation = AttributeQueryEvaluator::new(config).unwrap().evaluate(message, &mut ctx);
        (evaluation, ctx)
    }

    #[test]
    fn test_minimal_query() {
        let (evaluation, ctx) = evaluate(AttributeQueryEvaluatorConfig::default(), QUERY);
        assert!(evaluation.is_none(), "{evaluation}");
        assert_eq!(ctx.text("attrQuery.subject"), Some("bob"));
        assert_eq!(
            ctx.text("attrQuery.subject.format"),
            Some(format::NAMEID_UNSPECIFIED)
        );
        assert_eq!(ctx.text("attrQuery.issuer"), Some("urn:sp"));
        assert!(ctx.is_set("attrQuery.attributes"));
        assert!(ctx.variable("attrQuery.attributes").is_none());
    }

    #[test]
    fn test_configuration_checks() {
        let mut config = AttributeQueryEvaluatorConfig::default();
        config.allow_name_id = false;
        assert!(AttributeQueryEvaluator::new(config).is_err());

        let mut config = AttributeQueryEvaluatorConfig::default();
        config.variable_prefix = String::new();
        assert!(AttributeQueryEvaluator::new(config).is_err());

        let mut config = AttributeQueryEvaluatorConfig::new(SamlVersion::Saml1_1);
        config.allow_encrypted_id = true;
        assert!(AttributeQueryEvaluator::new(config).is_err());
    }

    #[test]
    fn test_missing_issuer() {
        let message = QUERY.replace("<saml:Issuer>urn:sp</saml:Issuer>", "");
        let (evaluation, _) = evaluate(AttributeQueryEvaluatorConfig::default(), &message);
        assert_eq!(evaluation, Evaluation::falsified("Missing Issuer"));

        let mut config = AttributeQueryEvaluatorConfig::default();
        config.require_issuer = false;
        let (evaluation, ctx) = evaluate(config, &message);
        assert!(evaluation.is_none());
        assert!(ctx.is_set("attrQuery.issuer"));
        assert!(ctx.variable("attrQuery.issuer").is_none());
    }

    #[test]
    fn test_required_fields() {
        let mut config = AttributeQueryEvaluatorConfig::default();
        config.require_consent = true;
        let (evaluation, _) = evaluate(config, QUERY);
        assert_eq!(evaluation, Evaluation::falsified("Missing Consent"));

        let mut config = AttributeQueryEvaluatorConfig::default();
        config.require_signature = true;
        let (evaluation, _) = evaluate(config, QUERY);
        assert_eq!(evaluation, Evaluation::falsified("Missing Signature"));
    }

    #[test]
    fn test_wrong_version_is_server_error() {
        let message = QUERY.replace(r#"Version="2.0""#, r#"Version="2.1""#);
        let (evaluation, _) = evaluate(AttributeQueryEvaluatorConfig::default(), &message);
        assert_eq!(evaluation.status, AssertionStatus::ServerError);

        let (evaluation, _) = evaluate(AttributeQueryEvaluatorConfig::new(SamlVersion::Saml1_1), QUERY);
        assert_eq!(evaluation.status, AssertionStatus::ServerError);
    }

    #[test]
    fn test_soap_encapsulation() {
        let mut config = AttributeQueryEvaluatorConfig::default();
        config.soap_encapsulated = true;
        let (evaluation, _) = evaluate(config.clone(), QUERY);
        assert_eq!(evaluation.status, AssertionStatus::Failed);

        let wrapped = format!(
            r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body>{QUERY}</soap:Body></soap:Envelope>"#
        );
        let (evaluation, ctx) = evaluate(config.clone(), &wrapped);
        assert!(evaluation.is_none(), "{evaluation}");
        assert_eq!(ctx.text("attrQuery.id"), Some("q-1"));

        let other = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><m:ping xmlns:m="urn:m"/></soap:Body></soap:Envelope>"#;
        let (evaluation, _) = evaluate(config, other);
        assert_eq!(evaluation.status, AssertionStatus::Falsified);
    }

    #[test]
    fn test_saml11_query() {
        let message = r#"<samlp:Request xmlns:samlp="urn:oasis:names:tc:SAML:1.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:1.0:assertion" MajorVersion="1" MinorVersion="1" RequestID="r-1" IssueInstant="2006-07-17T22:26:40Z"><samlp:AttributeQuery Resource="urn:resource"><saml:Subject><saml:NameIdentifier Format="urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress">bob@example.com</saml:NameIdentifier></saml:Subject><saml:AttributeDesignator AttributeName="mail" AttributeNamespace="urn:mace:dir:attribute-def"/></samlp:AttributeQuery></samlp:Request>"#;
        let config = AttributeQueryEvaluatorConfig::new(SamlVersion::Saml1_1).with_destination("urn:resource");
        let (evaluation, ctx) = evaluate(config, message);
        assert!(evaluation.is_none(), "{evaluation}");
        assert_eq!(ctx.text("attrQuery.id"), Some("r-1"));
        assert_eq!(ctx.text("attrQuery.version"), Some("1.1"));
        assert_eq!(ctx.text("attrQuery.subject"), Some("bob@example.com"));
        assert_eq!(ctx.text("attrQuery.destination"), Some("urn:resource"));
        let attributes = ctx.variable("attrQuery.attributes").unwrap().to_elements();
        assert_eq!(attributes.len(), 1);
        assert!(attributes[0].contains(r#"xmlns:saml="urn:oasis:names:tc:SAML:1.0:assertion""#));
    }

    #[test]
    fn test_malformed_message() {
        let (evaluation, _) = evaluate(AttributeQueryEvaluatorConfig::default(), "<unterminated");
        assert_eq!(evaluation.status, AssertionStatus::ServerError);
    }
}
