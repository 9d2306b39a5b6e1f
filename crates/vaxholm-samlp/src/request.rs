#![forbid(unsafe_code)]

//! SAMLP request builder: `AttributeQuery` (SAML 1.1 and 2.0) and
//! `AuthnRequest` (SAML 2.0).
//!
//! Configuration is checked once in [`RequestBuilder::new`]; values that
//! reference context variables are expanded and checked again on every
//! [`RequestBuilder::build`].

use crate::context::{expand, ContextValue, PolicyContext};
use crate::encrypted_id::encrypt_name_id;
use crate::name_id::NameId;
use crate::signing::SigningCredential;
use crate::time::{format_instant, normalize_instant};
use crate::version::{format, generate_id, is_valid_ncname, is_valid_uri, SamlVersion};
use chrono::Utc;
use tracing::debug;
use vaxholm_core::{ns, Error};
use vaxholm_keys::X509Cert;
use vaxholm_wss::SoapVersion;
use vaxholm_xml::XmlWriter;

/// Context variable the built request is stored in by default.
pub const DEFAULT_OUTPUT_VARIABLE: &str = "samlpRequest.message";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestKind {
    #[default]
    AttributeQuery,
    AuthnRequest,
}

/// How the built request is packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputBinding {
    #[default]
    Raw,
    /// Wrapped in the body of a SOAP envelope.
    Soap(SoapVersion),
}

/// Where the `EncryptedID` recipient certificate comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum RecipientCertificate {
    Static(X509Cert),
    /// Name of a context variable holding a certificate.
    Variable(String),
}

/// An attribute requested by an `AttributeQuery`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryAttribute {
    pub name: String,
    /// `NameFormat` (SAML 2.0) or `AttributeNamespace` (SAML 1.1).
    pub name_format: Option<String>,
    pub friendly_name: Option<String>,
    pub values: Vec<String>,
}

impl QueryAttribute {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_name_format(mut self, name_format: impl Into<String>) -> Self {
        self.name_format = Some(name_format.into());
        self
    }
}

/// `samlp:NameIDPolicy` of an `AuthnRequest`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameIdPolicy {
    pub format: Option<String>,
    pub sp_name_qualifier: Option<String>,
    pub allow_create: Option<bool>,
}

/// Request builder configuration.
///
/// String fields may contain `${name}` context variable references.
#[derive(Debug, Clone)]
pub struct RequestBuilderConfig {
    pub kind: RequestKind,
    pub version: SamlVersion,
    /// Request id; generated when `None`.
    pub id: Option<String>,
    /// Defaults to the time of building.
    pub issue_instant: Option<String>,
    pub destination: Option<String>,
    pub consent: Option<String>,
    pub add_issuer: bool,
    /// Issuer value; defaults to the signing certificate subject.
    pub issuer: Option<String>,
    pub issuer_format: Option<String>,
    pub issuer_name_qualifier: Option<String>,
    pub subject: Option<String>,
    pub subject_format: Option<String>,
    pub subject_name_qualifier: Option<String>,
    pub subject_sp_name_qualifier: Option<String>,
    pub encrypt_name_id: bool,
    pub recipient_certificate: Option<RecipientCertificate>,
    /// RSA-OAEP instead of RSA-1_5 key transport for `EncryptedID`.
    pub use_oaep: bool,
    pub attributes: Vec<QueryAttribute>,
    pub acs_url: Option<String>,
    pub acs_index: Option<u32>,
    pub attribute_consuming_index: Option<u32>,
    pub protocol_binding: Option<String>,
    pub provider_name: Option<String>,
    pub force_authn: bool,
    pub is_passive: bool,
    pub name_id_policy: Option<NameIdPolicy>,
    pub binding: OutputBinding,
    pub signing: Option<SigningCredential>,
    pub output_variable: String,
}

impl Default for RequestBuilderConfig {
    fn default() -> Self {
        Self {
            kind: RequestKind::AttributeQuery,
            version: SamlVersion::Saml2,
            id: None,
            issue_instant: None,
            destination: None,
            consent: None,
            add_issuer: true,
            issuer: None,
            issuer_format: None,
            issuer_name_qualifier: None,
            subject: None,
            subject_format: None,
            subject_name_qualifier: None,
            subject_sp_name_qualifier: None,
            encrypt_name_id: false,
            recipient_certificate: None,
            use_oaep: false,
            attributes: Vec::new(),
            acs_url: None,
            acs_index: None,
            attribute_consuming_index: None,
            protocol_binding: None,
            provider_name: None,
            force_authn: false,
            is_passive: false,
            name_id_policy: None,
            binding: OutputBinding::Raw,
            signing: None,
            output_variable: DEFAULT_OUTPUT_VARIABLE.to_owned(),
        }
    }
}

impl RequestBuilderConfig {
    pub fn attribute_query(version: SamlVersion, subject: &str) -> Self {
        Self {
            version,
            subject: Some(subject.to_owned()),
            ..Self::default()
        }
    }

    pub fn authn_request() -> Self {
        Self {
            kind: RequestKind::AuthnRequest,
            ..Self::default()
        }
    }

    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.issuer = Some(issuer.to_owned());
        self
    }

    pub fn with_destination(mut self, destination: &str) -> Self {
        self.destination = Some(destination.to_owned());
        self
    }

    pub fn with_attribute(mut self, attribute: QueryAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_encrypted_name_id(mut self, recipient: RecipientCertificate, use_oaep: bool) -> Self {
        self.encrypt_name_id = true;
        self.recipient_certificate = Some(recipient);
        self.use_oaep = use_oaep;
        self
    }

    pub fn with_binding(mut self, binding: OutputBinding) -> Self {
        self.binding = binding;
        self
    }

    pub fn with_signing(mut self, credential: SigningCredential) -> Self {
        self.signing = Some(credential);
        self
    }
}

/// Builds SAMLP requests from a [`RequestBuilderConfig`] and a
/// [`PolicyContext`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    config: RequestBuilderConfig,
}

/// Request fields after variable expansion.
struct Resolved {
    id: String,
    issue_instant: String,
    destination: Option<String>,
    consent: Option<String>,
    issuer: Option<NameId>,
    subject: Option<NameId>,
    encrypted_subject: Option<String>,
}

impl RequestBuilder {
    pub fn new(config: RequestBuilderConfig) -> Result<Self, Error> {
        let c = &config;
        if c.kind == RequestKind::AuthnRequest && c.version != SamlVersion::Saml2 {
            return Err(Error::Configuration("AuthnRequest requires SAML 2.0".into()));
        }
        if c.kind == RequestKind::AttributeQuery && c.subject.as_deref().map_or(true, str::is_empty) {
            return Err(Error::Configuration("AttributeQuery requires a subject".into()));
        }
        if c.encrypt_name_id {
            if c.version != SamlVersion::Saml2 {
                return Err(Error::Configuration("EncryptedID requires SAML 2.0".into()));
            }
            match &c.recipient_certificate {
                None => {
                    return Err(Error::Configuration(
                        "NameID encryption requires a recipient certificate or certificate variable".into(),
                    ))
                }
                Some(RecipientCertificate::Variable(name)) if name.trim().is_empty() => {
                    return Err(Error::Configuration("empty recipient certificate variable name".into()))
                }
                Some(_) => {}
            }
        }
        if c.add_issuer && c.issuer.is_none() && c.signing.is_none() && c.version == SamlVersion::Saml2 {
            return Err(Error::Configuration(
                "Issuer requires a configured value or a signing certificate".into(),
            ));
        }
        if let Some(id) = c.id.as_deref().filter(|id| !id.contains("${")) {
            if !is_valid_ncname(id) {
                return Err(Error::Configuration(format!("request id is not an NCName: {id}")));
            }
        }
        if c.acs_url.is_some() && c.acs_index.is_some() {
            return Err(Error::Configuration(
                "AssertionConsumerServiceURL and AssertionConsumerServiceIndex are exclusive".into(),
            ));
        }
        let literal_uris = [
            ("Issuer Format", c.issuer_format.as_deref()),
            ("subject Format", c.subject_format.as_deref()),
            ("ProtocolBinding", c.protocol_binding.as_deref()),
        ];
        for (what, value) in literal_uris {
            if let Some(value) = value.filter(|v| !v.contains("${")) {
                check_uri(what, value)?;
            }
        }
        if c.output_variable.trim().is_empty() {
            return Err(Error::Configuration("empty output variable name".into()));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &RequestBuilderConfig {
        &self.config
    }

    /// Build the request, store it in the output variable and return it.
    pub fn build(&self, ctx: &mut dyn PolicyContext) -> Result<String, Error> {
        if let OutputBinding::Soap(_) = self.config.binding {
            if ctx.request_http().is_none() {
                return Err(Error::Configuration(
                    "SOAP encapsulation requires HTTP facts for the outbound request".into(),
                ));
            }
        }
        let resolved = self.resolve(&*ctx)?;
        let id = resolved.id.as_str();
        let xml = match (self.config.kind, self.config.version) {
            (RequestKind::AttributeQuery, SamlVersion::Saml2) => self.attribute_query_saml2(&resolved)?,
            (RequestKind::AttributeQuery, SamlVersion::Saml1_1) => self.attribute_query_saml11(&resolved)?,
            (RequestKind::AuthnRequest, _) => self.authn_request(&resolved)?,
        };
        let xml = match &self.config.signing {
            Some(credential) => credential.sign(&xml, id, self.config.version)?,
            None => xml,
        };
        let xml = match self.config.binding {
            OutputBinding::Raw => xml,
            OutputBinding::Soap(version) => soap_envelope(&xml, version)?,
        };
        debug!(id, kind = ?self.config.kind, version = %self.config.version, "built SAMLP request");
        ctx.set_variable(&self.config.output_variable, Some(ContextValue::Element(xml.clone())));
        Ok(xml)
    }

    fn resolve(&self, ctx: &dyn PolicyContext) -> Result<Resolved, Error> {
        let c = &self.config;
        let opt = |value: &Option<String>| {
            value
                .as_deref()
                .map(|v| expand(v, ctx))
                .filter(|v| !v.is_empty())
        };

        let id = match opt(&c.id) {
            Some(id) if !is_valid_ncname(&id) => {
                return Err(Error::Configuration(format!("request id is not an NCName: {id}")))
            }
            Some(id) => id,
            None => generate_id(match c.version {
                SamlVersion::Saml2 => "samlp2-",
                SamlVersion::Saml1_1 => "samlp-",
            }),
        };
        let issue_instant = opt(&c.issue_instant)
            .map(|t| normalize_instant(&t))
            .unwrap_or_else(|| format_instant(&Utc::now()));

        let issuer = if c.add_issuer && c.version == SamlVersion::Saml2 {
            let value = opt(&c.issuer)
                .or_else(|| c.signing.as_ref().map(|s| s.certificate.subject().to_owned()))
                .ok_or_else(|| Error::Configuration("no Issuer value".into()))?;
            let mut issuer = NameId::new(value);
            issuer.format = opt(&c.issuer_format);
            issuer.name_qualifier = opt(&c.issuer_name_qualifier);
            if let Some(format) = &issuer.format {
                check_uri("Issuer Format", format)?;
            }
            Some(issuer)
        } else {
            None
        };

        let subject = match opt(&c.subject) {
            Some(value) => {
                let mut subject = NameId::new(value);
                subject.format = opt(&c.subject_format);
                subject.name_qualifier = opt(&c.subject_name_qualifier);
                subject.sp_name_qualifier = opt(&c.subject_sp_name_qualifier);
                if let Some(format) = &subject.format {
                    check_uri("subject Format", format)?;
                }
                Some(subject)
            }
            None if c.kind == RequestKind::AttributeQuery => {
                return Err(Error::Configuration("subject expanded to an empty value".into()))
            }
            None => None,
        };

        let encrypted_subject = match (&subject, c.encrypt_name_id) {
            (Some(subject), true) => {
                let recipient = self.recipient(ctx)?;
                Some(encrypt_name_id(
                    &subject.to_standalone_xml(SamlVersion::Saml2)?,
                    &recipient,
                    c.use_oaep,
                )?)
            }
            _ => None,
        };

        Ok(Resolved {
            id,
            issue_instant,
            destination: opt(&c.destination),
            consent: opt(&c.consent),
            issuer,
            subject,
            encrypted_subject,
        })
    }

    fn recipient(&self, ctx: &dyn PolicyContext) -> Result<X509Cert, Error> {
        match &self.config.recipient_certificate {
            Some(RecipientCertificate::Static(cert)) => Ok(cert.clone()),
            Some(RecipientCertificate::Variable(name)) => ctx
                .variable(name)
                .and_then(ContextValue::as_certificate)
                .cloned()
                .ok_or_else(|| {
                    Error::Configuration(format!("variable {name} does not hold a certificate"))
                }),
            None => Err(Error::Configuration("no recipient certificate".into())),
        }
    }

    // ── Serialization ────────────────────────────────────────────────

    fn attribute_query_saml2(&self, r: &Resolved) -> Result<String, Error> {
        let mut w = XmlWriter::new();
        let mut attrs = vec![
            ("xmlns:samlp", ns::SAMLP2),
            ("xmlns:saml", ns::SAML2),
            ("ID", r.id.as_str()),
            ("Version", "2.0"),
            ("IssueInstant", r.issue_instant.as_str()),
        ];
        push_opt(&mut attrs, "Destination", &r.destination);
        push_opt(&mut attrs, "Consent", &r.consent);
        w.start_element("samlp:AttributeQuery", &attrs);
        write_issuer(&mut w, r)?;
        write_subject(&mut w, r, SamlVersion::Saml2)?;
        for attribute in &self.config.attributes {
            let mut attrs = vec![("Name", attribute.name.as_str())];
            push_opt(&mut attrs, "NameFormat", &attribute.name_format);
            push_opt(&mut attrs, "FriendlyName", &attribute.friendly_name);
            if attribute.values.is_empty() {
                w.empty_element("saml:Attribute", &attrs);
                continue;
            }
            w.start_element("saml:Attribute", &attrs);
            for value in &attribute.values {
                w.text_element("saml:AttributeValue", &[], value);
            }
            w.end_element()?;
        }
        w.end_element()?;
        w.into_string()
    }

    fn attribute_query_saml11(&self, r: &Resolved) -> Result<String, Error> {
        let mut w = XmlWriter::new();
        w.start_element(
            "samlp:Request",
            &[
                ("xmlns:samlp", ns::SAMLP1),
                ("xmlns:saml", ns::SAML1),
                ("MajorVersion", "1"),
                ("MinorVersion", "1"),
                ("RequestID", r.id.as_str()),
                ("IssueInstant", r.issue_instant.as_str()),
            ],
        );
        let mut query_attrs = Vec::new();
        push_opt(&mut query_attrs, "Resource", &r.destination);
        w.start_element("samlp:AttributeQuery", &query_attrs);
        write_subject(&mut w, r, SamlVersion::Saml1_1)?;
        for attribute in &self.config.attributes {
            let namespace = attribute
                .name_format
                .as_deref()
                .unwrap_or(format::SAML1_ATTRIBUTE_NAMESPACE);
            w.empty_element(
                "saml:AttributeDesignator",
                &[
                    ("AttributeName", attribute.name.as_str()),
                    ("AttributeNamespace", namespace),
                ],
            );
        }
        w.end_element()?;
        w.end_element()?;
        w.into_string()
    }

    fn authn_request(&self, r: &Resolved) -> Result<String, Error> {
        let c = &self.config;
        let acs_index = c.acs_index.map(|i| i.to_string());
        let attrcs_index = c.attribute_consuming_index.map(|i| i.to_string());
        let mut w = XmlWriter::new();
        let mut attrs = vec![
            ("xmlns:samlp", ns::SAMLP2),
            ("xmlns:saml", ns::SAML2),
            ("ID", r.id.as_str()),
            ("Version", "2.0"),
            ("IssueInstant", r.issue_instant.as_str()),
        ];
        push_opt(&mut attrs, "Destination", &r.destination);
        push_opt(&mut attrs, "Consent", &r.consent);
        if c.force_authn {
            attrs.push(("ForceAuthn", "true"));
        }
        if c.is_passive {
            attrs.push(("IsPassive", "true"));
        }
        push_opt(&mut attrs, "ProtocolBinding", &c.protocol_binding);
        push_opt(&mut attrs, "AssertionConsumerServiceIndex", &acs_index);
        push_opt(&mut attrs, "AssertionConsumerServiceURL", &c.acs_url);
        push_opt(&mut attrs, "AttributeConsumingServiceIndex", &attrcs_index);
        push_opt(&mut attrs, "ProviderName", &c.provider_name);
        w.start_element("samlp:AuthnRequest", &attrs);
        write_issuer(&mut w, r)?;
        if r.subject.is_some() {
            write_subject(&mut w, r, SamlVersion::Saml2)?;
        }
        if let Some(policy) = &c.name_id_policy {
            let allow_create = policy.allow_create.map(|b| b.to_string());
            let mut attrs = Vec::new();
            push_opt(&mut attrs, "Format", &policy.format);
            push_opt(&mut attrs, "SPNameQualifier", &policy.sp_name_qualifier);
            push_opt(&mut attrs, "AllowCreate", &allow_create);
            w.empty_element("samlp:NameIDPolicy", &attrs);
        }
        w.end_element()?;
        w.into_string()
    }
}

// ── Helper functions ─────────────────────────────────────────────────

fn check_uri(what: &str, value: &str) -> Result<(), Error> {
    if is_valid_uri(value) {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "Invalid {what} attribute value, not a URI: '{value}'"
        )))
    }
}

fn push_opt<'a>(attrs: &mut Vec<(&'a str, &'a str)>, name: &'a str, value: &'a Option<String>) {
    if let Some(value) = value {
        attrs.push((name, value.as_str()));
    }
}

fn write_issuer(w: &mut XmlWriter, r: &Resolved) -> Result<(), Error> {
    if let Some(issuer) = &r.issuer {
        issuer.write(w, "saml:Issuer", SamlVersion::Saml2, &[]);
    }
    Ok(())
}

fn write_subject(w: &mut XmlWriter, r: &Resolved, version: SamlVersion) -> Result<(), Error> {
    let Some(subject) = &r.subject else {
        return Ok(());
    };
    w.start_element("saml:Subject", &[]);
    match &r.encrypted_subject {
        Some(encrypted) => w.write_raw(encrypted),
        None => subject.write(w, &format!("saml:{}", version.name_id_element()), version, &[]),
    }
    w.end_element()
}

/// Wrap `xml` as the body of a SOAP envelope.
pub fn soap_envelope(xml: &str, version: SoapVersion) -> Result<String, Error> {
    let mut w = XmlWriter::new();
    w.start_element("soapenv:Envelope", &[("xmlns:soapenv", version.namespace())]);
    w.start_element("soapenv:Body", &[]);
    w.write_raw(xml);
    w.end_element()?;
    w.end_element()?;
    w.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{HttpFacts, SimplePolicyContext};

    fn alice() -> SigningCredential {
        SigningCredential::new(
            X509Cert::from_pem(include_bytes!("../../../testdata/alice-cert.pem")).unwrap(),
            vaxholm_keys::loader::load_private_key(include_bytes!("../../../testdata/alice-key.pem"))
                .unwrap(),
        )
    }

    fn bob_cert() -> X509Cert {
        X509Cert::from_pem(include_bytes!("../../../testdata/bob-cert.pem")).unwrap()
    }

    fn query(version: SamlVersion) -> RequestBuilderConfig {
        RequestBuilderConfig::attribute_query(version, "test")
            .with_issuer("urn:sp")
            .with_attribute(QueryAttribute::new("givenName").with_name_format(format::ATTRNAME_BASIC))
    }

    #[test]
    fn test_saml2_attribute_query() {
        let builder = RequestBuilder::new(query(SamlVersion::Saml2).with_destination("urn:idp")).unwrap();
        let mut ctx = SimplePolicyContext::new();
        let xml = builder.build(&mut ctx).unwrap();
        let doc = vaxholm_xml::parse(&xml).unwrap();
        let root = doc.root_element();
        assert_eq!(root.tag_name().name(), "AttributeQuery");
        assert!(root.attribute("ID").unwrap().starts_with("samlp2-"));
        assert_eq!(root.attribute("Destination"), Some("urn:idp"));
        assert!(xml.contains("<saml:Issuer>urn:sp</saml:Issuer><saml:Subject><saml:NameID>test</saml:NameID></saml:Subject>"));
        assert!(xml.contains(r#"<saml:Attribute Name="givenName" NameFormat="urn:oasis:names:tc:SAML:2.0:attrname-format:basic"/>"#));
        assert_eq!(
            ctx.variable(DEFAULT_OUTPUT_VARIABLE).and_then(ContextValue::as_element),
            Some(xml.as_str())
        );
    }

    #[test]
    fn test_saml11_attribute_query() {
        let builder = RequestBuilder::new(query(SamlVersion::Saml1_1)).unwrap();
        let xml = builder.build(&mut SimplePolicyContext::new()).unwrap();
        let doc = vaxholm_xml::parse(&xml).unwrap();
        let root = doc.root_element();
        assert_eq!(root.tag_name().name(), "Request");
        assert!(root.attribute("RequestID").unwrap().starts_with("samlp-"));
        assert!(xml.contains("<saml:NameIdentifier>test</saml:NameIdentifier>"));
        assert!(xml.contains(r#"<saml:AttributeDesignator AttributeName="givenName""#));
        assert!(!xml.contains("Issuer"));
    }

    #[test]
    fn test_custom_name_format_from_variable() {
        let mut config = query(SamlVersion::Saml2);
        config.subject_format = Some("urn:customformat${var}".into());
        let builder = RequestBuilder::new(config).unwrap();
        let mut ctx = SimplePolicyContext::new().with_variable("var", "1");
        let xml = builder.build(&mut ctx).unwrap();
        assert!(xml.contains(r#"<saml:NameID Format="urn:customformat1">test</saml:NameID>"#));

        let mut ctx = SimplePolicyContext::new().with_variable("var", "%  x");
        assert!(matches!(builder.build(&mut ctx), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_invalid_issuer_format() {
        let mut config = query(SamlVersion::Saml2);
        config.issuer_format = Some("Invalid URI %".into());
        let err = RequestBuilder::new(config).unwrap_err();
        assert!(err.to_string().contains("Invalid Issuer Format attribute value, not a URI"));
    }

    #[test]
    fn test_default_issuer_is_signer_subject() {
        let credential = alice();
        let subject = credential.certificate.subject().to_owned();
        let mut config = RequestBuilderConfig::attribute_query(SamlVersion::Saml2, "test");
        config.signing = Some(credential);
        let xml = RequestBuilder::new(config).unwrap().build(&mut SimplePolicyContext::new()).unwrap();
        let doc = vaxholm_xml::parse(&xml).unwrap();
        let issuer = vaxholm_xml::document::child_element(doc.root_element(), ns::SAML2, "Issuer").unwrap();
        assert_eq!(vaxholm_xml::document::element_text(issuer), subject);
        assert!(issuer.attribute("Format").is_none());
        assert!(xml.contains("</saml:Issuer><ds:Signature"));
        assert!(crate::signing::verify_with_embedded_certificate(&doc, doc.root_element())
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_issuer_omitted() {
        let mut config = RequestBuilderConfig::attribute_query(SamlVersion::Saml2, "test");
        config.add_issuer = false;
        let xml = RequestBuilder::new(config).unwrap().build(&mut SimplePolicyContext::new()).unwrap();
        assert!(!xml.contains("Issuer"));
    }

    #[test]
    fn test_encrypted_id_requires_recipient() {
        let mut config = query(SamlVersion::Saml2);
        config.encrypt_name_id = true;
        assert!(matches!(RequestBuilder::new(config), Err(Error::Configuration(_))));

        let config = query(SamlVersion::Saml1_1)
            .with_encrypted_name_id(RecipientCertificate::Static(bob_cert()), false);
        assert!(matches!(RequestBuilder::new(config), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_encrypted_id_from_variable() {
        let config = query(SamlVersion::Saml2)
            .with_encrypted_name_id(RecipientCertificate::Variable("recipient".into()), true);
        let builder = RequestBuilder::new(config).unwrap();

        let mut ctx = SimplePolicyContext::new().with_variable("recipient", bob_cert());
        let xml = builder.build(&mut ctx).unwrap();
        assert!(xml.contains("<saml:Subject><saml:EncryptedID"));
        assert!(xml.contains(vaxholm_core::algorithm::RSA_OAEP));
        assert!(!xml.contains("<saml:NameID"));

        let mut ctx = SimplePolicyContext::new().with_variable("recipient", "not a cert");
        assert!(matches!(builder.build(&mut ctx), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_soap_requires_http_facts() {
        let builder = RequestBuilder::new(query(SamlVersion::Saml2).with_binding(OutputBinding::Soap(SoapVersion::Soap11))).unwrap();
        assert!(matches!(
            builder.build(&mut SimplePolicyContext::new()),
            Err(Error::Configuration(_))
        ));
        let mut ctx = SimplePolicyContext::new().with_request_http(HttpFacts::new("POST"));
        let xml = builder.build(&mut ctx).unwrap();
        let doc = vaxholm_wss::soap::parse_envelope(&xml).unwrap();
        let envelope = vaxholm_wss::Envelope::from_document(&doc).unwrap();
        assert_eq!(envelope.version, SoapVersion::Soap11);
    }

    #[test]
    fn test_authn_request() {
        let mut config = RequestBuilderConfig::authn_request().with_issuer("google.com");
        config.acs_url = Some("https://sp.example/acs".into());
        config.protocol_binding = Some("urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST".into());
        config.force_authn = true;
        config.name_id_policy = Some(NameIdPolicy {
            format: Some(format::NAMEID_EMAIL.into()),
            sp_name_qualifier: None,
            allow_create: Some(true),
        });
        let xml = RequestBuilder::new(config).unwrap().build(&mut SimplePolicyContext::new()).unwrap();
        assert!(xml.starts_with("<samlp:AuthnRequest "));
        assert!(xml.contains(r#"ForceAuthn="true""#));
        assert!(!xml.contains("IsPassive"));
        assert!(xml.contains(r#"AssertionConsumerServiceURL="https://sp.example/acs""#));
        assert!(xml.contains(r#"<samlp:NameIDPolicy Format="urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress" AllowCreate="true"/>"#));

        let mut saml11 = RequestBuilderConfig::authn_request().with_issuer("x");
        saml11.version = SamlVersion::Saml1_1;
        assert!(RequestBuilder::new(saml11).is_err());
    }

    #[test]
    fn test_configured_id_must_be_ncname() {
        let mut config = query(SamlVersion::Saml2);
        config.id = Some("1-not-ncname".into());
        assert!(RequestBuilder::new(config).is_err());

        let mut config = query(SamlVersion::Saml2);
        config.id = Some("${requestId}".into());
        config.issue_instant = Some("2006-07-17T22:26:40Z".into());
        let builder = RequestBuilder::new(config).unwrap();
        let mut ctx = SimplePolicyContext::new().with_variable("requestId", "req-1");
        let xml = builder.build(&mut ctx).unwrap();
        assert!(xml.contains(r#"ID="req-1""#));
        assert!(xml.contains(r#"IssueInstant="2006-07-17T22:26:40.000Z""#));
    }
}
