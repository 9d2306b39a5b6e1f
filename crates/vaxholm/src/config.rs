#![forbid(unsafe_code)]

//! JSON configuration documents for the builders and evaluators.
//!
//! Every field is optional unless noted; an absent field keeps the
//! library default. File paths are resolved against the directory of the
//! configuration document.

use chrono::Duration;
use serde::{de::DeserializeOwned, Deserialize};
use std::path::{Path, PathBuf};
use vaxholm_core::Error;
use vaxholm_keys::loader::{load_certificate_file, load_private_key_file};
use vaxholm_keys::X509Cert;
use vaxholm_samlp::{
    AttributeQueryEvaluatorConfig, AuthnRequestBinding, AuthnRequestEvaluatorConfig, ExpectedAttribute,
    NameIdPolicy, OutputBinding, QueryAttribute, RecipientCertificate, RequestBuilderConfig, RequestKind,
    ResponseBuilderConfig, ResponseEvaluatorConfig, SamlStatus, SamlVersion, SigningCredential,
};
use vaxholm_wss::SoapVersion;

/// Read and deserialize a configuration document.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<(T, PathBuf), Error> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::Other(format!("{}: {e}", path.display())))?;
    let parsed = serde_json::from_str(&text)
        .map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))?;
    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok((parsed, base))
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn version(value: Option<&str>) -> Result<SamlVersion, Error> {
    value.map_or(Ok(SamlVersion::Saml2), str::parse)
}

fn soap_version(value: &str) -> Result<SoapVersion, Error> {
    match value {
        "1.1" => Ok(SoapVersion::Soap11),
        "1.2" => Ok(SoapVersion::Soap12),
        other => Err(Error::Configuration(format!("unknown SOAP version: {other}"))),
    }
}

// ── Shared ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigningFile {
    pub certificate: PathBuf,
    pub private_key: PathBuf,
}

impl SigningFile {
    pub fn load(&self, base: &Path) -> Result<SigningCredential, Error> {
        Ok(SigningCredential::new(
            load_certificate_file(&base.join(&self.certificate))?,
            load_private_key_file(&base.join(&self.private_key))?,
        ))
    }
}

// ── Request builder ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestKindName {
    #[default]
    AttributeQuery,
    AuthnRequest,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptionFile {
    /// Certificate file of the recipient.
    pub recipient_certificate: Option<PathBuf>,
    /// Context variable holding the recipient certificate.
    pub recipient_variable: Option<String>,
    #[serde(default)]
    pub use_oaep: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeFile {
    pub name: String,
    pub name_format: Option<String>,
    pub friendly_name: Option<String>,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NameIdPolicyFile {
    pub format: Option<String>,
    pub sp_name_qualifier: Option<String>,
    pub allow_create: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestFile {
    pub kind: RequestKindName,
    pub version: Option<String>,
    pub id: Option<String>,
    pub issue_instant: Option<String>,
    pub destination: Option<String>,
    pub consent: Option<String>,
    pub add_issuer: Option<bool>,
    pub issuer: Option<String>,
    pub issuer_format: Option<String>,
    pub issuer_name_qualifier: Option<String>,
    pub subject: Option<String>,
    pub subject_format: Option<String>,
    pub subject_name_qualifier: Option<String>,
    pub subject_sp_name_qualifier: Option<String>,
    pub encrypt_name_id: Option<EncryptionFile>,
    pub attributes: Vec<AttributeFile>,
    pub acs_url: Option<String>,
    pub acs_index: Option<u32>,
    pub attribute_consuming_index: Option<u32>,
    pub protocol_binding: Option<String>,
    pub provider_name: Option<String>,
    pub force_authn: bool,
    pub is_passive: bool,
    pub name_id_policy: Option<NameIdPolicyFile>,
    /// SOAP version to wrap the request in: `1.1` or `1.2`.
    pub soap: Option<String>,
    pub signing: Option<SigningFile>,
    pub output_variable: Option<String>,
}

impl RequestFile {
    pub fn into_config(self, base: &Path) -> Result<RequestBuilderConfig, Error> {
        let mut c = RequestBuilderConfig {
            kind: match self.kind {
                RequestKindName::AttributeQuery => RequestKind::AttributeQuery,
                RequestKindName::AuthnRequest => RequestKind::AuthnRequest,
            },
            version: version(self.version.as_deref())?,
            id: self.id,
            issue_instant: self.issue_instant,
            destination: self.destination,
            consent: self.consent,
            issuer: self.issuer,
            issuer_format: self.issuer_format,
            issuer_name_qualifier: self.issuer_name_qualifier,
            subject: self.subject,
            subject_format: self.subject_format,
            subject_name_qualifier: self.subject_name_qualifier,
            subject_sp_name_qualifier: self.subject_sp_name_qualifier,
            attributes: self
                .attributes
                .into_iter()
                .map(|a| QueryAttribute {
                    name: a.name,
                    name_format: a.name_format,
                    friendly_name: a.friendly_name,
                    values: a.values,
                })
                .collect(),
            acs_url: self.acs_url,
            acs_index: self.acs_index,
            attribute_consuming_index: self.attribute_consuming_index,
            protocol_binding: self.protocol_binding,
            provider_name: self.provider_name,
            force_authn: self.force_authn,
            is_passive: self.is_passive,
            name_id_policy: self.name_id_policy.map(|p| NameIdPolicy {
                format: p.format,
                sp_name_qualifier: p.sp_name_qualifier,
                allow_create: p.allow_create,
            }),
            ..RequestBuilderConfig::default()
        };
        set(&mut c.add_issuer, self.add_issuer);
        set(&mut c.output_variable, self.output_variable);
        if let Some(encryption) = self.encrypt_name_id {
            let recipient = match (encryption.recipient_certificate, encryption.recipient_variable) {
                (Some(path), None) => Some(RecipientCertificate::Static(load_certificate_file(&base.join(path))?)),
                (None, Some(variable)) => Some(RecipientCertificate::Variable(variable)),
                (None, None) => None,
                (Some(_), Some(_)) => {
                    return Err(Error::Configuration(
                        "recipient_certificate and recipient_variable are exclusive".into(),
                    ))
                }
            };
            c.encrypt_name_id = true;
            c.recipient_certificate = recipient;
            c.use_oaep = encryption.use_oaep;
        }
        if let Some(soap) = self.soap {
            c.binding = OutputBinding::Soap(soap_version(&soap)?);
        }
        if let Some(signing) = self.signing {
            c.signing = Some(signing.load(base)?);
        }
        Ok(c)
    }
}

// ── Response builder ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResponseFile {
    pub version: Option<String>,
    pub id: Option<String>,
    pub issue_instant: Option<String>,
    pub in_response_to: Option<String>,
    pub destination: Option<String>,
    pub consent: Option<String>,
    pub issuer: Option<String>,
    /// Status name, e.g. `Success`, `Requester` or `UnknownPrincipal`.
    pub status: Option<String>,
    pub status_message: Option<String>,
    pub status_detail: Option<String>,
    pub extensions: Option<String>,
    pub assertions: Vec<String>,
    pub signing: Option<SigningFile>,
    pub output_variable: Option<String>,
}

impl ResponseFile {
    pub fn into_config(self, base: &Path) -> Result<ResponseBuilderConfig, Error> {
        let mut c = ResponseBuilderConfig {
            id: self.id,
            issue_instant: self.issue_instant,
            in_response_to: self.in_response_to,
            destination: self.destination,
            consent: self.consent,
            issuer: self.issuer,
            status_message: self.status_message,
            status_detail: self.status_detail,
            extensions: self.extensions,
            assertions: self.assertions,
            ..ResponseBuilderConfig::new(version(self.version.as_deref())?)
        };
        if let Some(status) = self.status {
            c.status = status.parse::<SamlStatus>()?;
        }
        set(&mut c.output_variable, self.output_variable);
        if let Some(signing) = self.signing {
            c.signing = Some(signing.load(base)?);
        }
        Ok(c)
    }
}

// ── Evaluators ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AttributeQueryFile {
    pub version: Option<String>,
    pub soap_encapsulated: Option<bool>,
    pub allow_name_id: Option<bool>,
    pub allow_encrypted_id: Option<bool>,
    pub decrypt_encrypted_id: Option<bool>,
    pub require_issuer: Option<bool>,
    pub require_signature: Option<bool>,
    pub verify_signature: Option<bool>,
    pub require_id: Option<bool>,
    pub require_version: Option<bool>,
    pub require_issue_instant: Option<bool>,
    pub require_consent: Option<bool>,
    pub require_destination: Option<bool>,
    pub destination: Option<String>,
    pub subject_formats: Option<Vec<String>>,
    pub custom_subject_formats: Option<String>,
    pub require_attributes: Option<bool>,
    pub require_attribute_name_format: Option<bool>,
    pub attribute_name_formats: Option<Vec<String>>,
    pub custom_attribute_name_formats: Option<String>,
    /// Certificate files, relative to the configuration file.
    pub trusted_signers: Vec<PathBuf>,
    pub variable_prefix: Option<String>,
}

impl AttributeQueryFile {
    pub fn into_config(self, base: &Path) -> Result<AttributeQueryEvaluatorConfig, Error> {
        let mut c = AttributeQueryEvaluatorConfig::new(version(self.version.as_deref())?);
        set(&mut c.soap_encapsulated, self.soap_encapsulated);
        set(&mut c.allow_name_id, self.allow_name_id);
        set(&mut c.allow_encrypted_id, self.allow_encrypted_id);
        set(&mut c.decrypt_encrypted_id, self.decrypt_encrypted_id);
        set(&mut c.require_issuer, self.require_issuer);
        set(&mut c.require_signature, self.require_signature);
        set(&mut c.verify_signature, self.verify_signature);
        set(&mut c.require_id, self.require_id);
        set(&mut c.require_version, self.require_version);
        set(&mut c.require_issue_instant, self.require_issue_instant);
        set(&mut c.require_consent, self.require_consent);
        set(&mut c.require_destination, self.require_destination);
        set(&mut c.subject_formats, self.subject_formats);
        set(&mut c.require_attributes, self.require_attributes);
        set(&mut c.require_attribute_name_format, self.require_attribute_name_format);
        set(&mut c.attribute_name_formats, self.attribute_name_formats);
        set(&mut c.variable_prefix, self.variable_prefix);
        c.destination = self.destination;
        c.custom_subject_formats = self.custom_subject_formats;
        c.custom_attribute_name_formats = self.custom_attribute_name_formats;
        c.trusted_signers = load_certificates(base, &self.trusted_signers)?;
        Ok(c)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthnRequestFile {
    /// `soap`, `redirect` or `post`.
    pub binding: Option<String>,
    pub require_issuer: Option<bool>,
    pub require_signature: Option<bool>,
    pub verify_signature: Option<bool>,
    pub require_acs_url: Option<bool>,
    pub require_acs_index: Option<bool>,
    pub require_attrcs_index: Option<bool>,
    pub require_protocol_binding: Option<bool>,
    pub require_provider_name: Option<bool>,
    pub variable_prefix: Option<String>,
}

impl AuthnRequestFile {
    pub fn into_config(self) -> Result<AuthnRequestEvaluatorConfig, Error> {
        let binding = match self.binding.as_deref() {
            Some(binding) => binding.parse::<AuthnRequestBinding>()?,
            None => AuthnRequestBinding::default(),
        };
        let mut c = AuthnRequestEvaluatorConfig::new(binding);
        set(&mut c.require_issuer, self.require_issuer);
        set(&mut c.require_signature, self.require_signature);
        set(&mut c.verify_signature, self.verify_signature);
        set(&mut c.require_acs_url, self.require_acs_url);
        set(&mut c.require_acs_index, self.require_acs_index);
        set(&mut c.require_attrcs_index, self.require_attrcs_index);
        set(&mut c.require_protocol_binding, self.require_protocol_binding);
        set(&mut c.require_provider_name, self.require_provider_name);
        set(&mut c.variable_prefix, self.variable_prefix);
        Ok(c)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectedAttributeFile {
    pub name: String,
    pub name_format: Option<String>,
    #[serde(default)]
    pub require_non_nil: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResponseEvaluatorFile {
    pub version: Option<String>,
    pub soap_encapsulated: Option<bool>,
    pub require_success: Option<bool>,
    pub require_signature: Option<bool>,
    pub verify_signature: Option<bool>,
    pub clock_skew_seconds: Option<i64>,
    pub audiences: Vec<String>,
    pub attributes: Vec<ExpectedAttributeFile>,
    /// Certificate files, relative to the configuration file.
    pub trusted_signers: Vec<PathBuf>,
    pub variable_prefix: Option<String>,
}

impl ResponseEvaluatorFile {
    pub fn into_config(self, base: &Path) -> Result<ResponseEvaluatorConfig, Error> {
        let mut c = ResponseEvaluatorConfig::new(version(self.version.as_deref())?);
        set(&mut c.soap_encapsulated, self.soap_encapsulated);
        set(&mut c.require_success, self.require_success);
        set(&mut c.require_signature, self.require_signature);
        set(&mut c.verify_signature, self.verify_signature);
        set(&mut c.clock_skew, self.clock_skew_seconds.map(Duration::seconds));
        set(&mut c.variable_prefix, self.variable_prefix);
        c.audiences = self.audiences;
        c.attributes = self
            .attributes
            .into_iter()
            .map(|a| ExpectedAttribute {
                name: a.name,
                name_format: a.name_format,
                require_non_nil: a.require_non_nil,
            })
            .collect();
        c.trusted_signers = load_certificates(base, &self.trusted_signers)?;
        Ok(c)
    }
}

fn load_certificates(base: &Path, paths: &[PathBuf]) -> Result<Vec<X509Cert>, Error> {
    paths.iter().map(|path| load_certificate_file(&base.join(path))).collect()
}
