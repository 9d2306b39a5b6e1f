#![forbid(unsafe_code)]

//! SAML version adapter.
//!
//! SAML 1.1 and 2.0 carry the same protocol concepts under different
//! element names, namespaces and id attributes. [`SamlVersion`] maps each
//! concept to its version-specific spelling so builders and evaluators can
//! be written once.

use vaxholm_core::ns;

/// Well-known subject and attribute name formats.
pub mod format {
    pub const NAMEID_UNSPECIFIED: &str = "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified";
    pub const NAMEID_EMAIL: &str = "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress";
    pub const NAMEID_X509_SUBJECT: &str = "urn:oasis:names:tc:SAML:1.1:nameid-format:X509SubjectName";
    pub const NAMEID_WINDOWS: &str =
        "urn:oasis:names:tc:SAML:1.1:nameid-format:WindowsDomainQualifiedName";
    pub const NAMEID_KERBEROS: &str = "urn:oasis:names:tc:SAML:2.0:nameid-format:kerberos";
    pub const NAMEID_ENTITY: &str = "urn:oasis:names:tc:SAML:2.0:nameid-format:entity";
    pub const NAMEID_PERSISTENT: &str = "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent";
    pub const NAMEID_TRANSIENT: &str = "urn:oasis:names:tc:SAML:2.0:nameid-format:transient";

    pub const ATTRNAME_UNSPECIFIED: &str = "urn:oasis:names:tc:SAML:2.0:attrname-format:unspecified";
    pub const ATTRNAME_URI: &str = "urn:oasis:names:tc:SAML:2.0:attrname-format:uri";
    pub const ATTRNAME_BASIC: &str = "urn:oasis:names:tc:SAML:2.0:attrname-format:basic";

    /// Subject formats an evaluator accepts without extra configuration.
    pub const SUPPORTED_SUBJECT_FORMATS: [&str; 8] = [
        NAMEID_UNSPECIFIED,
        NAMEID_EMAIL,
        NAMEID_X509_SUBJECT,
        NAMEID_WINDOWS,
        NAMEID_KERBEROS,
        NAMEID_ENTITY,
        NAMEID_PERSISTENT,
        NAMEID_TRANSIENT,
    ];

    pub const SUPPORTED_ATTRIBUTE_NAME_FORMATS: [&str; 3] =
        [ATTRNAME_UNSPECIFIED, ATTRNAME_URI, ATTRNAME_BASIC];

    /// SAML 1.1 attribute namespace used when none is configured.
    pub const SAML1_ATTRIBUTE_NAMESPACE: &str = "urn:oasis:names:tc:SAML:1.0:attrname-format:unspecified";
}

/// SAML protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamlVersion {
    Saml1_1,
    #[default]
    Saml2,
}

impl SamlVersion {
    /// Assertion namespace.
    pub fn assertion_ns(&self) -> &'static str {
        match self {
            Self::Saml1_1 => ns::SAML1,
            Self::Saml2 => ns::SAML2,
        }
    }

    /// Protocol namespace.
    pub fn protocol_ns(&self) -> &'static str {
        match self {
            Self::Saml1_1 => ns::SAMLP1,
            Self::Saml2 => ns::SAMLP2,
        }
    }

    /// The version as it appears in messages and context variables.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Saml1_1 => "1.1",
            Self::Saml2 => "2.0",
        }
    }

    /// The version whose assertion or protocol namespace `uri` is.
    pub fn from_namespace(uri: &str) -> Option<Self> {
        match uri {
            ns::SAML1 | ns::SAMLP1 => Some(Self::Saml1_1),
            ns::SAML2 | ns::SAMLP2 => Some(Self::Saml2),
            _ => None,
        }
    }

    /// Version implied by the namespace of an element.
    pub fn of_element(node: roxmltree::Node<'_, '_>) -> Option<Self> {
        node.tag_name().namespace().and_then(Self::from_namespace)
    }

    /// The version an element declares: `Version` for SAML 2.0,
    /// `MajorVersion.MinorVersion` for SAML 1.x.
    pub fn declared_version(node: roxmltree::Node<'_, '_>) -> Option<String> {
        match Self::of_element(node)? {
            Self::Saml2 => node.attribute("Version").map(str::to_owned),
            Self::Saml1_1 => {
                let major = node.attribute("MajorVersion")?;
                let minor = node.attribute("MinorVersion").unwrap_or("0");
                Some(format!("{major}.{minor}"))
            }
        }
    }

    /// Subject name element: `NameID` or `NameIdentifier`.
    pub fn name_id_element(&self) -> &'static str {
        match self {
            Self::Saml1_1 => ns::node::NAME_IDENTIFIER,
            Self::Saml2 => ns::node::NAME_ID,
        }
    }

    /// Id attribute of a protocol request.
    pub fn request_id_attribute(&self) -> &'static str {
        match self {
            Self::Saml1_1 => "RequestID",
            Self::Saml2 => ns::attr::SAML2_ID,
        }
    }

    /// Id attribute of a protocol response.
    pub fn response_id_attribute(&self) -> &'static str {
        match self {
            Self::Saml1_1 => "ResponseID",
            Self::Saml2 => ns::attr::SAML2_ID,
        }
    }

    /// Id attribute of an assertion.
    pub fn assertion_id_attribute(&self) -> &'static str {
        match self {
            Self::Saml1_1 => ns::attr::ASSERTION_ID,
            Self::Saml2 => ns::attr::SAML2_ID,
        }
    }

    /// Attribute element in a query: `AttributeDesignator` or `Attribute`.
    pub fn query_attribute_element(&self) -> &'static str {
        match self {
            Self::Saml1_1 => ns::node::ATTRIBUTE_DESIGNATOR,
            Self::Saml2 => ns::node::ATTRIBUTE,
        }
    }

    /// Attribute name: `AttributeName` or `Name`.
    pub fn attribute_name_attribute(&self) -> &'static str {
        match self {
            Self::Saml1_1 => "AttributeName",
            Self::Saml2 => "Name",
        }
    }

    /// Attribute namespace or name format.
    pub fn attribute_format_attribute(&self) -> &'static str {
        match self {
            Self::Saml1_1 => "AttributeNamespace",
            Self::Saml2 => "NameFormat",
        }
    }

    /// Audience restriction: `AudienceRestriction` or
    /// `AudienceRestrictionCondition`.
    pub fn audience_restriction_element(&self) -> &'static str {
        match self {
            Self::Saml1_1 => ns::node::AUDIENCE_RESTRICTION_CONDITION,
            Self::Saml2 => ns::node::AUDIENCE_RESTRICTION,
        }
    }

    /// Whether attribute values can be explicitly nil (`xsi:nil`). SAML 1.1
    /// has no nil marker, so empty values are never a nil failure there.
    pub fn supports_nil(&self) -> bool {
        matches!(self, Self::Saml2)
    }

    /// Attributes a protocol root element carries to declare this version.
    pub fn version_attributes(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Saml1_1 => &[("MajorVersion", "1"), ("MinorVersion", "1")],
            Self::Saml2 => &[("Version", "2.0")],
        }
    }
}

impl std::fmt::Display for SamlVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for SamlVersion {
    type Err = vaxholm_core::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1.1" | "saml1.1" | "saml11" => Ok(Self::Saml1_1),
            "2.0" | "2" | "saml2" => Ok(Self::Saml2),
            other => Err(vaxholm_core::Error::Configuration(format!(
                "unknown SAML version: {other}"
            ))),
        }
    }
}

/// Whether `s` is an absolute URI: a scheme followed by `:` and no
/// whitespace.
pub fn is_valid_uri(s: &str) -> bool {
    let Some((scheme, rest)) = s.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    let scheme_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    scheme_ok && !rest.is_empty() && !s.chars().any(char::is_whitespace)
}

/// `prefix` followed by 32 random hex characters.
pub fn generate_id(prefix: &str) -> String {
    let suffix: String = vaxholm_crypto::random_bytes(16)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    format!("{prefix}{suffix}")
}

/// An `NCName`: no colon, and not starting with a digit, `-` or `.`.
pub fn is_valid_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
