#![forbid(unsafe_code)]

//! Evaluation outcomes and SAML protocol status codes.

use crate::version::SamlVersion;
use tracing::debug;
use vaxholm_core::Error;

/// Terminal state of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertionStatus {
    /// Accepted.
    None,
    /// Well-formed but does not meet policy.
    Falsified,
    /// Wrong version or malformed.
    ServerError,
    /// The message could not be examined at all.
    Failed,
}

impl std::fmt::Display for AssertionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::None => "NONE",
            Self::Falsified => "FALSIFIED",
            Self::ServerError => "SERVER_ERROR",
            Self::Failed => "FAILED",
        })
    }
}

/// An evaluation status with the reason it was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub status: AssertionStatus,
    pub reason: Option<String>,
}

impl Evaluation {
    pub fn none() -> Self {
        Self {
            status: AssertionStatus::None,
            reason: None,
        }
    }

    pub fn falsified(reason: impl Into<String>) -> Self {
        Self::with_reason(AssertionStatus::Falsified, reason.into())
    }

    pub fn server_error(reason: impl Into<String>) -> Self {
        Self::with_reason(AssertionStatus::ServerError, reason.into())
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::with_reason(AssertionStatus::Failed, reason.into())
    }

    fn with_reason(status: AssertionStatus, reason: String) -> Self {
        debug!(%status, reason = reason.as_str(), "evaluation rejected message");
        Self {
            status,
            reason: Some(reason),
        }
    }

    pub fn is_none(&self) -> bool {
        self.status == AssertionStatus::None
    }
}

impl std::fmt::Display for Evaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{}: {reason}", self.status),
            None => write!(f, "{}", self.status),
        }
    }
}

/// Lets evaluation steps short-circuit with `?`.
pub(crate) type Step<T> = std::result::Result<T, Evaluation>;

// ── Protocol status codes ────────────────────────────────────────────

/// Status carried by a `samlp:Response`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamlStatus {
    #[default]
    Success,
    Requester,
    Responder,
    VersionMismatch,
    AuthnFailed,
    InvalidAttrNameOrValue,
    InvalidNameIdPolicy,
    NoPassive,
    RequestDenied,
    RequestUnsupported,
    RequestVersionDeprecated,
    RequestVersionTooHigh,
    RequestVersionTooLow,
    ResourceNotRecognized,
    TooManyResponses,
    UnknownAttrProfile,
    UnknownPrincipal,
    UnsupportedBinding,
}

const SAML2_STATUS_PREFIX: &str = "urn:oasis:names:tc:SAML:2.0:status:";

impl SamlStatus {
    const ALL: [SamlStatus; 18] = [
        Self::Success,
        Self::Requester,
        Self::Responder,
        Self::VersionMismatch,
        Self::AuthnFailed,
        Self::InvalidAttrNameOrValue,
        Self::InvalidNameIdPolicy,
        Self::NoPassive,
        Self::RequestDenied,
        Self::RequestUnsupported,
        Self::RequestVersionDeprecated,
        Self::RequestVersionTooHigh,
        Self::RequestVersionTooLow,
        Self::ResourceNotRecognized,
        Self::TooManyResponses,
        Self::UnknownAttrProfile,
        Self::UnknownPrincipal,
        Self::UnsupportedBinding,
    ];

    /// Local part of the code, shared by both versions.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Requester => "Requester",
            Self::Responder => "Responder",
            Self::VersionMismatch => "VersionMismatch",
            Self::AuthnFailed => "AuthnFailed",
            Self::InvalidAttrNameOrValue => "InvalidAttrNameOrValue",
            Self::InvalidNameIdPolicy => "InvalidNameIDPolicy",
            Self::NoPassive => "NoPassive",
            Self::RequestDenied => "RequestDenied",
            Self::RequestUnsupported => "RequestUnsupported",
            Self::RequestVersionDeprecated => "RequestVersionDeprecated",
            Self::RequestVersionTooHigh => "RequestVersionTooHigh",
            Self::RequestVersionTooLow => "RequestVersionTooLow",
            Self::ResourceNotRecognized => "ResourceNotRecognized",
            Self::TooManyResponses => "TooManyResponses",
            Self::UnknownAttrProfile => "UnknownAttrProfile",
            Self::UnknownPrincipal => "UnknownPrincipal",
            Self::UnsupportedBinding => "UnsupportedBinding",
        }
    }

    pub fn is_success(&self) -> bool {
        *self == Self::Success
    }

    /// The top-level code a second-level code is nested under.
    pub fn top_level(&self) -> SamlStatus {
        match self {
            Self::Success | Self::Requester | Self::Responder | Self::VersionMismatch => *self,
            Self::AuthnFailed
            | Self::NoPassive
            | Self::UnknownPrincipal
            | Self::InvalidNameIdPolicy
            | Self::ResourceNotRecognized
            | Self::TooManyResponses => Self::Responder,
            Self::InvalidAttrNameOrValue
            | Self::RequestDenied
            | Self::RequestUnsupported
            | Self::RequestVersionDeprecated
            | Self::RequestVersionTooHigh
            | Self::RequestVersionTooLow
            | Self::UnknownAttrProfile
            | Self::UnsupportedBinding => Self::Requester,
        }
    }

    /// Whether `version` has a second-level code of this name.
    fn has_second_level(&self, version: SamlVersion) -> bool {
        if self.top_level() == *self {
            return false;
        }
        match version {
            SamlVersion::Saml2 => true,
            SamlVersion::Saml1_1 => matches!(
                self,
                Self::RequestDenied
                    | Self::RequestVersionDeprecated
                    | Self::RequestVersionTooHigh
                    | Self::RequestVersionTooLow
                    | Self::ResourceNotRecognized
                    | Self::TooManyResponses
            ),
        }
    }

    /// `(top, second)` code values as written in a `StatusCode` `Value`.
    /// SAML 2.0 uses URIs; SAML 1.1 uses `samlp:` QNames. Codes SAML 1.1
    /// lacks collapse to their top-level code.
    pub fn code_values(&self, version: SamlVersion) -> (String, Option<String>) {
        let write = |s: SamlStatus| match version {
            SamlVersion::Saml2 => format!("{SAML2_STATUS_PREFIX}{}", s.name()),
            SamlVersion::Saml1_1 => format!("samlp:{}", s.name()),
        };
        let second = self.has_second_level(version).then(|| write(*self));
        (write(self.top_level()), second)
    }

    /// Read a top-level `StatusCode` element.
    pub fn from_status_code(node: roxmltree::Node<'_, '_>) -> Option<SamlStatus> {
        let value = node.attribute("Value")?;
        let name = match SamlVersion::of_element(node)? {
            SamlVersion::Saml2 => value.strip_prefix(SAML2_STATUS_PREFIX)?,
            SamlVersion::Saml1_1 => {
                let (prefix, local) = value.split_once(':').unwrap_or(("", value));
                let prefix = (!prefix.is_empty()).then_some(prefix);
                if node.lookup_namespace_uri(prefix) != Some(vaxholm_core::ns::SAMLP1) {
                    return None;
                }
                local
            }
        };
        Self::ALL.into_iter().find(|s| s.name() == name)
    }
}

impl std::str::FromStr for SamlStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix(SAML2_STATUS_PREFIX).unwrap_or(s);
        Self::ALL
            .into_iter()
            .find(|status| status.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::Configuration(format!("unknown SAML status: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saml2_code_values() {
        assert_eq!(
            SamlStatus::Success.code_values(SamlVersion::Saml2),
            ("urn:oasis:names:tc:SAML:2.0:status:Success".to_owned(), None)
        );
        let (top, second) = SamlStatus::AuthnFailed.code_values(SamlVersion::Saml2);
        assert_eq!(top, "urn:oasis:names:tc:SAML:2.0:status:Responder");
        assert_eq!(second.as_deref(), Some("urn:oasis:names:tc:SAML:2.0:status:AuthnFailed"));
    }

    #[test]
    fn test_saml11_code_values() {
        assert_eq!(
            SamlStatus::Success.code_values(SamlVersion::Saml1_1),
            ("samlp:Success".to_owned(), None)
        );
        assert_eq!(
            SamlStatus::RequestDenied.code_values(SamlVersion::Saml1_1),
            ("samlp:Requester".to_owned(), Some("samlp:RequestDenied".to_owned()))
        );
        // no SAML 1.1 equivalent
        assert_eq!(
            SamlStatus::AuthnFailed.code_values(SamlVersion::Saml1_1),
            ("samlp:Responder".to_owned(), None)
        );
    }

    #[test]
    fn test_read_status_code() {
        let doc = vaxholm_xml::parse(
            r#"<r><p:StatusCode xmlns:p="urn:oasis:names:tc:SAML:1.0:protocol" Value="p:Success"/><q:StatusCode xmlns:q="urn:oasis:names:tc:SAML:2.0:protocol" Value="urn:oasis:names:tc:SAML:2.0:status:Requester"/><p:StatusCode xmlns:p="urn:oasis:names:tc:SAML:1.0:protocol" Value="x:Success"/></r>"#,
        )
        .unwrap();
        let codes: Vec<_> = doc.root_element().children().filter(|n| n.is_element()).collect();
        assert_eq!(SamlStatus::from_status_code(codes[0]), Some(SamlStatus::Success));
        assert_eq!(SamlStatus::from_status_code(codes[1]), Some(SamlStatus::Requester));
        assert_eq!(SamlStatus::from_status_code(codes[2]), None);
    }

    #[test]
    fn test_parse_status() {
        assert_eq!("success".parse::<SamlStatus>().unwrap(), SamlStatus::Success);
        assert_eq!(
            "urn:oasis:names:tc:SAML:2.0:status:RequestDenied".parse::<SamlStatus>().unwrap(),
            SamlStatus::RequestDenied
        );
        assert!("Bogus".parse::<SamlStatus>().is_err());
    }

    #[test]
    fn test_evaluation_display() {
        assert_eq!(Evaluation::none().to_string(), "NONE");
        assert_eq!(Evaluation::falsified("Missing Issuer").to_string(), "FALSIFIED: Missing Issuer");
    }
}
