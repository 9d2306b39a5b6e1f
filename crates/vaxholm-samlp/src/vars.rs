#![forbid(unsafe_code)]

//! Context variable names: `<prefix>.<suffix>`.

pub const PREFIX_ATTRIBUTE_QUERY: &str = "attrQuery";
pub const PREFIX_AUTHN_REQUEST: &str = "authnRequest";
pub const PREFIX_RESPONSE: &str = "samlpResponse";

pub const ID: &str = "id";
pub const VERSION: &str = "version";
pub const ISSUE_INSTANT: &str = "issueInstant";
pub const DESTINATION: &str = "destination";
pub const CONSENT: &str = "consent";
pub const ISSUER: &str = "issuer";
pub const ISSUER_NAME_QUALIFIER: &str = "issuer.nameQualifier";
pub const ISSUER_SP_NAME_QUALIFIER: &str = "issuer.spNameQualifier";
pub const ISSUER_FORMAT: &str = "issuer.format";
pub const ISSUER_SP_PROVIDED_ID: &str = "issuer.spProvidedId";
pub const SUBJECT: &str = "subject";
pub const SUBJECT_NAME_QUALIFIER: &str = "subject.nameQualifier";
pub const SUBJECT_SP_NAME_QUALIFIER: &str = "subject.spNameQualifier";
pub const SUBJECT_FORMAT: &str = "subject.format";
pub const SUBJECT_SP_PROVIDED_ID: &str = "subject.spProvidedId";
pub const ATTRIBUTES: &str = "attributes";
pub const ELEMENTS_DECRYPTED: &str = "elementsDecrypted";
pub const ENCRYPTION_METHOD_URIS: &str = "encryptionMethodUris";
pub const RECIPIENT_CERTIFICATES: &str = "recipientCertificates";
/// Certificate whose signature over the message verified.
pub const X509_CERT_BASE64: &str = "x509CertBase64";

// AuthnRequest only.
pub const ACS_URL: &str = "acsUrl";
pub const ACS_INDEX: &str = "acsIndex";
pub const ATTRCS_INDEX: &str = "attrcsIndex";
pub const PROTOCOL_BINDING: &str = "protocolBinding";
pub const PROVIDER_NAME: &str = "providerName";
pub const FORCE_AUTHN: &str = "forceAuthn";
pub const IS_PASSIVE: &str = "isPassive";

/// Issuer variables, in publication order.
pub const ISSUER_SUFFIXES: [&str; 5] = [
    ISSUER,
    ISSUER_NAME_QUALIFIER,
    ISSUER_SP_NAME_QUALIFIER,
    ISSUER_FORMAT,
    ISSUER_SP_PROVIDED_ID,
];

/// Subject variables, in publication order.
pub const SUBJECT_SUFFIXES: [&str; 5] = [
    SUBJECT,
    SUBJECT_NAME_QUALIFIER,
    SUBJECT_SP_NAME_QUALIFIER,
    SUBJECT_FORMAT,
    SUBJECT_SP_PROVIDED_ID,
];

/// `<prefix>.<suffix>`
pub fn name(prefix: &str, suffix: &str) -> String {
    format!("{prefix}.{suffix}")
}

/// Whether `prefix` can head a variable name: non-empty, no whitespace,
/// no `$`, `{` or `}`.
pub fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && !prefix
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '$' | '{' | '}'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(name(PREFIX_ATTRIBUTE_QUERY, ISSUER_FORMAT), "attrQuery.issuer.format");
        assert_eq!(name(PREFIX_AUTHN_REQUEST, ACS_URL), "authnRequest.acsUrl");
    }

    #[test]
    fn test_prefix_validation() {
        assert!(is_valid_prefix("attrQuery"));
        assert!(!is_valid_prefix(""));
        assert!(!is_valid_prefix("a b"));
        assert!(!is_valid_prefix("${x}"));
    }
}
