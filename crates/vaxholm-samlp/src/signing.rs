#![forbid(unsafe_code)]

//! Enveloped signatures on protocol messages.
//!
//! The signature follows `saml:Issuer` in SAML 2.0 messages and is the
//! first child in SAML 1.1 messages. `KeyInfo` carries the signing
//! certificate.

use crate::version::SamlVersion;
use base64::{engine::general_purpose::STANDARD, Engine};
use vaxholm_core::{ns, Error};
use vaxholm_crypto::sign::SigningKey;
use vaxholm_dsig::{sign, verify, DsigContext};
use vaxholm_keys::X509Cert;
use vaxholm_xml::document::child_element;

/// Certificate and private key used to sign messages.
#[derive(Clone)]
pub struct SigningCredential {
    pub certificate: X509Cert,
    pub private_key: rsa::RsaPrivateKey,
}

impl std::fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCredential")
            .field("certificate", &self.certificate.subject())
            .finish_non_exhaustive()
    }
}

impl SigningCredential {
    pub fn new(certificate: X509Cert, private_key: rsa::RsaPrivateKey) -> Self {
        Self {
            certificate,
            private_key,
        }
    }

    /// Sign the element with id `element_id` in `xml`.
    pub fn sign(&self, xml: &str, element_id: &str, version: SamlVersion) -> Result<String, Error> {
        let after = match version {
            SamlVersion::Saml2 => Some((ns::SAML2, ns::node::ISSUER)),
            SamlVersion::Saml1_1 => None,
        };
        let key_info = format!(
            "<ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data>",
            STANDARD.encode(self.certificate.der())
        );
        sign::sign_enveloped(
            &DsigContext::new(),
            xml,
            element_id,
            after,
            &SigningKey::Rsa(self.private_key.clone()),
            Some(&key_info),
        )
    }
}

/// Verify the enveloped signature of `element` against the certificate
/// embedded in its `KeyInfo`. `Ok(None)` when the element is unsigned.
pub fn verify_with_embedded_certificate(
    doc: &roxmltree::Document<'_>,
    element: roxmltree::Node<'_, '_>,
) -> Result<Option<X509Cert>, Error> {
    let Some(sig_node) = child_element(element, ns::DSIG, ns::node::SIGNATURE) else {
        return Ok(None);
    };
    let info = verify::parse_signature(sig_node)?;
    let key_info = info
        .key_info
        .ok_or_else(|| Error::UnresolvedKey("signature has no KeyInfo".into()))?;
    let der = verify::embedded_certificates(key_info)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::UnresolvedKey("signature KeyInfo has no certificate".into()))?;
    let cert = X509Cert::from_der(&der)?;
    verify::verify_enveloped(doc, element, &SigningKey::RsaPublic(cert.public_key().clone()))?;
    Ok(Some(cert))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> SigningCredential {
        SigningCredential::new(
            X509Cert::from_pem(include_bytes!("../../../testdata/alice-cert.pem")).unwrap(),
            vaxholm_keys::loader::load_private_key(include_bytes!("../../../testdata/alice-key.pem"))
                .unwrap(),
        )
    }

    const REQUEST: &str = r#"<samlp:AttributeQuery xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="q1" Version="2.0"><saml:Issuer>sp</saml:Issuer><saml:Subject><saml:NameID>bob</saml:NameID></saml:Subject></samlp:AttributeQuery>"#;

    #[test]
    fn test_sign_after_issuer_and_verify() {
        let credential = alice();
        let signed = credential.sign(REQUEST, "q1", SamlVersion::Saml2).unwrap();
        assert!(signed.contains("</saml:Issuer><ds:Signature"));
        let doc = vaxholm_xml::parse(&signed).unwrap();
        let cert = verify_with_embedded_certificate(&doc, doc.root_element()).unwrap();
        assert_eq!(cert, Some(credential.certificate));
    }

    #[test]
    fn test_tampered_subject_fails() {
        let signed = alice().sign(REQUEST, "q1", SamlVersion::Saml2).unwrap();
        let tampered = signed.replace(">bob<", ">eve<");
        let doc = vaxholm_xml::parse(&tampered).unwrap();
        let err = verify_with_embedded_certificate(&doc, doc.root_element()).unwrap_err();
        assert!(err.is_integrity_failure());
    }

    #[test]
    fn test_unsigned() {
        let doc = vaxholm_xml::parse(REQUEST).unwrap();
        assert_eq!(verify_with_embedded_certificate(&doc, doc.root_element()).unwrap(), None);
    }
}
