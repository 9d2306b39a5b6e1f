//! AttributeQuery evaluation against realistic inbound requests.

use base64::{engine::general_purpose::STANDARD, Engine};
use std::sync::Arc;
use vaxholm_keys::{SimpleSecurityTokenResolver, X509Cert};
use vaxholm_samlp::version::format;
use vaxholm_samlp::{
    AssertionStatus, AttributeQueryEvaluator, AttributeQueryEvaluatorConfig, ContextValue, Evaluation,
    PolicyContext, QueryAttribute, RecipientCertificate, RequestBuilder, RequestBuilderConfig, SamlVersion,
    SigningCredential, SimplePolicyContext,
};

const FASC_N: &str = "urn:idmanagement.gov:icam:bae:v2:SAML:2.0:nameid-format:fasc-n";
const DESTINATION: &str = "urn:idmanagement.gov:icam:bae:v2:1:7000:0000";

const FULL_REQUEST: &str = r#"<samlp:AttributeQuery
  xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion"
  xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol"
  ID="aaf23196-1773-2113-474a-fe114412ab72"
  Destination="urn:idmanagement.gov:icam:bae:v2:1:7000:0000"
  Consent="uri:consent"
  Version="2.0"
  IssueInstant="2006-07-17T22:26:40Z">
  <saml:Issuer>urn:idmanagement.gov:icam:bae:v2:1:2100:1700</saml:Issuer>
  <saml:Subject>
    <saml:NameID
      Format="urn:idmanagement.gov:icam:bae:v2:SAML:2.0:nameid-format:fasc-n">
          70001234000002110000000000000000
    </saml:NameID>
  </saml:Subject>
  <saml:Attribute Name="nc:PersonGivenName"
      NameFormat="urn:oasis:names:tc:SAML:2.0:attrname-format:basic">
  </saml:Attribute>
  <saml:Attribute Name="nc:PersonMiddleName"
       NameFormat="urn:oasis:names:tc:SAML:2.0:attrname-format:basic">
  </saml:Attribute>
  <saml:Attribute Name="nc:PersonSurName"
       NameFormat="urn:oasis:names:tc:SAML:2.0:attrname-format:basic">
  </saml:Attribute>
</samlp:AttributeQuery>"#;

const MINIMAL_REQUEST: &str = r#"<samlp:AttributeQuery
  xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion"
  xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol"
  ID="aaf23196-1773-2113-474a-fe114412ab72"
  Version="2.0"
  IssueInstant="2006-07-17T22:26:40Z">
  <saml:Subject>
    <saml:NameID>
          70001234000002110000000000000000
    </saml:NameID>
  </saml:Subject>
</samlp:AttributeQuery>"#;

const DUPLICATE_ATTRIBUTES: &str = r#"<samlp:AttributeQuery
  xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion"
  xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol"
  ID="aaf23196-1773-2113-474a-fe114412ab72"
  Version="2.0"
  IssueInstant="2006-07-17T22:26:40Z">
  <saml:Issuer>urn:idmanagement.gov:icam:bae:v2:1:2100:1700</saml:Issuer>
  <saml:Subject><saml:NameID>70001234000002110000000000000000</saml:NameID></saml:Subject>
  <saml:Attribute Name="nc:PersonGivenName"/>
  <saml:Attribute Name="nc:PersonSurName"/>
  <saml:Attribute Name="nc:PersonSurName"/>
</samlp:AttributeQuery>"#;

fn full_config() -> AttributeQueryEvaluatorConfig {
    let mut config = AttributeQueryEvaluatorConfig::default()
        .with_custom_subject_formats(FASC_N)
        .with_attribute_name_formats(&[format::ATTRNAME_BASIC]);
    config.require_attribute_name_format = true;
    config
}

fn evaluate(config: AttributeQueryEvaluatorConfig, message: &str) -> (Evaluation, SimplePolicyContext) {
    let mut ctx = SimplePolicyContext::new();
    let evaluation = AttributeQueryEvaluator::new(config).unwrap().evaluate(message, &mut ctx);
    (evaluation, ctx)
}

#[test]
fn test_all_variables_published() {
    let (evaluation, ctx) = evaluate(full_config(), FULL_REQUEST);
    assert!(evaluation.is_none(), "{evaluation}");

    assert_eq!(ctx.text("attrQuery.id"), Some("aaf23196-1773-2113-474a-fe114412ab72"));
    assert_eq!(ctx.text("attrQuery.version"), Some("2.0"));
    assert_eq!(ctx.text("attrQuery.issueInstant"), Some("2006-07-17T22:26:40.000Z"));
    assert_eq!(ctx.text("attrQuery.destination"), Some(DESTINATION));
    assert_eq!(ctx.text("attrQuery.consent"), Some("uri:consent"));
    assert_eq!(ctx.text("attrQuery.issuer"), Some("urn:idmanagement.gov:icam:bae:v2:1:2100:1700"));
    assert_eq!(ctx.text("attrQuery.subject"), Some("70001234000002110000000000000000"));
    assert_eq!(ctx.text("attrQuery.subject.format"), Some(FASC_N));

    let attributes = ctx.variable("attrQuery.attributes").unwrap().to_elements();
    assert_eq!(attributes.len(), 3);
    assert!(attributes[0].contains(r#"Name="nc:PersonGivenName""#));
    assert!(vaxholm_xml::parse(&attributes[2]).is_ok());

    for name in [
        "attrQuery.issuer.nameQualifier",
        "attrQuery.subject.spProvidedId",
        "attrQuery.elementsDecrypted",
        "attrQuery.encryptionMethodUris",
        "attrQuery.recipientCertificates",
        "attrQuery.x509CertBase64",
    ] {
        assert!(ctx.is_set(name), "{name} should be published");
        assert!(ctx.variable(name).is_none(), "{name} should be unset");
    }
}

#[test]
fn test_optional_values_absent() {
    let mut config = AttributeQueryEvaluatorConfig::default();
    config.require_issuer = false;
    let (evaluation, ctx) = evaluate(config, MINIMAL_REQUEST);
    assert!(evaluation.is_none(), "{evaluation}");
    assert_eq!(ctx.text("attrQuery.subject.format"), Some(format::NAMEID_UNSPECIFIED));
    assert!(ctx.variable("attrQuery.destination").is_none());
    assert!(ctx.variable("attrQuery.consent").is_none());
    assert!(ctx.variable("attrQuery.attributes").is_none());
}

#[test]
fn test_destination_must_match_configuration() {
    let (evaluation, _) = evaluate(full_config().with_destination(DESTINATION), FULL_REQUEST);
    assert!(evaluation.is_none(), "{evaluation}");

    let (evaluation, _) = evaluate(full_config().with_destination("http://a.different.destination"), FULL_REQUEST);
    assert_eq!(evaluation.status, AssertionStatus::Falsified);
}

#[test]
fn test_destination_list_from_variable() {
    let evaluator = AttributeQueryEvaluator::new(full_config().with_destination("${allowed}")).unwrap();
    let mut ctx = SimplePolicyContext::new().with_variable(
        "allowed",
        ContextValue::Texts(vec!["not a uri".into(), "urn:other".into(), DESTINATION.into()]),
    );
    let evaluation = evaluator.evaluate(FULL_REQUEST, &mut ctx);
    assert!(evaluation.is_none(), "{evaluation}");
}

#[test]
fn test_unsupported_formats_are_falsified() {
    // The FASC-N subject format is not accepted without configuration.
    let mut config = full_config();
    config.custom_subject_formats = None;
    let (evaluation, _) = evaluate(config, FULL_REQUEST);
    assert_eq!(evaluation.status, AssertionStatus::Falsified);

    let config = full_config().with_attribute_name_formats(&[format::ATTRNAME_URI]);
    let (evaluation, _) = evaluate(config, FULL_REQUEST);
    assert_eq!(evaluation.status, AssertionStatus::Falsified);
}

#[test]
fn test_missing_attribute_name_format() {
    let mut config = AttributeQueryEvaluatorConfig::default();
    config.require_attribute_name_format = true;
    let (evaluation, _) = evaluate(config, DUPLICATE_ATTRIBUTES);
    assert_eq!(evaluation.status, AssertionStatus::Falsified);
}

#[test]
fn test_duplicate_attributes_are_falsified() {
    let (evaluation, _) = evaluate(AttributeQueryEvaluatorConfig::default(), DUPLICATE_ATTRIBUTES);
    assert_eq!(evaluation, Evaluation::falsified("Duplicate attribute: nc:PersonSurName"));
}

#[test]
fn test_empty_subject_is_falsified() {
    let message = r#"<samlp:AttributeQuery xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="q" Version="2.0" IssueInstant="2006-07-17T22:26:40Z"><saml:Issuer>urn:sp</saml:Issuer><saml:Subject></saml:Subject></samlp:AttributeQuery>"#;
    let (evaluation, _) = evaluate(AttributeQueryEvaluatorConfig::default(), message);
    assert_eq!(evaluation, Evaluation::falsified("Missing NameID"));
}

#[test]
fn test_soap_encapsulated_request() {
    let mut config = full_config();
    config.soap_encapsulated = true;
    let message = format!(
        r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/"><soapenv:Header/><soapenv:Body>{FULL_REQUEST}</soapenv:Body></soapenv:Envelope>"#
    );
    let (evaluation, _) = evaluate(config.clone(), &message);
    assert!(evaluation.is_none(), "{evaluation}");

    let (evaluation, _) = evaluate(config, FULL_REQUEST);
    assert_eq!(evaluation.status, AssertionStatus::Failed);
}

// ── Built then evaluated ─────────────────────────────────────────────

fn bob() -> (X509Cert, rsa::RsaPrivateKey) {
    (
        X509Cert::from_pem(include_bytes!("../../../testdata/bob-cert.pem")).unwrap(),
        vaxholm_keys::loader::load_private_key(include_bytes!("../../../testdata/bob-key.pem")).unwrap(),
    )
}

fn encrypted_query() -> String {
    let (bob_cert, _) = bob();
    let config = RequestBuilderConfig::attribute_query(SamlVersion::Saml2, "${user}")
        .with_issuer("urn:requester")
        .with_destination(DESTINATION)
        .with_attribute(QueryAttribute::new("mail").with_name_format(format::ATTRNAME_BASIC))
        .with_encrypted_name_id(RecipientCertificate::Static(bob_cert), false);
    let mut ctx = SimplePolicyContext::new().with_variable("user", "alice@example.com");
    RequestBuilder::new(config).unwrap().build(&mut ctx).unwrap()
}

fn encrypted_id_config() -> AttributeQueryEvaluatorConfig {
    let mut config = AttributeQueryEvaluatorConfig::default();
    config.allow_encrypted_id = true;
    config
}

#[test]
fn test_encrypted_id_decrypted_with_recipient_key() {
    let (bob_cert, bob_key) = bob();
    let mut resolver = SimpleSecurityTokenResolver::new();
    resolver.add_key_pair(bob_cert.clone(), bob_key);
    let evaluator = AttributeQueryEvaluator::new(encrypted_id_config())
        .unwrap()
        .with_resolver(Arc::new(resolver));

    let mut ctx = SimplePolicyContext::new();
    let evaluation = evaluator.evaluate(&encrypted_query(), &mut ctx);
    assert!(evaluation.is_none(), "{evaluation}");
    assert_eq!(ctx.text("attrQuery.subject"), Some("alice@example.com"));
    assert_eq!(
        ctx.variable("attrQuery.recipientCertificates"),
        Some(&ContextValue::Certificates(vec![bob_cert]))
    );
    assert_eq!(
        ctx.variable("attrQuery.encryptionMethodUris"),
        Some(&ContextValue::Texts(vec![
            vaxholm_core::algorithm::AES128_CBC.into(),
            vaxholm_core::algorithm::RSA_PKCS1.into(),
        ]))
    );
    let decrypted = ctx.variable("attrQuery.elementsDecrypted").unwrap().to_elements();
    assert_eq!(decrypted.len(), 1);
    assert!(decrypted[0].contains("alice@example.com"));
}

#[test]
fn test_encrypted_id_without_key_is_server_error() {
    let evaluator = AttributeQueryEvaluator::new(encrypted_id_config())
        .unwrap()
        .with_resolver(Arc::new(SimpleSecurityTokenResolver::new()));
    let mut ctx = SimplePolicyContext::new();
    let evaluation = evaluator.evaluate(&encrypted_query(), &mut ctx);
    assert_eq!(evaluation.status, AssertionStatus::ServerError);
}

#[test]
fn test_encrypted_id_left_encrypted() {
    let mut config = encrypted_id_config();
    config.decrypt_encrypted_id = false;
    let (evaluation, ctx) = evaluate(config, &encrypted_query());
    assert!(evaluation.is_none(), "{evaluation}");
    assert!(ctx.is_set("attrQuery.subject"));
    assert!(ctx.variable("attrQuery.subject").is_none());
    assert!(ctx.variable("attrQuery.elementsDecrypted").is_none());
}

#[test]
fn test_encrypted_id_not_allowed() {
    let (evaluation, _) = evaluate(AttributeQueryEvaluatorConfig::default(), &encrypted_query());
    assert_eq!(evaluation, Evaluation::falsified("Missing NameID"));
}

fn credential(name: &str) -> SigningCredential {
    let (cert, key): (&[u8], &[u8]) = match name {
        "alice" => (
            include_bytes!("../../../testdata/alice-cert.pem"),
            include_bytes!("../../../testdata/alice-key.pem"),
        ),
        _ => (
            include_bytes!("../../../testdata/mallory-cert.pem"),
            include_bytes!("../../../testdata/mallory-key.pem"),
        ),
    };
    SigningCredential::new(
        X509Cert::from_pem(cert).unwrap(),
        vaxholm_keys::loader::load_private_key(key).unwrap(),
    )
}

fn signed_query(signer: SigningCredential) -> String {
    let config = RequestBuilderConfig::attribute_query(SamlVersion::Saml2, "admin")
        .with_issuer("urn:requester")
        .with_signing(signer);
    RequestBuilder::new(config).unwrap().build(&mut SimplePolicyContext::new()).unwrap()
}

fn verifying_config() -> AttributeQueryEvaluatorConfig {
    let mut config = AttributeQueryEvaluatorConfig::default();
    config.require_signature = true;
    config.verify_signature = true;
    config
}

#[test]
fn test_signer_certificate_is_published() {
    let (evaluation, ctx) = evaluate(verifying_config(), &signed_query(credential("mallory")));
    assert!(evaluation.is_none(), "{evaluation}");
    let mallory = STANDARD.encode(credential("mallory").certificate.der());
    assert_eq!(ctx.text("attrQuery.x509CertBase64"), Some(mallory.as_str()));
    assert_eq!(ctx.text("attrQuery.subject"), Some("admin"));
}

#[test]
fn test_untrusted_signer_is_falsified() {
    let config = verifying_config().with_trusted_signer(credential("alice").certificate);

    let (evaluation, ctx) = evaluate(config.clone(), &signed_query(credential("mallory")));
    assert_eq!(evaluation.status, AssertionStatus::Falsified);
    assert!(ctx.variable("attrQuery.subject").is_none());

    let (evaluation, ctx) = evaluate(config, &signed_query(credential("alice")));
    assert!(evaluation.is_none(), "{evaluation}");
    assert_eq!(ctx.text("attrQuery.subject"), Some("admin"));
}
