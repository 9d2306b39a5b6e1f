#![forbid(unsafe_code)]

//! XML namespace constants used across the library.

/// SOAP 1.1 envelope namespace
pub const SOAP11: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// SOAP 1.2 envelope namespace
pub const SOAP12: &str = "http://www.w3.org/2003/05/soap-envelope";

/// SOAP 1.1 "next" actor
pub const SOAP11_ACTOR_NEXT: &str = "http://schemas.xmlsoap.org/soap/actor/next";

/// SOAP 1.2 "next" role
pub const SOAP12_ROLE_NEXT: &str = "http://www.w3.org/2003/05/soap-envelope/role/next";

/// WS-Security 1.0 extension namespace
pub const WSSE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";

/// WS-Security utility namespace (`wsu:Id`, `wsu:Timestamp`)
pub const WSU: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";

/// WS-Security 1.1 extension namespace
pub const WSSE11: &str = "http://docs.oasis-open.org/wss/oasis-wss-wssecurity-secext-1.1.xsd";

/// WS-SecureConversation 1.3 namespace
pub const WSSC: &str = "http://docs.oasis-open.org/ws-sx/ws-secureconversation/200512";

/// WS-SecureConversation February 2005 namespace
pub const WSSC_2005: &str = "http://schemas.xmlsoap.org/ws/2005/02/sc";

/// XML Digital Signature namespace
pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XML Encryption namespace
pub const ENC: &str = "http://www.w3.org/2001/04/xmlenc#";

/// Exclusive C14N namespace
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// SAML 1.x assertion namespace
pub const SAML1: &str = "urn:oasis:names:tc:SAML:1.0:assertion";

/// SAML 1.x protocol namespace
pub const SAMLP1: &str = "urn:oasis:names:tc:SAML:1.0:protocol";

/// SAML 2.0 assertion namespace
pub const SAML2: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

/// SAML 2.0 protocol namespace
pub const SAMLP2: &str = "urn:oasis:names:tc:SAML:2.0:protocol";

/// XML Schema instance namespace (`xsi:nil`, `xsi:type`)
pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// XML Schema namespace
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema";

/// XML namespace
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";

/// XMLNS namespace
pub const XMLNS: &str = "http://www.w3.org/2000/xmlns/";

// ── Element names ────────────────────────────────────────────────────

pub mod node {
    // SOAP elements
    pub const ENVELOPE: &str = "Envelope";
    pub const HEADER: &str = "Header";
    pub const BODY: &str = "Body";

    // WS-Security elements
    pub const SECURITY: &str = "Security";
    pub const BINARY_SECURITY_TOKEN: &str = "BinarySecurityToken";
    pub const USERNAME_TOKEN: &str = "UsernameToken";
    pub const USERNAME: &str = "Username";
    pub const PASSWORD: &str = "Password";
    pub const NONCE: &str = "Nonce";
    pub const CREATED: &str = "Created";
    pub const EXPIRES: &str = "Expires";
    pub const TIMESTAMP: &str = "Timestamp";
    pub const SECURITY_TOKEN_REFERENCE: &str = "SecurityTokenReference";
    pub const KEY_IDENTIFIER: &str = "KeyIdentifier";
    pub const WSSE_REFERENCE: &str = "Reference";
    pub const SIGNATURE_CONFIRMATION: &str = "SignatureConfirmation";

    // WS-SecureConversation elements
    pub const SECURITY_CONTEXT_TOKEN: &str = "SecurityContextToken";
    pub const IDENTIFIER: &str = "Identifier";
    pub const DERIVED_KEY_TOKEN: &str = "DerivedKeyToken";
    pub const GENERATION: &str = "Generation";
    pub const OFFSET: &str = "Offset";
    pub const LENGTH: &str = "Length";
    pub const LABEL: &str = "Label";

    // DSig elements
    pub const SIGNATURE: &str = "Signature";
    pub const SIGNED_INFO: &str = "SignedInfo";
    pub const CANONICALIZATION_METHOD: &str = "CanonicalizationMethod";
    pub const SIGNATURE_METHOD: &str = "SignatureMethod";
    pub const SIGNATURE_VALUE: &str = "SignatureValue";
    pub const DIGEST_METHOD: &str = "DigestMethod";
    pub const DIGEST_VALUE: &str = "DigestValue";
    pub const REFERENCE: &str = "Reference";
    pub const TRANSFORMS: &str = "Transforms";
    pub const TRANSFORM: &str = "Transform";
    pub const INCLUSIVE_NAMESPACES: &str = "InclusiveNamespaces";

    // KeyInfo elements
    pub const KEY_INFO: &str = "KeyInfo";
    pub const KEY_NAME: &str = "KeyName";
    pub const X509_DATA: &str = "X509Data";
    pub const X509_CERTIFICATE: &str = "X509Certificate";
    pub const X509_ISSUER_SERIAL: &str = "X509IssuerSerial";
    pub const X509_ISSUER_NAME: &str = "X509IssuerName";
    pub const X509_SERIAL_NUMBER: &str = "X509SerialNumber";
    pub const X509_SKI: &str = "X509SKI";

    // Encryption elements
    pub const ENCRYPTED_DATA: &str = "EncryptedData";
    pub const ENCRYPTED_KEY: &str = "EncryptedKey";
    pub const ENCRYPTION_METHOD: &str = "EncryptionMethod";
    pub const CIPHER_DATA: &str = "CipherData";
    pub const CIPHER_VALUE: &str = "CipherValue";
    pub const REFERENCE_LIST: &str = "ReferenceList";
    pub const DATA_REFERENCE: &str = "DataReference";
    pub const OAEP_PARAMS: &str = "OAEPparams";

    // SAML elements
    pub const ASSERTION: &str = "Assertion";
    pub const ISSUER: &str = "Issuer";
    pub const SUBJECT: &str = "Subject";
    pub const NAME_ID: &str = "NameID";
    pub const NAME_IDENTIFIER: &str = "NameIdentifier";
    pub const ENCRYPTED_ID: &str = "EncryptedID";
    pub const SUBJECT_CONFIRMATION: &str = "SubjectConfirmation";
    pub const CONDITIONS: &str = "Conditions";
    pub const AUDIENCE_RESTRICTION: &str = "AudienceRestriction";
    pub const AUDIENCE_RESTRICTION_CONDITION: &str = "AudienceRestrictionCondition";
    pub const AUDIENCE: &str = "Audience";
    pub const ATTRIBUTE_STATEMENT: &str = "AttributeStatement";
    pub const ATTRIBUTE: &str = "Attribute";
    pub const ATTRIBUTE_DESIGNATOR: &str = "AttributeDesignator";
    pub const ATTRIBUTE_VALUE: &str = "AttributeValue";

    // SAMLP elements
    pub const REQUEST: &str = "Request";
    pub const RESPONSE: &str = "Response";
    pub const ATTRIBUTE_QUERY: &str = "AttributeQuery";
    pub const AUTHN_REQUEST: &str = "AuthnRequest";
    pub const NAME_ID_POLICY: &str = "NameIDPolicy";
    pub const EXTENSIONS: &str = "Extensions";
    pub const STATUS: &str = "Status";
    pub const STATUS_CODE: &str = "StatusCode";
    pub const STATUS_MESSAGE: &str = "StatusMessage";
    pub const STATUS_DETAIL: &str = "StatusDetail";
}

// ── Attribute names ──────────────────────────────────────────────────

pub mod attr {
    pub const ID: &str = "Id";
    pub const SAML2_ID: &str = "ID";
    pub const ASSERTION_ID: &str = "AssertionID";
    pub const URI: &str = "URI";
    pub const TYPE: &str = "Type";
    pub const ALGORITHM: &str = "Algorithm";
    pub const PREFIX_LIST: &str = "PrefixList";
    pub const ACTOR: &str = "actor";
    pub const ROLE: &str = "role";
    pub const MUST_UNDERSTAND: &str = "mustUnderstand";
    pub const VALUE_TYPE: &str = "ValueType";
    pub const ENCODING_TYPE: &str = "EncodingType";
    pub const TOKEN_TYPE: &str = "TokenType";
    pub const VALUE: &str = "Value";
    pub const NIL: &str = "nil";
}

// ── Encryption type URIs ─────────────────────────────────────────────

pub const ENC_TYPE_CONTENT: &str = "http://www.w3.org/2001/04/xmlenc#Content";
pub const ENC_TYPE_ELEMENT: &str = "http://www.w3.org/2001/04/xmlenc#Element";

// ── WS-Security token profile URIs ───────────────────────────────────

pub mod value_type {
    pub const X509V3: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509v3";
    pub const SKI: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509SubjectKeyIdentifier";
    pub const THUMBPRINT_SHA1: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-soap-message-security-1.1#ThumbprintSHA1";
    pub const ENCRYPTED_KEY_SHA1: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-soap-message-security-1.1#EncryptedKeySHA1";
    pub const ENCRYPTED_KEY: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-soap-message-security-1.1#EncryptedKey";
    pub const SAML1_ASSERTION_ID: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.0#SAMLAssertionID";
    pub const SAML2_ID: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLID";
    pub const SAML1_TOKEN: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLV1.1";
    pub const SAML2_TOKEN: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLV2.0";
    pub const SECURITY_CONTEXT_TOKEN: &str =
        "http://docs.oasis-open.org/ws-sx/ws-secureconversation/200512/sct";
    pub const DERIVED_KEY_TOKEN: &str =
        "http://docs.oasis-open.org/ws-sx/ws-secureconversation/200512/dk";
    pub const BASE64_BINARY: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";
    pub const PASSWORD_TEXT: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText";
}
