#![forbid(unsafe_code)]

//! XML-Enc encryption.
//!
//! Produces serialized `xenc:EncryptedData` and `xenc:EncryptedKey`
//! elements; placing them in a document is the caller's job.

use crate::context::{EncContext, EncType};
use base64::{engine::general_purpose::STANDARD, Engine};
use vaxholm_core::{ns, Error};
use vaxholm_xml::XmlWriter;

/// Encrypt `plaintext` into an `EncryptedData` element.
///
/// `key_info` is the inner XML of `ds:KeyInfo`, written verbatim.
pub fn encrypt_data(
    ctx: &EncContext,
    plaintext: &[u8],
    key: &[u8],
    id: Option<&str>,
    enc_type: EncType,
    key_info: Option<&str>,
) -> Result<String, Error> {
    let cipher = vaxholm_crypto::cipher::from_uri(&ctx.cipher_uri)?;
    let ciphertext = cipher.encrypt(key, plaintext)?;

    let mut attrs: Vec<(&str, &str)> = vec![("xmlns:xenc", ns::ENC)];
    if let Some(id) = id {
        attrs.push(("Id", id));
    }
    attrs.push(("Type", enc_type.uri()));

    let mut w = XmlWriter::new();
    w.start_element("xenc:EncryptedData", &attrs);
    w.empty_element("xenc:EncryptionMethod", &[("Algorithm", &ctx.cipher_uri)]);
    if let Some(key_info) = key_info {
        w.start_element("ds:KeyInfo", &[("xmlns:ds", ns::DSIG)]);
        w.write_raw(key_info);
        w.end_element()?;
    }
    write_cipher_data(&mut w, &ciphertext)?;
    w.end_element()?;
    w.into_string()
}

/// An encrypted session key, ready to serialize.
#[derive(Debug, Clone)]
pub struct EncryptedKeyOutput {
    pub xml: String,
    /// Raw `CipherValue` octets; their SHA-1 is the `EncryptedKeySHA1`.
    pub cipher_value: Vec<u8>,
}

/// Encrypt `session_key` for `recipient` into an `EncryptedKey` element.
///
/// `data_references` become the `ReferenceList` (`#id` URIs are written
/// as given).
pub fn encrypt_key(
    ctx: &EncContext,
    session_key: &[u8],
    recipient: &rsa::RsaPublicKey,
    id: Option<&str>,
    key_info: Option<&str>,
    data_references: &[String],
) -> Result<EncryptedKeyOutput, Error> {
    let transport = vaxholm_crypto::keytransport::from_uri(&ctx.key_transport_uri)?;
    let cipher_value = transport.encrypt(recipient, session_key)?;

    let mut attrs: Vec<(&str, &str)> = vec![("xmlns:xenc", ns::ENC)];
    if let Some(id) = id {
        attrs.push(("Id", id));
    }

    let mut w = XmlWriter::new();
    w.start_element("xenc:EncryptedKey", &attrs);
    w.empty_element("xenc:EncryptionMethod", &[("Algorithm", &ctx.key_transport_uri)]);
    if let Some(key_info) = key_info {
        w.start_element("ds:KeyInfo", &[("xmlns:ds", ns::DSIG)]);
        w.write_raw(key_info);
        w.end_element()?;
    }
    write_cipher_data(&mut w, &cipher_value)?;
    if !data_references.is_empty() {
        write_reference_list(&mut w, data_references)?;
    }
    w.end_element()?;
    Ok(EncryptedKeyOutput {
        xml: w.into_string()?,
        cipher_value,
    })
}

/// A standalone `xenc:ReferenceList`.
pub fn reference_list(data_references: &[String]) -> Result<String, Error> {
    let mut w = XmlWriter::new();
    w.start_element("xenc:ReferenceList", &[("xmlns:xenc", ns::ENC)]);
    for uri in data_references {
        w.empty_element("xenc:DataReference", &[("URI", uri)]);
    }
    w.end_element()?;
    w.into_string()
}

fn write_reference_list(w: &mut XmlWriter, data_references: &[String]) -> Result<(), Error> {
    w.start_element("xenc:ReferenceList", &[]);
    for uri in data_references {
        w.empty_element("xenc:DataReference", &[("URI", uri)]);
    }
    w.end_element()
}

fn write_cipher_data(w: &mut XmlWriter, ciphertext: &[u8]) -> Result<(), Error> {
    w.start_element("xenc:CipherData", &[]);
    w.text_element("xenc:CipherValue", &[], &STANDARD.encode(ciphertext));
    w.end_element()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::DecodePrivateKey;
    use vaxholm_core::algorithm;

    #[test]
    fn test_encrypted_data_shape() {
        let ctx = EncContext::new();
        let key = ctx.generate_session_key().unwrap();
        assert_eq!(key.len(), 16);
        let xml = encrypt_data(&ctx, b"<a/>", &key, Some("ED-1"), EncType::Content, None).unwrap();
        assert!(xml.starts_with("<xenc:EncryptedData xmlns:xenc=\"http://www.w3.org/2001/04/xmlenc#\" Id=\"ED-1\" Type=\"http://www.w3.org/2001/04/xmlenc#Content\">"));
        assert!(xml.contains(algorithm::AES128_CBC));
        assert!(!xml.contains("KeyInfo"));
        vaxholm_xml::parse(&xml).unwrap();
    }

    #[test]
    fn test_encrypted_key_with_references() {
        let key = rsa::RsaPrivateKey::from_pkcs8_pem(include_str!("../../../testdata/bob-key.pem"))
            .unwrap();
        let out = encrypt_key(
            &EncContext::new(),
            &[1u8; 16],
            &key.to_public_key(),
            Some("EK-1"),
            None,
            &["#ED-1".to_owned(), "#ED-2".to_owned()],
        )
        .unwrap();
        assert_eq!(out.cipher_value.len(), 256);
        assert!(out.xml.contains("<xenc:DataReference URI=\"#ED-2\"/>"));
        assert!(out.xml.contains(algorithm::RSA_PKCS1));
        vaxholm_xml::parse(&out.xml).unwrap();
    }

    #[test]
    fn test_standalone_reference_list() {
        let xml = reference_list(&["#a".to_owned()]).unwrap();
        assert_eq!(
            xml,
            "<xenc:ReferenceList xmlns:xenc=\"http://www.w3.org/2001/04/xmlenc#\"><xenc:DataReference URI=\"#a\"/></xenc:ReferenceList>"
        );
    }
}
