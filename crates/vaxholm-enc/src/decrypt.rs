#![forbid(unsafe_code)]

//! XML-Enc decryption.
//!
//! Processing order:
//! 1. Parse `EncryptedData` / `EncryptedKey`: EncryptionMethod, KeyInfo, CipherValue
//! 2. The caller resolves the key (session key, or private key for an `EncryptedKey`)
//! 3. Decrypt and check the plaintext is well-formed where it will be placed
//! 4. Stage the replacement of `EncryptedData` with the plaintext

use crate::context::EncType;
use vaxholm_core::{algorithm, ns, Error};
use vaxholm_crypto::keytransport::OaepParams;
use vaxholm_xml::document::{base64_content, child_element, child_elements, is_element};
use vaxholm_xml::Editor;

/// A parsed `xenc:EncryptedData` element.
#[derive(Debug)]
pub struct EncryptedDataInfo<'a, 'input> {
    pub node: roxmltree::Node<'a, 'input>,
    pub id: Option<String>,
    pub enc_type: EncType,
    pub algorithm: String,
    pub key_info: Option<roxmltree::Node<'a, 'input>>,
    pub cipher_value: Vec<u8>,
}

/// A parsed `xenc:EncryptedKey` element.
#[derive(Debug)]
pub struct EncryptedKeyInfo<'a, 'input> {
    pub node: roxmltree::Node<'a, 'input>,
    pub id: Option<String>,
    pub algorithm: String,
    pub oaep: OaepParams,
    pub key_info: Option<roxmltree::Node<'a, 'input>>,
    pub cipher_value: Vec<u8>,
    /// `DataReference` URIs from the embedded `ReferenceList`.
    pub data_references: Vec<String>,
}

pub fn parse_encrypted_data<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
) -> Result<EncryptedDataInfo<'a, 'input>, Error> {
    if !is_element(node, ns::ENC, ns::node::ENCRYPTED_DATA) {
        return Err(Error::XmlStructure("expected xenc:EncryptedData".into()));
    }
    let (algorithm, _) = read_encryption_method(node)?;
    Ok(EncryptedDataInfo {
        node,
        id: node.attribute(ns::attr::ID).map(str::to_owned),
        enc_type: EncType::from_uri(node.attribute(ns::attr::TYPE))?,
        algorithm,
        key_info: child_element(node, ns::DSIG, ns::node::KEY_INFO),
        cipher_value: read_cipher_value(node)?,
    })
}

pub fn parse_encrypted_key<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
) -> Result<EncryptedKeyInfo<'a, 'input>, Error> {
    if !is_element(node, ns::ENC, ns::node::ENCRYPTED_KEY) {
        return Err(Error::XmlStructure("expected xenc:EncryptedKey".into()));
    }
    let (algorithm, oaep) = read_encryption_method(node)?;
    Ok(EncryptedKeyInfo {
        node,
        id: node.attribute(ns::attr::ID).map(str::to_owned),
        algorithm,
        oaep,
        key_info: child_element(node, ns::DSIG, ns::node::KEY_INFO),
        cipher_value: read_cipher_value(node)?,
        data_references: child_element(node, ns::ENC, ns::node::REFERENCE_LIST)
            .map(reference_list_uris)
            .unwrap_or_default(),
    })
}

/// `DataReference` URIs of a `ReferenceList`.
pub fn reference_list_uris(list: roxmltree::Node<'_, '_>) -> Vec<String> {
    child_elements(list, ns::ENC, ns::node::DATA_REFERENCE)
        .into_iter()
        .filter_map(|r| r.attribute(ns::attr::URI))
        .map(str::to_owned)
        .collect()
}

/// Recover the session key of an `EncryptedKey`.
pub fn decrypt_key(
    info: &EncryptedKeyInfo<'_, '_>,
    private_key: &rsa::RsaPrivateKey,
) -> Result<Vec<u8>, Error> {
    let transport =
        vaxholm_crypto::keytransport::from_uri_with_params(&info.algorithm, info.oaep.clone())?;
    transport.decrypt(private_key, &info.cipher_value)
}

/// Decrypt the cipher value of an `EncryptedData` to UTF-8 text.
pub fn decrypt_data(info: &EncryptedDataInfo<'_, '_>, key: &[u8]) -> Result<String, Error> {
    let cipher = vaxholm_crypto::cipher::from_uri(&info.algorithm)?;
    // A session key longer than the cipher needs is truncated.
    let key = if key.len() > cipher.key_size() {
        &key[..cipher.key_size()]
    } else {
        key
    };
    let plaintext = cipher.decrypt(key, &info.cipher_value)?;
    String::from_utf8(plaintext)
        .map_err(|e| Error::Decryption(format!("plaintext is not valid UTF-8: {e}")))
}

/// Decrypt an `EncryptedData` whose `KeyInfo` embeds the `EncryptedKey`
/// (the layout SAML uses for `EncryptedID`).
pub fn decrypt_with_embedded_key(
    info: &EncryptedDataInfo<'_, '_>,
    private_key: &rsa::RsaPrivateKey,
) -> Result<String, Error> {
    let ek_node = info
        .key_info
        .and_then(|ki| child_element(ki, ns::ENC, ns::node::ENCRYPTED_KEY))
        .or_else(|| {
            info.node
                .parent()
                .and_then(|p| child_element(p, ns::ENC, ns::node::ENCRYPTED_KEY))
        })
        .ok_or_else(|| Error::Decryption("no EncryptedKey for EncryptedData".into()))?;
    let ek = parse_encrypted_key(ek_node)?;
    let session_key = decrypt_key(&ek, private_key)?;
    decrypt_data(info, &session_key)
}

/// Wrap `plaintext` in a synthetic element that declares the namespaces
/// in scope at `node`, so it parses as it would in place.
pub fn in_context(node: roxmltree::Node<'_, '_>, plaintext: &str) -> String {
    let mut wrapper = String::from("<vaxholm-plaintext");
    for namespace in node.namespaces() {
        match namespace.name() {
            Some("xml") => continue,
            Some(prefix) => wrapper.push_str(&format!(" xmlns:{prefix}=\"")),
            None => wrapper.push_str(" xmlns=\""),
        }
        wrapper.push_str(&vaxholm_xml::writer::escape_attr(namespace.uri()));
        wrapper.push('"');
    }
    wrapper.push('>');
    wrapper.push_str(plaintext);
    wrapper.push_str("</vaxholm-plaintext>");
    wrapper
}

/// Check that `plaintext` is well-formed XML when placed where `node`
/// stands.
pub fn check_plaintext(node: roxmltree::Node<'_, '_>, plaintext: &str) -> Result<(), Error> {
    vaxholm_xml::parse(&in_context(node, plaintext))
        .map(|_| ())
        .map_err(|e| Error::Decryption(format!("decrypted content is not well-formed: {e}")))
}

/// Stage replacing the `EncryptedData` element with its plaintext.
///
/// For both element and content encryption the `EncryptedData` occupies
/// exactly the position of the original markup.
pub fn stage_replacement(
    editor: &mut Editor,
    info: &EncryptedDataInfo<'_, '_>,
    plaintext: &str,
) -> Result<(), Error> {
    check_plaintext(info.node, plaintext)?;
    if info.enc_type == EncType::Element && !plaintext.trim_start().starts_with('<') {
        return Err(Error::Decryption(
            "element-encrypted data did not decrypt to an element".into(),
        ));
    }
    editor.replace(info.node.range(), plaintext.to_owned());
    Ok(())
}

// ── Helper functions ─────────────────────────────────────────────────

fn read_encryption_method(node: roxmltree::Node<'_, '_>) -> Result<(String, OaepParams), Error> {
    let method = child_element(node, ns::ENC, ns::node::ENCRYPTION_METHOD)
        .ok_or_else(|| Error::MissingElement("EncryptionMethod".into()))?;
    let uri = method
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute("Algorithm on EncryptionMethod".into()))?;

    let mut oaep = OaepParams::default();
    if uri == algorithm::RSA_OAEP {
        if let Some(digest) = child_element(method, ns::DSIG, ns::node::DIGEST_METHOD) {
            let digest_uri = digest.attribute(ns::attr::ALGORITHM).unwrap_or("");
            if digest_uri != algorithm::SHA1 {
                return Err(Error::UnsupportedAlgorithm(format!("OAEP digest: {digest_uri}")));
            }
        }
        if let Some(params) = child_element(method, ns::ENC, ns::node::OAEP_PARAMS) {
            oaep.label = Some(base64_content(params)?);
        }
    }
    Ok((uri.to_owned(), oaep))
}

fn read_cipher_value(node: roxmltree::Node<'_, '_>) -> Result<Vec<u8>, Error> {
    let cipher_data = child_element(node, ns::ENC, ns::node::CIPHER_DATA)
        .ok_or_else(|| Error::MissingElement("CipherData".into()))?;
    let cipher_value = child_element(cipher_data, ns::ENC, ns::node::CIPHER_VALUE)
        .ok_or_else(|| Error::MissingElement("CipherValue".into()))?;
    base64_content(cipher_value)
}
