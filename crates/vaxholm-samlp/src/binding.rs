#![forbid(unsafe_code)]

//! SAMLP HTTP bindings.
//!
//! HTTP-Redirect carries the message raw-DEFLATE compressed, base64
//! encoded and URL encoded in the `SAMLRequest` query parameter, with an
//! optional `RelayState`. HTTP-POST carries it base64 encoded in a form
//! field.

use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use vaxholm_core::Error;

pub const SAML_REQUEST: &str = "SAMLRequest";
pub const RELAY_STATE: &str = "RelayState";

/// Inflated messages larger than this are rejected.
pub const MAX_INFLATED_SIZE: u64 = 1024 * 1024;

/// A message recovered from the HTTP-Redirect binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectMessage {
    pub xml: String,
    pub relay_state: Option<String>,
}

/// Query string (without `?`) carrying `xml` and the relay state.
pub fn encode_redirect(xml: &str, relay_state: Option<&str>) -> Result<String, Error> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(xml.as_bytes())?;
    let compressed = encoder.finish()?;
    let mut query = format!(
        "{SAML_REQUEST}={}",
        urlencoding::encode(&STANDARD.encode(compressed))
    );
    if let Some(relay_state) = relay_state {
        query.push_str(&format!("&{RELAY_STATE}={}", urlencoding::encode(relay_state)));
    }
    Ok(query)
}

/// Decode an HTTP-Redirect query string.
pub fn decode_redirect(query: &str) -> Result<RedirectMessage, Error> {
    let mut request = None;
    let mut relay_state = None;
    for pair in query.trim_start_matches('?').split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match key {
            SAML_REQUEST => request = Some(value),
            RELAY_STATE => relay_state = Some(url_decode(value)?),
            _ => {}
        }
    }
    let request = request.ok_or_else(|| Error::MissingElement(format!("{SAML_REQUEST} parameter")))?;
    Ok(RedirectMessage {
        xml: inflate_parameter(&url_decode(request)?)?,
        relay_state,
    })
}

/// Base64 of `xml`, for an HTTP-POST form field.
pub fn encode_post(xml: &str) -> String {
    STANDARD.encode(xml.as_bytes())
}

/// Decode an HTTP-POST form field value.
pub fn decode_post(value: &str) -> Result<String, Error> {
    let bytes = decode_base64(value)?;
    String::from_utf8(bytes).map_err(|e| Error::XmlParse(format!("message is not UTF-8: {e}")))
}

/// Base64-decode and inflate a redirect parameter that is already URL
/// decoded.
pub fn inflate_parameter(value: &str) -> Result<String, Error> {
    let compressed = decode_base64(value)?;
    let mut inflated = Vec::new();
    DeflateDecoder::new(compressed.as_slice())
        .take(MAX_INFLATED_SIZE + 1)
        .read_to_end(&mut inflated)
        .map_err(|e| Error::Other(format!("cannot inflate {SAML_REQUEST}: {e}")))?;
    if inflated.len() as u64 > MAX_INFLATED_SIZE {
        return Err(Error::Other(format!(
            "inflated {SAML_REQUEST} exceeds {MAX_INFLATED_SIZE} bytes"
        )));
    }
    String::from_utf8(inflated).map_err(|e| Error::XmlParse(format!("message is not UTF-8: {e}")))
}

fn url_decode(value: &str) -> Result<String, Error> {
    // `+` is a space in form-encoded queries.
    let value = value.replace('+', "%20");
    urlencoding::decode(&value)
        .map(|v| v.into_owned())
        .map_err(|e| Error::InvalidUri(format!("bad percent-encoding: {e}")))
}

fn decode_base64(value: &str) -> Result<Vec<u8>, Error> {
    let cleaned: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(cleaned)
        .map_err(|e| Error::Base64(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="a1" Version="2.0"/>"#;

    #[test]
    fn test_redirect_roundtrip() {
        let query = encode_redirect(XML, Some("https://sp.example/after?x=1")).unwrap();
        assert!(query.starts_with("SAMLRequest="));
        assert!(query.contains("&RelayState=https%3A%2F%2Fsp.example"));
        let decoded = decode_redirect(&query).unwrap();
        assert_eq!(decoded.xml, XML);
        assert_eq!(decoded.relay_state.as_deref(), Some("https://sp.example/after?x=1"));
    }

    #[test]
    fn test_redirect_without_request() {
        assert!(matches!(
            decode_redirect("RelayState=abc"),
            Err(Error::MissingElement(_))
        ));
    }

    #[test]
    fn test_redirect_garbage() {
        assert!(decode_redirect("SAMLRequest=%%%").is_err());
        assert!(decode_redirect("SAMLRequest=bm90IGRlZmxhdGU%3D").is_err());
    }

    #[test]
    fn test_post_roundtrip() {
        let encoded = encode_post(XML);
        assert_eq!(decode_post(&encoded).unwrap(), XML);
        assert!(matches!(decode_post("***"), Err(Error::Base64(_))));
    }

    #[test]
    fn test_inflate_limit() {
        let big = "a".repeat(MAX_INFLATED_SIZE as usize + 10);
        let query = encode_redirect(&big, None).unwrap();
        assert!(matches!(decode_redirect(&query), Err(Error::Other(_))));
    }
}
