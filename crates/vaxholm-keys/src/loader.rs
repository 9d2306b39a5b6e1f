#![forbid(unsafe_code)]

//! Key and certificate loading from PEM and DER (PKCS#8, PKCS#1, X.509).

use crate::cert::X509Cert;
use std::path::Path;
use vaxholm_core::Error;

/// Load an RSA private key from PEM data (PKCS#8 or PKCS#1).
pub fn load_rsa_private_pem(pem_data: &[u8]) -> Result<rsa::RsaPrivateKey, Error> {
    use pkcs8::DecodePrivateKey;
    let pem_str = std::str::from_utf8(pem_data)
        .map_err(|e| Error::Key(format!("invalid PEM encoding: {e}")))?;

    // Try PKCS#8 first
    if let Ok(pk) = rsa::RsaPrivateKey::from_pkcs8_pem(pem_str) {
        return Ok(pk);
    }

    use pkcs1::DecodeRsaPrivateKey;
    rsa::RsaPrivateKey::from_pkcs1_pem(pem_str)
        .map_err(|e| Error::Key(format!("failed to parse RSA private key PEM: {e}")))
}

/// Load an RSA private key from DER data (PKCS#8 or PKCS#1).
pub fn load_rsa_private_der(der: &[u8]) -> Result<rsa::RsaPrivateKey, Error> {
    use pkcs8::DecodePrivateKey;
    if let Ok(pk) = rsa::RsaPrivateKey::from_pkcs8_der(der) {
        return Ok(pk);
    }

    use pkcs1::DecodeRsaPrivateKey;
    rsa::RsaPrivateKey::from_pkcs1_der(der)
        .map_err(|e| Error::Key(format!("failed to parse RSA private key DER: {e}")))
}

/// Load a private key, detecting PEM by its armour.
pub fn load_private_key(data: &[u8]) -> Result<rsa::RsaPrivateKey, Error> {
    if looks_like_pem(data) {
        load_rsa_private_pem(data)
    } else {
        load_rsa_private_der(data)
    }
}

/// Load a certificate, detecting PEM by its armour.
pub fn load_certificate(data: &[u8]) -> Result<X509Cert, Error> {
    if looks_like_pem(data) {
        X509Cert::from_pem(data)
    } else {
        X509Cert::from_der(data)
    }
}

pub fn load_private_key_file(path: &Path) -> Result<rsa::RsaPrivateKey, Error> {
    let data = std::fs::read(path)?;
    load_private_key(&data).map_err(|e| Error::Key(format!("{}: {e}", path.display())))
}

pub fn load_certificate_file(path: &Path) -> Result<X509Cert, Error> {
    let data = std::fs::read(path)?;
    load_certificate(&data).map_err(|e| Error::Certificate(format!("{}: {e}", path.display())))
}

fn looks_like_pem(data: &[u8]) -> bool {
    data.iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take(10)
        .eq(b"-----BEGIN".iter())
}
