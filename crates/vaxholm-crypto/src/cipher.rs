#![forbid(unsafe_code)]

//! Block cipher algorithm implementations for `EncryptedData` (AES-CBC, AES-GCM).
//!
//! Ciphertext layout follows XML Encryption: the IV (or GCM nonce) is
//! prepended to the encrypted octets.

use rand::RngCore;
use vaxholm_core::{algorithm, Error};

/// Trait for cipher algorithms.
pub trait CipherAlgorithm: Send {
    fn uri(&self) -> &'static str;
    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error>;
    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error>;
    fn key_size(&self) -> usize;
}

/// Create a cipher algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn CipherAlgorithm>, Error> {
    match uri {
        algorithm::AES128_CBC => Ok(Box::new(AesCbc { key_size: 16, uri: algorithm::AES128_CBC })),
        algorithm::AES192_CBC => Ok(Box::new(AesCbc { key_size: 24, uri: algorithm::AES192_CBC })),
        algorithm::AES256_CBC => Ok(Box::new(AesCbc { key_size: 32, uri: algorithm::AES256_CBC })),
        algorithm::AES128_GCM => Ok(Box::new(AesGcm { key_size: 16, uri: algorithm::AES128_GCM })),
        algorithm::AES256_GCM => Ok(Box::new(AesGcm { key_size: 32, uri: algorithm::AES256_GCM })),
        _ => Err(Error::UnsupportedAlgorithm(format!("cipher: {uri}"))),
    }
}

/// Generate a random key sized for the given cipher URI.
pub fn generate_key(uri: &str) -> Result<Vec<u8>, Error> {
    let cipher = from_uri(uri)?;
    let mut key = vec![0u8; cipher.key_size()];
    rand::thread_rng().fill_bytes(&mut key);
    Ok(key)
}

fn check_key(expected: usize, key: &[u8]) -> Result<(), Error> {
    if key.len() != expected {
        return Err(Error::Crypto(format!(
            "expected {} byte key, got {}",
            expected,
            key.len()
        )));
    }
    Ok(())
}

/// Key size check for the decrypt path: a wrong-sized key is a
/// decryption fault.
fn check_decryption_key(expected: usize, key: &[u8]) -> Result<(), Error> {
    check_key(expected, key).map_err(|e| match e {
        Error::Crypto(msg) => Error::Decryption(msg),
        other => other,
    })
}

// ── AES-CBC with XML Encryption padding ─────────────────────────────

struct AesCbc {
    key_size: usize,
    uri: &'static str,
}

impl CipherAlgorithm for AesCbc {
    fn uri(&self) -> &'static str {
        self.uri
    }
    fn key_size(&self) -> usize {
        self.key_size
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        use cbc::cipher::{BlockEncryptMut, KeyIvInit};
        check_key(self.key_size, key)?;

        let mut iv = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut iv);

        // Padding is applied here; the cipher runs unpadded.
        let mut buf = pad(plaintext, 16);
        let buf_len = buf.len();

        macro_rules! do_encrypt {
            ($aes:ty) => {{
                let enc = cbc::Encryptor::<$aes>::new_from_slices(key, &iv)
                    .map_err(|e| Error::Crypto(format!("AES-CBC init: {e}")))?;
                enc.encrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf, buf_len)
                    .map_err(|e| Error::Crypto(format!("AES-CBC encrypt: {e}")))?;
            }};
        }
        match self.key_size {
            16 => do_encrypt!(aes::Aes128),
            24 => do_encrypt!(aes::Aes192),
            32 => do_encrypt!(aes::Aes256),
            _ => return Err(Error::Crypto("unsupported AES key size".into())),
        }

        let mut result = Vec::with_capacity(16 + buf.len());
        result.extend_from_slice(&iv);
        result.extend_from_slice(&buf);
        Ok(result)
    }

    fn decrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
        use cbc::cipher::{BlockDecryptMut, KeyIvInit};
        check_decryption_key(self.key_size, key)?;
        if data.len() < 32 || data.len() % 16 != 0 {
            return Err(Error::Decryption("AES-CBC data has invalid length".into()));
        }

        let (iv, ciphertext) = data.split_at(16);
        let mut buf = ciphertext.to_vec();

        macro_rules! do_decrypt {
            ($aes:ty) => {{
                let dec = cbc::Decryptor::<$aes>::new_from_slices(key, iv)
                    .map_err(|e| Error::Crypto(format!("AES-CBC init: {e}")))?;
                dec.decrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf)
                    .map_err(|e| Error::Decryption(format!("AES-CBC decrypt: {e}")))?;
            }};
        }
        match self.key_size {
            16 => do_decrypt!(aes::Aes128),
            24 => do_decrypt!(aes::Aes192),
            32 => do_decrypt!(aes::Aes256),
            _ => return Err(Error::Crypto("unsupported AES key size".into())),
        }

        unpad(buf, 16)
    }
}

// ── AES-GCM ──────────────────────────────────────────────────────────

struct AesGcm {
    key_size: usize,
    uri: &'static str,
}

impl CipherAlgorithm for AesGcm {
    fn uri(&self) -> &'static str {
        self.uri
    }
    fn key_size(&self) -> usize {
        self.key_size
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        use aes_gcm::{aead::Aead, KeyInit, Nonce};
        check_key(self.key_size, key)?;

        let mut nonce_bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ct = match self.key_size {
            16 => aes_gcm::Aes128Gcm::new_from_slice(key)
                .map_err(|e| Error::Crypto(format!("AES-GCM init: {e}")))?
                .encrypt(nonce, plaintext),
            _ => aes_gcm::Aes256Gcm::new_from_slice(key)
                .map_err(|e| Error::Crypto(format!("AES-GCM init: {e}")))?
                .encrypt(nonce, plaintext),
        }
        .map_err(|e| Error::Encryption(format!("AES-GCM encrypt: {e}")))?;

        let mut result = Vec::with_capacity(12 + ct.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ct);
        Ok(result)
    }

    fn decrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
        use aes_gcm::{aead::Aead, KeyInit, Nonce};
        check_decryption_key(self.key_size, key)?;
        if data.len() < 12 + 16 {
            return Err(Error::Decryption("AES-GCM data too short".into()));
        }

        let (nonce, ct_and_tag) = data.split_at(12);
        let nonce = Nonce::from_slice(nonce);
        match self.key_size {
            16 => aes_gcm::Aes128Gcm::new_from_slice(key)
                .map_err(|e| Error::Crypto(format!("AES-GCM init: {e}")))?
                .decrypt(nonce, ct_and_tag),
            _ => aes_gcm::Aes256Gcm::new_from_slice(key)
                .map_err(|e| Error::Crypto(format!("AES-GCM init: {e}")))?
                .decrypt(nonce, ct_and_tag),
        }
        .map_err(|_| Error::Decryption("AES-GCM authentication failed".into()))
    }
}

// ── Padding ──────────────────────────────────────────────────────────

fn pad(data: &[u8], block_size: usize) -> Vec<u8> {
    let pad_len = block_size - (data.len() % block_size);
    let mut padded = Vec::with_capacity(data.len() + pad_len);
    padded.extend_from_slice(data);
    padded.extend(std::iter::repeat(pad_len as u8).take(pad_len));
    padded
}

/// Remove XML Encryption block padding.
///
/// Only the final byte (the padding length) is significant; the filler
/// bytes may be random (ISO 10126) or repeat the length (PKCS#7).
fn unpad(mut data: Vec<u8>, block_size: usize) -> Result<Vec<u8>, Error> {
    let Some(&pad_byte) = data.last() else {
        return Err(Error::Decryption("empty plaintext block".into()));
    };
    let pad_len = pad_byte as usize;
    if pad_len == 0 || pad_len > block_size || pad_len > data.len() {
        return Err(Error::Decryption("invalid padding".into()));
    }
    data.truncate(data.len() - pad_len);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding() {
        let padded = pad(b"hello", 16);
        assert_eq!(padded.len(), 16);
        assert_eq!(unpad(padded, 16).unwrap(), b"hello");
        let full = pad(&[7u8; 16], 16);
        assert_eq!(full.len(), 32);

        let mut iso = b"hello".to_vec();
        iso.extend_from_slice(&[0xA5; 10]);
        iso.push(11);
        assert_eq!(unpad(iso, 16).unwrap(), b"hello");
        assert!(unpad(vec![0u8; 16], 16).is_err());
        assert!(unpad(vec![17u8; 16], 16).is_err());
    }

    #[test]
    fn test_aes_cbc_roundtrip_and_key_sizes() {
        for uri in [algorithm::AES128_CBC, algorithm::AES256_CBC] {
            let cipher = from_uri(uri).unwrap();
            let key = generate_key(uri).unwrap();
            assert_eq!(key.len(), cipher.key_size());
            let ct = cipher.encrypt(&key, b"<Body>payload</Body>").unwrap();
            assert_eq!(ct.len() % 16, 0);
            assert_eq!(cipher.decrypt(&key, &ct).unwrap(), b"<Body>payload</Body>");
        }
        let cipher = from_uri(algorithm::AES128_CBC).unwrap();
        assert!(cipher.encrypt(&[0u8; 32], b"x").is_err());
    }

    #[test]
    fn test_aes_gcm_detects_tampering() {
        let cipher = from_uri(algorithm::AES128_GCM).unwrap();
        let key = generate_key(algorithm::AES128_GCM).unwrap();
        let mut ct = cipher.encrypt(&key, b"secret").unwrap();
        assert_eq!(cipher.decrypt(&key, &ct).unwrap(), b"secret");
        let last = ct.len() - 1;
        ct[last] ^= 1;
        assert!(matches!(cipher.decrypt(&key, &ct), Err(Error::Decryption(_))));
    }

    #[test]
    fn test_wrong_sized_key_on_decrypt_is_decryption_fault() {
        for uri in [algorithm::AES128_CBC, algorithm::AES256_GCM] {
            let cipher = from_uri(uri).unwrap();
            let key = generate_key(uri).unwrap();
            let ct = cipher.encrypt(&key, b"<Body>payload</Body>").unwrap();
            let unwrapped_garbage = vec![0x42u8; 7];
            assert!(matches!(
                cipher.decrypt(&unwrapped_garbage, &ct),
                Err(Error::Decryption(_))
            ));
        }
        let cipher = from_uri(algorithm::AES128_CBC).unwrap();
        assert!(matches!(cipher.encrypt(&[0u8; 7], b"x"), Err(Error::Crypto(_))));
    }
}
