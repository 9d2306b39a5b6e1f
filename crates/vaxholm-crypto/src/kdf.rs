#![forbid(unsafe_code)]

//! P_SHA1 key derivation (RFC 2246 section 5) as used by WS-SecureConversation
//! derived key tokens.

use crate::sign::hmac_sha1;
use vaxholm_core::{algorithm, Error};

/// Longest key a derived-key token may ask for.
pub const MAX_DERIVED_KEY_LENGTH: usize = 64;

/// Furthest into the P_SHA1 stream a derived-key token may start.
pub const MAX_DERIVED_KEY_OFFSET: usize = 64 * 1024;

/// Whether `uri` names the P_SHA1 derivation (either namespace revision).
pub fn is_p_sha1(uri: &str) -> bool {
    uri == algorithm::P_SHA1 || uri == algorithm::P_SHA1_2005
}

/// Derive `length` bytes starting at `offset` of the P_SHA1 stream.
///
///   A(0) = seed, A(i) = HMAC(secret, A(i-1))
///   P_SHA1 = HMAC(secret, A(1) || seed) || HMAC(secret, A(2) || seed) || ...
pub fn p_sha1(secret: &[u8], seed: &[u8], offset: usize, length: usize) -> Result<Vec<u8>, Error> {
    if length == 0 {
        return Err(Error::Crypto("derived key length must be positive".into()));
    }
    if length > MAX_DERIVED_KEY_LENGTH {
        return Err(Error::InvalidToken(format!(
            "derived key length {length} exceeds {MAX_DERIVED_KEY_LENGTH}"
        )));
    }
    if offset > MAX_DERIVED_KEY_OFFSET {
        return Err(Error::InvalidToken(format!(
            "derived key offset {offset} exceeds {MAX_DERIVED_KEY_OFFSET}"
        )));
    }
    let total = offset
        .checked_add(length)
        .ok_or_else(|| Error::InvalidToken("derived key offset overflow".into()))?;

    let mut stream = Vec::with_capacity(total.saturating_add(20));
    let mut a = seed.to_vec();
    while stream.len() < total {
        a = hmac_sha1(secret, &a)?;
        let mut input = a.clone();
        input.extend_from_slice(seed);
        stream.extend_from_slice(&hmac_sha1(secret, &input)?);
    }
    Ok(stream[offset..total].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(data: &[u8]) -> String {
        data.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn test_p_sha1_known_value() {
        let key = p_sha1(b"secret", b"WS-SecureConversationnonce", 0, 32).unwrap();
        assert_eq!(
            hex(&key),
            "fd7a62034fef9d3ab0cfeeafd7763741e6802e8dd4e03932e6e349b4670ef3e3"
        );
    }

    #[test]
    fn test_p_sha1_offset() {
        let key = p_sha1(b"secret", b"WS-SecureConversationnonce", 16, 32).unwrap();
        assert_eq!(
            hex(&key),
            "e6802e8dd4e03932e6e349b4670ef3e38986b3fc600345565f6c8ff1c00c9ee8"
        );
    }

    #[test]
    fn test_zero_length_rejected() {
        assert!(p_sha1(b"secret", b"seed", 0, 0).is_err());
        assert!(is_p_sha1(algorithm::P_SHA1_2005));
        assert!(!is_p_sha1(algorithm::HMAC_SHA1));
    }

    #[test]
    fn test_oversized_requests_rejected() {
        assert!(matches!(
            p_sha1(b"secret", b"seed", 0, usize::MAX - 15),
            Err(Error::InvalidToken(_))
        ));
        assert!(matches!(
            p_sha1(b"secret", b"seed", usize::MAX, 32),
            Err(Error::InvalidToken(_))
        ));
        assert!(matches!(
            p_sha1(b"secret", b"seed", 0, MAX_DERIVED_KEY_LENGTH + 1),
            Err(Error::InvalidToken(_))
        ));
        assert_eq!(p_sha1(b"secret", b"seed", 0, MAX_DERIVED_KEY_LENGTH).unwrap().len(), 64);
    }
}
