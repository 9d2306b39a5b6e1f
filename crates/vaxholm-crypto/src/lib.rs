#![forbid(unsafe_code)]

//! Cryptographic algorithm implementations for the vaxholm WS-Security stack.
//!
//! Provides the primitives used by XML-DSig, XML-Enc and WS-SecureConversation:
//! digests, signatures, block ciphers, key transport and P_SHA1 derivation.

pub mod cipher;
pub mod digest;
pub mod kdf;
pub mod keytransport;
pub mod sign;

pub use digest::DigestAlgorithm;
pub use sign::{SignatureAlgorithm, SigningKey};

use rand::RngCore;

/// Fill a fresh buffer of `len` bytes from the thread RNG.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}
