#![forbid(unsafe_code)]

//! XML Encryption (XML-Enc) for SOAP message parts and SAML identifiers.
//!
//! Element and content encryption with AES, session keys transported
//! under RSA in `EncryptedKey`.

pub mod context;
pub mod decrypt;
pub mod encrypt;

pub use context::{EncContext, EncType};
pub use encrypt::EncryptedKeyOutput;
