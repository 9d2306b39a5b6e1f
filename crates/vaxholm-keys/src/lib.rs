#![forbid(unsafe_code)]

//! Certificates, keys and token resolution for the vaxholm WS-Security stack.
//!
//! Loads RSA keys and X.509 certificates from PEM or DER and provides the
//! `SecurityTokenResolver` abstraction the decorator and processor use to
//! find key material.

pub mod cert;
pub mod loader;
pub mod manager;
pub mod resolver;

pub use cert::X509Cert;
pub use manager::SimpleSecurityTokenResolver;
pub use resolver::{ChainedSecurityTokenResolver, ResolvedToken, SecurityTokenResolver, TokenReference};
