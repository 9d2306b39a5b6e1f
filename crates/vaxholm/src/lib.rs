#![forbid(unsafe_code)]

//! WS-Security and SAML protocol processing for SOAP services.
//!
//! Re-exports the vaxholm crates under one roof. The [`config`] module maps
//! JSON documents onto builder and evaluator configurations.

pub mod config;

pub use vaxholm_c14n as c14n;
pub use vaxholm_core as core;
pub use vaxholm_crypto as crypto;
pub use vaxholm_dsig as dsig;
pub use vaxholm_enc as enc;
pub use vaxholm_keys as keys;
pub use vaxholm_samlp as samlp;
pub use vaxholm_wss as wss;
pub use vaxholm_xml as xml;
