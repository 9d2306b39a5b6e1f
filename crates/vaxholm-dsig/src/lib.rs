#![forbid(unsafe_code)]

//! XML Digital Signature (XML-DSig) for SOAP security headers and SAML messages.
//!
//! Supports same-document references with the exclusive canonicalization and
//! enveloped-signature transforms.

pub mod context;
pub mod sign;
pub mod verify;

pub use context::DsigContext;
pub use verify::{SignatureInfo, VerifiedSignature};
