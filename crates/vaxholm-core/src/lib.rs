#![forbid(unsafe_code)]

//! Shared types for the Vaxholm WS-Security and SAMLP libraries:
//! the error taxonomy, namespace constants and algorithm URIs.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{Error, Result};
