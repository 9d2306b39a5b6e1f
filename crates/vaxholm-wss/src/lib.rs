#![forbid(unsafe_code)]

//! WS-Security for SOAP messages.
//!
//! [`WssDecorator`] adds a `wsse:Security` header to an outbound message
//! as described by [`DecorationRequirements`]: timestamp, sender tokens,
//! signature and encryption. [`WssProcessor`] reverses this for an inbound
//! message and reports what was signed, what was encrypted and which
//! tokens were present.

pub mod decorator;
pub mod processor;
pub mod requirements;
pub mod result;
pub mod soap;
pub mod token;

pub use decorator::WssDecorator;
pub use processor::{ProcessorOptions, SecurityContextFinder, WssProcessor};
pub use requirements::{
    DecorationRequirements, ElementSelector, KeyReference, SecureConversationSession, SenderToken,
    SigningSource, UsernameTokenCredentials,
};
pub use result::{
    CertificateReference, DecorationResult, DerivedKeyBase, EncryptedElement, HeaderDecoration,
    ProcessedToken, ProcessorResult, SignedElement, SigningToken, TimestampInfo,
};
pub use soap::{Envelope, SoapVersion};
