#![forbid(unsafe_code)]

//! XML document helpers for the Vaxholm message security library.
//!
//! Documents are parsed with `roxmltree` and never mutated in place: all
//! structural changes are staged as byte-range edits against the original
//! text and applied in one step by [`edit::Editor`].

pub mod document;
pub mod edit;
pub mod writer;

pub use document::XmlDocument;
pub use edit::Editor;
pub use writer::XmlWriter;

/// Return roxmltree parsing options for SOAP and SAML messages.
///
/// DTDs are rejected: SOAP forbids them and none of the token profiles
/// need entity definitions.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: false,
        ..roxmltree::ParsingOptions::default()
    }
}

/// Parse XML text with [`parsing_options`], mapping errors into the crate error.
pub fn parse(text: &str) -> Result<roxmltree::Document<'_>, vaxholm_core::Error> {
    roxmltree::Document::parse_with_options(text, parsing_options())
        .map_err(|e| vaxholm_core::Error::XmlParse(e.to_string()))
}
