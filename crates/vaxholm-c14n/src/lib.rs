#![forbid(unsafe_code)]

//! XML Canonicalization for the Vaxholm message security library.
//!
//! WS-Security and SAML signatures in this library are produced and
//! verified with Exclusive Canonical XML 1.0, with or without comments.

pub mod exclusive;
pub mod output;

use vaxholm_core::{algorithm, Error};

/// The canonicalization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum C14nMode {
    /// Exclusive Canonical XML 1.0
    Exclusive,
    /// Exclusive Canonical XML 1.0 with comments
    ExclusiveWithComments,
}

impl C14nMode {
    /// Get the algorithm URI for this mode.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Exclusive => algorithm::EXC_C14N,
            Self::ExclusiveWithComments => algorithm::EXC_C14N_WITH_COMMENTS,
        }
    }

    /// Parse a C14N mode from an algorithm URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            algorithm::EXC_C14N => Some(Self::Exclusive),
            algorithm::EXC_C14N_WITH_COMMENTS => Some(Self::ExclusiveWithComments),
            _ => None,
        }
    }

    pub fn with_comments(&self) -> bool {
        matches!(self, Self::ExclusiveWithComments)
    }
}

/// Canonicalize the subtree rooted at `node`.
///
/// - `node`: an element, or the document root for whole-document output
/// - `inclusive_prefixes`: the InclusiveNamespaces PrefixList
/// - `excluded`: a subtree left out of the output (enveloped signature)
pub fn canonicalize(
    node: roxmltree::Node<'_, '_>,
    mode: C14nMode,
    inclusive_prefixes: &[String],
    excluded: Option<roxmltree::NodeId>,
) -> Result<Vec<u8>, Error> {
    exclusive::canonicalize(node, mode.with_comments(), inclusive_prefixes, excluded)
}

/// Convenience: parse `xml` and canonicalize the whole document.
pub fn canonicalize_str(
    xml: &str,
    mode: C14nMode,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let doc = vaxholm_xml::parse(xml)?;
    canonicalize(doc.root(), mode, inclusive_prefixes, None)
}
