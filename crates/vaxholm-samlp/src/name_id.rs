#![forbid(unsafe_code)]

//! Subject and issuer names: `saml:NameID`, `saml:Issuer` and SAML 1.1
//! `saml:NameIdentifier`.

use crate::context::{ContextValue, PolicyContext};
use crate::vars;
use crate::version::SamlVersion;
use vaxholm_core::Error;
use vaxholm_xml::document::element_text;
use vaxholm_xml::XmlWriter;

/// A SAML name with its qualifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameId {
    pub value: String,
    pub format: Option<String>,
    pub name_qualifier: Option<String>,
    pub sp_name_qualifier: Option<String>,
    pub sp_provided_id: Option<String>,
}

impl NameId {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.name_qualifier = Some(qualifier.into());
        self
    }

    /// Read a name element; the value is trimmed.
    pub fn read(node: roxmltree::Node<'_, '_>) -> Self {
        let attr = |name: &str| node.attribute(name).map(str::to_owned);
        Self {
            value: element_text(node).trim().to_owned(),
            format: attr("Format"),
            name_qualifier: attr("NameQualifier"),
            sp_name_qualifier: attr("SPNameQualifier"),
            sp_provided_id: attr("SPProvidedID"),
        }
    }

    /// Write as `element` (a qualified name such as `saml:NameID`).
    /// SAML 1.1 names carry only `Format` and `NameQualifier`.
    pub fn write(&self, w: &mut XmlWriter, element: &str, version: SamlVersion, extra: &[(&str, &str)]) {
        let mut attrs: Vec<(&str, &str)> = extra.to_vec();
        if let Some(q) = &self.name_qualifier {
            attrs.push(("NameQualifier", q));
        }
        if version == SamlVersion::Saml2 {
            if let Some(q) = &self.sp_name_qualifier {
                attrs.push(("SPNameQualifier", q));
            }
        }
        if let Some(f) = &self.format {
            attrs.push(("Format", f));
        }
        if version == SamlVersion::Saml2 {
            if let Some(id) = &self.sp_provided_id {
                attrs.push(("SPProvidedID", id));
            }
        }
        w.text_element(element, &attrs, &self.value);
    }

    /// Serialize as a standalone element declaring its own namespace.
    pub fn to_standalone_xml(&self, version: SamlVersion) -> Result<String, Error> {
        let mut w = XmlWriter::new();
        let element = format!("saml:{}", version.name_id_element());
        self.write(&mut w, &element, version, &[("xmlns:saml", version.assertion_ns())]);
        w.into_string()
    }

    /// Publish under `prefix` using `suffixes` (value, nameQualifier,
    /// spNameQualifier, format, spProvidedId). A missing format is
    /// published as `default_format` when one is given.
    pub fn publish(
        &self,
        ctx: &mut dyn PolicyContext,
        prefix: &str,
        suffixes: &[&str; 5],
        default_format: Option<&str>,
    ) {
        let text = |v: Option<&str>| v.map(ContextValue::text);
        let format = self.format.as_deref().or(default_format);
        let values = [
            Some(ContextValue::text(&self.value)),
            text(self.name_qualifier.as_deref()),
            text(self.sp_name_qualifier.as_deref()),
            text(format),
            text(self.sp_provided_id.as_deref()),
        ];
        for (suffix, value) in suffixes.iter().zip(values) {
            ctx.set_variable(&vars::name(prefix, suffix), value);
        }
    }
}

/// Mark every variable in `suffixes` as explicitly unset.
pub fn publish_unset(ctx: &mut dyn PolicyContext, prefix: &str, suffixes: &[&str; 5]) {
    for suffix in suffixes {
        ctx.set_variable(&vars::name(prefix, suffix), None);
    }
}
