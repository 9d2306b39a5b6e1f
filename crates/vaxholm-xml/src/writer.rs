#![forbid(unsafe_code)]

//! A small XML writer for building security-header fragments and SAML
//! protocol messages.

use vaxholm_core::Error;

/// Escape character data for element content.
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape an attribute value for a double-quoted attribute.
pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    out
}

/// A string-backed XML writer with an element stack.
#[derive(Debug, Default)]
pub struct XmlWriter {
    out: String,
    stack: Vec<String>,
}

impl XmlWriter {
    /// Create a new XML writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the XML declaration.
    pub fn write_declaration(&mut self) {
        self.out
            .push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    }

    /// Start an element with the given name and attributes.
    pub fn start_element(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.open_tag(name, attrs);
        self.out.push('>');
        self.stack.push(name.to_owned());
    }

    /// Write an empty element (self-closing).
    pub fn empty_element(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.open_tag(name, attrs);
        self.out.push_str("/>");
    }

    /// Write an element containing only escaped text.
    pub fn text_element(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) {
        self.open_tag(name, attrs);
        self.out.push('>');
        self.out.push_str(&escape_text(text));
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
    }

    /// End the most recently started element.
    pub fn end_element(&mut self) -> Result<(), Error> {
        let name = self
            .stack
            .pop()
            .ok_or_else(|| Error::XmlStructure("end_element without open element".into()))?;
        self.out.push_str("</");
        self.out.push_str(&name);
        self.out.push('>');
        Ok(())
    }

    /// Write escaped text content.
    pub fn write_text(&mut self, text: &str) {
        self.out.push_str(&escape_text(text));
    }

    /// Write a pre-serialized XML fragment verbatim.
    pub fn write_raw(&mut self, xml: &str) {
        self.out.push_str(xml);
    }

    /// Finish writing and return the XML as a string.
    pub fn into_string(self) -> Result<String, Error> {
        if let Some(open) = self.stack.last() {
            return Err(Error::XmlStructure(format!("unclosed element <{open}>")));
        }
        Ok(self.out)
    }

    fn open_tag(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.out.push('<');
        self.out.push_str(name);
        for (k, v) in attrs {
            self.out.push(' ');
            self.out.push_str(k);
            self.out.push_str("=\"");
            self.out.push_str(&escape_attr(v));
            self.out.push('"');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_elements() {
        let mut w = XmlWriter::new();
        w.start_element("wsu:Timestamp", &[("xmlns:wsu", "urn:u"), ("wsu:Id", "T-1")]);
        w.text_element("wsu:Created", &[], "2024-01-01T00:00:00.000Z");
        w.empty_element("x", &[("a", "1 & \"2\"")]);
        w.end_element().unwrap();
        assert_eq!(
            w.into_string().unwrap(),
            "<wsu:Timestamp xmlns:wsu=\"urn:u\" wsu:Id=\"T-1\"><wsu:Created>2024-01-01T00:00:00.000Z</wsu:Created><x a=\"1 &amp; &quot;2&quot;\"/></wsu:Timestamp>"
        );
    }

    #[test]
    fn test_unclosed_rejected() {
        let mut w = XmlWriter::new();
        w.start_element("a", &[]);
        assert!(w.into_string().is_err());
        let mut w = XmlWriter::new();
        assert!(w.end_element().is_err());
    }
}
