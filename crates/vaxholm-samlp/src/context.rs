#![forbid(unsafe_code)]

//! Policy context: named, typed variables shared between a builder or
//! evaluator and its caller, plus the HTTP facts of the messages in flight.

use std::collections::BTreeMap;
use tracing::warn;
use vaxholm_keys::X509Cert;

/// A typed context variable value.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    Text(String),
    Texts(Vec<String>),
    /// A serialized XML element.
    Element(String),
    Elements(Vec<String>),
    Certificate(X509Cert),
    Certificates(Vec<X509Cert>),
    Bool(bool),
    Int(i64),
}

impl ContextValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// The value when it is a single string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The value when it is a single XML element.
    pub fn as_element(&self) -> Option<&str> {
        match self {
            Self::Element(xml) => Some(xml),
            _ => None,
        }
    }

    /// The value when it is a single certificate.
    pub fn as_certificate(&self) -> Option<&X509Cert> {
        match self {
            Self::Certificate(cert) => Some(cert),
            Self::Certificates(certs) if certs.len() == 1 => certs.first(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Every value as a string; certificates contribute their subject.
    pub fn to_strings(&self) -> Vec<String> {
        match self {
            Self::Text(s) | Self::Element(s) => vec![s.clone()],
            Self::Texts(v) | Self::Elements(v) => v.clone(),
            Self::Certificate(c) => vec![c.subject().to_owned()],
            Self::Certificates(v) => v.iter().map(|c| c.subject().to_owned()).collect(),
            Self::Bool(b) => vec![b.to_string()],
            Self::Int(i) => vec![i.to_string()],
        }
    }

    /// Every XML element this value holds; a text value counts as one
    /// serialized element.
    pub fn to_elements(&self) -> Vec<String> {
        match self {
            Self::Element(xml) | Self::Text(xml) => vec![xml.clone()],
            Self::Elements(v) | Self::Texts(v) => v.clone(),
            _ => Vec::new(),
        }
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<X509Cert> for ContextValue {
    fn from(value: X509Cert) -> Self {
        Self::Certificate(value)
    }
}

/// Transport facts of an HTTP request or response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpFacts {
    pub method: String,
    pub headers: Vec<(String, String)>,
    /// Raw query string, without the leading `?`.
    pub query: Option<String>,
    /// Decoded form fields of a POST body.
    pub form: Vec<(String, String)>,
}

impl HttpFacts {
    pub fn new(method: &str) -> Self {
        Self {
            method: method.to_owned(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn with_query(mut self, query: &str) -> Self {
        self.query = Some(query.trim_start_matches('?').to_owned());
        self
    }

    pub fn with_form_field(mut self, name: &str, value: &str) -> Self {
        self.form.push((name.to_owned(), value.to_owned()));
        self
    }

    /// First header with this name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Raw (still percent-encoded) value of a query parameter.
    pub fn raw_query_param(&self, name: &str) -> Option<&str> {
        self.query
            .as_deref()?
            .split('&')
            .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }

    pub fn form_param(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Variable storage and transport facts visible to builders and evaluators.
pub trait PolicyContext {
    /// The value of `name`; `None` when unset or explicitly cleared.
    fn variable(&self, name: &str) -> Option<&ContextValue>;

    /// Whether `name` was ever set, even to the unset marker.
    fn is_set(&self, name: &str) -> bool;

    /// Set `name`; `None` records it as explicitly unset.
    fn set_variable(&mut self, name: &str, value: Option<ContextValue>);

    fn request_http(&self) -> Option<&HttpFacts> {
        None
    }

    fn response_http(&self) -> Option<&HttpFacts> {
        None
    }
}

/// A map-backed [`PolicyContext`].
#[derive(Debug, Clone, Default)]
pub struct SimplePolicyContext {
    variables: BTreeMap<String, Option<ContextValue>>,
    request_http: Option<HttpFacts>,
    response_http: Option<HttpFacts>,
}

impl SimplePolicyContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, name: &str, value: impl Into<ContextValue>) -> Self {
        self.set_variable(name, Some(value.into()));
        self
    }

    pub fn with_request_http(mut self, facts: HttpFacts) -> Self {
        self.request_http = Some(facts);
        self
    }

    pub fn with_response_http(mut self, facts: HttpFacts) -> Self {
        self.response_http = Some(facts);
        self
    }

    /// Variable names in sorted order, including unset ones.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    /// Convenience accessor for a single-string variable.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.variable(name).and_then(ContextValue::as_text)
    }
}

impl PolicyContext for SimplePolicyContext {
    fn variable(&self, name: &str) -> Option<&ContextValue> {
        self.variables.get(name).and_then(Option::as_ref)
    }

    fn is_set(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    fn set_variable(&mut self, name: &str, value: Option<ContextValue>) {
        self.variables.insert(name.to_owned(), value);
    }

    fn request_http(&self) -> Option<&HttpFacts> {
        self.request_http.as_ref()
    }

    fn response_http(&self) -> Option<&HttpFacts> {
        self.response_http.as_ref()
    }
}

// ── Expansion ────────────────────────────────────────────────────────

/// One piece of a template: literal text or a `${name}` reference.
enum Part<'a> {
    Literal(&'a str),
    Variable(&'a str),
}

fn parts(template: &str) -> Vec<Part<'_>> {
    let mut out = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        if start > 0 {
            out.push(Part::Literal(&rest[..start]));
        }
        out.push(Part::Variable(rest[start + 2..start + 2 + len].trim()));
        rest = &rest[start + 3 + len..];
    }
    if !rest.is_empty() {
        out.push(Part::Literal(rest));
    }
    out
}

/// Expand `${name}` references. Multi-valued variables are joined with
/// `", "`; unset variables expand to nothing.
pub fn expand(template: &str, ctx: &dyn PolicyContext) -> String {
    let mut out = String::new();
    for part in parts(template) {
        match part {
            Part::Literal(text) => out.push_str(text),
            Part::Variable(name) => match ctx.variable(name) {
                Some(value) => out.push_str(&value.to_strings().join(", ")),
                None => warn!(variable = name, "referenced context variable is not set"),
            },
        }
    }
    out
}

/// Expand a whitespace-separated list. A token that is a single
/// `${name}` reference contributes every value of that variable.
pub fn expand_list(template: &str, ctx: &dyn PolicyContext) -> Vec<String> {
    let mut out = Vec::new();
    for token in template.split_whitespace() {
        match parts(token).as_slice() {
            [Part::Variable(name)] => match ctx.variable(name) {
                Some(value) => out.extend(
                    value
                        .to_strings()
                        .into_iter()
                        .flat_map(|v| v.split_whitespace().map(str::to_owned).collect::<Vec<_>>()),
                ),
                None => warn!(variable = *name, "referenced context variable is not set"),
            },
            _ => {
                let expanded = expand(token, ctx);
                if !expanded.is_empty() {
                    out.push(expanded);
                }
            }
        }
    }
    out
}

/// Whether `template` consists only of `${...}` references and whitespace.
pub fn only_references(template: &str) -> bool {
    parts(template).iter().all(|p| match p {
        Part::Variable(_) => true,
        Part::Literal(text) => text.trim().is_empty(),
    })
}

/// Every value of the variables `template` references, in order.
pub fn referenced_values<'c>(template: &str, ctx: &'c dyn PolicyContext) -> Vec<&'c ContextValue> {
    parts(template)
        .into_iter()
        .filter_map(|p| match p {
            Part::Variable(name) => ctx.variable(name),
            Part::Literal(_) => None,
        })
        .collect()
}
