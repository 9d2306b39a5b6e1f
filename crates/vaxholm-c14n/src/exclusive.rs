#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 (exc-C14N).
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//! With comments: `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
//!
//! Only "visibly utilized" namespace declarations are output.  A namespace
//! is visibly utilized if:
//! 1. Its prefix is used by the element's tag name, OR
//! 2. Its prefix is used by one of the element's attributes, OR
//! 3. The prefix appears in the InclusiveNamespaces PrefixList.

use crate::output::{self, Attr, NsDecl};
use roxmltree::{Node, NodeId};
use std::collections::{BTreeMap, HashSet};
use vaxholm_core::{ns, Error};
use vaxholm_xml::document::{attribute_prefix, element_prefix, qualified_name};

/// Canonicalize the subtree rooted at `apex` (an element or the document root).
///
/// `excluded` names a subtree to omit from the output, which is how the
/// enveloped-signature transform removes the `Signature` element.
pub fn canonicalize(
    apex: Node<'_, '_>,
    with_comments: bool,
    inclusive_prefixes: &[String],
    excluded: Option<NodeId>,
) -> Result<Vec<u8>, Error> {
    let mut ctx = ExcC14nContext {
        with_comments,
        inclusive_prefixes: inclusive_prefixes.iter().cloned().collect(),
        excluded,
    };
    let mut output = Vec::new();
    ctx.process_node(apex, &mut output, &BTreeMap::new())?;
    Ok(output)
}

struct ExcC14nContext {
    with_comments: bool,
    inclusive_prefixes: HashSet<String>,
    excluded: Option<NodeId>,
}

impl ExcC14nContext {
    fn process_node(
        &mut self,
        node: Node<'_, '_>,
        output: &mut Vec<u8>,
        rendered_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        if Some(node.id()) == self.excluded {
            return Ok(());
        }
        if node.is_root() {
            for child in node.children() {
                self.process_node(child, output, rendered_ns)?;
            }
        } else if node.is_element() {
            self.process_element(node, output, rendered_ns)?;
        } else if node.is_text() {
            if let Some(text) = node.text() {
                output::push_text(output, text);
            }
        } else if node.is_comment() {
            if self.with_comments {
                let text = node.text().unwrap_or("");
                self.top_level_wrap(node, output, |out| {
                    out.extend_from_slice(b"<!--");
                    out.extend_from_slice(text.as_bytes());
                    out.extend_from_slice(b"-->");
                });
            }
        } else if let Some(pi) = node.pi() {
            self.top_level_wrap(node, output, |out| {
                out.extend_from_slice(b"<?");
                out.extend_from_slice(pi.target.as_bytes());
                if let Some(value) = pi.value {
                    if !value.is_empty() {
                        out.push(b' ');
                        output::push_pi_data(out, value);
                    }
                }
                out.extend_from_slice(b"?>");
            });
        }
        Ok(())
    }

    /// Comments and PIs outside the document element are separated from it
    /// by a line feed.
    fn top_level_wrap(
        &self,
        node: Node<'_, '_>,
        output: &mut Vec<u8>,
        body: impl FnOnce(&mut Vec<u8>),
    ) {
        let parent_is_root = node.parent().is_some_and(|p| p.is_root());
        if parent_is_root && node.prev_siblings().skip(1).any(|s| s.is_element()) {
            output.push(b'\n');
        }
        body(output);
        if parent_is_root && node.next_siblings().skip(1).any(|s| s.is_element()) {
            output.push(b'\n');
        }
    }

    fn process_element(
        &mut self,
        node: Node<'_, '_>,
        output: &mut Vec<u8>,
        rendered_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        let doc = node.document();

        // Determine which namespace prefixes are "visibly utilized"
        let mut utilized_prefixes: HashSet<String> = HashSet::new();
        utilized_prefixes.insert(element_prefix(node).to_owned());
        for attr in node.attributes() {
            let prefix = attribute_prefix(doc, &attr);
            if !prefix.is_empty() {
                utilized_prefixes.insert(prefix.to_owned());
            }
        }
        for p in &self.inclusive_prefixes {
            if p == "#default" {
                utilized_prefixes.insert(String::new());
            } else {
                utilized_prefixes.insert(p.clone());
            }
        }

        let mut ns_decls: Vec<NsDecl> = Vec::new();
        for prefix in &utilized_prefixes {
            if prefix == "xml" {
                continue;
            }
            let lookup = if prefix.is_empty() { None } else { Some(prefix.as_str()) };
            match node.lookup_namespace_uri(lookup) {
                Some(uri) if !uri.is_empty() => {
                    if rendered_ns.get(prefix).map(String::as_str) != Some(uri) {
                        ns_decls.push(NsDecl {
                            prefix: prefix.clone(),
                            uri: uri.to_owned(),
                        });
                    }
                }
                _ => {
                    // An unprefixed element outside any default namespace
                    // must undo a default namespace rendered above it.
                    if prefix.is_empty()
                        && rendered_ns.get("").is_some_and(|uri| !uri.is_empty())
                    {
                        ns_decls.push(NsDecl {
                            prefix: String::new(),
                            uri: String::new(),
                        });
                    }
                }
            }
        }
        ns_decls.sort();

        let mut attrs: Vec<Attr> = node
            .attributes()
            .map(|attr| {
                let ns_uri = attr.namespace().unwrap_or("");
                let prefix = if ns_uri == ns::XML {
                    "xml"
                } else {
                    attribute_prefix(doc, &attr)
                };
                let qualified_name = if prefix.is_empty() {
                    attr.name().to_owned()
                } else {
                    format!("{}:{}", prefix, attr.name())
                };
                Attr {
                    ns_uri: ns_uri.to_owned(),
                    local_name: attr.name().to_owned(),
                    qualified_name,
                    value: attr.value().to_owned(),
                }
            })
            .collect();
        attrs.sort();

        let elem_name = qualified_name(node);
        output.push(b'<');
        output.extend_from_slice(elem_name.as_bytes());
        for ns_decl in &ns_decls {
            ns_decl.write_to(output);
        }
        for attr in &attrs {
            attr.write_to(output);
        }
        output.push(b'>');

        let mut child_rendered_ns = rendered_ns.clone();
        for ns_decl in ns_decls {
            child_rendered_ns.insert(ns_decl.prefix, ns_decl.uri);
        }
        for child in node.children() {
            self.process_node(child, output, &child_rendered_ns)?;
        }

        output.extend_from_slice(b"</");
        output.extend_from_slice(elem_name.as_bytes());
        output.push(b'>');
        Ok(())
    }
}
