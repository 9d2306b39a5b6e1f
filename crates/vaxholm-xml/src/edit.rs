#![forbid(unsafe_code)]

//! Staged byte-range edits over XML text.
//!
//! Edits are recorded against positions of a parsed `roxmltree` document
//! and applied together, producing a new string.  The input text is never
//! modified, so a failure anywhere before [`Editor::apply`] leaves the
//! caller's message untouched.

use std::ops::Range;
use vaxholm_core::Error;

use crate::document::qualified_name;

#[derive(Debug, Clone)]
struct Edit {
    range: Range<usize>,
    text: String,
    seq: usize,
}

/// A set of pending replacements and insertions.
#[derive(Debug, Default)]
pub struct Editor {
    edits: Vec<Edit>,
}

impl Editor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `text` at byte offset `pos`.  Several insertions at the same
    /// offset are emitted in the order they were recorded.
    pub fn insert(&mut self, pos: usize, text: impl Into<String>) {
        self.replace(pos..pos, text);
    }

    /// Replace the bytes in `range` with `text`.
    pub fn replace(&mut self, range: Range<usize>, text: impl Into<String>) {
        let seq = self.edits.len();
        self.edits.push(Edit {
            range,
            text: text.into(),
            seq,
        });
    }

    /// Remove the bytes in `range`.
    pub fn remove(&mut self, range: Range<usize>) {
        self.replace(range, String::new());
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Apply all edits to `input` and return the resulting text.
    pub fn apply(&self, input: &str) -> Result<String, Error> {
        let mut edits = self.edits.clone();
        edits.sort_by(|a, b| {
            a.range
                .start
                .cmp(&b.range.start)
                .then(a.range.end.cmp(&b.range.end))
                .then(a.seq.cmp(&b.seq))
        });

        let mut out = String::with_capacity(input.len() + self.added_len());
        let mut cursor = 0usize;
        for edit in &edits {
            if edit.range.start < cursor || edit.range.end > input.len() {
                return Err(Error::XmlStructure(format!(
                    "overlapping or out-of-bounds edit at {}..{}",
                    edit.range.start, edit.range.end
                )));
            }
            out.push_str(&input[cursor..edit.range.start]);
            out.push_str(&edit.text);
            cursor = edit.range.end;
        }
        out.push_str(&input[cursor..]);
        Ok(out)
    }

    fn added_len(&self) -> usize {
        self.edits.iter().map(|e| e.text.len()).sum()
    }
}

/// Locate the `>` that closes an element's start tag.
///
/// Returns `(offset_of_gt, self_closing)`.
fn start_tag_close(node: roxmltree::Node<'_, '_>) -> Result<(usize, bool), Error> {
    let input = node.document().input_text();
    let range = node.range();
    let bytes = input.as_bytes();
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate().take(range.end).skip(range.start) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => {
                let self_closing = i > range.start && bytes[i - 1] == b'/';
                return Ok((i, self_closing));
            }
            None => {}
        }
    }
    Err(Error::XmlStructure(format!(
        "unterminated start tag for <{}>",
        qualified_name(node)
    )))
}

/// Byte offset just past the element's start tag.
pub fn start_tag_end(node: roxmltree::Node<'_, '_>) -> Result<usize, Error> {
    Ok(start_tag_close(node)?.0 + 1)
}

/// Byte range of the element's content (between start and end tags).
///
/// For a self-closing element the range is empty and positioned at the
/// end of the tag; use [`insert_first_child`] or [`insert_last_child`] to
/// add children to such an element.
pub fn content_range(node: roxmltree::Node<'_, '_>) -> Result<Range<usize>, Error> {
    let (gt, self_closing) = start_tag_close(node)?;
    if self_closing {
        return Ok(gt + 1..gt + 1);
    }
    let input = node.document().input_text();
    let range = node.range();
    let end_tag = input[gt + 1..range.end]
        .rfind("</")
        .map(|i| gt + 1 + i)
        .ok_or_else(|| {
            Error::XmlStructure(format!("missing end tag for <{}>", qualified_name(node)))
        })?;
    Ok(gt + 1..end_tag)
}

/// Stage an insertion of `text` as the first child of `node`.
pub fn insert_first_child(
    editor: &mut Editor,
    node: roxmltree::Node<'_, '_>,
    text: &str,
) -> Result<(), Error> {
    let (gt, self_closing) = start_tag_close(node)?;
    if self_closing {
        expand_empty(editor, node, gt, text);
    } else {
        editor.insert(gt + 1, text);
    }
    Ok(())
}

/// Stage an insertion of `text` as the last child of `node`.
pub fn insert_last_child(
    editor: &mut Editor,
    node: roxmltree::Node<'_, '_>,
    text: &str,
) -> Result<(), Error> {
    let (gt, self_closing) = start_tag_close(node)?;
    if self_closing {
        expand_empty(editor, node, gt, text);
    } else {
        let content = content_range(node)?;
        editor.insert(content.end, text);
    }
    Ok(())
}

fn expand_empty(editor: &mut Editor, node: roxmltree::Node<'_, '_>, gt: usize, text: &str) {
    let qname = qualified_name(node);
    editor.replace(gt - 1..gt + 1, format!(">{text}</{qname}>"));
}

/// Stage an insertion of `text` immediately before `node`.
pub fn insert_before(editor: &mut Editor, node: roxmltree::Node<'_, '_>, text: &str) {
    editor.insert(node.range().start, text);
}

/// Stage the addition of an attribute (`name="value"`, value already escaped)
/// to the element's start tag.
pub fn add_attribute(
    editor: &mut Editor,
    node: roxmltree::Node<'_, '_>,
    attribute: &str,
) -> Result<(), Error> {
    let (gt, self_closing) = start_tag_close(node)?;
    let pos = if self_closing { gt - 1 } else { gt };
    editor.insert(pos, format!(" {attribute}"));
    Ok(())
}
