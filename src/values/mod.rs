//! # Values
//!
//! Ordered, layout-preserving model of a single-document YAML values file.
//!
//! ## Features
//!
//! - **Visiting**: every scalar value is handed to a callback together with
//!   the key it belongs to; scalar sequence items inherit their parent key
//! - **Round-trip**: exporting an unmodified file reproduces it byte for byte
//! - **Minimal diffs**: modified scalars are spliced into their original
//!   source span, comments and formatting around them are kept
//! - **Metadata**: the reserved `sealit` entry is read into [`Metadata`] and
//!   written back (replaced in place or appended) only when it changed

mod metadata;
mod node;
mod parser;
mod render;

use std::ops::Range;

use serde::Deserialize;
use tracing::debug;

pub use metadata::Metadata;
pub use node::{Entry, Mapping, Node, Scalar, ScalarStyle};
pub use render::{double_quoted, render_scalar};

use crate::constants::{DEFAULT_INDENT, METADATA_KEY};
use crate::error::{Result, SealError};

/// Parsed values document plus its source text
#[derive(Debug, Clone)]
pub struct ValueTree {
    source: String,
    root: Option<Mapping>,
    indent_unit: Option<usize>,
}

impl ValueTree {
    /// Parse a values document.
    ///
    /// The root must be a block mapping; an empty document has no root.
    pub fn parse(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let parsed = parser::parse(&source)?;
        Ok(Self {
            source,
            root: parsed.root,
            indent_unit: parsed.indent_unit,
        })
    }

    pub fn root(&self) -> Option<&Mapping> {
        self.root.as_ref()
    }

    /// Top-level value under `key`
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.root.as_ref().and_then(|root| root.get(key))
    }

    /// Indentation step of nested mappings, as written in the document
    pub fn indent(&self) -> usize {
        self.indent_unit.unwrap_or(DEFAULT_INDENT)
    }

    /// Call `visitor` with `(key, scalar)` for every value outside the
    /// reserved metadata entry, in document order.
    ///
    /// Aliases are not followed. The first error stops the walk.
    pub fn visit_values<F>(&mut self, mut visitor: F) -> Result<()>
    where
        F: FnMut(&str, &mut Scalar) -> Result<()>,
    {
        let Some(root) = self.root.as_mut() else {
            return Ok(());
        };
        for entry in root.entries.iter_mut() {
            if entry.key.value == METADATA_KEY {
                continue;
            }
            visit_node(&entry.key.value, &mut entry.value, &mut visitor)?;
        }
        Ok(())
    }

    /// Source text with every modified scalar re-rendered.
    ///
    /// `metadata_block` replaces the reserved entry, or is appended after
    /// the last root entry when the document has none.
    pub(crate) fn export_with(&self, metadata_block: Option<&str>) -> String {
        let mut edits: Vec<(Range<usize>, String)> = Vec::new();
        if let Some(root) = &self.root {
            collect_mapping_edits(root, &mut edits);
        }

        if let Some(block) = metadata_block {
            let existing = self
                .root
                .as_ref()
                .and_then(|root| root.entries.iter().find(|e| e.key.value == METADATA_KEY));
            match existing {
                Some(entry) => edits.push((entry.span.clone(), block.to_string())),
                None => {
                    let at = self
                        .root
                        .as_ref()
                        .map_or(self.source.len(), |root| self.append_point(root));
                    let mut text = String::new();
                    if at > 0 && !self.source[..at].ends_with('\n') {
                        text.push_str(self.line_break());
                    }
                    text.push_str(block);
                    edits.push((at..at, text));
                }
            }
        }

        edits.sort_by_key(|(span, _)| (span.start, span.end));
        let mut out = String::with_capacity(self.source.len() + 64);
        let mut cursor = 0;
        for (span, text) in edits {
            out.push_str(&self.source[cursor..span.start]);
            out.push_str(&text);
            cursor = span.end;
        }
        out.push_str(&self.source[cursor..]);
        out
    }

    /// Line terminator of the document, taken from its first line break
    pub(crate) fn line_break(&self) -> &'static str {
        match self.source.find('\n') {
            Some(i) if self.source[..i].ends_with('\r') => "\r\n",
            _ => "\n",
        }
    }

    /// Where a new root entry goes: after the last entry plus the blank
    /// lines and more deeply indented comments that still belong to it.
    ///
    /// Trailing blank lines may be content of a keep-chomping (`|+`)
    /// block scalar, so the new entry never splits them off.
    fn append_point(&self, root: &Mapping) -> usize {
        let Some(last) = root.entries.last() else {
            return self.source.len();
        };

        let mut at = last.span.end;
        while at < self.source.len() {
            let end = self.source[at..]
                .find('\n')
                .map_or(self.source.len(), |i| at + i);
            let line = self.source[at..end].trim_end_matches('\r');
            let content = line.trim_start_matches([' ', '\t']);
            let indent = line.len() - content.len();
            let belongs = content.is_empty() || (content.starts_with('#') && indent > root.column);
            if !belongs {
                break;
            }
            if end == self.source.len() {
                // an unterminated comment moves along, trailing whitespace stays last
                if !content.is_empty() {
                    at = end;
                }
                break;
            }
            at = end + 1;
        }
        at
    }
}

fn visit_node<F>(key: &str, node: &mut Node, visitor: &mut F) -> Result<()>
where
    F: FnMut(&str, &mut Scalar) -> Result<()>,
{
    match node {
        Node::Scalar(scalar) => visitor(key, scalar),
        // scalar items are reported under the sequence's key
        Node::Sequence(items) => items
            .iter_mut()
            .try_for_each(|item| visit_node(key, item, &mut *visitor)),
        Node::Mapping(mapping) => mapping
            .entries
            .iter_mut()
            .try_for_each(|entry| visit_node(&entry.key.value, &mut entry.value, &mut *visitor)),
        Node::Alias => Ok(()),
    }
}

fn collect_mapping_edits(mapping: &Mapping, edits: &mut Vec<(Range<usize>, String)>) {
    for entry in &mapping.entries {
        collect_node_edits(&entry.value, edits);
    }
}

fn collect_node_edits(node: &Node, edits: &mut Vec<(Range<usize>, String)>) {
    match node {
        Node::Scalar(scalar) if scalar.is_modified() => {
            edits.push((scalar.span.clone(), scalar.rendered()));
        }
        Node::Sequence(items) => items.iter().for_each(|item| collect_node_edits(item, edits)),
        Node::Mapping(mapping) => collect_mapping_edits(mapping, edits),
        Node::Scalar(_) | Node::Alias => {}
    }
}

/// A values file: value tree plus its sealing metadata
#[derive(Debug, Clone)]
pub struct ValuesFile {
    pub tree: ValueTree,
    /// Metadata as it will be written on export
    pub metadata: Metadata,
    loaded_metadata: Metadata,
}

impl ValuesFile {
    /// Parse a values file, rejecting multi-document streams
    pub fn parse(source: &str) -> Result<Self> {
        let mut documents = 0;
        for document in serde_yaml::Deserializer::from_str(source) {
            serde_yaml::Value::deserialize(document)?;
            documents += 1;
            if documents > 1 {
                return Err(SealError::MultiDocumentUnsupported);
            }
        }

        let tree = ValueTree::parse(source)?;
        let metadata = tree
            .get(METADATA_KEY)
            .map(Metadata::from_node)
            .transpose()?
            .unwrap_or_default();
        debug!(
            "Parsed values document (metadata present: {})",
            !metadata.is_empty()
        );

        Ok(Self {
            tree,
            loaded_metadata: metadata.clone(),
            metadata,
        })
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::parse(&String::from_utf8(bytes)?)
    }

    /// Serialized document; byte-identical to the input when nothing changed
    pub fn export(&self) -> String {
        let block = (self.metadata != self.loaded_metadata).then(|| {
            let column = self.tree.root().map_or(0, |root| root.column);
            let block = render::render_metadata(&self.metadata, column, self.tree.indent());
            render::with_line_break(block, self.tree.line_break())
        });
        self.tree.export_with(block.as_deref())
    }

    /// True when export would differ from the loaded text
    pub fn is_modified(&self) -> bool {
        self.metadata != self.loaded_metadata || self.export() != self.tree.source
    }
}
