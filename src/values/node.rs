//! # Value Nodes
//!
//! Recursive `Scalar | Sequence | Mapping` model of a values document.
//!
//! Every scalar remembers the byte span it was read from, so a modified
//! scalar can be written back without touching anything around it.

use std::ops::Range;

use super::render::render_scalar;

/// How a scalar was written in the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarStyle {
    Plain,
    SingleQuoted,
    DoubleQuoted,
    Literal,
    Folded,
    /// No value text at all (`key:`)
    Empty,
}

/// A scalar value and where it lives in the source text
#[derive(Debug, Clone)]
pub struct Scalar {
    pub(crate) value: String,
    pub(crate) style: ScalarStyle,
    pub(crate) span: Range<usize>,
    pub(crate) in_flow: bool,
    /// Text inserted before a replacement when the source span is empty
    pub(crate) lead: &'static str,
    pub(crate) modified: bool,
}

impl Scalar {
    pub(crate) fn new(value: String, style: ScalarStyle, span: Range<usize>, in_flow: bool) -> Self {
        Self {
            value,
            style,
            span,
            in_flow,
            lead: "",
            modified: false,
        }
    }

    pub(crate) fn empty(at: usize, lead: &'static str, in_flow: bool) -> Self {
        Self {
            value: String::new(),
            style: ScalarStyle::Empty,
            span: at..at,
            in_flow,
            lead,
            modified: false,
        }
    }

    /// Decoded value
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn style(&self) -> ScalarStyle {
        self.style
    }

    /// True for `key:`, `~` and `null`
    pub fn is_null(&self) -> bool {
        match self.style {
            ScalarStyle::Empty => self.value.is_empty(),
            ScalarStyle::Plain => matches!(self.value.as_str(), "~" | "null" | "Null" | "NULL"),
            _ => false,
        }
    }

    /// Replace the value; the scalar is re-rendered on export
    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.modified = true;
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Source text replacing `span` on export
    pub(crate) fn rendered(&self) -> String {
        let lead = if self.span.is_empty() { self.lead } else { "" };
        format!("{lead}{}", render_scalar(&self.value, self.in_flow))
    }
}

/// Any node of a values document
#[derive(Debug, Clone)]
pub enum Node {
    Scalar(Scalar),
    Sequence(Vec<Node>),
    Mapping(Mapping),
    /// `*alias`; never visited
    Alias,
}

impl Node {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Self::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match self {
            Self::Sequence(items) => Some(items),
            _ => None,
        }
    }
}

/// Ordered mapping, block or flow
#[derive(Debug, Clone)]
pub struct Mapping {
    pub(crate) entries: Vec<Entry>,
    /// Column of the keys (of the opening brace for flow mappings)
    pub(crate) column: usize,
    pub(crate) flow: bool,
}

impl Mapping {
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Value of the first entry with this key
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries
            .iter()
            .find(|entry| entry.key.value == key)
            .map(|entry| &entry.value)
    }

    pub fn is_flow(&self) -> bool {
        self.flow
    }
}

/// One `key: value` pair
#[derive(Debug, Clone)]
pub struct Entry {
    pub(crate) key: Scalar,
    pub(crate) value: Node,
    /// Whole lines covered by the entry, line break included
    pub(crate) span: Range<usize>,
}

impl Entry {
    pub fn key(&self) -> &str {
        &self.key.value
    }

    pub fn value(&self) -> &Node {
        &self.value
    }
}
