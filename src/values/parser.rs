//! # Layout-Preserving Parser
//!
//! Scans a single YAML document into [`Node`]s while recording the byte
//! span of every scalar. Comments, blank lines and formatting are not
//! modelled; they survive because export only rewrites spans.
//!
//! The input has already been accepted by `serde_yaml`, so the scanner
//! focuses on structure and decoding rather than on diagnostics.
//!
//! ## Supported
//!
//! - Block mappings and sequences, including `- key: value` and
//!   sequences at the indentation of their parent key
//! - Flow sequences and mappings, possibly spanning lines
//! - Plain (multi-line), single- and double-quoted scalars
//! - Literal and folded block scalars with chomping and indentation indicators
//! - Anchors and tags (skipped), aliases (opaque)
//! - Directives and `---` / `...` markers
//!
//! Complex keys (`? key`) and a root that is not a block mapping are
//! rejected as [`SealError::UnsupportedDocument`].

use std::fmt::Display;
use std::iter::repeat;

use super::node::{Entry, Mapping, Node, Scalar, ScalarStyle};
use crate::error::{Result, SealError};

/// Result of scanning a document
#[derive(Debug)]
pub(crate) struct ParsedDocument {
    /// `None` for a document without content
    pub root: Option<Mapping>,
    /// Column step of the first mapping nested in a mapping
    pub indent_unit: Option<usize>,
}

/// Scan `src` into a node tree
pub(crate) fn parse(src: &str) -> Result<ParsedDocument> {
    Parser::new(src).document()
}

#[derive(Debug, Clone, Copy)]
enum Chomp {
    Strip,
    Clip,
    Keep,
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// End of the last consumed token
    last_end: usize,
    indent_unit: Option<usize>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            last_end: 0,
            indent_unit: None,
        }
    }

    // ---- document -------------------------------------------------------

    fn document(mut self) -> Result<ParsedDocument> {
        let mut seen_start = false;
        loop {
            let Some(col) = self.skip_blank_lines() else {
                return self.trailing(None);
            };
            if col == 0 && self.peek() == Some(b'%') {
                self.pos = self.line_end(self.pos);
                continue;
            }
            if !seen_start && col == 0 && self.src[self.pos..].starts_with("---") {
                if !self.is_blank_or_end(self.pos + 3) {
                    break;
                }
                seen_start = true;
                self.pos += 3;
                self.skip_inline_space();
                if !self.at_line_end_or_comment() {
                    return Err(self.error("content on the document start line is not supported"));
                }
                self.finish_line()?;
                continue;
            }
            break;
        }

        if self.is_document_marker(self.pos) {
            return self.trailing(None);
        }
        let col = self.column(self.pos);
        if !self.mapping_key_ahead() {
            return Err(self.error("document root must be a block mapping"));
        }
        let root = self.block_mapping(col)?;
        self.trailing(Some(root))
    }

    /// Only comments and document markers may follow the root
    fn trailing(mut self, root: Option<Mapping>) -> Result<ParsedDocument> {
        while self.skip_blank_lines().is_some() {
            if !self.is_document_marker(self.pos) {
                return Err(self.error("unexpected content after the root mapping"));
            }
            self.pos = self.line_end(self.pos);
        }
        Ok(ParsedDocument {
            root,
            indent_unit: self.indent_unit,
        })
    }

    // ---- block collections ---------------------------------------------

    fn block_mapping(&mut self, indent: usize) -> Result<Mapping> {
        let mut entries = Vec::new();
        loop {
            let Some(col) = self.skip_blank_lines() else {
                break;
            };
            if col < indent || self.is_document_marker(self.pos) {
                break;
            }
            if col > indent {
                return Err(self.error("unexpected indentation"));
            }
            if !self.mapping_key_ahead() {
                if self.peek() == Some(b'?') && self.is_blank_or_end(self.pos + 1) {
                    return Err(self.error("complex mapping keys are not supported"));
                }
                return Err(self.error("expected a mapping key"));
            }

            let start = self.line_start(self.pos);
            let key = self.mapping_key()?;
            let value = self.block_value(indent)?;
            let end = self.entry_end();
            entries.push(Entry {
                key,
                value,
                span: start..end,
            });
        }
        Ok(Mapping {
            entries,
            column: indent,
            flow: false,
        })
    }

    fn block_sequence(&mut self, indent: usize) -> Result<Vec<Node>> {
        let mut items = Vec::new();
        loop {
            let Some(col) = self.skip_blank_lines() else {
                break;
            };
            if col < indent || self.is_document_marker(self.pos) {
                break;
            }
            if col > indent {
                return Err(self.error("unexpected indentation"));
            }
            if !self.at_sequence_entry(self.pos) {
                break;
            }

            self.pos += 1;
            self.last_end = self.pos;
            self.skip_inline_space();
            self.skip_properties();
            if self.at_line_end_or_comment() {
                let empty_at = self.last_end;
                self.finish_line()?;
                items.push(self.nested_block(indent, empty_at, false)?);
                continue;
            }

            let item_col = self.column(self.pos);
            let item = if self.at_sequence_entry(self.pos) {
                Node::Sequence(self.block_sequence(item_col)?)
            } else if self.mapping_key_ahead() {
                Node::Mapping(self.block_mapping(item_col)?)
            } else {
                self.inline_value(indent)?
            };
            items.push(item);
        }
        Ok(items)
    }

    /// Value after `key:` on the same line or on the following lines
    fn block_value(&mut self, key_indent: usize) -> Result<Node> {
        self.skip_inline_space();
        self.skip_properties();
        if self.at_line_end_or_comment() {
            let empty_at = self.last_end;
            self.finish_line()?;
            return self.nested_block(key_indent, empty_at, true);
        }
        self.inline_value(key_indent)
    }

    /// Node starting on a following line, or an empty scalar at `empty_at`
    fn nested_block(&mut self, parent_indent: usize, empty_at: usize, under_key: bool) -> Result<Node> {
        if let Some((p, col)) = self.next_content() {
            if !self.is_document_marker(p) {
                if col > parent_indent {
                    self.pos = p;
                    if under_key && self.mapping_key_ahead() {
                        self.indent_unit.get_or_insert(col - parent_indent);
                    }
                    return self.block_node(col, parent_indent);
                }
                if under_key && col == parent_indent && self.at_sequence_entry(p) {
                    self.pos = p;
                    return Ok(Node::Sequence(self.block_sequence(col)?));
                }
            }
        }
        Ok(Node::Scalar(Scalar::empty(empty_at, " ", false)))
    }

    fn block_node(&mut self, col: usize, parent_indent: usize) -> Result<Node> {
        if self.at_sequence_entry(self.pos) {
            return Ok(Node::Sequence(self.block_sequence(col)?));
        }
        if self.mapping_key_ahead() {
            return Ok(Node::Mapping(self.block_mapping(col)?));
        }
        self.inline_value(parent_indent)
    }

    /// Scalar, flow collection or alias starting at the cursor; consumes the line
    fn inline_value(&mut self, parent_indent: usize) -> Result<Node> {
        let node = match self.peek() {
            Some(b'*') => {
                self.alias();
                Node::Alias
            }
            Some(b'|' | b'>') => return Ok(Node::Scalar(self.block_scalar(parent_indent)?)),
            Some(b'[' | b'{') => self.flow_node()?,
            Some(b'"') => Node::Scalar(self.double_quoted(false)?),
            Some(b'\'') => Node::Scalar(self.single_quoted(false)?),
            _ => Node::Scalar(self.plain_block(parent_indent)),
        };
        self.finish_line()?;
        Ok(node)
    }

    // ---- keys -------------------------------------------------------------

    fn mapping_key(&mut self) -> Result<Scalar> {
        self.skip_properties();
        let key = match self.peek() {
            Some(b'"') => self.double_quoted(false)?,
            Some(b'\'') => self.single_quoted(false)?,
            _ => {
                let start = self.pos;
                let end = self.plain_key_end();
                self.pos = end;
                self.last_end = end;
                Scalar::new(
                    self.src[start..end].to_string(),
                    ScalarStyle::Plain,
                    start..end,
                    false,
                )
            }
        };
        self.skip_inline_space();
        if self.peek() != Some(b':') {
            return Err(self.error("expected ':' after mapping key"));
        }
        self.pos += 1;
        self.last_end = self.pos;
        Ok(key)
    }

    fn plain_key_end(&self) -> usize {
        let line_end = self.line_end(self.pos);
        let mut p = self.pos;
        while p < line_end {
            if self.bytes[p] == b':' && self.is_blank_or_end(p + 1) {
                break;
            }
            p += 1;
        }
        self.trim_back(self.pos, p)
    }

    /// True when the current line holds `key: ...`
    fn mapping_key_ahead(&self) -> bool {
        let line_end = self.line_end(self.pos);
        let mut p = self.properties_end(self.pos);
        match self.byte_at(p) {
            Some(quote @ (b'"' | b'\'')) => {
                let Some(after) = self.quoted_end_on_line(p, quote) else {
                    return false;
                };
                p = after;
                while matches!(self.byte_at(p), Some(b' ' | b'\t')) {
                    p += 1;
                }
                self.byte_at(p) == Some(b':') && self.is_blank_or_end(p + 1)
            }
            None | Some(b'[' | b'{' | b'#' | b'|' | b'>' | b'*' | b'\n' | b'\r') => false,
            Some(b'-' | b'?') if self.is_blank_or_end(p + 1) => false,
            Some(_) => {
                let start = p;
                while p < line_end {
                    match self.bytes[p] {
                        b':' if self.is_blank_or_end(p + 1) => return true,
                        b'#' if p > start && matches!(self.bytes[p - 1], b' ' | b'\t') => {
                            return false
                        }
                        _ => p += 1,
                    }
                }
                false
            }
        }
    }

    fn quoted_end_on_line(&self, open: usize, quote: u8) -> Option<usize> {
        let line_end = self.line_end(open);
        let mut p = open + 1;
        while p < line_end {
            let b = self.bytes[p];
            if quote == b'"' && b == b'\\' {
                p += 2;
                continue;
            }
            if b == quote {
                if quote == b'\'' && self.byte_at(p + 1) == Some(b'\'') {
                    p += 2;
                    continue;
                }
                return Some(p + 1);
            }
            p += 1;
        }
        None
    }

    // ---- scalars ----------------------------------------------------------

    /// Plain scalar in block context; continuation lines must be indented past `parent_indent`
    fn plain_block(&mut self, parent_indent: usize) -> Scalar {
        let start = self.pos;
        let end = self.plain_end(start, false);
        let mut value = self.src[start..end].to_string();
        self.pos = end;
        self.last_end = end;

        loop {
            let mut p = self.pos;
            while matches!(self.byte_at(p), Some(b' ' | b'\t')) {
                p += 1;
            }
            if !matches!(self.byte_at(p), Some(b'\n' | b'\r')) {
                break;
            }

            let mut line_end = self.line_end(p);
            let mut breaks = 0;
            let next = loop {
                if line_end >= self.src.len() {
                    break None;
                }
                let mut q = line_end + 1;
                while matches!(self.byte_at(q), Some(b' ' | b'\t')) {
                    q += 1;
                }
                match self.byte_at(q) {
                    None => break None,
                    Some(b'\n' | b'\r') => {
                        breaks += 1;
                        line_end = self.line_end(q);
                    }
                    Some(_) => break Some(q),
                }
            };

            let Some(q) = next else {
                break;
            };
            if self.column(q) <= parent_indent
                || self.bytes[q] == b'#'
                || self.is_document_marker(q)
            {
                break;
            }
            let end = self.plain_end(q, false);
            if end == q {
                break;
            }
            if breaks == 0 {
                value.push(' ');
            } else {
                value.extend(repeat('\n').take(breaks));
            }
            value.push_str(&self.src[q..end]);
            self.pos = end;
            self.last_end = end;
        }

        Scalar::new(value, ScalarStyle::Plain, start..self.last_end, false)
    }

    fn plain_flow(&mut self) -> Result<Scalar> {
        let start = self.pos;
        let end = self.plain_end(start, true);
        if end == start {
            return Err(self.error("unexpected character in flow collection"));
        }
        self.pos = end;
        self.last_end = end;
        Ok(Scalar::new(
            self.src[start..end].to_string(),
            ScalarStyle::Plain,
            start..end,
            true,
        ))
    }

    /// End of plain text on the current line, trailing blanks excluded
    fn plain_end(&self, start: usize, flow: bool) -> usize {
        let line_end = self.line_end(start);
        let mut p = start;
        while p < line_end {
            let b = self.bytes[p];
            if b == b'\r' {
                break;
            }
            if b == b':'
                && (self.is_blank_or_end(p + 1)
                    || (flow && matches!(self.byte_at(p + 1), Some(b',' | b'[' | b']' | b'{' | b'}'))))
            {
                break;
            }
            if b == b'#' && p > start && matches!(self.bytes[p - 1], b' ' | b'\t') {
                break;
            }
            if flow && matches!(b, b',' | b'[' | b']' | b'{' | b'}') {
                break;
            }
            p += 1;
        }
        self.trim_back(start, p)
    }

    fn double_quoted(&mut self, in_flow: bool) -> Result<Scalar> {
        let start = self.pos;
        self.pos += 1;
        let mut value = String::new();
        loop {
            let Some(c) = self.src[self.pos..].chars().next() else {
                return Err(self.error("unterminated double-quoted scalar"));
            };
            match c {
                '"' => {
                    self.pos += 1;
                    break;
                }
                '\\' => {
                    self.pos += 1;
                    self.escape(&mut value)?;
                }
                '\n' | '\r' => self.fold_quoted_break(&mut value),
                _ => {
                    value.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
        self.last_end = self.pos;
        Ok(Scalar::new(
            value,
            ScalarStyle::DoubleQuoted,
            start..self.pos,
            in_flow,
        ))
    }

    fn escape(&mut self, value: &mut String) -> Result<()> {
        let Some(c) = self.src[self.pos..].chars().next() else {
            return Err(self.error("unterminated escape sequence"));
        };
        self.pos += c.len_utf8();
        let decoded = match c {
            '0' => '\0',
            'a' => '\x07',
            'b' => '\x08',
            't' | '\t' => '\t',
            'n' => '\n',
            'v' => '\x0b',
            'f' => '\x0c',
            'r' => '\r',
            'e' => '\x1b',
            ' ' => ' ',
            '"' => '"',
            '/' => '/',
            '\\' => '\\',
            'N' => '\u{85}',
            '_' => '\u{a0}',
            'L' => '\u{2028}',
            'P' => '\u{2029}',
            'x' => self.hex_escape(2)?,
            'u' => self.hex_escape(4)?,
            'U' => self.hex_escape(8)?,
            '\r' | '\n' => {
                // escaped line break joins the lines without a space
                if c == '\r' && self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
                self.skip_inline_space();
                return Ok(());
            }
            other => return Err(self.error(format!("unknown escape sequence '\\{other}'"))),
        };
        value.push(decoded);
        Ok(())
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char> {
        let code = self
            .src
            .get(self.pos..self.pos + digits)
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .and_then(char::from_u32)
            .ok_or_else(|| self.error("invalid escape sequence"))?;
        self.pos += digits;
        Ok(code)
    }

    fn single_quoted(&mut self, in_flow: bool) -> Result<Scalar> {
        let start = self.pos;
        self.pos += 1;
        let mut value = String::new();
        loop {
            let Some(c) = self.src[self.pos..].chars().next() else {
                return Err(self.error("unterminated single-quoted scalar"));
            };
            match c {
                '\'' if self.byte_at(self.pos + 1) == Some(b'\'') => {
                    value.push('\'');
                    self.pos += 2;
                }
                '\'' => {
                    self.pos += 1;
                    break;
                }
                '\n' | '\r' => self.fold_quoted_break(&mut value),
                _ => {
                    value.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
        self.last_end = self.pos;
        Ok(Scalar::new(
            value,
            ScalarStyle::SingleQuoted,
            start..self.pos,
            in_flow,
        ))
    }

    /// Line folding inside quoted scalars: one break is a space, n empty lines are n breaks
    fn fold_quoted_break(&mut self, value: &mut String) {
        while value.ends_with([' ', '\t']) {
            value.pop();
        }
        let mut breaks = 0;
        loop {
            if self.peek() == Some(b'\r') {
                self.pos += 1;
            }
            if self.peek() == Some(b'\n') {
                self.pos += 1;
            }
            self.skip_inline_space();
            if matches!(self.peek(), Some(b'\n' | b'\r')) {
                breaks += 1;
                continue;
            }
            break;
        }
        if breaks == 0 {
            value.push(' ');
        } else {
            value.extend(repeat('\n').take(breaks));
        }
    }

    /// `|` or `>` block scalar; leaves the cursor at the line after its content
    fn block_scalar(&mut self, parent_indent: usize) -> Result<Scalar> {
        let start = self.pos;
        let literal = self.peek() == Some(b'|');
        self.pos += 1;

        let mut chomp = Chomp::Clip;
        let mut explicit = None;
        for _ in 0..2 {
            match self.peek() {
                Some(b'-') => chomp = Chomp::Strip,
                Some(b'+') => chomp = Chomp::Keep,
                Some(digit @ b'1'..=b'9') => explicit = Some(usize::from(digit - b'0')),
                _ => break,
            }
            self.pos += 1;
        }
        let header_end = self.pos;
        self.last_end = header_end;
        self.skip_inline_space();
        if !self.at_line_end_or_comment() {
            return Err(self.error("invalid block scalar header"));
        }
        self.finish_line()?;

        let content_indent = match explicit {
            Some(offset) => parent_indent + offset,
            None => self.detect_block_indent(parent_indent),
        };

        let mut lines = Vec::new();
        let mut last_content = None;
        let mut content_end = header_end;
        let mut after_content = self.pos;
        let mut p = self.pos;
        while p < self.src.len() {
            let end = self.line_end(p);
            let raw = self.src[p..end].trim_end_matches('\r');
            let indent = raw.len() - raw.trim_start_matches(' ').len();
            let blank = raw.trim().is_empty();
            if !blank && indent < content_indent {
                break;
            }
            lines.push(raw);
            let next = if end < self.src.len() { end + 1 } else { end };
            if !blank {
                last_content = Some(lines.len() - 1);
                content_end = p + raw.len();
                after_content = next;
            }
            p = next;
        }

        let content_len = last_content.map_or(0, |i| i + 1);
        let trailing_blank = lines.len() - content_len;
        let content: Vec<&str> = lines[..content_len]
            .iter()
            .map(|line| line.get(content_indent..).unwrap_or(""))
            .collect();

        let mut value = if literal {
            content.join("\n")
        } else {
            fold_lines(&content)
        };
        match (chomp, content_len) {
            (Chomp::Strip, _) | (Chomp::Clip, 0) => {}
            (Chomp::Clip, _) => value.push('\n'),
            (Chomp::Keep, 0) => value.extend(repeat('\n').take(trailing_blank)),
            (Chomp::Keep, _) => value.extend(repeat('\n').take(trailing_blank + 1)),
        }

        self.pos = after_content;
        self.last_end = content_end;
        let style = if literal {
            ScalarStyle::Literal
        } else {
            ScalarStyle::Folded
        };
        Ok(Scalar::new(value, style, start..content_end, false))
    }

    fn detect_block_indent(&self, parent_indent: usize) -> usize {
        let mut p = self.pos;
        while p < self.src.len() {
            let end = self.line_end(p);
            let raw = self.src[p..end].trim_end_matches('\r');
            if !raw.trim().is_empty() {
                let indent = raw.len() - raw.trim_start_matches(' ').len();
                return indent.max(parent_indent + 1);
            }
            p = end + 1;
        }
        parent_indent + 1
    }

    fn alias(&mut self) {
        while !self.is_blank_or_end(self.pos) && !matches!(self.peek(), Some(b',' | b']' | b'}')) {
            self.pos += 1;
        }
        self.last_end = self.pos;
    }

    // ---- flow collections ---------------------------------------------------

    fn flow_node(&mut self) -> Result<Node> {
        self.skip_flow_space();
        self.skip_properties();
        self.skip_flow_space();
        match self.peek() {
            Some(b'[') => self.flow_sequence(),
            Some(b'{') => self.flow_mapping(),
            Some(b'*') => {
                self.alias();
                Ok(Node::Alias)
            }
            Some(b'"') => Ok(Node::Scalar(self.double_quoted(true)?)),
            Some(b'\'') => Ok(Node::Scalar(self.single_quoted(true)?)),
            None => Err(self.error("unterminated flow collection")),
            Some(_) => Ok(Node::Scalar(self.plain_flow()?)),
        }
    }

    fn flow_sequence(&mut self) -> Result<Node> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_flow_space();
            match self.peek() {
                Some(b']') => {
                    self.pos += 1;
                    break;
                }
                None => return Err(self.error("unterminated flow sequence")),
                Some(_) => {}
            }
            items.push(self.flow_node()?);
            self.skip_flow_space();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {}
                Some(b':') => {
                    return Err(self.error("single-pair mappings in flow sequences are not supported"))
                }
                _ => return Err(self.error("expected ',' or ']' in flow sequence")),
            }
        }
        self.last_end = self.pos;
        Ok(Node::Sequence(items))
    }

    fn flow_mapping(&mut self) -> Result<Node> {
        let column = self.column(self.pos);
        self.pos += 1;
        let mut entries = Vec::new();
        loop {
            self.skip_flow_space();
            match self.peek() {
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                None => return Err(self.error("unterminated flow mapping")),
                Some(_) => {}
            }

            let start = self.pos;
            self.skip_properties();
            let key = match self.peek() {
                Some(b'"') => self.double_quoted(true)?,
                Some(b'\'') => self.single_quoted(true)?,
                Some(b'[' | b'{') => return Err(self.error("collection keys are not supported")),
                _ => self.plain_flow()?,
            };
            self.skip_flow_space();
            let value = if self.peek() == Some(b':') {
                self.pos += 1;
                self.last_end = self.pos;
                self.skip_flow_space();
                if matches!(self.peek(), Some(b',' | b'}')) {
                    Node::Scalar(Scalar::empty(self.last_end, " ", true))
                } else {
                    self.flow_node()?
                }
            } else {
                Node::Scalar(Scalar::empty(key.span.end, ": ", true))
            };
            entries.push(Entry {
                key,
                value,
                span: start..self.last_end,
            });

            self.skip_flow_space();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {}
                _ => return Err(self.error("expected ',' or '}' in flow mapping")),
            }
        }
        self.last_end = self.pos;
        Ok(Node::Mapping(Mapping {
            entries,
            column,
            flow: true,
        }))
    }

    fn skip_flow_space(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\n' | b'\r') => self.pos += 1,
                Some(b'#')
                    if self.pos == 0
                        || matches!(self.bytes[self.pos - 1], b' ' | b'\t' | b'\n' | b'\r') =>
                {
                    self.pos = self.line_end(self.pos);
                }
                _ => break,
            }
        }
    }

    // ---- lines and cursor ---------------------------------------------------

    fn peek(&self) -> Option<u8> {
        self.byte_at(self.pos)
    }

    fn byte_at(&self, at: usize) -> Option<u8> {
        self.bytes.get(at).copied()
    }

    fn is_blank_or_end(&self, at: usize) -> bool {
        matches!(self.byte_at(at), None | Some(b' ' | b'\t' | b'\n' | b'\r'))
    }

    fn at_sequence_entry(&self, at: usize) -> bool {
        self.byte_at(at) == Some(b'-') && self.is_blank_or_end(at + 1)
    }

    fn is_document_marker(&self, at: usize) -> bool {
        let rest = &self.src[at..];
        self.column(at) == 0
            && (rest.starts_with("---") || rest.starts_with("..."))
            && self.is_blank_or_end(at + 3)
    }

    fn line_start(&self, at: usize) -> usize {
        self.src[..at].rfind('\n').map_or(0, |i| i + 1)
    }

    /// Index of the line break ending the line at `at`, or the end of input
    fn line_end(&self, at: usize) -> usize {
        self.src[at..].find('\n').map_or(self.src.len(), |i| at + i)
    }

    fn column(&self, at: usize) -> usize {
        at - self.line_start(at)
    }

    fn trim_back(&self, start: usize, mut end: usize) -> usize {
        while end > start && matches!(self.bytes[end - 1], b' ' | b'\t') {
            end -= 1;
        }
        end
    }

    /// End of the entry whose last token ended at `last_end`: the end of that line
    fn entry_end(&self) -> usize {
        let end = self.line_end(self.last_end);
        if end < self.src.len() {
            end + 1
        } else {
            end
        }
    }

    fn skip_inline_space(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    fn at_line_end_or_comment(&self) -> bool {
        matches!(self.peek(), None | Some(b'\n' | b'\r' | b'#'))
    }

    /// Consume trailing blanks, an optional comment and the line break
    fn finish_line(&mut self) -> Result<()> {
        self.skip_inline_space();
        if self.peek() == Some(b'#') {
            self.pos = self.line_end(self.pos);
        }
        if self.peek() == Some(b'\r') {
            self.pos += 1;
        }
        match self.peek() {
            None => Ok(()),
            Some(b'\n') => {
                self.pos += 1;
                Ok(())
            }
            Some(_) => Err(self.error("unexpected content after value")),
        }
    }

    /// First content position at or after the cursor, skipping blank and comment lines
    fn next_content(&self) -> Option<(usize, usize)> {
        let mut p = self.pos;
        loop {
            while matches!(self.byte_at(p), Some(b' ' | b'\t')) {
                p += 1;
            }
            match self.byte_at(p) {
                None => return None,
                Some(b'\n' | b'\r') => p += 1,
                Some(b'#') => p = self.line_end(p),
                Some(_) => return Some((p, self.column(p))),
            }
        }
    }

    fn skip_blank_lines(&mut self) -> Option<usize> {
        match self.next_content() {
            Some((p, col)) => {
                self.pos = p;
                Some(col)
            }
            None => {
                self.pos = self.src.len();
                None
            }
        }
    }

    fn properties_end(&self, mut p: usize) -> usize {
        while matches!(self.byte_at(p), Some(b'&' | b'!')) {
            while !self.is_blank_or_end(p) {
                p += 1;
            }
            while matches!(self.byte_at(p), Some(b' ' | b'\t')) {
                p += 1;
            }
        }
        p
    }

    /// Skip anchors and tags; they are not modelled
    fn skip_properties(&mut self) {
        let end = self.properties_end(self.pos);
        if end != self.pos {
            self.last_end = self.trim_back(self.pos, end);
            self.pos = end;
        }
    }

    fn error(&self, message: impl Display) -> SealError {
        let line = self.src[..self.pos.min(self.src.len())]
            .bytes()
            .filter(|&b| b == b'\n')
            .count()
            + 1;
        SealError::UnsupportedDocument(format!("line {line}: {message}"))
    }
}

/// Folding of `>` block scalars: single breaks between normal lines become spaces
fn fold_lines(lines: &[&str]) -> String {
    let mut out = String::new();
    let mut breaks = 0;
    let mut previous_more_indented = None;
    for line in lines {
        if line.is_empty() {
            breaks += 1;
            continue;
        }
        let more_indented = line.starts_with([' ', '\t']);
        match previous_more_indented {
            None => out.extend(repeat('\n').take(breaks)),
            Some(false) if !more_indented => {
                if breaks == 0 {
                    out.push(' ');
                } else {
                    out.extend(repeat('\n').take(breaks));
                }
            }
            Some(_) => out.extend(repeat('\n').take(breaks + 1)),
        }
        out.push_str(line);
        previous_more_indented = Some(more_indented);
        breaks = 0;
    }
    out
}
