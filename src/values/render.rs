//! # Rendering
//!
//! Text for replaced scalars and for the metadata block.

use std::fmt::Write as _;

use super::metadata::Metadata;
use crate::constants::METADATA_KEY;

/// Render a scalar value: plain when it reads back unchanged, else double-quoted
pub fn render_scalar(value: &str, in_flow: bool) -> String {
    if is_plain_safe(value, in_flow) {
        value.to_string()
    } else {
        double_quoted(value)
    }
}

fn is_plain_safe(value: &str, in_flow: bool) -> bool {
    let Some(first) = value.chars().next() else {
        return false;
    };
    if value != value.trim() || "-?:,[]{}#&*!|>'\"%@`".contains(first) {
        return false;
    }
    if value.contains(": ") || value.contains(" #") || value.ends_with(':') {
        return false;
    }
    if value.chars().any(char::is_control) {
        return false;
    }
    if in_flow && value.contains([',', '[', ']', '{', '}']) {
        return false;
    }
    !reads_as_non_string(value)
}

/// Plain text a YAML reader would resolve to null, bool, number or timestamp
fn reads_as_non_string(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    if matches!(
        lower.as_str(),
        "~" | "null" | "true" | "false" | "yes" | "no" | "on" | "off" | "y" | "n"
            | ".inf" | "+.inf" | "-.inf" | ".nan"
    ) {
        return true;
    }
    if lower.parse::<f64>().is_ok() || lower.starts_with("0x") || lower.starts_with("0o") {
        return true;
    }
    // dates, times and sexagesimal numbers
    value.starts_with(|c: char| c.is_ascii_digit()) && value.contains(['-', ':'])
}

/// Double-quoted scalar with YAML escapes
pub fn double_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04X}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Render the reserved metadata entry, line break included.
///
/// `column` is the column of the root keys, `indent` the document's
/// indentation step.
pub fn render_metadata(metadata: &Metadata, column: usize, indent: usize) -> String {
    let pad = " ".repeat(column);
    let inner = " ".repeat(column + indent);

    let mut out = format!("{pad}{METADATA_KEY}:\n");
    out.push_str(&format!(
        "{inner}name: {}\n",
        render_scalar(&metadata.name, false)
    ));
    out.push_str(&format!(
        "{inner}namespace: {}\n",
        render_scalar(&metadata.namespace, false)
    ));
    out.push_str(&format!(
        "{inner}sealedAt: {}\n",
        double_quoted(&metadata.sealed_at)
    ));
    out.push_str(&format!(
        "{inner}cert: {}",
        literal_block(&metadata.cert, column + indent, indent)
    ));
    out
}

/// Convert a rendered block to the document's line terminator
pub fn with_line_break(block: String, line_break: &str) -> String {
    if line_break == "\n" {
        block
    } else {
        block.replace('\n', line_break)
    }
}

/// Literal block scalar (`|`) for multi-line text such as PEM certificates
fn literal_block(text: &str, key_column: usize, indent: usize) -> String {
    if text.is_empty() || text.chars().any(|c| c.is_control() && c != '\n') {
        return format!("{}\n", double_quoted(text));
    }

    let body = text.trim_end_matches('\n');
    let trailing = text.len() - body.len();
    let chomp = match trailing {
        0 => "-",
        1 => "",
        _ => "+",
    };
    // leading spaces would be mistaken for indentation
    let first_content = body.lines().find(|line| !line.is_empty()).unwrap_or("");
    let indicator = if first_content.starts_with(' ') {
        indent.min(9).to_string()
    } else {
        String::new()
    };

    let content_pad = " ".repeat(key_column + indent);
    let mut out = format!("|{indicator}{chomp}\n");
    for line in body.split('\n') {
        if line.is_empty() {
            out.push('\n');
        } else {
            out.push_str(&content_pad);
            out.push_str(line);
            out.push('\n');
        }
    }
    for _ in 1..trailing {
        out.push('\n');
    }
    out
}
