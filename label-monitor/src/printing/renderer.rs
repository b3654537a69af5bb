//! Template renderer
//!
//! Replaces `{Name}` tokens in a template with formatted record fields.
//! Rendering is pure: the same template and record always give the same
//! output.
//!
//! | Field | Output |
//! |-------|--------|
//! | decimal, `|v| < 0.001` | scientific, `4.000E-4` |
//! | other decimal | three fractional digits, `12.346` |
//! | timestamp | `%Y-%m-%d %H:%M:%S` |
//! | NULL | `N/A` |
//!
//! Names are matched exactly (case-sensitive, no trimming). Tokens that do
//! not name a field are left in place, braces included.
//!
//! Values go out as-is, except inside a raw-format `^FH^FD … ^FS` field:
//! the printer hex-decodes that data, so `^ ~ _` are written as `_XX`.

use label_printer::escape_field_data;
use shared::models::record::TIMESTAMP_FORMAT;
use shared::{FieldValue, Record, Template};
use thiserror::Error;

/// Text written for a NULL or missing value
pub const NOT_AVAILABLE: &str = "N/A";

/// Structural problem in template content (byte offsets)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateRenderError {
    #[error("Placeholder opened at offset {0} is never closed")]
    UnclosedToken(usize),

    #[error("Empty placeholder at offset {0}")]
    EmptyToken(usize),

    #[error("Unexpected '}}' at offset {0}")]
    UnexpectedClose(usize),
}

/// Format a decimal measurement
pub fn format_decimal(value: f64) -> String {
    if value.abs() < 0.001 {
        format!("{:.3E}", value)
    } else {
        format!("{:.3}", value)
    }
}

/// Format any resolved field
pub fn format_field(value: FieldValue<'_>) -> String {
    match value {
        FieldValue::Integer(v) => v.to_string(),
        FieldValue::Decimal(Some(v)) => format_decimal(v),
        FieldValue::Text(Some(s)) => s.to_string(),
        FieldValue::Timestamp(Some(ts)) => ts.format(TIMESTAMP_FORMAT).to_string(),
        FieldValue::Decimal(None) | FieldValue::Text(None) | FieldValue::Timestamp(None) => {
            NOT_AVAILABLE.to_string()
        }
    }
}

/// Render a template against a record
pub fn render(template: &Template, record: &Record) -> String {
    let raw = template.format.is_raw();
    substitute(&template.content, |name, before| {
        record.field(name).map(|value| {
            let text = format_field(value);
            if raw && in_hex_field(before) {
                escape_field_data(&text)
            } else {
                text
            }
        })
    })
}

/// Whether a token preceded by `before` sits in field data opened with
/// `^FH` and the default `_` indicator
fn in_hex_field(before: &str) -> bool {
    let field = match before.rfind("^FS") {
        Some(end) => &before[end + 3..],
        None => before,
    };
    let Some(data) = field.rfind("^FD") else {
        return false;
    };
    let commands = &field[..data];
    match commands.rfind("^FH") {
        Some(h) => {
            let indicator = commands[h + 3..].split('^').next().unwrap_or_default();
            indicator.is_empty() || indicator == "_"
        }
        None => false,
    }
}

/// Render for display; structural errors come back as inline text
pub fn render_preview(template: &Template, record: &Record) -> String {
    match validate(template) {
        Ok(()) => render(template, record),
        Err(e) => format!("[Template error: {}]", e),
    }
}

/// Check braces are balanced and every token has a name
pub fn validate(template: &Template) -> Result<(), TemplateRenderError> {
    let mut open: Option<usize> = None;
    for (i, c) in template.content.char_indices() {
        match (c, open) {
            ('{', Some(start)) => return Err(TemplateRenderError::UnclosedToken(start)),
            ('{', None) => open = Some(i),
            ('}', None) => return Err(TemplateRenderError::UnexpectedClose(i)),
            ('}', Some(start)) => {
                if i == start + 1 {
                    return Err(TemplateRenderError::EmptyToken(start));
                }
                open = None;
            }
            _ => {}
        }
    }
    match open {
        Some(start) => Err(TemplateRenderError::UnclosedToken(start)),
        None => Ok(()),
    }
}

/// Token names in order of appearance
pub fn tokens(content: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = content;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find(['{', '}']) {
            Some(i) if after[i..].starts_with('}') => {
                names.push(&after[..i]);
                rest = &after[i + 1..];
            }
            Some(i) => rest = &after[i..],
            None => break,
        }
    }
    names
}

/// `resolve` gets the token name and the template text before it
fn substitute(content: &str, mut resolve: impl FnMut(&str, &str) -> Option<String>) -> String {
    let mut out = String::with_capacity(content.len() + 32);
    let mut rest = content;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let before = &content[..content.len() - rest.len() + open];
        let after = &rest[open + 1..];
        match after.find(['{', '}']) {
            Some(i) if after[i..].starts_with('}') => {
                let name = &after[..i];
                match resolve(name, before) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[i + 1..];
            }
            // 内层 '{' 重新开始匹配，外层按原文输出
            Some(i) => {
                out.push('{');
                out.push_str(&after[..i]);
                rest = &after[i..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
