/*
 * output.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Output sinks and HTML escaping.
//!
//! The renderer writes through the [`RenderSink`] trait: text runs go
//! through [`RenderSink::write_text`] verbatim, emitted expression values
//! through [`RenderSink::write_value`]. [`StringSink`] accumulates into an
//! owned `String` and is what the convenience render entry points use.

use crate::value::{StrKind, Value};

/// Destination for rendered output.
pub trait RenderSink {
    /// Write literal text.
    fn write_text(&mut self, text: &str);

    /// Write a value through output coercion.
    fn write_value(&mut self, value: &Value) {
        self.write_text(&value.to_output_string());
    }
}

/// A sink accumulating into an owned string.
#[derive(Debug, Default)]
pub struct StringSink {
    buf: String,
}

impl StringSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the sink and return the rendered text.
    pub fn into_string(self) -> String {
        self.buf
    }
}

impl RenderSink for StringSink {
    fn write_text(&mut self, text: &str) {
        self.buf.push_str(text);
    }
}

/// A sink that discards everything. Used when executing a template for
/// its module-level definitions (`import` / `from`).
#[derive(Debug, Default)]
pub struct NullSink;

impl RenderSink for NullSink {
    fn write_text(&mut self, _text: &str) {}
}

/// Escape `& < > " '` for HTML output.
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Emit an expression value, escaping unless the value is marked safe.
///
/// Text runs never pass through here; only emitted expressions are
/// subject to autoescaping.
pub(crate) fn emit_value(sink: &mut dyn RenderSink, value: &Value, autoescape: bool) {
    if !autoescape {
        sink.write_value(value);
        return;
    }
    match value {
        Value::String(text, StrKind::Safe) => sink.write_text(text),
        other => sink.write_text(&html_escape(&other.to_output_string())),
    }
}
