/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for template parsing and rendering.
//!
//! Every failure is reported as a single structured [`Error`] carrying an
//! error code ([`ErrorKind`]), a source location, and optional extra
//! parameters (template values involved in the failure). The `Display`
//! form is a single line: `file:line:col: Code: message`.

use std::fmt;
use std::sync::Arc;

use ginger_source_map::Range;
use thiserror::Error;

use crate::value::Value;

/// Result type for template operations.
pub type TemplateResult<T> = Result<T, Error>;

/// Sub-reasons for [`ErrorKind::Syntax`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxErrorKind {
    /// A `{{`, `{%` or `{#` region was never closed.
    #[error("unterminated tag delimiter")]
    UnterminatedTag,

    /// A string literal was never closed.
    #[error("unterminated string literal")]
    UnterminatedString,

    /// An unknown escape sequence inside a string literal.
    #[error("unknown escape sequence '\\{0}'")]
    UnknownEscape(char),

    /// An unexpected character in a tag region.
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),

    /// A token that does not fit the grammar at this point.
    #[error("unexpected token {0}")]
    UnexpectedToken(String),

    /// A specific keyword or token was required.
    #[error("expected {expected}, found {found}")]
    Expected { expected: String, found: String },

    /// A statement body was closed by the wrong `end*` keyword.
    #[error("mismatched block delimiter: expected {expected}, found {found}")]
    MismatchedEnd { expected: String, found: String },
}

/// Error codes for template operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    /// Render was attempted on a template that failed to parse.
    #[error("template is not parsed")]
    TemplateNotParsed,

    /// A host callable panicked or failed unexpectedly.
    #[error("unexpected exception during rendering")]
    UnexpectedException,

    /// A template name expression did not evaluate to a string.
    #[error("invalid template name")]
    InvalidTemplateName,

    /// The loader reported the template as missing.
    #[error("template not found")]
    TemplateNotFound,

    /// A lexer or parser failure.
    #[error("syntax error: {0}")]
    Syntax(SyntaxErrorKind),

    /// A missing name was resolved in strict mode.
    #[error("undefined value")]
    UndefinedValue,

    /// A filter name with no registration.
    #[error("unknown filter")]
    UnknownFilter,

    /// A test name with no registration.
    #[error("unknown test")]
    UnknownTest,

    /// Operand types do not support the requested operation.
    #[error("invalid operation")]
    InvalidOperation,

    /// A mandatory callable argument was not supplied.
    #[error("missing argument")]
    MissingArgument,

    /// The loader failed while reading a template source.
    #[error("loader error")]
    Loader,

    /// `{% extends %}` appeared after non-whitespace content.
    #[error("extends appears after template content")]
    ExtendsAfterContent,

    /// Two blocks with the same name in one template.
    #[error("block is defined more than once")]
    BlockRedefined,
}

impl ErrorKind {
    /// The stable code name used in rendered error lines.
    pub fn code_name(&self) -> &'static str {
        match self {
            ErrorKind::TemplateNotParsed => "TemplateNotParsed",
            ErrorKind::UnexpectedException => "UnexpectedException",
            ErrorKind::InvalidTemplateName => "InvalidTemplateName",
            ErrorKind::TemplateNotFound => "TemplateNotFound",
            ErrorKind::Syntax(_) => "SyntaxError",
            ErrorKind::UndefinedValue => "UndefinedValue",
            ErrorKind::UnknownFilter => "UnknownFilter",
            ErrorKind::UnknownTest => "UnknownTest",
            ErrorKind::InvalidOperation => "InvalidOperation",
            ErrorKind::MissingArgument => "MissingArgument",
            ErrorKind::Loader => "LoaderError",
            ErrorKind::ExtendsAfterContent => "ExtendsAfterContent",
            ErrorKind::BlockRedefined => "BlockRedefined",
        }
    }
}

/// Where an error occurred: template name plus 1-indexed line and column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorLocation {
    /// Template name as given to the environment.
    pub file: Arc<str>,
    /// 1-indexed line.
    pub line: usize,
    /// 1-indexed column.
    pub column: usize,
}

impl ErrorLocation {
    /// Build a location from a template name and a source [`Range`].
    pub fn from_range(file: &Arc<str>, range: &Range) -> Self {
        ErrorLocation {
            file: Arc::clone(file),
            line: range.start.row + 1,
            column: range.start.column + 1,
        }
    }
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A structured template error.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    /// The error code.
    pub kind: ErrorKind,
    /// Source location of the failure site.
    pub location: ErrorLocation,
    /// Template values involved in the failure (names, operands, messages).
    pub extra: Vec<Value>,
}

impl Error {
    /// Create an error with no location or extra parameters.
    pub fn new(kind: ErrorKind) -> Self {
        Error {
            kind,
            location: ErrorLocation {
                file: Arc::from("<unknown>"),
                line: 1,
                column: 1,
            },
            extra: Vec::new(),
        }
    }

    /// Attach a source location.
    pub fn at(mut self, file: &Arc<str>, range: &Range) -> Self {
        self.location = ErrorLocation::from_range(file, range);
        self
    }

    /// Attach an extra parameter.
    pub fn with_extra(mut self, value: impl Into<Value>) -> Self {
        self.extra.push(value.into());
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}: {}",
            self.location,
            self.kind.code_name(),
            self.kind
        )?;
        if !self.extra.is_empty() {
            let params: Vec<String> = self.extra.iter().map(|v| v.to_output_string()).collect();
            write!(f, " [{}]", params.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}
