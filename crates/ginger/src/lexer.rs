/*
 * lexer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Two-mode template lexer.
//!
//! Text mode scans forward emitting text runs until one of the opening
//! delimiters `{{`, `{%`, `{#`. Tag mode tokenizes the delimited region
//! into an expression-level token stream. Keywords are emitted as plain
//! identifier tokens and recognized contextually by the parser.
//!
//! Whitespace control: `{{-`/`{%-`/`{#-` trim the preceding text run,
//! `-}}`/`-%}`/`-#}` trim the following one; a `+` marker suppresses
//! `lstrip_blocks`/`trim_blocks` for that tag. `{% raw %}` bodies are
//! scanned here and emitted as a single raw-text token.

use std::sync::Arc;

use ginger_source_map::{Location, Range};

use crate::error::{Error, ErrorKind, SyntaxErrorKind, TemplateResult};

/// A lexed token with its source range.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub range: Range,
}

/// Token kinds produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Literal template text.
    Text(String),
    /// Body of a `{% raw %}` block.
    RawText(String),
    /// `{{`
    VariableBegin,
    /// `}}`
    VariableEnd,
    /// `{%`
    BlockBegin,
    /// `%}`
    BlockEnd,

    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),

    Pipe,
    Dot,
    Comma,
    Colon,
    Assign,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Plus,
    Minus,
    Star,
    Slash,
    FloorDiv,
    Percent,
    Pow,
    Tilde,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    Eof,
}

impl TokenKind {
    /// Short description used in syntax error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Text(_) => "text".to_string(),
            TokenKind::RawText(_) => "raw block".to_string(),
            TokenKind::VariableBegin => "'{{'".to_string(),
            TokenKind::VariableEnd => "'}}'".to_string(),
            TokenKind::BlockBegin => "'{%'".to_string(),
            TokenKind::BlockEnd => "'%}'".to_string(),
            TokenKind::Ident(name) => format!("'{}'", name),
            TokenKind::Int(n) => format!("integer {}", n),
            TokenKind::Float(d) => format!("float {}", d),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Pipe => "'|'".to_string(),
            TokenKind::Dot => "'.'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Colon => "':'".to_string(),
            TokenKind::Assign => "'='".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBracket => "'['".to_string(),
            TokenKind::RBracket => "']'".to_string(),
            TokenKind::LBrace => "'{'".to_string(),
            TokenKind::RBrace => "'}'".to_string(),
            TokenKind::Plus => "'+'".to_string(),
            TokenKind::Minus => "'-'".to_string(),
            TokenKind::Star => "'*'".to_string(),
            TokenKind::Slash => "'/'".to_string(),
            TokenKind::FloorDiv => "'//'".to_string(),
            TokenKind::Percent => "'%'".to_string(),
            TokenKind::Pow => "'**'".to_string(),
            TokenKind::Tilde => "'~'".to_string(),
            TokenKind::Eq => "'=='".to_string(),
            TokenKind::Ne => "'!='".to_string(),
            TokenKind::Lt => "'<'".to_string(),
            TokenKind::Le => "'<='".to_string(),
            TokenKind::Gt => "'>'".to_string(),
            TokenKind::Ge => "'>='".to_string(),
            TokenKind::Eof => "end of template".to_string(),
        }
    }
}

/// Whitespace-handling options, taken from the environment settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexerOptions {
    /// Remove the newline immediately after a block or comment tag.
    pub trim_blocks: bool,
    /// Strip leading whitespace from lines containing only a block tag.
    pub lstrip_blocks: bool,
    /// Keep the final trailing newline of the template source.
    pub keep_trailing_newline: bool,
}

/// Pending whitespace adjustment for the next text run.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Pending {
    None,
    /// `-` close marker: strip all leading whitespace.
    TrimAll,
    /// `trim_blocks`: skip one immediately following newline.
    SkipNewline,
}

/// Tokenize a template source.
pub fn tokenize(
    source: &str,
    file: &Arc<str>,
    options: &LexerOptions,
) -> TemplateResult<Vec<Token>> {
    let source = if options.keep_trailing_newline {
        source
    } else {
        strip_final_newline(source)
    };

    let mut lexer = Lexer::new(source, file, options);
    lexer.run()?;
    Ok(lexer.tokens)
}

fn strip_final_newline(source: &str) -> &str {
    source
        .strip_suffix("\r\n")
        .or_else(|| source.strip_suffix('\n'))
        .unwrap_or(source)
}

struct Lexer<'s> {
    source: &'s str,
    file: Arc<str>,
    options: LexerOptions,
    pos: usize,
    tokens: Vec<Token>,
    pending: Pending,
    line_starts: Vec<usize>,
}

impl<'s> Lexer<'s> {
    fn new(source: &'s str, file: &Arc<str>, options: &LexerOptions) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Lexer {
            source,
            file: Arc::clone(file),
            options: *options,
            pos: 0,
            tokens: Vec::new(),
            pending: Pending::None,
            line_starts,
        }
    }

    fn loc(&self, offset: usize) -> Location {
        let offset = offset.min(self.source.len());
        let row = match self.line_starts.binary_search(&offset) {
            Ok(row) => row,
            Err(row) => row - 1,
        };
        let line_start = self.line_starts[row];
        Location {
            offset,
            row,
            column: self.source[line_start..offset].chars().count(),
        }
    }

    fn range(&self, start: usize, end: usize) -> Range {
        Range {
            start: self.loc(start),
            end: self.loc(end),
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize, end: usize) {
        let range = self.range(start, end);
        self.tokens.push(Token { kind, range });
    }

    fn error(&self, kind: SyntaxErrorKind, start: usize, end: usize) -> Error {
        Error::new(ErrorKind::Syntax(kind)).at(&self.file, &self.range(start, end))
    }

    fn run(&mut self) -> TemplateResult<()> {
        while self.pos < self.source.len() {
            match self.find_open_delimiter() {
                Some((open_at, kind_char)) => {
                    self.emit_text(self.pos, open_at, kind_char)?;
                    self.lex_tag(open_at, kind_char)?;
                }
                None => {
                    let end = self.source.len();
                    self.emit_trailing_text(self.pos, end);
                    self.pos = end;
                }
            }
        }
        let end = self.source.len();
        self.push(TokenKind::Eof, end, end);
        Ok(())
    }

    /// Find the next `{{`, `{%` or `{#` at or after the current position.
    fn find_open_delimiter(&self) -> Option<(usize, u8)> {
        let bytes = self.source.as_bytes();
        let mut i = self.pos;
        while i + 1 < bytes.len() {
            if bytes[i] == b'{' {
                match bytes[i + 1] {
                    b'{' | b'%' | b'#' => return Some((i, bytes[i + 1])),
                    _ => {}
                }
            }
            i += 1;
        }
        None
    }

    /// Emit the text run preceding a tag opener at `open_at`.
    fn emit_text(&mut self, start: usize, open_at: usize, kind_char: u8) -> TemplateResult<()> {
        let marker = self.source.as_bytes().get(open_at + 2).copied();
        let mut text = &self.source[start..open_at];

        if marker == Some(b'-') {
            text = text.trim_end();
        } else if self.options.lstrip_blocks
            && marker != Some(b'+')
            && (kind_char == b'%' || kind_char == b'#')
        {
            text = lstrip_block_line(text, start == 0);
        }

        let text = self.apply_pending(text);
        if !text.is_empty() {
            self.push(TokenKind::Text(text), start, open_at);
        }
        Ok(())
    }

    fn emit_trailing_text(&mut self, start: usize, end: usize) {
        let text = self.apply_pending(&self.source[start..end]);
        if !text.is_empty() {
            self.push(TokenKind::Text(text), start, end);
        }
    }

    /// Apply the trim pending from the previous tag close.
    fn apply_pending(&mut self, text: &str) -> String {
        let out = match self.pending {
            Pending::None => text.to_string(),
            Pending::TrimAll => text.trim_start().to_string(),
            Pending::SkipNewline => text
                .strip_prefix("\r\n")
                .or_else(|| text.strip_prefix('\n'))
                .unwrap_or(text)
                .to_string(),
        };
        self.pending = Pending::None;
        out
    }

    /// Record the whitespace effect of a closing delimiter.
    fn set_pending(&mut self, close_marker: Option<u8>, block_like: bool) {
        self.pending = match close_marker {
            Some(b'-') => Pending::TrimAll,
            Some(b'+') => Pending::None,
            _ if block_like && self.options.trim_blocks => Pending::SkipNewline,
            _ => Pending::None,
        };
    }

    /// Lex one tag region starting at `open_at`.
    fn lex_tag(&mut self, open_at: usize, kind_char: u8) -> TemplateResult<()> {
        // Skip the delimiter and an optional whitespace-control marker.
        self.pos = open_at + 2;
        if matches!(
            self.source.as_bytes().get(self.pos),
            Some(b'-') | Some(b'+')
        ) {
            self.pos += 1;
        }

        match kind_char {
            b'#' => self.lex_comment(open_at),
            b'{' => {
                self.push(TokenKind::VariableBegin, open_at, open_at + 2);
                let (tokens, close_marker) = self.lex_tag_tokens(open_at, "}}")?;
                self.tokens.extend(tokens);
                let end = self.pos;
                self.push(TokenKind::VariableEnd, end - 2, end);
                self.set_pending(close_marker, false);
                Ok(())
            }
            _ => {
                let (tokens, close_marker) = self.lex_tag_tokens(open_at, "%}")?;
                if let [Token {
                    kind: TokenKind::Ident(name),
                    ..
                }] = tokens.as_slice()
                {
                    if name == "raw" {
                        return self.lex_raw_body(open_at, close_marker);
                    }
                }
                self.push(TokenKind::BlockBegin, open_at, open_at + 2);
                self.tokens.extend(tokens);
                let end = self.pos;
                self.push(TokenKind::BlockEnd, end - 2, end);
                self.set_pending(close_marker, true);
                Ok(())
            }
        }
    }

    /// Discard a `{# ... #}` region.
    fn lex_comment(&mut self, open_at: usize) -> TemplateResult<()> {
        match self.source[self.pos..].find("#}") {
            Some(found) => {
                let close = self.pos + found;
                let marker = if close > self.pos {
                    match self.source.as_bytes()[close - 1] {
                        m @ (b'-' | b'+') => Some(m),
                        _ => None,
                    }
                } else {
                    None
                };
                self.pos = close + 2;
                self.set_pending(marker, true);
                Ok(())
            }
            None => Err(self.error(
                SyntaxErrorKind::UnterminatedTag,
                open_at,
                self.source.len(),
            )),
        }
    }

    /// Tokenize the inside of a tag region until the closing delimiter.
    ///
    /// Returns the inner tokens and the whitespace-control marker found on
    /// the close, if any. Bracket depth is tracked so a `}` that closes a
    /// dict literal is not mistaken for the start of `}}`.
    fn lex_tag_tokens(
        &mut self,
        open_at: usize,
        close: &str,
    ) -> TemplateResult<(Vec<Token>, Option<u8>)> {
        let mut tokens = Vec::new();
        let mut depth = 0usize;

        loop {
            self.skip_tag_whitespace();
            let rest = &self.source[self.pos..];
            if rest.is_empty() {
                return Err(self.error(
                    SyntaxErrorKind::UnterminatedTag,
                    open_at,
                    self.source.len(),
                ));
            }

            if depth == 0 {
                if rest.starts_with(close) {
                    self.pos += close.len();
                    return Ok((tokens, None));
                }
                if (rest.starts_with('-') || rest.starts_with('+')) && rest[1..].starts_with(close)
                {
                    let marker = rest.as_bytes()[0];
                    self.pos += 1 + close.len();
                    return Ok((tokens, Some(marker)));
                }
            }

            let token = self.lex_one_token()?;
            match token.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1)
                }
                _ => {}
            }
            tokens.push(token);
        }
    }

    fn skip_tag_whitespace(&mut self) {
        while let Some(ch) = self.source[self.pos..].chars().next() {
            if ch.is_whitespace() {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
    }

    fn lex_one_token(&mut self) -> TemplateResult<Token> {
        let start = self.pos;
        let rest = &self.source[start..];
        let Some(ch) = rest.chars().next() else {
            return Err(self.error(SyntaxErrorKind::UnterminatedTag, start, self.source.len()));
        };

        if ch.is_ascii_alphabetic() || ch == '_' {
            return Ok(self.lex_ident(start));
        }
        if ch.is_ascii_digit() {
            return self.lex_number(start);
        }
        if ch == '\'' || ch == '"' {
            return self.lex_string(start, ch);
        }

        // Multi-character operators first.
        for (text, kind) in [
            ("**", TokenKind::Pow),
            ("//", TokenKind::FloorDiv),
            ("==", TokenKind::Eq),
            ("!=", TokenKind::Ne),
            ("<=", TokenKind::Le),
            (">=", TokenKind::Ge),
        ] {
            if rest.starts_with(text) {
                self.pos += 2;
                return Ok(Token {
                    kind,
                    range: self.range(start, self.pos),
                });
            }
        }

        let kind = match ch {
            '|' => TokenKind::Pipe,
            '.' => TokenKind::Dot,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '=' => TokenKind::Assign,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '~' => TokenKind::Tilde,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            _ => {
                return Err(self.error(
                    SyntaxErrorKind::UnexpectedCharacter(ch),
                    start,
                    start + ch.len_utf8(),
                ));
            }
        };
        self.pos += ch.len_utf8();
        Ok(Token {
            kind,
            range: self.range(start, self.pos),
        })
    }

    fn lex_ident(&mut self, start: usize) -> Token {
        let mut end = start;
        for ch in self.source[start..].chars() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                end += ch.len_utf8();
            } else {
                break;
            }
        }
        self.pos = end;
        Token {
            kind: TokenKind::Ident(self.source[start..end].to_string()),
            range: self.range(start, end),
        }
    }

    fn lex_number(&mut self, start: usize) -> TemplateResult<Token> {
        let bytes = self.source.as_bytes();
        let mut end = start;
        let mut is_float = false;

        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        if end < bytes.len()
            && bytes[end] == b'.'
            && bytes.get(end + 1).is_some_and(|b| b.is_ascii_digit())
        {
            is_float = true;
            end += 1;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
        if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
            let mut exp_end = end + 1;
            if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
                exp_end += 1;
            }
            if exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
                is_float = true;
                end = exp_end;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
            }
        }

        let text = &self.source[start..end];
        self.pos = end;
        let kind = if is_float {
            TokenKind::Float(text.parse::<f64>().unwrap_or(0.0))
        } else {
            match text.parse::<i64>() {
                Ok(n) => TokenKind::Int(n),
                // Out of i64 range: fall back to a double.
                Err(_) => TokenKind::Float(text.parse::<f64>().unwrap_or(0.0)),
            }
        };
        Ok(Token {
            kind,
            range: self.range(start, end),
        })
    }

    fn lex_string(&mut self, start: usize, quote: char) -> TemplateResult<Token> {
        let mut text = String::new();
        let mut chars = self.source[start + quote.len_utf8()..].char_indices();
        let base = start + quote.len_utf8();

        while let Some((i, ch)) = chars.next() {
            if ch == quote {
                self.pos = base + i + ch.len_utf8();
                return Ok(Token {
                    kind: TokenKind::Str(text),
                    range: self.range(start, self.pos),
                });
            }
            if ch == '\\' {
                match chars.next() {
                    Some((_, 'n')) => text.push('\n'),
                    Some((_, 'r')) => text.push('\r'),
                    Some((_, 't')) => text.push('\t'),
                    Some((_, '0')) => text.push('\0'),
                    Some((_, '\\')) => text.push('\\'),
                    Some((_, '\'')) => text.push('\''),
                    Some((_, '"')) => text.push('"'),
                    Some((j, other)) => {
                        let at = base + j;
                        return Err(self.error(
                            SyntaxErrorKind::UnknownEscape(other),
                            at,
                            at + other.len_utf8(),
                        ));
                    }
                    None => break,
                }
            } else {
                text.push(ch);
            }
        }

        Err(self.error(SyntaxErrorKind::UnterminatedString, start, self.source.len()))
    }

    /// Scan the verbatim body of a `{% raw %}` block up to `{% endraw %}`.
    fn lex_raw_body(&mut self, open_at: usize, open_close_marker: Option<u8>) -> TemplateResult<()> {
        let body_start = self.pos;
        let mut search = body_start;

        while let Some(found) = self.source[search..].find("{%") {
            let tag_at = search + found;
            if let Some((end_pos, open_marker, close_marker)) = self.match_endraw(tag_at) {
                let mut body = &self.source[body_start..tag_at];
                if open_close_marker == Some(b'-') {
                    body = body.trim_start();
                } else if open_close_marker != Some(b'+') && self.options.trim_blocks {
                    body = body
                        .strip_prefix("\r\n")
                        .or_else(|| body.strip_prefix('\n'))
                        .unwrap_or(body);
                }
                if open_marker == Some(b'-') {
                    body = body.trim_end();
                }
                if !body.is_empty() {
                    let body = body.to_string();
                    self.push(TokenKind::RawText(body), body_start, tag_at);
                }
                self.pos = end_pos;
                self.set_pending(close_marker, true);
                return Ok(());
            }
            search = tag_at + 2;
        }

        Err(self.error(
            SyntaxErrorKind::Expected {
                expected: "endraw".to_string(),
                found: "end of template".to_string(),
            },
            open_at,
            self.source.len(),
        ))
    }

    /// Try to match `{%[-+]? endraw [-+]?%}` at `tag_at`.
    fn match_endraw(&self, tag_at: usize) -> Option<(usize, Option<u8>, Option<u8>)> {
        let bytes = self.source.as_bytes();
        let mut i = tag_at + 2;

        let open_marker = match bytes.get(i) {
            Some(m @ (b'-' | b'+')) => {
                i += 1;
                Some(*m)
            }
            _ => None,
        };
        while bytes.get(i).is_some_and(|b| b.is_ascii_whitespace()) {
            i += 1;
        }
        if !self.source[i..].starts_with("endraw") {
            return None;
        }
        i += "endraw".len();
        while bytes.get(i).is_some_and(|b| b.is_ascii_whitespace()) {
            i += 1;
        }
        let close_marker = match bytes.get(i) {
            Some(m @ (b'-' | b'+')) => {
                i += 1;
                Some(*m)
            }
            _ => None,
        };
        if !self.source[i..].starts_with("%}") {
            return None;
        }
        Some((i + 2, open_marker, close_marker))
    }
}

/// Strip the whitespace prefix of the tag's own line, per `lstrip_blocks`.
fn lstrip_block_line(text: &str, at_template_start: bool) -> &str {
    match text.rfind('\n') {
        Some(nl) => {
            if text[nl + 1..].bytes().all(|b| b == b' ' || b == b'\t') {
                &text[..nl + 1]
            } else {
                text
            }
        }
        None => {
            if at_template_start && text.bytes().all(|b| b == b' ' || b == b'\t') {
                ""
            } else {
                text
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<TokenKind> {
        let file: Arc<str> = Arc::from("<test>");
        tokenize(source, &file, &LexerOptions::default())
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn lex_with(source: &str, options: LexerOptions) -> Vec<TokenKind> {
        let file: Arc<str> = Arc::from("<test>");
        tokenize(source, &file, &options)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn lex_err(source: &str) -> Error {
        let file: Arc<str> = Arc::from("<test>");
        tokenize(source, &file, &LexerOptions::default()).unwrap_err()
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(
            lex("Hello, World!"),
            vec![TokenKind::Text("Hello, World!".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_variable_tag() {
        assert_eq!(
            lex("Hello {{ name }}!"),
            vec![
                TokenKind::Text("Hello ".into()),
                TokenKind::VariableBegin,
                TokenKind::Ident("name".into()),
                TokenKind::VariableEnd,
                TokenKind::Text("!".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_expression_tokens() {
        assert_eq!(
            lex("{{ a.b[0] | join(', ') ~ 1.5 ** 2 }}"),
            vec![
                TokenKind::VariableBegin,
                TokenKind::Ident("a".into()),
                TokenKind::Dot,
                TokenKind::Ident("b".into()),
                TokenKind::LBracket,
                TokenKind::Int(0),
                TokenKind::RBracket,
                TokenKind::Pipe,
                TokenKind::Ident("join".into()),
                TokenKind::LParen,
                TokenKind::Str(", ".into()),
                TokenKind::RParen,
                TokenKind::Tilde,
                TokenKind::Float(1.5),
                TokenKind::Pow,
                TokenKind::Int(2),
                TokenKind::VariableEnd,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            lex(r#"{{ "a\n\t\"b" }}"#),
            vec![
                TokenKind::VariableBegin,
                TokenKind::Str("a\n\t\"b".into()),
                TokenKind::VariableEnd,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unknown_escape() {
        let err = lex_err(r#"{{ "a\q" }}"#);
        assert_eq!(
            err.kind,
            ErrorKind::Syntax(SyntaxErrorKind::UnknownEscape('q'))
        );
    }

    #[test]
    fn test_unterminated_string() {
        let err = lex_err("{{ 'open }}");
        assert_eq!(
            err.kind,
            ErrorKind::Syntax(SyntaxErrorKind::UnterminatedString)
        );
    }

    #[test]
    fn test_unterminated_tag() {
        let err = lex_err("text {{ name");
        assert_eq!(
            err.kind,
            ErrorKind::Syntax(SyntaxErrorKind::UnterminatedTag)
        );
        assert_eq!(err.location.line, 1);
        assert_eq!(err.location.column, 6);
    }

    #[test]
    fn test_comment_discarded() {
        assert_eq!(
            lex("a{# note #}b"),
            vec![
                TokenKind::Text("a".into()),
                TokenKind::Text("b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_dict_braces_do_not_close_tag() {
        assert_eq!(
            lex("{{ {'a': 1} }}"),
            vec![
                TokenKind::VariableBegin,
                TokenKind::LBrace,
                TokenKind::Str("a".into()),
                TokenKind::Colon,
                TokenKind::Int(1),
                TokenKind::RBrace,
                TokenKind::VariableEnd,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_whitespace_control_markers() {
        assert_eq!(
            lex("a   {{- 1 -}}   b"),
            vec![
                TokenKind::Text("a".into()),
                TokenKind::VariableBegin,
                TokenKind::Int(1),
                TokenKind::VariableEnd,
                TokenKind::Text("b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_trim_blocks() {
        let options = LexerOptions {
            trim_blocks: true,
            ..Default::default()
        };
        assert_eq!(
            lex_with("{% if x %}\ncontent\n{% endif %}\n", options),
            vec![
                TokenKind::BlockBegin,
                TokenKind::Ident("if".into()),
                TokenKind::Ident("x".into()),
                TokenKind::BlockEnd,
                TokenKind::Text("content\n".into()),
                TokenKind::BlockBegin,
                TokenKind::Ident("endif".into()),
                TokenKind::BlockEnd,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lstrip_blocks() {
        let options = LexerOptions {
            lstrip_blocks: true,
            ..Default::default()
        };
        assert_eq!(
            lex_with("x\n   {% if y %}{% endif %}", options),
            vec![
                TokenKind::Text("x\n".into()),
                TokenKind::BlockBegin,
                TokenKind::Ident("if".into()),
                TokenKind::Ident("y".into()),
                TokenKind::BlockEnd,
                TokenKind::BlockBegin,
                TokenKind::Ident("endif".into()),
                TokenKind::BlockEnd,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keep_trailing_newline_off_by_default() {
        assert_eq!(
            lex("line\n"),
            vec![TokenKind::Text("line".into()), TokenKind::Eof]
        );
        let options = LexerOptions {
            keep_trailing_newline: true,
            ..Default::default()
        };
        assert_eq!(
            lex_with("line\n", options),
            vec![TokenKind::Text("line\n".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_raw_block() {
        assert_eq!(
            lex("a{% raw %}{{ not lexed }}{% endraw %}b"),
            vec![
                TokenKind::Text("a".into()),
                TokenKind::RawText("{{ not lexed }}".into()),
                TokenKind::Text("b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_raw_block_unterminated() {
        let err = lex_err("{% raw %}body");
        assert!(matches!(
            err.kind,
            ErrorKind::Syntax(SyntaxErrorKind::Expected { .. })
        ));
    }

    #[test]
    fn test_large_integer_falls_back_to_float() {
        let kinds = lex("{{ 99999999999999999999 }}");
        assert!(matches!(kinds[1], TokenKind::Float(_)));
    }

    #[test]
    fn test_token_ranges() {
        let file: Arc<str> = Arc::from("<test>");
        let tokens = tokenize("ab\n{{ cd }}", &file, &LexerOptions::default()).unwrap();
        // The identifier token sits on line 2.
        let ident = tokens
            .iter()
            .find(|t| matches!(t.kind, TokenKind::Ident(_)))
            .unwrap();
        assert_eq!(ident.range.start.row, 1);
        assert_eq!(ident.range.start.column, 3);
    }
}
