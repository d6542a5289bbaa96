/*
 * parser.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template parser.
//!
//! Consumes the lexer's token stream and produces the renderer tree.
//! Statement bodies are delimited by their matching `end*` keyword;
//! mismatched delimiters are fatal. Expressions use precedence climbing
//! with the following levels, loosest first: conditional (`a if c else
//! b`), `or`, `and`, `not`, comparisons/`in`/`is`, `|` filter, `~`,
//! `+`/`-`, `*`/`/`/`//`/`%`, unary, `**`, postfix (`.`, `[]`, `()`).

use std::collections::HashMap;
use std::sync::Arc;

use ginger_source_map::Range;

use crate::ast::{
    BinaryOp, BlockStmt, CallArgs, CallStmt, DoStmt, EmitStmt, Expr, ExprKind, ExtendsStmt,
    FilterBlockStmt, FilterCall, ForStmt, FromImportStmt, IfStmt, ImportStmt, IncludeStmt,
    MacroDecl, MacroParam, Node, SetSource, SetStmt, TextRun, UnaryOp, WithStmt,
};
use crate::error::{Error, ErrorKind, SyntaxErrorKind, TemplateResult};
use crate::lexer::{tokenize, LexerOptions, Token, TokenKind};
use crate::value::Value;

/// Identifiers that can never be plain names in an expression.
const RESERVED: &[&str] = &["and", "or", "not", "in", "is", "if", "else"];

/// The parsed form of one template source.
#[derive(Debug, Clone)]
pub struct ParsedTemplate {
    /// Top-level renderer nodes, in source order.
    pub nodes: Vec<Node>,
    /// Every block defined anywhere in the template, by name.
    pub blocks: HashMap<String, Arc<BlockStmt>>,
    /// The inheritance declaration, when present.
    pub extends: Option<ExtendsStmt>,
}

/// Parse a template source into renderer nodes.
pub fn parse(source: &str, name: &str, options: &LexerOptions) -> TemplateResult<ParsedTemplate> {
    let file: Arc<str> = Arc::from(name);
    let tokens = tokenize(source, &file, options)?;

    let mut parser = Parser {
        tokens,
        pos: 0,
        file,
        blocks: HashMap::new(),
    };
    let (nodes, _) = parser.parse_body(&[])?;
    let extends = parser.validate_extends(&nodes)?;

    Ok(ParsedTemplate {
        nodes,
        blocks: parser.blocks,
        extends,
    })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: Arc<str>,
    blocks: HashMap<String, Arc<BlockStmt>>,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check_ident(&self, name: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(id) if id == name)
    }

    fn eat_ident(&mut self, name: &str) -> bool {
        if self.check_ident(name) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self) -> TemplateResult<(String, Range)> {
        match &self.peek().kind {
            TokenKind::Ident(_) => {
                let token = self.advance();
                match token.kind {
                    TokenKind::Ident(name) => Ok((name, token.range)),
                    _ => unreachable!(),
                }
            }
            _ => Err(self.err_expected("an identifier")),
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> TemplateResult<Range> {
        if self.check_ident(keyword) {
            Ok(self.advance().range)
        } else {
            Err(self.err_expected(&format!("'{}'", keyword)))
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> TemplateResult<Range> {
        if self.peek().kind == kind {
            Ok(self.advance().range)
        } else {
            Err(self.err_expected(&kind.describe()))
        }
    }

    fn err_expected(&self, expected: &str) -> Error {
        let token = self.peek();
        Error::new(ErrorKind::Syntax(SyntaxErrorKind::Expected {
            expected: expected.to_string(),
            found: token.kind.describe(),
        }))
        .at(&self.file, &token.range)
    }

    fn err_unexpected(&self, token: &Token) -> Error {
        Error::new(ErrorKind::Syntax(SyntaxErrorKind::UnexpectedToken(
            token.kind.describe(),
        )))
        .at(&self.file, &token.range)
    }

    /// Parse nodes until one of `terminators` opens a `{% ... %}` tag, or
    /// until end of input when `terminators` is empty. Returns the nodes
    /// and the terminator keyword that was consumed ("" at end of input).
    ///
    /// The terminator's `{%` and keyword are consumed; the caller parses
    /// the rest of that tag.
    fn parse_body(&mut self, terminators: &[&str]) -> TemplateResult<(Vec<Node>, String)> {
        let mut nodes = Vec::new();

        loop {
            let token = self.peek().clone();
            match &token.kind {
                TokenKind::Text(text) => {
                    self.advance();
                    nodes.push(Node::Text(TextRun {
                        text: text.clone(),
                        range: token.range,
                    }));
                }
                TokenKind::RawText(text) => {
                    self.advance();
                    nodes.push(Node::Raw(TextRun {
                        text: text.clone(),
                        range: token.range,
                    }));
                }
                TokenKind::VariableBegin => {
                    self.advance();
                    let expr = self.parse_expression()?;
                    self.expect(TokenKind::VariableEnd)?;
                    nodes.push(Node::Emit(EmitStmt {
                        expr,
                        range: token.range,
                    }));
                }
                TokenKind::BlockBegin => {
                    self.advance();
                    let (keyword, kw_range) = self.expect_ident()?;
                    if terminators.contains(&keyword.as_str()) {
                        return Ok((nodes, keyword));
                    }
                    if keyword.starts_with("end") || keyword == "elif" || keyword == "else" {
                        let expected = if terminators.is_empty() {
                            "a statement keyword".to_string()
                        } else {
                            terminators.join("' or '")
                        };
                        return Err(Error::new(ErrorKind::Syntax(
                            SyntaxErrorKind::MismatchedEnd {
                                expected,
                                found: keyword,
                            },
                        ))
                        .at(&self.file, &kw_range));
                    }
                    nodes.push(self.parse_statement(&keyword, kw_range)?);
                }
                TokenKind::Eof => {
                    if terminators.is_empty() {
                        return Ok((nodes, String::new()));
                    }
                    return Err(self.err_expected(&format!("'{}'", terminators.join("' or '"))));
                }
                _ => return Err(self.err_unexpected(&token)),
            }
        }
    }

    fn parse_statement(&mut self, keyword: &str, range: Range) -> TemplateResult<Node> {
        match keyword {
            "if" => self.parse_if(range),
            "for" => self.parse_for(range),
            "set" => self.parse_set(range),
            "block" => self.parse_block(range),
            "extends" => {
                let name = self.parse_expression()?;
                self.expect(TokenKind::BlockEnd)?;
                Ok(Node::Extends(ExtendsStmt { name, range }))
            }
            "include" => self.parse_include(range),
            "import" => self.parse_import(range),
            "from" => self.parse_from_import(range),
            "macro" => self.parse_macro(range),
            "call" => self.parse_call(range),
            "filter" => self.parse_filter_block(range),
            "with" => self.parse_with(range),
            "do" => {
                let expr = self.parse_expression()?;
                self.expect(TokenKind::BlockEnd)?;
                Ok(Node::Do(DoStmt { expr, range }))
            }
            _ => Err(Error::new(ErrorKind::Syntax(
                SyntaxErrorKind::UnexpectedToken(format!("'{}'", keyword)),
            ))
            .at(&self.file, &range)),
        }
    }

    fn parse_if(&mut self, range: Range) -> TemplateResult<Node> {
        let mut branches = Vec::new();
        let mut else_body = None;

        let mut condition = self.parse_expression()?;
        self.expect(TokenKind::BlockEnd)?;

        loop {
            let (body, terminator) = self.parse_body(&["elif", "else", "endif"])?;
            branches.push((condition.clone(), body));
            match terminator.as_str() {
                "elif" => {
                    condition = self.parse_expression()?;
                    self.expect(TokenKind::BlockEnd)?;
                }
                "else" => {
                    self.expect(TokenKind::BlockEnd)?;
                    let (body, _) = self.parse_body(&["endif"])?;
                    self.expect(TokenKind::BlockEnd)?;
                    else_body = Some(body);
                    break;
                }
                _ => {
                    self.expect(TokenKind::BlockEnd)?;
                    break;
                }
            }
        }

        Ok(Node::If(IfStmt {
            branches,
            else_body,
            range,
        }))
    }

    fn parse_for(&mut self, range: Range) -> TemplateResult<Node> {
        let targets = self.parse_target_names()?;
        self.expect_keyword("in")?;
        // The iterable is parsed without the conditional-expression level
        // so that a following `if` reads as the loop filter.
        let iter = self.parse_or()?;
        let cond = if self.eat_ident("if") {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let recursive = self.eat_ident("recursive");
        self.expect(TokenKind::BlockEnd)?;

        let (body, terminator) = self.parse_body(&["else", "endfor"])?;
        let else_body = if terminator == "else" {
            self.expect(TokenKind::BlockEnd)?;
            let (body, _) = self.parse_body(&["endfor"])?;
            body
        } else {
            Vec::new()
        };
        self.expect(TokenKind::BlockEnd)?;

        Ok(Node::For(Arc::new(ForStmt {
            targets,
            iter,
            cond,
            recursive,
            body,
            else_body,
            range,
        })))
    }

    fn parse_target_names(&mut self) -> TemplateResult<Vec<String>> {
        let mut targets = Vec::new();
        let parenthesized = self.eat(&TokenKind::LParen);

        loop {
            let (name, _) = self.expect_ident()?;
            targets.push(name);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        if parenthesized {
            self.expect(TokenKind::RParen)?;
        }
        Ok(targets)
    }

    fn parse_set(&mut self, range: Range) -> TemplateResult<Node> {
        let targets = self.parse_target_names()?;

        if self.eat(&TokenKind::Assign) {
            let expr = self.parse_expression()?;
            self.expect(TokenKind::BlockEnd)?;
            return Ok(Node::Set(SetStmt {
                targets,
                source: SetSource::Expr(expr),
                range,
            }));
        }

        // Block form: capture the rendered body.
        self.expect(TokenKind::BlockEnd)?;
        let (body, _) = self.parse_body(&["endset"])?;
        self.expect(TokenKind::BlockEnd)?;
        Ok(Node::Set(SetStmt {
            targets,
            source: SetSource::Capture(body),
            range,
        }))
    }

    fn parse_block(&mut self, range: Range) -> TemplateResult<Node> {
        let (name, name_range) = self.expect_ident()?;
        self.expect(TokenKind::BlockEnd)?;
        let (body, _) = self.parse_body(&["endblock"])?;

        // `{% endblock name %}` is allowed; the name must match.
        if let TokenKind::Ident(end_name) = &self.peek().kind {
            let end_name = end_name.clone();
            if end_name != name {
                return Err(Error::new(ErrorKind::Syntax(SyntaxErrorKind::MismatchedEnd {
                    expected: format!("endblock {}", name),
                    found: format!("endblock {}", end_name),
                }))
                .at(&self.file, &self.peek().range));
            }
            self.advance();
        }
        self.expect(TokenKind::BlockEnd)?;

        let block = Arc::new(BlockStmt { name, body, range });
        if self
            .blocks
            .insert(block.name.clone(), Arc::clone(&block))
            .is_some()
        {
            return Err(Error::new(ErrorKind::BlockRedefined)
                .at(&self.file, &name_range)
                .with_extra(block.name.as_str()));
        }
        Ok(Node::Block(block))
    }

    fn parse_include(&mut self, range: Range) -> TemplateResult<Node> {
        let name = self.parse_expression()?;
        let mut ignore_missing = false;
        if self.eat_ident("ignore") {
            self.expect_keyword("missing")?;
            ignore_missing = true;
        }
        let with_context = self.parse_context_modifier(true)?;
        self.expect(TokenKind::BlockEnd)?;
        Ok(Node::Include(IncludeStmt {
            name,
            ignore_missing,
            with_context,
            range,
        }))
    }

    fn parse_import(&mut self, range: Range) -> TemplateResult<Node> {
        let name = self.parse_expression()?;
        self.expect_keyword("as")?;
        let (alias, _) = self.expect_ident()?;
        let with_context = self.parse_context_modifier(false)?;
        self.expect(TokenKind::BlockEnd)?;
        Ok(Node::Import(ImportStmt {
            name,
            alias,
            with_context,
            range,
        }))
    }

    fn parse_from_import(&mut self, range: Range) -> TemplateResult<Node> {
        let name = self.parse_expression()?;
        self.expect_keyword("import")?;

        let mut names = Vec::new();
        loop {
            let (imported, _) = self.expect_ident()?;
            // `with`/`without` end the name list when they introduce a
            // context modifier.
            if (imported == "with" || imported == "without") && self.check_ident("context") {
                self.advance();
                self.expect(TokenKind::BlockEnd)?;
                return Ok(Node::FromImport(FromImportStmt {
                    name,
                    names,
                    with_context: imported == "with",
                    range,
                }));
            }
            let alias = if self.eat_ident("as") {
                Some(self.expect_ident()?.0)
            } else {
                None
            };
            names.push((imported, alias));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        let with_context = self.parse_context_modifier(false)?;
        self.expect(TokenKind::BlockEnd)?;
        Ok(Node::FromImport(FromImportStmt {
            name,
            names,
            with_context,
            range,
        }))
    }

    /// Parse an optional `with context` / `without context` suffix.
    fn parse_context_modifier(&mut self, default: bool) -> TemplateResult<bool> {
        if self.eat_ident("with") {
            self.expect_keyword("context")?;
            Ok(true)
        } else if self.eat_ident("without") {
            self.expect_keyword("context")?;
            Ok(false)
        } else {
            Ok(default)
        }
    }

    fn parse_macro(&mut self, range: Range) -> TemplateResult<Node> {
        let (name, _) = self.expect_ident()?;
        self.expect(TokenKind::LParen)?;
        let params = self.parse_macro_params()?;
        self.expect(TokenKind::BlockEnd)?;
        let (body, _) = self.parse_body(&["endmacro"])?;
        self.expect(TokenKind::BlockEnd)?;
        Ok(Node::Macro(Arc::new(MacroDecl {
            name,
            params,
            body,
            range,
        })))
    }

    /// Parse `name [= default], ...` up to and including the `)`.
    fn parse_macro_params(&mut self) -> TemplateResult<Vec<MacroParam>> {
        let mut params = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            let (name, _) = self.expect_ident()?;
            let default = if self.eat(&TokenKind::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            params.push(MacroParam { name, default });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_call(&mut self, range: Range) -> TemplateResult<Node> {
        // `{% call(a, b) macro(...) %}` passes parameters to `caller()`.
        let params = if self.eat(&TokenKind::LParen) {
            self.parse_macro_params()?
        } else {
            Vec::new()
        };
        let target = self.parse_expression()?;
        self.expect(TokenKind::BlockEnd)?;
        let (body, _) = self.parse_body(&["endcall"])?;
        self.expect(TokenKind::BlockEnd)?;
        Ok(Node::Call(Arc::new(CallStmt {
            params,
            target,
            body,
            range,
        })))
    }

    fn parse_filter_block(&mut self, range: Range) -> TemplateResult<Node> {
        let mut filters = Vec::new();
        loop {
            let (name, name_range) = self.expect_ident()?;
            let args = if self.eat(&TokenKind::LParen) {
                self.parse_call_args()?
            } else {
                CallArgs::default()
            };
            filters.push(FilterCall {
                name,
                args,
                range: name_range,
            });
            if !self.eat(&TokenKind::Pipe) {
                break;
            }
        }
        self.expect(TokenKind::BlockEnd)?;
        let (body, _) = self.parse_body(&["endfilter"])?;
        self.expect(TokenKind::BlockEnd)?;
        Ok(Node::FilterBlock(FilterBlockStmt {
            filters,
            body,
            range,
        }))
    }

    fn parse_with(&mut self, range: Range) -> TemplateResult<Node> {
        let mut bindings = Vec::new();
        while !matches!(self.peek().kind, TokenKind::BlockEnd) {
            let (name, _) = self.expect_ident()?;
            self.expect(TokenKind::Assign)?;
            bindings.push((name, self.parse_expression()?));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::BlockEnd)?;
        let (body, _) = self.parse_body(&["endwith"])?;
        self.expect(TokenKind::BlockEnd)?;
        Ok(Node::With(WithStmt {
            bindings,
            body,
            range,
        }))
    }

    /// Ensure `extends` appears at most once and only before content.
    fn validate_extends(&self, nodes: &[Node]) -> TemplateResult<Option<ExtendsStmt>> {
        let mut extends: Option<ExtendsStmt> = None;
        let mut content_seen = false;

        for node in nodes {
            match node {
                Node::Extends(stmt) => {
                    if content_seen || extends.is_some() {
                        return Err(Error::new(ErrorKind::ExtendsAfterContent)
                            .at(&self.file, &stmt.range));
                    }
                    extends = Some(stmt.clone());
                }
                Node::Text(run) if run.text.trim().is_empty() => {}
                _ => content_seen = true,
            }
        }
        Ok(extends)
    }

    // ── Expressions ─────────────────────────────────────────────────

    /// Full expression grammar, including `a if c else b`.
    fn parse_expression(&mut self) -> TemplateResult<Expr> {
        let then_expr = self.parse_or()?;
        if !self.eat_ident("if") {
            return Ok(then_expr);
        }

        let cond = self.parse_or()?;
        let else_expr = if self.eat_ident("else") {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        let range = then_expr.range;
        Ok(Expr::new(
            ExprKind::Conditional {
                then_expr: Box::new(then_expr),
                cond: Box::new(cond),
                else_expr,
            },
            range,
        ))
    }

    fn parse_or(&mut self) -> TemplateResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat_ident("or") {
            let rhs = self.parse_and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> TemplateResult<Expr> {
        let mut lhs = self.parse_not()?;
        while self.eat_ident("and") {
            let rhs = self.parse_not()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> TemplateResult<Expr> {
        if self.check_ident("not") {
            let range = self.advance().range;
            let operand = self.parse_not()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                range,
            ));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> TemplateResult<Expr> {
        let mut lhs = self.parse_filter_level()?;

        loop {
            let op = match &self.peek().kind {
                TokenKind::Eq => Some(BinaryOp::Eq),
                TokenKind::Ne => Some(BinaryOp::Ne),
                TokenKind::Lt => Some(BinaryOp::Lt),
                TokenKind::Le => Some(BinaryOp::Le),
                TokenKind::Gt => Some(BinaryOp::Gt),
                TokenKind::Ge => Some(BinaryOp::Ge),
                TokenKind::Ident(id) if id == "in" => Some(BinaryOp::In),
                _ => None,
            };

            if let Some(op) = op {
                self.advance();
                let rhs = self.parse_filter_level()?;
                lhs = binary(op, lhs, rhs);
                continue;
            }

            if self.check_ident("not") && self.peek_second_is_ident("in") {
                self.advance();
                self.advance();
                let rhs = self.parse_filter_level()?;
                lhs = binary(BinaryOp::NotIn, lhs, rhs);
                continue;
            }

            if self.check_ident("is") {
                self.advance();
                lhs = self.parse_test(lhs)?;
                continue;
            }

            return Ok(lhs);
        }
    }

    fn peek_second_is_ident(&self, name: &str) -> bool {
        matches!(
            self.tokens.get(self.pos + 1).map(|t| &t.kind),
            Some(TokenKind::Ident(id)) if id == name
        )
    }

    /// Parse the test after a consumed `is`.
    fn parse_test(&mut self, expr: Expr) -> TemplateResult<Expr> {
        let negated = self.eat_ident("not");
        let (name, name_range) = self.expect_ident()?;

        let args = if self.eat(&TokenKind::LParen) {
            self.parse_call_args()?
        } else {
            // Bare single-argument forms: `x is divisibleby 3`,
            // `x is in [1, 2]`.
            match self.peek().kind.clone() {
                TokenKind::Int(n) => {
                    self.advance();
                    single_const_arg(Value::Int(n), name_range)
                }
                TokenKind::Float(d) => {
                    self.advance();
                    single_const_arg(Value::Double(d), name_range)
                }
                TokenKind::Str(s) => {
                    self.advance();
                    single_const_arg(Value::from(s), name_range)
                }
                TokenKind::LBracket | TokenKind::LBrace => CallArgs {
                    pos: vec![self.parse_primary()?],
                    named: Vec::new(),
                },
                _ => CallArgs::default(),
            }
        };

        let range = expr.range;
        Ok(Expr::new(
            ExprKind::Test {
                expr: Box::new(expr),
                name,
                args,
                negated,
            },
            range,
        ))
    }

    fn parse_filter_level(&mut self) -> TemplateResult<Expr> {
        let mut expr = self.parse_concat()?;
        while self.eat(&TokenKind::Pipe) {
            let (name, name_range) = self.expect_ident()?;
            let args = if self.eat(&TokenKind::LParen) {
                self.parse_call_args()?
            } else {
                CallArgs::default()
            };
            expr = Expr::new(
                ExprKind::Filter {
                    expr: Box::new(expr),
                    name,
                    args,
                },
                name_range,
            );
        }
        Ok(expr)
    }

    fn parse_concat(&mut self) -> TemplateResult<Expr> {
        let mut lhs = self.parse_additive()?;
        while self.eat(&TokenKind::Tilde) {
            let rhs = self.parse_additive()?;
            lhs = binary(BinaryOp::Concat, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> TemplateResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_multiplicative(&mut self) -> TemplateResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::FloorDiv => BinaryOp::FloorDiv,
                TokenKind::Percent => BinaryOp::Mod,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_unary(&mut self) -> TemplateResult<Expr> {
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Pos),
            _ => None,
        };
        if let Some(op) = op {
            let range = self.advance().range;
            let operand = self.parse_unary()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                range,
            ));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> TemplateResult<Expr> {
        let base = self.parse_postfix()?;
        if self.eat(&TokenKind::Pow) {
            // Right-associative; the exponent may carry a unary sign.
            let exponent = self.parse_unary()?;
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> TemplateResult<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.peek().kind {
                TokenKind::Dot => {
                    self.advance();
                    let (name, name_range) = self.expect_ident()?;
                    expr = Expr::new(
                        ExprKind::Attr {
                            obj: Box::new(expr),
                            name,
                        },
                        name_range,
                    );
                }
                TokenKind::LBracket => {
                    let range = self.advance().range;
                    expr = self.parse_subscript_or_slice(expr, range)?;
                }
                TokenKind::LParen => {
                    let range = self.advance().range;
                    let args = self.parse_call_args()?;
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        range,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Parse `[index]` or `[start:stop:step]` after a consumed `[`.
    fn parse_subscript_or_slice(&mut self, obj: Expr, range: Range) -> TemplateResult<Expr> {
        let start = if matches!(self.peek().kind, TokenKind::Colon) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };

        if self.eat(&TokenKind::RBracket) {
            let index = start.ok_or_else(|| self.err_expected("an expression"))?;
            return Ok(Expr::new(
                ExprKind::Subscript {
                    obj: Box::new(obj),
                    index,
                },
                range,
            ));
        }

        self.expect(TokenKind::Colon)?;
        let stop = if matches!(self.peek().kind, TokenKind::Colon | TokenKind::RBracket) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        let step = if self.eat(&TokenKind::Colon) {
            if matches!(self.peek().kind, TokenKind::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_expression()?))
            }
        } else {
            None
        };
        self.expect(TokenKind::RBracket)?;

        Ok(Expr::new(
            ExprKind::Slice {
                obj: Box::new(obj),
                start,
                stop,
                step,
            },
            range,
        ))
    }

    /// Parse call arguments after a consumed `(`, through the `)`.
    fn parse_call_args(&mut self) -> TemplateResult<CallArgs> {
        let mut args = CallArgs::default();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }

        loop {
            // `name=expr` is a named argument; a bare expression is
            // positional.
            if let TokenKind::Ident(name) = &self.peek().kind {
                let name = name.clone();
                if matches!(
                    self.tokens.get(self.pos + 1).map(|t| &t.kind),
                    Some(TokenKind::Assign)
                ) {
                    self.advance();
                    self.advance();
                    args.named.push((name, self.parse_expression()?));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                    continue;
                }
            }
            args.pos.push(self.parse_expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> TemplateResult<Expr> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Int(n) => {
                self.advance();
                Ok(Expr::new(ExprKind::Const(Value::Int(*n)), token.range))
            }
            TokenKind::Float(d) => {
                self.advance();
                Ok(Expr::new(ExprKind::Const(Value::Double(*d)), token.range))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Const(Value::from(s.as_str())),
                    token.range,
                ))
            }
            TokenKind::Ident(name) => match name.as_str() {
                "true" | "True" => {
                    self.advance();
                    Ok(Expr::new(ExprKind::Const(Value::Bool(true)), token.range))
                }
                "false" | "False" => {
                    self.advance();
                    Ok(Expr::new(ExprKind::Const(Value::Bool(false)), token.range))
                }
                "none" | "None" => {
                    self.advance();
                    Ok(Expr::new(ExprKind::Const(Value::Empty), token.range))
                }
                name if RESERVED.contains(&name) => Err(self.err_unexpected(&token)),
                _ => {
                    self.advance();
                    Ok(Expr::new(ExprKind::Name(name.clone()), token.range))
                }
            },
            TokenKind::LParen => {
                self.advance();
                let first = self.parse_expression()?;
                if self.eat(&TokenKind::Comma) {
                    let mut items = vec![first];
                    while !matches!(self.peek().kind, TokenKind::RParen) {
                        items.push(self.parse_expression()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    return Ok(Expr::new(ExprKind::Tuple(items), token.range));
                }
                self.expect(TokenKind::RParen)?;
                Ok(first)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !matches!(self.peek().kind, TokenKind::RBracket) {
                    items.push(self.parse_expression()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket)?;
                Ok(Expr::new(ExprKind::List(items), token.range))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut entries = Vec::new();
                while !matches!(self.peek().kind, TokenKind::RBrace) {
                    let key = self.parse_expression()?;
                    self.expect(TokenKind::Colon)?;
                    let value = self.parse_expression()?;
                    entries.push((key, value));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBrace)?;
                Ok(Expr::new(ExprKind::Dict(entries), token.range))
            }
            _ => Err(self.err_unexpected(&token)),
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let range = lhs.range.merge(&rhs.range);
    Expr::new(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        range,
    )
}

fn single_const_arg(value: Value, range: Range) -> CallArgs {
    CallArgs {
        pos: vec![Expr::new(ExprKind::Const(value), range)],
        named: Vec::new(),
    }
}
