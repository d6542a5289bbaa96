/*
 * ast.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template AST types.
//!
//! Two separate trees: renderer [`Node`]s (text runs, emission, statements
//! with child bodies) and expression trees ([`Expr`]). Every node and
//! expression carries its source [`Range`] for error reporting.
//!
//! Statement bodies that can escape into values (`for ... recursive`,
//! `macro`, `call`, `block`) are `Arc`-wrapped so template-defined
//! callables can share them without cloning the subtree.

use std::sync::Arc;

use ginger_source_map::Range;

use crate::value::Value;

/// A node in the renderer tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text, output as-is.
    Text(TextRun),

    /// Expression emission: `{{ expr }}`
    Emit(EmitStmt),

    /// Conditional: `{% if %}...{% elif %}...{% else %}...{% endif %}`
    If(IfStmt),

    /// Loop: `{% for x in expr %}...{% else %}...{% endfor %}`
    For(Arc<ForStmt>),

    /// Assignment: `{% set name = expr %}` or block-capture form.
    Set(SetStmt),

    /// Named overridable region: `{% block name %}...{% endblock %}`
    Block(Arc<BlockStmt>),

    /// Inheritance declaration: `{% extends expr %}`
    Extends(ExtendsStmt),

    /// Sub-template rendering: `{% include expr %}`
    Include(IncludeStmt),

    /// Namespace import: `{% import expr as name %}`
    Import(ImportStmt),

    /// Selective import: `{% from expr import a, b as c %}`
    FromImport(FromImportStmt),

    /// Macro definition: `{% macro name(args) %}...{% endmacro %}`
    Macro(Arc<MacroDecl>),

    /// Call block: `{% call name(args) %}body{% endcall %}`
    Call(Arc<CallStmt>),

    /// Filtered body: `{% filter name %}...{% endfilter %}`
    FilterBlock(FilterBlockStmt),

    /// Scoped bindings: `{% with a = 1 %}...{% endwith %}`
    With(WithStmt),

    /// Verbatim region: `{% raw %}...{% endraw %}`
    Raw(TextRun),

    /// Side-effect evaluation: `{% do expr %}`
    Do(DoStmt),
}

impl Node {
    /// Source location of this node.
    pub fn range(&self) -> Range {
        match self {
            Node::Text(n) => n.range,
            Node::Emit(n) => n.range,
            Node::If(n) => n.range,
            Node::For(n) => n.range,
            Node::Set(n) => n.range,
            Node::Block(n) => n.range,
            Node::Extends(n) => n.range,
            Node::Include(n) => n.range,
            Node::Import(n) => n.range,
            Node::FromImport(n) => n.range,
            Node::Macro(n) => n.range,
            Node::Call(n) => n.range,
            Node::FilterBlock(n) => n.range,
            Node::With(n) => n.range,
            Node::Raw(n) => n.range,
            Node::Do(n) => n.range,
        }
    }
}

/// Literal text node.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub range: Range,
}

/// Expression emission node.
#[derive(Debug, Clone, PartialEq)]
pub struct EmitStmt {
    pub expr: Expr,
    pub range: Range,
}

/// Conditional with zero or more `elif` branches and an optional `else`.
#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    /// (condition, body) pairs for the if/elif branches, in source order.
    pub branches: Vec<(Expr, Vec<Node>)>,
    pub else_body: Option<Vec<Node>>,
    pub range: Range,
}

/// Loop statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ForStmt {
    /// Loop variable name(s); more than one unpacks each item.
    pub targets: Vec<String>,
    /// The iterable expression.
    pub iter: Expr,
    /// Optional inline filter: `for x in xs if cond`.
    pub cond: Option<Expr>,
    /// Whether the body may re-enter itself through `loop(subseq)`.
    pub recursive: bool,
    pub body: Vec<Node>,
    /// Runs iff the (filtered) iterable produced no items.
    pub else_body: Vec<Node>,
    pub range: Range,
}

/// Assignment statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SetStmt {
    /// Target name(s); more than one unpacks the value.
    pub targets: Vec<String>,
    pub source: SetSource,
    pub range: Range,
}

/// The right-hand side of a `set` statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SetSource {
    /// `{% set name = expr %}`
    Expr(Expr),
    /// `{% set name %}body{% endset %}` captures the rendered body text.
    Capture(Vec<Node>),
}

/// Named block for inheritance.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockStmt {
    pub name: String,
    pub body: Vec<Node>,
    pub range: Range,
}

/// Inheritance declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendsStmt {
    pub name: Expr,
    pub range: Range,
}

/// Sub-template inclusion.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeStmt {
    pub name: Expr,
    /// `ignore missing`: a missing template renders nothing.
    pub ignore_missing: bool,
    /// `with context` (default) shares the caller's scopes.
    pub with_context: bool,
    pub range: Range,
}

/// Namespace import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportStmt {
    pub name: Expr,
    pub alias: String,
    pub with_context: bool,
    pub range: Range,
}

/// Selective import of exported names.
#[derive(Debug, Clone, PartialEq)]
pub struct FromImportStmt {
    pub name: Expr,
    /// (exported name, optional alias) pairs.
    pub names: Vec<(String, Option<String>)>,
    pub with_context: bool,
    pub range: Range,
}

/// Macro definition.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroDecl {
    pub name: String,
    pub params: Vec<MacroParam>,
    pub body: Vec<Node>,
    pub range: Range,
}

/// One macro parameter, with its default expression when optional.
///
/// Defaults are re-evaluated per call.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroParam {
    pub name: String,
    pub default: Option<Expr>,
}

/// Call block: invokes a macro with the body available as `caller()`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallStmt {
    /// Parameters the macro passes back through `caller(...)`.
    pub params: Vec<MacroParam>,
    /// The macro invocation expression.
    pub target: Expr,
    pub body: Vec<Node>,
    pub range: Range,
}

/// Filter applied to a captured body.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterBlockStmt {
    /// The filter pipeline, applied left to right.
    pub filters: Vec<FilterCall>,
    pub body: Vec<Node>,
    pub range: Range,
}

/// One named filter application with optional call arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: CallArgs,
    pub range: Range,
}

/// Scoped local bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct WithStmt {
    pub bindings: Vec<(String, Expr)>,
    pub body: Vec<Node>,
    pub range: Range,
}

/// Side-effect evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct DoStmt {
    pub expr: Expr,
    pub range: Range,
}

/// An expression with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub range: Range,
}

impl Expr {
    pub fn new(kind: ExprKind, range: Range) -> Self {
        Expr { kind, range }
    }
}

/// Expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Literal constant.
    Const(Value),
    /// Name lookup against the scope stack.
    Name(String),
    /// `obj.name`
    Attr { obj: Box<Expr>, name: String },
    /// `obj[index]`
    Subscript { obj: Box<Expr>, index: Box<Expr> },
    /// `obj[start:stop:step]`
    Slice {
        obj: Box<Expr>,
        start: Option<Box<Expr>>,
        stop: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    /// Unary operator application.
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// Binary operator application.
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `(a, b)`
    Tuple(Vec<Expr>),
    /// `[a, b]`
    List(Vec<Expr>),
    /// `{'k': v}`
    Dict(Vec<(Expr, Expr)>),
    /// `callee(args...)`
    Call { callee: Box<Expr>, args: CallArgs },
    /// `expr | name(args...)`
    Filter {
        expr: Box<Expr>,
        name: String,
        args: CallArgs,
    },
    /// `expr is [not] name(args...)`
    Test {
        expr: Box<Expr>,
        name: String,
        args: CallArgs,
        negated: bool,
    },
    /// `a if c else b`
    Conditional {
        then_expr: Box<Expr>,
        cond: Box<Expr>,
        else_expr: Option<Box<Expr>>,
    },
}

/// Call arguments: positional plus named.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallArgs {
    pub pos: Vec<Expr>,
    pub named: Vec<(String, Expr)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    /// `~`: string concatenation after coercion.
    Concat,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}
