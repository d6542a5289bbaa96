/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Jinja2-compatible text template engine.
//!
//! This crate implements the core of a Jinja2 2.x compatible template
//! engine: a hand-written two-mode lexer and precedence-climbing
//! expression parser, a value model that uniformly represents scalars,
//! collections, host-backed lazy containers and callables, and a
//! renderer with scoped name resolution, filters, tests, macros and
//! template inheritance. It supports:
//!
//! - Expression emission: `{{ user.name | upper }}`
//! - Control flow: `{% if %}`/`{% elif %}`/`{% else %}`, `{% for %}`
//!   with the `loop` variable (including `recursive`)
//! - Assignment: `{% set %}` in expression and block-capture form
//! - Inheritance: `{% extends %}`, `{% block %}`, `super()`
//! - Composition: `{% include %}`, `{% import %}`, `{% from %}`
//! - Callables: `{% macro %}`, `{% call %}`, host functions
//! - `{% filter %}`, `{% with %}`, `{% raw %}`, `{% do %}`, comments
//! - Whitespace control (`{%-`/`-%}`, `trim_blocks`, `lstrip_blocks`)
//! - Autoescaping with `safe` marking
//!
//! # Architecture
//!
//! [`Environment`] holds settings, the filter/test/global registries,
//! the loader and the compiled-template cache; it is shared across
//! concurrent renders. [`Template`] is a render handle over an immutable
//! compiled template. Host data enters through [`Value`]; lazy host
//! containers implement [`SequenceAccessor`] / [`MappingAccessor`], and
//! host functions implement callables via [`Callable::host`].
//!
//! # Example
//!
//! ```rust
//! use ginger::{Environment, Value, ValueMap};
//!
//! let env = Environment::new();
//! let template = env.template_from_str("Hello {{ name }}!", "greeting")?;
//!
//! let mut params = ValueMap::new();
//! params.insert("name".to_string(), Value::from("World"));
//!
//! assert_eq!(template.render(params)?, "Hello World!");
//! # Ok::<(), ginger::Error>(())
//! ```

pub mod ast;
pub mod callable;
pub mod context;
pub mod environment;
pub mod error;
pub mod from_json;
pub mod lexer;
pub mod loader;
pub mod output;
pub mod parser;
pub mod value;

mod eval;
mod filters;
mod renderer;
mod tests_builtin;

// Re-export main types at crate root
pub use callable::{bind_args, bind_args_with_defaults, ArgSpec, BoundArgs, CallParams, Callable};
pub use context::ScopeStack;
pub use environment::{AutoEscape, CompiledTemplate, Environment, Settings, Template};
pub use error::{Error, ErrorKind, ErrorLocation, SyntaxErrorKind, TemplateResult};
pub use from_json::{from_json_str, params_from_json, to_json_string, value_from_json, value_to_json};
pub use loader::{FileSystemLoader, MemoryLoader, NullLoader, TemplateLoader, TemplateSource};
pub use output::{html_escape, NullSink, RenderSink, StringSink};
pub use parser::{parse, ParsedTemplate};
pub use value::{
    compare_values, DynList, DynMap, MappingAccessor, SequenceAccessor, StrKind, Value, ValueList,
    ValueMap,
};
