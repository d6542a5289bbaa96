/*
 * environment.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The template environment.
//!
//! An [`Environment`] holds the settings, the filter/test/global
//! registries, the loader, and the compiled-template cache. It is shared
//! across concurrent renders: settings and registries are immutable after
//! setup, and the cache takes a single-writer/multi-reader lock for the
//! rare insert. Compiled templates are immutable once parsed and shared
//! through `Arc`.

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use tracing::{debug, trace};

use crate::ast::{BlockStmt, ExtendsStmt, Node};
use crate::callable::{ArgSpec, Callable};
use crate::error::{Error, ErrorKind, ErrorLocation, TemplateResult};
use crate::lexer::LexerOptions;
use crate::loader::TemplateLoader;
use crate::output::{RenderSink, StringSink};
use crate::parser::parse;
use crate::renderer::render_compiled;
use crate::value::{Value, ValueMap};

/// Autoescaping policy for an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoEscape {
    /// Never escape.
    #[default]
    Off,
    /// Escape every template.
    Html,
    /// Escape templates whose name ends in `.html`, `.htm` or `.xml`.
    ByExtension,
}

/// Environment settings.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub autoescape: AutoEscape,
    /// Remove the newline immediately after a block tag.
    pub trim_blocks: bool,
    /// Strip leading whitespace from lines containing only a block tag.
    pub lstrip_blocks: bool,
    /// Keep the final trailing newline of template sources.
    pub keep_trailing_newline: bool,
    /// Raise `UndefinedValue` for missing names instead of yielding Empty.
    pub strict_undefined: bool,
    /// Enabled extension names. Reserved for host configuration; every
    /// statement this engine implements is always available.
    pub extensions: HashSet<String>,
    /// Names visible in every render.
    pub globals: ValueMap,
}

/// An immutable, parsed template. Shared by the cache and by render
/// handles; safe to read from concurrent renders.
#[derive(Debug)]
pub struct CompiledTemplate {
    /// The template name as given to the environment.
    pub name: Arc<str>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) blocks: HashMap<String, Arc<BlockStmt>>,
    pub(crate) extends: Option<ExtendsStmt>,
    pub(crate) autoescape: bool,
}

/// The template environment.
pub struct Environment {
    settings: Settings,
    globals: ValueMap,
    filters: HashMap<String, Callable>,
    tests: HashMap<String, Callable>,
    loader: Option<Arc<dyn TemplateLoader>>,
    cache: RwLock<HashMap<String, Arc<CompiledTemplate>>>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// An environment with default settings.
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    /// An environment with the given settings. Built-in filters, tests
    /// and globals are registered; the settings' globals are merged on
    /// top.
    pub fn with_settings(settings: Settings) -> Self {
        let mut filters = HashMap::new();
        crate::filters::register_builtin_filters(&mut filters);
        let mut tests = HashMap::new();
        crate::tests_builtin::register_builtin_tests(&mut tests);

        let mut globals = builtin_globals();
        for (name, value) in &settings.globals {
            globals.insert(name.clone(), value.clone());
        }

        Environment {
            settings,
            globals,
            filters,
            tests,
            loader: None,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Register the loader used by `get_template`, `extends`, `include`,
    /// `import` and `from`.
    pub fn set_loader(&mut self, loader: Arc<dyn TemplateLoader>) {
        self.loader = Some(loader);
    }

    /// Register a filter under `name`.
    pub fn add_filter(&mut self, name: impl Into<String>, filter: Callable) {
        self.filters.insert(name.into(), filter);
    }

    /// Register a test under `name`.
    pub fn add_test(&mut self, name: impl Into<String>, test: Callable) {
        self.tests.insert(name.into(), test);
    }

    /// Register a global value under `name`.
    pub fn add_global(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.globals.insert(name.into(), value.into());
    }

    pub(crate) fn filter(&self, name: &str) -> Option<Callable> {
        self.filters.get(name).cloned()
    }

    pub(crate) fn test(&self, name: &str) -> Option<Callable> {
        self.tests.get(name).cloned()
    }

    pub(crate) fn globals_map(&self) -> &ValueMap {
        &self.globals
    }

    fn lexer_options(&self) -> LexerOptions {
        LexerOptions {
            trim_blocks: self.settings.trim_blocks,
            lstrip_blocks: self.settings.lstrip_blocks,
            keep_trailing_newline: self.settings.keep_trailing_newline,
        }
    }

    fn resolve_autoescape(&self, name: &str) -> bool {
        match self.settings.autoescape {
            AutoEscape::Off => false,
            AutoEscape::Html => true,
            AutoEscape::ByExtension => [".html", ".htm", ".xml"]
                .iter()
                .any(|ext| name.ends_with(ext)),
        }
    }

    fn compile(&self, source: &str, name: &str) -> TemplateResult<CompiledTemplate> {
        debug!(template = name, "compiling template");
        let parsed = parse(source, name, &self.lexer_options())?;
        Ok(CompiledTemplate {
            name: Arc::from(name),
            nodes: parsed.nodes,
            blocks: parsed.blocks,
            extends: parsed.extends,
            autoescape: self.resolve_autoescape(name),
        })
    }

    /// Parse a template from a string, without caching it.
    pub fn template_from_str(&self, source: &str, name: &str) -> TemplateResult<Template<'_>> {
        let compiled = self.compile(source, name)?;
        Ok(Template {
            env: self,
            inner: Some(Arc::new(compiled)),
        })
    }

    /// Load a template by name through the loader, compiling and caching
    /// it on first use.
    pub fn get_template(&self, name: &str) -> TemplateResult<Template<'_>> {
        let inner = self.load_compiled(name)?;
        Ok(Template {
            env: self,
            inner: Some(inner),
        })
    }

    /// An unloaded template handle. Rendering it before a successful
    /// [`Template::load_str`] fails with `TemplateNotParsed`.
    pub fn new_template(&self) -> Template<'_> {
        Template {
            env: self,
            inner: None,
        }
    }

    pub(crate) fn load_compiled(&self, name: &str) -> TemplateResult<Arc<CompiledTemplate>> {
        if name.is_empty() {
            return Err(Error::new(ErrorKind::InvalidTemplateName).with_extra(name));
        }

        {
            let cache = self
                .cache
                .read()
                .map_err(|_| cache_poisoned())?;
            if let Some(hit) = cache.get(name) {
                trace!(template = name, "template cache hit");
                return Ok(Arc::clone(hit));
            }
        }

        let loader = self.loader.as_ref().ok_or_else(|| {
            Error::new(ErrorKind::Loader).with_extra("no loader registered")
        })?;
        let source = loader
            .load(name)?
            .ok_or_else(|| Error::new(ErrorKind::TemplateNotFound).with_extra(name))?;

        trace!(template = name, "template cache miss");
        let compiled = Arc::new(self.compile(&source.source, &source.name)?);
        let mut cache = self
            .cache
            .write()
            .map_err(|_| cache_poisoned())?;
        cache.insert(name.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }
}

fn cache_poisoned() -> Error {
    Error::new(ErrorKind::UnexpectedException).with_extra("template cache poisoned")
}

/// Globals available in every environment: `range` and the `_`
/// translation passthrough.
fn builtin_globals() -> ValueMap {
    let mut globals = ValueMap::new();

    globals.insert(
        "range".to_string(),
        Value::Callable(Callable::host(Vec::new(), |params| {
            let mut bounds = Vec::with_capacity(params.extra_pos.len());
            for arg in &params.extra_pos {
                match arg {
                    Value::Int(n) => bounds.push(*n),
                    other => {
                        return Err(Error::new(ErrorKind::InvalidOperation)
                            .with_extra(other.clone()));
                    }
                }
            }
            let (start, stop, step) = match bounds.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => {
                    return Err(Error::new(ErrorKind::InvalidOperation)
                        .with_extra("range expects 1 to 3 arguments"));
                }
            };
            if step == 0 {
                return Err(Error::new(ErrorKind::InvalidOperation)
                    .with_extra("range step cannot be zero"));
            }
            let mut items = Vec::new();
            let mut i = start;
            while (step > 0 && i < stop) || (step < 0 && i > stop) {
                items.push(Value::Int(i));
                i += step;
            }
            Ok(Value::from(items))
        })),
    );

    globals.insert(
        "_".to_string(),
        Value::Callable(Callable::host(
            vec![ArgSpec::required("message")],
            |params| Ok(params.get("message")),
        )),
    );

    globals
}

/// A render handle over a compiled template.
pub struct Template<'env> {
    env: &'env Environment,
    inner: Option<Arc<CompiledTemplate>>,
}

impl std::fmt::Debug for Template<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template").field("inner", &self.inner).finish()
    }
}

impl<'env> Template<'env> {
    /// The template name, when loaded.
    pub fn name(&self) -> Option<&str> {
        self.inner.as_deref().map(|t| t.name.as_ref())
    }

    /// Parse `source` into this handle, replacing any previous content.
    pub fn load_str(&mut self, source: &str, name: &str) -> TemplateResult<()> {
        self.inner = Some(Arc::new(self.env.compile(source, name)?));
        Ok(())
    }

    /// Render with the given parameters into a string.
    pub fn render(&self, params: ValueMap) -> TemplateResult<String> {
        let mut sink = StringSink::new();
        self.render_to(params, &mut sink)?;
        Ok(sink.into_string())
    }

    /// Render with the given parameters into a sink.
    ///
    /// Partial output already written to the sink is not rolled back on
    /// error; render to an in-memory sink first for atomicity. A panic
    /// escaping a host callable is caught here and surfaced as
    /// `UnexpectedException` with the panic message as an extra param.
    pub fn render_to(&self, params: ValueMap, out: &mut dyn RenderSink) -> TemplateResult<()> {
        let inner = self
            .inner
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::TemplateNotParsed))?;

        match catch_unwind(AssertUnwindSafe(|| {
            render_compiled(self.env, inner, params, out)
        })) {
            Ok(result) => result,
            Err(payload) => {
                let message = if let Some(text) = payload.downcast_ref::<&str>() {
                    text.to_string()
                } else if let Some(text) = payload.downcast_ref::<String>() {
                    text.clone()
                } else {
                    "host callable panicked".to_string()
                };
                let mut error =
                    Error::new(ErrorKind::UnexpectedException).with_extra(message);
                error.location = ErrorLocation {
                    file: Arc::clone(&inner.name),
                    line: 1,
                    column: 1,
                };
                Err(error)
            }
        }
    }
}
