/*
 * renderer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The template renderer.
//!
//! Walks the renderer tree against a scope stack, writing text runs to
//! the sink verbatim and emitted expression values through output
//! coercion (and HTML escaping when autoescape is active). Statement
//! nodes implement their own rendering logic here; expression evaluation
//! lives in [`crate::eval`] as further methods on [`Renderer`].
//!
//! Every scope pushed by a statement is popped on all exit paths,
//! including error paths.

use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::Arc;

use ginger_source_map::Range;
use tracing::debug;

use crate::ast::{
    BlockStmt, CallStmt, ExprKind, FilterBlockStmt, ForStmt, IfStmt, IncludeStmt, MacroDecl, Node,
    SetSource, SetStmt, WithStmt,
};
use crate::callable::{
    bind_args, ArgSpec, Callable, CallableImpl, CallerInstance, MacroInstance,
};
use crate::context::ScopeStack;
use crate::environment::{CompiledTemplate, Environment};
use crate::error::{Error, ErrorKind, TemplateResult};
use crate::output::{emit_value, NullSink, RenderSink, StringSink};
use crate::value::{Value, ValueList, ValueMap};

/// Re-entrancy cap for include/import/extends chains.
const MAX_LOAD_DEPTH: usize = 50;

/// One block-override chain: most-derived definition first, each entry
/// paired with the name of the template that defined it.
type BlockChain = Arc<Vec<(Arc<BlockStmt>, Arc<str>)>>;

/// Per-render state: confined to the calling thread.
pub(crate) struct Renderer<'env> {
    pub(crate) env: &'env Environment,
    pub(crate) scopes: ScopeStack,
    /// Name of the template whose nodes are currently rendering; used
    /// for error locations.
    pub(crate) file: Arc<str>,
    blocks: HashMap<String, BlockChain>,
    pub(crate) autoescape: bool,
    pub(crate) strict: bool,
    load_depth: usize,
}

/// Render a compiled template with the given parameters.
pub(crate) fn render_compiled(
    env: &Environment,
    tpl: &Arc<CompiledTemplate>,
    params: ValueMap,
    out: &mut dyn RenderSink,
) -> TemplateResult<()> {
    let mut renderer = Renderer {
        env,
        scopes: ScopeStack::new(env.globals_map().clone()),
        file: Arc::clone(&tpl.name),
        blocks: HashMap::new(),
        autoescape: tpl.autoescape,
        strict: env.settings().strict_undefined,
        load_depth: 0,
    };
    for (name, value) in params {
        renderer.scopes.set(name, value);
    }
    renderer.render_template(tpl, out)
}

impl<'env> Renderer<'env> {
    /// Attach the current template and `range` to an error that has no
    /// location yet.
    pub(crate) fn locate(&self, error: Error, range: &Range) -> Error {
        if error.location.file.as_ref() == "<unknown>" {
            error.at(&self.file, range)
        } else {
            error
        }
    }

    pub(crate) fn err(&self, kind: ErrorKind, range: &Range) -> Error {
        Error::new(kind).at(&self.file, range)
    }

    /// Render a template, resolving its inheritance chain first.
    fn render_template(
        &mut self,
        tpl: &Arc<CompiledTemplate>,
        out: &mut dyn RenderSink,
    ) -> TemplateResult<()> {
        let chain = self.resolve_chain(tpl)?;
        let root = Arc::clone(chain.last().unwrap_or(tpl));

        let saved_blocks = mem::replace(&mut self.blocks, block_chains(&chain));
        let saved_file = mem::replace(&mut self.file, Arc::clone(&root.name));
        let result = self.render_nodes(&root.nodes, out);
        self.file = saved_file;
        self.blocks = saved_blocks;
        result
    }

    /// Follow `extends` declarations up to the inheritance root.
    fn resolve_chain(
        &mut self,
        tpl: &Arc<CompiledTemplate>,
    ) -> TemplateResult<Vec<Arc<CompiledTemplate>>> {
        let mut chain = vec![Arc::clone(tpl)];
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(tpl.name.to_string());

        while let Some(extends) = chain.last().and_then(|t| t.extends.clone()) {
            let name_value = self.eval(&extends.name)?;
            let name = match name_value.as_str() {
                Some(name) => name.to_string(),
                None => {
                    return Err(self
                        .err(ErrorKind::InvalidTemplateName, &extends.range)
                        .with_extra(name_value));
                }
            };
            if !seen.insert(name.clone()) {
                return Err(self
                    .err(ErrorKind::UnexpectedException, &extends.range)
                    .with_extra(format!("circular extends of '{}'", name)));
            }
            debug!(template = %name, "loading parent template");
            let parent = self
                .env
                .load_compiled(&name)
                .map_err(|e| self.locate(e, &extends.range))?;
            chain.push(parent);
        }
        Ok(chain)
    }

    pub(crate) fn render_nodes(
        &mut self,
        nodes: &[Node],
        out: &mut dyn RenderSink,
    ) -> TemplateResult<()> {
        for node in nodes {
            self.render_node(node, out)?;
        }
        Ok(())
    }

    fn render_node(&mut self, node: &Node, out: &mut dyn RenderSink) -> TemplateResult<()> {
        match node {
            Node::Text(run) | Node::Raw(run) => {
                out.write_text(&run.text);
                Ok(())
            }
            Node::Emit(stmt) => {
                let value = self.eval(&stmt.expr)?;
                emit_value(out, &value, self.autoescape);
                Ok(())
            }
            Node::If(stmt) => self.render_if(stmt, out),
            Node::For(stmt) => self.render_for(stmt, None, 0, out),
            Node::Set(stmt) => self.render_set(stmt, out),
            Node::Block(stmt) => self.render_block(stmt, out),
            // Inheritance was resolved before rendering started.
            Node::Extends(_) => Ok(()),
            Node::Include(stmt) => self.render_include(stmt, out),
            Node::Import(stmt) => {
                let tpl = self.load_by_expr(&stmt.name)?;
                let exports = self.load_module(&tpl, stmt.with_context)?;
                self.scopes
                    .set(stmt.alias.clone(), Value::Map(Arc::new(exports)));
                Ok(())
            }
            Node::FromImport(stmt) => {
                let tpl = self.load_by_expr(&stmt.name)?;
                let exports = self.load_module(&tpl, stmt.with_context)?;
                for (name, alias) in &stmt.names {
                    match exports.get(name) {
                        Some(value) => {
                            let target = alias.as_ref().unwrap_or(name).clone();
                            self.scopes.set(target, value.clone());
                        }
                        None => {
                            return Err(self
                                .err(ErrorKind::UndefinedValue, &stmt.range)
                                .with_extra(name.as_str()));
                        }
                    }
                }
                Ok(())
            }
            Node::Macro(decl) => {
                let value = self.make_macro_value(decl);
                self.scopes.set(decl.name.clone(), value);
                Ok(())
            }
            Node::Call(stmt) => self.render_call(stmt, out),
            Node::FilterBlock(stmt) => self.render_filter_block(stmt, out),
            Node::With(stmt) => self.render_with(stmt, out),
            Node::Do(stmt) => {
                self.eval(&stmt.expr)?;
                Ok(())
            }
        }
    }

    fn render_if(&mut self, stmt: &IfStmt, out: &mut dyn RenderSink) -> TemplateResult<()> {
        for (condition, body) in &stmt.branches {
            if self.eval(condition)?.is_truthy() {
                return self.render_nodes(body, out);
            }
        }
        if let Some(else_body) = &stmt.else_body {
            return self.render_nodes(else_body, out);
        }
        Ok(())
    }

    /// Render a loop. `seed` carries the items of a `loop(subseq)`
    /// re-entry; `depth` is the 0-based recursion depth.
    pub(crate) fn render_for(
        &mut self,
        stmt: &Arc<ForStmt>,
        seed: Option<ValueList>,
        depth: usize,
        out: &mut dyn RenderSink,
    ) -> TemplateResult<()> {
        let items = match seed {
            Some(items) => items,
            None => {
                let iterable = self.eval(&stmt.iter)?;
                match iterable.iteration_items() {
                    Some(items) => items,
                    None => {
                        return Err(self
                            .err(ErrorKind::InvalidOperation, &stmt.iter.range)
                            .with_extra("value is not iterable"));
                    }
                }
            }
        };

        // Inline filter: items failing the condition never iterate.
        let items = match &stmt.cond {
            Some(cond) => {
                let mut kept = Vec::new();
                for item in items {
                    self.scopes.push();
                    let keep = self
                        .bind_targets(&stmt.targets, &item, &stmt.range)
                        .and_then(|_| self.eval(cond))
                        .map(|v| v.is_truthy());
                    self.scopes.pop();
                    if keep? {
                        kept.push(item);
                    }
                }
                kept
            }
            None => items,
        };

        if items.is_empty() {
            return self.render_nodes(&stmt.else_body, out);
        }

        for index in 0..items.len() {
            self.scopes.push();
            let result = self
                .bind_targets(&stmt.targets, &items[index], &stmt.range)
                .and_then(|_| {
                    let loop_value = self.make_loop_value(stmt, &items, index, depth);
                    self.scopes.set("loop", loop_value);
                    self.render_nodes(&stmt.body, out)
                });
            self.scopes.pop();
            result?;
        }
        Ok(())
    }

    /// Bind loop/set targets in the current scope, unpacking when more
    /// than one name is given.
    fn bind_targets(
        &mut self,
        targets: &[String],
        value: &Value,
        range: &Range,
    ) -> TemplateResult<()> {
        if targets.len() == 1 {
            self.scopes.set(targets[0].clone(), value.clone());
            return Ok(());
        }

        let parts = value.iteration_items().ok_or_else(|| {
            self.err(ErrorKind::InvalidOperation, range)
                .with_extra("cannot unpack value")
        })?;
        if parts.len() != targets.len() {
            return Err(self
                .err(ErrorKind::InvalidOperation, range)
                .with_extra(format!(
                    "cannot unpack {} values into {} names",
                    parts.len(),
                    targets.len()
                )));
        }
        for (target, part) in targets.iter().zip(parts) {
            self.scopes.set(target.clone(), part);
        }
        Ok(())
    }

    /// Build the `loop` pseudo-variable for one iteration.
    fn make_loop_value(
        &self,
        stmt: &Arc<ForStmt>,
        items: &[Value],
        index: usize,
        depth: usize,
    ) -> Value {
        let n = items.len();
        let mut map = ValueMap::new();
        map.insert("index".into(), Value::from(index + 1));
        map.insert("index0".into(), Value::from(index));
        map.insert("revindex".into(), Value::from(n - index));
        map.insert("revindex0".into(), Value::from(n - index - 1));
        map.insert("first".into(), Value::Bool(index == 0));
        map.insert("last".into(), Value::Bool(index == n - 1));
        map.insert("length".into(), Value::from(n));
        map.insert(
            "previtem".into(),
            if index > 0 {
                items[index - 1].clone()
            } else {
                Value::Empty
            },
        );
        map.insert(
            "nextitem".into(),
            items.get(index + 1).cloned().unwrap_or_default(),
        );
        map.insert("depth".into(), Value::from(depth + 1));
        map.insert("depth0".into(), Value::from(depth));
        map.insert(
            "cycle".into(),
            Value::Callable(Callable::host(Vec::new(), move |params| {
                if params.extra_pos.is_empty() {
                    return Ok(Value::Empty);
                }
                Ok(params.extra_pos[index % params.extra_pos.len()].clone())
            })),
        );

        if stmt.recursive {
            // `loop` is callable for re-entry and still exposes the
            // iteration attributes.
            Value::Callable(
                Callable::from_impl(
                    vec![ArgSpec::required("iterable")],
                    CallableImpl::LoopRecurse {
                        stmt: Arc::clone(stmt),
                        depth: depth + 1,
                    },
                )
                .with_attrs(map),
            )
        } else {
            Value::Map(Arc::new(map))
        }
    }

    fn render_set(&mut self, stmt: &SetStmt, _out: &mut dyn RenderSink) -> TemplateResult<()> {
        let value = match &stmt.source {
            SetSource::Expr(expr) => self.eval(expr)?,
            SetSource::Capture(body) => {
                let mut sink = StringSink::new();
                self.render_nodes(body, &mut sink)?;
                Value::safe(sink.into_string())
            }
        };
        self.bind_targets(&stmt.targets, &value, &stmt.range)
    }

    fn render_block(
        &mut self,
        block: &Arc<BlockStmt>,
        out: &mut dyn RenderSink,
    ) -> TemplateResult<()> {
        match self.blocks.get(&block.name).cloned() {
            Some(chain) => self.render_block_at(&chain, 0, out),
            // A block outside any inheritance chain renders its own body.
            None => self.render_block_body(block, Arc::clone(&self.file), None, out),
        }
    }

    /// Render the definition at `index` of a block-override chain,
    /// binding `super` when a parent definition exists.
    pub(crate) fn render_block_at(
        &mut self,
        chain: &BlockChain,
        index: usize,
        out: &mut dyn RenderSink,
    ) -> TemplateResult<()> {
        let (block, file) = chain[index].clone();
        let super_value = if index + 1 < chain.len() {
            Some(Value::Callable(Callable::from_impl(
                Vec::new(),
                CallableImpl::Block {
                    chain: Arc::clone(chain),
                    index: index + 1,
                },
            )))
        } else {
            None
        };
        self.render_block_body(&block, file, super_value, out)
    }

    fn render_block_body(
        &mut self,
        block: &Arc<BlockStmt>,
        file: Arc<str>,
        super_value: Option<Value>,
        out: &mut dyn RenderSink,
    ) -> TemplateResult<()> {
        let saved_file = mem::replace(&mut self.file, file);
        self.scopes.push();
        if let Some(value) = super_value {
            self.scopes.set("super", value);
        }
        let result = self.render_nodes(&block.body, out);
        self.scopes.pop();
        self.file = saved_file;
        result
    }

    fn render_include(
        &mut self,
        stmt: &IncludeStmt,
        out: &mut dyn RenderSink,
    ) -> TemplateResult<()> {
        let name_value = self.eval(&stmt.name)?;
        let candidates: Vec<String> = match &name_value {
            Value::String(name, _) => vec![name.to_string()],
            Value::List(items) => {
                let mut names = Vec::with_capacity(items.len());
                for item in items.iter() {
                    match item.as_str() {
                        Some(name) => names.push(name.to_string()),
                        None => {
                            return Err(self
                                .err(ErrorKind::InvalidTemplateName, &stmt.range)
                                .with_extra(item.clone()));
                        }
                    }
                }
                names
            }
            other => {
                return Err(self
                    .err(ErrorKind::InvalidTemplateName, &stmt.range)
                    .with_extra(other.clone()));
            }
        };

        for candidate in &candidates {
            match self.env.load_compiled(candidate) {
                Ok(tpl) => return self.render_included(&tpl, stmt.with_context, out),
                Err(e) if e.kind == ErrorKind::TemplateNotFound => continue,
                Err(e) => return Err(self.locate(e, &stmt.range)),
            }
        }

        if stmt.ignore_missing {
            Ok(())
        } else {
            Err(self
                .err(ErrorKind::TemplateNotFound, &stmt.range)
                .with_extra(candidates.join(", ")))
        }
    }

    fn render_included(
        &mut self,
        tpl: &Arc<CompiledTemplate>,
        with_context: bool,
        out: &mut dyn RenderSink,
    ) -> TemplateResult<()> {
        self.enter_load(&tpl.name)?;
        let saved_autoescape = mem::replace(&mut self.autoescape, tpl.autoescape);

        let result = if with_context {
            self.scopes.push();
            let result = self.render_template(tpl, out);
            self.scopes.pop();
            result
        } else {
            let saved_scopes = mem::replace(
                &mut self.scopes,
                ScopeStack::new(self.env.globals_map().clone()),
            );
            let result = self.render_template(tpl, out);
            self.scopes = saved_scopes;
            result
        };

        self.autoescape = saved_autoescape;
        self.load_depth -= 1;
        result
    }

    /// Evaluate a template-name expression and load the template.
    fn load_by_expr(&mut self, name: &crate::ast::Expr) -> TemplateResult<Arc<CompiledTemplate>> {
        let value = self.eval(name)?;
        match value.as_str() {
            Some(text) => self
                .env
                .load_compiled(text)
                .map_err(|e| self.locate(e, &name.range)),
            None => Err(self
                .err(ErrorKind::InvalidTemplateName, &name.range)
                .with_extra(value)),
        }
    }

    /// Execute a template for its module-level definitions and collect
    /// its exports (macros and top-level `set` variables whose names do
    /// not start with `_`).
    fn load_module(
        &mut self,
        tpl: &Arc<CompiledTemplate>,
        with_context: bool,
    ) -> TemplateResult<ValueMap> {
        self.enter_load(&tpl.name)?;
        let mut sink = NullSink;

        let result = if with_context {
            self.scopes.push();
            let result = self.render_template(tpl, &mut sink);
            let scope = self.scopes.pop();
            result.map(|_| scope)
        } else {
            let saved_scopes = mem::replace(
                &mut self.scopes,
                ScopeStack::new(self.env.globals_map().clone()),
            );
            let result = self.render_template(tpl, &mut sink);
            let module_scopes = mem::replace(&mut self.scopes, saved_scopes);
            result.map(|_| module_scopes.flatten())
        };
        self.load_depth -= 1;

        // Names starting with '_' are module-private.
        Ok(result?
            .into_iter()
            .filter(|(name, _)| !name.starts_with('_'))
            .collect())
    }

    fn enter_load(&mut self, name: &Arc<str>) -> TemplateResult<()> {
        if self.load_depth >= MAX_LOAD_DEPTH {
            return Err(Error::new(ErrorKind::UnexpectedException)
                .with_extra(format!("template nesting too deep at '{}'", name)));
        }
        self.load_depth += 1;
        Ok(())
    }

    fn make_macro_value(&self, decl: &Arc<MacroDecl>) -> Value {
        let specs = macro_arg_specs(&decl.params);
        Value::Callable(Callable::from_impl(
            specs,
            CallableImpl::Macro(Arc::new(MacroInstance {
                decl: Arc::clone(decl),
                closure: self.scopes.flatten(),
            })),
        ))
    }

    fn render_call(&mut self, stmt: &Arc<CallStmt>, out: &mut dyn RenderSink) -> TemplateResult<()> {
        let ExprKind::Call { callee, args } = &stmt.target.kind else {
            return Err(self
                .err(ErrorKind::InvalidOperation, &stmt.range)
                .with_extra("call target must be a macro invocation"));
        };

        let target = self.eval(callee)?;
        let (pos, named) = self.eval_call_args(args)?;
        let caller = Value::Callable(Callable::from_impl(
            macro_arg_specs(&stmt.params),
            CallableImpl::Caller(Arc::new(CallerInstance {
                stmt: Arc::clone(stmt),
                closure: self.scopes.flatten(),
            })),
        ));

        let instance = match &target {
            Value::Callable(callable) => match &callable.imp {
                CallableImpl::Macro(instance) => Arc::clone(instance),
                _ => {
                    return Err(self
                        .err(ErrorKind::InvalidOperation, &stmt.range)
                        .with_extra("call target must be a macro"));
                }
            },
            _ => {
                return Err(self
                    .err(ErrorKind::InvalidOperation, &stmt.range)
                    .with_extra("call target must be a macro"));
            }
        };
        let result = self.invoke_macro(&instance, pos, named, Some(caller), &stmt.range)?;
        emit_value(out, &result, self.autoescape);
        Ok(())
    }

    /// Invoke a macro: bind arguments, render the body against the
    /// macro's definition closure, and return the output as a safe
    /// string.
    pub(crate) fn invoke_macro(
        &mut self,
        instance: &Arc<MacroInstance>,
        pos: ValueList,
        named: ValueMap,
        caller: Option<Value>,
        range: &Range,
    ) -> TemplateResult<Value> {
        let decl = Arc::clone(&instance.decl);
        let specs = macro_arg_specs(&decl.params);
        let bound = bind_args(&specs, pos, named, |i, _| match &decl.params[i].default {
            Some(expr) => self.eval(expr),
            None => Ok(Value::Empty),
        })
        .map_err(|e| self.locate(e, range))?;

        let mut sink = StringSink::new();
        let saved_scopes = mem::replace(
            &mut self.scopes,
            ScopeStack::new(self.env.globals_map().clone()),
        );
        for (name, value) in &instance.closure {
            self.scopes.set(name.clone(), value.clone());
        }
        self.scopes.push();
        for (name, value) in bound.args {
            self.scopes.set(name, value);
        }
        self.scopes.set("varargs", Value::from(bound.extra_pos));
        self.scopes.set("kwargs", Value::from(bound.extra_named));
        if let Some(caller) = caller {
            self.scopes.set("caller", caller);
        }

        let result = self.render_nodes(&decl.body, &mut sink);
        self.scopes = saved_scopes;
        result?;
        Ok(Value::safe(sink.into_string()))
    }

    /// Invoke the body of a `{% call %}` block through `caller()`.
    pub(crate) fn invoke_caller(
        &mut self,
        instance: &Arc<CallerInstance>,
        pos: ValueList,
        named: ValueMap,
        range: &Range,
    ) -> TemplateResult<Value> {
        let stmt = Arc::clone(&instance.stmt);
        let specs = macro_arg_specs(&stmt.params);
        let bound = bind_args(&specs, pos, named, |i, _| match &stmt.params[i].default {
            Some(expr) => self.eval(expr),
            None => Ok(Value::Empty),
        })
        .map_err(|e| self.locate(e, range))?;

        let mut sink = StringSink::new();
        let saved_scopes = mem::replace(
            &mut self.scopes,
            ScopeStack::new(self.env.globals_map().clone()),
        );
        for (name, value) in &instance.closure {
            self.scopes.set(name.clone(), value.clone());
        }
        self.scopes.push();
        for (name, value) in bound.args {
            self.scopes.set(name, value);
        }

        let result = self.render_nodes(&stmt.body, &mut sink);
        self.scopes = saved_scopes;
        result?;
        Ok(Value::safe(sink.into_string()))
    }

    fn render_filter_block(
        &mut self,
        stmt: &FilterBlockStmt,
        out: &mut dyn RenderSink,
    ) -> TemplateResult<()> {
        let mut sink = StringSink::new();
        self.render_nodes(&stmt.body, &mut sink)?;

        // The captured body was already escaped during rendering.
        let mut value = Value::safe(sink.into_string());
        for filter in &stmt.filters {
            value = self.apply_filter(&filter.name, value, &filter.args, &filter.range)?;
        }
        out.write_text(&value.to_output_string());
        Ok(())
    }

    fn render_with(&mut self, stmt: &WithStmt, out: &mut dyn RenderSink) -> TemplateResult<()> {
        self.scopes.push();
        let result = (|| {
            for (name, expr) in &stmt.bindings {
                let value = self.eval(expr)?;
                self.scopes.set(name.clone(), value);
            }
            self.render_nodes(&stmt.body, out)
        })();
        self.scopes.pop();
        result
    }
}

/// Argument descriptors for a macro parameter list. Defaults stay as
/// expressions on the declaration and are evaluated per call.
fn macro_arg_specs(params: &[crate::ast::MacroParam]) -> Vec<ArgSpec> {
    params
        .iter()
        .map(|p| ArgSpec {
            name: p.name.clone(),
            required: p.default.is_none(),
            default: None,
        })
        .collect()
}

/// Merge the block definitions of an inheritance chain into override
/// chains, most-derived definition first.
fn block_chains(chain: &[Arc<CompiledTemplate>]) -> HashMap<String, BlockChain> {
    let mut merged: HashMap<String, Vec<(Arc<BlockStmt>, Arc<str>)>> = HashMap::new();
    for tpl in chain {
        for (name, block) in &tpl.blocks {
            merged
                .entry(name.clone())
                .or_default()
                .push((Arc::clone(block), Arc::clone(&tpl.name)));
        }
    }
    merged
        .into_iter()
        .map(|(name, blocks)| (name, Arc::new(blocks)))
        .collect()
}
