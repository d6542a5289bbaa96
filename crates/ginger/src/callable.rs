/*
 * callable.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Callable values and the argument-binding protocol.
//!
//! A [`Callable`] carries an ordered list of argument descriptors and an
//! implementation. Host functions, template macros, `call` block bodies,
//! `super()` block chains and recursive-loop re-entry all share the same
//! descriptor shape and the same binding algorithm, so every call site in
//! a template behaves identically regardless of what it invokes.

use std::fmt;
use std::sync::Arc;

use crate::ast::{BlockStmt, CallStmt, ForStmt, MacroDecl};
use crate::context::ScopeStack;
use crate::error::{Error, ErrorKind, TemplateResult};
use crate::value::{Value, ValueList, ValueMap};

/// Description of one argument of a callable.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    /// Argument name.
    pub name: String,
    /// Whether the argument must be supplied by the caller.
    pub required: bool,
    /// Default value, captured at descriptor build time.
    pub default: Option<Value>,
}

impl ArgSpec {
    /// A mandatory argument.
    pub fn required(name: impl Into<String>) -> Self {
        ArgSpec {
            name: name.into(),
            required: true,
            default: None,
        }
    }

    /// An optional argument with a default.
    pub fn optional(name: impl Into<String>, default: impl Into<Value>) -> Self {
        ArgSpec {
            name: name.into(),
            required: false,
            default: Some(default.into()),
        }
    }
}

/// Arguments assembled for one invocation.
///
/// `args` holds the values matched to the callable's descriptors; unmatched
/// positional and named arguments land in `extra_pos` / `extra_named`. The
/// optional scope handle lets host callables read the template context of
/// the call site.
pub struct CallParams<'a> {
    /// Descriptor-matched arguments, by name.
    pub args: ValueMap,
    /// Positional arguments beyond the descriptor list.
    pub extra_pos: ValueList,
    /// Named arguments not matching any descriptor.
    pub extra_named: ValueMap,
    /// The scope stack of the call site, when invoked from a template.
    pub scope: Option<&'a ScopeStack>,
}

impl CallParams<'_> {
    /// Look up a descriptor-matched argument, Empty when absent.
    pub fn get(&self, name: &str) -> Value {
        self.args.get(name).cloned().unwrap_or_default()
    }
}

/// A host-provided invocation function.
pub type HostFn = dyn Fn(&CallParams<'_>) -> TemplateResult<Value> + Send + Sync;

/// A template macro bound to the scope snapshot of its definition site.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroInstance {
    pub decl: Arc<MacroDecl>,
    /// Names visible where the macro was defined.
    pub closure: ValueMap,
}

/// The body of a `{% call %}` block, invocable as `caller()`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallerInstance {
    pub stmt: Arc<CallStmt>,
    pub closure: ValueMap,
}

#[derive(Clone)]
pub(crate) enum CallableImpl {
    /// Host function.
    Host(Arc<HostFn>),
    /// Template macro.
    Macro(Arc<MacroInstance>),
    /// `caller()` inside a macro invoked via `{% call %}`.
    Caller(Arc<CallerInstance>),
    /// `super()` within a block; renders the next definition up the
    /// chain. Each entry pairs the block with its template name.
    Block {
        chain: Arc<Vec<(Arc<BlockStmt>, Arc<str>)>>,
        index: usize,
    },
    /// `loop(subseq)` re-entry of a recursive for statement.
    LoopRecurse { stmt: Arc<ForStmt>, depth: usize },
}

/// A host- or template-defined callable value.
#[derive(Clone)]
pub struct Callable {
    pub(crate) args: Arc<Vec<ArgSpec>>,
    pub(crate) imp: CallableImpl,
    /// Attributes readable through `value.name`. Used by the `loop`
    /// pseudo-variable of recursive loops, which is a map and a callable
    /// at the same time.
    pub(crate) attrs: Arc<ValueMap>,
}

impl Callable {
    /// A callable backed by a host function.
    pub fn host(
        args: Vec<ArgSpec>,
        f: impl Fn(&CallParams<'_>) -> TemplateResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Callable {
            args: Arc::new(args),
            imp: CallableImpl::Host(Arc::new(f)),
            attrs: Arc::new(ValueMap::new()),
        }
    }

    pub(crate) fn from_impl(args: Vec<ArgSpec>, imp: CallableImpl) -> Self {
        Callable {
            args: Arc::new(args),
            imp,
            attrs: Arc::new(ValueMap::new()),
        }
    }

    /// Attach readable attributes.
    pub(crate) fn with_attrs(mut self, attrs: ValueMap) -> Self {
        self.attrs = Arc::new(attrs);
        self
    }

    /// Attribute lookup on this callable.
    pub fn attr(&self, name: &str) -> Option<Value> {
        self.attrs.get(name).cloned()
    }

    /// The argument descriptors of this callable.
    pub fn arg_specs(&self) -> &[ArgSpec] {
        &self.args
    }

    pub(crate) fn ptr_eq(&self, other: &Callable) -> bool {
        match (&self.imp, &other.imp) {
            (CallableImpl::Host(a), CallableImpl::Host(b)) => Arc::ptr_eq(a, b),
            (CallableImpl::Macro(a), CallableImpl::Macro(b)) => Arc::ptr_eq(a, b),
            (CallableImpl::Caller(a), CallableImpl::Caller(b)) => Arc::ptr_eq(a, b),
            (
                CallableImpl::Block { chain: a, index: i },
                CallableImpl::Block { chain: b, index: j },
            ) => Arc::ptr_eq(a, b) && i == j,
            (
                CallableImpl::LoopRecurse { stmt: a, depth: i },
                CallableImpl::LoopRecurse { stmt: b, depth: j },
            ) => Arc::ptr_eq(a, b) && i == j,
            _ => false,
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.imp {
            CallableImpl::Host(_) => write!(f, "<callable>"),
            CallableImpl::Macro(m) => write!(f, "<macro {}>", m.decl.name),
            CallableImpl::Caller(_) => write!(f, "<caller>"),
            CallableImpl::Block { chain, index } => {
                write!(f, "<super {}>", chain[*index].0.name)
            }
            CallableImpl::LoopRecurse { .. } => write!(f, "<loop>"),
        }
    }
}

/// Arguments bound against a descriptor list.
#[derive(Debug, Default)]
pub struct BoundArgs {
    pub args: ValueMap,
    pub extra_pos: ValueList,
    pub extra_named: ValueMap,
}

/// Bind positional and named arguments to a descriptor list.
///
/// Descriptors are walked in order: a remaining positional argument binds
/// first; otherwise a named argument of the same name; otherwise the
/// argument must not be mandatory and `default_for` supplies its value
/// (invoked only when actually needed, so per-call default evaluation
/// stays lazy). Leftover positional and named arguments become
/// `extra_pos` / `extra_named`.
pub fn bind_args(
    specs: &[ArgSpec],
    pos: ValueList,
    mut named: ValueMap,
    mut default_for: impl FnMut(usize, &ArgSpec) -> TemplateResult<Value>,
) -> TemplateResult<BoundArgs> {
    let mut bound = BoundArgs::default();
    let mut pos_iter = pos.into_iter();

    for (i, spec) in specs.iter().enumerate() {
        let value = if let Some(value) = pos_iter.next() {
            value
        } else if let Some(value) = named.remove(&spec.name) {
            value
        } else if spec.required {
            return Err(Error::new(ErrorKind::MissingArgument).with_extra(spec.name.as_str()));
        } else {
            default_for(i, spec)?
        };
        bound.args.insert(spec.name.clone(), value);
    }

    bound.extra_pos = pos_iter.collect();
    bound.extra_named = named;
    Ok(bound)
}

/// Bind with the descriptors' captured default values.
pub fn bind_args_with_defaults(
    specs: &[ArgSpec],
    pos: ValueList,
    named: ValueMap,
) -> TemplateResult<BoundArgs> {
    bind_args(specs, pos, named, |_, spec| {
        Ok(spec.default.clone().unwrap_or_default())
    })
}
