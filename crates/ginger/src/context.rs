/*
 * context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The render context's scope stack.
//!
//! A [`ScopeStack`] maps names to values through a stack of scopes with
//! the environment globals at the bottom. Name resolution searches the
//! stack outward, then the globals. `for`, `with`, `macro`, `block` and
//! with-context includes each push a scope; every push is paired with a
//! pop on all exit paths, including errors.

use crate::value::{Value, ValueMap};

/// A stack of name→value scopes over a fixed globals map.
#[derive(Debug, Clone)]
pub struct ScopeStack {
    globals: ValueMap,
    scopes: Vec<ValueMap>,
}

impl ScopeStack {
    /// Create a stack with one (root) scope over the given globals.
    pub fn new(globals: ValueMap) -> Self {
        ScopeStack {
            globals,
            scopes: vec![ValueMap::new()],
        }
    }

    /// Push a fresh scope.
    pub fn push(&mut self) {
        self.scopes.push(ValueMap::new());
    }

    /// Pop the innermost scope, returning its bindings.
    pub fn pop(&mut self) -> ValueMap {
        self.scopes.pop().unwrap_or_default()
    }

    /// Current stack depth (number of scopes).
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Resolve a name, searching scopes outward, then globals.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.get(name) {
                return Some(value.clone());
            }
        }
        self.globals.get(name).cloned()
    }

    /// Bind a name in the innermost scope.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), value);
        }
    }

    /// Flatten the visible scope bindings into a single map (globals
    /// excluded). Used to snapshot a macro's definition context.
    pub fn flatten(&self) -> ValueMap {
        let mut out = ValueMap::new();
        for scope in &self.scopes {
            for (name, value) in scope {
                out.insert(name.clone(), value.clone());
            }
        }
        out
    }
}
