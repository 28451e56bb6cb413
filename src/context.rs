//! Template render state.
//!
//! One context exists per render call. Partials nest contexts: `include`
//! extends the live context in place, while `render` copies it with a
//! fresh, isolated scope. Stateful tags keep their cursors here, keyed by
//! stable fingerprints.

use crate::{
    environment::{Environment, UndefinedPolicy},
    error::{Error, Result},
    filters::Filter,
    path,
    tags::extends::BlockFragment,
    token::{PathToken, Span},
    value::{UndefinedValue, Value, ValueMap},
};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

/// The scope chain's fixed frame count: locals, globals, matter and
/// counters.
const BASE_SCOPE_DEPTH: usize = 4;

/// Template render state.
pub struct RenderContext<'env> {
    env: &'env Environment,
    /// The name of the template currently rendering; swapped while an
    /// `include` renders its partial.
    template_name: Arc<str>,
    /// Loader-supplied overlay data, layered under globals.
    matter: ValueMap,
    /// Globals merged from the environment, template and render call.
    globals: ValueMap,
    /// Names assigned by `assign`, `capture`, `increment` and friends.
    locals: ValueMap,
    /// Counter state for `increment` and `decrement`.
    counters: HashMap<String, i64>,
    /// Scopes pushed by blocks, loops and partials; innermost last.
    scopes: Vec<ValueMap>,
    /// Tag names forbidden in this render branch.
    disabled_tags: HashSet<String>,
    /// The number of `copy` frames above this context.
    copy_depth: usize,
    /// Inherited loop iteration budget multiplier.
    loop_iteration_carry: u64,
    /// Inherited locals size, counted against the namespace limit.
    local_namespace_carry: u64,
    /// Lengths of the active loops, innermost last.
    loops: Vec<u64>,
    /// Per-fingerprint cursors for the `cycle` tag.
    cycles: HashMap<u64, usize>,
    /// Per-fingerprint stop indices for `offset: continue`.
    stop_indices: HashMap<String, usize>,
    /// Macros registered by the `macro` tag.
    pub(crate) macros: HashMap<String, Arc<crate::tags::macro_tag::Macro>>,
    /// Block override chains built by the `extends` tag, most-derived
    /// first.
    pub(crate) block_chains: HashMap<String, Vec<BlockFragment>>,
    /// Names of templates already entered by `extends`, guarding against
    /// circular inheritance.
    pub(crate) extended: HashSet<String>,
}

impl<'env> RenderContext<'env> {
    /// Creates the root context for one render call.
    pub fn new(
        env: &'env Environment,
        template_name: Arc<str>,
        globals: ValueMap,
        matter: ValueMap,
    ) -> Self {
        Self {
            env,
            template_name,
            matter,
            globals,
            locals: ValueMap::new(),
            counters: HashMap::new(),
            scopes: Vec::new(),
            disabled_tags: HashSet::new(),
            copy_depth: 0,
            loop_iteration_carry: 1,
            local_namespace_carry: 0,
            loops: Vec::new(),
            cycles: HashMap::new(),
            stop_indices: HashMap::new(),
            macros: HashMap::new(),
            block_chains: HashMap::new(),
            extended: HashSet::new(),
        }
    }

    /// The environment this render is configured by.
    pub fn env(&self) -> &'env Environment {
        self.env
    }

    /// Whether auto-escaping is on for this render.
    pub fn auto_escape(&self) -> bool {
        self.env.auto_escape
    }

    /// The name of the template currently rendering.
    pub fn template_name(&self) -> &Arc<str> {
        &self.template_name
    }

    /// Returns true if `tag_name` is disabled in this render branch.
    pub fn is_tag_disabled(&self, tag_name: &str) -> bool {
        self.disabled_tags.contains(tag_name)
    }

    // Variable lookup and assignment.

    /// Resolves a head name against the scope chain: extended scopes
    /// innermost first, then locals, globals, matter and counters.
    pub fn resolve_name(&self, name: &str) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.get(name) {
                return Some(value.clone());
            }
        }
        if let Some(value) = self.locals.get(name) {
            return Some(value.clone());
        }
        if let Some(value) = self.globals.get(name) {
            return Some(value.clone());
        }
        if let Some(value) = self.matter.get(name) {
            return Some(value.clone());
        }
        self.counters.get(name).map(|count| Value::Int(*count))
    }

    /// Resolves a variable path.
    pub fn get(&mut self, path: &PathToken) -> Result<Value> {
        path::resolve(path, self)
    }

    /// Produces the value of an unresolved path: an `Undefined` value, or
    /// an error under the strict policy.
    pub fn undefined(&self, name: &str, path: &str, span: Span) -> Result<Value> {
        match self.env.undefined {
            UndefinedPolicy::Lenient => Ok(Value::Undefined(UndefinedValue {
                name: Arc::from(name),
                path: Arc::from(path),
                span,
            })),
            UndefinedPolicy::Strict => Err(Error::Undefined {
                name: name.to_string(),
                span,
            }),
        }
    }

    /// Adds `name` to the template's local namespace.
    pub fn assign(&mut self, name: impl Into<String>, value: Value, span: Span) -> Result<()> {
        self.locals.insert(name.into(), value);

        if let Some(limit) = self.env.local_namespace_limit {
            if self.locals_size() > limit {
                return Err(Error::LocalNamespaceLimit { span });
            }
        }
        Ok(())
    }

    /// An approximate byte size of the local namespace, including any
    /// carry inherited from the parent context.
    fn locals_size(&self) -> u64 {
        self.locals
            .values()
            .map(Value::size_estimate)
            .sum::<u64>()
            + self.local_namespace_carry
    }

    /// Returns the filter registered as `name`.
    pub fn filter(&self, name: &str, span: Span) -> Result<Arc<dyn Filter>> {
        self.env
            .filters
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownFilter {
                name: name.to_string(),
                span,
            })
    }

    // Scope management.

    /// Pushes a read-only namespace onto the scope chain.
    ///
    /// Callers are responsible for the matching [`RenderContext::pop_scope`]
    /// on every exit path.
    pub fn push_scope(&mut self, namespace: ValueMap, span: Span) -> Result<()> {
        if self.scopes.len() + BASE_SCOPE_DEPTH > self.env.context_depth_limit {
            return Err(Error::ContextDepth { span });
        }
        self.scopes.push(namespace);
        Ok(())
    }

    /// Pops the innermost extended scope.
    pub fn pop_scope(&mut self) -> Option<ValueMap> {
        self.scopes.pop()
    }

    /// Mutates a name in the innermost extended scope. Used by loops to
    /// update their loop variable without re-pushing a namespace.
    pub fn set_scope_value(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    /// Extends the scope chain for the duration of `body`.
    pub fn extend<T>(
        &mut self,
        namespace: ValueMap,
        span: Span,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.push_scope(namespace, span)?;
        let result = body(self);
        self.pop_scope();
        result
    }

    /// Swaps the current template identity while an `include` renders its
    /// partial. Returns the previous identity for restoration.
    pub fn enter_template(&mut self, name: Arc<str>, matter: ValueMap) -> (Arc<str>, ValueMap) {
        (
            std::mem::replace(&mut self.template_name, name),
            std::mem::replace(&mut self.matter, matter),
        )
    }

    /// Restores a template identity saved by
    /// [`RenderContext::enter_template`].
    pub fn restore_template(&mut self, saved: (Arc<str>, ValueMap)) {
        self.template_name = saved.0;
        self.matter = saved.1;
    }

    /// Builds a nested context for an isolated partial.
    ///
    /// With `block_scope` the whole current scope stays visible to the
    /// partial; otherwise only the render globals carry over.
    #[allow(clippy::too_many_arguments)]
    pub fn copy(
        &self,
        span: Span,
        namespace: ValueMap,
        template_name: Arc<str>,
        matter: ValueMap,
        disabled_tags: HashSet<String>,
        carry_loop_iterations: bool,
        block_scope: bool,
    ) -> Result<RenderContext<'env>> {
        if self.copy_depth >= self.env.context_depth_limit {
            return Err(Error::ContextDepth { span });
        }

        let mut globals = if block_scope {
            let mut flat = self.matter.clone();
            for (key, value) in &self.globals {
                flat.insert(key.clone(), value.clone());
            }
            for (key, value) in &self.locals {
                flat.insert(key.clone(), value.clone());
            }
            for scope in &self.scopes {
                for (key, value) in scope {
                    flat.insert(key.clone(), value.clone());
                }
            }
            flat
        } else {
            self.globals.clone()
        };
        for (key, value) in namespace {
            globals.insert(key, value);
        }

        let loop_iteration_carry = if carry_loop_iterations {
            self.loops
                .iter()
                .fold(self.loop_iteration_carry, |carry, length| {
                    carry.saturating_mul(*length)
                })
        } else {
            1
        };

        let mut ctx = RenderContext::new(self.env, template_name, globals, matter);
        ctx.disabled_tags = disabled_tags;
        ctx.copy_depth = self.copy_depth + 1;
        ctx.loop_iteration_carry = loop_iteration_carry;
        ctx.local_namespace_carry = self.locals_size();
        if block_scope {
            ctx.block_chains = self.block_chains.clone();
        }
        Ok(ctx)
    }

    // Loop bookkeeping.

    /// Checks the cumulative loop iteration budget before a loop of
    /// `length` iterations starts, then records the loop.
    pub fn push_loop(&mut self, length: u64, span: Span) -> Result<()> {
        if let Some(limit) = self.env.loop_iteration_limit {
            let total = self
                .loops
                .iter()
                .fold(
                    self.loop_iteration_carry.saturating_mul(length),
                    |total, inner| total.saturating_mul(*inner),
                );
            if total > limit {
                return Err(Error::LoopIterationLimit { span });
            }
        }
        self.loops.push(length);
        Ok(())
    }

    /// Pops the innermost loop record.
    pub fn pop_loop(&mut self) {
        self.loops.pop();
    }

    /// Sets or gets the stop index for a loop fingerprint, used by
    /// `offset: continue`.
    pub fn stop_index(&mut self, key: &str, index: Option<usize>) -> usize {
        match index {
            Some(index) => {
                self.stop_indices.insert(key.to_string(), index);
                index
            }
            None => self.stop_indices.get(key).copied().unwrap_or(0),
        }
    }

    // Stateful tags.

    /// Returns the next index in the named cycle.
    pub fn cycle(&mut self, cycle_hash: u64, length: usize) -> usize {
        let cursor = self.cycles.entry(cycle_hash).or_insert(0);
        let index = *cursor % length;
        *cursor = cursor.wrapping_add(1);
        index
    }

    /// Increments the named counter, returning its value before the
    /// increment.
    pub fn increment(&mut self, name: &str) -> i64 {
        let value = self.counters.get(name).copied().unwrap_or(0);
        self.counters.insert(name.to_string(), value + 1);
        value
    }

    /// Decrements the named counter, returning its value after the
    /// decrement.
    pub fn decrement(&mut self, name: &str) -> i64 {
        let value = self.counters.get(name).copied().unwrap_or(0) - 1;
        self.counters.insert(name.to_string(), value);
        value
    }
}

impl core::fmt::Debug for RenderContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RenderContext")
            .field("template_name", &self.template_name)
            .field("copy_depth", &self.copy_depth)
            .field("scopes", &self.scopes.len())
            .field("disabled_tags", &self.disabled_tags)
            .finish_non_exhaustive()
    }
}
