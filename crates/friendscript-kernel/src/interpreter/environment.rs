//! The evaluator.
//!
//! An [`Environment`] owns the module registry, the observer list and the
//! path resolvers, and walks a [`Program`] one block at a time against a
//! [`Scope`]. Evaluation is synchronous and fail-fast: the first error stops
//! the program, and the scope reached so far is handed back alongside it.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use regex::Regex;

use friendscript_types::coerce;
use friendscript_types::{CommandSchema, Object, Value};

use crate::ast::{
    Assignment, Block, Command, Condition, Conditional, Directive, DirectiveKind, Expr, FlowControl,
    FlowKind, IterSource, Loop, LoopKind, LoopStep, Program, Span, Statement,
};
use crate::config::EnvironmentConfig;
use crate::dispatch::{self, Module};
use crate::error::EvalError;
use crate::io::{self, PathIo, Reader, WriteMode, Writer};
use crate::parser::parse;

use super::context::{Context, ContextState, ObserverId, ObserverRegistry};
use super::control_flow::{Flow, Signal};
use super::ops;
use super::scope::Scope;

/// Loop counter every loop declares in its own frame.
pub const LOOP_INDEX: &str = "index";

/// Explicit prefix for the default module; `core::put` is `put`, unless a
/// host registers a module of its own under this name.
pub const CORE_MODULE: &str = "core";

/// Where a command's result goes when a guard or loop source needs it but the
/// script gave no `-> $var`.
pub const FORCED_OUTPUT: &str = "result";

/// Outcome of an evaluation: the final scope, plus the error that stopped
/// the program if there was one.
///
/// Mutations made before a failure are kept; callers decide whether a
/// partial scope is usable.
#[derive(Debug)]
pub struct Completion {
    pub scope: Scope,
    pub error: Option<EvalError>,
}

impl Completion {
    fn failed(root: Option<Scope>, error: EvalError) -> Self {
        Self {
            scope: root.unwrap_or_default(),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// The scope, or the error if evaluation failed.
    pub fn into_result(self) -> Result<Scope, EvalError> {
        match self.error {
            None => Ok(self.scope),
            Some(error) => Err(error),
        }
    }
}

/// The Friendscript evaluator.
pub struct Environment {
    config: EnvironmentConfig,
    modules: HashMap<String, Arc<dyn Module>>,
    observers: ObserverRegistry,
    eval_lock: Arc<Mutex<()>>,
    path_io: Arc<PathIo>,

    // Per-evaluation state.
    scope: Scope,
    source: String,
    contexts: Vec<Context>,
    loop_depth: i64,
    next_context_id: u64,
    patterns: HashMap<String, Regex>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(EnvironmentConfig::default())
    }
}

impl Environment {
    /// Create an environment. The bundled modules are registered unless the
    /// config turns them off.
    pub fn new(config: EnvironmentConfig) -> Self {
        let path_io = Arc::new(PathIo::new(config.working_dir.clone()));
        let builtins = config.builtin_modules;
        let mut env = Self {
            config,
            modules: HashMap::new(),
            observers: ObserverRegistry::new(),
            eval_lock: Arc::new(Mutex::new(())),
            path_io,
            scope: Scope::new(),
            source: String::new(),
            contexts: Vec::new(),
            loop_depth: 0,
            next_context_id: 0,
            patterns: HashMap::new(),
        };
        if builtins {
            crate::modules::register_builtins(&mut env);
        }
        env
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------

    /// Evaluate a parsed program against `root` (or a fresh scope).
    #[tracing::instrument(level = "info", skip(self, program, root), fields(env = %self.config.name, blocks = program.blocks.len()))]
    pub fn evaluate(&mut self, program: &Program, root: Option<Scope>) -> Completion {
        self.scope = root.unwrap_or_default();
        self.source = program.source.clone();
        self.contexts.clear();
        self.loop_depth = 0;

        let result = self.run_blocks(&program.blocks);
        let error = result.err().map(Signal::into_error);
        if let Some(error) = &error {
            tracing::debug!(%error, "evaluation failed");
        }

        Completion {
            scope: std::mem::take(&mut self.scope),
            error,
        }
    }

    /// Parse and evaluate source text.
    #[tracing::instrument(level = "info", skip(self, source, root), fields(env = %self.config.name, source_len = source.len()))]
    pub fn evaluate_source(&mut self, source: &str, root: Option<Scope>) -> Completion {
        match parse(source) {
            Ok(program) => self.evaluate(&program, root),
            Err(error) => Completion::failed(root, error.into()),
        }
    }

    /// Read a program from an untrusted stream and evaluate it.
    ///
    /// The read is bounded by [`EnvironmentConfig::read_timeout`].
    #[tracing::instrument(level = "info", skip(self, reader, root), fields(env = %self.config.name))]
    pub fn evaluate_reader<R>(&mut self, reader: R, root: Option<Scope>) -> Completion
    where
        R: Read + Send + 'static,
    {
        match io::read_source(reader, self.config.read_timeout) {
            Ok(source) => self.evaluate_source(&source, root),
            Err(error) => Completion::failed(root, error),
        }
    }

    /// Evaluate the program stored at `path`, opened through the path
    /// resolvers.
    #[tracing::instrument(level = "info", skip(self, path, root), fields(path = %path.as_ref().display()))]
    pub fn evaluate_path(&mut self, path: impl AsRef<Path>, root: Option<Scope>) -> Completion {
        match self.path_io.open_read(path.as_ref()) {
            Ok(reader) => self.evaluate_reader(reader, root),
            Err(error) => Completion::failed(root, error.into()),
        }
    }

    // ------------------------------------------------------------------
    // Host management
    // ------------------------------------------------------------------

    /// Register `module` under `prefix`; the empty prefix is the default
    /// module for bare command names. Returns the module it replaced.
    pub fn register_module<M>(&mut self, prefix: &str, module: M) -> Option<Arc<dyn Module>>
    where
        M: Module + 'static,
    {
        self.register_shared_module(prefix, Arc::new(module))
    }

    /// [`Environment::register_module`] for a module shared with the host.
    pub fn register_shared_module(&mut self, prefix: &str, module: Arc<dyn Module>) -> Option<Arc<dyn Module>> {
        tracing::debug!(prefix, module = module.name(), "registering module");
        self.modules.insert(prefix.to_string(), module)
    }

    pub fn unregister_module(&mut self, prefix: &str) -> Option<Arc<dyn Module>> {
        self.modules.remove(prefix)
    }

    pub fn module(&self, prefix: &str) -> Option<&Arc<dyn Module>> {
        self.modules.get(prefix)
    }

    /// Registered prefixes, sorted.
    pub fn modules(&self) -> Vec<&str> {
        let mut prefixes: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        prefixes.sort_unstable();
        prefixes
    }

    /// Schemas for every command of every module, ordered by prefix.
    pub fn commands(&self) -> Vec<CommandSchema> {
        self.modules()
            .into_iter()
            .filter_map(|prefix| self.modules.get(prefix))
            .flat_map(|module| module.schemas())
            .collect()
    }

    /// A handle to the observer list, usable from other threads.
    pub fn observers(&self) -> ObserverRegistry {
        self.observers.clone()
    }

    /// Call `observer` with the innermost context before and after every
    /// command.
    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// The lock held around every command invocation.
    ///
    /// A host driving its own loop can take it to keep the evaluator from
    /// starting the next command until it is released. Command handlers must
    /// not take it themselves.
    pub fn evaluation_lock(&self) -> Arc<Mutex<()>> {
        self.eval_lock.clone()
    }

    pub fn path_io(&self) -> Arc<PathIo> {
        self.path_io.clone()
    }

    pub fn register_path_reader<F>(&self, resolver: F)
    where
        F: Fn(&Path) -> Option<std::io::Result<Reader>> + Send + Sync + 'static,
    {
        self.path_io.register_reader(resolver);
    }

    pub fn register_path_writer<F>(&self, resolver: F)
    where
        F: Fn(&Path, WriteMode) -> Option<std::io::Result<Writer>> + Send + Sync + 'static,
    {
        self.path_io.register_writer(resolver);
    }

    // ------------------------------------------------------------------
    // Blocks and statements
    // ------------------------------------------------------------------

    fn run_blocks(&mut self, blocks: &[Block]) -> Flow {
        for block in blocks {
            self.run_block(block)?;
        }
        Ok(())
    }

    fn run_block(&mut self, block: &Block) -> Flow {
        match block {
            Block::Statements(block) => {
                for statement in &block.statements {
                    self.run_statement(statement)?;
                }
                Ok(())
            }
            Block::EventHandler(handler) => Err(EvalError::EventHandlersUnsupported(handler.event.clone()).into()),
            Block::Flow(flow) => self.run_flow(flow),
        }
    }

    fn run_flow(&mut self, flow: &FlowControl) -> Flow {
        if flow.level <= 0 || flow.level > self.loop_depth {
            return Err(EvalError::InvalidFlowControl.into());
        }
        Err(match flow.kind {
            FlowKind::Break => Signal::Break { levels: flow.level },
            FlowKind::Continue => Signal::Continue { levels: flow.level },
        })
    }

    fn run_statement(&mut self, statement: &Statement) -> Flow {
        tracing::trace!(kind = statement.kind_name(), offset = statement.span().offset, "statement");
        match statement {
            Statement::Assignment(assignment) => Ok(self.assign(assignment, false)?),
            Statement::Directive(directive) => Ok(self.directive(directive)?),
            Statement::Conditional(conditional) => self.conditional(conditional),
            Statement::Loop(lp) => self.run_loop(lp),
            Statement::Command(command) => {
                self.execute(command, false)?;
                Ok(())
            }
            Statement::NoOp(_) => Ok(()),
        }
    }

    /// Run an assignment. `declare` is set for guard and loop-initializer
    /// assignments, whose plain targets belong to the enclosing construct.
    fn assign(&mut self, assignment: &Assignment, declare: bool) -> Result<(), EvalError> {
        let values = assignment
            .values
            .iter()
            .map(|expr| self.eval_expr(expr))
            .collect::<Result<Vec<_>, _>>()?;
        let targets = &assignment.targets;
        let clears = assignment.op.clears_targets();

        if declare && clears {
            for target in targets {
                self.scope.declare(target);
            }
        }

        let values = match values.as_slice() {
            [Value::Array(items)] if targets.len() > 1 => items.clone(),
            _ => values,
        };

        for (position, target) in targets.iter().enumerate() {
            match values.get(position) {
                Some(value) => {
                    let combined = ops::assign(assignment.op, self.scope.get(target), value.clone())?;
                    self.scope.set(target, combined);
                }
                None if clears && !declare => self.scope.set(target, Value::Null),
                None => {}
            }
        }
        Ok(())
    }

    fn directive(&mut self, directive: &Directive) -> Result<(), EvalError> {
        match &directive.kind {
            DirectiveKind::Declare(names) => {
                for name in names {
                    self.scope.declare(name);
                }
                Ok(())
            }
            DirectiveKind::Unset(_) | DirectiveKind::Include(_) => Err(EvalError::NotImplemented(directive.keyword())),
        }
    }

    // ------------------------------------------------------------------
    // Conditionals
    // ------------------------------------------------------------------

    fn conditional(&mut self, conditional: &Conditional) -> Flow {
        self.enter_context("conditional", "if".to_string(), conditional.span);
        self.scope.push_block_frame();
        let result = self.run_conditional(conditional);
        self.scope.pop_frame();
        self.leave_context();
        result
    }

    fn run_conditional(&mut self, conditional: &Conditional) -> Flow {
        if self.test_condition(&conditional.condition)? != conditional.negated {
            return self.run_blocks(&conditional.then_blocks);
        }
        for branch in &conditional.else_ifs {
            if self.test_condition(&branch.condition)? != branch.negated {
                return self.run_blocks(&branch.then_blocks);
            }
        }
        match &conditional.else_blocks {
            Some(blocks) => self.run_blocks(blocks),
            None => Ok(()),
        }
    }

    fn test_condition(&mut self, condition: &Condition) -> Result<bool, EvalError> {
        match condition {
            Condition::Assignment { assignment, test } => {
                self.assign(assignment, true)?;
                self.test_condition(test)
            }
            Condition::Command { command, test } => {
                self.execute(command, true)?;
                match test {
                    Some(test) => self.test_condition(test),
                    None => Ok(self.scope.most_recent_value().is_some_and(|value| value.is_truthy())),
                }
            }
            Condition::Match {
                value,
                pattern,
                negated,
            } => {
                let text = self.eval_expr(value)?.as_text();
                let matched = self.pattern(pattern)?.is_match(&text);
                Ok(matched != *negated)
            }
            Condition::Compare { left, comparison } => {
                let left = self.eval_expr(left)?;
                match comparison {
                    None => Ok(left.is_truthy()),
                    Some((comparator, right)) => {
                        let right = self.eval_expr(right)?;
                        ops::compare(*comparator, &left, &right)
                    }
                }
            }
        }
    }

    /// Compiled form of a regex literal, cached per environment.
    fn pattern(&mut self, source: &str) -> Result<&Regex, EvalError> {
        match self.patterns.entry(source.to_string()) {
            Entry::Occupied(entry) => Ok(&*entry.into_mut()),
            Entry::Vacant(entry) => Ok(&*entry.insert(Regex::new(source)?)),
        }
    }

    // ------------------------------------------------------------------
    // Loops
    // ------------------------------------------------------------------

    fn run_loop(&mut self, lp: &Loop) -> Flow {
        if let LoopKind::Bounded { init, .. } = &lp.kind {
            self.loop_step(init, true)?;
        }

        self.enter_context("loop", "loop".to_string(), lp.span);
        self.scope.push_block_frame();
        self.scope.declare(LOOP_INDEX);
        self.loop_depth += 1;

        let result = self.loop_passes(lp);

        self.loop_depth -= 1;
        self.scope.pop_frame();
        self.leave_context();
        result
    }

    fn loop_passes(&mut self, lp: &Loop) -> Flow {
        let (items, limit) = match &lp.kind {
            LoopKind::Iterate { targets, source } => {
                for target in targets {
                    self.scope.declare(target);
                }
                (self.iteration_items(source)?, 0)
            }
            LoopKind::Count(expr) => (Vec::new(), self.loop_count(expr)?),
            _ => (Vec::new(), 0),
        };

        let mut index: i64 = 0;
        loop {
            match &lp.kind {
                LoopKind::Unconditional => {}
                LoopKind::Count(_) => {
                    if index >= limit {
                        break;
                    }
                }
                LoopKind::Iterate { targets, .. } => {
                    let Some(item) = usize::try_from(index).ok().and_then(|i| items.get(i)) else {
                        break;
                    };
                    self.bind_item(targets, item.clone());
                }
                LoopKind::Bounded { condition, .. } | LoopKind::While(condition) => {
                    if !self.test_condition(condition)? {
                        break;
                    }
                }
            }

            self.scope.set(LOOP_INDEX, Value::Int(index));

            if let Err(mut signal) = self.run_blocks(&lp.body) {
                if !signal.decrement_level() {
                    return Err(signal);
                }
                if matches!(signal, Signal::Break { .. }) {
                    return Ok(());
                }
            }

            if let LoopKind::Bounded { step, .. } = &lp.kind {
                self.loop_step(step, false)?;
            }
            index += 1;
        }
        Ok(())
    }

    fn loop_step(&mut self, step: &LoopStep, declare: bool) -> Result<(), EvalError> {
        match step {
            LoopStep::Assignment(assignment) => self.assign(assignment, declare),
            LoopStep::Command(command) => self.execute(command, false).map(|_| ()),
        }
    }

    fn loop_count(&self, expr: &Expr) -> Result<i64, EvalError> {
        let value = self.eval_expr(expr)?;
        if value.is_null() {
            return Ok(0);
        }
        let count = coerce::to_i64(&value).map_err(|e| EvalError::InvalidLoop(format!("bad iteration count: {e}")))?;
        if count < 0 {
            return Err(EvalError::InvalidLoop(format!("negative iteration count {count}")));
        }
        Ok(count)
    }

    /// Resolve an iteration source once, as the list of items to visit.
    ///
    /// Objects become `[key, value]` pairs in ascending key order.
    fn iteration_items(&mut self, source: &IterSource) -> Result<Vec<Value>, EvalError> {
        let value = match source {
            IterSource::Expr(expr) => self.eval_expr(expr)?,
            IterSource::Command(command) => {
                let output = self.execute(command, true)?;
                output.and_then(|name| self.scope.get(&name)).unwrap_or_default()
            }
        };

        Ok(match value {
            Value::Null => Vec::new(),
            Value::Array(items) => items,
            Value::Object(map) => {
                let mut pairs: Vec<(String, Value)> = map.into_iter().collect();
                pairs.sort_by(|a, b| a.0.cmp(&b.0));
                pairs
                    .into_iter()
                    .map(|(key, value)| Value::Array(vec![Value::String(key), value]))
                    .collect()
            }
            scalar => vec![scalar],
        })
    }

    fn bind_item(&mut self, targets: &[String], item: Value) {
        if let [target] = targets {
            self.scope.set(target, item);
            return;
        }
        let parts = match item {
            Value::Array(parts) => parts,
            other => vec![other],
        };
        for (position, target) in targets.iter().enumerate() {
            self.scope.set(target, parts.get(position).cloned().unwrap_or_default());
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Run a command and store its result.
    ///
    /// Returns the variable the result went to. With `force`, a command that
    /// names no output still stores its result, under [`FORCED_OUTPUT`], and
    /// the output is declared in the current frame.
    fn execute(&mut self, command: &Command, force: bool) -> Result<Option<String>, EvalError> {
        let prefix = command.module.as_deref().unwrap_or("");
        let module = self
            .modules
            .get(prefix)
            .or_else(|| (prefix == CORE_MODULE).then(|| self.modules.get("")).flatten())
            .cloned()
            .ok_or_else(|| EvalError::ModuleNotFound(prefix.to_string()))?;

        let first = command.positional.as_ref().map(|expr| self.eval_expr(expr)).transpose()?;
        let rest = match &command.options {
            Some(entries) => Some(Value::Object(self.eval_entries(entries)?)),
            None => None,
        };

        let label = module.format_name(&command.name);
        self.enter_context("command", label.clone(), command.span);
        self.broadcast();

        let started = Instant::now();
        let result = {
            let _guard = self.eval_lock.lock();
            dispatch::dispatch(module.as_ref(), &command.name, first, rest)
        };
        let elapsed = started.elapsed();

        if let Some(context) = self.contexts.last_mut() {
            context.elapsed = Some(elapsed);
            match &result {
                Ok(_) => context.state = ContextState::Finished,
                Err(error) => {
                    context.state = ContextState::Failed;
                    context.error = Some(error.to_string());
                }
            }
        }
        self.broadcast();
        self.leave_context();
        tracing::debug!(command = %label, ?elapsed, ok = result.is_ok(), "command finished");

        let value = result.map_err(|source| EvalError::Command {
            command: label,
            snippet: self.snippet(command.span),
            source,
        })?;

        let output = match (&command.output, force) {
            (Some(name), _) => name.clone(),
            (None, true) => FORCED_OUTPUT.to_string(),
            (None, false) => return Ok(None),
        };
        if force {
            self.scope.declare(&output);
        }
        self.scope.set(&output, value);
        Ok(Some(output))
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn eval_expr(&self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Interpolated(text) => Ok(Value::String(self.scope.interpolate(text))),
            Expr::Variable(name) => Ok(self.scope.get(name).unwrap_or_default()),
            Expr::Array(items) => items
                .iter()
                .map(|item| self.eval_expr(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Object(entries) => self.eval_entries(entries).map(Value::Object),
            Expr::Negate(inner) => match self.eval_expr(inner)? {
                Value::Int(i) => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| EvalError::Arithmetic(format!("integer overflow negating {i}"))),
                Value::Float(f) => Ok(Value::Float(-f)),
                Value::Null => Ok(Value::Int(0)),
                other => Err(EvalError::Type(format!("cannot negate {}", other.type_name()))),
            },
            Expr::Binary { left, op, right } => {
                let left = self.eval_expr(left)?;
                let right = self.eval_expr(right)?;
                ops::arithmetic(*op, &left, &right)
            }
        }
    }

    fn eval_entries(&self, entries: &[(String, Expr)]) -> Result<Object, EvalError> {
        let mut object = Object::new();
        for (key, expr) in entries {
            object.insert(key.clone(), self.eval_expr(expr)?);
        }
        Ok(object)
    }

    // ------------------------------------------------------------------
    // Contexts
    // ------------------------------------------------------------------

    fn snippet(&self, span: Span) -> String {
        span.slice(&self.source).unwrap_or_default().trim().to_string()
    }

    fn enter_context(&mut self, kind: &'static str, label: String, span: Span) {
        let id = self.next_context_id;
        self.next_context_id += 1;
        let context = Context {
            id,
            parent: self.contexts.last().map(|parent| parent.id),
            kind,
            label,
            span,
            snippet: self.snippet(span),
            state: ContextState::Running,
            started_at: Instant::now(),
            elapsed: None,
            error: None,
        };
        self.contexts.push(context);
    }

    fn leave_context(&mut self) {
        self.contexts.pop();
    }

    fn broadcast(&self) {
        if let Some(context) = self.contexts.last() {
            self.observers.broadcast(context);
        }
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("config", &self.config)
            .field("modules", &self.modules())
            .field("observers", &self.observers)
            .finish()
    }
}
