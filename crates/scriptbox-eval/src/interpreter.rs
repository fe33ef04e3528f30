//! Tree-walking interpreter for checked snippet programs.
//!
//! Scopes, innermost first:
//!
//! ```text
//! comprehension frames → function frame → its captured closure
//!     → module locals → ambient globals → builtins
//! ```
//!
//! Top-level assignments go to module locals; the engine hands those back
//! to the caller. Globals are the interpreter's own copy of the ambient
//! context, so mutating them never reaches the caller.

use crate::builtins;
use crate::engine::EngineConfig;
use crate::error::{EvalResult, RuntimeError};
use crate::modules;
use crate::ops::{self, SliceBounds};
use crate::value::{Bindings, Closure, Dict, Key, Value};
use scriptbox_types::ast::*;
use std::sync::Arc;

/// How a statement finished.
#[derive(Debug)]
pub(crate) enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// One level of local scope.
struct Frame {
    vars: Bindings,
    /// `None` for a comprehension scope, which lookups fall through.
    closure: Option<Arc<Closure>>,
}

/// Where a value was read from, so a mutated copy can be stored back.
enum Place {
    Name(String),
    Item {
        parent: Box<Place>,
        container: Value,
        index: Value,
    },
    Temporary,
}

pub struct Interpreter {
    globals: Bindings,
    locals: Bindings,
    frames: Vec<Frame>,
    pub(crate) stdout: String,
    gas_limit: Option<u64>,
    steps: u64,
    max_call_depth: usize,
    call_depth: usize,
    /// Exceptions being handled, innermost last; bare `raise` re-raises.
    handling: Vec<RuntimeError>,
    fault_line: Option<u32>,
}

impl Interpreter {
    /// An interpreter whose globals are `globals`.
    pub fn new(globals: Bindings, config: &EngineConfig) -> Self {
        Self {
            globals,
            locals: Bindings::new(),
            frames: Vec::new(),
            stdout: String::new(),
            gas_limit: config.gas_limit,
            steps: 0,
            max_call_depth: config.max_call_depth,
            call_depth: 0,
            handling: Vec::new(),
            fault_line: None,
        }
    }

    /// Names assigned at module level, in first-assignment order.
    pub fn locals(&self) -> &Bindings {
        &self.locals
    }

    /// Text written by `print` so far.
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Line of the statement that raised the last uncaught error.
    pub fn fault_line(&self) -> Option<u32> {
        self.fault_line
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn into_parts(self) -> (Bindings, String) {
        (self.locals, self.stdout)
    }

    fn tick(&mut self) -> EvalResult<()> {
        self.steps += 1;
        match self.gas_limit {
            Some(limit) if self.steps > limit => Err(RuntimeError::GasExhausted(limit)),
            _ => Ok(()),
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Statements
    // ══════════════════════════════════════════════════════════════════════

    /// Run top-level statements.
    pub fn exec_block(&mut self, stmts: &[Stmt]) -> EvalResult<()> {
        self.exec_stmts(stmts).map(|_| ())
    }

    pub(crate) fn exec_stmts(&mut self, stmts: &[Stmt]) -> EvalResult<Flow> {
        for stmt in stmts {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> EvalResult<Flow> {
        self.tick()?;
        let result = self.exec_stmt_kind(stmt);
        if result.is_err() && self.fault_line.is_none() {
            self.fault_line = Some(stmt.span.start_line);
        }
        result
    }

    fn exec_stmt_kind(&mut self, stmt: &Stmt) -> EvalResult<Flow> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
            }
            StmtKind::AugAssign { target, op, value } => {
                let current = self.read_target(target)?;
                let rhs = self.eval(value)?;
                let updated = ops::binary(*op, &current, &rhs)?;
                self.assign(target, updated)?;
            }
            StmtKind::If(if_stmt) => {
                for branch in &if_stmt.branches {
                    if self.eval(&branch.condition)?.is_truthy() {
                        return self.exec_stmts(&branch.body.stmts);
                    }
                }
                if let Some(block) = &if_stmt.else_block {
                    return self.exec_stmts(&block.stmts);
                }
            }
            StmtKind::While { condition, body } => {
                while self.eval(condition)?.is_truthy() {
                    match self.exec_stmts(&body.stmts)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::For {
                target,
                iterable,
                body,
            } => {
                let iterable = self.eval(iterable)?;
                for item in ops::iterate(iterable)? {
                    self.assign(target, item)?;
                    match self.exec_stmts(&body.stmts)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::FunctionDef(def) => {
                let function = self.make_function(def)?;
                self.assign_name(&def.name.name, function);
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::Import(names) => {
                for import in names {
                    let module = modules::load(&import.name.name)?;
                    self.assign_name(import.bound_name(), Value::Module(module));
                }
            }
            StmtKind::ImportFrom { module, names } => {
                let module = modules::load(&module.name)?;
                for import in names {
                    let member = module.members.get(import.name.name.as_str()).ok_or_else(|| {
                        RuntimeError::Import(format!(
                            "cannot import name '{}' from '{}'",
                            import.name.name, module.name
                        ))
                    })?;
                    self.assign_name(import.bound_name(), member.clone());
                }
            }
            StmtKind::Raise(value) => return Err(self.raise(value.as_ref())?),
            StmtKind::Try(try_stmt) => return self.exec_try(try_stmt),
            StmtKind::Assert { condition, message } => {
                if !self.eval(condition)?.is_truthy() {
                    let message = match message {
                        Some(expr) => self.eval(expr)?.to_str(),
                        None => String::new(),
                    };
                    return Err(RuntimeError::Assertion(message));
                }
            }
        }
        Ok(Flow::Normal)
    }

    /// The error a `raise` statement produces.
    fn raise(&mut self, value: Option<&Expr>) -> EvalResult<RuntimeError> {
        let Some(expr) = value else {
            return Ok(self.handling.last().cloned().unwrap_or_else(|| RuntimeError::Raised {
                kind: "RuntimeError".into(),
                message: "No active exception to reraise".into(),
            }));
        };
        match self.eval(expr)? {
            Value::Exception { kind, message } => Ok(RuntimeError::from_exception(&kind, message)),
            Value::Builtin(name) if builtins::is_exception_type(name) => {
                Ok(RuntimeError::from_exception(name, ""))
            }
            other => Ok(RuntimeError::Type(format!(
                "exceptions must derive from BaseException, not '{}'",
                other.type_name()
            ))),
        }
    }

    fn exec_try(&mut self, try_stmt: &TryStmt) -> EvalResult<Flow> {
        let outcome = match self.exec_stmts(&try_stmt.body.stmts) {
            Err(err) if err.is_catchable() => self.handle(try_stmt, err),
            other => other,
        };
        if let Some(finally) = &try_stmt.finally {
            match self.exec_stmts(&finally.stmts)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        outcome
    }

    fn handle(&mut self, try_stmt: &TryStmt, err: RuntimeError) -> EvalResult<Flow> {
        let handler = try_stmt.handlers.iter().find(|handler| match &handler.kind {
            Some(kind) => err.matches(&kind.name),
            None => true,
        });
        let Some(handler) = handler else {
            return Err(err);
        };
        self.fault_line = None;
        if let Some(binding) = &handler.binding {
            let exception = Value::Exception {
                kind: err.kind().to_string(),
                message: err.message(),
            };
            self.assign_name(&binding.name, exception);
        }
        self.handling.push(err);
        let result = self.exec_stmts(&handler.body.stmts);
        self.handling.pop();
        if let Some(binding) = &handler.binding {
            self.unbind(&binding.name);
        }
        result
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════

    pub fn eval(&mut self, expr: &Expr) -> EvalResult<Value> {
        self.tick()?;
        match &expr.kind {
            ExprKind::Int(n) => Ok(Value::Int(*n)),
            ExprKind::Float(f) => Ok(Value::Float(*f)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::NoneLit => Ok(Value::None),
            ExprKind::FString(parts) => self.eval_fstring(parts),
            ExprKind::List(items) => Ok(Value::List(self.eval_all(items)?)),
            ExprKind::Tuple(items) => Ok(Value::Tuple(self.eval_all(items)?)),
            ExprKind::Dict(entries) => {
                let mut dict = Dict::new();
                for (key, value) in entries {
                    let key = self.eval(key)?;
                    let value = self.eval(value)?;
                    dict.insert(Key::from_value(&key)?, value);
                }
                Ok(Value::Dict(dict))
            }
            ExprKind::ListComp {
                element,
                generators,
            } => {
                let mut out = Vec::new();
                self.comprehension(generators, &mut |me| {
                    out.push(me.eval(element)?);
                    Ok(())
                })?;
                Ok(Value::List(out))
            }
            ExprKind::DictComp {
                key,
                value,
                generators,
            } => {
                let mut dict = Dict::new();
                self.comprehension(generators, &mut |me| {
                    let k = me.eval(key)?;
                    let v = me.eval(value)?;
                    dict.insert(Key::from_value(&k)?, v);
                    Ok(())
                })?;
                Ok(Value::Dict(dict))
            }
            ExprKind::Name(name) => self.lookup(name),
            ExprKind::Attribute { object, attr } => {
                let object = self.eval(object)?;
                get_attribute(&object, &attr.name)
            }
            ExprKind::Subscript { object, index } => {
                let object = self.eval(object)?;
                self.subscript(&object, index)
            }
            ExprKind::Slice { .. } => Err(RuntimeError::Type(
                "slice is only valid inside a subscript".into(),
            )),
            ExprKind::Call { func, args, kwargs } => self.eval_call(func, args, kwargs),
            ExprKind::Binary { left, op, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                ops::binary(*op, &left, &right)
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                ops::unary(*op, &operand)
            }
            ExprKind::BoolOp { op, left, right } => {
                let left = self.eval(left)?;
                let short_circuit = match op {
                    BoolOp::And => !left.is_truthy(),
                    BoolOp::Or => left.is_truthy(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            ExprKind::Compare { left, rest } => {
                let mut current = self.eval(left)?;
                for (op, right) in rest {
                    let right = self.eval(right)?;
                    if !ops::compare(*op, &current, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    current = right;
                }
                Ok(Value::Bool(true))
            }
            ExprKind::IfExp {
                condition,
                then,
                otherwise,
            } => {
                if self.eval(condition)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            ExprKind::Lambda(def) => self.make_function(def),
        }
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> EvalResult<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn eval_fstring(&mut self, parts: &[FStringPart]) -> EvalResult<Value> {
        let mut out = String::new();
        for part in parts {
            match part {
                FStringPart::Literal(text) => out.push_str(text),
                FStringPart::Field { expr, spec } => {
                    let value = self.eval(expr)?;
                    match spec {
                        Some(spec) => out.push_str(&crate::format::format_value(&value, spec)?),
                        None => out.push_str(&value.to_str()),
                    }
                }
            }
        }
        Ok(Value::Str(out))
    }

    fn subscript(&mut self, object: &Value, index: &Expr) -> EvalResult<Value> {
        match &index.kind {
            ExprKind::Slice { lower, upper, step } => {
                let bounds = self.slice_bounds(lower, upper, step)?;
                ops::get_slice(object, bounds)
            }
            _ => {
                let index = self.eval(index)?;
                ops::get_item(object, &index)
            }
        }
    }

    fn slice_bounds(
        &mut self,
        lower: &Option<Box<Expr>>,
        upper: &Option<Box<Expr>>,
        step: &Option<Box<Expr>>,
    ) -> EvalResult<SliceBounds> {
        let mut bound = |expr: &Option<Box<Expr>>| -> EvalResult<Option<i64>> {
            let Some(expr) = expr else { return Ok(None) };
            match self.eval(expr)? {
                Value::None => Ok(None),
                value => value.as_int().map(Some).ok_or_else(|| {
                    RuntimeError::Type(
                        "slice indices must be integers or None".to_string(),
                    )
                }),
            }
        };
        Ok(SliceBounds {
            lower: bound(lower)?,
            upper: bound(upper)?,
            step: bound(step)?,
        })
    }

    /// Run `emit` once per combination produced by the `for`/`if` clauses,
    /// inside a fresh comprehension scope.
    fn comprehension(
        &mut self,
        generators: &[Comprehension],
        emit: &mut dyn FnMut(&mut Self) -> EvalResult<()>,
    ) -> EvalResult<()> {
        self.frames.push(Frame {
            vars: Bindings::new(),
            closure: None,
        });
        let result = self.run_generators(generators, emit);
        self.frames.pop();
        result
    }

    fn run_generators(
        &mut self,
        generators: &[Comprehension],
        emit: &mut dyn FnMut(&mut Self) -> EvalResult<()>,
    ) -> EvalResult<()> {
        let Some((first, rest)) = generators.split_first() else {
            return emit(self);
        };
        let iterable = self.eval(&first.iterable)?;
        'items: for item in ops::iterate(iterable)? {
            self.assign(&first.target, item)?;
            for condition in &first.conditions {
                if !self.eval(condition)?.is_truthy() {
                    continue 'items;
                }
            }
            self.run_generators(rest, emit)?;
        }
        Ok(())
    }

    // ══════════════════════════════════════════════════════════════════════
    // Calls
    // ══════════════════════════════════════════════════════════════════════

    fn eval_call(&mut self, func: &Expr, args: &[Expr], kwargs: &[Keyword]) -> EvalResult<Value> {
        if let ExprKind::Attribute { object, attr } = &func.kind {
            return self.eval_method_call(object, &attr.name, args, kwargs);
        }
        let callee = self.eval(func)?;
        let args = self.eval_all(args)?;
        let kwargs = self.eval_kwargs(kwargs)?;
        self.call_value(&callee, args, kwargs)
    }

    fn eval_kwargs(&mut self, kwargs: &[Keyword]) -> EvalResult<Vec<(String, Value)>> {
        kwargs
            .iter()
            .map(|kw| Ok((kw.name.name.clone(), self.eval(&kw.value)?)))
            .collect()
    }

    /// `object.method(args)`. Container methods run on the stored value and
    /// the result is written back to where `object` lives.
    fn eval_method_call(
        &mut self,
        object: &Expr,
        method: &str,
        args: &[Expr],
        kwargs: &[Keyword],
    ) -> EvalResult<Value> {
        let (mut receiver, place) = self.eval_place(object)?;
        let args = self.eval_all(args)?;
        let kwargs = self.eval_kwargs(kwargs)?;

        if let Value::Module(module) = &receiver {
            let member = module.members.get(method).cloned().ok_or_else(|| {
                RuntimeError::Attribute(format!(
                    "module '{}' has no attribute '{method}'",
                    module.name
                ))
            })?;
            return self.call_value(&member, args, kwargs);
        }

        // Re-read the receiver after argument evaluation, which may have
        // changed it, and move it out of its slot for the call.
        if let Place::Name(name) = &place {
            if method != "sort" {
                if let Some(slot) = self.slot_mut(name) {
                    let mut owned = std::mem::take(slot);
                    let result = self.call_method(&mut owned, method, args, kwargs);
                    if let Some(slot) = self.slot_mut(name) {
                        *slot = owned;
                    }
                    return result;
                }
            }
        }

        let before = receiver.clone();
        let result = self.call_method(&mut receiver, method, args, kwargs)?;
        if receiver != before {
            self.store(place, receiver)?;
        }
        Ok(result)
    }

    /// Call any callable value.
    pub(crate) fn call_value(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> EvalResult<Value> {
        match callee {
            Value::Function(closure) => self.call_function(closure, args, kwargs),
            Value::Builtin(name) => self.call_builtin(name, args, kwargs),
            Value::Native(native) => {
                if !kwargs.is_empty() {
                    return Err(RuntimeError::Type(format!(
                        "{}() takes no keyword arguments",
                        native.name
                    )));
                }
                (native.func)(&args)
            }
            other => Err(RuntimeError::Type(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(
        &mut self,
        closure: &Arc<Closure>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> EvalResult<Value> {
        if self.call_depth >= self.max_call_depth {
            return Err(RuntimeError::RecursionLimit(
                "maximum recursion depth exceeded".into(),
            ));
        }
        let vars = bind_arguments(closure, args, kwargs)?;
        self.frames.push(Frame {
            vars,
            closure: Some(Arc::clone(closure)),
        });
        self.call_depth += 1;
        let flow = self.exec_stmts(&closure.def.body.stmts);
        self.call_depth -= 1;
        self.frames.pop();
        match flow? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }

    fn make_function(&mut self, def: &Arc<FunctionDef>) -> EvalResult<Value> {
        let mut defaults = Vec::with_capacity(def.params.len());
        for param in &def.params {
            defaults.push(match &param.default {
                Some(expr) => Some(self.eval(expr)?),
                None => None,
            });
        }
        Ok(Value::Function(Arc::new(Closure {
            def: Arc::clone(def),
            defaults,
            captured: self.capture(),
        })))
    }

    /// Locals visible at this point that a nested function may refer to.
    fn capture(&self) -> Bindings {
        let start = self
            .frames
            .iter()
            .rposition(|frame| frame.closure.is_some())
            .unwrap_or(0);
        let mut captured = Bindings::new();
        let Some(frames) = self.frames.get(start..) else {
            return captured;
        };
        if let Some(closure) = frames.first().and_then(|f| f.closure.as_ref()) {
            captured.extend(closure.captured.clone());
        }
        for frame in frames {
            captured.extend(frame.vars.clone());
        }
        captured
    }

    // ══════════════════════════════════════════════════════════════════════
    // Names & Places
    // ══════════════════════════════════════════════════════════════════════

    fn lookup(&self, name: &str) -> EvalResult<Value> {
        for frame in self.frames.iter().rev() {
            if let Some(value) = frame.vars.get(name) {
                return Ok(value.clone());
            }
            if let Some(closure) = &frame.closure {
                if let Some(value) = closure.captured.get(name) {
                    return Ok(value.clone());
                }
                if closure.def.name.name == name {
                    return Ok(Value::Function(Arc::clone(closure)));
                }
                break;
            }
        }
        self.locals
            .get(name)
            .or_else(|| self.globals.get(name))
            .cloned()
            .or_else(|| builtins::lookup(name))
            .ok_or_else(|| RuntimeError::Name(format!("name '{name}' is not defined")))
    }

    /// The storage slot currently holding `name`, if it is a variable.
    fn slot_mut(&mut self, name: &str) -> Option<&mut Value> {
        let mut in_frames = None;
        for (i, frame) in self.frames.iter().enumerate().rev() {
            if frame.vars.contains_key(name) {
                in_frames = Some(i);
                break;
            }
            if frame.closure.is_some() {
                break;
            }
        }
        if let Some(i) = in_frames {
            return self.frames[i].vars.get_mut(name);
        }
        if self.innermost_function().is_some() {
            // Captured or outer names are read-only from inside a function.
            if self.frames.iter().rev().any(|f| {
                f.closure
                    .as_ref()
                    .is_some_and(|c| c.captured.contains_key(name))
            }) {
                return None;
            }
        }
        if self.locals.contains_key(name) {
            return self.locals.get_mut(name);
        }
        self.globals.get_mut(name)
    }

    fn innermost_function(&self) -> Option<&Frame> {
        self.frames.iter().rev().find(|f| f.closure.is_some())
    }

    /// Bind `name` in the innermost scope.
    pub(crate) fn assign_name(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) => {
                frame.vars.insert(name.to_string(), value);
            }
            None => {
                self.locals.insert(name.to_string(), value);
            }
        }
    }

    fn unbind(&mut self, name: &str) {
        match self.frames.last_mut() {
            Some(frame) => {
                frame.vars.shift_remove(name);
            }
            None => {
                self.locals.shift_remove(name);
            }
        }
    }

    /// Assign `value` to a target, unpacking tuples.
    pub fn assign(&mut self, target: &Target, value: Value) -> EvalResult<()> {
        match target {
            Target::Name(ident) => {
                self.assign_name(&ident.name, value);
                Ok(())
            }
            Target::Subscript { object, index, .. } => {
                let (container, place) = self.eval_place(object)?;
                let updated = match &index.kind {
                    ExprKind::Slice { lower, upper, step } => {
                        let bounds = self.slice_bounds(lower, upper, step)?;
                        ops::set_slice(container, bounds, value)?
                    }
                    _ => {
                        let index = self.eval(index)?;
                        ops::set_item(container, &index, value)?
                    }
                };
                self.store(place, updated)
            }
            Target::Tuple(targets, _) => {
                let items = ops::iterate(value)?;
                if items.len() != targets.len() {
                    return Err(RuntimeError::Value(if items.len() > targets.len() {
                        format!("too many values to unpack (expected {})", targets.len())
                    } else {
                        format!(
                            "not enough values to unpack (expected {}, got {})",
                            targets.len(),
                            items.len()
                        )
                    }));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
                Ok(())
            }
        }
    }

    /// Current value of an assignment target.
    pub fn read_target(&mut self, target: &Target) -> EvalResult<Value> {
        match target {
            Target::Name(ident) => self.lookup(&ident.name),
            Target::Subscript { object, index, .. } => {
                let object = self.eval(object)?;
                self.subscript(&object, index)
            }
            Target::Tuple(targets, _) => {
                let mut items = Vec::with_capacity(targets.len());
                for target in targets {
                    items.push(self.read_target(target)?);
                }
                Ok(Value::Tuple(items))
            }
        }
    }

    fn eval_place(&mut self, expr: &Expr) -> EvalResult<(Value, Place)> {
        match &expr.kind {
            ExprKind::Name(name) => Ok((self.lookup(name)?, Place::Name(name.clone()))),
            ExprKind::Subscript { object, index }
                if !matches!(index.kind, ExprKind::Slice { .. }) =>
            {
                let (container, parent) = self.eval_place(object)?;
                let index = self.eval(index)?;
                let value = ops::get_item(&container, &index)?;
                let place = Place::Item {
                    parent: Box::new(parent),
                    container,
                    index,
                };
                Ok((value, place))
            }
            _ => Ok((self.eval(expr)?, Place::Temporary)),
        }
    }

    /// Write `value` back to `place`, rebuilding parent containers.
    fn store(&mut self, place: Place, value: Value) -> EvalResult<()> {
        match place {
            Place::Name(name) => {
                match self.slot_mut(&name) {
                    Some(slot) => *slot = value,
                    None => self.assign_name(&name, value),
                }
                Ok(())
            }
            Place::Item {
                parent,
                container,
                index,
            } => {
                let updated = ops::replace_item(container, &index, value)?;
                self.store(*parent, updated)
            }
            Place::Temporary => Ok(()),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn bind_arguments(
    closure: &Closure,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> EvalResult<Bindings> {
    let def = &closure.def;
    let name = &def.name.name;
    let params = &def.params;
    if args.len() > params.len() {
        return Err(RuntimeError::Type(format!(
            "{name}() takes {} positional argument{} but {} {} given",
            params.len(),
            if params.len() == 1 { "" } else { "s" },
            args.len(),
            if args.len() == 1 { "was" } else { "were" },
        )));
    }
    let mut slots: Vec<Option<Value>> = vec![None; params.len()];
    for (slot, arg) in slots.iter_mut().zip(args) {
        *slot = Some(arg);
    }
    for (key, value) in kwargs {
        let Some(i) = params.iter().position(|p| p.name.name == key) else {
            return Err(RuntimeError::Type(format!(
                "{name}() got an unexpected keyword argument '{key}'"
            )));
        };
        if slots[i].is_some() {
            return Err(RuntimeError::Type(format!(
                "{name}() got multiple values for argument '{key}'"
            )));
        }
        slots[i] = Some(value);
    }

    let mut vars = Bindings::with_capacity(params.len());
    let mut missing = Vec::new();
    for ((param, slot), default) in params.iter().zip(slots).zip(&closure.defaults) {
        match slot.or_else(|| default.clone()) {
            Some(value) => {
                vars.insert(param.name.name.clone(), value);
            }
            None => missing.push(format!("'{}'", param.name.name)),
        }
    }
    if !missing.is_empty() {
        return Err(RuntimeError::Type(format!(
            "{name}() missing {} required positional argument{}: {}",
            missing.len(),
            if missing.len() == 1 { "" } else { "s" },
            missing.join(" and ")
        )));
    }
    Ok(vars)
}

/// `object.attr` outside a call.
fn get_attribute(object: &Value, attr: &str) -> EvalResult<Value> {
    match object {
        Value::Module(module) => module.members.get(attr).cloned().ok_or_else(|| {
            RuntimeError::Attribute(format!(
                "module '{}' has no attribute '{attr}'",
                module.name
            ))
        }),
        Value::Exception { message, .. } if attr == "args" => {
            Ok(Value::Tuple(vec![Value::Str(message.clone())]))
        }
        other if crate::methods::has_method(other, attr) => Err(RuntimeError::Attribute(format!(
            "'{}' method '{attr}' must be called directly",
            other.type_name()
        ))),
        other => Err(RuntimeError::Attribute(format!(
            "'{}' object has no attribute '{attr}'",
            other.type_name()
        ))),
    }
}
