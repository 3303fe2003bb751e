// File: src/interpreter/mod.rs
//
// Tree-walking interpreter for the Refl language.
// Executes Refl programs by traversing the Abstract Syntax Tree (AST).
//
// The interpreter evaluates statements against a chain of environments,
// producing values or control-flow signals. It supports:
// - Variable declaration and implicit globals through bare assignment
// - Closures capturing their defining scope
// - Method calls with the receiver passed as the first argument
// - Iteration over tables, strings, iterators and custom `__iter` tables
// - Timers, events and promises multiplexed on a single event loop
//
// Failures come in two flavours: panics (`errors::Panic`), which abort the
// current evaluation chain, and error values (`Object::Error`), which are
// ordinary data that scripts inspect.

// Module structure
mod async_runtime;
mod control_flow;
mod environment;
mod native_functions;
mod operators;
mod options;
mod promise;
mod table;
mod value;

pub use async_runtime::AsyncRuntime;
pub use environment::{Environment, WeakEnvironment};
pub use native_functions::{call_native_function, register_builtins};
pub use options::{Options, OutputBuffer};
pub use promise::Promise;
pub use table::Table;
pub use value::{
    format_number, FunctionObject, HashKey, IteratorObject, NativeFn, NativeFunction, Object, Producer, Sink,
    UserError,
};

// Internal-only imports
use control_flow::ControlFlow;

use crate::ast::{BinaryOp, Block, BlockRef, Expr, Program, Stmt, UnaryOp};
use crate::errors::{ErrorKind, Panic};
use crate::event_loop::{EventLoop, Task};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct Inner {
    options: Options,
    token: CancellationToken,
    event_loop: Option<EventLoop>,
}

/// Main interpreter handle. Clones share configuration, cancellation and
/// the event loop.
#[derive(Clone)]
pub struct Interpreter {
    inner: Arc<Inner>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("options", &self.inner.options)
            .field("event_loop", &self.inner.event_loop)
            .finish()
    }
}

impl Interpreter {
    /// Create an interpreter. An event loop is attached unless events are disabled.
    pub fn new(options: Options) -> Self {
        let token = options.cancellation().map(CancellationToken::child_token).unwrap_or_default();
        let event_loop = options.events_enabled().then(|| EventLoop::new(token.child_token()));
        Interpreter { inner: Arc::new(Inner { options, token, event_loop }) }
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    pub fn event_loop(&self) -> Option<&EventLoop> {
        self.inner.event_loop.as_ref()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Cancel this run: loops and sleeps panic with "context cancelled" and
    /// the event loop shuts down
    pub fn cancel(&self) {
        self.inner.token.cancel();
    }

    /// Register the builtins into `env`, evaluate `program`, then drive the
    /// event loop (if any) until it runs out of work.
    ///
    /// Blocks the calling thread. Call it from a plain thread (or via
    /// `spawn_blocking`) when embedding in a tokio application; otherwise
    /// `time.sleep` fails with a panic instead of waiting.
    pub fn run(&self, program: &Program, env: &Environment) -> Result<Object, Panic> {
        register_builtins(self, env);
        debug!(statements = program.statements.len(), "running program");

        let result = match self.eval_program(program, env) {
            Ok(value) => value,
            Err(panic) => {
                if let Some(event_loop) = &self.inner.event_loop {
                    event_loop.stop();
                }
                return Err(panic);
            }
        };

        if let Some(event_loop) = &self.inner.event_loop {
            event_loop.start()?;
            event_loop.wait();
            if let Some(panic) = event_loop.last_panic() {
                return Err(Panic::new(ErrorKind::EventLoop, format!("Event loop panic: {}", panic.message)));
            }
        }
        debug!("program finished");
        Ok(result)
    }

    /// Evaluate statements directly in `env` without builtins or the event loop.
    ///
    /// The result is the value of the last statement; a top-level `return`
    /// ends the program with its value.
    pub fn eval_program(&self, program: &Program, env: &Environment) -> Result<Object, Panic> {
        let mut result = Object::Nil;
        for stmt in &program.statements {
            match self.eval_stmt(stmt, env)? {
                ControlFlow::Normal(value) => result = value,
                ControlFlow::Return(value) => return Ok(value),
                signal => return Err(outside_loop(&signal).at(stmt.position())),
            }
        }
        Ok(result)
    }

    /// Call any callable value with positional arguments
    pub fn call_function(&self, callee: &Object, args: Vec<Object>) -> Result<Object, Panic> {
        match callee {
            Object::Function(func) => self.call_user_function(func, args),
            Object::Native(native) => native.call(self, args),
            _ => Err(Panic::new(ErrorKind::NotCallable, "attempt to call non-function")),
        }
    }

    fn call_user_function(&self, func: &FunctionObject, args: Vec<Object>) -> Result<Object, Panic> {
        let scope = func.env.child();
        for (index, param) in func.params.iter().enumerate() {
            scope.define(param.clone(), args.get(index).cloned().unwrap_or(Object::Nil));
        }
        scope.define("args", Object::Table(Table::from_array(args)));

        match self.eval_statements(&func.body.statements, &scope)? {
            ControlFlow::Normal(value) | ControlFlow::Return(value) => Ok(value),
            signal => Err(outside_loop(&signal)),
        }
    }

    /// Queue `run` on the event loop, or run it now when there is no loop
    pub fn enqueue(&self, run: Task) -> Result<(), Panic> {
        match &self.inner.event_loop {
            Some(event_loop) => {
                event_loop.enqueue(run);
                Ok(())
            }
            None => run(),
        }
    }

    /// Deferred call of a script callback; failures are relabelled by `describe`
    pub(crate) fn defer_call<F>(&self, callback: Object, args: Vec<Object>, describe: F) -> Result<(), Panic>
    where
        F: FnOnce(&Panic) -> String + Send + 'static,
    {
        let interp = self.clone();
        self.enqueue(Box::new(move || -> Result<(), Panic> {
            match interp.call_function(&callback, args) {
                Ok(_) => Ok(()),
                Err(err) => {
                    let message = describe(&err);
                    Err(Panic { message, ..err })
                }
            }
        }))
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), Panic> {
        if self.inner.token.is_cancelled() {
            Err(Panic::cancelled())
        } else {
            Ok(())
        }
    }

    /// Write a chunk of `io` output to the configured sink
    pub(crate) fn write_output(&self, text: &str) {
        if let Some(out) = self.inner.options.output() {
            out.lock().extend_from_slice(text.as_bytes());
        } else {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        }
    }

    /// Evaluates a single statement
    fn eval_stmt(&self, stmt: &Stmt, env: &Environment) -> Result<ControlFlow, Panic> {
        self.eval_stmt_inner(stmt, env).map_err(|e| e.at(stmt.position()))
    }

    fn eval_stmt_inner(&self, stmt: &Stmt, env: &Environment) -> Result<ControlFlow, Panic> {
        match stmt {
            Stmt::Var { name, value, .. } => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr, env)?,
                    None => Object::Nil,
                };
                env.define(name.clone(), value.clone());
                Ok(ControlFlow::Normal(value))
            }
            Stmt::Expression { expr, .. } => Ok(ControlFlow::Normal(self.eval_expr(expr, env)?)),
            Stmt::If { condition, then_branch, elif_branches, else_branch, .. } => {
                if self.eval_expr(condition, env)?.truthy() {
                    return self.eval_block(then_branch, env);
                }
                for branch in elif_branches {
                    if self.eval_expr(&branch.condition, env)?.truthy() {
                        return self.eval_block(&branch.body, env);
                    }
                }
                match else_branch {
                    Some(block) => self.eval_block(block, env),
                    None => Ok(ControlFlow::Normal(Object::Nil)),
                }
            }
            Stmt::While { condition, body, .. } => self.eval_while(condition, body, env),
            Stmt::For { key, value, iterable, body, .. } => {
                let iterable = self.eval_expr(iterable, env)?;
                self.eval_for(key, value.as_deref(), iterable, body, env)
            }
            Stmt::Block { block } => self.eval_block(block, env),
            Stmt::Break { .. } => Ok(ControlFlow::Break),
            Stmt::Continue { .. } => Ok(ControlFlow::Continue),
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr, env)?,
                    None => Object::Nil,
                };
                Ok(ControlFlow::Return(value))
            }
        }
    }

    /// Run a block in a fresh child scope
    fn eval_block(&self, block: &Block, env: &Environment) -> Result<ControlFlow, Panic> {
        let scope = env.child();
        self.eval_statements(&block.statements, &scope)
    }

    /// Run statements in `env`. Signals stop evaluation and propagate; otherwise
    /// the value is the last non-nil statement result.
    fn eval_statements(&self, statements: &[Stmt], env: &Environment) -> Result<ControlFlow, Panic> {
        let mut result = Object::Nil;
        for stmt in statements {
            match self.eval_stmt(stmt, env)? {
                ControlFlow::Normal(value) => {
                    if !value.is_nil() {
                        result = value;
                    }
                }
                signal => return Ok(signal),
            }
        }
        Ok(ControlFlow::Normal(result))
    }

    fn eval_while(&self, condition: &Expr, body: &Block, env: &Environment) -> Result<ControlFlow, Panic> {
        let mut result = Object::Nil;
        loop {
            self.check_cancelled()?;
            if !self.eval_expr(condition, env)?.truthy() {
                break;
            }
            match self.eval_block(body, env)? {
                ControlFlow::Normal(value) => result = value,
                ControlFlow::Continue => continue,
                ControlFlow::Break => return Ok(ControlFlow::Normal(Object::Nil)),
                ret @ ControlFlow::Return(_) => return Ok(ret),
            }
        }
        Ok(ControlFlow::Normal(result))
    }

    fn eval_for(
        &self,
        key: &str,
        value: Option<&str>,
        iterable: Object,
        body: &BlockRef,
        env: &Environment,
    ) -> Result<ControlFlow, Panic> {
        let loop_body = Arc::new(LoopBody {
            interp: self.clone(),
            env: env.clone(),
            key: key.to_string(),
            value: value.map(str::to_string),
            body: body.clone(),
            state: Mutex::new(LoopState { result: Object::Nil, returned: None, finished: false }),
        });

        if let Some(iter_fn) = custom_iterator(&iterable) {
            let yield_fn = LoopBody::yield_function(&loop_body);
            self.call_function(&iter_fn, vec![iterable.clone(), yield_fn])?;
        } else {
            if !iterable.is_iterable() {
                return Err(Panic::new(ErrorKind::NotIterable, "cannot iterate over non-iterable object"));
            }
            iterable.iterate(&mut |k, v| loop_body.step(k, v))?;
        }

        Ok(loop_body.finish())
    }

    fn eval_expr(&self, expr: &Expr, env: &Environment) -> Result<Object, Panic> {
        self.eval_expr_inner(expr, env).map_err(|e| e.at(expr.position()))
    }

    fn eval_expr_inner(&self, expr: &Expr, env: &Environment) -> Result<Object, Panic> {
        match expr {
            Expr::Identifier { name, .. } => Ok(env.get(name).unwrap_or(Object::Nil)),
            Expr::Number { value, .. } => Ok(Object::Number(*value)),
            Expr::String { value, .. } | Expr::RawString { value, .. } => Ok(Object::from(value.as_str())),
            Expr::Nil { .. } => Ok(Object::Nil),
            Expr::Object { properties, .. } => {
                let table = Table::new();
                let mut next_index = 0.0;
                for property in properties {
                    let value = self.eval_expr(&property.value, env)?;
                    match &property.key {
                        Some(key) => table.set_str(key, value),
                        None => {
                            table.set(Object::Number(next_index), value);
                            next_index += 1.0;
                        }
                    }
                }
                Ok(Object::Table(table))
            }
            Expr::Function { params, body, .. } => Ok(Object::Function(Arc::new(FunctionObject {
                params: params.clone(),
                body: body.clone(),
                env: env.child(),
            }))),
            Expr::MemberDot { object, member, .. } => {
                let object = self.eval_expr(object, env)?;
                if !object.is_indexable() {
                    return Err(Panic::new(ErrorKind::NotIndexable, "cannot access member of non-indexable object"));
                }
                object.get(&Object::from(member.as_str()))
            }
            Expr::MemberBracket { object, key, .. } => {
                let object = self.eval_expr(object, env)?;
                let key = self.eval_expr(key, env)?;
                if !object.is_indexable() {
                    return Err(Panic::new(ErrorKind::NotIndexable, "cannot access member of non-indexable object"));
                }
                object.get(&key)
            }
            Expr::Call { function, args, .. } => {
                let callee = self.eval_expr(function, env)?;
                if !callee.is_callable() {
                    return Err(Panic::new(ErrorKind::NotCallable, "attempt to call non-function"));
                }
                let args = self.eval_args(args, env)?;
                self.call_function(&callee, args)
            }
            Expr::MethodCall { object, method, args, .. } => {
                let receiver = self.eval_expr(object, env)?;
                if !receiver.is_indexable() {
                    return Err(Panic::new(ErrorKind::NotIndexable, "cannot access method of non-indexable object"));
                }
                let callee = receiver.get(&Object::from(method.as_str()))?;
                if !callee.is_callable() {
                    return Err(Panic::new(ErrorKind::NotCallable, "attempt to call non-function method"));
                }
                let mut call_args = Vec::with_capacity(args.len() + 1);
                call_args.push(receiver);
                call_args.extend(self.eval_args(args, env)?);
                self.call_function(&callee, call_args)
            }
            Expr::Unary { op, operand, .. } => {
                let operand = self.eval_expr(operand, env)?;
                match op {
                    UnaryOp::Not => Ok(operand.not()),
                    UnaryOp::Negate => operators::negate(&operand),
                }
            }
            Expr::Binary { left, op, right, .. } => {
                let left = self.eval_expr(left, env)?;
                match op {
                    // Short-circuit: the deciding operand is the result.
                    BinaryOp::And if !left.truthy() => Ok(left),
                    BinaryOp::Or if left.truthy() => Ok(left),
                    BinaryOp::And | BinaryOp::Or => self.eval_expr(right, env),
                    _ => {
                        let right = self.eval_expr(right, env)?;
                        operators::binary(*op, &left, &right)
                    }
                }
            }
            Expr::Assign { target, value, .. } => self.eval_assign(target, value, env),
        }
    }

    fn eval_args(&self, args: &[Expr], env: &Environment) -> Result<Vec<Object>, Panic> {
        args.iter().map(|arg| self.eval_expr(arg, env)).collect()
    }

    /// Right-hand side first, then the target
    fn eval_assign(&self, target: &Expr, value: &Expr, env: &Environment) -> Result<Object, Panic> {
        let value = self.eval_expr(value, env)?;
        match target {
            Expr::Identifier { name, .. } => env.set(name, value.clone()),
            Expr::MemberDot { object, member, pos } => {
                let object = self.eval_expr(object, env)?;
                object.set(Object::from(member.as_str()), value.clone()).map_err(|e| e.at(*pos))?;
            }
            Expr::MemberBracket { object, key, pos } => {
                let object = self.eval_expr(object, env)?;
                let key = self.eval_expr(key, env)?;
                object.set(key, value.clone()).map_err(|e| e.at(*pos))?;
            }
            _ => return Err(Panic::new(ErrorKind::InvalidAssignment, "invalid assignment target")),
        }
        Ok(value)
    }
}

fn outside_loop(signal: &ControlFlow) -> Panic {
    Panic::runtime(format!("{} outside loop", signal.signal_name()))
}

/// The `__iter` entry of a table, when it is callable
fn custom_iterator(iterable: &Object) -> Option<Object> {
    match iterable {
        Object::Table(table) => {
            let iter_fn = table.get_str("__iter");
            iter_fn.is_callable().then_some(iter_fn)
        }
        _ => None,
    }
}

struct LoopState {
    result: Object,
    returned: Option<Object>,
    finished: bool,
}

/// One for-loop, shared between the evaluator and the `yield` function
/// handed to custom iterators
struct LoopBody {
    interp: Interpreter,
    env: Environment,
    key: String,
    value: Option<String>,
    body: BlockRef,
    state: Mutex<LoopState>,
}

impl LoopBody {
    /// Run one iteration. Answers whether the loop wants another pair.
    fn step(&self, key: Object, value: Object) -> Result<bool, Panic> {
        if self.state.lock().finished {
            return Ok(false);
        }
        if let Err(err) = self.interp.check_cancelled() {
            self.state.lock().finished = true;
            return Err(err);
        }

        let scope = self.env.child();
        scope.define(self.key.clone(), key);
        if let Some(name) = &self.value {
            scope.define(name.clone(), value);
        }

        let flow = self.interp.eval_statements(&self.body.statements, &scope);
        let mut state = self.state.lock();
        match flow {
            Ok(ControlFlow::Normal(v)) => {
                state.result = v;
                Ok(true)
            }
            Ok(ControlFlow::Continue) => Ok(true),
            Ok(ControlFlow::Break) => {
                state.finished = true;
                state.result = Object::Nil;
                Ok(false)
            }
            Ok(ControlFlow::Return(v)) => {
                state.finished = true;
                state.returned = Some(v);
                Ok(false)
            }
            Err(err) => {
                state.finished = true;
                Err(err)
            }
        }
    }

    /// `yield(key, value)` for custom iterators: 1 while the loop wants more, 0 after
    fn yield_function(this: &Arc<LoopBody>) -> Object {
        let body = this.clone();
        Object::native("yield", move |_, args| {
            let mut args = args.into_iter();
            let key = args.next().unwrap_or(Object::Nil);
            let value = args.next().unwrap_or(Object::Nil);
            Ok(Object::boolean(body.step(key, value)?))
        })
    }

    fn finish(&self) -> ControlFlow {
        let mut state = self.state.lock();
        state.finished = true;
        match state.returned.take() {
            Some(value) => ControlFlow::Return(value),
            None => ControlFlow::Normal(std::mem::replace(&mut state.result, Object::Nil)),
        }
    }
}
