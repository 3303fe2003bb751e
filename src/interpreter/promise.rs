// File: src/interpreter/promise.rs
//
// Promise values built on the event loop.
//
// A promise settles at most once. Callbacks attached while pending are
// queued and handed to the event loop, one task each, at settlement; those
// attached afterwards are handed over immediately. Without an event loop
// the callbacks run inline.

use super::value::Object;
use super::Interpreter;
use crate::errors::Panic;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

enum PromiseState {
    Pending { then: Vec<Object>, catch: Vec<Object>, finally: Vec<Object> },
    Fulfilled(Object),
    Rejected(Object),
}

/// Shared promise handle; clones observe the same settlement
#[derive(Clone)]
pub struct Promise(Arc<Mutex<PromiseState>>);

impl Default for Promise {
    fn default() -> Self {
        Self::new()
    }
}

/// What a callback receives once the promise settles
fn callback_args(kind: Hook, outcome: &Object) -> Vec<Object> {
    match kind {
        Hook::Then => vec![outcome.clone()],
        Hook::Catch => vec![rejection_error(outcome)],
        Hook::Finally => Vec::new(),
    }
}

/// Rejection reasons reach `catch` as error values
fn rejection_error(reason: &Object) -> Object {
    match reason {
        Object::Error(_) => reason.clone(),
        other => Object::error(other.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hook {
    Then,
    Catch,
    Finally,
}

impl Hook {
    fn name(self) -> &'static str {
        match self {
            Hook::Then => "then",
            Hook::Catch => "catch",
            Hook::Finally => "finally",
        }
    }

    /// Label used when a delivered callback fails
    fn failure_label(self) -> &'static str {
        match self {
            Hook::Then => "resolve",
            Hook::Catch => "reject",
            Hook::Finally => "finally",
        }
    }
}

impl Promise {
    pub fn new() -> Self {
        Promise(Arc::new(Mutex::new(PromiseState::Pending {
            then: Vec::new(),
            catch: Vec::new(),
            finally: Vec::new(),
        })))
    }

    pub fn state_name(&self) -> &'static str {
        match &*self.0.lock() {
            PromiseState::Pending { .. } => "pending",
            PromiseState::Fulfilled(_) => "fulfilled",
            PromiseState::Rejected(_) => "rejected",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(&*self.0.lock(), PromiseState::Pending { .. })
    }

    /// Fulfil with `value`. Returns false if the promise had already settled.
    pub fn resolve(&self, interp: &Interpreter, value: Object) -> Result<bool, Panic> {
        self.settle(interp, PromiseState::Fulfilled(value))
    }

    /// Reject with `reason`. Returns false if the promise had already settled.
    pub fn reject(&self, interp: &Interpreter, reason: Object) -> Result<bool, Panic> {
        self.settle(interp, PromiseState::Rejected(reason))
    }

    fn settle(&self, interp: &Interpreter, outcome: PromiseState) -> Result<bool, Panic> {
        // Collect under the lock, deliver after releasing it: inline delivery
        // may re-enter this promise.
        let deliveries = {
            let mut state = self.0.lock();
            let PromiseState::Pending { then, catch, finally } = &mut *state else {
                return Ok(false);
            };
            let (primary, hook, value) = match &outcome {
                PromiseState::Fulfilled(v) => (std::mem::take(then), Hook::Then, v.clone()),
                PromiseState::Rejected(v) => (std::mem::take(catch), Hook::Catch, v.clone()),
                PromiseState::Pending { .. } => return Ok(false),
            };
            let finally = std::mem::take(finally);
            *state = outcome;

            let mut deliveries: Vec<(Hook, Object, Object)> =
                primary.into_iter().map(|cb| (hook, cb, value.clone())).collect();
            deliveries.extend(finally.into_iter().map(|cb| (Hook::Finally, cb, Object::Nil)));
            deliveries
        };

        for (hook, callback, value) in deliveries {
            deliver(interp, hook, callback, &value)?;
        }
        Ok(true)
    }

    fn attach(&self, interp: &Interpreter, hook: Hook, callback: Object) -> Result<(), Panic> {
        let ready = {
            let mut state = self.0.lock();
            match (&mut *state, hook) {
                (PromiseState::Pending { then, .. }, Hook::Then) => {
                    then.push(callback);
                    None
                }
                (PromiseState::Pending { catch, .. }, Hook::Catch) => {
                    catch.push(callback);
                    None
                }
                (PromiseState::Pending { finally, .. }, Hook::Finally) => {
                    finally.push(callback);
                    None
                }
                (PromiseState::Fulfilled(v), Hook::Then) => Some((callback, v.clone())),
                (PromiseState::Rejected(v), Hook::Catch) => Some((callback, v.clone())),
                (_, Hook::Finally) => Some((callback, Object::Nil)),
                // Settled the other way: this callback can never run.
                _ => None,
            }
        };
        match ready {
            Some((callback, value)) => deliver(interp, hook, callback, &value),
            None => Ok(()),
        }
    }

    pub fn then(&self, interp: &Interpreter, callback: Object) -> Result<(), Panic> {
        self.attach(interp, Hook::Then, callback)
    }

    pub fn catch(&self, interp: &Interpreter, callback: Object) -> Result<(), Panic> {
        self.attach(interp, Hook::Catch, callback)
    }

    pub fn finally(&self, interp: &Interpreter, callback: Object) -> Result<(), Panic> {
        self.attach(interp, Hook::Finally, callback)
    }

    /// Script-visible members: `then`, `catch` and `finally` bound to this promise
    pub(crate) fn member(&self, key: &Object) -> Object {
        let hook = match key.to_string().as_str() {
            "then" => Hook::Then,
            "catch" => Hook::Catch,
            "finally" => Hook::Finally,
            _ => return Object::Nil,
        };
        let promise = self.clone();
        Object::native(format!("promise.{}", hook.name()), move |interp, args| {
            // Accept both `p.then(fn)` and `p:then(fn)`.
            let mut args = args.as_slice();
            if let Some(Object::Promise(receiver)) = args.first() {
                if receiver.ptr_eq(&promise) {
                    args = &args[1..];
                }
            }
            if args.len() != 1 {
                return Err(Panic::argument(format!("{}() expects exactly 1 argument", hook.name())));
            }
            if !args[0].is_callable() {
                return Err(Panic::argument(format!("{}() argument must be a function", hook.name())));
            }
            promise.attach(interp, hook, args[0].clone())?;
            Ok(Object::Promise(promise.clone()))
        })
    }

    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

fn deliver(interp: &Interpreter, hook: Hook, callback: Object, outcome: &Object) -> Result<(), Panic> {
    let args = callback_args(hook, outcome);
    let label = hook.failure_label();
    interp.defer_call(callback, args, move |err| format!("promise {}() failed: {}", label, err.message))
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Promise<{}>", self.state_name())
    }
}
