// File: src/interpreter/control_flow.rs
//
// Control flow signals for loop statements and early returns.
//
// Statement evaluation returns a ControlFlow instead of a bare value so that
// break/continue/return can unwind through nested blocks without being
// confused with ordinary results. Signals never escape into expression
// values: loops consume Break/Continue and calls consume Return.

use super::value::Object;

/// Outcome of evaluating a statement or block
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ControlFlow {
    /// Normal completion with the statement's value
    Normal(Object),
    /// Break statement encountered, exit the innermost loop
    Break,
    /// Continue statement encountered, skip to next loop iteration
    Continue,
    /// Return statement encountered, unwind to the enclosing call
    Return(Object),
}

impl ControlFlow {
    /// Name used when a loop signal reaches a boundary with no loop to catch it
    pub(crate) fn signal_name(&self) -> &'static str {
        match self {
            ControlFlow::Normal(_) => "value",
            ControlFlow::Break => "break",
            ControlFlow::Continue => "continue",
            ControlFlow::Return(_) => "return",
        }
    }
}
