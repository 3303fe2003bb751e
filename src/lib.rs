// File: src/lib.rs
//
// Library interface for the Refl interpreter runtime.
// Exposes the AST contract, the panic type, the event loop and the
// evaluator for embedding hosts and integration tests.

pub mod ast;
pub mod errors;
pub mod event_loop;
pub mod interpreter;
