//! Rule engine domain: values, classifier, compiler, stores and evaluator.
//!
//! ```text
//!  rules.txt ──▶ lexer ──▶ compiler ──▶ Arena + Programs
//!                              │
//!                         token::classify ◀── BindingCatalog (topics, commands, fields)
//!
//!  Trigger ──▶ RuleEngine::run ──▶ evaluator ──▶ VarTable ($ / #)
//!                                       └──────▶ bindings ──▶ RuleHost ports
//! ```

pub mod ast;
pub mod bindings;
pub mod compiler;
pub mod engine;
pub mod functions;
pub mod lexer;
pub mod store;
pub mod token;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{RuleEngine, RunReport, RunState};
pub use value::Value;
