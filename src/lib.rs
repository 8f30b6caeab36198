//! `chainplan` library: static reasoning-chain compilation and replay.
//!
//! The crate provides the chain data model (`chain`), normalization and
//! signing (`canonical`, `signing`, `compiler`), and the sequential chain
//! interpreter (`execute`) with its model boundary (`model`).
//!
//! Invariants:
//! - compiled `llm_call` steps always carry `temperature = 0.0`
//! - the signature covers the normalized chain, never the `meta` block
//! - steps execute strictly in declared order; the result is the output of
//!   the last declared step
//! - the compiled artifact is the only contract between compiler and
//!   interpreter

pub mod canonical;
pub mod chain;
pub mod compiler;
pub mod context;
pub mod error;
pub mod execute;
pub mod model;
pub mod prompt;
pub mod repro;
pub mod signing;
pub mod trace;

pub use compiler::{compile, CompiledPlan};
pub use context::{InputValue, Inputs};
pub use error::PlanError;
pub use execute::{execute, Interpreter};
