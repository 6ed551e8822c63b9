//! Shared primitives for the Verdict decision engine.
//!
//! Home of the pieces every layer needs: source spans, DMN-style name
//! normalization, the diagnostics channel, and the evaluation error taxonomy.

pub mod diag;
pub mod error;
pub mod names;
pub mod span;

pub use diag::{Diagnostic, Severity};
pub use error::EvalError;
pub use span::Span;
