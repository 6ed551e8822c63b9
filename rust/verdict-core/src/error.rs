//! Runtime error taxonomy.
//!
//! Arithmetic and coercion failures normally collapse to null inside the
//! evaluator and never surface as `EvalError`; the variants here either mark
//! strict-mode elevations of those failures or genuinely unrecoverable
//! conditions that null out a single decision.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("no variable named '{0}'")]
    NameNotFound(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("hit policy violation: {0}")]
    HitPolicyViolation(String),
    #[error("recursion limit of {0} exceeded")]
    RecursionLimit(u32),
    #[error("iteration limit of {0} exceeded")]
    IterationLimit(u64),
}
