//! Engine diagnostics.
//!
//! The engine never logs through a global; it appends to an ordered list of
//! diagnostics that the caller drains. Diagnostics are side-channel only and
//! never appear in result JSON.

use crate::span::Span;

/// Severity level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A single diagnostic entry, optionally tied to a decision and a source span.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub decision: Option<String>,
    pub message: String,
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn error(decision: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, decision, message)
    }

    pub fn warning(decision: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, decision, message)
    }

    pub fn note(decision: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(Severity::Note, decision, message)
    }

    fn new(severity: Severity, decision: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            severity,
            decision: decision.map(str::to_string),
            message: message.into(),
            span: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.severity)?;
        if let Some(decision) = &self.decision {
            write!(f, " {}:", decision)?;
        }
        write!(f, " {}", self.message)?;
        if let Some(span) = &self.span {
            write!(f, " @ {}", span)?;
        }
        Ok(())
    }
}
