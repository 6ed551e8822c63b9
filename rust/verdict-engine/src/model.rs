//! In-memory DMN model.
//!
//! Produced by the XML reader with all FEEL text already parsed; evaluation
//! never touches source text again. The original cell text is retained for
//! diagnostics.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use verdict_feel::{Expr, FeelError, UnaryTests};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DmnModel {
    pub name: String,
    pub decisions: Vec<Decision>,
    pub bkms: Vec<BkmDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Decision {
    Table(DecisionTable),
    Literal(LiteralDecision),
}

impl Decision {
    pub fn name(&self) -> &str {
        match self {
            Decision::Table(t) => &t.name,
            Decision::Literal(l) => &l.name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTable {
    pub name: String,
    pub inputs: Vec<InputClause>,
    pub outputs: Vec<OutputClause>,
    pub rules: Vec<Rule>,
    pub hit_policy: HitPolicy,
    pub aggregation: Option<Aggregation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputClause {
    pub label: String,
    pub expression: Expr,
    pub expression_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputClause {
    pub name: String,
    /// Declared priority order, highest first. Required for PRIORITY and
    /// OUTPUT ORDER tables.
    pub priority_values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub tests: Vec<UnaryTests>,
    pub test_texts: Vec<String>,
    pub outputs: Vec<Expr>,
    pub output_texts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiteralDecision {
    pub name: String,
    pub expression: Expr,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BkmDef {
    pub name: String,
    pub parameters: Vec<String>,
    pub body: Expr,
    pub text: String,
}

/// DMN hit policy, parsed from either the single-letter code or the full
/// word used in `hitPolicy` attributes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[strum(ascii_case_insensitive)]
pub enum HitPolicy {
    #[default]
    #[strum(to_string = "UNIQUE", serialize = "U")]
    Unique,
    #[strum(to_string = "FIRST", serialize = "F")]
    First,
    #[strum(to_string = "PRIORITY", serialize = "P")]
    Priority,
    #[strum(to_string = "ANY", serialize = "A")]
    Any,
    #[strum(to_string = "COLLECT", serialize = "C")]
    Collect,
    #[strum(to_string = "RULE ORDER", serialize = "RULE_ORDER", serialize = "R")]
    RuleOrder,
    #[strum(to_string = "OUTPUT ORDER", serialize = "OUTPUT_ORDER", serialize = "O")]
    OutputOrder,
}

/// Aggregation applied under COLLECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Aggregation {
    #[strum(to_string = "SUM")]
    Sum,
    #[strum(to_string = "COUNT")]
    Count,
    #[strum(to_string = "MIN")]
    Min,
    #[strum(to_string = "MAX")]
    Max,
}

/// Failure while reading or validating a model.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("malformed DMN XML: {0}")]
    Xml(String),
    #[error("malformed model: {0}")]
    Model(String),
    #[error("element <{element}> is missing attribute '{attribute}'")]
    MissingAttribute { element: String, attribute: String },
    #[error("invalid FEEL in '{decision}' ({source_text}): {err}")]
    Feel {
        decision: String,
        source_text: String,
        err: FeelError,
    },
    #[error("decision '{decision}': rule {rule} has {found} entries, expected {expected}")]
    RuleArity {
        decision: String,
        rule: usize,
        expected: usize,
        found: usize,
    },
    #[error("decision '{decision}': output '{output}' needs declared priority values for {policy}")]
    MissingPriorities {
        decision: String,
        output: String,
        policy: HitPolicy,
    },
    #[error("cyclic reference: {0}")]
    Cycle(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn hit_policy_parses_codes_and_words() {
        assert_eq!(HitPolicy::from_str("U").unwrap(), HitPolicy::Unique);
        assert_eq!(HitPolicy::from_str("UNIQUE").unwrap(), HitPolicy::Unique);
        assert_eq!(HitPolicy::from_str("unique").unwrap(), HitPolicy::Unique);
        assert_eq!(
            HitPolicy::from_str("RULE ORDER").unwrap(),
            HitPolicy::RuleOrder
        );
        assert_eq!(
            HitPolicy::from_str("RULE_ORDER").unwrap(),
            HitPolicy::RuleOrder
        );
        assert!(HitPolicy::from_str("NOPE").is_err());
    }

    #[test]
    fn hit_policy_displays_dmn_words() {
        assert_eq!(HitPolicy::Unique.to_string(), "UNIQUE");
        assert_eq!(HitPolicy::OutputOrder.to_string(), "OUTPUT ORDER");
        assert_eq!(Aggregation::Sum.to_string(), "SUM");
    }

    #[test]
    fn aggregation_parses_case_insensitively() {
        assert_eq!(Aggregation::from_str("sum").unwrap(), Aggregation::Sum);
        assert_eq!(Aggregation::from_str("COUNT").unwrap(), Aggregation::Count);
    }
}
