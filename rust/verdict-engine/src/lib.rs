//! DMN 1.5 decision engine.
//!
//! Load decision models from DMN XML, evaluate them against JSON-shaped
//! contexts, and get JSON-shaped results back. FEEL evaluation lives in
//! `verdict-feel`; this crate owns the model, the decision-table semantics,
//! and the engine façade.
//!
//! ```
//! use verdict_engine::Engine;
//! use serde_json::json;
//!
//! let xml = r#"
//! <definitions name="greetings">
//!   <decision name="Greeting">
//!     <literalExpression><text>"Hello " + Full Name</text></literalExpression>
//!   </decision>
//! </definitions>"#;
//!
//! let mut engine = Engine::new();
//! engine.load_model(xml).unwrap();
//! let result = engine.evaluate(&json!({"Full Name": "John Doe"}));
//! assert_eq!(result, json!({"Greeting": "Hello John Doe"}));
//! ```

pub mod engine;
pub mod json;
pub mod model;
mod table;
pub mod xml;

pub use engine::{evaluate, Engine, EvalOptions};
pub use json::{value_from_json, value_to_json};
pub use model::{
    Aggregation, BkmDef, Decision, DecisionTable, DmnModel, HitPolicy, InputClause,
    LiteralDecision, LoadError, OutputClause, Rule,
};
pub use verdict_core::{Diagnostic, EvalError, Severity};
