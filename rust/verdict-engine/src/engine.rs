//! The engine façade: model registries, per-evaluation orchestration, and
//! the diagnostics channel.
//!
//! Lifecycle is publish-once, evaluate-many: models are loaded up front and
//! the registries are read-only during evaluation. One broken decision never
//! prevents the others from being reported — its slot in the result object
//! is null and the failure lands in diagnostics.

use indexmap::IndexMap;
use std::rc::Rc;
use verdict_core::{names, Diagnostic};
use verdict_feel::ast::{CallArg, Expr, UnaryTest, UnaryTests};
use verdict_feel::{Env, EvalConfig, Evaluator, FunctionValue, Value};

use crate::json::{value_from_json, value_to_json};
use crate::model::{Aggregation, BkmDef, Decision, DmnModel, HitPolicy, LoadError};
use crate::table::{evaluate_table, TableOptions};
use crate::xml;

/// Per-call evaluation options.
#[derive(Debug, Clone)]
pub struct EvalOptions {
    /// Elevate recoverable coercion failures to errors.
    pub strict_mode: bool,
    /// When set, `hit_policy_override` applies to every table in the call.
    pub override_hit_policy: bool,
    pub hit_policy_override: HitPolicy,
    /// Forces the aggregation used under COLLECT.
    pub collect_aggregation: Option<Aggregation>,
    /// Attach a per-rule match trace to diagnostics.
    pub debug_output: bool,
    /// Optional cap on loop/quantifier/filter steps per decision.
    pub max_iterations: Option<u64>,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            strict_mode: false,
            override_hit_policy: false,
            hit_policy_override: HitPolicy::default(),
            collect_aggregation: None,
            debug_output: false,
            max_iterations: None,
        }
    }
}

/// A stateful DMN engine.
#[derive(Debug, Default)]
pub struct Engine {
    decisions: IndexMap<String, Decision>,
    bkms: IndexMap<String, BkmDef>,
    diagnostics: Vec<Diagnostic>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse DMN XML and merge its decisions and BKMs into the registries.
    /// Duplicate names overwrite the previous registration with a warning.
    pub fn load_model(&mut self, xml: &str) -> Result<(), LoadError> {
        let model = xml::parse_model(xml)?;
        self.check_cycles(&model)?;
        for bkm in model.bkms {
            if self.bkms.insert(bkm.name.clone(), bkm.clone()).is_some() {
                self.diagnostics.push(Diagnostic::warning(
                    Some(&bkm.name),
                    "duplicate business knowledge model overwritten",
                ));
            }
        }
        for decision in model.decisions {
            let name = decision.name().to_string();
            if self.decisions.insert(name.clone(), decision).is_some() {
                self.diagnostics.push(Diagnostic::warning(
                    Some(&name),
                    "duplicate decision overwritten",
                ));
            }
        }
        Ok(())
    }

    pub fn remove_decision(&mut self, name: &str) -> bool {
        self.decisions.shift_remove(name).is_some()
    }

    pub fn remove_bkm(&mut self, name: &str) -> bool {
        self.bkms.shift_remove(name).is_some()
    }

    pub fn clear(&mut self) {
        self.decisions.clear();
        self.bkms.clear();
        self.diagnostics.clear();
    }

    pub fn decision_names(&self) -> Vec<String> {
        self.decisions.keys().cloned().collect()
    }

    pub fn bkm_names(&self) -> Vec<String> {
        self.bkms.keys().cloned().collect()
    }

    /// The ordered diagnostics channel. Never part of result JSON.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Re-check registered content and report issues without failing.
    pub fn validate_models(&self) -> Vec<Diagnostic> {
        let mut issues = Vec::new();
        for (name, decision) in &self.decisions {
            let Decision::Table(table) = decision else {
                continue;
            };
            if table.rules.is_empty() {
                issues.push(Diagnostic::warning(Some(name), "decision table has no rules"));
            }
            if table.inputs.is_empty() {
                issues.push(Diagnostic::warning(
                    Some(name),
                    "decision table has no input columns",
                ));
            }
            if matches!(table.hit_policy, HitPolicy::Priority | HitPolicy::OutputOrder) {
                for output in &table.outputs {
                    if output.priority_values.is_empty() {
                        issues.push(Diagnostic::error(
                            Some(name),
                            format!(
                                "output '{}' lacks priority values required by {}",
                                output.name, table.hit_policy
                            ),
                        ));
                    }
                }
            }
            if table.aggregation.is_some() && table.hit_policy != HitPolicy::Collect {
                issues.push(Diagnostic::note(
                    Some(name),
                    "aggregation is ignored outside COLLECT",
                ));
            }
        }
        issues
    }

    pub fn evaluate(&mut self, input: &serde_json::Value) -> serde_json::Value {
        self.evaluate_with_options(input, &EvalOptions::default())
    }

    /// Evaluate every registered decision against the input context, in
    /// registration order. Later decisions see earlier results by name.
    pub fn evaluate_with_options(
        &mut self,
        input: &serde_json::Value,
        options: &EvalOptions,
    ) -> serde_json::Value {
        let mut diagnostics = Vec::new();
        let mut root = IndexMap::new();
        // BKMs first so that input keys of the same name shadow them
        for (name, bkm) in &self.bkms {
            root.insert(
                name.clone(),
                Value::Function(FunctionValue {
                    parameters: bkm.parameters.clone(),
                    body: Rc::new(bkm.body.clone()),
                }),
            );
        }
        match value_from_json(input) {
            Value::Context(entries) => {
                for (k, v) in entries.iter() {
                    root.insert(k.clone(), v.clone());
                }
            }
            Value::Null => {}
            _ => diagnostics.push(Diagnostic::warning(
                None,
                "input is not a JSON object; evaluating with an empty context",
            )),
        }

        let mut env = Env::new(root);
        env.push_frame(); // decision results
        let config = EvalConfig {
            strict: options.strict_mode,
            max_iterations: options.max_iterations,
            ..EvalConfig::default()
        };
        let mut ev = Evaluator::new(env, config);
        let table_options = TableOptions {
            hit_policy_override: options
                .override_hit_policy
                .then_some(options.hit_policy_override),
            collect_aggregation: options.collect_aggregation,
            debug: options.debug_output,
        };

        let mut results = serde_json::Map::new();
        for (name, decision) in &self.decisions {
            ev.reset_counters();
            let outcome = match decision {
                Decision::Literal(literal) => ev.eval(&literal.expression),
                Decision::Table(table) => {
                    evaluate_table(&mut ev, table, &table_options, &mut diagnostics)
                }
            };
            let value = match outcome {
                Ok(v) => v,
                Err(err) => {
                    diagnostics.push(Diagnostic::error(Some(name), err.to_string()));
                    Value::Null
                }
            };
            results.insert(name.clone(), value_to_json(&value));
            ev.env.bind(name.clone(), value);
        }
        self.diagnostics.extend(diagnostics);
        serde_json::Value::Object(results)
    }

    // ── Cycle detection ──

    /// Reject decision/BKM reference cycles across the merged registries.
    fn check_cycles(&self, incoming: &DmnModel) -> Result<(), LoadError> {
        // merged view, incoming definitions replacing existing ones
        struct Node {
            display: String,
            refs: Vec<String>,
            is_bkm: bool,
        }
        let mut nodes: IndexMap<String, Node> = IndexMap::new();
        for (name, decision) in &self.decisions {
            nodes.insert(
                names::normalize(name),
                Node {
                    display: name.clone(),
                    refs: decision_refs(decision),
                    is_bkm: false,
                },
            );
        }
        for (name, bkm) in &self.bkms {
            nodes.insert(
                names::normalize(name),
                Node {
                    display: name.clone(),
                    refs: expr_refs(&bkm.body),
                    is_bkm: true,
                },
            );
        }
        for decision in &incoming.decisions {
            nodes.insert(
                names::normalize(decision.name()),
                Node {
                    display: decision.name().to_string(),
                    refs: decision_refs(decision),
                    is_bkm: false,
                },
            );
        }
        for bkm in &incoming.bkms {
            nodes.insert(
                names::normalize(&bkm.name),
                Node {
                    display: bkm.name.clone(),
                    refs: expr_refs(&bkm.body),
                    is_bkm: true,
                },
            );
        }

        let mut state: IndexMap<String, u8> = IndexMap::new(); // 1 visiting, 2 done
        let mut path = Vec::new();
        for key in nodes.keys() {
            if state.get(key).copied().unwrap_or(0) == 0 {
                visit(key, &nodes, &mut state, &mut path)?;
            }
        }
        return Ok(());

        fn visit(
            key: &str,
            nodes: &IndexMap<String, Node>,
            state: &mut IndexMap<String, u8>,
            path: &mut Vec<String>,
        ) -> Result<(), LoadError> {
            state.insert(key.to_string(), 1);
            let node = &nodes[key];
            path.push(node.display.clone());
            for reference in &node.refs {
                let target = names::normalize(reference);
                if !nodes.contains_key(&target) {
                    continue;
                }
                // direct BKM recursion is legal and bounded at runtime
                if node.is_bkm && target == key {
                    continue;
                }
                match state.get(&target).copied().unwrap_or(0) {
                    0 => visit(&target, nodes, state, path)?,
                    1 => {
                        let mut chain: Vec<String> = path.clone();
                        chain.push(nodes[&target].display.clone());
                        return Err(LoadError::Cycle(chain.join(" -> ")));
                    }
                    _ => {}
                }
            }
            path.pop();
            state.insert(key.to_string(), 2);
            Ok(())
        }
    }
}

/// One-shot entry: load a model and evaluate it against the input in a
/// throwaway engine.
pub fn evaluate(xml: &str, input: &serde_json::Value) -> Result<serde_json::Value, LoadError> {
    let mut engine = Engine::new();
    engine.load_model(xml)?;
    Ok(engine.evaluate(input))
}

fn decision_refs(decision: &Decision) -> Vec<String> {
    let mut out = Vec::new();
    match decision {
        Decision::Literal(literal) => collect_expr_names(&literal.expression, &mut out),
        Decision::Table(table) => {
            for clause in &table.inputs {
                collect_expr_names(&clause.expression, &mut out);
            }
            for rule in &table.rules {
                for tests in &rule.tests {
                    collect_test_names(tests, &mut out);
                }
                for output in &rule.outputs {
                    collect_expr_names(output, &mut out);
                }
            }
        }
    }
    out
}

fn expr_refs(expr: &Expr) -> Vec<String> {
    let mut out = Vec::new();
    collect_expr_names(expr, &mut out);
    out
}

fn collect_test_names(tests: &UnaryTests, out: &mut Vec<String>) {
    for test in &tests.alternatives {
        match test {
            UnaryTest::Wildcard(_) => {}
            UnaryTest::Compare(_, expr, _) | UnaryTest::Match(expr, _) => {
                collect_expr_names(expr, out)
            }
        }
    }
}

fn collect_expr_names(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::NumberLit(_, _)
        | Expr::StringLit(_, _)
        | Expr::BoolLit(_, _)
        | Expr::NullLit(_) => {}
        Expr::Name(name, _) => out.push(name.clone()),
        Expr::Neg(inner, _) | Expr::Not(inner, _) => collect_expr_names(inner, out),
        Expr::BinOp(lhs, _, rhs, _) => {
            collect_expr_names(lhs, out);
            collect_expr_names(rhs, out);
        }
        Expr::If {
            cond,
            then_val,
            else_val,
            ..
        } => {
            collect_expr_names(cond, out);
            collect_expr_names(then_val, out);
            collect_expr_names(else_val, out);
        }
        Expr::ForLoop {
            iterators, body, ..
        }
        | Expr::Quantified {
            iterators, body, ..
        } => {
            for (_, source) in iterators {
                collect_expr_names(source, out);
            }
            collect_expr_names(body, out);
        }
        Expr::Call { callee, args, .. } => {
            collect_expr_names(callee, out);
            for arg in args {
                match arg {
                    CallArg::Positional(e) | CallArg::Named(_, e) => collect_expr_names(e, out),
                }
            }
        }
        Expr::Path(base, _, _) => collect_expr_names(base, out),
        Expr::Index(base, idx, _) => {
            collect_expr_names(base, out);
            collect_expr_names(idx, out);
        }
        Expr::ContextLit(entries, _) => {
            for (_, value) in entries {
                collect_expr_names(value, out);
            }
        }
        Expr::ListLit(items, _) => {
            for item in items {
                collect_expr_names(item, out);
            }
        }
        Expr::RangeLit { lo, hi, .. } => {
            if let Some(lo) = lo {
                collect_expr_names(lo, out);
            }
            if let Some(hi) = hi {
                collect_expr_names(hi, out);
            }
        }
        Expr::Between {
            value, low, high, ..
        } => {
            collect_expr_names(value, out);
            collect_expr_names(low, out);
            collect_expr_names(high, out);
        }
        Expr::In(value, rhs, _) => {
            collect_expr_names(value, out);
            collect_expr_names(rhs, out);
        }
        Expr::InstanceOf(inner, _, _) => collect_expr_names(inner, out),
        Expr::FunctionDef { body, .. } => collect_expr_names(body, out),
    }
}
