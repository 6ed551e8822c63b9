//! Tree-walking evaluator for FEEL expressions.
//!
//! Evaluation never panics. Coercion failures, unresolvable names, and
//! division by zero collapse to null per DMN semantics; strict mode elevates
//! them to `EvalError` instead. Recursion and iteration limits are always
//! errors — they surface at the decision boundary.

use chrono::Months;
use rust_decimal::prelude::{FromPrimitive, MathematicalOps, ToPrimitive};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::rc::Rc;
use verdict_core::EvalError;

use crate::ast::{BinOp, CallArg, CmpOp, Expr, QuantifierKind, UnaryTest, UnaryTests};
use crate::builtins;
use crate::env::Env;
use crate::value::{FeelDuration, FunctionValue, Value};

/// Knobs honored during a single evaluation.
#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Elevate recoverable nulls to errors.
    pub strict: bool,
    /// Function-call depth cap.
    pub max_depth: u32,
    /// Optional cap on total loop/quantifier/filter steps.
    pub max_iterations: Option<u64>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            strict: false,
            max_depth: 64,
            max_iterations: None,
        }
    }
}

pub struct Evaluator {
    pub env: Env,
    config: EvalConfig,
    depth: u32,
    iterations: u64,
}

impl Evaluator {
    pub fn new(env: Env, config: EvalConfig) -> Self {
        Self {
            env,
            config,
            depth: 0,
            iterations: 0,
        }
    }

    pub fn with_env(env: Env) -> Self {
        Self::new(env, EvalConfig::default())
    }

    /// Reset the per-decision depth and iteration counters.
    pub fn reset_counters(&mut self) {
        self.depth = 0;
        self.iterations = 0;
    }

    /// Null out a recoverable failure, or surface it under strict mode.
    pub(crate) fn recover(&self, err: EvalError) -> Result<Value, EvalError> {
        if self.config.strict {
            Err(err)
        } else {
            Ok(Value::Null)
        }
    }

    fn tick(&mut self) -> Result<(), EvalError> {
        self.iterations += 1;
        if let Some(max) = self.config.max_iterations {
            if self.iterations > max {
                return Err(EvalError::IterationLimit(max));
            }
        }
        Ok(())
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::NumberLit(n, _) => Ok(Value::Number(*n)),
            Expr::StringLit(s, _) => Ok(Value::String(s.clone())),
            Expr::BoolLit(b, _) => Ok(Value::Boolean(*b)),
            Expr::NullLit(_) => Ok(Value::Null),
            Expr::Name(name, _) => match self.env.lookup(name) {
                Some(v) => Ok(v.clone()),
                None => self.recover(EvalError::NameNotFound(name.clone())),
            },
            Expr::Neg(inner, _) => {
                let v = self.eval(inner)?;
                if v.is_null() {
                    return Ok(Value::Null);
                }
                match v.as_number() {
                    Some(n) => Ok(Value::Number(-n)),
                    None => self.recover(EvalError::TypeMismatch(format!(
                        "cannot negate {}",
                        v.type_name()
                    ))),
                }
            }
            Expr::Not(inner, _) => {
                let v = self.eval(inner)?;
                Ok(match v.as_boolean() {
                    Some(b) => Value::Boolean(!b),
                    None => Value::Null,
                })
            }
            Expr::BinOp(lhs, op, rhs, _) => self.eval_binop(lhs, *op, rhs),
            Expr::If {
                cond,
                then_val,
                else_val,
                ..
            } => {
                let c = self.eval(cond)?;
                if c.as_boolean() == Some(true) {
                    self.eval(then_val)
                } else {
                    self.eval(else_val)
                }
            }
            Expr::ForLoop {
                iterators, body, ..
            } => self.eval_for(iterators, body),
            Expr::Quantified {
                kind,
                iterators,
                body,
                ..
            } => self.eval_quantified(*kind, iterators, body),
            Expr::Call { callee, args, .. } => self.eval_call(callee, args),
            Expr::Path(base, name, _) => {
                let v = self.eval(base)?;
                match v {
                    Value::Context(entries) => Ok(verdict_core::names::lookup(&entries, name)
                        .cloned()
                        .unwrap_or(Value::Null)),
                    // path over a list of contexts projects the member
                    Value::List(items) => Ok(Value::list(
                        items
                            .iter()
                            .map(|item| match item {
                                Value::Context(entries) => {
                                    verdict_core::names::lookup(entries, name)
                                        .cloned()
                                        .unwrap_or(Value::Null)
                                }
                                _ => Value::Null,
                            })
                            .collect(),
                    )),
                    Value::Null => Ok(Value::Null),
                    other => self.recover(EvalError::TypeMismatch(format!(
                        "cannot access member '{}' of {}",
                        name,
                        other.type_name()
                    ))),
                }
            }
            Expr::Index(base, idx, _) => self.eval_index(base, idx),
            Expr::ContextLit(entries, _) => {
                self.env.push_frame();
                let result = self.eval_context_entries(entries);
                self.env.pop_frame();
                result
            }
            Expr::ListLit(items, _) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item)?);
                }
                Ok(Value::list(out))
            }
            Expr::RangeLit {
                lo,
                hi,
                lo_inclusive,
                hi_inclusive,
                ..
            } => {
                let lo = match lo {
                    Some(e) => Some(self.eval(e)?),
                    None => None,
                };
                let hi = match hi {
                    Some(e) => Some(self.eval(e)?),
                    None => None,
                };
                Ok(Value::range(lo, hi, *lo_inclusive, *hi_inclusive))
            }
            Expr::Between {
                value, low, high, ..
            } => {
                let v = self.eval(value)?;
                let lo = self.eval(low)?;
                let hi = self.eval(high)?;
                if v.is_null() || lo.is_null() || hi.is_null() {
                    return Ok(Value::Null);
                }
                match (v.compare(&lo), v.compare(&hi)) {
                    (Some(a), Some(b)) => {
                        Ok(Value::Boolean(a != Ordering::Less && b != Ordering::Greater))
                    }
                    _ => Ok(Value::Null),
                }
            }
            Expr::In(value, rhs, _) => {
                let l = self.eval(value)?;
                let r = self.eval(rhs)?;
                match r {
                    Value::Range(range) => Ok(match range.contains(&l) {
                        Some(b) => Value::Boolean(b),
                        None => Value::Null,
                    }),
                    Value::List(items) => {
                        if l.is_null() && !items.iter().any(|i| i.is_null()) {
                            return Ok(Value::Null);
                        }
                        Ok(Value::Boolean(
                            items.iter().any(|item| feel_equals(&l, item) == Some(true)),
                        ))
                    }
                    other => Ok(match feel_equals(&l, &other) {
                        Some(b) => Value::Boolean(b),
                        None => Value::Null,
                    }),
                }
            }
            Expr::InstanceOf(inner, type_name, _) => {
                let v = self.eval(inner)?;
                Ok(Value::Boolean(v.is_instance_of(type_name)))
            }
            Expr::FunctionDef {
                parameters, body, ..
            } => Ok(Value::Function(FunctionValue {
                parameters: parameters.clone(),
                body: Rc::new((**body).clone()),
            })),
        }
    }

    fn eval_context_entries(&mut self, entries: &[(String, Expr)]) -> Result<Value, EvalError> {
        let mut out = indexmap::IndexMap::new();
        for (key, expr) in entries {
            let v = self.eval(expr)?;
            // later entries may refer to earlier ones
            self.env.bind(key.clone(), v.clone());
            out.insert(key.clone(), v);
        }
        Ok(Value::context(out))
    }

    // ── Binary operators ──

    fn eval_binop(&mut self, lhs: &Expr, op: BinOp, rhs: &Expr) -> Result<Value, EvalError> {
        match op {
            BinOp::And => {
                let l = self.eval(lhs)?.as_boolean();
                if l == Some(false) {
                    return Ok(Value::Boolean(false));
                }
                let r = self.eval(rhs)?.as_boolean();
                Ok(match (l, r) {
                    (Some(true), Some(b)) => Value::Boolean(b),
                    (None, Some(false)) => Value::Boolean(false),
                    _ => Value::Null,
                })
            }
            BinOp::Or => {
                let l = self.eval(lhs)?.as_boolean();
                if l == Some(true) {
                    return Ok(Value::Boolean(true));
                }
                let r = self.eval(rhs)?.as_boolean();
                Ok(match (l, r) {
                    (Some(false), Some(b)) => Value::Boolean(b),
                    (None, Some(true)) => Value::Boolean(true),
                    _ => Value::Null,
                })
            }
            BinOp::Eq => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                Ok(match feel_equals(&l, &r) {
                    Some(b) => Value::Boolean(b),
                    None => Value::Null,
                })
            }
            BinOp::Ne => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                Ok(match feel_equals(&l, &r) {
                    Some(b) => Value::Boolean(!b),
                    None => Value::Null,
                })
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                if l.is_null() || r.is_null() {
                    return Ok(Value::Null);
                }
                match l.compare(&r) {
                    Some(ord) => Ok(Value::Boolean(match op {
                        BinOp::Lt => ord == Ordering::Less,
                        BinOp::Le => ord != Ordering::Greater,
                        BinOp::Gt => ord == Ordering::Greater,
                        BinOp::Ge => ord != Ordering::Less,
                        _ => unreachable!(),
                    })),
                    None => self.recover(EvalError::TypeMismatch(format!(
                        "cannot compare {} with {}",
                        l.type_name(),
                        r.type_name()
                    ))),
                }
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Pow => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                self.arithmetic(op, l, r)
            }
        }
    }

    fn arithmetic(&mut self, op: BinOp, l: Value, r: Value) -> Result<Value, EvalError> {
        // temporal arithmetic has its own pairings
        match (op, &l, &r) {
            (BinOp::Add, Value::Date(d), Value::Duration(dur))
            | (BinOp::Add, Value::Duration(dur), Value::Date(d)) => {
                return Ok(shift_date(*d, dur, 1).map(Value::Date).unwrap_or(Value::Null));
            }
            (BinOp::Sub, Value::Date(d), Value::Duration(dur)) => {
                return Ok(shift_date(*d, dur, -1).map(Value::Date).unwrap_or(Value::Null));
            }
            (BinOp::Add, Value::DateTime(dt), Value::Duration(dur))
            | (BinOp::Add, Value::Duration(dur), Value::DateTime(dt)) => {
                return Ok(shift_date_time(*dt, dur, 1)
                    .map(Value::DateTime)
                    .unwrap_or(Value::Null));
            }
            (BinOp::Sub, Value::DateTime(dt), Value::Duration(dur)) => {
                return Ok(shift_date_time(*dt, dur, -1)
                    .map(Value::DateTime)
                    .unwrap_or(Value::Null));
            }
            (BinOp::Add, Value::Time(t), Value::Duration(dur))
            | (BinOp::Add, Value::Duration(dur), Value::Time(t)) => {
                return Ok(match chrono::Duration::try_seconds(dur.seconds) {
                    Some(delta) => Value::Time(t.overflowing_add_signed(delta).0),
                    None => Value::Null,
                });
            }
            (BinOp::Sub, Value::Time(t), Value::Duration(dur)) => {
                return Ok(match chrono::Duration::try_seconds(dur.seconds) {
                    Some(delta) => Value::Time(t.overflowing_sub_signed(delta).0),
                    None => Value::Null,
                });
            }
            (BinOp::Add, Value::Duration(a), Value::Duration(b)) => {
                return Ok(
                    match (
                        a.months.checked_add(b.months),
                        a.seconds.checked_add(b.seconds),
                    ) {
                        (Some(months), Some(seconds)) => {
                            Value::Duration(FeelDuration { months, seconds })
                        }
                        _ => Value::Null,
                    },
                );
            }
            (BinOp::Sub, Value::Duration(a), Value::Duration(b)) => {
                return Ok(
                    match (
                        a.months.checked_sub(b.months),
                        a.seconds.checked_sub(b.seconds),
                    ) {
                        (Some(months), Some(seconds)) => {
                            Value::Duration(FeelDuration { months, seconds })
                        }
                        _ => Value::Null,
                    },
                );
            }
            (BinOp::Sub, Value::Date(a), Value::Date(b)) => {
                return Ok(Value::Duration(FeelDuration::from_seconds(
                    (*a - *b).num_seconds(),
                )));
            }
            (BinOp::Sub, Value::DateTime(a), Value::DateTime(b)) => {
                return Ok(Value::Duration(FeelDuration::from_seconds(
                    (*a - *b).num_seconds(),
                )));
            }
            _ => {}
        }

        if l.is_null() || r.is_null() {
            return Ok(Value::Null);
        }

        // string + string concatenates; everything else coerces toward number
        if op == BinOp::Add {
            if let (Value::String(a), Value::String(b)) = (&l, &r) {
                return Ok(Value::String(format!("{}{}", a, b)));
            }
        }

        if let (Some(a), Some(b)) = (l.as_number(), r.as_number()) {
            return match op {
                BinOp::Add => self.checked(a.checked_add(b)),
                BinOp::Sub => self.checked(a.checked_sub(b)),
                BinOp::Mul => self.checked(a.checked_mul(b)),
                BinOp::Div => {
                    if b.is_zero() {
                        self.recover(EvalError::DivisionByZero)
                    } else {
                        self.checked(a.checked_div(b))
                    }
                }
                BinOp::Pow => self.checked(power(a, b)),
                _ => unreachable!(),
            };
        }

        // mixed string concatenation as a fallback for +
        if op == BinOp::Add && (matches!(l, Value::String(_)) || matches!(r, Value::String(_))) {
            if let (Some(a), Some(b)) = (l.coerce_string(), r.coerce_string()) {
                return Ok(Value::String(format!("{}{}", a, b)));
            }
        }

        self.recover(EvalError::TypeMismatch(format!(
            "cannot apply '{}' to {} and {}",
            op,
            l.type_name(),
            r.type_name()
        )))
    }

    fn checked(&self, result: Option<Decimal>) -> Result<Value, EvalError> {
        match result {
            Some(n) => Ok(Value::Number(n)),
            None => self.recover(EvalError::TypeMismatch("numeric overflow".to_string())),
        }
    }

    // ── Loops and quantifiers ──

    fn eval_sources(
        &mut self,
        iterators: &[(String, Expr)],
    ) -> Result<Option<Vec<(String, Vec<Value>)>>, EvalError> {
        let mut sources = Vec::with_capacity(iterators.len());
        for (name, expr) in iterators {
            let v = self.eval(expr)?;
            match iteration_items(&v, self.config.max_iterations)? {
                Some(items) => sources.push((name.clone(), items)),
                None => return Ok(None),
            }
        }
        Ok(Some(sources))
    }

    fn eval_for(&mut self, iterators: &[(String, Expr)], body: &Expr) -> Result<Value, EvalError> {
        let sources = match self.eval_sources(iterators)? {
            Some(s) => s,
            None => {
                return self.recover(EvalError::TypeMismatch(
                    "for expects a list or integer range".to_string(),
                ))
            }
        };
        if sources.iter().any(|(_, items)| items.is_empty()) {
            return Ok(Value::list(Vec::new()));
        }
        self.env.push_frame();
        let result = self.run_for(&sources, body);
        self.env.pop_frame();
        result
    }

    fn run_for(
        &mut self,
        sources: &[(String, Vec<Value>)],
        body: &Expr,
    ) -> Result<Value, EvalError> {
        let mut idx = vec![0usize; sources.len()];
        let mut results = Vec::new();
        loop {
            self.tick()?;
            for (slot, (name, items)) in idx.iter().zip(sources.iter()) {
                self.env.bind(name.clone(), items[*slot].clone());
            }
            results.push(self.eval(body)?);
            // odometer: rightmost iterator advances fastest
            let mut pos = sources.len();
            loop {
                if pos == 0 {
                    return Ok(Value::list(results));
                }
                pos -= 1;
                idx[pos] += 1;
                if idx[pos] < sources[pos].1.len() {
                    break;
                }
                idx[pos] = 0;
            }
        }
    }

    fn eval_quantified(
        &mut self,
        kind: QuantifierKind,
        iterators: &[(String, Expr)],
        body: &Expr,
    ) -> Result<Value, EvalError> {
        let sources = match self.eval_sources(iterators)? {
            Some(s) => s,
            None => {
                return self.recover(EvalError::TypeMismatch(
                    "quantifier expects a list or integer range".to_string(),
                ))
            }
        };
        if sources.iter().any(|(_, items)| items.is_empty()) {
            // vacuous: some → false, every → true
            return Ok(Value::Boolean(kind == QuantifierKind::Every));
        }
        self.env.push_frame();
        let result = self.run_quantified(kind, &sources, body);
        self.env.pop_frame();
        result
    }

    fn run_quantified(
        &mut self,
        kind: QuantifierKind,
        sources: &[(String, Vec<Value>)],
        body: &Expr,
    ) -> Result<Value, EvalError> {
        let mut idx = vec![0usize; sources.len()];
        let mut saw_unknown = false;
        loop {
            self.tick()?;
            for (slot, (name, items)) in idx.iter().zip(sources.iter()) {
                self.env.bind(name.clone(), items[*slot].clone());
            }
            match (kind, self.eval(body)?.as_boolean()) {
                (QuantifierKind::Some, Some(true)) => return Ok(Value::Boolean(true)),
                (QuantifierKind::Every, Some(false)) => return Ok(Value::Boolean(false)),
                (_, None) => saw_unknown = true,
                _ => {}
            }
            let mut pos = sources.len();
            loop {
                if pos == 0 {
                    return Ok(if saw_unknown {
                        Value::Null
                    } else {
                        Value::Boolean(kind == QuantifierKind::Every)
                    });
                }
                pos -= 1;
                idx[pos] += 1;
                if idx[pos] < sources[pos].1.len() {
                    break;
                }
                idx[pos] = 0;
            }
        }
    }

    // ── Calls ──

    fn eval_call(&mut self, callee: &Expr, args: &[CallArg]) -> Result<Value, EvalError> {
        let mut positional = Vec::new();
        let mut named = Vec::new();
        for arg in args {
            match arg {
                CallArg::Positional(e) => positional.push(self.eval(e)?),
                CallArg::Named(name, e) => named.push((name.clone(), self.eval(e)?)),
            }
        }
        if let Expr::Name(name, _) = callee {
            // user-defined functions (including registered BKMs) win over builtins
            if let Some(Value::Function(f)) = self.env.lookup(name).cloned() {
                return self.invoke(&f, positional, named);
            }
            if let Some(result) = builtins::call(self, name, &positional) {
                return result;
            }
            return self.recover(EvalError::NameNotFound(name.clone()));
        }
        let callee_val = self.eval(callee)?;
        match callee_val {
            Value::Function(f) => self.invoke(&f, positional, named),
            Value::Null => Ok(Value::Null),
            other => self.recover(EvalError::TypeMismatch(format!(
                "{} is not callable",
                other.type_name()
            ))),
        }
    }

    /// Invoke a user-defined function with a fresh frame.
    pub(crate) fn invoke(
        &mut self,
        f: &FunctionValue,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
    ) -> Result<Value, EvalError> {
        if self.depth >= self.config.max_depth {
            return Err(EvalError::RecursionLimit(self.config.max_depth));
        }
        self.depth += 1;
        self.env.push_frame();
        for (i, param) in f.parameters.iter().enumerate() {
            let value = positional
                .get(i)
                .cloned()
                .or_else(|| {
                    named
                        .iter()
                        .find(|(n, _)| verdict_core::names::matches(n, param))
                        .map(|(_, v)| v.clone())
                })
                .unwrap_or(Value::Null);
            self.env.bind(param.clone(), value);
        }
        let result = self.eval(&f.body);
        self.env.pop_frame();
        self.depth -= 1;
        result
    }

    // ── Index and filter ──

    fn eval_index(&mut self, base: &Expr, idx: &Expr) -> Result<Value, EvalError> {
        let v = self.eval(base)?;
        match v {
            Value::List(items) => {
                // a numeric index selects; anything else is a filter
                let probe = self.eval_lenient(idx)?;
                if let Value::Number(n) = probe {
                    return Ok(pick_index(&items, n));
                }
                let mut out = Vec::new();
                for item in items.iter() {
                    self.tick()?;
                    self.env.push_frame();
                    if let Value::Context(entries) = item {
                        for (k, val) in entries.iter() {
                            self.env.bind(k.clone(), val.clone());
                        }
                    }
                    self.env.bind("item", item.clone());
                    let keep = self.eval_lenient(idx);
                    self.env.pop_frame();
                    if keep?.as_boolean() == Some(true) {
                        out.push(item.clone());
                    }
                }
                Ok(Value::list(out))
            }
            Value::Null => Ok(Value::Null),
            // a scalar behaves as a singleton list
            other => {
                let probe = self.eval_lenient(idx)?;
                match probe {
                    Value::Number(n) if n == Decimal::ONE => Ok(other),
                    Value::Number(_) => Ok(Value::Null),
                    _ => self.recover(EvalError::TypeMismatch(format!(
                        "cannot filter {}",
                        other.type_name()
                    ))),
                }
            }
        }
    }

    /// Evaluate with recoverable failures always nulled, regardless of
    /// strict mode. Limit errors still propagate.
    fn eval_lenient(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        let strict = self.config.strict;
        self.config.strict = false;
        let result = self.eval(expr);
        self.config.strict = strict;
        match result {
            Err(err @ (EvalError::RecursionLimit(_) | EvalError::IterationLimit(_))) => Err(err),
            Err(_) => Ok(Value::Null),
            ok => ok,
        }
    }

    // ── Unary tests ──

    /// Evaluate a decision-table input entry against an input value.
    /// `Some(true)` means the cell matches; `None` is unknown (no match,
    /// but recorded differently in traces).
    pub fn test_matches(
        &mut self,
        tests: &UnaryTests,
        input: &Value,
    ) -> Result<Option<bool>, EvalError> {
        let mut saw_unknown = false;
        let mut matched = false;
        for test in &tests.alternatives {
            match self.single_test(test, input)? {
                Some(true) => {
                    matched = true;
                    break;
                }
                None => saw_unknown = true,
                Some(false) => {}
            }
        }
        let result = if matched {
            Some(true)
        } else if saw_unknown {
            None
        } else {
            Some(false)
        };
        Ok(if tests.negated {
            result.map(|b| !b)
        } else {
            result
        })
    }

    fn single_test(&mut self, test: &UnaryTest, input: &Value) -> Result<Option<bool>, EvalError> {
        match test {
            UnaryTest::Wildcard(_) => Ok(Some(true)),
            UnaryTest::Compare(op, expr, _) => {
                let rhs = self.eval(expr)?;
                match op {
                    CmpOp::Eq => Ok(feel_equals(input, &rhs)),
                    CmpOp::Ne => Ok(feel_equals(input, &rhs).map(|b| !b)),
                    _ => {
                        if input.is_null() || rhs.is_null() {
                            return Ok(None);
                        }
                        Ok(input.compare(&rhs).map(|ord| match op {
                            CmpOp::Lt => ord == Ordering::Less,
                            CmpOp::Le => ord != Ordering::Greater,
                            CmpOp::Gt => ord == Ordering::Greater,
                            CmpOp::Ge => ord != Ordering::Less,
                            CmpOp::Eq | CmpOp::Ne => unreachable!(),
                        }))
                    }
                }
            }
            UnaryTest::Match(expr, _) => {
                let v = self.eval(expr)?;
                match v {
                    Value::Range(range) => Ok(range.contains(input)),
                    Value::List(items) => {
                        if input.is_null() && !items.iter().any(|i| i.is_null()) {
                            return Ok(None);
                        }
                        Ok(Some(
                            items
                                .iter()
                                .any(|item| feel_equals(input, item) == Some(true)),
                        ))
                    }
                    other => Ok(feel_equals(input, &other)),
                }
            }
        }
    }
}

/// FEEL equality: structural, defined across null = null, unknown across
/// semantic families.
pub fn feel_equals(a: &Value, b: &Value) -> Option<bool> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(true),
        (Value::Null, _) | (_, Value::Null) => Some(false),
        (Value::Boolean(_), Value::Boolean(_))
        | (Value::Number(_), Value::Number(_))
        | (Value::String(_), Value::String(_))
        | (Value::List(_), Value::List(_))
        | (Value::Context(_), Value::Context(_))
        | (Value::Range(_), Value::Range(_))
        | (Value::Date(_), Value::Date(_))
        | (Value::Time(_), Value::Time(_))
        | (Value::DateTime(_), Value::DateTime(_))
        | (Value::Duration(_), Value::Duration(_)) => Some(a == b),
        _ => None,
    }
}

/// 1-based list indexing; negative indexes count from the end.
fn pick_index(items: &[Value], n: Decimal) -> Value {
    if !n.fract().is_zero() {
        return Value::Null;
    }
    let Some(i) = n.to_i64() else {
        return Value::Null;
    };
    let len = items.len() as i64;
    let pos = if i > 0 {
        i - 1
    } else if i < 0 {
        len + i
    } else {
        return Value::Null;
    };
    if pos < 0 || pos >= len {
        return Value::Null;
    }
    items[pos as usize].clone()
}

/// Expand a loop source: a list iterates as-is, an integer range expands to
/// a sequence of integers (descending when the bounds are reversed). The
/// iteration cap is enforced before a range materializes.
fn iteration_items(v: &Value, cap: Option<u64>) -> Result<Option<Vec<Value>>, EvalError> {
    match v {
        Value::List(items) => Ok(Some(items.as_ref().clone())),
        Value::Range(r) => {
            let (lo, hi) = match (range_endpoint(r.lo.as_ref()), range_endpoint(r.hi.as_ref())) {
                (Some(lo), Some(hi)) => (lo, hi),
                _ => return Ok(None),
            };
            let (mut start, mut end) = (lo, hi);
            let descending = start > end;
            if descending {
                if !r.lo_inclusive {
                    start -= 1;
                }
                if !r.hi_inclusive {
                    end += 1;
                }
                (start, end) = (end, start);
            } else {
                if !r.lo_inclusive {
                    start += 1;
                }
                if !r.hi_inclusive {
                    end -= 1;
                }
            }
            if let Some(max) = cap {
                let span = end.saturating_sub(start).unsigned_abs().saturating_add(1);
                if start <= end && span > max {
                    return Err(EvalError::IterationLimit(max));
                }
            }
            let items: Vec<Value> = (start..=end)
                .map(|i| Value::Number(Decimal::from(i)))
                .collect();
            Ok(Some(if descending {
                items.into_iter().rev().collect()
            } else {
                items
            }))
        }
        _ => Ok(None),
    }
}

fn range_endpoint(v: Option<&Value>) -> Option<i64> {
    match v {
        Some(Value::Number(n)) if n.fract().is_zero() => n.to_i64(),
        _ => None,
    }
}

fn shift_date(d: chrono::NaiveDate, dur: &FeelDuration, sign: i64) -> Option<chrono::NaiveDate> {
    let months = dur.months.checked_mul(sign)?;
    let d = if months >= 0 {
        d.checked_add_months(Months::new(u32::try_from(months).ok()?))?
    } else {
        d.checked_sub_months(Months::new(u32::try_from(-months).ok()?))?
    };
    let days = dur.seconds.checked_mul(sign)? / 86_400;
    d.checked_add_signed(chrono::Duration::try_days(days)?)
}

fn shift_date_time(
    dt: chrono::NaiveDateTime,
    dur: &FeelDuration,
    sign: i64,
) -> Option<chrono::NaiveDateTime> {
    let months = dur.months.checked_mul(sign)?;
    let dt = if months >= 0 {
        dt.checked_add_months(Months::new(u32::try_from(months).ok()?))?
    } else {
        dt.checked_sub_months(Months::new(u32::try_from(-months).ok()?))?
    };
    dt.checked_add_signed(chrono::Duration::try_seconds(dur.seconds.checked_mul(sign)?)?)
}

/// Decimal exponentiation: exact for integer exponents, f64 fallback for
/// fractional ones.
fn power(a: Decimal, b: Decimal) -> Option<Decimal> {
    if b.fract().is_zero() {
        if let Some(exp) = b.to_i64() {
            return a.checked_powi(exp);
        }
    }
    let base = a.to_f64()?;
    let exp = b.to_f64()?;
    let out = base.powf(exp);
    if !out.is_finite() {
        return None;
    }
    Decimal::from_f64(out)
}
