//! Decision-table evaluation: rule matching, hit-policy dispatch, output
//! shaping.

use indexmap::IndexMap;
use rust_decimal::Decimal;
use verdict_core::{Diagnostic, EvalError};
use verdict_feel::{Evaluator, Value};

use crate::model::{Aggregation, DecisionTable, HitPolicy};

/// Per-call table options derived from the engine's `EvalOptions`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TableOptions {
    pub hit_policy_override: Option<HitPolicy>,
    pub collect_aggregation: Option<Aggregation>,
    pub debug: bool,
}

pub(crate) fn evaluate_table(
    ev: &mut Evaluator,
    table: &DecisionTable,
    options: &TableOptions,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Value, EvalError> {
    let hit_policy = options.hit_policy_override.unwrap_or(table.hit_policy);
    let aggregation = options.collect_aggregation.or(table.aggregation);

    // resolve the input columns once per table
    let mut inputs = Vec::with_capacity(table.inputs.len());
    for clause in &table.inputs {
        inputs.push(ev.eval(&clause.expression)?);
    }

    let mut matches: Vec<usize> = Vec::new();
    for (index, rule) in table.rules.iter().enumerate() {
        let mut matched = true;
        let mut failed_column = None;
        for (column, tests) in rule.tests.iter().enumerate() {
            if ev.test_matches(tests, &inputs[column])? != Some(true) {
                matched = false;
                failed_column = Some(column);
                break;
            }
        }
        if matched {
            matches.push(index);
        }
        if options.debug {
            let message = match failed_column {
                None => format!("rule {} matched", index + 1),
                Some(column) => format!(
                    "rule {} did not match on '{}'",
                    index + 1,
                    column_label(table, column)
                ),
            };
            diagnostics.push(Diagnostic::note(Some(&table.name), message));
        }
    }

    match hit_policy {
        HitPolicy::Unique => match matches.as_slice() {
            [] => Ok(Value::Null),
            [index] => rule_output(ev, table, *index),
            _ => Err(EvalError::HitPolicyViolation(format!(
                "UNIQUE table '{}' matched {} rules",
                table.name,
                matches.len()
            ))),
        },
        HitPolicy::First => match matches.first() {
            Some(index) => rule_output(ev, table, *index),
            None => Ok(Value::Null),
        },
        HitPolicy::Any => {
            let rows = output_rows(ev, table, &matches)?;
            match rows.split_first() {
                None => Ok(Value::Null),
                Some((first, rest)) => {
                    if rest.iter().all(|row| row == first) {
                        Ok(shape_row(table, first.clone()))
                    } else {
                        Err(EvalError::HitPolicyViolation(format!(
                            "ANY table '{}' matched rules with different outputs",
                            table.name
                        )))
                    }
                }
            }
        }
        HitPolicy::Priority => {
            let rows = output_rows(ev, table, &matches)?;
            match best_by_priority(table, &rows) {
                Some(index) => Ok(shape_row(table, rows[index].clone())),
                None => Ok(Value::Null),
            }
        }
        HitPolicy::OutputOrder => {
            let rows = output_rows(ev, table, &matches)?;
            let mut order: Vec<usize> = (0..rows.len()).collect();
            order.sort_by_key(|&i| priority_rank(table, &rows[i]));
            Ok(Value::list(
                order
                    .into_iter()
                    .map(|i| shape_row(table, rows[i].clone()))
                    .collect(),
            ))
        }
        HitPolicy::RuleOrder => {
            let rows = output_rows(ev, table, &matches)?;
            Ok(Value::list(
                rows.into_iter().map(|row| shape_row(table, row)).collect(),
            ))
        }
        HitPolicy::Collect => {
            let rows = output_rows(ev, table, &matches)?;
            match aggregation {
                None => Ok(Value::list(
                    rows.into_iter().map(|row| shape_row(table, row)).collect(),
                )),
                // COUNT counts matching rules, null outputs included
                Some(Aggregation::Count) => Ok(Value::Number(Decimal::from(rows.len()))),
                Some(Aggregation::Sum) => Ok(match numeric_outputs(&rows) {
                    Some(numbers) if !numbers.is_empty() => numbers
                        .into_iter()
                        .try_fold(Decimal::ZERO, |acc, n| acc.checked_add(n))
                        .map(Value::Number)
                        .unwrap_or(Value::Null),
                    _ => Value::Null,
                }),
                Some(Aggregation::Min) => Ok(match numeric_outputs(&rows) {
                    Some(numbers) => numbers
                        .into_iter()
                        .min()
                        .map(Value::Number)
                        .unwrap_or(Value::Null),
                    None => Value::Null,
                }),
                Some(Aggregation::Max) => Ok(match numeric_outputs(&rows) {
                    Some(numbers) => numbers
                        .into_iter()
                        .max()
                        .map(Value::Number)
                        .unwrap_or(Value::Null),
                    None => Value::Null,
                }),
            }
        }
    }
}

fn column_label(table: &DecisionTable, column: usize) -> String {
    let clause = &table.inputs[column];
    if clause.label.is_empty() {
        clause.expression_text.clone()
    } else {
        clause.label.clone()
    }
}

fn rule_output(ev: &mut Evaluator, table: &DecisionTable, index: usize) -> Result<Value, EvalError> {
    let row = eval_row(ev, table, index)?;
    Ok(shape_row(table, row))
}

fn eval_row(ev: &mut Evaluator, table: &DecisionTable, index: usize) -> Result<Vec<Value>, EvalError> {
    table.rules[index]
        .outputs
        .iter()
        .map(|expr| ev.eval(expr))
        .collect()
}

fn output_rows(
    ev: &mut Evaluator,
    table: &DecisionTable,
    matches: &[usize],
) -> Result<Vec<Vec<Value>>, EvalError> {
    matches.iter().map(|&i| eval_row(ev, table, i)).collect()
}

/// A single-output table yields the bare value; a multi-output table yields
/// a context keyed by output name.
fn shape_row(table: &DecisionTable, mut row: Vec<Value>) -> Value {
    if table.outputs.len() == 1 {
        return row.pop().unwrap_or(Value::Null);
    }
    let mut entries = IndexMap::new();
    for (i, (clause, value)) in table.outputs.iter().zip(row.into_iter()).enumerate() {
        let key = if clause.name.is_empty() {
            format!("output {}", i + 1)
        } else {
            clause.name.clone()
        };
        entries.insert(key, value);
    }
    Value::context(entries)
}

/// Rank a row against the declared priority lists: first output column
/// decides, later columns break ties. Unlisted values sort last.
fn priority_rank(table: &DecisionTable, row: &[Value]) -> Vec<usize> {
    table
        .outputs
        .iter()
        .zip(row.iter())
        .map(|(clause, value)| {
            let text = value.to_string();
            clause
                .priority_values
                .iter()
                .position(|p| p == &text)
                .unwrap_or(usize::MAX)
        })
        .collect()
}

fn best_by_priority(table: &DecisionTable, rows: &[Vec<Value>]) -> Option<usize> {
    (0..rows.len()).min_by_key(|&i| priority_rank(table, &rows[i]))
}

/// First-column outputs for SUM/MIN/MAX: nulls are skipped, a non-numeric
/// output poisons the aggregate (`None`).
fn numeric_outputs(rows: &[Vec<Value>]) -> Option<Vec<Decimal>> {
    let mut numbers = Vec::with_capacity(rows.len());
    for row in rows {
        match row.first() {
            Some(Value::Null) | None => {}
            Some(Value::Number(n)) => numbers.push(*n),
            Some(_) => return None,
        }
    }
    Some(numbers)
}
