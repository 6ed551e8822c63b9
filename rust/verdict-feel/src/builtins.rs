//! FEEL built-in functions.
//!
//! Dispatch is by normalized name, so `string length` and `string_length`
//! both resolve. Unknown names return `None` and the evaluator reports the
//! missing function; bad arguments follow FEEL null semantics.

use chrono::{Datelike, Local};
use rust_decimal::prelude::{MathematicalOps, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use verdict_core::names::normalize;
use verdict_core::EvalError;

use crate::eval::{feel_equals, Evaluator};
use crate::value::{
    parse_date, parse_date_time, parse_decimal, parse_duration, parse_time, FeelDuration, Value,
};

type BuiltinResult = Option<Result<Value, EvalError>>;

fn ok(v: Value) -> BuiltinResult {
    Some(Ok(v))
}

fn null() -> BuiltinResult {
    Some(Ok(Value::Null))
}

/// A single list argument spreads; otherwise the arguments are the items.
fn list_args(args: &[Value]) -> Vec<Value> {
    match args {
        [Value::List(items)] => items.as_ref().clone(),
        _ => args.to_vec(),
    }
}

pub(crate) fn call(ev: &mut Evaluator, name: &str, args: &[Value]) -> BuiltinResult {
    match normalize(name).as_str() {
        // ── numeric ──
        "sum" => ok(fold_numbers(&list_args(args), Decimal::ZERO, |acc, n| {
            acc.checked_add(n)
        })),
        "min" => ok(extremum(&list_args(args), std::cmp::Ordering::Less)),
        "max" => ok(extremum(&list_args(args), std::cmp::Ordering::Greater)),
        "mean" => {
            let items = list_args(args);
            if items.is_empty() {
                return null();
            }
            let total = fold_numbers(&items, Decimal::ZERO, |acc, n| acc.checked_add(n));
            match total {
                Value::Number(t) => ok(t
                    .checked_div(Decimal::from(items.len()))
                    .map(Value::Number)
                    .unwrap_or(Value::Null)),
                _ => null(),
            }
        }
        "count" => ok(Value::Number(Decimal::from(list_args(args).len()))),
        "abs" => unary_number(args, |n| Some(n.abs())),
        "floor" => unary_number(args, |n| Some(n.floor())),
        "ceiling" => unary_number(args, |n| Some(n.ceil())),
        "sqrt" => unary_number(args, |n| n.sqrt()),
        "modulo" => match args {
            [a, b] => {
                let (Some(a), Some(b)) = (a.as_number(), b.as_number()) else {
                    return null();
                };
                if b.is_zero() {
                    return null();
                }
                let q = match a.checked_div(b) {
                    Some(q) => q.floor(),
                    None => return null(),
                };
                ok(q.checked_mul(b)
                    .and_then(|p| a.checked_sub(p))
                    .map(Value::Number)
                    .unwrap_or(Value::Null))
            }
            _ => null(),
        },
        "decimal" => match args {
            [n, scale] => {
                let (Some(n), Some(scale)) = (n.as_number(), scale.as_number()) else {
                    return null();
                };
                match scale.to_u32() {
                    Some(dp) if dp <= 28 => ok(Value::Number(
                        n.round_dp_with_strategy(dp, RoundingStrategy::MidpointNearestEven),
                    )),
                    _ => null(),
                }
            }
            _ => null(),
        },
        "odd" => integer_predicate(args, |i| i % 2 != 0),
        "even" => integer_predicate(args, |i| i % 2 == 0),

        // ── boolean ──
        "not" => match args {
            [v] => ok(match v.as_boolean() {
                Some(b) => Value::Boolean(!b),
                None => Value::Null,
            }),
            _ => null(),
        },

        // ── string ──
        "substring" => match args {
            [Value::String(s), start] => ok(substring(s, start, None)),
            [Value::String(s), start, length] => ok(substring(s, start, Some(length))),
            _ => null(),
        },
        "string length" => match args {
            [Value::String(s)] => ok(Value::Number(Decimal::from(s.chars().count()))),
            _ => null(),
        },
        "upper case" => match args {
            [Value::String(s)] => ok(Value::String(s.to_uppercase())),
            _ => null(),
        },
        "lower case" => match args {
            [Value::String(s)] => ok(Value::String(s.to_lowercase())),
            _ => null(),
        },
        "contains" => match args {
            [Value::String(s), Value::String(m)] => ok(Value::Boolean(s.contains(m.as_str()))),
            _ => null(),
        },
        "starts with" => match args {
            [Value::String(s), Value::String(m)] => ok(Value::Boolean(s.starts_with(m.as_str()))),
            _ => null(),
        },
        "ends with" => match args {
            [Value::String(s), Value::String(m)] => ok(Value::Boolean(s.ends_with(m.as_str()))),
            _ => null(),
        },
        "string join" => {
            let (items, delimiter) = match args {
                [Value::List(items)] => (items.as_ref().clone(), String::new()),
                [Value::List(items), Value::String(d)] => (items.as_ref().clone(), d.clone()),
                _ => return null(),
            };
            let mut parts = Vec::with_capacity(items.len());
            for item in &items {
                match item {
                    Value::String(s) => parts.push(s.clone()),
                    Value::Null => {}
                    _ => return null(),
                }
            }
            ok(Value::String(parts.join(&delimiter)))
        }
        "split" => match args {
            [Value::String(s), Value::String(d)] if !d.is_empty() => ok(Value::list(
                s.split(d.as_str())
                    .map(|p| Value::String(p.to_string()))
                    .collect(),
            )),
            _ => null(),
        },
        "replace" => match args {
            [Value::String(s), Value::String(from), Value::String(to)] if !from.is_empty() => {
                ok(Value::String(s.replace(from.as_str(), to.as_str())))
            }
            _ => null(),
        },

        // ── list ──
        "list contains" => match args {
            [Value::List(items), v] => ok(Value::Boolean(
                items.iter().any(|item| feel_equals(item, v) == Some(true)),
            )),
            _ => null(),
        },
        "append" => match args {
            [Value::List(items), rest @ ..] => {
                let mut out = items.as_ref().clone();
                out.extend(rest.iter().cloned());
                ok(Value::list(out))
            }
            _ => null(),
        },
        "concatenate" => {
            let mut out = Vec::new();
            for arg in args {
                match arg {
                    Value::List(items) => out.extend(items.iter().cloned()),
                    _ => return null(),
                }
            }
            ok(Value::list(out))
        }
        "sublist" => match args {
            [Value::List(items), start] => ok(sublist(items, start, None)),
            [Value::List(items), start, length] => ok(sublist(items, start, Some(length))),
            _ => null(),
        },
        "reverse" => match args {
            [Value::List(items)] => {
                let mut out = items.as_ref().clone();
                out.reverse();
                ok(Value::list(out))
            }
            _ => null(),
        },
        "sort" => match args {
            [Value::List(items)] => ok(sort_natural(items)),
            [Value::List(items), Value::Function(f)] => {
                let f = f.clone();
                let mut out: Vec<Value> = Vec::with_capacity(items.len());
                for item in items.iter() {
                    let mut at = out.len();
                    for (i, placed) in out.iter().enumerate() {
                        let precedes =
                            ev.invoke(&f, vec![item.clone(), placed.clone()], Vec::new());
                        match precedes {
                            Ok(v) if v.as_boolean() == Some(true) => {
                                at = i;
                                break;
                            }
                            Ok(_) => {}
                            Err(e) => return Some(Err(e)),
                        }
                    }
                    out.insert(at, item.clone());
                }
                ok(Value::list(out))
            }
            _ => null(),
        },
        "distinct values" => match args {
            [Value::List(items)] => ok(Value::list(distinct(items))),
            _ => null(),
        },
        "flatten" => match args {
            [v] => {
                let mut out = Vec::new();
                flatten_into(v, &mut out);
                ok(Value::list(out))
            }
            _ => null(),
        },
        "index of" => match args {
            [Value::List(items), v] => ok(Value::list(
                items
                    .iter()
                    .enumerate()
                    .filter(|(_, item)| feel_equals(item, v) == Some(true))
                    .map(|(i, _)| Value::Number(Decimal::from(i + 1)))
                    .collect(),
            )),
            _ => null(),
        },
        "union" => {
            let mut out = Vec::new();
            for arg in args {
                match arg {
                    Value::List(items) => out.extend(items.iter().cloned()),
                    _ => return null(),
                }
            }
            ok(Value::list(distinct(&out)))
        }

        // ── temporal ──
        "date" => match args {
            [Value::String(s)] => ok(parse_date(s).map(Value::Date).unwrap_or(Value::Null)),
            [Value::DateTime(dt)] => ok(Value::Date(dt.date())),
            [Value::Date(d)] => ok(Value::Date(*d)),
            [y, m, d] => {
                let (Some(y), Some(m), Some(d)) = (as_int(y), as_int(m), as_int(d)) else {
                    return null();
                };
                let date = i32::try_from(y)
                    .ok()
                    .zip(u32::try_from(m).ok())
                    .zip(u32::try_from(d).ok())
                    .and_then(|((y, m), d)| chrono::NaiveDate::from_ymd_opt(y, m, d));
                ok(date.map(Value::Date).unwrap_or(Value::Null))
            }
            _ => null(),
        },
        "time" => match args {
            [Value::String(s)] => ok(parse_time(s).map(Value::Time).unwrap_or(Value::Null)),
            [Value::DateTime(dt)] => ok(Value::Time(dt.time())),
            [Value::Time(t)] => ok(Value::Time(*t)),
            _ => null(),
        },
        "date and time" => match args {
            [Value::String(s)] => ok(parse_date_time(s)
                .map(Value::DateTime)
                .unwrap_or(Value::Null)),
            [Value::Date(d), Value::Time(t)] => ok(Value::DateTime(d.and_time(*t))),
            [Value::DateTime(dt)] => ok(Value::DateTime(*dt)),
            _ => null(),
        },
        "duration" => match args {
            [Value::String(s)] => ok(parse_duration(s)
                .map(Value::Duration)
                .unwrap_or(Value::Null)),
            [Value::Duration(d)] => ok(Value::Duration(*d)),
            _ => null(),
        },
        "years and months duration" => match args {
            [from, to] => {
                let (Some(from), Some(to)) = (as_date(from), as_date(to)) else {
                    return null();
                };
                ok(Value::Duration(FeelDuration::from_months(months_between(
                    from, to,
                ))))
            }
            _ => null(),
        },
        "today" => ok(Value::Date(Local::now().date_naive())),
        "now" => ok(Value::DateTime(Local::now().naive_local())),

        // ── conversion ──
        "string" => match args {
            [Value::Null] => null(),
            [v] => ok(Value::String(v.to_string())),
            _ => null(),
        },
        "number" => match args {
            [Value::Number(n)] => ok(Value::Number(*n)),
            [Value::String(s)] => ok(parse_decimal(s).map(Value::Number).unwrap_or(Value::Null)),
            _ => null(),
        },

        // ── membership, function form ──
        "in" => match args {
            [v, Value::Range(range)] => ok(match range.contains(v) {
                Some(b) => Value::Boolean(b),
                None => Value::Null,
            }),
            [v, Value::List(items)] => ok(Value::Boolean(
                items.iter().any(|item| feel_equals(v, item) == Some(true)),
            )),
            [a, b] => ok(match feel_equals(a, b) {
                Some(eq) => Value::Boolean(eq),
                None => Value::Null,
            }),
            _ => null(),
        },

        _ => None,
    }
}

fn unary_number(args: &[Value], f: impl Fn(Decimal) -> Option<Decimal>) -> BuiltinResult {
    match args {
        [v] => match v.as_number() {
            Some(n) => ok(f(n).map(Value::Number).unwrap_or(Value::Null)),
            None => null(),
        },
        _ => null(),
    }
}

fn integer_predicate(args: &[Value], f: impl Fn(i64) -> bool) -> BuiltinResult {
    match args {
        [v] => match v.as_number() {
            Some(n) if n.fract().is_zero() => match n.to_i64() {
                Some(i) => ok(Value::Boolean(f(i))),
                None => null(),
            },
            _ => null(),
        },
        _ => null(),
    }
}

/// Fold coercible numbers; a null or non-numeric item nulls the whole result.
fn fold_numbers(
    items: &[Value],
    init: Decimal,
    f: impl Fn(Decimal, Decimal) -> Option<Decimal>,
) -> Value {
    if items.is_empty() {
        return Value::Null;
    }
    let mut acc = init;
    for item in items {
        let Some(n) = item.as_number() else {
            return Value::Null;
        };
        match f(acc, n) {
            Some(next) => acc = next,
            None => return Value::Null,
        }
    }
    Value::Number(acc)
}

fn extremum(items: &[Value], keep: std::cmp::Ordering) -> Value {
    let mut iter = items.iter();
    let Some(first) = iter.next() else {
        return Value::Null;
    };
    let mut best = first.clone();
    for item in iter {
        match item.compare(&best) {
            Some(ord) if ord == keep => best = item.clone(),
            Some(_) => {}
            None => return Value::Null,
        }
    }
    best
}

fn substring(s: &str, start: &Value, length: Option<&Value>) -> Value {
    let chars: Vec<char> = s.chars().collect();
    let Some(start) = as_int(start) else {
        return Value::Null;
    };
    let len = chars.len() as i64;
    let begin = if start > 0 {
        start - 1
    } else if start < 0 {
        len + start
    } else {
        return Value::Null;
    };
    if begin < 0 || begin > len {
        return Value::Null;
    }
    let take = match length {
        Some(l) => match as_int(l) {
            Some(n) if n >= 0 => n,
            _ => return Value::Null,
        },
        None => len - begin,
    };
    let out: String = chars
        .into_iter()
        .skip(begin as usize)
        .take(take as usize)
        .collect();
    Value::String(out)
}

fn sublist(items: &[Value], start: &Value, length: Option<&Value>) -> Value {
    let Some(start) = as_int(start) else {
        return Value::Null;
    };
    let len = items.len() as i64;
    let begin = if start > 0 {
        start - 1
    } else if start < 0 {
        len + start
    } else {
        return Value::Null;
    };
    if begin < 0 || begin > len {
        return Value::Null;
    }
    let take = match length {
        Some(l) => match as_int(l) {
            Some(n) if n >= 0 => n,
            _ => return Value::Null,
        },
        None => len - begin,
    };
    Value::list(
        items
            .iter()
            .skip(begin as usize)
            .take(take as usize)
            .cloned()
            .collect(),
    )
}

fn sort_natural(items: &[Value]) -> Value {
    let mut out = items.to_vec();
    let mut comparable = true;
    out.sort_by(|a, b| match a.compare(b) {
        Some(ord) => ord,
        None => {
            comparable = false;
            std::cmp::Ordering::Equal
        }
    });
    if comparable {
        Value::list(out)
    } else {
        Value::Null
    }
}

fn distinct(items: &[Value]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for item in items {
        if !out.iter().any(|seen| feel_equals(seen, item) == Some(true)) {
            out.push(item.clone());
        }
    }
    out
}

fn flatten_into(v: &Value, out: &mut Vec<Value>) {
    match v {
        Value::List(items) => {
            for item in items.iter() {
                flatten_into(item, out);
            }
        }
        other => out.push(other.clone()),
    }
}

fn as_int(v: &Value) -> Option<i64> {
    match v.as_number() {
        Some(n) if n.fract().is_zero() => n.to_i64(),
        _ => None,
    }
}

fn as_date(v: &Value) -> Option<chrono::NaiveDate> {
    match v {
        Value::Date(d) => Some(*d),
        Value::DateTime(dt) => Some(dt.date()),
        _ => None,
    }
}

/// Whole months from `from` to `to`, truncated toward zero.
fn months_between(from: chrono::NaiveDate, to: chrono::NaiveDate) -> i64 {
    let mut months = i64::from(to.year() - from.year()) * 12
        + i64::from(to.month() as i32 - from.month() as i32);
    if months > 0 && to.day() < from.day() {
        months -= 1;
    } else if months < 0 && to.day() > from.day() {
        months += 1;
    }
    months
}
