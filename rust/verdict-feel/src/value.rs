//! Runtime values for FEEL evaluation.
//!
//! Collection variants (List, Context, Range) are wrapped in `Rc` for cheap
//! cloning via reference counting; values are immutable once built, so the
//! reference count is the only thing that ever changes.
//!
//! Numbers are `rust_decimal::Decimal`, which gives FEEL's value equality
//! across integer and decimal forms (`1 = 1.0`) and exact division. The
//! documented tolerance: magnitudes beyond Decimal's 28 significant digits
//! are not representable and arithmetic that would exceed them nulls out.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use crate::ast::Expr;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(Decimal),
    String(String),
    List(Rc<Vec<Value>>),
    Context(Rc<IndexMap<String, Value>>),
    Range(Rc<RangeValue>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Duration(FeelDuration),
    Function(FunctionValue),
}

/// A range with optional endpoints. Open-ended ranges back the `>=18` style
/// of comparison test as well as the literal `[a..b]` forms.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeValue {
    pub lo: Option<Value>,
    pub hi: Option<Value>,
    pub lo_inclusive: bool,
    pub hi_inclusive: bool,
}

/// A user-defined FEEL function (from `function(a, b) ...` or a BKM body).
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionValue {
    pub parameters: Vec<String>,
    pub body: Rc<Expr>,
}

/// FEEL duration. `months` carries years-and-months durations, `seconds`
/// carries days-and-time durations; a value normally uses one of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FeelDuration {
    pub months: i64,
    pub seconds: i64,
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(items))
    }

    pub fn context(entries: IndexMap<String, Value>) -> Self {
        Value::Context(Rc::new(entries))
    }

    pub fn range(lo: Option<Value>, hi: Option<Value>, lo_inclusive: bool, hi_inclusive: bool) -> Self {
        Value::Range(Rc::new(RangeValue {
            lo,
            hi,
            lo_inclusive,
            hi_inclusive,
        }))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// FEEL type name, as used by `instance of` and in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Context(_) => "context",
            Value::Range(_) => "range",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::DateTime(_) => "date and time",
            Value::Duration(_) => "duration",
            Value::Function(_) => "function",
        }
    }

    /// Coerce toward number: numbers pass through, strings parse with the
    /// number-literal grammar, booleans map to 1/0. Everything else fails.
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) => parse_decimal(s),
            Value::Boolean(true) => Some(Decimal::ONE),
            Value::Boolean(false) => Some(Decimal::ZERO),
            _ => None,
        }
    }

    /// Booleans only; FEEL does not coerce other types into conditions.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Coerce toward string for `+` concatenation and the `string()` builtin.
    pub fn coerce_string(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.normalize().to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::Time(t) => Some(t.format("%H:%M:%S").to_string()),
            Value::DateTime(dt) => Some(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
            Value::Duration(d) => Some(d.to_string()),
            _ => None,
        }
    }

    /// Ordering within a semantic family. `None` for incomparable pairs;
    /// the caller turns that into a null result.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Membership check used by `instance of`.
    pub fn is_instance_of(&self, type_name: &str) -> bool {
        match verdict_core::names::normalize(type_name).as_str() {
            "any" => !self.is_null(),
            other => self.type_name() == other,
        }
    }
}

impl RangeValue {
    /// Whether `v` falls inside the range. `None` when an endpoint and `v`
    /// are incomparable or `v` is null.
    pub fn contains(&self, v: &Value) -> Option<bool> {
        if v.is_null() {
            return None;
        }
        if let Some(lo) = &self.lo {
            match v.compare(lo)? {
                Ordering::Less => return Some(false),
                Ordering::Equal if !self.lo_inclusive => return Some(false),
                _ => {}
            }
        }
        if let Some(hi) = &self.hi {
            match v.compare(hi)? {
                Ordering::Greater => return Some(false),
                Ordering::Equal if !self.hi_inclusive => return Some(false),
                _ => {}
            }
        }
        Some(true)
    }
}

/// Parse a FEEL number literal (integer, decimal, or scientific form).
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(d) = Decimal::from_str(s) {
        return Some(d);
    }
    Decimal::from_scientific(s).ok()
}

/// Parse an ISO 8601 date (`2024-03-01`).
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Parse an ISO 8601 time (`14:30:00`, seconds optional).
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

/// Parse an ISO 8601 date-time (`2024-03-01T14:30:00`).
pub fn parse_date_time(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .ok()
}

/// Parse an ISO 8601 duration (`P1Y2M`, `P3DT4H30M`, `-PT15S`).
pub fn parse_duration(s: &str) -> Option<FeelDuration> {
    let s = s.trim();
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let body = s.strip_prefix('P')?;
    let (date_part, time_part) = match body.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (body, None),
    };

    let mut months: i64 = 0;
    let mut seconds: i64 = 0;
    let mut saw_component = false;

    let mut num = String::new();
    for ch in date_part.chars() {
        if ch.is_ascii_digit() {
            num.push(ch);
            continue;
        }
        let n: i64 = num.parse().ok()?;
        num.clear();
        saw_component = true;
        match ch {
            'Y' => months = months.checked_add(n.checked_mul(12)?)?,
            'M' => months = months.checked_add(n)?,
            'W' => seconds = seconds.checked_add(n.checked_mul(7 * 86_400)?)?,
            'D' => seconds = seconds.checked_add(n.checked_mul(86_400)?)?,
            _ => return None,
        }
    }
    if !num.is_empty() {
        return None;
    }
    if let Some(time_part) = time_part {
        for ch in time_part.chars() {
            if ch.is_ascii_digit() {
                num.push(ch);
                continue;
            }
            let n: i64 = num.parse().ok()?;
            num.clear();
            saw_component = true;
            match ch {
                'H' => seconds = seconds.checked_add(n.checked_mul(3_600)?)?,
                'M' => seconds = seconds.checked_add(n.checked_mul(60)?)?,
                'S' => seconds = seconds.checked_add(n)?,
                _ => return None,
            }
        }
        if !num.is_empty() {
            return None;
        }
    }
    if !saw_component {
        return None;
    }
    if negative {
        months = -months;
        seconds = -seconds;
    }
    Some(FeelDuration { months, seconds })
}

impl FeelDuration {
    pub fn from_months(months: i64) -> Self {
        Self { months, seconds: 0 }
    }

    pub fn from_seconds(seconds: i64) -> Self {
        Self { months: 0, seconds }
    }
}

impl fmt::Display for FeelDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let negative = self.months < 0 || self.seconds < 0;
        let months = self.months.unsigned_abs();
        let mut secs = self.seconds.unsigned_abs();
        if negative {
            write!(f, "-")?;
        }
        write!(f, "P")?;
        if months != 0 {
            let (y, m) = (months / 12, months % 12);
            if y != 0 {
                write!(f, "{}Y", y)?;
            }
            if m != 0 {
                write!(f, "{}M", m)?;
            }
            if secs == 0 {
                return Ok(());
            }
        }
        let days = secs / 86_400;
        secs %= 86_400;
        if days != 0 {
            write!(f, "{}D", days)?;
        }
        if secs == 0 {
            if days == 0 && months == 0 {
                write!(f, "T0S")?;
            }
            return Ok(());
        }
        write!(f, "T")?;
        let (h, m, s) = (secs / 3_600, (secs % 3_600) / 60, secs % 60);
        if h != 0 {
            write!(f, "{}H", h)?;
        }
        if m != 0 {
            write!(f, "{}M", m)?;
        }
        if s != 0 {
            write!(f, "{}S", s)?;
        }
        Ok(())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            other => fmt_nested(other, f),
        }
    }
}

/// Inside lists and contexts strings keep their quotes.
fn fmt_nested(v: &Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match v {
        Value::Null => write!(f, "null"),
        Value::Boolean(b) => write!(f, "{}", b),
        Value::Number(n) => write!(f, "{}", n.normalize()),
        Value::String(s) => write!(f, "\"{}\"", s),
        Value::List(items) => {
            write!(f, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                fmt_nested(item, f)?;
            }
            write!(f, "]")
        }
        Value::Context(entries) => {
            write!(f, "{{")?;
            for (i, (k, v)) in entries.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: ", k)?;
                fmt_nested(v, f)?;
            }
            write!(f, "}}")
        }
        Value::Range(r) => {
            write!(f, "{}", if r.lo_inclusive { '[' } else { '(' })?;
            if let Some(lo) = &r.lo {
                fmt_nested(lo, f)?;
            }
            write!(f, "..")?;
            if let Some(hi) = &r.hi {
                fmt_nested(hi, f)?;
            }
            write!(f, "{}", if r.hi_inclusive { ']' } else { ')' })
        }
        Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        Value::Time(t) => write!(f, "{}", t.format("%H:%M:%S")),
        Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
        Value::Duration(d) => write!(f, "{}", d),
        Value::Function(func) => write!(f, "function({})", func.parameters.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_equality_across_forms() {
        let a = parse_decimal("1").unwrap();
        let b = parse_decimal("1.0").unwrap();
        assert_eq!(Value::Number(a), Value::Number(b));
    }

    #[test]
    fn scientific_literals_parse() {
        assert_eq!(parse_decimal("1e3"), Some(Decimal::from(1000)));
        assert_eq!(parse_decimal("2.5e-1"), parse_decimal("0.25"));
        assert_eq!(parse_decimal("abc"), None);
    }

    #[test]
    fn coercion_to_number() {
        assert_eq!(Value::Boolean(true).as_number(), Some(Decimal::ONE));
        assert_eq!(
            Value::String("42".into()).as_number(),
            Some(Decimal::from(42))
        );
        assert_eq!(Value::Null.as_number(), None);
        assert_eq!(Value::list(vec![]).as_number(), None);
    }

    #[test]
    fn compare_stays_in_family() {
        let n = Value::Number(Decimal::ONE);
        let s = Value::String("1".into());
        assert_eq!(n.compare(&s), None);
        assert_eq!(n.compare(&Value::Number(Decimal::TWO)), Some(Ordering::Less));
        assert_eq!(
            s.compare(&Value::String("2".into())),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn range_contains_honors_inclusivity() {
        let r = RangeValue {
            lo: Some(Value::Number(Decimal::from(18))),
            hi: Some(Value::Number(Decimal::from(65))),
            lo_inclusive: true,
            hi_inclusive: false,
        };
        assert_eq!(r.contains(&Value::Number(Decimal::from(18))), Some(true));
        assert_eq!(r.contains(&Value::Number(Decimal::from(65))), Some(false));
        assert_eq!(r.contains(&Value::Number(Decimal::from(40))), Some(true));
        assert_eq!(r.contains(&Value::Null), None);
        assert_eq!(r.contains(&Value::String("40".into())), None);
    }

    #[test]
    fn durations_parse_and_print() {
        assert_eq!(
            parse_duration("P1Y2M"),
            Some(FeelDuration::from_months(14))
        );
        assert_eq!(
            parse_duration("P1DT2H3M4S"),
            Some(FeelDuration::from_seconds(86_400 + 7_384))
        );
        assert_eq!(parse_duration("-PT30S"), Some(FeelDuration::from_seconds(-30)));
        assert_eq!(parse_duration("P"), None);
        assert_eq!(FeelDuration::from_months(14).to_string(), "P1Y2M");
        assert_eq!(FeelDuration::from_seconds(90).to_string(), "PT1M30S");
        assert_eq!(FeelDuration::from_seconds(0).to_string(), "PT0S");
    }

    #[test]
    fn display_quotes_nested_strings_only() {
        let v = Value::list(vec![
            Value::String("a".into()),
            Value::Number(Decimal::from(2)),
        ]);
        assert_eq!(v.to_string(), "[\"a\", 2]");
        assert_eq!(Value::String("a".into()).to_string(), "a");
    }

    #[test]
    fn instance_of_uses_feel_type_names() {
        assert!(Value::Number(Decimal::ONE).is_instance_of("number"));
        assert!(Value::DateTime(parse_date_time("2024-01-01T00:00:00").unwrap())
            .is_instance_of("date and time"));
        assert!(!Value::Null.is_instance_of("any"));
        assert!(Value::Boolean(true).is_instance_of("any"));
    }
}
