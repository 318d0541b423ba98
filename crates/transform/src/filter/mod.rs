//! Field filter - drop or keep events by field conditions
//!
//! # Configuration
//!
//! | Option | Type | Default | Description |
//! |--------|------|---------|-------------|
//! | `action` | string | `"drop"` | Action when conditions match: `drop` or `keep` |
//! | `match` | string | `"all"` | How to combine conditions: `all` (AND) or `any` (OR) |
//! | `conditions` | array | required | List of conditions to evaluate |
//!
//! ## Operators
//!
//! | Operator | Description |
//! |----------|-------------|
//! | `eq` | Equal to value |
//! | `ne` | Not equal to value (true when the field is missing) |
//! | `contains` | String contains value |
//! | `starts_with` | String starts with value |
//! | `ends_with` | String ends with value |
//! | `regex` | Matches regex pattern |
//! | `exists` | Field exists (value ignored) |
//! | `gt` / `lt` / `gte` / `lte` | Numeric comparison |
//!
//! A dropped event is consumed: the stage returns `Ok(None)` and routing of
//! that event ends.

mod config;

pub use config::{Condition, FilterAction, FilterConfig, MatchMode, Operator};

use std::sync::atomic::{AtomicU64, Ordering};

use regex::Regex;
use serde_json::Value;
use sluice_pipeline::{Context, Event, Processor, StageResult};

use crate::{TransformError, TransformResult};

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

/// Counters of the filter
#[derive(Debug, Default)]
pub struct FilterMetrics {
    pub received: AtomicU64,
    pub passed: AtomicU64,
    pub dropped: AtomicU64,
}

impl FilterMetrics {
    /// Drop rate (0.0 - 1.0)
    pub fn drop_rate(&self) -> f64 {
        let received = self.received.load(Ordering::Relaxed);
        let dropped = self.dropped.load(Ordering::Relaxed);
        if received == 0 {
            0.0
        } else {
            dropped as f64 / received as f64
        }
    }
}

/// Condition with its regex compiled
#[derive(Debug)]
struct Compiled {
    condition: Condition,
    regex: Option<Regex>,
}

/// Drops or keeps events based on field conditions. Stateless.
#[derive(Debug)]
pub struct FieldFilter {
    id: String,
    action: FilterAction,
    match_mode: MatchMode,
    conditions: Vec<Compiled>,
    metrics: FilterMetrics,
}

impl FieldFilter {
    pub fn new(id: impl Into<String>, config: FilterConfig) -> TransformResult<Self> {
        let id = id.into();
        config.validate(&id)?;

        let conditions = config
            .conditions
            .into_iter()
            .map(|condition| {
                let regex = match (condition.operator, &condition.value) {
                    (Operator::Regex, Some(pattern)) => {
                        Some(Regex::new(pattern).map_err(|source| TransformError::Regex {
                            pattern: pattern.clone(),
                            source,
                        })?)
                    }
                    _ => None,
                };
                Ok(Compiled { condition, regex })
            })
            .collect::<TransformResult<Vec<_>>>()?;

        Ok(Self {
            id,
            action: config.action,
            match_mode: config.match_mode,
            conditions,
            metrics: FilterMetrics::default(),
        })
    }

    pub fn metrics(&self) -> &FilterMetrics {
        &self.metrics
    }

    /// Whether `event` satisfies the conditions under the match mode
    pub fn matches(&self, event: &Event) -> bool {
        match self.match_mode {
            MatchMode::All => self.conditions.iter().all(|c| eval_condition(c, event)),
            MatchMode::Any => self.conditions.iter().any(|c| eval_condition(c, event)),
        }
    }
}

impl Processor for FieldFilter {
    fn id(&self) -> &str {
        &self.id
    }

    fn process(&self, _context: &mut Context, event: Event) -> StageResult {
        self.metrics.received.fetch_add(1, Ordering::Relaxed);

        let matches = self.matches(&event);
        let keep = match self.action {
            FilterAction::Drop => !matches,
            FilterAction::Keep => matches,
        };

        if keep {
            self.metrics.passed.fetch_add(1, Ordering::Relaxed);
            Ok(Some(event))
        } else {
            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
            Ok(None)
        }
    }
}

fn eval_condition(compiled: &Compiled, event: &Event) -> bool {
    let condition = &compiled.condition;
    let field = get_field(event, &condition.field);
    let expected = condition.value.as_deref();

    match condition.operator {
        Operator::Exists => field.is_some(),
        Operator::Eq => match (field, expected) {
            (Some(field), Some(expected)) => value_equals(field, expected),
            _ => false,
        },
        Operator::Ne => match (field, expected) {
            (Some(field), Some(expected)) => !value_equals(field, expected),
            // A missing field is not equal to anything
            _ => true,
        },
        Operator::Contains => string_test(field, expected, |s, v| s.contains(v)),
        Operator::StartsWith => string_test(field, expected, |s, v| s.starts_with(v)),
        Operator::EndsWith => string_test(field, expected, |s, v| s.ends_with(v)),
        Operator::Regex => match (field.and_then(value_as_string), &compiled.regex) {
            (Some(s), Some(re)) => re.is_match(&s),
            _ => false,
        },
        Operator::Gt => numeric_compare(field, expected, |a, b| a > b),
        Operator::Lt => numeric_compare(field, expected, |a, b| a < b),
        Operator::Gte => numeric_compare(field, expected, |a, b| a >= b),
        Operator::Lte => numeric_compare(field, expected, |a, b| a <= b),
    }
}

/// Field lookup in dot notation
fn get_field<'a>(event: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(event, |current, part| match current {
        Value::Object(map) => map.get(part),
        _ => None,
    })
}

fn value_equals(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s == expected,
        Value::Number(n) => n.to_string() == expected,
        Value::Bool(b) => (expected == "true" && *b) || (expected == "false" && !*b),
        Value::Null => expected == "null",
        _ => false,
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_test<F>(field: Option<&Value>, expected: Option<&str>, test: F) -> bool
where
    F: Fn(&str, &str) -> bool,
{
    match (field.and_then(value_as_string), expected) {
        (Some(s), Some(v)) => test(&s, v),
        _ => false,
    }
}

fn numeric_compare<F>(field: Option<&Value>, expected: Option<&str>, cmp: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    let field_num = field.and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    });
    let expected_num = expected.and_then(|s| s.parse::<f64>().ok());

    match (field_num, expected_num) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}
