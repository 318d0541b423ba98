//! Field filter configuration

use serde::Deserialize;

use crate::{TransformError, TransformResult};

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

/// What to do with events that match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterAction {
    /// Drop events that match the conditions
    #[default]
    Drop,
    /// Keep only events that match the conditions
    Keep,
}

/// How to combine multiple conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// All conditions must match (AND)
    #[default]
    All,
    /// Any condition must match (OR)
    Any,
}

/// Comparison operator for conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[default]
    Eq,
    Ne,
    Contains,
    StartsWith,
    EndsWith,
    Regex,
    Exists,
    Gt,
    Lt,
    Gte,
    Lte,
}

/// A single filter condition
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Condition {
    /// Field path in dot notation, e.g. `user.email`
    pub field: String,
    #[serde(default)]
    pub operator: Operator,
    /// Value to compare against (unused for `exists`)
    #[serde(default)]
    pub value: Option<String>,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: Option<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, Operator::Eq, Some(value.into()))
    }

    pub fn ne(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, Operator::Ne, Some(value.into()))
    }

    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, Operator::Contains, Some(value.into()))
    }

    pub fn starts_with(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, Operator::StartsWith, Some(value.into()))
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Self::new(field, Operator::Exists, None)
    }

    pub fn regex(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(field, Operator::Regex, Some(pattern.into()))
    }

    pub fn gt(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, Operator::Gt, Some(value.into()))
    }
}

/// Configuration for [`FieldFilter`](super::FieldFilter)
///
/// ```toml
/// action = "keep"
/// match = "any"
///
/// [[conditions]]
/// field = "level"
/// value = "error"
///
/// [[conditions]]
/// field = "status"
/// operator = "gte"
/// value = "500"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub action: FilterAction,
    #[serde(rename = "match", alias = "match_mode")]
    pub match_mode: MatchMode,
    pub conditions: Vec<Condition>,
}

impl FilterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_action(mut self, action: FilterAction) -> Self {
        self.action = action;
        self
    }

    pub fn with_match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Validate the configuration of the filter `id`
    pub fn validate(&self, id: &str) -> TransformResult<()> {
        if self.conditions.is_empty() {
            return Err(TransformError::config(id, "at least one condition is required"));
        }

        for (i, condition) in self.conditions.iter().enumerate() {
            if condition.field.is_empty() {
                return Err(TransformError::config(
                    id,
                    format!("condition {i} has an empty field"),
                ));
            }
            if condition.operator != Operator::Exists && condition.value.is_none() {
                return Err(TransformError::config(
                    id,
                    format!("condition {i} requires a value for operator {:?}", condition.operator),
                ));
            }
        }

        Ok(())
    }
}
