//! Typed operand values and literal coercion.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::comparator::RuleType;

/// A resolved operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RuleValue {
    Number(f64),
    Date(DateTime<Utc>),
    Text(String),
    Bool(bool),
    TextList(Vec<String>),
}

impl RuleValue {
    pub fn rule_type(&self) -> RuleType {
        match self {
            RuleValue::Number(_) => RuleType::Number,
            RuleValue::Date(_) => RuleType::Date,
            RuleValue::Text(_) => RuleType::Text,
            RuleValue::Bool(_) => RuleType::Bool,
            RuleValue::TextList(_) => RuleType::TextList,
        }
    }

    /// Coerce a stored literal to `rule_type`.
    ///
    /// NUMBER parses as `f64`; DATE accepts RFC 3339 or `YYYY-MM-DD`
    /// (midnight UTC); BOOL accepts `true/false/1/0/yes/no`; TEXT_LIST
    /// accepts a JSON array of strings or a comma-separated list.
    pub fn parse(rule_type: RuleType, raw: &str) -> std::result::Result<Self, String> {
        let trimmed = raw.trim();
        match rule_type {
            RuleType::Number => trimmed
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(RuleValue::Number)
                .ok_or_else(|| format!("'{}' is not a number", raw)),
            RuleType::Date => parse_date(trimmed)
                .map(RuleValue::Date)
                .ok_or_else(|| format!("'{}' is not a date (RFC 3339 or YYYY-MM-DD)", raw)),
            RuleType::Text => Ok(RuleValue::Text(raw.to_string())),
            RuleType::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(RuleValue::Bool(true)),
                "false" | "0" | "no" => Ok(RuleValue::Bool(false)),
                _ => Err(format!("'{}' is not a boolean", raw)),
            },
            RuleType::TextList => {
                if trimmed.starts_with('[') {
                    serde_json::from_str::<Vec<String>>(trimmed)
                        .map(RuleValue::TextList)
                        .map_err(|e| format!("'{}' is not a JSON string array: {}", raw, e))
                } else {
                    Ok(RuleValue::TextList(
                        trimmed
                            .split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(String::from)
                            .collect(),
                    ))
                }
            }
        }
    }

    /// Inverse of [`parse`](Self::parse), used when exporting literals.
    pub fn to_literal(&self) -> String {
        match self {
            RuleValue::Number(n) => format_number(*n),
            RuleValue::Date(d) => d.to_rfc3339(),
            RuleValue::Text(s) => s.clone(),
            RuleValue::Bool(b) => b.to_string(),
            RuleValue::TextList(items) => {
                serde_json::to_string(items).unwrap_or_else(|_| items.join(","))
            }
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            RuleValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            RuleValue::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for RuleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleValue::TextList(items) => write!(f, "[{}]", items.join(", ")),
            other => f.write_str(&other.to_literal()),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

pub(crate) fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
