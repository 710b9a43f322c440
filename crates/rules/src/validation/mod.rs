//! Rule-group validation with structured errors and suggestions.
//!
//! Checks rule-group structure (operators, operands, sections), comparator
//! compatibility with the left property's type, literal coercibility and
//! property applicability to the group's data type. Returns a
//! [`ValidationResult`] with errors (block save) and warnings (advisory).

mod rule_checks;

pub mod fuzzy;

use serde::{Deserialize, Serialize};

use crate::loader::RuleGroupDocument;
use crate::schema::RuleGroup;

// ── Result types ────────────────────────────────────────────────────

/// Overall validation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// A blocking validation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    /// Path-like location, e.g. `"rules[2].customVal"`.
    pub path: String,
    pub message: String,
    /// Optional "Did you mean …?" suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// A non-blocking advisory warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationResult {
    pub(crate) fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        });
    }

    pub(crate) fn error_with_suggestion(
        &mut self,
        path: impl Into<String>,
        message: impl Into<String>,
        suggestion: Option<String>,
    ) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion,
        });
    }

    pub(crate) fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
        });
    }

    /// One line per error, for error messages and CLI output.
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| {
                let mut line = if e.path.is_empty() {
                    e.message.clone()
                } else {
                    format!("{}: {}", e.path, e.message)
                };
                if let Some(s) = &e.suggestion {
                    line.push_str(&format!(" (did you mean '{}'?)", s));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

// ── Public API ──────────────────────────────────────────────────────

/// Validate a stored [`RuleGroup`].
pub fn validate_group(group: &RuleGroup) -> ValidationResult {
    let mut result = ValidationResult::new();
    rule_checks::validate_header(group, &mut result);
    rule_checks::validate_rules(group, &mut result);
    result
}

/// Validate an imported document: resolve every name, then run the group
/// checks on the resolved rules.
pub fn validate_document(doc: &RuleGroupDocument) -> ValidationResult {
    let mut result = ValidationResult::new();
    for (i, entry) in doc.rules.iter().enumerate() {
        if let Err(problems) = entry.resolve() {
            for p in problems {
                result.error_with_suggestion(
                    format!("rules[{}].{}", i, p.field),
                    p.message,
                    p.suggestion,
                );
            }
        }
    }
    if !result.valid {
        return result;
    }
    match doc.clone().into_group() {
        Ok(group) => validate_group(&group),
        Err(e) => {
            result.error("", e.to_string());
            result
        }
    }
}

/// Parse raw YAML and validate. Returns parse errors merged with validation errors.
pub fn validate_yaml(yaml: &str) -> ValidationResult {
    match RuleGroupDocument::from_yaml(yaml) {
        Ok(doc) => validate_document(&doc),
        Err(e) => {
            let mut result = ValidationResult::new();
            result.error("", e.to_string());
            result
        }
    }
}
