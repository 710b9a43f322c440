//! Human-readable YAML form of a rule group.
//!
//! Properties are written as `application.name` keys and comparators,
//! operators and literal types by name, so exported files survive id
//! renumbering and can be edited by hand:
//!
//! ```yaml
//! name: Old movies
//! libraryId: "1"
//! mediaType: movie
//! rules:
//!   - section: 0
//!     firstVal: plex.addDate
//!     action: in_last
//!     customVal: { type: number, value: "30" }
//! ```

use serde::{Deserialize, Serialize};

use culler_core::DataType;

use super::error::{Result, RuleError};
use crate::schema::{
    Comparator, CustomValue, Operator, RuleDefinition, RuleGroup, RuleProperty, RuleType,
};
use crate::validation::fuzzy::fuzzy_match;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleGroupDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub library_id: String,
    pub media_type: DataType,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true")]
    pub use_rules: bool,
    #[serde(default)]
    pub rules: Vec<RuleEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleEntry {
    #[serde(default)]
    pub section: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    pub first_val: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_val: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_val: Option<LiteralEntry>,
}

/// Literal right operand. `value` may be written as any YAML scalar or a
/// list of strings; it is stored as the literal's text form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteralEntry {
    #[serde(rename = "type")]
    pub rule_type: String,
    pub value: serde_yaml::Value,
}

/// A field of a [`RuleEntry`] that could not be resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryProblem {
    pub field: &'static str,
    pub message: String,
    pub suggestion: Option<String>,
}

impl RuleGroupDocument {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Export a stored group.
    pub fn from_group(group: &RuleGroup) -> Self {
        Self {
            name: group.name.clone(),
            description: group.description.clone(),
            library_id: group.library_id.clone(),
            media_type: group.data_type,
            is_active: group.is_active,
            use_rules: group.use_rules,
            rules: group.rules.iter().map(RuleEntry::from_rule).collect(),
        }
    }

    /// Resolve every entry into a [`RuleGroup`] (id 0, unlinked). Fails on the
    /// first entry that does not resolve; use
    /// [`validate_document`](crate::validation::validate_document) to collect
    /// every problem at once.
    pub fn into_group(self) -> Result<RuleGroup> {
        let mut rules = Vec::with_capacity(self.rules.len());
        for (i, entry) in self.rules.iter().enumerate() {
            let rule = entry.resolve().map_err(|problems| {
                let p = &problems[0];
                let hint = p
                    .suggestion
                    .as_ref()
                    .map(|s| format!(" (did you mean '{}'?)", s))
                    .unwrap_or_default();
                RuleError::Validation(format!("rules[{}].{}: {}{}", i, p.field, p.message, hint))
            })?;
            rules.push(rule);
        }
        let mut group = RuleGroup::new(self.name, self.library_id, self.media_type).with_rules(rules);
        group.description = self.description;
        group.is_active = self.is_active;
        group.use_rules = self.use_rules;
        Ok(group)
    }
}

impl RuleEntry {
    pub fn from_rule(rule: &RuleDefinition) -> Self {
        Self {
            section: rule.section,
            operator: rule.operator.map(|o| o.name().to_string()),
            first_val: rule.first_val.key(),
            action: rule.action.name().to_string(),
            last_val: rule.last_val.map(|p| p.key()),
            custom_val: rule.custom_val.as_ref().map(|c| LiteralEntry {
                rule_type: c.rule_type_id.name().to_string(),
                value: serde_yaml::Value::String(c.value.clone()),
            }),
        }
    }

    /// Resolve names into a [`RuleDefinition`], reporting every field that
    /// does not resolve.
    pub fn resolve(&self) -> std::result::Result<RuleDefinition, Vec<EntryProblem>> {
        let mut problems = Vec::new();

        let operator = match self.operator.as_deref().map(str::parse::<Operator>) {
            None => None,
            Some(Ok(op)) => Some(op),
            Some(Err(e)) => {
                problems.push(EntryProblem {
                    field: "operator",
                    message: e,
                    suggestion: None,
                });
                None
            }
        };
        let first_val = resolve_property("firstVal", &self.first_val, &mut problems);
        let last_val = self
            .last_val
            .as_deref()
            .and_then(|key| resolve_property("lastVal", key, &mut problems));
        let action = match self.action.parse::<Comparator>() {
            Ok(c) => Some(c),
            Err(e) => {
                let names: Vec<&str> = Comparator::ALL.iter().map(|c| c.name()).collect();
                problems.push(EntryProblem {
                    field: "action",
                    message: e,
                    suggestion: fuzzy_match(&self.action, &names).map(String::from),
                });
                None
            }
        };
        let custom_val = match &self.custom_val {
            None => None,
            Some(literal) => match literal.rule_type.parse::<RuleType>() {
                Ok(rule_type) => Some(CustomValue::new(rule_type, literal_text(&literal.value))),
                Err(e) => {
                    problems.push(EntryProblem {
                        field: "customVal.type",
                        message: e,
                        suggestion: None,
                    });
                    None
                }
            },
        };

        match (first_val, action) {
            (Some(first_val), Some(action)) if problems.is_empty() => Ok(RuleDefinition {
                operator,
                action,
                first_val,
                last_val,
                custom_val,
                section: self.section,
            }),
            _ => Err(problems),
        }
    }
}

fn resolve_property(
    field: &'static str,
    key: &str,
    problems: &mut Vec<EntryProblem>,
) -> Option<RuleProperty> {
    let found = RuleProperty::from_key(key);
    if found.is_none() {
        let keys = RuleProperty::all_keys();
        let candidates: Vec<&str> = keys.iter().map(String::as_str).collect();
        problems.push(EntryProblem {
            field,
            message: format!("unknown property '{}'", key),
            suggestion: fuzzy_match(key, &candidates).map(String::from),
        });
    }
    found
}

fn literal_text(value: &serde_yaml::Value) -> String {
    use serde_yaml::Value;
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Sequence(items) => {
            let texts: Vec<String> = items.iter().map(literal_text).collect();
            serde_json::to_string(&texts).unwrap_or_else(|_| texts.join(","))
        }
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}
