//! Rule definitions and rule groups.

use serde::{Deserialize, Serialize};

use culler_core::{DataType, RecordId};

use super::comparator::{Comparator, Operator, RuleType};
use super::property::RuleProperty;
use super::value::RuleValue;

/// Literal right operand, always stored as a string plus its declared type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomValue {
    pub rule_type_id: RuleType,
    pub value: String,
}

impl CustomValue {
    pub fn new(rule_type: RuleType, value: impl Into<String>) -> Self {
        Self {
            rule_type_id: rule_type,
            value: value.into(),
        }
    }

    pub fn coerce(&self) -> std::result::Result<RuleValue, String> {
        RuleValue::parse(self.rule_type_id, &self.value)
    }
}

/// One comparator condition.
///
/// `operator` is `None` only for the first rule of a section. Exactly one of
/// `last_val` (dynamic right operand) or `custom_val` (literal) is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    #[serde(default)]
    pub operator: Option<Operator>,
    pub action: Comparator,
    pub first_val: RuleProperty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_val: Option<RuleProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_val: Option<CustomValue>,
    #[serde(default)]
    pub section: u32,
}

impl RuleDefinition {
    /// First rule of a section compared against a literal.
    pub fn literal(
        section: u32,
        first_val: RuleProperty,
        action: Comparator,
        custom_val: CustomValue,
    ) -> Self {
        Self {
            operator: None,
            action,
            first_val,
            last_val: None,
            custom_val: Some(custom_val),
            section,
        }
    }

    /// First rule of a section compared against another property.
    pub fn dynamic(
        section: u32,
        first_val: RuleProperty,
        action: Comparator,
        last_val: RuleProperty,
    ) -> Self {
        Self {
            operator: None,
            action,
            first_val,
            last_val: Some(last_val),
            custom_val: None,
            section,
        }
    }

    pub fn with_operator(mut self, operator: Operator) -> Self {
        self.operator = Some(operator);
        self
    }
}

/// A library-scoped set of rules, optionally owning one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleGroup {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub library_id: String,
    pub data_type: DataType,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// `false` marks a manually curated collection; evaluation is skipped.
    #[serde(default = "default_true")]
    pub use_rules: bool,
    #[serde(default)]
    pub collection_id: Option<RecordId>,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

fn default_true() -> bool {
    true
}

impl RuleGroup {
    /// New active, rule-driven group. `id` is assigned on save.
    pub fn new(name: impl Into<String>, library_id: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: 0,
            name: name.into(),
            description: None,
            library_id: library_id.into(),
            data_type,
            is_active: true,
            use_rules: true,
            collection_id: None,
            rules: Vec::new(),
        }
    }

    pub fn with_rules(mut self, rules: Vec<RuleDefinition>) -> Self {
        self.rules = rules;
        self
    }

    /// Whether the rule handler should evaluate this group at all.
    pub fn is_evaluated(&self) -> bool {
        self.is_active && self.use_rules
    }
}
