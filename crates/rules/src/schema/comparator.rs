//! Comparators, chain operators and operand types.
//!
//! All three serialize as their numeric ids in stored rule JSON and as
//! snake_case names in YAML documents (see [`crate::loader`]).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Comparator ──────────────────────────────────────────────────────

/// The comparison a rule performs between its left and right operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Comparator {
    Bigger,
    Smaller,
    Equals,
    NotEquals,
    Contains,
    Before,
    After,
    InLast,
    InNext,
    NotContains,
    ContainsPartial,
    NotContainsPartial,
    ContainsAll,
    NotContainsAll,
    CountEquals,
    CountNotEquals,
    CountBigger,
    CountSmaller,
}

impl Comparator {
    pub const ALL: [Comparator; 18] = [
        Comparator::Bigger,
        Comparator::Smaller,
        Comparator::Equals,
        Comparator::NotEquals,
        Comparator::Contains,
        Comparator::Before,
        Comparator::After,
        Comparator::InLast,
        Comparator::InNext,
        Comparator::NotContains,
        Comparator::ContainsPartial,
        Comparator::NotContainsPartial,
        Comparator::ContainsAll,
        Comparator::NotContainsAll,
        Comparator::CountEquals,
        Comparator::CountNotEquals,
        Comparator::CountBigger,
        Comparator::CountSmaller,
    ];

    pub fn id(self) -> u8 {
        match self {
            Comparator::Bigger => 0,
            Comparator::Smaller => 1,
            Comparator::Equals => 2,
            Comparator::NotEquals => 3,
            Comparator::Contains => 4,
            Comparator::Before => 5,
            Comparator::After => 6,
            Comparator::InLast => 7,
            Comparator::InNext => 8,
            Comparator::NotContains => 9,
            Comparator::ContainsPartial => 10,
            Comparator::NotContainsPartial => 11,
            Comparator::ContainsAll => 12,
            Comparator::NotContainsAll => 13,
            Comparator::CountEquals => 14,
            Comparator::CountNotEquals => 15,
            Comparator::CountBigger => 16,
            Comparator::CountSmaller => 17,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            Comparator::Bigger => "bigger",
            Comparator::Smaller => "smaller",
            Comparator::Equals => "equals",
            Comparator::NotEquals => "not_equals",
            Comparator::Contains => "contains",
            Comparator::Before => "before",
            Comparator::After => "after",
            Comparator::InLast => "in_last",
            Comparator::InNext => "in_next",
            Comparator::NotContains => "not_contains",
            Comparator::ContainsPartial => "contains_partial",
            Comparator::NotContainsPartial => "not_contains_partial",
            Comparator::ContainsAll => "contains_all",
            Comparator::NotContainsAll => "not_contains_all",
            Comparator::CountEquals => "count_equals",
            Comparator::CountNotEquals => "count_not_equals",
            Comparator::CountBigger => "count_bigger",
            Comparator::CountSmaller => "count_smaller",
        }
    }

    /// Type the right operand must have, given the left operand's type.
    ///
    /// Date windows and counts always take a number. List membership
    /// accepts either a single text or a list, reported as `TextList`.
    pub fn right_operand_type(self, left: RuleType) -> RuleType {
        match self {
            Comparator::InLast
            | Comparator::InNext
            | Comparator::CountEquals
            | Comparator::CountNotEquals
            | Comparator::CountBigger
            | Comparator::CountSmaller => RuleType::Number,
            _ => left,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Comparator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|c| c.name() == normalized)
            .ok_or_else(|| format!("unknown comparator: '{}'", s))
    }
}

impl TryFrom<u8> for Comparator {
    type Error = String;

    fn try_from(id: u8) -> std::result::Result<Self, Self::Error> {
        Self::from_id(id).ok_or_else(|| format!("unknown comparator id: {}", id))
    }
}

impl From<Comparator> for u8 {
    fn from(c: Comparator) -> u8 {
        c.id()
    }
}

// ── Operator ────────────────────────────────────────────────────────

/// How a rule combines with the running result of its section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Operator {
    And,
    Or,
}

impl Operator {
    pub fn name(self) -> &'static str {
        match self {
            Operator::And => "and",
            Operator::Or => "or",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "and" => Ok(Operator::And),
            "or" => Ok(Operator::Or),
            other => Err(format!("unknown operator: '{}'", other)),
        }
    }
}

impl TryFrom<u8> for Operator {
    type Error = String;

    fn try_from(id: u8) -> std::result::Result<Self, Self::Error> {
        match id {
            0 => Ok(Operator::And),
            1 => Ok(Operator::Or),
            other => Err(format!("unknown operator id: {}", other)),
        }
    }
}

impl From<Operator> for u8 {
    fn from(op: Operator) -> u8 {
        match op {
            Operator::And => 0,
            Operator::Or => 1,
        }
    }
}

// ── Rule type ───────────────────────────────────────────────────────

/// Declared type of an operand; literal values are coerced to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RuleType {
    Number,
    Date,
    Text,
    Bool,
    TextList,
}

impl RuleType {
    pub const ALL: [RuleType; 5] = [
        RuleType::Number,
        RuleType::Date,
        RuleType::Text,
        RuleType::Bool,
        RuleType::TextList,
    ];

    pub fn id(self) -> u8 {
        match self {
            RuleType::Number => 0,
            RuleType::Date => 1,
            RuleType::Text => 2,
            RuleType::Bool => 3,
            RuleType::TextList => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RuleType::Number => "number",
            RuleType::Date => "date",
            RuleType::Text => "text",
            RuleType::Bool => "bool",
            RuleType::TextList => "text_list",
        }
    }

    /// Comparators valid for a left operand of this type.
    pub fn comparators(self) -> &'static [Comparator] {
        use Comparator::*;
        match self {
            RuleType::Number => &[Bigger, Smaller, Equals, NotEquals],
            RuleType::Date => &[Equals, NotEquals, Before, After, InLast, InNext],
            RuleType::Text => &[
                Equals,
                NotEquals,
                Contains,
                NotContains,
                ContainsPartial,
                NotContainsPartial,
            ],
            RuleType::Bool => &[Equals, NotEquals],
            RuleType::TextList => &[
                Equals,
                NotEquals,
                Contains,
                NotContains,
                ContainsPartial,
                NotContainsPartial,
                ContainsAll,
                NotContainsAll,
                CountEquals,
                CountNotEquals,
                CountBigger,
                CountSmaller,
            ],
        }
    }

    pub fn supports(self, comparator: Comparator) -> bool {
        self.comparators().contains(&comparator)
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RuleType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "number" => Ok(RuleType::Number),
            "date" => Ok(RuleType::Date),
            "text" => Ok(RuleType::Text),
            "bool" | "boolean" => Ok(RuleType::Bool),
            "text_list" | "list" => Ok(RuleType::TextList),
            other => Err(format!("unknown rule type: '{}'", other)),
        }
    }
}

impl TryFrom<u8> for RuleType {
    type Error = String;

    fn try_from(id: u8) -> std::result::Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|t| t.id() == id)
            .ok_or_else(|| format!("unknown rule type id: {}", id))
    }
}

impl From<RuleType> for u8 {
    fn from(t: RuleType) -> u8 {
        t.id()
    }
}
