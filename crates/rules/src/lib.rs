//! Rule engine for media lifecycle rule groups.
//!
//! This crate provides:
//! - The rule schema: applications, the property catalog, comparators,
//!   rule types and typed literal values
//! - A fail-closed evaluator with lazy AND/OR section composition
//! - A memoizing value resolver over the capability providers
//! - The rule-group handler producing matched/unmatched sets
//! - Validation with "did you mean" suggestions
//! - YAML import/export of rule groups keyed by property names

pub mod evaluator;
pub mod handler;
pub mod loader;
pub mod resolver;
pub mod schema;
pub mod validation;

pub use handler::{
    EvaluationProgress, GroupEvaluation, HandlerSettings, MediaTestResult, RuleGroupHandler,
    RuleTrace,
};
pub use loader::{Result, RuleError, RuleGroupDocument, RuleLoader};
pub use resolver::ValueResolver;
pub use schema::{
    Application, Comparator, CustomValue, Operator, RuleDefinition, RuleGroup, RuleProperty,
    RuleType, RuleValue,
};
pub use validation::{validate_document, validate_group, validate_yaml, ValidationResult};
