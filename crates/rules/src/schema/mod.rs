//! Rule schema types.
//!
//! - [`Application`] and [`RuleProperty`]: where an operand comes from
//! - [`Comparator`], [`Operator`], [`RuleType`]: what a rule does with it
//! - [`RuleValue`] and [`CustomValue`]: typed operands and stored literals
//! - [`RuleDefinition`] and [`RuleGroup`]: the persisted rule model

mod application;
mod comparator;
mod property;
mod rule;
mod value;

pub use application::*;
pub use comparator::*;
pub use property::*;
pub use rule::*;
pub use value::*;
