//! Rule-group documents on disk.
//!
//! Import/export of rule groups as human-readable YAML keyed by property
//! names, plus a directory loader that validates every file it reads.

mod core;
mod document;
mod error;


pub use self::core::RuleLoader;
pub use self::document::{EntryProblem, LiteralEntry, RuleEntry, RuleGroupDocument};
pub use self::error::{LoadResult, LoadStatus, Result, RuleError};
