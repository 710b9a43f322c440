//! The two scheduled top-level jobs.

mod collection_handler;
mod rule_handler;

pub use collection_handler::CollectionHandlerJob;
pub use rule_handler::RuleHandlerJob;

/// Ledger name of the rule handler.
pub const RULE_HANDLER: &str = "rule-handler";
/// Ledger name of the collection handler.
pub const COLLECTION_HANDLER: &str = "collection-handler";

pub const TASK_NAMES: [&str; 2] = [RULE_HANDLER, COLLECTION_HANDLER];
