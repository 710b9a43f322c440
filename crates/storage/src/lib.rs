//! Record persistence: rule groups, collections, exclusions, logs and the
//! task ledger behind one [`RecordStore`] trait.

pub mod error;
pub mod memory;
pub mod store;

use std::sync::Arc;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use store::{RecordStore, TaskClaim};

pub type SharedStore = Arc<dyn RecordStore>;
