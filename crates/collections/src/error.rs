use thiserror::Error;

use culler_core::{MediaId, ProviderError, RecordId};
use culler_storage::StoreError;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Collection not found: {0}")]
    CollectionNotFound(RecordId),

    #[error("Rule group {0} has no collection")]
    Unlinked(RecordId),

    #[error("Media item not found: {0}")]
    MediaNotFound(MediaId),

    #[error("Media {media_id} is already in collection {collection_id}")]
    AlreadyMember {
        collection_id: RecordId,
        media_id: MediaId,
    },

    /// The item cannot join the collection (wrong library or media type).
    #[error("{0}")]
    Incompatible(String),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
