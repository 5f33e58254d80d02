use crate::kv::Table;

/// An error surfaced by a storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// A stored entry failed to decode.
    #[error("corrupt entry in table {table:?}: {reason}")]
    Corrupt {
        /// The table holding the entry.
        table: Table,
        /// What the decoder rejected.
        reason: String,
    },
    /// The backing store rejected a batch commit.
    ///
    /// The last committed checkpoint remains valid; the stage run that hit
    /// this is safe to retry.
    #[error("batch commit failed: {0}")]
    Commit(String),
}
