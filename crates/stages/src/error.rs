use crate::{spill::SpillError, stages::SenderRecoveryError};
use chainsync_primitives::BlockNumber;
use chainsync_storage::StorageError;
use thiserror::Error;

/// A stage execution error.
#[derive(Error, Debug)]
pub enum StageError {
    /// The stage encountered a storage error.
    #[error("an internal storage error occurred: {0}")]
    Database(#[from] StorageError),
    /// The spill file could not be written or read back.
    #[error("spill buffer error at block {block}: {source}")]
    Spill {
        /// The block being spilled or applied when the error surfaced.
        block: BlockNumber,
        /// The underlying spill error.
        #[source]
        source: SpillError,
    },
    /// Sender recovery failed for a block.
    ///
    /// The whole block is rejected; no addresses are accepted for it.
    #[error("sender recovery failed at block {block}: {source}")]
    SenderRecovery {
        /// The block whose job failed.
        block: BlockNumber,
        /// The underlying recovery error.
        #[source]
        source: SenderRecoveryError,
    },
    /// The stage was canceled through the stop signal.
    #[error("stage execution was canceled")]
    Canceled,
    /// An internal channel or task ended before the stage was drained.
    #[error("internal channel closed")]
    ChannelClosed,
    /// The stage encountered a fatal internal error.
    #[error(transparent)]
    Fatal(Box<dyn std::error::Error + Send + Sync>),
}

impl StageError {
    /// If the error is fatal, retrying the stage without intervention will
    /// not help.
    ///
    /// Commit failures and cancellation are not fatal: the last checkpoint
    /// remains valid and the whole stage is safe to re-run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, StageError::Database(StorageError::Commit(_)) | StageError::Canceled)
    }
}
