use crate::{error::StageError, id::StageId};
use async_trait::async_trait;
use chainsync_primitives::BlockNumber;
use chainsync_storage::Store;

/// Stage execution input, see [Stage::execute].
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct ExecInput {
    /// The progress of this stage the last time it was executed, if known.
    ///
    /// When unset, the stage resolves it from the progress ledger.
    pub stage_progress: Option<BlockNumber>,
}

/// Stage unwind input, see [Stage::unwind].
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct UnwindInput {
    /// The block to unwind to.
    pub unwind_to: BlockNumber,
}

/// The output of a stage execution.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ExecOutput {
    /// How far the stage got.
    pub stage_progress: BlockNumber,
    /// Whether or not the stage is done.
    pub done: bool,
}

/// The output of a stage unwinding.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct UnwindOutput {
    /// The block at which the stage has unwound to.
    pub stage_progress: BlockNumber,
}

/// A stage is a segmented part of the syncing process of the node.
///
/// Each stage takes care of a well-defined task, such as downloading block
/// bodies or recovering transaction senders, and persists its results to the
/// store behind the [`Store`] seam.
///
/// Stages must have a unique [ID][StageId] and implement a way to "roll
/// forwards" ([Stage::execute]) and a way to "roll back" ([Stage::unwind]).
///
/// Stages are executed serially; within a stage, how much parallelism is
/// used is the stage's own business. The store mutation surface is owned by
/// exactly one sequential control flow at a time.
#[async_trait]
pub trait Stage<S: Store>: Send + Sync {
    /// Get the ID of the stage.
    ///
    /// Stage IDs must be unique.
    fn id(&self) -> StageId;

    /// Execute the stage.
    async fn execute(&mut self, store: &S, input: ExecInput) -> Result<ExecOutput, StageError>;

    /// Unwind the stage.
    async fn unwind(&mut self, store: &S, input: UnwindInput) -> Result<UnwindOutput, StageError>;
}
