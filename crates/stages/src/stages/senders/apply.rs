use crate::{
    error::StageError,
    id::StageId,
    signal::StopSignal,
    spill::{SpillError, SpillReader},
};
use chainsync_primitives::BlockNumber;
use chainsync_storage::{read_body, read_canonical_hash, write_body, Batch, Store};
use std::io::Read;
use tracing::info;

/// Second pass: walk bodies from the spill file's first block, attach the
/// recovered senders, and commit in checkpointed batches.
///
/// The walk re-derives the same block sequence the producer saw, keyed by
/// block range rather than file offsets. Blocks at or below `progress` are
/// drained from the spill stream without being rewritten, so a restarted
/// apply converges on the same state as an uninterrupted one.
///
/// Returns the highest block applied, or `progress` when there was nothing
/// to do.
pub(crate) fn apply_senders<S: Store, R: Read>(
    stage: StageId,
    store: &S,
    spill: &mut SpillReader<R>,
    spill_start: BlockNumber,
    progress: BlockNumber,
    stop: &StopSignal,
) -> Result<BlockNumber, StageError> {
    let mut batch = store.batch();
    let mut number = spill_start;
    let mut highest = progress;

    loop {
        stop.check()?;
        let Some(hash) = read_canonical_hash(store, number)? else { break };
        let Some(mut body) = read_body(store, hash, number)? else { break };

        for tx in body.transactions.iter_mut() {
            let sender = spill
                .next()
                .map_err(|source| StageError::Spill { block: number, source })?
                .ok_or(StageError::Spill { block: number, source: SpillError::UnexpectedEof })?;
            if number > progress {
                tx.set_sender(sender);
            }
        }

        if number > progress {
            write_body(&mut batch, hash, number, &body)?;
            highest = number;
            if batch.size() >= batch.ideal_size() {
                stage.save_progress(&mut batch, number)?;
                batch.commit()?;
                info!(
                    target: "sync::stages::sender_recovery",
                    block = number,
                    "Committed recovered senders"
                );
            }
        }

        number += 1;
    }

    if batch.size() > 0 {
        stage.save_progress(&mut batch, highest)?;
        batch.commit()?;
    }
    Ok(highest)
}
