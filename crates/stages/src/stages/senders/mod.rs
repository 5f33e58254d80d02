//! The sender recovery stage.

mod apply;
mod recover;
mod reorder;

pub use recover::SenderRecoveryError;

use crate::{
    error::StageError,
    id::StageId,
    signal::StopSignal,
    spill::{SpillReader, SpillWriter},
    stage::{ExecInput, ExecOutput, Stage, UnwindInput, UnwindOutput},
    stages::SENDER_RECOVERY,
};
use apply::apply_senders;
use chainsync_primitives::{BlockNumber, ChainSpec};
use chainsync_storage::{Batch, Store};
use crossbeam_channel::{bounded, Receiver};
use recover::{default_worker_count, produce_jobs, recover_senders, ContextPool, RecoveryResult};
use reorder::ReorderBuffer;
use std::{
    fs::File,
    io::Write,
    path::PathBuf,
    thread,
};
use tracing::info;

/// The default minimum run of consecutive blocks released to the spill file
/// at once.
pub const DEFAULT_WINDOW: usize = 1000;

/// Default number of addresses the spill accumulator holds before a write.
const DEFAULT_SPILL_BUFFER: usize = 8192;

/// The sender recovery stage recovers the sender address of every
/// transaction in a range of block bodies and writes the enriched bodies
/// back to storage.
///
/// The stage runs in two phases. The first walks bodies in block-number
/// order, recovers senders on a fixed pool of workers and spills them to
/// disk in strictly ascending `(block, transaction index)` order. The second
/// re-derives the same body sequence, pulls one address per transaction from
/// the spill file and commits the mutated bodies in checkpointed batches.
///
/// Splitting the phases decouples recovery throughput (parallel, bursty)
/// from commit throughput (sequential, I/O bound): a crash between the spill
/// and a commit is recovered by re-running the apply phase from the last
/// committed checkpoint, re-reading the spill file from its start.
#[derive(Debug, Clone)]
pub struct SenderRecoveryStage {
    /// Chain parameters used to derive the per-block signer rules.
    pub chain_spec: ChainSpec,
    /// Where the spill file lives.
    ///
    /// The path doubles as the resumption token for a
    /// [`resume_only`](Self::resume_only) re-run.
    pub spill_path: PathBuf,
    /// Skip the recovery phase and apply an existing spill file.
    pub resume_only: bool,
    /// The first block covered by the existing spill file in
    /// [`resume_only`](Self::resume_only) mode.
    ///
    /// Defaults to the progress cursor + 1, which is only correct while no
    /// part of the spilled range has been applied yet.
    pub spill_start: Option<BlockNumber>,
    /// Minimum run of consecutive blocks released to the spill file at once.
    pub window: usize,
    /// Number of recovery workers; each exclusively owns one crypto context.
    pub max_workers: usize,
    /// Capacity of the job queue feeding the workers.
    pub job_queue: usize,
    /// Capacity of the result queue feeding the spill writer.
    pub result_queue: usize,
    /// Addresses held by the spill accumulator and read window.
    pub spill_buffer: usize,
    /// Cooperative cancellation signal, shared with the embedder.
    pub stop: StopSignal,
}

impl SenderRecoveryStage {
    /// Create a stage with default sizing.
    pub fn new(chain_spec: ChainSpec, spill_path: impl Into<PathBuf>) -> Self {
        Self {
            chain_spec,
            spill_path: spill_path.into(),
            resume_only: false,
            spill_start: None,
            window: DEFAULT_WINDOW,
            max_workers: default_worker_count(),
            job_queue: 2 * DEFAULT_WINDOW,
            result_queue: DEFAULT_WINDOW,
            spill_buffer: DEFAULT_SPILL_BUFFER,
            stop: StopSignal::new(),
        }
    }

    fn run<S: Store>(&self, store: &S, input: ExecInput) -> Result<ExecOutput, StageError> {
        self.stop.check()?;
        let progress = match input.stage_progress {
            Some(block) => block,
            None => SENDER_RECOVERY.get_progress(store)?.unwrap_or_default(),
        };

        let spill_start = if self.resume_only {
            self.spill_start.unwrap_or(progress + 1)
        } else {
            progress + 1
        };

        if !self.resume_only {
            self.spill_phase(store, spill_start)?;
        }

        let file = File::open(&self.spill_path)
            .map_err(|source| StageError::Spill { block: spill_start, source: source.into() })?;
        let mut spill = SpillReader::new(file, self.spill_buffer);
        let stage_progress =
            apply_senders(SENDER_RECOVERY, store, &mut spill, spill_start, progress, &self.stop)?;

        info!(target: "sync::stages::sender_recovery", stage_progress, "Stage finished");
        Ok(ExecOutput { stage_progress, done: true })
    }

    /// First pass: produce jobs, recover senders in parallel and spill the
    /// reordered addresses to disk. Returns the last block spilled.
    fn spill_phase<S: Store>(
        &self,
        store: &S,
        first: BlockNumber,
    ) -> Result<BlockNumber, StageError> {
        let file = File::create(&self.spill_path)
            .map_err(|source| StageError::Spill { block: first, source: source.into() })?;
        let mut writer = SpillWriter::new(file, self.spill_buffer);

        let pool = ContextPool::new(self.max_workers);
        let workers = pool.len();
        let (job_tx, job_rx) = bounded(self.job_queue.max(1));
        let (result_tx, result_rx) = bounded(self.result_queue.max(1));

        info!(
            target: "sync::stages::sender_recovery",
            workers,
            first,
            "Spawning recovery workers"
        );

        let (written, produced) = thread::scope(|scope| {
            let spec = &self.chain_spec;
            let stop = &self.stop;
            let producer = scope.spawn(move || produce_jobs(store, spec, first, job_tx, stop));
            for ctx in pool.into_contexts() {
                let jobs = job_rx.clone();
                let results = result_tx.clone();
                let stop = self.stop.clone();
                scope.spawn(move || recover_senders(ctx, jobs, results, stop));
            }
            // the workers hold the only remaining handles: once the producer
            // is done and the workers drained, the result stream closes
            drop(job_rx);
            drop(result_tx);

            let written = self.write_spill(result_rx, &mut writer, first, workers);
            let produced = producer.join().unwrap_or(Err(StageError::ChannelClosed));
            (written, produced)
        });

        let last = written?;
        produced?;
        Ok(last)
    }

    /// Reorder incoming results and append them to the spill file in
    /// strictly ascending order. Returns the last block spilled.
    fn write_spill<W: Write>(
        &self,
        results: Receiver<RecoveryResult>,
        writer: &mut SpillWriter<W>,
        first: BlockNumber,
        workers: usize,
    ) -> Result<BlockNumber, StageError> {
        // out-of-orderness is bounded by what can be in flight at once
        let capacity = self.window + self.job_queue + self.result_queue + workers;
        let mut buffer = ReorderBuffer::new(first, self.window, capacity);
        let mut spilled = 0u64;

        for result in results.iter() {
            self.stop.check()?;
            let number = result.number;
            let senders = result
                .senders
                .map_err(|source| StageError::SenderRecovery { block: number, source })?;
            buffer
                .insert(number, senders)
                .map_err(|overflow| StageError::Fatal(Box::new(overflow)))?;

            while let Some(run) = buffer.take_ready() {
                for (block, senders) in run {
                    for sender in senders {
                        writer
                            .push(sender)
                            .map_err(|source| StageError::Spill { block, source })?;
                        spilled += 1;
                    }
                }
            }

            if number % 10_000 == 0 {
                info!(
                    target: "sync::stages::sender_recovery",
                    block = number,
                    buffered = buffer.len(),
                    written = writer.bytes_written(),
                    "Spilled recovered senders"
                );
            }
        }
        self.stop.check()?;

        // the producer and workers are gone; what is left is the final,
        // possibly partial window
        for (block, senders) in buffer.drain_tail() {
            for sender in senders {
                writer.push(sender).map_err(|source| StageError::Spill { block, source })?;
                spilled += 1;
            }
        }
        let last = buffer.next_expected().saturating_sub(1);
        writer.flush().map_err(|source| StageError::Spill { block: last, source })?;

        info!(
            target: "sync::stages::sender_recovery",
            last,
            addresses = spilled,
            "Spill phase finished"
        );
        Ok(last)
    }
}

#[async_trait::async_trait]
impl<S: Store + Clone + 'static> Stage<S> for SenderRecoveryStage {
    /// Return the id of the stage.
    fn id(&self) -> StageId {
        SENDER_RECOVERY
    }

    /// Execute the stage: spill recovered senders to disk, then apply them
    /// to the stored bodies in checkpointed batches.
    async fn execute(&mut self, store: &S, input: ExecInput) -> Result<ExecOutput, StageError> {
        let stage = self.clone();
        let store = store.clone();
        tokio::task::spawn_blocking(move || stage.run(&store, input))
            .await
            .map_err(|err| StageError::Fatal(Box::new(err)))?
    }

    /// Unwind the stage.
    ///
    /// Unwinding at or past the current progress is a no-op that re-asserts
    /// the reset marker; otherwise the cursor moves down to the target. The
    /// re-derivation of downstream state is the storage layer's rollback
    /// business, not this stage's.
    async fn unwind(&mut self, store: &S, input: UnwindInput) -> Result<UnwindOutput, StageError> {
        let progress = SENDER_RECOVERY.get_progress(store)?.unwrap_or_default();
        let mut batch = store.batch();
        SENDER_RECOVERY.save_unwind(&mut batch, 0)?;

        if input.unwind_to >= progress {
            batch.commit()?;
            return Ok(UnwindOutput { stage_progress: progress })
        }

        SENDER_RECOVERY.save_progress(&mut batch, input.unwind_to)?;
        batch.commit()?;
        info!(
            target: "sync::stages::sender_recovery",
            to = input.unwind_to,
            "Unwound sender recovery"
        );
        Ok(UnwindOutput { stage_progress: input.unwind_to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{SeededBlock, StageTestRunner, TestStageDb, TEST_CHAIN};
    use assert_matches::assert_matches;
    use chainsync_primitives::{test_utils::random_signed_tx, BlockBody};
    use chainsync_storage::{write_body, StorageError};
    use rand::{rngs::StdRng, SeedableRng};

    struct SenderRecoveryTestRunner {
        db: TestStageDb,
        window: usize,
        resume_only: bool,
        spill_start: Option<BlockNumber>,
        stop: StopSignal,
    }

    impl Default for SenderRecoveryTestRunner {
        fn default() -> Self {
            Self {
                db: TestStageDb::new(),
                // small window so short test ranges span several of them
                window: 8,
                resume_only: false,
                spill_start: None,
                stop: StopSignal::new(),
            }
        }
    }

    impl StageTestRunner for SenderRecoveryTestRunner {
        type S = SenderRecoveryStage;

        fn db(&self) -> &TestStageDb {
            &self.db
        }

        fn stage(&self) -> SenderRecoveryStage {
            let mut stage = SenderRecoveryStage::new(TEST_CHAIN, self.db.spill_path());
            stage.window = self.window;
            stage.resume_only = self.resume_only;
            stage.spill_start = self.spill_start;
            stage.stop = self.stop.clone();
            stage
        }
    }

    impl SenderRecoveryTestRunner {
        fn seed(&self, seed: u64, range: std::ops::RangeInclusive<BlockNumber>) -> Vec<SeededBlock> {
            let mut rng = StdRng::seed_from_u64(seed);
            self.db.seed_blocks(&mut rng, range, |number| (number % 4) as usize)
        }
    }

    #[tokio::test]
    async fn execute_recovers_all_senders() {
        let runner = SenderRecoveryTestRunner::default();
        let seeded = runner.seed(1, 1..=64);

        let result = runner.execute(ExecInput::default()).await.unwrap();
        assert_matches!(
            result,
            Ok(ExecOutput { stage_progress: 64, done: true })
        );

        runner.db.assert_senders_recovered(&seeded);
        assert_eq!(SENDER_RECOVERY.get_progress(&runner.db.store).unwrap(), Some(64));
    }

    /// Execute a block range with a single transaction
    #[tokio::test]
    async fn execute_single_transaction() {
        let (stage_progress, previous_stage) = (100, 120);
        let runner = SenderRecoveryTestRunner::default();

        // Insert blocks with a single transaction at block `stage_progress + 10`
        let mut rng = StdRng::seed_from_u64(2);
        let seeded = runner.db.seed_blocks(&mut rng, stage_progress + 1..=previous_stage, |number| {
            (number == stage_progress + 10) as usize
        });

        let input = ExecInput { stage_progress: Some(stage_progress) };
        let result = runner.execute(input).await.unwrap();
        assert_matches!(
            result,
            Ok(ExecOutput { stage_progress, done: true }) if stage_progress == previous_stage
        );
        runner.db.assert_senders_recovered(&seeded);
    }

    #[tokio::test]
    async fn execute_with_no_bodies_is_done() {
        let runner = SenderRecoveryTestRunner::default();
        let result = runner.execute(ExecInput { stage_progress: Some(5) }).await.unwrap();
        assert_matches!(result, Ok(ExecOutput { stage_progress: 5, done: true }));
    }

    #[tokio::test]
    async fn chain_id_mismatch_fails_the_block() {
        let runner = SenderRecoveryTestRunner::default();
        let seeded = runner.seed(3, 1..=20);

        // replace block 7's body with one committing to a foreign chain
        let mut rng = StdRng::seed_from_u64(33);
        let (foreign, _) = random_signed_tx(&mut rng, Some(TEST_CHAIN.chain_id + 1));
        let bad_body = BlockBody { transactions: vec![foreign] };
        let mut batch = runner.db.store.batch();
        write_body(&mut batch, seeded[6].hash, 7, &bad_body).unwrap();
        batch.commit().unwrap();

        let result = runner.execute(ExecInput::default()).await.unwrap();
        assert_matches!(
            result,
            Err(StageError::SenderRecovery {
                block: 7,
                source: SenderRecoveryError::InvalidChainId { .. }
            })
        );

        // the whole run is rejected: no senders written, cursor untouched
        runner.db.assert_no_senders(&seeded[..6]);
        runner.db.assert_no_senders(&seeded[7..]);
        assert_eq!(SENDER_RECOVERY.get_progress(&runner.db.store).unwrap(), None);
    }

    #[tokio::test]
    async fn execute_twice_is_idempotent() {
        let runner = SenderRecoveryTestRunner::default();
        let seeded = runner.seed(4, 1..=30);

        let result = runner.execute(ExecInput::default()).await.unwrap();
        assert_matches!(result, Ok(ExecOutput { stage_progress: 30, done: true }));

        // the second run finds no new bodies and moves nothing backwards
        let result = runner.execute(ExecInput::default()).await.unwrap();
        assert_matches!(result, Ok(ExecOutput { stage_progress: 30, done: true }));
        runner.db.assert_senders_recovered(&seeded);
        assert_eq!(SENDER_RECOVERY.get_progress(&runner.db.store).unwrap(), Some(30));
    }

    #[tokio::test]
    async fn resume_only_completes_after_commit_failure() {
        // a tiny ideal batch size forces a commit every few blocks
        let mut runner = SenderRecoveryTestRunner::default();
        runner.db = TestStageDb::with_ideal_batch_size(2048);
        let seeded = runner.seed(5, 1..=60);

        // let two checkpoints through, then fail the third commit
        runner.db.store.fail_commit_after(2);
        let result = runner.execute(ExecInput::default()).await.unwrap();
        assert_matches!(
            result,
            Err(StageError::Database(StorageError::Commit(_)))
        );

        let checkpoint = SENDER_RECOVERY
            .get_progress(&runner.db.store)
            .unwrap()
            .expect("two checkpoints were committed");
        assert!(checkpoint > 0 && checkpoint < 60);

        // the spill phase finished before the crash: re-run the apply pass
        // only, against the same spill file, from the last checkpoint
        runner.resume_only = true;
        runner.spill_start = Some(1);
        let result = runner.execute(ExecInput::default()).await.unwrap();
        assert_matches!(result, Ok(ExecOutput { stage_progress: 60, done: true }));

        runner.db.assert_senders_recovered(&seeded);
        assert_eq!(SENDER_RECOVERY.get_progress(&runner.db.store).unwrap(), Some(60));
    }

    #[tokio::test]
    async fn tripped_stop_signal_cancels_execution() {
        let runner = SenderRecoveryTestRunner::default();
        runner.seed(6, 1..=10);
        runner.stop.stop();

        let result = runner.execute(ExecInput::default()).await.unwrap();
        assert_matches!(result, Err(StageError::Canceled));
        assert_eq!(SENDER_RECOVERY.get_progress(&runner.db.store).unwrap(), None);
    }

    #[tokio::test]
    async fn unwind_at_or_past_progress_is_a_noop() {
        let runner = SenderRecoveryTestRunner::default();
        let mut batch = runner.db.store.batch();
        SENDER_RECOVERY.save_progress(&mut batch, 100).unwrap();
        batch.commit().unwrap();

        let result = runner.unwind(UnwindInput { unwind_to: 150 }).await.unwrap();
        assert_matches!(result, Ok(UnwindOutput { stage_progress: 100 }));

        // the cursor is untouched, the reset marker re-asserted
        assert_eq!(SENDER_RECOVERY.get_progress(&runner.db.store).unwrap(), Some(100));
        assert_eq!(SENDER_RECOVERY.get_unwind(&runner.db.store).unwrap(), Some(0));
    }

    #[tokio::test]
    async fn unwind_below_progress_moves_the_cursor() {
        let runner = SenderRecoveryTestRunner::default();
        let mut batch = runner.db.store.batch();
        SENDER_RECOVERY.save_progress(&mut batch, 100).unwrap();
        batch.commit().unwrap();

        let result = runner.unwind(UnwindInput { unwind_to: 40 }).await.unwrap();
        assert_matches!(result, Ok(UnwindOutput { stage_progress: 40 }));
        assert_eq!(SENDER_RECOVERY.get_progress(&runner.db.store).unwrap(), Some(40));
        assert_eq!(SENDER_RECOVERY.get_unwind(&runner.db.store).unwrap(), Some(0));
    }
}
