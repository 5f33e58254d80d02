//! Shared helpers for stage tests.

use crate::{ExecInput, ExecOutput, Stage, StageError, UnwindInput, UnwindOutput};
use chainsync_primitives::{
    test_utils::{random_body, random_hash},
    Address, BlockHash, BlockNumber, ChainSpec,
};
use chainsync_storage::{read_body, write_body, write_canonical_hash, Batch, MemStore, Store};
use rand::rngs::StdRng;
use std::{ops::RangeInclusive, path::PathBuf};
use tokio::sync::oneshot;

/// The chain stage tests run against.
pub(crate) const TEST_CHAIN: ChainSpec = ChainSpec { chain_id: 1337, replay_protection_block: 0 };

/// A seeded block and the senders recovery is expected to find in it.
pub(crate) struct SeededBlock {
    pub(crate) number: BlockNumber,
    pub(crate) hash: BlockHash,
    pub(crate) senders: Vec<Address>,
}

/// An in-memory store plus a temp dir for spill files.
pub(crate) struct TestStageDb {
    pub(crate) store: MemStore,
    dir: tempfile::TempDir,
}

impl TestStageDb {
    pub(crate) fn new() -> Self {
        Self { store: MemStore::default(), dir: tempfile::tempdir().expect("tempdir") }
    }

    pub(crate) fn with_ideal_batch_size(bytes: usize) -> Self {
        Self {
            store: MemStore::with_ideal_batch_size(bytes),
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub(crate) fn spill_path(&self) -> PathBuf {
        self.dir.path().join("senders.spill")
    }

    /// Seed canonical hashes and bodies for `range`, giving the block at
    /// each height `tx_count(number)` signed transactions.
    pub(crate) fn seed_blocks(
        &self,
        rng: &mut StdRng,
        range: RangeInclusive<BlockNumber>,
        mut tx_count: impl FnMut(BlockNumber) -> usize,
    ) -> Vec<SeededBlock> {
        let mut batch = self.store.batch();
        let mut seeded = Vec::new();
        for number in range {
            let hash = random_hash(rng);
            let (body, senders) = random_body(rng, &TEST_CHAIN, number, tx_count(number));
            write_canonical_hash(&mut batch, hash, number).expect("seed hash");
            write_body(&mut batch, hash, number, &body).expect("seed body");
            seeded.push(SeededBlock { number, hash, senders });
        }
        batch.commit().expect("seed commit");
        seeded
    }

    /// Assert every given block's stored body carries exactly the expected
    /// senders, in transaction order.
    pub(crate) fn assert_senders_recovered(&self, seeded: &[SeededBlock]) {
        for block in seeded {
            let body = read_body(&self.store, block.hash, block.number)
                .expect("read body")
                .expect("body exists");
            assert_eq!(body.tx_count(), block.senders.len(), "block {}", block.number);
            for (tx, expected) in body.transactions.iter().zip(&block.senders) {
                assert_eq!(tx.sender, Some(*expected), "block {}", block.number);
            }
        }
    }

    /// Assert none of the given blocks' stored bodies has a sender attached.
    pub(crate) fn assert_no_senders(&self, seeded: &[SeededBlock]) {
        for block in seeded {
            let body = read_body(&self.store, block.hash, block.number)
                .expect("read body")
                .expect("body exists");
            assert!(
                body.transactions.iter().all(|tx| tx.sender.is_none()),
                "block {} has senders",
                block.number
            );
        }
    }
}

/// A generic test runner for stages.
pub(crate) trait StageTestRunner {
    type S: Stage<MemStore> + 'static;

    /// Return a reference to the database.
    fn db(&self) -> &TestStageDb;

    /// Return an instance of a Stage.
    fn stage(&self) -> Self::S;

    /// Run [Stage::execute] and return a receiver for the result.
    fn execute(&self, input: ExecInput) -> oneshot::Receiver<Result<ExecOutput, StageError>> {
        let (tx, rx) = oneshot::channel();
        let (store, mut stage) = (self.db().store.clone(), self.stage());
        tokio::spawn(async move {
            let result = stage.execute(&store, input).await;
            tx.send(result).expect("failed to send message");
        });
        rx
    }

    /// Run [Stage::unwind] and return a receiver for the result.
    fn unwind(&self, input: UnwindInput) -> oneshot::Receiver<Result<UnwindOutput, StageError>> {
        let (tx, rx) = oneshot::channel();
        let (store, mut stage) = (self.db().store.clone(), self.stage());
        tokio::spawn(async move {
            let result = stage.unwind(&store, input).await;
            tx.send(result).expect("failed to send result");
        });
        rx
    }
}
