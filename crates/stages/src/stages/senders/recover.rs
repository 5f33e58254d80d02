use crate::{error::StageError, signal::StopSignal};
use chainsync_primitives::{
    Address, BlockBody, BlockNumber, ChainId, ChainSpec, RecoveryContext, SignatureError, Signer,
    TxHash,
};
use chainsync_storage::{read_body, read_canonical_hash, StoreReader};
use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

// Recovery throughput stops improving past three workers.
const DEFAULT_WORKERS: usize = 3;

/// The worker count used when none is configured:
/// `min(3, available parallelism)`.
pub(crate) fn default_worker_count() -> usize {
    let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    DEFAULT_WORKERS.min(cores)
}

/// An explicitly owned set of recovery contexts.
///
/// Sized by the orchestrator at stage start; each context is moved into
/// exactly one worker for the run's lifetime and dropped with the run.
#[derive(Debug)]
pub(crate) struct ContextPool {
    contexts: Vec<RecoveryContext>,
}

impl ContextPool {
    pub(crate) fn new(size: usize) -> Self {
        Self { contexts: (0..size.max(1)).map(|_| RecoveryContext::new()).collect() }
    }

    pub(crate) fn len(&self) -> usize {
        self.contexts.len()
    }

    pub(crate) fn into_contexts(self) -> Vec<RecoveryContext> {
        self.contexts
    }
}

/// A unit of recovery work: one block body and the signer bound to its
/// height. Owned by the producer until handed off, consumed exactly once.
#[derive(Debug)]
pub(crate) struct RecoveryJob {
    pub(crate) signer: Signer,
    pub(crate) body: BlockBody,
    pub(crate) number: BlockNumber,
}

/// The outcome of one job: every sender in the block in transaction order,
/// or the error that failed the whole block.
#[derive(Debug)]
pub(crate) struct RecoveryResult {
    pub(crate) number: BlockNumber,
    pub(crate) senders: Result<Vec<Address>, SenderRecoveryError>,
}

/// An error failing a whole block's recovery job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SenderRecoveryError {
    /// A replay-protected transaction committed to a different chain.
    #[error("invalid chain id in transaction {tx}: have {have}, expected {expected}")]
    InvalidChainId {
        /// Hash of the offending transaction.
        tx: TxHash,
        /// The chain id the transaction committed to.
        have: ChainId,
        /// The chain id the signer expected.
        expected: ChainId,
    },
    /// The signature did not yield a sender.
    #[error("could not recover sender for transaction {tx}")]
    Recovery {
        /// Hash of the offending transaction.
        tx: TxHash,
        /// The underlying signature error.
        #[source]
        source: SignatureError,
    },
}

/// Sequentially read bodies in block-number order and emit recovery jobs.
///
/// The first missing canonical hash or body ends the range; that is the
/// normal termination signal, not an error. Returns the first block that was
/// not produced.
pub(crate) fn produce_jobs<S: StoreReader>(
    store: &S,
    spec: &ChainSpec,
    first: BlockNumber,
    jobs: Sender<RecoveryJob>,
    stop: &StopSignal,
) -> Result<BlockNumber, StageError> {
    let mut next = first;
    loop {
        stop.check()?;
        let Some(hash) = read_canonical_hash(store, next)? else { break };
        let Some(body) = read_body(store, hash, next)? else { break };

        let job = RecoveryJob { signer: Signer::new(spec, next), body, number: next };
        if jobs.send(job).is_err() {
            // consumers hung up; the writer carries the cause
            break
        }
        next += 1;
    }
    Ok(next)
}

/// Worker loop: drain jobs through an exclusively owned recovery context.
///
/// Exits when the job queue disconnects or the result side hangs up. A
/// tripped stop signal makes the worker exit without emitting further
/// results.
pub(crate) fn recover_senders(
    ctx: RecoveryContext,
    jobs: Receiver<RecoveryJob>,
    out: Sender<RecoveryResult>,
    stop: StopSignal,
) {
    while let Ok(job) = jobs.recv() {
        if stop.is_stopped() {
            return
        }
        let senders = recover_from(&ctx, &job);
        if out.send(RecoveryResult { number: job.number, senders }).is_err() {
            return
        }
    }
}

/// Recover every sender in the job's body. All-or-nothing: the job yields a
/// complete address list or fails as a whole.
fn recover_from(
    ctx: &RecoveryContext,
    job: &RecoveryJob,
) -> Result<Vec<Address>, SenderRecoveryError> {
    let mut senders = Vec::with_capacity(job.body.tx_count());
    for tx in &job.body.transactions {
        if let Some(chain_id) = tx.transaction.chain_id {
            if chain_id != job.signer.chain_id() {
                return Err(SenderRecoveryError::InvalidChainId {
                    tx: tx.hash(),
                    have: chain_id,
                    expected: job.signer.chain_id(),
                })
            }
        }
        let sender = job
            .signer
            .recover(ctx, tx)
            .map_err(|source| SenderRecoveryError::Recovery { tx: tx.hash(), source })?;
        senders.push(sender);
    }
    Ok(senders)
}
