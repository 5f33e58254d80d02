use crate::{Address, BlockNumber, ChainId, RecoveryContext, SignatureError, TransactionSigned};

/// Chain parameters the per-block signer rules derive from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainSpec {
    /// The chain id replay-protected transactions must commit to.
    pub chain_id: ChainId,
    /// First block at which replay protection is active.
    pub replay_protection_block: BlockNumber,
}

impl ChainSpec {
    /// A spec with replay protection active from genesis.
    pub const fn new(chain_id: ChainId) -> Self {
        Self { chain_id, replay_protection_block: 0 }
    }

    /// Make the signer for the given block number.
    pub const fn signer(&self, number: BlockNumber) -> Signer {
        Signer {
            chain_id: self.chain_id,
            replay_protected: number >= self.replay_protection_block,
        }
    }
}

/// Signature rules bound to a specific block number.
///
/// Whether signatures are expected to be replay protected can change with
/// the block height, so every recovery job carries the signer for its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signer {
    chain_id: ChainId,
    replay_protected: bool,
}

impl Signer {
    /// Make a signer for the block at `number`.
    pub const fn new(spec: &ChainSpec, number: BlockNumber) -> Self {
        spec.signer(number)
    }

    /// The chain id this signer verifies against.
    pub const fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Whether transactions signed at this height are replay protected.
    pub const fn replay_protected(&self) -> bool {
        self.replay_protected
    }

    /// Recover the sender of `tx` through the given recovery context.
    pub fn recover(
        &self,
        ctx: &RecoveryContext,
        tx: &TransactionSigned,
    ) -> Result<Address, SignatureError> {
        let hash = tx.transaction.signature_hash();
        ctx.recover_signer(&tx.signature.to_compact(), &hash)
    }
}
