use crate::TransactionSigned;
use alloy_rlp::{RlpDecodable, RlpEncodable};

/// The body of a block: the transactions carried in it.
///
/// Bodies are stored and fetched by `(block number, block hash)`; the header
/// is owned by an earlier stage and not duplicated here.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct BlockBody {
    /// The transactions in the block, in execution order.
    pub transactions: Vec<TransactionSigned>,
}

impl BlockBody {
    /// Number of transactions in the body.
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }
}
