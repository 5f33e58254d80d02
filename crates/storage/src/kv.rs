use crate::StorageError;
use chainsync_primitives::{BlockHash, BlockNumber};

/// Storage namespaces used by the sync stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    /// Big-endian block number → canonical block hash.
    CanonicalHashes,
    /// Big-endian block number ‖ block hash → encoded block body.
    Bodies,
    /// Stage name → last block fully processed by that stage.
    SyncProgress,
    /// Stage name → unwind marker for that stage.
    SyncUnwind,
}

/// Read access to a key-value store.
///
/// Batches implement this too: reads through a batch observe its pending
/// mutations.
pub trait StoreReader {
    /// Get the value stored under `key`, if any.
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;
}

/// A transactional key-value store handing out mutation batches.
pub trait Store: StoreReader + Send + Sync {
    /// The batch type mutations are accumulated in.
    type Batch<'a>: Batch
    where
        Self: 'a;

    /// Open a fresh mutation batch on top of the store.
    fn batch(&self) -> Self::Batch<'_>;
}

/// A set of pending mutations, flushed atomically by [`Batch::commit`].
pub trait Batch: StoreReader {
    /// Stage a write.
    fn put(&mut self, table: Table, key: Vec<u8>, value: Vec<u8>) -> Result<(), StorageError>;

    /// Stage a deletion.
    fn delete(&mut self, table: Table, key: Vec<u8>) -> Result<(), StorageError>;

    /// Bytes currently pending in the batch.
    fn size(&self) -> usize;

    /// The batch size at which callers should commit and continue on a
    /// fresh batch.
    fn ideal_size(&self) -> usize;

    /// Flush all pending mutations to the store and reset to a fresh, empty
    /// batch. Returns the number of bytes flushed.
    fn commit(&mut self) -> Result<usize, StorageError>;
}

/// The big-endian key for block-number-keyed tables.
pub fn number_key(number: BlockNumber) -> [u8; 8] {
    number.to_be_bytes()
}

/// The `number ‖ hash` key for the bodies table.
pub fn body_key(number: BlockNumber, hash: BlockHash) -> [u8; 40] {
    let mut key = [0u8; 40];
    key[..8].copy_from_slice(&number.to_be_bytes());
    key[8..].copy_from_slice(hash.as_slice());
    key
}
