use chainsync_primitives::BlockNumber;
use chainsync_storage::{Batch, StorageError, StoreReader, Table};
use std::fmt::Display;

/// The ID of a stage.
///
/// Each stage ID must be unique. The ID doubles as the key of the stage's
/// entries in the progress ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StageId(pub &'static str);

impl Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StageId {
    /// Get the last committed progress of this stage.
    pub fn get_progress<S: StoreReader + ?Sized>(
        &self,
        store: &S,
    ) -> Result<Option<BlockNumber>, StorageError> {
        store
            .get(Table::SyncProgress, self.0.as_bytes())?
            .map(|raw| decode_number(Table::SyncProgress, raw))
            .transpose()
    }

    /// Save the progress of this stage.
    pub fn save_progress<B: Batch + ?Sized>(
        &self,
        batch: &mut B,
        block: BlockNumber,
    ) -> Result<(), StorageError> {
        batch.put(Table::SyncProgress, self.0.as_bytes().to_vec(), block.to_be_bytes().to_vec())
    }

    /// Get the unwind marker of this stage.
    pub fn get_unwind<S: StoreReader + ?Sized>(
        &self,
        store: &S,
    ) -> Result<Option<BlockNumber>, StorageError> {
        store
            .get(Table::SyncUnwind, self.0.as_bytes())?
            .map(|raw| decode_number(Table::SyncUnwind, raw))
            .transpose()
    }

    /// Save the unwind marker of this stage.
    pub fn save_unwind<B: Batch + ?Sized>(
        &self,
        batch: &mut B,
        block: BlockNumber,
    ) -> Result<(), StorageError> {
        batch.put(Table::SyncUnwind, self.0.as_bytes().to_vec(), block.to_be_bytes().to_vec())
    }
}

fn decode_number(table: Table, raw: Vec<u8>) -> Result<BlockNumber, StorageError> {
    let bytes: [u8; 8] = raw
        .as_slice()
        .try_into()
        .map_err(|_| StorageError::Corrupt { table, reason: format!("{} byte block number", raw.len()) })?;
    Ok(BlockNumber::from_be_bytes(bytes))
}
