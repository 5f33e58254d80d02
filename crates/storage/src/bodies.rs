use crate::{
    kv::{body_key, number_key, Batch, StoreReader, Table},
    StorageError,
};
use alloy_rlp::{Decodable, Encodable};
use chainsync_primitives::{BlockBody, BlockHash, BlockNumber};

/// Read the canonical hash at the given height.
///
/// `Ok(None)` means the height is past the canonical chain; for the sync
/// stages that is the end-of-range signal, not an error.
pub fn read_canonical_hash<S: StoreReader + ?Sized>(
    store: &S,
    number: BlockNumber,
) -> Result<Option<BlockHash>, StorageError> {
    let Some(raw) = store.get(Table::CanonicalHashes, &number_key(number))? else {
        return Ok(None)
    };
    if raw.len() != BlockHash::len_bytes() {
        return Err(StorageError::Corrupt {
            table: Table::CanonicalHashes,
            reason: format!("hash is {} bytes", raw.len()),
        })
    }
    Ok(Some(BlockHash::from_slice(&raw)))
}

/// Read the body stored for `(number, hash)`, if any.
pub fn read_body<S: StoreReader + ?Sized>(
    store: &S,
    hash: BlockHash,
    number: BlockNumber,
) -> Result<Option<BlockBody>, StorageError> {
    let Some(raw) = store.get(Table::Bodies, &body_key(number, hash))? else { return Ok(None) };
    let body = BlockBody::decode(&mut raw.as_slice())
        .map_err(|err| StorageError::Corrupt { table: Table::Bodies, reason: err.to_string() })?;
    Ok(Some(body))
}

/// Stage a body write under `(number, hash)`.
pub fn write_body<B: Batch + ?Sized>(
    batch: &mut B,
    hash: BlockHash,
    number: BlockNumber,
    body: &BlockBody,
) -> Result<(), StorageError> {
    let mut encoded = Vec::with_capacity(body.length());
    body.encode(&mut encoded);
    batch.put(Table::Bodies, body_key(number, hash).to_vec(), encoded)
}

/// Stage a canonical-hash write for `number`.
pub fn write_canonical_hash<B: Batch + ?Sized>(
    batch: &mut B,
    hash: BlockHash,
    number: BlockNumber,
) -> Result<(), StorageError> {
    batch.put(Table::CanonicalHashes, number_key(number).to_vec(), hash.as_slice().to_vec())
}
