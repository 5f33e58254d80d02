use crate::{
    kv::{Batch, Store, StoreReader, Table},
    StorageError,
};
#[cfg(any(test, feature = "test-utils"))]
use parking_lot::Mutex;
use parking_lot::RwLock;
use std::{collections::BTreeMap, sync::Arc};

/// Default batch size, in bytes, at which callers are asked to commit.
pub const DEFAULT_IDEAL_BATCH_SIZE: usize = 100 * 1024;

/// An in-memory reference store.
///
/// Implements the same transactional interface the stages run against in
/// production. Cloning is cheap and clones observe the same data.
#[derive(Debug, Clone)]
pub struct MemStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    map: RwLock<BTreeMap<(Table, Vec<u8>), Vec<u8>>>,
    ideal_batch_size: usize,
    #[cfg(any(test, feature = "test-utils"))]
    commits_until_failure: Mutex<Option<usize>>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::with_ideal_batch_size(DEFAULT_IDEAL_BATCH_SIZE)
    }
}

impl MemStore {
    /// Create a store asking callers to commit once a batch holds
    /// `ideal_batch_size` bytes.
    pub fn with_ideal_batch_size(ideal_batch_size: usize) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                map: RwLock::new(BTreeMap::new()),
                ideal_batch_size: ideal_batch_size.max(1),
                #[cfg(any(test, feature = "test-utils"))]
                commits_until_failure: Mutex::new(None),
            }),
        }
    }

    /// Number of entries across all tables.
    pub fn entry_count(&self) -> usize {
        self.inner.map.read().len()
    }

    /// Let the next `successes` commits through, then fail the one after.
    ///
    /// The failure consumes the arming; later commits succeed again.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn fail_commit_after(&self, successes: usize) {
        *self.inner.commits_until_failure.lock() = Some(successes);
    }

    fn check_commit_failure(&self) -> Result<(), StorageError> {
        #[cfg(any(test, feature = "test-utils"))]
        {
            let mut armed = self.inner.commits_until_failure.lock();
            if let Some(remaining) = armed.as_mut() {
                if *remaining == 0 {
                    *armed = None;
                    return Err(StorageError::Commit("injected commit failure".to_owned()))
                }
                *remaining -= 1;
            }
        }
        Ok(())
    }
}

impl StoreReader for MemStore {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.inner.map.read().get(&(table, key.to_vec())).cloned())
    }
}

impl Store for MemStore {
    type Batch<'a> = MemBatch<'a>;

    fn batch(&self) -> MemBatch<'_> {
        MemBatch { store: self, writes: BTreeMap::new(), size: 0 }
    }
}

/// Pending mutations on a [`MemStore`].
#[derive(Debug)]
pub struct MemBatch<'a> {
    store: &'a MemStore,
    // `None` marks a pending deletion
    writes: BTreeMap<(Table, Vec<u8>), Option<Vec<u8>>>,
    size: usize,
}

impl StoreReader for MemBatch<'_> {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        if let Some(pending) = self.writes.get(&(table, key.to_vec())) {
            return Ok(pending.clone())
        }
        self.store.get(table, key)
    }
}

impl Batch for MemBatch<'_> {
    fn put(&mut self, table: Table, key: Vec<u8>, value: Vec<u8>) -> Result<(), StorageError> {
        self.size += key.len() + value.len();
        self.writes.insert((table, key), Some(value));
        Ok(())
    }

    fn delete(&mut self, table: Table, key: Vec<u8>) -> Result<(), StorageError> {
        self.size += key.len();
        self.writes.insert((table, key), None);
        Ok(())
    }

    fn size(&self) -> usize {
        self.size
    }

    fn ideal_size(&self) -> usize {
        self.store.inner.ideal_batch_size
    }

    fn commit(&mut self) -> Result<usize, StorageError> {
        self.store.check_commit_failure()?;
        let mut map = self.store.inner.map.write();
        for (key, value) in std::mem::take(&mut self.writes) {
            match value {
                Some(value) => {
                    map.insert(key, value);
                }
                None => {
                    map.remove(&key);
                }
            }
        }
        Ok(std::mem::take(&mut self.size))
    }
}
