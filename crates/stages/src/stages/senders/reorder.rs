use chainsync_primitives::{Address, BlockNumber};
use std::collections::BTreeMap;

/// Buffers out-of-order recovery results and releases them as gap-free,
/// strictly ascending runs.
///
/// A run is released only when every block in `[next, next + window)` is
/// buffered, so the spill file never contains gaps or out-of-order entries.
/// The final tail may be shorter than a window; it is drained separately
/// once the input is known to be complete.
#[derive(Debug)]
pub(crate) struct ReorderBuffer {
    // ordered by block number; the ordering key is globally unique
    pending: BTreeMap<BlockNumber, Vec<Address>>,
    next: BlockNumber,
    window: usize,
    capacity: usize,
}

/// The buffer exceeded its structural capacity bound.
///
/// Out-of-orderness is limited by what can be in flight in the queues at
/// once; more buffered results than that means a producer emitted outside
/// the agreed range.
#[derive(Debug, thiserror::Error)]
#[error("reorder buffer overflow: {buffered} buffered results, capacity {capacity}")]
pub(crate) struct ReorderOverflow {
    buffered: usize,
    capacity: usize,
}

impl ReorderBuffer {
    /// A buffer expecting `next` as the first block, releasing runs of
    /// `window` blocks, holding at most `capacity` pending results.
    pub(crate) fn new(next: BlockNumber, window: usize, capacity: usize) -> Self {
        let window = window.max(1);
        Self { pending: BTreeMap::new(), next, window, capacity: capacity.max(window) }
    }

    /// Number of buffered, not yet released results.
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    /// The lowest block number not yet released.
    pub(crate) fn next_expected(&self) -> BlockNumber {
        self.next
    }

    /// Buffer one result.
    pub(crate) fn insert(
        &mut self,
        number: BlockNumber,
        senders: Vec<Address>,
    ) -> Result<(), ReorderOverflow> {
        if self.pending.len() >= self.capacity {
            return Err(ReorderOverflow { buffered: self.pending.len(), capacity: self.capacity })
        }
        self.pending.insert(number, senders);
        Ok(())
    }

    /// Release the next window if every block in it is buffered.
    pub(crate) fn take_ready(&mut self) -> Option<Vec<(BlockNumber, Vec<Address>)>> {
        let end = self.next + self.window as u64;
        if (self.next..end).any(|number| !self.pending.contains_key(&number)) {
            return None
        }
        let run = (self.next..end)
            .filter_map(|number| self.pending.remove(&number).map(|senders| (number, senders)))
            .collect();
        self.next = end;
        Some(run)
    }

    /// Drain everything left in ascending order.
    ///
    /// Accepts a final partial window; only valid once no more results will
    /// arrive.
    pub(crate) fn drain_tail(&mut self) -> Vec<(BlockNumber, Vec<Address>)> {
        let drained: Vec<_> = std::mem::take(&mut self.pending).into_iter().collect();
        if let Some((last, _)) = drained.last() {
            self.next = last + 1;
        }
        drained
    }
}
