//! Fixed-width spill buffer for recovered addresses.
//!
//! The spill file decouples the bursty, parallel recovery phase from the
//! sequential apply phase: addresses are appended in strictly ascending
//! `(block, transaction index)` order and read back the same way. The format
//! is the raw concatenation of 20-byte records; there is no header, length
//! prefix, or checksum. Position alone encodes ordering, so a well-formed
//! stream is always a whole multiple of the record size.

use chainsync_primitives::Address;
use std::io::{self, Read, Write};

/// Width of one spill record: a raw address, no padding, no delimiter.
pub const RECORD_SIZE: usize = 20;

/// An error in the spill buffer.
#[derive(Debug, thiserror::Error)]
pub enum SpillError {
    /// The backing stream failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The stream ended inside a record.
    #[error("spill stream ends inside a record ({len} trailing bytes)")]
    TruncatedRecord {
        /// Bytes of the partial record.
        len: usize,
    },
    /// The stream ended although more records were expected.
    #[error("spill stream exhausted before all addresses were read")]
    UnexpectedEof,
}

/// The write half of the spill buffer.
///
/// Records accumulate in memory and are flushed to the backing stream once
/// the accumulator fills up. The accumulator only ever holds whole records,
/// so no flush can tear one.
#[derive(Debug)]
pub struct SpillWriter<W: Write> {
    out: W,
    buf: Vec<u8>,
    capacity: usize,
    written: u64,
}

impl<W: Write> SpillWriter<W> {
    /// Create a writer holding up to `records` addresses before flushing.
    pub fn new(out: W, records: usize) -> Self {
        let capacity = records.max(1) * RECORD_SIZE;
        Self { out, buf: Vec::with_capacity(capacity), capacity, written: 0 }
    }

    /// Append one address, flushing the accumulator once it is full.
    pub fn push(&mut self, address: Address) -> Result<(), SpillError> {
        self.buf.extend_from_slice(address.as_slice());
        if self.buf.len() >= self.capacity {
            self.flush()?;
        }
        Ok(())
    }

    /// Flush the accumulator to the backing stream and reset it.
    ///
    /// Returns the number of bytes written.
    pub fn flush(&mut self) -> Result<usize, SpillError> {
        if self.buf.is_empty() {
            return Ok(0)
        }
        self.out.write_all(&self.buf)?;
        self.out.flush()?;
        let written = self.buf.len();
        self.written += written as u64;
        self.buf.clear();
        Ok(written)
    }

    /// Total bytes flushed to the backing stream so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Flush and hand back the backing stream.
    pub fn into_inner(mut self) -> Result<W, SpillError> {
        self.flush()?;
        Ok(self.out)
    }
}

/// The read half of the spill buffer.
///
/// Refills a fixed-size window from the backing stream and yields one record
/// at a time until the stream is exhausted.
#[derive(Debug)]
pub struct SpillReader<R: Read> {
    input: R,
    window: Vec<u8>,
    filled: usize,
    pos: usize,
}

impl<R: Read> SpillReader<R> {
    /// Create a reader with a window of `records` addresses.
    pub fn new(input: R, records: usize) -> Self {
        Self { input, window: vec![0; records.max(1) * RECORD_SIZE], filled: 0, pos: 0 }
    }

    /// The next record, or `Ok(None)` once the stream is cleanly exhausted.
    ///
    /// A stream that ends inside a record fails with
    /// [`SpillError::TruncatedRecord`].
    pub fn next(&mut self) -> Result<Option<Address>, SpillError> {
        if self.pos == self.filled {
            self.refill()?;
            if self.filled == 0 {
                return Ok(None)
            }
        }
        let record = &self.window[self.pos..self.pos + RECORD_SIZE];
        self.pos += RECORD_SIZE;
        Ok(Some(Address::from_slice(record)))
    }

    fn refill(&mut self) -> Result<(), SpillError> {
        self.pos = 0;
        self.filled = 0;
        while self.filled < self.window.len() {
            match self.input.read(&mut self.window[self.filled..]) {
                Ok(0) => break,
                Ok(n) => self.filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        if self.filled % RECORD_SIZE != 0 {
            return Err(SpillError::TruncatedRecord { len: self.filled % RECORD_SIZE })
        }
        Ok(())
    }
}
