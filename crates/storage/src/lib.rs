//! Storage collaborator interfaces for the chainsync staged sync pipeline.
//!
//! The sync stages run against a transactional key-value store. This crate
//! defines the seam: the [`Store`] and [`Batch`] traits, the [`Table`]
//! namespaces and their key layouts, read/write helpers for block bodies and
//! canonical hashes, and an in-memory reference store used by tests and
//! embedders.
//!
//! ## Feature Flags
//!
//! - `test-utils`: Commit-failure injection on [`MemStore`] for crash-resume
//!   testing.

#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod bodies;
mod error;
mod kv;
mod mem;

pub use bodies::{read_body, read_canonical_hash, write_body, write_canonical_hash};
pub use error::StorageError;
pub use kv::{body_key, number_key, Batch, Store, StoreReader, Table};
pub use mem::{MemBatch, MemStore, DEFAULT_IDEAL_BATCH_SIZE};
