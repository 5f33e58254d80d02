//! Commonly used types for the chainsync staged sync pipeline.
//!
//! This crate contains the block and transaction primitives the sync stages
//! operate on, the signer rules used to verify and recover transaction
//! senders, and the secp256k1 recovery contract.
//!
//! ## Feature Flags
//!
//! - `test-utils`: Deterministic generators of signed transactions and block
//!   bodies for use in tests.

#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod block;
mod crypto;
mod signer;
mod transaction;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use block::BlockBody;
pub use crypto::{public_key_to_address, RecoveryContext, SignatureError};
pub use signer::{ChainSpec, Signer};
pub use transaction::{Signature, Transaction, TransactionSigned};

pub use alloy_primitives::{self, keccak256, Address, Bytes, B256, U256};

/// A block number.
pub type BlockNumber = u64;

/// The hash of a block.
pub type BlockHash = B256;

/// The hash of a transaction.
pub type TxHash = B256;

/// An EIP-155 style chain identifier.
pub type ChainId = u64;
