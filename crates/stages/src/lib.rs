//! Staged sync stages for chainsync.
//!
//! A stage is a segmented part of the syncing process with its own persisted
//! progress cursor and unwind operation. This crate contains the stage
//! execution surface ([`Stage`], [`ExecInput`], [`ExecOutput`]) and the
//! stages themselves, currently [sender recovery](stages::SenderRecoveryStage).
//!
//! Stages run against the storage seam defined in [`chainsync_storage`] and
//! observe a shared [`StopSignal`] at every blocking point, so an embedder
//! can wind a running stage down cooperatively.

#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod error;
mod id;
mod signal;
mod stage;

pub mod spill;
pub mod stages;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::StageError;
pub use id::StageId;
pub use signal::StopSignal;
pub use stage::{ExecInput, ExecOutput, Stage, UnwindInput, UnwindOutput};
