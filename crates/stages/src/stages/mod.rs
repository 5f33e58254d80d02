//! The stages of the sync pipeline.

/// The sender recovery stage.
pub mod senders;

pub use senders::{SenderRecoveryError, SenderRecoveryStage};

use crate::id::StageId;

/// The [`StageId`] of the sender recovery stage.
pub const SENDER_RECOVERY: StageId = StageId("SenderRecovery");
