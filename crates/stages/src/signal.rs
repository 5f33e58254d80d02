use crate::error::StageError;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A shared, externally ownable stop signal.
///
/// Every long-running stage loop checks the signal cooperatively at its
/// blocking points. Once tripped, producers stop emitting work, workers
/// drain and exit without emitting further results, and the writers surface
/// [`StageError::Canceled`] instead of silently truncating output.
///
/// There is no timeout: cancellation is explicit only.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    /// A fresh, untripped signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the signal. Every loop observing it winds down promptly.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Whether the signal has been tripped.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Error out if the signal has been tripped.
    pub fn check(&self) -> Result<(), StageError> {
        if self.is_stopped() {
            Err(StageError::Canceled)
        } else {
            Ok(())
        }
    }
}
