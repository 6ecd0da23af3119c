// src/build/cancel.rs

use tokio_util::sync::CancellationToken;

/// Cancellation token bound to one build generation.
///
/// Cancellation is one-way: once [`cancel`](Self::cancel) has been called
/// the token stays cancelled. The pipeline polls it at fixed checkpoints
/// rather than being preempted.
#[derive(Debug, Clone)]
pub struct GenerationToken {
    generation: u64,
    cancel: CancellationToken,
}

impl GenerationToken {
    /// Creates a fresh, active token for `generation`.
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            cancel: CancellationToken::new(),
        }
    }

    /// Returns generation ID.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns true when cancellation is requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Future resolving when cancellation is requested.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}
