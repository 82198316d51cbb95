//! Attempt ownership.
//!
//! Every checkout takes a fresh epoch. Work started for an attempt carries
//! the epoch it was started under and may only apply its result while that
//! epoch is still current.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared epoch counter.
#[derive(Debug, Clone, Default)]
pub struct Epochs {
    current: Arc<AtomicU64>,
}

impl Epochs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new epoch, invalidating every earlier one.
    pub fn advance(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The epoch results are currently applied for.
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.current() == epoch
    }
}
