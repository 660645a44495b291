//! Process-wide slot holding the most recent verification result.
//!
//! There is exactly one slot for the whole service. Every caller sees the
//! most recently completed run, which may belong to a different request.

use crate::pipeline::VerificationResult;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Slot {
    result: Option<VerificationResult>,
    updated_at: Option<DateTime<Utc>>,
    runs: u64,
}

/// Single-slot store for the latest [`VerificationResult`].
#[derive(Clone, Default)]
pub struct VerificationStore {
    inner: Arc<RwLock<Slot>>,
}

impl VerificationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the stored result.
    pub fn replace(&self, result: VerificationResult) {
        let mut slot = self.inner.write();
        slot.result = Some(result);
        slot.updated_at = Some(Utc::now());
        slot.runs += 1;
    }

    /// Current result, or `None` if no run has completed yet.
    #[must_use]
    pub fn read(&self) -> Option<VerificationResult> {
        self.inner.read().result.clone()
    }

    /// When the slot was last replaced.
    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().updated_at
    }

    /// Number of results stored since startup.
    #[must_use]
    pub fn runs(&self) -> u64 {
        self.inner.read().runs
    }
}
