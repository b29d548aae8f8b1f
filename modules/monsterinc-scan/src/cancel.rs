use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;

use monsterinc_common::MonsterIncError;

/// Cloneable cancellation handle shared by every stage of a scan run.
/// Stages check it at entry, before external calls, and after external calls;
/// nothing ever blocks on it.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Fail with the typed cancellation error if the run was cancelled.
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(MonsterIncError::Cancelled.into());
        }
        Ok(())
    }
}
