//! Cooperative cancellation for long-running pipelines.
//!
//! A single token is armed by the Ctrl-C handler in `main` and handed down
//! through the manager; external-process call sites and pipeline stage
//! boundaries poll it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;

use crate::errors::Sentinel;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a Ctrl-C handler that trips this token. Call once from main.
    pub fn arm_ctrlc(&self) -> Result<()> {
        let flag = self.flag.clone();
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        })?;
        Ok(())
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Return `Sentinel::Cancelled` if the token has tripped.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Sentinel::Cancelled.into());
        }
        Ok(())
    }
}
