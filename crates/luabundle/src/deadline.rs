//! Cooperative deadline shared by one bundle or validate operation

use std::time::{Duration, Instant};

use crate::error::{BundleError, Result};

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    operation: &'static str,
    started: Instant,
    limit: Duration,
}

impl Deadline {
    /// Start the clock for `operation` now
    pub fn after(operation: &'static str, limit: Duration) -> Self {
        Self {
            operation,
            started: Instant::now(),
            limit,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.started.elapsed() >= self.limit
    }

    /// Time left before expiry, zero once expired
    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.started.elapsed())
    }

    /// Fail with `BundleError::Timeout` when the deadline has passed
    pub fn check(&self) -> Result<()> {
        if self.is_expired() {
            return Err(self.timeout_error());
        }
        Ok(())
    }

    pub fn timeout_error(&self) -> BundleError {
        BundleError::Timeout {
            operation: self.operation,
            limit: self.limit,
        }
    }
}
