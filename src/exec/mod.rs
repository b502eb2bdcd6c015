//! Cooperative execution primitives.
//!
//! The core runs on one logical executor. Long operations are async state
//! machines that yield after bounded work units and check a cancellation
//! token at every yield point; nothing here spawns threads or takes locks.

use crate::error::{IndexError, IndexResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag, cloned into long-running effects and
/// checked at yield points.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> IndexResult<()> {
        if self.is_cancelled() {
            Err(IndexError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Counts work units and yields control every `unit` of them, checking
/// the token each time. Used e.g. every 50 symbols during cross-file
/// dependency enhancement.
pub struct WorkBudget {
    unit: usize,
    done: usize,
}

impl WorkBudget {
    pub fn every(unit: usize) -> Self {
        Self {
            unit: unit.max(1),
            done: 0,
        }
    }

    pub async fn tick(&mut self, token: &CancellationToken) -> IndexResult<()> {
        self.done += 1;
        if self.done % self.unit == 0 {
            token.check()?;
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn budget_yields_without_blocking() {
        let token = CancellationToken::new();
        let mut budget = WorkBudget::every(10);
        for _ in 0..100 {
            budget.tick(&token).await.unwrap();
        }
    }

    #[tokio::test]
    async fn cancelled_token_aborts_at_yield_point() {
        let token = CancellationToken::new();
        token.cancel();
        let mut budget = WorkBudget::every(1);
        let err = budget.tick(&token).await.unwrap_err();
        assert!(matches!(err, IndexError::Cancelled));
    }
}
