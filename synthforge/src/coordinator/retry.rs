use std::time::Duration;

use crate::error::TaskError;

/// Attempt caps and backoff for one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after backend failures, with exponential backoff
    pub max_backend_retries: u32,

    /// Retries after unusable or rejected output, with a revised prompt
    pub max_revision_retries: u32,

    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_backend_retries: 3,
            max_revision_retries: 2,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
        }
    }
}

/// What the runner does after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Backoff(Duration),
    Revise,
    GiveUp,
}

/// Retries spent so far, by kind
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    pub backend: u32,
    pub revision: u32,
}

impl RetryBudget {
    pub fn total(&self) -> u32 {
        self.backend + self.revision
    }
}

impl RetryPolicy {
    /// `base * 2^n`, capped at `backoff_max`
    pub fn delay_for(&self, n: u32) -> Duration {
        let factor = 2u32.saturating_pow(n);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }

    /// Decide on `error`, spending budget when a retry is granted.
    pub fn decide(&self, error: &TaskError, budget: &mut RetryBudget) -> RetryDecision {
        match error {
            TaskError::Cancelled | TaskError::Commit(_) => RetryDecision::GiveUp,
            e if e.is_backend() => {
                if budget.backend >= self.max_backend_retries {
                    return RetryDecision::GiveUp;
                }
                let delay = self.delay_for(budget.backend);
                budget.backend += 1;
                RetryDecision::Backoff(delay)
            }
            _ => {
                if budget.revision >= self.max_revision_retries {
                    return RetryDecision::GiveUp;
                }
                budget.revision += 1;
                RetryDecision::Revise
            }
        }
    }
}
