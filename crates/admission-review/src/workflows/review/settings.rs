use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::pool::WorkerPool;
use super::retry::RetryPolicy;

/// Every six hours, on the hour. Expressions carry a leading seconds field.
pub const DEFAULT_SCHEDULE: &str = "0 0 */6 * * *";

/// Runtime-tunable orchestrator settings.
///
/// Operations take a snapshot when they start; updates apply from the next run or tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSettings {
    pub schedule: String,
    pub concurrency: usize,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub item_delay_ms: u64,
    pub subject_delay_ms: u64,
    pub skip_already_verified: bool,
    pub auto_start: bool,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            schedule: DEFAULT_SCHEDULE.to_string(),
            concurrency: 3,
            retry_attempts: 3,
            retry_delay_ms: 2_000,
            item_delay_ms: 1_000,
            subject_delay_ms: 2_000,
            skip_already_verified: true,
            auto_start: false,
        }
    }
}

impl VerificationSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn worker_pool(&self) -> WorkerPool {
        WorkerPool::new(self.concurrency, Duration::from_millis(self.item_delay_ms))
    }

    pub fn subject_delay(&self) -> Duration {
        Duration::from_millis(self.subject_delay_ms)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.schedule.trim().is_empty() {
            return Err(SettingsError::EmptySchedule);
        }
        if self.concurrency == 0 {
            return Err(SettingsError::ZeroConcurrency);
        }
        if self.retry_attempts == 0 {
            return Err(SettingsError::ZeroRetryAttempts);
        }
        Ok(())
    }

    /// Apply a whitelisted patch, returning the merged settings without mutating `self`.
    pub fn merged(&self, update: &SettingsUpdate) -> Result<Self, SettingsError> {
        let mut next = self.clone();
        if let Some(schedule) = &update.schedule {
            next.schedule = schedule.trim().to_string();
        }
        if let Some(concurrency) = update.concurrency {
            next.concurrency = concurrency;
        }
        if let Some(attempts) = update.retry_attempts {
            next.retry_attempts = attempts;
        }
        if let Some(delay) = update.retry_delay_ms {
            next.retry_delay_ms = delay;
        }
        if let Some(delay) = update.item_delay_ms {
            next.item_delay_ms = delay;
        }
        if let Some(delay) = update.subject_delay_ms {
            next.subject_delay_ms = delay;
        }
        if let Some(skip) = update.skip_already_verified {
            next.skip_already_verified = skip;
        }
        if let Some(auto_start) = update.auto_start {
            next.auto_start = auto_start;
        }
        next.validate()?;
        Ok(next)
    }
}

/// Partial settings update accepted by the admin surface. Unknown fields are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsUpdate {
    pub schedule: Option<String>,
    pub concurrency: Option<usize>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub item_delay_ms: Option<u64>,
    pub subject_delay_ms: Option<u64>,
    pub skip_already_verified: Option<bool>,
    pub auto_start: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("schedule must not be empty")]
    EmptySchedule,
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("retry_attempts must be at least 1")]
    ZeroRetryAttempts,
}
