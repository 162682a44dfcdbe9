use std::future::Future;
use std::time::Duration;

use serde_json::json;

use super::journal::Journal;

/// How a remote failure should be treated by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Authentication,
    Quota,
    RateLimit,
    Transient,
}

impl FailureClass {
    const AUTHENTICATION_SIGNATURES: [&'static str; 6] = [
        "unauthorized",
        "unauthenticated",
        "authentication",
        "invalid api key",
        "api_key_invalid",
        "permission denied",
    ];
    const QUOTA_SIGNATURES: [&'static str; 3] = ["quota", "resource_exhausted", "billing"];
    const RATE_LIMIT_SIGNATURES: [&'static str; 3] =
        ["rate limit", "rate_limit", "too many requests"];

    /// Classify a collaborator error message by its known signatures.
    ///
    /// Status codes only count as standalone tokens, so ids like `S-14012` stay transient.
    pub fn from_message(message: &str) -> Self {
        let lowered = message.to_ascii_lowercase();
        let matches = |signatures: &[&str]| signatures.iter().any(|sig| lowered.contains(sig));
        let has_status = |code: &str| {
            lowered
                .split(|c: char| !c.is_ascii_alphanumeric())
                .any(|token| token == code)
        };

        if matches(&Self::AUTHENTICATION_SIGNATURES) || has_status("401") {
            FailureClass::Authentication
        } else if matches(&Self::QUOTA_SIGNATURES) {
            FailureClass::Quota
        } else if matches(&Self::RATE_LIMIT_SIGNATURES) || has_status("429") {
            FailureClass::RateLimit
        } else {
            FailureClass::Transient
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureClass::Transient)
    }

    pub fn label(&self) -> &'static str {
        match self {
            FailureClass::Authentication => "authentication",
            FailureClass::Quota => "quota",
            FailureClass::RateLimit => "rate_limit",
            FailureClass::Transient => "transient",
        }
    }
}

/// Error surfaced by any external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    message: String,
    class: FailureClass,
}

impl RemoteError {
    /// Build an error whose class is inferred from the message.
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let class = FailureClass::from_message(&message);
        Self { message, class }
    }

    pub fn with_class(class: FailureClass, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            class,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::with_class(FailureClass::Transient, message)
    }

    pub fn class(&self) -> FailureClass {
        self.class
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.class.is_retryable()
    }
}

/// Bounded, classified retries with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay slept after failed attempt `attempt` (1-based): `base * 2^(attempt - 1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    pub async fn run<T, Op, Fut>(
        &self,
        label: &str,
        journal: &Journal,
        mut operation: Op,
    ) -> Result<T, RemoteError>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt = 1;
        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.is_retryable() {
                journal.error(
                    format!("{label}: non-retryable failure, giving up"),
                    Some(json!({
                        "attempt": attempt,
                        "class": error.class().label(),
                        "error": error.message(),
                    })),
                );
                return Err(error);
            }

            if attempt >= self.attempts {
                journal.error(
                    format!("{label}: failed after {attempt} attempts"),
                    Some(json!({ "attempts": attempt, "error": error.message() })),
                );
                return Err(error);
            }

            let delay = self.backoff(attempt);
            journal.warn(
                format!("{label}: attempt {attempt}/{} failed, retrying", self.attempts),
                Some(json!({
                    "attempt": attempt,
                    "delay_ms": delay.as_millis() as u64,
                    "error": error.message(),
                })),
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
