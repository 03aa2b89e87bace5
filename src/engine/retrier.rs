//! Bounded retry of transient delivery failures
//!
//! Each dispatch walks `Pending -> Delivered`, or through `Retrying` to either
//! `Delivered` or `PermanentlyFailed`. Non-transient failures skip `Retrying`.

use std::future::Future;

use super::config::RetryPolicy;
use crate::providers::DeliveryError;
use crate::rules::RuleKey;

/// Delivery state of one dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryState {
    Pending,
    Retrying { attempt: u32, last_error: DeliveryError },
    Delivered { attempts: u32 },
    PermanentlyFailed { attempts: u32, error: DeliveryError },
}

/// Where a dispatch goes after one attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Retry { attempt: u32, last_error: DeliveryError },
    Done(DeliveryOutcome),
}

impl Step {
    /// Classify attempt number `attempt` that finished with `result`
    pub fn after(attempt: u32, result: Result<(), DeliveryError>, policy: &RetryPolicy) -> Self {
        match result {
            Ok(()) => Step::Done(DeliveryOutcome::Delivered { attempts: attempt }),
            Err(error) if error.is_transient() && attempt < policy.max_attempts => Step::Retry {
                attempt,
                last_error: error,
            },
            Err(error) => Step::Done(DeliveryOutcome::PermanentlyFailed {
                attempts: attempt,
                error,
            }),
        }
    }
}

impl DeliveryState {
    /// Next state after attempt number `attempt` finished with `result`
    pub fn advance(self, attempt: u32, result: Result<(), DeliveryError>, policy: &RetryPolicy) -> Self {
        if self.is_terminal() {
            return self;
        }
        match Step::after(attempt, result, policy) {
            Step::Retry { attempt, last_error } => DeliveryState::Retrying { attempt, last_error },
            Step::Done(DeliveryOutcome::Delivered { attempts }) => DeliveryState::Delivered { attempts },
            Step::Done(DeliveryOutcome::PermanentlyFailed { attempts, error }) => {
                DeliveryState::PermanentlyFailed { attempts, error }
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryState::Delivered { .. } | DeliveryState::PermanentlyFailed { .. }
        )
    }
}

/// Final result of a dispatch with retries
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    PermanentlyFailed { attempts: u32, error: DeliveryError },
}

/// Drives attempts until delivery succeeds or becomes hopeless
#[derive(Debug, Clone)]
pub struct DeliveryRetrier {
    policy: RetryPolicy,
}

impl DeliveryRetrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `attempt` until a terminal state.
    ///
    /// `active` is consulted before every retry; once it returns false the
    /// delivery ends as [`DeliveryError::RuleRetired`]. An attempt already in
    /// flight is never interrupted.
    pub async fn run<F, Fut, A>(&self, rule: &RuleKey, mut attempt: F, mut active: A) -> DeliveryOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<(), DeliveryError>>,
        A: FnMut() -> bool,
    {
        let mut number = 0;

        loop {
            number += 1;
            let result = attempt(number).await;

            match Step::after(number, result, &self.policy) {
                Step::Done(DeliveryOutcome::Delivered { attempts }) => {
                    if attempts > 1 {
                        tracing::info!(rule = %rule, attempts, "Delivered after retry");
                    }
                    return DeliveryOutcome::Delivered { attempts };
                }
                Step::Done(DeliveryOutcome::PermanentlyFailed { attempts, error }) => {
                    tracing::error!(rule = %rule, attempts, error = %error, "Delivery failed permanently");
                    return DeliveryOutcome::PermanentlyFailed { attempts, error };
                }
                Step::Retry { attempt: n, last_error } => {
                    let delay = self.policy.backoff(n);
                    tracing::warn!(
                        rule = %rule,
                        attempt = n,
                        max_attempts = self.policy.max_attempts,
                        error = %last_error,
                        "Transient delivery failure, retrying in {:?}",
                        delay
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    if !active() {
                        tracing::info!(rule = %rule, attempts = n, "Rule retired, abandoning delivery");
                        return DeliveryOutcome::PermanentlyFailed {
                            attempts: n,
                            error: DeliveryError::RuleRetired,
                        };
                    }
                }
            }
        }
    }
}
