//! Retry policies for activity calls.
//!
//! Every attempt is an ordinary durable activity call, and backoff waits are
//! durable timers, so a retried call replays exactly like a hand-written loop.
use std::time::Duration;

use crate::OrchestrationContext;

/// Delay between a failed attempt and the next one.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Retry immediately.
    None,
    Fixed {
        delay: Duration,
    },
    /// `base * attempt`, capped at `max`.
    Linear {
        base: Duration,
        max: Duration,
    },
    /// `base * multiplier^(attempt - 1)`, capped at `max`.
    Exponential {
        base: Duration,
        multiplier: f64,
        max: Duration,
    },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::Exponential {
            base: Duration::from_millis(100),
            multiplier: 2.0,
            max: Duration::from_secs(30),
        }
    }
}

impl BackoffStrategy {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self {
            BackoffStrategy::None => Duration::ZERO,
            BackoffStrategy::Fixed { delay } => *delay,
            BackoffStrategy::Linear { base, max } => base.saturating_mul(attempt).min(*max),
            BackoffStrategy::Exponential { base, multiplier, max } => {
                if base.is_zero() {
                    return Duration::ZERO;
                }
                let factor = multiplier.powi(attempt.saturating_sub(1).min(i32::MAX as u32) as i32);
                let nanos = base.as_nanos() as f64 * factor;
                if !nanos.is_finite() || nanos >= max.as_nanos() as f64 {
                    *max
                } else {
                    Duration::from_nanos(nanos as u64)
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
    /// Per-attempt deadline. A timed out attempt is not retried.
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::default(),
            timeout: None,
        }
    }
}

impl RetryPolicy {
    /// # Panics
    ///
    /// Panics if `max_attempts` is zero.
    pub fn new(max_attempts: u32) -> Self {
        assert!(max_attempts >= 1, "max_attempts must be at least 1");
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay_for_attempt(attempt)
    }
}

impl OrchestrationContext {
    /// Call an activity, re-scheduling it on failure according to `policy`.
    ///
    /// Returns the first successful result, or the last error once attempts run out.
    pub async fn schedule_activity_with_retry(
        &self,
        name: impl Into<String>,
        input: impl Into<String>,
        policy: RetryPolicy,
    ) -> Result<String, String> {
        let name = name.into();
        let input = input.into();
        let max_attempts = policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let call = self.schedule_activity(name.clone(), input.clone());
            let result = match policy.timeout {
                Some(timeout) => {
                    let deadline = self.schedule_timer(timeout);
                    let (winner, output, _) = self.select(vec![call, deadline]).await;
                    if winner == 1 {
                        return Err(format!("activity '{name}' timed out after {}ms", timeout.as_millis()));
                    }
                    output.into_activity()
                }
                None => call.await.into_activity(),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    self.trace_warn(format!("activity '{name}' attempt {attempt} failed: {e}"));
                    last_error = e;
                }
            }

            if attempt < max_attempts {
                let delay = policy.delay_for_attempt(attempt);
                if !delay.is_zero() {
                    self.schedule_timer(delay).await;
                }
            }
        }

        Err(last_error)
    }
}
