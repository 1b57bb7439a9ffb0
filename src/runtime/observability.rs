//! Structured logging setup and in-process runtime counters.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Structured JSON lines for log aggregators.
    Json,
    /// Multi-line human readable output with all fields.
    Pretty,
    /// One line per event: timestamp level target fields message.
    #[default]
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Logging configuration.
///
/// `RUST_LOG`, when set, replaces the filter built from `log_level`.
///
/// ```rust,no_run
/// use durafan::runtime::observability::{LogFormat, ObservabilityConfig, init_logging};
///
/// let config = ObservabilityConfig {
///     log_format: LogFormat::Json,
///     log_level: "debug".to_string(),
/// };
/// init_logging(&config).ok();
/// ```
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Level applied to the `durafan` targets, e.g. `info` or `debug`.
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Compact,
            log_level: "info".to_string(),
        }
    }
}

pub(crate) fn default_filter_expression(level: &str) -> String {
    format!("warn,durafan={level},durafan::orchestration={level},durafan::activity={level}")
}

/// Install a global `tracing` subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<(), String> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter_expression(&config.log_level)));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| format!("Failed to initialize JSON logging: {e}")),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .map_err(|e| format!("Failed to initialize pretty logging: {e}")),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init()
            .map_err(|e| format!("Failed to initialize compact logging: {e}")),
    }
}

/// Point-in-time copy of [`RuntimeStats`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub orch_completions: u64,
    pub orch_failures: u64,
    pub orch_terminations: u64,
    pub orch_replay_mismatches: u64,
    pub activity_success: u64,
    pub activity_app_errors: u64,
    pub activity_config_errors: u64,
    pub activity_skipped: u64,
    pub ack_failures: u64,
}

/// Counters kept by a running [`Runtime`](super::Runtime).
#[derive(Debug, Default)]
pub struct RuntimeStats {
    orch_completions: AtomicU64,
    orch_failures: AtomicU64,
    orch_terminations: AtomicU64,
    orch_replay_mismatches: AtomicU64,
    activity_success: AtomicU64,
    activity_app_errors: AtomicU64,
    activity_config_errors: AtomicU64,
    activity_skipped: AtomicU64,
    ack_failures: AtomicU64,
}

impl RuntimeStats {
    pub(crate) fn record_orchestration_completion(&self) {
        self.orch_completions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_orchestration_failure(&self, details: &crate::ErrorDetails) {
        self.orch_failures.fetch_add(1, Ordering::Relaxed);
        if matches!(details, crate::ErrorDetails::ReplayMismatch { .. }) {
            self.orch_replay_mismatches.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_orchestration_termination(&self) {
        self.orch_terminations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_activity_success(&self) {
        self.activity_success.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_activity_app_error(&self) {
        self.activity_app_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_activity_config_error(&self) {
        self.activity_config_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_activity_skipped(&self) {
        self.activity_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ack_failure(&self) {
        self.ack_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            orch_completions: self.orch_completions.load(Ordering::Relaxed),
            orch_failures: self.orch_failures.load(Ordering::Relaxed),
            orch_terminations: self.orch_terminations.load(Ordering::Relaxed),
            orch_replay_mismatches: self.orch_replay_mismatches.load(Ordering::Relaxed),
            activity_success: self.activity_success.load(Ordering::Relaxed),
            activity_app_errors: self.activity_app_errors.load(Ordering::Relaxed),
            activity_config_errors: self.activity_config_errors.load(Ordering::Relaxed),
            activity_skipped: self.activity_skipped.load(Ordering::Relaxed),
            ack_failures: self.ack_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn filter_targets_crate() {
        let f = default_filter_expression("debug");
        assert!(f.starts_with("warn,"));
        assert!(f.contains("durafan=debug"));
    }

    #[test]
    fn mismatch_counts_as_failure() {
        let stats = RuntimeStats::default();
        stats.record_orchestration_failure(&crate::ErrorDetails::ReplayMismatch { message: "x".into() });
        let snap = stats.snapshot();
        assert_eq!(snap.orch_failures, 1);
        assert_eq!(snap.orch_replay_mismatches, 1);
    }
}
