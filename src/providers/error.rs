use crate::history::HistoryError;

/// Storage error with retry classification.
///
/// Dispatchers retry `retryable` errors with backoff (busy database, pool
/// timeouts). Permanent errors (corrupt rows, stale lock tokens, history
/// ordering violations) abandon the item so its lock expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// Provider operation that failed, e.g. `ack_orchestration_item`.
    pub operation: String,
    pub message: String,
    pub retryable: bool,
}

impl ProviderError {
    pub fn retryable(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            retryable: true,
        }
    }

    pub fn permanent(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Classify a database error: lock contention and pool exhaustion are transient.
    pub fn from_sqlx(operation: &str, e: sqlx::Error) -> Self {
        let message = e.to_string();
        let transient = matches!(e, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))
            || message.contains("database is locked")
            || message.contains("busy");
        Self {
            operation: operation.to_string(),
            message,
            retryable: transient,
        }
    }

    pub fn from_history(operation: &str, e: HistoryError) -> Self {
        Self::permanent(operation, e.to_string())
    }

    pub fn to_infrastructure_error(&self) -> crate::ErrorDetails {
        crate::ErrorDetails::Infrastructure {
            operation: self.operation.clone(),
            message: self.message.clone(),
            retryable: self.retryable,
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.operation, self.message)
    }
}

impl std::error::Error for ProviderError {}
