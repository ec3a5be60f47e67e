// Error types for agent invocation and the page pipeline

use evidex_abstraction::BackendError;
use evidex_core::ConfigError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for pipeline construction.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Why a protected call did not produce a value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvokeError {
    /// The circuit for this call-site rejected the call; nothing was attempted.
    #[error("Circuit open for '{name}'")]
    CircuitOpen {
        /// Call-site (agent) name
        name: String,
    },

    /// Every attempt failed with a retryable error.
    #[error("All {attempts} attempts failed, last error: {last_error}")]
    AttemptsExhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the final attempt
        last_error: BackendError,
    },

    /// An attempt failed with an error that retrying cannot fix.
    #[error("Non-retryable error: {0}")]
    NonRetryable(BackendError),
}

impl InvokeError {
    /// Converts the error into its serializable audit form.
    #[must_use]
    pub fn to_failure(&self) -> FailureReason {
        match self {
            Self::CircuitOpen { .. } => FailureReason::CircuitOpen,
            Self::AttemptsExhausted { attempts, last_error } => {
                FailureReason::RetryableExhausted { attempts: *attempts, last_error: last_error.to_string() }
            }
            Self::NonRetryable(error) => FailureReason::NonRetryable { error: error.to_string() },
        }
    }
}

/// Failure recorded on a failed agent result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum FailureReason {
    /// The agent's circuit was open.
    CircuitOpen,
    /// Retryable errors on every attempt.
    RetryableExhausted {
        /// Attempts made
        attempts: u32,
        /// Message of the last error
        last_error: String,
    },
    /// A non-retryable error.
    NonRetryable {
        /// Error message
        error: String,
    },
}

/// Errors raised while assembling a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The configured backend cannot be built
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_serialization() {
        let err = InvokeError::AttemptsExhausted {
            attempts: 3,
            last_error: BackendError::Timeout("30s".into()),
        };
        let json = serde_json::to_value(err.to_failure()).unwrap();
        assert_eq!(json["reason"], "retryable-exhausted");
        assert_eq!(json["attempts"], 3);

        let open = InvokeError::CircuitOpen { name: "OutcomesAnalyst".into() };
        assert_eq!(serde_json::to_value(open.to_failure()).unwrap()["reason"], "circuit-open");
    }

    #[test]
    fn test_pipeline_error_from_backend() {
        let err: PipelineError = BackendError::UnsupportedBackend("openai".into()).into();
        assert!(err.to_string().contains("openai"));
    }
}
