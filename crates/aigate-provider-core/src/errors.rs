use std::time::Duration;

use aigate_common::ErrorClass;
use thiserror::Error;

/// Error an Adapter returns from `Execute`/`ExecuteStreaming`. Carries
/// enough for the Router to classify the outcome per §4.1's table and,
/// for `RetryableThrottled`, the upstream's own `Retry-After`.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("upstream transport error: {0}")]
    Transport(String),
    #[error("upstream returned {status}")]
    UpstreamStatus { status: u16, body_snippet: String },
    #[error("upstream rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },
    #[error("request rejected by upstream: {0}")]
    BadRequest(String),
    #[error("upstream credentials invalid")]
    AuthInvalid,
    #[error("operation unsupported by this adapter: {0}")]
    Unsupported(&'static str),
    #[error("deadline reached before first byte")]
    DeadlineBeforeFirstByte,
    #[error("deadline reached after first byte")]
    DeadlinePartial,
    #[error("stream failed after {bytes_delivered} bytes delivered")]
    StreamTruncated { bytes_delivered: u64 },
}

pub type ProviderResult<T> = Result<T, ProviderError>;

impl ProviderError {
    /// Maps an adapter error onto the classification table in §4.1. This is
    /// the single place that decision gets made; the Router never inspects
    /// `ProviderError` variants directly.
    pub fn error_class(&self) -> ErrorClass {
        match self {
            ProviderError::Transport(_) => ErrorClass::RetryableTransient,
            ProviderError::UpstreamStatus { status, .. } if (500..600).contains(status) => {
                ErrorClass::RetryableTransient
            }
            ProviderError::UpstreamStatus { .. } => ErrorClass::TerminalBadRequest,
            ProviderError::RateLimited { .. } => ErrorClass::RetryableThrottled,
            ProviderError::BadRequest(_) => ErrorClass::TerminalBadRequest,
            ProviderError::AuthInvalid => ErrorClass::TerminalBadRequest,
            ProviderError::Unsupported(_) => ErrorClass::TerminalBadRequest,
            ProviderError::DeadlineBeforeFirstByte => ErrorClass::Deadline,
            ProviderError::DeadlinePartial => ErrorClass::TerminalPartial,
            ProviderError::StreamTruncated { .. } => ErrorClass::TerminalPartial,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_xx_status_is_retryable_transient() {
        let err = ProviderError::UpstreamStatus {
            status: 503,
            body_snippet: String::new(),
        };
        assert_eq!(err.error_class(), ErrorClass::RetryableTransient);
    }

    #[test]
    fn four_xx_status_is_terminal() {
        let err = ProviderError::UpstreamStatus {
            status: 400,
            body_snippet: String::new(),
        };
        assert_eq!(err.error_class(), ErrorClass::TerminalBadRequest);
    }

    #[test]
    fn deadline_before_first_byte_is_retryable_deadline() {
        assert_eq!(
            ProviderError::DeadlineBeforeFirstByte.error_class(),
            ErrorClass::Deadline
        );
    }

    #[test]
    fn deadline_after_first_byte_is_terminal_partial() {
        assert_eq!(
            ProviderError::DeadlinePartial.error_class(),
            ErrorClass::TerminalPartial
        );
    }
}
