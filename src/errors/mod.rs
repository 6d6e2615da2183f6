use std::time::Duration;
use thiserror::Error;

/// Taxonomy of failures the gateway surfaces to a caller.
///
/// Every raw error from a provider, the CLI proxy, or the task store is
/// classified into one of these before it crosses a module boundary — no
/// raw provider exception type ever reaches the orchestrator's caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Auth,
    RateLimit,
    Timeout,
    ProviderUnavailable,
    BadRequest,
    ValidationFailed,
    CircuitOpen,
    HumanReviewRequired,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// Whether the retry engine should attempt this error again (subject to
    /// attempt budget and circuit breaker state).
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Timeout | Self::ProviderUnavailable
        )
    }

    /// Whether a failure of this kind counts toward the circuit breaker's
    /// sliding failure window. Mirrors `CircuitBreakerConfig::excluded_error_kinds`
    /// defaults.
    pub fn trips_breaker(self) -> bool {
        !matches!(
            self,
            Self::BadRequest | Self::Auth | Self::ValidationFailed | Self::HumanReviewRequired
        )
    }

    /// Process exit code for a CLI front-end surfacing this error (§6).
    pub fn exit_code(self) -> i32 {
        match self {
            Self::ValidationFailed => 1,
            Self::Auth => 2,
            Self::HumanReviewRequired => 3,
            Self::Timeout => 4,
            Self::CircuitOpen => 5,
            Self::Cancelled => 6,
            Self::BadRequest => 64,
            Self::Internal | Self::RateLimit | Self::ProviderUnavailable => 70,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::Timeout => "timeout",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::BadRequest => "bad_request",
            Self::ValidationFailed => "validation_failed",
            Self::CircuitOpen => "circuit_open",
            Self::HumanReviewRequired => "human_review_required",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Outcome of a single provider/proxy invocation, recorded for the
/// `attempts` list on a surfaced `GatewayError`.
#[derive(Debug, Clone)]
pub struct AttemptSummary {
    pub attempt: u32,
    pub validator_outcomes: Vec<(String, bool)>,
    pub delay_taken_s: Option<f64>,
    pub error: Option<String>,
}

/// Structured guidance attached to `auth` errors by the diagnostics module (§4.8).
#[derive(Debug, Clone)]
pub struct DiagnosticReport {
    pub category: String,
    pub severity: String,
    pub likely_causes: Vec<String>,
    pub remediation: Vec<String>,
    pub detail: String,
}

/// The error type surfaced across the gateway's public boundary.
///
/// Carries enough context (attempt history, optional diagnostic report) for
/// a caller to decide what to do next without re-deriving it from logs.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub message: String,
    pub attempts: Vec<AttemptSummary>,
    pub diagnostic_report: Option<DiagnosticReport>,
    /// Server-supplied wait hint for `rate_limit` errors (§7: "respect
    /// Retry-After if provided"), parsed from the provider's response
    /// header. `None` when the provider gave no hint or the error isn't a
    /// rate limit.
    pub retry_after: Option<Duration>,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            attempts: Vec::new(),
            diagnostic_report: None,
            retry_after: None,
        }
    }

    pub fn with_attempts(mut self, attempts: Vec<AttemptSummary>) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_diagnostic(mut self, report: DiagnosticReport) -> Self {
        self.diagnostic_report = Some(report);
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

/// Any leaf I/O or decode failure that has no more specific classification
/// becomes `ErrorKind::Internal` at the boundary where it is first observed.
impl From<anyhow::Error> for GatewayError {
    fn from(e: anyhow::Error) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::new(ErrorKind::BadRequest, format!("invalid JSON: {e}"))
    }
}
