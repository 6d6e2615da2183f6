//! Diagnostics (§4.8): classifies raw auth-adjacent errors into a fixed
//! category table and attaches remediation guidance. Never mutates
//! credentials; never alters retry control flow beyond what the retry
//! engine already does for `auth` errors.

use crate::errors::DiagnosticReport;
use crate::utils::http::default_http_client;
use chrono::Utc;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCategory {
    JwtTimeValidation,
    ApiKeyInvalid,
    ApiKeyMissing,
    Permission,
    Quota,
    Network,
    Unknown,
}

impl DiagnosticCategory {
    fn label(self) -> &'static str {
        match self {
            Self::JwtTimeValidation => "JWT_TIME_VALIDATION",
            Self::ApiKeyInvalid => "API_KEY_INVALID",
            Self::ApiKeyMissing => "API_KEY_MISSING",
            Self::Permission => "PERMISSION",
            Self::Quota => "QUOTA",
            Self::Network => "NETWORK",
            Self::Unknown => "UNKNOWN",
        }
    }

    fn severity(self) -> &'static str {
        match self {
            Self::JwtTimeValidation | Self::ApiKeyInvalid | Self::ApiKeyMissing => "critical",
            Self::Permission | Self::Quota => "high",
            Self::Network => "medium",
            Self::Unknown => "unknown",
        }
    }

    fn likely_causes(self) -> Vec<&'static str> {
        match self {
            Self::JwtTimeValidation => vec![
                "local system clock is skewed relative to the provider's trusted time source",
                "a signed JWT's `iat`/`exp` claims were computed before a clock correction",
            ],
            Self::ApiKeyInvalid => vec!["the configured API key has been revoked or rotated", "the key belongs to a different provider/environment than the target model"],
            Self::ApiKeyMissing => vec!["the expected credential environment variable is unset"],
            Self::Permission => vec!["the credential lacks the scope/role required for this model or operation"],
            Self::Quota => vec!["the account has exhausted its rate limit or billing quota"],
            Self::Network => vec!["DNS resolution, TLS handshake, or connectivity to the provider failed"],
            Self::Unknown => vec!["the error did not match any known authentication failure pattern"],
        }
    }

    fn remediation(self) -> Vec<&'static str> {
        match self {
            Self::JwtTimeValidation => vec!["sync the system clock via NTP (e.g. `chronyc makestep` or `ntpdate`)", "retry once the clock is corrected"],
            Self::ApiKeyInvalid => vec!["verify the credential in the provider's dashboard", "rotate and re-deploy the API key"],
            Self::ApiKeyMissing => vec!["verify the expected environment variable is set before process start"],
            Self::Permission => vec!["grant the credential the required scope/role", "confirm the model is enabled for this account"],
            Self::Quota => vec!["wait for the quota window to reset", "request a quota increase from the provider"],
            Self::Network => vec!["check outbound network connectivity and DNS resolution", "verify any corporate proxy/firewall allows the provider's endpoint"],
            Self::Unknown => vec!["inspect the raw provider error message attached to this report"],
        }
    }
}

struct Pattern {
    category: DiagnosticCategory,
    needles: &'static [&'static str],
}

static PATTERN_TABLE: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    vec![
        Pattern {
            category: DiagnosticCategory::JwtTimeValidation,
            needles: &["jwt", "token is not yet valid", "token has expired", "clock skew", "iat claim", "nbf claim"],
        },
        Pattern {
            category: DiagnosticCategory::ApiKeyMissing,
            needles: &["api key not found", "no api key", "missing api key", "credential not configured", "api_key is required"],
        },
        Pattern {
            category: DiagnosticCategory::ApiKeyInvalid,
            needles: &["invalid api key", "incorrect api key", "invalid x-api-key", "unauthorized", "authentication failed", "invalid_api_key"],
        },
        Pattern {
            category: DiagnosticCategory::Permission,
            needles: &["permission denied", "forbidden", "insufficient permission", "does not have access"],
        },
        Pattern {
            category: DiagnosticCategory::Quota,
            needles: &["quota exceeded", "insufficient_quota", "billing", "exceeded your current quota"],
        },
        Pattern {
            category: DiagnosticCategory::Network,
            needles: &["connection refused", "dns", "could not resolve host", "timed out connecting", "network is unreachable"],
        },
    ]
});

fn classify(message: &str) -> DiagnosticCategory {
    let lower = message.to_lowercase();
    for pattern in PATTERN_TABLE.iter() {
        if pattern.needles.iter().any(|needle| lower.contains(needle)) {
            return pattern.category;
        }
    }
    DiagnosticCategory::Unknown
}

/// Compares the local clock to a trusted external time source (the `Date`
/// response header of an HTTPS request) and reports the drift in seconds.
/// Falls back to a "could not verify" note if the network is unavailable —
/// diagnostics never fail the outer `auth` error it is attached to.
async fn measure_clock_drift() -> Option<f64> {
    let client = default_http_client();
    let resp = tokio::time::timeout(Duration::from_secs(5), client.head("https://www.google.com").send())
        .await
        .ok()?
        .ok()?;
    let date_header = resp.headers().get("date")?.to_str().ok()?;
    let remote = chrono::DateTime::parse_from_rfc2822(date_header).ok()?;
    let local = Utc::now();
    Some((local - remote.with_timezone(&Utc)).num_milliseconds() as f64 / 1000.0)
}

/// `diagnose(error, config) -> DiagnosticReport` (§4.8). `config` is
/// currently unused by the classifier itself (the pattern table is
/// message-driven) but kept in the signature so future provider-specific
/// hints can refine classification without changing callers.
pub async fn diagnose(raw_message: &str, _model: &str) -> DiagnosticReport {
    let category = classify(raw_message);

    let mut detail = format!("{}: {}", category.label(), raw_message);
    if category == DiagnosticCategory::JwtTimeValidation {
        match measure_clock_drift().await {
            Some(drift_s) => {
                detail.push_str(&format!(" (measured clock drift: {drift_s:+.3}s against a trusted time source)"));
            }
            None => {
                debug!("could not measure clock drift: trusted time source unreachable");
                detail.push_str(" (clock drift could not be measured: trusted time source unreachable)");
            }
        }
    }

    DiagnosticReport {
        category: category.label().to_string(),
        severity: category.severity().to_string(),
        likely_causes: category.likely_causes().into_iter().map(str::to_string).collect(),
        remediation: category.remediation().into_iter().map(str::to_string).collect(),
        detail,
    }
}

#[cfg(test)]
mod tests;
