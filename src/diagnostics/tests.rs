use super::*;

#[tokio::test]
async fn classifies_invalid_api_key() {
    let report = diagnose("Error: Invalid API Key provided", "openai/gpt-4o").await;
    assert_eq!(report.category, "API_KEY_INVALID");
    assert!(!report.remediation.is_empty());
}

#[tokio::test]
async fn classifies_missing_api_key() {
    let report = diagnose("no api key configured for this provider", "openai/gpt-4o").await;
    assert_eq!(report.category, "API_KEY_MISSING");
}

#[tokio::test]
async fn classifies_quota_exceeded() {
    let report = diagnose("You exceeded your current quota, please check your plan", "openai/gpt-4o").await;
    assert_eq!(report.category, "QUOTA");
}

#[tokio::test]
async fn unrecognized_message_is_unknown() {
    let report = diagnose("the server fell over for reasons unknown", "openai/gpt-4o").await;
    assert_eq!(report.category, "UNKNOWN");
    assert_eq!(report.severity, "unknown");
}

#[tokio::test]
async fn jwt_time_category_includes_drift_note() {
    let report = diagnose("the provided JWT token has expired due to clock skew", "openai/gpt-4o").await;
    assert_eq!(report.category, "JWT_TIME_VALIDATION");
    assert!(report.detail.contains("clock drift"));
}
