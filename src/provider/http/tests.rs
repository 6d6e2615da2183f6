use super::*;
use crate::errors::ErrorKind;
use crate::model::{Choice, Message, Usage};
use serde_json::Map;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sample_request() -> CompletionRequest {
    CompletionRequest {
        model: "gpt-4o-mini".to_string(),
        messages: vec![Message::user("hi")],
        params: Map::new(),
        mcp_config: None,
    }
}

fn sample_response() -> ProviderResponse {
    ProviderResponse {
        id: "resp-1".to_string(),
        created_ts: 0.0,
        model: "gpt-4o-mini".to_string(),
        choices: vec![Choice {
            index: 0,
            message: Message::assistant_text("hello back"),
            finish_reason: "stop".to_string(),
        }],
        usage: Usage::default(),
    }
}

#[tokio::test]
async fn forwards_a_successful_response_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_response()))
        .mount(&server)
        .await;

    let completer = HttpProviderCompleter::new(server.uri(), None);
    let response = completer.complete(sample_request()).await.unwrap();
    assert_eq!(response.primary_text(), "hello back");
}

#[tokio::test]
async fn attaches_bearer_auth_when_api_key_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer secret-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_response()))
        .mount(&server)
        .await;

    let completer = HttpProviderCompleter::new(server.uri(), Some("secret-key".to_string()));
    let response = completer.complete(sample_request()).await.unwrap();
    assert_eq!(response.primary_text(), "hello back");
}

#[tokio::test]
async fn maps_401_to_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let completer = HttpProviderCompleter::new(server.uri(), None);
    let err = completer.complete(sample_request()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Auth);
}

#[tokio::test]
async fn maps_429_to_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let completer = HttpProviderCompleter::new(server.uri(), None);
    let err = completer.complete(sample_request()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::RateLimit);
    assert!(err.retry_after.is_none());
}

#[tokio::test]
async fn maps_429_retry_after_header_into_the_gateway_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited").insert_header("retry-after", "20"))
        .mount(&server)
        .await;

    let completer = HttpProviderCompleter::new(server.uri(), None);
    let err = completer.complete(sample_request()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::RateLimit);
    assert_eq!(err.retry_after, Some(std::time::Duration::from_secs(20)));
}

#[tokio::test]
async fn maps_500_to_provider_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let completer = HttpProviderCompleter::new(server.uri(), None);
    let err = completer.complete(sample_request()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ProviderUnavailable);
}

#[tokio::test]
async fn maps_422_to_bad_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(422).set_body_string("unprocessable payload"))
        .mount(&server)
        .await;

    let completer = HttpProviderCompleter::new(server.uri(), None);
    let err = completer.complete(sample_request()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::BadRequest);
}
