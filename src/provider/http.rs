//! A generic HTTP `Completer` for the `HTTP_PROVIDER` binding (§4.2, §6).
//!
//! Implementing new model providers is explicitly out of scope (§1
//! Non-goals): the actual LLM HTTP libraries are "an opaque
//! `completion(params) → response` capability". This type is that opaque
//! capability's default, minimal shape — a single OpenAI-compatible
//! upstream (a provider's native endpoint, or an aggregating proxy such as
//! a LiteLLM/OpenRouter-style gateway) addressed by one configured base URL
//! and bearer credential. Embedders who need per-provider routing supply
//! their own `Completer` instead of this one; the retry engine only ever
//! depends on the trait (§provider).

use crate::errors::{ErrorKind, GatewayError};
use crate::model::ProviderResponse;
use crate::provider::{Completer, CompletionRequest};
use crate::utils::http::default_http_client;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::HeaderMap};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::warn;

pub struct HttpProviderCompleter {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpProviderCompleter {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: default_http_client(),
            base_url: base_url.into(),
            api_key,
        }
    }
}

fn request_body(request: &CompletionRequest) -> Value {
    let mut body: Map<String, Value> = request.params.clone();
    body.insert("model".into(), Value::String(request.model.clone()));
    body.insert(
        "messages".into(),
        serde_json::to_value(&request.messages).unwrap_or(Value::Array(vec![])),
    );
    Value::Object(body)
}

#[async_trait]
impl Completer for HttpProviderCompleter {
    async fn complete(&self, request: CompletionRequest) -> Result<ProviderResponse, GatewayError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let mut builder = self.client.post(&url).json(&request_body(&request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder.send().await.map_err(|e| classify_transport_error(&e))?;
        let status = resp.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let detail = resp.text().await.unwrap_or_default();
            return Err(GatewayError::new(ErrorKind::Auth, detail));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(resp.headers());
            let detail = resp.text().await.unwrap_or_default();
            let mut err = GatewayError::new(ErrorKind::RateLimit, detail);
            if let Some(retry_after) = retry_after {
                warn!(seconds = retry_after.as_secs(), "rate limited; provider requested a retry delay");
                err = err.with_retry_after(retry_after);
            }
            return Err(err);
        }
        if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
            return Err(GatewayError::new(ErrorKind::Timeout, "provider reported a timeout"));
        }
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
            let detail = resp.text().await.unwrap_or_default();
            return Err(GatewayError::bad_request(detail));
        }
        if status.is_server_error() || status == StatusCode::SERVICE_UNAVAILABLE {
            let detail = resp.text().await.unwrap_or_default();
            return Err(GatewayError::new(ErrorKind::ProviderUnavailable, detail));
        }
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(GatewayError::new(
                ErrorKind::ProviderUnavailable,
                format!("provider returned {status}: {detail}"),
            ));
        }

        resp.json::<ProviderResponse>()
            .await
            .map_err(|e| GatewayError::internal(format!("failed to decode provider response: {e}")))
    }
}

/// Parses the `Retry-After` header's integer-seconds form (§7). The
/// HTTP-date form is not handled; providers in practice send seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn classify_transport_error(e: &reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::new(ErrorKind::Timeout, e.to_string())
    } else if e.is_connect() {
        GatewayError::new(ErrorKind::ProviderUnavailable, e.to_string())
    } else {
        GatewayError::internal(e.to_string())
    }
}

#[cfg(test)]
mod tests;
