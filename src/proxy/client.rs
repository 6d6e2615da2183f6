//! The `Completer` the retry engine drives for `CLI_PROXY` bindings: a
//! thin HTTP client against this crate's own proxy endpoint (§4.5, §1 —
//! "the CLI-subprocess proxy's HTTP endpoint is this crate's own").

use crate::errors::{ErrorKind, GatewayError};
use crate::model::ProviderResponse;
use crate::provider::{Completer, CompletionRequest};
use crate::utils::http::default_http_client;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{Map, Value};

/// Issues `POST {base_url}/v1/chat/completions` against a (possibly remote)
/// instance of this crate's own proxy server.
pub struct CliProxyCompleter {
    client: Client,
    base_url: String,
}

impl CliProxyCompleter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: default_http_client(),
            base_url: base_url.into(),
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
    if let Some(mcp) = &request.mcp_config {
        body.insert("mcp_config".into(), mcp.clone());
    }
    Value::Object(body)
}

#[async_trait]
impl Completer for CliProxyCompleter {
    async fn complete(&self, request: CompletionRequest) -> Result<ProviderResponse, GatewayError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .json(&request_body(&request))
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = resp.status();
        if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
            return Err(GatewayError::new(ErrorKind::Timeout, "CLI proxy reported a timeout"));
        }
        if status == StatusCode::SERVICE_UNAVAILABLE {
            let detail = resp.text().await.unwrap_or_default();
            return Err(GatewayError::new(ErrorKind::ProviderUnavailable, detail));
        }
        if status == StatusCode::BAD_REQUEST {
            let detail = resp.text().await.unwrap_or_default();
            return Err(GatewayError::bad_request(detail));
        }
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(GatewayError::new(
                ErrorKind::ProviderUnavailable,
                format!("CLI proxy returned {status}: {detail}"),
            ));
        }

        resp.json::<ProviderResponse>()
            .await
            .map_err(|e| GatewayError::internal(format!("failed to decode CLI proxy response: {e}")))
    }
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
