//! The `completion` capability seam (§1, §6): the boundary between this
//! crate and "the actual LLM HTTP libraries", which are treated as opaque.
//! Implementing new model providers is explicitly out of scope (§1
//! Non-goals) — this module only defines the trait the retry engine drives
//! and a thin CLI-proxy implementation of it (§4.5), since that HTTP
//! endpoint is this crate's own.

pub mod http;

use crate::errors::GatewayError;
use crate::model::{Message, ProviderResponse};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// One invocation's worth of parameters, assembled fresh by the retry
/// engine for every attempt (the working message list changes as feedback
/// is injected; §4.4).
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// The full model string for `HTTP_PROVIDER` bindings, or the
    /// CLI submodel selector (post `cli/` stripping) for `CLI_PROXY`.
    pub model: String,
    pub messages: Vec<Message>,
    /// Provider-specific passthrough params from the router (§4.2):
    /// temperature, max_tokens, stream, stop, response_format.
    pub params: Map<String, Value>,
    /// Present only during the tool-augmented retry stage (§4.4), or when
    /// the caller's original config carried one.
    pub mcp_config: Option<Value>,
}

/// The opaque `completion(params) → response` capability (§1, §3). Both
/// HTTP providers and the CLI-subprocess proxy implement this so the retry
/// engine can drive either uniformly.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<ProviderResponse, GatewayError>;
}
