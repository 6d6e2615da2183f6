//! Router (§4.2): classifies a normalized `CallConfig` into a provider
//! binding and the parameter set forwarded to it. Pure, O(1).

use crate::model::{CallConfig, ProviderBinding};
use serde_json::{Map, Value};

const CLI_PREFIX: &str = "cli/";
const DEFAULT_CLI_MODEL_ALIAS: &str = "default";

/// Parameters to forward to whichever backend `binding` selects.
pub struct RouteDecision {
    pub binding: ProviderBinding,
    /// The submodel selector passed to the CLI's `--model` flag. `None` for
    /// `HTTP_PROVIDER` bindings, where the full model string is forwarded
    /// inside `params` instead.
    pub cli_submodel: Option<String>,
    pub params: Map<String, Value>,
}

/// `route(CallConfig') -> (ProviderBinding, Params)` (§4.2).
pub fn route(cfg: &CallConfig) -> RouteDecision {
    match cfg.model.get(..CLI_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(CLI_PREFIX) => route_cli_proxy(cfg),
        _ => route_http_provider(cfg),
    }
}

fn route_cli_proxy(cfg: &CallConfig) -> RouteDecision {
    let submodel = &cfg.model[CLI_PREFIX.len()..];
    let submodel = if submodel.is_empty() {
        DEFAULT_CLI_MODEL_ALIAS.to_string()
    } else {
        submodel.to_string()
    };

    let mut params = Map::new();
    insert_opt(&mut params, "temperature", cfg.temperature);
    insert_opt(&mut params, "max_tokens", cfg.max_tokens);
    insert_opt(&mut params, "stream", cfg.stream);
    if let Some(rf) = &cfg.response_format {
        params.insert(
            "response_format".into(),
            serde_json::to_value(rf).expect("ResponseFormat always serializes"),
        );
    }
    if let Some(mcp) = &cfg.mcp_config {
        params.insert("mcp_config".into(), mcp.clone());
    }

    RouteDecision {
        binding: ProviderBinding::CliProxy,
        cli_submodel: Some(submodel),
        params,
    }
}

/// Keys that never leave the gateway — internal bookkeeping the downstream
/// `completion` capability does not accept (§4.2 invariant).
const STRIPPED_KEYS: &[&str] = &["validation", "retry_config", "mcp_config", "provider", "wait_for_completion"];

/// Prefix reserved for internal-only keys a caller might otherwise smuggle
/// through a free-form params map; stripped unconditionally.
const INTERNAL_KEY_MARKER: &str = "_gateway_";

fn route_http_provider(cfg: &CallConfig) -> RouteDecision {
    let mut params = Map::new();
    params.insert("model".into(), Value::String(cfg.model.clone()));
    params.insert(
        "messages".into(),
        serde_json::to_value(&cfg.messages).expect("Vec<Message> always serializes"),
    );
    insert_opt(&mut params, "temperature", cfg.temperature);
    insert_opt(&mut params, "max_tokens", cfg.max_tokens);
    insert_opt(&mut params, "stream", cfg.stream);
    insert_opt(&mut params, "stop", cfg.stop.clone());
    if let Some(rf) = &cfg.response_format {
        params.insert(
            "response_format".into(),
            serde_json::to_value(rf).expect("ResponseFormat always serializes"),
        );
    }

    params.retain(|k, _| !STRIPPED_KEYS.contains(&k.as_str()) && !k.starts_with(INTERNAL_KEY_MARKER));

    RouteDecision {
        binding: ProviderBinding::HttpProvider,
        cli_submodel: None,
        params,
    }
}

fn insert_opt<T: Into<Value>>(params: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(v) = value {
        params.insert(key.into(), v.into());
    }
}
