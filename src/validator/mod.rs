//! Validator registry and the uniform `Validator` contract (§4.3).
//!
//! Validators are resolved by name from a [`ValidatorSpec`] at config-parse
//! time (§9 Design Notes: "unknown names fail at config-parse time, not at
//! attempt time") rather than looked up ad-hoc on every attempt.

pub mod builtins;

use crate::errors::GatewayError;
use crate::model::{CallConfig, Message, ProviderResponse, ValidationResult, ValidatorSpec};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Capability AI-assisted validators use to issue their own recursive
/// `make_request` calls (§4.3). Implemented by the orchestrator; validators
/// never see a raw HTTP client.
#[async_trait]
pub trait LlmCaller: Send + Sync {
    async fn call(&self, config: CallConfig, depth: u32) -> Result<ProviderResponse, GatewayError>;
}

/// Threaded explicitly into every `validate` call rather than living in
/// module-level state (§9 Design Notes, "Recursive LLM calls from
/// validators").
#[derive(Clone)]
pub struct ValidationContext {
    pub attempt: u32,
    pub original_user_prompt: String,
    /// The working message list as of this attempt (feedback from prior
    /// attempts included).
    pub messages: Vec<Message>,
    pub llm_caller: Option<Arc<dyn LlmCaller>>,
    /// Recursion depth consumed by AI-assisted validators so far.
    pub depth: u32,
    pub recursion_depth_limit: u32,
}

impl ValidationContext {
    /// Substitutes the template placeholders AI-assisted validators build
    /// their prompts from (§4.3).
    pub fn substitute(&self, template: &str, text_to_validate: &str) -> String {
        template
            .replace("{TEXT_TO_VALIDATE}", text_to_validate)
            .replace("{ORIGINAL_USER_PROMPT}", &self.original_user_prompt)
            .replace("{ATTEMPT}", &self.attempt.to_string())
    }
}

/// Uniform validator contract (§3). Implementations may be synchronous
/// (built-ins) or suspend on a recursive LLM call (AI-assisted).
#[async_trait]
pub trait Validator: Send + Sync {
    fn name(&self) -> &str;
    async fn validate(&self, response: &ProviderResponse, ctx: &ValidationContext) -> ValidationResult;
}

type ValidatorFactory =
    Arc<dyn Fn(&Map<String, Value>) -> Result<Arc<dyn Validator>, GatewayError> + Send + Sync>;

/// Process-wide table of named validator factories (§4.3 registry
/// contract). Mutations use a read-mostly lock per §5's shared-resource
/// policy; tests instantiate a fresh registry rather than sharing one
/// (§9, "Global mutable state").
pub struct ValidatorRegistry {
    factories: RwLock<HashMap<String, ValidatorFactory>>,
}

impl ValidatorRegistry {
    /// An empty registry with no validators registered.
    pub fn empty() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// A registry pre-populated with the ~16 built-ins (§4.3 table).
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        builtins::register_all(&registry);
        registry
    }

    /// `register(name, factory)` — fails with `bad_request` on a name
    /// collision; names are globally unique.
    pub fn register(&self, name: &str, factory: ValidatorFactory) -> Result<(), GatewayError> {
        let mut factories = self
            .factories
            .write()
            .map_err(|_| GatewayError::internal("validator registry lock poisoned"))?;
        if factories.contains_key(name) {
            return Err(GatewayError::bad_request(format!(
                "validator '{name}' is already registered"
            )));
        }
        factories.insert(name.to_string(), factory);
        Ok(())
    }

    /// `resolve(ValidatorSpec) -> Validator`. Unknown names fail with
    /// `bad_request` at the point a `CallConfig` is parsed, not mid-attempt.
    pub fn resolve(&self, spec: &ValidatorSpec) -> Result<Arc<dyn Validator>, GatewayError> {
        let factories = self
            .factories
            .read()
            .map_err(|_| GatewayError::internal("validator registry lock poisoned"))?;
        let factory = factories.get(&spec.kind).ok_or_else(|| {
            GatewayError::bad_request(format!("unknown validator type: {}", spec.kind))
        })?;
        factory(&spec.params)
    }
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests;
