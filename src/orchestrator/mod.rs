//! Orchestrator (§4.7): the glue between every other component. Owns no
//! business logic of its own beyond sequencing — normalize → route →
//! retry engine → (provider or CLI proxy) — and the two capability seams
//! the rest of the crate is built around: the `TaskExecutor` the async
//! polling manager drives, and the `LlmCaller` AI-assisted validators
//! recurse through (§4.3, §9 "Recursive LLM calls from validators").
//!
//! Split into an `OrchestratorCore` (the stateless wiring) and an outer
//! `Orchestrator` (core plus the task manager) so the `TaskExecutor` and
//! `LlmCaller` adapters can each hold an `Arc<OrchestratorCore>` without a
//! reference cycle back through the task manager itself.

use crate::breaker::BreakerRegistry;
use crate::config::Settings;
use crate::errors::GatewayError;
use crate::model::{CallConfig, ProviderBinding, ProviderResponse, TaskView};
use crate::normalizer;
use crate::provider::Completer;
use crate::retry::{RetryEngine, RunParams};
use crate::router;
use crate::tasks::{TaskExecutor, TaskManager};
use crate::utils::cancellation::Cancellation;
use crate::validator::{LlmCaller, ValidatorRegistry};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// What a single `make_request` call resolves to (§4.7, §6): either the
/// completion ran synchronously, or the caller opted into async execution
/// and gets a handle to poll instead.
#[derive(Debug)]
pub enum MakeRequestOutcome {
    Response(ProviderResponse),
    TaskId(String),
}

struct OrchestratorCore {
    settings: Arc<Settings>,
    validators: Arc<ValidatorRegistry>,
    breakers: Arc<BreakerRegistry>,
    http_completer: Arc<dyn Completer>,
    cli_completer: Arc<dyn Completer>,
}

impl OrchestratorCore {
    fn completer_for(&self, binding: ProviderBinding) -> Arc<dyn Completer> {
        match binding {
            ProviderBinding::HttpProvider => self.http_completer.clone(),
            ProviderBinding::CliProxy => self.cli_completer.clone(),
        }
    }

    /// Runs normalize → route → retry engine for one `CallConfig` (§4.7
    /// steps 2-3, 5). `depth` is the recursion depth this execution itself
    /// runs at; 0 for a directly submitted call.
    async fn execute(self: &Arc<Self>, config: CallConfig, cancellation: Cancellation, depth: u32) -> Result<ProviderResponse, GatewayError> {
        let normalized = normalizer::normalize(&config)?;
        let mut cfg = normalized.config;
        normalizer::maybe_inject_json_validator(&mut cfg, self.settings.auto_json_validator);

        // Resolve every validator name before the provider is ever invoked
        // (§9 Design Notes: "unknown names fail at config-parse time, not at
        // attempt time"). `RetryEngine::run_validators` still resolves by
        // name on each attempt, but with this preamble that can never fail
        // on an unknown name — only a name removed from the registry after
        // this check, which nothing in this crate does.
        for spec in &cfg.validation {
            self.validators.resolve(spec)?;
        }

        let route_decision = router::route(&cfg);
        if normalized.multimodal_unsupported_for_cli && route_decision.binding == ProviderBinding::CliProxy {
            return Err(GatewayError::bad_request(
                "request carries multimodal content, which the CLI-subprocess proxy does not support",
            ));
        }

        let completer = self.completer_for(route_decision.binding);
        let engine = RetryEngine::new(self.validators.clone(), self.breakers.clone(), self.settings.clone());
        let llm_caller: Arc<dyn LlmCaller> = Arc::new(RecursiveCaller { core: self.clone() });

        engine
            .run(RunParams {
                config: &cfg,
                binding: route_decision.binding,
                route: &route_decision,
                completer,
                llm_caller: Some(llm_caller),
                cancellation,
                depth,
            })
            .await
    }
}

/// The capability AI-assisted validators recurse through (§4.3). Each call
/// is tagged with the depth it runs at so nested guards compose instead of
/// resetting, and carries no state of its own beyond the shared core — no
/// module-level registry, matching §9's "Global mutable state" redesign.
struct RecursiveCaller {
    core: Arc<OrchestratorCore>,
}

#[async_trait]
impl LlmCaller for RecursiveCaller {
    async fn call(&self, config: CallConfig, depth: u32) -> Result<ProviderResponse, GatewayError> {
        config.validate_shape().map_err(GatewayError::bad_request)?;
        self.core.execute(config, Cancellation::new(), depth).await
    }
}

/// The capability the async polling manager drives for a submitted task
/// (§4.6). A thin adapter so `TaskManager` has no direct dependency on the
/// retry engine or router.
struct Executor {
    core: Arc<OrchestratorCore>,
}

#[async_trait]
impl TaskExecutor for Executor {
    async fn execute(&self, config: CallConfig, cancellation: Cancellation) -> Result<ProviderResponse, GatewayError> {
        self.core.execute(config, cancellation, 0).await
    }
}

/// `make_request(config) → response | task_id` (§4.7) plus the async
/// polling manager's public surface (§6). Constructed once at process
/// start; cheap to clone (everything inside is `Arc`-backed).
pub struct Orchestrator {
    core: Arc<OrchestratorCore>,
    tasks: Arc<TaskManager>,
}

impl Orchestrator {
    pub fn new(
        settings: Arc<Settings>,
        validators: Arc<ValidatorRegistry>,
        http_completer: Arc<dyn Completer>,
        cli_completer: Arc<dyn Completer>,
        task_store: Arc<crate::tasks::store::TaskStore>,
    ) -> Self {
        let core = Arc::new(OrchestratorCore {
            breakers: Arc::new(BreakerRegistry::new()),
            settings: settings.clone(),
            validators,
            http_completer,
            cli_completer,
        });
        let executor: Arc<dyn TaskExecutor> = Arc::new(Executor { core: core.clone() });
        let tasks = Arc::new(TaskManager::new(task_store, executor, settings.async_manager_max_concurrency));
        Self { core, tasks }
    }

    /// Registers an additional validator factory against the shared
    /// registry (§4.3, §6). Fails with `bad_request` on a name collision.
    pub fn register_validator(
        &self,
        name: &str,
        factory: Arc<dyn Fn(&serde_json::Map<String, serde_json::Value>) -> Result<Arc<dyn crate::validator::Validator>, GatewayError> + Send + Sync>,
    ) -> Result<(), GatewayError> {
        self.core.validators.register(name, factory)
    }

    /// Durability sweep (§4.6): call once at process start, before
    /// accepting new submissions.
    pub async fn recover_tasks_on_startup(&self) -> Result<usize, GatewayError> {
        self.tasks.recover_on_startup().await
    }

    /// `make_request(CallConfig) → ProviderResponse | task_id` (§4.7).
    #[instrument(skip(self, config), fields(model = %config.model))]
    pub async fn make_request(&self, config: CallConfig) -> Result<MakeRequestOutcome, GatewayError> {
        config.validate_shape().map_err(GatewayError::bad_request)?;

        if !config.wait_for_completion {
            let task_id = self.tasks.submit(config).await?;
            return Ok(MakeRequestOutcome::TaskId(task_id));
        }

        let response = self.core.execute(config, Cancellation::new(), 0).await?;
        Ok(MakeRequestOutcome::Response(response))
    }

    pub async fn submit(&self, config: CallConfig) -> Result<String, GatewayError> {
        config.validate_shape().map_err(GatewayError::bad_request)?;
        self.tasks.submit(config).await
    }

    pub async fn get_status(&self, task_id: &str) -> Result<TaskView, GatewayError> {
        self.tasks.get_status(task_id).await
    }

    pub async fn wait(&self, task_id: &str, timeout: Option<Duration>) -> Result<TaskView, GatewayError> {
        self.tasks.wait(task_id, timeout).await
    }

    pub async fn cancel(&self, task_id: &str) -> Result<(), GatewayError> {
        self.tasks.cancel(task_id).await
    }

    pub async fn list_active(&self) -> Result<Vec<TaskView>, GatewayError> {
        self.tasks.list_active().await
    }
}
