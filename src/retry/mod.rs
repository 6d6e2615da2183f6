//! Retry engine (§4.4): drives repeated attempts against a `Completer`,
//! applies validators, escalates through plain → tool-augmented → human
//! stages, and wraps each invoke with the circuit breaker (§breaker).

use crate::breaker::{Admission, BreakerRegistry};
use crate::config::Settings;
use crate::diagnostics;
use crate::errors::{AttemptSummary, ErrorKind, GatewayError};
use crate::model::{CallConfig, Message, ProviderBinding, ProviderResponse, RetryConfig};
use crate::provider::{Completer, CompletionRequest};
use crate::router::RouteDecision;
use crate::utils::cancellation::Cancellation;
use crate::validator::{LlmCaller, ValidationContext, ValidatorRegistry};
use fastrand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Plain,
    ToolAugmented,
    Human,
}

/// Selects the stage for 1-indexed `attempt`, per the worked examples in
/// §8 (S4, S5): human review takes priority whenever `attempt >= H`,
/// independent of whether a tool-use threshold is even configured.
fn select_stage(attempt: u32, retry_config: &RetryConfig) -> Stage {
    if let Some(h) = retry_config.max_attempts_before_human
        && attempt >= h
    {
        return Stage::Human;
    }
    if let Some(t) = retry_config.max_attempts_before_tool_use
        && attempt >= t
    {
        return Stage::ToolAugmented;
    }
    Stage::Plain
}

fn breaker_key(binding: ProviderBinding) -> &'static str {
    match binding {
        ProviderBinding::HttpProvider => "http_provider",
        ProviderBinding::CliProxy => "cli_proxy",
    }
}

fn backoff_delay(attempt: u32, retry_config: &RetryConfig, rng: &mut Rng) -> Duration {
    let raw = retry_config.initial_delay_s * retry_config.backoff_factor.powi((attempt - 1) as i32);
    let capped = raw.min(retry_config.max_delay_s);
    let factor = if retry_config.use_jitter {
        let jitter = retry_config.jitter_fraction.clamp(0.0, 1.0);
        let lo = 1.0 - jitter;
        let hi = 1.0 + jitter;
        lo + rng.f64() * (hi - lo)
    } else {
        1.0
    };
    Duration::from_secs_f64((capped * factor).max(0.0))
}

fn original_user_prompt(messages: &[Message]) -> String {
    messages
        .iter()
        .find(|m| m.role == crate::model::Role::User)
        .map(Message::primary_text)
        .unwrap_or_default()
}

fn build_feedback_message(
    attempt: u32,
    failures: &[(String, crate::model::ValidationResult)],
    stage: Stage,
    tool_name: Option<&str>,
) -> Message {
    let mut text = format!("Attempt {attempt} did not pass validation.\n");
    for (name, result) in failures {
        text.push_str(&format!("- `{name}` failed: {}\n", result.reasoning));
        for suggestion in &result.suggestions {
            text.push_str(&format!("  suggestion: {suggestion}\n"));
        }
    }
    if stage == Stage::ToolAugmented
        && let Some(tool) = tool_name
    {
        text.push_str(&format!("\nUse the `{tool}` tool to produce a corrected response.\n"));
    }
    Message::user(text)
}

/// Immutable inputs to one `RetryEngine::run` call.
pub struct RunParams<'a> {
    pub config: &'a CallConfig,
    pub binding: ProviderBinding,
    pub route: &'a RouteDecision,
    pub completer: Arc<dyn Completer>,
    pub llm_caller: Option<Arc<dyn LlmCaller>>,
    pub cancellation: Cancellation,
    /// Recursion depth this call is itself executing at (0 for a
    /// caller-initiated call; `d+1` when driven by an AI-assisted
    /// validator's recursive call at depth `d`, §4.3). Threaded into every
    /// attempt's `ValidationContext` so the guard composes across nested
    /// recursive calls instead of resetting at each level.
    pub depth: u32,
}

pub struct RetryEngine {
    pub validators: Arc<ValidatorRegistry>,
    pub breakers: Arc<BreakerRegistry>,
    pub settings: Arc<Settings>,
}

impl RetryEngine {
    pub fn new(validators: Arc<ValidatorRegistry>, breakers: Arc<BreakerRegistry>, settings: Arc<Settings>) -> Self {
        Self { validators, breakers, settings }
    }

    #[instrument(skip(self, params), fields(model = %params.config.model))]
    pub async fn run(&self, params: RunParams<'_>) -> Result<ProviderResponse, GatewayError> {
        if !self.settings.enable_validation {
            return self.run_single_attempt_no_validation(&params).await;
        }

        let retry_config = &params.config.retry_config;
        let max_attempts = retry_config.max_attempts.max(1);
        let mut working_messages = params.config.messages.clone();
        let user_prompt = original_user_prompt(&working_messages);
        let mut attempts: Vec<AttemptSummary> = Vec::new();
        let mut rng = Rng::new();
        let key = breaker_key(params.binding);

        for attempt in 1..=max_attempts {
            if params.cancellation.is_cancelled() {
                return Err(GatewayError::new(ErrorKind::Cancelled, "cancelled between attempts").with_attempts(attempts));
            }

            let stage = select_stage(attempt, retry_config);
            if stage == Stage::Human {
                info!(attempt, "escalating to human review without invoking provider");
                return Err(GatewayError::new(
                    ErrorKind::HumanReviewRequired,
                    "exceeded max_attempts_before_human; human review required",
                )
                .with_attempts(attempts));
            }

            let admission = retry_config
                .circuit_breaker
                .as_ref()
                .map(|cb| self.breakers.admit(key, cb));

            if matches!(admission, Some(Admission::Refuse)) {
                metrics::counter!("gateway_breaker_trips_total", "binding" => key).increment(1);
                attempts.push(AttemptSummary {
                    attempt,
                    validator_outcomes: vec![],
                    delay_taken_s: None,
                    error: Some("circuit_open".to_string()),
                });
                if attempt == max_attempts {
                    return Err(GatewayError::new(ErrorKind::CircuitOpen, "circuit breaker is open")
                        .with_attempts(attempts));
                }
                if !self
                    .sleep_backoff(attempt, retry_config, &mut rng, &params.cancellation, &mut attempts, None)
                    .await
                {
                    return Err(GatewayError::new(ErrorKind::Cancelled, "cancelled during backoff").with_attempts(attempts));
                }
                continue;
            }

            metrics::counter!("gateway_attempts_total", "binding" => key).increment(1);
            let request = self.build_request(&params, &working_messages, stage);
            let invoke_result = params.completer.complete(request).await;

            match invoke_result {
                Err(err) => {
                    if let Some(cb) = &retry_config.circuit_breaker {
                        self.breakers.on_failure(key, err.kind, cb);
                    }

                    if err.kind == ErrorKind::Auth {
                        let report = diagnostics::diagnose(&err.message, &params.config.model).await;
                        attempts.push(AttemptSummary {
                            attempt,
                            validator_outcomes: vec![],
                            delay_taken_s: None,
                            error: Some(err.message.clone()),
                        });
                        return Err(GatewayError::new(ErrorKind::Auth, err.message)
                            .with_attempts(attempts)
                            .with_diagnostic(report));
                    }

                    attempts.push(AttemptSummary {
                        attempt,
                        validator_outcomes: vec![],
                        delay_taken_s: None,
                        error: Some(err.message.clone()),
                    });

                    if !err.kind.is_retryable() || attempt == max_attempts {
                        return Err(GatewayError::new(err.kind, err.message).with_attempts(attempts));
                    }

                    if !self
                        .sleep_backoff(attempt, retry_config, &mut rng, &params.cancellation, &mut attempts, err.retry_after)
                        .await
                    {
                        return Err(GatewayError::new(ErrorKind::Cancelled, "cancelled during backoff").with_attempts(attempts));
                    }
                    continue;
                }
                Ok(response) => {
                    if retry_config.circuit_breaker.is_some() {
                        self.breakers.on_success(key);
                    }

                    let (passed, outcomes, failures) = self
                        .run_validators(&params, &response, attempt, &user_prompt, &working_messages)
                        .await?;

                    if passed {
                        attempts.push(AttemptSummary {
                            attempt,
                            validator_outcomes: outcomes,
                            delay_taken_s: None,
                            error: None,
                        });
                        return Ok(response);
                    }

                    attempts.push(AttemptSummary {
                        attempt,
                        validator_outcomes: outcomes,
                        delay_taken_s: None,
                        error: None,
                    });

                    if attempt == max_attempts {
                        return Err(GatewayError::new(ErrorKind::ValidationFailed, "all attempts failed validation")
                            .with_attempts(attempts));
                    }

                    let next_stage = select_stage(attempt + 1, retry_config);
                    let feedback = build_feedback_message(
                        attempt,
                        &failures,
                        next_stage,
                        retry_config.debug_tool_name.as_deref(),
                    );
                    working_messages.push(feedback);

                    if !self
                        .sleep_backoff(attempt, retry_config, &mut rng, &params.cancellation, &mut attempts, None)
                        .await
                    {
                        return Err(GatewayError::new(ErrorKind::Cancelled, "cancelled during backoff").with_attempts(attempts));
                    }
                }
            }
        }

        Err(GatewayError::new(ErrorKind::Internal, "retry loop exited without a terminal outcome").with_attempts(attempts))
    }

    async fn run_single_attempt_no_validation(&self, params: &RunParams<'_>) -> Result<ProviderResponse, GatewayError> {
        let working_messages = params.config.messages.clone();
        let request = self.build_request(params, &working_messages, Stage::Plain);
        match params.completer.complete(request).await {
            Ok(response) => Ok(response),
            Err(err) if err.kind == ErrorKind::Auth => {
                let report = diagnostics::diagnose(&err.message, &params.config.model).await;
                Err(GatewayError::new(ErrorKind::Auth, err.message).with_diagnostic(report))
            }
            Err(err) => Err(err),
        }
    }

    fn build_request(&self, params: &RunParams<'_>, messages: &[Message], stage: Stage) -> CompletionRequest {
        let model = params.route.cli_submodel.clone().unwrap_or_else(|| params.config.model.clone());
        let mcp_config = if stage == Stage::ToolAugmented && params.binding == ProviderBinding::CliProxy {
            params
                .config
                .retry_config
                .debug_tool_config
                .clone()
                .or_else(|| params.config.mcp_config.clone())
        } else {
            params.config.mcp_config.clone()
        };
        CompletionRequest {
            model,
            messages: messages.to_vec(),
            params: params.route.params.clone(),
            mcp_config,
        }
    }

    async fn run_validators(
        &self,
        params: &RunParams<'_>,
        response: &ProviderResponse,
        attempt: u32,
        user_prompt: &str,
        working_messages: &[Message],
    ) -> Result<(bool, Vec<(String, bool)>, Vec<(String, crate::model::ValidationResult)>), GatewayError> {
        let ctx = ValidationContext {
            attempt,
            original_user_prompt: user_prompt.to_string(),
            messages: working_messages.to_vec(),
            llm_caller: params.llm_caller.clone(),
            depth: params.depth,
            recursion_depth_limit: self.settings.recursion_depth_limit,
        };

        let mut outcomes = Vec::new();
        let mut failures = Vec::new();
        let debug_mode = params.config.retry_config.debug_mode;

        for spec in &params.config.validation {
            let validator = self.validators.resolve(spec)?;
            let result = validator.validate(response, &ctx).await;
            outcomes.push((validator.name().to_string(), result.valid));
            if !result.valid {
                failures.push((validator.name().to_string(), result));
                if !debug_mode {
                    break;
                }
            }
        }

        Ok((failures.is_empty(), outcomes, failures))
    }

    /// Sleeps the backoff delay, recording it on the most recent attempt
    /// summary. `retry_after` is a provider-supplied override (§7 `rate_limit`:
    /// "respect Retry-After if provided") that wins over the computed
    /// exponential delay when present. Returns `false` if cancellation cut
    /// the sleep short.
    async fn sleep_backoff(
        &self,
        attempt: u32,
        retry_config: &RetryConfig,
        rng: &mut Rng,
        cancellation: &Cancellation,
        attempts: &mut [AttemptSummary],
        retry_after: Option<Duration>,
    ) -> bool {
        let delay = retry_after.unwrap_or_else(|| backoff_delay(attempt, retry_config, rng));
        metrics::histogram!("gateway_retry_delay_seconds").record(delay.as_secs_f64());
        if let Some(last) = attempts.last_mut() {
            last.delay_taken_s = Some(delay.as_secs_f64());
        }
        cancellation.sleep(delay).await
    }
}
