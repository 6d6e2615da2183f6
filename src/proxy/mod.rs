//! CLI-subprocess proxy (§4.5): translates one HTTP request into one
//! subprocess invocation of an external CLI binary, streams its
//! line-delimited JSON event output, and returns a single synchronous
//! response. The axum server lives in [`server`]; the `Completer` the
//! retry engine drives against this endpoint lives in [`client`].

pub mod client;
pub mod server;

use crate::config::Settings;
use crate::errors::{ErrorKind, GatewayError};
use crate::model::{Choice, Message, ProviderResponse, Usage};
use crate::utils::path_sanitize::sanitize_error_message;
use crate::utils::subprocess::scrubbed_command;
use serde::Deserialize;
use serde_json::Value;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Whitelist for the CLI's `--model` selector (the submodel after `cli/`
/// stripping). Prevents argument injection through a crafted model string.
static MODEL_SELECTOR_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[A-Za-z0-9._-]+$").expect("model selector regex"));

const TOOL_CONFIG_FILENAME: &str = ".tools.json";

/// Scoped acquisition of a per-request scratch directory (§4.5 step 1).
/// Deletion on drop is unconditional, not a best-effort `if let Ok`.
pub struct ScratchDir {
    path: std::path::PathBuf,
}

impl ScratchDir {
    pub fn acquire() -> std::io::Result<Self> {
        let path = std::env::temp_dir().join(format!("llm-gateway-proxy-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "failed to remove CLI proxy scratch directory");
        }
    }
}

/// Writes the CLI's tool-configuration input (§6: `{servers: {...}}`), the
/// request's `mcp_config` verbatim, or a default all-tools config.
fn write_tool_config(dir: &std::path::Path, mcp_config: Option<&Value>) -> Result<(), GatewayError> {
    let doc = mcp_config.cloned().unwrap_or_else(default_all_tools_config);
    let body = serde_json::to_string_pretty(&doc)
        .map_err(|e| GatewayError::internal(format!("failed to serialize tool config: {e}")))?;
    std::fs::write(dir.join(TOOL_CONFIG_FILENAME), body)
        .map_err(|e| GatewayError::internal(format!("failed to write tool config: {e}")))?;
    Ok(())
}

fn default_all_tools_config() -> Value {
    serde_json::json!({ "servers": {} })
}

/// Request shape accepted by `POST /v1/chat/completions` (§4.5, §6).
#[derive(Debug, Deserialize)]
pub struct ProxyRequest {
    pub model: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub mcp_config: Option<Value>,
}

fn system_prompt(messages: &[Message]) -> Option<String> {
    messages
        .iter()
        .find(|m| m.role == crate::model::Role::System)
        .map(Message::primary_text)
}

fn user_prompt(messages: &[Message]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == crate::model::Role::User)
        .map(Message::primary_text)
        .unwrap_or_default()
}

/// Builds the CLI argument vector (§4.5 step 3). Arguments are passed as a
/// vector, never a shell string. `model_selector` must already be
/// whitelisted by [`MODEL_SELECTOR_RE`] before reaching this function.
fn build_argv(model_selector: &str, prompt: &str, system: Option<&str>, tool_config_path: &std::path::Path) -> Vec<String> {
    let mut argv = vec![
        "--model".to_string(),
        model_selector.to_string(),
        "--prompt".to_string(),
        prompt.to_string(),
        "--json-events".to_string(),
        "--tools-config".to_string(),
        tool_config_path.display().to_string(),
    ];
    if let Some(system) = system {
        argv.push("--system".to_string());
        argv.push(system.to_string());
    }
    argv
}

/// One line of the CLI's line-delimited JSON event stream (§4.5 step 5,
/// §6 "CLI event stream").
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    StatusUpdate {
        #[serde(default)]
        #[allow(dead_code)]
        message: Option<String>,
    },
    TextChunk {
        #[serde(default)]
        text: String,
    },
    FinalResult {
        #[serde(default)]
        text: String,
    },
    ToolCall {
        #[serde(default)]
        #[allow(dead_code)]
        name: Option<String>,
    },
    ToolResult {
        #[serde(default)]
        #[allow(dead_code)]
        content: Option<String>,
    },
    SubprocessExit,
    #[serde(other)]
    Unknown,
}

/// Accumulates the effects of the event stream as lines are parsed.
#[derive(Default)]
struct StreamAccumulator {
    text: String,
    final_result: Option<String>,
}

impl StreamAccumulator {
    fn apply_line(&mut self, line: &str) {
        let Ok(event) = serde_json::from_str::<StreamEvent>(line) else {
            debug!(line, "skipping unparseable CLI event line");
            return;
        };
        match event {
            StreamEvent::TextChunk { text } => self.text.push_str(&text),
            StreamEvent::FinalResult { text } => self.final_result = Some(text),
            StreamEvent::StatusUpdate { .. } | StreamEvent::ToolCall { .. } | StreamEvent::ToolResult { .. } => {}
            StreamEvent::SubprocessExit | StreamEvent::Unknown => {}
        }
    }

    fn result_text(self) -> String {
        self.final_result.unwrap_or(self.text)
    }
}

/// Sends SIGTERM, waits up to `grace`, then SIGKILL if the child has not
/// exited. `libc::kill` is used directly rather than a signal crate since
/// `tokio::process::Child` exposes no portable SIGTERM on its own.
#[cfg(unix)]
async fn terminate_with_grace(child: &mut Child, grace: Duration) {
    let Some(pid) = child.id() else {
        return;
    };
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        warn!(pid, "CLI subprocess ignored SIGTERM, sending SIGKILL");
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

#[cfg(not(unix))]
async fn terminate_with_grace(child: &mut Child, _grace: Duration) {
    let _ = child.start_kill();
    let _ = child.wait().await;
}

/// Result of one CLI invocation before it is wrapped into a `ProviderResponse`.
struct CliOutcome {
    text: String,
    exit_code: Option<i32>,
    stderr_tail: String,
}

/// Drives one full CLI invocation: scratch dir, tool config, spawn, stream
/// parse, timeout/cleanup (§4.5 steps 1-6).
async fn invoke_cli(
    settings: &Settings,
    request: &ProxyRequest,
) -> Result<CliOutcome, GatewayError> {
    if !MODEL_SELECTOR_RE.is_match(&request.model) {
        return Err(GatewayError::bad_request(format!(
            "model selector '{}' contains characters outside [A-Za-z0-9._-]",
            request.model
        )));
    }

    let scratch = ScratchDir::acquire().map_err(GatewayError::from)?;
    write_tool_config(scratch.path(), request.mcp_config.as_ref())?;

    let prompt = user_prompt(&request.messages);
    let system = system_prompt(&request.messages);
    let argv = build_argv(&request.model, &prompt, system.as_deref(), &scratch.path().join(TOOL_CONFIG_FILENAME));

    let mut child = scrubbed_command(&settings.cli_binary_path)
        .args(&argv)
        .current_dir(scratch.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| GatewayError::internal(format!("failed to spawn CLI binary: {e}")))?;

    let stdout = child.stdout.take().expect("stdout was piped");
    let mut stderr = child.stderr.take().expect("stderr was piped");
    let mut reader = BufReader::new(stdout).lines();
    let mut accumulator = StreamAccumulator::default();

    let timeout = settings.cli_subprocess_timeout();
    let read_result = tokio::time::timeout(timeout, async {
        while let Ok(Some(line)) = reader.next_line().await {
            accumulator.apply_line(&line);
        }
    })
    .await;

    let timed_out = read_result.is_err();
    if timed_out {
        warn!(timeout_s = timeout.as_secs(), "CLI subprocess exceeded its wall-clock timeout");
    }

    terminate_with_grace(&mut child, settings.cli_cancellation_grace()).await;
    let exit_code = child.try_wait().ok().flatten().and_then(|s| s.code());

    let mut stderr_tail = String::new();
    let _ = tokio::io::AsyncReadExt::read_to_string(&mut stderr, &mut stderr_tail).await;
    let stderr_tail = sanitize_error_message(stderr_tail.trim());

    if timed_out {
        return Err(GatewayError::new(ErrorKind::Timeout, "CLI subprocess timed out"));
    }

    Ok(CliOutcome {
        text: accumulator.result_text(),
        exit_code,
        stderr_tail,
    })
}

/// Composes the `CliOutcome` into the canonical `ProviderResponse` shape
/// (§4.5 step 7), or a `provider_unavailable` error on nonzero exit.
fn compose_response(model: &str, outcome: CliOutcome) -> Result<ProviderResponse, GatewayError> {
    match outcome.exit_code {
        Some(0) => Ok(ProviderResponse {
            id: format!("cli-{}", Uuid::new_v4()),
            created_ts: crate::model::now_ts(),
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant_text(outcome.text),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        }),
        _ => {
            info!(exit_code = ?outcome.exit_code, stderr = %outcome.stderr_tail, "CLI subprocess exited abnormally");
            Err(GatewayError::new(
                ErrorKind::ProviderUnavailable,
                format!("CLI exited with {:?}: {}", outcome.exit_code, outcome.stderr_tail),
            ))
        }
    }
}

#[cfg(test)]
mod tests;
