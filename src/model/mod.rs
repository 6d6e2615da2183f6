//! Core data model shared by every component (§3): the request shape callers
//! submit, the canonical response shape providers/the CLI proxy return, and
//! the retry/circuit-breaker/task bookkeeping types that ride along.

use serde::{Deserialize, Serialize};

/// A single message in a chat-completion request/response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::Text(text.into()),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Content::Text(text.into()),
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Text(text.into()),
        }
    }

    /// Primary text content: the string itself, or the concatenation of all
    /// `Part::Text` parts in a multimodal content array.
    pub fn primary_text(&self) -> String {
        match &self.content {
            Content::Text(s) => s.clone(),
            Content::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    Part::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<Part>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    ImageUrl { image_url: ImageRef },
    ToolCall { id: String, name: String, arguments: String },
    ToolResult { tool_call_id: String, content: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageRef {
    pub url: String,
}

/// `{kind: "text" | "json_object"}` — requested response shape (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseFormat {
    pub kind: ResponseFormatKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormatKind {
    Text,
    JsonObject,
}

/// {type, params} — resolved into a `Validator` by the registry (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl ValidatorSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: serde_json::Map::new(),
        }
    }
}

/// {valid, confidence, reasoning, suggestions, metadata} — the outcome of one
/// `Validator::validate` call (§3). Invariant: `valid == false` implies
/// `reasoning` is non-empty; enforced by the constructors below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ValidationResult {
    pub fn pass() -> Self {
        Self {
            valid: true,
            confidence: 1.0,
            reasoning: String::new(),
            suggestions: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn fail(reasoning: impl Into<String>) -> Self {
        let reasoning = reasoning.into();
        debug_assert!(!reasoning.is_empty(), "fail() requires non-empty reasoning");
        Self {
            valid: false,
            confidence: 0.0,
            reasoning,
            suggestions: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

/// Set of error kinds excluded from circuit-breaker failure counting.
/// Defaults match §4.4: `bad_request`, `auth`, `validation_failed`,
/// `human_review_required`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_s: f64,
    pub failure_window_s: f64,
    #[serde(default = "default_excluded_error_kinds")]
    pub excluded_error_kinds: Vec<String>,
}

fn default_excluded_error_kinds() -> Vec<String> {
    vec![
        "bad_request".into(),
        "auth".into(),
        "validation_failed".into(),
        "human_review_required".into(),
    ]
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_s: 30.0,
            failure_window_s: 60.0,
            excluded_error_kinds: default_excluded_error_kinds(),
        }
    }
}

/// {max_attempts, initial_delay_s, ...} — retry engine tuning for one call
/// (§3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_s")]
    pub initial_delay_s: f64,
    #[serde(default = "default_max_delay_s")]
    pub max_delay_s: f64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_true")]
    pub use_jitter: bool,
    #[serde(default = "default_jitter_fraction")]
    pub jitter_fraction: f64,
    #[serde(default)]
    pub max_attempts_before_tool_use: Option<u32>,
    #[serde(default)]
    pub max_attempts_before_human: Option<u32>,
    #[serde(default)]
    pub debug_mode: bool,
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    #[serde(default)]
    pub debug_tool_name: Option<String>,
    #[serde(default)]
    pub debug_tool_config: Option<serde_json::Value>,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay_s() -> f64 {
    1.0
}
fn default_max_delay_s() -> f64 {
    30.0
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_jitter_fraction() -> f64 {
    0.1
}
fn default_true() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_s: default_initial_delay_s(),
            max_delay_s: default_max_delay_s(),
            backoff_factor: default_backoff_factor(),
            use_jitter: true,
            jitter_fraction: default_jitter_fraction(),
            max_attempts_before_tool_use: None,
            max_attempts_before_human: None,
            debug_mode: false,
            circuit_breaker: None,
            debug_tool_name: None,
            debug_tool_config: None,
        }
    }
}

impl RetryConfig {
    /// Validates the tool-use/human thresholds invariant from §3: if both
    /// are set, tool-use must come strictly before human review.
    pub fn validate(&self) -> Result<(), String> {
        if let (Some(t), Some(h)) = (self.max_attempts_before_tool_use, self.max_attempts_before_human)
            && t >= h
        {
            return Err(format!(
                "max_attempts_before_tool_use ({t}) must be < max_attempts_before_human ({h})"
            ));
        }
        Ok(())
    }
}

/// The provider-agnostic request (§3). `CallConfig` is caller-owned; the
/// orchestrator treats it as read-only and normalizes into a working copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    pub model: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub response_format: Option<ResponseFormat>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
    #[serde(default)]
    pub validation: Vec<ValidatorSpec>,
    #[serde(default)]
    pub retry_config: RetryConfig,
    #[serde(default)]
    pub mcp_config: Option<serde_json::Value>,
    #[serde(default = "default_true")]
    pub wait_for_completion: bool,
}

impl CallConfig {
    /// Shape validation performed by the orchestrator before normalization
    /// (§4.7 step 1). Catches violations that normalization itself does not
    /// repair (those are §4.1's job).
    pub fn validate_shape(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("model must be non-empty".into());
        }
        let has_messages = !self.messages.is_empty();
        let has_question = self.question.is_some();
        if has_messages == has_question {
            return Err("exactly one of `messages` or `question` must be set".into());
        }
        self.retry_config.validate()?;
        Ok(())
    }
}

/// {index, message, finish_reason} — one completion choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: String,
}

/// {prompt_tokens, completion_tokens, total_tokens} — best-effort usage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Canonical provider response shape (§3), returned by both HTTP providers
/// and the CLI-subprocess proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub id: String,
    pub created_ts: f64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl ProviderResponse {
    /// Convenience accessor: the primary text content of the first choice.
    pub fn primary_text(&self) -> String {
        self.choices
            .first()
            .map(|c| c.message.primary_text())
            .unwrap_or_default()
    }
}

/// Lifecycle status of a row in the async polling manager's `tasks` table (§3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is a permitted transition per the DAG in §3.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Cancelled)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A structured, serializable error attached to a terminal task row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: String,
    pub detail: String,
}

/// One row of the async polling manager's `tasks` table (§3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub status: TaskStatus,
    pub config: CallConfig,
    pub created_ts: f64,
    pub started_ts: Option<f64>,
    pub completed_ts: Option<f64>,
    pub result: Option<ProviderResponse>,
    pub error: Option<TaskError>,
    pub progress: Option<String>,
}

/// Public, read-only view of a task returned by `get_status`/`list_active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskView {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: Option<String>,
    pub result: Option<ProviderResponse>,
    pub error: Option<TaskError>,
}

impl From<&Task> for TaskView {
    fn from(t: &Task) -> Self {
        Self {
            task_id: t.task_id.clone(),
            status: t.status,
            progress: t.progress.clone(),
            result: t.result.clone(),
            error: t.error.clone(),
        }
    }
}

/// Which backend a `CallConfig` resolves to (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderBinding {
    HttpProvider,
    CliProxy,
}

/// Seconds since the UNIX epoch, as a float (matches the task-store schema,
/// §6).
pub fn now_ts() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests;
