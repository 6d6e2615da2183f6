//! Process-level configuration, read once from the environment at startup.
//!
//! This module owns no file parsing (`.env`/YAML loading is a host concern,
//! §1) — it only defines the small slice of environment variables the core
//! itself consumes (§6) and their defaults.

use std::time::Duration;

macro_rules! env_setting {
    ($env:literal, $default:expr) => {{
        std::env::var($env)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or($default)
    }};
}

macro_rules! env_bool {
    ($env:literal, $default:expr) => {{
        match std::env::var($env) {
            Ok(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
            Err(_) => $default,
        }
    }};
}

/// Gateway-wide settings, read once via [`Settings::from_env`] at process
/// start and shared by reference thereafter.
#[derive(Debug, Clone)]
pub struct Settings {
    /// `ENABLE_VALIDATION` — if false, the retry engine runs exactly one
    /// attempt per call and skips validator evaluation entirely (§4.4).
    pub enable_validation: bool,
    /// `DEFAULT_TIMEOUT_S` — per-attempt provider/proxy timeout when a call
    /// does not specify its own.
    pub default_timeout_s: u64,
    /// `TASK_DB_PATH` — sqlite file backing the async polling manager's
    /// `tasks` table.
    pub task_db_path: String,
    /// `CLI_PROXY_BASE_URL` — base URL of the CLI-subprocess proxy HTTP
    /// endpoint the router dispatches `CLI_PROXY` bindings to. Resolves the
    /// open question in §9 about the POC's inconsistent port numbers.
    pub cli_proxy_base_url: String,
    /// `HTTP_PROVIDER_BASE_URL` — base URL the default `HttpProviderCompleter`
    /// posts `HTTP_PROVIDER`-bound calls to (§4.2, §provider::http).
    pub http_provider_base_url: String,
    /// `HTTP_PROVIDER_API_KEY` — bearer credential for the above, if the
    /// upstream requires one. Read once at process start (§5 shared-resource
    /// policy).
    pub http_provider_api_key: Option<String>,
    /// `CLI_PROXY_BIND_ADDR` — address the proxy's own axum server binds to
    /// when run standalone via `main.rs`.
    pub cli_proxy_bind_addr: String,
    /// `CLI_BINARY_PATH` — path to the external CLI binary the proxy spawns.
    pub cli_binary_path: String,
    /// `CLI_PROXY_MAX_CONCURRENCY` — optional rate-limit semaphore size for
    /// the proxy (§4.5 Concurrency).
    pub cli_proxy_max_concurrency: usize,
    /// `CLI_SUBPROCESS_TIMEOUT_S` — wall-clock timeout for a spawned CLI.
    pub cli_subprocess_timeout_s: u64,
    /// `CLI_CANCELLATION_GRACE_S` — grace period between SIGTERM and SIGKILL.
    pub cli_cancellation_grace_s: u64,
    /// `ASYNC_MANAGER_MAX_CONCURRENCY` — cap on concurrently *running* task
    /// coroutines (§4.6).
    pub async_manager_max_concurrency: usize,
    /// `RECURSION_DEPTH_LIMIT` — guard for AI-assisted validators (§4.3).
    pub recursion_depth_limit: u32,
    /// `AUTO_JSON_VALIDATOR` — whether `response_format.json_object` also
    /// auto-injects a `json_string` validator (§9, Open Question 2).
    pub auto_json_validator: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            enable_validation: env_bool!("ENABLE_VALIDATION", true),
            default_timeout_s: env_setting!("DEFAULT_TIMEOUT_S", 60),
            task_db_path: std::env::var("TASK_DB_PATH").unwrap_or_else(|_| "tasks.db".to_string()),
            cli_proxy_base_url: std::env::var("CLI_PROXY_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8001".to_string()),
            http_provider_base_url: std::env::var("HTTP_PROVIDER_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            http_provider_api_key: std::env::var("HTTP_PROVIDER_API_KEY").ok(),
            cli_proxy_bind_addr: std::env::var("CLI_PROXY_BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:8001".to_string()),
            cli_binary_path: std::env::var("CLI_BINARY_PATH").unwrap_or_else(|_| "cli".to_string()),
            cli_proxy_max_concurrency: env_setting!("CLI_PROXY_MAX_CONCURRENCY", 8usize),
            cli_subprocess_timeout_s: env_setting!("CLI_SUBPROCESS_TIMEOUT_S", 120u64),
            cli_cancellation_grace_s: env_setting!("CLI_CANCELLATION_GRACE_S", 5u64),
            async_manager_max_concurrency: env_setting!("ASYNC_MANAGER_MAX_CONCURRENCY", 10usize),
            recursion_depth_limit: env_setting!("RECURSION_DEPTH_LIMIT", 3u32),
            auto_json_validator: env_bool!("AUTO_JSON_VALIDATOR", true),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_s)
    }

    pub fn cli_subprocess_timeout(&self) -> Duration {
        Duration::from_secs(self.cli_subprocess_timeout_s)
    }

    pub fn cli_cancellation_grace(&self) -> Duration {
        Duration::from_secs(self.cli_cancellation_grace_s)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_env()
    }
}
