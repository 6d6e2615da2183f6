//! Built-in validators (§4.3 table). Each is a small `Validator` struct
//! constructed from a `ValidatorSpec`'s params map by a factory closure
//! registered in [`register_all`].

use super::{ValidationContext, Validator, ValidatorRegistry};
use crate::model::{ProviderResponse, ValidationResult};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

pub fn register_all(registry: &ValidatorRegistry) {
    registry
        .register("response_not_empty", Arc::new(|_params| Ok(Arc::new(ResponseNotEmpty) as Arc<dyn Validator>)))
        .expect("response_not_empty registers once");
    registry
        .register("json_string", Arc::new(|_params| Ok(Arc::new(JsonString::new("json_string")) as Arc<dyn Validator>)))
        .expect("json_string registers once");
    registry
        .register("json", Arc::new(|_params| Ok(Arc::new(JsonString::new("json")) as Arc<dyn Validator>)))
        .expect("json registers once");
    registry
        .register("field_present", Arc::new(|params| FieldPresent::from_params(params).map(|v| Arc::new(v) as Arc<dyn Validator>)))
        .expect("field_present registers once");
    registry
        .register("length", Arc::new(|params| Length::from_params(params).map(|v| Arc::new(v) as Arc<dyn Validator>)))
        .expect("length registers once");
    registry
        .register("regex", Arc::new(|params| RegexMatch::from_params(params).map(|v| Arc::new(v) as Arc<dyn Validator>)))
        .expect("regex registers once");
    registry
        .register("contains", Arc::new(|params| Contains::from_params(params).map(|v| Arc::new(v) as Arc<dyn Validator>)))
        .expect("contains registers once");
    registry
        .register("code", Arc::new(|params| Ok(Arc::new(CodeSyntax::from_params("code", params)) as Arc<dyn Validator>)))
        .expect("code registers once");
    registry
        .register("python", Arc::new(|_params| Ok(Arc::new(CodeSyntax::python()) as Arc<dyn Validator>)))
        .expect("python registers once");
    registry
        .register("schema", Arc::new(|params| SchemaValidator::from_params(params).map(|v| Arc::new(v) as Arc<dyn Validator>)))
        .expect("schema registers once");
    registry
        .register("sql", Arc::new(|_params| Ok(Arc::new(SqlSyntax) as Arc<dyn Validator>)))
        .expect("sql registers once");
    registry
        .register("sql_safe", Arc::new(|params| Ok(Arc::new(SqlSafe::from_params(params)) as Arc<dyn Validator>)))
        .expect("sql_safe registers once");
    registry
        .register("openapi_spec", Arc::new(|_params| Ok(Arc::new(OpenApiSpec) as Arc<dyn Validator>)))
        .expect("openapi_spec registers once");
    registry
        .register(
            "ai_contradiction_check",
            Arc::new(|params| AiContradictionCheck::from_params(params).map(|v| Arc::new(v) as Arc<dyn Validator>)),
        )
        .expect("ai_contradiction_check registers once");
    registry
        .register("agent_task", Arc::new(|params| AgentTask::from_params(params).map(|v| Arc::new(v) as Arc<dyn Validator>)))
        .expect("agent_task registers once");
}

fn primary_text(response: &ProviderResponse) -> String {
    response.primary_text()
}

fn str_param<'a>(params: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn bool_param(params: &Map<String, Value>, key: &str, default: bool) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(default)
}

// ---------------------------------------------------------------------
// response_not_empty

struct ResponseNotEmpty;

#[async_trait]
impl Validator for ResponseNotEmpty {
    fn name(&self) -> &str {
        "response_not_empty"
    }

    async fn validate(&self, response: &ProviderResponse, _ctx: &ValidationContext) -> ValidationResult {
        if primary_text(response).trim().is_empty() {
            ValidationResult::fail("response content is empty after trimming whitespace")
        } else {
            ValidationResult::pass()
        }
    }
}

// ---------------------------------------------------------------------
// json_string / json

struct JsonString {
    registered_as: &'static str,
}

impl JsonString {
    fn new(registered_as: &'static str) -> Self {
        Self { registered_as }
    }
}

#[async_trait]
impl Validator for JsonString {
    fn name(&self) -> &str {
        self.registered_as
    }

    async fn validate(&self, response: &ProviderResponse, _ctx: &ValidationContext) -> ValidationResult {
        let text = primary_text(response);
        match serde_json::from_str::<Value>(text.trim()) {
            Ok(_) => ValidationResult::pass(),
            Err(e) => ValidationResult::fail(format!("content is not valid JSON: {e}")),
        }
    }
}

// ---------------------------------------------------------------------
// field_present

struct FieldPresent {
    field_path: String,
    expected_value: Option<Value>,
}

impl FieldPresent {
    fn from_params(params: &Map<String, Value>) -> Result<Self, crate::errors::GatewayError> {
        let field_path = str_param(params, "field_name")
            .or_else(|| str_param(params, "field_path"))
            .ok_or_else(|| crate::errors::GatewayError::bad_request("field_present requires `field_name`"))?
            .to_string();
        Ok(Self {
            field_path,
            expected_value: params.get("expected_value").cloned(),
        })
    }

    fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
        path.split('.').try_fold(value, |cur, segment| cur.get(segment))
    }
}

#[async_trait]
impl Validator for FieldPresent {
    fn name(&self) -> &str {
        "field_present"
    }

    async fn validate(&self, response: &ProviderResponse, _ctx: &ValidationContext) -> ValidationResult {
        let text = primary_text(response);
        let parsed: Value = match serde_json::from_str(text.trim()) {
            Ok(v) => v,
            Err(e) => return ValidationResult::fail(format!("content is not valid JSON: {e}")),
        };
        match Self::lookup(&parsed, &self.field_path) {
            None => ValidationResult::fail(format!("field `{}` is not present", self.field_path)),
            Some(found) => match &self.expected_value {
                Some(expected) if expected != found => ValidationResult::fail(format!(
                    "field `{}` is present but does not match expected value",
                    self.field_path
                )),
                _ => ValidationResult::pass(),
            },
        }
    }
}

// ---------------------------------------------------------------------
// length

struct Length {
    min_length: Option<usize>,
    max_length: Option<usize>,
}

impl Length {
    fn from_params(params: &Map<String, Value>) -> Result<Self, crate::errors::GatewayError> {
        let min_length = params.get("min_length").and_then(Value::as_u64).map(|v| v as usize);
        let max_length = params.get("max_length").and_then(Value::as_u64).map(|v| v as usize);
        if min_length.is_none() && max_length.is_none() {
            return Err(crate::errors::GatewayError::bad_request(
                "length requires at least one of `min_length`/`max_length`",
            ));
        }
        Ok(Self { min_length, max_length })
    }
}

#[async_trait]
impl Validator for Length {
    fn name(&self) -> &str {
        "length"
    }

    async fn validate(&self, response: &ProviderResponse, _ctx: &ValidationContext) -> ValidationResult {
        let len = primary_text(response).chars().count();
        if let Some(min) = self.min_length
            && len < min
        {
            return ValidationResult::fail(format!("content length {len} is below minimum {min}"));
        }
        if let Some(max) = self.max_length
            && len > max
        {
            return ValidationResult::fail(format!("content length {len} exceeds maximum {max}"));
        }
        ValidationResult::pass()
    }
}

// ---------------------------------------------------------------------
// regex

struct RegexMatch {
    pattern: regex::Regex,
    full_match: bool,
    raw_pattern: String,
}

impl RegexMatch {
    fn from_params(params: &Map<String, Value>) -> Result<Self, crate::errors::GatewayError> {
        let raw_pattern = str_param(params, "pattern")
            .ok_or_else(|| crate::errors::GatewayError::bad_request("regex requires `pattern`"))?
            .to_string();
        let full_match = bool_param(params, "full_match", true);
        let pattern = regex::Regex::new(&raw_pattern)
            .map_err(|e| crate::errors::GatewayError::bad_request(format!("invalid regex pattern: {e}")))?;
        Ok(Self { pattern, full_match, raw_pattern })
    }
}

#[async_trait]
impl Validator for RegexMatch {
    fn name(&self) -> &str {
        "regex"
    }

    async fn validate(&self, response: &ProviderResponse, _ctx: &ValidationContext) -> ValidationResult {
        let text = primary_text(response);
        let matched = if self.full_match {
            self.pattern.find(text.trim()).is_some_and(|m| m.start() == 0 && m.end() == text.trim().len())
        } else {
            self.pattern.is_match(&text)
        };
        if matched {
            ValidationResult::pass()
        } else {
            ValidationResult::fail(format!("content does not match pattern `{}`", self.raw_pattern))
        }
    }
}

// ---------------------------------------------------------------------
// contains

struct Contains {
    substring: String,
    case_sensitive: bool,
}

impl Contains {
    fn from_params(params: &Map<String, Value>) -> Result<Self, crate::errors::GatewayError> {
        let substring = str_param(params, "substring")
            .or_else(|| str_param(params, "text"))
            .ok_or_else(|| crate::errors::GatewayError::bad_request("contains requires `substring`"))?
            .to_string();
        let case_sensitive = bool_param(params, "case_sensitive", false);
        Ok(Self { substring, case_sensitive })
    }
}

#[async_trait]
impl Validator for Contains {
    fn name(&self) -> &str {
        "contains"
    }

    async fn validate(&self, response: &ProviderResponse, _ctx: &ValidationContext) -> ValidationResult {
        let text = primary_text(response);
        let found = if self.case_sensitive {
            text.contains(&self.substring)
        } else {
            text.to_lowercase().contains(&self.substring.to_lowercase())
        };
        if found {
            ValidationResult::pass()
        } else {
            ValidationResult::fail(format!("content does not contain `{}`", self.substring))
        }
    }
}

// ---------------------------------------------------------------------
// code / python
//
// No parsing crate for arbitrary source languages appears anywhere in the
// reference corpus (§DESIGN.md), so syntax validity is approximated with a
// structural check: balanced brackets/quotes, and (for python) consistent
// indentation with no tab/space mixing within a block. This catches the
// truncated-or-malformed output an LLM retry loop is meant to catch without
// depending on a full language grammar.

struct CodeSyntax {
    language: &'static str,
}

impl CodeSyntax {
    fn from_params(default_name: &'static str, params: &Map<String, Value>) -> Self {
        let language = match str_param(params, "language") {
            Some("python") => "python",
            _ => default_name,
        };
        Self { language }
    }

    fn python() -> Self {
        Self { language: "python" }
    }

    fn balanced_delimiters(text: &str) -> Result<(), String> {
        let mut stack = Vec::new();
        let mut in_string: Option<char> = None;
        let mut escape = false;
        for ch in text.chars() {
            if let Some(quote) = in_string {
                if escape {
                    escape = false;
                } else if ch == '\\' {
                    escape = true;
                } else if ch == quote {
                    in_string = None;
                }
                continue;
            }
            match ch {
                '"' | '\'' => in_string = Some(ch),
                '(' | '[' | '{' => stack.push(ch),
                ')' | ']' | '}' => {
                    let expected = match ch {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match stack.pop() {
                        Some(open) if open == expected => {}
                        _ => return Err(format!("unbalanced closing delimiter `{ch}`")),
                    }
                }
                _ => {}
            }
        }
        if let Some(unclosed) = stack.last() {
            return Err(format!("unclosed delimiter `{unclosed}`"));
        }
        if in_string.is_some() {
            return Err("unterminated string literal".to_string());
        }
        Ok(())
    }

    fn python_indentation_consistent(text: &str) -> Result<(), String> {
        for (lineno, line) in text.lines().enumerate() {
            let indent: String = line.chars().take_while(|c| *c == ' ' || *c == '\t').collect();
            if indent.contains(' ') && indent.contains('\t') {
                return Err(format!("line {}: mixed tabs and spaces in indentation", lineno + 1));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Validator for CodeSyntax {
    fn name(&self) -> &str {
        "code"
    }

    async fn validate(&self, response: &ProviderResponse, _ctx: &ValidationContext) -> ValidationResult {
        let text = primary_text(response);
        let code = strip_markdown_fence(&text);
        if let Err(e) = Self::balanced_delimiters(&code) {
            return ValidationResult::fail(format!("{} syntax error: {e}", self.language));
        }
        if self.language == "python"
            && let Err(e) = Self::python_indentation_consistent(&code)
        {
            return ValidationResult::fail(format!("python syntax error: {e}"));
        }
        ValidationResult::pass()
    }
}

fn strip_markdown_fence(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("python").unwrap_or(rest);
        let rest = rest.trim_start_matches('\n');
        if let Some(end) = rest.rfind("```") {
            return rest[..end].to_string();
        }
    }
    trimmed.to_string()
}

// ---------------------------------------------------------------------
// schema

struct SchemaValidator {
    schema: Value,
}

impl SchemaValidator {
    fn from_params(params: &Map<String, Value>) -> Result<Self, crate::errors::GatewayError> {
        let schema = params
            .get("schema")
            .cloned()
            .ok_or_else(|| crate::errors::GatewayError::bad_request("schema requires `schema`"))?;
        // Validate the schema document itself compiles; resolved lazily per
        // call in `validate` since `jsonschema::Validator` borrows the schema
        // value and is awkward to store alongside it in a plain struct.
        jsonschema::validator_for(&schema)
            .map_err(|e| crate::errors::GatewayError::bad_request(format!("invalid JSON-Schema document: {e}")))?;
        Ok(Self { schema })
    }
}

#[async_trait]
impl Validator for SchemaValidator {
    fn name(&self) -> &str {
        "schema"
    }

    async fn validate(&self, response: &ProviderResponse, _ctx: &ValidationContext) -> ValidationResult {
        let text = primary_text(response);
        let instance: Value = match serde_json::from_str(text.trim()) {
            Ok(v) => v,
            Err(e) => return ValidationResult::fail(format!("content is not valid JSON: {e}")),
        };
        let validator = match jsonschema::validator_for(&self.schema) {
            Ok(v) => v,
            Err(e) => return ValidationResult::fail(format!("schema compilation failed: {e}")),
        };
        if validator.is_valid(&instance) {
            ValidationResult::pass()
        } else {
            let errors: Vec<String> = validator.iter_errors(&instance).map(|e| e.to_string()).collect();
            ValidationResult::fail(format!("content does not satisfy schema: {}", errors.join("; ")))
                .with_suggestions(errors)
        }
    }
}

// ---------------------------------------------------------------------
// sql / sql_safe
//
// As with `code`, no SQL-parsing crate appears in the reference corpus;
// `sql` checks shape (keyword-led statement, balanced parens) and
// `sql_safe` checks a denylist of leading statement keywords.

struct SqlSyntax;

impl SqlSyntax {
    const LEADING_KEYWORDS: &'static [&'static str] = &[
        "select", "insert", "update", "delete", "create", "alter", "drop", "with", "truncate", "merge",
    ];

    fn looks_like_sql(text: &str) -> Result<(), String> {
        let trimmed = text.trim().trim_end_matches(';');
        let first_word = trimmed
            .split_whitespace()
            .next()
            .map(str::to_lowercase)
            .unwrap_or_default();
        if !Self::LEADING_KEYWORDS.contains(&first_word.as_str()) {
            return Err(format!("statement does not start with a recognized SQL keyword (got `{first_word}`)"));
        }
        CodeSyntax::balanced_delimiters(trimmed)
    }
}

#[async_trait]
impl Validator for SqlSyntax {
    fn name(&self) -> &str {
        "sql"
    }

    async fn validate(&self, response: &ProviderResponse, _ctx: &ValidationContext) -> ValidationResult {
        let text = primary_text(response);
        let code = strip_markdown_fence(&text);
        match Self::looks_like_sql(&code) {
            Ok(()) => ValidationResult::pass(),
            Err(e) => ValidationResult::fail(format!("sql syntax error: {e}")),
        }
    }
}

struct SqlSafe {
    denylist: Vec<String>,
}

impl SqlSafe {
    fn from_params(params: &Map<String, Value>) -> Self {
        let denylist = params
            .get("denylist")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_uppercase).collect())
            .unwrap_or_else(|| vec!["DROP".to_string(), "DELETE".to_string(), "TRUNCATE".to_string()]);
        Self { denylist }
    }
}

#[async_trait]
impl Validator for SqlSafe {
    fn name(&self) -> &str {
        "sql_safe"
    }

    async fn validate(&self, response: &ProviderResponse, _ctx: &ValidationContext) -> ValidationResult {
        let text = primary_text(response);
        let upper = strip_markdown_fence(&text).to_uppercase();
        let hits: Vec<&String> = self.denylist.iter().filter(|kw| upper.contains(kw.as_str())).collect();
        if hits.is_empty() {
            ValidationResult::pass()
        } else {
            ValidationResult::fail(format!(
                "sql contains denylisted statement(s): {}",
                hits.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
            ))
        }
    }
}

// ---------------------------------------------------------------------
// openapi_spec

struct OpenApiSpec;

#[async_trait]
impl Validator for OpenApiSpec {
    fn name(&self) -> &str {
        "openapi_spec"
    }

    async fn validate(&self, response: &ProviderResponse, _ctx: &ValidationContext) -> ValidationResult {
        let text = primary_text(response);
        let parsed: Value = match serde_json::from_str(text.trim()) {
            Ok(v) => v,
            Err(e) => return ValidationResult::fail(format!("content is not valid JSON: {e}")),
        };
        let has_paths = parsed.get("paths").is_some_and(Value::is_object);
        let has_version = parsed.get("swagger").is_some() || parsed.get("openapi").is_some();
        if has_paths && has_version {
            ValidationResult::pass()
        } else if !has_version {
            ValidationResult::fail("document is missing `swagger` or `openapi` version field")
        } else {
            ValidationResult::fail("document is missing a `paths` object")
        }
    }
}

// ---------------------------------------------------------------------
// ai_contradiction_check / agent_task
//
// AI-assisted validators (§4.3): they do not judge the response
// themselves, they ask another model to. The capability to do that — a
// recursive `make_request` call — arrives through `ValidationContext`,
// never as a raw HTTP client (§9 Design Notes, "Recursive LLM calls from
// validators"). The recursion guard lives in the context too: depth is
// threaded through, not tracked in module-level state.

/// Mandatory JSON envelope an AI-assisted validator's own model call must
/// return (§4.3). Parsing failure is itself a validation failure, not an
/// error the validator throws.
#[derive(serde::Deserialize)]
struct AiVerdictEnvelope {
    validation_passed: bool,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    suggestions: Vec<String>,
}

/// Builds the validator's own `CallConfig`, drives it through the injected
/// `llm_caller`, and folds the result (success, refusal, or malformed
/// envelope) into a `ValidationResult`. Shared by both AI-assisted
/// built-ins below.
async fn run_ai_envelope(ctx: &ValidationContext, model: &str, prompt: String, validator_name: &str) -> ValidationResult {
    let Some(caller) = ctx.llm_caller.as_ref() else {
        return ValidationResult::fail(format!(
            "{validator_name} requires an injected llm_caller but none was provided for this call"
        ));
    };

    if ctx.depth + 1 > ctx.recursion_depth_limit {
        return ValidationResult::fail(format!(
            "{validator_name} recursion depth limit ({}) exceeded at depth {}",
            ctx.recursion_depth_limit,
            ctx.depth + 1
        ));
    }

    let config = crate::model::CallConfig {
        model: model.to_string(),
        messages: vec![],
        question: Some(prompt),
        response_format: Some(crate::model::ResponseFormat {
            kind: crate::model::ResponseFormatKind::JsonObject,
        }),
        temperature: Some(0.0),
        max_tokens: None,
        stream: None,
        stop: None,
        validation: vec![],
        retry_config: crate::model::RetryConfig {
            max_attempts: 1,
            ..crate::model::RetryConfig::default()
        },
        mcp_config: None,
        wait_for_completion: true,
    };

    let response = match caller.call(config, ctx.depth + 1).await {
        Ok(r) => r,
        Err(e) => return ValidationResult::fail(format!("{validator_name} recursive call failed: {}", e.message)),
    };

    let text = response.primary_text();
    match serde_json::from_str::<AiVerdictEnvelope>(text.trim()) {
        Ok(envelope) if envelope.validation_passed => ValidationResult::pass()
            .with_confidence(envelope.confidence)
            .with_suggestions(envelope.suggestions),
        Ok(envelope) => {
            let reasoning = if envelope.reasoning.is_empty() {
                format!("{validator_name} verdict: validation_passed=false")
            } else {
                envelope.reasoning
            };
            ValidationResult::fail(reasoning)
                .with_confidence(envelope.confidence)
                .with_suggestions(envelope.suggestions)
        }
        Err(e) => ValidationResult::fail(format!(
            "{validator_name} judge model did not return the mandatory JSON envelope: {e}"
        )),
    }
}

struct AiContradictionCheck {
    model: String,
    prompt_template: String,
}

const DEFAULT_CONTRADICTION_TEMPLATE: &str = "You are checking a draft response for contradictions against the \
original request. Original request: {ORIGINAL_USER_PROMPT}\n\nDraft response to check: {TEXT_TO_VALIDATE}\n\n\
Does the draft response contradict, ignore, or fail to address the original request? Respond with ONLY a JSON \
object of the shape {\"validation_passed\": bool, \"confidence\": number between 0 and 1, \"reasoning\": string, \
\"suggestions\": [string]}. Set validation_passed to true only if the draft does NOT contradict the request.";

impl AiContradictionCheck {
    fn from_params(params: &Map<String, Value>) -> Result<Self, crate::errors::GatewayError> {
        let model = str_param(params, "model")
            .ok_or_else(|| crate::errors::GatewayError::bad_request("ai_contradiction_check requires `model`"))?
            .to_string();
        let prompt_template = str_param(params, "prompt_template").unwrap_or(DEFAULT_CONTRADICTION_TEMPLATE).to_string();
        Ok(Self { model, prompt_template })
    }
}

#[async_trait]
impl Validator for AiContradictionCheck {
    fn name(&self) -> &str {
        "ai_contradiction_check"
    }

    async fn validate(&self, response: &ProviderResponse, ctx: &ValidationContext) -> ValidationResult {
        let text = primary_text(response);
        let prompt = ctx.substitute(&self.prompt_template, &text);
        run_ai_envelope(ctx, &self.model, prompt, "ai_contradiction_check").await
    }
}

struct AgentTask {
    model: String,
    prompt_template: String,
}

const DEFAULT_AGENT_TASK_TEMPLATE: &str = "{TASK_DESCRIPTION}\n\nOriginal request: {ORIGINAL_USER_PROMPT}\n\n\
Text to evaluate: {TEXT_TO_VALIDATE}\n\nRespond with ONLY a JSON object of the shape {\"validation_passed\": bool, \
\"confidence\": number between 0 and 1, \"reasoning\": string, \"suggestions\": [string]}.";

impl AgentTask {
    fn from_params(params: &Map<String, Value>) -> Result<Self, crate::errors::GatewayError> {
        let model = str_param(params, "model")
            .ok_or_else(|| crate::errors::GatewayError::bad_request("agent_task requires `model`"))?
            .to_string();
        let task_description = str_param(params, "task_description")
            .ok_or_else(|| crate::errors::GatewayError::bad_request("agent_task requires `task_description`"))?;
        let prompt_template = str_param(params, "prompt_template")
            .unwrap_or(DEFAULT_AGENT_TASK_TEMPLATE)
            .replace("{TASK_DESCRIPTION}", task_description);
        Ok(Self { model, prompt_template })
    }
}

#[async_trait]
impl Validator for AgentTask {
    fn name(&self) -> &str {
        "agent_task"
    }

    async fn validate(&self, response: &ProviderResponse, ctx: &ValidationContext) -> ValidationResult {
        let text = primary_text(response);
        let prompt = ctx.substitute(&self.prompt_template, &text);
        run_ai_envelope(ctx, &self.model, prompt, "agent_task").await
    }
}

#[cfg(test)]
mod tests;
