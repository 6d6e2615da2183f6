use super::*;
use crate::model::{Choice, Message, ProviderResponse, Usage};
use crate::validator::ValidationContext;

fn response_with_text(text: &str) -> ProviderResponse {
    ProviderResponse {
        id: "resp-1".into(),
        created_ts: 0.0,
        model: "test".into(),
        choices: vec![Choice {
            index: 0,
            message: Message::user(text),
            finish_reason: "stop".into(),
        }],
        usage: Usage::default(),
    }
}

fn ctx() -> ValidationContext {
    ValidationContext {
        attempt: 1,
        original_user_prompt: String::new(),
        messages: vec![],
        llm_caller: None,
        depth: 0,
        recursion_depth_limit: 3,
    }
}

#[tokio::test]
async fn json_string_accepts_object_and_rejects_prose() {
    let v = JsonString::new("json_string");
    assert!(v.validate(&response_with_text(r#"{"a": 1}"#), &ctx()).await.valid);
    assert!(!v.validate(&response_with_text("not json"), &ctx()).await.valid);
}

#[tokio::test]
async fn field_present_checks_dot_path_and_expected_value() {
    let mut params = Map::new();
    params.insert("field_name".into(), Value::String("user.name".into()));
    let v = FieldPresent::from_params(&params).unwrap();
    let ok = response_with_text(r#"{"user": {"name": "ada"}}"#);
    assert!(v.validate(&ok, &ctx()).await.valid);

    let missing = response_with_text(r#"{"user": {}}"#);
    assert!(!v.validate(&missing, &ctx()).await.valid);

    let mut params = Map::new();
    params.insert("field_name".into(), Value::String("status".into()));
    params.insert("expected_value".into(), Value::String("ok".into()));
    let v = FieldPresent::from_params(&params).unwrap();
    assert!(v.validate(&response_with_text(r#"{"status": "ok"}"#), &ctx()).await.valid);
    assert!(!v.validate(&response_with_text(r#"{"status": "fail"}"#), &ctx()).await.valid);
}

#[tokio::test]
async fn length_enforces_min_and_max() {
    let mut params = Map::new();
    params.insert("min_length".into(), Value::from(3));
    params.insert("max_length".into(), Value::from(5));
    let v = Length::from_params(&params).unwrap();
    assert!(!v.validate(&response_with_text("ab"), &ctx()).await.valid);
    assert!(v.validate(&response_with_text("abcd"), &ctx()).await.valid);
    assert!(!v.validate(&response_with_text("abcdefg"), &ctx()).await.valid);
}

#[tokio::test]
async fn regex_full_match_vs_partial() {
    let mut params = Map::new();
    params.insert("pattern".into(), Value::String(r"\d+".into()));
    params.insert("full_match".into(), Value::from(false));
    let v = RegexMatch::from_params(&params).unwrap();
    assert!(v.validate(&response_with_text("order #42 shipped"), &ctx()).await.valid);

    let mut params = Map::new();
    params.insert("pattern".into(), Value::String(r"\d+".into()));
    let v = RegexMatch::from_params(&params).unwrap();
    assert!(!v.validate(&response_with_text("order #42 shipped"), &ctx()).await.valid);
    assert!(v.validate(&response_with_text("42"), &ctx()).await.valid);
}

#[tokio::test]
async fn contains_is_case_insensitive_by_default() {
    let mut params = Map::new();
    params.insert("substring".into(), Value::String("DONE".into()));
    let v = Contains::from_params(&params).unwrap();
    assert!(v.validate(&response_with_text("task is done."), &ctx()).await.valid);
}

#[tokio::test]
async fn code_syntax_catches_unbalanced_delimiters() {
    let v = CodeSyntax::python();
    assert!(v.validate(&response_with_text("def f():\n    return (1 + 2)\n"), &ctx()).await.valid);
    assert!(!v.validate(&response_with_text("def f():\n    return (1 + 2\n"), &ctx()).await.valid);
}

#[tokio::test]
async fn schema_validator_checks_instance_against_document() {
    let mut params = Map::new();
    params.insert(
        "schema".into(),
        serde_json::json!({"type": "object", "required": ["name"], "properties": {"name": {"type": "string"}}}),
    );
    let v = SchemaValidator::from_params(&params).unwrap();
    assert!(v.validate(&response_with_text(r#"{"name": "ada"}"#), &ctx()).await.valid);
    assert!(!v.validate(&response_with_text(r#"{"age": 10}"#), &ctx()).await.valid);
}

#[tokio::test]
async fn sql_safe_flags_denylisted_statements_case_insensitively() {
    let v = SqlSafe::from_params(&Map::new());
    assert!(v.validate(&response_with_text("SELECT * FROM users"), &ctx()).await.valid);
    assert!(!v.validate(&response_with_text("drop table users"), &ctx()).await.valid);
}

#[tokio::test]
async fn openapi_spec_requires_version_and_paths() {
    let v = OpenApiSpec;
    let ok = response_with_text(r#"{"openapi": "3.0.0", "paths": {}}"#);
    assert!(v.validate(&ok, &ctx()).await.valid);
    let missing_paths = response_with_text(r#"{"openapi": "3.0.0"}"#);
    assert!(!v.validate(&missing_paths, &ctx()).await.valid);
}

struct StubCaller {
    envelope: &'static str,
}

#[async_trait::async_trait]
impl crate::validator::LlmCaller for StubCaller {
    async fn call(&self, _config: crate::model::CallConfig, _depth: u32) -> Result<ProviderResponse, crate::errors::GatewayError> {
        Ok(response_with_text(self.envelope))
    }
}

struct FailingCaller;

#[async_trait::async_trait]
impl crate::validator::LlmCaller for FailingCaller {
    async fn call(&self, _config: crate::model::CallConfig, _depth: u32) -> Result<ProviderResponse, crate::errors::GatewayError> {
        Err(crate::errors::GatewayError::new(crate::errors::ErrorKind::ProviderUnavailable, "judge model unreachable"))
    }
}

fn ctx_with_caller(caller: std::sync::Arc<dyn crate::validator::LlmCaller>) -> ValidationContext {
    ValidationContext {
        attempt: 1,
        original_user_prompt: "summarize the incident".into(),
        messages: vec![],
        llm_caller: Some(caller),
        depth: 0,
        recursion_depth_limit: 3,
    }
}

#[tokio::test]
async fn ai_contradiction_check_passes_on_true_envelope() {
    let mut params = Map::new();
    params.insert("model".into(), Value::String("judge/gpt".into()));
    let v = AiContradictionCheck::from_params(&params).unwrap();
    let caller: std::sync::Arc<dyn crate::validator::LlmCaller> = std::sync::Arc::new(StubCaller {
        envelope: r#"{"validation_passed": true, "confidence": 0.9, "reasoning": "consistent", "suggestions": []}"#,
    });
    let result = v.validate(&response_with_text("the incident is resolved"), &ctx_with_caller(caller)).await;
    assert!(result.valid);
    assert!((result.confidence - 0.9).abs() < 1e-9);
}

#[tokio::test]
async fn ai_contradiction_check_fails_on_false_envelope_with_reasoning() {
    let mut params = Map::new();
    params.insert("model".into(), Value::String("judge/gpt".into()));
    let v = AiContradictionCheck::from_params(&params).unwrap();
    let caller: std::sync::Arc<dyn crate::validator::LlmCaller> = std::sync::Arc::new(StubCaller {
        envelope: r#"{"validation_passed": false, "confidence": 0.2, "reasoning": "response claims the opposite of the request", "suggestions": ["re-check the root cause"]}"#,
    });
    let result = v.validate(&response_with_text("the incident was never an issue"), &ctx_with_caller(caller)).await;
    assert!(!result.valid);
    assert_eq!(result.reasoning, "response claims the opposite of the request");
    assert_eq!(result.suggestions, vec!["re-check the root cause".to_string()]);
}

#[tokio::test]
async fn ai_contradiction_check_fails_without_throwing_on_malformed_envelope() {
    let mut params = Map::new();
    params.insert("model".into(), Value::String("judge/gpt".into()));
    let v = AiContradictionCheck::from_params(&params).unwrap();
    let caller: std::sync::Arc<dyn crate::validator::LlmCaller> =
        std::sync::Arc::new(StubCaller { envelope: "not json at all" });
    let result = v.validate(&response_with_text("anything"), &ctx_with_caller(caller)).await;
    assert!(!result.valid);
    assert!(result.reasoning.contains("JSON envelope"));
}

#[tokio::test]
async fn ai_contradiction_check_fails_when_no_caller_injected() {
    let mut params = Map::new();
    params.insert("model".into(), Value::String("judge/gpt".into()));
    let v = AiContradictionCheck::from_params(&params).unwrap();
    let result = v.validate(&response_with_text("anything"), &ctx()).await;
    assert!(!result.valid);
    assert!(result.reasoning.contains("llm_caller"));
}

#[tokio::test]
async fn ai_contradiction_check_fails_on_recursion_depth_guard() {
    let mut params = Map::new();
    params.insert("model".into(), Value::String("judge/gpt".into()));
    let v = AiContradictionCheck::from_params(&params).unwrap();
    let caller: std::sync::Arc<dyn crate::validator::LlmCaller> = std::sync::Arc::new(StubCaller {
        envelope: r#"{"validation_passed": true, "confidence": 1.0, "reasoning": "", "suggestions": []}"#,
    });
    let mut ctx = ctx_with_caller(caller);
    ctx.depth = 3;
    ctx.recursion_depth_limit = 3;
    let result = v.validate(&response_with_text("anything"), &ctx).await;
    assert!(!result.valid);
    assert!(result.reasoning.contains("recursion depth"));
}

#[tokio::test]
async fn ai_contradiction_check_fails_when_recursive_call_errors() {
    let mut params = Map::new();
    params.insert("model".into(), Value::String("judge/gpt".into()));
    let v = AiContradictionCheck::from_params(&params).unwrap();
    let caller: std::sync::Arc<dyn crate::validator::LlmCaller> = std::sync::Arc::new(FailingCaller);
    let result = v.validate(&response_with_text("anything"), &ctx_with_caller(caller)).await;
    assert!(!result.valid);
    assert!(result.reasoning.contains("judge model unreachable"));
}

#[tokio::test]
async fn agent_task_requires_model_and_task_description() {
    let mut params = Map::new();
    assert!(AgentTask::from_params(&params).is_err());
    params.insert("model".into(), Value::String("judge/gpt".into()));
    assert!(AgentTask::from_params(&params).is_err());
    params.insert("task_description".into(), Value::String("check the tone is professional".into()));
    assert!(AgentTask::from_params(&params).is_ok());
}

#[tokio::test]
async fn agent_task_substitutes_task_description_into_template() {
    let mut params = Map::new();
    params.insert("model".into(), Value::String("judge/gpt".into()));
    params.insert("task_description".into(), Value::String("check the tone is professional".into()));
    let v = AgentTask::from_params(&params).unwrap();
    assert!(v.prompt_template.contains("check the tone is professional"));

    let caller: std::sync::Arc<dyn crate::validator::LlmCaller> = std::sync::Arc::new(StubCaller {
        envelope: r#"{"validation_passed": true, "confidence": 0.75, "reasoning": "", "suggestions": []}"#,
    });
    let result = v.validate(&response_with_text("Dear customer, ..."), &ctx_with_caller(caller)).await;
    assert!(result.valid);
}
