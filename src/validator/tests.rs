use super::*;
use crate::model::{Choice, Message, ProviderResponse, Usage};

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
        original_user_prompt: "prompt".into(),
        messages: vec![],
        llm_caller: None,
        depth: 0,
        recursion_depth_limit: 3,
    }
}

#[tokio::test]
async fn resolve_response_not_empty() {
    let registry = ValidatorRegistry::with_builtins();
    let spec = ValidatorSpec::new("response_not_empty");
    let validator = registry.resolve(&spec).expect("resolves");
    let result = validator.validate(&response_with_text("hello"), &ctx()).await;
    assert!(result.valid);

    let result = validator.validate(&response_with_text("   "), &ctx()).await;
    assert!(!result.valid);
    assert!(!result.reasoning.is_empty());
}

#[test]
fn resolve_unknown_validator_is_bad_request() {
    let registry = ValidatorRegistry::with_builtins();
    let spec = ValidatorSpec::new("totally_unknown_validator");
    let err = registry.resolve(&spec).unwrap_err();
    assert_eq!(err.kind, crate::errors::ErrorKind::BadRequest);
}

#[test]
fn register_duplicate_name_fails() {
    let registry = ValidatorRegistry::empty();
    let factory: super::ValidatorFactory = Arc::new(|_| Ok(Arc::new(DummyValidator) as Arc<dyn Validator>));
    registry.register("dup", factory.clone()).expect("first registration succeeds");
    let err = registry.register("dup", factory).unwrap_err();
    assert_eq!(err.kind, crate::errors::ErrorKind::BadRequest);
}

struct DummyValidator;

#[async_trait::async_trait]
impl Validator for DummyValidator {
    fn name(&self) -> &str {
        "dummy"
    }

    async fn validate(&self, _response: &ProviderResponse, _ctx: &ValidationContext) -> ValidationResult {
        ValidationResult::pass()
    }
}

#[test]
fn substitute_replaces_all_placeholders() {
    let mut c = ctx();
    c.original_user_prompt = "what is 2+2?".into();
    c.attempt = 4;
    let out = c.substitute("Q={ORIGINAL_USER_PROMPT} A={TEXT_TO_VALIDATE} N={ATTEMPT}", "4");
    assert_eq!(out, "Q=what is 2+2? A=4 N=4");
}
