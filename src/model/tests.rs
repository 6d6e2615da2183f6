use super::*;

#[test]
fn primary_text_from_plain_string() {
    let m = Message::user("hello");
    assert_eq!(m.primary_text(), "hello");
}

#[test]
fn primary_text_concatenates_text_parts_and_skips_others() {
    let m = Message {
        role: Role::User,
        content: Content::Parts(vec![
            Part::Text { text: "a".into() },
            Part::ImageUrl {
                image_url: ImageRef { url: "data:...".into() },
            },
            Part::Text { text: "b".into() },
        ]),
    };
    assert_eq!(m.primary_text(), "ab");
}

#[test]
fn validation_result_fail_requires_nonempty_reasoning_by_debug_assert() {
    let r = ValidationResult::fail("bad shape");
    assert!(!r.valid);
    assert!(!r.reasoning.is_empty());
}

#[test]
fn retry_config_defaults_are_sane() {
    let cfg = RetryConfig::default();
    assert_eq!(cfg.max_attempts, 3);
    assert!(cfg.use_jitter);
    assert!(cfg.validate().is_ok());
}

#[test]
fn retry_config_rejects_tool_threshold_at_or_after_human_threshold() {
    let cfg = RetryConfig {
        max_attempts_before_tool_use: Some(3),
        max_attempts_before_human: Some(3),
        ..Default::default()
    };
    assert!(cfg.validate().is_err());

    let cfg_ok = RetryConfig {
        max_attempts_before_tool_use: Some(2),
        max_attempts_before_human: Some(3),
        ..Default::default()
    };
    assert!(cfg_ok.validate().is_ok());
}

#[test]
fn call_config_requires_exactly_one_of_messages_or_question() {
    let both = CallConfig {
        model: "openai/gpt-4o-mini".into(),
        messages: vec![Message::user("hi")],
        question: Some("hi".into()),
        response_format: None,
        temperature: None,
        max_tokens: None,
        stream: None,
        stop: None,
        validation: vec![],
        retry_config: RetryConfig::default(),
        mcp_config: None,
        wait_for_completion: true,
    };
    assert!(both.validate_shape().is_err());

    let neither = CallConfig {
        question: None,
        messages: vec![],
        ..both.clone()
    };
    assert!(neither.validate_shape().is_err());

    let ok = CallConfig {
        question: None,
        messages: vec![Message::user("hi")],
        ..both
    };
    assert!(ok.validate_shape().is_ok());
}

#[test]
fn call_config_rejects_empty_model() {
    let cfg = CallConfig {
        model: "  ".into(),
        messages: vec![Message::user("hi")],
        question: None,
        response_format: None,
        temperature: None,
        max_tokens: None,
        stream: None,
        stop: None,
        validation: vec![],
        retry_config: RetryConfig::default(),
        mcp_config: None,
        wait_for_completion: true,
    };
    assert!(cfg.validate_shape().is_err());
}

#[test]
fn task_status_transitions_follow_the_dag() {
    assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Running));
    assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Cancelled));
    assert!(TaskStatus::Running.can_transition_to(TaskStatus::Completed));
    assert!(TaskStatus::Running.can_transition_to(TaskStatus::Failed));
    assert!(TaskStatus::Running.can_transition_to(TaskStatus::Cancelled));
    assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Running));
    assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
}

#[test]
fn task_status_round_trips_through_display_and_from_str() {
    for s in [
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ] {
        let rendered = s.to_string();
        let parsed: TaskStatus = rendered.parse().unwrap();
        assert_eq!(parsed, s);
    }
}

#[test]
fn provider_response_primary_text_reads_first_choice() {
    let resp = ProviderResponse {
        id: "r1".into(),
        created_ts: 0.0,
        model: "cli/default".into(),
        choices: vec![Choice {
            index: 0,
            message: Message::user("ignored-role-but-text-read"),
            finish_reason: "stop".into(),
        }],
        usage: Usage::default(),
    };
    assert_eq!(resp.primary_text(), "ignored-role-but-text-read");
}

#[test]
fn validator_spec_deserializes_type_field_into_kind() {
    let spec: ValidatorSpec = serde_json::from_str(r#"{"type": "length", "params": {"min_length": 1}}"#).unwrap();
    assert_eq!(spec.kind, "length");
    assert_eq!(spec.params.get("min_length").unwrap(), 1);
}
