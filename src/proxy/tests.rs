use super::*;

#[test]
fn model_selector_regex_rejects_shell_metacharacters() {
    assert!(MODEL_SELECTOR_RE.is_match("claude-3.5-sonnet"));
    assert!(MODEL_SELECTOR_RE.is_match("default"));
    assert!(!MODEL_SELECTOR_RE.is_match("default; rm -rf /"));
    assert!(!MODEL_SELECTOR_RE.is_match("$(whoami)"));
    assert!(!MODEL_SELECTOR_RE.is_match("a b"));
}

#[test]
fn build_argv_omits_system_flag_when_no_system_message() {
    let argv = build_argv("default", "hello", None, std::path::Path::new("/tmp/x/.tools.json"));
    assert!(argv.contains(&"--prompt".to_string()));
    assert!(argv.contains(&"hello".to_string()));
    assert!(!argv.contains(&"--system".to_string()));
}

#[test]
fn build_argv_includes_system_flag_when_present() {
    let argv = build_argv("default", "hello", Some("be terse"), std::path::Path::new("/tmp/x/.tools.json"));
    let idx = argv.iter().position(|a| a == "--system").expect("--system present");
    assert_eq!(argv[idx + 1], "be terse");
}

#[test]
fn scratch_dir_is_removed_on_drop() {
    let scratch = ScratchDir::acquire().unwrap();
    let path = scratch.path().to_path_buf();
    assert!(path.exists());
    drop(scratch);
    assert!(!path.exists());
}

#[test]
fn write_tool_config_writes_requested_mcp_config_verbatim() {
    let scratch = ScratchDir::acquire().unwrap();
    let config = serde_json::json!({ "servers": { "search": { "command": "search-cli", "args": [], "env": {}, "description": "d", "version": "1" } } });
    write_tool_config(scratch.path(), Some(&config)).unwrap();
    let written = std::fs::read_to_string(scratch.path().join(TOOL_CONFIG_FILENAME)).unwrap();
    let parsed: Value = serde_json::from_str(&written).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn write_tool_config_defaults_to_empty_servers_map() {
    let scratch = ScratchDir::acquire().unwrap();
    write_tool_config(scratch.path(), None).unwrap();
    let written = std::fs::read_to_string(scratch.path().join(TOOL_CONFIG_FILENAME)).unwrap();
    let parsed: Value = serde_json::from_str(&written).unwrap();
    assert_eq!(parsed, serde_json::json!({ "servers": {} }));
}

#[test]
fn stream_accumulator_prefers_final_result_over_accumulated_chunks() {
    let mut acc = StreamAccumulator::default();
    acc.apply_line(r#"{"type":"text_chunk","text":"hel"}"#);
    acc.apply_line(r#"{"type":"text_chunk","text":"lo"}"#);
    acc.apply_line(r#"{"type":"final_result","text":"goodbye"}"#);
    assert_eq!(acc.result_text(), "goodbye");
}

#[test]
fn stream_accumulator_falls_back_to_chunks_without_final_result() {
    let mut acc = StreamAccumulator::default();
    acc.apply_line(r#"{"type":"text_chunk","text":"hel"}"#);
    acc.apply_line(r#"{"type":"text_chunk","text":"lo"}"#);
    assert_eq!(acc.result_text(), "hello");
}

#[test]
fn stream_accumulator_tolerates_interleaved_malformed_and_unknown_lines() {
    let mut acc = StreamAccumulator::default();
    acc.apply_line("not json at all");
    acc.apply_line(r#"{"type":"status_update","message":"thinking"}"#);
    acc.apply_line(r#"{"type":"some_future_event","payload":1}"#);
    acc.apply_line("{broken");
    acc.apply_line(r#"{"type":"final_result","text":"ok"}"#);
    assert_eq!(acc.result_text(), "ok");
}

#[test]
fn compose_response_maps_zero_exit_to_stop_finish_reason() {
    let outcome = CliOutcome {
        text: "hi".to_string(),
        exit_code: Some(0),
        stderr_tail: String::new(),
    };
    let response = compose_response("cli/default", outcome).unwrap();
    assert_eq!(response.choices[0].finish_reason, "stop");
    assert_eq!(response.primary_text(), "hi");
}

#[test]
fn compose_response_maps_nonzero_exit_to_provider_unavailable() {
    let outcome = CliOutcome {
        text: String::new(),
        exit_code: Some(1),
        stderr_tail: "boom".to_string(),
    };
    let err = compose_response("cli/default", outcome).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ProviderUnavailable);
}
