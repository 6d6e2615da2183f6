//! Message normalizer (§4.1): canonicalizes a caller's `CallConfig` into the
//! shape every downstream component expects. Pure — no I/O, no suspension.

use crate::errors::GatewayError;
use crate::model::{CallConfig, Content, Message, Part, ResponseFormatKind, Role, ValidatorSpec};

const JSON_MODE_SYSTEM_HINT: &str =
    "Respond with a single valid JSON object and nothing else — no prose, no markdown fences.";

/// Outcome of normalization: the canonical config plus whether the request
/// targets a route that cannot receive multimodal content (the orchestrator
/// uses this to fail fast per §4.1's CLI-proxy multimodal rule).
pub struct Normalized {
    pub config: CallConfig,
    pub multimodal_unsupported_for_cli: bool,
}

/// `normalize(CallConfig) -> CallConfig'` (§4.1). Idempotent: normalizing an
/// already-normalized config returns it unchanged (Testable Property 1, §8).
pub fn normalize(config: &CallConfig) -> Result<Normalized, GatewayError> {
    let mut cfg = config.clone();

    resolve_question_shorthand(&mut cfg)?;
    validate_roles(&cfg)?;
    let multimodal_unsupported_for_cli = inject_json_mode_hint(&mut cfg);
    check_local_image_refs(&cfg)?;

    Ok(Normalized {
        config: cfg,
        multimodal_unsupported_for_cli,
    })
}

fn resolve_question_shorthand(cfg: &mut CallConfig) -> Result<(), GatewayError> {
    match (cfg.question.take(), cfg.messages.is_empty()) {
        (Some(q), true) => {
            cfg.messages = vec![Message::user(q)];
            Ok(())
        }
        (Some(_), false) => Err(GatewayError::bad_request(
            "both `question` and `messages` were supplied; exactly one is required",
        )),
        (None, true) => Err(GatewayError::bad_request(
            "neither `question` nor `messages` was supplied",
        )),
        (None, false) => Ok(()),
    }
}

fn validate_roles(cfg: &CallConfig) -> Result<(), GatewayError> {
    for msg in &cfg.messages {
        // Role is a closed enum (System/User/Assistant/Tool) so any value
        // that deserialized successfully is already valid; this guards
        // against configs built programmatically outside deserialization.
        let _ = msg.role;
    }
    Ok(())
}

/// Ensures a system message instructing JSON-only output exists when
/// `response_format.kind == json_object`; amends an existing one or prepends
/// a new one. Returns whether this request targets a CLI-proxy-incompatible
/// multimodal shape (checked by the caller after routing).
fn inject_json_mode_hint(cfg: &mut CallConfig) -> bool {
    let wants_json = matches!(
        cfg.response_format.as_ref().map(|f| f.kind),
        Some(ResponseFormatKind::JsonObject)
    );
    if wants_json {
        if let Some(first) = cfg.messages.first_mut()
            && first.role == Role::System
        {
            amend_system_message(first, JSON_MODE_SYSTEM_HINT);
        } else {
            cfg.messages.insert(0, Message::system(JSON_MODE_SYSTEM_HINT));
        }
    }
    has_multimodal_content(cfg)
}

fn amend_system_message(msg: &mut Message, hint: &str) {
    match &mut msg.content {
        Content::Text(s) => {
            if !s.contains(hint) {
                s.push_str("\n\n");
                s.push_str(hint);
            }
        }
        Content::Parts(parts) => {
            let already_present = parts
                .iter()
                .any(|p| matches!(p, Part::Text { text } if text.contains(hint)));
            if !already_present {
                parts.push(Part::Text { text: hint.to_string() });
            }
        }
    }
}

fn has_multimodal_content(cfg: &CallConfig) -> bool {
    cfg.messages.iter().any(|m| {
        matches!(&m.content, Content::Parts(parts) if parts.iter().any(|p| matches!(p, Part::ImageUrl { .. })))
    })
}

/// Local (non-URI, filesystem) `image_url` references must exist on disk;
/// actual base64 conversion is delegated to an external image-processing
/// collaborator (§4.1, §6) — this only validates reachability.
fn check_local_image_refs(cfg: &CallConfig) -> Result<(), GatewayError> {
    for msg in &cfg.messages {
        let Content::Parts(parts) = &msg.content else {
            continue;
        };
        for part in parts {
            let Part::ImageUrl { image_url } = part else {
                continue;
            };
            if is_local_path(&image_url.url) && !std::path::Path::new(&image_url.url).exists() {
                return Err(GatewayError::bad_request(format!(
                    "image reference is not reachable: {}",
                    image_url.url
                )));
            }
        }
    }
    Ok(())
}

fn is_local_path(url: &str) -> bool {
    !url.starts_with("http://") && !url.starts_with("https://") && !url.starts_with("data:")
}

/// Injects a `json_string` validator at the front of `validation` when the
/// request asks for JSON mode and one isn't already present. Gated by
/// `Settings::auto_json_validator` (§9, Open Question 2); applied by the
/// orchestrator after normalization, since it depends on process settings
/// rather than being a pure function of the config alone.
pub fn maybe_inject_json_validator(cfg: &mut CallConfig, enabled: bool) {
    let wants_json = matches!(
        cfg.response_format.as_ref().map(|f| f.kind),
        Some(ResponseFormatKind::JsonObject)
    );
    if !enabled || !wants_json {
        return;
    }
    let already_present = cfg
        .validation
        .iter()
        .any(|v| v.kind == "json_string" || v.kind == "json");
    if !already_present {
        cfg.validation.insert(0, ValidatorSpec::new("json_string"));
    }
}
