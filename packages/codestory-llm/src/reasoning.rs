//! Reasoning-model parameter adjustment (testable property I-7).
//!
//! Detects "thinking" models (o1, o1-preview, o1-mini, ...) by name and
//! rewrites the outbound parameter set: `max_tokens` becomes
//! `max_completion_tokens` (only if the caller supplied one),
//! `temperature` is dropped unconditionally, everything else passes
//! through unchanged.

use crate::request::ChatParams;

const REASONING_TOKENS: &[&str] = &["o1", "o1-preview", "o1-mini"];

/// True if any dash-delimited component of `model` case-insensitively
/// matches a known reasoning-model token, e.g. `"openai-o1-preview-2024"`.
pub fn is_reasoning_model(model: &str) -> bool {
    model
        .split('-')
        .any(|component| REASONING_TOKENS.iter().any(|t| t.eq_ignore_ascii_case(component)))
        || REASONING_TOKENS.iter().any(|t| {
            // also match multi-token names like "o1-preview" appearing as a
            // contiguous dash run within a longer model string
            model.to_ascii_lowercase().contains(t)
        })
}

/// The params actually sent over the wire, after adjustment. Kept distinct
/// from `ChatParams` so "max_tokens is absent" and "max_completion_tokens is
/// absent" are both representable without a sentinel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutboundParams {
    pub max_tokens: Option<u64>,
    pub max_completion_tokens: Option<u64>,
    pub temperature: Option<f32>,
    pub other: serde_json::Map<String, serde_json::Value>,
}

pub fn adjust_for_model(model: &str, params: &ChatParams) -> OutboundParams {
    if is_reasoning_model(model) {
        OutboundParams {
            max_tokens: None,
            max_completion_tokens: params.max_tokens,
            temperature: None,
            other: params.other.clone(),
        }
    } else {
        OutboundParams {
            max_tokens: params.max_tokens,
            max_completion_tokens: None,
            temperature: params.temperature,
            other: params.other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ChatParams;

    #[test]
    fn detects_exact_and_embedded_reasoning_names() {
        assert!(is_reasoning_model("o1"));
        assert!(is_reasoning_model("o1-preview"));
        assert!(is_reasoning_model("o1-mini"));
        assert!(is_reasoning_model("openai-o1-preview-2024"));
        assert!(is_reasoning_model("O1-MINI"));
        assert!(!is_reasoning_model("gpt-4o"));
        assert!(!is_reasoning_model("claude-3-opus"));
    }

    #[test]
    fn reasoning_model_renames_max_tokens_and_drops_temperature() {
        let params = ChatParams {
            max_tokens: Some(20),
            temperature: Some(0.9),
            other: Default::default(),
        };
        let out = adjust_for_model("o1-preview", &params);
        assert_eq!(out.max_tokens, None);
        assert_eq!(out.max_completion_tokens, Some(20));
        assert_eq!(out.temperature, None);
    }

    #[test]
    fn reasoning_model_without_max_tokens_emits_neither() {
        let params = ChatParams {
            max_tokens: None,
            temperature: Some(0.9),
            other: Default::default(),
        };
        let out = adjust_for_model("o1", &params);
        assert_eq!(out.max_tokens, None);
        assert_eq!(out.max_completion_tokens, None);
    }

    #[test]
    fn non_reasoning_model_passes_through_unchanged() {
        let params = ChatParams {
            max_tokens: Some(20),
            temperature: Some(0.9),
            other: Default::default(),
        };
        let out = adjust_for_model("gpt-4o", &params);
        assert_eq!(out.max_tokens, Some(20));
        assert_eq!(out.temperature, Some(0.9));
        assert_eq!(out.max_completion_tokens, None);
    }

    #[test]
    fn other_params_always_pass_through() {
        let mut other = serde_json::Map::new();
        other.insert("top_p".into(), serde_json::json!(0.8));
        let params = ChatParams {
            max_tokens: Some(10),
            temperature: None,
            other: other.clone(),
        };
        let out = adjust_for_model("o1-mini", &params);
        assert_eq!(out.other, other);
    }
}
