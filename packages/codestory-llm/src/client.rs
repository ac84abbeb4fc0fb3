//! [`ChatModel`]: the provider-agnostic chat/embedding contract, plus a
//! retrying wrapper and a deterministic mock used by step tests.

use crate::error::{LlmError, Result};
use crate::reasoning::adjust_for_model;
use crate::request::{ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse};
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

/// Core trait for chat-based language models. Implementations handle the
/// specifics of converting messages, making the provider call, and parsing
/// the response; this crate handles reasoning-model parameter adjustment
/// and retry before the call ever reaches an implementation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat_raw(&self, request: &ChatRequest) -> Result<ChatResponse>;
    async fn embed_raw(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse>;
    async fn check_health(&self) -> bool;
}

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(250);

/// Retries rate-limit and transient errors with jittered exponential
/// backoff; authentication and invalid-request errors fail fast.
pub async fn chat_with_retry(model: &dyn ChatModel, request: ChatRequest) -> Result<ChatResponse> {
    // Reasoning-model adjustment is applied before every attempt by
    // rebuilding the request's wire params; implementations never see the
    // raw temperature/max_tokens pair for a reasoning model.
    let adjusted = apply_reasoning_adjustment(request);
    let mut last_err = None;
    for attempt in 0..DEFAULT_RETRY_ATTEMPTS {
        match model.chat_raw(&adjusted).await {
            Ok(resp) => return Ok(resp),
            Err(LlmError::Transient(msg)) => {
                last_err = Some(LlmError::Transient(msg));
            }
            Err(LlmError::RateLimited) => {
                last_err = Some(LlmError::RateLimited);
            }
            Err(other) => return Err(other),
        }
        if attempt + 1 < DEFAULT_RETRY_ATTEMPTS {
            let jitter_ms = rand::thread_rng().gen_range(0..100);
            let backoff = BASE_BACKOFF * 2u32.pow(attempt) + Duration::from_millis(jitter_ms);
            debug!(attempt, ?backoff, "retrying LLM call after transient failure");
            tokio::time::sleep(backoff).await;
        }
    }
    warn!("LLM call exhausted retries");
    Err(last_err.unwrap_or(LlmError::RateLimited))
}

/// Rewrites a request's parameters per the reasoning-model rule without
/// mutating the caller's original `ChatRequest`.
fn apply_reasoning_adjustment(request: ChatRequest) -> ChatRequest {
    let outbound = adjust_for_model(&request.model, &request.params);
    let mut params = crate::request::ChatParams {
        max_tokens: outbound.max_tokens,
        temperature: outbound.temperature,
        other: outbound.other,
    };
    if let Some(max_completion_tokens) = outbound.max_completion_tokens {
        params
            .other
            .insert("max_completion_tokens".into(), max_completion_tokens.into());
    }
    ChatRequest {
        messages: request.messages,
        model: request.model,
        params,
    }
}

/// Deterministic in-process chat model for tests: echoes a synthetic
/// summary derived from the last user message, with no network calls.
pub struct MockChatModel {
    pub fail_times: std::sync::atomic::AtomicU32,
}

impl MockChatModel {
    pub fn new() -> Self {
        Self {
            fail_times: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn fail_next(&self, n: u32) {
        self.fail_times.store(n, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Default for MockChatModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn chat_raw(&self, request: &ChatRequest) -> Result<ChatResponse> {
        use std::sync::atomic::Ordering;
        let remaining = self.fail_times.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_times.store(remaining - 1, Ordering::SeqCst);
            return Err(LlmError::Transient("mock transient failure".into()));
        }
        let last = request
            .messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or("");
        let summary = format!("Summary of: {}", last.chars().take(80).collect::<String>());
        Ok(ChatResponse {
            message: crate::request::ChatMessage {
                role: crate::request::Role::Assistant,
                content: summary,
            },
            prompt_tokens: last.split_whitespace().count() as u64,
            completion_tokens: 16,
        })
    }

    async fn embed_raw(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse> {
        let vectors = request
            .inputs
            .iter()
            .map(|text| {
                let hash = text.bytes().fold(0u32, |acc, b| acc.wrapping_add(b as u32));
                vec![(hash % 997) as f32 / 997.0, (hash % 13) as f32 / 13.0]
            })
            .collect();
        Ok(EmbeddingResponse { vectors })
    }

    async fn check_health(&self) -> bool {
        true
    }
}
