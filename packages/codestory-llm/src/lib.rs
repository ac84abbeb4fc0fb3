//! LLM Adapter: chat and embedding calls with retry and reasoning-model
//! parameter adjustment.

pub mod client;
pub mod error;
pub mod reasoning;
pub mod request;

pub use client::{chat_with_retry, ChatModel, MockChatModel};
pub use error::{LlmError, Result};
pub use reasoning::{adjust_for_model, is_reasoning_model, OutboundParams};
pub use request::{ChatMessage, ChatParams, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, Role};
