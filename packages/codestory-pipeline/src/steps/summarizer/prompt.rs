//! Prompt specialization per node kind (spec 4.7.4): one system framing per
//! label, a shared shape for the user turn (context bullets, child
//! summaries, fenced content, the WHAT/WHY/HOW ask).

use codestory_core::domain::NodeLabel;
use codestory_llm::{ChatMessage, ChatRequest};

use super::content::NodeContent;

const DEFAULT_MAX_TOKENS: u64 = 500;
const DEFAULT_TEMPERATURE: f32 = 0.2;

fn system_prompt(label: NodeLabel) -> &'static str {
    match label {
        NodeLabel::Repository => {
            "You are documenting a software repository at a high level. Explain its \
             purpose, the problem it solves, and how its top-level parts fit together."
        }
        NodeLabel::Directory => {
            "You are documenting a directory within a software repository. Explain \
             its role based on the summaries of the files and subdirectories it contains."
        }
        NodeLabel::Module | NodeLabel::File => {
            "You are documenting a source file. Explain what it does, why it exists, \
             and how its main pieces work together."
        }
        NodeLabel::Class => {
            "You are documenting a class. Explain its responsibility, its place in \
             any inheritance hierarchy, and what its methods let callers do."
        }
        NodeLabel::Function | NodeLabel::Method => {
            "You are documenting a function or method. Explain what it computes, why \
             it is needed, and any non-obvious behavior in how it works."
        }
        _ => "You are documenting a piece of a software repository.",
    }
}

fn kind_label(label: NodeLabel) -> &'static str {
    match label {
        NodeLabel::Repository => "repository",
        NodeLabel::Directory => "directory",
        NodeLabel::Module => "module",
        NodeLabel::File => "file",
        NodeLabel::Class => "class",
        NodeLabel::Function => "function",
        NodeLabel::Method => "method",
        _ => "node",
    }
}

/// Builds the chat request for one node. `model` is the configured LLM
/// model name (reasoning-model parameter adjustment happens downstream in
/// [`codestory_llm::chat_with_retry`], not here).
pub fn build_request(model: &str, label: NodeLabel, identifier: &str, content: &NodeContent, max_tokens: Option<u64>) -> ChatRequest {
    let mut user = String::new();
    user.push_str(&format!("{} being documented: {identifier}\n\n", kind_label(label)));
    if !content.context.is_empty() {
        user.push_str("Context:\n");
        for bullet in &content.context {
            user.push_str(&format!("- {bullet}\n"));
        }
        user.push('\n');
    }
    user.push_str("Content:\n```\n");
    user.push_str(&content.content);
    user.push_str("\n```\n\n");
    user.push_str(
        "Write a 3-5 paragraph summary covering WHAT this is, WHY it exists, and HOW \
         it works. Do not reference other summaries or external documents.",
    );

    ChatRequest::new(
        model,
        vec![ChatMessage::system(system_prompt(label)), ChatMessage::user(user)],
    )
    .with_temperature(DEFAULT_TEMPERATURE)
    .with_max_tokens(max_tokens.unwrap_or(DEFAULT_MAX_TOKENS))
}
