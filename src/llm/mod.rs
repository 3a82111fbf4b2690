//! LLM integration module.
//!
//! Provides an OpenAI-compatible client for chat completions and embeddings,
//! and the prompts used to summarize tree nodes.

mod client;
mod prompts;

pub use client::{EmbeddingEndpoint, LlmClient, LlmResponse, Message, Role, TokenUsage};
pub use prompts::Prompts;
