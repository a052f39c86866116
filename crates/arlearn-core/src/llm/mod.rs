//! Model services - embeddings and answer generation
//!
//! This module provides:
//! - `Embedder` / `TextGenerator` seams consumed by the pipeline
//! - An OpenAI-compatible HTTP client implementing both
//! - A deterministic offline embedder

mod client;
mod offline;
mod traits;
mod types;

pub use client::{LlmClient, LlmClientBuilder};
pub use offline::HashEmbedder;
pub use traits::{Embedder, TextGenerator};
pub use types::{
    ChatRequest, ChatResponse, Choice, EmbeddingRequest, EmbeddingResponse, FinishReason,
    LlmResponse, Message, MessageRole, Usage,
};
