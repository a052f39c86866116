//! ARLearn Core Library
//!
//! This crate answers questions about labeled 3D models by combining:
//! - Dense passage retrieval (vector store, cosine similarity)
//! - Entity graph facts (tolerant name resolution, label inference)
//! - Reciprocal Rank Fusion and bounded context assembly
//! - A hybrid pipeline with parallel fan-out, timeouts and cancellation
//! - Storage (SQLite with versioned migrations)
//! - LLM integration (OpenAI-compatible embeddings and chat)

pub mod config;
pub mod error;
pub mod graph;
pub mod llm;
pub mod pipeline;
pub mod retrieval;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::pipeline::{AnswerRequest, HybridAnswerer, INSUFFICIENT_CONTEXT_ANSWER};
}
