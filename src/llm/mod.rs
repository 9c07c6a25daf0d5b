//! LLM Provider Clients
//!
//! A small provider abstraction used by the optional LLM-backed variants of
//! the planning, extraction and summarization agents.
//!
//! Enable providers via Cargo features:
//! - `ollama` - Local Ollama server (default)
//! - `openai` - OpenAI API and compatible endpoints

/// Core LLM client trait and provider selection.
pub mod client;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "openai")]
pub mod openai;

pub use client::{extract_json_block, LLMClient, Provider};
