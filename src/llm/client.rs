//! LLM client abstraction and provider selection
//!
//! Every agent in the crate has a deterministic mode, so an LLM is optional.
//! When `[llm.provider]` is configured, planning, entity extraction and report
//! synthesis can delegate to it:
//! - **Ollama**: local inference (default feature)
//! - **OpenAI**: OpenAI API and compatible endpoints (`openai` feature)

use crate::types::{AppError, Result};
use crate::utils::toml_config::{LlmProviderConfig, SageConfig};
use async_trait::async_trait;
use std::sync::Arc;

/// Generic LLM client trait for provider abstraction
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate a completion from a prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate with system prompt
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;
}

/// Provider enum for runtime selection
#[derive(Debug, Clone)]
pub enum Provider {
    /// OpenAI API provider (including compatible APIs)
    OpenAI {
        api_key: String,
        api_base: String,
        model: String,
    },

    /// Ollama local LLM provider
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::Ollama {
    ///     base_url: "http://localhost:11434".to_string(),
    ///     model: "llama3.2".to_string(),
    /// };
    /// ```
    Ollama { base_url: String, model: String },
}

impl Provider {
    /// Resolve the configured provider, reading API keys from the environment.
    pub fn from_config(config: &SageConfig) -> Result<Option<Self>> {
        let Some(provider) = &config.llm.provider else {
            return Ok(None);
        };
        let provider = match provider {
            LlmProviderConfig::Ollama { base_url, model } => Provider::Ollama {
                base_url: base_url.clone(),
                model: model.clone(),
            },
            LlmProviderConfig::OpenAI {
                api_key_env,
                api_base,
                model,
            } => Provider::OpenAI {
                api_key: config.resolve_env(api_key_env).ok_or_else(|| {
                    AppError::Configuration(format!("{} is not set", api_key_env))
                })?,
                api_base: api_base.clone(),
                model: model.clone(),
            },
        };
        Ok(Some(provider))
    }

    /// Create a client instance for this provider
    pub async fn create_client(&self) -> Result<Arc<dyn LLMClient>> {
        match self {
            #[cfg(feature = "openai")]
            Provider::OpenAI {
                api_key,
                api_base,
                model,
            } => Ok(Arc::new(super::openai::OpenAIClient::new(
                api_key.clone(),
                api_base.clone(),
                model.clone(),
            ))),
            #[cfg(feature = "ollama")]
            Provider::Ollama { base_url, model } => Ok(Arc::new(
                super::ollama::OllamaClient::new(base_url.clone(), model.clone()).await?,
            )),
            #[allow(unreachable_patterns)]
            other => Err(AppError::Configuration(format!(
                "{} support is not compiled in; enable the `{}` feature",
                other.name(),
                other.name().to_lowercase()
            ))),
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAI { .. } => "OpenAI",
            Provider::Ollama { .. } => "Ollama",
        }
    }
}

/// Pull the JSON payload out of a model reply that may wrap it in markdown
/// code fences or surround it with prose.
pub fn extract_json_block(reply: &str) -> &str {
    let trimmed = reply.trim();
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    let open = trimmed.find(|c: char| c == '[' || c == '{');
    let close = trimmed.rfind(|c: char| c == ']' || c == '}');
    match (open, close) {
        (Some(o), Some(c)) if c > o => &trimmed[o..=c],
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_fence() {
        let reply = "Here you go:\n```json\n[{\"a\": 1}]\n```\nThanks";
        assert_eq!(extract_json_block(reply), "[{\"a\": 1}]");
    }

    #[test]
    fn test_extract_json_from_prose() {
        let reply = "Sure! {\"topics\": [\"rnn\"]} hope that helps";
        assert_eq!(extract_json_block(reply), "{\"topics\": [\"rnn\"]}");
    }

    #[test]
    fn test_no_provider_configured() {
        let config = SageConfig::default();
        assert!(Provider::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_provider_name() {
        let ollama = Provider::Ollama {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
        };
        assert_eq!(ollama.name(), "Ollama");
    }
}
