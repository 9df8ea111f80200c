//! Cloud LLM access for text and vision calls.
//!
//! Credentials come from `ANTHROPIC_API_KEY` and `OPENAI_API_KEY` only. A
//! missing key is a configuration error raised when the client is built, before
//! any request is sent.

pub mod anthropic;
pub mod openai;

use crate::core::config::LlmConfig;
use crate::error::{DeckbenchError, Result};
use crate::utils::EncodedImage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cloud model provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    OpenAi,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Anthropic => "claude-opus-4-5-20251101",
            Provider::OpenAi => "gpt-5.2",
        }
    }

    pub fn api_key_var(self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = DeckbenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Provider::Anthropic),
            "openai" => Ok(Provider::OpenAi),
            other => Err(DeckbenchError::configuration(format!(
                "Unknown provider '{}' (expected anthropic or openai)",
                other
            ))),
        }
    }
}

/// Resolve the API key for `provider` through `lookup`. Blank values count as missing.
pub fn resolve_api_key_with<F>(provider: Provider, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let var = provider.api_key_var();
    lookup(var)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| DeckbenchError::configuration(format!("{} is not set. Export it: export {}='...'", var, var)))
}

pub fn resolve_api_key(provider: Provider) -> Result<String> {
    resolve_api_key_with(provider, |var| std::env::var(var).ok())
}

/// Text-only completion.
#[async_trait]
pub trait TextLlm: Send + Sync {
    /// Send a system and user prompt and return the trimmed answer.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
enum Transport {
    Anthropic(anthropic::MessagesClient),
    OpenAi(openai::ChatCompletions),
}

/// Client for one provider and model.
#[derive(Debug, Clone)]
pub struct LlmClient {
    provider: Provider,
    model: String,
    max_tokens: u32,
    transport: Transport,
}

impl LlmClient {
    /// Build a client with an explicit key and base URL.
    pub fn new(
        provider: Provider,
        model: Option<String>,
        max_tokens: u32,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let transport = match provider {
            Provider::Anthropic => Transport::Anthropic(anthropic::MessagesClient::new(base_url, api_key)),
            Provider::OpenAi => Transport::OpenAi(openai::ChatCompletions::new("openai", base_url, api_key)),
        };
        Self {
            provider,
            model: model.unwrap_or_else(|| provider.default_model().to_string()),
            max_tokens,
            transport,
        }
    }

    /// Build a client for `provider` reading its key from the environment.
    ///
    /// # Errors
    ///
    /// `Configuration` if the provider's API key variable is unset.
    pub fn for_provider(provider: Provider, model: Option<String>, config: &LlmConfig) -> Result<Self> {
        let api_key = resolve_api_key(provider)?;
        let base_url = match provider {
            Provider::Anthropic => &config.anthropic_base_url,
            Provider::OpenAi => &config.openai_base_url,
        };
        Ok(Self::new(provider, model, config.max_tokens, base_url.clone(), api_key))
    }

    /// Text client as configured in the `llm` section.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::for_provider(config.provider, config.model.clone(), config)
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask about one image.
    pub async fn describe_image(&self, system_prompt: &str, image: &EncodedImage, prompt: &str) -> Result<String> {
        match &self.transport {
            Transport::Anthropic(client) => {
                let request = anthropic::MessagesRequest {
                    model: &self.model,
                    max_tokens: self.max_tokens,
                    system: system_prompt,
                    messages: vec![anthropic::Message::user_blocks(vec![
                        anthropic::Block::image(image),
                        anthropic::Block::text(prompt),
                    ])],
                };
                client.create(&request).await
            }
            Transport::OpenAi(client) => {
                let request = openai::ChatRequest {
                    model: &self.model,
                    temperature: None,
                    max_completion_tokens: self.max_tokens,
                    messages: vec![
                        openai::ChatMessage::system(system_prompt),
                        openai::ChatMessage::user_parts(vec![
                            openai::ContentPart::image(image),
                            openai::ContentPart::text(prompt),
                        ]),
                    ],
                };
                client.create(&request).await
            }
        }
    }
}

#[async_trait]
impl TextLlm for LlmClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let text = match &self.transport {
            Transport::Anthropic(client) => {
                let request = anthropic::MessagesRequest {
                    model: &self.model,
                    max_tokens: self.max_tokens,
                    system: system_prompt,
                    messages: vec![anthropic::Message::user(user_prompt)],
                };
                client.create(&request).await?
            }
            Transport::OpenAi(client) => {
                let request = openai::ChatRequest {
                    model: &self.model,
                    temperature: Some(0.0),
                    max_completion_tokens: self.max_tokens,
                    messages: vec![
                        openai::ChatMessage::system(system_prompt),
                        openai::ChatMessage::user(user_prompt),
                    ],
                };
                client.create(&request).await?
            }
        };
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_serde_names() {
        assert_eq!(serde_json::to_string(&Provider::OpenAi).unwrap(), "\"openai\"");
        assert_eq!(
            serde_json::from_str::<Provider>("\"anthropic\"").unwrap(),
            Provider::Anthropic
        );
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert!("mistral".parse::<Provider>().is_err());
    }

    #[test]
    fn test_default_models() {
        assert_eq!(Provider::Anthropic.default_model(), "claude-opus-4-5-20251101");
        assert_eq!(Provider::OpenAi.default_model(), "gpt-5.2");
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let err = resolve_api_key_with(Provider::Anthropic, |_| None).unwrap_err();
        assert!(matches!(err, DeckbenchError::Configuration { .. }));
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));

        let blank = resolve_api_key_with(Provider::OpenAi, |_| Some("  ".into()));
        assert!(blank.is_err());
    }

    #[test]
    fn test_key_lookup_uses_provider_variable() {
        let key = resolve_api_key_with(Provider::OpenAi, |var| (var == "OPENAI_API_KEY").then(|| "sk-test".to_string()));
        assert_eq!(key.unwrap(), "sk-test");
    }

    #[test]
    fn test_client_defaults_model() {
        let client = LlmClient::new(Provider::OpenAi, None, 4096, "http://localhost", "k");
        assert_eq!(client.model(), "gpt-5.2");
        assert_eq!(client.provider(), Provider::OpenAi);
    }
}
