use std::env;
use std::sync::Arc;

use anyhow::Context;
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::{config::OpenAIConfig, Client as AsyncOpenAiClient};
use async_trait::async_trait;
use tracing::instrument;

use crate::config::AppConfig;

pub type SharedLlmClient = Arc<dyn LlmClient>;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one chat completion. `system` is the specialist's persona; an empty
    /// string falls back to the client's configured default.
    async fn complete(&self, system: &str, prompt: &str) -> anyhow::Result<String>;
}

/// Offline stand-in used when no API key is configured.
#[derive(Debug, Default, Clone)]
pub struct EchoLlmClient;

#[async_trait]
impl LlmClient for EchoLlmClient {
    async fn complete(&self, _system: &str, prompt: &str) -> anyhow::Result<String> {
        Ok(format!(
            "[respuesta sin modelo]\nRecibí:\n{prompt}\nConfigura OPENAI_API_KEY para respuestas reales."
        ))
    }
}

impl EchoLlmClient {
    pub fn shared() -> SharedLlmClient {
        Arc::new(Self)
    }
}

/// OpenAI-compatible client that can point at OpenAI, vLLM, or any HTTP-compatible backend.
pub struct OpenAiLlmClient {
    client: AsyncOpenAiClient<OpenAIConfig>,
    model: String,
    system_prompt: String,
}

impl OpenAiLlmClient {
    const DEFAULT_MODEL: &'static str = "gpt-4o-mini";
    const DEFAULT_SYSTEM_PROMPT: &'static str =
        "Eres Folio, un asistente de escritorio. Responde de forma clara y concisa.";

    pub fn shared_from_env() -> anyhow::Result<SharedLlmClient> {
        let client = Self::from_env()?;
        Ok(Arc::new(client))
    }

    fn from_env() -> anyhow::Result<Self> {
        let config = Self::build_config_from_env()?;
        let model = AppConfig::read_env(&["FOLIO_LLM_MODEL"])
            .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string());
        let system_prompt = AppConfig::read_env(&["FOLIO_SYSTEM_PROMPT"])
            .unwrap_or_else(|| Self::DEFAULT_SYSTEM_PROMPT.to_string());

        Ok(Self {
            client: AsyncOpenAiClient::with_config(config),
            model,
            system_prompt,
        })
    }

    fn build_config_from_env() -> anyhow::Result<OpenAIConfig> {
        let api_key = env::var("OPENAI_API_KEY")
            .or_else(|_| env::var("FOLIO_OPENAI_API_KEY"))
            .context("Set OPENAI_API_KEY (or FOLIO_OPENAI_API_KEY) to use the OpenAI client")?;

        let mut config = OpenAIConfig::new().with_api_key(api_key);

        if let Some(base_url) =
            AppConfig::read_env(&["OPENAI_BASE_URL", "FOLIO_OPENAI_BASE_URL"])
        {
            config = config.with_api_base(base_url);
        }

        Ok(config)
    }

    #[instrument(level = "debug", skip_all, fields(model = %self.model))]
    async fn chat(&self, system: &str, prompt: &str) -> anyhow::Result<String> {
        let system = if system.trim().is_empty() {
            self.system_prompt.as_str()
        } else {
            system
        };

        let system_message = ChatCompletionRequestSystemMessageArgs::default()
            .content(system)
            .build()?;
        let user_message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(0.2)
            .messages(vec![system_message.into(), user_message.into()])
            .build()?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .context("chat completion request failed")?;
        let choice = response
            .choices
            .first()
            .context("LLM response did not contain any choices")?;

        let output = choice
            .message
            .content
            .clone()
            .unwrap_or_else(|| String::from("[respuesta vacía]"));

        Ok(output)
    }
}

#[async_trait]
impl LlmClient for OpenAiLlmClient {
    async fn complete(&self, system: &str, prompt: &str) -> anyhow::Result<String> {
        self.chat(system, prompt).await
    }
}

/// Attempt to build an OpenAI-compatible client, optionally falling back to the echo client.
pub fn build_llm_client_from_env(default_to_echo: bool) -> anyhow::Result<SharedLlmClient> {
    match OpenAiLlmClient::shared_from_env() {
        Ok(client) => Ok(client),
        Err(err) if default_to_echo => {
            tracing::warn!(?err, "Falling back to EchoLlmClient");
            Ok(EchoLlmClient::shared())
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_client_includes_prompt() {
        let client = EchoLlmClient::shared();
        let output = client
            .complete("sistema", "¿qué dice el documento?")
            .await
            .expect("echo never fails");
        assert!(output.contains("¿qué dice el documento?"));
    }
}
