//! Translation through an edgequake-llm provider.
//!
//! One chat completion per page: a system message with the translation rules
//! ([`crate::prompts`]) and the page text as the user turn. There is no retry
//! loop here; a failed call fails the Translate stage and the next run picks
//! up at the same page.

use super::Translator;
use crate::error::{BoxError, IlluminateError};
use crate::prompts::translation_system_prompt;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Model used when a provider is named without a model.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Translator backed by an [`LLMProvider`].
#[derive(Clone)]
pub struct LlmTranslator {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl std::fmt::Debug for LlmTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmTranslator")
            .field("provider", &"<dyn LLMProvider>")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl LlmTranslator {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            temperature: 0.1,
            max_tokens: 4096,
        }
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.max_tokens = n.max(1);
        self
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, BoxError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(translation_system_prompt(source_language, target_language)),
            ChatMessage::user(text),
        ];
        let response = self.provider.chat(&messages, Some(&self.options())).await?;
        debug!(
            "Translated {} chars: {} input tokens, {} output tokens, {:?}",
            text.len(),
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(clean_translation(&response.content))
    }
}

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*\n(.*?)\n?```\s*$").expect("static regex"));

/// Strip a code fence wrapped around the whole reply.
pub fn clean_translation(reply: &str) -> String {
    match FENCE_RE.captures(reply) {
        Some(caps) => caps[1].to_string(),
        None => reply.trim_end().to_string(),
    }
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Named provider + model**: `ProviderFactory::create_llm_provider`
///    reads the matching API key from the environment.
/// 2. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 3. **OpenAI** when `OPENAI_API_KEY` is set.
/// 4. **Full auto-detection** via `ProviderFactory::from_env`.
pub fn resolve_provider(
    provider_name: Option<&str>,
    model: Option<&str>,
) -> Result<Arc<dyn LLMProvider>, IlluminateError> {
    if let Some(name) = provider_name {
        return create_provider(name, model.unwrap_or(DEFAULT_MODEL));
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", model.unwrap_or(DEFAULT_MODEL));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| IlluminateError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, IlluminateError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        IlluminateError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_is_stripped() {
        assert_eq!(clean_translation("```text\nIn the beginning\n```"), "In the beginning");
        assert_eq!(clean_translation("```\na\nb\n```\n"), "a\nb");
    }

    #[test]
    fn plain_reply_is_kept() {
        assert_eq!(clean_translation("All Gaul is divided\n\n"), "All Gaul is divided");
        assert_eq!(
            clean_translation("uses ``` inside text"),
            "uses ``` inside text"
        );
    }
}
