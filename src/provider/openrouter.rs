//! OpenRouter adapter: OpenAI-compatible chat completions over a model
//! aggregator. Text only.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{
    call_with_deadline, parse_outline, require_text, Provider, ProviderError, CHAPTER_DEADLINE,
    OUTLINE_DEADLINE,
};
use crate::model::{BookOutline, ChapterOutline, CoverImage, GenerationOptions, SizeTier};
use crate::prompt;

const NAME: &str = "openrouter";
const ENV_VAR: &str = "OPENROUTER_API_KEY";
const API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_MODEL: &str = "openrouter/auto";

pub struct OpenRouterProvider {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

impl OpenRouterProvider {
    pub fn new(http: reqwest::Client, api_key: Option<String>, model: Option<String>) -> Self {
        Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    fn key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredential {
                provider: NAME,
                env_var: ENV_VAR,
            })
    }

    async fn chat(
        &self,
        system: &str,
        user: &str,
        deadline: std::time::Duration,
    ) -> Result<String, ProviderError> {
        let key = self.key()?.to_string();
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });
        let response = call_with_deadline(NAME, deadline, || {
            self.http
                .post(API_URL)
                .bearer_auth(&key)
                .json(&body)
                .send()
        })
        .await?;
        let parsed: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::Malformed {
                    provider: NAME,
                    reason: e.to_string(),
                })?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl Provider for OpenRouterProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate_outline(
        &self,
        options: &GenerationOptions,
    ) -> Result<BookOutline, ProviderError> {
        let raw = self
            .chat(
                prompt::OUTLINE_SYSTEM,
                &prompt::outline_prompt(options),
                OUTLINE_DEADLINE,
            )
            .await?;
        parse_outline(NAME, &raw)
    }

    async fn generate_chapter(
        &self,
        options: &GenerationOptions,
        outline: &BookOutline,
        chapter: &ChapterOutline,
        index: usize,
        total: usize,
    ) -> Result<String, ProviderError> {
        let raw = self
            .chat(
                prompt::CHAPTER_SYSTEM,
                &prompt::chapter_prompt(options, outline, chapter, index, total),
                CHAPTER_DEADLINE,
            )
            .await?;
        require_text(NAME, raw)
    }

    async fn generate_cover_image(
        &self,
        _prompt: &str,
        _size: SizeTier,
    ) -> Result<CoverImage, ProviderError> {
        Err(ProviderError::Unsupported {
            provider: NAME,
            operation: "cover image generation",
        })
    }

    async fn edit_cover_image(
        &self,
        _image: &CoverImage,
        _prompt: &str,
    ) -> Result<CoverImage, ProviderError> {
        Err(ProviderError::Unsupported {
            provider: NAME,
            operation: "cover image editing",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_reported() {
        let provider = OpenRouterProvider::new(reqwest::Client::new(), None, None);
        assert!(!provider.has_credential());
        assert!(matches!(
            provider.key(),
            Err(ProviderError::MissingCredential { provider: "openrouter", .. })
        ));
    }

    #[test]
    fn default_model_is_auto_router() {
        let provider =
            OpenRouterProvider::new(reqwest::Client::new(), Some("key".to_string()), None);
        assert_eq!(provider.model, "openrouter/auto");
    }
}
