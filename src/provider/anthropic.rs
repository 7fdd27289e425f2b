//! Anthropic adapter: the messages API. Text only; no image models.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{
    call_with_deadline, parse_outline, require_text, Provider, ProviderError, CHAPTER_DEADLINE,
    OUTLINE_DEADLINE,
};
use crate::model::{BookOutline, ChapterOutline, CoverImage, GenerationOptions, SizeTier};
use crate::prompt;

const NAME: &str = "anthropic";
const ENV_VAR: &str = "ANTHROPIC_API_KEY";
const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const MAX_TOKENS: u32 = 8192;

pub struct AnthropicProvider {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

impl AnthropicProvider {
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

    async fn message(
        &self,
        system: &str,
        user: &str,
        deadline: std::time::Duration,
    ) -> Result<String, ProviderError> {
        let key = self.key()?.to_string();
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": system,
            "messages": [{"role": "user", "content": user}],
        });
        let response = call_with_deadline(NAME, deadline, || {
            self.http
                .post(API_URL)
                .header("x-api-key", &key)
                .header("anthropic-version", API_VERSION)
                .json(&body)
                .send()
        })
        .await?;
        let parsed: MessagesResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::Malformed {
                    provider: NAME,
                    reason: e.to_string(),
                })?;
        let text = parsed
            .content
            .into_iter()
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        Ok(text)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
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
            .message(
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
            .message(
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
