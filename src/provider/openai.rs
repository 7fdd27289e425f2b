//! OpenAI adapter: chat completions for text, the images API for covers.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{
    call_with_deadline, decode_image, fetch_image, parse_outline, require_text, Provider,
    ProviderError, CHAPTER_DEADLINE, IMAGE_DEADLINE, OUTLINE_DEADLINE,
};
use crate::model::{BookOutline, ChapterOutline, CoverImage, GenerationOptions, SizeTier};
use crate::prompt;

const NAME: &str = "openai";
const ENV_VAR: &str = "OPENAI_API_KEY";
const API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const IMAGE_MODEL: &str = "dall-e-3";

pub struct OpenAiProvider {
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

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

fn image_size(size: SizeTier) -> &'static str {
    match size {
        SizeTier::Square => "1024x1024",
        SizeTier::Portrait => "1024x1792",
        SizeTier::Landscape => "1792x1024",
    }
}

impl OpenAiProvider {
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
        json_mode: bool,
        deadline: std::time::Duration,
    ) -> Result<String, ProviderError> {
        let key = self.key()?.to_string();
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });
        if json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }
        let response = call_with_deadline(NAME, deadline, || {
            self.http
                .post(format!("{}/chat/completions", API_BASE))
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
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        Ok(content)
    }

    async fn image(&self, prompt: &str, size: SizeTier) -> Result<CoverImage, ProviderError> {
        let key = self.key()?.to_string();
        let body = json!({
            "model": IMAGE_MODEL,
            "prompt": prompt,
            "n": 1,
            "size": image_size(size),
            "response_format": "b64_json",
        });
        let response = call_with_deadline(NAME, IMAGE_DEADLINE, || {
            self.http
                .post(format!("{}/images/generations", API_BASE))
                .bearer_auth(&key)
                .json(&body)
                .send()
        })
        .await?;
        let parsed: ImageResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::Malformed {
                    provider: NAME,
                    reason: e.to_string(),
                })?;
        let datum = parsed
            .data
            .into_iter()
            .next()
            .ok_or(ProviderError::Empty { provider: NAME })?;
        if let Some(b64) = datum.b64_json {
            return decode_image(NAME, &b64, "image/png");
        }
        if let Some(url) = datum.url {
            return fetch_image(NAME, &self.http, &url).await;
        }
        Err(ProviderError::Malformed {
            provider: NAME,
            reason: "image payload had neither b64_json nor url".to_string(),
        })
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
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
                true,
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
                false,
                CHAPTER_DEADLINE,
            )
            .await?;
        require_text(NAME, raw)
    }

    async fn generate_cover_image(
        &self,
        prompt: &str,
        size: SizeTier,
    ) -> Result<CoverImage, ProviderError> {
        self.image(prompt, size).await
    }

    // The images/edits endpoint needs multipart uploads and a mask; covers are
    // regenerated from the combined prompt instead, matching generation size.
    async fn edit_cover_image(
        &self,
        _image: &CoverImage,
        prompt: &str,
    ) -> Result<CoverImage, ProviderError> {
        self.image(prompt, SizeTier::Portrait).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_reported_before_any_network_call() {
        let provider = OpenAiProvider::new(reqwest::Client::new(), None, None);
        assert!(!provider.has_credential());
        assert!(matches!(
            provider.key(),
            Err(ProviderError::MissingCredential { provider: "openai", .. })
        ));
    }

    #[test]
    fn size_tiers_map_to_api_sizes() {
        assert_eq!(image_size(SizeTier::Square), "1024x1024");
        assert_eq!(image_size(SizeTier::Portrait), "1024x1792");
        assert_eq!(image_size(SizeTier::Landscape), "1792x1024");
    }

    #[test]
    fn chat_response_shape_parses() {
        let json = r#"{"choices": [{"message": {"role": "assistant", "content": "hello"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content, "hello");
    }

    #[test]
    fn image_response_shape_parses_both_variants() {
        let b64: ImageResponse =
            serde_json::from_str(r#"{"data": [{"b64_json": "aGk="}]}"#).unwrap();
        assert!(b64.data[0].b64_json.is_some());
        let url: ImageResponse =
            serde_json::from_str(r#"{"data": [{"url": "https://x/y.png"}]}"#).unwrap();
        assert!(url.data[0].url.is_some());
    }
}
