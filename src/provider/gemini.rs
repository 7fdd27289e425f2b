//! Gemini adapter: generateContent for text and for image output.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{
    call_with_deadline, decode_image, parse_outline, require_text, Provider, ProviderError,
    CHAPTER_DEADLINE, IMAGE_DEADLINE, OUTLINE_DEADLINE,
};
use crate::model::{BookOutline, ChapterOutline, CoverImage, GenerationOptions, SizeTier};
use crate::prompt;

const NAME: &str = "gemini";
const ENV_VAR: &str = "GEMINI_API_KEY";
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const IMAGE_MODEL: &str = "gemini-2.0-flash-exp-image-generation";

pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

impl GeminiProvider {
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

    async fn generate(
        &self,
        model: &str,
        body: serde_json::Value,
        deadline: std::time::Duration,
    ) -> Result<GenerateResponse, ProviderError> {
        let key = self.key()?.to_string();
        let url = format!("{}/{}:generateContent?key={}", API_BASE, model, key);
        let response = call_with_deadline(NAME, deadline, || {
            self.http.post(&url).json(&body).send()
        })
        .await?;
        response.json().await.map_err(|e| ProviderError::Malformed {
            provider: NAME,
            reason: e.to_string(),
        })
    }

    async fn text_call(
        &self,
        system: &str,
        user: &str,
        json_mode: bool,
        deadline: std::time::Duration,
    ) -> Result<String, ProviderError> {
        let mut body = json!({
            "systemInstruction": {"parts": [{"text": system}]},
            "contents": [{"role": "user", "parts": [{"text": user}]}],
        });
        if json_mode {
            body["generationConfig"] = json!({"responseMimeType": "application/json"});
        }
        let parsed = self.generate(&self.model, body, deadline).await?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        Ok(text)
    }

    async fn image_call(&self, prompt: &str) -> Result<CoverImage, ProviderError> {
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {"responseModalities": ["TEXT", "IMAGE"]},
        });
        let parsed = self.generate(IMAGE_MODEL, body, IMAGE_DEADLINE).await?;
        let inline = parsed
            .candidates
            .into_iter()
            .flat_map(|c| c.content.parts)
            .find_map(|p| p.inline_data)
            .ok_or(ProviderError::Empty { provider: NAME })?;
        decode_image(NAME, &inline.data, &inline.mime_type)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
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
            .text_call(
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
            .text_call(
                prompt::CHAPTER_SYSTEM,
                &prompt::chapter_prompt(options, outline, chapter, index, total),
                false,
                CHAPTER_DEADLINE,
            )
            .await?;
        require_text(NAME, raw)
    }

    // The image model ignores resolution hints; the tier is accepted for
    // interface parity and dropped.
    async fn generate_cover_image(
        &self,
        prompt: &str,
        _size: SizeTier,
    ) -> Result<CoverImage, ProviderError> {
        self.image_call(prompt).await
    }

    async fn edit_cover_image(
        &self,
        _image: &CoverImage,
        prompt: &str,
    ) -> Result<CoverImage, ProviderError> {
        self.image_call(prompt).await
    }
}
