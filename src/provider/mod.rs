//! Provider adapters. One uniform call shape over heterogeneous text/image
//! generation backends, plus provider selection for the fallback chain.

mod client;
mod error;

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod openrouter;

pub use error::ProviderError;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;

use crate::config::Config;
use crate::model::{BookOutline, ChapterOutline, CoverImage, GenerationOptions, SizeTier};

/// Deadline for one outline call, retries included.
pub const OUTLINE_DEADLINE: Duration = Duration::from_secs(120);
/// Deadline for one chapter call, retries included.
pub const CHAPTER_DEADLINE: Duration = Duration::from_secs(180);
/// Deadline for one image call, retries included.
pub const IMAGE_DEADLINE: Duration = Duration::from_secs(120);

/// Uniform call shape over a single backend. Adapters are stateless across
/// calls; the only precondition they check is the presence of a credential.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether a credential is configured. Providers without one are left out
    /// of the fallback chain.
    fn has_credential(&self) -> bool;

    async fn generate_outline(
        &self,
        options: &GenerationOptions,
    ) -> Result<BookOutline, ProviderError>;

    /// `index` is 0-based; `total` is the outline's chapter count.
    async fn generate_chapter(
        &self,
        options: &GenerationOptions,
        outline: &BookOutline,
        chapter: &ChapterOutline,
        index: usize,
        total: usize,
    ) -> Result<String, ProviderError>;

    async fn generate_cover_image(
        &self,
        prompt: &str,
        size: SizeTier,
    ) -> Result<CoverImage, ProviderError>;

    async fn edit_cover_image(
        &self,
        image: &CoverImage,
        prompt: &str,
    ) -> Result<CoverImage, ProviderError>;
}

/// Supported backend. Used for priority-list parsing and adapter dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderId {
    OpenAi,
    Anthropic,
    Gemini,
    OpenRouter,
}

impl ProviderId {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Gemini => "gemini",
            ProviderId::OpenRouter => "openrouter",
        }
    }

    /// Whether the backend offers image generation at all.
    pub fn supports_images(self) -> bool {
        matches!(self, ProviderId::OpenAi | ProviderId::Gemini)
    }
}

/// Parse one provider name (case-insensitive).
pub fn parse_provider(s: &str) -> Result<ProviderId, String> {
    match s.trim().to_lowercase().as_str() {
        "openai" => Ok(ProviderId::OpenAi),
        "anthropic" | "claude" => Ok(ProviderId::Anthropic),
        "gemini" | "google" => Ok(ProviderId::Gemini),
        "openrouter" => Ok(ProviderId::OpenRouter),
        other => Err(format!(
            "Unknown provider '{}'. Use openai, anthropic, gemini, or openrouter.",
            other
        )),
    }
}

/// Parse a comma-separated priority list, preserving order.
pub fn parse_provider_list(s: &str) -> Result<Vec<ProviderId>, String> {
    s.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(parse_provider)
        .collect()
}

/// Default text priority order.
pub fn default_order() -> Vec<ProviderId> {
    vec![
        ProviderId::OpenAi,
        ProviderId::Anthropic,
        ProviderId::Gemini,
        ProviderId::OpenRouter,
    ]
}

/// Default image priority order (image-capable backends only).
pub fn default_image_order() -> Vec<ProviderId> {
    vec![ProviderId::OpenAi, ProviderId::Gemini]
}

/// Build the adapter for one backend. API keys come from the environment
/// first, then the config file.
pub fn build_provider(
    id: ProviderId,
    http: &reqwest::Client,
    config: Option<&Config>,
) -> Arc<dyn Provider> {
    match id {
        ProviderId::OpenAi => Arc::new(openai::OpenAiProvider::new(
            http.clone(),
            credential("OPENAI_API_KEY", config.and_then(|c| c.openai_api_key.clone())),
            config.and_then(|c| c.openai_model.clone()),
        )),
        ProviderId::Anthropic => Arc::new(anthropic::AnthropicProvider::new(
            http.clone(),
            credential(
                "ANTHROPIC_API_KEY",
                config.and_then(|c| c.anthropic_api_key.clone()),
            ),
            config.and_then(|c| c.anthropic_model.clone()),
        )),
        ProviderId::Gemini => Arc::new(gemini::GeminiProvider::new(
            http.clone(),
            credential("GEMINI_API_KEY", config.and_then(|c| c.gemini_api_key.clone())),
            config.and_then(|c| c.gemini_model.clone()),
        )),
        ProviderId::OpenRouter => Arc::new(openrouter::OpenRouterProvider::new(
            http.clone(),
            credential(
                "OPENROUTER_API_KEY",
                config.and_then(|c| c.openrouter_api_key.clone()),
            ),
            config.and_then(|c| c.openrouter_model.clone()),
        )),
    }
}

fn credential(env_var: &str, config_key: Option<String>) -> Option<String> {
    std::env::var(env_var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or(config_key)
}

/// Strip a Markdown code-fence wrapper (```json ... ```), if present, so the
/// payload inside can be parsed as JSON.
pub(crate) fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") up to the first newline.
    let rest = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

/// Parse an outline payload. Fails on unparsable JSON and on an empty or
/// missing chapter list; an outline with no chapters is never a success.
pub(crate) fn parse_outline(
    provider: &'static str,
    raw: &str,
) -> Result<BookOutline, ProviderError> {
    let cleaned = strip_code_fences(raw);
    let outline: BookOutline =
        serde_json::from_str(cleaned).map_err(|e| ProviderError::Malformed {
            provider,
            reason: e.to_string(),
        })?;
    if outline.title.trim().is_empty() {
        return Err(ProviderError::Malformed {
            provider,
            reason: "outline has no title".to_string(),
        });
    }
    if outline.chapters.is_empty() {
        return Err(ProviderError::Malformed {
            provider,
            reason: "outline has no chapters".to_string(),
        });
    }
    Ok(outline)
}

/// Reject empty chapter text.
pub(crate) fn require_text(
    provider: &'static str,
    text: String,
) -> Result<String, ProviderError> {
    if text.trim().is_empty() {
        Err(ProviderError::Empty { provider })
    } else {
        Ok(text)
    }
}

/// Decode a base64 image payload into the normalized in-memory shape.
pub(crate) fn decode_image(
    provider: &'static str,
    b64: &str,
    media_type: &str,
) -> Result<CoverImage, ProviderError> {
    let data = base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|e| ProviderError::Malformed {
            provider,
            reason: format!("invalid base64 image payload: {}", e),
        })?;
    Ok(CoverImage {
        data,
        media_type: media_type.to_string(),
    })
}

/// Fetch an image the backend returned by URL, normalizing it to bytes.
pub(crate) async fn fetch_image(
    provider: &'static str,
    http: &reqwest::Client,
    url: &str,
) -> Result<CoverImage, ProviderError> {
    let response = client::call_with_deadline(provider, IMAGE_DEADLINE, || http.get(url).send())
        .await?;
    let media_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("image/png")
        .to_string();
    let data = response
        .bytes()
        .await
        .map_err(|e| ProviderError::Malformed {
            provider,
            reason: format!("failed to read image bytes: {}", e),
        })?
        .to_vec();
    Ok(CoverImage { data, media_type })
}

pub(crate) use client::call_with_deadline;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_code_fences_plain_passthrough() {
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn strip_code_fences_json_fence() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"a\": 1}");
    }

    #[test]
    fn strip_code_fences_bare_fence() {
        let fenced = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"a\": 1}");
    }

    #[test]
    fn parse_outline_accepts_fenced_payload() {
        let raw = "```json\n{\"title\": \"T\", \"chapters\": [{\"title\": \"A\", \"description\": \"d\"}]}\n```";
        let outline = parse_outline("test", raw).unwrap();
        assert_eq!(outline.title, "T");
        assert_eq!(outline.chapters.len(), 1);
    }

    #[test]
    fn parse_outline_rejects_empty_chapter_list() {
        let raw = r#"{"title": "T", "chapters": []}"#;
        assert!(matches!(
            parse_outline("test", raw),
            Err(ProviderError::Malformed { .. })
        ));
    }

    #[test]
    fn parse_outline_rejects_missing_chapter_list() {
        let raw = r#"{"title": "T"}"#;
        assert!(matches!(
            parse_outline("test", raw),
            Err(ProviderError::Malformed { .. })
        ));
    }

    #[test]
    fn parse_outline_rejects_non_json() {
        assert!(matches!(
            parse_outline("test", "Sure! Here is your outline:"),
            Err(ProviderError::Malformed { .. })
        ));
    }

    #[test]
    fn require_text_rejects_whitespace() {
        assert!(matches!(
            require_text("test", "  \n ".to_string()),
            Err(ProviderError::Empty { .. })
        ));
        assert_eq!(require_text("test", "body".to_string()).unwrap(), "body");
    }

    #[test]
    fn provider_list_parses_in_order() {
        let order = parse_provider_list("gemini, openai").unwrap();
        assert_eq!(order, vec![ProviderId::Gemini, ProviderId::OpenAi]);
    }

    #[test]
    fn provider_list_rejects_unknown() {
        assert!(parse_provider_list("openai,mystery").is_err());
    }

    #[test]
    fn image_support_by_backend() {
        assert!(ProviderId::OpenAi.supports_images());
        assert!(ProviderId::Gemini.supports_images());
        assert!(!ProviderId::Anthropic.supports_images());
        assert!(!ProviderId::OpenRouter.supports_images());
    }

    #[test]
    fn decode_image_round_trips_base64() {
        let b64 = base64::engine::general_purpose::STANDARD.encode(b"fakepng");
        let img = decode_image("test", &b64, "image/png").unwrap();
        assert_eq!(img.data, b"fakepng");
        assert_eq!(img.media_type, "image/png");
    }

    #[test]
    fn decode_image_rejects_garbage() {
        assert!(matches!(
            decode_image("test", "not base64 at all!!!", "image/png"),
            Err(ProviderError::Malformed { .. })
        ));
    }
}
