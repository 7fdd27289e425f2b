//! Canonical data model for a generation run.
//!
//! The provider adapters produce [BookOutline] and chapter Markdown; the
//! sequencer assembles a [GeneratedBook]; the exporters consume it.

use serde::{Deserialize, Serialize};

/// User parameters for one generation run. Immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    pub topic: String,
    pub audience: String,
    pub tone: String,
    pub objective: String,
    /// Number of chapters to outline and generate.
    pub chapter_count: u32,
    pub length: LengthBucket,
    /// Free-text elaboration of the topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional feature tags (e.g. "examples", "exercises", "summaries").
    #[serde(default)]
    pub features: Vec<String>,
    /// Byline for exports. Defaults to "Anonymous" when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl GenerationOptions {
    pub fn author_or_default(&self) -> &str {
        self.author.as_deref().unwrap_or("Anonymous")
    }
}

/// Target chapter length bucket. Maps to a word-count hint in the prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthBucket {
    Short,
    Medium,
    Long,
}

impl LengthBucket {
    /// Word-count range to request per chapter.
    pub fn words_hint(self) -> &'static str {
        match self {
            LengthBucket::Short => "800 to 1200 words",
            LengthBucket::Medium => "1500 to 2500 words",
            LengthBucket::Long => "3000 to 5000 words",
        }
    }
}

/// One planned chapter: title + short description. Order is significant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterOutline {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Structured outline produced in one provider call. Never mutated after
/// generation; only superseded by a fresh run.
///
/// Field names match the JSON shape the providers are asked to emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookOutline {
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "backCoverCopy")]
    pub back_cover_copy: String,
    #[serde(default)]
    pub chapters: Vec<ChapterOutline>,
}

/// One generated chapter. `body` is Markdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterContent {
    pub title: String,
    pub body: String,
}

/// Requested cover resolution tier. Each adapter maps this to whatever its
/// backend accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeTier {
    Square,
    Portrait,
    Landscape,
}

/// In-memory cover image, normalized from a base64 payload or a fetched URL.
#[derive(Debug, Clone)]
pub struct CoverImage {
    pub data: Vec<u8>,
    /// Media type as reported by the backend (e.g. "image/png").
    pub media_type: String,
}

impl CoverImage {
    /// File extension for embedding in an archive.
    pub fn extension(&self) -> &'static str {
        if self.media_type.contains("jpeg") || self.media_type.contains("jpg") {
            "jpg"
        } else {
            "png"
        }
    }
}

/// Assembled book: outline fields plus the ordered chapter sequence.
///
/// Complete only when the chapter sequence length equals the outline's
/// chapter count; the exporters reject anything else.
#[derive(Debug, Clone)]
pub struct GeneratedBook {
    pub outline: BookOutline,
    pub author: String,
    pub chapters: Vec<ChapterContent>,
    pub cover: Option<CoverImage>,
}

impl GeneratedBook {
    pub fn is_complete(&self) -> bool {
        !self.outline.chapters.is_empty() && self.chapters.len() == self.outline.chapters.len()
    }
}
