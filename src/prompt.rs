//! Prompt construction for outline, chapter, and cover calls.
//!
//! Chapter prompts mandate hyphen list markers and underscore emphasis so the
//! exporters only have to handle one Markdown dialect; the parser still
//! accepts asterisks because models drift.

use crate::model::{BookOutline, ChapterOutline, GenerationOptions};

pub const OUTLINE_SYSTEM: &str = "You are an experienced book editor. You design clear, \
well-paced non-fiction book outlines. Respond with raw JSON only, no code fences and no \
commentary.";

pub const CHAPTER_SYSTEM: &str = "You are a professional book author. You write complete, \
engaging chapters in Markdown. Formatting rules: use '#'-style headings no deeper than \
three levels, use hyphens for list items, and use underscores for emphasis (__bold__, \
_italic_). Never use asterisks for lists or emphasis. Do not repeat the chapter title at \
the top; it is added separately.";

/// User prompt for the outline call, including the exact JSON shape expected
/// back.
pub fn outline_prompt(options: &GenerationOptions) -> String {
    let mut prompt = format!(
        "Design a book outline.\n\
         Topic: {topic}\n\
         Audience: {audience}\n\
         Tone: {tone}\n\
         Objective: {objective}\n\
         Chapter count: exactly {count} chapters.\n",
        topic = options.topic,
        audience = options.audience,
        tone = options.tone,
        objective = options.objective,
        count = options.chapter_count,
    );
    if let Some(description) = &options.description {
        prompt.push_str(&format!("Additional context: {}\n", description));
    }
    if !options.features.is_empty() {
        prompt.push_str(&format!(
            "Each chapter should make room for: {}.\n",
            options.features.join(", ")
        ));
    }
    prompt.push_str(
        "\nReturn a single JSON object with this exact shape:\n\
         {\"title\": string, \"subtitle\": string, \"description\": string, \
         \"backCoverCopy\": string, \"chapters\": [{\"title\": string, \"description\": string}]}\n\
         The \"description\" is marketing copy for the book; \"backCoverCopy\" is the back-cover \
         blurb. The chapters array must contain the requested number of entries, in reading order.",
    );
    prompt
}

/// User prompt for one chapter call.
pub fn chapter_prompt(
    options: &GenerationOptions,
    outline: &BookOutline,
    chapter: &ChapterOutline,
    index: usize,
    total: usize,
) -> String {
    let mut prompt = format!(
        "Write chapter {number} of {total} for the book \"{title}\".\n\
         Book subtitle: {subtitle}\n\
         Book description: {description}\n\
         Chapter title: {chapter_title}\n\
         Chapter brief: {chapter_description}\n\
         Audience: {audience}\n\
         Tone: {tone}\n\
         Objective: {objective}\n\
         Target length: {length}.\n",
        number = index + 1,
        total = total,
        title = outline.title,
        subtitle = outline.subtitle,
        description = outline.description,
        chapter_title = chapter.title,
        chapter_description = chapter.description,
        audience = options.audience,
        tone = options.tone,
        objective = options.objective,
        length = options.length.words_hint(),
    );
    if !options.features.is_empty() {
        prompt.push_str(&format!(
            "Include where natural: {}.\n",
            options.features.join(", ")
        ));
    }
    prompt.push_str(
        "\nWrite the full chapter body in Markdown. Start with prose, not a heading. \
         Use '##' for section headings and '###' for subsections. Return only the chapter text.",
    );
    prompt
}

/// Prompt for the cover-image call, derived from the finished outline.
pub fn cover_prompt(outline: &BookOutline) -> String {
    format!(
        "A professional book cover for \"{title}\"{subtitle}. Theme: {description} \
         Clean typography, strong focal image, no watermark.",
        title = outline.title,
        subtitle = if outline.subtitle.is_empty() {
            String::new()
        } else {
            format!(" ({})", outline.subtitle)
        },
        description = outline.description,
    )
}

/// Prompt for regenerating a cover with an edit instruction applied.
pub fn cover_edit_prompt(base_prompt: &str, instruction: &str) -> String {
    format!("{}\nRevision request: {}", base_prompt, instruction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LengthBucket;

    fn options() -> GenerationOptions {
        GenerationOptions {
            topic: "Sourdough baking".to_string(),
            audience: "home bakers".to_string(),
            tone: "warm".to_string(),
            objective: "build confidence".to_string(),
            chapter_count: 5,
            length: LengthBucket::Short,
            description: Some("Focus on rye starters.".to_string()),
            features: vec!["exercises".to_string()],
            author: None,
        }
    }

    #[test]
    fn outline_prompt_carries_all_options() {
        let p = outline_prompt(&options());
        assert!(p.contains("Sourdough baking"));
        assert!(p.contains("home bakers"));
        assert!(p.contains("exactly 5 chapters"));
        assert!(p.contains("Focus on rye starters."));
        assert!(p.contains("exercises"));
        assert!(p.contains("backCoverCopy"));
    }

    #[test]
    fn chapter_prompt_is_one_based_and_carries_brief() {
        let outline = BookOutline {
            title: "Rise".to_string(),
            subtitle: "A Sourdough Primer".to_string(),
            description: "From starter to crust.".to_string(),
            back_cover_copy: String::new(),
            chapters: vec![],
        };
        let chapter = ChapterOutline {
            title: "Feeding the Starter".to_string(),
            description: "Hydration and schedules.".to_string(),
        };
        let p = chapter_prompt(&options(), &outline, &chapter, 2, 5);
        assert!(p.contains("chapter 3 of 5"));
        assert!(p.contains("Feeding the Starter"));
        assert!(p.contains("Hydration and schedules."));
        assert!(p.contains("800 to 1200 words"));
    }

    #[test]
    fn chapter_system_bans_asterisks() {
        assert!(CHAPTER_SYSTEM.contains("Never use asterisks"));
        assert!(CHAPTER_SYSTEM.contains("hyphens for list items"));
        assert!(CHAPTER_SYSTEM.contains("underscores for emphasis"));
    }

    #[test]
    fn cover_prompt_mentions_title_and_subtitle() {
        let outline = BookOutline {
            title: "Rise".to_string(),
            subtitle: "A Sourdough Primer".to_string(),
            description: "From starter to crust.".to_string(),
            back_cover_copy: String::new(),
            chapters: vec![],
        };
        let p = cover_prompt(&outline);
        assert!(p.contains("\"Rise\""));
        assert!(p.contains("A Sourdough Primer"));
    }
}
