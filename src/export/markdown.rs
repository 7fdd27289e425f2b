//! Markdown parsing for the exporters.
//!
//! The chapter prompts mandate hyphen lists and underscore emphasis, but the
//! parser also accepts asterisks since models drift. Two consumers:
//! [parse_blocks] is the line-based pass the DOCX writer uses, and
//! [to_xhtml] is the full pass (paragraph merging, list grouping, rules,
//! blockquotes) the EPUB writer uses.

use regex::Regex;
use std::sync::OnceLock;

/// One styled run of text within a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
}

impl Span {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: false,
            italic: false,
        }
    }
}

/// One structural unit of a chapter body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// `level` is 1..=3.
    Heading { level: u8, text: String },
    Paragraph { spans: Vec<Span> },
    ListItem { spans: Vec<Span> },
}

/// Double-delimited spans first so `**x**` is bold, not two stray italics.
fn emphasis_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\*\*(.+?)\*\*|__(.+?)__|\*([^*\n]+?)\*|_([^_\n]+?)_")
            .expect("emphasis pattern is valid")
    })
}

/// Split one line into styled runs.
pub fn parse_spans(line: &str) -> Vec<Span> {
    let re = emphasis_regex();
    let mut spans = Vec::new();
    let mut last = 0;
    for caps in re.captures_iter(line) {
        let whole = caps.get(0).expect("group 0 always present");
        if whole.start() > last {
            spans.push(Span::plain(&line[last..whole.start()]));
        }
        if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
            spans.push(Span {
                text: m.as_str().to_string(),
                bold: true,
                italic: false,
            });
        } else if let Some(m) = caps.get(3).or_else(|| caps.get(4)) {
            spans.push(Span {
                text: m.as_str().to_string(),
                bold: false,
                italic: true,
            });
        }
        last = whole.end();
    }
    if last < line.len() {
        spans.push(Span::plain(&line[last..]));
    }
    spans.retain(|s| !s.text.is_empty());
    spans
}

/// Line-based pass: one block per non-empty line. Headings keep their raw
/// text; paragraphs and list items are split into styled runs.
pub fn parse_blocks(markdown: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    for line in markdown.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some((level, text)) = heading_of(trimmed) {
            blocks.push(Block::Heading { level, text });
        } else if let Some(item) = list_item_of(trimmed) {
            blocks.push(Block::ListItem {
                spans: parse_spans(item),
            });
        } else {
            blocks.push(Block::Paragraph {
                spans: parse_spans(trimmed),
            });
        }
    }
    blocks
}

/// Heading marker, clamped to levels 1..=3.
fn heading_of(line: &str) -> Option<(u8, String)> {
    let hashes = line.bytes().take_while(|&b| b == b'#').count();
    if hashes == 0 || !line[hashes..].starts_with(' ') {
        return None;
    }
    let level = hashes.min(3) as u8;
    Some((level, line[hashes..].trim().to_string()))
}

fn list_item_of(line: &str) -> Option<&str> {
    line.strip_prefix("- ").or_else(|| line.strip_prefix("* "))
}

fn ordered_item_of(line: &str) -> Option<&str> {
    let digits = line.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    line[digits..].strip_prefix(". ")
}

pub(crate) fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn spans_to_xhtml(spans: &[Span]) -> String {
    let mut out = String::new();
    for span in spans {
        let text = escape_text(&span.text);
        match (span.bold, span.italic) {
            (true, _) => {
                out.push_str("<strong>");
                out.push_str(&text);
                out.push_str("</strong>");
            }
            (false, true) => {
                out.push_str("<em>");
                out.push_str(&text);
                out.push_str("</em>");
            }
            (false, false) => out.push_str(&text),
        }
    }
    out
}

/// Full pass: Markdown to rendered XHTML body markup.
///
/// Consecutive plain lines merge into one paragraph; consecutive list items
/// group into one `<ul>`/`<ol>`; `---` becomes a rule; `> ` becomes a
/// blockquote paragraph.
pub fn to_xhtml(markdown: &str) -> String {
    #[derive(PartialEq)]
    enum Mode {
        None,
        Paragraph,
        Unordered,
        Ordered,
        Quote,
    }

    let mut out = String::new();
    let mut mode = Mode::None;
    let mut buffer: Vec<String> = Vec::new();

    fn flush(out: &mut String, mode: &mut Mode, buffer: &mut Vec<String>) {
        match mode {
            Mode::None => {}
            Mode::Paragraph => {
                out.push_str("<p>");
                out.push_str(&buffer.join(" "));
                out.push_str("</p>\n");
            }
            Mode::Unordered | Mode::Ordered => {
                let tag = if *mode == Mode::Unordered { "ul" } else { "ol" };
                out.push_str(&format!("<{}>\n", tag));
                for item in buffer.iter() {
                    out.push_str(&format!("  <li>{}</li>\n", item));
                }
                out.push_str(&format!("</{}>\n", tag));
            }
            Mode::Quote => {
                out.push_str("<blockquote><p>");
                out.push_str(&buffer.join(" "));
                out.push_str("</p></blockquote>\n");
            }
        }
        buffer.clear();
        *mode = Mode::None;
    }

    for line in markdown.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            flush(&mut out, &mut mode, &mut buffer);
            continue;
        }
        if let Some((level, text)) = heading_of(trimmed) {
            flush(&mut out, &mut mode, &mut buffer);
            out.push_str(&format!(
                "<h{level}>{}</h{level}>\n",
                spans_to_xhtml(&parse_spans(&text)),
                level = level
            ));
        } else if trimmed == "---" || trimmed == "***" {
            flush(&mut out, &mut mode, &mut buffer);
            out.push_str("<hr/>\n");
        } else if let Some(item) = list_item_of(trimmed) {
            if mode != Mode::Unordered {
                flush(&mut out, &mut mode, &mut buffer);
                mode = Mode::Unordered;
            }
            buffer.push(spans_to_xhtml(&parse_spans(item)));
        } else if let Some(item) = ordered_item_of(trimmed) {
            if mode != Mode::Ordered {
                flush(&mut out, &mut mode, &mut buffer);
                mode = Mode::Ordered;
            }
            buffer.push(spans_to_xhtml(&parse_spans(item)));
        } else if let Some(quoted) = trimmed.strip_prefix("> ") {
            if mode != Mode::Quote {
                flush(&mut out, &mut mode, &mut buffer);
                mode = Mode::Quote;
            }
            buffer.push(spans_to_xhtml(&parse_spans(quoted)));
        } else {
            if mode != Mode::Paragraph {
                flush(&mut out, &mut mode, &mut buffer);
                mode = Mode::Paragraph;
            }
            buffer.push(spans_to_xhtml(&parse_spans(trimmed)));
        }
    }
    flush(&mut out, &mut mode, &mut buffer);
    out
}
