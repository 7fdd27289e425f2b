//! CLI parsing and orchestration. Parses generation options, runs
//! outline -> chapters -> export, and maps errors to exit codes.

use crate::config;
use crate::export::{write_docx_file, write_epub_file, ConversionError};
use crate::fallback::FallbackChain;
use crate::model::{GenerationOptions, LengthBucket, SizeTier};
use crate::prompt;
use crate::provider::{self, ProviderId};
use crate::sequencer::{RunError, RunSnapshot, Sequencer, SequencerOptions, DEFAULT_PACING};
use clap::Parser;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Generation(#[from] RunError),

    #[error("{0}")]
    Export(#[from] ConversionError),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Generation(_) => 2,
            CliRunError::Export(_) => 3,
        }
    }
}

/// Output format selector for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Epub,
    Docx,
}

/// Parsed provider priority order. Newtype so clap treats the whole
/// comma-separated list as one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderList(pub Vec<ProviderId>);

#[derive(Parser, Debug)]
#[command(name = "bookwright")]
#[command(about = "Generate a complete book with AI providers and export it as EPUB or DOCX")]
#[command(
    after_help = "Config file keys (output_dir, provider_order, image_provider_order, pacing_ms, \
author, per-provider models and api keys) are documented in the README. CLI flags override \
config. API keys are read from OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY, and \
OPENROUTER_API_KEY first."
)]
pub struct Args {
    /// Book topic, e.g. "Sourdough baking for beginners".
    pub topic: String,

    /// Intended audience.
    #[arg(long, default_value = "general readers")]
    pub audience: String,

    /// Writing tone.
    #[arg(long, default_value = "clear and engaging")]
    pub tone: String,

    /// What the book should accomplish for the reader.
    #[arg(long, default_value = "inform and guide the reader")]
    pub objective: String,

    /// Number of chapters (1-50).
    #[arg(long, default_value = "8", value_parser = parse_chapter_count)]
    pub chapters: u32,

    /// Chapter length: short, medium, or long.
    #[arg(long, default_value = "medium", value_parser = parse_length)]
    pub length: LengthBucket,

    /// Free-text description to steer the outline.
    #[arg(long)]
    pub describe: Option<String>,

    /// Feature tag to weave into chapters (repeatable), e.g. --feature examples.
    #[arg(long = "feature")]
    pub features: Vec<String>,

    /// Author byline (overrides config; default "Anonymous").
    #[arg(long)]
    pub author: Option<String>,

    /// Output path. Default: ./{sanitized-title}.{ext} where ext depends on --format.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format: epub or docx.
    #[arg(long, default_value = "epub", value_parser = parse_format)]
    pub format: OutputFormat,

    /// Text provider priority order, e.g. openai,anthropic,gemini,openrouter.
    #[arg(long, value_parser = parse_provider_arg)]
    pub providers: Option<ProviderList>,

    /// Image provider priority order, e.g. openai,gemini.
    #[arg(long, value_parser = parse_image_provider_arg)]
    pub image_providers: Option<ProviderList>,

    /// Also generate a cover image (EPUB embeds it; failure is non-fatal).
    #[arg(long)]
    pub cover: bool,

    /// Snapshot file for resume. Progress is saved here after every chapter;
    /// if the file exists, generation continues from the last saved chapter.
    #[arg(long)]
    pub resume: Option<PathBuf>,

    /// Delay between chapter calls in milliseconds (overrides config; default 500).
    #[arg(long)]
    pub pacing_ms: Option<u64>,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Print verbose error chain.
    #[arg(long)]
    pub verbose: bool,
}

fn parse_chapter_count(s: &str) -> Result<u32, String> {
    let n: u32 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid --chapters: '{}' is not a number", s))?;
    if !(1..=50).contains(&n) {
        return Err(format!(
            "Invalid --chapters: {} is out of range (use 1-50)",
            n
        ));
    }
    Ok(n)
}

fn parse_length(s: &str) -> Result<LengthBucket, String> {
    match s.to_lowercase().as_str() {
        "short" => Ok(LengthBucket::Short),
        "medium" => Ok(LengthBucket::Medium),
        "long" => Ok(LengthBucket::Long),
        _ => Err(format!(
            "Invalid --length value: '{}'. Use short, medium, or long.",
            s
        )),
    }
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    match s.to_lowercase().as_str() {
        "epub" => Ok(OutputFormat::Epub),
        "docx" | "doc" | "word" => Ok(OutputFormat::Docx),
        _ => Err(format!(
            "Invalid --format value: '{}'. Use epub or docx.",
            s
        )),
    }
}

fn parse_provider_arg(s: &str) -> Result<ProviderList, String> {
    let order = provider::parse_provider_list(s)?;
    if order.is_empty() {
        return Err("Provider list is empty.".to_string());
    }
    Ok(ProviderList(order))
}

fn parse_image_provider_arg(s: &str) -> Result<ProviderList, String> {
    let order = parse_provider_arg(s)?;
    if let Some(id) = order.0.iter().find(|id| !id.supports_images()) {
        return Err(format!(
            "Provider '{}' does not offer image generation.",
            id.as_str()
        ));
    }
    Ok(order)
}

fn extension_for_format(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Epub => "epub",
        OutputFormat::Docx => "docx",
    }
}

/// Sanitize book title to a safe filename: lowercase, replace spaces/special with `-`.
fn sanitize_title(title: &str) -> String {
    let mut s = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect::<String>();
    while s.contains("--") {
        s = s.replace("--", "-");
    }
    s = s.trim_matches('-').to_string();
    if s.is_empty() {
        s = "book".to_string();
    }
    s
}

/// Ensure output path parent exists; return error otherwise.
fn validate_output_path(path: &Path) -> Result<(), CliRunError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(CliRunError::InvalidInput(format!(
                "Cannot write output: {}: parent directory does not exist.",
                path.display()
            )));
        }
    }
    Ok(())
}

fn order_from_config(
    configured: Option<&Vec<String>>,
    fallback: Vec<ProviderId>,
) -> Result<Vec<ProviderId>, CliRunError> {
    match configured {
        Some(names) => names
            .iter()
            .map(|n| provider::parse_provider(n))
            .collect::<Result<Vec<_>, _>>()
            .map_err(CliRunError::InvalidInput),
        None => Ok(fallback),
    }
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and
/// message on failure.
pub async fn run(args: &Args) -> Result<(), CliRunError> {
    if args.topic.trim().is_empty() {
        return Err(CliRunError::InvalidInput(
            "Topic must not be empty.".to_string(),
        ));
    }

    let config = config::load_config().map_err(CliRunError::InvalidInput)?;

    let options = GenerationOptions {
        topic: args.topic.trim().to_string(),
        audience: args.audience.clone(),
        tone: args.tone.clone(),
        objective: args.objective.clone(),
        chapter_count: args.chapters,
        length: args.length,
        description: args.describe.clone(),
        features: args.features.clone(),
        author: args
            .author
            .clone()
            .or_else(|| config.as_ref().and_then(|c| c.author.clone())),
    };

    let text_order = match &args.providers {
        Some(order) => order.0.clone(),
        None => order_from_config(
            config.as_ref().and_then(|c| c.provider_order.as_ref()),
            provider::default_order(),
        )?,
    };
    let image_order = match &args.image_providers {
        Some(order) => order.0.clone(),
        None => order_from_config(
            config.as_ref().and_then(|c| c.image_provider_order.as_ref()),
            provider::default_image_order(),
        )?,
    };

    let http = reqwest::Client::builder()
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

    let chain = FallbackChain::with_credentials(
        text_order
            .iter()
            .map(|id| provider::build_provider(*id, &http, config.as_ref()))
            .collect(),
    );
    if chain.is_empty() {
        tracing::warn!("no text provider has a credential configured");
    } else {
        tracing::debug!(providers = ?chain.provider_names(), "text fallback chain");
    }

    let pacing_ms = args
        .pacing_ms
        .or_else(|| config.as_ref().and_then(|c| c.pacing_ms));
    let pacing = pacing_ms.map(Duration::from_millis).unwrap_or(DEFAULT_PACING);

    // Restore a snapshot when the resume file exists; a missing file means a
    // fresh run that will start saving there.
    let restored: Option<RunSnapshot> = if let Some(ref resume_path) = args.resume {
        match std::fs::File::open(resume_path) {
            Ok(f) => {
                let snapshot: RunSnapshot = serde_json::from_reader(f).map_err(|e| {
                    CliRunError::InvalidInput(format!(
                        "Invalid resume file {}: {}",
                        resume_path.display(),
                        e
                    ))
                })?;
                if snapshot.options.topic.trim() != options.topic {
                    return Err(CliRunError::InvalidInput(format!(
                        "Resume file is for a different topic ({}). Use the same topic as the original run ({}).",
                        snapshot.options.topic, options.topic
                    )));
                }
                Some(snapshot)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(CliRunError::InvalidInput(format!(
                    "Cannot read resume file {}: {}",
                    resume_path.display(),
                    e
                )))
            }
        }
    } else {
        None
    };

    let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let progress_cb = |n: u32, total: u32| {
        if total == 0 {
            return;
        }
        let mut state = progress_state.borrow_mut();
        let pb = state.get_or_insert_with(|| {
            let bar = indicatif::ProgressBar::new(total as u64);
            bar.set_style(
                indicatif::ProgressStyle::default_bar()
                    .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
                    .unwrap()
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                    .progress_chars("█▉▊▋▌▍▎▏ "),
            );
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        pb.set_position(n as u64);
        pb.set_message(format!("Writing chapter {}/{}", n, total));
    };
    let progress: Option<&dyn Fn(u32, u32)> = if args.quiet { None } else { Some(&progress_cb) };

    let resume_path = args.resume.clone();
    let snapshot_cb = |snapshot: &RunSnapshot| {
        if let Some(ref path) = resume_path {
            if let Err(e) = std::fs::File::create(path).and_then(|f| {
                serde_json::to_writer(f, snapshot)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            }) {
                tracing::warn!(path = %path.display(), error = %e, "could not write resume snapshot");
            }
        }
    };
    let on_snapshot: Option<&dyn Fn(&RunSnapshot)> = if args.resume.is_some() {
        Some(&snapshot_cb)
    } else {
        None
    };

    let sequencer = Sequencer::new(&chain);
    let seq_opts = SequencerOptions {
        progress,
        on_snapshot,
        pacing,
    };

    let result = match restored {
        Some(snapshot) => {
            if !args.quiet {
                eprintln!(
                    "Resuming from chapter {} of {}.",
                    snapshot.completed_chapters() + 1,
                    snapshot
                        .outline
                        .as_ref()
                        .map(|o| o.chapters.len())
                        .unwrap_or(options.chapter_count as usize)
                );
            }
            sequencer.resume(snapshot, &seq_opts).await
        }
        None => sequencer.generate(options, &seq_opts).await,
    };

    if let Some(pb) = progress_state.borrow_mut().take() {
        pb.disable_steady_tick();
        pb.finish_and_clear();
    }

    let mut book = match result {
        Ok(book) => book,
        Err(e) => {
            if matches!(e, RunError::Chapter { .. }) {
                match &args.resume {
                    Some(path) => eprintln!(
                        "Progress saved to {}. Re-run the same command to resume from the last \
                         finished chapter, or delete that file to start over.",
                        path.display()
                    ),
                    None => eprintln!(
                        "No resume file was configured; re-running will start over. Pass --resume \
                         <file> to make runs resumable."
                    ),
                }
            }
            return Err(CliRunError::Generation(e));
        }
    };

    if args.cover {
        let image_chain = FallbackChain::with_credentials(
            image_order
                .iter()
                .map(|id| provider::build_provider(*id, &http, config.as_ref()))
                .collect(),
        );
        match image_chain
            .cover_image(&prompt::cover_prompt(&book.outline), SizeTier::Portrait)
            .await
        {
            Ok(image) => book.cover = Some(image),
            Err(e) => {
                eprintln!("Cover image could not be generated: {}. Continuing without one.", e);
            }
        }
    }

    let effective_output_dir: PathBuf = config
        .as_ref()
        .and_then(|c| c.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let output_path = match &args.output {
        Some(p) => p.clone(),
        None => {
            let base = sanitize_title(&book.outline.title);
            let ext = extension_for_format(args.format);
            effective_output_dir.join(format!("{}.{}", base, ext))
        }
    };
    validate_output_path(&output_path)?;

    match args.format {
        OutputFormat::Epub => write_epub_file(&book, &output_path)?,
        OutputFormat::Docx => write_docx_file(&book, &output_path)?,
    }

    if !args.quiet {
        eprintln!("Wrote {}", output_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::FallbackError;

    #[test]
    fn sanitize_title_empty() {
        assert_eq!(sanitize_title(""), "book");
    }

    #[test]
    fn sanitize_title_spaces_and_special_to_dashes() {
        assert_eq!(sanitize_title("My  Book!"), "my-book");
    }

    #[test]
    fn sanitize_title_collapse_dashes_and_trim() {
        assert_eq!(sanitize_title("  --  a  --  b  --  "), "a-b");
    }

    #[test]
    fn parse_format_all() {
        assert_eq!(parse_format("epub").unwrap(), OutputFormat::Epub);
        assert_eq!(parse_format("EPUB").unwrap(), OutputFormat::Epub);
        assert_eq!(parse_format("docx").unwrap(), OutputFormat::Docx);
        assert_eq!(parse_format("word").unwrap(), OutputFormat::Docx);
        assert!(parse_format("pdf").is_err());
    }

    #[test]
    fn parse_length_all() {
        assert_eq!(parse_length("short").unwrap(), LengthBucket::Short);
        assert_eq!(parse_length("Medium").unwrap(), LengthBucket::Medium);
        assert_eq!(parse_length("LONG").unwrap(), LengthBucket::Long);
        assert!(parse_length("epic").is_err());
    }

    #[test]
    fn parse_chapter_count_bounds() {
        assert_eq!(parse_chapter_count("1").unwrap(), 1);
        assert_eq!(parse_chapter_count("50").unwrap(), 50);
        assert!(parse_chapter_count("0").is_err());
        assert!(parse_chapter_count("51").is_err());
        assert!(parse_chapter_count("many").is_err());
    }

    #[test]
    fn parse_provider_arg_orders() {
        let order = parse_provider_arg("anthropic,openai").unwrap();
        assert_eq!(
            order,
            ProviderList(vec![ProviderId::Anthropic, ProviderId::OpenAi])
        );
        assert!(parse_provider_arg("").is_err());
        assert!(parse_provider_arg("openai,unknown").is_err());
    }

    #[test]
    fn parse_image_provider_arg_rejects_text_only_backends() {
        assert!(parse_image_provider_arg("openai,gemini").is_ok());
        let err = parse_image_provider_arg("anthropic").unwrap_err();
        assert!(err.contains("anthropic"));
    }

    #[test]
    fn extension_for_format_each() {
        assert_eq!(extension_for_format(OutputFormat::Epub), "epub");
        assert_eq!(extension_for_format(OutputFormat::Docx), "docx");
    }

    #[test]
    fn default_output_path_uses_output_dir_and_sanitized_title() {
        let output_dir = PathBuf::from("out");
        let base = sanitize_title("The Balcony Hive");
        let ext = extension_for_format(OutputFormat::Epub);
        let path = output_dir.join(format!("{}.{}", base, ext));
        assert_eq!(path, PathBuf::from("out/the-balcony-hive.epub"));
    }

    #[test]
    fn validate_output_path_parent_missing() {
        let path = PathBuf::from("/nonexistent_dir_bookwright_xyz/output.epub");
        let result = validate_output_path(&path);
        assert!(result.is_err());
        if let Err(CliRunError::InvalidInput(msg)) = result {
            assert!(msg.contains("parent directory does not exist"));
        }
    }

    #[test]
    fn cli_run_error_exit_codes() {
        assert_eq!(CliRunError::InvalidInput("x".into()).exit_code(), 1);
        assert_eq!(
            CliRunError::Generation(RunError::Outline(FallbackError::AllProvidersFailed {
                attempts: vec![]
            }))
            .exit_code(),
            2
        );
        assert_eq!(
            CliRunError::Export(ConversionError::EmptyTitle).exit_code(),
            3
        );
    }
}
