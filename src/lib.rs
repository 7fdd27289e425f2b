//! bookwright: generate a book with LLM providers (ordered fallback),
//! resumable chapter-by-chapter runs, and EPUB/DOCX export.

pub mod cli;
pub mod config;
pub mod export;
pub mod fallback;
pub mod model;
pub mod prompt;
pub mod provider;
pub mod sequencer;

// Re-exports for CLI and consumers.
pub use export::{write_docx, write_docx_file, write_epub, write_epub_file, ConversionError};
pub use fallback::{FallbackChain, FallbackError, ProviderFailure};
pub use model::{
    BookOutline, ChapterContent, ChapterOutline, CoverImage, GeneratedBook, GenerationOptions,
    LengthBucket, SizeTier,
};
pub use provider::{Provider, ProviderError, ProviderId};
pub use sequencer::{
    RunError, RunSnapshot, RunState, RunStore, Sequencer, SequencerOptions, StoreError,
};
