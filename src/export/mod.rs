//! Exporters. Consume the assembled [GeneratedBook](crate::model::GeneratedBook)
//! and produce complete archives in memory; nothing touches the filesystem
//! until a whole valid document exists, so there is never partial output.

pub mod docx;
pub mod epub;
pub mod markdown;

pub use docx::{docx_blocks, write_docx, write_docx_file, DocBlock};
pub use epub::{write_epub, write_epub_file};

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::model::GeneratedBook;

/// Errors from the exporters. Conversion failures surface synchronously and
/// abort only the specific export attempt.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Cannot export: book title is empty.")]
    EmptyTitle,

    #[error("Cannot export: book has no chapters.")]
    NoChapters,

    #[error("Cannot export: {got} of {expected} chapters generated; the book is incomplete.")]
    Incomplete { expected: usize, got: usize },

    #[error("Cannot write output file: {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl From<std::io::Error> for ConversionError {
    fn from(e: std::io::Error) -> Self {
        ConversionError::Zip(zip::result::ZipError::Io(e))
    }
}

pub(crate) fn validate_book(book: &GeneratedBook) -> Result<(), ConversionError> {
    if book.outline.title.trim().is_empty() {
        return Err(ConversionError::EmptyTitle);
    }
    if book.outline.chapters.is_empty() {
        return Err(ConversionError::NoChapters);
    }
    if book.chapters.len() != book.outline.chapters.len() {
        return Err(ConversionError::Incomplete {
            expected: book.outline.chapters.len(),
            got: book.chapters.len(),
        });
    }
    Ok(())
}

/// Build the archive in memory first, then write it in one go.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), ConversionError> {
    std::fs::write(path, bytes).map_err(|e| ConversionError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

pub(crate) fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{BookOutline, ChapterContent, ChapterOutline};

    /// A complete three-chapter book with the constrained Markdown dialect.
    pub(crate) fn sample_book(chapters: usize) -> GeneratedBook {
        let outline = BookOutline {
            title: "Tidal Gardens".to_string(),
            subtitle: "Growing Under Salt Spray".to_string(),
            description: "Coastal gardening without fighting the sea.".to_string(),
            back_cover_copy: "Plant where the tide decides.".to_string(),
            chapters: (1..=chapters)
                .map(|i| ChapterOutline {
                    title: format!("Chapter Title {}", i),
                    description: format!("Summary {}", i),
                })
                .collect(),
        };
        let chapters = (1..=chapters)
            .map(|i| ChapterContent {
                title: format!("Chapter Title {}", i),
                body: format!(
                    "Opening paragraph {i} with __bold__ words.\n\n\
                     ## A Section\n\n- first point\n- second point\n\n\
                     Closing _gentle_ thought.",
                    i = i
                ),
            })
            .collect();
        GeneratedBook {
            outline,
            author: "M. Saltmarsh".to_string(),
            chapters,
            cover: None,
        }
    }

    #[test]
    fn validate_rejects_empty_title() {
        let mut book = sample_book(1);
        book.outline.title.clear();
        assert!(matches!(
            validate_book(&book),
            Err(ConversionError::EmptyTitle)
        ));
    }

    #[test]
    fn validate_rejects_no_chapters() {
        let mut book = sample_book(1);
        book.outline.chapters.clear();
        book.chapters.clear();
        assert!(matches!(
            validate_book(&book),
            Err(ConversionError::NoChapters)
        ));
    }

    #[test]
    fn validate_rejects_incomplete_book() {
        let mut book = sample_book(3);
        book.chapters.pop();
        match validate_book(&book) {
            Err(ConversionError::Incomplete { expected, got }) => {
                assert_eq!(expected, 3);
                assert_eq!(got, 2);
            }
            other => panic!("expected Incomplete, got {:?}", other),
        }
    }

    #[test]
    fn xml_escape_covers_the_five() {
        assert_eq!(
            xml_escape(r#"<a href="x">&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&apos;&lt;/a&gt;"
        );
    }
}
