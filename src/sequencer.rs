//! Resumable generation sequencer. Obtains the outline through the fallback
//! chain, then generates chapters strictly in order, snapshotting after every
//! state transition so an interrupted run resumes from the last persisted
//! chapter instead of starting over.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fallback::{FallbackChain, FallbackError};
use crate::model::{BookOutline, ChapterContent, GeneratedBook, GenerationOptions};

/// Default politeness delay between chapter calls. Not part of correctness.
pub const DEFAULT_PACING: Duration = Duration::from_millis(500);

/// Where a run currently stands. `ChapterInProgress` carries the 0-based index
/// being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    Idle,
    OutlinePending,
    OutlineReady,
    ChapterInProgress(usize),
    Complete,
    Errored,
}

/// Everything needed to resume a run: serialized after every state transition.
///
/// Invariant: `chapters` is always a prefix of the outline's chapter list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub state: RunState,
    pub options: GenerationOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outline: Option<BookOutline>,
    #[serde(default)]
    pub chapters: Vec<ChapterContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl RunSnapshot {
    pub fn new(options: GenerationOptions) -> Self {
        Self {
            state: RunState::Idle,
            options,
            outline: None,
            chapters: Vec::new(),
            run_id: None,
        }
    }

    /// Count of chapters already persisted; resume re-enters here.
    pub fn completed_chapters(&self) -> usize {
        self.chapters.len()
    }
}

/// Best-effort failure from a run store. Logged, never propagated.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

/// Remote mirror of run progress. Every call is best-effort: the sequencer
/// logs failures at warn level and keeps going.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create_run(&self, options: &GenerationOptions) -> Result<String, StoreError>;
    async fn attach_outline(&self, run_id: &str, outline: &BookOutline) -> Result<(), StoreError>;
    async fn append_chapter(
        &self,
        run_id: &str,
        chapter: &ChapterContent,
        index: usize,
        description: &str,
    ) -> Result<(), StoreError>;
    async fn mark_complete(&self, run_id: &str) -> Result<(), StoreError>;
}

/// Generation failure, split by stage: outline failures abort before any
/// chapter exists; chapter failures pause the run with prior content retained.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Outline generation failed: {0}")]
    Outline(#[source] FallbackError),

    #[error("Chapter {number} generation failed: {source}", number = .index + 1)]
    Chapter {
        index: usize,
        #[source]
        source: FallbackError,
    },
}

/// Callbacks and pacing for one run. Both callbacks are optional side
/// effects; neither influences control flow.
pub struct SequencerOptions<'a> {
    /// Called with (current 1-based chapter, total) before each chapter call.
    pub progress: Option<&'a dyn Fn(u32, u32)>,
    /// Called with the updated snapshot after every state transition.
    pub on_snapshot: Option<&'a dyn Fn(&RunSnapshot)>,
    /// Delay between chapter calls.
    pub pacing: Duration,
}

impl Default for SequencerOptions<'_> {
    fn default() -> Self {
        Self {
            progress: None,
            on_snapshot: None,
            pacing: DEFAULT_PACING,
        }
    }
}

/// Drives one run end to end. Chapter generation is strictly sequential:
/// chapter i+1 is not started until chapter i has succeeded or the run has
/// failed.
pub struct Sequencer<'a> {
    chain: &'a FallbackChain,
    store: Option<&'a dyn RunStore>,
}

impl<'a> Sequencer<'a> {
    pub fn new(chain: &'a FallbackChain) -> Self {
        Self { chain, store: None }
    }

    pub fn with_store(mut self, store: &'a dyn RunStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Start a fresh run from the given options.
    pub async fn generate(
        &self,
        options: GenerationOptions,
        opts: &SequencerOptions<'_>,
    ) -> Result<GeneratedBook, RunError> {
        self.drive(RunSnapshot::new(options), opts).await
    }

    /// Continue a run from a restored snapshot. Chapters already present are
    /// never re-generated; a snapshot without an outline restarts from the
    /// outline stage.
    pub async fn resume(
        &self,
        mut snapshot: RunSnapshot,
        opts: &SequencerOptions<'_>,
    ) -> Result<GeneratedBook, RunError> {
        // Repair anything a corrupt snapshot could sneak in: the chapter
        // sequence must stay a prefix of the outline.
        if let Some(outline) = &snapshot.outline {
            let total = outline.chapters.len();
            if snapshot.chapters.len() > total {
                snapshot.chapters.truncate(total);
            }
        } else {
            snapshot.chapters.clear();
        }
        self.drive(snapshot, opts).await
    }

    async fn drive(
        &self,
        mut snap: RunSnapshot,
        opts: &SequencerOptions<'_>,
    ) -> Result<GeneratedBook, RunError> {
        if snap.run_id.is_none() {
            if let Some(store) = self.store {
                match store.create_run(&snap.options).await {
                    Ok(id) => snap.run_id = Some(id),
                    Err(e) => tracing::warn!(error = %e, "run store create_run failed"),
                }
            }
        }

        let outline = match snap.outline.clone() {
            Some(outline) => outline,
            None => {
                snap.chapters.clear();
                self.transition(&mut snap, RunState::OutlinePending, opts);
                let outline = match self.chain.outline(&snap.options).await {
                    Ok(outline) => outline,
                    Err(e) => {
                        self.transition(&mut snap, RunState::Errored, opts);
                        return Err(RunError::Outline(e));
                    }
                };
                snap.outline = Some(outline.clone());
                self.transition(&mut snap, RunState::OutlineReady, opts);
                if let (Some(store), Some(id)) = (self.store, snap.run_id.as_deref()) {
                    if let Err(e) = store.attach_outline(id, &outline).await {
                        tracing::warn!(error = %e, "run store attach_outline failed");
                    }
                }
                outline
            }
        };

        let total = outline.chapters.len();
        while snap.chapters.len() < total {
            let index = snap.chapters.len();
            self.transition(&mut snap, RunState::ChapterInProgress(index), opts);
            if let Some(progress) = opts.progress {
                progress(index as u32 + 1, total as u32);
            }

            let entry = &outline.chapters[index];
            let body = match self
                .chain
                .chapter(&snap.options, &outline, entry, index, total)
                .await
            {
                Ok(body) => body,
                Err(e) => {
                    self.transition(&mut snap, RunState::Errored, opts);
                    return Err(RunError::Chapter { index, source: e });
                }
            };

            snap.chapters.push(ChapterContent {
                title: entry.title.clone(),
                body,
            });
            // Flush before the next chapter starts: at most one chapter of
            // work can be lost to an interruption.
            self.emit(&snap, opts);
            if let (Some(store), Some(id)) = (self.store, snap.run_id.as_deref()) {
                let chapter = &snap.chapters[index];
                if let Err(e) = store
                    .append_chapter(id, chapter, index, &entry.description)
                    .await
                {
                    tracing::warn!(error = %e, index, "run store append_chapter failed");
                }
            }

            if snap.chapters.len() < total {
                tokio::time::sleep(opts.pacing).await;
            }
        }

        self.transition(&mut snap, RunState::Complete, opts);
        if let (Some(store), Some(id)) = (self.store, snap.run_id.as_deref()) {
            if let Err(e) = store.mark_complete(id).await {
                tracing::warn!(error = %e, "run store mark_complete failed");
            }
        }

        let author = snap.options.author_or_default().to_string();
        Ok(GeneratedBook {
            outline,
            author,
            chapters: snap.chapters,
            cover: None,
        })
    }

    fn transition(&self, snap: &mut RunSnapshot, state: RunState, opts: &SequencerOptions<'_>) {
        snap.state = state;
        self.emit(snap, opts);
    }

    fn emit(&self, snap: &RunSnapshot, opts: &SequencerOptions<'_>) {
        if let Some(on_snapshot) = opts.on_snapshot {
            on_snapshot(snap);
        }
    }
}
