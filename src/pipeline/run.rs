//! Shared state for one document run.
//!
//! The run is the single place page status, results, and phase live.
//! Writers are deliberately narrow: the aggregator owns status/result
//! mutation, the presentation layer owns text edits (through the store),
//! and the controller owns phase changes. Events are sent while the state
//! lock is held so the stream order always matches the state order; in
//! particular, nothing follows `DocumentCancelled`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Document, LanguageConfig, Page, PageStatus, RecognitionResult, WordBox};

use super::events::PipelineEvent;
use super::phase::PipelinePhase;
use super::store::PageStateStore;
use super::worker::RecognizeJob;

/// One page slot: status plus the active result for the current pass.
#[derive(Debug, Clone)]
pub(crate) struct PageSlot {
    pub status: PageStatus,
    pub image: Option<PathBuf>,
    pub result: Option<Arc<RecognitionResult>>,
    pub error: Option<String>,
}

impl PageSlot {
    fn new() -> Self {
        Self {
            status: PageStatus::Pending,
            image: None,
            result: None,
            error: None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct RunState {
    pub phase: PipelinePhase,
    pub total: Option<usize>,
    pub completed: usize,
    pub slots: Vec<PageSlot>,
}

/// One open document and everything mutable about its processing.
pub struct DocumentRun {
    id: Uuid,
    document: RwLock<Document>,
    pub(crate) state: RwLock<RunState>,
    store: PageStateStore,
    pub(crate) cancel: CancellationToken,
    pass: AtomicU64,
    /// Owns the rasterized page images; cleaned up when the run is dropped.
    workdir: TempDir,
}

impl DocumentRun {
    pub(crate) fn new(document: Document, workdir: TempDir) -> Self {
        Self {
            id: document.id,
            document: RwLock::new(document),
            state: RwLock::new(RunState {
                phase: PipelinePhase::Idle,
                total: None,
                completed: 0,
                slots: Vec::new(),
            }),
            store: PageStateStore::new(),
            cancel: CancellationToken::new(),
            pass: AtomicU64::new(1),
            workdir,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> PipelinePhase {
        self.state.read().phase
    }

    /// (completed, total); total is unknown until decomposition reports it.
    pub fn progress(&self) -> (usize, Option<usize>) {
        let state = self.state.read();
        (state.completed, state.total)
    }

    /// Snapshot of one page.
    pub fn page(&self, index: usize) -> Option<Page> {
        let state = self.state.read();
        state.slots.get(index).map(|slot| Page {
            index,
            image: slot.image.clone(),
            status: slot.status,
        })
    }

    /// Snapshot of all pages in index order.
    pub fn pages(&self) -> Vec<Page> {
        let state = self.state.read();
        state
            .slots
            .iter()
            .enumerate()
            .map(|(index, slot)| Page {
                index,
                image: slot.image.clone(),
                status: slot.status,
            })
            .collect()
    }

    /// The active recognition result for a page, if it has one.
    pub fn result(&self, index: usize) -> Option<Arc<RecognitionResult>> {
        self.state.read().slots.get(index)?.result.clone()
    }

    /// Why a page failed, if it did.
    pub fn page_error(&self, index: usize) -> Option<String> {
        self.state.read().slots.get(index)?.error.clone()
    }

    pub fn store(&self) -> &PageStateStore {
        &self.store
    }

    pub fn languages(&self) -> LanguageConfig {
        self.document.read().languages.clone()
    }

    pub fn threshold(&self) -> u8 {
        self.document.read().threshold()
    }

    pub fn set_threshold(&self, threshold: u8) {
        self.document.write().set_threshold(threshold);
    }

    pub fn set_page_threshold(&self, index: usize, threshold: Option<u8>) {
        self.document.write().set_page_threshold(index, threshold);
    }

    /// Word boxes visible at the page's effective threshold.
    pub fn visible_words(&self, index: usize) -> Option<Vec<WordBox>> {
        let result = self.result(index)?;
        let threshold = self.document.read().threshold_for(index);
        Some(result.visible_words(threshold).into_iter().cloned().collect())
    }

    /// Text for display and export: the user's edits when present,
    /// otherwise the recognition text filtered at the effective threshold.
    pub fn display_text(&self, index: usize) -> Option<String> {
        if self.store.is_edited(index) {
            return self.store.text(index);
        }
        let result = self.result(index)?;
        let threshold = self.document.read().threshold_for(index);
        Some(result.filtered_text(threshold))
    }

    pub(crate) fn workdir_path(&self) -> PathBuf {
        self.workdir.path().to_path_buf()
    }

    pub(crate) fn pass(&self) -> u64 {
        self.pass.load(Ordering::SeqCst)
    }

    pub(crate) fn job_for(&self, index: usize, image: PathBuf) -> RecognizeJob {
        RecognizeJob {
            document: self.id,
            page_index: index,
            image,
            languages: self.languages(),
            pass: self.pass(),
            attempt: 0,
            cancel: self.cancel.clone(),
        }
    }

    /// Idle → Decomposing, announcing the new document.
    pub(crate) fn start_decomposing(&self, events: &mpsc::UnboundedSender<PipelineEvent>) {
        let mut state = self.state.write();
        if self.set_phase(&mut state, PipelinePhase::Decomposing) {
            let _ = events.send(PipelineEvent::DecompositionStarted { document: self.id });
        }
    }

    /// Fix the page count and create the slots. Idempotent.
    pub(crate) fn begin_pages(&self, total: usize, events: &mpsc::UnboundedSender<PipelineEvent>) {
        let mut state = self.state.write();
        if state.total.is_some() {
            return;
        }
        state.total = Some(total);
        state.slots = (0..total).map(|_| PageSlot::new()).collect();
        self.store.reset(total);
        let _ = events.send(PipelineEvent::PageCount {
            document: self.id,
            total,
        });
    }

    /// Decomposing → Recognizing on the first page emitted.
    pub(crate) fn enter_recognizing(&self) {
        let mut state = self.state.write();
        if state.phase == PipelinePhase::Decomposing {
            self.set_phase(&mut state, PipelinePhase::Recognizing);
        }
    }

    pub(crate) fn set_page_image(&self, index: usize, image: &Path) {
        let mut state = self.state.write();
        if let Some(slot) = state.slots.get_mut(index) {
            slot.image = Some(image.to_path_buf());
        }
    }

    /// Cancel an in-flight run. Returns false when there was nothing to
    /// cancel (already terminal), making the entry point idempotent.
    pub(crate) fn cancel_run(&self, events: &mpsc::UnboundedSender<PipelineEvent>) -> bool {
        let mut state = self.state.write();
        if !matches!(
            state.phase,
            PipelinePhase::Decomposing | PipelinePhase::Recognizing
        ) {
            return false;
        }
        self.set_phase(&mut state, PipelinePhase::Cancelled);
        self.cancel.cancel();
        for slot in &mut state.slots {
            if !slot.status.is_terminal() {
                slot.status = PageStatus::Cancelled;
            }
        }
        let _ = events.send(PipelineEvent::DocumentCancelled { document: self.id });
        true
    }

    /// Record a fatal document-level failure.
    pub(crate) fn fail(&self, reason: &str, events: &mpsc::UnboundedSender<PipelineEvent>) {
        let mut state = self.state.write();
        if state.phase != PipelinePhase::Decomposing {
            // Cancelled in the meantime, or failure arrived after pages
            // started flowing; per-page errors cover the latter.
            return;
        }
        self.set_phase(&mut state, PipelinePhase::Failed);
        let _ = events.send(PipelineEvent::DocumentFailed {
            document: self.id,
            reason: reason.to_string(),
        });
    }

    /// Start a new recognition pass over the already-decomposed pages.
    ///
    /// Returns per-page (index, image, last error) specs for the dispatch,
    /// or `None` when the run is not in a phase that allows a re-run.
    #[allow(clippy::type_complexity)]
    pub(crate) fn begin_rerun(
        &self,
        languages: Option<LanguageConfig>,
    ) -> Option<Vec<(usize, Option<PathBuf>, Option<String>)>> {
        let specs = {
            let mut state = self.state.write();
            // Only a finished pass may be superseded; a run still
            // decomposing or recognizing keeps its current pass.
            if state.phase != PipelinePhase::Complete {
                return None;
            }
            if !self.set_phase(&mut state, PipelinePhase::Recognizing) {
                return None;
            }
            self.pass.fetch_add(1, Ordering::SeqCst);
            state.completed = 0;
            let mut specs = Vec::with_capacity(state.slots.len());
            for (index, slot) in state.slots.iter_mut().enumerate() {
                specs.push((index, slot.image.clone(), slot.error.clone()));
                slot.status = PageStatus::Pending;
                slot.result = None;
                slot.error = None;
            }
            specs
        };

        if let Some(languages) = languages {
            self.document.write().languages = languages;
        }
        info!(document = %self.id, pass = self.pass(), "recognition re-run started");
        Some(specs)
    }

    /// Apply a validated phase change. Logs and rejects invalid transitions.
    fn set_phase(&self, state: &mut RunState, next: PipelinePhase) -> bool {
        if !state.phase.can_transition_to(next) {
            warn!(document = %self.id, from = %state.phase, to = %next, "invalid phase transition");
            return false;
        }
        info!(document = %self.id, from = %state.phase, to = %next, "phase transition");
        state.phase = next;
        true
    }
}
