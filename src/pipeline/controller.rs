//! Pipeline orchestration: document lifecycle, job dispatch, cancellation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::engine::RecognitionEngine;
use crate::models::{Document, LanguageConfig};
use crate::source::{DocumentError, PageSource, SourceEvent};

use super::aggregator::run_aggregator;
use super::events::PipelineEvent;
use super::phase::PipelinePhase;
use super::run::DocumentRun;
use super::worker::{JobError, JobOutcome, WorkerPool};

/// Orchestrates decomposition, recognition, and aggregation for one
/// document at a time.
///
/// The controller is an explicit session object: it owns the worker pool,
/// the event stream, and the current [`DocumentRun`]. Create one per
/// session; independent controllers in the same process do not share state.
pub struct PipelineController {
    config: PipelineConfig,
    source: PageSource,
    pool: Arc<WorkerPool>,
    events: mpsc::UnboundedSender<PipelineEvent>,
    current: Arc<RwLock<Option<Arc<DocumentRun>>>>,
}

impl PipelineController {
    /// Create a controller and the event stream its consumer subscribes to.
    ///
    /// Must be called inside a tokio runtime; the aggregator task starts
    /// immediately.
    pub fn new(
        engine: Arc<dyn RecognitionEngine>,
        config: PipelineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (pool, results_rx) = WorkerPool::new(engine, config.pool_options());
        let current = Arc::new(RwLock::new(None));

        tokio::spawn(run_aggregator(
            results_rx,
            Arc::clone(&current),
            events_tx.clone(),
        ));

        let controller = Self {
            source: PageSource::new(config.dpi),
            pool: Arc::new(pool),
            events: events_tx,
            current,
            config,
        };
        (controller, events_rx)
    }

    /// Open a document, implicitly cancelling any run still in flight.
    ///
    /// Returns as soon as the background work is spawned; outcomes arrive
    /// on the event stream.
    pub fn open(&self, path: &Path) -> Result<Uuid, DocumentError> {
        if let Some(old) = self.current.read().clone() {
            if old.cancel_run(&self.events) {
                info!(document = %old.id(), "cancelled in-flight document for replacement");
            }
        }

        let workdir = TempDir::new()?;
        let document = Document::new(
            path,
            self.config.languages.clone(),
            self.config.confidence_threshold,
        );
        let run = Arc::new(DocumentRun::new(document, workdir));
        let id = run.id();
        *self.current.write() = Some(Arc::clone(&run));

        run.start_decomposing(&self.events);
        self.spawn_run_tasks(run, path.to_path_buf());
        info!(document = %id, path = %path.display(), "document opened");
        Ok(id)
    }

    /// Cancel a document. Idempotent: completed, failed, already-cancelled,
    /// or replaced documents are left untouched.
    pub fn cancel(&self, document: Uuid) {
        let Some(run) = self.current.read().clone() else {
            return;
        };
        if run.id() != document {
            return;
        }
        if run.cancel_run(&self.events) {
            info!(document = %document, "document cancelled");
        }
    }

    /// Re-run recognition over the already-decomposed pages, optionally
    /// with a different language configuration. Only valid once the
    /// document is Complete; returns false otherwise.
    pub fn rerun(&self, languages: Option<LanguageConfig>) -> bool {
        let Some(run) = self.current.read().clone() else {
            return false;
        };
        let Some(pages) = run.begin_rerun(languages) else {
            return false;
        };

        let pool = Arc::clone(&self.pool);
        let dispatch_run = Arc::clone(&run);
        tokio::spawn(async move {
            for (index, image, last_error) in pages {
                match image {
                    Some(image) => {
                        let job = dispatch_run.job_for(index, image);
                        if !pool.submit(job).await {
                            warn!("worker pool unavailable, stopping re-run dispatch");
                            break;
                        }
                    }
                    None => {
                        // The page never rasterized; it fails again without
                        // touching the engine.
                        let reason =
                            last_error.unwrap_or_else(|| "page image unavailable".to_string());
                        let job = dispatch_run.job_for(index, PathBuf::new());
                        pool.inject(job, JobOutcome::Failed(JobError::Decode(reason)))
                            .await;
                    }
                }
            }
        });
        true
    }

    /// The current document run, if any.
    pub fn current(&self) -> Option<Arc<DocumentRun>> {
        self.current.read().clone()
    }

    /// Phase of the current run; Idle before the first document opens.
    pub fn phase(&self) -> PipelinePhase {
        self.current
            .read()
            .as_ref()
            .map(|run| run.phase())
            .unwrap_or(PipelinePhase::Idle)
    }

    fn spawn_run_tasks(&self, run: Arc<DocumentRun>, path: PathBuf) {
        let (src_tx, src_rx) = mpsc::channel(self.config.workers.max(1) * 2);
        let source = self.source.clone();
        let cancel = run.cancel.clone();
        let workdir = run.workdir_path();

        let watch_run = Arc::clone(&run);
        let watch_events = self.events.clone();
        let decomposition = tokio::task::spawn_blocking(move || {
            source.decompose(&path, &workdir, &src_tx, &cancel)
        });
        tokio::spawn(async move {
            match decomposition.await {
                Ok(Ok(total)) => debug!(total, "decomposition finished"),
                Ok(Err(e)) => watch_run.fail(&e.to_string(), &watch_events),
                Err(e) => watch_run.fail(&format!("decomposition task failed: {e}"), &watch_events),
            }
        });

        let pool = Arc::clone(&self.pool);
        let events = self.events.clone();
        tokio::spawn(dispatch_loop(run, src_rx, pool, events));
    }
}

/// Forward decomposed pages into the pool as they arrive, so recognition
/// overlaps decomposition instead of waiting for it.
async fn dispatch_loop(
    run: Arc<DocumentRun>,
    mut source: mpsc::Receiver<SourceEvent>,
    pool: Arc<WorkerPool>,
    events: mpsc::UnboundedSender<PipelineEvent>,
) {
    while let Some(event) = source.recv().await {
        if run.cancel.is_cancelled() {
            break;
        }
        match event {
            SourceEvent::PageCount(total) => run.begin_pages(total, &events),
            SourceEvent::Page { index, image } => {
                run.set_page_image(index, &image);
                run.enter_recognizing();
                let job = run.job_for(index, image);
                if !pool.submit(job).await {
                    warn!("worker pool unavailable, stopping dispatch");
                    break;
                }
            }
            SourceEvent::PageFailed { index, reason } => {
                run.enter_recognizing();
                let job = run.job_for(index, PathBuf::new());
                pool.inject(job, JobOutcome::Failed(JobError::Decode(reason)))
                    .await;
            }
        }
    }
}
