//! Result aggregation: unordered completions into ordered page slots.
//!
//! One aggregator task runs for the lifetime of a session and is the single
//! writer for page status and result slots. Everything it accepts is keyed
//! by page index, which restores display order no matter what order the
//! pool finishes jobs in.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::models::PageStatus;

use super::events::PipelineEvent;
use super::phase::PipelinePhase;
use super::run::DocumentRun;
use super::worker::{JobOutcome, RecognizeJob};

/// Consume the pool's completion stream until the session shuts down.
pub(crate) async fn run_aggregator(
    mut results: mpsc::Receiver<(RecognizeJob, JobOutcome)>,
    current: Arc<RwLock<Option<Arc<DocumentRun>>>>,
    events: mpsc::UnboundedSender<PipelineEvent>,
) {
    while let Some((job, outcome)) = results.recv().await {
        let Some(run) = current.read().clone() else {
            continue;
        };
        if run.id() != job.document {
            debug!(page = job.page_index, "discarding outcome for replaced document");
            continue;
        }
        record(&run, &job, outcome, &events);
    }
    debug!("aggregator shutting down");
}

/// Record one completion against its page slot.
///
/// All writes and event sends happen under the run's state lock, so the
/// event stream can never show a page landing after cancellation or a
/// non-monotonic progress pair.
fn record(
    run: &DocumentRun,
    job: &RecognizeJob,
    outcome: JobOutcome,
    events: &mpsc::UnboundedSender<PipelineEvent>,
) {
    let document = run.id();
    let mut state = run.state.write();

    if state.phase == PipelinePhase::Cancelled || run.cancel.is_cancelled() {
        debug!(page = job.page_index, "discarding outcome for cancelled document");
        return;
    }
    if job.pass != run.pass() {
        debug!(
            page = job.page_index,
            job_pass = job.pass,
            "discarding outcome from superseded pass"
        );
        return;
    }
    let Some(slot) = state.slots.get_mut(job.page_index) else {
        debug!(page = job.page_index, "discarding outcome for unknown page");
        return;
    };

    match outcome {
        JobOutcome::Started => {
            if slot.status == PageStatus::Pending {
                slot.status = PageStatus::Running;
            }
            return;
        }
        JobOutcome::Skipped => return,
        JobOutcome::Done(result) => {
            if slot.status.is_terminal() {
                debug!(page = job.page_index, "duplicate outcome discarded");
                return;
            }
            let result = Arc::new(result);
            slot.status = PageStatus::Done;
            slot.result = Some(Arc::clone(&result));
            slot.error = None;
            run.store().on_result(job.page_index, &result.text);
            state.completed += 1;
            let _ = events.send(PipelineEvent::PageReady {
                document,
                index: job.page_index,
                result,
            });
        }
        JobOutcome::Failed(err) => {
            if slot.status.is_terminal() {
                debug!(page = job.page_index, "duplicate outcome discarded");
                return;
            }
            let reason = err.to_string();
            slot.status = PageStatus::Failed;
            slot.result = None;
            slot.error = Some(reason.clone());
            state.completed += 1;
            let _ = events.send(PipelineEvent::PageFailed {
                document,
                index: job.page_index,
                reason,
            });
        }
    }

    if let Some(total) = state.total {
        let _ = events.send(PipelineEvent::Progress {
            document,
            completed: state.completed,
            total,
        });
        if state.completed == total && state.phase == PipelinePhase::Recognizing {
            state.phase = PipelinePhase::Complete;
            info!(document = %document, pages = total, "document complete");
            let _ = events.send(PipelineEvent::DocumentComplete { document });
        }
    }
}
