//! Worker pool: bounded FIFO job queue over dedicated recognition threads.
//!
//! Jobs queue in submission order and may complete out of order; display
//! order is restored by the aggregator, never here. The engine call is
//! atomic and non-preemptible: cancellation skips jobs that have not
//! started, while a running call is left to finish and its outcome is
//! discarded downstream. A timed-out call keeps running on its detached
//! call thread until the engine returns; only its result is abandoned.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel as cb;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::{EngineError, RecognitionEngine};
use crate::models::{LanguageConfig, RecognitionResult};

/// Why a job did not produce a result.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("page could not be decoded: {0}")]
    Decode(String),
}

/// A single page-recognition job.
#[derive(Debug, Clone)]
pub struct RecognizeJob {
    pub document: Uuid,
    pub page_index: usize,
    pub image: PathBuf,
    pub languages: LanguageConfig,
    /// Recognition pass this job belongs to; outcomes from stale passes are
    /// discarded.
    pub pass: u64,
    pub attempt: u32,
    /// Document-scoped cancellation token.
    pub cancel: CancellationToken,
}

/// Unordered progress messages from the pool.
#[derive(Debug)]
pub enum JobOutcome {
    /// The engine call has begun; the page is running.
    Started,
    Done(RecognitionResult),
    Failed(JobError),
    /// Cancelled before the engine was invoked.
    Skipped,
}

/// Pool sizing and per-job policy.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Concurrent recognition slots.
    pub workers: usize,
    /// Queued jobs beyond which submission blocks (or is refused).
    pub queue_bound: usize,
    /// Budget for one engine call; overruns become failed outcomes.
    pub job_timeout: Duration,
    /// Bounded retry for failed calls. Timeouts are never retried.
    pub max_retries: u32,
}

/// Fixed-size pool of recognition workers.
///
/// Dropping the pool closes the queue; workers exit once it drains.
pub struct WorkerPool {
    job_tx: cb::Sender<RecognizeJob>,
    result_tx: mpsc::Sender<(RecognizeJob, JobOutcome)>,
}

impl WorkerPool {
    /// Spawn the pool. The returned receiver carries unordered completion
    /// messages and belongs to the aggregator.
    pub fn new(
        engine: Arc<dyn RecognitionEngine>,
        options: PoolOptions,
    ) -> (Self, mpsc::Receiver<(RecognizeJob, JobOutcome)>) {
        let workers = options.workers.max(1);
        let (job_tx, job_rx) = cb::bounded(options.queue_bound.max(1));
        let (result_tx, result_rx) = mpsc::channel(workers * 2);

        for i in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let engine = Arc::clone(&engine);
            let options = options.clone();
            thread::Builder::new()
                .name(format!("recognize-{i}"))
                .spawn(move || worker_loop(engine, job_rx, result_tx, options))
                .expect("failed to spawn recognition worker");
        }

        (Self { job_tx, result_tx }, result_rx)
    }

    /// Submit a job, waiting when the queue is full.
    pub async fn submit(&self, job: RecognizeJob) -> bool {
        match self.job_tx.try_send(job) {
            Ok(()) => true,
            Err(cb::TrySendError::Full(job)) => {
                debug!(page = job.page_index, "job queue full, waiting for a slot");
                let tx = self.job_tx.clone();
                tokio::task::spawn_blocking(move || tx.send(job).is_ok())
                    .await
                    .unwrap_or(false)
            }
            Err(cb::TrySendError::Disconnected(_)) => false,
        }
    }

    /// Submit without waiting; hands the job back when the queue is full.
    pub fn try_submit(&self, job: RecognizeJob) -> Result<(), RecognizeJob> {
        match self.job_tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(cb::TrySendError::Full(job)) | Err(cb::TrySendError::Disconnected(job)) => {
                Err(job)
            }
        }
    }

    /// Inject a completion directly. Pages that never reach the engine
    /// (decode failures) still need an outcome for progress accounting.
    pub(crate) async fn inject(&self, job: RecognizeJob, outcome: JobOutcome) {
        let _ = self.result_tx.send((job, outcome)).await;
    }
}

fn worker_loop(
    engine: Arc<dyn RecognitionEngine>,
    job_rx: cb::Receiver<RecognizeJob>,
    result_tx: mpsc::Sender<(RecognizeJob, JobOutcome)>,
    options: PoolOptions,
) {
    while let Ok(job) = job_rx.recv() {
        if job.cancel.is_cancelled() {
            debug!(page = job.page_index, "skipping job for cancelled document");
            let _ = result_tx.blocking_send((job, JobOutcome::Skipped));
            continue;
        }

        if result_tx
            .blocking_send((job.clone(), JobOutcome::Started))
            .is_err()
        {
            break;
        }
        let outcome = run_job(&engine, &job, &options);
        if result_tx.blocking_send((job, outcome)).is_err() {
            break;
        }
    }
}

fn run_job(
    engine: &Arc<dyn RecognitionEngine>,
    job: &RecognizeJob,
    options: &PoolOptions,
) -> JobOutcome {
    let mut attempt = job.attempt;
    loop {
        match recognize_with_timeout(engine, job, options.job_timeout) {
            Ok(result) => return JobOutcome::Done(result),
            Err(e @ EngineError::Timeout(_)) => {
                // Never re-queue a hung call; the stuck thread still holds
                // the engine.
                warn!(page = job.page_index, error = %e, "recognition timed out");
                return JobOutcome::Failed(JobError::Engine(e));
            }
            Err(e) if attempt < options.max_retries => {
                warn!(page = job.page_index, attempt, error = %e, "recognition failed, retrying");
                attempt += 1;
            }
            Err(e) => return JobOutcome::Failed(JobError::Engine(e)),
        }
    }
}

/// Run the engine call on a detached thread so an unresponsive engine only
/// costs us the outcome, not the worker.
fn recognize_with_timeout(
    engine: &Arc<dyn RecognitionEngine>,
    job: &RecognizeJob,
    timeout: Duration,
) -> Result<RecognitionResult, EngineError> {
    let (tx, rx) = cb::bounded(1);
    let engine = Arc::clone(engine);
    let image = job.image.clone();
    let languages = job.languages.clone();

    thread::Builder::new()
        .name("recognize-call".to_string())
        .spawn(move || {
            let _ = tx.send(engine.recognize(&image, &languages));
        })
        .map_err(|e| EngineError::Recognition(format!("failed to spawn engine call: {e}")))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(cb::RecvTimeoutError::Timeout) => Err(EngineError::Timeout(timeout)),
        Err(cb::RecvTimeoutError::Disconnected) => {
            Err(EngineError::Recognition("engine call panicked".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{word_result, ScriptedEngine};

    fn options(workers: usize) -> PoolOptions {
        PoolOptions {
            workers,
            queue_bound: 16,
            job_timeout: Duration::from_secs(5),
            max_retries: 0,
        }
    }

    fn job(stem: &str, index: usize, cancel: &CancellationToken) -> RecognizeJob {
        RecognizeJob {
            document: Uuid::new_v4(),
            page_index: index,
            image: PathBuf::from(format!("{stem}.png")),
            languages: LanguageConfig::default(),
            pass: 1,
            attempt: 0,
            cancel: cancel.clone(),
        }
    }

    async fn collect_done(
        rx: &mut mpsc::Receiver<(RecognizeJob, JobOutcome)>,
        count: usize,
    ) -> Vec<(usize, JobOutcome)> {
        let mut done = Vec::new();
        while done.len() < count {
            let (job, outcome) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("pool stalled")
                .expect("pool closed");
            if !matches!(outcome, JobOutcome::Started) {
                done.push((job.page_index, outcome));
            }
        }
        done
    }

    #[tokio::test]
    async fn test_jobs_complete_out_of_submission_order() {
        let engine = Arc::new(
            ScriptedEngine::new()
                .page("p0", 120, word_result("slow", 90.0))
                .page("p1", 10, word_result("fast", 90.0)),
        );
        let (pool, mut rx) = WorkerPool::new(engine, options(2));
        let cancel = CancellationToken::new();

        assert!(pool.submit(job("p0", 0, &cancel)).await);
        assert!(pool.submit(job("p1", 1, &cancel)).await);

        let done = collect_done(&mut rx, 2).await;
        let order: Vec<usize> = done.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![1, 0]);
        for (_, outcome) in done {
            assert!(matches!(outcome, JobOutcome::Done(_)));
        }
    }

    #[tokio::test]
    async fn test_cancelled_job_is_skipped_before_starting() {
        let engine = Arc::new(ScriptedEngine::new());
        let (pool, mut rx) = WorkerPool::new(engine, options(1));

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(pool.submit(job("p0", 0, &cancel)).await);

        let (_, outcome) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, JobOutcome::Skipped));
    }

    #[tokio::test]
    async fn test_timeout_becomes_failed_outcome() {
        let engine = Arc::new(ScriptedEngine::new().page("p0", 500, word_result("late", 90.0)));
        let mut opts = options(1);
        opts.job_timeout = Duration::from_millis(50);
        let (pool, mut rx) = WorkerPool::new(engine, opts);
        let cancel = CancellationToken::new();

        assert!(pool.submit(job("p0", 0, &cancel)).await);
        let done = collect_done(&mut rx, 1).await;
        assert!(matches!(
            done[0].1,
            JobOutcome::Failed(JobError::Engine(EngineError::Timeout(_)))
        ));
    }

    #[tokio::test]
    async fn test_bounded_retry_recovers_flaky_page() {
        let engine = Arc::new(ScriptedEngine::new().flaky_page("p0", 1, word_result("ok", 90.0)));
        let mut opts = options(1);
        opts.max_retries = 1;
        let (pool, mut rx) = WorkerPool::new(engine, opts);
        let cancel = CancellationToken::new();

        assert!(pool.submit(job("p0", 0, &cancel)).await);
        let done = collect_done(&mut rx, 1).await;
        assert!(matches!(done[0].1, JobOutcome::Done(_)));
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let engine = Arc::new(ScriptedEngine::new().flaky_page("p0", 1, word_result("ok", 90.0)));
        let (pool, mut rx) = WorkerPool::new(engine, options(1));
        let cancel = CancellationToken::new();

        assert!(pool.submit(job("p0", 0, &cancel)).await);
        let done = collect_done(&mut rx, 1).await;
        assert!(matches!(
            done[0].1,
            JobOutcome::Failed(JobError::Engine(EngineError::Recognition(_)))
        ));
    }

    #[tokio::test]
    async fn test_try_submit_refuses_when_full() {
        // One worker stuck on a slow page, queue bound of one: the first
        // queued job fits, the next is refused.
        let engine = Arc::new(ScriptedEngine::new().page("p0", 300, word_result("slow", 90.0)));
        let mut opts = options(1);
        opts.queue_bound = 1;
        let (pool, mut rx) = WorkerPool::new(engine, opts);
        let cancel = CancellationToken::new();

        assert!(pool.submit(job("p0", 0, &cancel)).await);
        // Give the worker time to pull the first job off the queue.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(pool.try_submit(job("p1", 1, &cancel)).is_ok());
        assert!(pool.try_submit(job("p2", 2, &cancel)).is_err());

        let _ = collect_done(&mut rx, 2).await;
    }
}
