//! The page-processing pipeline.
//!
//! Decomposition fans pages out across a bounded worker pool; completions
//! come back unordered and are re-ordered into page slots by a single
//! aggregator task, which also drives progress events and the per-page text
//! store.

mod aggregator;
mod controller;
mod events;
mod phase;
mod run;
mod store;
mod worker;

pub use controller::PipelineController;
pub use events::PipelineEvent;
pub use phase::PipelinePhase;
pub use run::DocumentRun;
pub use store::PageStateStore;
pub use worker::{JobError, JobOutcome, PoolOptions, RecognizeJob, WorkerPool};
