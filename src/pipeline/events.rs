//! Push-event contract to the presentation layer.

use std::sync::Arc;

use uuid::Uuid;

use crate::models::RecognitionResult;

/// Events published by the pipeline. Consumers subscribe to the stream and
/// never poll internal state; all events carry the document they belong to
/// so stale subscribers can filter after a new document replaces the old.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Decomposition of a newly opened document has begun.
    DecompositionStarted { document: Uuid },

    /// The page count is known; indices run 0..total.
    PageCount { document: Uuid, total: usize },

    /// A page finished recognition. Arrival order follows completion order;
    /// display order is the index.
    PageReady {
        document: Uuid,
        index: usize,
        result: Arc<RecognitionResult>,
    },

    /// A page failed decoding or recognition; siblings are unaffected.
    PageFailed {
        document: Uuid,
        index: usize,
        reason: String,
    },

    /// Monotonic progress. Failed pages count as completed.
    Progress {
        document: Uuid,
        completed: usize,
        total: usize,
    },

    /// Every page reached a terminal status.
    DocumentComplete { document: Uuid },

    /// Fatal document-level failure; no pages were processed.
    DocumentFailed { document: Uuid, reason: String },

    /// The run was cancelled. No `PageReady` follows this event.
    DocumentCancelled { document: Uuid },
}

impl PipelineEvent {
    /// The document this event belongs to.
    pub fn document(&self) -> Uuid {
        match self {
            Self::DecompositionStarted { document }
            | Self::PageCount { document, .. }
            | Self::PageReady { document, .. }
            | Self::PageFailed { document, .. }
            | Self::Progress { document, .. }
            | Self::DocumentComplete { document }
            | Self::DocumentFailed { document, .. }
            | Self::DocumentCancelled { document } => *document,
        }
    }
}
