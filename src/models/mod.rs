//! Core data model: documents, pages, and recognition results.

mod document;
mod page;
mod recognition;

pub use document::{Document, LanguageConfig};
pub use page::{Page, PageStatus};
pub use recognition::{BoundingBox, RecognitionResult, WordBox};
