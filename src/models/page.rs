//! Page model and recognition status lifecycle.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Recognition status of a single page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Pending,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal statuses never change within a recognition pass.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

/// A single page of an open document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// 0-based index; defines display and export order.
    pub index: usize,
    /// Rasterized page image. Absent when decoding the page failed.
    pub image: Option<PathBuf>,
    pub status: PageStatus,
}

impl Page {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            image: None,
            status: PageStatus::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            PageStatus::Pending,
            PageStatus::Running,
            PageStatus::Done,
            PageStatus::Failed,
            PageStatus::Cancelled,
        ] {
            assert_eq!(PageStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(PageStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!PageStatus::Pending.is_terminal());
        assert!(!PageStatus::Running.is_terminal());
        assert!(PageStatus::Done.is_terminal());
        assert!(PageStatus::Failed.is_terminal());
        assert!(PageStatus::Cancelled.is_terminal());
    }
}
