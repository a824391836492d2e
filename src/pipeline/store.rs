//! Per-page text state: recognition originals vs. user edits.

use parking_lot::RwLock;

/// Text state for one page.
#[derive(Debug, Clone)]
struct PageTextState {
    /// Text of the latest accepted recognition result.
    original: String,
    /// Editable text handed to the presentation layer and the exporter.
    current: String,
}

impl PageTextState {
    fn edited(&self) -> bool {
        self.current != self.original
    }
}

/// Editable text for every page of the open document.
///
/// Recognition output never silently clobbers proofread text: when a new
/// result lands on an edited page only `original` moves, and
/// `reset_to_original` is the single operation that discards edits.
#[derive(Debug, Default)]
pub struct PageStateStore {
    pages: RwLock<Vec<Option<PageTextState>>>,
}

impl PageStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size the store for a freshly decomposed document, discarding any
    /// previous state.
    pub(crate) fn reset(&self, total: usize) {
        *self.pages.write() = vec![None; total];
    }

    /// Record the text of a newly accepted recognition result.
    pub(crate) fn on_result(&self, index: usize, text: &str) {
        let mut pages = self.pages.write();
        if index >= pages.len() {
            pages.resize(index + 1, None);
        }
        match &mut pages[index] {
            Some(state) if state.edited() => {
                // Keep the user's text; it is now edited relative to the
                // new original.
                state.original = text.to_string();
            }
            slot => {
                *slot = Some(PageTextState {
                    original: text.to_string(),
                    current: text.to_string(),
                });
            }
        }
    }

    /// Current (possibly edited) text of a page.
    pub fn text(&self, index: usize) -> Option<String> {
        self.pages
            .read()
            .get(index)
            .and_then(|s| s.as_ref())
            .map(|s| s.current.clone())
    }

    /// Text of the latest recognition result for a page.
    pub fn original(&self, index: usize) -> Option<String> {
        self.pages
            .read()
            .get(index)
            .and_then(|s| s.as_ref())
            .map(|s| s.original.clone())
    }

    /// Replace a page's current text. Returns false when the page has no
    /// recognition result yet.
    pub fn set_text(&self, index: usize, text: &str) -> bool {
        let mut pages = self.pages.write();
        match pages.get_mut(index).and_then(|s| s.as_mut()) {
            Some(state) => {
                state.current = text.to_string();
                true
            }
            None => false,
        }
    }

    /// Discard edits, restoring the latest original. Returns false when the
    /// page has no recognition result yet.
    pub fn reset_to_original(&self, index: usize) -> bool {
        let mut pages = self.pages.write();
        match pages.get_mut(index).and_then(|s| s.as_mut()) {
            Some(state) => {
                state.current = state.original.clone();
                true
            }
            None => false,
        }
    }

    pub fn is_edited(&self, index: usize) -> bool {
        self.pages
            .read()
            .get(index)
            .and_then(|s| s.as_ref())
            .map(|s| s.edited())
            .unwrap_or(false)
    }

    /// Current text of every page in index order; `None` for pages without
    /// a result.
    pub fn texts(&self) -> Vec<Option<String>> {
        self.pages
            .read()
            .iter()
            .map(|s| s.as_ref().map(|s| s.current.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_seeds_both_texts() {
        let store = PageStateStore::new();
        store.reset(2);
        store.on_result(0, "recognized");
        assert_eq!(store.text(0), Some("recognized".to_string()));
        assert_eq!(store.original(0), Some("recognized".to_string()));
        assert!(!store.is_edited(0));
        assert_eq!(store.text(1), None);
    }

    #[test]
    fn test_edit_tracking() {
        let store = PageStateStore::new();
        store.reset(1);
        store.on_result(0, "recognized");
        assert!(store.set_text(0, "proofread"));
        assert!(store.is_edited(0));

        // Writing the original text back clears the edited flag.
        assert!(store.set_text(0, "recognized"));
        assert!(!store.is_edited(0));
    }

    #[test]
    fn test_rerun_preserves_edits() {
        let store = PageStateStore::new();
        store.reset(1);
        store.on_result(0, "first pass");
        store.set_text(0, "proofread");

        store.on_result(0, "second pass");
        assert_eq!(store.text(0), Some("proofread".to_string()));
        assert_eq!(store.original(0), Some("second pass".to_string()));
        assert!(store.is_edited(0));
    }

    #[test]
    fn test_rerun_replaces_unedited_text() {
        let store = PageStateStore::new();
        store.reset(1);
        store.on_result(0, "first pass");
        store.on_result(0, "second pass");
        assert_eq!(store.text(0), Some("second pass".to_string()));
        assert!(!store.is_edited(0));
    }

    #[test]
    fn test_reset_law() {
        let store = PageStateStore::new();
        store.reset(1);
        store.on_result(0, "original");
        store.set_text(0, "edited");

        assert!(store.reset_to_original(0));
        assert_eq!(store.text(0), store.original(0));
        assert!(!store.is_edited(0));
    }

    #[test]
    fn test_missing_page_operations() {
        let store = PageStateStore::new();
        store.reset(1);
        assert!(!store.set_text(0, "text"));
        assert!(!store.reset_to_original(0));
        assert!(!store.is_edited(0));
        assert_eq!(store.text(5), None);
    }
}
