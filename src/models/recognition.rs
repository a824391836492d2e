//! Recognition results: word boxes with confidence and position metadata.
//!
//! Results are immutable once produced. Confidence filtering is a pure
//! projection over the stored words; changing a threshold never touches the
//! result itself, so re-filtering is cheap enough to run on every
//! interaction.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in page image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A single recognized word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordBox {
    pub text: String,
    /// Confidence in [0, 100].
    pub confidence: f32,
    pub bounds: BoundingBox,
    /// Layout coordinates, used to rebuild text lines.
    pub block: u32,
    pub paragraph: u32,
    pub line: u32,
}

/// Result of one recognition pass over one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    /// Words in reading order.
    pub words: Vec<WordBox>,
    /// Unfiltered plain-text rendering of `words`.
    pub text: String,
}

impl RecognitionResult {
    /// Build a result, deriving the plain-text rendering from the words.
    pub fn from_words(words: Vec<WordBox>) -> Self {
        let text = lines_from(words.iter());
        Self { words, text }
    }

    /// Words at or above the threshold. Pure projection over the stored
    /// words; the same input always yields the same set.
    pub fn visible_words(&self, threshold: u8) -> Vec<&WordBox> {
        let threshold = threshold.min(100) as f32;
        self.words
            .iter()
            .filter(|w| w.confidence >= threshold)
            .collect()
    }

    /// Plain text rebuilt from the visible words only.
    pub fn filtered_text(&self, threshold: u8) -> String {
        lines_from(self.visible_words(threshold).into_iter())
    }
}

/// Regroup words into text lines, breaking on any change of the
/// (block, paragraph, line) layout coordinates.
fn lines_from<'a>(words: impl Iterator<Item = &'a WordBox>) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut last: Option<(u32, u32, u32)> = None;

    for word in words {
        let key = (word.block, word.paragraph, word.line);
        if last.is_some() && last != Some(key) && !current.is_empty() {
            lines.push(current.join(" "));
            current.clear();
        }
        last = Some(key);
        current.push(&word.text);
    }
    if !current.is_empty() {
        lines.push(current.join(" "));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, confidence: f32, block: u32, par: u32, line: u32) -> WordBox {
        WordBox {
            text: text.to_string(),
            confidence,
            bounds: BoundingBox {
                x: 0,
                y: 0,
                width: 10,
                height: 10,
            },
            block,
            paragraph: par,
            line,
        }
    }

    #[test]
    fn test_lines_break_on_layout_change() {
        let result = RecognitionResult::from_words(vec![
            word("one", 90.0, 1, 1, 1),
            word("two", 90.0, 1, 1, 1),
            word("three", 90.0, 1, 1, 2),
            word("four", 90.0, 2, 1, 1),
        ]);
        assert_eq!(result.text, "one two\nthree\nfour");
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let result = RecognitionResult::from_words(vec![
            word("keep", 50.0, 1, 1, 1),
            word("drop", 49.9, 1, 1, 1),
        ]);
        let visible = result.visible_words(50);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].text, "keep");
    }

    #[test]
    fn test_filtering_is_idempotent_and_pure() {
        let result = RecognitionResult::from_words(vec![
            word("alpha", 95.0, 1, 1, 1),
            word("beta", 40.0, 1, 1, 1),
            word("gamma", 75.0, 1, 1, 2),
        ]);
        let before = result.clone();

        let first = result.filtered_text(60);
        let second = result.filtered_text(60);
        assert_eq!(first, second);
        assert_eq!(first, "alpha\ngamma");

        // Filtering must never mutate the stored result.
        assert_eq!(result, before);
    }

    #[test]
    fn test_low_confidence_word_hidden_but_text_intact() {
        // A page whose only word sits at confidence 40: a threshold of 50
        // hides it from the view without touching the page text.
        let result = RecognitionResult::from_words(vec![word("மதுரை", 40.0, 1, 1, 1)]);
        assert!(result.visible_words(50).is_empty());
        assert_eq!(result.filtered_text(50), "");
        assert_eq!(result.text, "மதுரை");
    }

    #[test]
    fn test_empty_result() {
        let result = RecognitionResult::from_words(vec![]);
        assert_eq!(result.text, "");
        assert!(result.visible_words(0).is_empty());
    }
}
