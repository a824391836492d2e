//! Tesseract engine adapter.
//!
//! Invokes the `tesseract` binary with the `tsv` output config and parses
//! word boxes, confidences, and layout numbers from the TSV rows.

use std::path::Path;
use std::process::Command;

use tracing::debug;

use super::{check_binary, EngineError, RecognitionEngine};
use crate::models::{BoundingBox, LanguageConfig, RecognitionResult, WordBox};

/// Tesseract OCR reached via its command-line interface.
pub struct TesseractEngine {
    /// Page segmentation mode passed as `--psm`, if set.
    psm: Option<u32>,
}

impl TesseractEngine {
    pub fn new() -> Self {
        Self { psm: None }
    }

    /// Set the page segmentation mode.
    pub fn with_psm(mut self, psm: u32) -> Self {
        self.psm = Some(psm);
        self
    }

    /// Run tesseract on an image, returning the raw TSV output.
    fn run_tesseract(
        &self,
        image: &Path,
        languages: &LanguageConfig,
    ) -> Result<String, EngineError> {
        let mut cmd = Command::new("tesseract");
        cmd.arg(image)
            .arg("stdout")
            .args(["-l", &languages.joined()]);
        if let Some(psm) = self.psm {
            cmd.args(["--psm", &psm.to_string()]);
        }
        cmd.arg("tsv");

        match cmd.output() {
            Ok(output) => {
                if output.status.success() {
                    Ok(String::from_utf8_lossy(&output.stdout).to_string())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(EngineError::Recognition(format!(
                        "tesseract failed: {}",
                        stderr.trim()
                    )))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EngineError::NotAvailable(
                "tesseract not found (install tesseract-ocr)".to_string(),
            )),
            Err(e) => Err(EngineError::Io(e)),
        }
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecognitionEngine for TesseractEngine {
    fn recognize(
        &self,
        image: &Path,
        languages: &LanguageConfig,
    ) -> Result<RecognitionResult, EngineError> {
        let tsv = self.run_tesseract(image, languages)?;
        let words = parse_tsv(&tsv);
        debug!(image = %image.display(), words = words.len(), "tesseract pass done");
        Ok(RecognitionResult::from_words(words))
    }

    fn is_available(&self) -> bool {
        check_binary("tesseract")
    }

    fn availability_hint(&self) -> String {
        if check_binary("tesseract") {
            "Tesseract is available".to_string()
        } else {
            "Tesseract not installed. Install with: apt install tesseract-ocr".to_string()
        }
    }
}

/// Parse tesseract TSV output into word boxes.
///
/// Columns: level, page_num, block_num, par_num, line_num, word_num, left,
/// top, width, height, conf, text. Word rows have level 5; rows with a
/// negative confidence are layout markers and carry no text. Malformed rows
/// are skipped rather than failing the page.
fn parse_tsv(tsv: &str) -> Vec<WordBox> {
    let mut words = Vec::new();

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        if cols[0].parse::<u32>() != Ok(5) {
            continue;
        }
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if conf < 0.0 || text.is_empty() {
            continue;
        }

        let (Ok(block), Ok(paragraph), Ok(line)) =
            (cols[2].parse(), cols[3].parse(), cols[4].parse())
        else {
            continue;
        };
        let (Ok(x), Ok(y), Ok(width), Ok(height)) = (
            cols[6].parse(),
            cols[7].parse(),
            cols[8].parse(),
            cols[9].parse(),
        ) else {
            continue;
        };

        words.push(WordBox {
            text: text.to_string(),
            confidence: conf.clamp(0.0, 100.0),
            bounds: BoundingBox {
                x,
                y,
                width,
                height,
            },
            block,
            paragraph,
            line,
        });
    }

    words
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn test_parse_tsv_words_only() {
        let tsv = format!(
            "{HEADER}\n\
             1\t1\t0\t0\t0\t0\t0\t0\t600\t800\t-1\t\n\
             5\t1\t1\t1\t1\t1\t10\t20\t80\t30\t96.5\tHello\n\
             5\t1\t1\t1\t1\t2\t100\t20\t90\t30\t88\tworld\n\
             5\t1\t1\t1\t2\t1\t10\t60\t60\t30\t42\tagain\n"
        );
        let words = parse_tsv(&tsv);
        assert_eq!(words.len(), 3);
        assert_eq!(words[0].text, "Hello");
        assert_eq!(words[0].bounds.x, 10);
        assert!((words[0].confidence - 96.5).abs() < f32::EPSILON);
        assert_eq!(words[2].line, 2);
    }

    #[test]
    fn test_parse_tsv_skips_markers_and_blanks() {
        let tsv = format!(
            "{HEADER}\n\
             2\t1\t1\t0\t0\t0\t0\t0\t600\t100\t-1\t\n\
             5\t1\t1\t1\t1\t1\t10\t20\t80\t30\t-1\t \n\
             5\t1\t1\t1\t1\t2\t10\t20\t80\t30\t70\t   \n\
             not\ta\tvalid\trow\n"
        );
        assert!(parse_tsv(&tsv).is_empty());
    }

    #[test]
    fn test_parse_tsv_builds_plain_text() {
        let tsv = format!(
            "{HEADER}\n\
             5\t1\t1\t1\t1\t1\t10\t20\t80\t30\t90\tfirst\n\
             5\t1\t1\t1\t1\t2\t100\t20\t80\t30\t90\tline\n\
             5\t1\t2\t1\t1\t1\t10\t120\t80\t30\t90\tsecond\n"
        );
        let result = RecognitionResult::from_words(parse_tsv(&tsv));
        assert_eq!(result.text, "first line\nsecond");
    }

    #[test]
    fn test_confidence_clamped_to_range() {
        let tsv = format!("{HEADER}\n5\t1\t1\t1\t1\t1\t0\t0\t1\t1\t120.0\tloud\n");
        let words = parse_tsv(&tsv);
        assert_eq!(words[0].confidence, 100.0);
    }
}
