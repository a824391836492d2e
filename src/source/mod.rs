//! Document decomposition: one input file into ordered page images.
//!
//! Runs on a blocking execution path (the controller wraps it in
//! `spawn_blocking`) so rasterizing a large PDF never stalls the async side.
//! PDF pages are rasterized one at a time with `pdftoppm -f N -l N`,
//! bounding peak memory on large documents; image inputs pass straight
//! through as a single page.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::check_binary;

/// Fatal, whole-document decomposition failure. No pages are emitted.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("cannot read document: {0}")]
    Unreadable(String),

    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("document has no pages")]
    Empty,

    #[error("external tool not found: {0}")]
    ToolNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One page unreadable within an otherwise good document.
#[derive(Debug, Error)]
pub enum PageDecodeError {
    #[error("pdftoppm failed on page {page}: {detail}")]
    Rasterize { page: usize, detail: String },

    #[error("no image produced for page {0}")]
    Missing(usize),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Items emitted while a document is being decomposed.
#[derive(Debug)]
pub enum SourceEvent {
    /// Total page count; always sent before any page.
    PageCount(usize),
    /// A page image is ready for recognition.
    Page { index: usize, image: PathBuf },
    /// One page could not be rasterized; siblings are unaffected.
    PageFailed { index: usize, reason: String },
}

/// Kind of input, sniffed from leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
    Pdf,
    Image,
}

/// Turns a document handle into an ordered sequence of page images.
#[derive(Debug, Clone)]
pub struct PageSource {
    dpi: u32,
}

impl PageSource {
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }

    /// Decompose `input`, rasterizing PDF pages under `workdir`.
    ///
    /// Blocking. Emits [`SourceEvent`]s on `tx` and returns the page count.
    /// Stops early (still `Ok`) once `cancel` fires; a fatal error means no
    /// page event was sent.
    pub fn decompose(
        &self,
        input: &Path,
        workdir: &Path,
        tx: &mpsc::Sender<SourceEvent>,
        cancel: &CancellationToken,
    ) -> Result<usize, DocumentError> {
        match sniff_kind(input)? {
            InputKind::Image => {
                let _ = tx.blocking_send(SourceEvent::PageCount(1));
                let _ = tx.blocking_send(SourceEvent::Page {
                    index: 0,
                    image: input.to_path_buf(),
                });
                Ok(1)
            }
            InputKind::Pdf => self.decompose_pdf(input, workdir, tx, cancel),
        }
    }

    fn decompose_pdf(
        &self,
        input: &Path,
        workdir: &Path,
        tx: &mpsc::Sender<SourceEvent>,
        cancel: &CancellationToken,
    ) -> Result<usize, DocumentError> {
        if !check_binary("pdftoppm") {
            return Err(DocumentError::ToolNotFound(
                "pdftoppm (install poppler-utils)".to_string(),
            ));
        }

        let total = pdf_page_count(input)?;
        if total == 0 {
            return Err(DocumentError::Empty);
        }
        let _ = tx.blocking_send(SourceEvent::PageCount(total));

        for index in 0..total {
            if cancel.is_cancelled() {
                debug!(page = index, "decomposition cancelled");
                break;
            }
            match self.rasterize_page(input, index, workdir) {
                Ok(image) => {
                    let _ = tx.blocking_send(SourceEvent::Page { index, image });
                }
                Err(e) => {
                    warn!(page = index, error = %e, "page rasterization failed");
                    let _ = tx.blocking_send(SourceEvent::PageFailed {
                        index,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(total)
    }

    /// Rasterize a single PDF page to a PNG under `workdir`.
    fn rasterize_page(
        &self,
        pdf: &Path,
        index: usize,
        workdir: &Path,
    ) -> Result<PathBuf, PageDecodeError> {
        // pdftoppm page numbers are 1-based.
        let page_num = index + 1;
        let page_str = page_num.to_string();
        let dpi_str = self.dpi.to_string();

        let status = Command::new("pdftoppm")
            .args(["-png", "-r", &dpi_str, "-f", &page_str, "-l", &page_str])
            .arg(pdf)
            .arg(workdir.join("page"))
            .status()?;

        if !status.success() {
            return Err(PageDecodeError::Rasterize {
                page: index,
                detail: format!("exit status {status}"),
            });
        }

        find_page_image(workdir, page_num).ok_or(PageDecodeError::Missing(index))
    }
}

/// Find the image file for a specific 1-based page number.
fn find_page_image(workdir: &Path, page_num: usize) -> Option<PathBuf> {
    // pdftoppm pads the page number to the width of the document's last
    // page: page-3.png, page-03.png, page-003.png, ...
    for digits in [1, 2, 3, 4] {
        let filename = format!("page-{:0width$}.png", page_num, width = digits);
        let path = workdir.join(&filename);
        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Sniff the input kind from leading bytes.
fn sniff_kind(input: &Path) -> Result<InputKind, DocumentError> {
    let mut file = File::open(input)?;
    let mut buffer = [0u8; 8192];
    let bytes_read = file.read(&mut buffer)?;
    if bytes_read == 0 {
        return Err(DocumentError::Unreadable("empty file".to_string()));
    }

    let Some(detected) = infer::get(&buffer[..bytes_read]) else {
        return Err(DocumentError::UnsupportedType("unknown".to_string()));
    };
    let mime = detected.mime_type();

    if mime == "application/pdf" {
        Ok(InputKind::Pdf)
    } else if mime.starts_with("image/") {
        Ok(InputKind::Image)
    } else {
        Err(DocumentError::UnsupportedType(mime.to_string()))
    }
}

/// Get the page count of a PDF via pdfinfo.
fn pdf_page_count(input: &Path) -> Result<usize, DocumentError> {
    let output = match Command::new("pdfinfo").arg(input).output() {
        Ok(output) => output,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DocumentError::ToolNotFound(
                "pdfinfo (install poppler-utils)".to_string(),
            ));
        }
        Err(e) => return Err(DocumentError::Io(e)),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DocumentError::Unreadable(format!(
            "pdfinfo failed: {}",
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines() {
        if line.starts_with("Pages:") {
            if let Some(count) = line.split_whitespace().nth(1).and_then(|s| s.parse().ok()) {
                return Ok(count);
            }
        }
    }
    Err(DocumentError::Unreadable(
        "pdfinfo reported no page count".to_string(),
    ))
}

/// Availability of the external tools decomposition depends on.
pub fn required_tools() -> Vec<(&'static str, bool)> {
    ["pdftoppm", "pdfinfo"]
        .iter()
        .map(|tool| (*tool, check_binary(tool)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_sniff_pdf() {
        let file = write_temp(b"%PDF-1.4\n1 0 obj\n<< >>\nendobj\n");
        assert_eq!(sniff_kind(file.path()).unwrap(), InputKind::Pdf);
    }

    #[test]
    fn test_sniff_png() {
        let file = write_temp(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0]);
        assert_eq!(sniff_kind(file.path()).unwrap(), InputKind::Image);
    }

    #[test]
    fn test_sniff_rejects_unknown_bytes() {
        let file = write_temp(b"just some text, not a scan");
        assert!(matches!(
            sniff_kind(file.path()),
            Err(DocumentError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_sniff_missing_file() {
        assert!(matches!(
            sniff_kind(Path::new("/nonexistent/scan.pdf")),
            Err(DocumentError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_image_input_is_a_single_page() {
        let file = write_temp(&[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00]);
        let source = PageSource::new(300);
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let path = file.path().to_path_buf();
        let workdir = tempfile::tempdir().unwrap();
        let workdir_path = workdir.path().to_path_buf();
        let total = tokio::task::spawn_blocking(move || {
            source.decompose(&path, &workdir_path, &tx, &cancel)
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(total, 1);
        assert!(matches!(rx.recv().await, Some(SourceEvent::PageCount(1))));
        match rx.recv().await {
            Some(SourceEvent::Page { index: 0, image }) => assert_eq!(image, file.path()),
            other => panic!("expected page 0, got {other:?}"),
        }
        assert!(rx.recv().await.is_none());
    }
}
