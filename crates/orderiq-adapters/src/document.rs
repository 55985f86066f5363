//! Document text extraction via the poppler / tesseract toolchain.
//!
//! Digital text comes from `pdftotext`; when a document has no embedded
//! text layer the pages are rasterized with `pdftoppm` and run through
//! `tesseract` one page at a time, concatenating recognized text in page
//! order.  The escalation branch drives the digital-then-OCR sequencing;
//! this adapter only provides the two primitives.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use orderiq_pipeline::{DocumentExtractor, ExtractError};

use crate::error::{AdapterError, Result};

/// Rasterization resolution for the OCR path.
const OCR_DPI: u32 = 300;

/// Extraction toolchain binaries, overridable for non-standard installs.
#[derive(Debug, Clone)]
pub struct PopplerExtractor {
    pdftotext: String,
    pdftoppm: String,
    tesseract: String,
    dpi: u32,
}

impl Default for PopplerExtractor {
    fn default() -> Self {
        Self {
            pdftotext: "pdftotext".into(),
            pdftoppm: "pdftoppm".into(),
            tesseract: "tesseract".into(),
            dpi: OCR_DPI,
        }
    }
}

impl PopplerExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the binary names/paths.
    pub fn with_binaries(
        mut self,
        pdftotext: impl Into<String>,
        pdftoppm: impl Into<String>,
        tesseract: impl Into<String>,
    ) -> Self {
        self.pdftotext = pdftotext.into();
        self.pdftoppm = pdftoppm.into();
        self.tesseract = tesseract.into();
        self
    }

    /// Run a command and return its stdout, mapping spawn failures and
    /// non-zero exits to [`AdapterError::CommandFailed`].
    async fn run(&self, program: &str, args: &[&str]) -> Result<Vec<u8>> {
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| AdapterError::CommandFailed {
                command: program.to_owned(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(AdapterError::CommandFailed {
                command: program.to_owned(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        Ok(output.stdout)
    }

    async fn digital_text(&self, document: &Path) -> Result<String> {
        let doc = document.to_string_lossy();
        let stdout = self.run(&self.pdftotext, &["-layout", &doc, "-"]).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    async fn recognized_text(&self, document: &Path) -> Result<String> {
        let pages_dir = tempfile::tempdir()?;
        let prefix = pages_dir.path().join("page");
        let doc = document.to_string_lossy();
        let dpi = self.dpi.to_string();

        self.run(
            &self.pdftoppm,
            &[
                "-r",
                &dpi,
                "-png",
                &doc,
                &prefix.to_string_lossy(),
            ],
        )
        .await?;

        let pages = page_images(pages_dir.path())?;
        debug!(pages = pages.len(), "rasterized document for recognition");

        let mut texts = Vec::with_capacity(pages.len());
        for page in &pages {
            let stdout = self
                .run(&self.tesseract, &[&page.to_string_lossy(), "stdout"])
                .await?;
            texts.push(String::from_utf8_lossy(&stdout).into_owned());
        }

        Ok(texts.join("\n"))
    }
}

/// List rasterized page images in page order.
///
/// `pdftoppm` names pages `<prefix>-<n>.png` with zero padding that depends
/// on the page count, so ordering is by parsed page number rather than by
/// file name.
fn page_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pages: Vec<(u32, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if let Some(number) = page_number(&path) {
            pages.push((number, path));
        }
    }
    pages.sort_by_key(|(number, _)| *number);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

/// Parse the page number out of a `<prefix>-<n>.png` file name.
fn page_number(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    let digits = stem.rsplit('-').next()?;
    digits.parse().ok()
}

#[async_trait]
impl DocumentExtractor for PopplerExtractor {
    async fn extract_text(&self, document: &Path) -> std::result::Result<String, ExtractError> {
        self.digital_text(document)
            .await
            .map_err(|e| ExtractError::new(e.to_string()))
    }

    async fn ocr_text(&self, document: &Path) -> std::result::Result<String, ExtractError> {
        self.recognized_text(document)
            .await
            .map_err(|e| ExtractError::new(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_number_parses_padded_and_unpadded_names() {
        assert_eq!(page_number(Path::new("/tmp/x/page-1.png")), Some(1));
        assert_eq!(page_number(Path::new("/tmp/x/page-07.png")), Some(7));
        assert_eq!(page_number(Path::new("/tmp/x/page-12.png")), Some(12));
        assert_eq!(page_number(Path::new("/tmp/x/notes.txt")), None);
    }

    #[test]
    fn page_images_sort_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["page-10.png", "page-2.png", "page-1.png"] {
            std::fs::write(dir.path().join(name), b"png").unwrap();
        }

        let pages = page_images(dir.path()).unwrap();
        let names: Vec<String> = pages
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["page-1.png", "page-2.png", "page-10.png"]);
    }

    #[tokio::test]
    async fn missing_binary_is_a_command_failure() {
        let extractor = PopplerExtractor::new().with_binaries(
            "definitely-not-pdftotext",
            "definitely-not-pdftoppm",
            "definitely-not-tesseract",
        );

        let err = extractor
            .digital_text(Path::new("/tmp/nonexistent.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::CommandFailed { .. }));
    }
}
