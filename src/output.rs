//! Result types produced by a successful document submission.
//!
//! Results are immutable: an orchestrator stores each one behind an `Arc`
//! and a later submission replaces it wholesale. Nothing here is persisted
//! beyond the life of the orchestrator except the output PDF, and only when
//! the caller asks for it via [`BinaryProcessingResult::save_output`].

use crate::error::DwaniError;
use crate::pipeline::render::PagePreview;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Text fields returned by a JSON document flow.
///
/// Every field is optional: the service omits what a flow does not produce
/// (no translation for plain summaries, for example).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub original_text: Option<String>,
    /// Summary or prompt answer, depending on the flow.
    pub primary_answer: Option<String>,
    pub translated_answer: Option<String>,
    pub processed_page: Option<u32>,
}

/// Outcome of a binary document flow: the service returned a PDF.
#[derive(Clone)]
pub struct BinaryProcessingResult {
    /// Text fields; empty for flows that only return a document.
    pub text: ProcessingResult,
    pub output_pdf: Arc<[u8]>,
    /// Name offered when the output is saved.
    pub download_name: String,
    /// `None` when the page count could not be determined.
    pub input_page_count: Option<usize>,
    pub output_page_count: Option<usize>,
    /// `None` means "preview unavailable".
    pub input_preview: Option<PagePreview>,
    pub output_preview: Option<PagePreview>,
}

impl std::fmt::Debug for BinaryProcessingResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryProcessingResult")
            .field("output_pdf_bytes", &self.output_pdf.len())
            .field("download_name", &self.download_name)
            .field("input_page_count", &self.input_page_count)
            .field("output_page_count", &self.output_page_count)
            .field("input_preview", &self.input_preview)
            .field("output_preview", &self.output_preview)
            .finish()
    }
}

impl BinaryProcessingResult {
    /// "Input PDF Info" block as shown next to the previews.
    pub fn input_info(&self) -> String {
        format!("Input PDF Info:\n- Number of pages: {}", self.input_page_count.unwrap_or(0))
    }

    /// "Output PDF Info" block as shown next to the previews.
    pub fn output_info(&self) -> String {
        format!("Output PDF Info:\n- Number of pages: {}", self.output_page_count.unwrap_or(0))
    }

    /// Write the output PDF into `dir` under [`Self::download_name`].
    ///
    /// The file is written to a temp file in the same directory and then
    /// persisted over the final name, so readers never observe a partial PDF.
    pub async fn save_output(&self, dir: impl AsRef<Path>) -> Result<PathBuf, DwaniError> {
        let dir = dir.as_ref().to_path_buf();
        let path = dir.join(&self.download_name);
        let bytes = Arc::clone(&self.output_pdf);
        let target = path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&dir, &target, &bytes))
            .await
            .map_err(|e| DwaniError::Internal(format!("save task panicked: {e}")))??;

        info!("Saved output PDF to {}", path.display());
        Ok(path)
    }
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), DwaniError> {
    let write_err = |source: std::io::Error| DwaniError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(write_err)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// What a successful submission produced.
#[derive(Debug, Clone)]
pub enum ProcessingOutcome {
    Text(ProcessingResult),
    Binary(BinaryProcessingResult),
}

impl ProcessingOutcome {
    /// Text fields, whichever variant this is.
    pub fn text(&self) -> &ProcessingResult {
        match self {
            ProcessingOutcome::Text(r) => r,
            ProcessingOutcome::Binary(b) => &b.text,
        }
    }

    pub fn as_binary(&self) -> Option<&BinaryProcessingResult> {
        match self {
            ProcessingOutcome::Binary(b) => Some(b),
            ProcessingOutcome::Text(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BinaryProcessingResult {
        BinaryProcessingResult {
            text: ProcessingResult::default(),
            output_pdf: Arc::from(&b"%PDF-1.4 fake"[..]),
            download_name: "translated_kannada_output.pdf".into(),
            input_page_count: Some(3),
            output_page_count: None,
            input_preview: None,
            output_preview: None,
        }
    }

    #[test]
    fn info_blocks() {
        let r = sample();
        assert_eq!(r.input_info(), "Input PDF Info:\n- Number of pages: 3");
        assert_eq!(r.output_info(), "Output PDF Info:\n- Number of pages: 0");
    }

    #[tokio::test]
    async fn save_output_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample().save_output(dir.path().join("out")).await.unwrap();
        assert!(path.ends_with("translated_kannada_output.pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4 fake");
    }

    #[test]
    fn outcome_text_accessor() {
        let text = ProcessingResult {
            primary_answer: Some("answer".into()),
            ..Default::default()
        };
        let outcome = ProcessingOutcome::Text(text.clone());
        assert_eq!(outcome.text(), &text);
        assert!(outcome.as_binary().is_none());
        assert!(ProcessingOutcome::Binary(sample()).as_binary().is_some());
    }
}
