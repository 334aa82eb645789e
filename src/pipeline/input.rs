//! Input staging: turn a user-chosen file into an [`UploadTarget`].
//!
//! The MIME type decides whether a file may enter an orchestrator at all.
//! Files picked from disk get their MIME type from a content sniff of the
//! first bytes (`%PDF`), falling back to the extension, so a renamed PNG is
//! rejected before any network call is attempted.

use crate::error::{DwaniError, ValidationError};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub const PDF_MIME: &str = "application/pdf";
const OCTET_STREAM: &str = "application/octet-stream";

/// A file staged for upload.
#[derive(Clone)]
pub struct UploadTarget {
    bytes: Arc<[u8]>,
    mime_type: String,
    file_name: String,
}

impl std::fmt::Debug for UploadTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadTarget")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl UploadTarget {
    /// Stage raw bytes with a caller-declared MIME type (e.g. from a file
    /// picker). No validation happens here; see [`Self::validate`].
    pub fn new(bytes: impl Into<Arc<[u8]>>, mime_type: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            file_name: file_name.into(),
        }
    }

    /// Read a local file and stage it, sniffing its MIME type.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, DwaniError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DwaniError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => DwaniError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => DwaniError::Internal(format!("failed to read '{}': {e}", path.display())),
        })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.pdf".to_string());
        let mime_type = sniff_mime(&bytes, path);
        debug!("Staged '{}' ({} bytes, {})", file_name, bytes.len(), mime_type);

        Ok(Self::new(bytes, mime_type, file_name))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the bytes, cheap to clone into requests.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Lower-cased extension of the declared file name, if any.
    pub fn declared_extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case(PDF_MIME)
    }

    /// Reject anything that is not declared as a PDF.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.is_pdf() {
            Ok(())
        } else {
            Err(ValidationError::NotAPdf {
                mime_type: self.mime_type.clone(),
            })
        }
    }
}

/// Decide a MIME type from content first, extension second. A `.pdf` file
/// without the `%PDF` magic is not a PDF.
fn sniff_mime(bytes: &[u8], path: &Path) -> String {
    if bytes.starts_with(b"%PDF") {
        return PDF_MIME.to_string();
    }
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase) {
        Some(ext) if ext == "png" => "image/png".to_string(),
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg".to_string(),
        Some(ext) if ext == "txt" => "text/plain".to_string(),
        _ => OCTET_STREAM.to_string(),
    }
}
