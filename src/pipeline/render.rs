//! PDF preview rendering: page count and single-page rasterisation via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks while decoding. Every call is moved onto tokio's
//! blocking pool so the interaction loop never stalls on a large document.
//!
//! ## Lazy decode
//!
//! Loading a document only parses its trailer and page tree. Counting pages
//! never rasterises anything, and rendering touches exactly the requested
//! page, so a preview of page 1 of a 300-page scan costs one page.
//!
//! Every failure here is a [`PreviewError`]. Callers treat it as non-fatal:
//! log, show "preview unavailable", keep the text result.

use crate::config::{ClientConfig, MAX_PREVIEW_PIXELS};
use crate::error::PreviewError;
use crate::pipeline::encode;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// A rasterised page, PNG-encoded.
#[derive(Clone, PartialEq, Eq)]
pub struct PagePreview {
    /// 1-indexed page number.
    pub page: usize,
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

impl PagePreview {
    /// Inline `data:` URL for the PNG.
    pub fn data_url(&self) -> String {
        encode::png_data_url(&self.png)
    }
}

impl std::fmt::Debug for PagePreview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagePreview")
            .field("page", &self.page)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("png_bytes", &self.png.len())
            .finish()
    }
}

/// Decodes documents for previews.
///
/// [`PdfiumRenderer`] is the production implementation; orchestrators take
/// an `Arc<dyn PreviewRenderer>` so tests can substitute a stub.
#[async_trait]
pub trait PreviewRenderer: Send + Sync {
    async fn page_count(&self, bytes: Arc<[u8]>) -> Result<usize, PreviewError>;

    /// Rasterise page `page` (1-indexed).
    async fn render_page(&self, bytes: Arc<[u8]>, page: usize) -> Result<PagePreview, PreviewError>;
}

/// pdfium-backed renderer.
#[derive(Debug, Clone, Copy)]
pub struct PdfiumRenderer {
    scale: f32,
    max_pixels: u32,
}

impl PdfiumRenderer {
    pub fn new(scale: f32, max_pixels: u32) -> Self {
        Self { scale, max_pixels }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.preview_scale, config.max_preview_pixels)
    }
}

impl Default for PdfiumRenderer {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

#[async_trait]
impl PreviewRenderer for PdfiumRenderer {
    async fn page_count(&self, bytes: Arc<[u8]>) -> Result<usize, PreviewError> {
        get_page_count(bytes).await
    }

    async fn render_page(&self, bytes: Arc<[u8]>, page: usize) -> Result<PagePreview, PreviewError> {
        render_page_to_image(bytes, page, self.scale, self.max_pixels).await
    }
}

/// Count the pages of a PDF without rendering any of them.
pub async fn get_page_count(bytes: Arc<[u8]>) -> Result<usize, PreviewError> {
    tokio::task::spawn_blocking(move || page_count_blocking(&bytes))
        .await
        .map_err(|e| PreviewError::TaskPanicked(e.to_string()))?
}

/// Rasterise one page (1-indexed) at `scale`, capped at `max_pixels` per side,
/// and return it PNG-encoded.
pub async fn render_page_to_image(
    bytes: Arc<[u8]>,
    page: usize,
    scale: f32,
    max_pixels: u32,
) -> Result<PagePreview, PreviewError> {
    tokio::task::spawn_blocking(move || render_page_blocking(&bytes, page, scale, max_pixels))
        .await
        .map_err(|e| PreviewError::TaskPanicked(e.to_string()))?
}

fn page_count_blocking(bytes: &[u8]) -> Result<usize, PreviewError> {
    reject_empty(bytes)?;
    let pdfium = bind_pdfium()?;
    let document = load_document(&pdfium, bytes)?;
    let total = document.pages().len() as usize;
    debug!("PDF loaded: {} pages", total);
    Ok(total)
}

fn render_page_blocking(
    bytes: &[u8],
    page: usize,
    scale: f32,
    max_pixels: u32,
) -> Result<PagePreview, PreviewError> {
    reject_empty(bytes)?;
    let pdfium = bind_pdfium()?;
    let document = load_document(&pdfium, bytes)?;

    let pages = document.pages();
    let total = pages.len() as usize;
    if page == 0 || page > total {
        return Err(PreviewError::PageOutOfRange { page, total });
    }

    let pdf_page = pages
        .get((page - 1) as u16)
        .map_err(|e| PreviewError::Render {
            page,
            detail: format!("{:?}", e),
        })?;

    let cap = preview_cap(max_pixels);
    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(scale)
        .set_maximum_width(cap)
        .set_maximum_height(cap);

    let bitmap = pdf_page
        .render_with_config(&render_config)
        .map_err(|e| PreviewError::Render {
            page,
            detail: format!("{:?}", e),
        })?;

    let image = bitmap.as_image();
    let png = encode::encode_png(&image).map_err(|source| PreviewError::Encode { page, source })?;
    info!("Rendered page {}/{} → {}x{} px", page, total, image.width(), image.height());

    Ok(PagePreview {
        page,
        width: image.width(),
        height: image.height(),
        png,
    })
}

fn preview_cap(max_pixels: u32) -> i32 {
    max_pixels.min(MAX_PREVIEW_PIXELS) as i32
}

fn reject_empty(bytes: &[u8]) -> Result<(), PreviewError> {
    if bytes.is_empty() {
        return Err(PreviewError::Document("empty input".to_string()));
    }
    Ok(())
}

fn load_document<'a>(pdfium: &'a Pdfium, bytes: &'a [u8]) -> Result<PdfDocument<'a>, PreviewError> {
    pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| PreviewError::Document(format!("{:?}", e)))
}

/// Bind pdfium: `PDFIUM_LIB_PATH` (file or directory) first, then the
/// working directory, then the system library path.
pub fn bind_pdfium() -> Result<Pdfium, PreviewError> {
    if let Some(value) = std::env::var_os("PDFIUM_LIB_PATH") {
        let path = PathBuf::from(value);
        let lib = if path.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&path)
        } else {
            path
        };
        return Pdfium::bind_to_library(&lib)
            .map(Pdfium::new)
            .map_err(|e| PreviewError::Binding(format!("{}: {:?}", lib.display(), e)));
    }

    match Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./")) {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(local_err) => Pdfium::bind_to_system_library()
            .map(Pdfium::new)
            .map_err(|system_err| {
                PreviewError::Binding(format!("local: {:?}; system: {:?}", local_err, system_err))
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_bytes_are_a_decode_error() {
        let result = get_page_count(Arc::from(Vec::<u8>::new())).await;
        assert!(matches!(result, Err(PreviewError::Document(_))), "got {result:?}");

        let result = PdfiumRenderer::default().render_page(Arc::from(Vec::<u8>::new()), 1).await;
        assert!(matches!(result, Err(PreviewError::Document(_))), "got {result:?}");
    }

    #[tokio::test]
    async fn garbage_bytes_are_a_decode_error() {
        if let Err(e) = bind_pdfium() {
            println!("SKIP: pdfium unavailable: {e}");
            return;
        }
        let bytes: Arc<[u8]> = Arc::from(&b"this is not a pdf at all"[..]);
        let result = PdfiumRenderer::default().render_page(bytes, 1).await;
        assert!(matches!(result, Err(PreviewError::Document(_))), "got {result:?}");
    }

    #[test]
    fn preview_cap_never_wraps() {
        assert_eq!(preview_cap(2000), 2000);
        assert_eq!(preview_cap(u32::MAX), MAX_PREVIEW_PIXELS as i32);
    }

    #[test]
    fn preview_debug_hides_pixels() {
        let p = PagePreview {
            page: 1,
            width: 2,
            height: 3,
            png: vec![0; 64],
        };
        let dbg = format!("{p:?}");
        assert!(dbg.contains("png_bytes: 64"));
    }
}
