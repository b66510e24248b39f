//! Preview generation for uploaded documents.
//!
//! Each submodule implements one strategy; [`generate_preview`] picks one from
//! the detected [`DocumentFormat`] and runs it on the blocking pool.
//!
//! ## Data Flow
//!
//! ```text
//! FilePayload ──▶ detect ──▶ pdf   (first page → PNG via pdfium)
//!                        ├─▶ docx  (body → capped HTML excerpt)
//!                        └─▶ pptx  (first slide → PNG wireframe)
//! ```
//!
//! 1. [`pdf`]: render page one only; pdfium is not async-safe
//! 2. [`docx`]: stream `word/document.xml`, stop once the budget is spent
//! 3. [`pptx`]: resolve the first slide through the package relationships
//!    and rasterise its shapes; other slides are never opened
//! 4. [`encode`]: PNG encoding and `data:` URIs
//! 5. [`package`]: zip/relationship helpers shared by the Office strategies
//!
//! The generator never touches shared state. Correlating a result with the
//! slot it belongs to is the caller's job (see [`crate::store`]).

pub mod docx;
pub mod encode;
pub mod package;
pub mod pdf;
pub mod pptx;

use crate::config::ReformatterConfig;
use crate::error::PreviewError;
use crate::format::DocumentFormat;
use crate::slot::FilePayload;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Instant;
use tracing::debug;

/// A renderable summary of an uploaded document.
#[derive(Debug, Clone, PartialEq)]
pub enum PreviewArtifact {
    /// First PDF page or first slide as a PNG.
    Image(RenderedImage),
    /// Leading part of a Word document as HTML.
    Excerpt(HtmlExcerpt),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    pub format: DocumentFormat,
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Pages (PDF) or slides (presentation) in the whole document.
    pub page_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlExcerpt {
    pub html: String,
    /// The document had more text than the excerpt budget.
    pub truncated: bool,
}

impl PreviewArtifact {
    pub fn format(&self) -> DocumentFormat {
        match self {
            PreviewArtifact::Image(img) => img.format,
            PreviewArtifact::Excerpt(_) => DocumentFormat::WordDocument,
        }
    }

    /// Extension to use when writing the artifact to disk.
    pub fn file_extension(&self) -> &'static str {
        match self {
            PreviewArtifact::Image(_) => "png",
            PreviewArtifact::Excerpt(_) => "html",
        }
    }

    /// Raw bytes of the artifact: PNG data or UTF-8 HTML.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            PreviewArtifact::Image(img) => &img.png,
            PreviewArtifact::Excerpt(ex) => ex.html.as_bytes(),
        }
    }

    /// `data:image/png;base64,...` for images, `None` for excerpts.
    pub fn data_uri(&self) -> Option<String> {
        match self {
            PreviewArtifact::Image(img) => Some(encode::png_data_uri(&img.png)),
            PreviewArtifact::Excerpt(_) => None,
        }
    }

    /// One-line human description, e.g. `"PDF page 1 of 3, 200x283 px"`.
    pub fn summary(&self) -> String {
        match self {
            PreviewArtifact::Image(img) => {
                let unit = match img.format {
                    DocumentFormat::Presentation => "slide",
                    _ => "page",
                };
                format!(
                    "{} {} 1 of {}, {}x{} px",
                    img.format, unit, img.page_count, img.width, img.height
                )
            }
            PreviewArtifact::Excerpt(ex) => format!(
                "Word document excerpt, {} bytes of HTML{}",
                ex.html.len(),
                if ex.truncated { " (truncated)" } else { "" }
            ),
        }
    }
}

/// Knobs of the preview strategies, taken from [`ReformatterConfig`].
#[derive(Debug, Clone)]
pub struct PreviewOptions {
    pub width: u32,
    pub excerpt_chars: usize,
    pub max_part_bytes: u64,
    pub pdfium_library: Option<PathBuf>,
}

impl PreviewOptions {
    /// Tallest image a preview may produce; very tall pages are scaled down.
    pub fn max_height(&self) -> u32 {
        self.width.saturating_mul(4)
    }
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self::from(&ReformatterConfig::default())
    }
}

impl From<&ReformatterConfig> for PreviewOptions {
    fn from(c: &ReformatterConfig) -> Self {
        Self {
            width: c.preview_width,
            excerpt_chars: c.excerpt_chars,
            max_part_bytes: c.max_part_bytes,
            pdfium_library: c.pdfium_library.clone(),
        }
    }
}

/// Produce a preview for one upload.
///
/// Formats outside PDF / Word / Presentation fail immediately with
/// [`PreviewError::UnsupportedFormat`]. The chosen strategy runs inside
/// `spawn_blocking`; a panicking strategy surfaces as
/// [`PreviewError::DecodeFailure`] instead of unwinding into the caller.
pub async fn generate_preview(
    payload: &FilePayload,
    options: &PreviewOptions,
) -> Result<PreviewArtifact, PreviewError> {
    let format = DocumentFormat::detect(&payload.media_type, &payload.name, payload.bytes())
        .ok_or_else(|| PreviewError::UnsupportedFormat {
            media_type: if payload.media_type.is_empty() {
                "unknown".to_string()
            } else {
                payload.media_type.clone()
            },
        })?;

    let start = Instant::now();
    let payload = payload.clone();
    let options = options.clone();

    let result = tokio::task::spawn_blocking(move || match format {
        DocumentFormat::Pdf => pdf::render_first_page(payload.bytes(), &options),
        DocumentFormat::WordDocument => docx::render_excerpt(payload.bytes(), &options),
        DocumentFormat::Presentation => pptx::render_first_slide(payload.bytes(), &options),
    })
    .await
    .map_err(|e| PreviewError::decode(format!("preview task panicked: {e}")))?;

    debug!(
        "{} preview finished in {}ms ({})",
        format,
        start.elapsed().as_millis(),
        if result.is_ok() { "ok" } else { "failed" }
    );
    result
}

/// Source of previews for the slot store.
///
/// The store only needs "payload in, artifact or error out"; tests swap in
/// generators with controlled timing to exercise the stale-result rule.
#[async_trait]
pub trait PreviewGenerator: Send + Sync {
    async fn generate(&self, payload: &FilePayload) -> Result<PreviewArtifact, PreviewError>;
}

/// The real generator: dispatches on document format.
#[derive(Debug, Clone, Default)]
pub struct DocumentPreviewer {
    options: PreviewOptions,
}

impl DocumentPreviewer {
    pub fn new(options: PreviewOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PreviewOptions {
        &self.options
    }
}

#[async_trait]
impl PreviewGenerator for DocumentPreviewer {
    async fn generate(&self, payload: &FilePayload) -> Result<PreviewArtifact, PreviewError> {
        generate_preview(payload, &self.options).await
    }
}
