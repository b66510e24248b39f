//! PDF previews: rasterise page one via pdfium.
//!
//! Only the first page is ever loaded for rendering; the page count comes
//! from the document's page tree without touching the other pages' content.
//! pdfium keeps thread-local state, which is why [`super::generate_preview`]
//! calls into this module from `spawn_blocking`.

use super::{encode, PreviewArtifact, PreviewOptions, RenderedImage};
use crate::error::PreviewError;
use crate::format::DocumentFormat;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Render the first page of `bytes` to a PNG `options.width` pixels wide.
pub fn render_first_page(bytes: &[u8], options: &PreviewOptions) -> Result<PreviewArtifact, PreviewError> {
    if !bytes.starts_with(b"%PDF") {
        let magic: Vec<u8> = bytes.iter().take(4).copied().collect();
        return Err(PreviewError::corrupt(format!(
            "missing %PDF header (first bytes: {magic:?})"
        )));
    }

    let pdfium = bind_pdfium(options.pdfium_library.as_deref())?;

    let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            PreviewError::decode("PDF is encrypted and cannot be previewed")
        } else {
            PreviewError::corrupt(err_str)
        }
    })?;

    let pages = document.pages();
    let page_count = pages.len() as usize;
    if page_count == 0 {
        return Err(PreviewError::corrupt("PDF has no pages"));
    }
    info!("PDF loaded: {} pages, rendering page 1", page_count);

    let page = pages
        .get(0)
        .map_err(|e| PreviewError::decode(format!("cannot load page 1: {:?}", e)))?;

    let render_config = PdfRenderConfig::new()
        .set_target_width(options.width as i32)
        .set_maximum_height(options.max_height() as i32);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| PreviewError::decode(format!("rasterisation failed: {:?}", e)))?;

    let image = bitmap.as_image();
    debug!("Rendered page 1 → {}x{} px", image.width(), image.height());

    Ok(PreviewArtifact::Image(RenderedImage {
        format: DocumentFormat::Pdf,
        png: encode::encode_png(&image)?,
        width: image.width(),
        height: image.height(),
        page_count,
    }))
}

/// Bind pdfium from an explicit location or the system library path.
///
/// `library` may name the library file itself or the directory holding it.
pub fn bind_pdfium(library: Option<&Path>) -> Result<Pdfium, PreviewError> {
    let bindings = match library {
        Some(path) if path.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
        }
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| PreviewError::decode(format!("pdfium library unavailable: {:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Whether a pdfium library can be bound at all.
pub fn pdfium_available(library: Option<&Path>) -> bool {
    bind_pdfium(library).is_ok()
}
