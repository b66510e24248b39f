//! Image encoding: `DynamicImage` → PNG bytes, PNG bytes → `data:` URI.
//!
//! PNG is lossless; rendered text in a 200 px thumbnail is already at the edge
//! of legibility and JPEG ringing makes it worse.

use crate::error::PreviewError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rendered page or slide as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, PreviewError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PreviewError::decode(format!("PNG encoding failed: {e}")))?;
    debug!(
        "Encoded {}x{} preview → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// Wrap PNG bytes for direct use in an `<img src>`.
pub fn png_data_uri(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let png = encode_png(&img).expect("encode should succeed");
        assert!(png.starts_with(b"\x89PNG"));

        let decoded = image::load_from_memory(&png).expect("valid PNG");
        assert_eq!(decoded.width(), 10);
        assert_eq!(decoded.height(), 10);
    }

    #[test]
    fn data_uri_round_trips() {
        let uri = png_data_uri(b"\x89PNG");
        let b64 = uri.strip_prefix("data:image/png;base64,").expect("prefix");
        assert_eq!(STANDARD.decode(b64).unwrap(), b"\x89PNG");
    }
}
