//! Image encoding: `DynamicImage` → PNG bytes → inline `data:` URL.
//!
//! Previews are shown inline next to the text result, so the renderer hands
//! back PNG bytes and the presentation layer embeds them as a base64 data
//! URL. PNG is lossless; text on a rasterised page stays crisp at scale 1.0
//! where JPEG ringing would blur small glyphs.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded {}x{} preview → {} bytes PNG", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// Wrap PNG bytes as a `data:image/png;base64,…` URL.
pub fn png_data_url(png: &[u8]) -> String {
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
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory(&png).expect("valid PNG");
        assert_eq!(decoded.width(), 10);
        assert_eq!(decoded.height(), 10);
    }

    #[test]
    fn data_url_round_trips_bytes() {
        let url = png_data_url(b"\x89PNG");
        let payload = url.strip_prefix("data:image/png;base64,").expect("prefix");
        assert_eq!(STANDARD.decode(payload).unwrap(), b"\x89PNG");
    }
}
