//! Image encoding: region crop → base64 PNG wrapped in `ImageData`.
//!
//! Used only by the vision OCR fallback. PNG keeps glyph edges intact;
//! the saved region files are JPEG, but those are for the document, not for
//! recognition.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a region crop as a base64 PNG ready for a vision model.
///
/// `detail: "high"` keeps small print legible for models that tile images.
pub fn encode_region(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} crop → {} bytes base64",
        img.width(),
        img.height(),
        b64.len()
    );

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, GrayImage};

    #[test]
    fn encodes_grayscale_crop_as_png() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(24, 8, Luma([200])));
        let data = encode_region(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        // PNG signature
        assert_eq!(&decoded[..4], b"\x89PNG");
    }
}
