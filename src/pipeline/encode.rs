//! Payload encoding: page renders and PDF slices → base64 `ImageData`.
//!
//! Multimodal APIs accept attachments as base64 data embedded in the JSON
//! request body. PNG is used for page renders because it is lossless; small
//! print in ingredient tables survives it, JPEG artefacts do not.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

pub const PDF_MIME: &str = "application/pdf";

/// Encode a rendered page as a base64 PNG.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Wrap a standalone PDF slice as a document attachment.
pub fn encode_pdf(bytes: &[u8]) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded PDF slice → {} bytes base64", b64.len());
    ImageData::new(b64, PDF_MIME)
}
