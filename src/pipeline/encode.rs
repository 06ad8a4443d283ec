//! Image encoding: [`NormalizedImage`] → base64 [`ImageData`].
//!
//! Vision APIs (OpenAI, Anthropic, Gemini) accept images as base64 payloads
//! embedded in the JSON request body. `detail: "high"` instructs GPT-4-class
//! models to use the full image tile budget; without it the fine print where
//! VAT numbers and amount tables live is lost.

use crate::pipeline::normalize::NormalizedImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// Wrap a normalized invoice image for the multimodal API request body.
pub fn encode_image(img: &NormalizedImage) -> ImageData {
    let b64 = STANDARD.encode(&img.bytes);
    debug!(
        "Encoded {} image → {} bytes base64",
        img.media_type,
        b64.len()
    );
    ImageData::new(b64, img.media_type).with_detail("high")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_wraps_media_type_and_valid_base64() {
        let img = NormalizedImage {
            bytes: vec![0x89, b'P', b'N', b'G', 0, 1, 2, 3],
            media_type: "image/png",
            enhanced: false,
        };
        let data = encode_image(&img);
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(decoded, img.bytes);
    }

    #[test]
    fn jpeg_media_type_passes_through() {
        let img = NormalizedImage {
            bytes: vec![0xFF, 0xD8, 0xFF],
            media_type: "image/jpeg",
            enhanced: false,
        };
        assert_eq!(encode_image(&img).mime_type, "image/jpeg");
    }
}
