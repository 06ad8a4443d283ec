//! Document normalization: any supported input → one still image.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async
//! contexts. `tokio::task::spawn_blocking` moves the rendering onto a
//! dedicated thread-pool thread so Tokio workers never stall on it.
//!
//! ## Why no temporary files?
//!
//! The whole normalization happens in memory: PDF pages render to a bitmap
//! buffer, filters operate on that buffer, and the PNG encoder writes to a
//! `Vec<u8>`. There is no temp path to leak on a failure path and nothing
//! for concurrent documents to collide on.
//!
//! ## Enhancement order
//!
//! When enabled, the filter chain runs in a fixed order — contrast,
//! sharpness, brightness, unsharp mask — because each stage changes the
//! pixel statistics the next stage measures. Reordering produces visibly
//! different (and non-reproducible) output.

use crate::config::ExtractionConfig;
use crate::error::DocumentError;
use crate::pipeline::input::{file_label, SourceDocument};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Cursor;
use tracing::debug;

/// The single still-image representation handed to the extraction backend.
///
/// Ephemeral — lives only for the duration of one extraction call.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// Encoded bitmap bytes (PNG for PDF renders and enhanced scans,
    /// otherwise the input's own encoding).
    pub bytes: Vec<u8>,
    /// Media type of `bytes`, e.g. `image/png`.
    pub media_type: &'static str,
    /// Whether the enhancement filter chain was applied.
    pub enhanced: bool,
}

/// Normalize one source document into a still image.
///
/// * PDF inputs: render the first page at `config.pdf_scale` magnification
///   and encode as PNG.
/// * Raster inputs: pass bytes through unchanged, unless `config.enhance`
///   is set, in which case the enhancement chain runs and the result is
///   re-encoded as PNG.
pub async fn normalize(
    doc: &SourceDocument,
    config: &ExtractionConfig,
) -> Result<NormalizedImage, DocumentError> {
    if doc.format.is_pdf() {
        let image = render_first_page(doc, config.pdf_scale).await?;
        let bytes = encode_png(&image, &file_label(&doc.path))?;
        debug!(
            "Rendered {} first page at {}x → {} PNG bytes",
            doc.path.display(),
            config.pdf_scale,
            bytes.len()
        );
        return Ok(NormalizedImage {
            bytes,
            media_type: "image/png",
            enhanced: false,
        });
    }

    if !config.enhance {
        // Pass-through: the backend accepts the original encoding directly.
        return Ok(NormalizedImage {
            bytes: doc.bytes.clone(),
            media_type: doc.format.normalized_media_type(),
            enhanced: false,
        });
    }

    let decoded =
        image::load_from_memory(&doc.bytes).map_err(|e| DocumentError::DocumentCorrupt {
            file: file_label(&doc.path),
            detail: format!("image decode failed: {e}"),
        })?;

    let enhanced = enhance_for_extraction(decoded);
    let bytes = encode_png(&enhanced, &file_label(&doc.path))?;
    debug!(
        "Enhanced {} ({:?}) → {} PNG bytes",
        doc.path.display(),
        doc.format,
        bytes.len()
    );

    Ok(NormalizedImage {
        bytes,
        // Re-encoding loses the original container, so the media type
        // follows the actual bytes, not the input extension.
        media_type: "image/png",
        enhanced: true,
    })
}

/// Rasterise the first page of a PDF via pdfium.
///
/// Runs inside `spawn_blocking` since pdfium operations are CPU-bound.
async fn render_first_page(
    doc: &SourceDocument,
    scale: f32,
) -> Result<DynamicImage, DocumentError> {
    let bytes = doc.bytes.clone();
    let file = file_label(&doc.path);
    let file_for_panic = file.clone();

    tokio::task::spawn_blocking(move || render_first_page_blocking(bytes, scale, &file))
        .await
        .map_err(|e| DocumentError::DocumentCorrupt {
            file: file_for_panic,
            detail: format!("render task panicked: {e}"),
        })?
}

/// Blocking implementation of first-page rendering.
fn render_first_page_blocking(
    bytes: Vec<u8>,
    scale: f32,
    file: &str,
) -> Result<DynamicImage, DocumentError> {
    let pdfium = Pdfium::default();

    let document =
        pdfium
            .load_pdf_from_byte_vec(bytes, None)
            .map_err(|e| DocumentError::DocumentCorrupt {
                file: file.to_string(),
                detail: format!("{e:?}"),
            })?;

    let pages = document.pages();
    let page = pages.get(0).map_err(|e| DocumentError::DocumentCorrupt {
        file: file.to_string(),
        detail: format!("document has no renderable first page: {e:?}"),
    })?;

    let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| DocumentError::DocumentCorrupt {
            file: file.to_string(),
            detail: format!("rasterisation failed: {e:?}"),
        })?;

    Ok(bitmap.as_image())
}

/// The fixed enhancement chain for low-quality scans.
///
/// Mirrors what works for invoice photography: contrast +30 %, sharpness
/// +20 %, brightness +10 %, then an unsharp mask (σ = 1.0, threshold = 3)
/// for edge definition.
fn enhance_for_extraction(img: DynamicImage) -> DynamicImage {
    let img = DynamicImage::ImageRgb8(img.to_rgb8());
    let img = img.adjust_contrast(30.0);
    let img = blend_sharpen(&img, 0.2);
    let img = scale_brightness(&img, 1.1);
    img.unsharpen(1.0, 3)
}

/// Sharpen by blending a 3×3 sharpen kernel at the given strength.
///
/// Convolution is linear, so blending the kernels is equivalent to blending
/// the outputs: `(1-a)·identity + a·sharpen` has centre `1 + 4a` and cross
/// neighbours `-a`.
fn blend_sharpen(img: &DynamicImage, strength: f32) -> DynamicImage {
    let a = strength;
    #[rustfmt::skip]
    let kernel = [
        0.0,          -a,  0.0,
         -a, 1.0 + 4.0 * a, -a,
        0.0,          -a,  0.0,
    ];
    img.filter3x3(&kernel)
}

/// Multiplicative brightness adjustment, saturating at white.
fn scale_brightness(img: &DynamicImage, factor: f32) -> DynamicImage {
    let mut rgb = img.to_rgb8();
    for pixel in rgb.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = ((f32::from(*channel)) * factor).round().min(255.0) as u8;
        }
    }
    DynamicImage::ImageRgb8(rgb)
}

/// PNG-encode a bitmap into a fresh buffer.
fn encode_png(img: &DynamicImage, file: &str) -> Result<Vec<u8>, DocumentError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| DocumentError::DocumentCorrupt {
            file: file.to_string(),
            detail: format!("PNG encoding failed: {e}"),
        })?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::input::DocumentFormat;
    use image::{Rgb, RgbImage};
    use std::path::PathBuf;

    fn png_document(width: u32, height: u32) -> SourceDocument {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            // A gradient with some structure so the filters have edges to work on.
            Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 128])
        }));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        SourceDocument {
            path: PathBuf::from("synthetic.png"),
            format: DocumentFormat::Png,
            bytes,
        }
    }

    #[tokio::test]
    async fn raster_passthrough_preserves_bytes_and_media_type() {
        let doc = png_document(32, 32);
        let config = ExtractionConfig::default();

        let normalized = normalize(&doc, &config).await.expect("normalize");
        assert_eq!(normalized.bytes, doc.bytes);
        assert_eq!(normalized.media_type, "image/png");
        assert!(!normalized.enhanced);
    }

    #[tokio::test]
    async fn enhancement_reencodes_as_png() {
        let doc = png_document(32, 32);
        let config = ExtractionConfig::builder().enhance(true).build().unwrap();

        let normalized = normalize(&doc, &config).await.expect("normalize");
        assert!(normalized.enhanced);
        assert_eq!(normalized.media_type, "image/png");
        assert_ne!(normalized.bytes, doc.bytes, "filters must change pixels");
        // Result must itself decode as a valid image.
        image::load_from_memory(&normalized.bytes).expect("valid PNG out");
    }

    #[tokio::test]
    async fn enhancement_of_garbage_is_document_corrupt() {
        let doc = SourceDocument {
            path: PathBuf::from("broken.jpg"),
            format: DocumentFormat::Jpeg,
            bytes: b"definitely not a JPEG".to_vec(),
        };
        let config = ExtractionConfig::builder().enhance(true).build().unwrap();

        let err = normalize(&doc, &config).await.unwrap_err();
        assert!(matches!(err, DocumentError::DocumentCorrupt { .. }));
    }

    #[test]
    fn enhancement_chain_is_deterministic() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(16, 16, |x, y| {
            Rgb([(x * 16) as u8, (y * 16) as u8, 64])
        }));
        let a = enhance_for_extraction(img.clone());
        let b = enhance_for_extraction(img);
        assert_eq!(a.to_rgb8().as_raw(), b.to_rgb8().as_raw());
    }

    #[test]
    fn brightness_scaling_saturates() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([250, 100, 0])));
        let out = scale_brightness(&img, 1.1).to_rgb8();
        let px = out.get_pixel(0, 0);
        assert_eq!(px.0, [255, 110, 0]);
    }
}
