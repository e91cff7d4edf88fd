use crate::config::MediaConfig;
use image::imageops::FilterType;
use std::io::Cursor;
use tracing::{debug, warn};

/// Image bytes prepared for upload
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub bytes: Vec<u8>,
    /// False when preparation failed and the original bytes were kept
    pub processed: bool,
}

/// Prepare a captured image for upload: downscale to the configured maximum
/// width (aspect ratio preserved) and re-encode as JPEG at the configured
/// quality. Preparation failures fall back to the original bytes rather than
/// aborting the capture.
pub fn prepare_for_upload(original: &[u8], config: &MediaConfig) -> PreparedImage {
    match try_prepare(original, config) {
        Ok(bytes) => {
            debug!(
                "Prepared image for upload: {} -> {} bytes",
                original.len(),
                bytes.len()
            );
            PreparedImage {
                bytes,
                processed: true,
            }
        }
        Err(e) => {
            warn!("Image preparation failed, keeping original bytes: {}", e);
            PreparedImage {
                bytes: original.to_vec(),
                processed: false,
            }
        }
    }
}

fn try_prepare(original: &[u8], config: &MediaConfig) -> image::ImageResult<Vec<u8>> {
    let img = image::load_from_memory(original)?;

    let img = if img.width() > config.max_width {
        let scaled_height = ((img.height() as u64 * config.max_width as u64)
            / img.width() as u64)
            .max(1) as u32;
        debug!(
            "Resizing image {}x{} -> {}x{}",
            img.width(),
            img.height(),
            config.max_width,
            scaled_height
        );
        img.resize_exact(config.max_width, scaled_height, FilterType::Lanczos3)
    } else {
        img
    };

    let rgb = img.to_rgb8();
    let mut encoded = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
        Cursor::new(&mut encoded),
        config.jpeg_quality,
    );
    encoder.encode_image(&rgb)?;
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> MediaConfig {
        MediaConfig {
            max_width: 960,
            jpeg_quality: 30,
        }
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([120, 80, 40]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn wide_image_is_resized_to_max_width() {
        let original = png_bytes(1920, 1080);
        let prepared = prepare_for_upload(&original, &test_config());
        assert!(prepared.processed);

        let decoded = image::load_from_memory(&prepared.bytes).unwrap();
        assert_eq!(decoded.width(), 960);
        assert_eq!(decoded.height(), 540);
    }

    #[test]
    fn narrow_image_keeps_its_dimensions() {
        let original = png_bytes(640, 480);
        let prepared = prepare_for_upload(&original, &test_config());
        assert!(prepared.processed);

        let decoded = image::load_from_memory(&prepared.bytes).unwrap();
        assert_eq!(decoded.width(), 640);
        assert_eq!(decoded.height(), 480);
    }

    #[test]
    fn output_is_jpeg() {
        let original = png_bytes(100, 100);
        let prepared = prepare_for_upload(&original, &test_config());
        // JPEG SOI marker
        assert_eq!(&prepared.bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn undecodable_bytes_fall_back_to_original() {
        let garbage = vec![0u8; 64];
        let prepared = prepare_for_upload(&garbage, &test_config());
        assert!(!prepared.processed);
        assert_eq!(prepared.bytes, garbage);
    }
}
