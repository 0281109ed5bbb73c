//! Upload validation and image recompression.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use tracing::{debug, warn};

use super::{Category, FilePayload};
use crate::config::UploadConfig;
use crate::error::{Error, Result};

const MIB: u64 = 1024 * 1024;

/// Checks uploads against the size ceiling and per-category allow-lists.
#[derive(Debug, Clone)]
pub struct Validator {
  config: UploadConfig,
}

impl Validator {
  pub fn new(config: UploadConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &UploadConfig {
    &self.config
  }

  /// Validate a file for the given category.
  ///
  /// Images above the compression threshold are recompressed; if that fails
  /// the original file is returned instead.
  pub fn validate(&self, file: FilePayload, category: Category) -> Result<FilePayload> {
    if file.size() > self.config.max_file_size {
      return Err(Error::FileTooLarge {
        size: file.size(),
        limit_mb: self.config.max_file_size / MIB,
      });
    }

    if !category.allowed_types().contains(&file.mime_type.as_str()) {
      return Err(Error::UnsupportedType(file.mime_type));
    }

    if category == Category::Image && file.size() > self.config.compress_threshold {
      return Ok(
        match compress_image(&file, self.config.max_dimension, self.config.jpeg_quality) {
          Ok(compressed) => compressed,
          Err(e) => {
            warn!(name = %file.name, error = %e, "image compression failed, using original");
            file
          }
        },
      );
    }

    Ok(file)
  }
}

/// Scale an image so its longest side is at most `max_dimension` and
/// re-encode it as JPEG.
///
/// The name is kept; the MIME type becomes `image/jpeg`. If the result is not
/// smaller than the input, the input is returned unchanged.
pub fn compress_image(file: &FilePayload, max_dimension: u32, quality: u8) -> Result<FilePayload> {
  let img = image::load_from_memory(&file.data)?;
  let (width, height) = img.dimensions();

  let img = if width.max(height) > max_dimension {
    img.resize(max_dimension, max_dimension, FilterType::Triangle)
  } else {
    img
  };

  // JPEG has no alpha channel
  let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
  let mut data = Vec::new();
  rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut data, quality))?;

  if data.len() >= file.data.len() {
    debug!(name = %file.name, "recompressed image is not smaller, keeping original");
    return Ok(file.clone());
  }

  debug!(
    name = %file.name,
    before = file.data.len(),
    after = data.len(),
    "image recompressed"
  );

  Ok(FilePayload::new(file.name.clone(), "image/jpeg", data))
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{ImageFormat, Rgb, RgbImage};
  use std::io::Cursor;

  fn small_config() -> UploadConfig {
    UploadConfig {
      max_file_size: 200 * 1024,
      compress_threshold: 1024,
      max_dimension: 64,
      jpeg_quality: 80,
    }
  }

  /// PNG with enough noise that it does not compress well.
  fn noisy_png(width: u32, height: u32) -> Vec<u8> {
    let mut seed: u32 = 0x1234_5678;
    let img = RgbImage::from_fn(width, height, |_, _| {
      seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
      let [r, g, b, _] = seed.to_le_bytes();
      Rgb([r, g, b])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
      .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
      .unwrap();
    buf
  }

  #[test]
  fn test_allowed_small_file_passes_unchanged() {
    let validator = Validator::new(UploadConfig::default());
    let file = FilePayload::new("clip.mp4", "video/mp4", vec![7; 4096]);

    let validated = validator.validate(file.clone(), Category::Video).unwrap();
    assert_eq!(validated, file);
  }

  #[test]
  fn test_small_image_is_not_recompressed() {
    let validator = Validator::new(UploadConfig::default());
    let file = FilePayload::new("pump.png", "image/png", noisy_png(16, 16));

    let validated = validator.validate(file.clone(), Category::Image).unwrap();
    assert_eq!(validated, file);
  }

  #[test]
  fn test_oversized_file_rejected() {
    let validator = Validator::new(small_config());
    let file = FilePayload::new("big.wav", "audio/wav", vec![0; 300 * 1024]);

    let err = validator.validate(file, Category::Audio).unwrap_err();
    assert!(matches!(err, Error::FileTooLarge { size, .. } if size == 300 * 1024));
  }

  #[test]
  fn test_file_size_limit_message() {
    let validator = Validator::new(UploadConfig::default());
    let file = FilePayload::new("big.mp4", "video/mp4", vec![0; 50 * 1024 * 1024 + 1]);

    let err = validator.validate(file, Category::Video).unwrap_err();
    assert_eq!(err.to_string(), "File size exceeds 50MB limit");
  }

  #[test]
  fn test_type_outside_category_rejected() {
    let validator = Validator::new(UploadConfig::default());
    let file = FilePayload::new("clip.mp4", "video/mp4", vec![0; 10]);

    let err = validator.validate(file, Category::Image).unwrap_err();
    assert_eq!(err.to_string(), "Unsupported file type: video/mp4");
  }

  #[test]
  fn test_voice_recording_format_accepted() {
    let validator = Validator::new(UploadConfig::default());
    let file = FilePayload::new("voice_note.webm", "audio/webm", vec![0; 10]);
    assert!(validator.validate(file, Category::Audio).is_ok());
  }

  #[test]
  fn test_large_image_recompressed_within_bounds() {
    let validator = Validator::new(small_config());
    let original = FilePayload::new("panel.png", "image/png", noisy_png(256, 128));
    assert!(original.size() > 1024);

    let compressed = validator.validate(original.clone(), Category::Image).unwrap();

    assert!(compressed.size() <= original.size());
    assert_eq!(compressed.mime_type, "image/jpeg");
    assert_eq!(compressed.name, "panel.png");

    let decoded = image::load_from_memory(&compressed.data).unwrap();
    assert_eq!(decoded.dimensions(), (64, 32));
  }

  #[test]
  fn test_compression_failure_returns_original() {
    let validator = Validator::new(small_config());
    let broken = FilePayload::new("broken.png", "image/png", vec![0x42; 4096]);

    let validated = validator.validate(broken.clone(), Category::Image).unwrap();
    assert_eq!(validated, broken);
  }
}
