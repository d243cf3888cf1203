//! Batch creation of resized responsive variants.
//!
//! Runs separately from reconciliation: the fallback mapper only re-points references,
//! this module is the one place new image bytes are produced.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::asset_paths::normalize_locator;
use crate::models::{AssetPath, VariantDescriptor};

const JPEG_QUALITY: u8 = 85;

/// One resize request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VariantRequest {
  /// Source image relative to the asset root.
  pub source: String,
  /// Width of the variant.
  pub width: u32,
  /// Explicit height; derived from the aspect ratio when absent.
  #[serde(default)]
  pub height: Option<u32>,
  /// Explicit target relative to the asset root.
  #[serde(default)]
  pub target: Option<String>,
}

/// Reasons a resize request failed.
#[derive(Debug, Error)]
pub enum VariantError {
  /// Source or target path is not usable.
  #[error("invalid path `{0}`")]
  InvalidPath(String),
  /// The requested size is zero in one dimension.
  #[error("invalid size {width}x{height}")]
  InvalidSize {
    /// Requested width.
    width: u32,
    /// Requested or derived height.
    height: u32,
  },
  /// The target extension has no supported encoder.
  #[error("unsupported output format for {}", .0.display())]
  UnsupportedFormat(PathBuf),
  /// Decoding or encoding failed.
  #[error("image error for {}: {source}", .path.display())]
  Image {
    /// File being read or written.
    path: PathBuf,
    /// Codec error.
    #[source]
    source: ImageError,
  },
  /// Creating the output failed.
  #[error("failed to write {}: {source}", .path.display())]
  Io {
    /// File being written.
    path: PathBuf,
    /// Source I/O error.
    #[source]
    source: io::Error,
  },
}

/// Result of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum VariantOutcome {
  /// A new file was written.
  Created {
    /// Written variant.
    path: AssetPath,
    /// Width of the written image.
    width: u32,
    /// Height of the written image.
    height: u32,
  },
  /// The target already existed; nothing was read or written.
  Skipped {
    /// Existing variant.
    path: AssetPath,
  },
  /// The request failed; the batch continued.
  Failed {
    /// Requested source.
    source: String,
    /// Failure description.
    reason: String,
  },
}

/// Height preserving the source aspect ratio, never below one pixel.
pub fn proportional_height(width: u32, source_width: u32, source_height: u32) -> u32 {
  if source_width == 0 {
    return 0;
  }
  let height = (f64::from(width) * f64::from(source_height) / f64::from(source_width)).round();
  (height as u32).max(1)
}

/// Target path of a request: the explicit target, or `<base>-<W>x<H>.<ext>` next to the source.
fn target_path(
  request: &VariantRequest,
  source: &AssetPath,
  width: u32,
  height: u32,
) -> Result<AssetPath, VariantError> {
  if let Some(target) = &request.target {
    return normalize_locator(target, "").map_err(|_| VariantError::InvalidPath(target.clone()));
  }
  let descriptor = VariantDescriptor::parse(source)
    .ok_or_else(|| VariantError::InvalidPath(source.to_string()))?;
  Ok(descriptor.path_for(&descriptor.sized_file_name(width, height)))
}

/// Run one request against `asset_root`.
pub fn create_variant(
  asset_root: &Path,
  request: &VariantRequest,
) -> Result<VariantOutcome, VariantError> {
  let source = normalize_locator(&request.source, "")
    .map_err(|_| VariantError::InvalidPath(request.source.clone()))?;
  let source_file = source.to_fs_path(asset_root);

  // Explicit targets can be checked before touching the source.
  if let Some(target) = &request.target {
    let target = normalize_locator(target, "").map_err(|_| VariantError::InvalidPath(target.clone()))?;
    if target.to_fs_path(asset_root).exists() {
      return Ok(VariantOutcome::Skipped { path: target });
    }
  }

  let image_error = |source| VariantError::Image {
    path: source_file.clone(),
    source,
  };
  let height = match request.height {
    Some(height) => height,
    None => {
      // The default target name carries the height, so the header is read before the
      // existence check. Pixels are only decoded once the target is known to be absent.
      let (source_width, source_height) =
        image::image_dimensions(&source_file).map_err(image_error)?;
      proportional_height(request.width, source_width, source_height)
    }
  };
  if request.width == 0 || height == 0 {
    return Err(VariantError::InvalidSize {
      width: request.width,
      height,
    });
  }

  let target = target_path(request, &source, request.width, height)?;
  let target_file = target.to_fs_path(asset_root);
  if target_file.exists() {
    return Ok(VariantOutcome::Skipped { path: target });
  }

  let resized = image::open(&source_file)
    .map_err(image_error)?
    .resize_exact(request.width, height, FilterType::Lanczos3);
  write_encoded(&resized, &target_file)?;

  tracing::info!("created {} ({}x{})", target, request.width, height);
  Ok(VariantOutcome::Created {
    path: target,
    width: request.width,
    height,
  })
}

fn write_encoded(image: &DynamicImage, path: &Path) -> Result<(), VariantError> {
  let format = ImageFormat::from_path(path)
    .map_err(|_| VariantError::UnsupportedFormat(path.to_path_buf()))?;
  let io_error = |source| VariantError::Io {
    path: path.to_path_buf(),
    source,
  };
  let image_error = |source| VariantError::Image {
    path: path.to_path_buf(),
    source,
  };

  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(io_error)?;
  }

  match format {
    ImageFormat::Jpeg => {
      let writer = BufWriter::new(File::create(path).map_err(io_error)?);
      let mut encoder = JpegEncoder::new_with_quality(writer, JPEG_QUALITY);
      encoder
        .encode_image(&flatten_onto_white(image))
        .map_err(image_error)
    }
    ImageFormat::Png | ImageFormat::WebP => DynamicImage::ImageRgba8(image.to_rgba8())
      .save_with_format(path, format)
      .map_err(image_error),
    _ => Err(VariantError::UnsupportedFormat(path.to_path_buf())),
  }
}

/// Composite transparent pixels onto a white background for opaque encoders.
fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
  let rgba = image.to_rgba8();
  let mut flat = RgbImage::new(rgba.width(), rgba.height());
  for (x, y, pixel) in rgba.enumerate_pixels() {
    let [r, g, b, a] = pixel.0;
    let alpha = u16::from(a);
    let blend = |channel: u8| ((u16::from(channel) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
    flat.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
  }
  flat
}

/// Run every request; a failing request is logged and recorded, never fatal.
pub fn run_variants(asset_root: &Path, requests: &[VariantRequest]) -> Vec<VariantOutcome> {
  requests
    .iter()
    .map(|request| match create_variant(asset_root, request) {
      Ok(outcome) => {
        if let VariantOutcome::Skipped { path } = &outcome {
          tracing::info!("skipped {path}: target exists");
        }
        outcome
      }
      Err(err) => {
        tracing::warn!("variant of {} failed: {err}", request.source);
        VariantOutcome::Failed {
          source: request.source.clone(),
          reason: err.to_string(),
        }
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use image::{Rgba, RgbaImage};
  use tempfile::tempdir;

  use super::*;

  fn request(source: &str, width: u32) -> VariantRequest {
    VariantRequest {
      source: source.into(),
      width,
      height: None,
      target: None,
    }
  }

  fn write_png(path: &Path, width: u32, height: u32) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]))
      .save_with_format(path, ImageFormat::Png)
      .unwrap();
  }

  #[test]
  fn derives_height_from_aspect_ratio() {
    let temp = tempdir().unwrap();
    write_png(&temp.path().join("logo.png"), 1200, 300);

    let outcome = create_variant(temp.path(), &request("logo.png", 300)).unwrap();
    assert_eq!(outcome, VariantOutcome::Created {
      path: AssetPath::new("logo-300x75.png"),
      width: 300,
      height: 75,
    });
    let written = temp.path().join("logo-300x75.png");
    assert_eq!(image::image_dimensions(&written).unwrap(), (300, 75));
  }

  #[test]
  fn existing_targets_are_skipped_without_writing() {
    let temp = tempdir().unwrap();
    write_png(&temp.path().join("logo.png"), 1200, 300);
    let target = temp.path().join("logo-300x75.png");
    fs::write(&target, b"keep").unwrap();

    let outcome = create_variant(temp.path(), &request("logo.png", 300)).unwrap();
    assert_eq!(outcome, VariantOutcome::Skipped {
      path: AssetPath::new("logo-300x75.png")
    });
    assert_eq!(fs::read(&target).unwrap(), b"keep");
  }

  #[test]
  fn explicit_target_or_height_skips_without_touching_the_source() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("banner-300x75.png"), b"keep").unwrap();
    fs::write(temp.path().join("custom.png"), b"keep").unwrap();

    let by_target = VariantRequest {
      source: "absent.png".into(),
      width: 300,
      height: None,
      target: Some("custom.png".into()),
    };
    assert_eq!(create_variant(temp.path(), &by_target).unwrap(), VariantOutcome::Skipped {
      path: AssetPath::new("custom.png")
    });

    let by_height = VariantRequest {
      source: "banner.png".into(),
      width: 300,
      height: Some(75),
      target: None,
    };
    assert_eq!(create_variant(temp.path(), &by_height).unwrap(), VariantOutcome::Skipped {
      path: AssetPath::new("banner-300x75.png")
    });
    assert!(!temp.path().join("banner.png").exists());
  }

  #[test]
  fn sized_sources_name_targets_after_their_base() {
    let temp = tempdir().unwrap();
    write_png(&temp.path().join("media/photo-1000x500.png"), 1000, 500);

    let outcome = create_variant(temp.path(), &request("./media/photo-1000x500.png", 100)).unwrap();
    assert!(matches!(
      outcome,
      VariantOutcome::Created { ref path, width: 100, height: 50 } if path.as_str() == "media/photo-100x50.png"
    ));
  }

  #[test]
  fn jpeg_targets_flatten_transparency_onto_white() {
    let temp = tempdir().unwrap();
    let source = temp.path().join("clear.png");
    RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 0]))
      .save_with_format(&source, ImageFormat::Png)
      .unwrap();

    let req = VariantRequest {
      source: "clear.png".into(),
      width: 4,
      height: Some(4),
      target: Some("out/clear.jpg".into()),
    };
    create_variant(temp.path(), &req).unwrap();

    let written = image::open(temp.path().join("out/clear.jpg")).unwrap().to_rgb8();
    assert!(written.pixels().all(|pixel| pixel.0.iter().all(|c| *c > 240)));
  }

  #[test]
  fn failures_do_not_stop_the_batch() {
    let temp = tempdir().unwrap();
    write_png(&temp.path().join("ok.png"), 40, 20);

    let outcomes = run_variants(temp.path(), &[request("missing.png", 10), request("ok.png", 10)]);
    assert!(matches!(outcomes[0], VariantOutcome::Failed { .. }));
    assert!(matches!(outcomes[1], VariantOutcome::Created { height: 5, .. }));
  }

  #[test]
  fn proportional_height_rounds() {
    assert_eq!(proportional_height(300, 1200, 300), 75);
    assert_eq!(proportional_height(683, 1024, 1536), 1025);
    assert_eq!(proportional_height(1, 1000, 10), 1);
  }
}
