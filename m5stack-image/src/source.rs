use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use glob::glob;
use image::{DynamicImage, RgbImage};

use crate::error::ConvertError;

/// Decode an image file into an upright 8-bit RGB raster.
pub fn load(path: &Path) -> Result<RgbImage, ConvertError> {
    let decode_err = |source| ConvertError::Decode {
        path: path.to_path_buf(),
        source,
    };
    let bytes = std::fs::read(path).map_err(|e| decode_err(image::ImageError::IoError(e)))?;
    let mut img = image::load_from_memory(&bytes).map_err(decode_err)?;
    if let Some(tag) = extract_exif_orientation(&bytes) {
        tracing::debug!(path = %path.display(), orientation = tag, "applying exif orientation");
        img = apply_exif_orientation(img, tag);
    }
    let rgb = img.to_rgb8();
    tracing::debug!(path = %path.display(), width = rgb.width(), height = rgb.height(), "decoded source");
    Ok(rgb)
}

/// Parse EXIF orientation (1,3,6,8) from raw image bytes. Missing or unreadable EXIF yields `None`.
fn extract_exif_orientation(bytes: &[u8]) -> Option<u16> {
    let mut cursor = Cursor::new(bytes);
    let reader = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    let field = reader.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    if let exif::Value::Short(ref v) = field.value
        && let Some(val) = v.first()
    {
        return Some(*val);
    }
    field.value.get_uint(0).and_then(|v| u16::try_from(v).ok())
}

fn apply_exif_orientation(img: DynamicImage, tag: u16) -> DynamicImage {
    match tag {
        3 => DynamicImage::ImageRgb8(image::imageops::rotate180(&img.to_rgb8())),
        6 => DynamicImage::ImageRgb8(image::imageops::rotate90(&img.to_rgb8())),
        8 => DynamicImage::ImageRgb8(image::imageops::rotate270(&img.to_rgb8())),
        // Mirrored tags (2,4,5,7) are rare in camera output and left as decoded.
        _ => img,
    }
}

/// Expand an input argument into concrete files. An existing path, or one without glob
/// metacharacters, is taken literally so a missing file fails in [`load`] with its path.
/// Anything else is evaluated as a glob pattern.
pub fn expand_inputs(pattern: &str) -> Result<Vec<PathBuf>> {
    let literal = Path::new(pattern);
    if literal.is_file() || !pattern.contains(['*', '?', '[']) {
        return Ok(vec![literal.to_path_buf()]);
    }
    let mut entries: Vec<PathBuf> = glob(pattern)
        .with_context(|| format!("evaluating glob {pattern}"))?
        .filter_map(|entry| match entry {
            Ok(p) if p.is_file() => Some(p),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "skipping unreadable glob entry");
                None
            }
        })
        .collect();
    if entries.is_empty() {
        bail!("no input files matched {pattern}");
    }
    entries.sort();
    tracing::info!(pattern = %pattern, total = entries.len(), "inputs resolved");
    Ok(entries)
}
