//! C header emission for RGB565 rasters stored in flash (`PROGMEM`).

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::dither::PackedRaster;
use crate::error::{ConvertError, Result};

/// Array entries per output line.
pub const VALUES_PER_LINE: usize = 8;

/// True if `s` can be used verbatim as a C identifier.
pub fn is_c_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Replace anything a C identifier cannot hold with `_`, prefixing `_` if it would start
/// with a digit.
pub fn sanitize_identifier(s: &str) -> String {
    let mut out: String = s
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if out.chars().next().is_none_or(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Include-guard stem: the output file name up to its first `.`, uppercased.
pub fn guard_name(output: &Path) -> String {
    let file_name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name.split('.').next().unwrap_or_default();
    sanitize_identifier(stem).to_ascii_uppercase()
}

/// Render the complete header text. Pure function of its inputs.
pub fn render(raster: &PackedRaster, guard: &str, variable_name: &str) -> String {
    let (w, h) = (raster.width(), raster.height());
    let pixels = raster.pixels();
    let upper = variable_name.to_ascii_uppercase();
    let total = pixels.len();

    let body: Vec<String> = pixels
        .chunks(VALUES_PER_LINE)
        .map(|chunk| {
            let values: Vec<String> = chunk.iter().map(|v| format!("0x{v:04X}")).collect();
            format!("  {}", values.join(", "))
        })
        .collect();

    format!(
        "// M5Stack optimized RGB565 image\n\
         // Image dimensions: {w}x{h} pixels\n\
         // Generated with color correction and dithering\n\
         \n\
         #ifndef {guard}_H\n\
         #define {guard}_H\n\
         \n\
         #include <pgmspace.h>\n\
         \n\
         #define {upper}_WIDTH {w}\n\
         #define {upper}_HEIGHT {h}\n\
         \n\
         const uint16_t {variable_name}[{total}] PROGMEM = {{\n\
         {body}\n\
         }};\n\
         \n\
         #endif // {guard}_H\n",
        body = body.join(",\n"),
    )
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write `contents` next to `path` and rename it into place, so readers never see a
/// half-written header.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let io_err = |source| ConvertError::Io {
        path: path.to_path_buf(),
        source,
    };
    let tmp = tmp_path(path);
    if let Err(e) = fs::write(&tmp, contents).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(io_err(e));
    }
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(io_err(e));
    }
    Ok(())
}

/// Render and atomically write a header for `raster` to `output`.
pub async fn emit(raster: &PackedRaster, output: &Path, variable_name: &str) -> Result<()> {
    let text = render(raster, &guard_name(output), variable_name);
    write_atomic(output, &text).await?;
    tracing::debug!(path = %output.display(), bytes = text.len(), "header written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Dither, DitherMode, Expansion};
    use crate::dither::quantize;
    use image::{Rgb, RgbImage};
    use pretty_assertions::assert_eq;

    fn raster(w: u32, h: u32) -> PackedRaster {
        let img = RgbImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([255, 0, 0])
            }
        });
        let opts = Dither {
            mode: DitherMode::None,
            expansion: Expansion::FullRange,
        };
        quantize(&img, &opts)
    }

    #[test]
    fn renders_exact_layout() {
        let text = render(&raster(3, 3), "LOGO_IMG", "logo");
        let expected = "\
// M5Stack optimized RGB565 image
// Image dimensions: 3x3 pixels
// Generated with color correction and dithering

#ifndef LOGO_IMG_H
#define LOGO_IMG_H

#include <pgmspace.h>

#define LOGO_WIDTH 3
#define LOGO_HEIGHT 3

const uint16_t logo[9] PROGMEM = {
  0xFFFF, 0xF800, 0xFFFF, 0xF800, 0xFFFF, 0xF800, 0xFFFF, 0xF800,
  0xFFFF
};

#endif // LOGO_IMG_H
";
        assert_eq!(text, expected);
    }

    #[test]
    fn full_last_line_has_no_trailing_comma() {
        let text = render(&raster(4, 4), "X", "img_data");
        let body: Vec<&str> = text
            .lines()
            .skip_while(|l| !l.starts_with("const uint16_t"))
            .skip(1)
            .take_while(|l| *l != "};")
            .collect();
        assert_eq!(body.len(), 2);
        assert!(body[0].ends_with(','));
        assert!(body[1].ends_with("0xFFFF"));
        assert_eq!(body[1].matches("0x").count(), VALUES_PER_LINE);
    }

    #[test]
    fn array_length_and_entries_match_raster() {
        let r = raster(10, 7);
        let text = render(&r, "IMG", "img_data");
        assert!(text.contains("const uint16_t img_data[70] PROGMEM = {"));
        assert!(text.contains("#define IMG_DATA_WIDTH 10\n#define IMG_DATA_HEIGHT 7\n"));
        let values: Vec<u16> = text
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter_map(|t| t.strip_prefix("0x"))
            .map(|t| u16::from_str_radix(t, 16).unwrap())
            .collect();
        assert_eq!(values, r.pixels());
    }

    #[test]
    fn guard_names_follow_file_name() {
        assert_eq!(guard_name(Path::new("me2_img.h")), "ME2_IMG");
        assert_eq!(guard_name(Path::new("out/logo.v2.h")), "LOGO");
        assert_eq!(guard_name(Path::new("my-image.h")), "MY_IMAGE");
        assert_eq!(guard_name(Path::new("9patch.h")), "_9PATCH");
    }

    #[test]
    fn identifier_rules() {
        assert!(is_c_identifier("img_data"));
        assert!(is_c_identifier("_x9"));
        assert!(!is_c_identifier(""));
        assert!(!is_c_identifier("9x"));
        assert!(!is_c_identifier("img-data"));
        assert_eq!(sanitize_identifier("holiday photo"), "holiday_photo");
        assert_eq!(sanitize_identifier(""), "_");
    }

    #[tokio::test]
    async fn emit_writes_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("splash.h");
        emit(&raster(2, 2), &path, "splash").await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("// M5Stack"));
        assert!(text.contains("#ifndef SPLASH_H"));
        assert!(!tmp_path(&path).exists());
    }

    #[tokio::test]
    async fn unwritable_target_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("out.h");
        let err = emit(&raster(2, 2), &path, "img_data").await.unwrap_err();
        assert!(matches!(err, ConvertError::Io { .. }));
        assert!(!path.exists());
    }
}
