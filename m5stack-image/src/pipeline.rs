use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::config::Config;
use crate::dither::{PackedRaster, quantize};
use crate::enhance::enhance;
use crate::error::{ConvertError, Result};

/// Position and size of the resized source inside the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Run the full pipeline: letterbox, enhance, gamma, quantize.
pub fn process(src: RgbImage, cfg: &Config) -> Result<PackedRaster> {
    cfg.validate()?;
    let out = &cfg.output;
    let (canvas, rect) = compose(src, out.width, out.height, out.upscale)?;
    tracing::debug!(
        canvas_w = out.width,
        canvas_h = out.height,
        content_x = rect.x,
        content_y = rect.y,
        content_w = rect.width,
        content_h = rect.height,
        "composed canvas"
    );
    let canvas = enhance(canvas, &cfg.enhance);
    let canvas = apply_gamma(canvas, cfg.tone.gamma);
    Ok(quantize(&canvas, &cfg.dither))
}

/// Size of the source once fitted inside the canvas, aspect preserved.
///
/// The constraining axis lands exactly on the canvas edge; the other axis is floored.
/// Neither axis collapses below one pixel.
pub fn fit_dimensions(src_w: u32, src_h: u32, width: u32, height: u32, upscale: bool) -> (u32, u32) {
    if !upscale && src_w <= width && src_h <= height {
        return (src_w, src_h);
    }
    let (sw, sh, w, h) = (src_w as u64, src_h as u64, width as u64, height as u64);
    // width / src_w <= height / src_h, cross-multiplied to stay in integers
    let (new_w, new_h) = if w * sh <= h * sw {
        (w, sh * w / sw)
    } else {
        (sw * h / sh, h)
    };
    (new_w.max(1) as u32, new_h.max(1) as u32)
}

/// Resize the source to fit and center it on a black `width`×`height` canvas.
pub fn compose(
    src: RgbImage,
    width: u32,
    height: u32,
    upscale: bool,
) -> Result<(RgbImage, ContentRect)> {
    let (src_w, src_h) = src.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(ConvertError::EmptySource {
            width: src_w,
            height: src_h,
        });
    }
    let (new_w, new_h) = fit_dimensions(src_w, src_h, width, height, upscale);
    let resized = if (new_w, new_h) == (src_w, src_h) {
        src
    } else {
        imageops::resize(&src, new_w, new_h, FilterType::Lanczos3)
    };
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([0, 0, 0]));
    let off_x = (width - new_w) / 2;
    let off_y = (height - new_h) / 2;
    imageops::replace(&mut canvas, &resized, off_x as i64, off_y as i64);
    Ok((
        canvas,
        ContentRect {
            x: off_x,
            y: off_y,
            width: new_w,
            height: new_h,
        },
    ))
}

/// Lookup table for `v' = (v / 255)^(1 / gamma) * 255`, truncated.
pub fn gamma_lut(gamma: f32) -> [u8; 256] {
    let exponent = 1.0 / gamma as f64;
    std::array::from_fn(|v| ((v as f64 / 255.0).powf(exponent) * 255.0).clamp(0.0, 255.0) as u8)
}

pub fn apply_gamma(mut img: RgbImage, gamma: f32) -> RgbImage {
    let lut = gamma_lut(gamma);
    for c in img.iter_mut() {
        *c = lut[*c as usize];
    }
    img
}
