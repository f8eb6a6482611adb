//! LCD-oriented perceptual adjustments.
//!
//! Contrast, brightness, color and sharpness are all expressed as an extrapolation
//! `reference + factor * (value - reference)` away from an operation-specific reference,
//! followed by a light denoise blur and an unsharp mask.

use image::{RgbImage, imageops};

use crate::config::Enhance;

/// Apply the full enhancement chain in its fixed order.
pub fn enhance(img: RgbImage, opts: &Enhance) -> RgbImage {
    if !opts.enabled {
        return img;
    }
    let img = contrast(img, opts.contrast);
    let img = brightness(img, opts.brightness);
    let img = color(img, opts.color);
    let img = sharpness(img, opts.sharpness);
    let img = gaussian_blur(img, opts.denoise_radius);
    unsharp_mask(
        img,
        opts.unsharp_radius,
        opts.unsharp_percent,
        opts.unsharp_threshold,
    )
}

/// ITU-R 601 luma in 16.16 fixed point.
#[inline(always)]
fn luma(px: [u8; 3]) -> u8 {
    ((px[0] as u32 * 19595 + px[1] as u32 * 38470 + px[2] as u32 * 7471 + 0x8000) >> 16) as u8
}

#[inline(always)]
fn blend(reference: f32, value: u8, factor: f32) -> u8 {
    (reference + factor * (value as f32 - reference)).clamp(0.0, 255.0) as u8
}

#[inline(always)]
fn is_identity(factor: f32) -> bool {
    (factor - 1.0).abs() < f32::EPSILON
}

/// Spread channel values away from the image's mean luma.
pub fn contrast(mut img: RgbImage, factor: f32) -> RgbImage {
    let n = img.width() as u64 * img.height() as u64;
    if n == 0 || is_identity(factor) {
        return img;
    }
    let sum: u64 = img.pixels().map(|px| luma(px.0) as u64).sum();
    let mean = (sum as f64 / n as f64 + 0.5).floor() as f32;
    for px in img.pixels_mut() {
        for c in px.0.iter_mut() {
            *c = blend(mean, *c, factor);
        }
    }
    img
}

/// Scale every channel towards or away from black.
pub fn brightness(mut img: RgbImage, factor: f32) -> RgbImage {
    if is_identity(factor) {
        return img;
    }
    for px in img.pixels_mut() {
        for c in px.0.iter_mut() {
            *c = blend(0.0, *c, factor);
        }
    }
    img
}

/// Saturation: extrapolate each pixel away from its own gray level.
pub fn color(mut img: RgbImage, factor: f32) -> RgbImage {
    if is_identity(factor) {
        return img;
    }
    for px in img.pixels_mut() {
        let l = luma(px.0) as f32;
        for c in px.0.iter_mut() {
            *c = blend(l, *c, factor);
        }
    }
    img
}

/// Extrapolate away from a 3×3 smoothed copy.
pub fn sharpness(mut img: RgbImage, factor: f32) -> RgbImage {
    if is_identity(factor) {
        return img;
    }
    let smooth = smooth3x3(&img);
    for (px, s) in img.pixels_mut().zip(smooth.pixels()) {
        for (c, &r) in px.0.iter_mut().zip(s.0.iter()) {
            *c = blend(r as f32, *c, factor);
        }
    }
    img
}

/// 3×3 smoothing kernel (1 1 1 / 1 5 1 / 1 1 1) / 13. The outermost ring is copied as is.
fn smooth3x3(img: &RgbImage) -> RgbImage {
    const KERNEL: [[u32; 3]; 3] = [[1, 1, 1], [1, 5, 1], [1, 1, 1]];
    const SCALE: u32 = 13;
    let (w, h) = img.dimensions();
    let mut out = img.clone();
    if w < 3 || h < 3 {
        return out;
    }
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let mut acc = [0u32; 3];
            for (ky, row) in KERNEL.iter().enumerate() {
                for (kx, &k) in row.iter().enumerate() {
                    let p = img.get_pixel(x + kx as u32 - 1, y + ky as u32 - 1);
                    for c in 0..3 {
                        acc[c] += p[c] as u32 * k;
                    }
                }
            }
            out.get_pixel_mut(x, y).0 = acc.map(|a| ((a + SCALE / 2) / SCALE).min(255) as u8);
        }
    }
    out
}

/// Gaussian noise suppression. A non-positive radius is a no-op.
pub fn gaussian_blur(img: RgbImage, radius: f32) -> RgbImage {
    if radius <= 0.0 {
        return img;
    }
    imageops::blur(&img, radius)
}

/// Unsharp mask: push each channel away from its blurred value by `percent`, but only where
/// the difference reaches `threshold`.
pub fn unsharp_mask(mut img: RgbImage, radius: f32, percent: f32, threshold: u8) -> RgbImage {
    if radius <= 0.0 || percent <= 0.0 {
        return img;
    }
    let blurred = imageops::blur(&img, radius);
    let threshold = threshold as i32;
    for (px, b) in img.pixels_mut().zip(blurred.pixels()) {
        for (c, &bv) in px.0.iter_mut().zip(b.0.iter()) {
            let diff = *c as i32 - bv as i32;
            if diff.abs() >= threshold {
                let boost = (diff as f32 * percent / 100.0).trunc() as i32;
                *c = (*c as i32 + boost).clamp(0, 255) as u8;
            }
        }
    }
    img
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gray(w: u32, h: u32, v: u8) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([v; 3]))
    }

    #[test]
    fn disabled_chain_is_identity() {
        let img = RgbImage::from_fn(5, 4, |x, y| Rgb([(x * 40) as u8, (y * 60) as u8, 7]));
        let opts = Enhance {
            enabled: false,
            ..Enhance::default()
        };
        assert_eq!(enhance(img.clone(), &opts), img);
    }

    #[test]
    fn luma_matches_fixed_point_weights() {
        assert_eq!(luma([255, 255, 255]), 255);
        assert_eq!(luma([0, 0, 0]), 0);
        assert_eq!(luma([255, 0, 0]), 76);
        assert_eq!(luma([0, 255, 0]), 150);
        assert_eq!(luma([0, 0, 255]), 29);
    }

    #[test]
    fn contrast_spreads_around_mean() {
        let img = RgbImage::from_fn(2, 1, |x, _| Rgb([if x == 0 { 50 } else { 150 }; 3]));
        let out = contrast(img, 1.5);
        assert_eq!(out.get_pixel(0, 0), &Rgb([25; 3]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([175; 3]));
    }

    #[test]
    fn brightness_scales_and_clamps() {
        let img = RgbImage::from_fn(2, 1, |x, _| Rgb([if x == 0 { 100 } else { 250 }; 3]));
        let out = brightness(img, 1.5);
        assert_eq!(out.get_pixel(0, 0), &Rgb([150; 3]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([255; 3]));
    }

    #[test]
    fn zero_color_factor_is_grayscale() {
        let img = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        let out = color(img, 0.0);
        assert_eq!(out.get_pixel(0, 0), &Rgb([76, 76, 76]));
    }

    #[test]
    fn color_leaves_grays_alone() {
        let img = gray(3, 3, 90);
        assert_eq!(color(img.clone(), 1.2), img);
    }

    #[test]
    fn sharpness_amplifies_isolated_detail() {
        let mut img = gray(5, 5, 100);
        img.put_pixel(2, 2, Rgb([140; 3]));
        let out = sharpness(img, 2.0);
        // smoothed center: (8 * 100 + 5 * 140) / 13 = 115.4 -> 115; 115 + 2 * 25 = 165
        assert_eq!(out.get_pixel(2, 2), &Rgb([165; 3]));
        // border ring is not smoothed, so it is unchanged
        assert_eq!(out.get_pixel(0, 0), &Rgb([100; 3]));
    }

    #[test]
    fn smoothing_skips_tiny_images() {
        let img = RgbImage::from_fn(2, 2, |x, y| Rgb([(x * 100 + y * 50) as u8; 3]));
        assert_eq!(smooth3x3(&img), img);
    }

    #[test]
    fn flat_fields_survive_full_chain() {
        let out = enhance(gray(16, 12, 100), &Enhance::default());
        let first = out.get_pixel(0, 0)[0];
        for px in out.pixels() {
            assert!(px[0].abs_diff(first) <= 1);
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
        }
        // brightness 1.1 lifts the field
        assert!(first >= 108);
    }

    #[test]
    fn contrast_runs_before_brightness() {
        let img = RgbImage::from_fn(2, 1, |x, _| Rgb([if x == 0 { 50 } else { 200 }; 3]));
        let opts = Enhance {
            contrast: 0.5,
            brightness: 2.0,
            color: 1.0,
            sharpness: 1.0,
            denoise_radius: 0.0,
            unsharp_radius: 0.0,
            ..Enhance::default()
        };
        let out = enhance(img, &opts);
        // mean 125: 50 -> 87, 200 -> 162; then doubled and clamped.
        // The other order would give mean 178 over (100, 255): 139 and 216.
        assert_eq!(out.get_pixel(0, 0), &Rgb([174; 3]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([255; 3]));
    }

    #[test]
    fn chain_applies_stages_in_fixed_order() {
        let img = RgbImage::from_fn(12, 8, |x, y| {
            if x >= 8 {
                Rgb([255, 0, 40])
            } else {
                Rgb([(x * 28) as u8, (y * 30) as u8, 90])
            }
        });
        let opts = Enhance::default();
        let expected = unsharp_mask(
            gaussian_blur(
                sharpness(
                    color(
                        brightness(contrast(img.clone(), opts.contrast), opts.brightness),
                        opts.color,
                    ),
                    opts.sharpness,
                ),
                opts.denoise_radius,
            ),
            opts.unsharp_radius,
            opts.unsharp_percent,
            opts.unsharp_threshold,
        );
        assert_eq!(enhance(img, &opts), expected);
    }

    #[test]
    fn unsharp_threshold_suppresses_small_differences() {
        let img = RgbImage::from_fn(8, 1, |x, _| Rgb([100 + x as u8; 3]));
        assert_eq!(unsharp_mask(img.clone(), 1.0, 150.0, 255), img);
    }

    #[test]
    fn unsharp_boosts_edges() {
        let img = RgbImage::from_fn(8, 3, |x, _| Rgb([if x < 4 { 60 } else { 200 }; 3]));
        let out = unsharp_mask(img, 1.0, 150.0, 3);
        assert!(out.get_pixel(3, 1)[0] < 60);
        assert!(out.get_pixel(4, 1)[0] > 200);
    }

    #[test]
    fn non_positive_radius_is_noop() {
        let img = RgbImage::from_fn(4, 4, |x, y| Rgb([(x * 60) as u8, (y * 60) as u8, 0]));
        assert_eq!(gaussian_blur(img.clone(), 0.0), img);
        assert_eq!(unsharp_mask(img.clone(), 0.0, 150.0, 3), img);
    }
}
