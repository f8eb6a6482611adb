//! RGB565 quantization with Floyd–Steinberg error diffusion.
//!
//! Each channel is reduced independently to its 5/6/5-bit level and the residual
//! (expected - actual) is pushed onto not-yet-visited neighbors. Contributions that
//! would land outside the raster are dropped, so edge pixels lose part of their error.

use image::{Rgb, RgbImage};

use crate::config::{Dither, DitherMode, Expansion};

/// One 5/6/5 channel: how many levels it has and where it sits in the packed word.
#[derive(Clone, Copy, Debug)]
struct Channel {
    max: u16,
    bits: u8,
    offset: u8,
}

const RED: Channel = Channel {
    max: 31,
    bits: 5,
    offset: 11,
};
const GREEN: Channel = Channel {
    max: 63,
    bits: 6,
    offset: 5,
};
const BLUE: Channel = Channel {
    max: 31,
    bits: 5,
    offset: 0,
};
const CHANNELS: [Channel; 3] = [RED, GREEN, BLUE];

impl Channel {
    /// Round an 8-bit-scale value to the nearest level (ties to even).
    #[inline(always)]
    fn quantize(self, v: f32) -> u16 {
        (v / 255.0 * self.max as f32).round_ties_even() as u16
    }

    /// Map a level back onto the 8-bit scale.
    #[inline(always)]
    fn expand(self, q: u16, expansion: Expansion) -> f32 {
        match expansion {
            Expansion::FullRange => (q as f32 * 255.0 / self.max as f32).round(),
            Expansion::BitShift => (q << (8 - self.bits)) as f32,
        }
    }

    #[inline(always)]
    fn extract(self, word: u16) -> u16 {
        (word >> self.offset) & self.max
    }
}

/// Pack 5-bit red, 6-bit green and 5-bit blue levels into one RGB565 word.
#[inline(always)]
pub fn pack(r5: u16, g6: u16, b5: u16) -> u16 {
    ((r5 & RED.max) << RED.offset) | ((g6 & GREEN.max) << GREEN.offset) | (b5 & BLUE.max)
}

/// Split an RGB565 word into its (R5, G6, B5) levels.
#[inline(always)]
pub fn unpack(word: u16) -> (u16, u16, u16) {
    (RED.extract(word), GREEN.extract(word), BLUE.extract(word))
}

/// Quantized H×W raster of RGB565 words in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedRaster {
    width: u32,
    height: u32,
    pixels: Vec<u16>,
}

impl PackedRaster {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    pub fn get(&self, x: u32, y: u32) -> u16 {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Expand back to 8-bit RGB for on-screen previews.
    pub fn to_rgb_image(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let (r, g, b) = unpack(self.get(x, y));
            let expand = |ch: Channel, q| ch.expand(q, Expansion::FullRange) as u8;
            Rgb([expand(RED, r), expand(GREEN, g), expand(BLUE, b)])
        })
    }
}

#[derive(Clone, Copy)]
struct PropEntry {
    dx: i32,
    dy: u32,
    fraction: f32,
}

macro_rules! model {
    ($name:ident, [$(($dx:expr, $dy:expr, $f:expr)),+ $(,)?]) => {
        const $name: &[PropEntry] = &[$(PropEntry { dx: $dx, dy: $dy, fraction: $f }),+];
    };
}

model!(
    FLOYD_STEINBERG,
    [
        (1, 0, 7.0 / 16.0),
        (-1, 1, 3.0 / 16.0),
        (0, 1, 5.0 / 16.0),
        (1, 1, 1.0 / 16.0)
    ]
);

/// Per-channel floating point working copy of the canvas. Lives for one `quantize` call.
struct Planes {
    width: usize,
    height: usize,
    channels: [Vec<f32>; 3],
}

impl Planes {
    fn from_image(img: &RgbImage) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let mut channels: [Vec<f32>; 3] = std::array::from_fn(|_| Vec::with_capacity(w * h));
        for px in img.pixels() {
            for (plane, &v) in channels.iter_mut().zip(px.0.iter()) {
                plane.push(v as f32);
            }
        }
        Self {
            width: w,
            height: h,
            channels,
        }
    }

    /// Add `err * fraction` to every in-bounds neighbor of (x, y). Out-of-bounds shares are lost.
    fn diffuse(&mut self, x: usize, y: usize, err: [f32; 3], entries: &[PropEntry]) {
        for entry in entries {
            let nx = x as isize + entry.dx as isize;
            let ny = y + entry.dy as usize;
            if nx < 0 || nx as usize >= self.width || ny >= self.height {
                continue;
            }
            let i = ny * self.width + nx as usize;
            for (plane, e) in self.channels.iter_mut().zip(err) {
                plane[i] += e * entry.fraction;
            }
        }
    }
}

/// Reduce an 8-bit RGB canvas to RGB565.
///
/// Pixels are visited strictly in raster order; every decision depends on error pushed by
/// earlier pixels, so this must stay sequential.
pub fn quantize(canvas: &RgbImage, opts: &Dither) -> PackedRaster {
    let mut planes = Planes::from_image(canvas);
    let (width, height) = (planes.width, planes.height);
    let mut pixels = Vec::with_capacity(width * height);
    let diffuse = opts.mode == DitherMode::FloydSteinberg;

    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            let mut levels = [0u16; 3];
            let mut err = [0f32; 3];
            for (c, ch) in CHANNELS.iter().enumerate() {
                let old = planes.channels[c][i].clamp(0.0, 255.0);
                levels[c] = ch.quantize(old);
                err[c] = old - ch.expand(levels[c], opts.expansion);
            }
            pixels.push(pack(levels[0], levels[1], levels[2]));
            if diffuse && err.iter().any(|&e| e != 0.0) {
                planes.diffuse(x, y, err, FLOYD_STEINBERG);
            }
        }
    }
    tracing::debug!(width, height, mode = ?opts.mode, expansion = ?opts.expansion, "quantized canvas to rgb565");

    PackedRaster {
        width: width as u32,
        height: height as u32,
        pixels,
    }
}
