use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tokio::fs;
use toml_edit::DocumentMut;

use crate::error::ConvertError;
use crate::header::is_c_identifier;

/// Default on-disk config filename, picked up from the working directory when present.
pub const DEFAULT_CONFIG_PATH: &str = "m5stack-image.toml";

/// Strongly typed representation of the configuration.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub output: Output,
    pub tone: Tone,
    pub enhance: Enhance,
    pub dither: Dither,
    pub logging: Option<Logging>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Output {
    pub width: u32,
    pub height: u32,
    pub variable_name: String,
    /// Scale sources smaller than the canvas up to fit. When false they are pasted at native size.
    pub upscale: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            variable_name: "img_data".to_string(),
            upscale: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Tone {
    /// Values above 1 brighten midtones; the curve exponent is `1 / gamma`.
    pub gamma: f32,
}

impl Default for Tone {
    fn default() -> Self {
        Self { gamma: 1.2 }
    }
}

/// Perceptual enhancement factors. A factor of 1.0 leaves the image unchanged.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Enhance {
    pub enabled: bool,
    pub contrast: f32,
    pub brightness: f32,
    pub color: f32,
    pub sharpness: f32,
    pub denoise_radius: f32,
    pub unsharp_radius: f32,
    pub unsharp_percent: f32,
    pub unsharp_threshold: u8,
}

impl Default for Enhance {
    fn default() -> Self {
        Self {
            enabled: true,
            contrast: 1.2,
            brightness: 1.1,
            color: 1.2,
            sharpness: 1.5,
            denoise_radius: 0.5,
            unsharp_radius: 1.0,
            unsharp_percent: 150.0,
            unsharp_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DitherMode {
    #[default]
    FloydSteinberg,
    /// Round every pixel independently, no error diffusion.
    None,
}

/// How a quantized channel is mapped back to 8-bit scale when computing the diffusion error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Expansion {
    /// `round(q * 255 / max)`: 0 and 255 are reproduced exactly.
    #[default]
    FullRange,
    /// `q << (8 - bits)`: matches headers produced by the legacy converter.
    BitShift,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Dither {
    pub mode: DitherMode,
    pub expansion: Expansion,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Logging {
    pub filter: Option<String>,
}

impl Config {
    /// Load the config file. An explicit path must exist; the default path is optional and
    /// falls back to built-in defaults when missing.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };
        if !path.exists() {
            if explicit {
                bail!("config file {} not found", path.display());
            }
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let doc = text.parse::<DocumentMut>()?;
        let typed: Config = toml_edit::de::from_document(doc)?;
        Ok(typed)
    }

    /// Reject settings the pipeline cannot honor before any file is touched.
    pub fn validate(&self) -> Result<(), ConvertError> {
        let out = &self.output;
        if out.width == 0 || out.height == 0 {
            return Err(ConvertError::InvalidConfig(format!(
                "canvas dimensions must be non-zero, got {}x{}",
                out.width, out.height
            )));
        }
        if !is_c_identifier(&out.variable_name) {
            return Err(ConvertError::InvalidConfig(format!(
                "variable name '{}' is not a valid C identifier",
                out.variable_name
            )));
        }
        if !self.tone.gamma.is_finite() || self.tone.gamma <= 0.0 {
            return Err(ConvertError::InvalidConfig(format!(
                "gamma must be a positive number, got {}",
                self.tone.gamma
            )));
        }
        let e = &self.enhance;
        for (name, v) in [
            ("contrast", e.contrast),
            ("brightness", e.brightness),
            ("color", e.color),
            ("sharpness", e.sharpness),
            ("denoise_radius", e.denoise_radius),
            ("unsharp_radius", e.unsharp_radius),
            ("unsharp_percent", e.unsharp_percent),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(ConvertError::InvalidConfig(format!(
                    "enhance.{name} must be a non-negative number, got {v}"
                )));
            }
        }
        Ok(())
    }
}
