use std::path::PathBuf;

use thiserror::Error;

/// Failures of a single conversion, tagged with the stage they came from.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("decode: failed to read image {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("compose: source image has degenerate dimensions {width}x{height}")]
    EmptySource { width: u32, height: u32 },

    #[error("config: {0}")]
    InvalidConfig(String),

    #[error("emit: failed writing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("preview: failed encoding {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

pub type Result<T, E = ConvertError> = std::result::Result<T, E>;
