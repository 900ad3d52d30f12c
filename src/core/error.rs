//! Error types for building and querying volume brick sources

use std::path::PathBuf;

use thiserror::Error;

use crate::volume::payload::LoadError;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    /// Manifest structure or a tile entry is missing or malformed.
    #[error("Manifest format error: {0}")]
    ManifestFormat(String),

    #[error("Manifest format error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Base path does not exist locally after remapping.
    #[error("Path unavailable: {}", path.display())]
    PathUnavailable { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Brick load error: {0}")]
    Load(#[from] LoadError),

    /// Background build task went away before finishing.
    #[error("Volume source build was cancelled")]
    Cancelled,
}

impl Error {
    /// True for errors caused by the manifest contents themselves.
    pub fn is_format_error(&self) -> bool {
        matches!(self, Error::ManifestFormat(_) | Error::Yaml(_))
    }
}
