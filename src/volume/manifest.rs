//! Typed schema for tiled-volume manifests (tilebase cache files)
//!
//! ```yaml
//! path: /nobackup/mousebrainmicro/data/2014-04-04/Tiling
//! tiles:
//! - aabb:
//!     ori: [84934200, 17379900, 9909023]
//!     shape: [386670, 532776, 200000]
//!   path: /2014-04-14/01/01659
//!   shape:
//!     dims: [1024, 2048, 201, 2]
//!     type: u16
//!   transform: [-377.607422, 0.0, 0.0, 0.0, 85320872.0, ...]   # 25 values
//! ```
//!
//! Positions are stage nanometers. The document is deserialized straight into
//! these records and validated once; nothing downstream sees untyped maps.

use std::collections::HashMap;
use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Number of values in a tile transform (row-major 5x5)
pub const TRANSFORM_LEN: usize = 25;

/// Top level of a manifest
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Manifest {
    /// Base folder, in canonical (Linux) form
    pub path: String,
    pub tiles: Vec<TileEntry>,
}

/// One tile record
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TileEntry {
    pub aabb: AabbEntry,
    /// Tile folder relative to the manifest base path
    pub path: String,
    pub shape: ShapeEntry,
    /// Row-major 5x5 voxel-to-stage-nanometer transform
    pub transform: Vec<f64>,
}

/// Nominal tile footprint in nanometers
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct AabbEntry {
    pub ori: [i64; 3],
    pub shape: [i64; 3],
}

/// Raster layout of a tile
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct ShapeEntry {
    /// Voxels along x, y, z, then the channel count
    pub dims: [u32; 4],
    #[serde(rename = "type")]
    pub sample_type: SampleType,
}

/// Intensity sample type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    U8,
    U16,
}

impl SampleType {
    pub fn bytes_per_intensity(self) -> usize {
        match self {
            SampleType::U8 => 1,
            SampleType::U16 => 2,
        }
    }
}

impl Manifest {
    /// Parse and validate a manifest document.
    ///
    /// The stream is read in full before parsing, so a read failure is an
    /// [`Error::Io`] rather than a format error.
    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Self::parse(&text)
    }

    /// Parse and validate a manifest held in memory
    pub fn parse(text: &str) -> Result<Self> {
        let manifest: Manifest = serde_yaml::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check the constraints serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(Error::ManifestFormat("empty base path".into()));
        }
        // Tile identity is the path relative to the base folder
        let mut seen: HashMap<&str, usize> = HashMap::with_capacity(self.tiles.len());
        for (i, tile) in self.tiles.iter().enumerate() {
            let format_err = |msg: String| Error::ManifestFormat(format!("tile {} ({}): {}", i, tile.path, msg));
            tile.validate().map_err(format_err)?;
            if let Some(first) = seen.insert(tile.path.trim_start_matches(['/', '\\']), i) {
                return Err(format_err(format!("duplicate of tile {}", first)));
            }
        }
        Ok(())
    }
}

impl TileEntry {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.path.is_empty() {
            return Err("empty tile path".into());
        }
        if self.transform.len() != TRANSFORM_LEN {
            return Err(format!(
                "transform has {} values, expected {}",
                self.transform.len(),
                TRANSFORM_LEN
            ));
        }
        if self.transform.iter().any(|v| !v.is_finite()) {
            return Err("transform has non-finite values".into());
        }
        if let Some(axis) = self.shape.dims.iter().position(|d| *d == 0) {
            return Err(format!("dims[{}] is zero", axis));
        }
        if let Some(axis) = self.aabb.shape.iter().position(|s| *s <= 0) {
            return Err(format!("aabb shape[{}] is not positive", axis));
        }
        Ok(())
    }
}
