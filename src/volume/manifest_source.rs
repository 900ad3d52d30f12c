//! Volume source built from a tilebase manifest
//!
//! Building reads the whole manifest, checks that the (remapped) base folder
//! exists, and turns every tile entry into a [`ManifestTile`] bucketed by
//! resolution, in manifest order. Tile payload files are not touched until a
//! caller asks for them. Any malformed entry fails the whole build.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::core::{Error, Result, SourceConfig};
use crate::math::BoundingVolume;
use super::brick_index::BrickIndex;
use super::manifest::Manifest;
use super::progress::{ProgressSink, ProgressTracker};
use super::source::{StaticVolumeBrickSource, VolumeBrickSource};
use super::tile::ManifestTile;

/// Progress reported once the manifest document has been parsed
const PARSED_PERCENT: u8 = 10;
/// Progress reported once the base path has been checked
const BASE_CHECKED_PERCENT: u8 = 15;

/// A multi-resolution tiled volume described by a manifest
#[derive(Clone, Debug)]
pub struct ManifestVolumeSource {
    base_path: PathBuf,
    tile_count: usize,
    source: StaticVolumeBrickSource,
}

impl ManifestVolumeSource {
    /// Build from a manifest file on disk
    pub fn from_path(path: impl AsRef<Path>, config: &SourceConfig, progress: &mut dyn ProgressSink) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading volume manifest {}", path.display());
        let mut tracker = ProgressTracker::new(progress);
        tracker.report(0);
        let text = fs::read_to_string(path)?;
        Self::parse_and_build(&text, config, &mut tracker)
    }

    /// Build from a manifest stream.
    ///
    /// The stream is read in full first; read failures are [`Error::Io`].
    pub fn from_reader(mut reader: impl Read, config: &SourceConfig, progress: &mut dyn ProgressSink) -> Result<Self> {
        let mut tracker = ProgressTracker::new(progress);
        tracker.report(0);
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Self::parse_and_build(&text, config, &mut tracker)
    }

    fn parse_and_build(text: &str, config: &SourceConfig, tracker: &mut ProgressTracker<'_>) -> Result<Self> {
        let manifest = Manifest::parse(text)?;
        tracker.report(PARSED_PERCENT);
        Self::build(&manifest, config, tracker)
    }

    /// Build from an already parsed manifest
    pub fn from_manifest(manifest: &Manifest, config: &SourceConfig, progress: &mut dyn ProgressSink) -> Result<Self> {
        let mut tracker = ProgressTracker::new(progress);
        tracker.report(0);
        Self::build(manifest, config, &mut tracker)
    }

    fn build(manifest: &Manifest, config: &SourceConfig, tracker: &mut ProgressTracker<'_>) -> Result<Self> {
        let started = Instant::now();
        manifest.validate()?;

        let base_path = config.path_remap.remap(&manifest.path);
        if config.check_base_path && !base_path.exists() {
            return Err(Error::PathUnavailable { path: base_path });
        }
        tracker.report(BASE_CHECKED_PERCENT);

        let mut source = StaticVolumeBrickSource::new(config.resolution_tolerance);
        let total = manifest.tiles.len();
        for (i, entry) in manifest.tiles.iter().enumerate() {
            let tile = ManifestTile::from_entry(entry, &base_path, config.leverage_compressed_files)
                .ok_or_else(|| Error::ManifestFormat(format!("tile {} ({}): unusable transform", i, entry.path)))?;
            if source.add_brick(Arc::new(tile)).is_none() {
                return Err(Error::ManifestFormat(format!("tile {} ({}): no usable resolution or duplicate tile", i, entry.path)));
            }
            tracker.report_fraction(i + 1, total, BASE_CHECKED_PERCENT, 99);
        }

        log::info!(
            "Indexed {} tiles into {} resolution levels in {:.2}s",
            total,
            source.available_resolutions().len(),
            started.elapsed().as_secs_f32()
        );
        for (resolution, index) in source.levels() {
            log::debug!("  {:.4} um/voxel: {} bricks", resolution, index.member_count());
        }

        tracker.finish();
        Ok(Self {
            base_path,
            tile_count: total,
            source,
        })
    }

    /// Base folder after remapping
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Number of tile entries in the manifest
    pub fn tile_count(&self) -> usize {
        self.tile_count
    }

    /// Iterate (bucket key, index) pairs in bucket creation order
    pub fn levels(&self) -> impl Iterator<Item = (f64, &BrickIndex)> {
        self.source.levels()
    }

    /// The underlying resolution catalog
    pub fn source(&self) -> &StaticVolumeBrickSource {
        &self.source
    }
}

impl VolumeBrickSource for ManifestVolumeSource {
    fn available_resolutions(&self) -> Vec<f64> {
        self.source.available_resolutions()
    }

    fn brick_index_for_resolution(&self, resolution: f64) -> Option<&BrickIndex> {
        self.source.brick_index_for_resolution(resolution)
    }

    fn bounding_volume(&self) -> BoundingVolume {
        self.source.bounding_volume()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fmt::Write as _;
    use crate::core::types::DVec3;
    use crate::volume::brick::BrickDescriptor;

    /// Voxels along each axis of a synthetic tile
    const TILE_VOXELS: u32 = 4;

    /// Manifest text with one cubic u8 tile per (origin um, resolution um) pair.
    ///
    /// Each tile spans `TILE_VOXELS * resolution` micrometers per axis.
    pub(crate) fn manifest_text(base: &Path, tiles: &[(DVec3, f64)]) -> String {
        let mut text = format!("path: {}\ntiles:\n", base.display());
        for (i, (origin_um, resolution)) in tiles.iter().enumerate() {
            let spacing_nm = resolution * 1000.0;
            let extent_nm = (spacing_nm * TILE_VOXELS as f64).round() as i64;
            let o = *origin_um * 1000.0;
            let _ = writeln!(text, "- aabb:");
            let _ = writeln!(text, "    ori: [{}, {}, {}]", o.x as i64, o.y as i64, o.z as i64);
            let _ = writeln!(text, "    shape: [{e}, {e}, {e}]", e = extent_nm);
            let _ = writeln!(text, "  path: /tiles/{:03}", i);
            let _ = writeln!(text, "  shape:");
            let _ = writeln!(text, "    dims: [{n}, {n}, {n}, 1]", n = TILE_VOXELS);
            let _ = writeln!(text, "    type: u8");
            let _ = writeln!(
                text,
                "  transform: [{s}, 0, 0, 0, {x}, 0, {s}, 0, 0, {y}, 0, 0, {s}, 0, {z}, 0, 0, 0, 1, 0, 0, 0, 0, 0, 1]",
                s = spacing_nm,
                x = o.x,
                y = o.y,
                z = o.z,
            );
        }
        text
    }

    fn build(text: &str) -> Result<ManifestVolumeSource> {
        ManifestVolumeSource::from_reader(text.as_bytes(), &SourceConfig::default(), &mut |_| {})
    }

    #[test]
    fn test_bucketing_is_order_dependent_and_keeps_first_key() {
        let dir = tempfile::tempdir().unwrap();
        let tiles = [
            (DVec3::new(0.0, 0.0, 0.0), 0.50),
            (DVec3::new(2.0, 0.0, 0.0), 0.58),
            (DVec3::new(4.0, 0.0, 0.0), 0.62),
            (DVec3::new(6.0, 0.0, 0.0), 5.0),
        ];
        let source = build(&manifest_text(dir.path(), &tiles)).unwrap();

        let resolutions = source.available_resolutions();
        assert_eq!(resolutions.len(), 2);
        assert_eq!(resolutions[0], 0.50);
        assert_eq!(source.brick_index_for_resolution(0.50).unwrap().len(), 3);
        assert_eq!(source.tile_count(), 4);
    }

    #[test]
    fn test_bounding_volume_is_union_of_tiles() {
        let dir = tempfile::tempdir().unwrap();
        let tiles = [
            (DVec3::new(0.0, 0.0, 0.0), 0.5),
            (DVec3::new(10.0, -5.0, 0.0), 0.5),
            (DVec3::new(3.0, 7.0, 20.0), 0.25),
            (DVec3::new(-4.0, 2.0, 1.0), 1.0),
        ];
        let source = build(&manifest_text(dir.path(), &tiles)).unwrap();

        let volume = source.bounding_volume();
        assert_eq!(volume.min, DVec3::new(-4.0, -5.0, 0.0));
        assert_eq!(volume.max, DVec3::new(12.0, 8.0, 21.0));
    }

    #[test]
    fn test_resolution_lookup_tolerance() {
        let dir = tempfile::tempdir().unwrap();
        let source = build(&manifest_text(dir.path(), &[(DVec3::ZERO, 0.5)])).unwrap();

        let exact = source.brick_index_for_resolution(0.50).unwrap();
        let near = source.brick_index_for_resolution(0.60).unwrap();
        assert!(std::ptr::eq(exact, near));
        assert!(source.brick_index_for_resolution(2.0).is_none());
    }

    #[test]
    fn test_nearest_tile_query() {
        let dir = tempfile::tempdir().unwrap();
        let tiles = [
            (DVec3::new(0.0, 0.0, 0.0), 0.5),
            (DVec3::new(10.0, 0.0, 0.0), 0.5),
            (DVec3::new(100.0, 0.0, 0.0), 0.5),
        ];
        let source = build(&manifest_text(dir.path(), &tiles)).unwrap();
        let index = source.brick_index_for_resolution(0.5).unwrap();

        let hit = index.nearest_brick(DVec3::new(4.5, 1.0, 1.0)).unwrap();
        assert!(hit.key().ends_with("tiles/000"));
        let hit = index.nearest_brick(DVec3::new(60.5, 1.0, 1.0)).unwrap();
        assert!(hit.key().ends_with("tiles/002"));
    }

    #[test]
    fn test_progress_is_monotonic_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let tiles: Vec<(DVec3, f64)> = (0..50).map(|i| (DVec3::new(i as f64 * 3.0, 0.0, 0.0), 0.5)).collect();
        let text = manifest_text(dir.path(), &tiles);

        let mut seen = Vec::new();
        ManifestVolumeSource::from_reader(text.as_bytes(), &SourceConfig::default(), &mut |p| seen.push(p)).unwrap();

        assert_eq!(seen.first(), Some(&0));
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.iter().filter(|p| **p == 100).count(), 1);
    }

    #[test]
    fn test_missing_base_path_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("not-mounted");
        let text = manifest_text(&gone, &[(DVec3::ZERO, 0.5)]);

        let mut seen = Vec::new();
        let err = ManifestVolumeSource::from_reader(text.as_bytes(), &SourceConfig::default(), &mut |p| seen.push(p)).unwrap_err();
        assert!(matches!(err, Error::PathUnavailable { ref path } if path == &gone));
        assert!(!seen.contains(&100));

        let config = SourceConfig { check_base_path: false, ..SourceConfig::default() };
        assert!(ManifestVolumeSource::from_reader(text.as_bytes(), &config, &mut |_| {}).is_ok());
    }

    #[test]
    fn test_malformed_tile_fails_whole_build() {
        let dir = tempfile::tempdir().unwrap();
        let tiles = [(DVec3::ZERO, 0.5), (DVec3::new(2.0, 0.0, 0.0), 0.5)];
        let text = manifest_text(dir.path(), &tiles).replacen("    type: u8\n", "", 1);

        let mut seen = Vec::new();
        let err = ManifestVolumeSource::from_reader(text.as_bytes(), &SourceConfig::default(), &mut |p| seen.push(p)).unwrap_err();
        assert!(err.is_format_error(), "{err}");
        assert!(!seen.contains(&100));
    }

    #[test]
    fn test_repeated_tile_path_fails_build() {
        let dir = tempfile::tempdir().unwrap();
        let tiles = [(DVec3::ZERO, 0.5), (DVec3::new(100.0, 0.0, 0.0), 0.5)];
        let text = manifest_text(dir.path(), &tiles).replace("path: /tiles/001", "path: /tiles/000");

        let mut seen = Vec::new();
        let err = ManifestVolumeSource::from_reader(text.as_bytes(), &SourceConfig::default(), &mut |p| seen.push(p)).unwrap_err();
        assert!(matches!(err, Error::ManifestFormat(ref msg) if msg.starts_with("tile 1 ")), "{err}");
        assert!(!seen.contains(&100));

        // Same check when the manifest was parsed elsewhere
        let mut manifest = Manifest::parse(&manifest_text(dir.path(), &tiles)).unwrap();
        manifest.tiles[1].path = "/tiles/000".into();
        let err = ManifestVolumeSource::from_manifest(&manifest, &SourceConfig::default(), &mut |_| {}).unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_bounds_match_indexed_bricks() {
        let dir = tempfile::tempdir().unwrap();
        let tiles = [(DVec3::ZERO, 0.5), (DVec3::new(100.0, 0.0, 0.0), 0.5)];
        let source = build(&manifest_text(dir.path(), &tiles)).unwrap();
        let index = source.brick_index_for_resolution(0.5).unwrap();

        assert_eq!(index.member_count(), source.tile_count());
        assert_eq!(source.bounding_volume(), index.bounding_volume());
    }

    #[test]
    fn test_path_remap_applied() {
        let dir = tempfile::tempdir().unwrap();
        let mounted = dir.path().join("mnt");
        fs::create_dir_all(&mounted).unwrap();
        let canonical = "/nobackup/mousebrainmicro/data";
        let text = manifest_text(Path::new(canonical), &[(DVec3::ZERO, 0.5)]);

        let config = SourceConfig {
            path_remap: crate::volume::PathRemapper::new().with_rule(canonical, mounted.display().to_string()),
            ..SourceConfig::default()
        };
        let source = ManifestVolumeSource::from_reader(text.as_bytes(), &config, &mut |_| {}).unwrap();
        assert_eq!(source.base_path(), mounted.as_path());
    }

    #[test]
    fn test_unreadable_tile_surfaces_only_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let source = build(&manifest_text(dir.path(), &[(DVec3::ZERO, 0.5)])).unwrap();
        let index = source.brick_index_for_resolution(0.5).unwrap();
        let tile = index.nearest_brick(DVec3::ZERO).unwrap();

        let err = tile.load_payload(10.0, 0).unwrap_err();
        assert!(matches!(err, crate::volume::LoadError::MissingFolder { .. }));
        // Index entry is unaffected
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("tilebase.cache.yml");
        fs::write(&manifest, manifest_text(dir.path(), &[(DVec3::ZERO, 0.5)])).unwrap();

        let source = ManifestVolumeSource::from_path(&manifest, &SourceConfig::default(), &mut |_| {}).unwrap();
        assert_eq!(source.tile_count(), 1);

        let err = ManifestVolumeSource::from_path(dir.path().join("missing.yml"), &SourceConfig::default(), &mut |_| {}).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_format_error());

        // A folder where the manifest should be fails to read, not to parse
        let err = ManifestVolumeSource::from_path(dir.path(), &SourceConfig::default(), &mut |_| {}).unwrap_err();
        assert!(matches!(err, Error::Io(_)), "{err}");
    }
}
