//! Configuration for building volume brick sources

use crate::volume::path_remap::PathRemapper;
use crate::volume::resolution::DEFAULT_RESOLUTION_TOLERANCE;

/// Environment variable overriding [`SourceConfig::resolution_tolerance`].
pub const ENV_RESOLUTION_TOLERANCE: &str = "VOLBRICK_RESOLUTION_TOLERANCE";
/// Environment variable overriding [`SourceConfig::leverage_compressed_files`].
pub const ENV_COMPRESSED: &str = "VOLBRICK_COMPRESSED";
/// Environment variable holding extra path remap rules, `from=to;from=to`.
pub const ENV_PATH_REMAP: &str = "VOLBRICK_PATH_REMAP";

/// Configuration for a manifest-backed volume source
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Ratio within which two resolutions share a bucket (exclusive)
    pub resolution_tolerance: f64,
    /// Rewrites the stored base path into local OS syntax
    pub path_remap: PathRemapper,
    /// Fail the build when the remapped base path is missing
    pub check_base_path: bool,
    /// Prefer LZ4-compressed channel files when present
    pub leverage_compressed_files: bool,
    /// Channel loaded when the caller does not name one
    pub default_channel: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            resolution_tolerance: DEFAULT_RESOLUTION_TOLERANCE,
            path_remap: PathRemapper::for_host(),
            check_base_path: true,
            leverage_compressed_files: true,
            default_channel: 0,
        }
    }
}

impl SourceConfig {
    /// Default configuration with environment overrides applied.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(ENV_RESOLUTION_TOLERANCE) {
            match raw.trim().parse::<f64>() {
                Ok(t) if t > 1.0 && t.is_finite() => self.resolution_tolerance = t,
                _ => log::warn!("Ignoring {}={:?}: expected a number > 1", ENV_RESOLUTION_TOLERANCE, raw),
            }
        }

        if let Some(raw) = lookup(ENV_COMPRESSED) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.leverage_compressed_files = true,
                "0" | "false" | "no" | "off" => self.leverage_compressed_files = false,
                _ => log::warn!("Ignoring {}={:?}: expected a boolean", ENV_COMPRESSED, raw),
            }
        }

        if let Some(raw) = lookup(ENV_PATH_REMAP) {
            // Explicit rules take precedence over the host defaults
            let mut remap = PathRemapper::parse_rules(&raw);
            remap.extend(self.path_remap.clone());
            self.path_remap = remap;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SourceConfig::default();
        assert_eq!(config.resolution_tolerance, 1.30);
        assert!(config.check_base_path);
        assert!(config.leverage_compressed_files);
        assert_eq!(config.default_channel, 0);
    }

    #[test]
    fn test_overrides_applied() {
        let mut config = SourceConfig::default();
        config.apply_overrides(lookup(&[
            (ENV_RESOLUTION_TOLERANCE, "1.5"),
            (ENV_COMPRESSED, "off"),
            (ENV_PATH_REMAP, "/data/=/mnt/data/"),
        ]));

        assert_eq!(config.resolution_tolerance, 1.5);
        assert!(!config.leverage_compressed_files);
        assert_eq!(config.path_remap.remap_str("/data/tiles"), PathRemapper::for_host().remap_str("/mnt/data/tiles"));
    }

    #[test]
    fn test_bad_overrides_ignored() {
        let mut config = SourceConfig::default();
        config.apply_overrides(lookup(&[
            (ENV_RESOLUTION_TOLERANCE, "0.5"),
            (ENV_COMPRESSED, "maybe"),
        ]));

        assert_eq!(config.resolution_tolerance, 1.30);
        assert!(config.leverage_compressed_files);
    }
}
