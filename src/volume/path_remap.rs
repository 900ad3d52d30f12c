//! Rewriting stored canonical (Linux) paths into local OS syntax

use std::path::PathBuf;

/// Path separator convention of the target OS
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Separator {
    #[default]
    Slash,
    Backslash,
}

/// Ordered prefix rules applied to manifest base paths.
///
/// The first rule whose `from` prefixes the path rewrites it; separators are
/// converted afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathRemapper {
    rules: Vec<(String, String)>,
    separator: Separator,
}

impl PathRemapper {
    /// Identity remapper using forward slashes
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount conventions of the shared data volumes on this OS
    pub fn for_host() -> Self {
        if cfg!(windows) {
            Self::new()
                .with_separator(Separator::Backslash)
                .with_rule("/nobackup/mousebrainmicro/", "//dm11/mousebrainmicro/")
                .with_rule("/groups/mousebrainmicro/mousebrainmicro/", "//dm11/mousebrainmicro/")
                .with_rule("/nobackup/", "//dm11/")
        } else if cfg!(target_os = "macos") {
            Self::new()
                .with_rule("/nobackup/mousebrainmicro/", "/Volumes/mousebrainmicro/")
                .with_rule("/groups/mousebrainmicro/mousebrainmicro/", "/Volumes/mousebrainmicro/")
                .with_rule("/nobackup/", "/Volumes/")
        } else {
            Self::new()
        }
    }

    /// Parse `from=to;from=to` rules, using the host separator
    pub fn parse_rules(raw: &str) -> Self {
        let mut remap = Self::new().with_separator(Self::for_host().separator);
        for pair in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some((from, to)) if !from.is_empty() => remap.rules.push((from.to_string(), to.to_string())),
                _ => log::warn!("Ignoring malformed path remap rule {:?}", pair),
            }
        }
        remap
    }

    pub fn with_rule(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.rules.push((from.into(), to.into()));
        self
    }

    pub fn with_separator(mut self, separator: Separator) -> Self {
        self.separator = separator;
        self
    }

    /// Append another remapper's rules after ours
    pub fn extend(&mut self, other: PathRemapper) {
        self.rules.extend(other.rules);
    }

    pub fn rules(&self) -> &[(String, String)] {
        &self.rules
    }

    /// Remapped path as a string
    pub fn remap_str(&self, path: &str) -> String {
        let rewritten = self
            .rules
            .iter()
            .find_map(|(from, to)| path.strip_prefix(from.as_str()).map(|rest| format!("{}{}", to, rest)))
            .unwrap_or_else(|| path.to_string());

        match self.separator {
            Separator::Slash => rewritten,
            Separator::Backslash => rewritten.replace('/', "\\"),
        }
    }

    /// Remapped path
    pub fn remap(&self, path: &str) -> PathBuf {
        PathBuf::from(self.remap_str(path))
    }
}
