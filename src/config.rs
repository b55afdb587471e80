// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Line, target and calibrator configuration.
//!
//! Loaded once from a TOML file and passed explicitly to whatever needs it.
//!
//! ```toml
//! [[lines]]
//! name = "HI"
//! rest_freq_ghz = 1.420405752
//!
//! [targets.M31]
//! vsys_kms = -300.0
//! line_ranges_kms = { HI = [[-625, 50]], OH = [[-600, -20]] }
//!
//! [calibrators.3C138]
//! line_ranges_kms = { HI = [[70, -70]] }
//! ```
//!
//! If no `[[lines]]` are given, every L-band line in
//! [`LBAND_LINE_REST_FREQS_GHZ`] is used.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{constants::LBAND_LINE_REST_FREQS_GHZ, interval::Interval, lines};

/// Errors raised while loading or using a [`LineConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    /// The config file could not be read
    Io {
        /// path to the config file
        path: PathBuf,
        /// the underlying error
        source: std::io::Error,
    },

    #[error("could not decode config: {0}")]
    /// The config is not valid TOML for a [`LineConfig`]
    Toml(#[from] toml::de::Error),

    #[error("velocity range {index} of {line} for {source_name} must be a [low, high] pair, found {num_values} values")]
    /// A velocity range is not a pair of values
    BadVelocityRange {
        /// target or calibrator name
        source_name: String,
        /// the line the range belongs to
        line: String,
        /// the index of the range in the list
        index: usize,
        /// the number of values found
        num_values: usize,
    },

    #[error("could not encode config: {0}")]
    /// A config could not be written as TOML
    TomlSer(#[from] toml::ser::Error),

    #[error("invalid baseband selection {received}, must be one of A0C0, B0D0 or both")]
    /// An unknown baseband was requested
    InvalidBaseband {
        /// the requested baseband
        received: String,
    },

    #[error("cannot identify which target is observed from field name {field}")]
    /// No configured target name is contained in the field name
    UnknownTarget {
        /// the field name
        field: String,
    },

    #[error("unable to match a spectral line to spectral window {spw} ({name})")]
    /// A narrow spectral window contains no configured line
    NoLineMatch {
        /// spectral window id
        spw: usize,
        /// spectral window name
        name: String,
    },
}

/// A spectral line and its rest frequency.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RestLine {
    /// The name of the line, e.g. `HI`, `OH1665` or `H166a`
    pub name: String,
    /// Rest frequency [GHz]
    pub rest_freq_ghz: f64,
}

/// Velocity ranges to avoid, keyed by line name prefix (`OH` covers every OH
/// line). Each range is a `[v1, v2]` pair in km/s, in either order.
pub type LineRanges = BTreeMap<String, Vec<Vec<f64>>>;

/// A target galaxy.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TargetConfig {
    /// Systemic velocity [km/s]
    pub vsys_kms: f64,
    /// Velocity ranges with line emission
    #[serde(default)]
    pub line_ranges_kms: LineRanges,
}

/// A calibrator source.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct CalibratorConfig {
    /// Velocity ranges with foreground absorption
    #[serde(default)]
    pub line_ranges_kms: LineRanges,
}

fn default_lines() -> Vec<RestLine> {
    LBAND_LINE_REST_FREQS_GHZ
        .iter()
        .map(|&(name, rest_freq_ghz)| RestLine {
            name: name.to_string(),
            rest_freq_ghz,
        })
        .collect()
}

/// Rest frequencies, target velocities and the velocity ranges to avoid for
/// every target and calibrator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LineConfig {
    /// Spectral lines, in the order they are matched
    #[serde(default = "default_lines")]
    pub lines: Vec<RestLine>,
    /// Targets, keyed by a name that appears in their field names
    #[serde(default)]
    pub targets: BTreeMap<String, TargetConfig>,
    /// Calibrators, keyed by a name that appears in their field names
    #[serde(default)]
    pub calibrators: BTreeMap<String, CalibratorConfig>,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            lines: default_lines(),
            targets: BTreeMap::new(),
            calibrators: BTreeMap::new(),
        }
    }
}

impl LineConfig {
    /// Parse and validate a config from a TOML string.
    ///
    /// # Errors
    ///
    /// Will return [`ConfigError::Toml`] if the string can't be decoded, or
    /// [`ConfigError::BadVelocityRange`] if a velocity range isn't a pair.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        debug!(
            "line config: {} lines, {} targets, {} calibrators",
            config.lines.len(),
            config.targets.len(),
            config.calibrators.len()
        );
        Ok(config)
    }

    /// Read, parse and validate a TOML config file.
    ///
    /// # Errors
    ///
    /// See [`LineConfig::from_toml_str`], and [`ConfigError::Io`] if the file
    /// can't be read.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        trace!("reading line config from {}", path.display());
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let targets = self
            .targets
            .iter()
            .map(|(name, target)| (name, &target.line_ranges_kms));
        let calibrators = self
            .calibrators
            .iter()
            .map(|(name, cal)| (name, &cal.line_ranges_kms));
        for (source_name, ranges) in targets.chain(calibrators) {
            for (line, pairs) in ranges {
                if let Some((index, pair)) = pairs.iter().enumerate().find(|(_, p)| p.len() != 2)
                {
                    return Err(ConfigError::BadVelocityRange {
                        source_name: source_name.clone(),
                        line: line.clone(),
                        index,
                        num_values: pair.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// The rest frequency of the line called `name` [GHz].
    pub fn rest_freq_ghz(&self, name: &str) -> Option<f64> {
        self.lines
            .iter()
            .find(|line| line.name == name)
            .map(|line| line.rest_freq_ghz)
    }

    /// Every line whose name starts with `prefix`.
    pub fn lines_matching<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a RestLine> {
        self.lines
            .iter()
            .filter(move |line| line.name.starts_with(prefix))
    }

    /// The target whose name appears in `field`.
    ///
    /// # Errors
    ///
    /// Will return [`ConfigError::UnknownTarget`] if no target matches.
    pub fn target_for_field(&self, field: &str) -> Result<(&str, &TargetConfig), ConfigError> {
        self.targets
            .iter()
            .find(|(name, _)| field.contains(name.as_str()))
            .map(|(name, target)| (name.as_str(), target))
            .ok_or_else(|| ConfigError::UnknownTarget {
                field: field.to_string(),
            })
    }

    /// The calibrator whose name appears in `field`, if any.
    pub fn calibrator_for_field(&self, field: &str) -> Option<(&str, &CalibratorConfig)> {
        self.calibrators
            .iter()
            .find(|(name, _)| field.contains(name.as_str()))
            .map(|(name, cal)| (name.as_str(), cal))
    }

    /// Frequency intervals [GHz] covered by `ranges`, for every line matching
    /// each range's prefix, in config order.
    pub fn exclusion_intervals(&self, ranges: &LineRanges) -> Vec<Interval> {
        ranges
            .iter()
            .flat_map(move |(prefix, pairs)| {
                self.lines_matching(prefix).flat_map(move |line| {
                    pairs.iter().filter_map(move |pair| match pair.as_slice() {
                        &[v1, v2] => Some(lines::velocity_range_to_interval(
                            line.rest_freq_ghz,
                            [v1, v2],
                        )),
                        _ => None,
                    })
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const EXAMPLE: &str = r#"
[targets.M31]
vsys_kms = -300.0
line_ranges_kms = { HI = [[-625, 50]], OH = [[-600, -20]] }

[targets.IC10]
vsys_kms = -348.0
line_ranges_kms = { HI = [[-450, -240], [-140, 50]] }

[calibrators.3C138.line_ranges_kms]
HI = [[70, -70]]
"#;

    #[test]
    fn test_parse_example() {
        let config = LineConfig::from_toml_str(EXAMPLE).unwrap();
        assert_eq!(config.lines.len(), LBAND_LINE_REST_FREQS_GHZ.len());
        assert_eq!(config.rest_freq_ghz("HI"), Some(1.420405752));
        assert_eq!(config.targets["M31"].vsys_kms, -300.0);
        assert_eq!(config.targets["IC10"].line_ranges_kms["HI"].len(), 2);
        assert_eq!(
            config.calibrators["3C138"].line_ranges_kms["HI"],
            vec![vec![70.0, -70.0]]
        );
    }

    #[test]
    fn test_custom_lines_replace_defaults() {
        let config = LineConfig::from_toml_str(
            r#"
[[lines]]
name = "HI"
rest_freq_ghz = 1.420405752

[[lines]]
name = "OH1665"
rest_freq_ghz = 1.6654018
"#,
        )
        .unwrap();
        assert_eq!(config.lines.len(), 2);
        assert_eq!(config.rest_freq_ghz("OH1612"), None);
        assert!(config.targets.is_empty());
    }

    #[test]
    fn test_bad_velocity_range() {
        let result = LineConfig::from_toml_str(
            r#"
[targets.M33]
vsys_kms = -180.0
line_ranges_kms = { HI = [[-340, 40], [-20, 0, 20]] }
"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::BadVelocityRange {
                index: 1,
                num_values: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            LineConfig::from_toml_str("[targets.M31]\nvsys_kms = \"fast\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_target_for_field() {
        let config = LineConfig::from_toml_str(EXAMPLE).unwrap();
        let (name, target) = config.target_for_field("M31_Field_7").unwrap();
        assert_eq!(name, "M31");
        assert_eq!(target.vsys_kms, -300.0);
        assert!(matches!(
            config.target_for_field("NGC6822"),
            Err(ConfigError::UnknownTarget { .. })
        ));
        assert!(config.calibrator_for_field("J0137+3309=3C48").is_none());
        assert!(config.calibrator_for_field("0521+166=3C138").is_some());
    }

    #[test]
    fn test_exclusion_intervals_cover_every_prefixed_line() {
        let config = LineConfig::from_toml_str(EXAMPLE).unwrap();
        let exclusions = config.exclusion_intervals(&config.targets["M31"].line_ranges_kms);
        // HI, then the four OH lines
        assert_eq!(exclusions.len(), 5);
        assert!(exclusions[0].contains(1.420405752));
        let oh1665 = lines::vel_to_freq(1.66540180, -300.0);
        assert!(exclusions.iter().any(|e| e.contains(oh1665)));
    }

    #[test]
    fn test_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(EXAMPLE.as_bytes()).unwrap();
        let config = LineConfig::from_path(file.path()).unwrap();
        assert_eq!(config.targets.len(), 2);

        assert!(matches!(
            LineConfig::from_path("/nonexistent/lines.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
