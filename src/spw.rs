// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Spectral window setup: which windows are continuum and which hold lines.

use std::{
    fmt::{Display, Formatter},
    fs,
    path::Path,
    str::FromStr,
};

use itertools::Itertools;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::{
    config::{ConfigError, LineConfig},
    interval::Interval,
    lines::lines_rest2obs,
};

/// A spectral window, as described by the `SPECTRAL_WINDOW` table.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralWindow {
    /// Spectral window id
    pub id: usize,
    /// Original name, e.g. `EVLA_L#A0C0#0`
    pub name: String,
    /// Channel centre frequencies [Hz]
    pub chan_freqs_hz: Vec<f64>,
    /// Channel width [Hz]
    pub chan_width_hz: f64,
}

impl SpectralWindow {
    /// The baseband, the second `#`-separated field of the name.
    pub fn baseband(&self) -> &str {
        self.name.split('#').nth(1).unwrap_or_default()
    }

    /// The number of channels.
    pub fn num_chans(&self) -> usize {
        self.chan_freqs_hz.len()
    }

    /// Total bandwidth [Hz].
    pub fn bandwidth_hz(&self) -> f64 {
        self.chan_width_hz.abs() * self.num_chans() as f64
    }

    /// The lowest and highest channel frequencies [GHz].
    pub fn freq_range_ghz(&self) -> Option<Interval> {
        let (min, max) = self
            .chan_freqs_hz
            .iter()
            .copied()
            .minmax_by(f64::total_cmp)
            .into_option()?;
        Some(Interval::new(min / 1e9, max / 1e9))
    }

    /// The frequency [kHz] of channel `nchan / 2 - 1`.
    pub fn centre_freq_khz(&self) -> f64 {
        let idx = (self.num_chans() / 2).saturating_sub(1);
        self.chan_freqs_hz.get(idx).map_or(0.0, |f| f / 1e3)
    }
}

/// A baseband selection for continuum windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Baseband {
    /// Baseband pair A0/C0
    A0C0,
    /// Baseband pair B0/D0
    B0D0,
    /// Both baseband pairs
    Both,
}

impl Baseband {
    fn includes(self, baseband: &str) -> bool {
        match self {
            Self::A0C0 => baseband == "A0C0",
            Self::B0D0 => baseband == "B0D0",
            Self::Both => baseband == "A0C0" || baseband == "B0D0",
        }
    }
}

impl FromStr for Baseband {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A0C0" => Ok(Self::A0C0),
            "B0D0" => Ok(Self::B0D0),
            "both" => Ok(Self::Both),
            _ => Err(ConfigError::InvalidBaseband { received: s.into() }),
        }
    }
}

/// What we know about a spectral window once it has been labelled.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SpwRecord {
    /// Spectral window id
    pub id: usize,
    /// `continuum_A<n>`, `continuum_B<n>`, or the matched line names joined
    /// with `-`
    pub label: String,
    /// Original name
    pub origname: String,
    /// Channel width [Hz]
    pub chanwidth_hz: f64,
    /// Bandwidth [Hz]
    pub bandwidth_hz: f64,
    /// Number of channels
    pub nchan: usize,
    /// Frequency of channel `nchan / 2 - 1` [kHz]
    pub centerfreq_khz: f64,
    /// Baseband, e.g. `A0C0`
    pub baseband: String,
    /// Lowest channel frequency [GHz]
    pub freq_min_ghz: f64,
    /// Highest channel frequency [GHz]
    pub freq_max_ghz: f64,
}

impl SpwRecord {
    /// Whether this is a continuum window.
    pub fn is_continuum(&self) -> bool {
        self.label.contains("continuum")
    }

    /// The frequency bounds of the window [GHz].
    pub fn freq_range_ghz(&self) -> Interval {
        Interval::new(self.freq_min_ghz, self.freq_max_ghz)
    }
}

/// The labelled spectral windows of an observation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SpwSetup {
    /// The configured target name the setup was matched against
    pub target: String,
    /// Spectral windows, in id order
    pub spws: Vec<SpwRecord>,
}

impl SpwSetup {
    /// Label every spectral window.
    ///
    /// Windows with channels at least `min_continuum_chanwidth_khz` wide are
    /// continuum windows, numbered separately in each baseband. Every other
    /// window is labelled with the lines whose observed frequency at the
    /// target's systemic velocity lies strictly inside it.
    ///
    /// # Errors
    ///
    /// Will return [`ConfigError::UnknownTarget`] if `target_field` doesn't
    /// match a configured target, or [`ConfigError::NoLineMatch`] if a narrow
    /// window contains no line.
    pub fn from_windows(
        windows: &[SpectralWindow],
        target_field: &str,
        config: &LineConfig,
        min_continuum_chanwidth_khz: f64,
    ) -> Result<Self, ConfigError> {
        trace!("start SpwSetup::from_windows");
        let (target, target_cfg) = config.target_for_field(target_field)?;
        debug!(
            "matched field {} to target {} (vsys={} km/s)",
            target_field, target, target_cfg.vsys_kms
        );

        let line_obs_hz: Vec<(&str, f64)> = config
            .lines
            .iter()
            .map(|line| {
                (
                    line.name.as_str(),
                    lines_rest2obs(line.rest_freq_ghz, target_cfg.vsys_kms) * 1e9,
                )
            })
            .collect();

        let mut cont_a_count = 0;
        let mut cont_b_count = 0;
        let mut spws = Vec::with_capacity(windows.len());
        for window in windows.iter().sorted_by_key(|w| w.id) {
            let baseband = window.baseband();
            let freq_range = window.freq_range_ghz().unwrap_or(Interval::new(0.0, 0.0));
            let label = if window.chan_width_hz.abs() >= min_continuum_chanwidth_khz * 1e3 {
                if baseband.starts_with('A') {
                    cont_a_count += 1;
                    format!("continuum_A{}", cont_a_count - 1)
                } else {
                    cont_b_count += 1;
                    format!("continuum_B{}", cont_b_count - 1)
                }
            } else {
                let (lo_hz, hi_hz) = (freq_range.start * 1e9, freq_range.end * 1e9);
                let matches = line_obs_hz
                    .iter()
                    .filter(|&&(_, obs_hz)| obs_hz > lo_hz && obs_hz < hi_hz)
                    .map(|&(name, _)| name)
                    .collect::<Vec<_>>();
                if matches.is_empty() {
                    return Err(ConfigError::NoLineMatch {
                        spw: window.id,
                        name: window.name.clone(),
                    });
                }
                matches.join("-")
            };
            trace!("spw {} ({}) -> {}", window.id, window.name, label);
            spws.push(SpwRecord {
                id: window.id,
                label,
                origname: window.name.clone(),
                chanwidth_hz: window.chan_width_hz,
                bandwidth_hz: window.bandwidth_hz(),
                nchan: window.num_chans(),
                centerfreq_khz: window.centre_freq_khz(),
                baseband: baseband.to_string(),
                freq_min_ghz: freq_range.start,
                freq_max_ghz: freq_range.end,
            });
        }

        trace!("end SpwSetup::from_windows");
        Ok(Self {
            target: target.to_string(),
            spws,
        })
    }

    /// Ids of the continuum windows in `baseband`, sorted.
    pub fn continuum_spws(&self, baseband: Baseband) -> Vec<usize> {
        self.spws
            .iter()
            .filter(|spw| spw.is_continuum() && baseband.includes(&spw.baseband))
            .map(|spw| spw.id)
            .sorted()
            .collect()
    }

    /// Ids of the line windows, sorted. Radio recombination lines are only
    /// included with `include_rrls`. With `keep_backup_continuum`, the A0C0
    /// continuum windows are kept too.
    pub fn line_spws(&self, include_rrls: bool, keep_backup_continuum: bool) -> Vec<usize> {
        let prefixes: &[&str] = if include_rrls {
            &["HI", "OH", "H1"]
        } else {
            &["HI", "OH"]
        };
        self.spws
            .iter()
            .filter(|spw| {
                if keep_backup_continuum && spw.is_continuum() {
                    return spw.baseband == "A0C0";
                }
                prefixes.iter().any(|prefix| spw.label.starts_with(prefix))
            })
            .map(|spw| spw.id)
            .sorted()
            .collect()
    }

    /// The first window labelled `label`.
    pub fn find_spw_by_label(&self, label: &str) -> Option<&SpwRecord> {
        self.spws.iter().find(|spw| spw.label == label)
    }

    /// The window with id `id`.
    pub fn get(&self, id: usize) -> Option<&SpwRecord> {
        self.spws.iter().find(|spw| spw.id == id)
    }

    /// Serialise to TOML.
    ///
    /// # Errors
    ///
    /// Will return [`ConfigError::TomlSer`] if serialisation fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Parse a setup written by [`SpwSetup::to_toml_string`].
    ///
    /// # Errors
    ///
    /// Will return [`ConfigError::Toml`] if the string can't be decoded.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Read a setup file.
    ///
    /// # Errors
    ///
    /// Will return [`ConfigError::Io`] if the file can't be read, or
    /// [`ConfigError::Toml`] if it can't be decoded.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Write a setup file.
    ///
    /// # Errors
    ///
    /// Will return [`ConfigError::Io`] if the file can't be written.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        fs::write(path, self.to_toml_string()?).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Display for SpwSetup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Spectral windows for target {}:", self.target)?;
        for spw in &self.spws {
            writeln!(
                f,
                "  {:3} {:24} {:16} {:5} x {:9.3}kHz, centre {:.3}kHz",
                spw.id,
                spw.label,
                spw.origname,
                spw.nchan,
                spw.chanwidth_hz / 1e3,
                spw.centerfreq_khz,
            )?;
        }
        Ok(())
    }
}

/// A comma-separated spectral window selection, e.g. `0,4,8`.
pub fn spw_selection_string(ids: &[usize]) -> String {
    ids.iter().join(",")
}
