// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Continuum range reports (`cont.dat`).
//!
//! For every target field and spectral window, the frequency ranges which are
//! free of line emission, in the format read by the CASA pipeline:
//!
//! ```text
//! Field: M31_Field_1
//!
//! SpectralWindow: 0
//! 0.968~1.032GHz TOPO
//!
//! SpectralWindow: 1
//! 1.4186~1.4198GHz TOPO
//! 1.4231~1.4241GHz TOPO
//!
//! ```

use std::{collections::BTreeMap, fs, io::Write, path::Path};

use lazy_static::lazy_static;
use log::{debug, info, trace};
use regex::Regex;

use crate::{
    config::{ConfigError, LineConfig},
    constants::CONT_REPORT_FRAME,
    interval::{partition_cont_range, Interval},
    io::{error::IOError, open_output},
    spw::SpwSetup,
};

/// Continuum chunks by field name, then spectral window id.
pub type ContRanges = BTreeMap<String, BTreeMap<usize, Vec<Interval>>>;

lazy_static! {
    static ref FIELD_RE: Regex = Regex::new(r"^Field:\s*(?P<field>\S.*?)\s*$").unwrap();
    static ref SPW_RE: Regex = Regex::new(r"^SpectralWindow:\s*(?P<spw>\d+)\s*$").unwrap();
    static ref RANGE_RE: Regex = Regex::new(
        r"^(?P<start>[-+]?[\d.]+(?:[eE][-+]?\d+)?)~(?P<end>[-+]?[\d.]+(?:[eE][-+]?\d+)?)GHz(?:\s+(?P<frame>[A-Z]+))?\s*$"
    )
    .unwrap();
}

/// The continuum chunks of every spectral window of `setup`, for each field.
///
/// Each field is matched to a configured target, whose line velocity ranges
/// are converted to frequency and subtracted from the frequency span of each
/// window. Only exclusions which overlap a window are applied to it.
///
/// # Errors
///
/// Will return [`ConfigError::UnknownTarget`] if a field doesn't match a
/// configured target.
pub fn build_cont_ranges<S: AsRef<str>>(
    fields: &[S],
    setup: &SpwSetup,
    config: &LineConfig,
) -> Result<ContRanges, ConfigError> {
    trace!("start build_cont_ranges");
    let cont_ranges = fields
        .iter()
        .map(|field| {
            let field = field.as_ref();
            let (target, target_cfg) = config.target_for_field(field)?;
            let exclusions = config.exclusion_intervals(&target_cfg.line_ranges_kms);
            debug!(
                "field {} (target {}): {} exclusion ranges",
                field,
                target,
                exclusions.len()
            );
            let by_spw = setup
                .spws
                .iter()
                .map(|spw| {
                    let base = spw.freq_range_ghz();
                    let in_window = exclusions
                        .iter()
                        .filter(|excl| excl.intersection(&base).is_some())
                        .copied()
                        .collect::<Vec<_>>();
                    (spw.id, partition_cont_range(base, &in_window))
                })
                .collect();
            Ok((field.to_string(), by_spw))
        })
        .collect::<Result<ContRanges, ConfigError>>()?;
    trace!("end build_cont_ranges");
    Ok(cont_ranges)
}

/// Render continuum ranges in `cont.dat` format.
pub fn format_cont_ranges(cont_ranges: &ContRanges) -> String {
    let mut out = String::new();
    for (field, by_spw) in cont_ranges {
        out.push_str(&format!("Field: {field}\n\n"));
        for (spw, chunks) in by_spw {
            out.push_str(&format!("SpectralWindow: {spw}\n"));
            for chunk in chunks {
                out.push_str(&format!("{chunk}GHz {CONT_REPORT_FRAME}\n"));
            }
            out.push('\n');
        }
    }
    out
}

/// Write continuum ranges to a `cont.dat` file.
///
/// # Errors
///
/// Will return [`IOError::FileExists`] if `path` exists and neither
/// `overwrite` nor `append` is set, or [`IOError::StdIo`] if it can't be
/// written.
pub fn write_cont_ranges<P: AsRef<Path>>(
    path: P,
    cont_ranges: &ContRanges,
    overwrite: bool,
    append: bool,
) -> Result<(), IOError> {
    let path = path.as_ref();
    let mut file = open_output(path, overwrite, append)?;
    file.write_all(format_cont_ranges(cont_ranges).as_bytes())?;
    info!(
        "wrote continuum ranges for {} fields to {}",
        cont_ranges.len(),
        path.display()
    );
    Ok(())
}

/// Parse a `cont.dat` file. Fields which appear more than once, as in an
/// appended file, are merged.
///
/// # Errors
///
/// Will return [`IOError::ContReportParse`] for a line which isn't part of the
/// format, or [`IOError::StdIo`] if the file can't be read.
pub fn read_cont_ranges<P: AsRef<Path>>(path: P) -> Result<ContRanges, IOError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let mut cont_ranges = ContRanges::new();
    let mut field: Option<String> = None;
    let mut spw: Option<usize> = None;

    for (line_idx, line) in contents.lines().enumerate() {
        let parse_error = || IOError::ContReportParse {
            path: path.to_path_buf(),
            line_num: line_idx + 1,
            line: line.to_string(),
        };
        if line.trim().is_empty() {
            continue;
        }
        if let Some(caps) = FIELD_RE.captures(line) {
            let name = caps["field"].to_string();
            cont_ranges.entry(name.clone()).or_default();
            field = Some(name);
            spw = None;
        } else if let Some(caps) = SPW_RE.captures(line) {
            let id: usize = caps["spw"].parse().map_err(|_| parse_error())?;
            let name = field.as_ref().ok_or_else(parse_error)?;
            cont_ranges
                .entry(name.clone())
                .or_default()
                .entry(id)
                .or_default();
            spw = Some(id);
        } else if let Some(caps) = RANGE_RE.captures(line) {
            let (name, id) = field.as_ref().zip(spw).ok_or_else(parse_error)?;
            let start: f64 = caps["start"].parse().map_err(|_| parse_error())?;
            let end: f64 = caps["end"].parse().map_err(|_| parse_error())?;
            cont_ranges
                .entry(name.clone())
                .or_default()
                .entry(id)
                .or_default()
                .push(Interval::new(start, end));
        } else {
            return Err(parse_error());
        }
    }
    debug!(
        "read continuum ranges for {} fields from {}",
        cont_ranges.len(),
        path.display()
    );
    Ok(cont_ranges)
}
