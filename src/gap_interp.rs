// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Interpolation across flagged gaps in bandpass solutions.
//!
//! A bandpass solution for a line spectral window is flagged wherever the
//! calibrator has foreground absorption (e.g. Milky Way HI). Each flagged
//! interior gap is bridged with a local polynomial fit across a sliding
//! window, optionally with resampled residual noise added so the filled region
//! has the same noise floor as its surroundings.

use std::{
    fmt::{Display, Formatter},
    ops::Range,
};

use derive_builder::Builder;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use itertools::{izip, Itertools};
use log::{debug, info, trace, warn};
use ndarray::{prelude::*, Zip};
use num_complex::Complex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use thiserror::Error;

use crate::{
    constants::{DEFAULT_POLY_ORDER, DEFAULT_WINDOW_FRACTION},
    polyfit::polyfit,
};

/// Errors raised while interpolating across bandpass gaps.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GapInterpError {
    #[error("bad array shape supplied to argument {argument} of function {function}. expected {expected}, received {received}")]
    /// Error for bad array shape in provided argument
    BadArrayShape {
        /// The argument name within the function
        argument: String,
        /// The function name
        function: String,
        /// The expected shape
        expected: String,
        /// The shape that was received instead
        received: String,
    },

    #[error("invalid interpolation parameter {name}: expected {expected}, received {received}")]
    /// A fitting parameter is out of range
    InvalidParameter {
        /// The parameter name
        name: String,
        /// A description of the valid range
        expected: String,
        /// The value that was received
        received: String,
    },

    #[error("no unflagged channels outside the gaps to draw residual noise from")]
    /// Residual noise was requested but every candidate channel is flagged
    EmptyResidualPool,

    #[error("the polynomial fit is unconstrained at channel {chan}: too few unflagged samples in the window")]
    /// A gap channel had too few valid samples in its window to be fit
    UnconstrainedFit {
        /// The channel index
        chan: usize,
    },
}

/// Options for interpolating across bandpass gaps.
///
/// Fields left unset on a [`GapInterpContextBuilder`] take their value from
/// [`GapInterpContext::default`].
#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(default)]
pub struct GapInterpContext {
    /// Fraction of the channels in the window used for the sliding fit window.
    pub window_fraction: f64,
    /// Order of the polynomial fit in each window.
    pub poly_order: usize,
    /// Whether to add resampled residual noise to the filled gaps.
    pub add_residual_noise: bool,
    /// Seed for the residual noise resampling.
    pub seed: u64,
    /// Whether to draw progress bars
    pub draw_progress: bool,
}

impl Default for GapInterpContext {
    fn default() -> Self {
        Self {
            window_fraction: DEFAULT_WINDOW_FRACTION,
            poly_order: DEFAULT_POLY_ORDER,
            add_residual_noise: true,
            seed: 0,
            draw_progress: true,
        }
    }
}

impl Display for GapInterpContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Will fit order {} polynomials over {:.1}% of the channels.",
            self.poly_order,
            self.window_fraction * 100.0
        )?;
        writeln!(
            f,
            "{} add resampled residual noise to filled gaps.",
            if self.add_residual_noise {
                "Will"
            } else {
                "Will not"
            }
        )?;
        if self.add_residual_noise {
            writeln!(f, "Residual noise seed: {}", self.seed)?;
        }
        Ok(())
    }
}

impl GapInterpContext {
    /// The number of channels in the fit window for a spectral window of
    /// `num_chans` channels; always odd so the window has a centre.
    pub fn window_size(&self, num_chans: usize) -> usize {
        let size = (self.window_fraction * num_chans as f64).floor() as usize;
        if size % 2 == 0 {
            size + 1
        } else {
            size
        }
    }

    /// Check the fit parameters against a spectral window of `num_chans`
    /// channels, returning the window size.
    ///
    /// # Errors
    ///
    /// Will return [`GapInterpError::InvalidParameter`] if the window fraction
    /// is not within (0, 1), or if the polynomial order is not smaller than the
    /// window size.
    pub fn validate(&self, num_chans: usize) -> Result<usize, GapInterpError> {
        if !(self.window_fraction > 0.0 && self.window_fraction < 1.0) {
            return Err(GapInterpError::InvalidParameter {
                name: "window_fraction".into(),
                expected: "0 < window_fraction < 1".into(),
                received: format!("{}", self.window_fraction),
            });
        }
        let window_size = self.window_size(num_chans);
        if self.poly_order >= window_size {
            return Err(GapInterpError::InvalidParameter {
                name: "poly_order".into(),
                expected: format!("poly_order < window size ({window_size})"),
                received: format!("{}", self.poly_order),
            });
        }
        Ok(window_size)
    }
}

/// What happened to a single (polarisation, antenna) trace.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceStatus {
    /// At most the two edge runs were flagged; nothing to do.
    NoGaps,
    /// Every channel was flagged; nothing can be done.
    AllFlagged,
    /// These gaps were filled and unflagged.
    Filled(Vec<Range<usize>>),
    /// The trace could not be interpolated and was left untouched.
    Failed(GapInterpError),
}

/// The outcome of [`interpolate_gaps`] for every trace, indexed `[pol][ant]`.
#[derive(Debug, Clone)]
pub struct GapInterpReport {
    /// Status of each trace, `[pol][ant]`
    pub traces: Array2<TraceStatus>,
}

impl GapInterpReport {
    /// The number of traces which had at least one gap filled.
    pub fn num_filled(&self) -> usize {
        self.traces
            .iter()
            .filter(|status| matches!(status, TraceStatus::Filled(_)))
            .count()
    }

    /// The number of traces which were entirely flagged.
    pub fn num_all_flagged(&self) -> usize {
        self.traces
            .iter()
            .filter(|status| matches!(status, TraceStatus::AllFlagged))
            .count()
    }

    /// The `(pol, ant)` index and error of each trace which failed.
    pub fn failures(&self) -> Vec<((usize, usize), &GapInterpError)> {
        self.traces
            .indexed_iter()
            .filter_map(|(idx, status)| match status {
                TraceStatus::Failed(err) => Some((idx, err)),
                _ => None,
            })
            .collect()
    }
}

impl Display for GapInterpReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let (num_pols, num_ants) = self.traces.dim();
        writeln!(
            f,
            "{} of {} traces ({} pols x {} ants) interpolated, {} fully flagged, {} failed.",
            self.num_filled(),
            self.traces.len(),
            num_pols,
            num_ants,
            self.num_all_flagged(),
            self.failures().len(),
        )?;
        for ((pol, ant), err) in self.failures() {
            writeln!(f, "  pol {pol} ant {ant}: {err}")?;
        }
        Ok(())
    }
}

/// Find the maximal runs of flagged channels in a trace.
pub fn flagged_runs(flags: ArrayView1<bool>) -> Vec<Range<usize>> {
    let mut runs = vec![];
    for (flagged, mut run) in &flags.iter().enumerate().chunk_by(|&(_, &flag)| flag) {
        if !flagged {
            continue;
        }
        if let Some((first, _)) = run.next() {
            let last = run.last().map_or(first, |(idx, _)| idx);
            runs.push(first..last + 1);
        }
    }
    runs
}

/// The interior gaps of a trace: every flagged run except the first and the
/// last, which are the usual spectral window edge flags.
pub fn interior_gaps(flags: ArrayView1<bool>) -> Vec<Range<usize>> {
    let mut runs = flagged_runs(flags);
    if runs.len() <= 2 {
        return vec![];
    }
    runs.pop();
    runs.remove(0);
    runs
}

/// A sliding window over a masked trace. Row `i` holds the `size` samples
/// centred on channel `i`. Positions beyond either end of the trace repeat the
/// nearest unmasked sample.
pub struct RollingWindow<'a> {
    values: &'a [Complex<f64>],
    mask: &'a [bool],
    half: usize,
    lower_pad: Option<Complex<f64>>,
    upper_pad: Option<Complex<f64>>,
}

impl<'a> RollingWindow<'a> {
    /// Create a rolling window of odd `size` over `values`, where
    /// `mask[i] == true` marks an invalid sample.
    pub fn new(values: &'a [Complex<f64>], mask: &'a [bool], size: usize) -> Self {
        let first_valid = mask.iter().position(|&m| !m);
        let last_valid = mask.iter().rposition(|&m| !m);
        Self {
            values,
            mask,
            half: size / 2,
            lower_pad: first_valid.map(|idx| values[idx]),
            upper_pad: last_valid.map(|idx| values[idx]),
        }
    }

    /// The number of samples in each row.
    pub fn size(&self) -> usize {
        2 * self.half + 1
    }

    /// The sample at offset `k` (`0..size`) of row `row`, or `None` if it is
    /// masked.
    fn sample(&self, row: usize, k: usize) -> Option<Complex<f64>> {
        let pos = row as isize + k as isize - self.half as isize;
        if pos < 0 {
            self.lower_pad
        } else if pos as usize >= self.values.len() {
            self.upper_pad
        } else if self.mask[pos as usize] {
            None
        } else {
            Some(self.values[pos as usize])
        }
    }

    /// Collect the valid samples of `row` and their offsets into `xs` and `ys`.
    pub fn valid_row_into(
        &self,
        row: usize,
        offsets: &[f64],
        xs: &mut Vec<f64>,
        ys: &mut Vec<Complex<f64>>,
    ) {
        xs.clear();
        ys.clear();
        for (k, &offset) in offsets.iter().enumerate().take(self.size()) {
            if let Some(value) = self.sample(row, k) {
                xs.push(offset);
                ys.push(value);
            }
        }
    }

    /// Materialise the full `[channel][offset]` window matrix and its mask.
    #[cfg(test)]
    fn to_matrix(&self) -> (Array2<Complex<f64>>, Array2<bool>) {
        let shape = (self.values.len(), self.size());
        let mut values = Array2::zeros(shape);
        let mut mask = Array2::from_elem(shape, true);
        for ((row, k), value) in values.indexed_iter_mut() {
            if let Some(sample) = self.sample(row, k) {
                *value = sample;
                mask[(row, k)] = false;
            }
        }
        (values, mask)
    }
}

/// The centred offsets `-size/2 ..= size/2` used as the fit abscissae for
/// every window row.
pub fn window_offsets(size: usize) -> Vec<f64> {
    let half = (size / 2) as f64;
    (0..size).map(|k| k as f64 - half).collect()
}

/// Smooth a masked trace: the fitted value at the centre of the window around
/// each channel, or `None` where the window is unconstrained.
pub fn smooth_trace(
    values: &[Complex<f64>],
    mask: &[bool],
    offsets: &[f64],
    poly_order: usize,
) -> Vec<Option<Complex<f64>>> {
    let window = RollingWindow::new(values, mask, offsets.len());
    let mut xs = Vec::with_capacity(offsets.len());
    let mut ys = Vec::with_capacity(offsets.len());
    (0..values.len())
        .map(|row| {
            window.valid_row_into(row, offsets, &mut xs, &mut ys);
            polyfit(&xs, &ys, poly_order).map(|poly| poly.coeffs()[0])
        })
        .collect()
}

/// Interpolate across the interior gaps of a single trace.
///
/// Nothing is written unless every gap of the trace can be filled.
fn interpolate_trace(
    mut gains: ArrayViewMut1<Complex<f32>>,
    mut flags: ArrayViewMut1<bool>,
    offsets: &[f64],
    ctx: &GapInterpContext,
    rng: &mut StdRng,
) -> TraceStatus {
    if flags.iter().all(|&flag| flag) {
        return TraceStatus::AllFlagged;
    }

    let gaps = interior_gaps(flags.view());
    if gaps.is_empty() {
        return TraceStatus::NoGaps;
    }

    // Every gap is already flagged, so the flags mask all gaps at once. The fit
    // around one gap is never biased by the contents of a neighbouring gap.
    let values: Vec<Complex<f64>> = gains
        .iter()
        .map(|g| Complex::new(g.re as f64, g.im as f64))
        .collect();
    let mask: Vec<bool> = flags.to_vec();

    let smoothed = smooth_trace(&values, &mask, offsets, ctx.poly_order);

    // residuals are only drawn from channels outside the edges and all gaps,
    // which are exactly the unflagged channels.
    let residuals: Vec<Complex<f64>> = izip!(&values, &mask, &smoothed)
        .filter_map(|(&value, &masked, fit)| match (masked, fit) {
            (false, Some(fit)) => Some(value - fit),
            _ => None,
        })
        .collect();
    if ctx.add_residual_noise && residuals.is_empty() {
        return TraceStatus::Failed(GapInterpError::EmptyResidualPool);
    }

    let mut filled: Vec<(usize, Complex<f64>)> = vec![];
    for gap in &gaps {
        for chan in gap.clone() {
            let fit = match smoothed[chan] {
                Some(fit) => fit,
                None => return TraceStatus::Failed(GapInterpError::UnconstrainedFit { chan }),
            };
            let value = if ctx.add_residual_noise {
                fit + residuals[rng.gen_range(0..residuals.len())]
            } else {
                fit
            };
            filled.push((chan, value));
        }
    }

    for (chan, value) in filled {
        gains[chan] = Complex::new(value.re as f32, value.im as f32);
        flags[chan] = false;
    }
    TraceStatus::Filled(gaps)
}

/// Derive an independent, reproducible seed for each trace.
fn trace_seed(seed: u64, trace_idx: usize) -> u64 {
    seed.wrapping_add(trace_idx as u64)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Interpolate across the flagged interior gaps of every trace of a bandpass
/// solution, in place.
///
/// `gain_array` and `flag_array` have dimensions `[pol][chan][ant]`. For each
/// (pol, ant) trace, the flagged runs at either end of the channel axis are
/// treated as edge flags and left alone; every other flagged run is filled
/// with a sliding polynomial fit (plus resampled residual noise if
/// `ctx.add_residual_noise`) and unflagged.
///
/// Traces are processed in parallel. A trace that can't be interpolated is
/// left untouched and reported in the returned [`GapInterpReport`].
///
/// # Examples
///
/// ```rust
/// use lband::{interpolate_gaps, GapInterpContextBuilder, ndarray::Array3, Complex};
///
/// let num_chans = 64;
/// let mut gains = Array3::from_shape_fn((1, num_chans, 1), |(_, chan, _)| {
///     Complex::new(1.0 + 0.01 * chan as f32, 0.0)
/// });
/// let mut flags = Array3::from_shape_fn((1, num_chans, 1), |(_, chan, _)| {
///     chan < 4 || (30..34).contains(&chan) || chan >= 60
/// });
///
/// let ctx = GapInterpContextBuilder::default()
///     .window_fraction(0.25)
///     .poly_order(1)
///     .add_residual_noise(false)
///     .draw_progress(false)
///     .build()
///     .unwrap();
///
/// let report = interpolate_gaps(gains.view_mut(), flags.view_mut(), &ctx).unwrap();
/// assert_eq!(report.num_filled(), 1);
/// assert!(!flags[(0, 31, 0)]);
/// assert!(flags[(0, 0, 0)]);
/// assert!((gains[(0, 31, 0)].re - 1.31).abs() < 1e-5);
/// ```
///
/// # Errors
///
/// Will return [`GapInterpError::BadArrayShape`] if the arrays differ in shape,
/// or [`GapInterpError::InvalidParameter`] if the fit parameters are invalid
/// for this number of channels.
pub fn interpolate_gaps(
    mut gain_array: ArrayViewMut3<Complex<f32>>,
    mut flag_array: ArrayViewMut3<bool>,
    ctx: &GapInterpContext,
) -> Result<GapInterpReport, GapInterpError> {
    trace!("start interpolate_gaps");

    if gain_array.dim() != flag_array.dim() {
        return Err(GapInterpError::BadArrayShape {
            argument: "flag_array".into(),
            function: "interpolate_gaps".into(),
            expected: format!("{:?}", gain_array.dim()),
            received: format!("{:?}", flag_array.dim()),
        });
    }
    let (num_pols, num_chans, num_ants) = gain_array.dim();
    let window_size = ctx.validate(num_chans)?;
    let offsets = window_offsets(window_size);
    debug!("fitting with a window of {window_size} channels over {num_chans} channels");

    let draw_target = if ctx.draw_progress {
        ProgressDrawTarget::stderr()
    } else {
        ProgressDrawTarget::hidden()
    };
    let progress =
        ProgressBar::with_draw_target(Some((num_pols * num_ants) as u64), draw_target);
    progress.set_style(
        ProgressStyle::default_bar()
            .template(
                "{msg:16}: [{elapsed_precise}] [{wide_bar:.cyan/blue}] {percent:3}% ({eta:5})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    progress.set_message("bandpass gaps");

    let traces = Zip::indexed(gain_array.lanes_mut(Axis(1)))
        .and(flag_array.lanes_mut(Axis(1)))
        .par_map_collect(|(pol, ant), gains, flags| {
            let mut rng = StdRng::seed_from_u64(trace_seed(ctx.seed, pol * num_ants + ant));
            let status = interpolate_trace(gains, flags, &offsets, ctx, &mut rng);
            progress.inc(1);
            status
        });

    progress.finish();

    let report = GapInterpReport { traces };
    for ((pol, ant), status) in report.traces.indexed_iter() {
        match status {
            TraceStatus::AllFlagged => debug!("pol {pol} ant {ant} is fully flagged, skipped"),
            TraceStatus::Failed(err) => warn!("pol {pol} ant {ant} not interpolated: {err}"),
            _ => {}
        }
    }
    info!("{}", report.to_string().trim_end());

    trace!("end interpolate_gaps");
    Ok(report)
}

/// Owned variant of [`interpolate_gaps`], returning the updated arrays.
///
/// # Errors
///
/// See [`interpolate_gaps`].
pub fn interpolate_bandpass_gaps(
    mut gain_array: Array3<Complex<f32>>,
    mut flag_array: Array3<bool>,
    ctx: &GapInterpContext,
) -> Result<(Array3<Complex<f32>>, Array3<bool>, GapInterpReport), GapInterpError> {
    let report = interpolate_gaps(gain_array.view_mut(), flag_array.view_mut(), ctx)?;
    Ok((gain_array, flag_array, report))
}
