// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

#![warn(missing_docs)]
#![warn(clippy::missing_safety_doc)]
#![warn(clippy::missing_errors_doc)]

//! lband is a library of helpers for reducing VLA L-band spectral line and
//! continuum observations.
//!
//! # Examples
//!
//! Find the continuum-safe parts of a spectral window once the HI emission of
//! a galaxy has been excluded.
//!
//! ```rust
//! use lband::{lines::velocity_range_to_interval, partition_cont_range, Interval};
//!
//! let hi_rest_ghz = 1.420405752;
//! let spw = Interval::new(1.4188, 1.4248);
//! let galaxy = velocity_range_to_interval(hi_rest_ghz, [-625.0, 50.0]);
//!
//! let chunks = partition_cont_range(spw, &[galaxy]);
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].start, spw.start);
//! assert_eq!(chunks[1].end, spw.end);
//! ```
//!
//! # Details
//!
//! - [`gap_interp`] bridges flagged gaps in bandpass solutions.
//! - [`interval`] subtracts line ranges from spectral windows.
//! - [`spw`] labels the spectral windows of an observation.
//! - [`cont_report`] and [`flag_template`] write the text files consumed by
//!   the CASA pipeline.
//! - [`io::caltable`] reads and writes CASA bandpass tables.

use cfg_if::cfg_if;

pub mod config;
pub mod constants;
pub mod cont_report;
pub mod error;
pub mod flag_template;
pub mod gap_interp;
pub mod interval;
pub mod io;
pub mod lines;
pub mod polyfit;
pub mod spw;

cfg_if! {
    if #[cfg(feature = "cli")] {
        pub mod cli;
        pub use cli::LbandContext;
    }
}

#[cfg(test)]
mod test_common;

pub use config::LineConfig;
pub use error::{CLIError, LbandError};
pub use gap_interp::{
    interpolate_bandpass_gaps, interpolate_gaps, GapInterpContext, GapInterpContextBuilder,
    GapInterpError, GapInterpReport, TraceStatus,
};
pub use interval::{partition_cont_range, Interval};
pub use io::caltable::{CalTable, SpwGains};
pub use spw::SpwSetup;

pub use marlu::rubbl_casatables;
pub use ndarray;
pub use num_complex::Complex;
