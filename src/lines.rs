// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Conversions between line-of-sight velocity and observed frequency.
//!
//! Velocities are in km/s using the radio convention, `f = f0 (1 - v / c)`.

use crate::{constants::VEL_C_KMS, interval::Interval};

/// The observed frequency of a line with rest frequency `rest_freq` at
/// velocity `vel_kms`. The result is in the units of `rest_freq`.
///
/// # Examples
///
/// ```rust
/// use lband::lines::vel_to_freq;
///
/// assert_eq!(vel_to_freq(1.420405752, 0.0), 1.420405752);
/// assert!(vel_to_freq(1.420405752, -300.0) > 1.420405752);
/// ```
pub fn vel_to_freq(rest_freq: f64, vel_kms: f64) -> f64 {
    rest_freq * (1.0 - vel_kms / VEL_C_KMS)
}

/// Shift a rest frequency to the frame of a source with systemic velocity
/// `vsys_kms`.
pub fn lines_rest2obs(rest_freq: f64, vsys_kms: f64) -> f64 {
    vel_to_freq(rest_freq, vsys_kms)
}

/// The frequency interval spanned by a velocity range, in the units of
/// `rest_freq`. The bounds of `vel_range_kms` may be given in either order.
pub fn velocity_range_to_interval(rest_freq: f64, vel_range_kms: [f64; 2]) -> Interval {
    let [v1, v2] = vel_range_kms;
    Interval::from_unordered(vel_to_freq(rest_freq, v1), vel_to_freq(rest_freq, v2))
}
