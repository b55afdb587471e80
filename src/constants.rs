// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Useful constants.
//!
//! All constants *must* be double precision.

/// Speed of light in km/s.
pub const VEL_C_KMS: f64 = 299_792.458;

/// Spectral windows with a channel width at or above this are continuum
/// windows [kHz].
pub const DEFAULT_MIN_CONTINUUM_CHANWIDTH_KHZ: f64 = 50.0;

/// Fraction of the spectral window used as the bandpass fitting window.
pub const DEFAULT_WINDOW_FRACTION: f64 = 0.125;

/// Order of the polynomial fit across the bandpass fitting window.
pub const DEFAULT_POLY_ORDER: usize = 2;

/// Frame tag written into the continuum range report.
pub const CONT_REPORT_FRAME: &str = "TOPO";

/// Rest frequencies [GHz] of every L-band line we may want to match against a
/// spectral window. Most of the RRLs are never observed; the list is complete
/// so that any setup can be matched.
pub const LBAND_LINE_REST_FREQS_GHZ: &[(&str, f64)] = &[
    ("HI", 1.420405752),
    ("OH1612", 1.612231),
    ("OH1665", 1.66540180),
    ("OH1667", 1.66735900),
    ("OH1720", 1.72053),
    ("H186a", 1.01376730),
    ("H185a", 1.03025116),
    ("H184a", 1.04709434),
    ("H183a", 1.06430668),
    ("H182a", 1.08189835),
    ("H181a", 1.09987985),
    ("H180a", 1.11826206),
    ("H179a", 1.13705618),
    ("H178a", 1.15627383),
    ("H177a", 1.17592701),
    ("H176a", 1.19602811),
    ("H175a", 1.21658997),
    ("H174a", 1.23762588),
    ("H173a", 1.25914957),
    ("H172a", 1.28117526),
    ("H171a", 1.30371768),
    ("H170a", 1.32679206),
    ("H169a", 1.35041420),
    ("H168a", 1.37460043),
    ("H167a", 1.39936771),
    ("H166a", 1.42473359),
    ("H165a", 1.45071626),
    ("H164a", 1.47733457),
    ("H163a", 1.50460810),
    ("H162a", 1.53255712),
    ("H161a", 1.56120269),
    ("H160a", 1.59056662),
    ("H159a", 1.62067158),
    ("H158a", 1.65154111),
    ("H157a", 1.68319962),
    ("H156a", 1.71567248),
    ("H155a", 1.74898605),
    ("H154a", 1.78316770),
    ("H153a", 1.81824591),
    ("H152a", 1.85425027),
    ("H151a", 1.89121153),
    ("H150a", 1.92916170),
    ("H149a", 1.96813408),
];
