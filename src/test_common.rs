// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Synthetic bandpass data for tests.

use ndarray::prelude::*;
use num_complex::Complex;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// A smooth, linear bandpass `[pol][chan][ant]` plus Gaussian noise of standard
/// deviation `sigma` on each component.
///
/// Returns `(noisy, truth)`.
pub fn synthetic_bandpass(
    num_pols: usize,
    num_chans: usize,
    num_ants: usize,
    sigma: f64,
    seed: u64,
) -> (Array3<Complex<f32>>, Array3<Complex<f32>>) {
    let truth = Array3::from_shape_fn((num_pols, num_chans, num_ants), |(pol, chan, ant)| {
        let chan = chan as f32;
        Complex::new(
            1.0 + 0.001 * chan + 0.05 * ant as f32,
            0.2 - 0.0005 * chan + 0.1 * pol as f32,
        )
    });
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, sigma).unwrap();
    let noisy = truth.mapv(|t| {
        t + Complex::new(
            normal.sample(&mut rng) as f32,
            normal.sample(&mut rng) as f32,
        )
    });
    (noisy, truth)
}

/// A single noisy trace, see [`synthetic_bandpass`].
pub fn synthetic_trace(
    num_chans: usize,
    sigma: f64,
    seed: u64,
) -> (Array1<Complex<f32>>, Array1<Complex<f32>>) {
    let (noisy, truth) = synthetic_bandpass(1, num_chans, 1, sigma, seed);
    (
        noisy.slice(s![0, .., 0]).to_owned(),
        truth.slice(s![0, .., 0]).to_owned(),
    )
}

/// Flag `width` channels at either end of a trace.
pub fn edge_flags(num_chans: usize, width: usize) -> Array1<bool> {
    Array1::from_shape_fn(num_chans, |chan| {
        chan < width || chan + width >= num_chans
    })
}
