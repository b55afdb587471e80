// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Least-squares polynomial fitting of complex samples.
//!
//! The real and imaginary parts share a single real design matrix, so a fit
//! of complex data is the same as two independent real fits with the same
//! basis.

use ndarray::{Array1, Array2};
use num_complex::Complex;

/// A polynomial with complex coefficients, lowest order first.
#[derive(Clone, Debug, PartialEq)]
pub struct Polynomial {
    coeffs: Vec<Complex<f64>>,
}

impl Polynomial {
    /// Coefficients, lowest order first. `coeffs()[0]` is the value at zero.
    pub fn coeffs(&self) -> &[Complex<f64>] {
        &self.coeffs
    }

    /// Evaluate the polynomial at `x` (Horner's method).
    #[cfg(test)]
    fn eval(&self, x: f64) -> Complex<f64> {
        self.coeffs
            .iter()
            .rev()
            .fold(Complex::new(0.0, 0.0), |acc, &c| acc * x + c)
    }
}

/// Fit a polynomial of degree `order` to the points `(x, y)`.
///
/// The abscissae are normalised by their largest magnitude before the normal
/// equations are formed, which keeps wide windows well conditioned; the
/// returned coefficients are in the original units.
///
/// Returns `None` if there are fewer than `order + 1` distinct abscissae, or
/// if the system is otherwise singular.
pub fn polyfit(x: &[f64], y: &[Complex<f64>], order: usize) -> Option<Polynomial> {
    let num_coeffs = order + 1;
    if x.len() != y.len() || x.len() < num_coeffs {
        return None;
    }

    let scale = x.iter().fold(0.0_f64, |max, v| max.max(v.abs()));
    let scale = if scale > 0.0 { scale } else { 1.0 };

    // normal equations: (VᵀV) c = Vᵀy, with V the Vandermonde matrix
    let mut vtv = Array2::<f64>::zeros((num_coeffs, num_coeffs));
    let mut vty = Array1::<Complex<f64>>::zeros(num_coeffs);
    let mut powers = vec![0.0; 2 * order + 1];
    for (&xi, &yi) in x.iter().zip(y) {
        let xs = xi / scale;
        let mut p = 1.0;
        for power in powers.iter_mut() {
            *power = p;
            p *= xs;
        }
        for j in 0..num_coeffs {
            vty[j] += yi * powers[j];
            for k in 0..num_coeffs {
                vtv[(j, k)] += powers[j + k];
            }
        }
    }

    let scaled = solve(vtv, vty)?;
    let coeffs = scaled
        .iter()
        .enumerate()
        .map(|(j, c)| *c / scale.powi(j as i32))
        .collect();
    Some(Polynomial { coeffs })
}

/// Solve `a · x = b` by Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array1<Complex<f64>>) -> Option<Vec<Complex<f64>>> {
    let n = b.len();
    let tolerance = f64::EPSILON * a.iter().fold(0.0_f64, |max, v| max.max(v.abs())) * n as f64;

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[(i, col)].abs().total_cmp(&a[(j, col)].abs()))?;
        if a[(pivot, col)].abs() <= tolerance {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap((pivot, k), (col, k));
            }
            b.swap(pivot, col);
        }
        for row in (col + 1)..n {
            let factor = a[(row, col)] / a[(col, col)];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[(row, k)] -= factor * a[(col, k)];
            }
            let b_col = b[col];
            b[row] -= b_col * factor;
        }
    }

    let mut x = vec![Complex::new(0.0, 0.0); n];
    for row in (0..n).rev() {
        let mut acc = b[row];
        for k in (row + 1)..n {
            acc -= x[k] * a[(row, k)];
        }
        x[row] = acc / a[(row, row)];
    }
    Some(x)
}
