//! Separable second-order B-spline resampling used by the sub-pixel branch.
//!
//! `shift_quadratic(arr, s)` produces `out[i] = arr[i - s]`. Each lane is
//! first converted to quadratic B-spline coefficients by a recursive
//! prefilter (mirror boundary), then evaluated at the shifted positions with
//! the quadratic B-spline kernel; outside the lane the signal is constant
//! zero. The prefilter is what makes the resample interpolating: without it
//! the kernel acts as a smoother, each shift flattens the neighborhood a
//! little, and the centroid loop stalls short of the true center. Both
//! refinement strategies share this kernel, which keeps their sub-pixel
//! behavior identical by construction.

use ndarray::{Array2, ArrayD, ArrayView1, Axis};

/// Pole of the quadratic B-spline prefilter, `2 * sqrt(2) - 3`.
const POLE: f64 = -0.171_572_875_253_809_9;
/// Prefilter gain, `(1 - z)(1 - 1/z)` at the pole above.
const GAIN: f64 = 8.0;

pub(super) fn shift_quadratic(arr: &ArrayD<f64>, shift: &[f64]) -> ArrayD<f64> {
    let mut current = arr.clone();
    for (axis, &s) in shift.iter().enumerate() {
        if s == 0.0 {
            continue;
        }
        let mut next = ArrayD::zeros(current.raw_dim());
        let mut coeff = Vec::new();
        for (src, mut dst) in current
            .lanes(Axis(axis))
            .into_iter()
            .zip(next.lanes_mut(Axis(axis)))
        {
            spline_coefficients(&src, &mut coeff);
            for i in 0..dst.len() {
                dst[i] = sample_spline(&coeff, i as f64 - s);
            }
        }
        current = next;
    }
    current
}

/// 2D convenience wrapper with the exact same numerics as the N-D kernel.
pub(super) fn shift_quadratic2(arr: &Array2<f64>, shift: [f64; 2]) -> Array2<f64> {
    shift_quadratic(&arr.clone().into_dyn(), &shift)
        .into_dimensionality()
        .expect("shape is preserved by shifting")
}

/// Quadratic B-spline coefficients of one lane (Unser's recursive filter,
/// mirror boundary). Solves the tridiagonal interpolation system so the
/// spline passes through every sample exactly.
fn spline_coefficients(lane: &ArrayView1<'_, f64>, coeff: &mut Vec<f64>) {
    let n = lane.len();
    coeff.clear();
    coeff.extend(lane.iter().map(|&v| v * GAIN));
    if n == 1 {
        coeff[0] = lane[0];
        return;
    }

    // Causal pass. The init sums the mirrored history; |pole|^k reaches
    // machine precision within a couple dozen terms.
    let horizon = n.min(24);
    let mut init = coeff[0];
    let mut zk = POLE;
    for &c in coeff.iter().take(horizon).skip(1) {
        init += zk * c;
        zk *= POLE;
    }
    coeff[0] = init;
    for k in 1..n {
        coeff[k] += POLE * coeff[k - 1];
    }

    // Anticausal pass.
    coeff[n - 1] = POLE / (POLE * POLE - 1.0) * (coeff[n - 1] + POLE * coeff[n - 2]);
    for k in (0..n - 1).rev() {
        coeff[k] = POLE * (coeff[k + 1] - coeff[k]);
    }
}

/// Evaluate the quadratic B-spline with the given coefficients at fractional
/// `x`; constant zero outside the lane.
fn sample_spline(coeff: &[f64], x: f64) -> f64 {
    let n = coeff.len() as isize;
    let base = x.round() as isize;
    let t = x - base as f64;
    let at = |i: isize| {
        if i < 0 || i >= n {
            0.0
        } else {
            coeff[i as usize]
        }
    };
    // Kernel weights at offsets -1, 0, +1 for |t| <= 0.5; they sum to one.
    let w_minus = 0.5 * (t - 0.5) * (t - 0.5);
    let w_zero = 0.75 - t * t;
    let w_plus = 0.5 * (t + 0.5) * (t + 0.5);
    w_minus * at(base - 1) + w_zero * at(base) + w_plus * at(base + 1)
}
