//! Neighborhood mask library: precomputed stencils shared by detection,
//! coarse estimation, and refinement.
//!
//! All masks are pure functions of `(radius, ndim)` and are cached in a
//! [`MaskSet`] once per locate call — never rebuilt per candidate.

use ndarray::{Array2, ArrayD, IxDyn};

/// Boolean disk (hyperball) stencil of side `2 * radius + 1`, true where the
/// Euclidean distance from the center cell is at most `radius`.
pub fn disk_mask(radius: usize, ndim: usize) -> ArrayD<bool> {
    let side = 2 * radius + 1;
    let r2 = (radius * radius) as i64;
    ArrayD::from_shape_fn(IxDyn(&vec![side; ndim]), |idx| {
        center_dist_sq(&idx, radius, ndim) <= r2
    })
}

/// Squared distance from the center cell, zeroed outside the disk. This is
/// the weighting kernel for the radius-of-gyration descriptor.
pub fn r_squared_mask(radius: usize, ndim: usize) -> ArrayD<f64> {
    let side = 2 * radius + 1;
    let r2 = (radius * radius) as i64;
    ArrayD::from_shape_fn(IxDyn(&vec![side; ndim]), |idx| {
        let d2 = center_dist_sq(&idx, radius, ndim);
        if d2 <= r2 {
            d2 as f64
        } else {
            0.0
        }
    })
}

/// 2D-only `cos(2θ)` weights inside the disk, used for eccentricity.
pub fn cos_mask(radius: usize) -> Array2<f64> {
    angular_mask(radius, f64::cos)
}

/// 2D-only `sin(2θ)` weights inside the disk, used for eccentricity.
pub fn sin_mask(radius: usize) -> Array2<f64> {
    angular_mask(radius, f64::sin)
}

fn angular_mask(radius: usize, f: fn(f64) -> f64) -> Array2<f64> {
    let side = 2 * radius + 1;
    let r = radius as f64;
    let r2 = (radius * radius) as i64;
    Array2::from_shape_fn((side, side), |(i, j)| {
        let di = i as i64 - radius as i64;
        let dj = j as i64 - radius as i64;
        if di * di + dj * dj > r2 {
            return 0.0;
        }
        let theta = (r - i as f64).atan2(j as f64 - r);
        f(2.0 * theta)
    })
}

fn center_dist_sq(idx: &IxDyn, radius: usize, ndim: usize) -> i64 {
    let mut d2 = 0i64;
    for d in 0..ndim {
        let o = idx[d] as i64 - radius as i64;
        d2 += o * o;
    }
    d2
}

/// All masks needed for one run at a given radius and dimensionality.
///
/// The angular masks exist only for 2D images; eccentricity is undefined for
/// any other dimensionality.
pub struct MaskSet {
    /// Binary disk stencil.
    pub disk: ArrayD<bool>,
    /// Squared-distance weights.
    pub r2: ArrayD<f64>,
    /// `cos(2θ)` weights (2D only).
    pub cos2t: Option<Array2<f64>>,
    /// `sin(2θ)` weights (2D only).
    pub sin2t: Option<Array2<f64>>,
}

impl MaskSet {
    /// Build and cache every mask for `(radius, ndim)`.
    pub fn new(radius: usize, ndim: usize) -> Self {
        let two_d = ndim == 2;
        Self {
            disk: disk_mask(radius, ndim),
            r2: r_squared_mask(radius, ndim),
            cos2t: two_d.then(|| cos_mask(radius)),
            sin2t: two_d.then(|| sin_mask(radius)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn disk_mask_is_symmetric_under_transpose_and_reflection() {
        for radius in [1usize, 2, 4, 7] {
            let m = disk_mask(radius, 2);
            let side = 2 * radius + 1;
            for i in 0..side {
                for j in 0..side {
                    let v = m[[i, j]];
                    assert_eq!(v, m[[j, i]], "transpose symmetry at ({i},{j})");
                    assert_eq!(v, m[[side - 1 - i, j]], "reflection symmetry at ({i},{j})");
                    assert_eq!(v, m[[i, side - 1 - j]], "reflection symmetry at ({i},{j})");
                }
            }
        }
    }

    #[test]
    fn disk_mask_count_matches_analytic_ball_volume() {
        for radius in [3usize, 5, 8] {
            let r = radius as f64;

            let count2 = disk_mask(radius, 2).iter().filter(|&&m| m).count() as f64;
            let area = PI * r * r;
            assert!(
                (count2 - area).abs() / area < 0.15,
                "2D: count {count2} vs area {area}"
            );

            let count3 = disk_mask(radius, 3).iter().filter(|&&m| m).count() as f64;
            let volume = 4.0 / 3.0 * PI * r * r * r;
            assert!(
                (count3 - volume).abs() / volume < 0.15,
                "3D: count {count3} vs volume {volume}"
            );
        }
    }

    #[test]
    fn disk_mask_1d_is_full_segment() {
        let m = disk_mask(3, 1);
        assert_eq!(m.len(), 7);
        assert!(m.iter().all(|&v| v));
    }

    #[test]
    fn r_squared_mask_is_zero_at_center_and_outside_disk() {
        let radius = 4;
        let m = r_squared_mask(radius, 2);
        let disk = disk_mask(radius, 2);
        assert_eq!(m[[radius, radius]], 0.0);
        for (idx, &v) in m.indexed_iter() {
            if !disk[[idx[0], idx[1]]] {
                assert_eq!(v, 0.0);
            }
        }
        // Corner cells lie outside the disk.
        assert_eq!(m[[0, 0]], 0.0);
    }

    #[test]
    fn angular_masks_cancel_over_the_full_disk() {
        // Under a quarter-turn both angular weights flip sign, so cells cancel
        // in four-fold orbits. Only the center cell maps to itself: atan2(0, 0)
        // is 0, leaving cos(0) = 1 and sin(0) = 0. This is what makes
        // eccentricity (nearly) vanish for circularly symmetric blobs.
        for radius in [2usize, 5] {
            let c: f64 = cos_mask(radius).sum();
            let s: f64 = sin_mask(radius).sum();
            assert!((c - 1.0).abs() < 1e-6, "cos sum {c}");
            assert!(s.abs() < 1e-6, "sin sum {s}");
        }
    }

    #[test]
    fn mask_set_builds_angular_masks_only_in_2d() {
        assert!(MaskSet::new(3, 2).cos2t.is_some());
        assert!(MaskSet::new(3, 3).cos2t.is_none());
        assert!(MaskSet::new(3, 1).sin2t.is_none());
    }
}
