//! Coarse per-candidate mass and size estimates.
//!
//! Cheap approximations (no iterative centering) used only to cull
//! obviously-too-dim or too-large candidates before refinement.

use ndarray::{ArrayD, Dimension};

use crate::masks::{disk_mask, r_squared_mask};

/// Total brightness inside the disk neighborhood of a candidate.
///
/// The candidate must sit at least `radius` from every image edge; detection
/// guarantees this for its output.
pub fn estimate_mass(image: &ArrayD<i64>, radius: usize, coord: &[usize]) -> f64 {
    let disk = disk_mask(radius, image.ndim());
    let mut mass = 0.0;
    for_each_masked(image, &disk, coord, radius, |_, v| mass += v);
    mass
}

/// Radius of gyration of the disk neighborhood, given its estimated mass.
///
/// Callers must guard `mass == 0` upstream; a zero mass yields NaN here,
/// which any `< maxsize` comparison rejects.
pub fn estimate_size(image: &ArrayD<i64>, radius: usize, coord: &[usize], mass: f64) -> f64 {
    let ndim = image.ndim();
    let disk = disk_mask(radius, ndim);
    let r2 = r_squared_mask(radius, ndim);
    let mut weighted = 0.0;
    for_each_masked(image, &disk, coord, radius, |idx, v| {
        weighted += r2[idx.slice()] * v;
    });
    (weighted / mass).sqrt()
}

fn for_each_masked(
    image: &ArrayD<i64>,
    disk: &ArrayD<bool>,
    coord: &[usize],
    radius: usize,
    mut f: impl FnMut(&ndarray::IxDyn, f64),
) {
    let ndim = image.ndim();
    let mut abs = vec![0usize; ndim];
    for (idx, &inside) in disk.indexed_iter() {
        if !inside {
            continue;
        }
        for d in 0..ndim {
            abs[d] = coord[d] + idx[d] - radius;
        }
        f(&idx, image[abs.as_slice()] as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    #[test]
    fn mass_of_uniform_disk_is_count_times_value() {
        let mut image = ArrayD::<i64>::zeros(IxDyn(&[21, 21]));
        image.fill(3);
        let radius = 4;
        let count = disk_mask(radius, 2).iter().filter(|&&m| m).count();
        let mass = estimate_mass(&image, radius, &[10, 10]);
        assert_eq!(mass, (count * 3) as f64);
    }

    #[test]
    fn size_of_point_mass_at_center_is_zero() {
        let mut image = ArrayD::<i64>::zeros(IxDyn(&[15, 15]));
        image[[7, 7]] = 100;
        let mass = estimate_mass(&image, 3, &[7, 7]);
        assert_eq!(mass, 100.0);
        assert_eq!(estimate_size(&image, 3, &[7, 7], mass), 0.0);
    }

    #[test]
    fn size_grows_with_blob_extent() {
        let narrow = crate::collab::scale_to_gamut(
            &crate::test_utils::blob_image(&[31, 31], &[15.0, 15.0], 1.0, 100.0),
            255,
        );
        let wide = crate::collab::scale_to_gamut(
            &crate::test_utils::blob_image(&[31, 31], &[15.0, 15.0], 3.0, 100.0),
            255,
        );
        let radius = 6;
        let coord = [15usize, 15];
        let m_narrow = estimate_mass(&narrow, radius, &coord);
        let m_wide = estimate_mass(&wide, radius, &coord);
        let s_narrow = estimate_size(&narrow, radius, &coord, m_narrow);
        let s_wide = estimate_size(&wide, radius, &coord, m_wide);
        assert!(s_wide > s_narrow, "{s_wide} vs {s_narrow}");
    }
}
