//! Performance-tuned 2D refinement loop.
//!
//! Identical semantics to the reference strategy, specialized to two fixed
//! axes: the per-iteration center-of-mass runs as flat loops over the image
//! window with no per-candidate allocation until sub-pixel interpolation
//! begins. Characterization reuses the shared policy code so descriptors
//! cannot diverge between strategies.

use ndarray::{Array2, ArrayD, ArrayView2, Ix2};

use super::{interp, GOOD_ENOUGH_THRESH, SHIFT_THRESH};
use crate::masks::MaskSet;
use crate::Feature;

pub(super) fn run(
    raw: &ArrayD<f64>,
    image: &ArrayD<f64>,
    radius: usize,
    coords: &[Vec<usize>],
    options: &super::RefineOptions,
    masks: &MaskSet,
) -> Vec<Feature> {
    let image2 = image
        .view()
        .into_dimensionality::<Ix2>()
        .expect("dimensionality checked by refine()");
    let mask2: Array2<bool> = masks
        .disk
        .clone()
        .into_dimensionality()
        .expect("mask built for two axes");
    let (rows, cols) = image2.dim();
    let side = 2 * radius + 1;
    let upper = [rows - 1 - radius, cols - 1 - radius];
    let mut features = Vec::with_capacity(coords.len());

    for start in coords {
        let mut int_coord = [
            start[0].clamp(radius, upper[0]),
            start[1].clamp(radius, upper[1]),
        ];
        let mut origin = [int_coord[0] - radius, int_coord[1] - radius];
        // Materialized only once sub-pixel interpolation begins.
        let mut resampled: Option<Array2<f64>> = None;
        let mut position = [int_coord[0] as f64, int_coord[1] as f64];
        let mut cm_window = com_in_image(&image2, &mask2, origin, side, radius);
        let mut cm_image = [
            cm_window[0] - radius as f64 + position[0],
            cm_window[1] - radius as f64 + position[1],
        ];
        let mut allow_moves = true;

        for _ in 0..options.max_iterations {
            let off = [cm_window[0] - radius as f64, cm_window[1] - radius as f64];
            if off[0].abs() < GOOD_ENOUGH_THRESH && off[1].abs() < GOOD_ENOUGH_THRESH {
                break;
            }

            if allow_moves && (off[0].abs() > SHIFT_THRESH || off[1].abs() > SHIFT_THRESH) {
                for d in 0..2 {
                    let mut c = int_coord[d] as isize;
                    if off[d] > SHIFT_THRESH {
                        c += 1;
                    } else if off[d] < -SHIFT_THRESH {
                        c -= 1;
                    }
                    int_coord[d] = c.clamp(radius as isize, upper[d] as isize) as usize;
                    origin[d] = int_coord[d] - radius;
                    position[d] = int_coord[d] as f64;
                }
                cm_window = com_in_image(&image2, &mask2, origin, side, radius);
            } else {
                let window = match resampled.take() {
                    Some(w) => w,
                    None => extract_window(&image2, &mask2, origin, side),
                };
                let shifted = interp::shift_quadratic2(&window, [-off[0], -off[1]]);
                position[0] += off[0];
                position[1] += off[1];
                cm_window = com_of_window(&shifted, radius);
                resampled = Some(shifted);
                allow_moves = false;
            }

            cm_image = [
                cm_window[0] - radius as f64 + position[0],
                cm_window[1] - radius as f64 + position[1],
            ];
        }

        let window = match resampled {
            Some(w) => w.into_dyn(),
            None => extract_window(&image2, &mask2, origin, side).into_dyn(),
        };
        let mass = window.sum();
        let shape = options
            .characterize
            .then(|| super::shape_descriptors(&window, raw, &origin, radius, mass, masks));
        features.push(super::build_feature(&cm_image, mass, shape));
    }
    features
}

fn com_in_image(
    image: &ArrayView2<'_, f64>,
    mask: &Array2<bool>,
    origin: [usize; 2],
    side: usize,
    radius: usize,
) -> [f64; 2] {
    let mut total = 0.0;
    let mut acc = [0.0f64; 2];
    for i in 0..side {
        for j in 0..side {
            if mask[[i, j]] {
                let v = image[[origin[0] + i, origin[1] + j]];
                total += v;
                acc[0] += v * i as f64;
                acc[1] += v * j as f64;
            }
        }
    }
    safe_com(total, acc, radius)
}

fn com_of_window(window: &Array2<f64>, radius: usize) -> [f64; 2] {
    let mut total = 0.0;
    let mut acc = [0.0f64; 2];
    for ((i, j), &v) in window.indexed_iter() {
        total += v;
        acc[0] += v * i as f64;
        acc[1] += v * j as f64;
    }
    safe_com(total, acc, radius)
}

fn safe_com(total: f64, acc: [f64; 2], radius: usize) -> [f64; 2] {
    if total == 0.0 || !total.is_finite() {
        [radius as f64; 2]
    } else {
        [acc[0] / total, acc[1] / total]
    }
}

fn extract_window(
    image: &ArrayView2<'_, f64>,
    mask: &Array2<bool>,
    origin: [usize; 2],
    side: usize,
) -> Array2<f64> {
    Array2::from_shape_fn((side, side), |(i, j)| {
        if mask[[i, j]] {
            image[[origin[0] + i, origin[1] + j]]
        } else {
            0.0
        }
    })
}
