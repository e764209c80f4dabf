//! Reference refinement loop for any supported dimensionality.

use ndarray::ArrayD;

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
    let ndim = image.ndim();
    let shape = image.shape().to_vec();
    let mut features = Vec::with_capacity(coords.len());

    for (candidate, start) in coords.iter().enumerate() {
        // Integer window position, clamped so the window is fully in-image.
        let mut int_coord: Vec<usize> = start
            .iter()
            .zip(&shape)
            .map(|(&c, &s)| c.clamp(radius, s - 1 - radius))
            .collect();
        let mut origin: Vec<usize> = int_coord.iter().map(|&c| c - radius).collect();
        let mut window = super::masked_window(image, &masks.disk, &origin);
        let mut cm_window = super::center_of_mass(&window, radius);
        // Continuous position; equals `int_coord` until sub-pixel moves begin.
        let mut position: Vec<f64> = int_coord.iter().map(|&c| c as f64).collect();
        let mut cm_image: Vec<f64> = offset_position(&cm_window, radius, &position);
        let mut allow_moves = true;

        for iteration in 0..options.max_iterations {
            let off_center: Vec<f64> = cm_window.iter().map(|&c| c - radius as f64).collect();
            if options.trace {
                tracing::debug!(candidate, iteration, ?off_center, "refine step");
            }
            if off_center.iter().all(|o| o.abs() < GOOD_ENOUGH_THRESH) {
                break;
            }

            if allow_moves && off_center.iter().any(|o| o.abs() > SHIFT_THRESH) {
                // Whole-pixel move, clamped to keep the window in-image.
                for d in 0..ndim {
                    let mut c = int_coord[d] as isize;
                    if off_center[d] > SHIFT_THRESH {
                        c += 1;
                    } else if off_center[d] < -SHIFT_THRESH {
                        c -= 1;
                    }
                    let upper = shape[d] as isize - 1 - radius as isize;
                    int_coord[d] = c.clamp(radius as isize, upper) as usize;
                    origin[d] = int_coord[d] - radius;
                    position[d] = int_coord[d] as f64;
                }
                window = super::masked_window(image, &masks.disk, &origin);
            } else {
                // Sub-pixel interpolation; whole-pixel moves are disabled for
                // good to prevent oscillation between the two move types.
                let shift: Vec<f64> = off_center.iter().map(|o| -o).collect();
                window = interp::shift_quadratic(&window, &shift);
                for d in 0..ndim {
                    position[d] += off_center[d];
                }
                allow_moves = false;
            }

            cm_window = super::center_of_mass(&window, radius);
            cm_image = offset_position(&cm_window, radius, &position);
        }

        let mass = window.sum();
        let shape_desc = options
            .characterize
            .then(|| super::shape_descriptors(&window, raw, &origin, radius, mass, masks));
        features.push(super::build_feature(&cm_image, mass, shape_desc));
    }
    features
}

fn offset_position(cm_window: &[f64], radius: usize, position: &[f64]) -> Vec<f64> {
    cm_window
        .iter()
        .zip(position)
        .map(|(&cm, &p)| cm - radius as f64 + p)
        .collect()
}
