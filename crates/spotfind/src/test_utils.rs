//! Shared test utilities for synthetic-image unit tests.
//!
//! Consolidated here so every module renders Gaussian blobs the same way
//! instead of carrying its own near-identical helper.

use ndarray::{ArrayD, IxDyn};

/// Blank N-dimensional image.
pub(crate) fn blank(shape: &[usize]) -> ArrayD<f64> {
    ArrayD::zeros(IxDyn(shape))
}

/// Add an isotropic Gaussian blob at `center` (image-index order, may be
/// fractional for sub-pixel placement).
pub(crate) fn add_blob(image: &mut ArrayD<f64>, center: &[f64], sigma: f64, amplitude: f64) {
    let ndim = image.ndim();
    for (idx, v) in image.indexed_iter_mut() {
        let mut r2 = 0.0;
        for d in 0..ndim {
            let o = idx[d] as f64 - center[d];
            r2 += o * o;
        }
        *v += amplitude * (-r2 / (2.0 * sigma * sigma)).exp();
    }
}

/// Single-blob convenience constructor.
pub(crate) fn blob_image(shape: &[usize], center: &[f64], sigma: f64, amplitude: f64) -> ArrayD<f64> {
    let mut image = blank(shape);
    add_blob(&mut image, center, sigma, amplitude);
    image
}
