//! Local maximum detection on the discretized image.
//!
//! A pixel is a candidate iff it equals the grayscale dilation of the image
//! over the separation-scaled disk footprint and exceeds a percentile-based
//! brightness threshold. Flat plateaus yield several adjacent equal maxima;
//! duplicate suppression keeps exactly one representative per separation
//! neighborhood. Peaks inside the boundary margin are rejected so every
//! surviving candidate has a full in-image refinement window.
//!
//! The detector requires an exact integer image (`ArrayD<i64>`) because the
//! maximum test is an equality comparison against the dilation; float
//! equality would be unreliable there. See [`crate::scale_to_gamut`].

use ndarray::ArrayD;

use crate::masks::disk_mask;

/// Errors reported by local-maximum detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectError {
    /// Images with more than three axes are not supported.
    UnsupportedDimensionality {
        /// Number of axes of the offending image.
        ndim: usize,
    },
}

impl std::fmt::Display for DetectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedDimensionality { ndim } => {
                write!(f, "images with more than 3 dimensions are not supported (got {ndim})")
            }
        }
    }
}

impl std::error::Error for DetectError {}

/// Find local maxima brighter than the given percentile of nonzero pixels.
///
/// `separation` is the minimum center-to-center distance between accepted
/// peaks; it also sets the scale of the dilation footprint and the excluded
/// boundary margin. Returns integer candidate coordinates in image-index
/// order. An image with no acceptable maxima is a data-quality condition,
/// not an error: it warns and returns an empty set.
pub fn local_maxima(
    image: &ArrayD<i64>,
    radius: usize,
    separation: usize,
    percentile: f64,
) -> Result<Vec<Vec<usize>>, DetectError> {
    let ndim = image.ndim();
    if ndim > 3 {
        return Err(DetectError::UnsupportedDimensionality { ndim });
    }
    let shape = image.shape().to_vec();

    // Brightness cutoff from the percentile of nonzero pixels.
    let mut not_black: Vec<i64> = image.iter().copied().filter(|&v| v != 0).collect();
    not_black.sort_unstable();
    let threshold = score_at_percentile(&not_black, percentile);

    // Relative offsets of the separation-scaled disk footprint, center excluded.
    let footprint = disk_mask(separation, ndim);
    let mut offsets: Vec<Vec<isize>> = Vec::new();
    for (idx, &inside) in footprint.indexed_iter() {
        if !inside {
            continue;
        }
        let off: Vec<isize> = (0..ndim).map(|d| idx[d] as isize - separation as isize).collect();
        if off.iter().any(|&o| o != 0) {
            offsets.push(off);
        }
    }

    // A pixel survives the dilation test iff no footprint neighbor is
    // brighter (equal-valued neighbors are resolved below).
    let mut maxima: Vec<(usize, Vec<usize>, i64)> = Vec::new();
    let mut linear = 0usize;
    let mut neighbor = vec![0usize; ndim];
    for (idx, &value) in image.indexed_iter() {
        let index = linear;
        linear += 1;
        if (value as f64) <= threshold {
            continue;
        }
        let mut is_max = true;
        for off in &offsets {
            if !offset_in_bounds(&idx, off, &shape, &mut neighbor) {
                continue;
            }
            if image[neighbor.as_slice()] > value {
                is_max = false;
                break;
            }
        }
        if is_max {
            let coord: Vec<usize> = (0..ndim).map(|d| idx[d]).collect();
            maxima.push((index, coord, value));
        }
    }

    if maxima.is_empty() {
        tracing::warn!("no local maxima were found");
        return Ok(Vec::new());
    }

    // Flat plateaus produce several adjacent equal-valued maxima; keep only
    // the lowest-raster-index representative of each separation neighborhood.
    let survivors = suppress_duplicates(image, &maxima, &offsets, &shape);

    // Reject peaks whose support would run off-image. The margin is at least
    // `radius` so refinement windows always start inside the valid range.
    let margin = (separation / 2).max(radius);
    let kept: Vec<Vec<usize>> = survivors
        .into_iter()
        .filter(|coord| {
            coord
                .iter()
                .zip(&shape)
                .all(|(&c, &s)| c >= margin && c + margin < s)
        })
        .collect();

    if kept.is_empty() {
        tracing::warn!("bad image: all local maxima were within the boundary margins");
    }
    Ok(kept)
}

fn suppress_duplicates(
    image: &ArrayD<i64>,
    maxima: &[(usize, Vec<usize>, i64)],
    offsets: &[Vec<isize>],
    shape: &[usize],
) -> Vec<Vec<usize>> {
    let ndim = shape.len();
    // Linear-index map of candidate maxima for O(1) neighborhood lookups.
    let mut is_candidate = vec![false; image.len()];
    for (index, _, _) in maxima {
        is_candidate[*index] = true;
    }
    let strides: Vec<usize> = {
        let mut s = vec![1usize; ndim];
        for d in (0..ndim.saturating_sub(1)).rev() {
            s[d] = s[d + 1] * shape[d + 1];
        }
        s
    };

    let mut neighbor = vec![0usize; ndim];
    let mut kept = Vec::new();
    'candidates: for (index, coord, value) in maxima {
        let idx = ndarray::IxDyn(coord);
        for off in offsets {
            if !offset_in_bounds(&idx, off, shape, &mut neighbor) {
                continue;
            }
            let nlin: usize = neighbor.iter().zip(&strides).map(|(&c, &s)| c * s).sum();
            if !is_candidate[nlin] {
                continue;
            }
            // Equal-valued plateau neighbor earlier in raster order wins.
            if image[neighbor.as_slice()] == *value && nlin < *index {
                continue 'candidates;
            }
        }
        kept.push(coord.clone());
    }
    kept
}

fn offset_in_bounds(
    idx: &ndarray::IxDyn,
    off: &[isize],
    shape: &[usize],
    neighbor: &mut [usize],
) -> bool {
    for d in 0..shape.len() {
        let n = idx[d] as isize + off[d];
        if n < 0 || n >= shape[d] as isize {
            return false;
        }
        neighbor[d] = n as usize;
    }
    true
}

/// Percentile with linear interpolation over sorted integer samples.
fn score_at_percentile(sorted: &[i64], percentile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = percentile.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo] as f64
    } else {
        let frac = rank - lo as f64;
        sorted[lo] as f64 + frac * (sorted[hi] - sorted[lo]) as f64
    }
}
