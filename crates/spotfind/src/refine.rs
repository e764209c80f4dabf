//! Iterative sub-pixel centroid refinement.
//!
//! Each candidate converges from an integer local maximum to the center of
//! brightness of its disk neighborhood. Two execution strategies share one
//! semantics: a reference implementation for any supported dimensionality
//! and a 2D-only fast path with fixed-size state and flat loops. Numerical
//! policy (thresholds, degenerate-arithmetic fallbacks) lives here so the
//! strategies cannot drift apart.

use ndarray::{ArrayD, Dimension};

use crate::masks::MaskSet;
use crate::{Feature, FeatureShape};

#[path = "refine/fast.rs"]
mod fast;
#[path = "refine/interp.rs"]
mod interp;
#[path = "refine/reference.rs"]
mod reference;

/// Per-axis center-of-mass offset beyond which the window moves by a whole
/// pixel (while whole-pixel moves are still permitted).
pub(crate) const SHIFT_THRESH: f64 = 0.6;
/// Per-axis offset below which the candidate counts as converged.
pub(crate) const GOOD_ENOUGH_THRESH: f64 = 0.01;
/// Regularizer for the eccentricity denominator when nearly all mass sits in
/// the center pixel.
pub(crate) const ECC_EPSILON: f64 = 1e-6;

/// Execution strategy for the refinement loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum RefineStrategy {
    /// Straightforward implementation, any dimensionality, supports tracing.
    #[default]
    Reference,
    /// Performance-tuned 2D-only path; behaviorally equivalent to
    /// [`RefineStrategy::Reference`] but rejects tracing.
    Fast2d,
}

/// Options for [`refine`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RefineOptions {
    /// Maximum refinement iterations per candidate. Exhausting the budget is
    /// normal termination, not an error.
    pub max_iterations: usize,
    /// Compute size, eccentricity, and signal in addition to mass.
    pub characterize: bool,
    /// Execution strategy.
    pub strategy: RefineStrategy,
    /// Log the per-iteration offset of every candidate at debug level.
    pub trace: bool,
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            characterize: true,
            strategy: RefineStrategy::default(),
            trace: false,
        }
    }
}

/// Refinement configuration errors. All are rejected before any candidate is
/// processed, never partway through a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefineError {
    /// The fast strategy only supports 2D images.
    Fast2dRequiresTwoDims {
        /// Number of axes of the offending image.
        ndim: usize,
    },
    /// The fast strategy does not implement per-iteration tracing.
    Fast2dTraceUnsupported,
}

impl std::fmt::Display for RefineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast2dRequiresTwoDims { ndim } => {
                write!(f, "the fast strategy only supports 2D images (got {ndim} axes)")
            }
            Self::Fast2dTraceUnsupported => {
                write!(f, "per-iteration tracing is not available in the fast strategy")
            }
        }
    }
}

impl std::error::Error for RefineError {}

/// Converge every candidate to a sub-pixel centroid and characterize it.
///
/// `raw` is used only for the final signal measurement; `image` (the
/// processed view) drives detection of the center of brightness. Both must
/// share one shape. Candidate coordinates are integer positions in
/// image-index order; output positions are axis-reversed to Cartesian order.
pub fn refine(
    raw: &ArrayD<f64>,
    image: &ArrayD<f64>,
    radius: usize,
    coords: &[Vec<usize>],
    options: &RefineOptions,
) -> Result<Vec<Feature>, RefineError> {
    let ndim = image.ndim();
    match options.strategy {
        RefineStrategy::Reference => {
            let masks = MaskSet::new(radius, ndim);
            Ok(reference::run(raw, image, radius, coords, options, &masks))
        }
        RefineStrategy::Fast2d => {
            if ndim != 2 {
                return Err(RefineError::Fast2dRequiresTwoDims { ndim });
            }
            if options.trace {
                return Err(RefineError::Fast2dTraceUnsupported);
            }
            let masks = MaskSet::new(radius, ndim);
            Ok(fast::run(raw, image, radius, coords, options, &masks))
        }
    }
}

// ── Numerical policy shared by both strategies ─────────────────────────────

/// Disk-masked neighborhood window with its origin at `origin`.
pub(crate) fn masked_window(
    image: &ArrayD<f64>,
    disk: &ArrayD<bool>,
    origin: &[usize],
) -> ArrayD<f64> {
    let ndim = image.ndim();
    let mut window = ArrayD::zeros(disk.raw_dim());
    let mut abs = vec![0usize; ndim];
    for ((idx, out), &inside) in window.indexed_iter_mut().zip(disk.iter()) {
        if inside {
            for d in 0..ndim {
                abs[d] = origin[d] + idx[d];
            }
            *out = image[abs.as_slice()];
        }
    }
    window
}

/// Center of mass of a neighborhood in window coordinates. A zero-mass
/// neighborhood is degenerate; fall back to the exact window center instead
/// of propagating NaN.
pub(crate) fn center_of_mass(window: &ArrayD<f64>, radius: usize) -> Vec<f64> {
    let ndim = window.ndim();
    let mut total = 0.0;
    let mut acc = vec![0.0; ndim];
    for (idx, &v) in window.indexed_iter() {
        total += v;
        for d in 0..ndim {
            acc[d] += v * idx[d] as f64;
        }
    }
    if total == 0.0 || !total.is_finite() {
        return vec![radius as f64; ndim];
    }
    acc.iter().map(|a| a / total).collect()
}

/// Shape descriptors of a converged neighborhood. `origin` is the final
/// integer window origin, used to read the raw image for signal.
pub(crate) fn shape_descriptors(
    window: &ArrayD<f64>,
    raw: &ArrayD<f64>,
    origin: &[usize],
    radius: usize,
    mass: f64,
    masks: &MaskSet,
) -> FeatureShape {
    let ndim = window.ndim();

    // Radius of gyration; NaN when the mass underflowed to zero.
    let mut weighted = 0.0;
    for (idx, &v) in window.indexed_iter() {
        weighted += masks.r2[idx.slice()] * v;
    }
    let size = (weighted / mass).sqrt();

    // Eccentricity is only defined in two dimensions.
    let ecc = match (&masks.cos2t, &masks.sin2t) {
        (Some(cos2t), Some(sin2t)) => {
            let mut c = 0.0;
            let mut s = 0.0;
            for (idx, &v) in window.indexed_iter() {
                c += cos2t[[idx[0], idx[1]]] * v;
                s += sin2t[[idx[0], idx[1]]] * v;
            }
            let center = window[vec![radius; ndim].as_slice()];
            (c * c + s * s).sqrt() / (mass - center + ECC_EPSILON)
        }
        _ => f64::NAN,
    };

    // Peak raw value inside the disk; black level is subtracted downstream.
    let raw_window = masked_window(raw, &masks.disk, origin);
    let signal = raw_window.fold(f64::NEG_INFINITY, |m, &v| m.max(v));

    FeatureShape {
        size,
        ecc,
        signal,
        ep: None,
    }
}

/// Assemble a feature record, reversing the position into output axis order.
pub(crate) fn build_feature(cm_image: &[f64], mass: f64, shape: Option<FeatureShape>) -> Feature {
    Feature {
        position: cm_image.iter().rev().copied().collect(),
        mass,
        shape,
    }
}
