//! spotfind — sub-pixel localization of bright blob-like features in scalar
//! images (the Crocker-Grier centroid-finding algorithm).
//!
//! Works on 1-, 2-, and 3-dimensional images. The pipeline stages are:
//!
//! 1. **Preprocess** – optional inversion + external band-pass collaborator.
//! 2. **Discretize** – rescale the processed image into an exact integer gamut.
//! 3. **Detect** – grayscale-dilation local maxima with duplicate suppression
//!    and boundary-margin exclusion.
//! 4. **Coarse filter** – cheap mass/size estimates cull dim or oversized
//!    candidates before the expensive refinement stage.
//! 5. **Refine** – iterative mask-weighted centroid refinement with whole-pixel
//!    moves and second-order sub-pixel interpolation; characterizes mass,
//!    radius of gyration, eccentricity, and peak signal.
//! 6. **Finalize** – exact-mass filtering, top-N ranking, and uncertainty
//!    annotation via an external collaborator.
//!
//! # Public API
//! - [`Locator`] and [`LocateConfig`] as primary entry points
//! - [`refine`] with [`RefineStrategy`] for direct access to the refinement
//!   engine (a reference strategy for any dimensionality and a 2D-only fast
//!   strategy with identical semantics)
//! - [`Preprocessor`] and [`UncertaintyEstimator`] traits for the external
//!   band-pass and noise-model collaborators

mod api;
mod collab;
mod config;
mod detect;
mod estimate;
pub mod masks;
mod pipeline;
mod refine;
#[cfg(test)]
mod test_utils;

pub use api::Locator;
pub use collab::{scale_to_gamut, Preprocessor, UncertaintyEstimator};
pub use config::LocateConfig;
pub use detect::{local_maxima, DetectError};
pub use estimate::{estimate_mass, estimate_size};
pub use pipeline::LocateError;
pub use refine::{refine, RefineError, RefineOptions, RefineStrategy};

/// Shape descriptors computed when characterization is enabled.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FeatureShape {
    /// Radius of gyration of the brightness profile (pixels). NaN when the
    /// neighborhood mass underflows to zero.
    pub size: f64,
    /// Eccentricity in [0, 1]; 0 is circular. Defined for 2D images only,
    /// NaN otherwise.
    pub ecc: f64,
    /// Peak raw-image value inside the final neighborhood, before black-level
    /// correction.
    pub signal: f64,
    /// Estimated static position error (pixels), filled by the uncertainty
    /// collaborator when one is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ep: Option<f64>,
}

/// One located feature: a refined position plus brightness descriptors.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Feature {
    /// Sub-pixel position in Cartesian output order: x, y(, z).
    pub position: Vec<f64>,
    /// Integrated brightness over the feature's neighborhood.
    pub mass: f64,
    /// Extra descriptors, present when characterization was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<FeatureShape>,
}

/// Result table for one image: located features plus column schema.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FeatureTable {
    /// Located features, one row per surviving candidate.
    pub features: Vec<Feature>,
    /// Image dimensionality (1, 2, or 3).
    pub ndim: usize,
    /// Whether rows carry [`FeatureShape`] descriptors.
    pub characterized: bool,
}

impl FeatureTable {
    /// Construct an empty table with the correct schema for `ndim` axes.
    pub fn empty(ndim: usize, characterized: bool) -> Self {
        Self {
            features: Vec::new(),
            ndim,
            characterized,
        }
    }

    /// Column names in output order.
    pub fn columns(&self) -> Vec<&'static str> {
        let mut cols: Vec<&'static str> = ["x", "y", "z"][..self.ndim].to_vec();
        cols.push("mass");
        if self.characterized {
            cols.extend(["size", "ecc", "signal", "ep"]);
        }
        cols
    }

    /// Number of located features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// True when no feature survived the pipeline.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
