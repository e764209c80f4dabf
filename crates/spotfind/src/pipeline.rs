//! End-to-end locate pipeline: preprocess, discretize, detect, coarse-filter,
//! refine, finalize.

use ndarray::ArrayD;

use crate::collab::{scale_to_gamut, Preprocessor, UncertaintyEstimator};
use crate::config::LocateConfig;
use crate::detect::{local_maxima, DetectError};
use crate::estimate::{estimate_mass, estimate_size};
use crate::refine::{refine, RefineError, RefineOptions, RefineStrategy};
use crate::FeatureTable;

/// Errors reported by the locate pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum LocateError {
    /// The feature diameter must be odd so the window has a center pixel.
    EvenDiameter {
        /// The offending diameter.
        diameter: usize,
    },
    /// Local-maximum detection failed.
    Detect(DetectError),
    /// The refinement configuration was rejected.
    Refine(RefineError),
}

impl std::fmt::Display for LocateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EvenDiameter { diameter } => {
                write!(f, "feature diameter must be odd (got {diameter})")
            }
            Self::Detect(e) => e.fmt(f),
            Self::Refine(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for LocateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::EvenDiameter { .. } => None,
            Self::Detect(e) => Some(e),
            Self::Refine(e) => Some(e),
        }
    }
}

impl From<DetectError> for LocateError {
    fn from(e: DetectError) -> Self {
        Self::Detect(e)
    }
}

impl From<RefineError> for LocateError {
    fn from(e: RefineError) -> Self {
        Self::Refine(e)
    }
}

/// Locate blob-like features in a raw image.
///
/// The image is float-valued in image-index order; positions in the returned
/// table are in Cartesian output order (x, y, z). Configuration problems are
/// errors; an image in which nothing is found is not, and yields an empty
/// table that keeps the column schema.
pub fn locate(
    raw: &ArrayD<f64>,
    config: &LocateConfig,
    preprocessor: Option<&dyn Preprocessor>,
    uncertainty: Option<&dyn UncertaintyEstimator>,
) -> Result<FeatureTable, LocateError> {
    let ndim = raw.ndim();
    if config.diameter % 2 == 0 {
        return Err(LocateError::EvenDiameter {
            diameter: config.diameter,
        });
    }
    // Strategy constraints are rejected up front, not only when candidates
    // happen to reach the refinement stage.
    if config.strategy == RefineStrategy::Fast2d && ndim != 2 {
        return Err(RefineError::Fast2dRequiresTwoDims { ndim }.into());
    }

    let radius = config.radius();
    let separation = config.separation();

    // Dark-feature images are flipped so the rest of the pipeline always
    // chases bright peaks. Inversion is part of the preprocess stage, so a
    // disabled preprocess leaves the image alone even when `invert` is set.
    // Signal is measured on the flipped image too.
    let raw = if config.preprocess && config.invert {
        let max = raw.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        raw.mapv(|v| max - v)
    } else {
        raw.clone()
    };

    let processed = match preprocessor {
        Some(p) if config.preprocess => p.bandpass(
            &raw,
            config.noise_size,
            config.smoothing_size(),
            config.threshold,
        ),
        _ => raw.clone(),
    };

    // Detection needs exact integer data for its dilation-equality test.
    let discrete = scale_to_gamut(&processed, config.gamut_max());

    let mut coords = local_maxima(&discrete, radius, separation, config.percentile)?;
    tracing::info!(candidates = coords.len(), ndim, "detected local maxima");
    if coords.is_empty() {
        return Ok(FeatureTable::empty(ndim, config.characterize));
    }

    if config.filter_before {
        coords.retain(|coord| estimate_mass(&discrete, radius, coord) > config.minmass);
        tracing::info!(candidates = coords.len(), "after coarse mass filter");
        if coords.is_empty() {
            return Ok(FeatureTable::empty(ndim, config.characterize));
        }
    }
    if let (true, Some(maxsize)) = (config.filter_before, config.maxsize) {
        coords.retain(|coord| {
            let mass = estimate_mass(&discrete, radius, coord);
            estimate_size(&discrete, radius, coord, mass) < maxsize
        });
        if coords.is_empty() {
            return Ok(FeatureTable::empty(ndim, config.characterize));
        }
    }

    // Refinement walks on the discretized image so masses stay comparable to
    // `minmass`; the (possibly inverted) raw image supplies signal.
    let image = discrete.mapv(|v| v as f64);
    let options = RefineOptions {
        max_iterations: config.max_iterations,
        characterize: config.characterize,
        strategy: config.strategy,
        trace: false,
    };
    let mut features = refine(&raw, &image, radius, &coords, &options)?;
    tracing::info!(refined = features.len(), "refined candidates");

    if config.filter_after {
        features.retain(|f| {
            f.mass > config.minmass
                && match (config.maxsize, &f.shape) {
                    (Some(maxsize), Some(shape)) => shape.size < maxsize,
                    _ => true,
                }
        });
    }

    // Top-N only touches the table when something actually gets cut, so a
    // generous `topn` never reorders rows.
    if let Some(topn) = config.topn {
        if features.len() > topn {
            features.sort_by(|a, b| b.mass.total_cmp(&a.mass));
            features.truncate(topn);
        }
    }

    if let (Some(estimator), true) = (uncertainty, config.characterize) {
        let (black, noise) =
            estimator.measure_noise(&raw, config.diameter, config.threshold);
        let ep = estimator.static_error(&features, noise, config.diameter, config.noise_size);
        for (feature, ep) in features.iter_mut().zip(ep) {
            if let Some(shape) = feature.shape.as_mut() {
                shape.signal -= black;
                shape.ep = Some(ep);
            }
        }
    }

    tracing::info!(located = features.len(), "locate finished");
    Ok(FeatureTable {
        features,
        ndim,
        characterized: config.characterize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{add_blob, blank, blob_image};
    use approx::assert_abs_diff_eq;

    fn config() -> LocateConfig {
        LocateConfig {
            bit_depth: Some(8),
            ..LocateConfig::from_diameter(9)
        }
    }

    #[test]
    fn even_diameter_is_rejected() {
        let raw = blank(&[32, 32]);
        let err = locate(&raw, &LocateConfig::from_diameter(8), None, None).unwrap_err();
        assert_eq!(err, LocateError::EvenDiameter { diameter: 8 });
    }

    #[test]
    fn fast_strategy_on_a_volume_is_rejected_up_front() {
        let raw = blank(&[16, 16, 16]);
        let cfg = LocateConfig {
            strategy: crate::RefineStrategy::Fast2d,
            ..LocateConfig::from_diameter(5)
        };
        let err = locate(&raw, &cfg, None, None).unwrap_err();
        assert!(matches!(err, LocateError::Refine(_)));
    }

    #[test]
    fn locates_a_blob_at_sub_pixel_accuracy() {
        let raw = blob_image(&[64, 64], &[30.4, 25.7], 2.0, 200.0);
        let table = locate(&raw, &config(), None, None).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.ndim, 2);
        let f = &table.features[0];
        assert_abs_diff_eq!(f.position[0], 25.7, epsilon = 0.1);
        assert_abs_diff_eq!(f.position[1], 30.4, epsilon = 0.1);
        assert!(f.shape.is_some());
    }

    #[test]
    fn blank_image_yields_an_empty_table_with_schema() {
        let raw = blank(&[48, 48]);
        let table = locate(&raw, &config(), None, None).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.columns(), vec!["x", "y", "mass", "size", "ecc", "signal", "ep"]);
    }

    #[test]
    fn raising_minmass_never_adds_features() {
        let mut raw = blank(&[64, 96]);
        add_blob(&mut raw, &[20.0, 25.0], 2.0, 200.0);
        add_blob(&mut raw, &[45.0, 70.0], 2.0, 60.0);
        let mut previous = usize::MAX;
        for minmass in [0.0, 500.0, 2000.0, 1e9] {
            let cfg = LocateConfig {
                minmass,
                ..config()
            };
            let n = locate(&raw, &cfg, None, None).unwrap().len();
            assert!(n <= previous, "minmass {minmass} grew the result to {n}");
            previous = n;
        }
    }

    #[test]
    fn topn_keeps_the_brightest_feature() {
        let mut raw = blank(&[64, 96]);
        add_blob(&mut raw, &[20.0, 25.0], 2.0, 120.0);
        add_blob(&mut raw, &[45.0, 70.0], 2.0, 250.0);
        let cfg = LocateConfig {
            topn: Some(1),
            minmass: 0.0,
            ..config()
        };
        let table = locate(&raw, &cfg, None, None).unwrap();
        assert_eq!(table.len(), 1);
        let f = &table.features[0];
        assert_abs_diff_eq!(f.position[0], 70.0, epsilon = 0.1);
        assert_abs_diff_eq!(f.position[1], 45.0, epsilon = 0.1);
    }

    #[test]
    fn generous_topn_is_a_no_op_and_keeps_detection_order() {
        // The dim blob comes first in raster order; a topn above the
        // surviving count must not reorder the rows by mass.
        let mut raw = blank(&[64, 96]);
        add_blob(&mut raw, &[20.0, 25.0], 2.0, 120.0);
        add_blob(&mut raw, &[45.0, 70.0], 2.0, 250.0);
        let cfg = LocateConfig {
            topn: Some(5),
            minmass: 0.0,
            ..config()
        };
        let table = locate(&raw, &cfg, None, None).unwrap();
        assert_eq!(table.len(), 2);
        assert_abs_diff_eq!(table.features[0].position[1], 20.0, epsilon = 0.1);
        assert_abs_diff_eq!(table.features[1].position[1], 45.0, epsilon = 0.1);
        assert!(table.features[0].mass < table.features[1].mass);
    }

    #[test]
    fn inverted_images_track_dark_features() {
        let mut raw = blank(&[64, 64]);
        raw.fill(100.0);
        add_blob(&mut raw, &[30.0, 33.0], 2.0, -80.0);
        let cfg = LocateConfig {
            invert: true,
            ..config()
        };
        let table = locate(&raw, &cfg, None, None).unwrap();
        assert_eq!(table.len(), 1);
        assert_abs_diff_eq!(table.features[0].position[0], 33.0, epsilon = 0.1);
        assert_abs_diff_eq!(table.features[0].position[1], 30.0, epsilon = 0.1);
    }

    #[test]
    fn invert_is_inert_when_preprocessing_is_disabled() {
        let mut raw = blank(&[64, 64]);
        raw.fill(100.0);
        add_blob(&mut raw, &[30.0, 33.0], 2.0, -80.0);
        let cfg = LocateConfig {
            invert: true,
            preprocess: false,
            ..config()
        };
        // The unflipped image is a bright plateau with a dark dip; nothing
        // clears the dilation-equality test, so the table stays empty.
        let table = locate(&raw, &cfg, None, None).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn characterize_false_omits_shape_columns() {
        let raw = blob_image(&[64, 64], &[30.0, 30.0], 2.0, 200.0);
        let cfg = LocateConfig {
            characterize: false,
            ..config()
        };
        let table = locate(&raw, &cfg, None, None).unwrap();
        assert_eq!(table.columns(), vec!["x", "y", "mass"]);
        assert!(table.features.iter().all(|f| f.shape.is_none()));
    }
}
