//! High-level entry point bundling configuration and collaborators.

use ndarray::ArrayD;

use crate::collab::{Preprocessor, UncertaintyEstimator};
use crate::config::LocateConfig;
use crate::pipeline::{self, LocateError};
use crate::FeatureTable;

/// Configured feature locator.
///
/// Bundles a [`LocateConfig`] with the optional band-pass and uncertainty
/// collaborators and runs the locate pipeline on any number of images.
///
/// ```
/// use ndarray::ArrayD;
/// use spotfind::Locator;
///
/// let image = ArrayD::from_shape_fn(ndarray::IxDyn(&[64, 64]), |idx| {
///     let (dy, dx) = (idx[0] as f64 - 30.0, idx[1] as f64 - 25.0);
///     200.0 * (-(dx * dx + dy * dy) / 8.0).exp()
/// });
/// let table = Locator::from_diameter(9).locate(&image).unwrap();
/// assert_eq!(table.len(), 1);
/// ```
pub struct Locator {
    config: LocateConfig,
    preprocessor: Option<Box<dyn Preprocessor>>,
    uncertainty: Option<Box<dyn UncertaintyEstimator>>,
}

impl Locator {
    /// Locator with the given configuration and no collaborators.
    pub fn new(config: LocateConfig) -> Self {
        Self {
            config,
            preprocessor: None,
            uncertainty: None,
        }
    }

    /// Locator with default settings for the given feature diameter.
    pub fn from_diameter(diameter: usize) -> Self {
        Self::new(LocateConfig::from_diameter(diameter))
    }

    /// Attach a band-pass preprocessing collaborator.
    pub fn with_preprocessor(mut self, preprocessor: impl Preprocessor + 'static) -> Self {
        self.preprocessor = Some(Box::new(preprocessor));
        self
    }

    /// Attach a noise-model collaborator for uncertainty annotation.
    pub fn with_uncertainty(mut self, estimator: impl UncertaintyEstimator + 'static) -> Self {
        self.uncertainty = Some(Box::new(estimator));
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &LocateConfig {
        &self.config
    }

    /// Mutable access for adjusting parameters between images.
    pub fn config_mut(&mut self) -> &mut LocateConfig {
        &mut self.config
    }

    /// Run the locate pipeline on one image.
    pub fn locate(&self, raw: &ArrayD<f64>) -> Result<FeatureTable, LocateError> {
        pipeline::locate(
            raw,
            &self.config,
            self.preprocessor.as_deref(),
            self.uncertainty.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::blob_image;
    use crate::Feature;
    use approx::assert_abs_diff_eq;

    /// Clips everything below a fixed floor to zero.
    struct FloorClip(f64);

    impl Preprocessor for FloorClip {
        fn bandpass(
            &self,
            image: &ArrayD<f64>,
            _noise_size: f64,
            _smoothing_size: usize,
            _threshold: f64,
        ) -> ArrayD<f64> {
            image.mapv(|v| if v < self.0 { 0.0 } else { v })
        }
    }

    /// Fixed black level and a constant per-feature error.
    struct FlatNoise {
        black: f64,
        noise: f64,
    }

    impl UncertaintyEstimator for FlatNoise {
        fn measure_noise(&self, _raw: &ArrayD<f64>, _diameter: usize, _threshold: f64) -> (f64, f64) {
            (self.black, self.noise)
        }

        fn static_error(
            &self,
            features: &[Feature],
            noise: f64,
            _diameter: usize,
            _noise_size: f64,
        ) -> Vec<f64> {
            features.iter().map(|_| noise * 0.1).collect()
        }
    }

    fn test_image() -> ArrayD<f64> {
        blob_image(&[64, 64], &[30.2, 25.8], 2.0, 200.0)
    }

    #[test]
    fn locator_without_collaborators_locates() {
        let mut locator = Locator::from_diameter(9);
        locator.config_mut().bit_depth = Some(8);
        let table = locator.locate(&test_image()).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.features[0].shape.as_ref().unwrap().ep.is_none());
    }

    #[test]
    fn preprocessor_output_drives_detection() {
        // A clip floor above the blob peak erases every candidate.
        let locator = Locator::from_diameter(9).with_preprocessor(FloorClip(1e6));
        let table = locator.locate(&test_image()).unwrap();
        assert!(table.is_empty());

        let locator = Locator::from_diameter(9).with_preprocessor(FloorClip(1.0));
        let table = locator.locate(&test_image()).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn uncertainty_collaborator_fills_ep_and_corrects_signal() {
        let locator = Locator::from_diameter(9).with_uncertainty(FlatNoise {
            black: 5.0,
            noise: 2.0,
        });
        let bare = Locator::from_diameter(9);

        let with_ep = locator.locate(&test_image()).unwrap();
        let without = bare.locate(&test_image()).unwrap();
        let annotated = with_ep.features[0].shape.as_ref().unwrap();
        let plain = without.features[0].shape.as_ref().unwrap();
        assert_abs_diff_eq!(annotated.ep.unwrap(), 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(annotated.signal, plain.signal - 5.0, epsilon = 1e-9);
    }
}
