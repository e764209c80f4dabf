//! Interfaces to external collaborators and image discretization.
//!
//! Band-pass preprocessing and position-uncertainty estimation are not part
//! of the detection/refinement core; they plug in through the traits below.
//! A [`Locator`](crate::Locator) without collaborators still works: the
//! processed image is then a copy of the raw image and the uncertainty
//! column stays empty.

use ndarray::ArrayD;

use crate::Feature;

/// External band-pass preprocessing step.
pub trait Preprocessor {
    /// Suppress pixel noise and long-wavelength background variation.
    ///
    /// `noise_size` is the width of the noise-suppression kernel,
    /// `smoothing_size` the background smoothing scale in pixels, and
    /// `threshold` the clip level applied to the result.
    fn bandpass(
        &self,
        image: &ArrayD<f64>,
        noise_size: f64,
        smoothing_size: usize,
        threshold: f64,
    ) -> ArrayD<f64>;
}

/// External noise model used to annotate located features.
pub trait UncertaintyEstimator {
    /// Measure the image black level and noise level.
    fn measure_noise(&self, raw: &ArrayD<f64>, diameter: usize, threshold: f64) -> (f64, f64);

    /// Estimate the static position error for each feature, in pixels.
    fn static_error(
        &self,
        features: &[Feature],
        noise: f64,
        diameter: usize,
        noise_size: f64,
    ) -> Vec<f64>;
}

/// Rescale an image into an exact integer gamut `[0, gamut_max]`.
///
/// Negative values clip to zero; values scale so the brightest pixel maps to
/// `gamut_max`. Detection requires exact data because local maxima are found
/// by an equality comparison against a grayscale dilation.
pub fn scale_to_gamut(image: &ArrayD<f64>, gamut_max: i64) -> ArrayD<i64> {
    let max = image.fold(0.0f64, |m, &v| m.max(v));
    if max <= 0.0 {
        return ArrayD::zeros(image.raw_dim());
    }
    let scale = gamut_max as f64 / max;
    image.mapv(|v| (v.max(0.0) * scale) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn scale_to_gamut_spans_the_target_range() {
        let mut image = ArrayD::zeros(IxDyn(&[4, 4]));
        image[[1, 2]] = 2.0;
        image[[3, 3]] = -1.0;
        image[[0, 0]] = 1.0;
        let scaled = scale_to_gamut(&image, 255);
        assert_eq!(scaled[[1, 2]], 255);
        assert_eq!(scaled[[0, 0]], 127); // truncated, not rounded
        assert_eq!(scaled[[3, 3]], 0);
    }

    #[test]
    fn scale_to_gamut_of_flat_image_is_all_zero() {
        let image = ArrayD::zeros(IxDyn(&[3, 3]));
        assert!(scale_to_gamut(&image, 127).iter().all(|&v| v == 0));
    }
}
