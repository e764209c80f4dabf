//! Locate pipeline configuration.

use crate::refine::RefineStrategy;

/// Tuning parameters for [`Locator::locate`](crate::Locator::locate).
///
/// All fields have working defaults except `diameter`, which must match the
/// features being tracked; use [`LocateConfig::from_diameter`] as the usual
/// entry point. Lengths are in pixels along a single axis.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LocateConfig {
    /// Feature extent per axis. Must be odd so the analysis window has an
    /// unambiguous center pixel.
    pub diameter: usize,
    /// Minimum integrated brightness, in the discretized scale. Features
    /// below it are dim noise and are dropped.
    pub minmass: f64,
    /// Maximum radius of gyration. `None` disables the size cut.
    pub maxsize: Option<f64>,
    /// Minimum distance between feature centers. `None` means
    /// `diameter + 1`.
    pub separation: Option<usize>,
    /// Short-wavelength cutoff of the bandpass preprocessor, when one is
    /// attached.
    pub noise_size: f64,
    /// Long-wavelength cutoff of the bandpass preprocessor. `None` means
    /// `diameter`.
    pub smoothing_size: Option<usize>,
    /// Clip level applied by the bandpass preprocessor.
    pub threshold: f64,
    /// Interpret dark features on a bright background.
    pub invert: bool,
    /// Brightness percentile of nonzero pixels a local maximum must clear.
    pub percentile: f64,
    /// Keep only this many brightest features. `None` keeps all.
    pub topn: Option<usize>,
    /// Run the attached preprocessor before detection. With no preprocessor
    /// attached this flag has no effect.
    pub preprocess: bool,
    /// Refinement iteration budget per candidate.
    pub max_iterations: usize,
    /// Apply the mass and size cuts on coarse estimates before refinement.
    pub filter_before: bool,
    /// Apply the mass and size cuts on refined values after refinement.
    pub filter_after: bool,
    /// Compute size, eccentricity, and signal in addition to mass.
    pub characterize: bool,
    /// Refinement execution strategy.
    pub strategy: RefineStrategy,
    /// Bit depth of the source image, used to pick the discretization gamut.
    /// `None` selects a conservative 7-bit gamut.
    pub bit_depth: Option<u32>,
}

impl Default for LocateConfig {
    fn default() -> Self {
        Self {
            diameter: 7,
            minmass: 100.0,
            maxsize: None,
            separation: None,
            noise_size: 1.0,
            smoothing_size: None,
            threshold: 1.0,
            invert: false,
            percentile: 64.0,
            topn: None,
            preprocess: true,
            max_iterations: 10,
            filter_before: true,
            filter_after: true,
            characterize: true,
            strategy: RefineStrategy::default(),
            bit_depth: None,
        }
    }
}

impl LocateConfig {
    /// Defaults with the given feature diameter.
    pub fn from_diameter(diameter: usize) -> Self {
        Self {
            diameter,
            ..Self::default()
        }
    }

    /// Analysis window radius, `diameter / 2`.
    pub fn radius(&self) -> usize {
        self.diameter / 2
    }

    /// Effective center-to-center separation.
    pub fn separation(&self) -> usize {
        self.separation.unwrap_or(self.diameter + 1)
    }

    /// Effective long-wavelength bandpass cutoff.
    pub fn smoothing_size(&self) -> usize {
        self.smoothing_size.unwrap_or(self.diameter)
    }

    /// Largest value of the integer brightness scale used for detection.
    pub fn gamut_max(&self) -> i64 {
        match self.bit_depth {
            Some(bits) => (1i64 << bits) - 1,
            None => i8::MAX as i64,
        }
    }
}
