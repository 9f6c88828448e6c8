//! Steerable-pyramid collaborator contract.
//!
//! The texture encoder does not build pyramids itself; it consumes complex
//! steerable-pyramid coefficients through the [`SteerablePyramid`] trait. The
//! convention is non-downsampled: every oriented band and both residuals keep
//! the full input resolution, and down-sampling is emulated in the Fourier
//! domain where a statistic needs it.

use ndarray::{Array4, Array6, Axis};
use num_complex::Complex64;

use crate::util::{TexStatsError, TexStatsResult};

/// Identifies one band of a real-valued pyramid decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BandKey {
    /// The highpass residual.
    ResidualHighpass,
    /// An oriented band at `(scale, orientation)`.
    Oriented { scale: usize, orientation: usize },
    /// The lowpass residual.
    ResidualLowpass,
}

/// Which part of a pyramid to reconstruct from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconLevels {
    /// Only the lowpass residual.
    ResidualLowpass,
    /// Only the oriented bands at one scale.
    Scale(usize),
}

/// Full set of complex pyramid coefficients for a batch of images.
#[derive(Debug, Clone)]
pub struct PyramidBands {
    /// Oriented coefficients, `(batch, channel, scale, orientation, h, w)`.
    pub oriented: Array6<Complex64>,
    /// Highpass residual, `(batch, channel, h, w)`.
    pub highpass: Array4<f64>,
    /// Lowpass residual, `(batch, channel, h, w)`.
    pub lowpass: Array4<f64>,
}

impl PyramidBands {
    /// Checks the non-downsampled shape contract against the model geometry.
    pub fn validate(
        &self,
        n_scales: usize,
        n_orientations: usize,
        height: usize,
        width: usize,
    ) -> TexStatsResult<()> {
        let (b, c, s, o, h, w) = self.oriented.dim();
        if s != n_scales || o != n_orientations || h != height || w != width {
            return Err(TexStatsError::PyramidContract {
                context: "oriented bands must be (b, c, n_scales, n_orientations, h, w)",
            });
        }
        for residual in [&self.highpass, &self.lowpass] {
            if residual.dim() != (b, c, height, width) {
                return Err(TexStatsError::PyramidContract {
                    context: "residual bands must match the oriented batch and resolution",
                });
            }
        }
        Ok(())
    }
}

/// Ordered real-valued coefficient set handed back for reconstruction.
///
/// Bands are stored in pyramid order (highpass, scales fine to coarse with
/// orientations inside each scale, lowpass) so a pyramid implementation can
/// consume them positionally or by key.
#[derive(Debug, Clone)]
pub struct BandDict {
    entries: Vec<(BandKey, Array4<f64>)>,
}

impl BandDict {
    /// Assembles the canonical band order from real oriented coefficients and
    /// the two residuals.
    pub fn from_real_parts(
        highpass: Array4<f64>,
        oriented_real: &Array6<f64>,
        lowpass: Array4<f64>,
    ) -> Self {
        let (_, _, n_scales, n_orientations, _, _) = oriented_real.dim();
        let mut entries = Vec::with_capacity(n_scales * n_orientations + 2);
        entries.push((BandKey::ResidualHighpass, highpass));
        for scale in 0..n_scales {
            for orientation in 0..n_orientations {
                let band = oriented_real
                    .index_axis(Axis(2), scale)
                    .index_axis(Axis(2), orientation)
                    .to_owned();
                entries.push((BandKey::Oriented { scale, orientation }, band));
            }
        }
        entries.push((BandKey::ResidualLowpass, lowpass));
        Self { entries }
    }

    /// Looks up one band by key.
    pub fn get(&self, key: &BandKey) -> Option<&Array4<f64>> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Iterates bands in pyramid order.
    pub fn iter(&self) -> impl Iterator<Item = (&BandKey, &Array4<f64>)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A complex steerable pyramid operating in the non-downsampled convention.
pub trait SteerablePyramid {
    /// Number of scales the pyramid decomposes into.
    fn n_scales(&self) -> usize;

    /// Number of orientation bands per scale.
    fn n_orientations(&self) -> usize;

    /// Decomposes a batch of images, `(batch, channel, h, w)`.
    fn forward(&self, image: &Array4<f64>) -> TexStatsResult<PyramidBands>;

    /// Reconstructs an image batch from a subset of real-valued bands.
    ///
    /// Bands not named by `levels` are treated as zero. The result keeps the
    /// full input resolution.
    fn reconstruct(&self, bands: &BandDict, levels: ReconLevels) -> TexStatsResult<Array4<f64>>;
}
