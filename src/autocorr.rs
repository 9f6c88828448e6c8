//! Windowed autocorrelation of pyramid bands.
//!
//! Bands live at full resolution, so before cropping the central
//! autocorrelation window each band is shrunk by `2^scale` to emulate the
//! down-sampled pyramid the statistics were originally defined on.

use ndarray::{Array3, Array4, Array5, Array6, ArrayD, Axis};

use crate::signal;
use crate::trace::trace_span;
use crate::util::{TexStatsError, TexStatsResult};

/// Computes central autocorrelation windows and band variances.
#[derive(Debug, Clone, Copy)]
pub struct AutocorrelationEngine {
    spatial_corr_width: usize,
    true_correlations: bool,
}

impl AutocorrelationEngine {
    /// `spatial_corr_width` is the side of the central window kept from each
    /// band's autocorrelation. With `true_correlations` the autocorrelation
    /// is divided by its zero-lag value, turning it into a correlation.
    pub fn new(spatial_corr_width: usize, true_correlations: bool) -> Self {
        Self {
            spatial_corr_width,
            true_correlations,
        }
    }

    /// Autocorrelation of bands indexed by a single scale axis.
    ///
    /// `x` is `(batch, channel, n_bands, h, w)` with band `i` shrunk by
    /// `2^i`. Returns the stacked windows
    /// `(batch, channel, width, width, n_bands)` and the per-band variances
    /// `(batch, channel, n_bands)`.
    pub fn scale_bands(&self, x: &Array5<f64>) -> TexStatsResult<(Array5<f64>, Array3<f64>)> {
        let _span = trace_span!("autocorr_scale_bands").entered();
        let (b, c, n, _, _) = x.dim();
        let (windows, vars) = self.compute(&x.clone().into_dyn(), n)?;
        let scw = self.spatial_corr_width;
        let mut out = Array5::<f64>::zeros((b, c, scw, scw, n));
        for (i, win) in windows.iter().enumerate() {
            // win is (b, c, scw, scw)
            for bi in 0..b {
                for ci in 0..c {
                    for a1 in 0..scw {
                        for a2 in 0..scw {
                            out[[bi, ci, a1, a2, i]] = win[[bi, ci, a1, a2]];
                        }
                    }
                }
            }
        }
        let var = Array3::from_shape_vec((b, c, n), vars)
            .expect("variance count matches band count");
        Ok((out, var))
    }

    /// Autocorrelation of oriented bands, `(batch, channel, scale,
    /// orientation, h, w)`, shrinking by `2^scale`.
    ///
    /// Returns `(batch, channel, width, width, n_scales, n_orientations)` and
    /// the variances `(batch, channel, n_scales, n_orientations)`.
    pub fn oriented_bands(&self, x: &Array6<f64>) -> TexStatsResult<(Array6<f64>, Array4<f64>)> {
        let _span = trace_span!("autocorr_oriented_bands").entered();
        let (b, c, s, o, _, _) = x.dim();
        let (windows, vars) = self.compute(&x.clone().into_dyn(), s)?;
        let scw = self.spatial_corr_width;
        let mut out = Array6::<f64>::zeros((b, c, scw, scw, s, o));
        for (i, win) in windows.iter().enumerate() {
            // win is (b, c, o, scw, scw)
            for bi in 0..b {
                for ci in 0..c {
                    for oi in 0..o {
                        for a1 in 0..scw {
                            for a2 in 0..scw {
                                out[[bi, ci, a1, a2, i, oi]] = win[[bi, ci, oi, a1, a2]];
                            }
                        }
                    }
                }
            }
        }
        let var = Array4::from_shape_vec((b, c, s, o), vars)
            .expect("variance count matches band count");
        Ok((out, var))
    }

    /// Shared core: full-band autocorrelation, optional correlation
    /// normalization, then per-scale shrink and crop.
    ///
    /// Returns one cropped window per scale index (leading dims minus the
    /// scale axis, plus the window) and the flattened zero-lag variances in
    /// row-major band order.
    fn compute(
        &self,
        x: &ArrayD<f64>,
        n_scale_bands: usize,
    ) -> TexStatsResult<(Vec<ArrayD<f64>>, Vec<f64>)> {
        let shape = x.shape().to_vec();
        if shape.len() < 4 {
            return Err(TexStatsError::UnexpectedShape {
                context: "autocorrelation bands",
                got: shape,
            });
        }
        let (h, w) = (shape[shape.len() - 2], shape[shape.len() - 1]);
        if self.spatial_corr_width > h || self.spatial_corr_width > w {
            return Err(TexStatsError::InvalidConfig {
                reason: "spatial correlation width exceeds the band resolution",
            });
        }

        let mut acs = signal::autocorrelation(x)?;
        let zero_lag = signal::center_crop(&acs, 1)?;
        let vars: Vec<f64> = zero_lag.iter().copied().collect();
        if self.true_correlations {
            // broadcast-divide every band by its zero-lag value
            let n_spatial = h * w;
            let n_lead = acs.len() / n_spatial;
            let mut flat = acs
                .view_mut()
                .into_shape_with_order((n_lead, n_spatial))
                .expect("standard-layout reshape");
            for (mut row, &var) in flat.rows_mut().into_iter().zip(vars.iter()) {
                let denom = if var.abs() > f64::EPSILON { var } else { 1.0 };
                row.mapv_inplace(|v| v / denom);
            }
        }

        let mut windows = Vec::with_capacity(n_scale_bands);
        for i in 0..n_scale_bands {
            let band = acs.index_axis(Axis(2), i).to_owned();
            let shrunk = signal::shrink(&band, 1 << i)?;
            windows.push(signal::center_crop(&shrunk, self.spatial_corr_width)?);
        }
        Ok((windows, vars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array5;

    #[test]
    fn zero_lag_entry_is_the_band_variance() {
        let mut x = Array5::<f64>::zeros((1, 1, 1, 8, 8));
        x[[0, 0, 0, 1, 2]] = 2.0;
        x[[0, 0, 0, 6, 3]] = -1.0;
        let mean = x.sum() / 64.0;
        x.mapv_inplace(|v| v - mean);
        let expected_var = x.mapv(|v| v * v).sum() / 64.0;

        let engine = AutocorrelationEngine::new(5, false);
        let (windows, vars) = engine.scale_bands(&x).unwrap();
        assert_eq!(windows.dim(), (1, 1, 5, 5, 1));
        assert!((vars[[0, 0, 0]] - expected_var).abs() < 1e-12);
        assert!((windows[[0, 0, 2, 2, 0]] - expected_var).abs() < 1e-12);
    }

    #[test]
    fn true_correlations_normalize_zero_lag_to_one() {
        let mut x = Array5::<f64>::zeros((1, 1, 1, 8, 8));
        x[[0, 0, 0, 3, 3]] = 4.0;
        let mean = x.sum() / 64.0;
        x.mapv_inplace(|v| v - mean);

        let engine = AutocorrelationEngine::new(3, true);
        let (windows, _) = engine.scale_bands(&x).unwrap();
        assert!((windows[[0, 0, 1, 1, 0]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn coarser_scales_are_shrunk_before_cropping() {
        let x = Array5::<f64>::from_elem((1, 1, 2, 16, 16), 1.0);
        let engine = AutocorrelationEngine::new(3, false);
        // constant bands are fine here; only the shapes are under test
        let (windows, vars) = engine.scale_bands(&x).unwrap();
        assert_eq!(windows.dim(), (1, 1, 3, 3, 2));
        assert_eq!(vars.dim(), (1, 1, 2));
    }

    #[test]
    fn oriented_bands_keep_scale_then_orientation_axes() {
        let x = ndarray::Array6::<f64>::zeros((1, 1, 2, 3, 16, 16));
        let engine = AutocorrelationEngine::new(3, false);
        let (windows, vars) = engine.oriented_bands(&x).unwrap();
        assert_eq!(windows.dim(), (1, 1, 3, 3, 2, 3));
        assert_eq!(vars.dim(), (1, 1, 2, 3));
    }
}
