//! Cross-orientation and cross-scale correlations.
//!
//! Two families of statistics live here: band-against-band correlations
//! pooled over space, and the lowpass-residual "stitch" that appends the
//! correlations of a shrunk, shifted lowpass image to the real-part blocks.
//! The stitched blocks are zero-padded up to `max(2 * n_orientations, 5)`
//! columns so the block shape is independent of where the content sits; the
//! padding positions are part of the wire format.
//!
//! Two historical quirks of the statistic set are kept deliberately: the
//! phase-doubled "separate" tensor negates the real component, and the
//! stitched correlations normalize by a global standard deviation rather
//! than a per-band one. Changing either would silently break compatibility
//! with existing statistic vectors.

use ndarray::{s, Array4, Array5, Array6, ArrayView4, Axis};
use num_complex::Complex64;

use crate::signal;
use crate::trace::trace_span;
use crate::util::{TexStatsError, TexStatsResult};

/// Computes cross-band correlation blocks for one model geometry.
#[derive(Debug, Clone, Copy)]
pub struct CrossCorrelationEngine {
    n_scales: usize,
    n_orientations: usize,
    true_correlations: bool,
}

impl CrossCorrelationEngine {
    pub fn new(n_scales: usize, n_orientations: usize, true_correlations: bool) -> Self {
        Self {
            n_scales,
            n_orientations,
            true_correlations,
        }
    }

    /// Padded side length of the stitched real-correlation blocks.
    pub fn stitched_dim(&self) -> usize {
        (2 * self.n_orientations).max(5)
    }

    /// Correlates every orientation of `a` against every orientation of `b`
    /// at each scale, pooling over space.
    ///
    /// Inputs are `(batch, channel, scale, orientation, h, w)` with matching
    /// non-orientation dims. Returns `(batch, channel, o_a, o_b, scale)`.
    /// With true correlations each scale slice is divided by the sample
    /// standard deviations of the two inputs, pooled over orientation and
    /// space.
    pub fn cross_correlation(
        &self,
        a: &Array6<f64>,
        b: &Array6<f64>,
    ) -> TexStatsResult<Array5<f64>> {
        let _span = trace_span!("cross_correlation").entered();
        let (ba, ca, sa, oa, ha, wa) = a.dim();
        let (bb, cb, sb, ob, hb, wb) = b.dim();
        if (ba, ca, sa, ha, wa) != (bb, cb, sb, hb, wb) {
            return Err(TexStatsError::UnexpectedShape {
                context: "cross-correlation operands",
                got: b.shape().to_vec(),
            });
        }
        let n_spatial = (ha * wa) as f64;
        let mut out = Array5::<f64>::zeros((ba, ca, oa, ob, sa));
        for bi in 0..ba {
            for ci in 0..ca {
                for si in 0..sa {
                    let lhs = a.slice(s![bi, ci, si, .., .., ..]);
                    let rhs = b.slice(s![bi, ci, si, .., .., ..]);
                    let norm = if self.true_correlations {
                        sample_std(lhs.iter().copied()) * sample_std(rhs.iter().copied())
                    } else {
                        1.0
                    };
                    for o1 in 0..oa {
                        for o2 in 0..ob {
                            let dot: f64 = lhs
                                .index_axis(Axis(0), o1)
                                .iter()
                                .zip(rhs.index_axis(Axis(0), o2).iter())
                                .map(|(x, y)| x * y)
                                .sum();
                            out[[bi, ci, o1, o2, si]] = dot / (n_spatial * norm);
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// Doubles the phase of all but the finest scale of complex coefficients.
    ///
    /// Returns the demeaned magnitudes, `(b, c, n_scales - 1, o, h, w)`, and
    /// the packed negated-real/imaginary parts,
    /// `(b, c, n_scales - 1, 2 * o, h, w)` with the imaginary component at
    /// `orientation + n_orientations`. Both are rescaled by `2^(i - 1)` for
    /// band `i` to match the down-sampled convention.
    pub fn double_phase(
        &self,
        coeffs: &Array6<Complex64>,
    ) -> TexStatsResult<(Array6<f64>, Array6<f64>)> {
        let _span = trace_span!("double_phase").entered();
        let (b, c, s, o, h, w) = coeffs.dim();
        if s != self.n_scales || s < 2 {
            return Err(TexStatsError::UnexpectedShape {
                context: "phase doubling needs at least two scales",
                got: coeffs.shape().to_vec(),
            });
        }
        let doubled = signal::modulate_phase(&coeffs.slice(s![.., .., 1.., .., .., ..]).to_owned(), 2.0);

        let mut mags = Array6::<f64>::zeros((b, c, s - 1, o, h, w));
        let mut separate = Array6::<f64>::zeros((b, c, s - 1, 2 * o, h, w));
        let n_spatial = (h * w) as f64;
        for bi in 0..b {
            for ci in 0..c {
                for si in 0..s - 1 {
                    let rescale = 2f64.powi(si as i32 - 1);
                    for oi in 0..o {
                        let band = doubled.slice(s![bi, ci, si, oi, .., ..]);
                        let mag_mean =
                            band.iter().map(|z| z.norm()).sum::<f64>() / n_spatial;
                        for hi in 0..h {
                            for wi in 0..w {
                                let z = band[[hi, wi]];
                                mags[[bi, ci, si, oi, hi, wi]] =
                                    (z.norm() - mag_mean) * rescale;
                                separate[[bi, ci, si, oi, hi, wi]] = -z.re * rescale;
                                separate[[bi, ci, si, oi + o, hi, wi]] = z.im * rescale;
                            }
                        }
                    }
                }
            }
        }
        Ok((mags, separate))
    }

    /// Appends the shrunk-lowpass auto-correlation block as an extra scale of
    /// the cross-orientation real correlations.
    ///
    /// `cross` is `(b, c, o, o, n_scales)`; the result is
    /// `(b, c, m, m, n_scales + 1)` with `m = max(2 * n_orientations, 5)`.
    pub fn stitch_lowpass_cross_orientation(
        &self,
        cross: &Array5<f64>,
        lowpass: &Array4<f64>,
    ) -> TexStatsResult<Array5<f64>> {
        let _span = trace_span!("stitch_lowpass_cross_orientation").entered();
        let (b, c, o1, o2, s) = cross.dim();
        if o1 != self.n_orientations || o2 != self.n_orientations {
            return Err(TexStatsError::UnexpectedShape {
                context: "cross-orientation real correlations",
                got: cross.shape().to_vec(),
            });
        }
        let (_, _, h, w) = lowpass.dim();
        let shifted = self.lowpass_shift_stack(lowpass)?;
        let lowpass_corr = self.matrix_crosscorrelation(&shifted.view(), &shifted.view(), h * w);

        let m = self.stitched_dim();
        let o = self.n_orientations;
        let mut out = Array5::<f64>::zeros((b, c, m, m, s + 1));
        out.slice_mut(s![.., .., ..o, ..o, ..s]).assign(cross);
        out.slice_mut(s![.., .., ..5, ..5, s]).assign(&lowpass_corr);
        Ok(out)
    }

    /// Appends the coarsest-scale-against-lowpass correlations as an extra
    /// scale of the cross-scale real correlations.
    ///
    /// `cross` is `(b, c, o, 2o, n_scales - 1)` when the pyramid has more
    /// than one scale, `None` otherwise. `coarsest_real` holds the real part
    /// of the coarsest oriented coefficients, `(b, c, o, h, w)`. The result
    /// is `(b, c, 2 * n_orientations, m, n_scales)`.
    pub fn stitch_lowpass_cross_scale(
        &self,
        cross: Option<&Array5<f64>>,
        lowpass: &Array4<f64>,
        coarsest_real: &Array5<f64>,
    ) -> TexStatsResult<Array5<f64>> {
        let _span = trace_span!("stitch_lowpass_cross_scale").entered();
        let o = self.n_orientations;
        let (b, c, os, _, _) = coarsest_real.dim();
        if os != o {
            return Err(TexStatsError::UnexpectedShape {
                context: "coarsest-scale real coefficients",
                got: coarsest_real.shape().to_vec(),
            });
        }

        let shrunk = if self.n_scales == 1 {
            coarsest_real.clone()
        } else {
            let factor = 1 << (self.n_scales - 1);
            let shrunk = signal::shrink(&coarsest_real.clone().into_dyn(), factor)?
                .mapv(|v| v * factor as f64);
            shrunk
                .into_dimensionality()
                .map_err(|_| TexStatsError::UnexpectedShape {
                    context: "shrunk coarsest-scale coefficients",
                    got: vec![],
                })?
        };
        let (_, _, _, hs, ws) = shrunk.dim();
        let band_num_el = hs * ws;

        // rearrange (b, c, o, h, w) -> (b, c, w * h, o)
        let mut orientation_bands = Array4::<f64>::zeros((b, c, ws * hs, o));
        for bi in 0..b {
            for ci in 0..c {
                for oi in 0..o {
                    for wi in 0..ws {
                        for hi in 0..hs {
                            orientation_bands[[bi, ci, wi * hs + hi, oi]] =
                                shrunk[[bi, ci, oi, hi, wi]];
                        }
                    }
                }
            }
        }

        let shifted = self.lowpass_shift_stack(lowpass)?;
        if shifted.len_of(Axis(2)) != band_num_el {
            return Err(TexStatsError::UnexpectedShape {
                context: "lowpass stack vs coarsest band element count",
                got: shifted.shape().to_vec(),
            });
        }
        let lowpass_corr =
            self.matrix_crosscorrelation(&orientation_bands.view(), &shifted.view(), band_num_el);

        let m = self.stitched_dim();
        let n_kept = cross.map_or(0, |x| x.len_of(Axis(4)));
        let mut out = Array5::<f64>::zeros((b, c, 2 * o, m, n_kept + 1));
        if let Some(cross) = cross {
            out.slice_mut(s![.., .., ..o, ..2 * o, ..n_kept]).assign(cross);
        }
        out.slice_mut(s![.., .., ..o, ..5, n_kept]).assign(&lowpass_corr);
        Ok(out)
    }

    /// Shrinks the lowpass to the coarsest-scale grid, transposes it, and
    /// stacks the center with its four one-pixel circular shifts,
    /// `(b, c, w * h, 5)`.
    fn lowpass_shift_stack(&self, lowpass: &Array4<f64>) -> TexStatsResult<Array4<f64>> {
        let small = if self.n_scales == 1 {
            lowpass.clone()
        } else {
            let shrunk = signal::shrink(&lowpass.clone().into_dyn(), 1 << (self.n_scales - 1))?;
            shrunk
                .into_dimensionality()
                .map_err(|_| TexStatsError::UnexpectedShape {
                    context: "shrunk lowpass residual",
                    got: vec![],
                })?
        };
        let scale = 2f64.powi(self.n_scales as i32 - 2);
        let small = small.mapv(|v| v * scale);
        let transposed: Array4<f64> = small
            .permuted_axes([0, 1, 3, 2])
            .as_standard_layout()
            .to_owned();

        let (b, c, rows, cols) = transposed.dim();
        let shifts = [
            transposed.clone(),
            signal::roll_axis(&transposed, Axis(2), 1),
            signal::roll_axis(&transposed, Axis(2), -1),
            signal::roll_axis(&transposed, Axis(3), 1),
            signal::roll_axis(&transposed, Axis(3), -1),
        ];
        let mut out = Array4::<f64>::zeros((b, c, rows * cols, 5));
        for (k, shift) in shifts.iter().enumerate() {
            let flat = shift
                .clone()
                .into_shape_with_order((b, c, rows * cols))
                .expect("standard-layout reshape");
            out.slice_mut(s![.., .., .., k]).assign(&flat);
        }
        Ok(out)
    }

    /// `ch1^T @ ch2 / band_num_el` per batch and channel, with an optional
    /// global standard-deviation normalization.
    ///
    /// `ch1` is `(b, c, n, p)` and `ch2` is `(b, c, n, q)`; the result is
    /// `(b, c, p, q)`.
    fn matrix_crosscorrelation(
        &self,
        ch1: &ArrayView4<f64>,
        ch2: &ArrayView4<f64>,
        band_num_el: usize,
    ) -> Array4<f64> {
        let (b, c, n, p) = ch1.dim();
        let q = ch2.len_of(Axis(3));
        let norm = if self.true_correlations {
            band_num_el as f64
                * sample_std(ch1.iter().copied())
                * sample_std(ch2.iter().copied())
        } else {
            band_num_el as f64
        };
        let mut out = Array4::<f64>::zeros((b, c, p, q));
        for bi in 0..b {
            for ci in 0..c {
                for pi in 0..p {
                    for qi in 0..q {
                        let mut dot = 0.0;
                        for ni in 0..n {
                            dot += ch1[[bi, ci, ni, pi]] * ch2[[bi, ci, ni, qi]];
                        }
                        out[[bi, ci, pi, qi]] = dot / norm;
                    }
                }
            }
        }
        out
    }
}

/// Unbiased sample standard deviation over an iterator of values.
fn sample_std(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let mut n = 0usize;
    let mut sum = 0.0;
    for v in values.clone() {
        n += 1;
        sum += v;
    }
    if n < 2 {
        return 0.0;
    }
    let mean = sum / n as f64;
    let ss: f64 = values.map(|v| (v - mean) * (v - mean)).sum();
    (ss / (n - 1) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array6;

    #[test]
    fn self_correlation_diagonal_is_mean_square() {
        let mut x = Array6::<f64>::zeros((1, 1, 1, 2, 4, 4));
        x.slice_mut(s![0, 0, 0, 0, .., ..]).fill(2.0);
        x.slice_mut(s![0, 0, 0, 1, .., ..]).fill(-1.0);
        let engine = CrossCorrelationEngine::new(1, 2, false);
        let corr = engine.cross_correlation(&x, &x).unwrap();
        assert_eq!(corr.dim(), (1, 1, 2, 2, 1));
        assert!((corr[[0, 0, 0, 0, 0]] - 4.0).abs() < 1e-12);
        assert!((corr[[0, 0, 1, 1, 0]] - 1.0).abs() < 1e-12);
        assert!((corr[[0, 0, 0, 1, 0]] + 2.0).abs() < 1e-12);
    }

    #[test]
    fn double_phase_negates_real_and_keeps_imag() {
        let mut coeffs = Array6::<Complex64>::from_elem(
            (1, 1, 2, 1, 4, 4),
            Complex64::new(0.0, 0.0),
        );
        // scale 1, angle pi/4, magnitude sqrt(2): doubled angle is pi/2
        coeffs
            .slice_mut(s![0, 0, 1, 0, .., ..])
            .fill(Complex64::new(1.0, 1.0));
        let engine = CrossCorrelationEngine::new(2, 1, false);
        let (mags, separate) = engine.double_phase(&coeffs).unwrap();
        assert_eq!(mags.dim(), (1, 1, 1, 1, 4, 4));
        assert_eq!(separate.dim(), (1, 1, 1, 2, 4, 4));
        // constant magnitude demeans to zero
        assert!(mags[[0, 0, 0, 0, 0, 0]].abs() < 1e-12);
        // band 0 rescale factor is 2^-1
        assert!(separate[[0, 0, 0, 0, 0, 0]].abs() < 1e-12);
        assert!((separate[[0, 0, 0, 1, 0, 0]] - 2.0_f64.sqrt() * 0.5).abs() < 1e-12);
    }

    #[test]
    fn stitched_cross_orientation_block_is_padded_square() {
        let cross = Array5::<f64>::from_elem((1, 1, 2, 2, 2), 1.0);
        let lowpass = Array4::<f64>::from_elem((1, 1, 16, 16), 1.0);
        let engine = CrossCorrelationEngine::new(2, 2, false);
        let out = engine
            .stitch_lowpass_cross_orientation(&cross, &lowpass)
            .unwrap();
        assert_eq!(out.dim(), (1, 1, 5, 5, 3));
        // original correlations sit in the top-left corner of earlier scales
        assert_eq!(out[[0, 0, 0, 0, 0]], 1.0);
        // padding rows stay zero
        assert_eq!(out[[0, 0, 4, 4, 0]], 0.0);
    }

    #[test]
    fn stitched_cross_scale_block_shape() {
        let lowpass = Array4::<f64>::from_elem((1, 1, 16, 16), 0.5);
        let coarsest = Array5::<f64>::from_elem((1, 1, 3, 16, 16), 1.0);
        let cross = Array5::<f64>::zeros((1, 1, 3, 6, 1));
        let engine = CrossCorrelationEngine::new(2, 3, false);
        let out = engine
            .stitch_lowpass_cross_scale(Some(&cross), &lowpass, &coarsest)
            .unwrap();
        assert_eq!(out.dim(), (1, 1, 6, 6, 2));
    }

    #[test]
    fn single_scale_cross_scale_stitch() {
        let lowpass = Array4::<f64>::from_elem((1, 1, 8, 8), 0.5);
        let coarsest = Array5::<f64>::from_elem((1, 1, 2, 8, 8), 1.0);
        let engine = CrossCorrelationEngine::new(1, 2, false);
        let out = engine
            .stitch_lowpass_cross_scale(None, &lowpass, &coarsest)
            .unwrap();
        assert_eq!(out.dim(), (1, 1, 4, 5, 1));
    }
}
