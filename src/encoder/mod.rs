//! Portilla-Simoncelli texture statistic encoder.
//!
//! Summarizes an image batch as a fixed-order vector of statistics computed
//! over a complex steerable pyramid: pixel moments, coefficient magnitude
//! means, windowed autocorrelations, moments of partial reconstructions,
//! cross-orientation and cross-scale correlations, and the highpass residual
//! variance. Two images with the same statistic vector tend to be perceived
//! as the same texture, which is what makes the vector useful as a synthesis
//! target.

mod schema;

pub use schema::ScaleLabel;

use ndarray::{s, Array2, Array3, Array4, Array5, Array6, ArrayViewD, Axis, IxDyn};

use crate::autocorr::AutocorrelationEngine;
use crate::crosscorr::CrossCorrelationEngine;
use crate::pyramid::SteerablePyramid;
use crate::recon;
use crate::stats;
use crate::trace::{trace_event, trace_span};
use crate::util::{TexStatsError, TexStatsResult};

use schema::VectorLayout;

/// Model geometry and normalization options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortillaSimoncelliConfig {
    /// Spatial shape `(height, width)` the model is built for.
    pub image_shape: (usize, usize),
    /// Number of pyramid scales.
    pub n_scales: usize,
    /// Number of orientation bands per scale.
    pub n_orientations: usize,
    /// Side of the central autocorrelation window.
    pub spatial_corr_width: usize,
    /// Normalize correlations to true correlations and include the
    /// reconstructed standard deviations in the vector.
    pub use_true_correlations: bool,
}

impl PortillaSimoncelliConfig {
    /// Canonical geometry: 4 scales, 4 orientations, 9-wide windows, true
    /// correlations.
    pub fn new(image_shape: (usize, usize)) -> Self {
        Self {
            image_shape,
            n_scales: 4,
            n_orientations: 4,
            spatial_corr_width: 9,
            use_true_correlations: true,
        }
    }

    pub fn validate(&self) -> TexStatsResult<()> {
        let (h, w) = self.image_shape;
        if h == 0 || w == 0 {
            return Err(TexStatsError::InvalidConfig {
                reason: "image shape must be non-zero",
            });
        }
        if self.n_scales == 0 {
            return Err(TexStatsError::InvalidConfig {
                reason: "n_scales must be at least 1",
            });
        }
        if self.n_orientations == 0 {
            return Err(TexStatsError::InvalidConfig {
                reason: "n_orientations must be at least 1",
            });
        }
        if self.spatial_corr_width == 0 {
            return Err(TexStatsError::InvalidConfig {
                reason: "spatial_corr_width must be at least 1",
            });
        }
        // the coarsest reconstructed-lowpass band is shrunk by 2^n_scales,
        // which needs one more factor of two on top of that
        let factor = 1usize << (self.n_scales + 1);
        if h % factor != 0 || w % factor != 0 {
            return Err(TexStatsError::InvalidConfig {
                reason: "image dims must be divisible by 2^(n_scales + 1)",
            });
        }
        let coarsest = h.min(w) >> self.n_scales;
        if self.spatial_corr_width > coarsest {
            return Err(TexStatsError::InvalidConfig {
                reason: "spatial_corr_width exceeds the coarsest band resolution",
            });
        }
        Ok(())
    }

    fn layout(&self) -> VectorLayout {
        VectorLayout {
            n_scales: self.n_scales,
            n_orientations: self.n_orientations,
            spatial_corr_width: self.spatial_corr_width,
            true_correlations: self.use_true_correlations,
        }
    }
}

/// Statistic blocks in dictionary form, easier to inspect than the vector.
///
/// Every field keeps the exact tensor the vector is flattened from,
/// zero-padding included, so converting back to a vector is lossless.
#[derive(Debug, Clone, PartialEq)]
pub struct PsStatistics {
    /// Mean, variance, skewness, kurtosis, min, max of the pixels,
    /// `(b, c, 6)`.
    pub pixel_statistics: Array3<f64>,
    /// Mean coefficient magnitude per band, `(b, c, n_scales *
    /// n_orientations + 2)`; highpass first, lowpass last.
    pub magnitude_means: Array3<f64>,
    /// `(b, c, width, width, n_scales, n_orientations)`.
    pub auto_correlation_magnitude: Array6<f64>,
    /// `(b, c, n_scales + 1)`.
    pub skew_reconstructed: Array3<f64>,
    /// `(b, c, n_scales + 1)`.
    pub kurtosis_reconstructed: Array3<f64>,
    /// `(b, c, width, width, n_scales + 1)`.
    pub auto_correlation_reconstructed: Array5<f64>,
    /// `(b, c, n_scales + 1)`; present only with true correlations.
    pub std_reconstructed: Option<Array3<f64>>,
    /// `(b, c, n_orientations, n_orientations, n_scales + 1)`; the last
    /// scale slice is zero.
    pub cross_orientation_correlation_magnitude: Array5<f64>,
    /// `(b, c, n_orientations, n_orientations, n_scales)`; the last scale
    /// slice is zero.
    pub cross_scale_correlation_magnitude: Array5<f64>,
    /// `(b, c, m, m, n_scales + 1)` with `m = max(2 * n_orientations, 5)`.
    pub cross_orientation_correlation_real: Array5<f64>,
    /// `(b, c, 2 * n_orientations, m, n_scales)`.
    pub cross_scale_correlation_real: Array5<f64>,
    /// `(b, c)`.
    pub var_highpass_residual: Array2<f64>,
}

/// The texture statistic encoder, generic over the pyramid collaborator.
#[derive(Debug)]
pub struct PortillaSimoncelli<P> {
    config: PortillaSimoncelliConfig,
    pyramid: P,
    autocorr: AutocorrelationEngine,
    crosscorr: CrossCorrelationEngine,
    scales: Vec<ScaleLabel>,
    representation_scales: Vec<ScaleLabel>,
}

impl<P: SteerablePyramid> PortillaSimoncelli<P> {
    pub fn new(config: PortillaSimoncelliConfig, pyramid: P) -> TexStatsResult<Self> {
        config.validate()?;
        if pyramid.n_scales() != config.n_scales
            || pyramid.n_orientations() != config.n_orientations
        {
            return Err(TexStatsError::PyramidContract {
                context: "pyramid geometry must match the model configuration",
            });
        }
        let mut scales = vec![ScaleLabel::PixelStatistics, ScaleLabel::ResidualLowpass];
        scales.extend((0..config.n_scales).rev().map(ScaleLabel::Scale));
        scales.push(ScaleLabel::ResidualHighpass);
        let representation_scales = config.layout().labels();
        Ok(Self {
            config,
            pyramid,
            autocorr: AutocorrelationEngine::new(
                config.spatial_corr_width,
                config.use_true_correlations,
            ),
            crosscorr: CrossCorrelationEngine::new(
                config.n_scales,
                config.n_orientations,
                config.use_true_correlations,
            ),
            scales,
            representation_scales,
        })
    }

    pub fn config(&self) -> &PortillaSimoncelliConfig {
        &self.config
    }

    /// Scale groups available for masking, coarse to fine.
    pub fn scales(&self) -> &[ScaleLabel] {
        &self.scales
    }

    /// Scale label of every element of the full representation vector.
    pub fn representation_scales(&self) -> &[ScaleLabel] {
        &self.representation_scales
    }

    /// Length of the full representation vector.
    pub fn representation_len(&self) -> usize {
        self.representation_scales.len()
    }

    /// Computes the representation vector, `(batch, channel, stats)`.
    ///
    /// With `scales`, only statistics whose label is in the list are kept;
    /// such subsetted vectors cannot be converted back to dictionary form.
    pub fn forward(
        &self,
        image: &Array4<f64>,
        scales: Option<&[ScaleLabel]>,
    ) -> TexStatsResult<Array3<f64>> {
        let stats = self.statistics(image)?;
        let vec = self.convert_to_vector(&stats);
        match scales {
            Some(keep) => Ok(self.remove_scales(&vec, keep)),
            None => Ok(vec),
        }
    }

    /// Computes the full statistic set in dictionary form.
    pub fn statistics(&self, image: &Array4<f64>) -> TexStatsResult<PsStatistics> {
        let _span = trace_span!("portilla_simoncelli_forward").entered();
        let (b, c, h, w) = image.dim();
        if (h, w) != self.config.image_shape {
            return Err(TexStatsError::InvalidImageShape {
                expected_h: self.config.image_shape.0,
                expected_w: self.config.image_shape.1,
                got: image.shape().to_vec(),
            });
        }
        let ns = self.config.n_scales;
        let no = self.config.n_orientations;

        let bands = self.pyramid.forward(image)?;
        bands.validate(ns, no, h, w)?;
        let oriented = bands.oriented;
        let highpass = bands.highpass;
        let mut lowpass = bands.lowpass;
        demean_spatial(&mut lowpass);

        // pixel statistics
        let image_dyn = image.clone().into_dyn();
        let pix_mean = stats::mean(&image_dyn)?;
        let pix_var = stats::variance(&image_dyn, Some(&pix_mean))?;
        let pix_skew = stats::skewness(&image_dyn, Some(&pix_mean), &pix_var)?;
        let pix_kurt = stats::kurtosis(&image_dyn, Some(&pix_mean), &pix_var)?;
        let pix_min = stats::min(&image_dyn)?;
        let pix_max = stats::max(&image_dyn)?;
        let mut pixel_statistics = Array3::<f64>::zeros((b, c, 6));
        for bi in 0..b {
            for ci in 0..c {
                let idx = [bi, ci];
                pixel_statistics[[bi, ci, 0]] = pix_mean[idx];
                pixel_statistics[[bi, ci, 1]] = pix_var[idx];
                pixel_statistics[[bi, ci, 2]] = pix_skew[idx];
                pixel_statistics[[bi, ci, 3]] = pix_kurt[idx];
                pixel_statistics[[bi, ci, 4]] = pix_min[idx];
                pixel_statistics[[bi, ci, 5]] = pix_max[idx];
            }
        }

        // demeaned coefficient magnitudes, real parts, and the mean
        // magnitudes (rescaled to the down-sampled convention)
        let mut mags = oriented.mapv(|z| z.norm());
        let real = oriented.mapv(|z| z.re);
        let n_spatial = (h * w) as f64;
        let mut magnitude_means = Array3::<f64>::zeros((b, c, ns * no + 2));
        for bi in 0..b {
            for ci in 0..c {
                let hp_mean = highpass
                    .slice(s![bi, ci, .., ..])
                    .iter()
                    .map(|v| v.abs())
                    .sum::<f64>()
                    / n_spatial;
                magnitude_means[[bi, ci, 0]] = hp_mean;
                for si in 0..ns {
                    for oi in 0..no {
                        let mut band = mags.slice_mut(s![bi, ci, si, oi, .., ..]);
                        let mean = band.sum() / n_spatial;
                        band.mapv_inplace(|v| v - mean);
                        magnitude_means[[bi, ci, 1 + si * no + oi]] =
                            mean * 2f64.powi(si as i32);
                    }
                }
                let lp_mean = lowpass
                    .slice(s![bi, ci, .., ..])
                    .iter()
                    .map(|v| v.abs())
                    .sum::<f64>()
                    / n_spatial;
                magnitude_means[[bi, ci, 1 + ns * no]] = lp_mean * 2f64.powi(ns as i32);
            }
        }

        // partial reconstructions and their statistics
        let reconstructed =
            recon::reconstruct_lowpass_at_each_scale(&self.pyramid, &real, &highpass, &lowpass)?;
        let (auto_correlation_magnitude, _) = self.autocorr.oriented_bands(&mags)?;
        let (auto_correlation_reconstructed, var_recon) =
            self.autocorr.scale_bands(&reconstructed)?;

        let recon_dyn = reconstructed.into_dyn();
        let var_recon_dyn = var_recon.clone().into_dyn();
        let mut skew_recon = stats::skewness(&recon_dyn, None, &var_recon_dyn)?;
        let mut kurtosis_recon = stats::kurtosis(&recon_dyn, None, &var_recon_dyn)?;
        stats::stabilize_skew_kurtosis(
            &mut skew_recon,
            &mut kurtosis_recon,
            &var_recon_dyn,
            &pix_var,
        )?;
        let skew_reconstructed = to_array3(&skew_recon.view())?;
        let kurtosis_reconstructed = to_array3(&kurtosis_recon.view())?;

        // rescale the variances to the down-sampled convention before taking
        // standard deviations (skew and kurtosis are scale-free)
        let std_reconstructed = if self.config.use_true_correlations {
            let mut std = var_recon;
            for i in 0..ns + 1 {
                let factor = 4f64.powi(2 * i as i32);
                std.slice_mut(s![.., .., i])
                    .mapv_inplace(|v| (v * factor).sqrt());
            }
            Some(std)
        } else {
            None
        };

        // cross-orientation correlations
        let cross_ori_mags = self.crosscorr.cross_correlation(&mags, &mags)?;
        let cross_orientation_correlation_magnitude = append_zero_scale(&cross_ori_mags);
        let cross_ori_real = self.crosscorr.cross_correlation(&real, &real)?;
        let cross_orientation_correlation_real = self
            .crosscorr
            .stitch_lowpass_cross_orientation(&cross_ori_real, &lowpass)?;

        // cross-scale correlations against the phase-doubled coarser bands
        let (cross_scale_correlation_magnitude, cross_scale_raw) = if ns > 1 {
            let (dp_mags, dp_sep) = self.crosscorr.double_phase(&oriented)?;
            let fine_mags = mags.slice(s![.., .., ..ns - 1, .., .., ..]).to_owned();
            let fine_real = real.slice(s![.., .., ..ns - 1, .., .., ..]).to_owned();
            let cs_mags = self.crosscorr.cross_correlation(&fine_mags, &dp_mags)?;
            let cs_real = self.crosscorr.cross_correlation(&fine_real, &dp_sep)?;
            (append_zero_scale(&cs_mags), Some(cs_real))
        } else {
            (Array5::<f64>::zeros((b, c, no, no, 1)), None)
        };
        let coarsest_real = real.slice(s![.., .., ns - 1, .., .., ..]).to_owned();
        let cross_scale_correlation_real = self.crosscorr.stitch_lowpass_cross_scale(
            cross_scale_raw.as_ref(),
            &lowpass,
            &coarsest_real,
        )?;

        let mut var_highpass_residual = Array2::<f64>::zeros((b, c));
        for bi in 0..b {
            for ci in 0..c {
                var_highpass_residual[[bi, ci]] = highpass
                    .slice(s![bi, ci, .., ..])
                    .iter()
                    .map(|v| v * v)
                    .sum::<f64>()
                    / n_spatial;
            }
        }

        trace_event!(
            "statistics_computed",
            batch = b,
            channels = c,
            vector_len = self.representation_scales.len()
        );
        Ok(PsStatistics {
            pixel_statistics,
            magnitude_means,
            auto_correlation_magnitude,
            skew_reconstructed,
            kurtosis_reconstructed,
            auto_correlation_reconstructed,
            std_reconstructed,
            cross_orientation_correlation_magnitude,
            cross_scale_correlation_magnitude,
            cross_orientation_correlation_real,
            cross_scale_correlation_real,
            var_highpass_residual,
        })
    }

    /// Flattens the dictionary form into the fixed-order vector.
    pub fn convert_to_vector(&self, stats: &PsStatistics) -> Array3<f64> {
        let (b, c, _) = stats.pixel_statistics.dim();
        let mut out = Array3::<f64>::zeros((b, c, self.representation_len()));
        let mut offset = 0;
        let mut push = |out: &mut Array3<f64>, block: ArrayViewD<f64>| {
            let len = block.len() / (b * c);
            let flat = block
                .to_owned()
                .into_shape_with_order((b, c, len))
                .expect("standard-layout reshape");
            out.slice_mut(s![.., .., offset..offset + len]).assign(&flat);
            offset += len;
        };
        push(&mut out, stats.pixel_statistics.view().into_dyn());
        push(&mut out, stats.magnitude_means.view().into_dyn());
        push(&mut out, stats.auto_correlation_magnitude.view().into_dyn());
        push(&mut out, stats.skew_reconstructed.view().into_dyn());
        push(&mut out, stats.kurtosis_reconstructed.view().into_dyn());
        push(
            &mut out,
            stats.auto_correlation_reconstructed.view().into_dyn(),
        );
        if let Some(std) = &stats.std_reconstructed {
            push(&mut out, std.view().into_dyn());
        }
        push(
            &mut out,
            stats
                .cross_orientation_correlation_magnitude
                .view()
                .into_dyn(),
        );
        push(
            &mut out,
            stats.cross_scale_correlation_magnitude.view().into_dyn(),
        );
        push(
            &mut out,
            stats.cross_orientation_correlation_real.view().into_dyn(),
        );
        push(
            &mut out,
            stats.cross_scale_correlation_real.view().into_dyn(),
        );
        push(&mut out, stats.var_highpass_residual.view().into_dyn());
        debug_assert_eq!(offset, self.representation_len());
        out
    }

    /// Recovers the dictionary form from a full representation vector.
    ///
    /// Fails with [`TexStatsError::RepresentationLength`] when the vector was
    /// subsetted by scale.
    pub fn convert_to_dict(&self, vec: &Array3<f64>) -> TexStatsResult<PsStatistics> {
        let (b, c, len) = vec.dim();
        if len != self.representation_len() {
            return Err(TexStatsError::RepresentationLength {
                expected: self.representation_len(),
                got: len,
            });
        }
        let ns = self.config.n_scales;
        let no = self.config.n_orientations;
        let scw = self.config.spatial_corr_width;
        let m = self.config.layout().stitched_dim();

        let mut offset = 0;
        let mut take = |shape: &[usize]| {
            let n: usize = shape.iter().product();
            let mut full = vec![b, c];
            full.extend_from_slice(shape);
            let block = vec
                .slice(s![.., .., offset..offset + n])
                .to_owned()
                .into_shape_with_order(IxDyn(&full))
                .expect("block length matches target shape");
            offset += n;
            block
        };

        let pixel_statistics = take(&[6]);
        let magnitude_means = take(&[ns * no + 2]);
        let auto_correlation_magnitude = take(&[scw, scw, ns, no]);
        let skew_reconstructed = take(&[ns + 1]);
        let kurtosis_reconstructed = take(&[ns + 1]);
        let auto_correlation_reconstructed = take(&[scw, scw, ns + 1]);
        let std_reconstructed = if self.config.use_true_correlations {
            Some(take(&[ns + 1]))
        } else {
            None
        };
        let cross_orientation_correlation_magnitude = take(&[no, no, ns + 1]);
        let cross_scale_correlation_magnitude = take(&[no, no, ns]);
        let cross_orientation_correlation_real = take(&[m, m, ns + 1]);
        let cross_scale_correlation_real = take(&[2 * no, m, ns]);
        let var_highpass_residual = take(&[1]);

        Ok(PsStatistics {
            pixel_statistics: to_fixed(pixel_statistics)?,
            magnitude_means: to_fixed(magnitude_means)?,
            auto_correlation_magnitude: to_fixed(auto_correlation_magnitude)?,
            skew_reconstructed: to_fixed(skew_reconstructed)?,
            kurtosis_reconstructed: to_fixed(kurtosis_reconstructed)?,
            auto_correlation_reconstructed: to_fixed(auto_correlation_reconstructed)?,
            std_reconstructed: std_reconstructed.map(to_fixed).transpose()?,
            cross_orientation_correlation_magnitude: to_fixed(
                cross_orientation_correlation_magnitude,
            )?,
            cross_scale_correlation_magnitude: to_fixed(cross_scale_correlation_magnitude)?,
            cross_orientation_correlation_real: to_fixed(cross_orientation_correlation_real)?,
            cross_scale_correlation_real: to_fixed(cross_scale_correlation_real)?,
            var_highpass_residual: to_fixed::<ndarray::Ix3>(var_highpass_residual)?
                .index_axis(Axis(2), 0)
                .to_owned(),
        })
    }

    /// Keeps only the statistics whose scale label appears in `scales_to_keep`.
    ///
    /// Labels not present in the representation are inert.
    pub fn remove_scales(&self, vec: &Array3<f64>, scales_to_keep: &[ScaleLabel]) -> Array3<f64> {
        let indices: Vec<usize> = self
            .representation_scales
            .iter()
            .enumerate()
            .filter(|(_, label)| scales_to_keep.contains(label))
            .map(|(i, _)| i)
            .collect();
        vec.select(Axis(2), &indices)
    }
}

/// Appends an all-zero scale slice along the trailing axis.
fn append_zero_scale(x: &Array5<f64>) -> Array5<f64> {
    let (b, c, o1, o2, s) = x.dim();
    let mut out = Array5::<f64>::zeros((b, c, o1, o2, s + 1));
    out.slice_mut(s![.., .., .., .., ..s]).assign(x);
    out
}

fn demean_spatial(x: &mut Array4<f64>) {
    let (b, c, h, w) = x.dim();
    let n = (h * w) as f64;
    for bi in 0..b {
        for ci in 0..c {
            let mut band = x.slice_mut(s![bi, ci, .., ..]);
            let mean = band.sum() / n;
            band.mapv_inplace(|v| v - mean);
        }
    }
}

fn to_array3(x: &ArrayViewD<f64>) -> TexStatsResult<Array3<f64>> {
    x.to_owned()
        .into_dimensionality()
        .map_err(|_| TexStatsError::UnexpectedShape {
            context: "statistic block rank",
            got: x.shape().to_vec(),
        })
}

fn to_fixed<D: ndarray::Dimension>(
    x: ndarray::ArrayD<f64>,
) -> TexStatsResult<ndarray::Array<f64, D>> {
    let shape = x.shape().to_vec();
    x.into_dimensionality()
        .map_err(|_| TexStatsError::UnexpectedShape {
            context: "statistic block rank",
            got: shape,
        })
}
