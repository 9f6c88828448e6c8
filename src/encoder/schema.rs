//! Wire format of the statistic vector.
//!
//! The representation vector is a fixed-order concatenation of statistic
//! blocks, each flattened row-major with the scale axis trailing. This module
//! is the single source of truth for that layout: block lengths, offsets, and
//! the per-element scale labels used for coarse-to-fine masking.

use std::fmt;

/// Scale association of one statistic in the representation vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScaleLabel {
    /// Statistics of the raw pixel values.
    PixelStatistics,
    /// Statistics of the lowpass residual.
    ResidualLowpass,
    /// Statistics of the highpass residual.
    ResidualHighpass,
    /// Statistics tied to one pyramid scale (0 is the finest).
    Scale(usize),
}

impl fmt::Display for ScaleLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleLabel::PixelStatistics => write!(f, "pixel_statistics"),
            ScaleLabel::ResidualLowpass => write!(f, "residual_lowpass"),
            ScaleLabel::ResidualHighpass => write!(f, "residual_highpass"),
            ScaleLabel::Scale(s) => write!(f, "{s}"),
        }
    }
}

/// Geometry of the statistic vector for one model configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct VectorLayout {
    pub n_scales: usize,
    pub n_orientations: usize,
    pub spatial_corr_width: usize,
    pub true_correlations: bool,
}

impl VectorLayout {
    /// Side length of the stitched real-correlation blocks.
    pub fn stitched_dim(&self) -> usize {
        (2 * self.n_orientations).max(5)
    }

    pub fn magnitude_means_len(&self) -> usize {
        self.n_scales * self.n_orientations + 2
    }

    /// Total length of the full (unmasked) representation vector.
    pub fn total_len(&self) -> usize {
        let (ns, no) = (self.n_scales, self.n_orientations);
        let scw2 = self.spatial_corr_width * self.spatial_corr_width;
        let m = self.stitched_dim();
        let mut len = 6
            + self.magnitude_means_len()
            + scw2 * ns * no
            + 2 * (ns + 1)
            + scw2 * (ns + 1)
            + no * no * (ns + 1)
            + no * no * ns
            + m * m * (ns + 1)
            + 2 * no * m * ns
            + 1;
        if self.true_correlations {
            len += ns + 1;
        }
        len
    }

    /// Scale label of every element of the representation vector, in order.
    pub fn labels(&self) -> Vec<ScaleLabel> {
        let (ns, no) = (self.n_scales, self.n_orientations);
        let scw2 = self.spatial_corr_width * self.spatial_corr_width;
        let m = self.stitched_dim();

        let scales: Vec<ScaleLabel> = (0..ns).map(ScaleLabel::Scale).collect();
        let mut scales_with_lowpass = scales.clone();
        scales_with_lowpass.push(ScaleLabel::ResidualLowpass);
        let scales_by_ori: Vec<ScaleLabel> = (0..ns)
            .flat_map(|s| std::iter::repeat(ScaleLabel::Scale(s)).take(no))
            .collect();

        let mut labels = Vec::with_capacity(self.total_len());
        labels.extend(std::iter::repeat(ScaleLabel::PixelStatistics).take(6));

        // magnitude_means
        labels.push(ScaleLabel::ResidualHighpass);
        labels.extend(&scales_by_ori);
        labels.push(ScaleLabel::ResidualLowpass);

        // auto_correlation_magnitude: scale and orientation trail, so the
        // per-band label sequence repeats once per window position
        for _ in 0..scw2 {
            labels.extend(&scales_by_ori);
        }

        // skew_reconstructed and kurtosis_reconstructed
        labels.extend(&scales_with_lowpass);
        labels.extend(&scales_with_lowpass);

        // auto_correlation_reconstructed
        for _ in 0..scw2 {
            labels.extend(&scales_with_lowpass);
        }

        if self.true_correlations {
            // std_reconstructed
            labels.extend(&scales_with_lowpass);
        }

        // cross_orientation_correlation_magnitude
        for _ in 0..no * no {
            labels.extend(&scales_with_lowpass);
        }
        // cross_scale_correlation_magnitude
        for _ in 0..no * no {
            labels.extend(&scales);
        }
        // cross_orientation_correlation_real
        for _ in 0..m * m {
            labels.extend(&scales_with_lowpass);
        }
        // cross_scale_correlation_real
        for _ in 0..2 * no * m {
            labels.extend(&scales);
        }

        // var_highpass_residual
        labels.push(ScaleLabel::ResidualHighpass);

        debug_assert_eq!(labels.len(), self.total_len());
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_count_matches_closed_form_length() {
        for ns in 1..=4 {
            for no in [2, 3, 4] {
                for scw in [3, 5, 7, 9] {
                    for tc in [false, true] {
                        let layout = VectorLayout {
                            n_scales: ns,
                            n_orientations: no,
                            spatial_corr_width: scw,
                            true_correlations: tc,
                        };
                        assert_eq!(layout.labels().len(), layout.total_len());
                    }
                }
            }
        }
    }

    #[test]
    fn default_geometry_vector_length() {
        let layout = VectorLayout {
            n_scales: 4,
            n_orientations: 4,
            spatial_corr_width: 9,
            true_correlations: true,
        };
        // 6 + 18 + 1296 + 10 + 405 + 5 + 80 + 64 + 320 + 256 + 1
        assert_eq!(layout.total_len(), 2461);
    }

    #[test]
    fn labels_start_with_pixel_statistics_and_end_with_highpass() {
        let layout = VectorLayout {
            n_scales: 2,
            n_orientations: 2,
            spatial_corr_width: 3,
            true_correlations: false,
        };
        let labels = layout.labels();
        assert_eq!(labels[0], ScaleLabel::PixelStatistics);
        assert_eq!(labels[5], ScaleLabel::PixelStatistics);
        assert_eq!(labels[6], ScaleLabel::ResidualHighpass);
        assert_eq!(*labels.last().unwrap(), ScaleLabel::ResidualHighpass);
    }
}
