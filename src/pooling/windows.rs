//! Per-scale pooling window tensors and the pooling operators.

use ndarray::{s, Array1, Array3, Array4, Array5, Axis};

use crate::trace::{trace_event, trace_span};
use crate::util::{TexStatsError, TexStatsResult};

use super::{
    angular_n_windows, angular_window_width, create_pooling_windows,
    eccentricity_window_width_from_scaling, window_widths_actual, WindowWidths,
    RADIAL_TO_CIRCUMFERENTIAL_RATIO,
};

/// A set of pooling windows sized for every scale of a pyramid.
///
/// Windows are generated on the log-polar sample grid, projected into
/// cartesian image space (so each window weights an annular sector around
/// the image center), built square at the larger image dimension, and
/// cropped down to each scale's resolution, `ceil(res / 2^scale)`, so they
/// line up with down-sampled pyramid coefficients. The per-window divisor
/// used by [`pool`](PoolingWindows::pool) is cached at construction, with
/// zero-weight windows dividing by 1 so their pooled value is 0 rather
/// than NaN.
#[derive(Debug)]
pub struct PoolingWindows {
    scaling: f64,
    min_eccentricity: f64,
    max_eccentricity: f64,
    transition_region_width: f64,
    windows: Vec<Array3<f64>>,
    divisors: Vec<Array1<f64>>,
    n_polar_windows: usize,
    n_eccentricity_bands: usize,
    window_width_degrees: WindowWidths,
    window_width_pixels: Vec<WindowWidths>,
}

impl PoolingWindows {
    pub fn new(
        scaling: f64,
        img_res: (usize, usize),
        min_eccentricity: f64,
        max_eccentricity: f64,
        num_scales: usize,
        transition_region_width: f64,
    ) -> TexStatsResult<Self> {
        let _span = trace_span!("pooling_windows_new").entered();
        if !(scaling.is_finite() && scaling > 0.0) {
            return Err(TexStatsError::InvalidConfig {
                reason: "scaling must be positive and finite",
            });
        }
        if !(min_eccentricity > 0.0 && max_eccentricity > min_eccentricity) {
            return Err(TexStatsError::InvalidConfig {
                reason: "eccentricities must satisfy 0 < min < max",
            });
        }
        if num_scales == 0 {
            return Err(TexStatsError::InvalidConfig {
                reason: "num_scales must be at least 1",
            });
        }
        if img_res.0 == 0 || img_res.1 == 0 {
            return Err(TexStatsError::InvalidConfig {
                reason: "image resolution must be non-zero",
            });
        }

        // non-square images get square windows cropped down afterwards
        let window_res = img_res.0.max(img_res.1);
        let ecc_width = eccentricity_window_width_from_scaling(scaling);
        let n_polar =
            angular_n_windows(ecc_width / RADIAL_TO_CIRCUMFERENTIAL_RATIO).round() as usize;
        let window_width_degrees = window_widths_actual(
            angular_window_width(n_polar as f64),
            ecc_width,
            min_eccentricity,
            max_eccentricity,
            transition_region_width,
        );

        let mut windows = Vec::with_capacity(num_scales);
        let mut divisors = Vec::with_capacity(num_scales);
        let mut window_width_pixels = Vec::with_capacity(num_scales);
        for scale in 0..num_scales {
            let scaled_res = window_res.div_ceil(1 << scale);
            let mut win = create_pooling_windows(
                scaling,
                min_eccentricity,
                max_eccentricity,
                transition_region_width,
                scaled_res,
                scaled_res,
            )?;
            win.mapv_inplace(|v| if v.is_nan() { 0.0 } else { v });
            let mut win = project_polar_to_cartesian(&win);

            // window_res = max(h, w), so at most one axis needs cropping
            debug_assert!(img_res.0 == window_res || img_res.1 == window_res);
            if img_res.0 != window_res {
                let (lo, hi) = slice_vals(scaled_res, img_res.0, scale);
                win = win.slice(s![.., lo..hi, ..]).to_owned();
            } else if img_res.1 != window_res {
                let (lo, hi) = slice_vals(scaled_res, img_res.1, scale);
                win = win.slice(s![.., .., lo..hi]).to_owned();
            }

            let mut divisor = win.sum_axis(Axis(2)).sum_axis(Axis(1));
            divisor.mapv_inplace(|v| if v == 0.0 { 1.0 } else { v });

            // degrees to pixels: radius in pixels over radius in degrees
            let deg_to_pix = (img_res.0 as f64 / 2f64.powi(scale as i32 + 1)) / max_eccentricity;
            window_width_pixels.push(window_width_degrees.scaled(deg_to_pix));
            windows.push(win);
            divisors.push(divisor);
        }
        let n_eccentricity_bands = windows[0].len_of(Axis(0)) / n_polar;
        trace_event!(
            "pooling_windows_built",
            n_windows = windows[0].len_of(Axis(0)),
            scales = num_scales
        );

        Ok(Self {
            scaling,
            min_eccentricity,
            max_eccentricity,
            transition_region_width,
            windows,
            divisors,
            n_polar_windows: n_polar,
            n_eccentricity_bands,
            window_width_degrees,
            window_width_pixels,
        })
    }

    pub fn scaling(&self) -> f64 {
        self.scaling
    }

    pub fn min_eccentricity(&self) -> f64 {
        self.min_eccentricity
    }

    pub fn max_eccentricity(&self) -> f64 {
        self.max_eccentricity
    }

    pub fn transition_region_width(&self) -> f64 {
        self.transition_region_width
    }

    /// Number of scales the windows were built for.
    pub fn n_scales(&self) -> usize {
        self.windows.len()
    }

    /// Number of windows per eccentricity ring.
    pub fn n_polar_windows(&self) -> usize {
        self.n_polar_windows
    }

    /// Number of eccentricity rings.
    pub fn n_eccentricity_bands(&self) -> usize {
        self.n_eccentricity_bands
    }

    /// Realized window widths in degrees.
    pub fn window_width_degrees(&self) -> &WindowWidths {
        &self.window_width_degrees
    }

    /// Realized window widths in pixels, one entry per scale.
    pub fn window_width_pixels(&self) -> &[WindowWidths] {
        &self.window_width_pixels
    }

    /// The window tensor for one scale, `(n_windows, h, w)`.
    pub fn windows(&self, scale: usize) -> TexStatsResult<&Array3<f64>> {
        self.windows
            .get(scale)
            .ok_or(TexStatsError::ScaleOutOfBounds {
                index: scale,
                len: self.windows.len(),
            })
    }

    /// Multiplies the input by every window,
    /// `(b, c, h, w) -> (b, c, n_windows, h, w)`.
    pub fn window(&self, x: &Array4<f64>, scale: usize) -> TexStatsResult<Array5<f64>> {
        let win = self.windows(scale)?;
        let (n, wh, ww) = win.dim();
        let (b, c, h, w) = x.dim();
        if (h, w) != (wh, ww) {
            return Err(TexStatsError::InvalidImageShape {
                expected_h: wh,
                expected_w: ww,
                got: x.shape().to_vec(),
            });
        }
        let mut out = Array5::<f64>::zeros((b, c, n, h, w));
        for bi in 0..b {
            for ci in 0..c {
                for ni in 0..n {
                    for hi in 0..h {
                        for wi in 0..w {
                            out[[bi, ci, ni, hi, wi]] =
                                x[[bi, ci, hi, wi]] * win[[ni, hi, wi]];
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// Sums a windowed input over space and divides by each window's weight,
    /// `(b, c, n_windows, h, w) -> (b, c, n_windows)`.
    pub fn pool(&self, windowed: &Array5<f64>, scale: usize) -> TexStatsResult<Array3<f64>> {
        let divisor = self
            .divisors
            .get(scale)
            .ok_or(TexStatsError::ScaleOutOfBounds {
                index: scale,
                len: self.divisors.len(),
            })?;
        let (b, c, n, _, _) = windowed.dim();
        if n != divisor.len() {
            return Err(TexStatsError::UnexpectedShape {
                context: "windowed input window count",
                got: windowed.shape().to_vec(),
            });
        }
        let mut out = Array3::<f64>::zeros((b, c, n));
        for bi in 0..b {
            for ci in 0..c {
                for ni in 0..n {
                    out[[bi, ci, ni]] =
                        windowed.slice(s![bi, ci, ni, .., ..]).sum() / divisor[ni];
                }
            }
        }
        Ok(out)
    }

    /// Windows and pools in one step, the weighted average under each window.
    pub fn forward(&self, x: &Array4<f64>, scale: usize) -> TexStatsResult<Array3<f64>> {
        let windowed = self.window(x, scale)?;
        self.pool(&windowed, scale)
    }
}

/// Resamples every window from the (eccentricity, theta) grid onto a square
/// cartesian grid of the same resolution, one bilinear lookup per pixel.
///
/// Eccentricity rows span `[0, max_ecc]` linearly and the cartesian radius
/// `res / 2` pixels corresponds to `max_ecc`, so a pixel's radius maps
/// straight onto the row coordinate; its polar angle maps onto the column
/// coordinate. Pixels beyond the outermost eccentricity row get zero weight.
fn project_polar_to_cartesian(polar: &Array3<f64>) -> Array3<f64> {
    use std::f64::consts::PI;
    let (n, n_ecc, n_theta) = polar.dim();
    // square construction keeps both step counts equal to the resolution
    let res = n_ecc;
    let center = (res as f64 - 1.0) / 2.0;
    let max_radius = res as f64 / 2.0;
    let mut out = Array3::<f64>::zeros((n, res, res));
    for yi in 0..res {
        for xi in 0..res {
            let dy = yi as f64 - center;
            let dx = xi as f64 - center;
            let ecc_pos = (dx * dx + dy * dy).sqrt() / max_radius * (n_ecc - 1) as f64;
            if ecc_pos > (n_ecc - 1) as f64 {
                continue;
            }
            let mut theta = dy.atan2(dx);
            if theta < 0.0 {
                theta += 2.0 * PI;
            }
            let theta_pos = theta / (2.0 * PI) * (n_theta - 1) as f64;

            let e0 = ecc_pos.floor() as usize;
            let e1 = (e0 + 1).min(n_ecc - 1);
            let t0 = theta_pos.floor() as usize;
            let t1 = (t0 + 1).min(n_theta - 1);
            let ef = ecc_pos - e0 as f64;
            let tf = theta_pos - t0 as f64;
            for ni in 0..n {
                out[[ni, yi, xi]] = (1.0 - ef) * (1.0 - tf) * polar[[ni, e0, t0]]
                    + (1.0 - ef) * tf * polar[[ni, e0, t1]]
                    + ef * (1.0 - tf) * polar[[ni, e1, t0]]
                    + ef * tf * polar[[ni, e1, t1]];
            }
        }
    }
    out
}

/// Crop bounds that recover `ceil(img_res / 2^scale)` samples from the
/// center of a larger square window grid.
fn slice_vals(scaled_window_res: usize, img_res: usize, scale: usize) -> (usize, usize) {
    let target = img_res.div_ceil(1 << scale);
    let sv = (scaled_window_res as f64 - target as f64) / 2.0;
    (sv.floor() as usize, scaled_window_res - sv.ceil() as usize)
}
