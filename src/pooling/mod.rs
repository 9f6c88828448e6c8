//! Log-polar pooling windows.
//!
//! Raised-cosine windows tiling the visual field, log-spaced in eccentricity
//! and even in polar angle, after Freeman & Simoncelli's metamer windows.
//! This module holds the closed-form window math and the 1-d/2-d window
//! generators; [`windows::PoolingWindows`] packages per-scale window tensors
//! with the pooling operators.
//!
//! The 1-d generators keep NaN for samples outside a window's support, and
//! rows that are NaN everywhere are dropped. When the per-scale tensors are
//! assembled, NaNs become zero weight and each window is projected from the
//! (eccentricity, theta) grid into cartesian image space, so the pooling
//! operators average annular image regions.

mod windows;

pub use windows::PoolingWindows;

use ndarray::{Array2, Array3, Array4};

use crate::signal;
use crate::util::{TexStatsError, TexStatsResult};

/// Radial-to-circumferential width ratio used for the paper's windows.
pub const RADIAL_TO_CIRCUMFERENTIAL_RATIO: f64 = 2.0;

/// Width of a polar-angle window packing `n_windows` into the circle.
pub fn angular_window_width(n_windows: f64) -> f64 {
    2.0 * std::f64::consts::PI / n_windows
}

/// Number of polar-angle windows of a given width that fit in the circle.
pub fn angular_n_windows(window_width: f64) -> f64 {
    2.0 * std::f64::consts::PI / window_width
}

/// Log-eccentricity window width that packs `n_windows` between the two
/// eccentricities.
pub fn eccentricity_window_width_from_n(min_ecc: f64, max_ecc: f64, n_windows: f64) -> f64 {
    (max_ecc.ln() - min_ecc.ln()) / n_windows
}

/// Log-eccentricity window width for a given scaling, the ratio of a
/// window's radial full-width at half-maximum to its central eccentricity.
///
/// Solves `s = exp(w/2) - exp(-w/2)` for `w`, keeping the positive root.
pub fn eccentricity_window_width_from_scaling(scaling: f64) -> f64 {
    let s2 = scaling * scaling;
    ((s2 + 2.0 + scaling * (s2 + 4.0).sqrt()) / 2.0).ln()
}

/// Number of log-eccentricity windows of a given width between the two
/// eccentricities.
pub fn eccentricity_n_windows(window_width: f64, min_ecc: f64, max_ecc: f64) -> f64 {
    (max_ecc.ln() - min_ecc.ln()) / window_width
}

/// Scaling value realized by `n_windows` log-eccentricity windows.
pub fn scaling_from_n_windows(n_windows: f64, min_ecc: f64, max_ecc: f64) -> f64 {
    let w = eccentricity_window_width_from_n(min_ecc, max_ecc, n_windows);
    (0.5 * w).exp() - (-0.5 * w).exp()
}

/// Central eccentricity of each window ring, fovea to periphery.
pub fn windows_central_eccentricity(
    n_windows: f64,
    window_width: f64,
    min_ecc: f64,
) -> Vec<f64> {
    (0..n_windows.ceil() as usize)
        .map(|i| min_ecc * (window_width * (i as f64 + 1.0)).exp())
        .collect()
}

/// Realized widths of the windows in degrees, per eccentricity ring.
///
/// `top` is the width of the flat-top region where the window equals 1,
/// `full` the width of the whole support.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowWidths {
    pub radial_top: Vec<f64>,
    pub radial_full: Vec<f64>,
    pub angular_top: Vec<f64>,
    pub angular_full: Vec<f64>,
}

impl WindowWidths {
    /// Converts all widths by a degrees-to-pixels factor.
    pub(crate) fn scaled(&self, factor: f64) -> WindowWidths {
        let scale = |v: &[f64]| v.iter().map(|x| x * factor).collect();
        WindowWidths {
            radial_top: scale(&self.radial_top),
            radial_full: scale(&self.radial_full),
            angular_top: scale(&self.angular_top),
            angular_full: scale(&self.angular_full),
        }
    }
}

/// Computes the realized flat-top and full widths of every window ring.
pub fn window_widths_actual(
    angular_window_width: f64,
    radial_window_width: f64,
    min_ecc: f64,
    max_ecc: f64,
    transition_region_width: f64,
) -> WindowWidths {
    let t = transition_region_width;
    let w = radial_window_width;
    let n_rings = eccentricity_n_windows(w, min_ecc, max_ecc).ceil();
    let central = windows_central_eccentricity(n_rings, w, min_ecc);
    let radial_top = (0..n_rings as usize)
        .map(|i| {
            let i = i as f64;
            min_ecc * ((w * (3.0 + 2.0 * i - t) / 2.0).exp() - (w * (1.0 + 2.0 * i + t) / 2.0).exp())
        })
        .collect();
    let radial_full = (0..n_rings as usize)
        .map(|i| {
            let i = i as f64;
            min_ecc * ((w * (3.0 + 2.0 * i + t) / 2.0).exp() - (w * (1.0 + 2.0 * i - t) / 2.0).exp())
        })
        .collect();
    let angular_top = central
        .iter()
        .map(|ec| angular_window_width * (1.0 - t) * ec)
        .collect();
    let angular_full = central
        .iter()
        .map(|ec| angular_window_width * (1.0 + t) * ec)
        .collect();
    WindowWidths {
        radial_top,
        radial_full,
        angular_top,
        angular_full,
    }
}

/// Raised-cosine mother window.
///
/// Flat top of width `1 - t` with cosine-squared shoulders of width `t`
/// each, where `t` is the transition region width in `[0, 1]`. Returns NaN
/// outside the support `(-(1 + t) / 2, (1 + t) / 2]`.
pub fn mother_window(x: f64, transition_region_width: f64) -> f64 {
    use std::f64::consts::FRAC_PI_2;
    let t = transition_region_width;
    if -(1.0 + t) / 2.0 < x && x <= (t - 1.0) / 2.0 {
        (FRAC_PI_2 * ((x - (t - 1.0) / 2.0) / t)).cos().powi(2)
    } else if (t - 1.0) / 2.0 < x && x <= (1.0 - t) / 2.0 {
        1.0
    } else if (1.0 - t) / 2.0 < x && x <= (1.0 + t) / 2.0 {
        1.0 - (FRAC_PI_2 * ((x - (1.0 + t) / 2.0) / t)).cos().powi(2)
    } else {
        f64::NAN
    }
}

fn validate_transition_width(t: f64) -> TexStatsResult<()> {
    if !(0.0..=1.0).contains(&t) {
        return Err(TexStatsError::InvalidConfig {
            reason: "transition region width must lie between 0 and 1",
        });
    }
    Ok(())
}

/// Drops rows that are NaN at every sample.
fn drop_all_nan_rows(rows: Vec<Vec<f64>>, n_cols: usize) -> Array2<f64> {
    let kept: Vec<Vec<f64>> = rows
        .into_iter()
        .filter(|row| row.iter().any(|v| !v.is_nan()))
        .collect();
    let mut out = Array2::<f64>::zeros((kept.len(), n_cols));
    for (i, row) in kept.iter().enumerate() {
        for (j, v) in row.iter().enumerate() {
            out[[i, j]] = *v;
        }
    }
    out
}

/// 1-d polar-angle windows sampled on `linspace(0, 2 pi, theta_n_steps)`.
///
/// The window count must be an integral value of at least two: a single
/// window cannot tile the circle with these equations.
pub fn polar_angle_windows(
    n_windows: f64,
    theta_n_steps: usize,
    transition_region_width: f64,
) -> TexStatsResult<Array2<f64>> {
    validate_transition_width(transition_region_width)?;
    if n_windows.fract() != 0.0 || !n_windows.is_finite() {
        return Err(TexStatsError::NonIntegralWindowCount {
            requested: n_windows,
        });
    }
    if n_windows == 1.0 {
        return Err(TexStatsError::SinglePolarWindow);
    }
    if n_windows < 1.0 {
        return Err(TexStatsError::InvalidConfig {
            reason: "polar window count must be positive",
        });
    }
    let theta = signal::linspace(0.0, 2.0 * std::f64::consts::PI, theta_n_steps);
    let width = angular_window_width(n_windows);
    let mut rows = Vec::with_capacity(n_windows as usize);
    for n in 0..n_windows as usize {
        let center = width * n as f64 + width * (1.0 - transition_region_width) / 2.0;
        let row: Vec<f64> = theta
            .iter()
            .map(|&th| {
                // the first window straddles zero, so remap to (-pi, pi]
                let th = if n == 0 && th > std::f64::consts::PI {
                    th - 2.0 * std::f64::consts::PI
                } else {
                    th
                };
                mother_window((th - center) / width, transition_region_width)
            })
            .collect();
        rows.push(row);
    }
    Ok(drop_all_nan_rows(rows, theta_n_steps))
}

/// 1-d log-eccentricity windows sampled on `linspace(0, max_ecc,
/// ecc_n_steps)`.
///
/// Windows start having non-NaN values at `min_ecc` but the grid reaches
/// down to zero.
pub fn log_eccentricity_windows(
    window_width: f64,
    min_ecc: f64,
    max_ecc: f64,
    ecc_n_steps: usize,
    transition_region_width: f64,
) -> TexStatsResult<Array2<f64>> {
    validate_transition_width(transition_region_width)?;
    let n_windows = eccentricity_n_windows(window_width, min_ecc, max_ecc);
    let ecc = signal::linspace(0.0, max_ecc, ecc_n_steps);
    let log_min = min_ecc.ln();
    let mut rows = Vec::with_capacity(n_windows.ceil() as usize);
    for n in 0..n_windows.ceil() as usize {
        let row: Vec<f64> = ecc
            .iter()
            .map(|&e| {
                let arg = (e.ln() - (log_min + window_width * (n as f64 + 1.0))) / window_width;
                mother_window(arg, transition_region_width)
            })
            .collect();
        rows.push(row);
    }
    Ok(drop_all_nan_rows(rows, ecc_n_steps))
}

/// 2-d pooling windows on the log-polar sample grid, flattened so windows
/// are indexed along the first axis (eccentricity ring major, polar angle
/// minor), `(n_ecc * n_polar, ecc_n_steps, theta_n_steps)`.
///
/// The polar window count is the rounded value that keeps the
/// radial-to-circumferential width ratio near 2, so large scalings can fail
/// with [`TexStatsError::SinglePolarWindow`].
pub fn create_pooling_windows(
    scaling: f64,
    min_ecc: f64,
    max_ecc: f64,
    transition_region_width: f64,
    theta_n_steps: usize,
    ecc_n_steps: usize,
) -> TexStatsResult<Array3<f64>> {
    let ecc_width = eccentricity_window_width_from_scaling(scaling);
    // the integer constraint beats the exact ratio
    let n_polar = angular_n_windows(ecc_width / RADIAL_TO_CIRCUMFERENTIAL_RATIO).round();
    let angle = polar_angle_windows(n_polar, theta_n_steps, transition_region_width)?;
    let ecc = log_eccentricity_windows(
        ecc_width,
        min_ecc,
        max_ecc,
        ecc_n_steps,
        transition_region_width,
    )?;
    let separated = outer_windows(&ecc, &angle);
    let (n_ecc, n_ang, es, ts) = separated.dim();
    Ok(separated
        .into_shape_with_order((n_ecc * n_ang, es, ts))
        .expect("standard-layout reshape"))
}

/// Outer product of every eccentricity window with every angle window,
/// `(n_ecc, n_angle, ecc_n_steps, theta_n_steps)`.
fn outer_windows(ecc: &Array2<f64>, angle: &Array2<f64>) -> Array4<f64> {
    let (n_ecc, es) = ecc.dim();
    let (n_ang, ts) = angle.dim();
    let mut out = Array4::<f64>::zeros((n_ecc, n_ang, es, ts));
    for i in 0..n_ecc {
        for j in 0..n_ang {
            for k in 0..es {
                for l in 0..ts {
                    out[[i, j, k, l]] = ecc[[i, k]] * angle[[j, l]];
                }
            }
        }
    }
    out
}
