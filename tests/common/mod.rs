//! Shared test fixtures: a deterministic toy pyramid and image generators.

// not every test binary uses every fixture
#![allow(dead_code)]

use ndarray::{Array4, Array6};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use texstats::{
    BandDict, BandKey, PyramidBands, ReconLevels, SteerablePyramid, TexStatsError, TexStatsResult,
};

/// A cheap stand-in for a steerable pyramid.
///
/// Bands are deterministic reweightings of the input (with a per-band phase
/// twist for the oriented coefficients), which is enough to exercise every
/// statistic while honoring the non-downsampled shape contract.
#[derive(Debug)]
pub struct ToyPyramid {
    pub n_scales: usize,
    pub n_orientations: usize,
}

impl ToyPyramid {
    pub fn new(n_scales: usize, n_orientations: usize) -> Self {
        Self {
            n_scales,
            n_orientations,
        }
    }
}

impl SteerablePyramid for ToyPyramid {
    fn n_scales(&self) -> usize {
        self.n_scales
    }

    fn n_orientations(&self) -> usize {
        self.n_orientations
    }

    fn forward(&self, image: &Array4<f64>) -> TexStatsResult<PyramidBands> {
        let (b, c, h, w) = image.dim();
        let mut oriented = Array6::<Complex64>::from_elem(
            (b, c, self.n_scales, self.n_orientations, h, w),
            Complex64::new(0.0, 0.0),
        );
        for si in 0..self.n_scales {
            for oi in 0..self.n_orientations {
                let gain = 1.0 / (1.0 + si as f64);
                let phase = (1.0 + oi as f64) * 0.7;
                let (sin, cos) = phase.sin_cos();
                for bi in 0..b {
                    for ci in 0..c {
                        for hi in 0..h {
                            for wi in 0..w {
                                // shift the band so scales decorrelate a bit
                                let src = image[[bi, ci, (hi + si) % h, (wi + oi) % w]];
                                oriented[[bi, ci, si, oi, hi, wi]] =
                                    Complex64::new(gain * src * cos, gain * src * sin);
                            }
                        }
                    }
                }
            }
        }
        let highpass = image.mapv(|v| 0.5 * v);
        let lowpass = image.mapv(|v| 0.25 * v + 1.0);
        Ok(PyramidBands {
            oriented,
            highpass,
            lowpass,
        })
    }

    fn reconstruct(&self, bands: &BandDict, levels: ReconLevels) -> TexStatsResult<Array4<f64>> {
        match levels {
            ReconLevels::ResidualLowpass => bands
                .get(&BandKey::ResidualLowpass)
                .cloned()
                .ok_or(TexStatsError::PyramidContract {
                    context: "missing lowpass band",
                }),
            ReconLevels::Scale(scale) => {
                let mut out: Option<Array4<f64>> = None;
                for orientation in 0..self.n_orientations {
                    let band = bands
                        .get(&BandKey::Oriented { scale, orientation })
                        .ok_or(TexStatsError::PyramidContract {
                            context: "missing oriented band",
                        })?;
                    match &mut out {
                        None => out = Some(band.clone()),
                        Some(acc) => *acc += band,
                    }
                }
                out.ok_or(TexStatsError::PyramidContract {
                    context: "pyramid has no orientations",
                })
            }
        }
    }
}

/// A single unit impulse on a zero background.
pub fn impulse_image(h: usize, w: usize) -> Array4<f64> {
    let mut image = Array4::<f64>::zeros((1, 1, h, w));
    image[[0, 0, h / 2, w / 2]] = 1.0;
    image
}

/// Seeded pseudo-random image in `[0, 1)`.
pub fn noise_image(b: usize, c: usize, h: usize, w: usize, seed: u64) -> Array4<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut image = Array4::<f64>::zeros((b, c, h, w));
    for v in image.iter_mut() {
        *v = rng.random();
    }
    image
}

/// Maximum absolute difference between two same-shaped 3d arrays.
pub fn max_abs_diff(a: &ndarray::Array3<f64>, b: &ndarray::Array3<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}
