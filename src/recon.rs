//! Coarse-to-fine partial pyramid reconstructions.
//!
//! Several statistics are computed on the image as it looks when only the
//! coarse end of the pyramid has been reconstructed. This stage builds that
//! sequence: the lowpass-only reconstruction, then each scale's oriented
//! bands added in from coarsest to finest.

use ndarray::{Array4, Array5, Array6, Axis};

use crate::pyramid::{BandDict, ReconLevels, SteerablePyramid};
use crate::trace::trace_span;
use crate::util::{TexStatsError, TexStatsResult};

/// Reconstructs the lowpass image at every scale of a pyramid decomposition.
///
/// Returns `(batch, channel, n_scales + 1, h, w)`. Band `i < n_scales` holds
/// the reconstruction from the lowpass residual plus all oriented bands at
/// scales `i..n_scales`; band `n_scales` holds the lowpass-only
/// reconstruction. The highpass residual never participates.
pub fn reconstruct_lowpass_at_each_scale<P: SteerablePyramid>(
    pyramid: &P,
    oriented_real: &Array6<f64>,
    highpass: &Array4<f64>,
    lowpass: &Array4<f64>,
) -> TexStatsResult<Array5<f64>> {
    let _span = trace_span!("reconstruct_lowpass_at_each_scale").entered();
    let n_scales = pyramid.n_scales();
    let (b, c, s, _, h, w) = oriented_real.dim();
    if s != n_scales {
        return Err(TexStatsError::PyramidContract {
            context: "oriented coefficient scales must match the pyramid",
        });
    }

    let bands = BandDict::from_real_parts(highpass.clone(), oriented_real, lowpass.clone());

    let mut images = Vec::with_capacity(n_scales + 1);
    let mut running = pyramid.reconstruct(&bands, ReconLevels::ResidualLowpass)?;
    check_recon_shape(&running, b, c, h, w)?;
    images.push(running.clone());
    for level in (0..n_scales).rev() {
        let scale_only = pyramid.reconstruct(&bands, ReconLevels::Scale(level))?;
        check_recon_shape(&scale_only, b, c, h, w)?;
        running += &scale_only;
        images.push(running.clone());
    }
    images.reverse();

    let mut out = Array5::<f64>::zeros((b, c, n_scales + 1, h, w));
    for (i, img) in images.iter().enumerate() {
        out.index_axis_mut(Axis(2), i).assign(img);
    }
    Ok(out)
}

fn check_recon_shape(
    recon: &Array4<f64>,
    b: usize,
    c: usize,
    h: usize,
    w: usize,
) -> TexStatsResult<()> {
    if recon.dim() != (b, c, h, w) {
        return Err(TexStatsError::PyramidContract {
            context: "reconstruction must keep the input batch and resolution",
        });
    }
    Ok(())
}
