//! FFT-domain signal primitives shared by the statistic engines.
//!
//! All operations treat the trailing two axes as spatial (height, width) and
//! apply independently to every leading slice. The Fourier conventions here
//! are load-bearing: `autocorrelation` divides by the element count twice so
//! that the centered zero-lag entry equals the spatial second moment, and
//! `shrink` reproduces the classic Fourier-domain down-sampler (central
//! spectrum block with boundary rows folded in at half weight) so that
//! statistics computed on shrunken bands match those computed on a
//! progressively down-sampled pyramid.

use ndarray::{Array1, Array2, Array3, ArrayD, Axis, Dimension, IxDyn};
use num_complex::Complex64;
use rustfft::FftPlanner;

use crate::util::{TexStatsError, TexStatsResult};

/// Splits a dynamic shape into (leading dims, height, width).
fn split_spatial(shape: &[usize]) -> TexStatsResult<(Vec<usize>, usize, usize)> {
    if shape.len() < 2 {
        return Err(TexStatsError::UnexpectedShape {
            context: "spatial operation",
            got: shape.to_vec(),
        });
    }
    let (lead, spatial) = shape.split_at(shape.len() - 2);
    Ok((lead.to_vec(), spatial[0], spatial[1]))
}

/// Reshapes to (product-of-leading, h, w), applying to each 2d slice.
fn flatten_lead(x: &ArrayD<f64>, h: usize, w: usize, lead: &[usize]) -> Array3<f64> {
    let n_lead: usize = lead.iter().product();
    x.as_standard_layout()
        .to_owned()
        .into_shape_with_order((n_lead, h, w))
        .expect("lead/spatial reshape of standard-layout array")
}

fn unflatten_lead(x: Array3<f64>, lead: &[usize], h: usize, w: usize) -> ArrayD<f64> {
    let mut shape = lead.to_vec();
    shape.push(h);
    shape.push(w);
    x.into_shape_with_order(IxDyn(&shape))
        .expect("lead/spatial reshape of standard-layout array")
}

/// In-place 2d FFT along both axes of a complex matrix.
///
/// rustfft transforms are unnormalized in both directions; callers apply
/// whatever normalization their identity requires.
pub(crate) fn fft2_inplace(a: &mut Array2<Complex64>, inverse: bool) {
    let (h, w) = a.dim();
    let mut planner = FftPlanner::<f64>::new();
    let row_fft = if inverse {
        planner.plan_fft_inverse(w)
    } else {
        planner.plan_fft_forward(w)
    };
    let col_fft = if inverse {
        planner.plan_fft_inverse(h)
    } else {
        planner.plan_fft_forward(h)
    };

    let mut buf = vec![Complex64::new(0.0, 0.0); w.max(h)];
    for mut row in a.rows_mut() {
        for (b, v) in buf[..w].iter_mut().zip(row.iter()) {
            *b = *v;
        }
        row_fft.process(&mut buf[..w]);
        for (v, b) in row.iter_mut().zip(buf[..w].iter()) {
            *v = *b;
        }
    }
    for mut col in a.columns_mut() {
        for (b, v) in buf[..h].iter_mut().zip(col.iter()) {
            *b = *v;
        }
        col_fft.process(&mut buf[..h]);
        for (v, b) in col.iter_mut().zip(buf[..h].iter()) {
            *v = *b;
        }
    }
}

/// Rolls a 1d lane forward by `shift` (with wraparound) along `axis`.
pub(crate) fn roll_axis<D: Dimension>(
    x: &ndarray::Array<f64, D>,
    axis: Axis,
    shift: isize,
) -> ndarray::Array<f64, D> {
    let n = x.len_of(axis) as isize;
    let s = ((shift % n) + n) % n;
    if s == 0 {
        return x.clone();
    }
    let s = s as usize;
    let n = n as usize;
    let mut out = ndarray::Array::zeros(x.raw_dim());
    out.slice_axis_mut(axis, ndarray::Slice::from(s..n))
        .assign(&x.slice_axis(axis, ndarray::Slice::from(0..n - s)));
    out.slice_axis_mut(axis, ndarray::Slice::from(0..s))
        .assign(&x.slice_axis(axis, ndarray::Slice::from(n - s..n)));
    out
}

/// Moves the zero-frequency entry of both spatial axes to the center.
fn fftshift2(a: &Array2<Complex64>) -> Array2<Complex64> {
    let (h, w) = a.dim();
    let mut out = Array2::from_elem((h, w), Complex64::new(0.0, 0.0));
    for i in 0..h {
        for j in 0..w {
            out[[(i + h / 2) % h, (j + w / 2) % w]] = a[[i, j]];
        }
    }
    out
}

/// Inverse of [`fftshift2`].
fn ifftshift2(a: &Array2<Complex64>) -> Array2<Complex64> {
    let (h, w) = a.dim();
    let mut out = Array2::from_elem((h, w), Complex64::new(0.0, 0.0));
    for i in 0..h {
        for j in 0..w {
            out[[i, j]] = a[[(i + h / 2) % h, (j + w / 2) % w]];
        }
    }
    out
}

/// Spatial autocorrelation of every band, via the Wiener-Khinchin identity.
///
/// Returns an array of the same shape. The result is fftshifted so the
/// zero-lag entry sits at `(h / 2, w / 2)`, and normalized by the spatial
/// element count so that zero-lag equals the band's second moment (the
/// variance, for a demeaned band).
pub fn autocorrelation(x: &ArrayD<f64>) -> TexStatsResult<ArrayD<f64>> {
    let (lead, h, w) = split_spatial(x.shape())?;
    let flat = flatten_lead(x, h, w, &lead);
    let n = (h * w) as f64;
    let mut out = Array3::<f64>::zeros(flat.raw_dim());

    for (slice, mut dst) in flat.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
        let mut freq = slice.mapv(|v| Complex64::new(v, 0.0));
        fft2_inplace(&mut freq, false);
        freq.mapv_inplace(|z| Complex64::new(z.norm_sqr(), 0.0));
        fft2_inplace(&mut freq, true);
        // one 1/N for the inverse transform, one for the covariance scale
        let shifted = fftshift2(&freq);
        dst.assign(&shifted.mapv(|z| z.re / (n * n)));
    }
    Ok(unflatten_lead(out, &lead, h, w))
}

/// Crops the centered `width x width` spatial window out of every band.
pub fn center_crop(x: &ArrayD<f64>, width: usize) -> TexStatsResult<ArrayD<f64>> {
    let (_, h, w) = split_spatial(x.shape())?;
    if width > h || width > w {
        return Err(TexStatsError::UnexpectedShape {
            context: "center_crop window larger than input",
            got: x.shape().to_vec(),
        });
    }
    let r0 = h / 2 - width / 2;
    let r1 = h / 2 + width.div_ceil(2);
    let c0 = w / 2 - width / 2;
    let c1 = w / 2 + width.div_ceil(2);
    let nd = x.ndim();
    let mut cropped = x.view();
    cropped.slice_axis_inplace(Axis(nd - 2), ndarray::Slice::from(r0..r1));
    cropped.slice_axis_inplace(Axis(nd - 1), ndarray::Slice::from(c0..c1));
    Ok(cropped.to_owned())
}

/// Fourier-domain down-sampling of every band by an integer factor.
///
/// The spectrum is centered, scaled by `1 / factor^2`, and its central
/// `(h / factor) x (w / factor)` block kept; the rows and columns at the block
/// boundary are folded in at half weight (quarter weight for the corners).
/// Both spatial dims must be divisible by `2 * factor`.
pub fn shrink(x: &ArrayD<f64>, factor: usize) -> TexStatsResult<ArrayD<f64>> {
    if factor <= 1 {
        return Ok(x.clone());
    }
    let (lead, h, w) = split_spatial(x.shape())?;
    for size in [h, w] {
        if size % (2 * factor) != 0 {
            return Err(TexStatsError::NotDivisible {
                size,
                factor,
                required: 2 * factor,
            });
        }
    }
    let (my, mx) = (h / factor, w / factor);
    let flat = flatten_lead(x, h, w, &lead);
    let mut out = Array3::<f64>::zeros((flat.len_of(Axis(0)), my, mx));
    let scale = 1.0 / (factor * factor) as f64;
    let inv_n = 1.0 / (my * mx) as f64;

    let (cy, cx) = (h / 2, w / 2);
    let (y1, y2) = (cy + 1 - my / 2, cy + my / 2);
    let (x1, x2) = (cx + 1 - mx / 2, cx + mx / 2);

    for (slice, mut dst) in flat.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
        let mut freq = slice.mapv(|v| Complex64::new(v * scale, 0.0));
        fft2_inplace(&mut freq, false);
        let freq = fftshift2(&freq);

        let mut small = Array2::from_elem((my, mx), Complex64::new(0.0, 0.0));
        for i in 1..my {
            for j in 1..mx {
                small[[i, j]] = freq[[y1 + i - 1, x1 + j - 1]];
            }
        }
        for j in 1..mx {
            small[[0, j]] = (freq[[y1 - 1, x1 + j - 1]] + freq[[y2, x1 + j - 1]]) * 0.5;
        }
        for i in 1..my {
            small[[i, 0]] = (freq[[y1 + i - 1, x1 - 1]] + freq[[y1 + i - 1, x2]]) * 0.5;
        }
        small[[0, 0]] = (freq[[y1 - 1, x1 - 1]]
            + freq[[y1 - 1, x2]]
            + freq[[y2, x1 - 1]]
            + freq[[y2, x2]])
            * 0.25;

        let mut small = ifftshift2(&small);
        fft2_inplace(&mut small, true);
        dst.assign(&small.mapv(|z| z.re * inv_n));
    }
    Ok(unflatten_lead(out, &lead, my, mx))
}

/// Multiplies the phase angle of every complex coefficient by `phase_factor`,
/// keeping the magnitude.
pub fn modulate_phase<D: Dimension>(
    z: &ndarray::Array<Complex64, D>,
    phase_factor: f64,
) -> ndarray::Array<Complex64, D> {
    z.mapv(|v| Complex64::from_polar(v.norm(), phase_factor * v.arg()))
}

/// Evenly spaced samples over `[start, stop]`, endpoint included.
pub(crate) fn linspace(start: f64, stop: f64, n: usize) -> Array1<f64> {
    Array1::linspace(start, stop, n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array4};

    fn as_dyn4(x: Array4<f64>) -> ArrayD<f64> {
        x.into_dyn()
    }

    #[test]
    fn autocorrelation_center_equals_second_moment() {
        let mut img = Array4::<f64>::zeros((1, 1, 8, 8));
        img[[0, 0, 2, 3]] = 1.0;
        img[[0, 0, 5, 1]] = -2.0;
        let mean = img.sum() / 64.0;
        img.mapv_inplace(|v| v - mean);
        let second_moment = img.mapv(|v| v * v).sum() / 64.0;

        let ac = autocorrelation(&as_dyn4(img)).unwrap();
        let center = ac[[0, 0, 4, 4]];
        assert!((center - second_moment).abs() < 1e-12);
    }

    #[test]
    fn autocorrelation_of_constant_is_flat() {
        let img = Array4::<f64>::from_elem((1, 1, 4, 4), 3.0);
        let ac = autocorrelation(&as_dyn4(img)).unwrap();
        for v in ac.iter() {
            assert!((v - 9.0).abs() < 1e-12);
        }
    }

    #[test]
    fn center_crop_takes_middle_window() {
        let x = arr2(&[
            [0.0, 1.0, 2.0, 3.0],
            [4.0, 5.0, 6.0, 7.0],
            [8.0, 9.0, 10.0, 11.0],
            [12.0, 13.0, 14.0, 15.0],
        ])
        .into_dyn();
        let cropped = center_crop(&x, 3).unwrap();
        assert_eq!(cropped.shape(), &[3, 3]);
        assert_eq!(cropped[[0, 0]], 5.0);
        assert_eq!(cropped[[1, 1]], 10.0);
        assert_eq!(cropped[[2, 2]], 15.0);
    }

    #[test]
    fn shrink_of_constant_preserves_value() {
        let img = as_dyn4(Array4::<f64>::from_elem((1, 1, 8, 8), 2.5));
        let small = shrink(&img, 2).unwrap();
        assert_eq!(small.shape(), &[1, 1, 4, 4]);
        for v in small.iter() {
            assert!((v - 2.5).abs() < 1e-10);
        }
    }

    #[test]
    fn shrink_rejects_bad_sizes() {
        let img = as_dyn4(Array4::<f64>::zeros((1, 1, 6, 6)));
        let err = shrink(&img, 2).unwrap_err();
        assert_eq!(
            err,
            TexStatsError::NotDivisible {
                size: 6,
                factor: 2,
                required: 4,
            }
        );
    }

    #[test]
    fn modulate_phase_doubles_angle() {
        let z = ndarray::Array1::from_vec(vec![Complex64::from_polar(2.0, 0.3)]);
        let doubled = modulate_phase(&z, 2.0);
        assert!((doubled[0].norm() - 2.0).abs() < 1e-12);
        assert!((doubled[0].arg() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn roll_axis_wraps() {
        let x = ndarray::arr1(&[1.0, 2.0, 3.0, 4.0]);
        let rolled = roll_axis(&x, Axis(0), 1);
        assert_eq!(rolled.to_vec(), vec![4.0, 1.0, 2.0, 3.0]);
        let rolled = roll_axis(&x, Axis(0), -1);
        assert_eq!(rolled.to_vec(), vec![2.0, 3.0, 4.0, 1.0]);
    }
}
