//! Spatial moment statistics.
//!
//! Every reduction here collapses the trailing two (spatial) axes of a band
//! tensor and returns the leading dims. Variance is the population variance
//! (divide by N); skewness and kurtosis are the standardized third and fourth
//! central moments.

use ndarray::{ArrayD, IxDyn, Zip};

use crate::util::{TexStatsError, TexStatsResult};

/// Ratio of band variance to image variance below which skewness and
/// kurtosis are numerically meaningless and get pinned to Gaussian defaults.
pub const DEGENERATE_VARIANCE_RATIO: f64 = 1e-6;

/// Skewness of a Gaussian, used when a band is degenerate.
pub const DEGENERATE_SKEW: f64 = 0.0;
/// Kurtosis of a Gaussian, used when a band is degenerate.
pub const DEGENERATE_KURTOSIS: f64 = 3.0;

fn spatial_split(x: &ArrayD<f64>) -> TexStatsResult<(Vec<usize>, usize)> {
    let shape = x.shape();
    if shape.len() < 2 {
        return Err(TexStatsError::UnexpectedShape {
            context: "moment reduction",
            got: shape.to_vec(),
        });
    }
    let (lead, spatial) = shape.split_at(shape.len() - 2);
    Ok((lead.to_vec(), spatial[0] * spatial[1]))
}

fn reduce_spatial(
    x: &ArrayD<f64>,
    f: impl Fn(&[f64]) -> f64,
) -> TexStatsResult<ArrayD<f64>> {
    let (lead, n_spatial) = spatial_split(x)?;
    let n_lead: usize = lead.iter().product();
    let flat = x
        .as_standard_layout()
        .to_owned()
        .into_shape_with_order((n_lead, n_spatial))
        .expect("standard-layout reshape");
    let reduced: Vec<f64> = flat
        .rows()
        .into_iter()
        .map(|row| f(row.as_slice().expect("contiguous row of owned array")))
        .collect();
    Ok(ArrayD::from_shape_vec(IxDyn(&lead), reduced).expect("reduced shape matches lead dims"))
}

/// Per-band mean over the spatial axes.
pub fn mean(x: &ArrayD<f64>) -> TexStatsResult<ArrayD<f64>> {
    reduce_spatial(x, |row| row.iter().sum::<f64>() / row.len() as f64)
}

/// Per-band population variance over the spatial axes.
///
/// When `mean` is `None` the band is treated as already demeaned.
pub fn variance(x: &ArrayD<f64>, mean: Option<&ArrayD<f64>>) -> TexStatsResult<ArrayD<f64>> {
    central_moment(x, mean, 2)
}

/// Per-band skewness: third central moment over `variance^1.5`.
pub fn skewness(
    x: &ArrayD<f64>,
    mean: Option<&ArrayD<f64>>,
    variance: &ArrayD<f64>,
) -> TexStatsResult<ArrayD<f64>> {
    let m3 = central_moment(x, mean, 3)?;
    let mut out = m3;
    Zip::from(&mut out).and(variance).for_each(|v, &var| {
        *v /= var.powf(1.5);
    });
    Ok(out)
}

/// Per-band kurtosis: fourth central moment over `variance^2`.
///
/// This is the raw (non-excess) kurtosis; a Gaussian scores 3.
pub fn kurtosis(
    x: &ArrayD<f64>,
    mean: Option<&ArrayD<f64>>,
    variance: &ArrayD<f64>,
) -> TexStatsResult<ArrayD<f64>> {
    let m4 = central_moment(x, mean, 4)?;
    let mut out = m4;
    Zip::from(&mut out).and(variance).for_each(|v, &var| {
        *v /= var * var;
    });
    Ok(out)
}

/// Per-band spatial minimum.
pub fn min(x: &ArrayD<f64>) -> TexStatsResult<ArrayD<f64>> {
    reduce_spatial(x, |row| row.iter().copied().fold(f64::INFINITY, f64::min))
}

/// Per-band spatial maximum.
pub fn max(x: &ArrayD<f64>) -> TexStatsResult<ArrayD<f64>> {
    reduce_spatial(x, |row| row.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

fn central_moment(
    x: &ArrayD<f64>,
    mean: Option<&ArrayD<f64>>,
    order: u32,
) -> TexStatsResult<ArrayD<f64>> {
    match mean {
        None => reduce_spatial(x, |row| {
            row.iter().map(|v| v.powi(order as i32)).sum::<f64>() / row.len() as f64
        }),
        Some(m) => {
            let (lead, n_spatial) = spatial_split(x)?;
            if m.shape() != lead.as_slice() {
                return Err(TexStatsError::UnexpectedShape {
                    context: "mean dims for central moment",
                    got: m.shape().to_vec(),
                });
            }
            let n_lead: usize = lead.iter().product();
            let flat = x
                .as_standard_layout()
                .to_owned()
                .into_shape_with_order((n_lead, n_spatial))
                .expect("standard-layout reshape");
            let means = m
                .as_standard_layout()
                .to_owned()
                .into_shape_with_order(n_lead)
                .expect("standard-layout reshape");
            let reduced: Vec<f64> = flat
                .rows()
                .into_iter()
                .zip(means.iter())
                .map(|(row, &mu)| {
                    row.iter().map(|v| (v - mu).powi(order as i32)).sum::<f64>()
                        / n_spatial as f64
                })
                .collect();
            Ok(ArrayD::from_shape_vec(IxDyn(&lead), reduced)
                .expect("reduced shape matches lead dims"))
        }
    }
}

/// Pins skewness and kurtosis to Gaussian defaults wherever the band variance
/// is negligible relative to the reference variance.
///
/// `reference_variance` must broadcast against `band_variance` (trailing axes
/// of `band_variance` beyond the reference's rank index extra bands).
pub fn stabilize_skew_kurtosis(
    skew: &mut ArrayD<f64>,
    kurtosis: &mut ArrayD<f64>,
    band_variance: &ArrayD<f64>,
    reference_variance: &ArrayD<f64>,
) -> TexStatsResult<()> {
    if skew.shape() != band_variance.shape() || kurtosis.shape() != band_variance.shape() {
        return Err(TexStatsError::UnexpectedShape {
            context: "skew/kurtosis dims for stabilization",
            got: band_variance.shape().to_vec(),
        });
    }
    let ref_lead: usize = reference_variance.len();
    let n_bands = band_variance.len() / ref_lead;
    let flat_var = band_variance
        .as_standard_layout()
        .to_owned()
        .into_shape_with_order((ref_lead, n_bands))
        .expect("standard-layout reshape");
    let flat_ref = reference_variance
        .as_standard_layout()
        .to_owned()
        .into_shape_with_order(ref_lead)
        .expect("standard-layout reshape");

    let mut skew_flat = skew
        .view_mut()
        .into_shape_with_order((ref_lead, n_bands))
        .expect("standard-layout reshape");
    let mut kurt_flat = kurtosis
        .view_mut()
        .into_shape_with_order((ref_lead, n_bands))
        .expect("standard-layout reshape");
    for i in 0..ref_lead {
        for j in 0..n_bands {
            // NaN ratios (zero reference variance) also take the defaults
            if !(flat_var[[i, j]] / flat_ref[i] > DEGENERATE_VARIANCE_RATIO) {
                skew_flat[[i, j]] = DEGENERATE_SKEW;
                kurt_flat[[i, j]] = DEGENERATE_KURTOSIS;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array4};

    fn sample() -> ArrayD<f64> {
        let mut x = Array4::<f64>::zeros((1, 1, 2, 4));
        for (i, v) in [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0].iter().enumerate() {
            x[[0, 0, i / 4, i % 4]] = *v;
        }
        x.into_dyn()
    }

    #[test]
    fn mean_and_population_variance() {
        let x = sample();
        let m = mean(&x).unwrap();
        assert_eq!(m[[0, 0]], 4.5);
        let v = variance(&x, Some(&m)).unwrap();
        // population variance of 1..=8
        assert!((v[[0, 0]] - 5.25).abs() < 1e-12);
    }

    #[test]
    fn gaussianlike_symmetric_data_has_zero_skew() {
        let x = sample();
        let m = mean(&x).unwrap();
        let v = variance(&x, Some(&m)).unwrap();
        let s = skewness(&x, Some(&m), &v).unwrap();
        assert!(s[[0, 0]].abs() < 1e-12);
    }

    #[test]
    fn kurtosis_of_two_point_mass_is_one() {
        let mut x = Array4::<f64>::zeros((1, 1, 2, 2));
        x[[0, 0, 0, 0]] = 1.0;
        x[[0, 0, 0, 1]] = -1.0;
        x[[0, 0, 1, 0]] = 1.0;
        x[[0, 0, 1, 1]] = -1.0;
        let x = x.into_dyn();
        let v = variance(&x, None).unwrap();
        let k = kurtosis(&x, None, &v).unwrap();
        assert!((k[[0, 0]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_bands_pin_to_gaussian_defaults() {
        let mut skew = Array2::<f64>::from_elem((1, 3), 0.7).into_dyn();
        let mut kurt = Array2::<f64>::from_elem((1, 3), 9.0).into_dyn();
        let band_var =
            Array2::from_shape_vec((1, 3), vec![1e-9, 0.5, 2.0]).unwrap().into_dyn();
        let img_var = ndarray::arr1(&[1.0]).into_dyn();
        stabilize_skew_kurtosis(&mut skew, &mut kurt, &band_var, &img_var).unwrap();
        assert_eq!(skew[[0, 0]], DEGENERATE_SKEW);
        assert_eq!(kurt[[0, 0]], DEGENERATE_KURTOSIS);
        assert_eq!(skew[[0, 1]], 0.7);
        assert_eq!(kurt[[0, 2]], 9.0);
    }

    #[test]
    fn min_max_over_spatial_axes() {
        let x = sample();
        assert_eq!(min(&x).unwrap()[[0, 0]], 1.0);
        assert_eq!(max(&x).unwrap()[[0, 0]], 8.0);
    }
}
