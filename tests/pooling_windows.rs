mod common;

use common::noise_image;
use ndarray::Array4;
use texstats::pooling::{
    self, angular_n_windows, eccentricity_window_width_from_scaling, scaling_from_n_windows,
};
use texstats::{PoolingWindows, TexStatsError};

#[test]
fn window_and_pool_shapes_track_scales() {
    let pw = PoolingWindows::new(0.9, (64, 64), 0.5, 15.0, 2, 0.5).unwrap();
    let n = pw.windows(0).unwrap().dim().0;
    assert_eq!(n, pw.n_polar_windows() * pw.n_eccentricity_bands());

    let image = noise_image(2, 1, 64, 64, 17);
    let windowed = pw.window(&image, 0).unwrap();
    assert_eq!(windowed.dim(), (2, 1, n, 64, 64));
    let pooled = pw.pool(&windowed, 0).unwrap();
    assert_eq!(pooled.dim(), (2, 1, n));

    // forward is the two steps fused
    let fused = pw.forward(&image, 0).unwrap();
    assert_eq!(fused, pooled);

    let small = noise_image(1, 1, 32, 32, 18);
    assert_eq!(pw.forward(&small, 1).unwrap().dim(), (1, 1, n));
}

#[test]
fn pooled_values_are_weighted_averages() {
    let pw = PoolingWindows::new(0.9, (32, 32), 0.5, 15.0, 1, 0.5).unwrap();
    let image = noise_image(1, 1, 32, 32, 23);
    let max = image.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let pooled = pw.forward(&image, 0).unwrap();
    for v in pooled.iter() {
        assert!(v.is_finite());
        assert!(*v <= max + 1e-9);
        assert!(*v >= 0.0);
    }
}

#[test]
fn pooling_averages_cartesian_image_regions() {
    let pw = PoolingWindows::new(0.9, (64, 64), 0.5, 15.0, 1, 0.5).unwrap();
    // disc of ones around the image center
    let mut image = Array4::<f64>::zeros((1, 1, 64, 64));
    for hi in 0..64 {
        for wi in 0..64 {
            let dy = hi as f64 - 31.5;
            let dx = wi as f64 - 31.5;
            if (dx * dx + dy * dy).sqrt() < 16.0 {
                image[[0, 0, hi, wi]] = 1.0;
            }
        }
    }
    let pooled = pw.forward(&image, 0).unwrap();
    let n_polar = pw.n_polar_windows();
    let n_bands = pw.n_eccentricity_bands();
    // the innermost window ring sits entirely inside the disc
    for ni in 0..n_polar {
        assert!((pooled[[0, 0, ni]] - 1.0).abs() < 1e-9, "window {ni}");
    }
    // the outermost ring sits entirely outside it
    for ni in (n_bands - 1) * n_polar..n_bands * n_polar {
        assert_eq!(pooled[[0, 0, ni]], 0.0, "window {ni}");
    }
}

#[test]
fn scaling_too_large_for_two_polar_windows() {
    // the derived polar window count rounds to one
    let width = eccentricity_window_width_from_scaling(600.0);
    assert_eq!(angular_n_windows(width / 2.0).round(), 1.0);
    let err = PoolingWindows::new(600.0, (32, 32), 0.5, 15.0, 1, 0.5).unwrap_err();
    assert_eq!(err, TexStatsError::SinglePolarWindow);
}

#[test]
fn window_widths_are_reported_per_scale() {
    let pw = PoolingWindows::new(0.9, (64, 64), 0.5, 15.0, 3, 0.5).unwrap();
    let degrees = pw.window_width_degrees();
    assert_eq!(degrees.radial_top.len(), pw.n_eccentricity_bands());
    assert!(degrees
        .radial_full
        .iter()
        .zip(&degrees.radial_top)
        .all(|(full, top)| full > top));

    let pixels = pw.window_width_pixels();
    assert_eq!(pixels.len(), 3);
    // each scale halves the pixel radius, so pixel widths halve too
    for i in 1..3 {
        for (coarse, fine) in pixels[i].radial_full.iter().zip(&pixels[i - 1].radial_full) {
            assert!((coarse * 2.0 - fine).abs() < 1e-9);
        }
    }
}

#[test]
fn scaling_round_trips_through_window_count() {
    let width = eccentricity_window_width_from_scaling(0.87);
    let n = pooling::eccentricity_n_windows(width, 0.5, 15.0);
    let back = scaling_from_n_windows(n, 0.5, 15.0);
    assert!((back - 0.87).abs() < 1e-12);
}

#[test]
fn mismatched_input_resolution_is_rejected() {
    let pw = PoolingWindows::new(0.9, (64, 64), 0.5, 15.0, 1, 0.5).unwrap();
    let image = noise_image(1, 1, 32, 32, 29);
    let err = pw.window(&image, 0).unwrap_err();
    assert_eq!(
        err,
        TexStatsError::InvalidImageShape {
            expected_h: 64,
            expected_w: 64,
            got: vec![1, 1, 32, 32],
        }
    );
}
