//! Window functions.

use std::f64::consts::PI;

/// Symmetric Hann window, `0.5 - 0.5 cos(2 pi i / (n - 1))`.
pub fn hann(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let nm1 = (n - 1) as f64;
            (0..n)
                .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / nm1).cos())
                .collect()
        }
    }
}

/// Symmetric Kaiser window with shape parameter `beta`.
pub fn kaiser(n: usize, beta: f64) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let nm1 = (n - 1) as f64;
            let denom = bessel_i0(beta);
            (0..n)
                .map(|i| {
                    let r = 2.0 * i as f64 / nm1 - 1.0;
                    bessel_i0(beta * (1.0 - r * r).max(0.0).sqrt()) / denom
                })
                .collect()
        }
    }
}

/// Sum of squared window coefficients.
pub fn energy(window: &[f64]) -> f64 {
    window.iter().map(|w| w * w).sum()
}

/// Modified Bessel function of the first kind, order zero (power series).
fn bessel_i0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut term = 1.0;
    let mut sum = 1.0;
    for k in 1..200 {
        let f = half / k as f64;
        term *= f * f;
        sum += term;
        if term < sum * 1e-17 {
            break;
        }
    }
    sum
}
