//! Window functions for FIR filter design.
//!
//! The anti-alias filter tapers its truncated sinc kernel with one of these
//! windows. Hamming is the default; Blackman and Kaiser trade a wider
//! transition band for deeper stopband attenuation.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Window shapes available for filter design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WindowType {
    #[default]
    Hamming,
    Hann,
    Blackman,
    /// Kaiser window, beta scaled by 100 (e.g. 600 = 6.0).
    Kaiser(u32),
}

/// Generates a symmetric window of `size` taps.
pub fn generate_window(window_type: WindowType, size: usize) -> Vec<f64> {
    match size {
        0 => return vec![],
        1 => return vec![1.0],
        _ => {}
    }
    let last = (size - 1) as f64;
    match window_type {
        WindowType::Hamming => cosine_sum(size, &[0.54, 0.46]),
        WindowType::Hann => cosine_sum(size, &[0.5, 0.5]),
        WindowType::Blackman => cosine_sum(size, &[0.42, 0.5, 0.08]),
        WindowType::Kaiser(beta_100) => {
            let beta = beta_100 as f64 / 100.0;
            let denom = bessel_i0(beta);
            (0..size)
                .map(|i| {
                    let x = 2.0 * i as f64 / last - 1.0;
                    bessel_i0(beta * (1.0 - x * x).max(0.0).sqrt()) / denom
                })
                .collect()
        }
    }
}

/// Generalized cosine window `a0 - a1 cos(2πx) + a2 cos(4πx) ...`.
fn cosine_sum(size: usize, coeffs: &[f64]) -> Vec<f64> {
    let last = (size - 1) as f64;
    (0..size)
        .map(|i| {
            let x = 2.0 * PI * i as f64 / last;
            coeffs
                .iter()
                .enumerate()
                .map(|(k, &a)| {
                    let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                    sign * a * (k as f64 * x).cos()
                })
                .sum()
        })
        .collect()
}

/// Zeroth-order modified Bessel function of the first kind (power series).
fn bessel_i0(x: f64) -> f64 {
    let half = 0.5 * x;
    let mut sum = 1.0;
    let mut term = 1.0;
    for k in 1..32 {
        let f = half / k as f64;
        term *= f * f;
        sum += term;
        if term < sum * 1e-15 {
            break;
        }
    }
    sum
}

/// Multiplies `data` by `window` element-wise.
#[inline]
pub fn apply_window(data: &mut [f64], window: &[f64]) {
    for (d, &w) in data.iter_mut().zip(window) {
        *d *= w;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_symmetric(w: &[f64]) {
        let n = w.len();
        for i in 0..n / 2 {
            assert_abs_diff_eq!(w[i], w[n - 1 - i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_hamming_endpoints() {
        let w = generate_window(WindowType::Hamming, 33);
        assert_abs_diff_eq!(w[0], 0.08, epsilon = 1e-12);
        assert_abs_diff_eq!(w[16], 1.0, epsilon = 1e-12);
        assert_symmetric(&w);
    }

    #[test]
    fn test_hann_and_blackman_touch_zero() {
        let hann = generate_window(WindowType::Hann, 64);
        let blackman = generate_window(WindowType::Blackman, 64);
        assert_abs_diff_eq!(hann[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(blackman[63], 0.0, epsilon = 1e-12);
        assert_symmetric(&hann);
        assert_symmetric(&blackman);
    }

    #[test]
    fn test_kaiser_peak_in_middle() {
        let w = generate_window(WindowType::Kaiser(600), 65);
        assert_abs_diff_eq!(w[32], 1.0, epsilon = 1e-12);
        assert!(w.iter().all(|&v| v <= 1.0 + 1e-12));
        assert_symmetric(&w);
    }

    #[test]
    fn test_degenerate_sizes() {
        assert!(generate_window(WindowType::Hamming, 0).is_empty());
        assert_eq!(generate_window(WindowType::Kaiser(800), 1), vec![1.0]);
    }

    #[test]
    fn test_bessel_i0_known_values() {
        assert_abs_diff_eq!(bessel_i0(0.0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(bessel_i0(1.0), 1.2660658777, epsilon = 1e-8);
    }

    #[test]
    fn test_apply_window() {
        let mut data = vec![2.0, 3.0, 4.0];
        apply_window(&mut data, &[0.5, 1.0, 0.5]);
        assert_eq!(data, vec![1.0, 3.0, 2.0]);
    }
}
