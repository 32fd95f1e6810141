//! Streaming anti-alias low-pass filter used around rate conversion.

use std::f64::consts::PI;

use crate::core::window::{apply_window, generate_window, WindowType};
use crate::error::ProcessError;

/// Shortest accepted filter.
pub const MIN_FILTER_LENGTH: usize = 8;
/// Longest accepted filter.
pub const MAX_FILTER_LENGTH: usize = 128;

/// Symmetric windowed-sinc FIR low-pass over interleaved audio.
///
/// Coefficients are normalized to unity DC gain. The last `length - 1`
/// frames of input are carried between calls so consecutive blocks filter
/// exactly like one long block.
#[derive(Debug, Clone)]
pub struct AntiAliasFilter {
    length: usize,
    cutoff: f64,
    window: WindowType,
    channels: usize,
    coeffs: Vec<f32>,
    history: Vec<f32>,
    scratch: Vec<f32>,
}

impl AntiAliasFilter {
    /// Creates a filter with `length` taps and the full-band cutoff (0.5).
    ///
    /// # Errors
    /// Returns [`ProcessError::InvalidArgument`] unless `length` is even and
    /// within `8..=128`.
    pub fn new(length: usize, channels: usize) -> Result<Self, ProcessError> {
        validate_length(length)?;
        let channels = channels.max(1);
        let mut filter = Self {
            length,
            cutoff: 0.5,
            window: WindowType::default(),
            channels,
            coeffs: Vec::new(),
            history: vec![0.0; (length - 1) * channels],
            scratch: Vec::new(),
        };
        filter.design();
        Ok(filter)
    }

    /// Number of taps.
    #[inline]
    pub fn length(&self) -> usize {
        self.length
    }

    /// Normalized cutoff frequency (cycles per sample).
    #[inline]
    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Group delay in frames.
    #[inline]
    pub fn latency(&self) -> usize {
        self.length / 2
    }

    /// Filter coefficients.
    #[inline]
    pub fn coefficients(&self) -> &[f32] {
        &self.coeffs
    }

    /// Changes the tap count and clears the history.
    pub fn set_length(&mut self, length: usize) -> Result<(), ProcessError> {
        validate_length(length)?;
        if length != self.length {
            self.length = length;
            self.design();
            self.reset();
        }
        Ok(())
    }

    /// Sets the normalized cutoff, clamped to `(0, 0.5]`.
    pub fn set_cutoff(&mut self, cutoff: f64) {
        let cutoff = if cutoff.is_finite() {
            cutoff.clamp(1e-4, 0.5)
        } else {
            0.5
        };
        if (cutoff - self.cutoff).abs() > f64::EPSILON {
            self.cutoff = cutoff;
            self.design();
        }
    }

    /// Sets the cutoff for a conversion of ratio `rate` (input frames per output frame).
    pub fn set_rate(&mut self, rate: f64) {
        if rate > 1.0 {
            self.set_cutoff(0.5 / rate);
        } else {
            self.set_cutoff(0.5 * rate);
        }
    }

    /// Changes the window shape.
    pub fn with_window(mut self, window: WindowType) -> Self {
        self.window = window;
        self.design();
        self
    }

    /// Changes the channel count and clears the history.
    pub fn set_channels(&mut self, channels: usize) {
        self.channels = channels.max(1);
        self.reset();
    }

    /// Zeroes the carried history.
    pub fn reset(&mut self) {
        self.history.clear();
        self.history.resize((self.length - 1) * self.channels, 0.0);
    }

    /// Filters `input`, appending exactly as many frames to `output`.
    pub fn process(&mut self, input: &[f32], output: &mut Vec<f32>) {
        let ch = self.channels;
        let frames = input.len() / ch;
        if frames == 0 {
            return;
        }

        self.scratch.clear();
        self.scratch.extend_from_slice(&self.history);
        self.scratch.extend_from_slice(&input[..frames * ch]);

        output.reserve(frames * ch);
        for j in 0..frames {
            for c in 0..ch {
                let mut acc = 0.0f32;
                for (k, &h) in self.coeffs.iter().enumerate() {
                    acc += self.scratch[(j + k) * ch + c] * h;
                }
                output.push(acc);
            }
        }

        let keep = self.history.len();
        let tail = self.scratch.len() - keep;
        self.history.copy_from_slice(&self.scratch[tail..]);
    }

    fn design(&mut self) {
        let n = self.length;
        let center = (n - 1) as f64 / 2.0;
        let fc = self.cutoff;
        let mut taps: Vec<f64> = (0..n)
            .map(|i| {
                let m = i as f64 - center;
                2.0 * fc * sinc(2.0 * fc * m)
            })
            .collect();
        apply_window(&mut taps, &generate_window(self.window, n));

        let sum: f64 = taps.iter().sum();
        let gain = if sum.abs() > 1e-12 { 1.0 / sum } else { 1.0 };
        self.coeffs = taps.iter().map(|&t| (t * gain) as f32).collect();
    }
}

fn validate_length(length: usize) -> Result<(), ProcessError> {
    if !(MIN_FILTER_LENGTH..=MAX_FILTER_LENGTH).contains(&length) || length % 2 != 0 {
        return Err(ProcessError::InvalidArgument(format!(
            "anti-alias filter length must be even and within {}..={}, got {}",
            MIN_FILTER_LENGTH, MAX_FILTER_LENGTH, length
        )));
    }
    Ok(())
}

#[inline]
fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn tone(freq: f64, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| (2.0 * PI * freq * i as f64).sin() as f32)
            .collect()
    }

    fn rms(x: &[f32]) -> f32 {
        (x.iter().map(|s| s * s).sum::<f32>() / x.len() as f32).sqrt()
    }

    #[test]
    fn test_rejects_bad_lengths() {
        assert!(AntiAliasFilter::new(6, 1).is_err());
        assert!(AntiAliasFilter::new(33, 1).is_err());
        assert!(AntiAliasFilter::new(130, 1).is_err());
        assert!(AntiAliasFilter::new(8, 1).is_ok());
        assert!(AntiAliasFilter::new(128, 2).is_ok());
    }

    #[test]
    fn test_unity_dc_gain_and_symmetry() {
        let mut filter = AntiAliasFilter::new(32, 1).unwrap();
        filter.set_rate(2.0);
        let h = filter.coefficients();
        let sum: f32 = h.iter().sum();
        assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-5);
        for i in 0..16 {
            assert_abs_diff_eq!(h[i], h[31 - i], epsilon = 1e-7);
        }
    }

    #[test]
    fn test_cutoff_tracks_rate() {
        let mut filter = AntiAliasFilter::new(32, 1).unwrap();
        filter.set_rate(2.0);
        assert_abs_diff_eq!(filter.cutoff(), 0.25);
        filter.set_rate(0.5);
        assert_abs_diff_eq!(filter.cutoff(), 0.25);
        filter.set_rate(1.0);
        assert_abs_diff_eq!(filter.cutoff(), 0.5);
    }

    #[test]
    fn test_attenuates_above_cutoff() {
        let mut filter = AntiAliasFilter::new(64, 1).unwrap();
        filter.set_cutoff(0.1);

        let mut low = Vec::new();
        filter.process(&tone(0.02, 4096), &mut low);
        filter.reset();
        let mut high = Vec::new();
        filter.process(&tone(0.35, 4096), &mut high);

        let low_rms = rms(&low[256..]);
        let high_rms = rms(&high[256..]);
        assert!(low_rms > 0.6, "passband rms {}", low_rms);
        assert!(high_rms < 0.05, "stopband rms {}", high_rms);
    }

    #[test]
    fn test_block_processing_matches_single_pass() {
        let input = tone(0.05, 1000);
        let mut one = AntiAliasFilter::new(16, 1).unwrap();
        one.set_cutoff(0.2);
        let mut whole = Vec::new();
        one.process(&input, &mut whole);

        let mut chunked = AntiAliasFilter::new(16, 1).unwrap();
        chunked.set_cutoff(0.2);
        let mut parts = Vec::new();
        for block in input.chunks(77) {
            chunked.process(block, &mut parts);
        }

        assert_eq!(whole.len(), parts.len());
        for (a, b) in whole.iter().zip(&parts) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_window_choice_keeps_unity_gain() {
        for window in [WindowType::Hann, WindowType::Blackman, WindowType::Kaiser(800)] {
            let mut filter = AntiAliasFilter::new(48, 1).unwrap().with_window(window);
            filter.set_cutoff(0.2);
            let sum: f32 = filter.coefficients().iter().sum();
            assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_stereo_channels_stay_separate() {
        let mut filter = AntiAliasFilter::new(8, 2).unwrap();
        let input: Vec<f32> = (0..200).flat_map(|_| [1.0f32, 0.0]).collect();
        let mut out = Vec::new();
        filter.process(&input, &mut out);
        let (l, r) = (out[out.len() - 2], out[out.len() - 1]);
        assert_abs_diff_eq!(l, 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(r, 0.0, epsilon = 1e-7);
    }
}
