//! Streaming sample-rate conversion via linear or cubic interpolation.

use serde::{Deserialize, Serialize};

use crate::core::fir::AntiAliasFilter;
use crate::core::sample_buffer::SampleBuffer;
use crate::error::ProcessError;

/// Interpolation kernel used by [`RateTransposer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolation {
    /// Two-point linear interpolation.
    #[default]
    Linear,
    /// Four-point Hermite interpolation.
    Cubic,
}

impl Interpolation {
    /// Frames kept from the previous block.
    #[inline]
    fn history_frames(self) -> usize {
        match self {
            Interpolation::Linear => 1,
            Interpolation::Cubic => 3,
        }
    }

    /// Frames needed after the read position.
    #[inline]
    fn lookahead(self) -> usize {
        match self {
            Interpolation::Linear => 1,
            Interpolation::Cubic => 2,
        }
    }
}

/// 4-point Hermite interpolation between `s1` and `s2`.
#[inline]
fn hermite(s0: f32, s1: f32, s2: f32, s3: f32, frac: f32) -> f32 {
    let c1 = 0.5 * (s2 - s0);
    let c2 = s0 - 2.5 * s1 + 2.0 * s2 - 0.5 * s3;
    let c3 = 0.5 * (s3 - s0) + 1.5 * (s1 - s2);
    ((c3 * frac + c2) * frac + c1) * frac + s1
}

/// Streaming resampler that changes playback rate (and therefore pitch).
///
/// A rate of `r` reads the input at positions advancing by `r` per output
/// frame, so `n` input frames become roughly `n / r` output frames. The
/// fractional read position and the last input frames carry over between
/// calls. When enabled, the anti-alias filter runs before decimation
/// (`r > 1`) or after interpolation (`r < 1`).
#[derive(Debug, Clone)]
pub struct RateTransposer {
    rate: f64,
    channels: usize,
    interpolation: Interpolation,
    position: f64,
    history: Vec<f32>,
    scratch: Vec<f32>,
    staged: Vec<f32>,
    filter: AntiAliasFilter,
    use_filter: bool,
}

impl RateTransposer {
    /// Creates a transposer at unity rate.
    pub fn new(
        channels: usize,
        interpolation: Interpolation,
        filter_length: usize,
    ) -> Result<Self, ProcessError> {
        let channels = channels.max(1);
        Ok(Self {
            rate: 1.0,
            channels,
            interpolation,
            position: 0.0,
            history: Vec::new(),
            scratch: Vec::new(),
            staged: Vec::new(),
            filter: AntiAliasFilter::new(filter_length, channels)?,
            use_filter: true,
        })
    }

    /// Returns the current rate.
    #[inline]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Returns the interpolation kernel.
    #[inline]
    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// Returns whether the anti-alias filter is active.
    #[inline]
    pub fn uses_filter(&self) -> bool {
        self.use_filter
    }

    /// Frames of delay added by the anti-alias filter.
    pub fn latency(&self) -> usize {
        if self.use_filter {
            self.filter.latency()
        } else {
            0
        }
    }

    /// Sets the conversion ratio; the filter cutoff follows it.
    pub fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
        self.filter.set_rate(rate);
    }

    /// Enables or disables the anti-alias filter.
    pub fn set_use_filter(&mut self, enabled: bool) {
        if enabled != self.use_filter {
            self.use_filter = enabled;
            self.filter.reset();
        }
    }

    /// Changes the anti-alias filter length.
    pub fn set_filter_length(&mut self, length: usize) -> Result<(), ProcessError> {
        self.filter.set_length(length)
    }

    /// Changes the interpolation kernel, dropping carried frames.
    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        if interpolation != self.interpolation {
            self.interpolation = interpolation;
            self.history.clear();
            self.position = 0.0;
        }
    }

    /// Changes the channel count and resets all state.
    pub fn set_channels(&mut self, channels: usize) {
        self.channels = channels.max(1);
        self.filter.set_channels(self.channels);
        self.clear();
    }

    /// Drops carried frames and filter history.
    pub fn clear(&mut self) {
        self.position = 0.0;
        self.history.clear();
        self.filter.reset();
    }

    /// Resamples `input` and appends the result to `output`.
    ///
    /// # Errors
    /// [`ProcessError::ResourceExhausted`] if the output cannot be allocated.
    pub fn process(
        &mut self,
        input: &[f32],
        output: &mut SampleBuffer,
    ) -> Result<(), ProcessError> {
        let mut staged = std::mem::take(&mut self.staged);
        staged.clear();
        let expected = self.expected_output_len(input.len());
        reserve(&mut staged, expected)?;

        if self.use_filter && self.rate > 1.0 {
            let mut filtered = Vec::with_capacity(input.len());
            self.filter.process(input, &mut filtered);
            self.interpolate(&filtered, &mut staged);
        } else if self.use_filter && self.rate < 1.0 {
            let mut interpolated = Vec::new();
            reserve(&mut interpolated, expected)?;
            self.interpolate(input, &mut interpolated);
            self.filter.process(&interpolated, &mut staged);
        } else {
            self.interpolate(input, &mut staged);
        }

        let result = output.push_slice(&staged);
        self.staged = staged;
        result
    }

    /// Upper bound on the samples one call appends for `input_len` samples.
    fn expected_output_len(&self, input_len: usize) -> usize {
        let frames = (input_len + self.history.len()) / self.channels;
        let out_frames = (frames as f64 / self.rate).ceil() + 1.0;
        (out_frames as usize).saturating_mul(self.channels)
    }

    fn interpolate(&mut self, input: &[f32], out: &mut Vec<f32>) {
        let ch = self.channels;
        self.scratch.clear();
        self.scratch.extend_from_slice(&self.history);
        self.scratch
            .extend_from_slice(&input[..input.len() / ch * ch]);

        let frames = self.scratch.len() / ch;
        let lookahead = self.interpolation.lookahead();
        let s = &self.scratch;

        while (self.position as usize) + lookahead < frames {
            let idx = self.position as usize;
            let frac = (self.position - idx as f64) as f32;
            for c in 0..ch {
                let at = |i: usize| s[i * ch + c];
                let value = match self.interpolation {
                    Interpolation::Linear => at(idx) + (at(idx + 1) - at(idx)) * frac,
                    Interpolation::Cubic => hermite(
                        at(idx.saturating_sub(1)),
                        at(idx),
                        at(idx + 1),
                        at(idx + 2),
                        frac,
                    ),
                };
                out.push(value);
            }
            self.position += self.rate;
        }

        let retained = self.interpolation.history_frames().min(frames);
        self.position -= (frames - retained) as f64;
        self.history.clear();
        self.history
            .extend_from_slice(&self.scratch[(frames - retained) * ch..]);
    }
}

fn reserve(buf: &mut Vec<f32>, additional: usize) -> Result<(), ProcessError> {
    buf.try_reserve(additional)
        .map_err(|_| ProcessError::ResourceExhausted {
            requested: additional,
        })
}
