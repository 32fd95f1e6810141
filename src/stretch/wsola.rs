//! WSOLA (Waveform Similarity Overlap-Add) time stretching.

use log::{debug, warn};
use rustfft::{num_complex::Complex, FftPlanner};

use crate::core::sample_buffer::SampleBuffer;
use crate::error::ProcessError;
use crate::stretch::params::{FrameLayout, Settings};

/// Minimum energy threshold to avoid division by near-zero in correlation normalization.
const ENERGY_EPSILON: f64 = 1e-12;
/// Minimum number of candidates to justify FFT-based correlation over direct computation.
const FFT_CANDIDATE_THRESHOLD: usize = 64;
/// Minimum overlap length for FFT-based correlation to be worthwhile.
const FFT_OVERLAP_THRESHOLD: usize = 32;
/// Offset stride of the coarse quick-seek pass.
const QUICKSEEK_STRIDE: usize = 8;

/// Streaming WSOLA processor.
///
/// Changes duration by `1 / tempo` without touching pitch. Input is
/// consumed in sequences of `layout.sequence` frames; each sequence is
/// placed at the offset (within the seek window) whose leading overlap best
/// matches the tail kept from the previous sequence, then cross-faded into
/// that tail.
pub struct Wsola {
    channels: usize,
    sample_rate: u32,
    tempo: f64,
    settings: Settings,
    layout: FrameLayout,
    nominal_skip: f64,
    sample_req: usize,
    skip_fract: f64,
    is_beginning: bool,
    input: SampleBuffer,
    tail: Vec<f32>,
    frame: Vec<f32>,
    correlator: FftCorrelator,
}

impl Wsola {
    /// Creates a WSOLA processor at unity tempo.
    pub fn new(channels: usize, sample_rate: u32, settings: &Settings) -> Self {
        let channels = channels.max(1);
        let mut wsola = Self {
            channels,
            sample_rate: sample_rate.max(1),
            tempo: 1.0,
            settings: *settings,
            layout: FrameLayout::from_settings(settings, sample_rate.max(1), 1.0),
            nominal_skip: 0.0,
            sample_req: 0,
            skip_fract: 0.0,
            is_beginning: true,
            input: SampleBuffer::new(channels),
            tail: Vec::new(),
            frame: Vec::new(),
            correlator: FftCorrelator::new(),
        };
        wsola.update_layout();
        wsola
    }

    /// Returns the tempo ratio.
    #[inline]
    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Returns the frame sizes currently in use.
    #[inline]
    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// Input frames consumed per emitted sequence.
    #[inline]
    pub fn nominal_skip(&self) -> f64 {
        self.nominal_skip
    }

    /// Input frames that must be buffered before a sequence can be emitted.
    #[inline]
    pub fn sample_req(&self) -> usize {
        self.sample_req
    }

    /// Output frames emitted per sequence.
    #[inline]
    pub fn output_per_sequence(&self) -> usize {
        self.layout.sequence - self.layout.overlap
    }

    /// Frames waiting in the input buffer.
    #[inline]
    pub fn num_unprocessed(&self) -> usize {
        self.input.len()
    }

    /// Input buffer, for producers that write into it directly.
    #[inline]
    pub fn input_mut(&mut self) -> &mut SampleBuffer {
        &mut self.input
    }

    /// Sets the tempo ratio (>1 = shorter output).
    pub fn set_tempo(&mut self, tempo: f64) {
        if tempo.is_finite() && tempo > 0.0 {
            self.tempo = tempo;
            self.update_layout();
        }
    }

    /// Applies new tuning settings.
    pub fn set_settings(&mut self, settings: &Settings) {
        self.settings = *settings;
        self.update_layout();
    }

    /// Changes the sample rate used to convert millisecond settings.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.max(1);
        self.update_layout();
    }

    /// Changes the channel count, discarding buffered audio.
    pub fn set_channels(&mut self, channels: usize) {
        self.channels = channels.max(1);
        self.input.set_channels(self.channels);
        self.clear();
    }

    /// Appends interleaved input.
    pub fn put_samples(&mut self, samples: &[f32]) -> Result<(), ProcessError> {
        self.input.push_slice(samples)
    }

    /// Drops buffered input and the stored overlap tail.
    pub fn clear(&mut self) {
        self.input.clear();
        self.reset_stream();
    }

    fn reset_stream(&mut self) {
        self.tail.clear();
        self.tail.resize(self.layout.overlap * self.channels, 0.0);
        self.skip_fract = 0.0;
        self.is_beginning = true;
    }

    fn update_layout(&mut self) {
        let layout = FrameLayout::from_settings(&self.settings, self.sample_rate, self.tempo);
        let overlap_changed = layout.overlap != self.layout.overlap;
        self.layout = layout;

        let step = layout.sequence - layout.overlap;
        self.nominal_skip = self.tempo * step as f64;
        let int_skip = self.nominal_skip.round() as usize;
        self.sample_req = int_skip
            .saturating_add(layout.overlap)
            .max(layout.sequence)
            .saturating_add(layout.seek);

        if overlap_changed || self.tail.len() != layout.overlap * self.channels {
            self.tail.clear();
            self.tail.resize(layout.overlap * self.channels, 0.0);
        }
        debug!(
            "wsola layout: sequence={} seek={} overlap={} skip={:.2} req={}",
            layout.sequence, layout.seek, layout.overlap, self.nominal_skip, self.sample_req
        );
    }

    /// Emits every sequence the buffered input allows.
    ///
    /// Returns the number of frames appended to `output`.
    pub fn process(&mut self, output: &mut SampleBuffer) -> Result<usize, ProcessError> {
        let ch = self.channels;
        let overlap = self.layout.overlap;
        let sequence = self.layout.sequence;
        let mut emitted = 0;

        while self.input.len() >= self.sample_req {
            let offset = if self.is_beginning {
                0
            } else {
                self.best_offset()
            };
            let candidate = &self.input.as_slice()[offset * ch..(offset + sequence) * ch];

            self.frame.clear();
            if self.is_beginning {
                self.frame.extend_from_slice(&candidate[..overlap * ch]);
            } else {
                for i in 0..overlap {
                    let fade_in = i as f32 / overlap as f32;
                    let fade_out = 1.0 - fade_in;
                    for c in 0..ch {
                        let k = i * ch + c;
                        self.frame.push(self.tail[k] * fade_out + candidate[k] * fade_in);
                    }
                }
            }
            self.frame
                .extend_from_slice(&candidate[overlap * ch..(sequence - overlap) * ch]);
            self.tail
                .copy_from_slice(&candidate[(sequence - overlap) * ch..sequence * ch]);

            output.push_slice(&self.frame)?;
            emitted += sequence - overlap;
            self.is_beginning = false;

            self.skip_fract += self.nominal_skip;
            let skip = self.skip_fract as usize;
            self.skip_fract -= skip as f64;
            self.input.consume(skip);
        }

        Ok(emitted)
    }

    /// Pushes the remaining input through with trailing silence.
    ///
    /// Emits the output still owed for the buffered input, then resets the
    /// stream so the next input starts a fresh sequence. This is for WSOLA
    /// used on its own; [`StreamProcessor::flush`](crate::StreamProcessor::flush)
    /// pads the whole pipeline instead, since the resampler also holds frames.
    pub fn flush(&mut self, output: &mut SampleBuffer) -> Result<(), ProcessError> {
        let residual = self.input.len();
        // Input already accounted for by emitted sequences includes the carried fraction.
        let owed = (residual as f64 - self.skip_fract).max(0.0) / self.tempo;
        let target = output.len() + owed.round() as usize;
        let chunk = self.layout.overlap;
        let limit = residual
            .saturating_add(self.sample_req.saturating_mul(2))
            .saturating_add(chunk);

        let mut padded = 0;
        while output.len() < target && padded < limit {
            self.input.push_silence(chunk)?;
            padded += chunk;
            self.process(output)?;
        }
        if output.len() < target {
            warn!(
                "wsola flush stopped after {} frames of padding, {} of {} frames emitted",
                padded,
                output.len(),
                target
            );
        }
        output.truncate(target);
        self.clear();
        Ok(())
    }

    /// Picks the offset in `[0, seek)` whose leading overlap best matches the tail.
    fn best_offset(&mut self) -> usize {
        let candidates = self.layout.seek;
        if candidates <= 1 {
            return 0;
        }
        let ch = self.channels;
        let input = self.input.as_slice();

        if self.settings.use_quickseek {
            quick_seek(&self.tail, input, ch, candidates)
        } else if candidates > FFT_CANDIDATE_THRESHOLD
            && self.layout.overlap >= FFT_OVERLAP_THRESHOLD
        {
            self.correlator.best_offset(&self.tail, input, ch, candidates)
        } else {
            scan(&self.tail, input, ch, 0..candidates).0
        }
    }
}

/// Scores the given offsets, keeping the first maximum.
fn scan(
    reference: &[f32],
    input: &[f32],
    channels: usize,
    offsets: impl Iterator<Item = usize>,
) -> (usize, f64) {
    let len = reference.len();
    let mut best = (0, f64::NEG_INFINITY);
    for offset in offsets {
        let start = offset * channels;
        if start + len > input.len() {
            break;
        }
        let score = normalized_cross_correlation(reference, &input[start..start + len]);
        if score > best.1 {
            best = (offset, score);
        }
    }
    best
}

/// Coarse scan at a fixed stride, then a full-resolution pass around the winner.
fn quick_seek(reference: &[f32], input: &[f32], channels: usize, candidates: usize) -> usize {
    let (coarse, _) = scan(
        reference,
        input,
        channels,
        (0..candidates).step_by(QUICKSEEK_STRIDE),
    );
    let lo = coarse.saturating_sub(QUICKSEEK_STRIDE - 1);
    let hi = (coarse + QUICKSEEK_STRIDE).min(candidates);
    scan(reference, input, channels, lo..hi).0
}

/// FFT cross-correlation of the tail against every candidate at once.
struct FftCorrelator {
    planner: FftPlanner<f32>,
    ref_buf: Vec<Complex<f32>>,
    search_buf: Vec<Complex<f32>>,
    prefix_sq: Vec<f64>,
}

impl FftCorrelator {
    fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            ref_buf: Vec::new(),
            search_buf: Vec::new(),
            prefix_sq: Vec::new(),
        }
    }

    fn best_offset(
        &mut self,
        reference: &[f32],
        input: &[f32],
        channels: usize,
        candidates: usize,
    ) -> usize {
        let ref_len = reference.len();
        let region_len = ((candidates - 1) * channels + ref_len).min(input.len());
        if region_len < ref_len {
            return 0;
        }
        let search = &input[..region_len];

        let ref_energy: f64 = reference.iter().map(|&s| (s as f64) * (s as f64)).sum();
        if ref_energy < ENERGY_EPSILON {
            return 0;
        }

        let fft_size = (region_len + ref_len - 1).next_power_of_two();
        let fft_fwd = self.planner.plan_fft_forward(fft_size);
        let fft_inv = self.planner.plan_fft_inverse(fft_size);

        fill_complex(&mut self.ref_buf, reference, fft_size);
        fill_complex(&mut self.search_buf, search, fft_size);
        fft_fwd.process(&mut self.ref_buf);
        fft_fwd.process(&mut self.search_buf);
        for (s, r) in self.search_buf.iter_mut().zip(&self.ref_buf) {
            *s *= r.conj();
        }
        fft_inv.process(&mut self.search_buf);

        self.prefix_sq.clear();
        self.prefix_sq.push(0.0);
        let mut acc = 0.0f64;
        for &s in search {
            acc += (s as f64) * (s as f64);
            self.prefix_sq.push(acc);
        }

        let norm = 1.0 / fft_size as f64;
        let mut best_pos = 0;
        let mut best_score = f64::NEG_INFINITY;
        for k in 0..candidates {
            let lag = k * channels;
            if lag + ref_len > region_len {
                break;
            }
            let raw = self.search_buf[lag].re as f64 * norm;
            let energy = self.prefix_sq[lag + ref_len] - self.prefix_sq[lag];
            let denom = (ref_energy * energy).sqrt();
            let score = if denom > ENERGY_EPSILON { raw / denom } else { 0.0 };
            if score > best_score {
                best_score = score;
                best_pos = k;
            }
        }
        best_pos
    }
}

fn fill_complex(buf: &mut Vec<Complex<f32>>, signal: &[f32], size: usize) {
    buf.clear();
    buf.extend(signal.iter().map(|&s| Complex::new(s, 0.0)));
    buf.resize(size, Complex::new(0.0, 0.0));
}

/// Normalized cross-correlation between two signals.
#[inline]
fn normalized_cross_correlation(a: &[f32], b: &[f32]) -> f64 {
    let mut sum_ab = 0.0f64;
    let mut sum_a2 = 0.0f64;
    let mut sum_b2 = 0.0f64;

    for (&x, &y) in a.iter().zip(b) {
        let va = x as f64;
        let vb = y as f64;
        sum_ab += va * vb;
        sum_a2 += va * va;
        sum_b2 += vb * vb;
    }

    let denom = (sum_a2 * sum_b2).sqrt();
    if denom < ENERGY_EPSILON {
        return 0.0;
    }

    sum_ab / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sample_rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn stretch_all(wsola: &mut Wsola, input: &[f32], chunk: usize) -> Vec<f32> {
        let mut out = SampleBuffer::new(wsola.channels);
        for block in input.chunks(chunk) {
            wsola.put_samples(block).unwrap();
            wsola.process(&mut out).unwrap();
        }
        wsola.flush(&mut out).unwrap();
        out.as_slice().to_vec()
    }

    #[test]
    fn test_wsola_identity_length() {
        let sample_rate = 44100;
        let input = sine(440.0, sample_rate, sample_rate as usize);
        let mut wsola = Wsola::new(1, sample_rate, &Settings::default());
        let output = stretch_all(&mut wsola, &input, 4096);
        assert_eq!(output.len(), input.len());
    }

    #[test]
    fn test_wsola_tempo_ratios() {
        let sample_rate = 44100;
        let input = sine(440.0, sample_rate, sample_rate as usize * 2);
        for &tempo in &[0.5, 0.75, 1.25, 1.5, 2.0] {
            let mut wsola = Wsola::new(1, sample_rate, &Settings::default());
            wsola.set_tempo(tempo);
            let output = stretch_all(&mut wsola, &input, 2048);
            let expected = input.len() as f64 / tempo;
            assert!(
                (output.len() as f64 - expected).abs() <= 1.0,
                "tempo {}: {} frames, expected {:.0}",
                tempo,
                output.len(),
                expected
            );
        }
    }

    #[test]
    fn test_wsola_emits_only_with_enough_input() {
        let mut wsola = Wsola::new(1, 44100, &Settings::default());
        let mut out = SampleBuffer::new(1);
        let req = wsola.sample_req();
        wsola.put_samples(&vec![0.1; req - 1]).unwrap();
        assert_eq!(wsola.process(&mut out).unwrap(), 0);
        assert_eq!(wsola.num_unprocessed(), req - 1);

        wsola.put_samples(&[0.1]).unwrap();
        let emitted = wsola.process(&mut out).unwrap();
        assert_eq!(emitted, wsola.output_per_sequence());
        assert_eq!(out.len(), emitted);
    }

    #[test]
    fn test_wsola_stereo_keeps_channels_apart() {
        let sample_rate = 22050;
        let left = sine(300.0, sample_rate, 22050);
        let input: Vec<f32> = left.iter().flat_map(|&s| [s, 0.0]).collect();
        let mut wsola = Wsola::new(2, sample_rate, &Settings::default());
        wsola.set_tempo(1.3);
        let output = stretch_all(&mut wsola, &input, 1000);
        assert_eq!(output.len() % 2, 0);
        assert!(output.iter().skip(1).step_by(2).all(|&r| r == 0.0));
        assert!(output.iter().step_by(2).any(|&l| l.abs() > 0.5));
    }

    #[test]
    fn test_wsola_silence_in_silence_out() {
        let mut wsola = Wsola::new(2, 44100, &Settings::default());
        wsola.set_tempo(0.8);
        let output = stretch_all(&mut wsola, &vec![0.0; 20000], 3000);
        assert!(!output.is_empty());
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_zero_length_seek_window() {
        // At 20 Hz the seek window rounds to a single candidate.
        let mut wsola = Wsola::new(1, 20, &Settings::default());
        wsola.set_tempo(1.5);
        let input: Vec<f32> = (0..600).map(|i| (i as f32 * 0.3).sin()).collect();
        let output = stretch_all(&mut wsola, &input, 7);
        assert_eq!(output.len(), 400);
        assert!(output.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_huge_tempo_saturates_sample_req() {
        let mut wsola = Wsola::new(1, 44100, &Settings::default());
        wsola.set_tempo(1e20);
        assert_eq!(wsola.sample_req(), usize::MAX);

        let mut out = SampleBuffer::new(1);
        wsola.put_samples(&vec![0.25; 1000]).unwrap();
        assert_eq!(wsola.process(&mut out).unwrap(), 0);
        wsola.flush(&mut out).unwrap();
        assert!(out.is_empty());
        assert_eq!(wsola.num_unprocessed(), 0);
    }

    #[test]
    fn test_flush_without_input_is_noop() {
        let mut wsola = Wsola::new(1, 44100, &Settings::default());
        let mut out = SampleBuffer::new(1);
        wsola.flush(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_full_search_picks_first_maximum() {
        // A period-4 pattern matches the reference at offsets 0, 4 and 8.
        let pattern = [1.0f32, 0.0, -1.0, 0.0];
        let input: Vec<f32> = pattern.iter().cycle().take(32).copied().collect();
        let reference = &input[0..8];
        let (best, score) = scan(reference, &input, 1, 0..10);
        assert_eq!(best, 0);
        assert!((score - 1.0).abs() < 1e-9);

        let (shifted, _) = scan(reference, &input, 1, 1..10);
        assert_eq!(shifted, 4);
    }

    #[test]
    fn test_quick_seek_finds_isolated_peak() {
        let mut input = vec![0.0f32; 400];
        let reference: Vec<f32> = (0..16).map(|i| ((i * 7) % 5) as f32 - 2.0).collect();
        input[213..229].copy_from_slice(&reference);
        // Spread some energy so the coarse pass sees a slope toward the peak.
        for (i, s) in input.iter_mut().enumerate() {
            if !(213..229).contains(&i) {
                *s = 0.01 * ((i as f32) * 0.37).sin();
            }
        }
        let full = scan(&reference, &input, 1, 0..300).0;
        assert_eq!(full, 213);
        let quick = quick_seek(&reference, &input, 1, 300);
        assert!(quick.abs_diff(213) < QUICKSEEK_STRIDE);
    }

    #[test]
    fn test_fft_search_matches_direct() {
        let mut state = 0x2545_f491u32;
        let input: Vec<f32> = (0..3000)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 24) as f32 - 0.5
            })
            .collect();
        let reference = input[700..700 + 441].to_vec();

        let direct = scan(&reference, &input, 1, 0..1103).0;
        let mut correlator = FftCorrelator::new();
        let fft = correlator.best_offset(&reference, &input, 1, 1103);
        assert_eq!(direct, 700);
        assert_eq!(fft, 700);
    }

    #[test]
    fn test_fft_zero_reference_returns_first_offset() {
        let mut correlator = FftCorrelator::new();
        let input = sine(100.0, 8000, 2000);
        assert_eq!(correlator.best_offset(&[0.0; 64], &input, 1, 500), 0);
    }

    #[test]
    fn test_normalized_cross_correlation() {
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let c = normalized_cross_correlation(&a, &a);
        assert!((c - 1.0).abs() < 1e-9, "Self-correlation should be 1.0, got {}", c);

        let neg: Vec<f32> = a.iter().map(|x| -x).collect();
        let c_neg = normalized_cross_correlation(&a, &neg);
        assert!((c_neg + 1.0).abs() < 1e-9, "Negated correlation should be -1.0, got {}", c_neg);

        assert_eq!(normalized_cross_correlation(&[0.0; 4], &a), 0.0);
    }
}
