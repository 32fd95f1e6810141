//! Rate conversion and WSOLA chained into one pitch/tempo pipeline.

use crate::core::resample::{Interpolation, RateTransposer};
use crate::core::sample_buffer::SampleBuffer;
use crate::error::ProcessError;
use crate::stretch::params::Settings;
use crate::stretch::wsola::Wsola;

/// Ratios this close to 1.0 skip the rate converter entirely.
const UNITY_TOLERANCE: f64 = 1e-10;

/// Which stage sees the input first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOrder {
    /// Rate converter bypassed.
    StretchOnly,
    /// WSOLA first, then decimation (`rate > 1`).
    StretchFirst,
    /// Interpolation first, then WSOLA (`rate < 1`).
    TransposeFirst,
}

impl StageOrder {
    fn for_rate(rate: f64) -> Self {
        if (rate - 1.0).abs() < UNITY_TOLERANCE {
            StageOrder::StretchOnly
        } else if rate > 1.0 {
            StageOrder::StretchFirst
        } else {
            StageOrder::TransposeFirst
        }
    }
}

/// Resampler plus WSOLA, driven by effective rate and tempo ratios.
///
/// Resampling by `rate` shifts pitch and shortens the signal by `rate`;
/// WSOLA then corrects duration by `tempo`. The stage that shrinks the
/// signal runs first so the other one sees fewer frames.
pub struct PitchShifter {
    transposer: RateTransposer,
    stretch: Wsola,
    intermediate: SampleBuffer,
    rate: f64,
    tempo: f64,
    order: StageOrder,
    channels: usize,
}

impl PitchShifter {
    /// Creates a pipeline at unity rate and tempo.
    pub fn new(
        channels: usize,
        sample_rate: u32,
        settings: &Settings,
        interpolation: Interpolation,
    ) -> Result<Self, ProcessError> {
        let channels = channels.max(1);
        let mut transposer =
            RateTransposer::new(channels, interpolation, settings.aa_filter_length as usize)?;
        transposer.set_use_filter(settings.use_aa_filter);
        Ok(Self {
            transposer,
            stretch: Wsola::new(channels, sample_rate, settings),
            intermediate: SampleBuffer::new(channels),
            rate: 1.0,
            tempo: 1.0,
            order: StageOrder::StretchOnly,
            channels,
        })
    }

    /// Effective resampling ratio.
    #[inline]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Effective WSOLA tempo.
    #[inline]
    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    #[inline]
    pub fn order(&self) -> StageOrder {
        self.order
    }

    /// The WSOLA stage.
    #[inline]
    pub fn stretch(&self) -> &Wsola {
        &self.stretch
    }

    /// The resampling stage.
    #[inline]
    pub fn transposer(&self) -> &RateTransposer {
        &self.transposer
    }

    /// Sets the effective ratios. Switching stage order drops the few frames
    /// the resampler carries.
    pub fn set_ratios(&mut self, rate: f64, tempo: f64) {
        self.rate = rate;
        self.tempo = tempo;
        self.transposer.set_rate(rate);
        self.stretch.set_tempo(tempo);

        let order = StageOrder::for_rate(rate);
        if order != self.order {
            self.transposer.clear();
            self.order = order;
        }
    }

    /// Applies tuning settings to both stages.
    pub fn set_settings(&mut self, settings: &Settings) -> Result<(), ProcessError> {
        self.transposer
            .set_filter_length(settings.aa_filter_length as usize)?;
        self.transposer.set_use_filter(settings.use_aa_filter);
        self.stretch.set_settings(settings);
        Ok(())
    }

    /// Changes the sample rate, keeping buffered audio.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.stretch.set_sample_rate(sample_rate);
    }

    /// Changes the rate converter's interpolation.
    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        self.transposer.set_interpolation(interpolation);
    }

    /// Changes the channel count, discarding all buffered audio.
    pub fn set_channels(&mut self, channels: usize) {
        self.channels = channels.max(1);
        self.transposer.set_channels(self.channels);
        self.stretch.set_channels(self.channels);
        self.intermediate.set_channels(self.channels);
    }

    /// Runs `input` through both stages, appending finished audio to `output`.
    pub fn process(
        &mut self,
        input: &[f32],
        output: &mut SampleBuffer,
    ) -> Result<(), ProcessError> {
        match self.order {
            StageOrder::StretchOnly => {
                self.stretch.put_samples(input)?;
                self.stretch.process(output)?;
            }
            StageOrder::StretchFirst => {
                self.stretch.put_samples(input)?;
                if self.stretch.process(&mut self.intermediate)? > 0 {
                    self.transposer.process(self.intermediate.as_slice(), output)?;
                    self.intermediate.clear();
                }
            }
            StageOrder::TransposeFirst => {
                self.transposer.process(input, self.stretch.input_mut())?;
                self.stretch.process(output)?;
            }
        }
        Ok(())
    }

    /// Drops all buffered audio in both stages.
    pub fn clear(&mut self) {
        self.transposer.clear();
        self.stretch.clear();
        self.intermediate.clear();
    }

    /// Frames waiting in front of the WSOLA stage.
    pub fn num_unprocessed(&self) -> usize {
        self.stretch.num_unprocessed()
    }

    /// Silence chunk size used when flushing, in input frames.
    pub fn flush_chunk(&self) -> usize {
        self.stretch.layout().overlap.max(1)
    }

    /// Upper bound on the input frames needed to prime both stages.
    pub fn flush_margin(&self) -> usize {
        let rate = self.rate.max(1.0);
        let tempo = self.tempo.max(1.0);
        let stretch = self.stretch.sample_req() as f64 * rate;
        let filter = (self.transposer.latency() as f64 * 2.0 + 4.0) * rate * tempo;
        // Float-to-int casts saturate.
        (2.0 * (stretch + filter) + self.flush_chunk() as f64).ceil() as usize
    }

    /// Input frames consumed per WSOLA step.
    pub fn nominal_input_sequence(&self) -> usize {
        let size = self.stretch.nominal_skip();
        match self.order {
            StageOrder::TransposeFirst => (size * self.rate).round() as usize,
            _ => size.round() as usize,
        }
    }

    /// Output frames produced per WSOLA step.
    pub fn nominal_output_sequence(&self) -> usize {
        let size = self.stretch.output_per_sequence();
        match self.order {
            StageOrder::StretchFirst => (size as f64 / self.rate).round() as usize,
            _ => size,
        }
    }

    /// Input frames that must arrive before the first output appears.
    pub fn initial_latency(&self) -> usize {
        let req = self.stretch.sample_req();
        let filter = self.transposer.latency();
        match self.order {
            StageOrder::StretchOnly => req,
            StageOrder::StretchFirst => {
                req.saturating_add((filter as f64 * self.tempo).round() as usize)
            }
            StageOrder::TransposeFirst => {
                (req.saturating_add(filter) as f64 * self.rate).round() as usize
            }
        }
    }
}
