use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::core::resample::Interpolation;
use crate::error::ProcessError;
use crate::stretch::params::Settings;

/// A single audio sample (32-bit float, nominal range -1.0 to 1.0).
pub type Sample = f32;

/// Accepted range for percentage rate/tempo changes.
pub const PERCENT_CHANGE_RANGE: RangeInclusive<f64> = -50.0..=100.0;
/// Accepted range for pitch changes in octaves.
pub const OCTAVE_RANGE: RangeInclusive<f64> = -1.0..=1.0;
/// Accepted range for pitch changes in semitones.
pub const SEMITONE_RANGE: RangeInclusive<f64> = -12.0..=12.0;
/// Accepted range for the effective rate and tempo seen by the pipeline.
pub const EFFECTIVE_RATIO_RANGE: RangeInclusive<f64> = 0.03125..=32.0;

/// Channel layout of an interleaved stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channels {
    Mono,
    Stereo,
}

impl Channels {
    /// Number of interleaved values per frame.
    #[inline]
    pub fn count(self) -> usize {
        match self {
            Channels::Mono => 1,
            Channels::Stereo => 2,
        }
    }

    /// Converts a raw channel count.
    ///
    /// # Errors
    /// Returns [`ProcessError::InvalidArgument`] unless `count` is 1 or 2.
    pub fn from_count(count: u32) -> Result<Self, ProcessError> {
        match count {
            1 => Ok(Channels::Mono),
            2 => Ok(Channels::Stereo),
            other => Err(ProcessError::InvalidArgument(format!(
                "channel count must be 1 or 2, got {}",
                other
            ))),
        }
    }
}

/// Converts a percentage change (`-50 ..= +100`) into a ratio.
pub fn percent_to_ratio(percent: f64) -> Result<f64, ProcessError> {
    check_range(percent, &PERCENT_CHANGE_RANGE, "percent change")?;
    Ok(1.0 + 0.01 * percent)
}

/// Converts a pitch change in octaves (`-1 ..= +1`) into a ratio.
pub fn octaves_to_ratio(octaves: f64) -> Result<f64, ProcessError> {
    check_range(octaves, &OCTAVE_RANGE, "octave change")?;
    Ok(octaves.exp2())
}

/// Converts a pitch change in semitones (`-12 ..= +12`) into a ratio.
pub fn semitones_to_ratio(semitones: f64) -> Result<f64, ProcessError> {
    check_range(semitones, &SEMITONE_RANGE, "semitone change")?;
    Ok((semitones / 12.0).exp2())
}

fn check_range(value: f64, range: &RangeInclusive<f64>, what: &str) -> Result<(), ProcessError> {
    if !value.is_finite() || !range.contains(&value) {
        return Err(ProcessError::InvalidArgument(format!(
            "{} {} outside {:?}",
            what, value, range
        )));
    }
    Ok(())
}

/// Validates a plain multiplicative ratio.
pub fn check_ratio(value: f64, what: &str) -> Result<f64, ProcessError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ProcessError::InvalidArgument(format!(
            "{} must be positive and finite, got {}",
            what, value
        )));
    }
    Ok(value)
}

/// Rate, tempo and pitch controls as multiplicative ratios.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Controls {
    /// Playback rate: changes duration and pitch together.
    pub rate: f64,
    /// Tempo: changes duration only.
    pub tempo: f64,
    /// Pitch: changes pitch only.
    pub pitch: f64,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            rate: 1.0,
            tempo: 1.0,
            pitch: 1.0,
        }
    }
}

impl Controls {
    /// Resampling ratio seen by the rate converter.
    #[inline]
    pub fn effective_rate(&self) -> f64 {
        self.rate * self.pitch
    }

    /// Duration ratio seen by the WSOLA engine.
    #[inline]
    pub fn effective_tempo(&self) -> f64 {
        self.tempo / self.pitch
    }

    /// Input frames consumed per output frame.
    #[inline]
    pub fn input_output_ratio(&self) -> f64 {
        self.rate * self.tempo
    }

    /// Validates every ratio and the effective ratios derived from them.
    ///
    /// # Errors
    /// Returns [`ProcessError::InvalidArgument`] if a ratio is not positive
    /// and finite, or if the effective rate or tempo leaves `1/32 ..= 32`.
    pub fn validate(&self) -> Result<(), ProcessError> {
        check_ratio(self.rate, "rate")?;
        check_ratio(self.tempo, "tempo")?;
        check_ratio(self.pitch, "pitch")?;
        check_range(self.effective_rate(), &EFFECTIVE_RATIO_RANGE, "effective rate")?;
        check_range(self.effective_tempo(), &EFFECTIVE_RATIO_RANGE, "effective tempo")
    }
}

/// Everything needed to build a [`StreamProcessor`](crate::StreamProcessor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Number of channels (1 = mono, 2 = stereo).
    pub channels: u32,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Initial rate/tempo/pitch.
    #[serde(default)]
    pub controls: Controls,
    /// Algorithm tuning.
    #[serde(default)]
    pub settings: Settings,
    /// Interpolation used by the rate converter.
    #[serde(default)]
    pub interpolation: Interpolation,
}

impl ProcessorConfig {
    /// Create a configuration with unity controls and default settings.
    pub fn new(channels: u32, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
            controls: Controls::default(),
            settings: Settings::default(),
            interpolation: Interpolation::default(),
        }
    }

    /// Set the playback rate ratio.
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.controls.rate = rate;
        self
    }

    /// Set the tempo ratio.
    pub fn with_tempo(mut self, tempo: f64) -> Self {
        self.controls.tempo = tempo;
        self
    }

    /// Set the pitch ratio.
    pub fn with_pitch(mut self, pitch: f64) -> Self {
        self.controls.pitch = pitch;
        self
    }

    /// Set the pitch in semitones.
    ///
    /// # Errors
    /// Returns [`ProcessError::InvalidArgument`] outside `-12 ..= +12`.
    pub fn with_pitch_semitones(mut self, semitones: f64) -> Result<Self, ProcessError> {
        self.controls.pitch = semitones_to_ratio(semitones)?;
        Ok(self)
    }

    /// Replace the algorithm settings.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Select the rate converter's interpolation.
    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// Validate all parameters.
    pub fn validate(&self) -> Result<(), ProcessError> {
        Channels::from_count(self.channels)?;
        if self.sample_rate == 0 {
            return Err(ProcessError::InvalidArgument(
                "sample rate must be greater than 0".to_string(),
            ));
        }
        self.controls.validate()?;
        self.settings.validate()
    }
}
