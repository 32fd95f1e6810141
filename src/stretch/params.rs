//! Tuning settings and the frame layout derived from them.

use std::ops::RangeInclusive;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::fir::{MAX_FILTER_LENGTH, MIN_FILTER_LENGTH};
use crate::error::ProcessError;

/// Tempo at which automatic sequence/seek lengths reach their maximum.
const AUTO_TEMPO_LOW: f64 = 0.5;
/// Tempo at which automatic sequence/seek lengths reach their minimum.
const AUTO_TEMPO_HIGH: f64 = 2.0;
const AUTO_SEQUENCE_MS: (f64, f64) = (90.0, 40.0);
const AUTO_SEEK_MS: (f64, f64) = (20.0, 15.0);

/// Settings keys, numbered as seen across a binding boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Setting {
    /// Enable the anti-alias filter (0/1).
    UseAaFilter = 0,
    /// Anti-alias filter taps (8..=128, even).
    AaFilterLength = 1,
    /// Enable coarse-to-fine overlap search (0/1).
    UseQuickseek = 2,
    /// WSOLA sequence length in ms (0 = automatic).
    SequenceMs = 3,
    /// Overlap search window in ms (0 = automatic).
    SeekwindowMs = 4,
    /// Cross-fade length in ms.
    OverlapMs = 5,
    /// Read-only: input frames consumed per processing step.
    NominalInputSequence = 6,
    /// Read-only: output frames produced per processing step.
    NominalOutputSequence = 7,
    /// Read-only: input frames needed before the first output.
    InitialLatency = 8,
}

impl Setting {
    /// All keys in id order.
    pub const ALL: [Setting; 9] = [
        Setting::UseAaFilter,
        Setting::AaFilterLength,
        Setting::UseQuickseek,
        Setting::SequenceMs,
        Setting::SeekwindowMs,
        Setting::OverlapMs,
        Setting::NominalInputSequence,
        Setting::NominalOutputSequence,
        Setting::InitialLatency,
    ];

    /// Looks up a key by its numeric id.
    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.id() == id)
    }

    /// Numeric id.
    #[inline]
    pub fn id(self) -> i32 {
        self as i32
    }

    /// True for keys that report derived values and cannot be set.
    #[inline]
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            Setting::NominalInputSequence | Setting::NominalOutputSequence | Setting::InitialLatency
        )
    }

    /// Accepted values for a writable key.
    pub fn range(self) -> Option<RangeInclusive<i32>> {
        match self {
            Setting::UseAaFilter | Setting::UseQuickseek => Some(0..=1),
            Setting::AaFilterLength => Some(MIN_FILTER_LENGTH as i32..=MAX_FILTER_LENGTH as i32),
            Setting::SequenceMs => Some(10..=500),
            Setting::SeekwindowMs => Some(5..=100),
            Setting::OverlapMs => Some(1..=50),
            _ => None,
        }
    }

    /// Checks `value` against this key's constraints.
    pub fn validate(self, value: i32) -> Result<(), ProcessError> {
        let Some(range) = self.range() else {
            return Err(ProcessError::InvalidArgument(format!(
                "{:?} is read-only",
                self
            )));
        };
        let automatic = value == 0 && matches!(self, Setting::SequenceMs | Setting::SeekwindowMs);
        let even = self != Setting::AaFilterLength || value % 2 == 0;
        if !(automatic || range.contains(&value)) || !even {
            return Err(ProcessError::InvalidArgument(format!(
                "{:?} = {} outside {:?}{}",
                self,
                value,
                range,
                if self == Setting::AaFilterLength { " (even values only)" } else { "" }
            )));
        }
        Ok(())
    }
}

/// Writable algorithm settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub use_aa_filter: bool,
    pub aa_filter_length: u32,
    pub use_quickseek: bool,
    /// 0 selects an automatic, tempo-dependent length.
    pub sequence_ms: u32,
    /// 0 selects an automatic, tempo-dependent length.
    pub seekwindow_ms: u32,
    pub overlap_ms: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            use_aa_filter: true,
            aa_filter_length: 32,
            use_quickseek: false,
            sequence_ms: 80,
            seekwindow_ms: 25,
            overlap_ms: 10,
        }
    }
}

impl Settings {
    /// Reads a writable key. Read-only keys return `None`; they depend on
    /// processor state and are answered by the processor.
    pub fn get(&self, key: Setting) -> Option<i32> {
        let value = match key {
            Setting::UseAaFilter => self.use_aa_filter as i32,
            Setting::AaFilterLength => self.aa_filter_length as i32,
            Setting::UseQuickseek => self.use_quickseek as i32,
            Setting::SequenceMs => self.sequence_ms as i32,
            Setting::SeekwindowMs => self.seekwindow_ms as i32,
            Setting::OverlapMs => self.overlap_ms as i32,
            _ => return None,
        };
        Some(value)
    }

    /// Writes a key. Leaves `self` untouched on error.
    pub fn set(&mut self, key: Setting, value: i32) -> Result<(), ProcessError> {
        key.validate(value)?;
        match key {
            Setting::UseAaFilter => self.use_aa_filter = value != 0,
            Setting::AaFilterLength => self.aa_filter_length = value as u32,
            Setting::UseQuickseek => self.use_quickseek = value != 0,
            Setting::SequenceMs => self.sequence_ms = value as u32,
            Setting::SeekwindowMs => self.seekwindow_ms = value as u32,
            Setting::OverlapMs => self.overlap_ms = value as u32,
            _ => unreachable!("read-only keys fail validation"),
        }
        Ok(())
    }

    /// Validates every field.
    pub fn validate(&self) -> Result<(), ProcessError> {
        for key in Setting::ALL.iter().copied().filter(|k| !k.is_read_only()) {
            if let Some(value) = self.get(key) {
                key.validate(value)?;
            }
        }
        Ok(())
    }

    /// Serializes to pretty JSON.
    pub fn to_json(&self) -> Result<String, ProcessError> {
        serde_json::to_string_pretty(self).map_err(|e| {
            ProcessError::InvalidFormat(format!("failed to serialize settings: {}", e))
        })
    }

    /// Parses and validates settings from JSON. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ProcessError> {
        let settings: Settings = serde_json::from_str(json)
            .map_err(|e| ProcessError::InvalidFormat(format!("failed to parse settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }
}

/// Writes a settings profile as JSON.
pub fn write_settings_json(path: &Path, settings: &Settings) -> Result<(), ProcessError> {
    std::fs::write(path, settings.to_json()?)?;
    Ok(())
}

/// Reads a settings profile from JSON.
pub fn read_settings_json(path: &Path) -> Result<Settings, ProcessError> {
    let data = std::fs::read_to_string(path)?;
    Settings::from_json(&data).map_err(|e| match e {
        ProcessError::InvalidFormat(msg) => {
            ProcessError::InvalidFormat(format!("{} ({})", msg, path.display()))
        }
        other => other,
    })
}

/// WSOLA frame sizes in frames (samples per channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    /// Length of each processed sequence, including both overlaps.
    pub sequence: usize,
    /// Number of candidate offsets searched.
    pub seek: usize,
    /// Cross-fade length.
    pub overlap: usize,
}

impl FrameLayout {
    /// Derives frame sizes for `sample_rate` and the effective `tempo`.
    pub fn from_settings(settings: &Settings, sample_rate: u32, tempo: f64) -> Self {
        let sequence_ms = if settings.sequence_ms == 0 {
            auto_length_ms(tempo, AUTO_SEQUENCE_MS)
        } else {
            settings.sequence_ms as f64
        };
        let seek_ms = if settings.seekwindow_ms == 0 {
            auto_length_ms(tempo, AUTO_SEEK_MS)
        } else {
            settings.seekwindow_ms as f64
        };

        let overlap = ms_to_frames(settings.overlap_ms as f64, sample_rate).max(1);
        let sequence = ms_to_frames(sequence_ms, sample_rate).max(2 * overlap);
        let seek = ms_to_frames(seek_ms, sample_rate);
        Self {
            sequence,
            seek,
            overlap,
        }
    }
}

#[inline]
fn ms_to_frames(ms: f64, sample_rate: u32) -> usize {
    (ms * sample_rate as f64 / 1000.0).round() as usize
}

/// Linear interpolation from `at_low` to `at_high` over the automatic tempo range.
fn auto_length_ms(tempo: f64, (at_low, at_high): (f64, f64)) -> f64 {
    let slope = (at_high - at_low) / (AUTO_TEMPO_HIGH - AUTO_TEMPO_LOW);
    let ms = at_low + slope * (tempo - AUTO_TEMPO_LOW);
    ms.clamp(at_high, at_low)
}
