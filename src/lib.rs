#![forbid(unsafe_code)]
//! Streaming tempo, pitch and playback-rate changes for interleaved audio.
//!
//! `soundshift` changes the tempo of audio without altering its pitch (WSOLA),
//! the pitch without altering its duration (WSOLA plus resampling), or both
//! together (resampling alone). Audio is pushed in and pulled out in chunks of
//! any size, with controls adjustable between calls.
//!
//! # Quick Start
//!
//! ```
//! use soundshift::ProcessorConfig;
//!
//! // 1 second of 440 Hz sine at 44.1 kHz
//! let input: Vec<f32> = (0..44100)
//!     .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin())
//!     .collect();
//!
//! let config = ProcessorConfig::new(1, 44100).with_tempo(1.5);
//! let output = soundshift::process_buffer(&input, &config).unwrap();
//! assert_eq!(output.len(), 29400); // 44100 / 1.5
//! ```
//!
//! # Streaming
//!
//! ```
//! use soundshift::StreamProcessor;
//!
//! let mut processor = StreamProcessor::new(2, 44100).unwrap();
//! processor.set_pitch_semitones(-3.0).unwrap();
//!
//! let chunk = vec![0.0f32; 2 * 1024];
//! for _ in 0..16 {
//!     processor.put_samples(&chunk).unwrap();
//!     let ready = processor.receive_samples(4096);
//!     assert_eq!(ready.len() % 2, 0);
//! }
//! processor.flush().unwrap();
//! ```

pub mod core;
pub mod error;
pub mod stream;
pub mod stretch;

pub use core::resample::Interpolation;
pub use core::types::{Channels, Controls, ProcessorConfig, Sample};
pub use core::window::WindowType;
pub use error::ProcessError;
pub use stream::StreamProcessor;
pub use stretch::params::{read_settings_json, write_settings_json, Setting, Settings};

/// Library version as text.
pub const VERSION_STRING: &str = env!("CARGO_PKG_VERSION");

/// Library version as `major * 10000 + minor * 100 + patch`.
pub const VERSION_ID: u32 = version_id_from(VERSION_STRING);

const fn version_id_from(version: &str) -> u32 {
    let bytes = version.as_bytes();
    let mut parts = [0u32; 3];
    let mut part = 0;
    let mut i = 0;
    while i < bytes.len() && part < 3 {
        let b = bytes[i];
        if b == b'.' {
            part += 1;
        } else if b.is_ascii_digit() {
            parts[part] = parts[part] * 10 + (b - b'0') as u32;
        } else {
            // Pre-release or build suffix.
            break;
        }
        i += 1;
    }
    parts[0] * 10000 + parts[1] * 100 + parts[2]
}

/// Returns [`VERSION_STRING`].
pub fn version_string() -> &'static str {
    VERSION_STRING
}

/// Returns [`VERSION_ID`].
pub fn version_id() -> u32 {
    VERSION_ID
}

/// Processes a whole interleaved buffer in one call.
///
/// Equivalent to building a [`StreamProcessor`] from `config`, putting all
/// of `input`, flushing, and receiving everything.
pub fn process_buffer(input: &[f32], config: &ProcessorConfig) -> Result<Vec<f32>, ProcessError> {
    let mut processor = StreamProcessor::with_config(config.clone())?;
    processor.put_samples(input)?;
    processor.flush()?;
    Ok(processor.receive_samples(processor.num_samples()))
}
