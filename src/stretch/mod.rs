//! Time stretching: WSOLA, its tuning parameters, and the pitch pipeline.

pub mod params;
pub mod pitch;
pub mod wsola;

pub use params::{FrameLayout, Setting, Settings};
pub use pitch::{PitchShifter, StageOrder};
pub use wsola::Wsola;
