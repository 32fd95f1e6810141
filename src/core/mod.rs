//! Core types, buffers, filtering, and resampling utilities.

pub mod fir;
pub mod resample;
pub mod sample_buffer;
pub mod types;
pub mod window;

pub use types::*;
pub use window::{apply_window, generate_window, WindowType};
