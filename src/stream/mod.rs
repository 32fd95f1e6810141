//! Push/pull streaming facade.

pub mod processor;

pub use processor::StreamProcessor;
