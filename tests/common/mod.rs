#![allow(dead_code)]

use std::f32::consts::PI;

use soundshift::StreamProcessor;

pub fn gen_sine<F>(freq_hz: f32, sr: u32, n: usize, amp_fn: F) -> Vec<f32>
where
    F: Fn(usize) -> f32,
{
    (0..n)
        .map(|i| {
            let phase = 2.0 * PI * freq_hz * i as f32 / sr as f32;
            amp_fn(i) * phase.sin()
        })
        .collect()
}

/// Interleaves a mono signal into `channels` identical channels.
pub fn to_interleaved(mono: &[f32], channels: usize) -> Vec<f32> {
    mono.iter()
        .flat_map(|&s| std::iter::repeat(s).take(channels))
        .collect()
}

pub fn gen_two_tone(
    freq_a: f32,
    amp_a: f32,
    freq_b: f32,
    amp_b: f32,
    sr: u32,
    n: usize,
) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let t = i as f32 / sr as f32;
            amp_a * (2.0 * PI * freq_a * t).sin() + amp_b * (2.0 * PI * freq_b * t).sin()
        })
        .collect()
}

pub fn rms(signal: &[f32]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    let sum: f64 = signal.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / signal.len() as f64).sqrt()
}

/// Rising zero crossings per second of a mono signal.
pub fn zero_crossing_freq(signal: &[f32], sr: u32) -> f64 {
    let crossings = signal
        .windows(2)
        .filter(|w| w[0] < 0.0 && w[1] >= 0.0)
        .count();
    crossings as f64 * sr as f64 / signal.len() as f64
}

/// Feeds `input` in `chunk`-frame blocks, receiving after every block, then
/// flushes and drains the rest.
pub fn stream_all(proc: &mut StreamProcessor, input: &[f32], chunk: usize) -> Vec<f32> {
    let ch = proc.channels() as usize;
    let mut out = Vec::new();
    for block in input.chunks(chunk * ch) {
        proc.put_samples(block).unwrap();
        out.extend(proc.receive_samples(chunk));
    }
    proc.flush().unwrap();
    out.extend(drain(proc, 4096));
    out
}

/// Receives in `max`-frame pulls until the output is empty.
pub fn drain(proc: &mut StreamProcessor, max: usize) -> Vec<f32> {
    let mut out = Vec::new();
    while !proc.is_empty() {
        out.extend(proc.receive_samples(max));
    }
    out
}
