//! Growable FIFO of interleaved multi-channel samples.

use crate::error::ProcessError;

/// FIFO of interleaved samples counted in whole frames.
///
/// Storage is one contiguous vector with a moving read offset, so the
/// readable region is always a single slice. Consumed space is reclaimed
/// lazily when the vector would otherwise have to grow.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    data: Vec<f32>,
    start: usize,
    channels: usize,
}

impl SampleBuffer {
    /// Creates an empty buffer for `channels` interleaved channels.
    pub fn new(channels: usize) -> Self {
        Self {
            data: Vec::new(),
            start: 0,
            channels: channels.max(1),
        }
    }

    /// Creates an empty buffer with room for `frames` frames.
    pub fn with_capacity(channels: usize, frames: usize) -> Self {
        let channels = channels.max(1);
        Self {
            data: Vec::with_capacity(frames * channels),
            start: 0,
            channels,
        }
    }

    /// Returns the channel count.
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Changes the channel count, discarding buffered samples.
    pub fn set_channels(&mut self, channels: usize) {
        self.channels = channels.max(1);
        self.clear();
    }

    /// Returns the number of complete frames stored.
    #[inline]
    pub fn len(&self) -> usize {
        (self.data.len() - self.start) / self.channels
    }

    /// Returns true when no frames are stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.len() == self.start
    }

    /// All buffered samples, oldest first.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data[self.start..]
    }

    /// The first `frames` frames (or fewer if not available).
    pub fn peek(&self, frames: usize) -> &[f32] {
        let n = frames.min(self.len()) * self.channels;
        &self.data[self.start..self.start + n]
    }

    /// Discards all buffered samples.
    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
        self.start = 0;
    }

    /// Appends interleaved samples.
    ///
    /// # Errors
    /// Returns [`ProcessError::InvalidArgument`] if `input` does not hold a
    /// whole number of frames, or [`ProcessError::ResourceExhausted`] if the
    /// buffer cannot grow.
    pub fn push_slice(&mut self, input: &[f32]) -> Result<(), ProcessError> {
        if input.len() % self.channels != 0 {
            return Err(ProcessError::InvalidArgument(format!(
                "{} samples is not a multiple of {} channels",
                input.len(),
                self.channels
            )));
        }
        self.reserve(input.len())?;
        self.data.extend_from_slice(input);
        Ok(())
    }

    /// Appends `frames` frames of silence.
    pub fn push_silence(&mut self, frames: usize) -> Result<(), ProcessError> {
        let n = frames * self.channels;
        self.reserve(n)?;
        self.data.resize(self.data.len() + n, 0.0);
        Ok(())
    }

    /// Discards up to `frames` frames from the front.
    ///
    /// Returns the number of frames discarded.
    pub fn consume(&mut self, frames: usize) -> usize {
        let to_drop = frames.min(self.len());
        self.start += to_drop * self.channels;
        if self.start == self.data.len() {
            self.clear();
        }
        to_drop
    }

    /// Moves as many whole frames as fit into `output`.
    ///
    /// Returns the number of frames moved.
    pub fn pop_slice(&mut self, output: &mut [f32]) -> usize {
        let frames = (output.len() / self.channels).min(self.len());
        let n = frames * self.channels;
        output[..n].copy_from_slice(&self.data[self.start..self.start + n]);
        self.consume(frames)
    }

    /// Shortens the buffer to at most `frames` frames, dropping the newest.
    pub fn truncate(&mut self, frames: usize) {
        if frames < self.len() {
            self.data.truncate(self.start + frames * self.channels);
        }
    }

    fn reserve(&mut self, additional: usize) -> Result<(), ProcessError> {
        if self.data.len() + additional > self.data.capacity() && self.start > 0 {
            self.data.drain(..self.start);
            self.start = 0;
        }
        self.data
            .try_reserve(additional)
            .map_err(|_| ProcessError::ResourceExhausted {
                requested: additional,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::SampleBuffer;
    use crate::error::ProcessError;

    #[test]
    fn push_consume_stereo() {
        let mut buf = SampleBuffer::new(2);
        buf.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.peek(1), &[1.0, 2.0]);
        assert_eq!(buf.consume(2), 2);
        assert_eq!(buf.as_slice(), &[5.0, 6.0]);
        assert_eq!(buf.consume(10), 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_partial_frames() {
        let mut buf = SampleBuffer::new(2);
        let err = buf.push_slice(&[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, ProcessError::InvalidArgument(_)));
        assert!(buf.is_empty());
    }

    #[test]
    fn pop_slice_whole_frames_only() {
        let mut buf = SampleBuffer::new(2);
        buf.push_slice(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut out = [0.0; 3];
        assert_eq!(buf.pop_slice(&mut out), 1);
        assert_eq!(out, [1.0, 2.0, 0.0]);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn reclaims_space_after_consume() {
        let mut buf = SampleBuffer::with_capacity(1, 4);
        for round in 0..100 {
            buf.push_slice(&[round as f32; 3]).unwrap();
            assert_eq!(buf.consume(3), 3);
        }
        buf.push_slice(&[7.0, 8.0]).unwrap();
        assert_eq!(buf.as_slice(), &[7.0, 8.0]);
    }

    #[test]
    fn interleaved_push_after_partial_consume() {
        let mut buf = SampleBuffer::with_capacity(1, 4);
        buf.push_slice(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        buf.consume(3);
        buf.push_slice(&[5.0, 6.0, 7.0]).unwrap();
        assert_eq!(buf.as_slice(), &[4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn truncate_and_silence() {
        let mut buf = SampleBuffer::new(1);
        buf.push_slice(&[1.0, 2.0]).unwrap();
        buf.push_silence(3).unwrap();
        assert_eq!(buf.len(), 5);
        buf.truncate(3);
        assert_eq!(buf.as_slice(), &[1.0, 2.0, 0.0]);
        buf.truncate(10);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn set_channels_clears() {
        let mut buf = SampleBuffer::new(1);
        buf.push_slice(&[1.0, 2.0]).unwrap();
        buf.set_channels(2);
        assert!(buf.is_empty());
        assert_eq!(buf.channels(), 2);
    }
}
