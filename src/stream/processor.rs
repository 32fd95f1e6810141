use log::{debug, warn};

use crate::core::resample::Interpolation;
use crate::core::sample_buffer::SampleBuffer;
use crate::core::types::{
    check_ratio, octaves_to_ratio, percent_to_ratio, semitones_to_ratio, Channels, Controls,
    ProcessorConfig,
};
use crate::error::ProcessError;
use crate::stretch::params::{Setting, Settings};
use crate::stretch::pitch::PitchShifter;

/// Streaming push/pull processor for rate, tempo and pitch changes.
///
/// Interleaved audio goes in through [`put_samples`](Self::put_samples) and
/// is processed as far as the buffered input allows; finished audio is
/// pulled with [`receive_samples`](Self::receive_samples). Controls and
/// settings can change between calls. [`flush`](Self::flush) pushes the
/// tail end through, [`clear`](Self::clear) drops it.
pub struct StreamProcessor {
    channels: Channels,
    sample_rate: u32,
    controls: Controls,
    settings: Settings,
    interpolation: Interpolation,
    pipeline: PitchShifter,
    output: SampleBuffer,
    /// Output frames owed for input put since the last flush or clear.
    expected_output: f64,
    /// Output frames produced since the last flush or clear.
    produced: u64,
}

impl StreamProcessor {
    /// Creates a processor with unity controls and default settings.
    ///
    /// # Errors
    /// Returns [`ProcessError::InvalidArgument`] unless `channels` is 1 or 2
    /// and `sample_rate` is positive.
    pub fn new(channels: u32, sample_rate: u32) -> Result<Self, ProcessError> {
        Self::with_config(ProcessorConfig::new(channels, sample_rate))
    }

    /// Creates a processor from a validated configuration.
    pub fn with_config(config: ProcessorConfig) -> Result<Self, ProcessError> {
        config.validate()?;
        let channels = Channels::from_count(config.channels)?;
        let mut pipeline = PitchShifter::new(
            channels.count(),
            config.sample_rate,
            &config.settings,
            config.interpolation,
        )?;
        pipeline.set_ratios(
            config.controls.effective_rate(),
            config.controls.effective_tempo(),
        );
        debug!(
            "stream processor: channels={} sample_rate={} rate={} tempo={} pitch={}",
            channels.count(),
            config.sample_rate,
            config.controls.rate,
            config.controls.tempo,
            config.controls.pitch
        );
        Ok(Self {
            channels,
            sample_rate: config.sample_rate,
            controls: config.controls,
            settings: config.settings,
            interpolation: config.interpolation,
            pipeline,
            output: SampleBuffer::new(channels.count()),
            expected_output: 0.0,
            produced: 0,
        })
    }

    /// Number of interleaved channels.
    #[inline]
    pub fn channels(&self) -> u32 {
        self.channels.count() as u32
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn rate(&self) -> f64 {
        self.controls.rate
    }

    #[inline]
    pub fn tempo(&self) -> f64 {
        self.controls.tempo
    }

    #[inline]
    pub fn pitch(&self) -> f64 {
        self.controls.pitch
    }

    /// Current tuning settings.
    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[inline]
    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// Changes the channel count. All buffered audio is discarded.
    pub fn set_channels(&mut self, channels: u32) -> Result<(), ProcessError> {
        let channels = Channels::from_count(channels)?;
        self.channels = channels;
        self.pipeline.set_channels(channels.count());
        self.output.set_channels(channels.count());
        self.reset_counters();
        debug!("stream processor: channels={}", channels.count());
        Ok(())
    }

    /// Changes the sample rate. Buffered audio is kept.
    pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<(), ProcessError> {
        if sample_rate == 0 {
            return Err(ProcessError::InvalidArgument(
                "sample rate must be greater than 0".to_string(),
            ));
        }
        self.sample_rate = sample_rate;
        self.pipeline.set_sample_rate(sample_rate);
        debug!("stream processor: sample_rate={}", sample_rate);
        Ok(())
    }

    /// Sets the playback rate (duration and pitch together).
    pub fn set_rate(&mut self, rate: f64) -> Result<(), ProcessError> {
        let rate = check_ratio(rate, "rate")?;
        self.apply_controls(Controls {
            rate,
            ..self.controls
        })
    }

    /// Sets the tempo (duration only).
    pub fn set_tempo(&mut self, tempo: f64) -> Result<(), ProcessError> {
        let tempo = check_ratio(tempo, "tempo")?;
        self.apply_controls(Controls {
            tempo,
            ..self.controls
        })
    }

    /// Sets the pitch ratio (pitch only).
    pub fn set_pitch(&mut self, pitch: f64) -> Result<(), ProcessError> {
        let pitch = check_ratio(pitch, "pitch")?;
        self.apply_controls(Controls {
            pitch,
            ..self.controls
        })
    }

    /// Sets the rate as a percentage change from normal (`-50 ..= +100`).
    pub fn set_rate_change(&mut self, percent: f64) -> Result<(), ProcessError> {
        self.set_rate(percent_to_ratio(percent)?)
    }

    /// Sets the tempo as a percentage change from normal (`-50 ..= +100`).
    pub fn set_tempo_change(&mut self, percent: f64) -> Result<(), ProcessError> {
        self.set_tempo(percent_to_ratio(percent)?)
    }

    /// Sets the pitch in octaves (`-1 ..= +1`).
    pub fn set_pitch_octaves(&mut self, octaves: f64) -> Result<(), ProcessError> {
        self.set_pitch(octaves_to_ratio(octaves)?)
    }

    /// Sets the pitch in semitones (`-12 ..= +12`).
    pub fn set_pitch_semitones(&mut self, semitones: f64) -> Result<(), ProcessError> {
        self.set_pitch(semitones_to_ratio(semitones)?)
    }

    /// Commits `controls` if its effective rate and tempo stay within
    /// `1/32 ..= 32`; otherwise nothing changes.
    fn apply_controls(&mut self, controls: Controls) -> Result<(), ProcessError> {
        controls.validate()?;
        self.controls = controls;
        self.pipeline
            .set_ratios(controls.effective_rate(), controls.effective_tempo());
        Ok(())
    }

    /// Sets a setting by numeric id.
    ///
    /// Returns `false`, leaving everything unchanged, for unknown ids,
    /// read-only ids and out-of-range values.
    pub fn set_setting(&mut self, id: i32, value: i32) -> bool {
        match Setting::from_id(id) {
            Some(key) => self.try_set_setting(key, value).is_ok(),
            None => false,
        }
    }

    /// Reads a setting by numeric id. Read-only ids report values derived
    /// from the current configuration; unknown ids return `None`.
    pub fn get_setting(&self, id: i32) -> Option<i32> {
        let key = Setting::from_id(id)?;
        let value = match key {
            Setting::NominalInputSequence => self.pipeline.nominal_input_sequence(),
            Setting::NominalOutputSequence => self.pipeline.nominal_output_sequence(),
            Setting::InitialLatency => self.pipeline.initial_latency(),
            writable => return self.settings.get(writable),
        };
        Some(value as i32)
    }

    /// Sets a typed setting.
    ///
    /// # Errors
    /// [`ProcessError::InvalidArgument`] for read-only keys and out-of-range values.
    pub fn try_set_setting(&mut self, key: Setting, value: i32) -> Result<(), ProcessError> {
        let mut settings = self.settings;
        settings.set(key, value)?;
        self.apply_settings(settings)
    }

    /// Replaces all settings at once.
    pub fn set_settings(&mut self, settings: Settings) -> Result<(), ProcessError> {
        settings.validate()?;
        self.apply_settings(settings)
    }

    fn apply_settings(&mut self, settings: Settings) -> Result<(), ProcessError> {
        self.pipeline.set_settings(&settings)?;
        self.settings = settings;
        debug!("stream processor: settings={:?}", settings);
        Ok(())
    }

    /// Selects the rate converter's interpolation.
    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        self.interpolation = interpolation;
        self.pipeline.set_interpolation(interpolation);
    }

    /// Appends interleaved input and processes as much as possible.
    ///
    /// # Errors
    /// [`ProcessError::InvalidArgument`] if `samples` is not a whole number
    /// of frames.
    pub fn put_samples(&mut self, samples: &[f32]) -> Result<(), ProcessError> {
        let ch = self.channels.count();
        if samples.len() % ch != 0 {
            return Err(ProcessError::InvalidArgument(format!(
                "{} samples is not a multiple of {} channels",
                samples.len(),
                ch
            )));
        }
        let frames = samples.len() / ch;
        self.expected_output += frames as f64 / self.controls.input_output_ratio();
        self.run_pipeline(samples)
    }

    fn run_pipeline(&mut self, samples: &[f32]) -> Result<(), ProcessError> {
        let before = self.output.len();
        self.pipeline.process(samples, &mut self.output)?;
        self.produced += (self.output.len() - before) as u64;
        Ok(())
    }

    /// Pulls up to `max_frames` frames of finished output.
    pub fn receive_samples(&mut self, max_frames: usize) -> Vec<f32> {
        let frames = max_frames.min(self.output.len());
        let mut out = vec![0.0; frames * self.channels.count()];
        self.output.pop_slice(&mut out);
        out
    }

    /// Pulls as many whole frames as fit into `buffer`.
    ///
    /// Returns the number of frames written.
    pub fn receive_samples_into(&mut self, buffer: &mut [f32]) -> usize {
        self.output.pop_slice(buffer)
    }

    /// Drops up to `max_frames` frames of finished output.
    pub fn discard_samples(&mut self, max_frames: usize) -> usize {
        self.output.consume(max_frames)
    }

    /// Frames waiting in front of the time-stretch stage.
    pub fn num_unprocessed_samples(&self) -> usize {
        self.pipeline.num_unprocessed()
    }

    /// Frames ready to be received.
    pub fn num_samples(&self) -> usize {
        self.output.len()
    }

    /// True when no output is ready.
    pub fn is_empty(&self) -> bool {
        self.output.is_empty()
    }

    /// Input frames consumed per output frame.
    pub fn input_output_ratio(&self) -> f64 {
        self.controls.input_output_ratio()
    }

    /// Input frames that must arrive before the first output appears.
    pub fn initial_latency(&self) -> usize {
        self.pipeline.initial_latency()
    }

    /// Forces buffered input through the pipeline.
    ///
    /// Silence is pushed in until all output owed for the input so far has
    /// been produced; anything beyond that is trimmed. The pipeline is then
    /// reset, so the next input starts a fresh stream. Output already
    /// waiting is kept.
    pub fn flush(&mut self) -> Result<(), ProcessError> {
        let owed = (self.expected_output.round() as u64).saturating_sub(self.produced) as usize;
        let target = self.output.len() + owed;

        let chunk = self.pipeline.flush_chunk();
        let silence = vec![0.0; chunk * self.channels.count()];
        let limit = ((owed as f64 * self.input_output_ratio()).ceil() as usize)
            .saturating_add(self.pipeline.flush_margin());

        let mut padded = 0;
        while self.output.len() < target && padded < limit {
            self.run_pipeline(&silence)?;
            padded += chunk;
        }
        if self.output.len() < target {
            warn!(
                "flush stopped after {} frames of padding, {} frames short",
                padded,
                target - self.output.len()
            );
        }
        self.output.truncate(target);
        self.pipeline.clear();
        self.reset_counters();
        debug!("stream processor: flushed, {} frames ready", self.output.len());
        Ok(())
    }

    /// Drops all buffered input and output. Controls and settings are kept.
    pub fn clear(&mut self) {
        self.pipeline.clear();
        self.output.clear();
        self.reset_counters();
    }

    fn reset_counters(&mut self) {
        self.expected_output = 0.0;
        self.produced = 0;
    }
}
