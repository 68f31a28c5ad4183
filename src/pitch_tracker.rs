use crate::config::TrackerConfig;
use crate::dsp::{compute_rms, detect_pitch_yin};
use crate::types::*;
use log::{debug, trace};

/// Turns an audio stream into periodic (frequency, amplitude) taps.
///
/// Audio is buffered internally, so callers can feed chunks of any size.
/// Analyses fall on every `hop_size`-th sample of the stream, once
/// `analysis_window` samples are buffered: the most recent window is
/// analysed with YIN and its RMS is taken as the amplitude. At 48kHz the
/// default hop is 10ms, so every fifth tap lands exactly on the
/// conditioner's 50ms grid.
///
/// Tap timestamps come from a sample clock anchored at the first chunk's
/// timestamp, not from per-chunk wall-clock stamps, so tap spacing is exact
/// regardless of how the audio was chunked. The tap carries the timestamp
/// of the window's last sample.
pub struct PitchTracker {
    config: TrackerConfig,
    min_hz: f64,
    max_hz: f64,
    /// Audio ring buffer
    audio_buf: Vec<f32>,
    /// Timestamp of stream sample 0; None until the first chunk
    base_us: Option<u64>,
    /// Samples consumed since `base_us`
    samples_seen: u64,
    sample_rate: u32,
    /// YIN difference buffer, reused between analyses
    scratch: Vec<f32>,
}

impl PitchTracker {
    pub fn new(config: TrackerConfig, min_hz: f64, max_hz: f64) -> Self {
        let cap = config.analysis_window * 2;
        Self {
            config,
            min_hz,
            max_hz,
            audio_buf: Vec::with_capacity(cap),
            base_us: None,
            samples_seen: 0,
            sample_rate: 48000,
            scratch: Vec::with_capacity(cap),
        }
    }

    /// Feed a chunk; `emit` is called once per completed analysis.
    pub fn process_chunk(&mut self, chunk: &AudioChunk, mut emit: impl FnMut(RawSample)) {
        if chunk.sample_rate == 0 {
            return;
        }
        if self.base_us.is_some() && chunk.sample_rate != self.sample_rate {
            debug!(
                "tracker: sample rate {} → {} Hz, restarting",
                self.sample_rate, chunk.sample_rate
            );
            self.reset();
        }
        if self.base_us.is_none() {
            self.base_us = Some(chunk.timestamp_us);
            self.sample_rate = chunk.sample_rate;
        }

        let hop = self.config.hop_size.max(1) as u64;
        let mut rest = &chunk.samples[..];
        while !rest.is_empty() {
            // Feed up to the next hop boundary
            let to_boundary = hop - self.samples_seen % hop;
            let take = (to_boundary as usize).min(rest.len());
            let (piece, tail) = rest.split_at(take);
            self.push_samples(piece);
            rest = tail;

            if self.samples_seen % hop == 0 && self.ready() {
                emit(self.analyze(self.stream_time_us()));
            }
        }
    }

    fn push_samples(&mut self, samples: &[f32]) {
        self.audio_buf.extend_from_slice(samples);
        self.samples_seen += samples.len() as u64;

        // Keep buffer bounded
        let max_len = self.config.analysis_window * 2;
        if self.audio_buf.len() > max_len {
            let excess = self.audio_buf.len() - max_len;
            self.audio_buf.drain(..excess);
        }
    }

    fn stream_time_us(&self) -> u64 {
        self.base_us.unwrap_or(0) + self.samples_seen * 1_000_000 / self.sample_rate as u64
    }

    /// True once a full analysis window is buffered.
    pub fn ready(&self) -> bool {
        self.audio_buf.len() >= self.config.analysis_window
    }

    fn analyze(&mut self, timestamp_us: u64) -> RawSample {
        let start = self
            .audio_buf
            .len()
            .saturating_sub(self.config.analysis_window);
        let samples = &self.audio_buf[start..];

        let amplitude = compute_rms(samples);
        let est = detect_pitch_yin(
            samples,
            self.sample_rate,
            self.config.yin_threshold,
            self.min_hz,
            self.max_hz,
            &mut self.scratch,
        );
        trace!(
            "tracker: {:.1}Hz clarity={:.2} rms={:.4}",
            est.frequency_hz,
            est.clarity,
            amplitude
        );
        RawSample::new(est.frequency_hz, amplitude, timestamp_us)
    }

    /// Reset all state (e.g., on session restart).
    pub fn reset(&mut self) {
        self.audio_buf.clear();
        self.base_us = None;
        self.samples_seen = 0;
    }
}
