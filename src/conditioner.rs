use crate::config::ConditionerConfig;
use crate::types::{ConditionedSample, RawSample};
use log::trace;

/// Result of one accepted tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conditioned {
    pub sample: ConditionedSample,
    /// Signal present: smoothed amplitude above the gate and raw frequency in range
    pub active: bool,
}

/// Exponential smoothing, rate limiting, and silence gating of raw samples.
///
/// Every raw sample updates the smoothers; only samples spaced at least
/// `min_processing_interval_ms` apart are handed downstream. The gate uses
/// the smoothed amplitude (noisy, heavily smoothed) and the raw frequency.
///
/// Frequencies outside the configured range (including the 0.0 reported for
/// unpitched audio) do not feed the frequency smoother; the next in-range
/// frequency re-seeds it so a new note does not glide up from silence.
pub struct SignalConditioner {
    config: ConditionerConfig,
    smoothed_amplitude: f32,
    /// None until the first in-range frequency (and again after an out-of-range one)
    smoothed_frequency: Option<f64>,
    last_accepted_us: Option<u64>,
    last: Option<ConditionedSample>,
}

impl SignalConditioner {
    pub fn new(config: ConditionerConfig) -> Self {
        Self {
            config,
            smoothed_amplitude: 0.0,
            smoothed_frequency: None,
            last_accepted_us: None,
            last: None,
        }
    }

    /// Feed one raw sample. Returns Some only when the tick is accepted by
    /// the rate limiter.
    pub fn process(&mut self, raw: &RawSample) -> Option<Conditioned> {
        let a = self.config.amplitude_smoothing;
        let amplitude = if raw.amplitude.is_finite() {
            raw.amplitude.max(0.0)
        } else {
            0.0
        };
        self.smoothed_amplitude = a * self.smoothed_amplitude + (1.0 - a) * amplitude;

        let in_range = self.frequency_in_range(raw.frequency_hz);
        if in_range {
            let b = self.config.frequency_smoothing;
            self.smoothed_frequency = Some(match self.smoothed_frequency {
                Some(prev) => b * prev + (1.0 - b) * raw.frequency_hz,
                None => raw.frequency_hz,
            });
        } else {
            self.smoothed_frequency = None;
        }

        if let Some(last) = self.last_accepted_us {
            let elapsed_ms = raw.timestamp_us.saturating_sub(last) / 1000;
            if elapsed_ms < self.config.min_processing_interval_ms {
                return None;
            }
        }
        self.last_accepted_us = Some(raw.timestamp_us);

        let sample = ConditionedSample {
            smoothed_frequency_hz: self.smoothed_frequency.unwrap_or(0.0),
            smoothed_amplitude: self.smoothed_amplitude,
            timestamp_us: raw.timestamp_us,
        };
        self.last = Some(sample);

        let active = in_range && self.smoothed_amplitude > self.config.min_amplitude;
        trace!(
            "cond: raw={:.1}Hz/{:.3} smooth={:.1}Hz/{:.3} active={}",
            raw.frequency_hz,
            raw.amplitude,
            sample.smoothed_frequency_hz,
            sample.smoothed_amplitude,
            active
        );
        Some(Conditioned { sample, active })
    }

    fn frequency_in_range(&self, hz: f64) -> bool {
        hz.is_finite() && hz >= self.config.min_frequency_hz && hz <= self.config.max_frequency_hz
    }

    /// Most recent accepted sample.
    pub fn last(&self) -> Option<ConditionedSample> {
        self.last
    }

    pub fn reset(&mut self) {
        self.smoothed_amplitude = 0.0;
        self.smoothed_frequency = None;
        self.last_accepted_us = None;
        self.last = None;
    }
}
