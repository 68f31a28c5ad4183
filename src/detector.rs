use crate::attack::AttackSustainClassifier;
use crate::conditioner::SignalConditioner;
use crate::config::DetectorConfig;
use crate::hold::HoldAccumulator;
use crate::note::{Note, NoteMapper, TunerReading};
use crate::types::*;
use log::{debug, info};

/// One detection session: conditioner → attack/sustain → note mapping →
/// hold accounting, driven one raw sample at a time.
///
/// Owned by whoever drives the audio taps (normally the `Coordinator`
/// thread) and never shared; results leave as `DetectionFrame` copies.
///
/// A freshly built detector is stopped. While stopped, every tick is
/// ignored and `current_reading()` is inactive.
pub struct NoteDetector {
    config: DetectorConfig,
    conditioner: SignalConditioner,
    classifier: AttackSustainClassifier,
    mapper: NoteMapper,
    hold: HoldAccumulator,
    running: bool,
    reading: TunerReading,
    phase: NotePhase,
}

impl NoteDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            conditioner: SignalConditioner::new(config.conditioner.clone()),
            classifier: AttackSustainClassifier::new(config.attack.clone()),
            mapper: NoteMapper::new(config.reference_pitch_hz),
            hold: HoldAccumulator::new(config.hold.min_success_interval_ms),
            config,
            running: false,
            reading: TunerReading::inactive(),
            phase: NotePhase::Silent,
        }
    }

    /// Begin a session with clean state. Restarting a running session
    /// also starts clean.
    pub fn start(&mut self) {
        self.reset();
        self.running = true;
        info!(
            "Detection session started (A4={} Hz, gate {:.3}, {}–{} Hz)",
            self.config.reference_pitch_hz,
            self.config.conditioner.min_amplitude,
            self.config.conditioner.min_frequency_hz,
            self.config.conditioner.max_frequency_hz
        );
    }

    /// End the session. Safe to call when not running.
    pub fn stop(&mut self) {
        if self.running {
            info!("Detection session stopped");
        }
        self.running = false;
        self.reset();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Swap in a new configuration. Stops the session; call `start()` again.
    pub fn reconfigure(&mut self, config: DetectorConfig) {
        self.stop();
        *self = Self::new(config);
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    fn reset(&mut self) {
        self.conditioner.reset();
        self.classifier.reset();
        self.hold.reset();
        self.reading = TunerReading::inactive();
        self.phase = NotePhase::Silent;
    }

    /// Run one raw sample through the pipeline.
    ///
    /// Returns None while stopped or when the rate limiter drops the tick.
    /// `required_hold_secs` is how long the currently targeted note must be
    /// held; it can change from tick to tick.
    pub fn process_tick(
        &mut self,
        sample: RawSample,
        required_hold_secs: f64,
    ) -> Option<DetectionFrame> {
        if !self.running {
            return None;
        }
        let conditioned = self.conditioner.process(&sample)?;
        let ts = conditioned.sample.timestamp_us;

        if !conditioned.active {
            if self.phase != NotePhase::Silent {
                debug!("signal lost at {}µs", ts);
            }
            self.classifier.reset();
            self.hold.clear_note();
            self.reading = TunerReading::inactive();
            self.phase = NotePhase::Silent;
            return Some(self.frame(ts, None, HoldProgress::idle(required_hold_secs)));
        }

        let in_attack = self
            .classifier
            .update(sample.frequency_hz, sample.amplitude, ts);
        self.reading = self
            .mapper
            .reading(conditioned.sample.smoothed_frequency_hz);

        if in_attack {
            self.phase = NotePhase::Attack;
            let hold = HoldProgress {
                held_secs: self.hold.held_secs(),
                required_secs: required_hold_secs,
                fired: false,
            };
            return Some(self.frame(ts, None, hold));
        }

        if self.phase != NotePhase::Sustain {
            debug!("sustain on {} at {}µs", self.reading.note_name(), ts);
        }
        self.phase = NotePhase::Sustain;
        let note = self.reading.note;
        let fired = self.hold.update(note, ts, required_hold_secs);
        let hold = HoldProgress {
            held_secs: self.hold.held_secs(),
            required_secs: required_hold_secs,
            fired,
        };
        Some(self.frame(ts, note, hold))
    }

    fn frame(&self, timestamp_us: u64, sustained: Option<Note>, hold: HoldProgress) -> DetectionFrame {
        DetectionFrame {
            timestamp_us,
            reading: self.reading,
            phase: self.phase,
            sustained_note: sustained,
            hold,
        }
    }

    /// Advance the hold accumulator directly with a note chosen by the
    /// caller. Returns true exactly on the update that confirms the hold.
    pub fn update_hold(&mut self, note: Option<Note>, timestamp_us: u64, required_hold_secs: f64) -> bool {
        if !self.running {
            return false;
        }
        self.hold.update(note, timestamp_us, required_hold_secs)
    }

    /// Latest live reading; inactive while stopped.
    pub fn current_reading(&self) -> TunerReading {
        if self.running {
            self.reading
        } else {
            TunerReading::inactive()
        }
    }

    pub fn phase(&self) -> NotePhase {
        self.phase
    }

    /// Seconds the current note has been held.
    pub fn hold_duration(&self) -> f64 {
        self.hold.held_secs()
    }
}
