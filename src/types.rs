use crate::note::{Note, TunerReading};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

// ─── Pitch samples ──────────────────────────────────────────────────────────

/// One analysis tap: the estimated fundamental and signal level at a moment.
/// Produced by the pitch tracker (or a replayed trace), consumed by the
/// conditioner. Not retained past conditioning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Estimated fundamental in Hz. 0.0 when no pitch was found.
    pub frequency_hz: f64,
    /// Signal level (RMS of the analysis window), nominally 0.0–1.0
    pub amplitude: f32,
    /// Microseconds since session start
    pub timestamp_us: u64,
}

impl RawSample {
    pub fn new(frequency_hz: f64, amplitude: f32, timestamp_us: u64) -> Self {
        Self {
            frequency_hz,
            amplitude,
            timestamp_us,
        }
    }
}

/// Smoothed view of the input, overwritten every tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConditionedSample {
    pub smoothed_frequency_hz: f64,
    pub smoothed_amplitude: f32,
    pub timestamp_us: u64,
}

// ─── Audio data ─────────────────────────────────────────────────────────────

/// A chunk of audio samples from the microphone (or simulator / WAV file).
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Microseconds since session start (timestamp of first sample)
    pub timestamp_us: u64,
    /// Mono f32 samples, normalized -1.0 to 1.0
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

// ─── Detection output ───────────────────────────────────────────────────────

/// Where the current input sits in the note lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotePhase {
    /// Below the amplitude gate or outside the frequency range
    Silent,
    /// Onset transient; reading is live but not counted toward holds
    Attack,
    /// Stable; counted toward holds
    Sustain,
}

/// Hold accounting for the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoldProgress {
    /// Seconds the current note has been held continuously
    pub held_secs: f64,
    /// Seconds the caller asked for on this tick
    pub required_secs: f64,
    /// True only on the tick where the hold was confirmed
    pub fired: bool,
}

impl HoldProgress {
    pub fn idle(required_secs: f64) -> Self {
        Self {
            held_secs: 0.0,
            required_secs,
            fired: false,
        }
    }

    /// Fraction of the required hold reached, clamped to 0.0–1.0.
    pub fn ratio(&self) -> f64 {
        if self.required_secs <= 0.0 {
            return if self.held_secs > 0.0 || self.fired { 1.0 } else { 0.0 };
        }
        (self.held_secs / self.required_secs).clamp(0.0, 1.0)
    }
}

/// Complete per-tick snapshot published to listeners.
/// Always a value copy; listeners never see live detector state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionFrame {
    pub timestamp_us: u64,
    /// Live reading, published even during attack for responsive UI
    pub reading: TunerReading,
    pub phase: NotePhase,
    /// The note counted toward the hold, only set in sustain
    pub sustained_note: Option<Note>,
    pub hold: HoldProgress,
}

impl fmt::Display for DetectionFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self.phase {
            NotePhase::Silent => "---",
            NotePhase::Attack => "att",
            NotePhase::Sustain => "sus",
        };
        write!(
            f,
            "t={:>10}µs  {}  {}  hold={:.2}/{:.2}s{}",
            self.timestamp_us,
            phase,
            self.reading,
            self.hold.held_secs,
            self.hold.required_secs,
            if self.hold.fired { "  HOLD" } else { "" },
        )
    }
}

// ─── Inter-thread messages ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum InputEvent {
    /// Raw audio to run through the pitch tracker
    Audio(AudioChunk),
    /// Pre-analysed pitch tap (trace replay, external analyser)
    Sample(RawSample),
    /// Required hold time for the note the game currently targets
    SetHoldTarget { secs: f64 },
    /// Begin a fresh detection session
    Start,
    /// End the session; subsequent input is ignored until `Start`
    Stop,
}

// ─── Session clock ──────────────────────────────────────────────────────────

/// Monotonic clock for the detection session.
#[derive(Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Microseconds → seconds.
pub fn us_to_secs(us: u64) -> f64 {
    us as f64 / 1_000_000.0
}
