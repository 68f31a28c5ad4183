use crate::note::{is_within_tolerance, Note};
use crate::types::us_to_secs;
use log::{debug, info};

/// Where the accumulator sits after the most recent update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldPhase {
    /// No note (silence, or nothing seen yet)
    Idle,
    /// A note is being held; the hold has not been confirmed on this tick
    Accumulating,
    /// The hold was confirmed on the last update
    Success,
}

/// Tracks how long the same note (enharmonics included) has been held and
/// confirms the hold once a caller-supplied duration is reached.
///
/// # Update rules
///
/// 1. Same note as before (tolerance-aware): add the time since the previous
///    update to the held duration.
/// 2. Different note, or silence: adopt it as the current note, held = 0.
/// 3. Held ≥ required for a real note:
///    - within the cooldown of the previous success: suppress, keep the
///      held duration growing;
///    - otherwise: confirm, record the time, held = 0 (note kept).
///
/// Per-tick note classification flickers at note boundaries, and one long
/// breath must not score twice; the tolerance check and the cooldown cover
/// those two cases respectively.
#[derive(Debug, Clone)]
pub struct HoldAccumulator {
    min_success_interval_us: u64,
    current: Option<Note>,
    /// Integer microseconds so repeated ticks do not drift
    held_us: u64,
    last_timestamp_us: Option<u64>,
    last_success_us: Option<u64>,
    fired_last: bool,
}

impl HoldAccumulator {
    pub fn new(min_success_interval_ms: u64) -> Self {
        Self {
            min_success_interval_us: min_success_interval_ms * 1000,
            current: None,
            held_us: 0,
            last_timestamp_us: None,
            last_success_us: None,
            fired_last: false,
        }
    }

    /// Advance with the note observed at `timestamp_us`. Returns true exactly
    /// on the update that confirms the hold.
    pub fn update(&mut self, note: Option<Note>, timestamp_us: u64, required_secs: f64) -> bool {
        if is_within_tolerance(note.as_ref(), self.current.as_ref()) {
            if let Some(last) = self.last_timestamp_us {
                self.held_us += timestamp_us.saturating_sub(last);
            }
        } else {
            if note != self.current {
                debug!(
                    "hold: note {} → {}",
                    display_note(self.current),
                    display_note(note)
                );
            }
            self.current = note;
            self.held_us = 0;
        }
        self.last_timestamp_us = Some(timestamp_us);
        self.fired_last = false;

        let Some(held_note) = note else {
            return false;
        };
        // A NaN requirement is never met
        if required_secs.is_nan() || self.held_secs() < required_secs {
            return false;
        }

        if let Some(prev) = self.last_success_us {
            if timestamp_us.saturating_sub(prev) < self.min_success_interval_us {
                return false;
            }
        }

        info!(
            "hold confirmed: {} for {:.2}s (required {:.2}s)",
            held_note,
            self.held_secs(),
            required_secs
        );
        self.last_success_us = Some(timestamp_us);
        self.held_us = 0;
        self.fired_last = true;
        true
    }

    /// Seconds the current note has been held.
    pub fn held_secs(&self) -> f64 {
        us_to_secs(self.held_us)
    }

    pub fn current_note(&self) -> Option<Note> {
        self.current
    }

    pub fn last_success_us(&self) -> Option<u64> {
        self.last_success_us
    }

    pub fn phase(&self) -> HoldPhase {
        if self.fired_last {
            HoldPhase::Success
        } else if self.current.is_some() {
            HoldPhase::Accumulating
        } else {
            HoldPhase::Idle
        }
    }

    /// Drop the current note and held time, keeping the cooldown clock.
    pub fn clear_note(&mut self) {
        self.current = None;
        self.held_us = 0;
        self.last_timestamp_us = None;
        self.fired_last = false;
    }

    /// Full reset for a new session, cooldown included.
    pub fn reset(&mut self) {
        self.clear_note();
        self.last_success_us = None;
    }
}

fn display_note(note: Option<Note>) -> String {
    note.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string())
}
