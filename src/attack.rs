use crate::config::AttackConfig;
use log::{debug, trace};
use std::collections::VecDeque;

/// Bounded FIFO of recent (frequency, amplitude) pairs. Capacity is fixed
/// at construction; pushing past it evicts the oldest entry without
/// reallocating.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<(f64, f32)>,
    capacity: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, frequency_hz: f64, amplitude: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((frequency_hz, amplitude));
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// (max - min) / max of the amplitudes. 1.0 when the window is silent.
    pub fn amplitude_variation(&self) -> f32 {
        let (min, max) = self
            .samples
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &(_, a)| (lo.min(a), hi.max(a)));
        if self.samples.is_empty() || max <= 0.0 {
            return 1.0;
        }
        (max - min) / max
    }

    /// max - min of the frequencies, in Hz.
    pub fn frequency_variation(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let (min, max) = self
            .samples
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), &(f, _)| (lo.min(f), hi.max(f)));
        max - min
    }
}

/// Separates a note's unstable onset from its steady sustain.
///
/// # Rules
///
/// - Until the window holds `window_size` samples, the note is in attack
///   (unless the failsafe below fires first).
/// - With a full window, each tick is "stable" when amplitude variation is
///   below `amplitude_variation_threshold` and frequency spread is below
///   `frequency_variation_hz`. Stable ticks count up, unstable ones count
///   down (never below zero).
/// - `required_stable_ticks` in the counter → sustain.
/// - Failsafe: once `max_attack_ms` has passed since the phase started,
///   sustain is forced even if the input never settled (vibrato, breathy
///   voices) or the window is not yet full (taps slower than
///   `max_attack_ms / (window_size - 1)`), so hold timing can always begin.
///
/// Sustain is sticky until `reset()`; the caller resets on silence.
pub struct AttackSustainClassifier {
    config: AttackConfig,
    window: SampleWindow,
    in_attack: bool,
    phase_start_us: Option<u64>,
    stable_ticks: u32,
}

impl AttackSustainClassifier {
    pub fn new(config: AttackConfig) -> Self {
        let window = SampleWindow::new(config.window_size);
        Self {
            config,
            window,
            in_attack: true,
            phase_start_us: None,
            stable_ticks: 0,
        }
    }

    /// Record one accepted tick. Returns true while still in attack.
    pub fn update(&mut self, frequency_hz: f64, amplitude: f32, timestamp_us: u64) -> bool {
        let start = *self.phase_start_us.get_or_insert(timestamp_us);
        if !self.in_attack {
            return false;
        }

        self.window.push(frequency_hz, amplitude);
        let elapsed_ms = timestamp_us.saturating_sub(start) / 1000;

        if self.window.is_full() {
            let amp_var = self.window.amplitude_variation();
            let freq_var = self.window.frequency_variation();
            let stable = amp_var < self.config.amplitude_variation_threshold
                && freq_var < self.config.frequency_variation_hz;
            if stable {
                self.stable_ticks += 1;
            } else {
                self.stable_ticks = self.stable_ticks.saturating_sub(1);
            }
            trace!(
                "attack: amp_var={:.3} freq_var={:.2}Hz stable={}",
                amp_var,
                freq_var,
                self.stable_ticks
            );
            if self.stable_ticks >= self.config.required_stable_ticks {
                debug!("attack → sustain after {}ms (stable)", elapsed_ms);
                self.enter_sustain();
                return false;
            }
        }

        // Applies to a partly filled window too: slow taps must not stretch the attack
        if elapsed_ms >= self.config.max_attack_ms {
            debug!(
                "attack → sustain after {}ms (timeout, window {}/{})",
                elapsed_ms,
                self.window.len(),
                self.config.window_size
            );
            self.enter_sustain();
        }
        self.in_attack
    }

    fn enter_sustain(&mut self) {
        self.in_attack = false;
        self.stable_ticks = 0;
        self.window.clear();
    }

    pub fn is_attack_phase(&self) -> bool {
        self.in_attack
    }

    pub fn stable_ticks(&self) -> u32 {
        self.stable_ticks
    }

    pub fn window(&self) -> &SampleWindow {
        &self.window
    }

    /// Back to attack with an empty window (silence or session restart).
    pub fn reset(&mut self) {
        self.window.clear();
        self.in_attack = true;
        self.phase_start_us = None;
        self.stable_ticks = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK_US: u64 = 50_000;

    fn classifier() -> AttackSustainClassifier {
        AttackSustainClassifier::new(AttackConfig::default())
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut w = SampleWindow::new(3);
        for f in [100.0, 200.0, 300.0, 400.0] {
            w.push(f, 0.1);
        }
        assert_eq!(w.len(), 3);
        assert!(w.is_full());
        assert_eq!(w.frequency_variation(), 200.0);
    }

    #[test]
    fn test_amplitude_variation() {
        let mut w = SampleWindow::new(4);
        w.push(440.0, 0.1);
        w.push(440.0, 0.2);
        assert!((w.amplitude_variation() - 0.5).abs() < 1e-6);
        w.clear();
        assert_eq!(w.amplitude_variation(), 1.0);
    }

    #[test]
    fn test_attack_while_window_filling() {
        // Generous failsafe so only the window rule applies
        let mut c = AttackSustainClassifier::new(AttackConfig {
            max_attack_ms: 10_000,
            ..AttackConfig::default()
        });
        for i in 0..9u64 {
            assert!(c.update(440.0, 0.1, i * TICK_US), "tick {}", i);
        }
        assert_eq!(c.window().len(), 9);
    }

    #[test]
    fn test_stable_input_reaches_sustain() {
        let mut c = AttackSustainClassifier::new(AttackConfig {
            max_attack_ms: 10_000,
            ..AttackConfig::default()
        });
        let mut ticks_to_sustain = None;
        for i in 0..30u64 {
            if !c.update(440.0, 0.1, i * TICK_US) {
                ticks_to_sustain = Some(i + 1);
                break;
            }
        }
        // 10 to fill the window (the 10th is also the first stable tick) + 4 more
        assert_eq!(ticks_to_sustain, Some(14));
    }

    #[test]
    fn test_unstable_input_stays_in_attack_until_failsafe() {
        let mut c = classifier();
        let mut ended_at_ms = None;
        for i in 0..40u64 {
            // Alternating pitch well outside the 5 Hz spread
            let f = if i % 2 == 0 { 400.0 } else { 480.0 };
            if !c.update(f, 0.1, i * TICK_US) {
                ended_at_ms = Some(i * TICK_US / 1000);
                break;
            }
        }
        assert_eq!(ended_at_ms, Some(500), "failsafe should end attack at 500ms");
    }

    #[test]
    fn test_failsafe_with_slow_taps_and_partial_window() {
        // Taps ~64ms apart: only 8 fit in 500ms, so the window never fills in time
        let mut c = classifier();
        let mut ended_at_ms = None;
        for i in 0..20u64 {
            let f = if i % 2 == 0 { 400.0 } else { 480.0 };
            if !c.update(f, 0.1, i * 64_000) {
                ended_at_ms = Some(i * 64);
                break;
            }
        }
        assert_eq!(ended_at_ms, Some(512));
        assert!(c.window().is_empty());
    }

    #[test]
    fn test_counter_decrements_on_instability() {
        let mut c = AttackSustainClassifier::new(AttackConfig {
            max_attack_ms: 10_000,
            ..AttackConfig::default()
        });
        for i in 0..12u64 {
            c.update(440.0, 0.1, i * TICK_US);
        }
        assert_eq!(c.stable_ticks(), 3);
        c.update(520.0, 0.1, 12 * TICK_US);
        assert_eq!(c.stable_ticks(), 2);
    }

    #[test]
    fn test_sustain_is_sticky_until_reset() {
        let mut c = classifier();
        for i in 0..20u64 {
            c.update(440.0, 0.1, i * TICK_US);
        }
        assert!(!c.is_attack_phase());
        assert!(!c.update(900.0, 0.5, 20 * TICK_US));
        c.reset();
        assert!(c.is_attack_phase());
        assert!(c.window().is_empty());
        assert!(c.update(440.0, 0.1, 30 * TICK_US));
    }
}
