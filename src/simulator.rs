use crate::note::{Note, DEFAULT_REFERENCE_HZ};
use crate::sampler::CHUNK_SIZE;
use crate::types::*;
use crossbeam_channel::Sender;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::thread;
use std::time::{Duration, Instant};

/// Synthesises a singer: silence, breathy onsets, glides into pitch,
/// steady notes and vibrato, rendered as audio chunks for the full
/// tracker → detector pipeline.
pub struct Simulator {
    sample_rate: u32,
    /// Monotonic sample counter; timestamps derive from it so output is
    /// identical regardless of OS scheduling.
    sample_counter: u64,
    /// Oscillator phase carried across gestures so pitch changes are click-free
    phase: f64,
    rng: StdRng,
    pending: Vec<f32>,
    /// Timestamp of the first sample in `pending`
    pending_start: u64,
}

/// One step of a simulated performance.
#[derive(Debug, Clone)]
pub enum Gesture {
    Silence { ms: u32 },
    /// Unpitched breath noise, peak amplitude `amp`
    Noise { amp: f32, ms: u32 },
    /// Pitch slides from `from_hz` to `to_hz`
    Glide { from_hz: f64, to_hz: f64, amp: f32, ms: u32 },
    /// Steady pitch
    Sing { hz: f64, amp: f32, ms: u32 },
    /// Pitch oscillating ±`depth_cents` around `hz`
    Vibrato { hz: f64, depth_cents: f64, rate_hz: f64, amp: f32, ms: u32 },
}

impl Simulator {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            sample_counter: 0,
            phase: 0.0,
            rng: StdRng::seed_from_u64(0x5eed),
            pending: Vec::with_capacity(CHUNK_SIZE),
            pending_start: 0,
        }
    }

    /// Render gestures to audio events immediately (no pacing). Timestamps
    /// start at the simulator's current sample position.
    pub fn render(&mut self, gestures: &[Gesture]) -> Vec<InputEvent> {
        let mut events = Vec::new();
        for g in gestures {
            self.render_gesture(g, &mut events);
        }
        self.flush(&mut events);
        events
    }

    /// Stream gestures to `tx` at real-time pace. Blocks the calling thread.
    pub fn run(&mut self, tx: Sender<InputEvent>, gestures: &[Gesture]) {
        info!("Simulator starting ({} gestures)...", gestures.len());
        let start = Instant::now();
        for g in gestures {
            info!("  {}", describe(g));
            let mut events = Vec::new();
            self.render_gesture(g, &mut events);
            for event in events {
                if let InputEvent::Audio(ref chunk) = event {
                    let target = Duration::from_micros(chunk.timestamp_us);
                    let elapsed = start.elapsed();
                    if elapsed < target {
                        thread::sleep(target - elapsed);
                    }
                }
                if tx.send(event).is_err() {
                    warn!("Simulator: coordinator gone, stopping");
                    return;
                }
            }
        }
        let mut tail = Vec::new();
        self.flush(&mut tail);
        for event in tail {
            let _ = tx.send(event);
        }
        info!("Simulator sequence complete.");
    }

    fn render_gesture(&mut self, g: &Gesture, out: &mut Vec<InputEvent>) {
        let sr = self.sample_rate as f64;
        let ms = match g {
            Gesture::Silence { ms }
            | Gesture::Noise { ms, .. }
            | Gesture::Glide { ms, .. }
            | Gesture::Sing { ms, .. }
            | Gesture::Vibrato { ms, .. } => *ms,
        };
        let n = (self.sample_rate as u64 * ms as u64 / 1000) as usize;

        for i in 0..n {
            let t = i as f64 / sr;
            let frac = if n > 1 { i as f64 / (n - 1) as f64 } else { 1.0 };
            let sample = match *g {
                Gesture::Silence { .. } => 0.0,
                Gesture::Noise { amp, .. } => self.rng.gen_range(-amp..=amp.max(f32::MIN_POSITIVE)),
                Gesture::Glide { from_hz, to_hz, amp, .. } => {
                    // Exponential (log-frequency) slide, like a voice
                    let hz = from_hz * (to_hz / from_hz).powf(smoothstep(frac));
                    self.oscillate(hz, amp)
                }
                Gesture::Sing { hz, amp, .. } => self.oscillate(hz, amp),
                Gesture::Vibrato { hz, depth_cents, rate_hz, amp, .. } => {
                    let cents = depth_cents * (2.0 * PI * rate_hz * t).sin();
                    self.oscillate(hz * 2f64.powf(cents / 1200.0), amp)
                }
            };
            self.push(sample, out);
        }
    }

    /// Advance the oscillator one sample at `hz`. Fundamental plus a weak
    /// second harmonic so the tracker sees a voice-like spectrum.
    fn oscillate(&mut self, hz: f64, amp: f32) -> f32 {
        self.phase = (self.phase + 2.0 * PI * hz / self.sample_rate as f64) % (2.0 * PI);
        let s = self.phase.sin() + 0.3 * (2.0 * self.phase).sin();
        (amp as f64 * s / 1.3) as f32
    }

    fn push(&mut self, sample: f32, out: &mut Vec<InputEvent>) {
        if self.pending.is_empty() {
            self.pending_start = self.sample_counter * 1_000_000 / self.sample_rate as u64;
        }
        self.pending.push(sample);
        self.sample_counter += 1;
        if self.pending.len() >= CHUNK_SIZE {
            self.flush(out);
        }
    }

    fn flush(&mut self, out: &mut Vec<InputEvent>) {
        if self.pending.is_empty() {
            return;
        }
        let samples = std::mem::replace(&mut self.pending, Vec::with_capacity(CHUNK_SIZE));
        out.push(InputEvent::Audio(AudioChunk {
            timestamp_us: self.pending_start,
            samples,
            sample_rate: self.sample_rate,
        }));
    }
}

fn describe(g: &Gesture) -> String {
    match g {
        Gesture::Silence { ms } => format!("silence {}ms", ms),
        Gesture::Noise { amp, ms } => format!("breath noise {:.2} for {}ms", amp, ms),
        Gesture::Glide { from_hz, to_hz, ms, .. } => {
            format!("glide {:.1} → {:.1} Hz over {}ms", from_hz, to_hz, ms)
        }
        Gesture::Sing { hz, ms, .. } => format!("sing {:.1} Hz for {}ms", hz, ms),
        Gesture::Vibrato { hz, depth_cents, rate_hz, ms, .. } => format!(
            "vibrato {:.1} Hz ±{:.0}¢ at {:.1}Hz for {}ms",
            hz, depth_cents, rate_hz, ms
        ),
    }
}

/// A held note with a breathy, scooped onset: the shape the detector is
/// built for.
pub fn held_note(note: Note, reference_hz: f64, hold_ms: u32) -> Vec<Gesture> {
    let hz = note.frequency(reference_hz);
    vec![
        Gesture::Noise { amp: 0.05, ms: 60 },
        Gesture::Glide { from_hz: hz * 0.94, to_hz: hz, amp: 0.3, ms: 150 },
        Gesture::Sing { hz, amp: 0.3, ms: hold_ms },
    ]
}

/// Named demo sequences for the CLI.
pub fn demo_sequence(name: &str) -> Option<Vec<Gesture>> {
    let r = DEFAULT_REFERENCE_HZ;
    let note = |s: &str| s.parse::<Note>().ok();
    match name {
        "basic" => {
            let mut g = vec![Gesture::Silence { ms: 300 }];
            g.extend(held_note(note("A4")?, r, 1500));
            g.push(Gesture::Silence { ms: 500 });
            Some(g)
        }
        "scale" => {
            let mut g = vec![Gesture::Silence { ms: 300 }];
            for name in ["C4", "D4", "E4", "F4", "G4", "A4", "B4", "C5"] {
                g.extend(held_note(note(name)?, r, 1200));
                g.push(Gesture::Silence { ms: 250 });
            }
            Some(g)
        }
        "vibrato" => {
            let hz = note("E4")?.frequency(r);
            Some(vec![
                Gesture::Silence { ms: 300 },
                Gesture::Glide { from_hz: hz * 0.9, to_hz: hz, amp: 0.3, ms: 200 },
                Gesture::Vibrato { hz, depth_cents: 30.0, rate_hz: 5.5, amp: 0.3, ms: 2500 },
                Gesture::Silence { ms: 500 },
            ])
        }
        _ => None,
    }
}

/// Smooth interpolation (ease in/out)
fn smoothstep(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total_samples(events: &[InputEvent]) -> usize {
        events
            .iter()
            .map(|e| match e {
                InputEvent::Audio(c) => c.samples.len(),
                _ => 0,
            })
            .sum()
    }

    #[test]
    fn test_render_length_and_timestamps() {
        let mut sim = Simulator::new(48000);
        let events = sim.render(&[Gesture::Sing { hz: 440.0, amp: 0.3, ms: 1000 }]);
        assert_eq!(total_samples(&events), 48000);
        let mut samples_before = 0u64;
        for e in &events {
            if let InputEvent::Audio(c) = e {
                assert_eq!(c.timestamp_us, samples_before * 1_000_000 / 48000);
                samples_before += c.samples.len() as u64;
            }
        }
    }

    #[test]
    fn test_render_is_deterministic() {
        let g = demo_sequence("basic").unwrap();
        let a = Simulator::new(48000).render(&g);
        let b = Simulator::new(48000).render(&g);
        let flat = |ev: &[InputEvent]| -> Vec<f32> {
            ev.iter()
                .flat_map(|e| match e {
                    InputEvent::Audio(c) => c.samples.clone(),
                    _ => Vec::new(),
                })
                .collect()
        };
        assert_eq!(flat(&a), flat(&b));
    }

    #[test]
    fn test_amplitude_bounded() {
        let mut sim = Simulator::new(48000);
        let events = sim.render(&demo_sequence("scale").unwrap());
        for e in &events {
            if let InputEvent::Audio(c) = e {
                assert!(c.samples.iter().all(|s| s.abs() <= 0.31));
            }
        }
    }

    #[test]
    fn test_unknown_demo() {
        assert!(demo_sequence("polka").is_none());
    }
}
