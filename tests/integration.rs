//! End-to-end tests for the pitch-hold pipeline.
//!
//! These exercise the full data flow:
//!   source → InputEvent channel → Coordinator → DetectionFrame channel(s) → assertions
//!
//! Sources are scripted pitch taps (`InputEvent::Sample`), a replayed trace,
//! or simulator audio that goes through the YIN tracker.

use crossbeam_channel::bounded;
use std::io::Cursor;
use std::thread;
use std::time::Duration;

use pitch_hold::config::DetectorConfig;
use pitch_hold::coordinator::Coordinator;
use pitch_hold::note::Note;
use pitch_hold::simulator::{demo_sequence, Gesture, Simulator};
use pitch_hold::trace_reader::TraceReader;
use pitch_hold::types::*;

const TICK_US: u64 = 50_000;

// ─── Helpers ───────────────────────────────────────────────────────────────

/// Run a coordinator in a background thread with `listeners` frame outputs,
/// feed it `events`, and collect each listener's frames until input closes.
fn run_pipeline_fanout(
    events: Vec<InputEvent>,
    hold_secs: f64,
    listeners: usize,
) -> Vec<Vec<DetectionFrame>> {
    let (input_tx, input_rx) = bounded::<InputEvent>(4096);
    let mut txs = Vec::new();
    let mut rxs = Vec::new();
    for _ in 0..listeners {
        let (tx, rx) = bounded::<DetectionFrame>(4096);
        txs.push(tx);
        rxs.push(rx);
    }

    let coord_handle = thread::Builder::new()
        .name("test-coordinator".into())
        .spawn(move || {
            Coordinator::new(input_rx, txs, DetectorConfig::default())
                .with_hold_target(hold_secs)
                .run();
        })
        .unwrap();

    for event in events {
        input_tx.send(event).unwrap();
    }
    drop(input_tx);
    let _ = coord_handle.join();

    rxs.into_iter()
        .map(|rx| {
            let mut frames = Vec::new();
            while let Ok(f) = rx.recv_timeout(Duration::from_millis(200)) {
                frames.push(f);
            }
            frames
        })
        .collect()
}

fn run_pipeline(events: Vec<InputEvent>, hold_secs: f64) -> Vec<DetectionFrame> {
    run_pipeline_fanout(events, hold_secs, 1).remove(0)
}

/// `n` pitch taps 50ms apart starting at `start_us`; `hz(i)` gives the
/// frequency of tap `i`.
fn taps(hz: impl Fn(u64) -> f64, amp: f32, start_us: u64, n: u64) -> Vec<InputEvent> {
    (0..n)
        .map(|i| InputEvent::Sample(RawSample::new(hz(i), amp, start_us + i * TICK_US)))
        .collect()
}

fn a4() -> Note {
    "A4".parse().unwrap()
}

// ─── Scenario: approach and hold ───────────────────────────────────────────

#[test]
fn test_ramp_then_hold_at_440() {
    // 0.5s scoop from 415Hz up to 440Hz, then 1.0s steady, at amplitude 0.1.
    let ramp = |i: u64| if i <= 10 { 415.0 + 2.5 * i as f64 } else { 440.0 };
    let frames = run_pipeline(taps(ramp, 0.1, 0, 31), 0.8);
    assert_eq!(frames.len(), 31);

    // Smoothed amplitude needs a few ticks to clear the 0.03 gate
    assert!(frames[..3].iter().all(|f| !f.reading.is_active));
    assert!(frames[3].reading.is_active);

    let first_sustain = frames
        .iter()
        .find(|f| f.phase == NotePhase::Sustain)
        .expect("sustain reached");
    // Failsafe: 500ms after the first active tick
    assert_eq!(first_sustain.timestamp_us, 650_000);
    assert_eq!(first_sustain.sustained_note, Some(a4()));

    // No hold credit during attack
    for f in frames.iter().filter(|f| f.phase == NotePhase::Attack) {
        assert!(f.sustained_note.is_none());
        assert!(!f.hold.fired);
    }

    let fired: Vec<_> = frames.iter().filter(|f| f.hold.fired).collect();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].timestamp_us - first_sustain.timestamp_us, 800_000);
    assert_eq!(fired[0].sustained_note, Some(a4()));

    // 440Hz against A4=442Hz reads about 7.85 cents flat
    let last = frames.last().unwrap();
    assert_eq!(last.reading.note_name(), "A4");
    assert!(
        (last.reading.deviation_cents + 7.85).abs() < 1.0,
        "got {}",
        last.reading.deviation_cents
    );
}

#[test]
fn test_quiet_input_never_activates() {
    let frames = run_pipeline(taps(|_| 440.0, 0.01, 0, 40), 0.2);
    assert_eq!(frames.len(), 40);
    for f in &frames {
        assert!(!f.reading.is_active);
        assert_eq!(f.reading.note_name(), "-");
        assert_eq!(f.phase, NotePhase::Silent);
        assert!(!f.hold.fired);
    }
}

#[test]
fn test_rate_limited_taps_are_dropped() {
    // Taps every 20ms: only those at least 50ms after the last accepted one pass
    let events = (0..20u64)
        .map(|i| InputEvent::Sample(RawSample::new(442.0, 0.3, i * 20_000)))
        .collect();
    let frames = run_pipeline(events, 1.0);
    let ts: Vec<u64> = frames.iter().map(|f| f.timestamp_us).collect();
    assert_eq!(ts[..4], [0, 60_000, 120_000, 180_000]);
    assert!(ts.windows(2).all(|w| w[1] - w[0] >= 50_000));
}

// ─── Fan-out and lifecycle ─────────────────────────────────────────────────

#[test]
fn test_fan_out_to_two_listeners() {
    let outputs = run_pipeline_fanout(taps(|_| 442.0, 0.2, 0, 40), 0.8, 2);
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0].len(), 40);
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0].iter().filter(|f| f.hold.fired).count(), 1);
}

#[test]
fn test_stop_and_restart_session() {
    let mut events = taps(|_| 442.0, 0.5, 0, 30);
    events.push(InputEvent::Stop);
    events.extend(taps(|_| 442.0, 0.5, 30 * TICK_US, 10));
    events.push(InputEvent::Start);
    events.extend(taps(|_| 442.0, 0.5, 40 * TICK_US, 5));

    let frames = run_pipeline(events, 5.0);
    // Taps sent while stopped produce nothing
    assert_eq!(frames.len(), 35);

    let before = &frames[29];
    assert_eq!(before.phase, NotePhase::Sustain);
    assert!(before.hold.held_secs > 0.0);

    // Fresh session: back in attack, nothing held
    let after = &frames[30];
    assert_eq!(after.timestamp_us, 40 * TICK_US);
    assert_eq!(after.phase, NotePhase::Attack);
    assert_eq!(after.hold.held_secs, 0.0);
}

#[test]
fn test_silence_breaks_the_hold() {
    let mut events = taps(|_| 442.0, 0.2, 0, 20);
    // Unpitched gap
    events.extend(taps(|_| 0.0, 0.2, 20 * TICK_US, 2));
    events.extend(taps(|_| 442.0, 0.2, 22 * TICK_US, 20));

    let frames = run_pipeline(events, 0.8);
    assert_eq!(frames[20].phase, NotePhase::Silent);
    assert_eq!(frames[20].hold.held_secs, 0.0);
    // Neither side of the gap reaches 0.8s of sustain
    assert!(frames.iter().all(|f| !f.hold.fired));
    assert_eq!(frames[22].phase, NotePhase::Attack);
}

// ─── Trace replay ──────────────────────────────────────────────────────────

#[test]
fn test_trace_replay_reaches_hold() {
    let mut trace = String::from(r#"{"format":"pitch-trace","rate_hz":20,"reference_pitch_hz":442.0}"#);
    trace.push('\n');
    for i in 0..40u64 {
        trace += &serde_json::to_string(&RawSample::new(442.0, 0.2, i * TICK_US)).unwrap();
        trace.push('\n');
    }

    let samples = TraceReader::open(Cursor::new(trace)).unwrap().read_all();
    assert_eq!(samples.len(), 40);
    let events = samples.into_iter().map(InputEvent::Sample).collect();

    let frames = run_pipeline(events, 0.8);
    let fired: Vec<_> = frames.iter().filter(|f| f.hold.fired).collect();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].timestamp_us, 1_350_000);
    assert!(fired[0].reading.deviation_cents.abs() < 0.01);
}

// ─── Audio through the tracker ─────────────────────────────────────────────

#[test]
fn test_simulated_singer_reaches_hold() {
    let events = Simulator::new(48000).render(&demo_sequence("basic").unwrap());
    let frames = run_pipeline(events, 0.5);
    assert!(!frames.is_empty());

    let sustained: Vec<_> = frames
        .iter()
        .filter(|f| f.phase == NotePhase::Sustain)
        .collect();
    assert!(!sustained.is_empty(), "never reached sustain");

    let fired: Vec<_> = frames.iter().filter(|f| f.hold.fired).collect();
    assert!(!fired.is_empty(), "hold never confirmed");
    assert_eq!(fired[0].sustained_note, Some(a4()));
    assert!(
        fired[0].reading.deviation_cents.abs() < 10.0,
        "got {}",
        fired[0].reading.deviation_cents
    );

    // Trailing silence turns the detector off again
    assert_eq!(frames.last().unwrap().phase, NotePhase::Silent);
}

#[test]
fn test_wide_vibrato_leaves_attack_within_failsafe() {
    // ±60 cents never settles within 5 Hz, so only the 500ms failsafe ends
    // the attack. Tracker taps must reach the detector often enough for it
    // to fire on time.
    let gestures = [Gesture::Vibrato {
        hz: 440.0,
        depth_cents: 60.0,
        rate_hz: 5.5,
        amp: 0.3,
        ms: 3000,
    }];
    let frames = run_pipeline(Simulator::new(48000).render(&gestures), 5.0);

    let ts: Vec<u64> = frames.iter().map(|f| f.timestamp_us).collect();
    assert!(ts.windows(2).all(|w| w[1] - w[0] == TICK_US), "tap spacing {:?}", &ts[..5]);

    let first_attack = frames
        .iter()
        .position(|f| f.phase == NotePhase::Attack)
        .expect("attack reached");
    let first_sustain = frames
        .iter()
        .position(|f| f.phase == NotePhase::Sustain)
        .expect("sustain reached");
    assert!(frames[first_attack..first_sustain]
        .iter()
        .all(|f| f.phase == NotePhase::Attack));

    let attack_us = frames[first_sustain].timestamp_us - frames[first_attack].timestamp_us;
    assert!(attack_us <= 500_000, "attack lasted {}µs", attack_us);
}
