use crate::config::DetectorConfig;
use crate::detector::NoteDetector;
use crate::pitch_tracker::PitchTracker;
use crate::types::*;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{debug, info, trace, warn};

/// The coordinator receives InputEvents (audio chunks, pre-analysed pitch
/// taps, and control messages), runs the note detector, and fans out
/// DetectionFrames to every listener (UI, scoring, logger).
///
/// All detector state lives on the coordinator's thread. Listeners get
/// their own copy of each frame; a full listener channel drops that frame
/// for that listener rather than stalling the audio path.
///
/// The session starts as soon as `run()` is entered; `InputEvent::Stop`
/// and `InputEvent::Start` end and restart it.
pub struct Coordinator {
    input_rx: Receiver<InputEvent>,
    frame_txs: Vec<Sender<DetectionFrame>>,
    detector: NoteDetector,
    tracker: PitchTracker,
    /// Seconds the targeted note must be held; set by `SetHoldTarget`
    pub required_hold_secs: f64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Stats {
    frames: u64,
    holds: u64,
    dropped: u64,
}

impl Coordinator {
    pub fn new(
        input_rx: Receiver<InputEvent>,
        frame_txs: Vec<Sender<DetectionFrame>>,
        config: DetectorConfig,
    ) -> Self {
        let tracker = PitchTracker::new(
            config.tracker.clone(),
            config.conditioner.min_frequency_hz,
            config.conditioner.max_frequency_hz,
        );
        Self {
            input_rx,
            frame_txs,
            detector: NoteDetector::new(config),
            tracker,
            required_hold_secs: 1.0,
        }
    }

    /// Initial hold requirement, before any `SetHoldTarget` arrives.
    pub fn with_hold_target(mut self, secs: f64) -> Self {
        self.required_hold_secs = secs;
        self
    }

    pub fn run(&mut self) {
        info!(
            "Coordinator running (hold target {:.2}s, {} listener(s))",
            self.required_hold_secs,
            self.frame_txs.len()
        );
        self.detector.start();
        let mut stats = Stats::default();

        for event in self.input_rx.iter() {
            match event {
                InputEvent::Audio(chunk) => {
                    let detector = &mut self.detector;
                    let txs = &self.frame_txs;
                    let required = self.required_hold_secs;
                    self.tracker.process_chunk(&chunk, |sample| {
                        if let Some(frame) = detector.process_tick(sample, required) {
                            publish(txs, frame, &mut stats);
                        }
                    });
                }

                InputEvent::Sample(sample) => {
                    if let Some(frame) = self.detector.process_tick(sample, self.required_hold_secs) {
                        publish(&self.frame_txs, frame, &mut stats);
                    }
                }

                InputEvent::SetHoldTarget { secs } => {
                    if !secs.is_finite() {
                        warn!("Ignoring hold target {}; keeping {:.2}s", secs, self.required_hold_secs);
                        continue;
                    }
                    debug!("Hold target {:.2}s → {:.2}s", self.required_hold_secs, secs);
                    self.required_hold_secs = secs.max(0.0);
                }

                InputEvent::Start => {
                    self.tracker.reset();
                    self.detector.start();
                }

                InputEvent::Stop => {
                    self.tracker.reset();
                    self.detector.stop();
                }
            }
        }

        self.detector.stop();
        info!(
            "Coordinator shutting down after {} frames, {} holds ({} frame sends dropped)",
            stats.frames, stats.holds, stats.dropped
        );
    }
}

fn publish(txs: &[Sender<DetectionFrame>], frame: DetectionFrame, stats: &mut Stats) {
    stats.frames += 1;
    if frame.hold.fired {
        stats.holds += 1;
    }
    for tx in txs {
        match tx.try_send(frame.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => stats.dropped += 1,
            // Listener went away; the others still get frames
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
    if stats.frames % 1000 == 0 {
        debug!("Coordinator: {} frames processed", stats.frames);
        trace!("Latest: {}", frame);
    }
}
