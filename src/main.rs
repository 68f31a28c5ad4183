use pitch_hold::config::DetectorConfig;
use pitch_hold::coordinator::Coordinator;
use pitch_hold::frame_logger::FrameLogger;
use pitch_hold::note::Note;
use pitch_hold::sampler;
use pitch_hold::simulator::{self, Simulator};
use pitch_hold::trace_reader::TraceReader;
use pitch_hold::types::*;
use pitch_hold::wav_player::WavPlayer;

use clap::Parser;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info, warn};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process;
use std::thread::{self, JoinHandle};

/// Sample rate of simulator audio
const SIM_SAMPLE_RATE: u32 = 48000;

#[derive(Parser)]
#[command(name = "pitch-hold")]
#[command(about = "Detect sustained sung or played notes and time how long they are held")]
struct Cli {
    /// Listen to the default microphone (requires the 'audio' feature)
    #[arg(long)]
    mic: bool,

    /// Stream a WAV file through the detector
    #[arg(long, conflicts_with = "mic")]
    audio_file: Option<PathBuf>,

    /// Replay a recorded pitch trace (JSONL)
    #[arg(long, conflicts_with_all = ["mic", "audio_file"])]
    trace: Option<PathBuf>,

    /// Simulator demo: "basic", "scale", or "vibrato"
    #[arg(long, default_value = "basic")]
    demo: String,

    /// Detector config file (JSON); missing sections use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Concert pitch of A4 in Hz
    #[arg(long)]
    reference_hz: Option<f64>,

    /// Amplitude gate below which input counts as silence
    #[arg(long)]
    min_amplitude: Option<f32>,

    /// Minimum interval between two confirmed holds (ms)
    #[arg(long)]
    cooldown_ms: Option<u64>,

    /// How long a note must be held to count (seconds)
    #[arg(long, default_value_t = 1.0)]
    hold_secs: f64,

    /// Record every detection frame to a session directory
    #[arg(long)]
    log_frames: bool,

    /// Output directory for logged sessions
    #[arg(long, default_value = "./sessions")]
    output_dir: PathBuf,
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let cli = Cli::parse();
    let config = build_config(&cli);
    if let Err(e) = config.validate() {
        error!("Invalid detector config: {}", e);
        process::exit(2);
    }
    let clock = SessionClock::new();

    info!("═══════════════════════════════════════════════");
    info!("  PITCH HOLD v{}", env!("CARGO_PKG_VERSION"));
    info!("  A4 = {} Hz, hold {:.2}s", config.reference_pitch_hz, cli.hold_secs);
    info!("  Source: {}", source_name(&cli));
    info!("═══════════════════════════════════════════════");

    // Channel: inputs → coordinator
    let (input_tx, input_rx) = bounded::<InputEvent>(4096);

    // Channels: coordinator → listeners
    let mut frame_txs: Vec<Sender<DetectionFrame>> = Vec::new();
    let mut handles = Vec::new();

    // ─── Monitor (note changes and holds) ───────────────────────────
    {
        let (tx, rx) = bounded::<DetectionFrame>(256);
        frame_txs.push(tx);
        handles.extend(spawn_named("monitor", move || monitor(rx)));
    }

    // ─── Frame logger ───────────────────────────────────────────────
    if cli.log_frames {
        let (tx, rx) = bounded::<DetectionFrame>(4096);
        match FrameLogger::new(rx, &cli.output_dir, &config) {
            Ok(logger) => {
                frame_txs.push(tx);
                handles.extend(spawn_named("logger", move || logger.run_logged()));
            }
            Err(e) => error!("Frame logging disabled: {}", e),
        }
    }

    // ─── Coordinator ────────────────────────────────────────────────
    let coord_config = config.clone();
    let hold_secs = cli.hold_secs;
    let coordinator = spawn_named("coordinator", move || {
        Coordinator::new(input_rx, frame_txs, coord_config)
            .with_hold_target(hold_secs)
            .run();
    });

    // ─── Input source ───────────────────────────────────────────────
    // The mic sampler must outlive the coordinator, so it stays on this thread.
    let mut mic = None;
    if cli.mic {
        mic = sampler::try_start(input_tx.clone(), clock.clone());
        if mic.is_none() {
            warn!("Falling back to simulator demo '{}'", cli.demo);
            handles.extend(spawn_simulator(&cli.demo, input_tx.clone()));
        }
    } else if let Some(path) = cli.audio_file.clone() {
        let tx = input_tx.clone();
        let wav_clock = clock.clone();
        handles.extend(spawn_named("wav-player", move || {
            WavPlayer::new(path, tx, wav_clock).run();
        }));
    } else if let Some(path) = cli.trace.clone() {
        let tx = input_tx.clone();
        let reference = config.reference_pitch_hz;
        handles.extend(spawn_named("trace", move || replay_trace(&path, tx, reference)));
    } else {
        handles.extend(spawn_simulator(&cli.demo, input_tx.clone()));
    }
    drop(input_tx);

    if mic.is_some() {
        info!("Listening. Press Ctrl+C to stop.");
    }
    if let Some(h) = coordinator {
        let _ = h.join();
    }
    if let Some(mut m) = mic {
        m.stop();
    }
    for h in handles {
        let _ = h.join();
    }
}

/// Config file (or defaults) with CLI overrides applied.
fn build_config(cli: &Cli) -> DetectorConfig {
    let mut config = cli
        .config
        .as_deref()
        .and_then(DetectorConfig::load)
        .unwrap_or_default();
    if let Some(hz) = cli.reference_hz {
        config.reference_pitch_hz = hz;
    }
    if let Some(amp) = cli.min_amplitude {
        config.conditioner.min_amplitude = amp;
    }
    if let Some(ms) = cli.cooldown_ms {
        config.hold.min_success_interval_ms = ms;
    }
    config
}

fn source_name(cli: &Cli) -> String {
    if cli.mic {
        "microphone".into()
    } else if let Some(p) = &cli.audio_file {
        format!("WAV {:?}", p)
    } else if let Some(p) = &cli.trace {
        format!("trace {:?}", p)
    } else {
        format!("simulator ({})", cli.demo)
    }
}

fn spawn_named<F>(name: &str, f: F) -> Option<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    match thread::Builder::new().name(name.into()).spawn(f) {
        Ok(h) => Some(h),
        Err(e) => {
            error!("Failed to spawn {} thread: {}", name, e);
            None
        }
    }
}

fn spawn_simulator(demo: &str, tx: Sender<InputEvent>) -> Option<JoinHandle<()>> {
    let gestures = match simulator::demo_sequence(demo) {
        Some(g) => g,
        None => {
            error!("Unknown demo '{}'; expected basic, scale, or vibrato", demo);
            return None;
        }
    };
    spawn_named("simulator", move || {
        Simulator::new(SIM_SAMPLE_RATE).run(tx, &gestures);
    })
}

/// Feed a recorded trace straight into the coordinator. Timestamps come
/// from the trace, so no pacing is needed.
fn replay_trace(path: &Path, tx: Sender<InputEvent>, reference_hz: f64) {
    let reader = match File::open(path)
        .map_err(|e| e.to_string())
        .and_then(|f| TraceReader::open(BufReader::new(f)))
    {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to open trace {:?}: {}", path, e);
            return;
        }
    };
    info!(
        "Replaying trace {:?} (captured at {} taps/s)",
        path, reader.header.rate_hz
    );
    if let Some(hz) = reader.header.reference_pitch_hz {
        if (hz - reference_hz).abs() > f64::EPSILON {
            warn!(
                "Trace was recorded at A4={} Hz; replaying at A4={} Hz",
                hz, reference_hz
            );
        }
    }

    let mut reader = reader;
    let mut count = 0u64;
    while let Some(result) = reader.next_sample() {
        match result {
            Ok(sample) => {
                if tx.send(InputEvent::Sample(sample)).is_err() {
                    break;
                }
                count += 1;
            }
            Err(e) => warn!("Skipping trace line: {}", e),
        }
    }
    info!("Trace replay complete ({} samples).", count);
}

/// Log sustained-note changes and confirmed holds.
fn monitor(rx: Receiver<DetectionFrame>) {
    let mut last_note: Option<Note> = None;
    for frame in rx.iter() {
        debug!("{}", frame);
        if frame.sustained_note != last_note {
            match frame.sustained_note {
                Some(n) => info!(
                    "♪ {}  {:+.1}¢  ({:.1} Hz)",
                    n, frame.reading.deviation_cents, frame.reading.frequency_hz
                ),
                None if frame.phase == NotePhase::Silent => info!("· silence"),
                None => {}
            }
            last_note = frame.sustained_note;
        }
        if frame.hold.fired {
            info!(
                "✔ Held {} for {:.2}s",
                frame.reading.note_name(),
                frame.hold.held_secs
            );
        }
    }
}
