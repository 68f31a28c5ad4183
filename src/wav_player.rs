use crate::sampler::CHUNK_SIZE;
use crate::types::*;
use crossbeam_channel::Sender;
use hound::{SampleFormat, WavReader};
use log::{error, info, warn};
use std::io::Read;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

/// Streams a WAV recording through the pipeline as if it were the microphone.
///
/// Typical use: `--audio-file take.wav` to check gate and stability
/// thresholds against a real singer before going live.
pub struct WavPlayer {
    path: PathBuf,
    tx: Sender<InputEvent>,
    clock: SessionClock,
}

/// Decoded mono audio.
#[derive(Debug, Clone)]
pub struct MonoAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl MonoAudio {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate.max(1) as f64
    }
}

/// Decode any hound-readable WAV source to mono f32.
pub fn decode<R: Read>(reader: WavReader<R>) -> Result<MonoAudio, String> {
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| format!("decode float samples: {}", e))?,
        SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<_, _>>()
                .map_err(|e| format!("decode int samples: {}", e))?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(MonoAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

impl WavPlayer {
    pub fn new(path: PathBuf, tx: Sender<InputEvent>, clock: SessionClock) -> Self {
        Self { path, tx, clock }
    }

    /// Stream the file at real-time pace. Blocks the calling thread.
    pub fn run(&self) {
        let audio = match WavReader::open(&self.path)
            .map_err(|e| e.to_string())
            .and_then(decode)
        {
            Ok(a) => a,
            Err(e) => {
                error!("Failed to read WAV file {:?}: {}", self.path, e);
                return;
            }
        };

        info!(
            "WAV: {:?}  {} Hz  {:.2}s → streaming at real-time pace",
            self.path.file_name().unwrap_or_default(),
            audio.sample_rate,
            audio.duration_secs(),
        );
        if audio.sample_rate < 16000 {
            warn!(
                "WAV sample rate is {} Hz; pitches above {} Hz cannot be tracked",
                audio.sample_rate,
                audio.sample_rate / 4
            );
        }

        let chunk_dur = Duration::from_secs_f64(CHUNK_SIZE as f64 / audio.sample_rate as f64);
        let start = Instant::now();

        for (i, chunk) in audio.samples.chunks(CHUNK_SIZE).enumerate() {
            let target = chunk_dur * i as u32;
            let elapsed = start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }

            let event = InputEvent::Audio(AudioChunk {
                timestamp_us: self.clock.now_us(),
                samples: chunk.to_vec(),
                sample_rate: audio.sample_rate,
            });

            if self.tx.send(event).is_err() {
                break;
            }
        }

        info!("WAV playback complete.");
    }
}
