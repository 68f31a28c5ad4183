use crate::config::DetectorConfig;
use crate::types::*;
use crossbeam_channel::Receiver;
use log::{error, info};
use serde_json::json;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Records every DetectionFrame of a session for offline inspection.
///
/// Layout of `<output_dir>/session_<unix secs>/`:
/// - `config.json`: detector config the session ran with
/// - `frames.jsonl`: one DetectionFrame per line
/// - `stats.json`: totals and the list of confirmed holds, written on exit
pub struct FrameLogger {
    rx: Receiver<DetectionFrame>,
    session_dir: PathBuf,
}

impl FrameLogger {
    /// Create the session directory and record the config.
    pub fn new(
        rx: Receiver<DetectionFrame>,
        output_dir: &Path,
        config: &DetectorConfig,
    ) -> io::Result<Self> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let session_dir = output_dir.join(format!("session_{}", timestamp));
        fs::create_dir_all(&session_dir)?;
        config.save(&session_dir.join("config.json"))?;
        Ok(Self { rx, session_dir })
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Run until the frame channel closes. Blocks the calling thread.
    pub fn run(&self) -> io::Result<()> {
        info!("Frame logger → {:?}", self.session_dir);

        let mut writer = BufWriter::new(File::create(self.session_dir.join("frames.jsonl"))?);
        let mut frame_count: u64 = 0;
        let mut sustain_frames: u64 = 0;
        let mut holds = Vec::new();
        let mut last_ts: u64 = 0;

        for frame in self.rx.iter() {
            serde_json::to_writer(&mut writer, &frame).map_err(io::Error::other)?;
            writer.write_all(b"\n")?;
            frame_count += 1;
            last_ts = frame.timestamp_us;
            if frame.phase == NotePhase::Sustain {
                sustain_frames += 1;
            }
            if frame.hold.fired {
                holds.push(json!({
                    "t": frame.timestamp_us,
                    "note": frame.sustained_note,
                    "held_secs": frame.hold.held_secs,
                    "cents": frame.reading.deviation_cents,
                }));
            }
            if frame_count % 1000 == 0 {
                writer.flush()?;
                info!("Logged {} frames", frame_count);
            }
        }
        writer.flush()?;

        let stats = json!({
            "total_frames": frame_count,
            "sustain_frames": sustain_frames,
            "duration_secs": us_to_secs(last_ts),
            "hold_count": holds.len(),
            "holds": holds,
        });
        let text = serde_json::to_string_pretty(&stats).map_err(io::Error::other)?;
        fs::write(self.session_dir.join("stats.json"), text)?;

        info!(
            "Session saved: {} frames, {} holds → {:?}",
            frame_count,
            holds.len(),
            self.session_dir
        );
        Ok(())
    }

    /// `run`, logging instead of returning the error. For thread bodies.
    pub fn run_logged(&self) {
        if let Err(e) = self.run() {
            error!("Frame logger failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::NoteMapper;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pitch-hold-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn frame(ts: u64, fired: bool) -> DetectionFrame {
        let reading = NoteMapper::new(442.0).reading(442.0);
        DetectionFrame {
            timestamp_us: ts,
            reading,
            phase: NotePhase::Sustain,
            sustained_note: reading.note,
            hold: HoldProgress {
                held_secs: 0.8,
                required_secs: 0.8,
                fired,
            },
        }
    }

    #[test]
    fn test_writes_frames_and_stats() {
        let dir = scratch_dir("logger");
        let (tx, rx) = crossbeam_channel::bounded(8);
        let logger = FrameLogger::new(rx, &dir, &DetectorConfig::default()).unwrap();
        tx.send(frame(0, false)).unwrap();
        tx.send(frame(50_000, true)).unwrap();
        drop(tx);
        logger.run().unwrap();

        let session = logger.session_dir();
        assert!(session.join("config.json").exists());
        let frames = fs::read_to_string(session.join("frames.jsonl")).unwrap();
        assert_eq!(frames.lines().count(), 2);
        let back: DetectionFrame = serde_json::from_str(frames.lines().nth(1).unwrap()).unwrap();
        assert!(back.hold.fired);

        let stats: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(session.join("stats.json")).unwrap()).unwrap();
        assert_eq!(stats["total_frames"], 2);
        assert_eq!(stats["hold_count"], 1);
        assert_eq!(stats["holds"][0]["note"], "A4");

        let _ = fs::remove_dir_all(&dir);
    }
}
