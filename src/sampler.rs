//! Microphone capture.
//!
//! With the `audio` feature, `PitchSampler` opens the default cpal input
//! device and streams mono `InputEvent::Audio` chunks to the coordinator,
//! which turns them into pitch taps. Without it (or without a microphone)
//! `start` fails with a `SamplerError` and the caller carries on with the
//! detector inactive.

use crate::types::{InputEvent, SessionClock};
use crossbeam_channel::Sender;
use std::fmt;

/// Samples per emitted `AudioChunk`. ~21ms at 48kHz.
pub const CHUNK_SIZE: usize = 1024;

/// Why the audio session could not be started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SamplerError {
    /// No input device, or access to it was refused
    NoInputDevice,
    /// The device offers no usable input configuration
    UnsupportedConfig(String),
    /// The input stream could not be built
    StreamBuild(String),
    /// The stream was built but would not start
    StreamPlay(String),
    /// Built without the `audio` feature
    AudioDisabled,
}

impl fmt::Display for SamplerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerError::NoInputDevice => write!(f, "no audio input device available"),
            SamplerError::UnsupportedConfig(e) => write!(f, "unsupported input config: {}", e),
            SamplerError::StreamBuild(e) => write!(f, "failed to open input stream: {}", e),
            SamplerError::StreamPlay(e) => write!(f, "failed to start input stream: {}", e),
            SamplerError::AudioDisabled => {
                write!(f, "microphone capture requires the 'audio' feature")
            }
        }
    }
}

impl std::error::Error for SamplerError {}

#[cfg(feature = "audio")]
pub use backend::{input_available, PitchSampler};

#[cfg(not(feature = "audio"))]
pub use disabled::{input_available, PitchSampler};

#[cfg(feature = "audio")]
mod backend {
    use super::{SamplerError, CHUNK_SIZE};
    use crate::types::{AudioChunk, InputEvent, SessionClock};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleFormat, Stream, StreamConfig};
    use crossbeam_channel::Sender;
    use log::{error, info};
    use std::thread;

    /// True if a default input device exists (the closest cross-platform
    /// stand-in for "microphone access granted").
    pub fn input_available() -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    /// Live audio capture via cpal.
    ///
    /// Holds the cpal `Stream` alive. Drop this (or call `stop`) to halt
    /// capture. Samples are mixed to mono f32 and sent as
    /// `InputEvent::Audio` chunks of `CHUNK_SIZE` samples.
    pub struct PitchSampler {
        stream: Option<Stream>,
    }

    impl PitchSampler {
        /// Open the default input device and start streaming.
        /// Returns immediately; audio arrives on a background thread.
        pub fn start(tx: Sender<InputEvent>, clock: SessionClock) -> Result<Self, SamplerError> {
            let host = cpal::default_host();

            let device = host
                .default_input_device()
                .ok_or(SamplerError::NoInputDevice)?;

            info!(
                "Audio input: {}",
                device.name().unwrap_or_else(|_| "unknown".into())
            );

            let supported = device
                .default_input_config()
                .map_err(|e| SamplerError::UnsupportedConfig(e.to_string()))?;

            // Prefer 48kHz; the tracker's default window is sized for it.
            let preferred = cpal::SampleRate(48000);
            let config_48k = device.supported_input_configs().ok().and_then(|configs| {
                configs
                    .filter(|c| {
                        c.channels() == supported.channels()
                            && c.min_sample_rate() <= preferred
                            && c.max_sample_rate() >= preferred
                    })
                    .max_by_key(|c| c.max_sample_rate())
                    .map(|c| c.with_sample_rate(preferred))
            });

            let (config, sample_rate, format): (StreamConfig, u32, SampleFormat) =
                if let Some(cfg) = config_48k {
                    let sr = cfg.sample_rate().0;
                    let fmt = cfg.sample_format();
                    (cfg.into(), sr, fmt)
                } else {
                    let sr = supported.sample_rate().0;
                    let fmt = supported.sample_format();
                    (supported.into(), sr, fmt)
                };

            let channels = config.channels as usize;
            info!(
                "Capture config: {}Hz  {} ch  {:?}",
                sample_rate, channels, format
            );

            // Realtime callback → chunking thread. try_send so the callback never blocks.
            let (raw_tx, raw_rx) = crossbeam_channel::bounded::<Vec<f32>>(64);
            let err_fn = |e: cpal::StreamError| error!("Audio stream error: {e}");

            let stream = match format {
                SampleFormat::F32 => device.build_input_stream(
                    &config,
                    move |data: &[f32], _| {
                        let _ = raw_tx.try_send(mix_mono_f32(data, channels));
                    },
                    err_fn,
                    None,
                ),
                SampleFormat::I16 => device.build_input_stream(
                    &config,
                    move |data: &[i16], _| {
                        let _ = raw_tx.try_send(mix_mono_i16(data, channels));
                    },
                    err_fn,
                    None,
                ),
                fmt => {
                    return Err(SamplerError::UnsupportedConfig(format!(
                        "sample format {fmt:?}; use an F32 or I16 device"
                    )))
                }
            }
            .map_err(|e| SamplerError::StreamBuild(e.to_string()))?;

            stream
                .play()
                .map_err(|e| SamplerError::StreamPlay(e.to_string()))?;

            thread::Builder::new()
                .name("audio-capture".into())
                .spawn(move || {
                    let mut accum: Vec<f32> = Vec::with_capacity(CHUNK_SIZE * 4);
                    for chunk in raw_rx {
                        accum.extend_from_slice(&chunk);
                        while accum.len() >= CHUNK_SIZE {
                            let samples: Vec<f32> = accum.drain(..CHUNK_SIZE).collect();
                            let event = InputEvent::Audio(AudioChunk {
                                timestamp_us: clock.now_us(),
                                samples,
                                sample_rate,
                            });
                            if tx.send(event).is_err() {
                                return; // Coordinator gone
                            }
                        }
                    }
                    // Stream dropped: raw_tx closed
                })
                .map_err(|e| SamplerError::StreamBuild(e.to_string()))?;

            Ok(Self {
                stream: Some(stream),
            })
        }

        /// Halt capture. Safe to call more than once.
        pub fn stop(&mut self) {
            if self.stream.take().is_some() {
                info!("Audio capture stopped");
            }
        }

        pub fn is_running(&self) -> bool {
            self.stream.is_some()
        }
    }

    fn mix_mono_f32(data: &[f32], channels: usize) -> Vec<f32> {
        if channels <= 1 {
            return data.to_vec();
        }
        data.chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }

    fn mix_mono_i16(data: &[i16], channels: usize) -> Vec<f32> {
        const SCALE: f32 = i16::MAX as f32;
        let channels = channels.max(1);
        data.chunks(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                sum as f32 / (channels as f32 * SCALE)
            })
            .collect()
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_mix_stereo_to_mono() {
            let mono = mix_mono_f32(&[0.2, 0.4, -1.0, 1.0], 2);
            assert_eq!(mono.len(), 2);
            assert!((mono[0] - 0.3).abs() < 1e-6);
            assert!(mono[1].abs() < 1e-6);
        }

        #[test]
        fn test_mix_i16_scales() {
            let mono = mix_mono_i16(&[i16::MAX, i16::MAX], 2);
            assert!((mono[0] - 1.0).abs() < 1e-4);
        }
    }
}

#[cfg(not(feature = "audio"))]
mod disabled {
    use super::SamplerError;
    use crate::types::{InputEvent, SessionClock};
    use crossbeam_channel::Sender;

    pub fn input_available() -> bool {
        false
    }

    /// Stand-in when built without the `audio` feature: never starts.
    pub struct PitchSampler {
        _private: (),
    }

    impl PitchSampler {
        pub fn start(_tx: Sender<InputEvent>, _clock: SessionClock) -> Result<Self, SamplerError> {
            Err(SamplerError::AudioDisabled)
        }

        pub fn stop(&mut self) {}

        pub fn is_running(&self) -> bool {
            false
        }
    }
}

/// Start capture, logging instead of failing when no microphone is usable.
pub fn try_start(tx: Sender<InputEvent>, clock: SessionClock) -> Option<PitchSampler> {
    match PitchSampler::start(tx, clock) {
        Ok(s) => Some(s),
        Err(e) => {
            log::error!("Microphone unavailable: {}. Detector stays inactive.", e);
            None
        }
    }
}
