//! Detector configuration: thresholds, smoothing factors, and timing.
//!
//! Loaded from JSON (e.g. `pitch-hold.json`); every section is optional and
//! falls back to the defaults below, so a file only needs the keys it changes.

use crate::note::DEFAULT_REFERENCE_HZ;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// Smoothing and gating applied to every raw sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionerConfig {
    /// Weight of the previous smoothed amplitude (0.0 = none, 0.99 = very smooth)
    pub amplitude_smoothing: f32,
    /// Weight of the previous smoothed frequency. Lighter than amplitude so
    /// real pitch changes are tracked.
    pub frequency_smoothing: f64,
    /// Minimum spacing between ticks forwarded downstream
    pub min_processing_interval_ms: u64,
    /// Smoothed amplitude must exceed this for the tick to count as signal
    pub min_amplitude: f32,
    pub min_frequency_hz: f64,
    pub max_frequency_hz: f64,
}

impl Default for ConditionerConfig {
    fn default() -> Self {
        Self {
            amplitude_smoothing: 0.9,
            frequency_smoothing: 0.8,
            min_processing_interval_ms: 50,
            min_amplitude: 0.03,
            min_frequency_hz: 20.0,
            max_frequency_hz: 2000.0,
        }
    }
}

/// Onset (attack) vs. steady (sustain) classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackConfig {
    /// Number of recent accepted ticks examined for stability
    pub window_size: usize,
    /// (max - min) / max amplitude across the window must stay below this
    pub amplitude_variation_threshold: f32,
    /// max - min frequency across the window must stay below this
    pub frequency_variation_hz: f64,
    /// Consecutive stable ticks needed to enter sustain
    pub required_stable_ticks: u32,
    /// Attack always ends after this long, stable or not
    pub max_attack_ms: u64,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            amplitude_variation_threshold: 0.15,
            frequency_variation_hz: 5.0,
            required_stable_ticks: 5,
            max_attack_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoldConfig {
    /// Cooldown between two confirmed holds
    pub min_success_interval_ms: u64,
}

impl Default for HoldConfig {
    fn default() -> Self {
        Self {
            min_success_interval_ms: 1000,
        }
    }
}

/// Audio → (frequency, amplitude) analysis tap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Samples per YIN analysis (~43ms at 48kHz)
    pub analysis_window: usize,
    /// Samples between analyses (10ms at 48kHz, a divisor of the 50ms tick)
    pub hop_size: usize,
    /// YIN absolute threshold on the normalized difference function
    pub yin_threshold: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            analysis_window: 2048,
            hop_size: 480,
            yin_threshold: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Frequency of A4 used for note naming and cents
    pub reference_pitch_hz: f64,
    pub conditioner: ConditionerConfig,
    pub attack: AttackConfig,
    pub hold: HoldConfig,
    pub tracker: TrackerConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            reference_pitch_hz: DEFAULT_REFERENCE_HZ,
            conditioner: ConditionerConfig::default(),
            attack: AttackConfig::default(),
            hold: HoldConfig::default(),
            tracker: TrackerConfig::default(),
        }
    }
}

impl DetectorConfig {
    /// Load from a JSON file. Returns None if file is absent or malformed.
    pub fn load(path: &Path) -> Option<Self> {
        let data = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&data) {
            Ok(c) => {
                info!("Loaded detector config from {:?}", path);
                Some(c)
            }
            Err(e) => {
                warn!("Failed to parse config file {:?}: {}", path, e);
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, json)?;
        info!("Detector config saved to {:?}", path);
        Ok(())
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        let c = &self.conditioner;
        if !(self.reference_pitch_hz > 0.0) {
            return Err(format!(
                "reference_pitch_hz must be positive, got {}",
                self.reference_pitch_hz
            ));
        }
        if !(0.0..1.0).contains(&c.amplitude_smoothing) {
            return Err(format!(
                "amplitude_smoothing must be in [0, 1), got {}",
                c.amplitude_smoothing
            ));
        }
        if !(0.0..1.0).contains(&c.frequency_smoothing) {
            return Err(format!(
                "frequency_smoothing must be in [0, 1), got {}",
                c.frequency_smoothing
            ));
        }
        if !(c.min_frequency_hz > 0.0) {
            return Err(format!(
                "min_frequency_hz must be positive, got {}",
                c.min_frequency_hz
            ));
        }
        if c.min_frequency_hz >= c.max_frequency_hz {
            return Err(format!(
                "empty frequency range {}–{} Hz",
                c.min_frequency_hz, c.max_frequency_hz
            ));
        }
        let a = &self.attack;
        if a.window_size == 0 {
            return Err("attack.window_size must be at least 1".into());
        }
        // Otherwise only the failsafe can ever end the attack
        let fill_ms = (a.window_size as u64 - 1) * c.min_processing_interval_ms;
        if fill_ms > a.max_attack_ms {
            return Err(format!(
                "attack window of {} ticks {}ms apart takes {}ms to fill, past max_attack_ms {}",
                a.window_size, c.min_processing_interval_ms, fill_ms, a.max_attack_ms
            ));
        }
        if self.tracker.hop_size == 0 || self.tracker.analysis_window < 2 {
            return Err("tracker window/hop must be non-zero".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = DetectorConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.reference_pitch_hz, 442.0);
        assert_eq!(cfg.attack.window_size, 10);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{"reference_pitch_hz": 440.0, "hold": {"min_success_interval_ms": 800}}"#;
        let cfg: DetectorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.reference_pitch_hz, 440.0);
        assert_eq!(cfg.hold.min_success_interval_ms, 800);
        assert_eq!(cfg.conditioner, ConditionerConfig::default());
    }

    #[test]
    fn test_config_roundtrip() {
        let mut cfg = DetectorConfig::default();
        cfg.conditioner.min_amplitude = 0.05;
        let json = serde_json::to_string_pretty(&cfg).unwrap();
        let loaded: DetectorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = DetectorConfig::default();
        cfg.conditioner.frequency_smoothing = 1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = DetectorConfig::default();
        cfg.conditioner.min_frequency_hz = 3000.0;
        assert!(cfg.validate().unwrap_err().contains("frequency range"));

        let mut cfg = DetectorConfig::default();
        cfg.reference_pitch_hz = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive_min_frequency() {
        for hz in [0.0, -50.0, f64::NAN] {
            let mut cfg = DetectorConfig::default();
            cfg.conditioner.min_frequency_hz = hz;
            let err = cfg.validate().unwrap_err();
            assert!(err.contains("min_frequency_hz"), "{}: {}", hz, err);
        }
    }

    #[test]
    fn test_validate_rejects_window_slower_than_failsafe() {
        let mut cfg = DetectorConfig::default();
        cfg.conditioner.min_processing_interval_ms = 64;
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("576ms"), "got: {}", err);

        // 9 gaps of 50ms fit inside 450ms
        let mut cfg = DetectorConfig::default();
        cfg.attack.max_attack_ms = 450;
        assert!(cfg.validate().is_ok());
        cfg.attack.max_attack_ms = 449;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_is_none() {
        assert!(DetectorConfig::load(Path::new("/nonexistent/pitch-hold.json")).is_none());
    }
}
