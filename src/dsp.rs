//! Shared DSP primitives: YIN fundamental estimation, RMS, and test signal generators.

/// YIN estimate for one analysis window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    /// Fundamental in Hz, 0.0 if the window is unpitched
    pub frequency_hz: f64,
    /// 1 - normalized difference at the chosen lag (0.0–1.0)
    pub clarity: f32,
}

impl PitchEstimate {
    pub fn unpitched() -> Self {
        Self {
            frequency_hz: 0.0,
            clarity: 0.0,
        }
    }
}

/// Root mean square of an audio buffer.
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// YIN pitch detection (de Cheveigné & Kawahara 2002).
///
/// Searches lags corresponding to `min_hz..=max_hz`, limited to half the
/// window. Returns an unpitched estimate when no lag's cumulative mean
/// normalized difference is convincing.
///
/// `scratch` is resized to the lag range and reused between calls so the
/// analysis path does not allocate once warmed up.
pub fn detect_pitch_yin(
    samples: &[f32],
    sample_rate: u32,
    threshold: f32,
    min_hz: f64,
    max_hz: f64,
    scratch: &mut Vec<f32>,
) -> PitchEstimate {
    if samples.len() < 4 || sample_rate == 0 || min_hz <= 0.0 || max_hz <= min_hz {
        return PitchEstimate::unpitched();
    }
    let sr = sample_rate as f64;
    let half_len = samples.len() / 2;
    let min_lag = ((sr / max_hz).ceil() as usize).max(2);
    let max_lag = ((sr / min_hz).floor() as usize).min(half_len - 1);
    if min_lag >= max_lag {
        return PitchEstimate::unpitched();
    }

    // Difference function, then cumulative mean normalization in place
    scratch.clear();
    scratch.resize(max_lag + 2, 0.0);
    scratch[0] = 1.0;
    let mut running_sum = 0.0f32;
    for tau in 1..=max_lag + 1 {
        let mut sum = 0.0f32;
        for j in 0..half_len {
            let d = samples[j] - samples[j + tau];
            sum += d * d;
        }
        running_sum += sum;
        scratch[tau] = if running_sum > 0.0 {
            sum * tau as f32 / running_sum
        } else {
            1.0
        };
    }
    let cmnd = &scratch[..];

    // First dip below threshold, walked down to its local minimum
    let mut best_tau = 0usize;
    for tau in min_lag..=max_lag {
        if cmnd[tau] < threshold {
            let mut t = tau;
            while t < max_lag && cmnd[t + 1] < cmnd[t] {
                t += 1;
            }
            best_tau = t;
            break;
        }
    }

    // No dip: fall back to the global minimum if it is at all periodic
    if best_tau == 0 {
        let mut min_val = f32::MAX;
        for (tau, &v) in cmnd.iter().enumerate().take(max_lag + 1).skip(min_lag) {
            if v < min_val {
                min_val = v;
                best_tau = tau;
            }
        }
        if min_val > 0.5 {
            return PitchEstimate::unpitched();
        }
    }

    // Parabolic interpolation for sub-sample lag accuracy
    let alpha = cmnd[best_tau - 1];
    let beta = cmnd[best_tau];
    let gamma = cmnd[best_tau + 1];
    let denom = 2.0 * (2.0 * beta - alpha - gamma);
    let tau_refined = if denom.abs() > 1e-10 {
        best_tau as f64 + ((alpha - gamma) / denom) as f64
    } else {
        best_tau as f64
    };
    if tau_refined <= 0.0 {
        return PitchEstimate::unpitched();
    }

    PitchEstimate {
        frequency_hz: sr / tau_refined,
        clarity: (1.0 - beta).clamp(0.0, 1.0),
    }
}
