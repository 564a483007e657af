//! Slaney-style mel filterbank and decibel scaling.

// Slaney mel scale: linear below 1 kHz, logarithmic above.
const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// One triangular filter, stored sparsely from its first non-zero bin.
#[derive(Debug, Clone)]
struct MelFilter {
    start: usize,
    weights: Vec<f32>,
    center_hz: f64,
}

/// Triangular, area-normalised filters spanning `0 .. sample_rate / 2`.
#[derive(Debug, Clone)]
pub struct MelFilterbank {
    filters: Vec<MelFilter>,
}

impl MelFilterbank {
    pub fn new(sample_rate: u32, n_fft: usize, n_mels: usize) -> Self {
        let sr = sample_rate as f64;
        let bins = n_fft / 2 + 1;
        let fft_freqs: Vec<f64> = (0..bins).map(|k| k as f64 * sr / n_fft as f64).collect();

        let mel_max = hz_to_mel(sr / 2.0);
        let mel_points: Vec<f64> = (0..n_mels + 2)
            .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64))
            .collect();

        let filters = (0..n_mels)
            .map(|i| {
                let (lo, center, hi) = (mel_points[i], mel_points[i + 1], mel_points[i + 2]);
                let enorm = 2.0 / (hi - lo);

                let dense: Vec<f32> = fft_freqs
                    .iter()
                    .map(|&f| {
                        let lower = (f - lo) / (center - lo);
                        let upper = (hi - f) / (hi - center);
                        (lower.min(upper).max(0.0) * enorm) as f32
                    })
                    .collect();

                let first = dense.iter().position(|&w| w > 0.0);
                let last = dense.iter().rposition(|&w| w > 0.0);
                match (first, last) {
                    (Some(first), Some(last)) => MelFilter {
                        start: first,
                        weights: dense[first..=last].to_vec(),
                        center_hz: center,
                    },
                    // narrower than one FFT bin: contributes nothing
                    _ => MelFilter {
                        start: 0,
                        weights: Vec::new(),
                        center_hz: center,
                    },
                }
            })
            .collect();

        Self { filters }
    }

    pub fn bands(&self) -> usize {
        self.filters.len()
    }

    pub fn center_frequencies(&self) -> Vec<f64> {
        self.filters.iter().map(|f| f.center_hz).collect()
    }

    /// Projects one power spectrum onto the mel bands.
    pub fn apply(&self, power: &[f32], out: &mut [f32]) {
        for (band, filter) in out.iter_mut().zip(&self.filters) {
            *band = power[filter.start..]
                .iter()
                .zip(&filter.weights)
                .map(|(p, w)| p * w)
                .sum();
        }
    }
}

/// Converts power values to decibels relative to their own maximum, then
/// floors everything more than `top_db` below that maximum.
pub fn power_to_db(values: &mut [f32], amin: f32, top_db: f32) {
    let reference = values.iter().copied().fold(amin, f32::max);
    let ref_db = 10.0 * reference.log10();

    let mut peak_db = f32::NEG_INFINITY;
    for v in values.iter_mut() {
        *v = 10.0 * v.max(amin).log10() - ref_db;
        peak_db = peak_db.max(*v);
    }

    let floor = peak_db - top_db;
    for v in values.iter_mut() {
        *v = v.max(floor);
    }
}
