//! Log-compressed mel spectrogram of a mono clip.

pub mod mel;
pub mod stft;

use rayon::prelude::*;
use rustfft::num_complex::Complex;
use tracing::debug;

use crate::config::{AMIN, FingerprintConfig};
use crate::spectral::{
    mel::{MelFilterbank, power_to_db},
    stft::Stft,
};

/// Energy matrix `S[band][frame]`, stored band-major in one buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    bands: usize,
    frames: usize,
    values: Vec<f32>,
}

impl Spectrogram {
    pub fn new(bands: usize, frames: usize, values: Vec<f32>) -> Self {
        assert_eq!(values.len(), bands * frames, "spectrogram shape mismatch");
        Self {
            bands,
            frames,
            values,
        }
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn get(&self, band: usize, frame: usize) -> f32 {
        self.values[band * self.frames + frame]
    }

    pub fn band(&self, band: usize) -> &[f32] {
        &self.values[band * self.frames..(band + 1) * self.frames]
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn max_value(&self) -> f32 {
        self.values.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn min_value(&self) -> f32 {
        self.values.iter().copied().fold(f32::INFINITY, f32::min)
    }
}

/// Mel power spectrogram in decibels relative to the clip's own peak.
///
/// Frames are computed in parallel; the result does not depend on scheduling.
pub fn mel_spectrogram_db(samples: &[f32], sample_rate: u32, config: &FingerprintConfig) -> Spectrogram {
    let stft = Stft::new(config.n_fft, config.hop_length);
    let filterbank = MelFilterbank::new(sample_rate, config.n_fft, config.mel_bands);
    let frames = stft.frame_count(samples.len());
    let bands = filterbank.bands();

    let columns: Vec<Vec<f32>> = (0..frames)
        .into_par_iter()
        .map_init(
            || {
                (
                    vec![Complex::new(0.0, 0.0); config.n_fft],
                    vec![0.0f32; stft.bins()],
                )
            },
            |(buffer, power), frame| {
                stft.power_frame(samples, frame, buffer, power);
                let mut column = vec![0.0; bands];
                filterbank.apply(power, &mut column);
                column
            },
        )
        .collect();

    let mut values = vec![0.0f32; bands * frames];
    for (frame, column) in columns.iter().enumerate() {
        for (band, &value) in column.iter().enumerate() {
            values[band * frames + frame] = value;
        }
    }

    power_to_db(&mut values, AMIN, config.top_db);

    debug!(bands, frames, "computed mel spectrogram");
    Spectrogram::new(bands, frames, values)
}
