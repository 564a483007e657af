use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};

/// Centered short-time Fourier transform producing power spectra.
///
/// The signal is treated as zero-padded by `n_fft / 2` on both sides, so frame
/// `t` is centered on sample `t * hop_length`.
pub struct Stft {
    n_fft: usize,
    hop_length: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl Stft {
    pub fn new(n_fft: usize, hop_length: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n_fft);

        Self {
            n_fft,
            hop_length,
            window: hann_window(n_fft),
            fft,
        }
    }

    pub fn bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    pub fn frame_count(&self, sample_count: usize) -> usize {
        1 + sample_count / self.hop_length
    }

    /// Writes the power spectrum `|X|^2` of frame `frame_idx` into `power`.
    ///
    /// `buffer` is scratch space of length `n_fft`; `power` must hold `bins()` values.
    pub fn power_frame(
        &self,
        samples: &[f32],
        frame_idx: usize,
        buffer: &mut [Complex<f32>],
        power: &mut [f32],
    ) {
        let pad = self.n_fft / 2;
        let start = (frame_idx * self.hop_length) as isize - pad as isize;

        for (i, slot) in buffer.iter_mut().enumerate() {
            let idx = start + i as isize;
            let sample = if idx >= 0 && (idx as usize) < samples.len() {
                samples[idx as usize]
            } else {
                0.0
            };
            *slot = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(buffer);

        for (out, c) in power.iter_mut().zip(buffer.iter()) {
            *out = c.norm_sqr();
        }
    }
}

/// Periodic Hann window, the usual choice for spectral analysis.
fn hann_window(size: usize) -> Vec<f32> {
    let n = size as f32;
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / n).cos())
        .collect()
}
