//! Landmark extraction: local maxima of the log-mel spectrogram.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::spectral::Spectrogram;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Landmark {
    pub frequency_bin: u32,
    pub time_frame: u32,
}

/// Returns every cell that equals the maximum of its `size x size`
/// neighbourhood, ordered by time frame and then frequency bin.
///
/// Flat regions produce clusters of landmarks; that is expected.
pub fn find_landmarks(spectrogram: &Spectrogram, neighborhood_size: usize) -> Vec<Landmark> {
    let bands = spectrogram.bands();
    let frames = spectrogram.frames();
    if bands == 0 || frames == 0 {
        return Vec::new();
    }

    let local_max = maximum_filter(spectrogram, neighborhood_size);

    let mut landmarks = Vec::new();
    for frame in 0..frames {
        for band in 0..bands {
            let idx = band * frames + frame;
            if spectrogram.values()[idx] == local_max[idx] {
                landmarks.push(Landmark {
                    frequency_bin: band as u32,
                    time_frame: frame as u32,
                });
            }
        }
    }

    landmarks
}

/// Separable rectangular max filter (frequency axis, then time axis).
/// Output uses the same band-major layout as the spectrogram.
pub fn maximum_filter(spectrogram: &Spectrogram, size: usize) -> Vec<f32> {
    let bands = spectrogram.bands();
    let frames = spectrogram.frames();

    // along frequency, one frame column at a time
    let mut along_freq = vec![0.0f32; bands * frames];
    let mut column = vec![0.0f32; bands];
    let mut filtered = vec![0.0f32; bands];
    for frame in 0..frames {
        for band in 0..bands {
            column[band] = spectrogram.get(band, frame);
        }
        sliding_max(&column, size, &mut filtered);
        for band in 0..bands {
            along_freq[band * frames + frame] = filtered[band];
        }
    }

    // along time, one band row at a time
    let mut out = vec![0.0f32; bands * frames];
    for band in 0..bands {
        let row = &along_freq[band * frames..(band + 1) * frames];
        sliding_max(row, size, &mut out[band * frames..(band + 1) * frames]);
    }

    out
}

/// Max over the window `i - size/2 ..= i + size/2 - 1` (or `i ± size/2` for an
/// odd size), clipped to the slice bounds.
fn sliding_max(input: &[f32], size: usize, out: &mut [f32]) {
    let size = size.max(1);
    let before = size / 2;
    let after = size - before - 1;

    for (i, slot) in out.iter_mut().enumerate() {
        let lo = i.saturating_sub(before);
        let hi = (i + after).min(input.len() - 1);
        *slot = input[lo..=hi]
            .iter()
            .copied()
            .map(OrderedFloat)
            .max()
            .map(|m| m.into_inner())
            .unwrap_or(input[i]);
    }
}
