#![allow(dead_code)]

use std::f32::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tunespy::{Fingerprint, Fingerprinter, SongRecord};

pub const RATE: u32 = 22_050;
pub const HOP: usize = 512;

/// A new random tone every fifth of a second over a faint noise floor.
pub fn melody(seed: u64, seconds: f32) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let note_len = RATE as usize / 5;
    let total = (RATE as f32 * seconds) as usize;
    let mut samples = Vec::with_capacity(total);
    while samples.len() < total {
        let freq: f32 = rng.random_range(200.0..4000.0);
        for i in 0..note_len {
            let t = i as f32 / RATE as f32;
            let noise: f32 = rng.random_range(-0.02..0.02);
            samples.push(0.5 * (2.0 * PI * freq * t).sin() + noise);
        }
    }
    samples.truncate(total);
    samples
}

pub fn record(name: &str, fingerprint: Fingerprint) -> SongRecord {
    SongRecord {
        song_name: name.to_string(),
        artist_name: format!("{name} artist"),
        album: "Synth".to_string(),
        fingerprint,
    }
}

/// Reference record for `samples`, truncated like an ingested song.
pub fn reference(name: &str, samples: &[f32]) -> SongRecord {
    let fingerprint = Fingerprinter::default()
        .fingerprint_for_storage(samples, RATE)
        .unwrap();
    record(name, fingerprint)
}
