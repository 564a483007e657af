use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{FingerprintConfig, HASH_HEX_WIDTH};
use crate::error::AnalysisError;
use crate::peaks::{Landmark, find_landmarks};
use crate::spectral::{Spectrogram, mel_spectrogram_db};

/// One hashed landmark pair anchored at the earlier landmark's frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FingerprintToken {
    pub hash: String,
    pub offset: u32,
}

impl FingerprintToken {
    pub fn new(hash: impl Into<String>, offset: u32) -> Self {
        Self {
            hash: hash.into(),
            offset,
        }
    }
}

/// Tokens in generation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint {
    tokens: Vec<FingerprintToken>,
}

impl Fingerprint {
    pub fn new(tokens: Vec<FingerprintToken>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[FingerprintToken] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Keeps the first `limit` tokens; early-clip landmarks win.
    pub fn truncated(mut self, limit: usize) -> Self {
        self.tokens.truncate(limit);
        self
    }

    pub fn into_tokens(self) -> Vec<FingerprintToken> {
        self.tokens
    }
}

impl FromIterator<FingerprintToken> for Fingerprint {
    fn from_iter<I: IntoIterator<Item = FingerprintToken>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Intermediate products kept around for inspection and plotting.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub spectrogram: Spectrogram,
    pub landmarks: Vec<Landmark>,
    pub fingerprint: Fingerprint,
}

/// Runs the spectrogram -> landmark -> hash pipeline with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct Fingerprinter {
    config: FingerprintConfig,
}

impl Fingerprinter {
    pub fn new(config: FingerprintConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FingerprintConfig {
        &self.config
    }

    pub fn fingerprint(&self, samples: &[f32], sample_rate: u32) -> Result<Fingerprint, AnalysisError> {
        self.analyze(samples, sample_rate).map(|a| a.fingerprint)
    }

    /// Fingerprint cut down to the size persisted for reference recordings.
    pub fn fingerprint_for_storage(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<Fingerprint, AnalysisError> {
        Ok(self
            .fingerprint(samples, sample_rate)?
            .truncated(self.config.stored_hash_limit))
    }

    pub fn analyze(&self, samples: &[f32], sample_rate: u32) -> Result<Analysis, AnalysisError> {
        validate_input(samples, sample_rate)?;

        let spectrogram = mel_spectrogram_db(samples, sample_rate, &self.config);
        let landmarks = find_landmarks(&spectrogram, self.config.neighborhood_size);
        debug!(count = landmarks.len(), "extracted landmarks");

        let fingerprint = hash_landmarks(&landmarks, &self.config);
        info!(
            samples = samples.len(),
            sample_rate,
            tokens = fingerprint.len(),
            "generated fingerprint"
        );

        Ok(Analysis {
            spectrogram,
            landmarks,
            fingerprint,
        })
    }
}

/// Fingerprint a mono clip with the default configuration.
pub fn compute_fingerprint(samples: &[f32], sample_rate: u32) -> Result<Fingerprint, AnalysisError> {
    Fingerprinter::default().fingerprint(samples, sample_rate)
}

fn validate_input(samples: &[f32], sample_rate: u32) -> Result<(), AnalysisError> {
    if samples.is_empty() {
        return Err(AnalysisError::EmptySamples);
    }
    if sample_rate == 0 {
        return Err(AnalysisError::InvalidSampleRate(sample_rate));
    }
    if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
        return Err(AnalysisError::NonFiniteSample { index });
    }
    Ok(())
}

/// Pairs each landmark with the next `fan_value - 1` landmarks and hashes
/// every pair whose time delta is in `1..=max_delta`.
///
/// Stops as soon as `max_hashes` tokens exist, whether or not the last
/// candidate pair produced one.
pub fn hash_landmarks(landmarks: &[Landmark], config: &FingerprintConfig) -> Fingerprint {
    let mut tokens = Vec::new();
    if config.max_hashes == 0 {
        return Fingerprint::new(tokens);
    }

    'anchors: for (i, anchor) in landmarks.iter().enumerate() {
        for target in landmarks.iter().skip(i + 1).take(config.fan_value.saturating_sub(1)) {
            if let Some(time_delta) = target.time_frame.checked_sub(anchor.time_frame) {
                if time_delta > 0 && time_delta <= config.max_delta {
                    tokens.push(FingerprintToken {
                        hash: landmark_hash(anchor.frequency_bin, target.frequency_bin, time_delta),
                        offset: anchor.time_frame,
                    });
                }
            }

            if tokens.len() >= config.max_hashes {
                break 'anchors;
            }
        }
    }

    Fingerprint::new(tokens)
}

/// Hex prefix of the SHA-256 digest of `"{f1}|{f2}|{dt}"`.
pub fn landmark_hash(frequency_1: u32, frequency_2: u32, time_delta: u32) -> String {
    let digest = sha256::digest(format!("{frequency_1}|{frequency_2}|{time_delta}"));
    digest[..HASH_HEX_WIDTH].to_string()
}

/// True when `hash` has the shape produced by [`landmark_hash`].
pub fn is_well_formed_hash(hash: &str) -> bool {
    hash.len() == HASH_HEX_WIDTH
        && hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
