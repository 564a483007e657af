//! Error types shared by the analysis pipeline, the decoder and the stores.

use thiserror::Error;

/// Malformed or empty audio handed to the fingerprinting pipeline.
#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("no audio samples to analyse")]
    EmptySamples,

    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    #[error("sample {index} is not a finite number")]
    NonFiniteSample { index: usize },
}

/// Failure while turning a container file into mono PCM.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read audio: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported or corrupt audio: {0}")]
    Format(#[from] symphonia::core::errors::Error),

    #[error("audio container has no decodable track")]
    NoTrack,

    #[error("audio track does not declare a sample rate")]
    MissingSampleRate,
}

/// Corpus read/write failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("fingerprint store unavailable: {0}")]
    Unavailable(String),

    #[error("fingerprint store query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("song {song_id} has a corrupt fingerprint record: {reason}")]
    CorruptRecord { song_id: i64, reason: String },

    #[error("token {position} has a {field} too large for the fingerprint table")]
    TokenOutOfRange { position: usize, field: &'static str },
}

impl From<diesel::ConnectionError> for StoreError {
    fn from(err: diesel::ConnectionError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Invalid or missing runtime configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("environment variable {0} must be set")]
    Missing(&'static str),

    #[error("environment variable {var} has invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Any failure along decode -> fingerprint -> store.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
