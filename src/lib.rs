pub mod audio_processor;
pub mod config;
pub mod db;
pub mod error;
pub mod fingerprint;
pub mod matcher;
pub mod peaks;
pub mod pipeline;
pub mod schema;
pub mod server;
pub mod spectral;
pub mod tester;
pub mod visualization;

pub use audio_processor::{AudioProcessor, DecodedAudio};
pub use config::{FingerprintConfig, MatchConfig, Settings};
pub use db::{Corpus, FingerprintStore, MemoryStore, PgStore, SongRecord};
pub use error::{AnalysisError, ConfigError, DecodeError, PipelineError, StoreError};
pub use fingerprint::{Fingerprint, FingerprintToken, Fingerprinter, compute_fingerprint};
pub use matcher::{MatchResult, Matcher, match_fingerprint};
