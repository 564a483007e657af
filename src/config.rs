use std::env;
use std::net::SocketAddr;

use dotenvy::dotenv;

use crate::error::ConfigError;

// Spectral analysis
pub const MEL_BANDS: usize = 128;
pub const N_FFT: usize = 2048;
pub const HOP_LENGTH: usize = 512;
pub const TOP_DB: f32 = 80.0;
pub const AMIN: f32 = 1e-10;

// Peak finding
pub const PEAK_NEIGHBORHOOD_SIZE: usize = 20;

// Hashing
pub const FAN_VALUE: usize = 5;
pub const MAX_TIME_DELTA: u32 = 200;
pub const MAX_HASHES: usize = 20_000;
pub const STORED_HASH_LIMIT: usize = 5_000;
pub const HASH_HEX_WIDTH: usize = 20;

// Matching
pub const MIN_MATCH_COUNT: usize = 15;
pub const MIN_CONFIDENCE: f64 = 0.15;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
/// Largest accepted `/recognize` request body.
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Knobs of the spectrogram -> landmark -> hash pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintConfig {
    pub mel_bands: usize,
    pub n_fft: usize,
    pub hop_length: usize,
    pub top_db: f32,
    pub neighborhood_size: usize,
    pub fan_value: usize,
    pub max_delta: u32,
    pub max_hashes: usize,
    pub stored_hash_limit: usize,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            mel_bands: MEL_BANDS,
            n_fft: N_FFT,
            hop_length: HOP_LENGTH,
            top_db: TOP_DB,
            neighborhood_size: PEAK_NEIGHBORHOOD_SIZE,
            fan_value: FAN_VALUE,
            max_delta: MAX_TIME_DELTA,
            max_hashes: MAX_HASHES,
            stored_hash_limit: STORED_HASH_LIMIT,
        }
    }
}

/// Acceptance thresholds for a candidate recording.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchConfig {
    pub min_match_count: usize,
    pub min_confidence: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            min_match_count: MIN_MATCH_COUNT,
            min_confidence: MIN_CONFIDENCE,
        }
    }
}

/// Process-level settings read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub max_upload_bytes: usize,
    pub matching: MatchConfig,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup so parsing can be tested
    /// without touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let bind_addr = parse_or("TUNESPY_BIND_ADDR", &lookup, || {
            DEFAULT_BIND_ADDR.parse().ok()
        })?;

        let max_upload_bytes =
            parse_or("TUNESPY_MAX_UPLOAD_BYTES", &lookup, || Some(MAX_UPLOAD_BYTES))?;

        let defaults = MatchConfig::default();
        let min_match_count =
            parse_or("TUNESPY_MIN_MATCH_COUNT", &lookup, || Some(defaults.min_match_count))?;
        let min_confidence =
            parse_or("TUNESPY_MIN_CONFIDENCE", &lookup, || Some(defaults.min_confidence))?;

        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(ConfigError::Invalid {
                var: "TUNESPY_MIN_CONFIDENCE",
                value: min_confidence.to_string(),
            });
        }

        Ok(Self {
            database_url,
            bind_addr,
            max_upload_bytes,
            matching: MatchConfig {
                min_match_count,
                min_confidence,
            },
        })
    }
}

fn parse_or<T, F, D>(var: &'static str, lookup: &F, default: D) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
    D: FnOnce() -> Option<T>,
{
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        None => default().ok_or(ConfigError::Missing(var)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let settings =
            Settings::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://x")])).unwrap();

        assert_eq!(settings.database_url, "postgres://x");
        assert_eq!(settings.bind_addr, DEFAULT_BIND_ADDR.parse().unwrap());
        assert_eq!(settings.max_upload_bytes, MAX_UPLOAD_BYTES);
        assert_eq!(settings.matching, MatchConfig::default());
    }

    #[test]
    fn missing_database_url_is_reported() {
        let err = Settings::from_lookup(lookup_from(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn overrides_are_parsed() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://x"),
            ("TUNESPY_BIND_ADDR", "127.0.0.1:9000"),
            ("TUNESPY_MIN_MATCH_COUNT", "30"),
            ("TUNESPY_MIN_CONFIDENCE", "0.5"),
            ("TUNESPY_MAX_UPLOAD_BYTES", "1048576"),
        ]))
        .unwrap();

        assert_eq!(settings.bind_addr.port(), 9000);
        assert_eq!(settings.max_upload_bytes, 1_048_576);
        assert_eq!(settings.matching.min_match_count, 30);
        assert_eq!(settings.matching.min_confidence, 0.5);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = Settings::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://x"),
            ("TUNESPY_MIN_MATCH_COUNT", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "TUNESPY_MIN_MATCH_COUNT", .. }));

        let err = Settings::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://x"),
            ("TUNESPY_MIN_CONFIDENCE", "1.5"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "TUNESPY_MIN_CONFIDENCE", .. }));
    }
}
