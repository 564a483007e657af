//! HTTP front end: upload a clip, get the best matching song back.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::audio_processor::AudioProcessor;
use crate::config::MAX_UPLOAD_BYTES;
use crate::db::FingerprintStore;
use crate::error::PipelineError;
use crate::fingerprint::Fingerprinter;
use crate::matcher::{MatchResult, Matcher};
use crate::pipeline::recognize_audio;

pub const UPLOAD_FIELD: &str = "audio_file";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RecognizeResponse {
    Success {
        song_name: String,
        artist: String,
        match_count: usize,
        offset_difference: i64,
        confidence: f64,
    },
    Failure {
        message: String,
    },
}

impl RecognizeResponse {
    fn failure(message: impl Into<String>) -> Self {
        RecognizeResponse::Failure {
            message: message.into(),
        }
    }
}

impl From<MatchResult> for RecognizeResponse {
    fn from(m: MatchResult) -> Self {
        RecognizeResponse::Success {
            song_name: m.song_name,
            artist: m.artist_name,
            match_count: m.match_count,
            offset_difference: m.offset_difference,
            confidence: m.confidence,
        }
    }
}

/// Shared handles. The store sits behind a mutex and is held only for the corpus read.
#[derive(Clone)]
pub struct AppState {
    store: Arc<Mutex<Box<dyn FingerprintStore + Send>>>,
    processor: Arc<AudioProcessor>,
    fingerprinter: Arc<Fingerprinter>,
    matcher: Arc<Matcher>,
    upload_limit: usize,
}

/// Locks the shared store for one pipeline call.
struct LockedStore<'a>(&'a Mutex<Box<dyn FingerprintStore + Send>>);

impl FingerprintStore for LockedStore<'_> {
    fn write_song(&mut self, record: &crate::db::SongRecord) -> Result<i64, crate::error::StoreError> {
        let mut store = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        store.write_song(record)
    }

    fn read_corpus(&mut self) -> Result<crate::db::Corpus, crate::error::StoreError> {
        let mut store = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        store.read_corpus()
    }
}

impl AppState {
    pub fn new(
        store: Box<dyn FingerprintStore + Send>,
        fingerprinter: Fingerprinter,
        matcher: Matcher,
    ) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            processor: Arc::new(AudioProcessor::new()),
            fingerprinter: Arc::new(fingerprinter),
            matcher: Arc::new(matcher),
            upload_limit: MAX_UPLOAD_BYTES,
        }
    }

    /// Caps the `/recognize` request body at `bytes`.
    pub fn with_upload_limit(mut self, bytes: usize) -> Self {
        self.upload_limit = bytes;
        self
    }

    /// Blocking recognition of one uploaded file.
    pub fn recognize_upload(
        &self,
        bytes: Vec<u8>,
        extension: Option<&str>,
    ) -> (StatusCode, RecognizeResponse) {
        let outcome = self
            .processor
            .decode_bytes(bytes, extension)
            .map_err(PipelineError::from)
            .and_then(|audio| {
                recognize_audio(
                    &mut LockedStore(&self.store),
                    &self.fingerprinter,
                    &self.matcher,
                    &audio,
                )
            });

        if let Ok(recognition) = &outcome {
            if recognition.skipped > 0 {
                warn!(
                    scanned = recognition.scanned,
                    skipped = recognition.skipped,
                    "recognized against a partial corpus"
                );
            }
        }

        match outcome.map(|recognition| recognition.best) {
            Ok(Some(found)) => (StatusCode::OK, found.into()),
            Ok(None) => (
                StatusCode::OK,
                RecognizeResponse::failure("No matching song found."),
            ),
            Err(err @ (PipelineError::Decode(_) | PipelineError::Analysis(_))) => {
                warn!(error = %err, "rejected upload");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    RecognizeResponse::failure(err.to_string()),
                )
            }
            Err(err @ PipelineError::Store(_)) => {
                error!(error = %err, "corpus unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    RecognizeResponse::failure(err.to_string()),
                )
            }
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/recognize", post(recognize))
        .route("/health", get(|| async { "healthy" }))
        .layer(DefaultBodyLimit::max(state.upload_limit))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, router(state)).await
}

/// Expects a form field named `audio_file` containing the clip.
async fn recognize(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> (StatusCode, Json<RecognizeResponse>) {
    let mut upload: Option<(Vec<u8>, Option<String>)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(RecognizeResponse::failure(err.body_text())),
                );
            }
        };

        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let extension = field
            .file_name()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_owned);

        match field.bytes().await {
            Ok(bytes) => upload = Some((bytes.to_vec(), extension)),
            Err(err) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(RecognizeResponse::failure(err.body_text())),
                );
            }
        }
    }

    let Some((bytes, extension)) = upload.filter(|(bytes, _)| !bytes.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(RecognizeResponse::failure("No audio file provided.")),
        );
    };

    info!(bytes = bytes.len(), "received upload");
    let worker = state.clone();
    match tokio::task::spawn_blocking(move || worker.recognize_upload(bytes, extension.as_deref()))
        .await
    {
        Ok((status, response)) => (status, Json(response)),
        Err(err) => {
            error!(error = %err, "recognition task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(RecognizeResponse::failure("Recognition failed.")),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Corpus, MemoryStore, SongRecord};
    use crate::error::StoreError;

    struct DownStore;

    impl FingerprintStore for DownStore {
        fn write_song(&mut self, _record: &SongRecord) -> Result<i64, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }

        fn read_corpus(&mut self) -> Result<Corpus, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    fn wav_bytes(samples: &[f32], sample_rate: u32) -> Vec<u8> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for &s in samples {
            writer.write_sample((s * 32767.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
        std::fs::read(&path).unwrap()
    }

    fn tone(seconds: f32) -> Vec<f32> {
        (0..(22050.0 * seconds) as usize)
            .map(|i| 0.4 * (i as f32 * 0.05).sin())
            .collect()
    }

    /// Tone changes every fifth of a second over a low noise floor.
    fn melody(seed: u64, seconds: f32) -> Vec<f32> {
        use rand::{Rng, SeedableRng, rngs::StdRng};

        let mut rng = StdRng::seed_from_u64(seed);
        let note_len = 22050 / 5;
        let mut samples = Vec::new();
        while samples.len() < (22050.0 * seconds) as usize {
            let freq: f32 = rng.random_range(200.0..4000.0);
            for i in 0..note_len {
                let t = i as f32 / 22050.0;
                let noise: f32 = rng.random_range(-0.02..0.02);
                samples.push(0.5 * (2.0 * std::f32::consts::PI * freq * t).sin() + noise);
            }
        }
        samples
    }

    #[test]
    fn response_json_carries_a_status_tag() {
        let success: RecognizeResponse = MatchResult {
            song_name: "Song".into(),
            artist_name: "Artist".into(),
            match_count: 42,
            offset_difference: -3,
            confidence: 0.5,
        }
        .into();
        let json = serde_json::to_value(&success).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["artist"], "Artist");
        assert_eq!(json["match_count"], 42);

        let failure = serde_json::to_value(RecognizeResponse::failure("nope")).unwrap();
        assert_eq!(failure, serde_json::json!({"status": "failure", "message": "nope"}));
    }

    #[test]
    fn garbage_upload_is_unprocessable() {
        let state = AppState::new(
            Box::new(MemoryStore::new()),
            Fingerprinter::default(),
            Matcher::default(),
        );
        let (status, response) = state.recognize_upload(b"garbage".to_vec(), None);

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(matches!(response, RecognizeResponse::Failure { .. }));
    }

    #[test]
    fn empty_corpus_is_a_failure_response_not_an_error() {
        let state = AppState::new(
            Box::new(MemoryStore::new()),
            Fingerprinter::default(),
            Matcher::default(),
        );
        let (status, response) = state.recognize_upload(wav_bytes(&tone(2.0), 22050), Some("wav"));

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response, RecognizeResponse::failure("No matching song found."));
    }

    #[test]
    fn unavailable_store_maps_to_503() {
        let state = AppState::new(Box::new(DownStore), Fingerprinter::default(), Matcher::default());
        let (status, _) = state.recognize_upload(wav_bytes(&tone(1.0), 22050), Some("wav"));

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    fn multipart_request(field: &str, file_name: &str, payload: &[u8]) -> Vec<u8> {
        let boundary = "tunespy-boundary";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let mut request = format!(
            "POST /recognize HTTP/1.1\r\nHost: localhost\r\nContent-Type: multipart/form-data; boundary={boundary}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        request.extend_from_slice(&body);
        request
    }

    async fn send(state: AppState, request: Vec<u8>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(state)).await });

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream.write_all(&request).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    #[tokio::test]
    async fn clips_larger_than_two_megabytes_are_accepted() {
        let state = AppState::new(
            Box::new(MemoryStore::new()),
            Fingerprinter::default(),
            Matcher::default(),
        );
        // 75 s of mono 16-bit audio, about 3.3 MB
        let wav = wav_bytes(&tone(75.0), 22050);
        assert!(wav.len() > 3 * 1024 * 1024);

        let response = send(state, multipart_request(UPLOAD_FIELD, "clip.wav", &wav)).await;

        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.contains("No matching song found."));
    }

    #[tokio::test]
    async fn missing_upload_field_is_a_bad_request() {
        let state = AppState::new(
            Box::new(MemoryStore::new()),
            Fingerprinter::default(),
            Matcher::default(),
        );
        let response = send(state, multipart_request("other", "clip.wav", b"abc")).await;

        assert!(response.starts_with("HTTP/1.1 400"), "{response}");
        assert!(response.contains("No audio file provided."));
    }

    #[test]
    fn uploaded_reference_clip_matches_itself() {
        let bytes = wav_bytes(&melody(3, 4.0), 22050);
        let processor = AudioProcessor::new();
        let fingerprinter = Fingerprinter::default();
        let audio = processor.decode_bytes(bytes.clone(), Some("wav")).unwrap();

        let mut store = MemoryStore::new();
        let record = crate::pipeline::build_record(
            &fingerprinter,
            &audio,
            "tone".into(),
            "synth".into(),
            "tests".into(),
        )
        .unwrap();
        store.write_song(&record).unwrap();

        let state = AppState::new(Box::new(store), fingerprinter, Matcher::default());
        let (status, response) = state.recognize_upload(bytes, Some("wav"));

        assert_eq!(status, StatusCode::OK);
        match response {
            RecognizeResponse::Success {
                song_name,
                offset_difference,
                confidence,
                ..
            } => {
                assert_eq!(song_name, "tone");
                assert_eq!(offset_difference, 0);
                assert_eq!(confidence, 1.0);
            }
            other => panic!("expected a match, got {other:?}"),
        }
    }
}
