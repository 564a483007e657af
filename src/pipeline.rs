//! Ingestion and recognition, wiring the decoder, the analysis core and a store.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::audio_processor::{AudioProcessor, DecodedAudio};
use crate::db::{FingerprintStore, SongRecord};
use crate::error::PipelineError;
use crate::fingerprint::Fingerprinter;
use crate::matcher::{MatchResult, Matcher};

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown";
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "mpeg", "flac", "ogg"];

/// Optional labels for an ingested song; the file name stands in for a missing title.
#[derive(Debug, Clone, Default)]
pub struct SongMetadata {
    pub song_name: Option<String>,
    pub artist_name: Option<String>,
    pub album: Option<String>,
}

impl SongMetadata {
    fn resolve(&self, path: &Path) -> (String, String, String) {
        let song_name = self.song_name.clone().unwrap_or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Unknown Song".to_string())
        });
        let artist = self
            .artist_name
            .clone()
            .unwrap_or_else(|| UNKNOWN_ARTIST.to_string());
        let album = self.album.clone().unwrap_or_else(|| UNKNOWN_ALBUM.to_string());
        (song_name, artist, album)
    }
}

/// Best match of one query plus how much of the corpus the scan covered.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub best: Option<MatchResult>,
    pub scanned: usize,
    /// Records left out of the scan because they failed validation.
    pub skipped: usize,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct IngestSummary {
    pub ingested: usize,
    pub failed: Vec<PathBuf>,
}

/// Builds the record persisted for a reference recording.
pub fn build_record(
    fingerprinter: &Fingerprinter,
    audio: &DecodedAudio,
    song_name: String,
    artist_name: String,
    album: String,
) -> Result<SongRecord, PipelineError> {
    let fingerprint = fingerprinter.fingerprint_for_storage(&audio.samples, audio.sample_rate)?;
    Ok(SongRecord {
        song_name,
        artist_name,
        album,
        fingerprint,
    })
}

pub fn ingest_file(
    store: &mut dyn FingerprintStore,
    processor: &AudioProcessor,
    fingerprinter: &Fingerprinter,
    path: &Path,
    metadata: &SongMetadata,
) -> Result<i64, PipelineError> {
    let (song_name, artist, album) = metadata.resolve(path);
    info!(song = %song_name, path = %path.display(), "ingesting song");

    let audio = processor.get_decoded_audio(path)?;
    let record = build_record(fingerprinter, &audio, song_name, artist, album)?;
    Ok(store.write_song(&record)?)
}

/// Ingests every audio file in `dir` in name order. Files that fail are
/// logged and listed in the summary; the rest still go in.
pub fn ingest_directory(
    store: &mut dyn FingerprintStore,
    processor: &AudioProcessor,
    fingerprinter: &Fingerprinter,
    dir: &Path,
    metadata: &SongMetadata,
) -> std::io::Result<IngestSummary> {
    let per_file = SongMetadata {
        song_name: None,
        ..metadata.clone()
    };
    let mut summary = IngestSummary::default();

    for path in audio_files(dir)? {
        match ingest_file(store, processor, fingerprinter, &path, &per_file) {
            Ok(_) => summary.ingested += 1,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to ingest file");
                summary.failed.push(path);
            }
        }
    }

    Ok(summary)
}

/// Audio files directly inside `dir`, sorted by path.
pub fn audio_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_audio_file(path))
        .collect();
    files.sort();
    Ok(files)
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Fingerprints `audio` and matches it against the whole corpus.
pub fn recognize_audio(
    store: &mut dyn FingerprintStore,
    fingerprinter: &Fingerprinter,
    matcher: &Matcher,
    audio: &DecodedAudio,
) -> Result<Recognition, PipelineError> {
    let query = fingerprinter.fingerprint(&audio.samples, audio.sample_rate)?;
    let corpus = store.read_corpus()?;
    Ok(Recognition {
        best: matcher.match_fingerprint_parallel(&query, &corpus.records),
        scanned: corpus.records.len(),
        skipped: corpus.skipped.len(),
    })
}

pub fn recognize_file(
    store: &mut dyn FingerprintStore,
    processor: &AudioProcessor,
    fingerprinter: &Fingerprinter,
    matcher: &Matcher,
    path: &Path,
) -> Result<Recognition, PipelineError> {
    let audio = processor.get_decoded_audio(path)?;
    info!(
        samples = audio.samples.len(),
        sample_rate = audio.sample_rate,
        "loaded query clip"
    );
    recognize_audio(store, fingerprinter, matcher, &audio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    #[test]
    fn metadata_defaults_to_file_name_and_unknowns() {
        let (song, artist, album) = SongMetadata::default().resolve(Path::new("/music/track 1.mp3"));
        assert_eq!(song, "track 1.mp3");
        assert_eq!(artist, UNKNOWN_ARTIST);
        assert_eq!(album, UNKNOWN_ALBUM);

        let explicit = SongMetadata {
            song_name: Some("Song".into()),
            artist_name: Some("Artist".into()),
            album: Some("Album".into()),
        };
        assert_eq!(
            explicit.resolve(Path::new("x.wav")),
            ("Song".to_string(), "Artist".to_string(), "Album".to_string())
        );
    }

    #[test]
    fn only_audio_files_are_listed_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.wav", "a.MP3", "notes.txt", "c.flac"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("nested.wav")).unwrap();

        let names: Vec<String> = audio_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.MP3", "b.wav", "c.flac"]);
    }

    #[test]
    fn failing_files_do_not_stop_directory_ingestion() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.wav"), b"not a wav").unwrap();

        let mut store = MemoryStore::new();
        let summary = ingest_directory(
            &mut store,
            &AudioProcessor::new(),
            &Fingerprinter::default(),
            dir.path(),
            &SongMetadata::default(),
        )
        .unwrap();

        assert_eq!(summary.ingested, 0);
        assert_eq!(summary.failed.len(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn silence_recognizes_nothing() {
        let mut store = MemoryStore::new();
        let audio = DecodedAudio {
            samples: vec![0.0; 22050],
            sample_rate: 22050,
        };
        let result = recognize_audio(
            &mut store,
            &Fingerprinter::default(),
            &Matcher::default(),
            &audio,
        )
        .unwrap();
        assert_eq!(result.best, None);
        assert_eq!(result.scanned, 0);
    }

    #[test]
    fn skipped_records_are_reported_with_the_result() {
        use crate::fingerprint::{Fingerprint, FingerprintToken, landmark_hash};

        let mut store = MemoryStore::new();
        let fine = Fingerprint::new(vec![FingerprintToken::new(landmark_hash(1, 2, 3), 0)]);
        let broken = Fingerprint::new(vec![FingerprintToken::new("not-a-hash", 0)]);
        for (name, fingerprint) in [("fine", fine), ("broken", broken)] {
            store
                .write_song(&SongRecord {
                    song_name: name.into(),
                    artist_name: "a".into(),
                    album: "b".into(),
                    fingerprint,
                })
                .unwrap();
        }

        let audio = DecodedAudio {
            samples: vec![0.0; 22050],
            sample_rate: 22050,
        };
        let result = recognize_audio(
            &mut store,
            &Fingerprinter::default(),
            &Matcher::default(),
            &audio,
        )
        .unwrap();

        assert_eq!(result.best, None);
        assert_eq!(result.scanned, 1);
        assert_eq!(result.skipped, 1);
    }
}
