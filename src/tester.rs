use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::{info, warn};

use crate::audio_processor::{AudioProcessor, DecodedAudio};
use crate::db::SongRecord;
use crate::fingerprint::Fingerprinter;
use crate::matcher::Matcher;
use crate::pipeline::audio_files;

#[derive(Debug, Clone)]
pub struct SnippetTestConfig {
    pub snippets_per_song: u32,
    pub snippet_secs: u64,
    /// Songs shorter than `snippet_secs + margin_secs` are skipped.
    pub margin_secs: u64,
}

impl Default for SnippetTestConfig {
    fn default() -> Self {
        Self {
            snippets_per_song: 3,
            snippet_secs: 10,
            margin_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnippetReport {
    pub total: usize,
    pub correct: usize,
    pub skipped_songs: Vec<PathBuf>,
}

impl SnippetReport {
    /// Percentage of correct matches, `None` when nothing was tested.
    pub fn accuracy(&self) -> Option<f64> {
        (self.total > 0).then(|| self.correct as f64 / self.total as f64 * 100.0)
    }
}

/// Takes random snippets from each song in `songs_dir` and runs them through
/// recognition against `corpus`. A snippet counts as correct when the best
/// match carries the song's file name, the default title at ingestion.
pub fn run_random_snippet_test<R: Rng>(
    songs_dir: &Path,
    corpus: &[SongRecord],
    processor: &AudioProcessor,
    fingerprinter: &Fingerprinter,
    matcher: &Matcher,
    config: &SnippetTestConfig,
    rng: &mut R,
) -> std::io::Result<SnippetReport> {
    info!(
        snippets_per_song = config.snippets_per_song,
        snippet_secs = config.snippet_secs,
        songs = corpus.len(),
        "starting random snippet test"
    );

    let mut report = SnippetReport::default();

    for path in audio_files(songs_dir)? {
        let Some(true_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };

        let audio = match processor.get_decoded_audio(&path) {
            Ok(audio) => audio,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping, failed to decode");
                report.skipped_songs.push(path);
                continue;
            }
        };

        if audio.duration_secs() < (config.snippet_secs + config.margin_secs) as f64 {
            info!(song = %true_name, "skipping, song is too short");
            report.skipped_songs.push(path);
            continue;
        }

        let (total, correct) =
            evaluate_song(&true_name, &audio, corpus, fingerprinter, matcher, config, rng);
        report.total += total;
        report.correct += correct;
    }

    info!(
        correct = report.correct,
        total = report.total,
        "random snippet test finished"
    );
    Ok(report)
}

/// Returns `(snippets tested, snippets matched to true_name)`.
fn evaluate_song<R: Rng>(
    true_name: &str,
    audio: &DecodedAudio,
    corpus: &[SongRecord],
    fingerprinter: &Fingerprinter,
    matcher: &Matcher,
    config: &SnippetTestConfig,
    rng: &mut R,
) -> (usize, usize) {
    let rate = audio.sample_rate as usize;
    let snippet_len = config.snippet_secs as usize * rate;
    let max_start_secs = (audio.duration_secs() as u64).saturating_sub(config.snippet_secs);

    let mut total = 0;
    let mut correct = 0;
    for i in 0..config.snippets_per_song {
        total += 1;
        let start_secs = rng.random_range(0..=max_start_secs);
        let start = start_secs as usize * rate;
        let end = (start + snippet_len).min(audio.samples.len());
        let snippet = &audio.samples[start..end];

        let query = match fingerprinter.fingerprint(snippet, audio.sample_rate) {
            Ok(query) if !query.is_empty() => query,
            Ok(_) => {
                warn!(song = true_name, snippet = i + 1, "no fingerprints generated");
                continue;
            }
            Err(err) => {
                warn!(song = true_name, snippet = i + 1, error = %err, "snippet analysis failed");
                continue;
            }
        };

        match matcher.match_fingerprint_parallel(&query, corpus) {
            Some(found) if found.song_name == true_name => {
                info!(
                    song = true_name,
                    start_secs,
                    match_count = found.match_count,
                    "correct"
                );
                correct += 1;
            }
            Some(found) => {
                warn!(
                    song = true_name,
                    start_secs,
                    matched = %found.song_name,
                    match_count = found.match_count,
                    "incorrect"
                );
            }
            None => warn!(song = true_name, start_secs, "no match found"),
        }
    }

    (total, correct)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{FingerprintStore, MemoryStore};
    use crate::pipeline::{SongMetadata, ingest_directory};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    // a power of two, so whole-second offsets land on hop boundaries
    const RATE: u32 = 16_384;

    fn melody(seed: u64, seconds: u32) -> Vec<i16> {
        let mut rng = StdRng::seed_from_u64(seed);
        let note_len = RATE as usize / 5;
        let total = (RATE * seconds) as usize;
        let mut samples = Vec::with_capacity(total);
        while samples.len() < total {
            let freq: f32 = rng.random_range(200.0..4000.0);
            for i in 0..note_len {
                let t = i as f32 / RATE as f32;
                let noise: f32 = rng.random_range(-0.02..0.02);
                let s = 0.5 * (2.0 * std::f32::consts::PI * freq * t).sin() + noise;
                samples.push((s * 32767.0) as i16);
            }
        }
        samples.truncate(total);
        samples
    }

    fn write_wav(path: &Path, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn accuracy_is_none_without_tests() {
        assert_eq!(SnippetReport::default().accuracy(), None);
        let report = SnippetReport {
            total: 4,
            correct: 3,
            skipped_songs: Vec::new(),
        };
        assert_eq!(report.accuracy(), Some(75.0));
    }

    #[test]
    fn snippets_are_recognized_and_short_songs_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("first.wav"), &melody(1, 16));
        write_wav(&dir.path().join("second.wav"), &melody(2, 16));
        write_wav(&dir.path().join("short.wav"), &melody(3, 5));

        let processor = AudioProcessor::new();
        let fingerprinter = Fingerprinter::default();
        let mut store = MemoryStore::new();
        let summary = ingest_directory(
            &mut store,
            &processor,
            &fingerprinter,
            dir.path(),
            &SongMetadata::default(),
        )
        .unwrap();
        assert_eq!(summary.ingested, 3);

        let corpus = store.read_corpus().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let report = run_random_snippet_test(
            dir.path(),
            &corpus.records,
            &processor,
            &fingerprinter,
            &Matcher::default(),
            &SnippetTestConfig::default(),
            &mut rng,
        )
        .unwrap();

        assert_eq!(report.total, 6);
        assert_eq!(report.correct, 6);
        assert_eq!(report.skipped_songs, vec![dir.path().join("short.wav")]);
    }
}
