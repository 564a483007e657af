use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tunespy::audio_processor::AudioProcessor;
use tunespy::config::Settings;
use tunespy::db::{FingerprintStore, PgStore};
use tunespy::fingerprint::Fingerprinter;
use tunespy::matcher::Matcher;
use tunespy::pipeline::{self, SongMetadata};
use tunespy::server::{self, AppState};
use tunespy::tester::{self, SnippetTestConfig};
use tunespy::visualization::write_spectrogram_svg;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(&["ingest", "match", "random_test", "serve"]),
))]
struct Args {
    /// Ingest a file (or every audio file in a directory) into the database
    #[arg(long)]
    ingest: bool,

    /// Match a snippet file against DB
    #[arg(long, id = "match")]
    match_: bool,

    /// Run a test with random snippets from the songs directory
    #[arg(long)]
    random_test: bool,

    /// Serve the recognition HTTP API
    #[arg(long)]
    serve: bool,

    /// Path to the audio file (required for --ingest, --match and --random-test)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Song title stored with --ingest (defaults to the file name)
    #[arg(long)]
    song: Option<String>,

    /// Artist stored with --ingest
    #[arg(long)]
    artist: Option<String>,

    /// Album stored with --ingest
    #[arg(long)]
    album: Option<String>,

    /// Write an SVG of the spectrogram and landmarks of --file
    #[arg(long)]
    plot: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings = Settings::from_env().context("failed to load settings")?;
    let fingerprinter = Fingerprinter::default();
    let matcher = Matcher::new(settings.matching.clone());

    if args.serve {
        let store = PgStore::connect(&settings.database_url)?;
        let state = AppState::new(Box::new(store), fingerprinter, matcher)
            .with_upload_limit(settings.max_upload_bytes);
        let runtime = tokio::runtime::Runtime::new()?;
        return runtime
            .block_on(server::serve(settings.bind_addr, state))
            .context("HTTP server failed");
    }

    let Some(file) = args.file.as_deref() else {
        bail!("--ingest, --match and --random-test require --file <path>");
    };
    let processor = AudioProcessor::new();

    if let Some(plot) = args.plot.as_deref() {
        if args.random_test || file.is_dir() {
            bail!("--plot needs --ingest or --match with a single audio file");
        }
        plot_file(&processor, &fingerprinter, file, plot)?;
    }

    let mut store = PgStore::connect(&settings.database_url)?;

    if args.ingest {
        let metadata = SongMetadata {
            song_name: args.song,
            artist_name: args.artist,
            album: args.album,
        };
        ingest(&mut store, &processor, &fingerprinter, file, &metadata)
    } else if args.match_ {
        match_file(&mut store, &processor, &fingerprinter, &matcher, file)
    } else {
        random_test(&mut store, &processor, &fingerprinter, &matcher, file)
    }
}

fn ingest(
    store: &mut PgStore,
    processor: &AudioProcessor,
    fingerprinter: &Fingerprinter,
    path: &Path,
    metadata: &SongMetadata,
) -> Result<()> {
    if path.is_dir() {
        let summary = pipeline::ingest_directory(store, processor, fingerprinter, path, metadata)
            .with_context(|| format!("failed to read directory {}", path.display()))?;
        println!("✅ Ingested {} songs", summary.ingested);
        for failed in &summary.failed {
            println!("❌ Failed: {}", failed.display());
        }
        return Ok(());
    }

    let song_id = pipeline::ingest_file(store, processor, fingerprinter, path, metadata)
        .with_context(|| format!("failed to ingest {}", path.display()))?;
    println!("✅ Successfully ingested '{}' (id={})", path.display(), song_id);
    Ok(())
}

/// Decode a snippet file and try to match against DB
fn match_file(
    store: &mut PgStore,
    processor: &AudioProcessor,
    fingerprinter: &Fingerprinter,
    matcher: &Matcher,
    path: &Path,
) -> Result<()> {
    let recognition = pipeline::recognize_file(store, processor, fingerprinter, matcher, path)
        .with_context(|| format!("failed to recognize {}", path.display()))?;

    if recognition.skipped > 0 {
        println!(
            "⚠️  {} of {} stored songs were unreadable and left out",
            recognition.skipped,
            recognition.scanned + recognition.skipped
        );
    }

    match recognition.best {
        Some(found) => println!(
            "✅ {} by {} (matches={} offset={} confidence={:.3})",
            found.song_name,
            found.artist_name,
            found.match_count,
            found.offset_difference,
            found.confidence
        ),
        None => println!("❌ No matching song found."),
    }
    Ok(())
}

fn random_test(
    store: &mut PgStore,
    processor: &AudioProcessor,
    fingerprinter: &Fingerprinter,
    matcher: &Matcher,
    songs_dir: &Path,
) -> Result<()> {
    let corpus = store.read_corpus().context("failed to load corpus")?;
    let config = SnippetTestConfig::default();

    println!("🎵 Starting random snippet test...");
    println!("   Snippets per song: {}", config.snippets_per_song);
    println!("   Snippet duration: {}s", config.snippet_secs);

    let report = tester::run_random_snippet_test(
        songs_dir,
        &corpus.records,
        processor,
        fingerprinter,
        matcher,
        &config,
        &mut rand::rng(),
    )
    .with_context(|| format!("failed to read songs directory {}", songs_dir.display()))?;

    println!("\n--- 📊 Test Finished ---");
    match report.accuracy() {
        Some(accuracy) => println!(
            "   Correct Matches: {} / {}\n   Accuracy: {:.2}%",
            report.correct, report.total, accuracy
        ),
        None => println!("No tests were run. Check the songs directory path."),
    }
    if !report.skipped_songs.is_empty() {
        println!("   Skipped songs: {}", report.skipped_songs.len());
    }
    Ok(())
}

fn plot_file(
    processor: &AudioProcessor,
    fingerprinter: &Fingerprinter,
    path: &Path,
    output: &Path,
) -> Result<()> {
    let audio = processor
        .get_decoded_audio(path)
        .with_context(|| format!("failed to decode {}", path.display()))?;
    let analysis = fingerprinter.analyze(&audio.samples, audio.sample_rate)?;

    let title = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    write_spectrogram_svg(&analysis.spectrogram, &analysis.landmarks, output, &title)
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(output = %output.display(), "wrote spectrogram plot");
    Ok(())
}
