//! Persistence of reference fingerprints.

pub mod bindings;
pub mod connector;
pub mod memory;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;
use crate::fingerprint::{Fingerprint, FingerprintToken, is_well_formed_hash};

pub use connector::PgStore;
pub use memory::MemoryStore;

/// One reference recording and its stored fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongRecord {
    pub song_name: String,
    pub artist_name: String,
    pub album: String,
    pub fingerprint: Fingerprint,
}

/// A record the scan had to leave out.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    pub song_id: i64,
    pub reason: String,
}

/// Result of a full corpus scan: every readable record plus what was skipped.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub records: Vec<SongRecord>,
    pub skipped: Vec<SkippedRecord>,
}

impl Corpus {
    fn push_song(&mut self, song: CorpusRow, tokens: Vec<(String, i64)>) {
        match tokens_from_rows(song.song_id, tokens) {
            Ok(fingerprint) => self.records.push(SongRecord {
                song_name: song.song_name,
                artist_name: song.artist_name,
                album: song.album,
                fingerprint,
            }),
            Err(err) => self.skip(err, song.song_id),
        }
    }

    pub(crate) fn skip(&mut self, err: StoreError, song_id: i64) {
        warn!(song_id, error = %err, "skipping unreadable corpus record");
        self.skipped.push(SkippedRecord {
            song_id,
            reason: err.to_string(),
        });
    }
}

/// Read/write access to the reference corpus. There is no update or delete.
pub trait FingerprintStore {
    /// Persists a record and returns its id.
    fn write_song(&mut self, record: &SongRecord) -> Result<i64, StoreError>;

    /// Reads every record. Individually corrupt records end up in
    /// [`Corpus::skipped`]; only a store-wide failure is an error.
    fn read_corpus(&mut self) -> Result<Corpus, StoreError>;
}

/// One row of a corpus scan: a song and, unless it has none, one of its tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusRow {
    pub song_id: i64,
    pub song_name: String,
    pub artist_name: String,
    pub album: String,
    pub token: Option<(String, i64)>,
}

/// Groups a song-ordered row stream into a corpus.
///
/// Rows of one song must be contiguous and in token order. The first row
/// error ends the scan with that error; a song whose tokens fail validation
/// is skipped.
pub fn collect_corpus<I>(rows: I) -> Result<Corpus, StoreError>
where
    I: IntoIterator<Item = Result<CorpusRow, StoreError>>,
{
    let mut corpus = Corpus::default();
    let mut current: Option<(CorpusRow, Vec<(String, i64)>)> = None;

    for row in rows {
        let mut row = row?;
        let token = row.token.take();

        let same_song = current
            .as_ref()
            .is_some_and(|(song, _)| song.song_id == row.song_id);
        if same_song {
            if let (Some((_, tokens)), Some(token)) = (current.as_mut(), token) {
                tokens.push(token);
            }
        } else if let Some((song, tokens)) = current.replace((row, token.into_iter().collect())) {
            corpus.push_song(song, tokens);
        }
    }

    if let Some((song, tokens)) = current {
        corpus.push_song(song, tokens);
    }
    Ok(corpus)
}

/// `(position, hash, offset)` per token, checked against the `INTEGER` columns.
pub(crate) fn token_rows(fingerprint: &Fingerprint) -> Result<Vec<(i32, &str, i32)>, StoreError> {
    fingerprint
        .tokens()
        .iter()
        .enumerate()
        .map(|(position, token)| {
            let out_of_range = |field: &'static str| StoreError::TokenOutOfRange { position, field };
            Ok((
                i32::try_from(position).map_err(|_| out_of_range("position"))?,
                token.hash.as_str(),
                i32::try_from(token.offset).map_err(|_| out_of_range("offset"))?,
            ))
        })
        .collect()
}

/// Turns raw `(hash, offset)` rows into a fingerprint, rejecting malformed tokens.
pub(crate) fn tokens_from_rows<I>(song_id: i64, rows: I) -> Result<Fingerprint, StoreError>
where
    I: IntoIterator<Item = (String, i64)>,
{
    rows.into_iter()
        .enumerate()
        .map(|(position, (hash, offset))| {
            if !is_well_formed_hash(&hash) {
                return Err(StoreError::CorruptRecord {
                    song_id,
                    reason: format!("token {position} has malformed hash {hash:?}"),
                });
            }
            let offset = u32::try_from(offset).map_err(|_| StoreError::CorruptRecord {
                song_id,
                reason: format!("token {position} has invalid offset {offset}"),
            })?;
            Ok(FingerprintToken { hash, offset })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Fingerprint::new)
}
