use crate::db::{Corpus, CorpusRow, FingerprintStore, SongRecord, collect_corpus, token_rows};
use crate::error::StoreError;

/// In-process corpus with the same validation as the database store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Vec<SongRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FingerprintStore for MemoryStore {
    fn write_song(&mut self, record: &SongRecord) -> Result<i64, StoreError> {
        token_rows(&record.fingerprint)?;
        self.records.push(record.clone());
        Ok(self.records.len() as i64)
    }

    /// Replays the records as the row stream the database scan produces.
    fn read_corpus(&mut self) -> Result<Corpus, StoreError> {
        let rows = self.records.iter().enumerate().flat_map(|(index, record)| {
            let song_id = index as i64 + 1;
            let row = move |token| -> Result<CorpusRow, StoreError> {
                Ok(CorpusRow {
                    song_id,
                    song_name: record.song_name.clone(),
                    artist_name: record.artist_name.clone(),
                    album: record.album.clone(),
                    token,
                })
            };

            let tokens = record.fingerprint.tokens();
            if tokens.is_empty() {
                vec![row(None)]
            } else {
                tokens
                    .iter()
                    .map(|t| row(Some((t.hash.clone(), i64::from(t.offset)))))
                    .collect()
            }
        });

        collect_corpus(rows)
    }
}
