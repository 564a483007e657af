use std::time::SystemTime;

use diesel::connection::DefaultLoadingMode;
use diesel::{dsl::insert_into, prelude::*};
use tracing::{debug, info};

use crate::db::{
    Corpus, CorpusRow, FingerprintStore, SongRecord,
    bindings::{FingerprintRow, NewSong},
    collect_corpus, token_rows,
};
use crate::error::StoreError;

const BATCH_SIZE: usize = 5000;

/// `songs` left-joined with `fingerprint`.
type JoinedRow = (i32, String, String, String, Option<String>, Option<i32>);

/// PostgreSQL-backed corpus. Opened explicitly, closed on drop.
pub struct PgStore {
    connector: PgConnection,
}

impl PgStore {
    pub fn connect(database_url: &str) -> Result<Self, StoreError> {
        let connector = PgConnection::establish(database_url)?;
        info!("connected to fingerprint store");
        Ok(Self { connector })
    }
}

fn unavailable(err: diesel::result::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

impl FingerprintStore for PgStore {
    fn write_song(&mut self, record: &SongRecord) -> Result<i64, StoreError> {
        use crate::schema::{fingerprint, songs};

        let tokens = token_rows(&record.fingerprint)?;
        let new_song = NewSong {
            song_name: &record.song_name,
            artist_name: &record.artist_name,
            album: &record.album,
            created_at: Some(SystemTime::now()),
        };

        let inserted_id = self.connector.transaction::<_, StoreError, _>(|conn| {
            let id: i32 = insert_into(songs::table)
                .values(&new_song)
                .returning(songs::id)
                .get_result(conn)?;

            let rows: Vec<FingerprintRow> = tokens
                .iter()
                .map(|&(position, hash, time_offset)| FingerprintRow {
                    song_id: id,
                    position,
                    hash: hash.to_string(),
                    time_offset,
                })
                .collect();

            for batch in rows.chunks(BATCH_SIZE) {
                let written = insert_into(fingerprint::table).values(batch).execute(conn)?;
                debug!(written, "pushed fingerprint batch");
            }

            Ok(id)
        })?;

        info!(
            song_id = inserted_id,
            song = %record.song_name,
            tokens = record.fingerprint.len(),
            "stored song"
        );
        Ok(inserted_id as i64)
    }

    fn read_corpus(&mut self) -> Result<Corpus, StoreError> {
        use crate::schema::{fingerprint, songs};

        let rows = songs::table
            .left_join(fingerprint::table)
            .order((songs::id.asc(), fingerprint::position.nullable().asc()))
            .select((
                songs::id,
                songs::song_name,
                songs::artist_name,
                songs::album,
                fingerprint::hash.nullable(),
                fingerprint::time_offset.nullable(),
            ))
            .load_iter::<JoinedRow, DefaultLoadingMode>(&mut self.connector)
            .map_err(unavailable)?;

        let corpus = collect_corpus(rows.map(|row| -> Result<CorpusRow, StoreError> {
            let (id, song_name, artist_name, album, hash, time_offset) = row.map_err(unavailable)?;
            Ok(CorpusRow {
                song_id: i64::from(id),
                song_name,
                artist_name,
                album,
                token: hash.zip(time_offset.map(i64::from)),
            })
        }))?;

        info!(
            records = corpus.records.len(),
            skipped = corpus.skipped.len(),
            "read corpus"
        );
        Ok(corpus)
    }
}
