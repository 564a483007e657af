use std::time::SystemTime;

use diesel::prelude::*;

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::fingerprint)]
pub struct FingerprintRow {
    pub song_id: i32,
    pub position: i32,
    pub hash: String,
    pub time_offset: i32,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::songs)]
pub struct NewSong<'a> {
    pub song_name: &'a str,
    pub artist_name: &'a str,
    pub album: &'a str,
    pub created_at: Option<SystemTime>,
}
