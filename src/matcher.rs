//! Offset-histogram voting over the reference corpus.
//!
//! A true match has its shared hashes aligned under one time shift, so each
//! candidate is scored by the largest cluster of shared hashes agreeing on a
//! single `stored_offset - query_offset`, not by raw hash overlap.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use twox_hash::XxHash64;

use crate::config::MatchConfig;
use crate::db::SongRecord;
use crate::fingerprint::Fingerprint;

type FastMap<K, V> = HashMap<K, V, BuildHasherDefault<XxHash64>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub song_name: String,
    pub artist_name: String,
    pub match_count: usize,
    pub offset_difference: i64,
    /// Fraction of query tokens supporting the winning alignment, rounded to 3 places.
    pub confidence: f64,
}

/// `hash -> offsets` lookup that remembers the order hashes first appeared in.
#[derive(Debug, Default)]
pub struct OffsetIndex<'a> {
    order: Vec<&'a str>,
    offsets: FastMap<&'a str, Vec<u32>>,
}

impl<'a> OffsetIndex<'a> {
    pub fn build(fingerprint: &'a Fingerprint) -> Self {
        let mut index = OffsetIndex::default();
        for token in fingerprint.tokens() {
            let hash = token.hash.as_str();
            index
                .offsets
                .entry(hash)
                .or_insert_with(|| {
                    index.order.push(hash);
                    Vec::new()
                })
                .push(token.offset);
        }
        index
    }

    pub fn get(&self, hash: &str) -> Option<&[u32]> {
        self.offsets.get(hash).map(Vec::as_slice)
    }

    pub fn distinct_hashes(&self) -> usize {
        self.order.len()
    }
}

/// Vote counts per offset difference, with first-seen order kept for tie-breaks.
#[derive(Debug, Default)]
pub struct OffsetHistogram {
    counts: FastMap<i64, usize>,
    order: Vec<i64>,
}

impl OffsetHistogram {
    pub fn vote(&mut self, offset_difference: i64) {
        let count = self.counts.entry(offset_difference).or_insert_with(|| {
            self.order.push(offset_difference);
            0
        });
        *count += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn votes(&self, offset_difference: i64) -> usize {
        self.counts.get(&offset_difference).copied().unwrap_or(0)
    }

    /// `(offset_difference, votes)` with the most votes; the earliest seen wins ties.
    pub fn mode(&self) -> Option<(i64, usize)> {
        let mut best: Option<(i64, usize)> = None;
        for &offset in &self.order {
            let count = self.counts[&offset];
            if best.is_none_or(|(_, best_count)| count > best_count) {
                best = Some((offset, count));
            }
        }
        best
    }
}

/// Votes every `(query offset, stored offset)` pair sharing a hash.
pub fn offset_histogram(query: &OffsetIndex<'_>, stored: &OffsetIndex<'_>) -> OffsetHistogram {
    let mut histogram = OffsetHistogram::default();
    for hash in &query.order {
        let Some(stored_offsets) = stored.get(hash) else {
            continue;
        };
        let query_offsets = &query.offsets[hash];
        for &stored_offset in stored_offsets {
            for &query_offset in query_offsets {
                histogram.vote(stored_offset as i64 - query_offset as i64);
            }
        }
    }
    histogram
}

/// Scoring of one corpus record that passed both thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub position: usize,
    pub best_offset: i64,
    pub best_count: usize,
    pub confidence: f64,
}

impl Candidate {
    /// Strictly more votes replaces; equal votes keep the earlier record.
    fn prefer(self, other: Candidate) -> Candidate {
        if other.best_count > self.best_count
            || (other.best_count == self.best_count && other.position < self.position)
        {
            other
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Matcher {
    config: MatchConfig,
}

impl Matcher {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Scans the whole corpus and returns the best qualifying record, if any.
    pub fn match_fingerprint<'r, I>(&self, query: &Fingerprint, corpus: I) -> Option<MatchResult>
    where
        I: IntoIterator<Item = &'r SongRecord>,
    {
        if query.is_empty() {
            return None;
        }
        let query_index = OffsetIndex::build(query);

        let mut best: Option<(Candidate, &SongRecord)> = None;
        for (position, record) in corpus.into_iter().enumerate() {
            let Some(candidate) = self.score(&query_index, query.len(), position, record) else {
                continue;
            };
            if best.is_none_or(|(current, _)| candidate.best_count > current.best_count) {
                best = Some((candidate, record));
            }
        }

        self.finish(best)
    }

    /// Same result as [`Matcher::match_fingerprint`], with records scored in parallel.
    pub fn match_fingerprint_parallel(
        &self,
        query: &Fingerprint,
        corpus: &[SongRecord],
    ) -> Option<MatchResult> {
        if query.is_empty() {
            return None;
        }
        let query_index = OffsetIndex::build(query);

        let best = corpus
            .par_iter()
            .enumerate()
            .filter_map(|(position, record)| {
                self.score(&query_index, query.len(), position, record)
            })
            .reduce_with(Candidate::prefer)
            .map(|candidate| (candidate, &corpus[candidate.position]));

        self.finish(best)
    }

    /// Histogram mode of one record, if it clears `min_match_count` and `min_confidence`.
    pub fn score(
        &self,
        query_index: &OffsetIndex<'_>,
        query_len: usize,
        position: usize,
        record: &SongRecord,
    ) -> Option<Candidate> {
        if record.fingerprint.is_empty() || query_len == 0 {
            return None;
        }

        let stored_index = OffsetIndex::build(&record.fingerprint);
        let histogram = offset_histogram(query_index, &stored_index);
        let (best_offset, best_count) = histogram.mode()?;
        let confidence = (best_count as f64 / query_len as f64).min(1.0);

        debug!(
            song = %record.song_name,
            best_offset,
            best_count,
            confidence,
            "scored candidate"
        );

        if best_count < self.config.min_match_count || confidence < self.config.min_confidence {
            return None;
        }

        Some(Candidate {
            position,
            best_offset,
            best_count,
            confidence,
        })
    }

    fn finish(&self, best: Option<(Candidate, &SongRecord)>) -> Option<MatchResult> {
        match best {
            Some((candidate, record)) => {
                info!(
                    song = %record.song_name,
                    artist = %record.artist_name,
                    match_count = candidate.best_count,
                    offset = candidate.best_offset,
                    "matched"
                );
                Some(MatchResult {
                    song_name: record.song_name.clone(),
                    artist_name: record.artist_name.clone(),
                    match_count: candidate.best_count,
                    offset_difference: candidate.best_offset,
                    confidence: round_to(candidate.confidence, 3),
                })
            }
            None => {
                info!("no match");
                None
            }
        }
    }
}

/// Match with the default thresholds.
pub fn match_fingerprint<'r, I>(query: &Fingerprint, corpus: I) -> Option<MatchResult>
where
    I: IntoIterator<Item = &'r SongRecord>,
{
    Matcher::default().match_fingerprint(query, corpus)
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}
