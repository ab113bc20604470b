use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;

use crate::layers::{FetchResult, PaperRecord};

/// One entry of the anthology dump.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DumpEntry {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub citations: Option<u64>,
    #[serde(default)]
    pub pdf_url: Option<String>,
}

fn has_prefix(id: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|p| id.starts_with(p.as_str()))
}

/// Picks up to `count` dump entries for the venue.
///
/// Eligible entries match one of `prefixes` and have no PDF link yet. They
/// are ordered by citations (descending, missing = 0, ties by id), shuffled
/// with `seed`, then truncated. The same dump and seed always give the same
/// papers in the same order.
pub fn select_papers(
    dump: BTreeMap<String, DumpEntry>,
    prefixes: &[String],
    seed: u64,
    count: usize,
) -> FetchResult {
    let mut eligible: Vec<PaperRecord> = dump
        .into_iter()
        .filter(|(id, entry)| {
            has_prefix(id, prefixes) && entry.pdf_url.as_deref().map_or(true, str::is_empty)
        })
        .map(|(id, entry)| PaperRecord {
            title: entry.title,
            citations: entry.citations,
            ..PaperRecord::new(id)
        })
        .collect();

    eligible.sort_by(|a, b| {
        b.citations
            .unwrap_or(0)
            .cmp(&a.citations.unwrap_or(0))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut rng = StdRng::seed_from_u64(seed);
    eligible.shuffle(&mut rng);
    eligible.truncate(count);

    eligible.into_iter().collect()
}
