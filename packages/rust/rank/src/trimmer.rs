//! Top-K snippet selection with near-duplicate collapse.
//!
//! Marketing sites repeat the same phrasing across pages, so exact-text
//! dedup is not enough. Near-duplicates are detected with word 3-gram
//! shingle sets compared by Jaccard similarity.

use std::collections::{HashMap, HashSet};

use sha2::{Digest, Sha256};
use tracing::debug;

use rivalmap_shared::types::{ScoredParagraph, Snippet};

use crate::scorer::tokenize;

const SHINGLE_SIZE: usize = 3;

/// Jaccard similarity at or above this counts as a duplicate.
const SIMILARITY_THRESHOLD: f64 = 0.6;

/// Selects the top `top_k` snippets per topic.
///
/// Topics keep their first-appearance order. Within a topic, candidates are
/// taken in descending score (ties by earlier discovery), near-duplicates of
/// an already-kept snippet are skipped, and the survivors get 1-based ranks.
/// Running the result through `trim` again returns the same sequence.
pub fn trim(scored: Vec<ScoredParagraph>, top_k: usize) -> Vec<Snippet> {
    let mut topic_order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<(usize, ScoredParagraph)>> = HashMap::new();
    for (idx, sp) in scored.into_iter().enumerate() {
        if !groups.contains_key(&sp.topic) {
            topic_order.push(sp.topic.clone());
        }
        groups.entry(sp.topic.clone()).or_default().push((idx, sp));
    }

    let mut snippets = Vec::new();
    for topic in &topic_order {
        let Some(mut group) = groups.remove(topic) else {
            continue;
        };
        let candidates = group.len();
        group.sort_by(|(ia, a), (ib, b)| b.score.total_cmp(&a.score).then(ia.cmp(ib)));

        let mut kept: Vec<(HashSet<u64>, ScoredParagraph)> = Vec::new();
        for (_, candidate) in group {
            if kept.len() == top_k {
                break;
            }
            let shingles = shingle_set(&candidate.text);
            let duplicate = kept
                .iter()
                .any(|(seen, _)| jaccard(seen, &shingles) >= SIMILARITY_THRESHOLD);
            if duplicate {
                continue;
            }
            kept.push((shingles, candidate));
        }
        debug!(topic, candidates, kept = kept.len(), "trimmed topic");

        for (rank, (_, sp)) in kept.into_iter().enumerate() {
            snippets.push(Snippet {
                text: sp.text,
                topic: sp.topic,
                score: sp.score,
                source_url: sp.source_url,
                rank: rank + 1,
            });
        }
    }
    snippets
}

/// Word 3-gram shingle set. Texts shorter than one shingle hash as a single
/// whole-text shingle so tiny snippets still compare.
fn shingle_set(text: &str) -> HashSet<u64> {
    let tokens = tokenize(text);
    let mut shingles = HashSet::new();
    if tokens.len() < SHINGLE_SIZE {
        if !tokens.is_empty() {
            shingles.insert(hash_shingle(&tokens));
        }
        return shingles;
    }
    for window in tokens.windows(SHINGLE_SIZE) {
        shingles.insert(hash_shingle(window));
    }
    shingles
}

// SHA-256 keeps shingle hashes stable across builds, unlike the std hasher.
fn hash_shingle(tokens: &[String]) -> u64 {
    let mut hasher = Sha256::new();
    for token in tokens {
        hasher.update(token.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
}

fn jaccard(a: &HashSet<u64>, b: &HashSet<u64>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}
