//! Evidence synthesis: grouping ranked snippets into source-diversified
//! packs, one per topic.

pub mod bundle;

pub use bundle::{BundlePack, BundleSnippet, ExportBundle, build_bundle};

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use rivalmap_shared::types::{EvidencePack, Snippet, source_domain};

/// Groups snippets into one evidence pack per topic present in the input.
///
/// Topics keep first-appearance order. Within a topic, candidates are
/// admitted greedily by descending score (ties by trim rank); a candidate
/// whose base domain already fills `max_per_domain` slots is skipped
/// outright, never deferred, so diversity wins over raw score. Packs that
/// admit nothing are omitted. Pure and deterministic.
pub fn synthesize(snippets: Vec<Snippet>, max_per_domain: usize) -> Vec<EvidencePack> {
    let mut topic_order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<Snippet>> = HashMap::new();
    for snippet in snippets {
        if !groups.contains_key(&snippet.topic) {
            topic_order.push(snippet.topic.clone());
        }
        groups.entry(snippet.topic.clone()).or_default().push(snippet);
    }

    let mut packs = Vec::new();
    for topic in &topic_order {
        let Some(mut group) = groups.remove(topic) else {
            continue;
        };
        group.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.rank.cmp(&b.rank)));

        let mut admitted = Vec::new();
        let mut domain_counts: HashMap<String, usize> = HashMap::new();
        let mut source_domains = BTreeSet::new();
        for snippet in group {
            let domain = source_domain(&snippet.source_url)
                .unwrap_or_else(|| snippet.source_url.clone());
            let count = domain_counts.entry(domain.clone()).or_insert(0);
            if *count >= max_per_domain {
                continue;
            }
            *count += 1;
            source_domains.insert(domain);
            admitted.push(snippet);
        }
        if admitted.is_empty() {
            debug!(topic, "no snippets admitted, pack omitted");
            continue;
        }
        packs.push(EvidencePack {
            topic: topic.clone(),
            snippets: admitted,
            source_domains,
        });
    }
    packs
}
