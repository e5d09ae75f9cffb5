//! Paragraph relevance scoring.
//!
//! `score` is a pure function of (paragraph, profile): keyword density with a
//! saturation cap, a structural-role multiplier, and a length penalty, summed
//! with fixed weights and clamped to [0, 1].

use tracing::debug;

use rivalmap_shared::types::{Paragraph, ParagraphRole, ScoredParagraph};

use crate::profiles::TopicProfile;

/// Keyword density at which the density term saturates. Stuffing a paragraph
/// with more matches past this point buys nothing.
const DENSITY_SATURATION: f64 = 0.12;

/// Token band treated as normal length. Outside it a subtractive penalty
/// grows linearly toward 1.
const MIN_TOKENS: usize = 16;
const MAX_TOKENS: usize = 180;

const DENSITY_WEIGHT: f64 = 0.9;
const LENGTH_WEIGHT: f64 = 0.25;

/// The first few paragraphs of a page get a small boost.
const EARLY_POSITION_LIMIT: usize = 3;
const EARLY_POSITION_BOOST: f64 = 1.1;

/// Relevance of one paragraph for one topic, in [0, 1].
pub fn score(paragraph: &Paragraph, profile: &TopicProfile) -> f64 {
    score_tokens(&tokenize(&paragraph.text), paragraph, profile)
}

/// Scores every paragraph against every profile, emitting one record per
/// (paragraph, topic) pair that clears the noise floor.
pub fn score_all(
    paragraphs: &[Paragraph],
    profiles: &[TopicProfile],
    noise_floor: f64,
) -> Vec<ScoredParagraph> {
    let mut scored = Vec::new();
    for paragraph in paragraphs {
        let tokens = tokenize(&paragraph.text);
        for profile in profiles {
            let value = score_tokens(&tokens, paragraph, profile);
            if value > noise_floor {
                scored.push(ScoredParagraph {
                    source_url: paragraph.source_url.clone(),
                    text: paragraph.text.clone(),
                    position: paragraph.position,
                    role: paragraph.role,
                    topic: profile.name.clone(),
                    score: value,
                });
            }
        }
    }
    debug!(
        paragraphs = paragraphs.len(),
        emitted = scored.len(),
        "scored paragraphs"
    );
    scored
}

fn score_tokens(tokens: &[String], paragraph: &Paragraph, profile: &TopicProfile) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }

    let mut matched_weight = 0.0;
    for keyword in &profile.keywords {
        let phrase = tokenize(&keyword.term);
        let hits = phrase_hits(tokens, &phrase);
        matched_weight += hits as f64 * keyword.weight * phrase.len() as f64;
    }
    let density = matched_weight / tokens.len() as f64;
    let density_term = (density / DENSITY_SATURATION).min(1.0);

    let count = tokens.len();
    let length_penalty = if count < MIN_TOKENS {
        (MIN_TOKENS - count) as f64 / MIN_TOKENS as f64
    } else if count > MAX_TOKENS {
        (((count - MAX_TOKENS) as f64) / MAX_TOKENS as f64).min(1.0)
    } else {
        0.0
    };

    let early_boost = if paragraph.position < EARLY_POSITION_LIMIT {
        EARLY_POSITION_BOOST
    } else {
        1.0
    };

    let base = DENSITY_WEIGHT * density_term - LENGTH_WEIGHT * length_penalty;
    (base * role_multiplier(paragraph.role) * early_boost).clamp(0.0, 1.0)
}

/// Occurrences of `phrase` as a contiguous token run, counting overlaps.
fn phrase_hits(tokens: &[String], phrase: &[String]) -> usize {
    if phrase.is_empty() || phrase.len() > tokens.len() {
        return 0;
    }
    tokens.windows(phrase.len()).filter(|w| *w == phrase).count()
}

fn role_multiplier(role: ParagraphRole) -> f64 {
    match role {
        ParagraphRole::Heading => 1.2,
        ParagraphRole::Body => 1.0,
        ParagraphRole::ListItem => 0.9,
        ParagraphRole::Other => 0.7,
        ParagraphRole::Nav => 0.0,
    }
}

/// Lowercased alphanumeric tokens; everything else is a separator.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
