//! Topic profiles: weighted lexical definitions of "relevant to topic T".

use rivalmap_shared::config::TopicConfig;

/// One term or phrase in a profile. Multi-word phrases match whole token
/// sequences, so "risk engine" never matches "rising energy".
#[derive(Debug, Clone)]
pub struct Keyword {
    pub term: String,
    pub weight: f64,
}

/// A named topic and the weighted vocabulary that defines it.
#[derive(Debug, Clone)]
pub struct TopicProfile {
    pub name: String,
    pub keywords: Vec<Keyword>,
}

impl TopicProfile {
    fn new(name: &str, weight: f64, terms: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: terms
                .iter()
                .map(|term| Keyword {
                    term: (*term).to_string(),
                    weight,
                })
                .collect(),
        }
    }
}

/// The built-in taxonomy, used when the config file defines no `[[topics]]`
/// tables. Engineering vocabulary carries extra weight since those pages are
/// the richest competitive signal.
pub fn default_taxonomy() -> Vec<TopicProfile> {
    vec![
        TopicProfile::new(
            "platform",
            1.0,
            &[
                "platform",
                "dashboard",
                "rules",
                "model",
                "machine learning",
                "graph",
                "signals",
                "decision",
                "decisioning",
                "risk engine",
                "case management",
                "accuracy",
                "coverage",
                "false positive",
            ],
        ),
        TopicProfile::new(
            "integrations",
            1.0,
            &[
                "api",
                "sdk",
                "integration",
                "integrations",
                "webhook",
                "webhooks",
                "connector",
                "connectors",
            ],
        ),
        TopicProfile::new(
            "pricing",
            1.0,
            &[
                "pricing",
                "price",
                "plan",
                "plans",
                "tier",
                "subscription",
                "billing",
                "free trial",
                "per month",
                "annual",
                "contact sales",
            ],
        ),
        TopicProfile::new(
            "risk-compliance",
            1.0,
            &[
                "fraud",
                "scam",
                "chargeback",
                "account takeover",
                "ato",
                "identity",
                "kyc",
                "kyb",
                "aml",
                "ofac",
                "pep",
                "watchlist",
                "sanctions",
                "compliance",
                "device fingerprint",
                "biometrics",
                "vpn",
                "proxy",
            ],
        ),
        TopicProfile::new(
            "customers",
            1.0,
            &[
                "customer",
                "customers",
                "use case",
                "solution",
                "segment",
                "industry",
                "case study",
                "testimonial",
                "success story",
            ],
        ),
        TopicProfile::new(
            "engineering",
            1.2,
            &[
                "engineering",
                "architecture",
                "latency",
                "pipeline",
                "deployment",
                "feature store",
                "model training",
                "inference",
                "distributed",
                "postgres",
                "kafka",
                "graphql",
                "rest",
                "grpc",
            ],
        ),
    ]
}

/// Profiles for a run: the configured topics, or the default taxonomy when
/// none are configured.
pub fn build_profiles(topics: &[TopicConfig]) -> Vec<TopicProfile> {
    if topics.is_empty() {
        return default_taxonomy();
    }
    topics
        .iter()
        .map(|topic| TopicProfile {
            name: topic.name.clone(),
            keywords: topic
                .keywords
                .iter()
                .map(|k| Keyword {
                    term: k.term.clone(),
                    weight: k.weight,
                })
                .collect(),
        })
        .collect()
}
