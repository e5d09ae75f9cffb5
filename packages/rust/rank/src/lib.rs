//! Topic relevance ranking: profiles, paragraph scoring, and top-K trimming.

pub mod profiles;
pub mod scorer;
pub mod trimmer;

pub use profiles::{Keyword, TopicProfile, build_profiles, default_taxonomy};
pub use scorer::{score, score_all};
pub use trimmer::trim;
