//! Shared types, error model, and configuration for RivalMap.
//!
//! This crate is the foundation depended on by all other RivalMap crates.
//! It provides:
//! - [`RivalmapError`], the unified error type
//! - Record types ([`Page`], [`Paragraph`], [`Snippet`], [`EvidencePack`], ...)
//! - Configuration ([`AppConfig`], [`RunConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, FetchConfig, FetchMode, KeywordConfig, PAGE_BUDGETS,
    REQUEST_DELAYS_MS, RunConfig, ScoringConfig, TopicConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{Result, RivalmapError};
pub use types::{
    CURRENT_SCHEMA_VERSION, EvidencePack, Page, Paragraph, ParagraphRole, RunId, ScoredParagraph,
    Snippet, UrlRecord, UrlStatus, base_domain, source_domain,
};
