//! Domain-scoped crawling: fetch strategies, the URL frontier, and the
//! concurrent crawl engine.

pub mod engine;
pub mod fetch;
pub mod frontier;

pub use engine::{CrawlOutcome, Crawler};
pub use fetch::{
    AutoFetcher, FetchError, FetchStrategy, FetchedContent, RenderedFetcher, StaticFetcher,
    build_fetcher, looks_thin,
};
pub use frontier::{Dequeue, DomainScope, EnqueueOutcome, Frontier, normalize_url};
