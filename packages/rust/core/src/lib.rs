//! Pipeline orchestration for RivalMap runs: crawl, score, trim, synthesize,
//! and export, with stage-level resume.

pub mod pipeline;
pub mod summarize;

pub use pipeline::{
    ProgressReporter, RunRequest, RunSummary, SilentProgress, StageOutcome, parse_seed,
    run_crawl_stage, run_pipeline, run_synthesize_stage, run_trim_stage,
};
pub use summarize::Summarizer;
