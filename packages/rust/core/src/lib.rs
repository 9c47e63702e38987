//! Pipeline orchestration for the sitemap generator.
//!
//! This crate ties the feeds, the merge, URL resolution, and the thumbnail
//! cache together into one run that ends with `sitemap.json`.

pub mod manifest;
pub mod pipeline;

pub use pipeline::{
    ProgressReporter, RunSummary, SilentProgress, collect_records, generate, generate_with,
};
