//! On-disk thumbnail cache and the external render/transform tools.
//!
//! This crate provides:
//! - [`ImageTools`]: the render + crop + thumbnail capability
//! - [`CommandTools`]: the capability backed by a headless browser and ImageMagick
//! - [`ThumbnailCache`]: TTL-checked assets, regenerated only when stale or missing

pub mod cache;
pub mod tools;

pub use cache::{AssetPaths, CacheStatus, ThumbnailCache, asset_dir};
pub use tools::{CommandTools, ImageTools};
