//! The `sitemap.json` document.

use std::path::Path;

use tracing::{debug, info, instrument, warn};

use sitemap_shared::{ResolvedPage, Result, SitemapEntry, SitemapError};

/// Flatten resolved pages into manifest entries, sorted by
/// `(section, microsite)`.
pub fn build(pages: &[ResolvedPage]) -> Vec<SitemapEntry> {
    let mut sorted: Vec<&ResolvedPage> = pages.iter().collect();
    sorted.sort_by(|a, b| a.record.key().cmp(&b.record.key()));
    sorted.into_iter().map(SitemapEntry::from).collect()
}

/// Write the manifest atomically (temp file, then rename).
///
/// Nothing is written for an empty entry list; returns whether the file was
/// written.
#[instrument(skip_all, fields(path = %path.display(), entries = entries.len()))]
pub fn write(path: &Path, entries: &[SitemapEntry]) -> Result<bool> {
    if entries.is_empty() {
        warn!("no entries, manifest not written");
        return Ok(false);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| SitemapError::io(parent, e))?;
    }

    let json = serde_json::to_string_pretty(entries)
        .map_err(|e| SitemapError::validation(format!("JSON serialization failed: {e}")))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sitemap.json".to_string());
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, json).map_err(|e| SitemapError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| SitemapError::io(path, e))?;

    debug!(temp = %temp.display(), "renamed into place");
    info!("manifest written");
    Ok(true)
}
