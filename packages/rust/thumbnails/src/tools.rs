//! Render/transform capability and its subprocess implementation.

use std::ffi::OsStr;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use sitemap_shared::{Result, SitemapConfig, SitemapError};

/// Top-left region kept from the full-page capture.
pub const CROP_GEOMETRY: &str = "1200x1200+0+0";
/// Final thumbnail bounding box.
pub const THUMB_SIZE: &str = "300x360";
const RESAMPLE_FILTER: &str = "Lanczos";
const UNSHARP: &str = "2x0.5+0.9+0";
const QUALITY: &str = "95";

/// Maximum stderr bytes kept in an error message.
const STDERR_LIMIT: usize = 512;

/// The three image operations a thumbnail needs.
///
/// Each step reads and writes files; an `Err` means the output must not be
/// trusted.
pub trait ImageTools {
    /// Capture a full-page raster of `url` into `raw`.
    fn render(&self, url: &str, raw: &Path) -> impl Future<Output = Result<()>> + Send;

    /// Crop `raw` to the fixed top-left region.
    fn crop(&self, raw: &Path, crop: &Path) -> impl Future<Output = Result<()>> + Send;

    /// Resize, sharpen, and re-encode `crop` into the final thumbnail.
    fn thumbnail(&self, crop: &Path, thumb: &Path) -> impl Future<Output = Result<()>> + Send;
}

/// [`ImageTools`] backed by external binaries.
#[derive(Debug, Clone)]
pub struct CommandTools {
    render_bin: PathBuf,
    render_script: PathBuf,
    transform_bin: PathBuf,
    timeout: Duration,
}

impl CommandTools {
    pub fn new(
        render_bin: impl Into<PathBuf>,
        render_script: impl Into<PathBuf>,
        transform_bin: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            render_bin: render_bin.into(),
            render_script: render_script.into(),
            transform_bin: transform_bin.into(),
            timeout,
        }
    }

    pub fn from_config(config: &SitemapConfig) -> Self {
        Self::new(
            &config.render_bin,
            &config.render_script,
            &config.transform_bin,
            config.tool_timeout,
        )
    }
}

impl ImageTools for CommandTools {
    async fn render(&self, url: &str, raw: &Path) -> Result<()> {
        run_tool(
            &self.render_bin,
            &[
                self.render_script.as_os_str(),
                OsStr::new(url),
                raw.as_os_str(),
            ],
            self.timeout,
        )
        .await
    }

    async fn crop(&self, raw: &Path, crop: &Path) -> Result<()> {
        run_tool(
            &self.transform_bin,
            &[
                raw.as_os_str(),
                OsStr::new("-crop"),
                OsStr::new(CROP_GEOMETRY),
                crop.as_os_str(),
            ],
            self.timeout,
        )
        .await
    }

    async fn thumbnail(&self, crop: &Path, thumb: &Path) -> Result<()> {
        run_tool(
            &self.transform_bin,
            &[
                crop.as_os_str(),
                OsStr::new("-filter"),
                OsStr::new(RESAMPLE_FILTER),
                OsStr::new("-resize"),
                OsStr::new(THUMB_SIZE),
                OsStr::new("-unsharp"),
                OsStr::new(UNSHARP),
                OsStr::new("-quality"),
                OsStr::new(QUALITY),
                thumb.as_os_str(),
            ],
            self.timeout,
        )
        .await
    }
}

/// Run a binary to completion; non-zero exit, spawn failure, and timeout
/// are all errors. The child is killed if the timeout fires.
async fn run_tool(bin: &Path, args: &[&OsStr], timeout: Duration) -> Result<()> {
    let tool = bin.display().to_string();
    debug!(%tool, ?args, "running tool");

    let child = Command::new(bin)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| SitemapError::tool(&tool, format!("failed to spawn: {e}")))?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| SitemapError::tool(&tool, format!("timed out after {timeout:?}")))?
        .map_err(|e| SitemapError::tool(&tool, format!("failed to wait: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let stderr = &stderr[..floor_char_boundary(stderr, STDERR_LIMIT)];
        warn!(%tool, status = ?output.status.code(), %stderr, "tool failed");
        return Err(SitemapError::tool(
            &tool,
            format!("exit status {:?}: {stderr}", output.status.code()),
        ));
    }

    Ok(())
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}
