//! Application configuration for the sitemap generator.
//!
//! The config file defaults to `sitemap.toml` in the working directory.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, SitemapError};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "sitemap.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".sitemap-generator";

/// User-Agent string used when none is configured.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "sitemap-generator/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/telemundo/sitemap-generator)"
);

// ---------------------------------------------------------------------------
// Config structs (matching sitemap.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Publisher category service (`listCategoryItems`, `findPage`).
    #[serde(default)]
    pub publisher: EndpointConfig,

    /// Main site: show-config feed and the pages themselves.
    #[serde(default)]
    pub mainsite: EndpointConfig,

    /// External binaries.
    #[serde(default)]
    pub binary: BinaryConfig,

    /// Filesystem locations.
    #[serde(default)]
    pub path: PathConfig,

    /// HTTP client settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Thumbnail cache settings.
    #[serde(default)]
    pub thumbnails: ThumbnailConfig,
}

/// `[publisher]` / `[mainsite]` sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Bare host (`www.example.com`, implies `http://`) or full origin.
    #[serde(default)]
    pub domain: String,

    /// Optional HTTP proxy used for every request to this endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

/// `[binary]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryConfig {
    /// Headless browser used to capture a full-page raster.
    #[serde(default = "default_render_bin")]
    pub render: String,

    /// Image transform tool (ImageMagick `convert` compatible).
    #[serde(default = "default_transform_bin")]
    pub transform: String,
}

impl Default for BinaryConfig {
    fn default() -> Self {
        Self {
            render: default_render_bin(),
            transform: default_transform_bin(),
        }
    }
}

fn default_render_bin() -> String {
    "phantomjs".into()
}
fn default_transform_bin() -> String {
    "convert".into()
}

/// `[path]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Root of the thumbnail cache; `sitemap.json` is written here too.
    #[serde(default = "default_assets_dir")]
    pub assets: String,

    /// Script handed to the render binary as its first argument.
    #[serde(default = "default_render_script")]
    pub render_script: String,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            assets: default_assets_dir(),
            render_script: default_render_script(),
        }
    }
}

fn default_assets_dir() -> String {
    "tmp".into()
}
fn default_render_script() -> String {
    "lib/rasterize.js".into()
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum redirect hops followed per page before giving up.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            max_redirects: default_max_redirects(),
        }
    }
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_redirects() -> usize {
    10
}

/// `[thumbnails]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    /// A raw capture younger than this is reused as-is.
    #[serde(default = "default_freshness_secs")]
    pub freshness_secs: u64,

    /// Upper bound for each render/transform invocation.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            freshness_secs: default_freshness_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_freshness_secs() -> u64 {
    86_400
}
fn default_tool_timeout_secs() -> u64 {
    120
}

// ---------------------------------------------------------------------------
// Runtime config (validated, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// A validated remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Origin without a trailing slash, e.g. `http://www.example.com`.
    pub base: String,
    pub proxy: Option<String>,
}

/// Runtime configuration, constructed once at startup and passed by
/// reference to every fetcher, resolver, and cache component.
#[derive(Debug, Clone)]
pub struct SitemapConfig {
    pub publisher: Endpoint,
    pub mainsite: Endpoint,
    pub render_bin: PathBuf,
    pub render_script: PathBuf,
    pub transform_bin: PathBuf,
    pub assets_dir: PathBuf,
    pub freshness: Duration,
    pub user_agent: String,
    pub request_timeout: Duration,
    pub tool_timeout: Duration,
    pub max_redirects: usize,
}

impl SitemapConfig {
    /// Path of the manifest written at the end of a run.
    pub fn manifest_path(&self) -> PathBuf {
        self.assets_dir.join("sitemap.json")
    }
}

impl TryFrom<&AppConfig> for SitemapConfig {
    type Error = SitemapError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            publisher: Endpoint {
                base: base_url(&config.publisher.domain)?,
                proxy: non_empty(config.publisher.proxy.as_deref()),
            },
            mainsite: Endpoint {
                base: base_url(&config.mainsite.domain)?,
                proxy: non_empty(config.mainsite.proxy.as_deref()),
            },
            render_bin: PathBuf::from(&config.binary.render),
            render_script: PathBuf::from(&config.path.render_script),
            transform_bin: PathBuf::from(&config.binary.transform),
            assets_dir: PathBuf::from(&config.path.assets),
            freshness: Duration::from_secs(config.thumbnails.freshness_secs),
            user_agent: config.http.user_agent.clone(),
            request_timeout: Duration::from_secs(config.http.timeout_secs),
            tool_timeout: Duration::from_secs(config.thumbnails.tool_timeout_secs),
            max_redirects: config.http.max_redirects,
        })
    }
}

impl AppConfig {
    /// Check required fields. This is the only failure class that aborts a
    /// run, and it must happen before any network activity.
    pub fn validate(&self) -> Result<()> {
        if self.publisher.domain.trim().is_empty() {
            return Err(SitemapError::config(
                "missing the \"publisher.domain\" parameter",
            ));
        }
        if self.mainsite.domain.trim().is_empty() {
            return Err(SitemapError::config(
                "missing the \"mainsite.domain\" parameter",
            ));
        }
        if self.http.user_agent.trim().is_empty() {
            return Err(SitemapError::config("http.user_agent must not be empty"));
        }
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Turn a configured domain into an origin string without a trailing slash.
///
/// Bare hosts get `http://`, matching how the services are addressed.
pub fn base_url(domain: &str) -> Result<String> {
    let trimmed = domain.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(SitemapError::config("domain must not be empty"));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let parsed = Url::parse(&candidate)
        .map_err(|e| SitemapError::config(format!("invalid domain '{domain}': {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(SitemapError::config(format!(
                "unsupported scheme '{other}' in domain '{domain}'"
            )));
        }
    }
    if parsed.host_str().is_none() {
        return Err(SitemapError::config(format!("domain '{domain}' has no host")));
    }

    Ok(candidate)
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the per-user config directory (`~/.sitemap-generator/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SitemapError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Load the application config from a specific file path.
///
/// A missing file yields defaults, which fail validation later because the
/// domains are required.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| SitemapError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SitemapError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Write a default config file at `path`, creating parent directories.
/// Refuses to overwrite an existing file.
pub fn init_config(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Err(SitemapError::config(format!(
            "{} already exists",
            path.display()
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| SitemapError::io(parent, e))?;
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| SitemapError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| SitemapError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path.to_path_buf())
}
