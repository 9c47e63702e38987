//! TTL-based thumbnail cache.
//!
//! Each record owns a directory under the assets root built from its
//! `(section, microsite)` key (see [`asset_dir`]), holding `raw.png`, `crop.png`, and `thumb.png`. The modification
//! time of `raw.png` decides freshness. Rendering goes through `*.partial.png`
//! files that are renamed into place only after all three steps succeed,
//! `raw.png` last.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, instrument, trace, warn};

use sitemap_shared::{Result, SitemapError};

use crate::tools::ImageTools;

const RAW_FILE: &str = "raw.png";
const CROP_FILE: &str = "crop.png";
const THUMB_FILE: &str = "thumb.png";

/// Outcome of a successful [`ThumbnailCache::ensure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Existing assets were young enough; no tool ran.
    Fresh,
    /// The full render pipeline ran and its output was promoted.
    Rendered,
}

/// Files belonging to one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPaths {
    pub dir: PathBuf,
    pub raw: PathBuf,
    pub crop: PathBuf,
    pub thumb: PathBuf,
}

impl AssetPaths {
    fn new(dir: PathBuf) -> Self {
        Self {
            raw: dir.join(RAW_FILE),
            crop: dir.join(CROP_FILE),
            thumb: dir.join(THUMB_FILE),
            dir,
        }
    }

    fn partial(&self) -> Self {
        Self {
            dir: self.dir.clone(),
            raw: self.dir.join("raw.partial.png"),
            crop: self.dir.join("crop.partial.png"),
            thumb: self.dir.join("thumb.partial.png"),
        }
    }
}

/// Names the cache and the manifest writer create inside asset directories.
const RESERVED_NAMES: &[&str] = &[
    RAW_FILE,
    CROP_FILE,
    THUMB_FILE,
    "raw.partial.png",
    "crop.partial.png",
    "thumb.partial.png",
    "sitemap.json",
    ".sitemap.json.tmp",
];

/// Relative asset directory for a record key `(section, microsite)`.
///
/// Each component is escaped on its own, so distinct keys always map to
/// distinct directories under the assets root. The homepage maps to `""`.
pub fn asset_dir((section, microsite): (&str, &str)) -> String {
    if microsite.is_empty() {
        // Both empty is the homepage: the root itself.
        return if section.is_empty() {
            String::new()
        } else {
            escape_component(section)
        };
    }
    format!("{}/{}", escape_component(section), escape_component(microsite))
}

/// Percent-escape one key component into a single safe path segment.
fn escape_component(component: &str) -> String {
    // A lone `%` never results from escaping, so it can stand for "empty".
    if component.is_empty() {
        return "%".to_string();
    }

    let mut escaped = String::with_capacity(component.len());
    for c in component.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '/' => escaped.push_str("%2F"),
            '\\' => escaped.push_str("%5C"),
            other => escaped.push(other),
        }
    }

    if escaped == "." || escaped == ".." || RESERVED_NAMES.contains(&escaped.as_str()) {
        escaped = escaped.replace('.', "%2E");
    }
    escaped
}

/// On-disk cache of rendered page thumbnails.
#[derive(Debug)]
pub struct ThumbnailCache<T> {
    root: PathBuf,
    freshness: Duration,
    tools: T,
}

impl<T: ImageTools + Sync> ThumbnailCache<T> {
    pub fn new(root: impl Into<PathBuf>, freshness: Duration, tools: T) -> Self {
        Self {
            root: root.into(),
            freshness,
            tools,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tools(&self) -> &T {
        &self.tools
    }

    /// Absolute file locations for the record with `key`.
    pub fn paths(&self, key: (&str, &str)) -> AssetPaths {
        let relative = asset_dir(key);
        let dir = if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        };
        AssetPaths::new(dir)
    }

    /// Whether `raw` exists and was modified less than the freshness window
    /// before `now`.
    pub fn is_fresh(&self, raw: &Path, now: SystemTime) -> bool {
        let Ok(modified) = std::fs::metadata(raw).and_then(|m| m.modified()) else {
            return false;
        };
        match now.duration_since(modified) {
            Ok(age) => age < self.freshness,
            // Modified "in the future" (clock skew): treat as brand new.
            Err(_) => true,
        }
    }

    /// Make sure the record with `key` has a fresh thumbnail, rendering
    /// `url` if needed.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn ensure(&self, key: (&str, &str), url: &str) -> Result<CacheStatus> {
        let paths = self.paths(key);

        if self.is_fresh(&paths.raw, SystemTime::now()) {
            trace!(dir = %paths.dir.display(), "thumbnail fresh");
            return Ok(CacheStatus::Fresh);
        }

        debug!(dir = %paths.dir.display(), "download");
        std::fs::create_dir_all(&paths.dir).map_err(|e| SitemapError::io(&paths.dir, e))?;

        let partial = paths.partial();
        if let Err(e) = self.render_into(url, &partial).await {
            remove_partials(&partial);
            return Err(e);
        }

        for (from, to) in [
            (&partial.thumb, &paths.thumb),
            (&partial.crop, &paths.crop),
            (&partial.raw, &paths.raw),
        ] {
            if let Err(e) = std::fs::rename(from, to) {
                remove_partials(&partial);
                return Err(SitemapError::io(to, e));
            }
        }

        Ok(CacheStatus::Rendered)
    }

    /// Boolean form of [`Self::ensure`]: `true` when a usable thumbnail exists.
    pub async fn ensure_thumbnail(&self, key: (&str, &str), url: &str) -> bool {
        match self.ensure(key, url).await {
            Ok(_) => true,
            Err(e) => {
                warn!(url, error = %e, "thumbnail generation failed");
                false
            }
        }
    }

    async fn render_into(&self, url: &str, out: &AssetPaths) -> Result<()> {
        self.tools.render(url, &out.raw).await?;
        self.tools.crop(&out.raw, &out.crop).await?;
        self.tools.thumbnail(&out.crop, &out.thumb).await
    }
}

fn remove_partials(partial: &AssetPaths) {
    for path in [&partial.raw, &partial.crop, &partial.thumb] {
        let _ = std::fs::remove_file(path);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Records every call and writes a small marker file as output.
    #[derive(Default)]
    struct RecordingTools {
        calls: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl RecordingTools {
        fn failing(step: &'static str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: Some(step),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn step(&self, name: &'static str, out: &Path) -> Result<()> {
            self.calls.lock().unwrap().push(name.to_string());
            std::fs::write(out, name).map_err(|e| SitemapError::io(out, e))?;
            if self.fail_on == Some(name) {
                return Err(SitemapError::tool(name, "exit status 1"));
            }
            Ok(())
        }
    }

    impl ImageTools for RecordingTools {
        async fn render(&self, _url: &str, raw: &Path) -> Result<()> {
            self.step("render", raw)
        }

        async fn crop(&self, _raw: &Path, crop: &Path) -> Result<()> {
            self.step("crop", crop)
        }

        async fn thumbnail(&self, _crop: &Path, thumb: &Path) -> Result<()> {
            self.step("thumbnail", thumb)
        }
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sitemap-thumbs-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn age_file(path: &Path, age: Duration) {
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    const DAY: Duration = Duration::from_secs(86_400);

    #[test]
    fn asset_dir_is_deterministic_and_contained() {
        assert_eq!(asset_dir(("", "")), "");
        assert_eq!(asset_dir(("news", "")), "news");
        assert_eq!(asset_dir(("shows", "la-voz")), "shows/la-voz");
        assert_eq!(asset_dir(("..", "etc")), "%2E%2E/etc");
        assert_eq!(asset_dir((".", "")), "%2E");
        assert_eq!(asset_dir(("a\\b", "")), "a%5Cb");
        assert_ne!(asset_dir(("a", "b")), asset_dir(("a", "c")));
    }

    #[test]
    fn slash_inside_a_component_cannot_alias_a_microsite() {
        let section = asset_dir(("shows/la-voz", ""));
        let microsite = asset_dir(("shows", "la-voz"));
        assert_eq!(section, "shows%2Fla-voz");
        assert_ne!(section, microsite);

        // Literal percent signs are escaped too, so escapes cannot be forged.
        assert_ne!(asset_dir(("shows%2Fla-voz", "")), section);
        assert_eq!(asset_dir(("100%", "")), "100%25");
    }

    #[test]
    fn reserved_names_do_not_clash_with_cache_files() {
        assert_eq!(asset_dir(("raw.png", "")), "raw%2Epng");
        assert_eq!(asset_dir(("sitemap.json", "")), "sitemap%2Ejson");
        assert_eq!(asset_dir(("shows", "thumb.png")), "shows/thumb%2Epng");
        assert_eq!(asset_dir(("shows", "crop.partial.png")), "shows/crop%2Epartial%2Epng");

        let cache = ThumbnailCache::new("/srv/assets", DAY, RecordingTools::default());
        assert_ne!(cache.paths(("raw.png", "")).dir, cache.paths(("", "")).raw);
        assert_ne!(cache.paths(("shows", "raw.png")).dir, cache.paths(("shows", "")).raw);
    }

    #[test]
    fn microsite_without_section_stays_under_root() {
        assert_eq!(asset_dir(("", "la-voz")), "%/la-voz");
        assert_ne!(asset_dir(("", "la-voz")), asset_dir(("la-voz", "")));
    }

    #[test]
    fn freshness_window_boundary_is_exclusive() {
        let root = temp_dir();
        let cache = ThumbnailCache::new(&root, DAY, RecordingTools::default());
        let raw = cache.paths(("news", "")).raw;
        std::fs::create_dir_all(raw.parent().unwrap()).unwrap();
        std::fs::write(&raw, "raw").unwrap();
        let modified = std::fs::metadata(&raw).unwrap().modified().unwrap();

        assert!(cache.is_fresh(&raw, modified));
        assert!(cache.is_fresh(&raw, modified + DAY - Duration::from_nanos(1)));
        assert!(!cache.is_fresh(&raw, modified + DAY));
        assert!(!cache.is_fresh(&raw, modified + DAY + Duration::from_secs(1)));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn missing_asset_renders_once() {
        let root = temp_dir();
        let cache = ThumbnailCache::new(&root, DAY, RecordingTools::default());

        let status = cache.ensure(("news", ""), "http://www.example.com/news").await.unwrap();
        assert_eq!(status, CacheStatus::Rendered);
        assert_eq!(cache.tools().calls(), vec!["render", "crop", "thumbnail"]);

        let paths = cache.paths(("news", ""));
        assert_eq!(std::fs::read_to_string(&paths.raw).unwrap(), "render");
        assert_eq!(std::fs::read_to_string(&paths.thumb).unwrap(), "thumbnail");
        assert!(!paths.partial().raw.exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn fresh_asset_skips_tools() {
        let root = temp_dir();
        let cache = ThumbnailCache::new(&root, DAY, RecordingTools::default());
        let paths = cache.paths(("news", ""));
        std::fs::create_dir_all(&paths.dir).unwrap();
        std::fs::write(&paths.raw, "old").unwrap();
        age_file(&paths.raw, Duration::from_secs(3_600));

        let status = cache.ensure(("news", ""), "http://www.example.com/news").await.unwrap();
        assert_eq!(status, CacheStatus::Fresh);
        assert!(cache.tools().calls().is_empty());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn stale_asset_is_rerendered() {
        let root = temp_dir();
        let cache = ThumbnailCache::new(&root, DAY, RecordingTools::default());
        let paths = cache.paths(("shows", "la-voz"));
        std::fs::create_dir_all(&paths.dir).unwrap();
        std::fs::write(&paths.raw, "old").unwrap();
        age_file(&paths.raw, DAY + Duration::from_secs(60));

        let status = cache
            .ensure(("shows", "la-voz"), "http://www.example.com/shows/la-voz")
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Rendered);
        assert_eq!(cache.tools().calls().len(), 3);
        assert_eq!(std::fs::read_to_string(&paths.raw).unwrap(), "render");
        assert!(cache.is_fresh(&paths.raw, SystemTime::now()));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn tool_failure_promotes_nothing() {
        let root = temp_dir();
        let cache = ThumbnailCache::new(&root, DAY, RecordingTools::failing("crop"));

        assert!(!cache.ensure_thumbnail(("news", ""), "http://www.example.com/news").await);
        assert_eq!(cache.tools().calls(), vec!["render", "crop"]);

        let paths = cache.paths(("news", ""));
        assert!(!paths.raw.exists());
        assert!(!paths.crop.exists());
        assert!(!paths.partial().raw.exists());
        assert!(!paths.partial().crop.exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn failed_rerender_keeps_previous_assets() {
        let root = temp_dir();
        let cache = ThumbnailCache::new(&root, DAY, RecordingTools::failing("thumbnail"));
        let paths = cache.paths(("news", ""));
        std::fs::create_dir_all(&paths.dir).unwrap();
        std::fs::write(&paths.raw, "previous").unwrap();
        age_file(&paths.raw, DAY * 2);

        assert!(cache.ensure(("news", ""), "http://www.example.com/news").await.is_err());
        assert_eq!(std::fs::read_to_string(&paths.raw).unwrap(), "previous");
        // Still stale, so the next run tries again.
        assert!(!cache.is_fresh(&paths.raw, SystemTime::now()));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn homepage_assets_live_at_root() {
        let cache = ThumbnailCache::new("/srv/assets", DAY, RecordingTools::default());
        let paths = cache.paths(("", ""));
        assert_eq!(paths.dir, PathBuf::from("/srv/assets"));
        assert_eq!(paths.thumb, PathBuf::from("/srv/assets/thumb.png"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_tools_failure_is_reported() {
        use crate::tools::CommandTools;

        let root = temp_dir();
        let tools = CommandTools::new("false", "rasterize.js", "true", Duration::from_secs(5));
        let cache = ThumbnailCache::new(&root, DAY, tools);

        assert!(!cache.ensure_thumbnail(("news", ""), "http://www.example.com/news").await);
        assert!(!cache.paths(("news", "")).raw.exists());

        let _ = std::fs::remove_dir_all(&root);
    }
}
