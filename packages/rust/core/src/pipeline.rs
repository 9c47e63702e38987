//! End-to-end run: feeds → merge → resolve + thumbnail → `sitemap.json`.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};
use uuid::Uuid;

use sitemap_resolver::{Resolution, Resolver};
use sitemap_shared::http::{mainsite_feed_client, publisher_client};
use sitemap_shared::{CanonicalRecord, ResolvedPage, Result, SitemapConfig};
use sitemap_taxonomy::{SectionLookup, fetch_category_feed, fetch_showconfig_feed, merge};
use sitemap_thumbnails::{CacheStatus, CommandTools, ImageTools, ThumbnailCache};

use crate::manifest;

/// Outcome of one run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Canonical records processed, homepage included.
    pub records: usize,
    pub ok: usize,
    pub errors: usize,
    pub redirected: usize,
    /// Thumbnails produced by the render tools this run.
    pub rendered: usize,
    /// Thumbnails reused from the cache.
    pub fresh: usize,
    /// `None` when there was nothing to write.
    pub manifest: Option<PathBuf>,
    pub elapsed: Duration,
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a record is resolved.
    fn record_started(&self, path: &str, current: usize, total: usize);
    /// Called once a record has its final outcome.
    fn record_finished(&self, page: &ResolvedPage);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn record_started(&self, _path: &str, _current: usize, _total: usize) {}
    fn record_finished(&self, _page: &ResolvedPage) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// Run the generator with the configured external render/transform tools.
pub async fn generate(
    config: &SitemapConfig,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    generate_with(config, CommandTools::from_config(config), progress).await
}

/// Run the generator with an arbitrary [`ImageTools`] implementation.
///
/// 1. Fetch both feeds (a failing feed contributes nothing)
/// 2. Merge and sort into canonical records
/// 3. Resolve each record in order, rendering thumbnails as needed
/// 4. Write `sitemap.json`
///
/// Per-record failures become error entries. Only client construction and
/// manifest I/O can fail the run.
pub async fn generate_with<T: ImageTools + Sync>(
    config: &SitemapConfig,
    tools: T,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    run(config, tools, progress, Uuid::now_v7()).await
}

#[instrument(skip_all, fields(run_id = %run_id))]
async fn run<T: ImageTools + Sync>(
    config: &SitemapConfig,
    tools: T,
    progress: &dyn ProgressReporter,
    run_id: Uuid,
) -> Result<RunSummary> {
    let start = Instant::now();
    info!(
        publisher = %config.publisher.base,
        mainsite = %config.mainsite.base,
        assets = %config.assets_dir.display(),
        "starting run"
    );

    // --- Phase 1: Feeds + merge ---
    progress.phase("Fetching feeds");
    let records = collect_records(config).await?;

    // --- Phase 2: Resolve + thumbnails ---
    progress.phase("Resolving pages");
    let resolver = Resolver::from_config(config)?;
    let cache = ThumbnailCache::new(&config.assets_dir, config.freshness, tools);

    let total = records.len();
    let mut pages = Vec::with_capacity(total);
    let (mut rendered, mut fresh) = (0usize, 0usize);

    for (i, record) in records.into_iter().enumerate() {
        progress.record_started(&record.path(), i + 1, total);

        let Resolution { page, cache: status } = resolver.resolve(record, &cache).await;
        match status {
            Some(CacheStatus::Rendered) => rendered += 1,
            Some(CacheStatus::Fresh) => fresh += 1,
            None => {}
        }

        progress.record_finished(&page);
        pages.push(page);
    }

    // --- Phase 3: Manifest ---
    progress.phase("Writing manifest");
    let entries = manifest::build(&pages);
    let manifest_path = config.manifest_path();
    let written = manifest::write(&manifest_path, &entries)?;

    let errors = pages.iter().filter(|p| p.is_error()).count();
    let summary = RunSummary {
        run_id,
        records: pages.len(),
        ok: pages.len() - errors,
        errors,
        redirected: pages.iter().filter(|p| p.redirected).count(),
        rendered,
        fresh,
        manifest: written.then_some(manifest_path),
        elapsed: start.elapsed(),
    };

    info!(
        records = summary.records,
        errors = summary.errors,
        images = summary.rendered,
        cached = summary.fresh,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "run complete"
    );

    progress.done(&summary);
    Ok(summary)
}

/// Fetch both feeds and merge them into records sorted by
/// `(section, microsite)`.
///
/// A feed that fails is logged and treated as empty; the homepage record is
/// always present.
pub async fn collect_records(config: &SitemapConfig) -> Result<Vec<CanonicalRecord>> {
    let mut lookup = SectionLookup::new(publisher_client(config)?, config.publisher.base.clone());
    let category = fetch_category_feed(&mut lookup).await.unwrap_or_else(|e| {
        warn!(error = %e, "publisher feed failed, continuing without it");
        Vec::new()
    });

    let feed_client = mainsite_feed_client(config)?;
    let showconfig = fetch_showconfig_feed(&feed_client, &config.mainsite.base)
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "showconfig feed failed, continuing without it");
            Vec::new()
        });

    let mut records = merge(category, showconfig);
    records.sort_by(|a, b| a.key().cmp(&b.key()));
    Ok(records)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use std::collections::HashSet;

    use sitemap_shared::{EntryKind, Endpoint, SitemapError, Source, TaxonomyEntry};
    use sitemap_thumbnails::asset_dir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    /// Writes placeholder images instead of running external tools.
    #[derive(Default)]
    struct FakeTools;

    impl ImageTools for FakeTools {
        async fn render(&self, _url: &str, raw: &Path) -> Result<()> {
            std::fs::write(raw, b"raw").map_err(|e| SitemapError::io(raw, e))
        }

        async fn crop(&self, _raw: &Path, crop: &Path) -> Result<()> {
            std::fs::write(crop, b"crop").map_err(|e| SitemapError::io(crop, e))
        }

        async fn thumbnail(&self, _crop: &Path, thumb: &Path) -> Result<()> {
            std::fs::write(thumb, b"thumb").map_err(|e| SitemapError::io(thumb, e))
        }
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("sitemap-pipeline-test-{}", uuid::Uuid::now_v7()))
    }

    fn config(server: &MockServer, assets: &Path) -> SitemapConfig {
        let endpoint = Endpoint {
            base: server.uri(),
            proxy: None,
        };
        SitemapConfig {
            publisher: endpoint.clone(),
            mainsite: endpoint,
            render_bin: "phantomjs".into(),
            render_script: "rasterize.js".into(),
            transform_bin: "convert".into(),
            assets_dir: assets.to_path_buf(),
            freshness: Duration::from_secs(86_400),
            user_agent: "sitemap-generator-test".into(),
            request_timeout: Duration::from_secs(5),
            tool_timeout: Duration::from_secs(5),
            max_redirects: 5,
        }
    }

    async fn mount_get(server: &MockServer, route: &str, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    async fn mount_head(server: &MockServer, route: &str, status: u16) {
        Mock::given(method("HEAD"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .mount(server)
            .await;
    }

    /// Publisher knows section "news" (title "News"); showconfig lists the
    /// same path as a hub with a different title.
    async fn news_site() -> MockServer {
        let server = MockServer::start().await;

        mount_get(
            &server,
            "/services/listCategoryItems",
            200,
            r#"<CategoryItemList><categoryItem>
                <categoryItemName>Noticias</categoryItemName>
                <categoryName>News</categoryName>
                <isActive>true</isActive>
            </categoryItem></CategoryItemList>"#,
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/services/findPage"))
            .and(query_param("categoryItem", "news"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<Page><categoryItem><path>news</path><name>News</name></categoryItem></Page>",
            ))
            .mount(&server)
            .await;
        mount_get(
            &server,
            "/config/showconfig/showconfig.xml",
            200,
            r#"<shows><show isHub="true">
                <fullShowName>Noticias Telemundo</fullShowName>
                <urlFriendlyShowName>news</urlFriendlyShowName>
                <categoryItemName>noticias</categoryItemName>
            </show></shows>"#,
        )
        .await;

        mount_head(&server, "/", 200).await;
        mount_head(&server, "/news", 200).await;
        mount_get(&server, "/", 200, "<html><head><title>Home</title></head></html>").await;
        mount_get(
            &server,
            "/news",
            200,
            r#"<html><head><title>News</title><meta name="description" content="Headlines"></head></html>"#,
        )
        .await;

        server
    }

    fn read_manifest(path: &Path) -> Vec<serde_json::Value> {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn news_scenario_end_to_end() {
        let server = news_site().await;
        let assets = temp_dir();
        let config = config(&server, &assets);

        let summary = generate_with(&config, FakeTools::default(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary.records, 2);
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.rendered, 2);
        assert_eq!(summary.manifest.as_deref(), Some(config.manifest_path().as_path()));

        let entries = read_manifest(&config.manifest_path());
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0]["title"], "Homepage");
        assert_eq!(entries[0]["url"], "");

        let news = &entries[1];
        assert_eq!(news["title"], "News");
        assert_eq!(news["section"], "news");
        assert_eq!(news["source"], "publisher");
        assert_eq!(news["template"], "home");
        assert_eq!(news["images"], "news");
        assert_eq!(news["redir"], false);
        assert_eq!(news["error"], false);
        assert_eq!(news["metadata"]["description"], "Headlines");

        assert!(assets.join("news").join("thumb.png").exists());
        assert!(assets.join("thumb.png").exists());

        let _ = std::fs::remove_dir_all(&assets);
    }

    #[tokio::test]
    async fn second_run_reuses_fresh_thumbnails() {
        let server = news_site().await;
        let assets = temp_dir();
        let config = config(&server, &assets);

        generate_with(&config, FakeTools::default(), &SilentProgress)
            .await
            .unwrap();

        let tools = FakeTools::default();
        let summary = generate_with(&config, tools, &SilentProgress).await.unwrap();
        assert_eq!(summary.rendered, 0);
        assert_eq!(summary.fresh, 2);

        let _ = std::fs::remove_dir_all(&assets);
    }

    #[tokio::test]
    async fn failed_publisher_feed_falls_back_to_showconfig() {
        let server = MockServer::start().await;
        mount_get(&server, "/services/listCategoryItems", 500, "").await;
        mount_get(
            &server,
            "/config/showconfig/showconfig.xml",
            200,
            r#"<shows><show isHub="true">
                <fullShowName>Noticias Telemundo</fullShowName>
                <urlFriendlyShowName>news</urlFriendlyShowName>
                <categoryItemName>noticias</categoryItemName>
            </show></shows>"#,
        )
        .await;

        let assets = temp_dir();
        let records = collect_records(&config(&server, &assets)).await.unwrap();

        assert_eq!(records.len(), 2);
        assert!(records[0].is_homepage());
        assert_eq!(records[1].title, "Noticias Telemundo");
        assert_eq!(records[1].source, Some(Source::ShowConfig));
    }

    fn entry(name: &str, segment: &str, section: Option<&str>, source: Source) -> TaxonomyEntry {
        TaxonomyEntry {
            name: name.into(),
            category_key: name.to_lowercase(),
            url_segment: segment.into(),
            section: section.map(str::to_string),
            template: None,
            kind: if section.is_some() {
                EntryKind::Microsite
            } else {
                EntryKind::Section
            },
            is_hub: section.is_none() && source == Source::ShowConfig,
            source,
        }
    }

    #[test]
    fn merged_records_never_share_an_asset_dir() {
        let category = vec![
            entry("Shows", "shows", None, Source::Publisher),
            entry("La Voz", "la-voz", Some("shows"), Source::Publisher),
        ];
        // A hub whose path looks like the microsite's joined path.
        let showconfig = vec![
            entry("La Voz Hub", "Shows/La-Voz", None, Source::ShowConfig),
            entry("Raw", "raw.png", None, Source::ShowConfig),
        ];

        let records = merge(category, showconfig);
        assert_eq!(records.len(), 5);

        let dirs: HashSet<String> = records.iter().map(|r| asset_dir(r.key())).collect();
        assert_eq!(dirs.len(), records.len());
        assert!(dirs.contains("shows/la-voz"));
        assert!(dirs.contains("shows%2Fla-voz"));
        assert!(dirs.contains("raw%2Epng"));
    }

    #[tokio::test]
    async fn both_feeds_down_still_yields_homepage() {
        let server = MockServer::start().await;
        mount_get(&server, "/services/listCategoryItems", 503, "").await;
        mount_get(&server, "/config/showconfig/showconfig.xml", 404, "").await;

        let assets = temp_dir();
        let records = collect_records(&config(&server, &assets)).await.unwrap();
        assert_eq!(records, vec![CanonicalRecord::homepage()]);
    }

    #[tokio::test]
    async fn missing_page_becomes_error_entry() {
        let server = MockServer::start().await;
        mount_get(&server, "/services/listCategoryItems", 500, "").await;
        mount_get(
            &server,
            "/config/showconfig/showconfig.xml",
            200,
            r#"<shows><show isHub="true">
                <fullShowName>Gone</fullShowName>
                <urlFriendlyShowName>gone</urlFriendlyShowName>
                <categoryItemName>gone</categoryItemName>
            </show></shows>"#,
        )
        .await;
        mount_head(&server, "/", 200).await;
        mount_head(&server, "/gone", 404).await;
        mount_get(&server, "/", 200, "<html></html>").await;

        let assets = temp_dir();
        let config = config(&server, &assets);
        let tools = FakeTools::default();
        let summary = generate_with(&config, tools, &SilentProgress).await.unwrap();

        assert_eq!(summary.records, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.rendered, 1);

        let entries = read_manifest(&config.manifest_path());
        let gone = &entries[1];
        assert_eq!(gone["error"], 404);
        assert_eq!(gone["images"], sitemap_shared::PLACEHOLDER_THUMBNAIL);
        assert!(gone["template"].is_null());
        assert!(!assets.join("gone").exists());

        let _ = std::fs::remove_dir_all(&assets);
    }
}
