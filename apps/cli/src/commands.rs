//! CLI definition, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use sitemap_core::{ProgressReporter, RunSummary, generate};
use sitemap_shared::config::CONFIG_FILE_NAME;
use sitemap_shared::{AppConfig, ResolvedPage, SitemapConfig, config_dir, init_config, load_config_from};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Build a sitemap manifest and page thumbnails from the publisher feeds.
#[derive(Parser, Debug)]
#[command(
    name = "sitemap-generator",
    version,
    about = "Merge the publisher taxonomy feeds into sitemap.json and keep page thumbnails fresh.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Silence all log output and progress.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Config file (defaults to ./sitemap.toml, then ~/.sitemap-generator/sitemap.toml).
    #[arg(short, long, env = "SITEMAP_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Thumbnail freshness window in seconds.
    #[arg(short, long, global = true)]
    pub frequency: Option<u64>,

    /// HTTP User-Agent header.
    #[arg(short = 'a', long = "useragent", global = true)]
    pub user_agent: Option<String>,

    /// Assets directory (thumbnails and sitemap.json).
    #[arg(long, global = true)]
    pub assets: Option<PathBuf>,

    /// Runs the generator when omitted.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Fetch feeds, resolve pages, refresh thumbnails, write sitemap.json.
    Generate,

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Write a config file with defaults.
    Init,
    /// Show the resolved configuration, flags applied.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "off",
        (false, 0) => "sitemap=info",
        (false, 1) => "sitemap=debug",
        (false, _) => "sitemap=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        None | Some(Command::Generate) => cmd_generate(&cli).await,
        Some(Command::Config { ref action }) => match action {
            ConfigAction::Init => cmd_config_init(&cli),
            ConfigAction::Show => cmd_config_show(&cli),
        },
    }
}

/// `--config` if given, else `./sitemap.toml`, else the per-user file when it
/// exists.
fn config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }

    match config_dir() {
        Ok(dir) if dir.join(CONFIG_FILE_NAME).exists() => dir.join(CONFIG_FILE_NAME),
        _ => local,
    }
}

/// Load the config file and apply flag overrides.
fn load_app_config(cli: &Cli) -> Result<AppConfig> {
    let path = config_path(cli.config.as_deref());
    info!(path = %path.display(), "loading config");

    let mut config = load_config_from(&path)?;
    apply_overrides(&mut config, cli);
    Ok(config)
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(frequency) = cli.frequency {
        config.thumbnails.freshness_secs = frequency;
    }
    if let Some(user_agent) = &cli.user_agent {
        config.http.user_agent = user_agent.clone();
    }
    if let Some(assets) = &cli.assets {
        config.path.assets = assets.to_string_lossy().into_owned();
    }
}

async fn cmd_generate(cli: &Cli) -> Result<()> {
    let app = load_app_config(cli)?;
    // Validation happens here, before any request goes out.
    let config = SitemapConfig::try_from(&app)?;

    let progress = CliProgress::new(cli.quiet);
    let summary = generate(&config, &progress).await?;

    if !cli.quiet {
        println!(
            "{} records: {} ok, {} errors, {} redirected",
            summary.records, summary.ok, summary.errors, summary.redirected
        );
        println!(
            "{} thumbnails rendered, {} reused ({:.1?})",
            summary.rendered, summary.fresh, summary.elapsed
        );
        match &summary.manifest {
            Some(path) => println!("Manifest written to {}", path.display()),
            None => println!("No entries, manifest not written"),
        }
    }

    Ok(())
}

fn cmd_config_init(cli: &Cli) -> Result<()> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
    let path = init_config(&path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(cli: &Cli) -> Result<()> {
    let config = load_app_config(cli)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner that follows the run record by record.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new(quiet: bool) -> Self {
        if quiet {
            return Self {
                spinner: ProgressBar::hidden(),
            };
        }

        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .map(|s| s.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]))
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn record_started(&self, path: &str, current: usize, total: usize) {
        let path = if path.is_empty() { "/" } else { path };
        self.spinner
            .set_message(format!("Resolving [{current}/{total}] {path}"));
    }

    fn record_finished(&self, page: &ResolvedPage) {
        if let Some(error) = &page.error {
            self.spinner
                .println(format!("  ✗ {} ({error})", page.resolved_url));
        }
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_generate() {
        let cli = Cli::try_parse_from(["sitemap-generator", "-vv"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn flags_override_file_values() {
        let cli = Cli::try_parse_from([
            "sitemap-generator",
            "-f",
            "3600",
            "-a",
            "TestBot/1.0",
            "--assets",
            "/srv/assets",
        ])
        .unwrap();

        let mut config = AppConfig::default();
        apply_overrides(&mut config, &cli);

        assert_eq!(config.thumbnails.freshness_secs, 3600);
        assert_eq!(config.http.user_agent, "TestBot/1.0");
        assert_eq!(config.path.assets, "/srv/assets");
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["sitemap-generator", "-q", "-v"]).is_err());
    }

    #[test]
    fn explicit_config_path_wins() {
        assert_eq!(
            config_path(Some(Path::new("/etc/sitemap/prod.toml"))),
            PathBuf::from("/etc/sitemap/prod.toml")
        );
    }

    #[test]
    fn config_subcommands_parse() {
        let cli = Cli::try_parse_from(["sitemap-generator", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Config {
                action: ConfigAction::Show
            })
        ));
    }
}
