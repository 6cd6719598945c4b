mod logging;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use feedscout_core::collect::{group_by_entity, LinkCollector, LinkPair};
use feedscout_core::config::{Credentials, ScoutConfig};
use feedscout_core::driver::fetch::{FetchConfig, Fetcher};
use feedscout_core::driver::{Driver, StaticDriver};
use feedscout_core::error::DriverError;
use feedscout_core::events::{Event, EventSink, TracingSink};
use feedscout_core::harvest::{harvest, harvest_parallel, HarvestContext};
use feedscout_core::sink::{write_records_file, SnapshotDir};
use logging::LogSettings;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

/// Looked up in the working directory when `--config` is not given.
const DEFAULT_CONFIG: &str = "feedscout.toml";

#[derive(Parser)]
#[command(
    name = "feedscout",
    version,
    about = "Collect links from a scrolling feed and harvest details for every channel"
)]
struct Cli {
    /// TOML configuration file
    #[arg(long, short, global = true, env = "FEEDSCOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Log file, rotated by size
    #[arg(long, global = true, default_value = "feedscout.log")]
    log_file: PathBuf,

    /// Rotate the log file past this many bytes
    #[arg(long, global = true, default_value_t = logging::DEFAULT_MAX_BYTES)]
    log_max_bytes: u64,

    /// Rotated log files to keep
    #[arg(long, global = true, default_value_t = logging::DEFAULT_BACKUPS)]
    log_backups: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect the listing, harvest every channel and write the CSV
    Run {
        #[command(flatten)]
        session: SessionArgs,

        /// CSV output path
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Directory for failure screenshots
        #[arg(long)]
        snapshots: Option<PathBuf>,

        /// Parallel browser sessions for the harvest phase
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Only collect the listing and print the link pairs
    Collect {
        #[command(flatten)]
        session: SessionArgs,

        /// Output as JSON instead of one pair per line
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct SessionArgs {
    /// Listing URL, overrides `listing.url`
    #[arg(long)]
    url: Option<String>,

    /// Page driver
    #[arg(long, value_enum, default_value_t = DriverKind::default())]
    driver: DriverKind,

    /// Show the browser window
    #[arg(long)]
    headful: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DriverKind {
    /// Real Chromium session
    Chrome,
    /// Plain HTTP fetches, no scripts
    Http,
}

impl Default for DriverKind {
    fn default() -> Self {
        if cfg!(feature = "chrome") {
            DriverKind::Chrome
        } else {
            DriverKind::Http
        }
    }
}

fn main() -> ExitCode {
    // a missing .env is fine
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let _guard = match logging::init(&LogSettings {
        path: cli.log_file.clone(),
        max_bytes: cli.log_max_bytes,
        backups: cli.log_backups,
        default_filter: "info".to_string(),
    }) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            session,
            output,
            snapshots,
            workers,
        } => {
            session.apply(&mut config);
            if let Some(path) = output {
                config.output.csv_path = path;
            }
            if let Some(dir) = snapshots {
                config.output.snapshot_dir = dir;
            }
            if let Some(workers) = workers {
                config.harvest.workers = workers;
            }
            config.validate()?;
            run(&config, session.driver)
        }
        Commands::Collect { session, json } => {
            session.apply(&mut config);
            config.validate()?;
            let pairs = collect(&config, session.driver)?;
            print_pairs(&pairs, json)
        }
    }
}

impl SessionArgs {
    fn apply(&self, config: &mut ScoutConfig) {
        if let Some(url) = &self.url {
            config.listing.url = Some(url.clone());
        }
        if self.headful {
            config.browser.headless = false;
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ScoutConfig> {
    match path {
        Some(path) => Ok(ScoutConfig::load(path)?),
        None if Path::new(DEFAULT_CONFIG).exists() => Ok(ScoutConfig::load(Path::new(DEFAULT_CONFIG))?),
        None => Ok(ScoutConfig::from_toml_str("")?),
    }
}

fn listing_url(config: &ScoutConfig) -> Result<&str> {
    match config.listing.url.as_deref() {
        Some(url) => Ok(url),
        None => bail!("no listing URL: pass --url or set listing.url"),
    }
}

fn open_driver(kind: DriverKind, config: &ScoutConfig) -> Result<Box<dyn Driver>, DriverError> {
    match kind {
        DriverKind::Http => {
            let fetcher = Fetcher::new(FetchConfig {
                timeout_secs: config.browser.page_load_timeout.as_secs().max(1),
                ..FetchConfig::default()
            })?;
            Ok(Box::new(
                StaticDriver::new()
                    .with_viewport(config.browser.window_width, config.browser.window_height)
                    .with_fetcher(fetcher),
            ))
        }
        #[cfg(feature = "chrome")]
        DriverKind::Chrome => Ok(Box::new(feedscout_core::driver::ChromeDriver::launch(
            &config.browser,
        )?)),
        #[cfg(not(feature = "chrome"))]
        DriverKind::Chrome => Err(DriverError::Unsupported("chrome (built without the `chrome` feature)")),
    }
}

/// Phase one on its own session, closed before harvesting starts.
fn collect(config: &ScoutConfig, kind: DriverKind) -> Result<Vec<LinkPair>> {
    let url = listing_url(config)?;
    let mut driver = open_driver(kind, config).context("cannot open listing session")?;
    let collector = LinkCollector::new(&config.listing, &config.locators, &config.timeouts, &TracingSink);
    let pairs = collector
        .collect(&mut *driver, url)
        .with_context(|| format!("collecting links from {url}"))?;
    Ok(pairs)
}

fn run(config: &ScoutConfig, kind: DriverKind) -> Result<()> {
    let pairs = collect(config, kind)?;
    let groups = group_by_entity(&pairs);
    info!("{} channels to visit", groups.len());

    let credentials = Credentials::from_env();
    if credentials.is_none() {
        info!("No sign-in credentials configured; credential entry will be skipped");
    }

    let snapshots = SnapshotDir::new(&config.output.snapshot_dir);
    let ctx = HarvestContext::new(config, credentials.as_ref(), &TracingSink, &snapshots);

    let report = if config.harvest.workers > 1 {
        let factory = || open_driver(kind, config);
        harvest_parallel(&factory, &groups, config.harvest.workers, ctx)
    } else {
        let driver = open_driver(kind, config).context("cannot open harvest session")?;
        harvest(driver, &groups, ctx)
    };

    let path = &config.output.csv_path;
    let rows = write_records_file(path, &config.header(), &report.records)
        .with_context(|| format!("writing {}", path.display()))?;
    TracingSink.emit(Event::RecordsWritten {
        path: path.display().to_string(),
        rows,
    });
    Ok(())
}

fn print_pairs(pairs: &[LinkPair], as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(pairs)?);
    } else {
        for pair in pairs {
            println!("{}\t{}", pair.secondary_url, pair.primary_url);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_config() {
        let cli = Cli::parse_from([
            "feedscout",
            "run",
            "--url",
            "https://www.youtube.com/results?search_query=azure",
            "--driver",
            "http",
            "--headful",
            "--workers",
            "3",
        ]);
        let Commands::Run {
            session, workers, ..
        } = cli.command
        else {
            panic!("expected run");
        };
        let mut config = ScoutConfig::default();
        session.apply(&mut config);
        assert_eq!(session.driver, DriverKind::Http);
        assert_eq!(workers, Some(3));
        assert!(!config.browser.headless);
        assert_eq!(
            config.listing.url.as_deref(),
            Some("https://www.youtube.com/results?search_query=azure")
        );
    }

    #[test]
    fn missing_listing_url_is_an_error() {
        let config = ScoutConfig::default();
        assert!(listing_url(&config).is_err());
    }

    #[test]
    fn explicit_config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scout.toml");
        std::fs::write(&path, "[output]\ncsv_path = \"out/channels.csv\"\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.output.csv_path, PathBuf::from("out/channels.csv"));
        assert_eq!(config.fields.len(), 5);
    }
}
