//! pubwatch CLI
//!
//! Collects new content identifiers from notification endpoints and writes
//! CSV to stdout in the form `<time>,<source>,<id>,<status>`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use pubwatch::{
    error::Result,
    models::Config,
    pipeline::{Poller, StdinSource},
    services::{CachingFetcher, EventSink},
    utils::creds,
};

/// pubwatch - content publication latency collector
#[derive(Parser, Debug)]
#[command(
    name = "pubwatch",
    version,
    about = "Collects new content identifiers and measures delivery latency"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "pubwatch.toml")]
    config: PathBuf,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    debug: Option<String>,

    #[command(subcommand)]
    command: Command,
}

/// Probe flags shared by both identifier sources.
#[derive(Args, Debug)]
struct ProbeArgs {
    /// Investigate delivery endpoints for each new identifier
    #[arg(short = 'a', long)]
    articles: bool,

    /// Record every article probe attempt in the CSV (implies -a)
    #[arg(short = 'A', long)]
    article_stats: bool,

    /// API key (default: ~/.ft_api_key)
    #[arg(short, long)]
    key: Option<String>,

    /// Session cookie (default: ~/.ft_cookie)
    #[arg(short, long)]
    cookie: Option<String>,

    /// Cache directory for responses
    #[arg(short = 'C', long)]
    cache: Option<PathBuf>,

    /// Exponential backoff growth factor
    #[arg(short = 'b', long)]
    backoff_rate: Option<f64>,

    /// Maximum ms to wait before a probe's first attempt
    #[arg(short = 'w', long)]
    initial_wait: Option<u64>,

    /// Emit a terminal event when a probe gives up
    #[arg(long)]
    report_abandoned: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll notification endpoints for new identifiers
    Poll {
        /// Endpoints to poll (default: all configured)
        apis: Vec<String>,

        /// Seconds to sleep between cycles
        #[arg(short, long)]
        poll_interval: Option<u64>,

        /// Seconds before now to request notifications for
        #[arg(short, long)]
        since: Option<u64>,

        /// How many times to poll (default: forever)
        #[arg(short = 'n', long)]
        repeat: Option<u32>,

        #[command(flatten)]
        probe: ProbeArgs,
    },

    /// Read identifiers from standard input instead of polling
    Stdin {
        /// Investigate notification feeds for each identifier
        #[arg(short = 'f', long)]
        feeds: bool,

        /// Record every feed probe attempt in the CSV (implies -f)
        #[arg(short = 'F', long)]
        feed_stats: bool,

        /// Seconds before now for feed lookback
        #[arg(short, long)]
        since: Option<u64>,

        #[command(flatten)]
        probe: ProbeArgs,
    },

    /// Validate the configuration file
    Validate,
}

/// Fold CLI flags into the loaded configuration.
fn apply_overrides(config: &mut Config, command: &Command) {
    match command {
        Command::Poll {
            apis,
            poll_interval,
            since,
            repeat,
            probe,
        } => {
            if !apis.is_empty() {
                config.poller.endpoints = apis.clone();
            }
            if let Some(v) = poll_interval {
                config.poller.poll_interval_secs = *v;
            }
            if let Some(v) = since {
                config.poller.since_secs = Some(*v);
            }
            if let Some(v) = repeat {
                config.poller.repeat = Some(*v);
            }
            apply_probe_overrides(config, probe);
        }
        Command::Stdin {
            feeds,
            feed_stats,
            since,
            probe,
        } => {
            if *feeds {
                config.probe.feeds = true;
            }
            if *feed_stats {
                config.probe.feed_stats = true;
            }
            if let Some(v) = since {
                config.poller.since_secs = Some(*v);
            }
            apply_probe_overrides(config, probe);
        }
        Command::Validate => {}
    }
}

fn apply_probe_overrides(config: &mut Config, probe: &ProbeArgs) {
    if probe.articles {
        config.probe.articles = true;
    }
    if probe.article_stats {
        config.probe.article_stats = true;
    }
    if probe.report_abandoned {
        config.probe.report_abandoned = true;
    }
    if let Some(v) = &probe.key {
        config.credentials.key = Some(v.clone());
    }
    if let Some(v) = &probe.cookie {
        config.credentials.cookie = Some(v.clone());
    }
    if let Some(v) = &probe.cache {
        config.fetcher.cache_dir = Some(v.clone());
    }
    if let Some(v) = probe.backoff_rate {
        config.probe.growth_rate = v;
    }
    if let Some(v) = probe.initial_wait {
        config.probe.initial_wait_ms = v;
    }
}

/// Initialize logging from the CLI flag or the configured level.
fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config);
    let level = cli
        .debug
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    init_logging(&level);

    apply_overrides(&mut config, &cli.command);
    config.validate()?;

    if matches!(cli.command, Command::Validate) {
        log::info!(
            "Configuration OK ({} notification, {} delivery endpoints)",
            config.endpoints.notifications.len(),
            config.endpoints.deliveries.len()
        );
        println!("Configuration OK");
        return Ok(());
    }

    let credentials = creds::resolve(&config.credentials);
    log::info!(
        "Credentials: key {}, cookie {}",
        if credentials.key.is_some() { "present" } else { "absent" },
        if credentials.cookie.is_some() { "present" } else { "absent" },
    );

    let registry = Arc::new(config.endpoints.clone());
    let fetcher = Arc::new(CachingFetcher::new(&config.fetcher, credentials)?);
    let config = Arc::new(config);
    let (sink, writer) = EventSink::stdout();

    let outcome = match cli.command {
        Command::Poll { .. } => {
            let mut poller = Poller::new(
                Arc::clone(&registry),
                Arc::clone(&config),
                Arc::clone(&fetcher),
                sink.clone(),
            );
            poller.run().await
        }
        Command::Stdin { .. } => {
            let mut source = StdinSource::new(
                Arc::clone(&registry),
                Arc::clone(&config),
                Arc::clone(&fetcher),
                sink.clone(),
            );
            source.run().await
        }
        Command::Validate => unreachable!("handled above"),
    };

    // Let queued events drain; probes still in flight are abandoned at exit,
    // matching the best-effort contract.
    drop(sink);
    let _ = tokio::time::timeout(Duration::from_secs(1), writer).await;

    outcome
}
