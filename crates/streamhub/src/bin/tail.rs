//! Tail the event stream: connect a hub and log every dispatch.
//!
//! This is the process entry point that owns hub construction; the library
//! itself never creates global state.

use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Config, Environment, File, FileFormat};
use log::{LevelFilter, info};
use serde_json::Value;

use streamhub::{HubConfig, StreamHub};
use streamhub_protocol::StreamEvent;

const APP_NAME: &str = "streamhub";

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Tail a streamhub event stream and log every dispatch."
)]
struct Cli {
    /// Override the config file path
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Override the stream endpoint URL
    #[arg(long, value_name = "URL")]
    url: Option<String>,
    /// Reduce output to only errors
    #[arg(short, long)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
    /// Output machine readable JSON logs
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let mut config = load_or_init_config(&cli)?;
    if let Some(url) = cli.url.clone() {
        config.stream_url = url;
    }

    run(config)
}

#[tokio::main]
async fn run(config: HubConfig) -> Result<()> {
    let hub = Arc::new(StreamHub::new(config));

    let _watch = hub.on_any(|event: &str, payload: &Value| {
        match StreamEvent::classify(event, payload) {
            StreamEvent::FeedNewPost { post } => info!("[{event}] new post: {post}"),
            StreamEvent::FeedPostDeleted { post_id } => {
                info!("[{event}] post deleted: {post_id}");
            }
            StreamEvent::NotifNew { notification } => {
                info!("[{event}] notification: {notification}");
            }
            StreamEvent::NotifRead { notification_id } => {
                info!("[{event}] notification read: {notification_id}");
            }
            StreamEvent::Other { event, data } => info!("[{event}] {data}"),
        }
    });

    let Some(handle) = hub.connect() else {
        anyhow::bail!("could not open event stream, see warnings above");
    };
    info!(
        "tailing {} (connection {}), press ctrl-c to stop",
        handle.url(),
        handle.id()
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    hub.close();
    Ok(())
}

fn init_logging(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    if cli.quiet {
        log::set_max_level(LevelFilter::Off);
        return;
    }

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("streamhub={level}")));

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(io::stderr().is_terminal())
                    .with_target(false),
            )
            .try_init()
            .ok();
    }

    // Also init env_logger for the log-crate macros the library uses
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init()
        .ok();
}

fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("could not determine config directory")?;
    Ok(base.join(APP_NAME).join("config.toml"))
}

fn load_or_init_config(cli: &Cli) -> Result<HubConfig> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };

    if !path.exists() {
        write_default_config(&path)?;
    }

    let built = Config::builder()
        .add_source(
            File::from(path.clone())
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(Environment::with_prefix("STREAMHUB").separator("__"))
        .build()
        .context("loading configuration")?;

    built
        .try_deserialize::<HubConfig>()
        .with_context(|| format!("parsing configuration at {}", path.display()))
}

fn write_default_config(path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }
    let rendered =
        toml::to_string_pretty(&HubConfig::default()).context("rendering default config")?;
    fs::write(path, rendered)
        .with_context(|| format!("writing default config to {}", path.display()))?;
    info!("wrote default config to {}", path.display());
    Ok(())
}
