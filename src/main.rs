use anyhow::Context;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;

use rss_reader::app::{self, Request, UnhandledError};
use rss_reader::config::Config;
use rss_reader::feed::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "rss_reader",
    version,
    about = "Command-line RSS reader: prints feed metadata as text or JSON"
)]
struct Args {
    /// RSS URL
    source: String,

    /// Print result as JSON in stdout
    #[arg(long)]
    json: bool,

    /// Limit news topics if this parameter provided
    #[arg(long, allow_negative_numbers = true)]
    limit: Option<i64>,

    /// Config file (defaults to ~/.config/rss-reader/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), UnhandledError> {
    // Logs go to stderr so stdout carries only feed output
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    let request = Request {
        source: args.source,
        format: OutputFormat::from_json_flag(args.json),
        limit: args.limit,
    };

    let lines = app::run(&config, &request).await?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", lines.join("\n"))
        .context("Failed to write output")
        .map_err(UnhandledError::from)?;

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config, UnhandledError> {
    let path = match path.map(PathBuf::from).or_else(Config::default_path) {
        Some(path) => path,
        None => {
            tracing::debug!("HOME not set, using default configuration");
            return Ok(Config::default());
        }
    };

    let config = Config::load(&path)
        .with_context(|| format!("Failed to load config: {}", path.display()))?;
    Ok(config)
}
