use chatcop::{Delivery, Monitor, Settings};
use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Watch a game chat log and print lines matching the given filters.
#[derive(Parser)]
#[command(name = "chatcop", version)]
struct Cli {
    /// Chat log to watch (overrides `log_file` from the config)
    #[arg(value_name = "LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Case-insensitive regex filter; repeat for more
    #[arg(short, long = "filter", value_name = "PATTERN")]
    filters: Vec<String>,

    /// Settings file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Poll interval in milliseconds
    #[arg(long, value_name = "MS")]
    poll_ms: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let directive = if cli.verbose { "chatcop=debug" } else { "chatcop=info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    if let Err(e) = run(cli).await {
        error!("{e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> chatcop::Result<()> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    if let Some(ms) = cli.poll_ms {
        settings.watch.poll_interval = Duration::from_millis(ms);
    }
    settings.filters.extend(cli.filters);

    let Some(log_file) = cli.log_file.or(settings.log_file) else {
        eprintln!("Usage: chatcop <LOG_FILE> [-f PATTERN]... (or set log_file in --config)");
        process::exit(2);
    };

    let mut monitor = Monitor::with_config(settings.watch);
    for pattern in &settings.filters {
        monitor.add_filter(pattern)?;
    }
    if monitor.list_filters().is_empty() {
        warn!("no filters given; nothing will be printed");
    }

    let mut deliveries = monitor.subscribe();
    monitor.watch(&log_file).await?;
    println!("Watching file: {}", log_file.display());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            delivery = deliveries.next() => match delivery {
                Some(Delivery::Line(line)) => println!("[{}] {}", line.matched_filter, line.event),
                Some(Delivery::Error(e)) => warn!("{e}"),
                None => break,
            },
        }
    }

    monitor.unwatch().await;
    Ok(())
}
