use std::{
    io,
    path::{Path, PathBuf},
    process,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::{Context, Result};
use clap::Parser;
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{error, info};

use gpw_monitor::{
    app::{run_app, App},
    config::Settings,
    error::MonitorError,
    input::InputReader,
    quote::{QuoteFetcher, YahooProvider},
    watchlist::WatchList,
};

/// Live GPW quotes with profit/loss tracking.
#[derive(Parser, Debug)]
#[command(name = "gpw-monitor", version, about)]
struct Cli {
    /// Watch-list file, one `SYMBOL[,PURCHASE_PRICE]` per line
    stocks_file: PathBuf,

    /// Settings file (default: ./config.ini, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds between refreshes
    #[arg(long)]
    refresh_interval: Option<u64>,

    /// Samples kept per symbol
    #[arg(long)]
    max_history: Option<usize>,

    /// Directory for the rolling log file
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn default_log_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("gpw-monitor"))
        .unwrap_or_else(|| PathBuf::from("var"))
}

fn init_logging(log_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    if !log_dir.exists() {
        let _ = std::fs::create_dir_all(log_dir);
    }

    let file_appender = tracing_appender::rolling::daily(log_dir, "gpw-monitor.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    guard
}

fn load_settings(cli: &Cli) -> Result<Settings, MonitorError> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(secs) = cli.refresh_interval {
        settings.refresh_interval = std::time::Duration::from_secs(secs.max(1));
    }
    if let Some(max_history) = cli.max_history {
        settings.max_history = max_history.max(1);
    }
    Ok(settings)
}

fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli)?;
    info!(
        refresh_secs = settings.refresh_interval.as_secs(),
        max_history = settings.max_history,
        plot_width = settings.plot_width,
        plot_height = settings.plot_height,
        suffix = %settings.exchange_suffix,
        "settings loaded"
    );

    let watch_list = WatchList::load(&cli.stocks_file, &settings.exchange_suffix)?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let provider = YahooProvider::new().context("failed to build HTTP client")?;
    let fetcher = QuoteFetcher::new(Arc::new(provider), &settings.exchange_suffix);
    let mut app = App::new(settings, watch_list.items, fetcher, runtime.handle().clone());

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupted);
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .context("failed to install interrupt handler")?;
    }

    let mut input = InputReader::open().map_err(|e| MonitorError::Terminal(e.to_string()))?;
    input.guard().install_panic_hook();

    let result = Terminal::new(CrosstermBackend::new(io::stdout()))
        .map_err(anyhow::Error::from)
        .and_then(|mut terminal| run_app(&mut terminal, &mut app, &mut input, &interrupted));

    // Restore before anything reaches stderr.
    drop(input);
    runtime.shutdown_background();
    info!("monitor stopped");
    result
}

fn main() {
    let cli = Cli::parse();
    let log_dir = cli.log_dir.clone().unwrap_or_else(default_log_dir);
    let guard = init_logging(&log_dir);

    if let Err(err) = run(cli) {
        error!("{err:#}");
        drop(guard);
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}
