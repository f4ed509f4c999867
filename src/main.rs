use anyhow::{Context, Result};
use clap::Parser;

mod app;
mod cli;
mod config;

use app::shortcuts::Opener;
use app::{App, Shortcuts};
use cli::Cli;

fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = dirs::cache_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default())
        .join("brew-stack-tui");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let file_appender = tracing_appender::rolling::never(&log_dir, "brew-stack-tui.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();

    Ok(guard)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging()?;

    let config = cli.load_config()?;
    tracing::info!("Using brew at {:?}", config.brew_path);

    if cli.execute(&config)? {
        return Ok(());
    }

    let (observer, updates) = app::channel_observer();
    let coordinator = app::coordinator::SyncCoordinator::new(
        cli::controller(&config),
        observer,
        config.settle_delay(),
    );
    let shortcuts = Shortcuts {
        opener: Opener::new(config.opener.clone()),
        phpmyadmin_url: config.phpmyadmin_url.clone(),
        webroot: config.webroot.clone(),
    };
    let mut app = App::new(coordinator, updates, shortcuts, config.stop_on_quit);

    // Also installs a panic hook that restores the terminal.
    let mut terminal = ratatui::try_init().context("Failed to initialize terminal")?;
    let result = app.run(&mut terminal);
    ratatui::restore();

    result
}
