use crate::app::brew::{Brew, ServiceController};
use crate::app::coordinator::{Submission, SyncCoordinator};
use crate::app::model::{BatchOperation, ServiceName, ServiceStatus};
use crate::config::{self, Config};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Toggle the local Homebrew web/PHP/database stack from the terminal
#[derive(Parser, Debug)]
#[command(name = "brew-stack-tui", version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: <config_dir>/brew-stack-tui/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// brew binary to use instead of the configured one
    #[arg(long, global = true)]
    pub brew: Option<PathBuf>,

    /// Leave services running when the TUI quits
    #[arg(long)]
    pub keep_running: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print whether each service is running
    Status,
    /// Start a service if stopped, stop it if running
    Toggle {
        #[arg(value_enum)]
        service: ServiceArg,
    },
    /// Start every service
    StartAll,
    /// Stop every service
    StopAll,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceArg {
    Web,
    Runtime,
    Database,
}

impl From<ServiceArg> for ServiceName {
    fn from(arg: ServiceArg) -> Self {
        match arg {
            ServiceArg::Web => ServiceName::Web,
            ServiceArg::Runtime => ServiceName::Runtime,
            ServiceArg::Database => ServiceName::Database,
        }
    }
}

impl Cli {
    /// Loads config and applies command-line overrides.
    pub fn load_config(&self) -> Result<Config> {
        let path = self.config.clone().unwrap_or_else(config::default_config_path);
        let mut config = Config::load(&path).context("Failed to load configuration")?;
        if let Some(brew) = &self.brew {
            config.brew_path = brew.clone();
        }
        if self.keep_running {
            config.stop_on_quit = false;
        }
        Ok(config)
    }

    /// Runs a headless subcommand. Returns `Ok(false)` when there is none and
    /// the TUI should start instead.
    pub fn execute(&self, config: &Config) -> Result<bool> {
        let Some(command) = &self.command else {
            return Ok(false);
        };

        let controller = controller(config);
        match command {
            Commands::Status => {
                print_status(&controller.query_status_blocking(), &controller);
            }
            Commands::Toggle { service } => {
                run_batch(config, controller, |status| {
                    BatchOperation::toggle((*service).into(), status)
                })?;
            }
            Commands::StartAll => run_batch(config, controller, |_| BatchOperation::start_all())?,
            Commands::StopAll => run_batch(config, controller, |_| BatchOperation::stop_all())?,
        }
        Ok(true)
    }
}

pub fn controller(config: &Config) -> ServiceController {
    ServiceController::new(Arc::new(Brew::new(&config.brew_path)), config.formulae())
}

fn run_batch<F>(config: &Config, controller: ServiceController, build: F) -> Result<()>
where
    F: FnOnce(&ServiceStatus) -> BatchOperation,
{
    let printer = controller.clone();
    let observer = |_: &ServiceStatus, _: bool| {};
    let mut coordinator = SyncCoordinator::new(controller, observer, config.settle_delay());
    let tick = Duration::from_millis(50);

    // Batches are built from known status, so read it first.
    coordinator.refresh();
    while !coordinator.wait_event(tick) {}

    let batch = build(&coordinator.current_status());
    if coordinator.submit(batch) == Submission::Rejected {
        anyhow::bail!("Another operation is still running");
    }
    coordinator.run_until_idle(tick);

    print_status(&coordinator.current_status(), &printer);
    Ok(())
}

fn print_status(status: &ServiceStatus, controller: &ServiceController) {
    for (name, running) in status.iter() {
        println!(
            "{:<12} {:<12} {}",
            name.label(),
            controller.formulae().get(name),
            if running { "started" } else { "stopped" }
        );
    }
}
