// Handles all interactions with the `brew services` command.

use super::model::{Action, Formulae, ServiceName, ServiceStatus};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// Whatever actually starts, stops and lists services.
pub trait ServiceManager: Send + Sync {
    /// Runs the start/stop command to completion. An `Err` means the command
    /// could not be launched; the exit code is not part of the contract.
    fn set_state(&self, formula: &str, action: Action) -> Result<()>;

    /// Returns the raw text of the service listing.
    fn list(&self) -> Result<String>;
}

/// `brew services` through the configured brew binary.
pub struct Brew {
    path: PathBuf,
}

impl Brew {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ServiceManager for Brew {
    fn set_state(&self, formula: &str, action: Action) -> Result<()> {
        let status = Command::new(&self.path)
            .arg("services")
            .arg(action.verb())
            .arg(formula)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("Failed to {} service {}", action.verb(), formula))?;

        if !status.success() {
            warn!("brew services {} {} exited with {}", action.verb(), formula, status);
        }
        Ok(())
    }

    fn list(&self) -> Result<String> {
        let output = Command::new(&self.path)
            .arg("services")
            .arg("list")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .context("Failed to execute brew services list")?;

        if !output.status.success() {
            warn!("brew services list exited with {}", output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Issues start/stop commands and status queries on background threads.
#[derive(Clone)]
pub struct ServiceController {
    manager: Arc<dyn ServiceManager>,
    formulae: Arc<Formulae>,
}

impl ServiceController {
    pub fn new(manager: Arc<dyn ServiceManager>, formulae: Formulae) -> Self {
        Self {
            manager,
            formulae: Arc::new(formulae),
        }
    }

    pub fn formulae(&self) -> &Formulae {
        &self.formulae
    }

    /// Starts or stops `name` on a worker thread and calls `on_done` once the
    /// command exits, whatever its outcome.
    pub fn set_service_state<F>(&self, name: ServiceName, action: Action, on_done: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let this = self.clone();
        thread::spawn(move || {
            this.set_service_state_blocking(name, action);
            on_done();
        });
    }

    /// Same as [`set_service_state`](Self::set_service_state) but on the caller's thread.
    pub fn set_service_state_blocking(&self, name: ServiceName, action: Action) {
        let formula = self.formulae.get(name);
        debug!("brew services {} {}", action.verb(), formula);
        if let Err(e) = self.manager.set_state(formula, action) {
            warn!("{:#}", e);
        }
    }

    /// Lists services on a worker thread and hands the parsed status to `on_done`.
    pub fn query_status<F>(&self, on_done: F)
    where
        F: FnOnce(ServiceStatus) + Send + 'static,
    {
        let this = self.clone();
        thread::spawn(move || on_done(this.query_status_blocking()));
    }

    pub fn query_status_blocking(&self) -> ServiceStatus {
        match self.manager.list() {
            Ok(text) => parse_status(&text, &self.formulae),
            Err(e) => {
                warn!("{:#}", e);
                ServiceStatus::default()
            }
        }
    }
}

/// A service counts as running when its formula and "started" or "running"
/// appear on the same line, ignoring case.
pub fn parse_status(text: &str, formulae: &Formulae) -> ServiceStatus {
    let mut status = ServiceStatus::default();

    for line in text.lines() {
        let line = line.to_lowercase();
        if !(line.contains("started") || line.contains("running")) {
            continue;
        }
        for name in ServiceName::ALL {
            if line.contains(&formulae.get(name).to_lowercase()) {
                status.set(name, true);
            }
        }
    }

    status
}
