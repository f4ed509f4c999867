// Opens URLs and folders with the desktop's opener.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

pub struct Opener {
    program: String,
}

impl Opener {
    /// Uses `program` when given, otherwise the platform default.
    pub fn new(program: Option<String>) -> Self {
        Self {
            program: program.unwrap_or_else(|| platform_default().to_string()),
        }
    }

    pub fn open_url(&self, url: &str) -> Result<()> {
        self.spawn(url).map(|_| ())
    }

    pub fn open_path(&self, path: &Path) -> Result<()> {
        self.spawn(&path.to_string_lossy()).map(|_| ())
    }

    // The caller never waits; a worker thread reaps the child when it exits.
    fn spawn(&self, target: &str) -> Result<JoinHandle<Option<ExitStatus>>> {
        info!("Opening {} with {}", target, self.program);
        let mut child = Command::new(&self.program)
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to open {} with {}", target, self.program))?;

        let program = self.program.clone();
        Ok(thread::spawn(move || match child.wait() {
            Ok(status) => {
                if !status.success() {
                    warn!("{} exited with {}", program, status);
                }
                Some(status)
            }
            Err(e) => {
                warn!("Failed to wait for {}: {}", program, e);
                None
            }
        }))
    }
}

fn platform_default() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    }
}
