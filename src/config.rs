use crate::app::model::Formulae;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// brew binary; a bare name is looked up on PATH
    #[serde(default = "default_brew_path")]
    pub brew_path: PathBuf,
    /// Pause between the last start/stop finishing and re-reading status
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Stop every service when the TUI quits
    #[serde(default = "default_stop_on_quit")]
    pub stop_on_quit: bool,
    /// Command used to open URLs and folders (default: `open` on macOS, `xdg-open` elsewhere)
    #[serde(default)]
    pub opener: Option<String>,
    #[serde(default = "default_phpmyadmin_url")]
    pub phpmyadmin_url: String,
    #[serde(default = "default_webroot")]
    pub webroot: PathBuf,
    #[serde(default)]
    pub formulae: FormulaeConfig,
}

/// Homebrew formula names for each managed service
#[derive(Debug, Clone, Deserialize)]
pub struct FormulaeConfig {
    #[serde(default = "default_web")]
    pub web: String,
    #[serde(default = "default_runtime")]
    pub runtime: String,
    #[serde(default = "default_database")]
    pub database: String,
}

impl Default for FormulaeConfig {
    fn default() -> Self {
        Self {
            web: default_web(),
            runtime: default_runtime(),
            database: default_database(),
        }
    }
}

impl From<FormulaeConfig> for Formulae {
    fn from(config: FormulaeConfig) -> Self {
        Formulae {
            web: config.web,
            runtime: config.runtime,
            database: config.database,
        }
    }
}

fn default_brew_path() -> PathBuf {
    PathBuf::from("brew")
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_stop_on_quit() -> bool {
    true
}

fn default_phpmyadmin_url() -> String {
    "http://localhost:8080/phpmyadmin".to_string()
}

fn default_webroot() -> PathBuf {
    PathBuf::from("/opt/homebrew/var/www")
}

fn default_web() -> String {
    Formulae::default().web
}

fn default_runtime() -> String {
    Formulae::default().runtime
}

fn default_database() -> String {
    Formulae::default().database
}

impl Default for Config {
    fn default() -> Self {
        Self {
            brew_path: default_brew_path(),
            settle_delay_ms: default_settle_delay_ms(),
            stop_on_quit: default_stop_on_quit(),
            opener: None,
            phpmyadmin_url: default_phpmyadmin_url(),
            webroot: default_webroot(),
            formulae: FormulaeConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if it doesn't exist
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            tracing::debug!("No config at {:?}, using defaults", config_path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;
        Ok(config)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn formulae(&self) -> Formulae {
        self.formulae.clone().into()
    }
}

/// Default location: `<config_dir>/brew-stack-tui/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".config"))
        .join("brew-stack-tui")
        .join("config.toml")
}
