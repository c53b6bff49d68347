//! Configuration for flowdesk, read from `.flowdesk/flowdesk.toml`.
//!
//! Layering is file → environment → CLI flags. Every field has a default so
//! an empty or missing file yields a working setup.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3180
//! db_path = ".flowdesk/flowdesk.db"
//! dev_mode = false
//!
//! [database]
//! busy_timeout_ms = 5000
//!
//! [logging]
//! filter = "info"
//! json = false
//! directory = ".flowdesk/logs"
//!
//! [workflow]
//! require_initial_stage = true
//! require_final_stage = true
//! allow_multiple_final_stages = true
//!
//! [reports]
//! recent_limit = 10
//! completed_limit = 50
//! on_time_tolerance_hours = 1.0
//! due_soon_hours = 24
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_DIR: &str = ".flowdesk";
pub const CONFIG_FILE: &str = "flowdesk.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// SQLite file; created on first use.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Enables permissive CORS for local front-end development.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3180
}

fn default_db_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("flowdesk.db")
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// How long a connection waits on another process's write lock.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
    /// Adds a daily rolling log file in this directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
            directory: None,
        }
    }
}

/// Rules a process's stage layout must satisfy when it is defined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Exactly one initial stage when set; at most one otherwise.
    #[serde(default = "default_true")]
    pub require_initial_stage: bool,
    #[serde(default = "default_true")]
    pub require_final_stage: bool,
    #[serde(default = "default_true")]
    pub allow_multiple_final_stages: bool,
}

fn default_true() -> bool {
    true
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            require_initial_stage: true,
            require_final_stage: true,
            allow_multiple_final_stages: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
    #[serde(default = "default_completed_limit")]
    pub completed_limit: usize,
    /// Variance within ±this many hours counts as on time.
    #[serde(default = "default_on_time_tolerance_hours")]
    pub on_time_tolerance_hours: f64,
    /// Active tickets due within this many hours count as due soon.
    #[serde(default = "default_due_soon_hours")]
    pub due_soon_hours: i64,
}

fn default_recent_limit() -> usize {
    10
}

fn default_completed_limit() -> usize {
    50
}

fn default_on_time_tolerance_hours() -> f64 {
    1.0
}

fn default_due_soon_hours() -> i64 {
    24
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            recent_limit: default_recent_limit(),
            completed_limit: default_completed_limit(),
            on_time_tolerance_hours: default_on_time_tolerance_hours(),
            due_soon_hours: default_due_soon_hours(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub reports: ReportConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse flowdesk.toml")
    }

    /// Load `flowdesk.toml` from `dir`, or defaults if the file is absent.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the effective configuration: explicit file if given, else the
    /// default location, then environment overrides.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => Self::load_or_default(Path::new(CONFIG_DIR))?,
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize flowdesk.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `FLOWDESK_*` environment variables on top of file values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("FLOWDESK_DB_PATH") {
            self.server.db_path = PathBuf::from(path);
        }
        if let Some(host) = lookup("FLOWDESK_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("FLOWDESK_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid FLOWDESK_PORT '{}'", port))?;
        }
        Ok(())
    }

    /// Validate the configuration and return any problems found.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.server.host.trim().is_empty() {
            problems.push("server.host must not be empty".to_string());
        }
        if self.server.db_path.as_os_str().is_empty() {
            problems.push("server.db_path must not be empty".to_string());
        }
        if self.reports.recent_limit == 0 {
            problems.push("reports.recent_limit must be at least 1".to_string());
        }
        if self.reports.completed_limit == 0 {
            problems.push("reports.completed_limit must be at least 1".to_string());
        }
        if !self.reports.on_time_tolerance_hours.is_finite()
            || self.reports.on_time_tolerance_hours < 0.0
        {
            problems.push(format!(
                "reports.on_time_tolerance_hours must be a non-negative number, got {}",
                self.reports.on_time_tolerance_hours
            ));
        }
        if self.reports.due_soon_hours < 0 {
            problems.push("reports.due_soon_hours must not be negative".to_string());
        }
        if let Err(e) = tracing_subscriber::EnvFilter::try_new(&self.logging.filter) {
            problems.push(format!("Invalid logging.filter '{}': {}", self.logging.filter, e));
        }

        problems
    }
}
